#![forbid(unsafe_code)]

use std::sync::Arc;

use argh::FromArgs;
use log::{debug, info, warn};
use simple_logger::SimpleLogger;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
    http_util::HttpOptions,
    identity::FsDeviceContext,
    outbox::Outbox,
    registry::RegistrySettings,
    transport::StatsClient,
    uploader::StatisticsUploader,
    worker::StatisticsWorker,
};

mod config;
mod http_util;
mod identity;
mod outbox;
mod point;
mod provider;
mod registry;
mod reminder;
mod transport;
mod uploader;
mod worker;

#[derive(FromArgs, Debug)]
#[argh(description = "Collects robot statistics and publishes them to the statistics server.")]
struct Cli {
    #[argh(
        option,
        short = 'c',
        default = "\"/data/config/stats/agent.toml\".to_string()",
        description = "path to the configuration file"
    )]
    pub config: String,
    #[argh(
        option,
        description = "hostname to report and to reach local robot services on"
    )]
    pub hostname: Option<String>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new().env().init()?;

    let cli: Cli = argh::from_env();
    let conf = config::load(&cli.config)?;
    debug!("Agent config: {conf:#?}");

    let hostname = cli
        .hostname
        .clone()
        .or_else(sysinfo::System::host_name)
        .unwrap_or_else(|| "localhost".to_owned());

    let context = Arc::new(FsDeviceContext::new(&conf.paths));
    let outbox = Outbox::new();

    let providers = registry::assemble(&RegistrySettings {
        events_dir: &conf.paths.events_dir,
        usage_dir: &conf.paths.usage_dir,
        hostname: &hostname,
        hostname_override: cli.hostname.as_deref(),
        probe: HttpOptions {
            timeout: conf.schedule.probe_timeout(),
            prefer_ipv6: conf.api.prefer_ipv6,
        },
    });

    let worker = StatisticsWorker::new(
        providers,
        outbox.clone(),
        context.clone(),
        conf.schedule.worker_tick(),
        conf.schedule.idle(),
    );
    let uploader = StatisticsUploader::new(
        outbox,
        Arc::new(StatsClient::new(&conf.api)),
        context,
        conf.schedule.publish_period(),
        conf.schedule.idle(),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let worker = tokio::spawn(worker.run(shutdown.clone()));
    let uploader = tokio::spawn(uploader.run(shutdown.clone()));
    for (name, task) in [("worker", worker), ("uploader", uploader)] {
        if let Err(e) = task.await {
            warn!("statistics {name} crashed: {e}");
        }
    }

    // stay up until asked to stop, even if both components gave up
    shutdown.cancelled().await;
    info!("shutting down");
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    let _shutdown_guard = token.drop_guard();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("unable to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("unable to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
