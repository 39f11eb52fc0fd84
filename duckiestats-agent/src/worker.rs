use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    identity::DeviceContext, outbox::Outbox, point::StatisticsPoint, provider::Provider,
    reminder::Reminder,
};

/// Polls the registered providers and feeds the outbox.
pub struct StatisticsWorker {
    providers: Vec<Provider>,
    outbox: Outbox,
    context: Arc<dyn DeviceContext>,
    tick: Reminder,
    idle: Duration,
}

impl StatisticsWorker {
    pub fn new(
        providers: Vec<Provider>,
        outbox: Outbox,
        context: Arc<dyn DeviceContext>,
        tick: Duration,
        idle: Duration,
    ) -> Self {
        Self {
            providers,
            outbox,
            context,
            tick: Reminder::new(tick),
            idle,
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        let device = match self.context.device_id() {
            Ok(device) => device,
            Err(e) => {
                warn!("{e}. Cannot collect statistics.");
                return;
            }
        };
        info!(
            "statistics worker started for device {device} with {} providers, ticking every {:?}",
            self.provider_count(),
            self.tick.period()
        );

        while !shutdown.is_cancelled() {
            if self.tick.is_time() {
                let produced = self.poll_once(&device).await;
                if produced > 0 {
                    debug!(
                        "collected {produced} points, {} providers left",
                        self.provider_count()
                    );
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.idle) => {}
            }
        }
        info!("statistics worker stopped");
    }

    /// One pass over every provider in registration order.
    ///
    /// One-shot providers that produced a point are dropped after the pass.
    pub async fn poll_once(&mut self, device: &str) -> usize {
        let mut spent = vec![false; self.providers.len()];
        let mut produced = 0;

        for (provider, spent) in self.providers.iter_mut().zip(spent.iter_mut()) {
            if !provider.is_ready() {
                continue;
            }
            let Some(observation) = provider.observe().await else {
                continue;
            };

            self.outbox
                .push(StatisticsPoint::new(provider, device, observation))
                .await;
            produced += 1;
            *spent = provider.is_one_shot();
        }

        let mut spent = spent.into_iter();
        self.providers.retain(|_| !spent.next().unwrap_or(false));
        produced
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }
}
