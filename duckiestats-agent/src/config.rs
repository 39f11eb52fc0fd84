use std::{path::PathBuf, time::Duration};

use confique::Config;

#[derive(Config, Debug)]
pub struct Conf {
    /// Remote statistics endpoint
    #[config(nested)]
    pub api: ApiConf,

    /// Where the agent finds its inputs and credentials
    #[config(nested)]
    pub paths: PathsConf,

    /// Loop cadences
    #[config(nested)]
    pub schedule: ScheduleConf,
}

#[derive(Config, Debug)]
pub struct ApiConf {
    #[config(env = "DT_STATS_API_PROTOCOL", default = "https")]
    pub protocol: String,

    #[config(env = "DT_STATS_API_HOST", default = "stats.duckietown.org")]
    pub host: String,

    #[config(env = "DT_STATS_API_PORT", default = 443)]
    pub port: u16,

    #[config(default = "v1")]
    pub version: String,

    /// Upper bound for a single delivery request in seconds
    #[config(default = 10)]
    pub timeout_secs: u64,

    #[config(default = false)]
    pub prefer_ipv6: bool,
}

#[derive(Config, Debug)]
pub struct PathsConf {
    #[config(default = "/data/stats/events")]
    pub events_dir: PathBuf,

    #[config(default = "/data/stats/usage")]
    pub usage_dir: PathBuf,

    #[config(env = "DT_STATS_TOKEN_FILE", default = "/secrets/tokens/dt1")]
    pub token_file: PathBuf,

    #[config(default = "/etc/machine-id")]
    pub device_id_file: PathBuf,

    #[config(default = "/proc/sys/kernel/random/boot_id")]
    pub boot_id_file: PathBuf,

    #[config(default = "/data/config/permissions")]
    pub permissions_dir: PathBuf,
}

#[derive(Config, Debug)]
pub struct ScheduleConf {
    /// Minimum seconds between two scheduler passes
    #[config(default = 10)]
    pub worker_tick_secs: u64,

    /// Minimum seconds between two delivery passes
    #[config(default = 30)]
    pub publish_period_secs: u64,

    /// Sleep between two checks of the tick gates
    #[config(default = 1000)]
    pub idle_millis: u64,

    /// Upper bound for a single provider observation in seconds
    #[config(default = 5)]
    pub probe_timeout_secs: u64,
}

impl ApiConf {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ScheduleConf {
    pub fn worker_tick(&self) -> Duration {
        Duration::from_secs(self.worker_tick_secs)
    }

    pub fn publish_period(&self) -> Duration {
        Duration::from_secs(self.publish_period_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_millis)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

pub fn load(path: &str) -> anyhow::Result<Conf> {
    Conf::builder()
        .env()
        .file(path)
        .load()
        .map_err(|e| e.into())
}
