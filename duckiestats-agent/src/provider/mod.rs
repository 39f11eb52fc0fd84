//! Units of data production polled by the statistics worker.
//!
//! A [`Provider`] is either *polled* (a [`Source`] queried on a [`Frequency`])
//! or *file-backed* (a JSON document dropped on disk by another process).
//! Sources report failures as errors; the provider layer turns every failure
//! into "nothing to report this cycle".

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use duckiestats_proto::Category;
use log::debug;
use serde_json::Value;
use time::OffsetDateTime;

use crate::reminder::Reminder;

pub use file::FileProvider;

pub mod file;
pub mod sources;

pub const DEFAULT_FORMAT_VERSION: &str = "1.0";

/// Polling tiers. `OneShot` fires once over the provider's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    OneShot,
    Every30Minutes,
    EveryHour,
    Every2Hours,
}

impl Frequency {
    pub fn period(self) -> Option<Duration> {
        let secs = match self {
            Frequency::OneShot => return None,
            Frequency::Every30Minutes => 30 * 60,
            Frequency::EveryHour => 60 * 60,
            Frequency::Every2Hours => 2 * 60 * 60,
        };
        Some(Duration::from_secs(secs))
    }
}

/// Timestamped payload produced by one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub stamp: f64,
    pub payload: Value,
}

/// Cleanup that runs once a point is confirmed by the server.
pub trait DeliveryHook: Send + Sync + fmt::Debug {
    fn on_delivered(&self);
}

/// Gathers one metric family on demand.
///
/// `Ok(None)` means "nothing new", e.g. the observed set did not change since
/// the previous call.
#[async_trait]
pub trait Source: Send {
    fn key(&self) -> &str;

    fn format_version(&self) -> &str {
        DEFAULT_FORMAT_VERSION
    }

    async fn observe(&mut self) -> anyhow::Result<Option<Value>>;
}

enum Schedule {
    Once,
    Every(Reminder),
}

pub struct PolledProvider {
    category: Category,
    schedule: Schedule,
    source: Box<dyn Source>,
}

pub enum Provider {
    Polled(PolledProvider),
    File(FileProvider),
}

impl Provider {
    pub fn usage(source: impl Source + 'static, frequency: Frequency) -> Self {
        Self::polled(Category::Usage, source, frequency)
    }

    /// Static facts about the robot, reported once.
    pub fn configuration(source: impl Source + 'static) -> Self {
        Self::polled(Category::Configuration, source, Frequency::OneShot)
    }

    pub fn polled(category: Category, source: impl Source + 'static, frequency: Frequency) -> Self {
        let schedule = match frequency.period() {
            Some(period) => Schedule::Every(Reminder::new(period)),
            None => Schedule::Once,
        };
        Provider::Polled(PolledProvider {
            category,
            schedule,
            source: Box::new(source),
        })
    }

    pub fn category(&self) -> Category {
        match self {
            Provider::Polled(p) => p.category,
            Provider::File(f) => f.category(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Provider::Polled(p) => p.source.key(),
            Provider::File(f) => f.key().unwrap_or("null"),
        }
    }

    pub fn format_version(&self) -> &str {
        match self {
            Provider::Polled(p) => p.source.format_version(),
            Provider::File(_) => DEFAULT_FORMAT_VERSION,
        }
    }

    /// Recurring providers are ready on the first check and then once per
    /// period. One-shot providers stay ready until their point is produced.
    pub fn is_ready(&mut self) -> bool {
        match self {
            Provider::Polled(p) => match &mut p.schedule {
                Schedule::Once => true,
                Schedule::Every(reminder) => reminder.is_time(),
            },
            Provider::File(f) => f.is_loaded(),
        }
    }

    pub fn is_one_shot(&self) -> bool {
        match self {
            Provider::Polled(p) => matches!(p.schedule, Schedule::Once),
            Provider::File(_) => true,
        }
    }

    pub async fn observe(&mut self) -> Option<Observation> {
        match self {
            Provider::Polled(p) => match p.source.observe().await {
                Ok(Some(payload)) => Some(Observation {
                    stamp: unix_now(),
                    payload,
                }),
                Ok(None) => None,
                Err(e) => {
                    debug!("provider '{}' has no data: {e:#}", p.source.key());
                    None
                }
            },
            Provider::File(f) => f.observation(),
        }
    }

    pub fn delivery_hook(&self) -> Option<Arc<dyn DeliveryHook>> {
        match self {
            Provider::Polled(_) => None,
            Provider::File(f) => Some(f.cleanup_hook()),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("category", &self.category())
            .field("key", &self.key())
            .field("one_shot", &self.is_one_shot())
            .finish()
    }
}

pub fn unix_now() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}
