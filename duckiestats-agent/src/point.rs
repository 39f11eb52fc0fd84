use std::{fmt, sync::Arc};

use duckiestats_proto::{Category, msg::PushPointReq};
use serde_json::Value;

use crate::provider::{DeliveryHook, Observation, Provider};

/// One normalized observation waiting for delivery.
#[derive(Clone)]
pub struct StatisticsPoint {
    pub category: Category,
    pub key: String,
    pub device: String,
    /// Unix seconds at observation time.
    pub stamp: f64,
    pub payload: Value,
    pub format_version: String,
    on_delivered: Option<Arc<dyn DeliveryHook>>,
}

impl StatisticsPoint {
    pub fn new(provider: &Provider, device: &str, observation: Observation) -> Self {
        Self {
            category: provider.category(),
            key: provider.key().to_owned(),
            device: device.to_owned(),
            stamp: observation.stamp,
            payload: observation.payload,
            format_version: provider.format_version().to_owned(),
            on_delivered: provider.delivery_hook(),
        }
    }

    /// Run the producing provider's cleanup. Called once delivery is confirmed.
    pub fn confirm_delivered(&self) {
        if let Some(hook) = &self.on_delivered {
            hook.on_delivered();
        }
    }

    /// Wire body. Seconds become milliseconds here and nowhere earlier.
    pub fn to_request(&self, boot_id: &str) -> PushPointReq {
        PushPointReq {
            key: self.key.clone(),
            device: self.device.clone(),
            boot_id: boot_id.to_owned(),
            stamp_ms: (self.stamp * 1000.0).round() as i64,
            format: self.format_version.clone(),
            payload: self.payload.clone(),
        }
    }
}

impl fmt::Debug for StatisticsPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatisticsPoint")
            .field("category", &self.category)
            .field("key", &self.key)
            .field("device", &self.device)
            .field("stamp", &self.stamp)
            .field("format_version", &self.format_version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    /// Counts cleanup invocations.
    #[derive(Debug, Default)]
    pub(crate) struct CountingHook(pub AtomicUsize);

    impl CountingHook {
        pub(crate) fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl DeliveryHook for CountingHook {
        fn on_delivered(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl StatisticsPoint {
        pub(crate) fn with_hook(mut self, hook: Arc<dyn DeliveryHook>) -> Self {
            self.on_delivered = Some(hook);
            self
        }
    }

    pub(crate) fn sample_point(key: &str, stamp: f64) -> StatisticsPoint {
        StatisticsPoint {
            category: Category::Usage,
            key: key.to_owned(),
            device: "device-0".to_owned(),
            stamp,
            payload: json!({"value": key}),
            format_version: "1.0".to_owned(),
            on_delivered: None,
        }
    }

    #[test]
    fn request_carries_milliseconds_and_boot_id() {
        let point = sample_point("uptime", 1_600_000_000.1234);
        let req = point.to_request("boot-42");

        assert_eq!(req.stamp_ms, 1_600_000_000_123);
        assert_eq!(req.boot_id, "boot-42");
        assert_eq!(req.key, "uptime");
        assert_eq!(req.device, "device-0");
        assert_eq!(req.payload, json!({"value": "uptime"}));
        // the point itself keeps seconds
        assert_eq!(point.stamp, 1_600_000_000.1234);
    }

    #[test]
    fn confirm_runs_hook() {
        let hook = Arc::new(CountingHook::default());
        let point = sample_point("lsusb", 1.0).with_hook(hook.clone());
        point.confirm_delivered();
        assert_eq!(hook.count(), 1);

        // no hook is a no-op
        sample_point("lsusb", 1.0).confirm_delivered();
    }
}
