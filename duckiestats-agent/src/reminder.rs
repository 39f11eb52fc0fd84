use std::time::Duration;

use tokio::time::Instant;

/// Gate that opens on its first check and then at most once per period.
#[derive(Debug, Clone)]
pub struct Reminder {
    period: Duration,
    last_fired: Option<Instant>,
}

impl Reminder {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_fired: None,
        }
    }

    pub fn is_time(&mut self) -> bool {
        let now = Instant::now();
        match self.last_fired {
            Some(last) if now.duration_since(last) < self.period => false,
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
