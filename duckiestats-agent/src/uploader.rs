use std::{collections::HashSet, sync::Arc, time::Duration};

use duckiestats_proto::msg::{DeviceToken, PushPointResp};
use log::{debug, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{identity::DeviceContext, outbox::Outbox, reminder::Reminder, transport::Deliver};

pub const PUSH_PERMISSION: &str = "allow_push_stats_data";

/// Credentials validated once when the uploader starts.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: DeviceToken,
    pub boot_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Duplicate,
    Retry,
}

/// Tally of one delivery pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub delivered: usize,
    pub duplicates: usize,
    pub retained: usize,
}

/// Drains the outbox towards the statistics endpoint.
pub struct StatisticsUploader {
    outbox: Outbox,
    transport: Arc<dyn Deliver>,
    context: Arc<dyn DeviceContext>,
    cycle: Reminder,
    idle: Duration,
}

impl StatisticsUploader {
    pub fn new(
        outbox: Outbox,
        transport: Arc<dyn Deliver>,
        context: Arc<dyn DeviceContext>,
        period: Duration,
        idle: Duration,
    ) -> Self {
        Self {
            outbox,
            transport,
            context,
            cycle: Reminder::new(period),
            idle,
        }
    }

    /// Permission, token and boot id; any of them missing disables delivery.
    pub fn authorize(&self) -> Option<Session> {
        if !self.context.permission_granted(PUSH_PERMISSION) {
            warn!("Permission '{PUSH_PERMISSION}' not granted. Won't share data.");
            return None;
        }
        let token = self
            .context
            .token()
            .inspect_err(|e| warn!("{e}. Cannot share statistics."))
            .ok()?;
        let boot_id = self
            .context
            .boot_id()
            .inspect_err(|e| warn!("{e}. Cannot share statistics."))
            .ok()?;
        Some(Session { token, boot_id })
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        let Some(session) = self.authorize() else {
            return;
        };
        info!(
            "statistics uploader started, delivering every {:?}",
            self.cycle.period()
        );

        while !shutdown.is_cancelled() {
            if self.cycle.is_time() {
                let report = self.deliver_pending(&session).await;
                if report != PassReport::default() {
                    debug!("delivery pass: {report:?}");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.idle) => {}
            }
        }
        info!("statistics uploader stopped");
    }

    /// One attempt for every point queued at the start of the pass.
    pub async fn deliver_pending(&self, session: &Session) -> PassReport {
        let snapshot = self.outbox.snapshot().await;

        let mut report = PassReport::default();
        let mut done = HashSet::new();
        for pending in &snapshot {
            let point = &pending.point;
            let req = point.to_request(&session.boot_id);
            let result = self
                .transport
                .deliver(point.category, &req, &session.token)
                .await;

            match classify(result) {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Duplicate => report.duplicates += 1,
                Outcome::Retry => {
                    report.retained += 1;
                    continue;
                }
            }
            point.confirm_delivered();
            done.insert(pending.seq);
        }

        self.outbox.remove(&done).await;
        report
    }
}

fn classify(result: anyhow::Result<PushPointResp>) -> Outcome {
    match result {
        Ok(resp) if resp.success => Outcome::Delivered,
        Ok(resp) if resp.is_duplicate() => Outcome::Duplicate,
        Ok(resp) => {
            debug!(
                "point rejected (code {:?}): {}",
                resp.code,
                resp.message.as_deref().unwrap_or("no message")
            );
            Outcome::Retry
        }
        Err(e) => {
            debug!("delivery failed: {e:#}");
            Outcome::Retry
        }
    }
}
