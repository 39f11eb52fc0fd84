use std::{collections::HashSet, sync::Arc};

use tokio::sync::Mutex;

use crate::point::StatisticsPoint;

/// A queued point and the sequence number it was enqueued with.
#[derive(Debug, Clone)]
pub struct Pending {
    pub seq: u64,
    pub point: Arc<StatisticsPoint>,
}

#[derive(Debug, Default)]
struct Queue {
    next_seq: u64,
    pending: Vec<Pending>,
}

/// Points waiting for confirmed delivery, shared by the worker and the uploader.
///
/// The lock is only held to append, snapshot or prune; never across I/O.
/// The queue is unbounded: if delivery never becomes possible, points
/// accumulate for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    queue: Arc<Mutex<Queue>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, point: StatisticsPoint) -> u64 {
        let mut queue = self.queue.lock().await;
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.pending.push(Pending {
            seq,
            point: Arc::new(point),
        });
        seq
    }

    /// Copy of everything queued right now, oldest first.
    pub async fn snapshot(&self) -> Vec<Pending> {
        self.queue.lock().await.pending.clone()
    }

    /// Drop the points with the given sequence numbers. Unknown numbers are ignored.
    pub async fn remove(&self, done: &HashSet<u64>) {
        if done.is_empty() {
            return;
        }
        self.queue
            .lock()
            .await
            .pending
            .retain(|p| !done.contains(&p.seq));
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.queue.lock().await.pending.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::point::test::sample_point;

    #[tokio::test]
    async fn snapshot_then_prune_keeps_late_arrivals() {
        let outbox = Outbox::new();
        let a = outbox.push(sample_point("a", 1.0)).await;
        let b = outbox.push(sample_point("b", 2.0)).await;

        let snapshot = outbox.snapshot().await;
        assert_eq!(
            snapshot.iter().map(|p| p.seq).collect::<Vec<_>>(),
            vec![a, b]
        );

        // enqueued while the snapshot is being delivered
        let c = outbox.push(sample_point("c", 3.0)).await;

        outbox.remove(&snapshot.iter().map(|p| p.seq).collect()).await;
        let left = outbox.snapshot().await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].seq, c);
        assert_eq!(left[0].point.key, "c");
    }

    #[tokio::test]
    async fn identical_points_are_distinct_entries() {
        let outbox = Outbox::new();
        let first = outbox.push(sample_point("uptime", 1.0)).await;
        outbox.push(sample_point("uptime", 1.0)).await;

        outbox.remove(&HashSet::from([first])).await;
        assert_eq!(outbox.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_push_and_drain_lose_nothing() {
        const TOTAL: usize = 500;
        let outbox = Outbox::new();

        let producer = tokio::spawn({
            let outbox = outbox.clone();
            async move {
                for i in 0..TOTAL {
                    outbox.push(sample_point("p", i as f64)).await;
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }
        });

        let mut drained = Vec::new();
        loop {
            let snapshot = outbox.snapshot().await;
            let seqs: HashSet<u64> = snapshot.iter().map(|p| p.seq).collect();
            drained.extend(snapshot.iter().map(|p| p.seq));
            outbox.remove(&seqs).await;

            if producer.is_finished() && outbox.len().await == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        producer.await.unwrap();

        let unique: HashSet<u64> = drained.iter().copied().collect();
        assert_eq!(drained.len(), TOTAL, "a point was drained twice");
        assert_eq!(unique.len(), TOTAL, "a point was lost");
    }
}
