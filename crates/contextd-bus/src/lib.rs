//! Hand-rolled fan-out bus for `DashboardStatus` updates.
//!
//! A `tokio::sync::broadcast` channel would be the obvious choice, but its
//! lag semantics report "you missed N messages" to a slow subscriber
//! rather than letting the publisher observe and drop a specific
//! subscriber. Here every subscriber gets its own bounded `mpsc::Sender`;
//! a full queue means that subscriber is falling behind, and `broadcast`
//! drops it rather than blocking everyone else.

use std::sync::atomic::{AtomicU64, Ordering};

use md5::{Digest, Md5};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use contextd_domain::{DashboardUpdate, McpStatusSnapshot, MetricsSnapshot, SyncProgress};

#[derive(Debug, Clone)]
pub enum BusEvent {
    Status(DashboardUpdate),
    Metrics(MetricsSnapshot),
    SyncProgress(SyncProgress),
    McpStatus(McpStatusSnapshot),
    Keepalive,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<BusEvent>,
}

pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
    queue_depth: usize,
    keepalive: Duration,
    last_digest: RwLock<Option<(Vec<u8>, Instant)>>,
}

pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<BusEvent>,
}

impl EventBus {
    pub fn new(queue_depth: usize, keepalive_secs: u64) -> Self {
        EventBus {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            queue_depth,
            keepalive: Duration::from_secs(keepalive_secs),
            last_digest: RwLock::new(None),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_depth);
        self.subscribers.write().push(Subscriber { id, tx });

        contextd_domain::TraceEvent::BusSubscriberAdded {
            subscriber_count: self.subscribers.read().len(),
        }
        .emit();
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut subs = self.subscribers.write();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        if subs.len() != before {
            contextd_domain::TraceEvent::BusSubscriberRemoved {
                subscriber_count: subs.len(),
                reason: "client disconnected",
            }
            .emit();
        }
    }

    /// Broadcasts `status` to every subscriber, dropping any whose queue
    /// is full rather than blocking. Duplicate broadcasts — same session
    /// name/token tuples as the last call — are coalesced away: the
    /// digest acts as the `name, currentTokens` fingerprint the original
    /// implementation used to suppress redundant SSE frames.
    pub fn broadcast_status(&self, status: DashboardUpdate) {
        let fingerprint: Vec<(String, u64)> = status
            .projects
            .iter()
            .map(|p| (p.name.clone(), p.current_tokens))
            .collect();
        let digest = digest_of(&fingerprint);

        {
            let mut last = self.last_digest.write();
            if let Some((prev, _)) = last.as_ref() {
                if *prev == digest {
                    contextd_domain::TraceEvent::BusBroadcastCoalesced { event: "status" }.emit();
                    return;
                }
            }
            *last = Some((digest, Instant::now()));
        }

        self.send_to_all(BusEvent::Status(status));
    }

    /// Broadcasts a fresh metrics snapshot. Unlike `broadcast_status`, every
    /// snapshot goes out uncoalesced — counters are cheap to diff client-side
    /// and a missed tick is just a missed tick, not a backlog to suppress.
    pub fn broadcast_metrics(&self, metrics: MetricsSnapshot) {
        self.send_to_all(BusEvent::Metrics(metrics));
    }

    /// Broadcasts `initial_sync` progress. Uncoalesced, like metrics: each
    /// step reports a different source/count so there is nothing to dedupe.
    pub fn broadcast_sync_progress(&self, progress: SyncProgress) {
        self.send_to_all(BusEvent::SyncProgress(progress));
    }

    pub fn broadcast_mcp_status(&self, status: McpStatusSnapshot) {
        self.send_to_all(BusEvent::McpStatus(status));
    }

    pub fn broadcast_keepalive(&self) {
        self.send_to_all(BusEvent::Keepalive);
    }

    fn send_to_all(&self, event: BusEvent) {
        let mut dead = Vec::new();
        {
            let subs = self.subscribers.read();
            for sub in subs.iter() {
                if sub.tx.try_send(event.clone()).is_err() {
                    dead.push(sub.id);
                }
            }
        }
        for id in dead {
            let mut subs = self.subscribers.write();
            subs.retain(|s| s.id != id);
            contextd_domain::TraceEvent::BusSubscriberRemoved {
                subscriber_count: subs.len(),
                reason: "queue full",
            }
            .emit();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive
    }
}

fn digest_of(fingerprint: &[(String, u64)]) -> Vec<u8> {
    let mut hasher = Md5::new();
    for (name, tokens) in fingerprint {
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(tokens.to_le_bytes());
        hasher.update(b",");
    }
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextd_domain::{ProjectStatus, SourceInfo};

    fn status(tokens: u64) -> DashboardUpdate {
        let projects = vec![ProjectStatus {
            name: "claude\u{2014}demo".into(),
            project_path: "demo".into(),
            current_tokens: tokens,
            max_tokens: 100_000,
            context_usage: tokens as f64 / 100_000.0,
            pct: tokens as f64 / 1000.0,
            last_updated: "2026-01-01T00:00:00Z".into(),
            is_real_data: true,
            source: SourceInfo { name: "claude".into(), color: "#3B82F6".into() },
            transcript_path: "/tmp/demo.jsonl".into(),
        }];
        DashboardUpdate::from_projects(projects, vec![])
    }

    #[tokio::test]
    async fn subscriber_receives_broadcast() {
        let bus = EventBus::new(4, 30);
        let mut sub = bus.subscribe();
        bus.broadcast_status(status(1000));
        let event = sub.rx.recv().await.unwrap();
        matches!(event, BusEvent::Status(_));
    }

    #[tokio::test]
    async fn duplicate_status_is_coalesced() {
        let bus = EventBus::new(4, 30);
        let mut sub = bus.subscribe();
        bus.broadcast_status(status(1000));
        bus.broadcast_status(status(1000));
        sub.rx.recv().await.unwrap();
        // second identical broadcast never arrives
        let second = tokio::time::timeout(Duration::from_millis(50), sub.rx.recv()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn changed_status_is_not_coalesced() {
        let bus = EventBus::new(4, 30);
        let mut sub = bus.subscribe();
        bus.broadcast_status(status(1000));
        bus.broadcast_status(status(2000));
        sub.rx.recv().await.unwrap();
        let second = sub.rx.recv().await;
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn full_queue_drops_subscriber() {
        let bus = EventBus::new(1, 30);
        let sub = bus.subscribe();
        // fill the one slot, then force distinct payloads past it without draining
        for tokens in 0..5 {
            bus.broadcast_status(status(tokens));
        }
        assert_eq!(bus.subscriber_count(), 0);
        drop(sub);
    }

    #[tokio::test]
    async fn unsubscribe_removes_subscriber() {
        let bus = EventBus::new(4, 30);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        bus.unsubscribe(sub.id);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn sync_progress_and_mcp_status_reach_subscribers() {
        use contextd_domain::{McpHealth, McpStatusSnapshot, SyncProgress};

        let bus = EventBus::new(4, 30);
        let mut sub = bus.subscribe();

        bus.broadcast_sync_progress(SyncProgress {
            sources_total: 2,
            sources_done: 1,
            current_source: "claude".into(),
            projects_found: 3,
            done: false,
        });
        match sub.rx.recv().await.unwrap() {
            BusEvent::SyncProgress(p) => assert_eq!(p.sources_done, 1),
            other => panic!("expected SyncProgress, got {other:?}"),
        }

        bus.broadcast_mcp_status(McpStatusSnapshot::unreachable());
        match sub.rx.recv().await.unwrap() {
            BusEvent::McpStatus(s) => assert_eq!(s.status, McpHealth::Unreachable),
            other => panic!("expected McpStatus, got {other:?}"),
        }
    }
}
