//! Delta fan-out and per-peer batch senders

use crate::config::ReplicationConfig;
use crate::error::{ReplicationError, Result};
use crate::transport::{PeerEndpoint, PeerTransport};
use crate::apply::BatchAck;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use meridian_registry::InstanceRegistry;
use meridian_types::{DeltaBatch, DeltaEvent};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Delivery statistics for one peer
#[derive(Debug, Clone, Default, Serialize)]
pub struct PeerHealth {
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub delivered: u64,
    pub dropped: u64,
}

type HealthMap = Arc<DashMap<PeerEndpoint, PeerHealth>>;

/// Propagates local registry mutations to configured peers
pub struct Replicator {
    registry: Arc<dyn InstanceRegistry>,
    transport: Arc<dyn PeerTransport>,
    config: ReplicationConfig,
    peers: Vec<PeerEndpoint>,
    health: HealthMap,
}

impl Replicator {
    pub fn new(
        registry: Arc<dyn InstanceRegistry>,
        transport: Arc<dyn PeerTransport>,
        config: ReplicationConfig,
    ) -> Result<Self> {
        let peers = config
            .peers
            .iter()
            .map(|raw| PeerEndpoint::parse(raw))
            .collect::<Result<Vec<_>>>()?;

        let health: HealthMap = Arc::new(DashMap::new());
        for peer in &peers {
            health.insert(peer.clone(), PeerHealth::default());
        }

        Ok(Self {
            registry,
            transport,
            config,
            peers,
            health,
        })
    }

    pub fn peers(&self) -> &[PeerEndpoint] {
        &self.peers
    }

    /// Delivery statistics keyed by peer URL
    pub fn peer_health(&self) -> Vec<(String, PeerHealth)> {
        let mut health: Vec<_> = self
            .health
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().clone()))
            .collect();
        health.sort_by(|a, b| a.0.cmp(&b.0));
        health
    }

    /// Start the dispatcher and one worker per peer.
    ///
    /// With no peers this is the single-node case and nothing is spawned.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        if self.peers.is_empty() {
            info!("No replication peers configured; running single-node");
            return Vec::new();
        }

        // Subscribe before spawning so no mutation is missed.
        let deltas = self.registry.subscribe();
        let mut handles = Vec::with_capacity(self.peers.len() + 1);
        let mut senders = Vec::with_capacity(self.peers.len());

        for peer in &self.peers {
            let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
            senders.push((peer.clone(), tx));

            let worker = PeerWorker::new(
                peer.clone(),
                self.transport.clone(),
                self.config.clone(),
                rx,
                self.health.clone(),
            );
            handles.push(tokio::spawn(worker.run(shutdown.clone())));
        }

        handles.push(tokio::spawn(dispatch(
            deltas,
            senders,
            self.health.clone(),
            shutdown,
        )));

        info!(peers = self.peers.len(), "Replication started");
        handles
    }
}

/// Copy every local delta into each peer's queue
async fn dispatch(
    mut deltas: broadcast::Receiver<DeltaEvent>,
    senders: Vec<(PeerEndpoint, mpsc::Sender<DeltaEvent>)>,
    health: HealthMap,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = deltas.recv() => match received {
                Ok(event) => {
                    for (peer, tx) in &senders {
                        if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event.clone()) {
                            warn!(peer = %peer, "Replication queue full; dropping delta");
                            if let Some(mut h) = health.get_mut(peer) {
                                h.dropped += 1;
                            }
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Replication dispatcher lagged; deltas dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!("Replication dispatcher stopped");
}

struct RetryBatch {
    events: Vec<DeltaEvent>,
    attempts: u32,
}

#[derive(Debug, PartialEq, Eq)]
enum FlushOutcome {
    Idle,
    Delivered(BatchAck),
    Retrying,
    Dropped(usize),
}

/// Batches and sends deltas to a single peer
struct PeerWorker {
    peer: PeerEndpoint,
    transport: Arc<dyn PeerTransport>,
    config: ReplicationConfig,
    rx: mpsc::Receiver<DeltaEvent>,
    pending: VecDeque<DeltaEvent>,
    retry: Option<RetryBatch>,
    health: HealthMap,
}

impl PeerWorker {
    fn new(
        peer: PeerEndpoint,
        transport: Arc<dyn PeerTransport>,
        config: ReplicationConfig,
        rx: mpsc::Receiver<DeltaEvent>,
        health: HealthMap,
    ) -> Self {
        Self {
            peer,
            transport,
            config,
            rx,
            pending: VecDeque::new(),
            retry: None,
            health,
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.batch_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                _ = shutdown.changed() => break,
            }
        }

        // One last bounded attempt so clean shutdowns propagate deregistrations.
        self.flush().await;
        debug!(peer = %self.peer, "Replication worker stopped");
    }

    /// Move queued deltas into `pending`, never holding more than `queue_capacity`.
    ///
    /// Anything left behind stays in the channel, where the dispatcher drops
    /// and counts overflow.
    fn drain(&mut self) {
        let room = self.config.queue_capacity.max(1).saturating_sub(self.pending.len());
        for _ in 0..room {
            match self.rx.try_recv() {
                Ok(event) => self.pending.push_back(event),
                Err(_) => break,
            }
        }
    }

    async fn flush(&mut self) -> FlushOutcome {
        self.drain();

        let (events, attempts) = match self.retry.take() {
            Some(retry) => (retry.events, retry.attempts),
            None => {
                if self.pending.is_empty() {
                    return FlushOutcome::Idle;
                }
                let n = self.pending.len().min(self.config.max_batch.max(1));
                (self.pending.drain(..n).collect(), 0)
            }
        };

        let batch = DeltaBatch { events };
        let timeout = self.config.send_timeout();
        let result = match tokio::time::timeout(timeout, self.transport.send(&self.peer, &batch)).await
        {
            Ok(result) => result,
            Err(_) => Err(ReplicationError::Timeout {
                peer: self.peer.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(ack) => {
                debug!(
                    peer = %self.peer,
                    events = batch.events.len(),
                    applied = ack.applied,
                    stale = ack.stale,
                    rejected = ack.rejected,
                    "Delivered replication batch"
                );
                if let Some(mut h) = self.health.get_mut(&self.peer) {
                    h.last_success = Some(Utc::now());
                    h.consecutive_failures = 0;
                    h.delivered += batch.events.len() as u64;
                }
                FlushOutcome::Delivered(ack)
            }
            Err(e) => {
                let attempts = attempts + 1;
                if let Some(mut h) = self.health.get_mut(&self.peer) {
                    h.consecutive_failures += 1;
                }

                if attempts > self.config.retry_limit {
                    let dropped = batch.events.len();
                    warn!(
                        peer = %self.peer,
                        error = %e,
                        dropped = dropped,
                        "Replication batch failed; dropping"
                    );
                    if let Some(mut h) = self.health.get_mut(&self.peer) {
                        h.dropped += dropped as u64;
                    }
                    FlushOutcome::Dropped(dropped)
                } else {
                    warn!(
                        peer = %self.peer,
                        error = %e,
                        attempt = attempts,
                        "Replication batch failed; retrying next cycle"
                    );
                    self.retry = Some(RetryBatch {
                        events: batch.events,
                        attempts,
                    });
                    FlushOutcome::Retrying
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_batch;
    use async_trait::async_trait;
    use meridian_registry::{InMemoryInstanceRegistry, Registration, RegistryConfig};
    use meridian_types::{DeltaKind, InstanceId, InstanceRecord, ServiceName};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MockTransport {
        sent: Mutex<Vec<DeltaBatch>>,
        fail: AtomicBool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl PeerTransport for MockTransport {
        async fn send(&self, peer: &PeerEndpoint, batch: &DeltaBatch) -> Result<BatchAck> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ReplicationError::Unreachable {
                    peer: peer.to_string(),
                    message: "connection refused".into(),
                });
            }
            self.sent.lock().unwrap().push(batch.clone());
            Ok(BatchAck {
                applied: batch.events.len(),
                ..Default::default()
            })
        }
    }

    /// Applies batches straight into another in-process registry
    struct LocalTransport {
        target: Arc<InMemoryInstanceRegistry>,
    }

    #[async_trait]
    impl PeerTransport for LocalTransport {
        async fn send(&self, _peer: &PeerEndpoint, batch: &DeltaBatch) -> Result<BatchAck> {
            Ok(apply_batch(self.target.as_ref(), batch.clone()).await)
        }
    }

    fn event(id: &str) -> DeltaEvent {
        let record = InstanceRecord::new(
            "orders",
            id,
            "h",
            1,
            Utc::now(),
            Duration::from_secs(30),
        );
        DeltaEvent::upsert(DeltaKind::Register, &record)
    }

    fn worker(
        transport: Arc<dyn PeerTransport>,
        config: ReplicationConfig,
    ) -> (PeerWorker, mpsc::Sender<DeltaEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let peer = PeerEndpoint::parse("http://peer:8761").unwrap();
        let health: HealthMap = Arc::new(DashMap::new());
        health.insert(peer.clone(), PeerHealth::default());
        (PeerWorker::new(peer, transport, config, rx, health), tx)
    }

    #[tokio::test]
    async fn test_flush_respects_max_batch() {
        let transport = Arc::new(MockTransport::default());
        let config = ReplicationConfig {
            max_batch: 2,
            ..Default::default()
        };
        let (mut worker, tx) = worker(transport.clone(), config);
        for id in ["a", "b", "c"] {
            tx.send(event(id)).await.unwrap();
        }

        assert!(matches!(worker.flush().await, FlushOutcome::Delivered(_)));
        assert!(matches!(worker.flush().await, FlushOutcome::Delivered(_)));
        assert_eq!(worker.flush().await, FlushOutcome::Idle);

        let sizes: Vec<usize> = transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.events.len())
            .collect();
        assert_eq!(sizes, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_pending_stays_bounded_while_peer_down() {
        let transport = Arc::new(MockTransport::default());
        transport.fail.store(true, Ordering::SeqCst);
        let config = ReplicationConfig {
            max_batch: 4,
            queue_capacity: 16,
            ..Default::default()
        };
        let (mut worker, tx) = worker(transport.clone(), config);

        for round in 0..100 {
            for n in 0..16 {
                // A full channel is the dispatcher's overflow case.
                let _ = tx.try_send(event(&format!("i{}-{}", round, n)));
            }
            worker.flush().await;
            assert!(worker.pending.len() <= 16, "pending grew to {}", worker.pending.len());
        }

        let health = worker.health.get(&worker.peer).unwrap().clone();
        assert!(health.dropped > 0);
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_is_retried_then_dropped() {
        let transport = Arc::new(MockTransport::default());
        transport.fail.store(true, Ordering::SeqCst);
        let (mut worker, tx) = worker(transport.clone(), ReplicationConfig::default());
        tx.send(event("a")).await.unwrap();

        assert_eq!(worker.flush().await, FlushOutcome::Retrying);
        assert_eq!(worker.flush().await, FlushOutcome::Dropped(1));

        transport.fail.store(false, Ordering::SeqCst);
        assert_eq!(worker.flush().await, FlushOutcome::Idle);
        let health = worker.health.get(&worker.peer).unwrap().clone();
        assert_eq!(health.dropped, 1);
        assert_eq!(health.consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_next_cycle() {
        let transport = Arc::new(MockTransport::default());
        transport.fail.store(true, Ordering::SeqCst);
        let (mut worker, tx) = worker(transport.clone(), ReplicationConfig::default());
        tx.send(event("a")).await.unwrap();

        assert_eq!(worker.flush().await, FlushOutcome::Retrying);
        transport.fail.store(false, Ordering::SeqCst);
        assert!(matches!(worker.flush().await, FlushOutcome::Delivered(_)));
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_peer_times_out() {
        let transport = Arc::new(MockTransport {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let (mut worker, tx) = worker(transport.clone(), ReplicationConfig::default());
        tx.send(event("a")).await.unwrap();

        let started = tokio::time::Instant::now();
        assert_eq!(worker.flush().await, FlushOutcome::Retrying);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registrations_reach_peer() {
        let origin = Arc::new(InMemoryInstanceRegistry::new(RegistryConfig::default()));
        let replica = Arc::new(InMemoryInstanceRegistry::new(RegistryConfig::default()));
        let transport = Arc::new(LocalTransport {
            target: replica.clone(),
        });
        let config = ReplicationConfig {
            peers: vec!["http://replica:8761".into()],
            ..Default::default()
        };
        let replicator = Replicator::new(origin.clone(), transport, config).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = replicator.spawn(shutdown_rx);
        assert_eq!(handles.len(), 2);

        origin
            .register(Registration::new("orders", "A1", "h", 1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let service = ServiceName::new("orders");
        let id = InstanceId::new("A1");
        assert!(replica.get(&service, &id).await.is_some());

        origin.deregister(&service, &id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(replica.get(&service, &id).await.is_none());

        shutdown_tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
        let health = replicator.peer_health();
        assert_eq!(health[0].1.delivered, 2);
    }

    #[test]
    fn test_invalid_peer_rejected() {
        let registry = Arc::new(InMemoryInstanceRegistry::new(RegistryConfig::default()));
        let config = ReplicationConfig {
            peers: vec!["not-a-url".into()],
            ..Default::default()
        };
        let result = Replicator::new(registry, Arc::new(MockTransport::default()), config);
        assert!(matches!(result, Err(ReplicationError::InvalidEndpoint(_))));
    }
}
