//! In-memory instance registry
//!
//! Instances are partitioned per service name in a [`DashMap`], so writes to
//! one service never contend with writes to another. Eviction takes a brief
//! exclusive sweep gate so readers observe the registry either entirely
//! before or entirely after a pass.

use crate::clock::{Clock, SystemClock};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::instance::{ApplyOutcome, EvictionReport, InstanceRegistry, Registration};
use crate::preservation::RenewalMeter;
use async_trait::async_trait;
use dashmap::DashMap;
use meridian_types::{
    DeltaEvent, DeltaKind, InstanceId, InstanceKey, InstanceRecord, InstanceStatus, Lease,
    RegistrySnapshot, ServiceName, ServiceSnapshot,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

type Partition = BTreeMap<InstanceId, InstanceRecord>;

/// In-memory instance registry
pub struct InMemoryInstanceRegistry {
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    partitions: DashMap<ServiceName, Partition>,
    /// Shared by every operation, exclusive for eviction passes
    sweep: RwLock<()>,
    version: AtomicU64,
    meter: RenewalMeter,
    preserving: AtomicBool,
    delta_tx: broadcast::Sender<DeltaEvent>,
}

impl InMemoryInstanceRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        let (delta_tx, _) = broadcast::channel(config.delta_buffer.max(1));
        let meter = RenewalMeter::new(config.self_preservation.clone(), clock.now());

        Self {
            config,
            clock,
            partitions: DashMap::new(),
            sweep: RwLock::new(()),
            version: AtomicU64::new(0),
            meter,
            preserving: AtomicBool::new(false),
            delta_tx,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn meter(&self) -> &RenewalMeter {
        &self.meter
    }

    /// Number of registered instances across all services
    pub fn instance_count(&self) -> usize {
        self.partitions.iter().map(|p| p.value().len()).sum()
    }

    fn bump(&self, by: u64) {
        self.version.fetch_add(by, Ordering::SeqCst);
    }

    fn publish(&self, event: DeltaEvent) {
        // No subscribers is fine: replication may be disabled.
        let _ = self.delta_tx.send(event);
    }

    fn not_found(service: &ServiceName, id: &InstanceId) -> RegistryError {
        RegistryError::NotFound(InstanceKey::new(service.clone(), id.clone()))
    }

    /// Roll the renewal meter and recompute the self-preservation flag
    fn refresh_preservation(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.meter.tick(now);
        let instances = self.instance_count();
        let active = self.meter.should_preserve(instances);
        let was_active = self.preserving.swap(active, Ordering::SeqCst);

        if active && !was_active {
            warn!(
                observed = self.meter.last_window().unwrap_or(0),
                threshold = self.meter.config().renewal_threshold(instances),
                "Renewal rate below threshold; entering self-preservation, eviction suspended"
            );
        } else if !active && was_active {
            info!("Renewal rate recovered; leaving self-preservation");
        }

        active
    }

    fn register_record(&self, registration: Registration) -> Result<InstanceRecord> {
        if registration.service.as_str().is_empty() || registration.instance_id.as_str().is_empty()
        {
            return Err(RegistryError::InvalidRegistration(
                "service name and instance id must not be empty".to_string(),
            ));
        }

        let lease_duration = registration
            .lease_duration_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config.default_lease());
        if lease_duration.is_zero() {
            return Err(RegistryError::InvalidRegistration(
                "lease duration must be positive".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut record = InstanceRecord::new(
            registration.service,
            registration.instance_id,
            registration.host,
            registration.port,
            now,
            lease_duration,
        );
        record.secure = registration.secure;
        record.status = registration.status.unwrap_or_default();
        record.metadata = registration.metadata;

        {
            let _gate = self.sweep.read();
            self.partitions
                .entry(record.service.clone())
                .or_default()
                .insert(record.instance_id.clone(), record.clone());
            self.bump(1);
        }

        info!(
            service = %record.service,
            instance_id = %record.instance_id,
            status = %record.status,
            lease_secs = record.lease.duration_secs,
            "Registered instance"
        );
        self.publish(DeltaEvent::upsert(DeltaKind::Register, &record));

        Ok(record)
    }

    fn renew_lease(&self, service: &ServiceName, id: &InstanceId) -> Result<Lease> {
        let now = self.clock.now();

        let event = {
            let _gate = self.sweep.read();
            let mut partition = self
                .partitions
                .get_mut(service)
                .ok_or_else(|| Self::not_found(service, id))?;
            let record = partition
                .get_mut(id)
                .ok_or_else(|| Self::not_found(service, id))?;
            if record.lease.is_evicted() {
                return Err(Self::not_found(service, id));
            }

            record.lease.renew(now);
            if now > record.last_updated {
                record.last_updated = now;
            }
            self.bump(1);
            DeltaEvent::upsert(DeltaKind::Renew, record)
        };

        self.meter.record_renewal();
        debug!(service = %service, instance_id = %id, "Renewed lease");

        let lease = event
            .record
            .as_ref()
            .map(|r| r.lease.clone())
            .ok_or_else(|| Self::not_found(service, id))?;
        self.publish(event);
        Ok(lease)
    }

    fn change_status(
        &self,
        service: &ServiceName,
        id: &InstanceId,
        status: InstanceStatus,
    ) -> Result<InstanceRecord> {
        let now = self.clock.now();

        let (record, changed) = {
            let _gate = self.sweep.read();
            let mut partition = self
                .partitions
                .get_mut(service)
                .ok_or_else(|| Self::not_found(service, id))?;
            let record = partition
                .get_mut(id)
                .ok_or_else(|| Self::not_found(service, id))?;

            if !record.status.can_transition_to(status) {
                return Err(RegistryError::InvalidTransition {
                    key: record.key(),
                    from: record.status,
                    to: status,
                });
            }

            let changed = record.status != status;
            if changed {
                record.status = status;
                if now > record.last_updated {
                    record.last_updated = now;
                }
                self.bump(1);
            }
            (record.clone(), changed)
        };

        if changed {
            info!(
                service = %service,
                instance_id = %id,
                status = %status,
                "Instance status changed"
            );
            self.publish(DeltaEvent::upsert(DeltaKind::Status, &record));
        }

        Ok(record)
    }

    fn remove_instance(&self, service: &ServiceName, id: &InstanceId) -> Result<InstanceRecord> {
        let now = self.clock.now();

        let removed = {
            let _gate = self.sweep.read();
            let removed = self
                .partitions
                .get_mut(service)
                .and_then(|mut partition| partition.remove(id));
            self.partitions.remove_if(service, |_, p| p.is_empty());
            if removed.is_some() {
                self.bump(1);
            }
            removed
        };

        let record = removed.ok_or_else(|| Self::not_found(service, id))?;
        info!(service = %service, instance_id = %id, "Deregistered instance");
        self.publish(DeltaEvent::removal(
            DeltaKind::Deregister,
            record.key(),
            now,
        ));

        Ok(record)
    }

    fn evict_expired(&self) -> EvictionReport {
        let now = self.clock.now();
        let preserving = self.refresh_preservation(now);
        let multiplier = self.config.expiry_multiplier;

        let mut expired = 0;
        let mut removed = Vec::new();
        {
            let _gate = self.sweep.write();
            for mut partition in self.partitions.iter_mut() {
                let stale: Vec<InstanceId> = partition
                    .values()
                    .filter(|r| r.lease.is_expired(now, multiplier))
                    .map(|r| r.instance_id.clone())
                    .collect();
                expired += stale.len();

                if preserving {
                    continue;
                }
                for id in stale {
                    if let Some(mut record) = partition.remove(&id) {
                        record.lease.evicted_at = Some(now);
                        removed.push(record);
                    }
                }
            }
            self.partitions.retain(|_, p| !p.is_empty());
            if !removed.is_empty() {
                self.bump(removed.len() as u64);
            }
        }

        if preserving && expired > 0 {
            warn!(
                expired = expired,
                "Self-preservation active; skipping eviction of expired leases"
            );
        } else if !removed.is_empty() {
            info!(evicted = removed.len(), "Evicted expired instances");
        } else {
            debug!("Eviction pass found no expired leases");
        }

        let mut evicted = Vec::with_capacity(removed.len());
        for record in removed {
            info!(
                service = %record.service,
                instance_id = %record.instance_id,
                last_renewed_at = %record.lease.last_renewed_at,
                "Evicted instance"
            );
            let key = record.key();
            self.publish(DeltaEvent::removal(DeltaKind::Evict, key.clone(), now));
            evicted.push(key);
        }

        EvictionReport {
            evicted,
            expired,
            self_preservation: preserving,
        }
    }

    fn take_snapshot(&self, service: Option<&ServiceName>) -> RegistrySnapshot {
        let now = self.clock.now();
        let multiplier = self.config.expiry_multiplier;

        let copy = |name: &ServiceName, partition: &Partition| ServiceSnapshot {
            service: name.clone(),
            instances: partition
                .values()
                .cloned()
                .map(|mut record| {
                    record.lease_expired = record.lease.is_expired(now, multiplier);
                    record
                })
                .collect(),
        };

        let _gate = self.sweep.read();
        let version = self.version.load(Ordering::SeqCst);
        let services: BTreeMap<ServiceName, ServiceSnapshot> = match service {
            Some(name) => self
                .partitions
                .get(name)
                .map(|p| (name.clone(), copy(name, p.value())))
                .into_iter()
                .collect(),
            None => self
                .partitions
                .iter()
                .map(|p| (p.key().clone(), copy(p.key(), p.value())))
                .collect(),
        };

        RegistrySnapshot {
            version,
            taken_at: Some(now),
            self_preservation: self.preserving.load(Ordering::SeqCst),
            services,
        }
    }

    fn apply_delta(&self, event: DeltaEvent) -> Result<ApplyOutcome> {
        if event.kind.is_removal() {
            if event.kind == DeltaKind::Evict && self.preserving.load(Ordering::SeqCst) {
                return Err(RegistryError::Unavailable(format!(
                    "refusing peer eviction of {} during self-preservation",
                    event.key()
                )));
            }

            let _gate = self.sweep.read();
            let removed = self
                .partitions
                .get_mut(&event.service)
                .and_then(|mut partition| {
                    let newer = partition
                        .get(&event.instance_id)
                        .map(|r| event.timestamp > r.last_updated)
                        .unwrap_or(false);
                    if newer {
                        partition.remove(&event.instance_id)
                    } else {
                        None
                    }
                });
            self.partitions.remove_if(&event.service, |_, p| p.is_empty());

            return Ok(match removed {
                Some(_) => {
                    self.bump(1);
                    ApplyOutcome::Applied
                }
                None => ApplyOutcome::Stale,
            });
        }

        let kind = event.kind;
        let timestamp = event.timestamp;
        let mut record = event.record.ok_or_else(|| {
            RegistryError::InvalidDelta(format!(
                "{:?} event for {}/{} carries no record",
                kind, event.service, event.instance_id
            ))
        })?;
        if record.service != event.service || record.instance_id != event.instance_id {
            return Err(RegistryError::InvalidDelta(format!(
                "record {} does not match event key {}/{}",
                record.key(),
                event.service,
                event.instance_id
            )));
        }
        record.last_updated = timestamp;
        record.lease_expired = false;
        record.lease.evicted_at = None;

        {
            let _gate = self.sweep.read();
            let mut partition = self.partitions.entry(event.service).or_default();
            if let Some(existing) = partition.get(&event.instance_id) {
                if existing.last_updated >= timestamp {
                    return Ok(ApplyOutcome::Stale);
                }
            }
            partition.insert(event.instance_id, record);
            self.bump(1);
        }

        if kind == DeltaKind::Renew {
            self.meter.record_renewal();
        }
        Ok(ApplyOutcome::Applied)
    }
}

#[async_trait]
impl InstanceRegistry for InMemoryInstanceRegistry {
    async fn register(&self, registration: Registration) -> Result<InstanceRecord> {
        self.register_record(registration)
    }

    async fn renew(&self, service: &ServiceName, id: &InstanceId) -> Result<Lease> {
        self.renew_lease(service, id)
    }

    async fn set_status(
        &self,
        service: &ServiceName,
        id: &InstanceId,
        status: InstanceStatus,
    ) -> Result<InstanceRecord> {
        self.change_status(service, id, status)
    }

    async fn deregister(&self, service: &ServiceName, id: &InstanceId) -> Result<InstanceRecord> {
        self.remove_instance(service, id)
    }

    async fn evict(&self) -> Result<EvictionReport> {
        Ok(self.evict_expired())
    }

    async fn snapshot(&self, service: Option<&ServiceName>) -> RegistrySnapshot {
        self.take_snapshot(service)
    }

    async fn get(&self, service: &ServiceName, id: &InstanceId) -> Option<InstanceRecord> {
        let _gate = self.sweep.read();
        self.partitions
            .get(service)
            .and_then(|partition| partition.get(id).cloned())
    }

    async fn apply_replicated(&self, event: DeltaEvent) -> Result<ApplyOutcome> {
        self.apply_delta(event)
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn is_self_preserving(&self) -> bool {
        self.preserving.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<DeltaEvent> {
        self.delta_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SelfPreservationConfig;

    fn registry() -> (Arc<InMemoryInstanceRegistry>, Arc<ManualClock>) {
        registry_with(RegistryConfig::default())
    }

    fn registry_with(config: RegistryConfig) -> (Arc<InMemoryInstanceRegistry>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let registry = Arc::new(InMemoryInstanceRegistry::with_clock(config, clock.clone()));
        (registry, clock)
    }

    fn orders() -> ServiceName {
        ServiceName::new("orders")
    }

    fn id(raw: &str) -> InstanceId {
        InstanceId::new(raw)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test]
    async fn test_register_and_snapshot() {
        let (registry, _) = registry();
        registry
            .register(Registration::new("orders", "A1", "10.0.0.1", 8080).with_metadata("zone", "a"))
            .await
            .unwrap();

        let snapshot = registry.snapshot(Some(&orders())).await;
        assert_eq!(snapshot.version, 1);
        let record = snapshot.service(&orders()).unwrap().get(&id("A1")).unwrap();
        assert_eq!(record.status, InstanceStatus::Starting);
        assert_eq!(record.metadata.get("zone").map(String::as_str), Some("a"));
        assert_eq!(record.lease.duration_secs, 30);
    }

    #[tokio::test]
    async fn test_register_overwrites() {
        let (registry, _) = registry();
        registry
            .register(Registration::new("orders", "A1", "10.0.0.1", 8080))
            .await
            .unwrap();
        registry
            .register(
                Registration::new("orders", "A1", "10.0.0.2", 9090)
                    .with_status(InstanceStatus::Up),
            )
            .await
            .unwrap();

        let snapshot = registry.snapshot(None).await;
        assert_eq!(snapshot.instance_count(), 1);
        assert_eq!(snapshot.version, 2);
        let record = registry.get(&orders(), &id("A1")).await.unwrap();
        assert_eq!(record.port, 9090);
        assert_eq!(record.status, InstanceStatus::Up);
    }

    #[tokio::test]
    async fn test_zero_lease_rejected() {
        let (registry, _) = registry();
        let err = registry
            .register(Registration::new("orders", "A1", "h", 1).with_lease(secs(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRegistration(_)));
        assert_eq!(registry.version(), 0);
    }

    #[tokio::test]
    async fn test_renew_unknown_is_not_found() {
        let (registry, _) = registry();
        let err = registry.renew(&orders(), &id("missing")).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_renew_keeps_status_and_bumps_version() {
        let (registry, clock) = registry();
        registry
            .register(Registration::new("orders", "A1", "h", 1).with_status(InstanceStatus::Up))
            .await
            .unwrap();
        registry
            .set_status(&orders(), &id("A1"), InstanceStatus::OutOfService)
            .await
            .unwrap();

        clock.advance(secs(5));
        let before = registry.version();
        let lease = registry.renew(&orders(), &id("A1")).await.unwrap();
        assert_eq!(registry.version(), before + 1);
        assert_eq!(lease.last_renewed_at, clock.now());

        let record = registry.get(&orders(), &id("A1")).await.unwrap();
        assert_eq!(record.status, InstanceStatus::OutOfService);
    }

    #[tokio::test]
    async fn test_invalid_transition() {
        let (registry, _) = registry();
        registry
            .register(Registration::new("orders", "A1", "h", 1))
            .await
            .unwrap();

        let err = registry
            .set_status(&orders(), &id("A1"), InstanceStatus::Down)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { .. }));

        registry
            .set_status(&orders(), &id("A1"), InstanceStatus::Up)
            .await
            .unwrap();
        registry
            .set_status(&orders(), &id("A1"), InstanceStatus::Down)
            .await
            .unwrap();
        let record = registry.get(&orders(), &id("A1")).await.unwrap();
        assert_eq!(record.status, InstanceStatus::Down);
    }

    #[tokio::test]
    async fn test_deregister() {
        let (registry, _) = registry();
        registry
            .register(Registration::new("orders", "A1", "h", 1))
            .await
            .unwrap();
        registry.deregister(&orders(), &id("A1")).await.unwrap();

        let snapshot = registry.snapshot(None).await;
        assert!(snapshot.services.is_empty());
        assert_eq!(snapshot.version, 2);

        let err = registry.deregister(&orders(), &id("A1")).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unrenewed_instance_is_evicted() {
        let (registry, clock) = registry();
        registry
            .register(Registration::new("orders", "A1", "h", 1).with_lease(secs(10)))
            .await
            .unwrap();

        clock.advance(secs(35));
        let report = registry.evict().await.unwrap();
        assert_eq!(report.evicted, vec![InstanceKey::new("orders", "A1")]);

        let snapshot = registry.snapshot(Some(&orders())).await;
        assert!(!snapshot.contains(&orders(), &id("A1")));
        let err = registry.renew(&orders(), &id("A1")).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_renewing_instance_survives() {
        let (registry, clock) = registry();
        registry
            .register(Registration::new("orders", "A1", "h", 1).with_lease(secs(10)))
            .await
            .unwrap();

        for _ in 0..120 {
            clock.advance(secs(5));
            registry.renew(&orders(), &id("A1")).await.unwrap();
            let report = registry.evict().await.unwrap();
            assert!(report.evicted.is_empty());
        }

        let snapshot = registry.snapshot(Some(&orders())).await;
        assert!(snapshot.contains(&orders(), &id("A1")));
    }

    #[tokio::test]
    async fn test_never_evicts_inside_window() {
        let (registry, clock) = registry();
        registry
            .register(Registration::new("orders", "A1", "h", 1).with_lease(secs(10)))
            .await
            .unwrap();

        clock.advance(secs(30));
        let report = registry.evict().await.unwrap();
        assert!(report.evicted.is_empty());
        assert_eq!(report.expired, 0);
    }

    /// Ten renewing instances, then two silent minutes; returns their ids
    /// and the report of the eviction pass that entered self-preservation.
    async fn partition(
        registry: &InMemoryInstanceRegistry,
        clock: &ManualClock,
    ) -> (Vec<String>, EvictionReport) {
        let ids: Vec<String> = (0..10).map(|i| format!("i{}", i)).collect();
        for raw in &ids {
            registry
                .register(Registration::new("orders", raw.as_str(), "h", 1).with_lease(secs(30)))
                .await
                .unwrap();
        }

        // Healthy first window: every instance renews every 10s.
        for _ in 0..6 {
            clock.advance(secs(10));
            for raw in &ids {
                registry.renew(&orders(), &id(raw)).await.unwrap();
            }
        }
        let report = registry.evict().await.unwrap();
        assert!(!report.self_preservation);

        // No renewals for two minutes.
        clock.advance(secs(60));
        registry.evict().await.unwrap();
        clock.advance(secs(80));
        let report = registry.evict().await.unwrap();
        (ids, report)
    }

    #[tokio::test]
    async fn test_self_preservation_suspends_and_resumes_eviction() {
        let (registry, clock) = registry();
        let (ids, report) = partition(&registry, &clock).await;
        assert!(report.self_preservation);
        assert_eq!(report.expired, 10);
        assert!(report.evicted.is_empty());
        assert!(registry.is_self_preserving());
        let snapshot = registry.snapshot(None).await;
        assert_eq!(snapshot.instance_count(), 10);
        assert!(snapshot.self_preservation);
        assert!(snapshot.instances().all(|r| r.lease_expired));

        // Recovery: nine instances heartbeat again, one stays silent.
        for _ in 0..6 {
            clock.advance(secs(10));
            for raw in &ids[..9] {
                registry.renew(&orders(), &id(raw)).await.unwrap();
            }
        }
        let report = registry.evict().await.unwrap();
        assert!(!report.self_preservation);
        assert_eq!(report.evicted, vec![InstanceKey::new("orders", "i9")]);
        assert!(!registry.is_self_preserving());
    }

    #[tokio::test]
    async fn test_peer_eviction_refused_during_self_preservation() {
        let (registry, clock) = registry();
        partition(&registry, &clock).await;
        assert!(registry.is_self_preserving());
        let version = registry.version();

        let evict = DeltaEvent::removal(
            DeltaKind::Evict,
            InstanceKey::new("orders", "i0"),
            clock.now() + chrono::Duration::seconds(1),
        );
        let result = registry.apply_replicated(evict).await;
        assert!(matches!(result, Err(RegistryError::Unavailable(_))));
        assert!(registry.get(&orders(), &id("i0")).await.is_some());
        assert_eq!(registry.version(), version);

        // Explicit deregistrations from a peer still apply.
        let cancel = DeltaEvent::removal(
            DeltaKind::Deregister,
            InstanceKey::new("orders", "i1"),
            clock.now() + chrono::Duration::seconds(1),
        );
        assert_eq!(
            registry.apply_replicated(cancel).await.unwrap(),
            ApplyOutcome::Applied
        );
        assert!(registry.get(&orders(), &id("i1")).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_are_not_lost() {
        let (registry, _) = registry();
        let mut handles = Vec::new();
        for i in 0..64 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .register(Registration::new("orders", format!("i{}", i), "h", 1))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = registry.snapshot(Some(&orders())).await;
        assert_eq!(snapshot.instance_count(), 64);
        assert_eq!(snapshot.version, 64);
    }

    #[tokio::test]
    async fn test_mutations_publish_deltas() {
        let (registry, clock) = registry();
        let mut rx = registry.subscribe();

        registry
            .register(Registration::new("orders", "A1", "h", 1).with_lease(secs(10)))
            .await
            .unwrap();
        registry.renew(&orders(), &id("A1")).await.unwrap();
        clock.advance(secs(40));
        registry.evict().await.unwrap();

        let kinds: Vec<DeltaKind> = (0..3).map(|_| rx.try_recv().unwrap().kind).collect();
        assert_eq!(
            kinds,
            vec![DeltaKind::Register, DeltaKind::Renew, DeltaKind::Evict]
        );
    }

    #[tokio::test]
    async fn test_replicated_deltas_are_last_writer_wins() {
        let (origin, origin_clock) = registry();
        let (replica, _) = registry();
        let mut replica_rx = replica.subscribe();

        let record = origin
            .register(Registration::new("orders", "A1", "h", 1))
            .await
            .unwrap();
        let older = DeltaEvent::upsert(DeltaKind::Register, &record);

        origin_clock.advance(secs(1));
        let updated = origin
            .set_status(&orders(), &id("A1"), InstanceStatus::Up)
            .await
            .unwrap();
        let newer = DeltaEvent::upsert(DeltaKind::Status, &updated);

        assert_eq!(
            replica.apply_replicated(newer).await.unwrap(),
            ApplyOutcome::Applied
        );
        assert_eq!(
            replica.apply_replicated(older).await.unwrap(),
            ApplyOutcome::Stale
        );
        let local = replica.get(&orders(), &id("A1")).await.unwrap();
        assert_eq!(local.status, InstanceStatus::Up);

        // Replicated applies are not re-published.
        assert!(replica_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_replicated_renewal_materializes_unknown_instance() {
        let (origin, _) = registry();
        let (replica, _) = registry();

        origin
            .register(Registration::new("orders", "A1", "h", 1))
            .await
            .unwrap();
        origin.renew(&orders(), &id("A1")).await.unwrap();
        let record = origin.get(&orders(), &id("A1")).await.unwrap();

        let outcome = replica
            .apply_replicated(DeltaEvent::upsert(DeltaKind::Renew, &record))
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert!(replica.get(&orders(), &id("A1")).await.is_some());
    }

    #[tokio::test]
    async fn test_replicated_removal_requires_newer_timestamp() {
        let (replica, clock) = registry();
        let record = replica
            .register(Registration::new("orders", "A1", "h", 1))
            .await
            .unwrap();

        let old = DeltaEvent::removal(
            DeltaKind::Deregister,
            record.key(),
            record.last_updated - chrono::Duration::seconds(1),
        );
        assert_eq!(
            replica.apply_replicated(old).await.unwrap(),
            ApplyOutcome::Stale
        );

        clock.advance(secs(1));
        let fresh = DeltaEvent::removal(DeltaKind::Deregister, record.key(), clock.now());
        assert_eq!(
            replica.apply_replicated(fresh).await.unwrap(),
            ApplyOutcome::Applied
        );
        assert!(replica.get(&orders(), &id("A1")).await.is_none());
    }

    #[tokio::test]
    async fn test_upsert_without_record_is_invalid() {
        let (replica, clock) = registry();
        let mut event =
            DeltaEvent::removal(DeltaKind::Renew, InstanceKey::new("orders", "A1"), clock.now());
        event.record = None;
        let err = replica.apply_replicated(event).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDelta(_)));
    }

    #[tokio::test]
    async fn test_disabled_preservation_always_evicts() {
        let config = RegistryConfig {
            self_preservation: SelfPreservationConfig::disabled(),
            ..RegistryConfig::default()
        };
        let (registry, clock) = registry_with(config);
        for i in 0..10 {
            registry
                .register(Registration::new("orders", format!("i{}", i), "h", 1).with_lease(secs(10)))
                .await
                .unwrap();
        }
        clock.advance(secs(120));
        registry.evict().await.unwrap();
        clock.advance(secs(60));
        let report = registry.evict().await.unwrap();
        assert!(!report.self_preservation);
        assert_eq!(registry.snapshot(None).await.instance_count(), 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Register(InstanceStatus),
            Renew,
            SetStatus(InstanceStatus),
            Deregister,
        }

        fn status() -> impl Strategy<Value = InstanceStatus> {
            prop_oneof![
                Just(InstanceStatus::Starting),
                Just(InstanceStatus::Up),
                Just(InstanceStatus::Down),
                Just(InstanceStatus::OutOfService),
                Just(InstanceStatus::Unknown),
            ]
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                status().prop_map(Op::Register),
                Just(Op::Renew),
                Just(Op::Renew),
                status().prop_map(Op::SetStatus),
                Just(Op::Deregister),
            ]
        }

        proptest! {
            #[test]
            fn final_status_is_last_explicit_status(ops in proptest::collection::vec(op(), 1..40)) {
                let (registry, clock) = registry();
                let service = orders();
                let instance = id("A1");
                let mut expected: Option<InstanceStatus> = None;

                for op in ops {
                    clock.advance(secs(1));
                    match op {
                        Op::Register(s) => {
                            registry
                                .register_record(Registration::new("orders", "A1", "h", 1).with_status(s))
                                .unwrap();
                            expected = Some(s);
                        }
                        Op::Renew => {
                            let result = registry.renew_lease(&service, &instance);
                            prop_assert_eq!(result.is_ok(), expected.is_some());
                        }
                        Op::SetStatus(s) => {
                            let result = registry.change_status(&service, &instance, s);
                            match expected {
                                Some(current) if current.can_transition_to(s) => {
                                    prop_assert!(result.is_ok());
                                    expected = Some(s);
                                }
                                _ => prop_assert!(result.is_err()),
                            }
                        }
                        Op::Deregister => {
                            let result = registry.remove_instance(&service, &instance);
                            prop_assert_eq!(result.is_ok(), expected.is_some());
                            expected = None;
                        }
                    }
                }

                let snapshot = registry.take_snapshot(Some(&service));
                let actual = snapshot
                    .service(&service)
                    .and_then(|s| s.get(&instance))
                    .map(|r| r.status);
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
