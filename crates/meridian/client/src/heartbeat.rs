//! Instance-side heartbeat agent
//!
//! Registers one instance, renews its lease on an interval, registers again
//! when the server has forgotten it (404 on renew) and deregisters on
//! shutdown.

use crate::client::MeridianClient;
use crate::error::{ClientError, Result};
use meridian_types::{InstanceId, RegisterRequest, ServiceName};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct HeartbeatAgent {
    client: Arc<MeridianClient>,
    service: ServiceName,
    instance_id: InstanceId,
    registration: RegisterRequest,
    interval: Duration,
}

impl HeartbeatAgent {
    pub fn new(
        client: Arc<MeridianClient>,
        service: impl Into<ServiceName>,
        instance_id: impl Into<InstanceId>,
        registration: RegisterRequest,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            service: service.into(),
            instance_id: instance_id.into(),
            registration,
            interval,
        }
    }

    async fn register(&self) -> Result<()> {
        self.client
            .register(&self.service, &self.instance_id, &self.registration)
            .await?;
        info!(
            service = %self.service,
            instance_id = %self.instance_id,
            "Registered instance"
        );
        Ok(())
    }

    /// One heartbeat: renew, or register when the server does not know us
    async fn beat(&self, registered: &mut bool) {
        if !*registered {
            match self.register().await {
                Ok(()) => *registered = true,
                Err(e) => warn!(service = %self.service, error = %e, "Registration failed"),
            }
            return;
        }

        match self.client.renew(&self.service, &self.instance_id).await {
            Ok(lease) => debug!(
                service = %self.service,
                instance_id = %self.instance_id,
                renewed_at = %lease.last_renewed_at,
                "Lease renewed"
            ),
            Err(ClientError::NotRegistered(_)) => {
                warn!(
                    service = %self.service,
                    instance_id = %self.instance_id,
                    "Server lost registration; registering again"
                );
                *registered = false;
                if self.register().await.is_ok() {
                    *registered = true;
                }
            }
            Err(e) => warn!(service = %self.service, error = %e, "Lease renewal failed"),
        }
    }

    /// Heartbeat until `shutdown` fires, then deregister
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut registered = false;

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.beat(&mut registered).await,
                    _ = shutdown.changed() => break,
                }
            }

            if registered {
                if let Err(e) = self
                    .client
                    .deregister(&self.service, &self.instance_id)
                    .await
                {
                    warn!(service = %self.service, error = %e, "Deregistration failed");
                }
            }
        })
    }
}
