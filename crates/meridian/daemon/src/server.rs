//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::auth::{AccessGate, StaticCredentials};
use crate::api::rest::state::{AppState, HttpLimits};
use crate::config::{BackendConfig, DaemonConfig, SecurityConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::scheduler::Evictor;
use meridian_config_store::{
    ConfigBackend, ConfigResolver, FileSystemBackend, GitBackend, InMemoryBackend,
};
use meridian_registry::InMemoryInstanceRegistry;
use meridian_replication::{HttpPeerTransport, PeerCredentials, Replicator};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Meridian daemon server
pub struct Server {
    config: DaemonConfig,
    registry: Arc<InMemoryInstanceRegistry>,
    replicator: Option<Arc<Replicator>>,
    state: AppState,
}

impl Server {
    /// Build every component; fails when the config store is required and unreadable
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let registry = Arc::new(InMemoryInstanceRegistry::new(config.registry.clone()));

        let resolver = Arc::new(ConfigResolver::new(
            build_backend(&config.config_store.backend),
            config.config_store.resolver_config(),
        ));
        match resolver.probe().await {
            Ok(revision) => tracing::info!(
                backend = resolver.backend_kind(),
                label = %config.config_store.default_label,
                revision = %revision,
                "Config store ready"
            ),
            Err(e) if config.config_store.required_at_boot => return Err(e.into()),
            Err(e) => tracing::warn!(
                backend = resolver.backend_kind(),
                error = %e,
                "Config store not readable, continuing"
            ),
        }

        let mut security = config.security.clone();
        let gate = build_gate(&mut security);

        let replicator = if config.replication.is_enabled() {
            let credentials = security.enabled.then(|| PeerCredentials {
                username: security.username.clone(),
                password: security.password.clone().unwrap_or_default(),
            });
            let transport = Arc::new(HttpPeerTransport::new(
                config.replication.send_timeout(),
                credentials,
            )?);
            Some(Arc::new(Replicator::new(
                registry.clone(),
                transport,
                config.replication.clone(),
            )?))
        } else {
            None
        };

        let mut state = AppState::new(registry.clone(), resolver, gate).with_limits(HttpLimits {
            request_timeout: config.server.request_timeout(),
            max_body_size: config.server.max_body_size,
        });
        if let Some(replicator) = &replicator {
            state = state.with_replicator(replicator.clone());
        }

        Ok(Self {
            config,
            registry,
            replicator,
            state,
        })
    }

    /// Shared state handed to the router
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind the configured address and serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `signal` resolves
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> DaemonResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut tasks = vec![Evictor::new(
            self.registry.clone(),
            self.config.registry.eviction_interval(),
        )
        .spawn(shutdown_rx.clone())];

        if let Some(replicator) = &self.replicator {
            tasks.extend(replicator.spawn(shutdown_rx.clone()));
        }

        let app = create_router(self.state);

        tracing::info!("Meridian daemon listening on {}", addr);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| DaemonError::Server(e.to_string()));

        tracing::info!("Meridian daemon shutting down");

        let _ = shutdown_tx.send(true);
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }

        served
    }
}

fn build_backend(config: &BackendConfig) -> Arc<dyn ConfigBackend> {
    match config {
        BackendConfig::Filesystem { root } => Arc::new(FileSystemBackend::new(root.clone())),
        BackendConfig::Git { repository } => Arc::new(GitBackend::new(repository.clone())),
        BackendConfig::Memory => Arc::new(InMemoryBackend::new()),
    }
}

/// Build the access gate, generating a password when none is configured
fn build_gate(security: &mut SecurityConfig) -> AccessGate {
    if !security.enabled {
        tracing::warn!("Access control disabled; every route is public");
        return AccessGate::disabled();
    }

    let password = match &security.password {
        Some(password) => password.clone(),
        None => {
            let generated = uuid::Uuid::new_v4().simple().to_string();
            tracing::warn!(
                username = %security.username,
                "No password configured, using generated password: {}",
                generated
            );
            security.password = Some(generated.clone());
            generated
        }
    };

    AccessGate::new(
        Arc::new(StaticCredentials::new(security.username.clone(), password)),
        security.public_paths.clone(),
        security.check_timeout(),
    )
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
