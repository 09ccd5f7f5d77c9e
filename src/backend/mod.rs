//! The authentication backend: configuration and role records, the login
//! pipeline, and the trust material updater that runs alongside them.

pub mod config;
pub mod login;
pub mod mint;
pub mod policy;
pub mod resolver;
pub mod role;
pub mod storage;
pub mod updater;

pub use config::{BackendConfiguration, ConfigRequest};
pub use login::{LoginRequest, LoginStage, LookaheadRequest};
pub use mint::{Alias, Credential};
pub use resolver::LoginMethod;
pub use role::{RolePolicy, RoleRequest, RoleWrite, TokenParameters, TokenType};
pub use storage::{FileStorage, InmemStorage, Storage};
pub use updater::{RefreshOutcome, TrustMaterialUpdater, DEFAULT_REFRESH_PERIOD};

use crate::{
    vault::{LeaderClient, RemoteConnectionMaterial, REQUEST_TIMEOUT},
    Error, Result,
};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Default ceiling for token lifetimes, `768h`.
pub const DEFAULT_MAX_LEASE_TTL: Duration = Duration::from_secs(768 * 60 * 60);

#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Token presented to the leader on lookup calls.
    pub leader_token: Option<SecretString>,
    pub max_lease_ttl: Duration,
    pub tls_refresh_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            leader_token: None,
            max_lease_ttl: DEFAULT_MAX_LEASE_TTL,
            tls_refresh_interval: DEFAULT_REFRESH_PERIOD,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub struct Backend {
    storage: Arc<dyn Storage>,
    material: Arc<RemoteConnectionMaterial>,
    updater: TrustMaterialUpdater,
    records: Arc<RwLock<()>>,
    settings: BackendSettings,
}

impl Backend {
    /// # Errors
    /// Returns an error if the shared HTTP client cannot be built.
    pub fn new(storage: Arc<dyn Storage>, settings: BackendSettings) -> Result<Self> {
        let material = Arc::new(RemoteConnectionMaterial::new(crate::APP_USER_AGENT)?);
        Ok(Self::with_material(storage, material, settings))
    }

    #[must_use]
    pub fn with_material(
        storage: Arc<dyn Storage>,
        material: Arc<RemoteConnectionMaterial>,
        settings: BackendSettings,
    ) -> Self {
        let records = Arc::new(RwLock::new(()));
        let updater = TrustMaterialUpdater::new(storage.clone(), material.clone(), records.clone());
        Self {
            storage,
            material,
            updater,
            records,
            settings,
        }
    }

    /// Start the trust material updater.
    /// # Errors
    /// Returns `Error::Precondition` if the connection material is not set up.
    pub async fn setup(&self) -> Result<()> {
        self.updater.start(self.settings.tls_refresh_interval).await
    }

    pub async fn cleanup(&self) {
        self.updater.stop().await;
        debug!("backend cleanup complete");
    }

    #[must_use]
    pub fn material(&self) -> &Arc<RemoteConnectionMaterial> {
        &self.material
    }

    #[must_use]
    pub fn updater(&self) -> &TrustMaterialUpdater {
        &self.updater
    }

    #[must_use]
    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn leader_client(&self, config: &BackendConfiguration) -> Result<LeaderClient> {
        Ok(LeaderClient::new(
            self.material.current_http_client()?,
            &config.cluster,
            &config.namespace,
        )
        .with_token(self.settings.leader_token.clone())
        .with_timeout(self.settings.request_timeout))
    }

    /// # Errors
    /// Returns `Error::Storage` if the record cannot be read.
    pub async fn read_config(&self) -> Result<Option<BackendConfiguration>> {
        let _records = self.records.read().await;
        config::load(self.storage.as_ref()).await
    }

    /// Validate and persist the configuration, applying its trust material first.
    ///
    /// If the record cannot be written, the previously stored trust material is put back.
    /// # Errors
    /// Returns `Error::InvalidRequest` for a bad request, or an error if the
    /// trust material cannot be applied or the record cannot be written.
    #[instrument(skip(self, request))]
    pub async fn write_config(&self, request: ConfigRequest) -> Result<BackendConfiguration> {
        let config = BackendConfiguration::from_request(request)?;

        let _records = self.records.write().await;
        let previous = config::load(self.storage.as_ref()).await?;
        self.material
            .install(&config.ca_cert, config.insecure_skip_verify)
            .await?;

        if let Err(e) = config::store(self.storage.as_ref(), &config).await {
            // Live trust must match what is stored.
            let (ca_cert, insecure) = previous
                .as_ref()
                .map_or(("", false), |p| (p.ca_cert.as_str(), p.insecure_skip_verify));
            if let Err(restore) = self.material.install(ca_cert, insecure).await {
                warn!(error = %restore, "could not restore previous TLS config");
            }
            return Err(e);
        }

        info!(cluster = %config.cluster, namespace = %config.namespace, "configuration updated");
        Ok(config)
    }

    /// # Errors
    /// Returns `Error::InvalidRequest` for an invalid name or `Error::Storage` on read failure.
    pub async fn read_role(&self, name: &str) -> Result<Option<RolePolicy>> {
        let name = role::normalize_name(name)?;
        let _records = self.records.read().await;
        role::load(self.storage.as_ref(), &name).await
    }

    /// Create the role if absent, otherwise merge the supplied fields into it.
    /// # Errors
    /// Returns `Error::InvalidRequest` for an invalid name or request, `Error::Storage` on storage failure.
    #[instrument(skip(self, request))]
    pub async fn write_role(&self, name: &str, request: &RoleRequest) -> Result<RoleWrite> {
        let name = role::normalize_name(name)?;

        let _records = self.records.write().await;
        let existing = role::load(self.storage.as_ref(), &name).await?;
        let write = role::apply(existing, request, self.settings.max_lease_ttl)?;
        role::store(self.storage.as_ref(), &name, &write.role).await?;

        info!(role = %name, created = write.created, "role saved");
        Ok(write)
    }

    /// # Errors
    /// Returns `Error::InvalidRequest` for an invalid name or `Error::Storage` on failure.
    #[instrument(skip(self))]
    pub async fn delete_role(&self, name: &str) -> Result<()> {
        let name = role::normalize_name(name)?;
        let _records = self.records.write().await;
        role::delete(self.storage.as_ref(), &name).await?;
        info!(role = %name, "role deleted");
        Ok(())
    }

    /// # Errors
    /// Returns `Error::Storage` if the listing fails.
    pub async fn list_roles(&self) -> Result<Vec<String>> {
        let _records = self.records.read().await;
        role::list(self.storage.as_ref()).await
    }

    /// # Errors
    /// Returns `Error::InvalidRequest` for an invalid name or `Error::Storage` on read failure.
    pub async fn role_exists(&self, name: &str) -> Result<bool> {
        Ok(self.read_role(name).await?.is_some())
    }

    async fn login_records(&self, role_name: &str) -> Result<(RolePolicy, Option<BackendConfiguration>)> {
        let _records = self.records.read().await;
        let role = role::load(self.storage.as_ref(), role_name)
            .await?
            .ok_or(Error::RoleNotFound)?;
        let config = config::load(self.storage.as_ref()).await?;
        Ok((role, config))
    }
}
