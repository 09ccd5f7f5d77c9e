//! Remote connection material shared by every call to the leader cluster.
//!
//! The material is a copy-on-write snapshot: an HTTP client together with the
//! trust pool and verification flag it was built from. Logins clone the current
//! `Arc` and never block each other; the single writer builds a new snapshot and
//! swaps it in, so a reader never observes a pool from one configuration paired
//! with a flag from another.

use crate::{Error, Result};
use reqwest::{tls::Version, Certificate, Client};
use rustls::{pki_types::CertificateDer, RootCertStore};
use rustls_pemfile::certs;
use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Set of trusted CA certificates, compared by content regardless of PEM order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustPool {
    certs: Vec<CertificateDer<'static>>,
}

impl TrustPool {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse every usable certificate out of a PEM bundle.
    ///
    /// Unreadable sections and certificates that do not parse as X.509 are
    /// skipped with a warning; an empty or useless bundle yields an empty pool.
    #[must_use]
    pub fn from_pem(pem: &[u8]) -> Self {
        if pem.iter().all(u8::is_ascii_whitespace) {
            warn!("No CA certificates provided");
            return Self::empty();
        }

        let mut reader = pem;
        let mut parsed = Vec::new();
        for item in certs(&mut reader) {
            match item {
                Ok(cert) => parsed.push(cert),
                Err(e) => warn!("Skipping unreadable PEM section: {}", e),
            }
        }

        let mut probe = RootCertStore::empty();
        let total = parsed.len();
        parsed.retain(|cert| probe.add(cert.clone()).is_ok());
        if parsed.len() < total {
            warn!(
                ignored = total - parsed.len(),
                "Ignoring certificates that could not be parsed"
            );
        }

        if parsed.is_empty() {
            warn!("Provided CA certificate data does not contain valid certificates");
        }

        Self::from_certs(parsed)
    }

    #[must_use]
    pub fn from_certs(mut certs: Vec<CertificateDer<'static>>) -> Self {
        certs.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));
        certs.dedup();
        Self { certs }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CertificateDer<'static>> {
        self.certs.iter()
    }
}

/// Trust settings the current HTTP client was built with.
#[derive(Debug)]
pub struct TlsTrust {
    pool: Arc<TrustPool>,
    insecure_skip_verify: bool,
}

impl TlsTrust {
    #[must_use]
    pub fn pool(&self) -> &Arc<TrustPool> {
        &self.pool
    }

    #[must_use]
    pub fn insecure_skip_verify(&self) -> bool {
        self.insecure_skip_verify
    }
}

#[derive(Debug, Clone, Default)]
struct ConnectionSnapshot {
    http_client: Option<Client>,
    tls: Option<Arc<TlsTrust>>,
}

#[derive(Debug)]
pub struct RemoteConnectionMaterial {
    user_agent: String,
    current: RwLock<Arc<ConnectionSnapshot>>,
    // Serializes writers; readers only touch `current`.
    writer: Mutex<()>,
}

impl RemoteConnectionMaterial {
    /// Material with an empty trust pool and certificate verification enabled.
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(user_agent: &str) -> Result<Self> {
        let tls = Arc::new(TlsTrust {
            pool: Arc::new(TrustPool::empty()),
            insecure_skip_verify: false,
        });
        let http_client = build_client(user_agent, &tls)?;

        Ok(Self {
            user_agent: user_agent.to_string(),
            current: RwLock::new(Arc::new(ConnectionSnapshot {
                http_client: Some(http_client),
                tls: Some(tls),
            })),
            writer: Mutex::new(()),
        })
    }

    /// Material that has not been set up yet; every accessor fails until replaced.
    #[must_use]
    pub fn unset(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            current: RwLock::new(Arc::new(ConnectionSnapshot::default())),
            writer: Mutex::new(()),
        }
    }

    fn snapshot(&self) -> Arc<ConnectionSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// # Errors
    /// Returns `Error::Precondition` if the HTTP client or TLS trust is not set.
    pub fn validate(&self) -> Result<()> {
        let snapshot = self.snapshot();
        if snapshot.http_client.is_none() {
            return Err(Error::Precondition("HTTP client is not set".to_string()));
        }
        if snapshot.tls.is_none() {
            return Err(Error::Precondition("TLS config is not set".to_string()));
        }
        Ok(())
    }

    /// # Errors
    /// Returns `Error::Precondition` if the HTTP client is not set.
    pub fn current_http_client(&self) -> Result<Client> {
        self.snapshot()
            .http_client
            .clone()
            .ok_or_else(|| Error::Precondition("HTTP client is not set".to_string()))
    }

    /// # Errors
    /// Returns `Error::Precondition` if the TLS trust is not set.
    pub fn current_tls_config(&self) -> Result<Arc<TlsTrust>> {
        self.snapshot()
            .tls
            .clone()
            .ok_or_else(|| Error::Precondition("TLS config is not set".to_string()))
    }

    /// Rebuild trust from `ca_pem` and swap it in if it differs from what is installed.
    ///
    /// Returns `true` when a new snapshot was installed. An unchanged pool keeps
    /// its `Arc` so warm connections are not reset.
    /// # Errors
    /// Returns `Error::Precondition` if the material was never set up or the client cannot be built.
    pub async fn install(&self, ca_pem: &str, insecure_skip_verify: bool) -> Result<bool> {
        let _writer = self.writer.lock().await;

        self.validate()?;
        let installed = self.current_tls_config()?;
        let candidate = TrustPool::from_pem(ca_pem.as_bytes());

        let pool_unchanged = *installed.pool == candidate;
        if pool_unchanged && installed.insecure_skip_verify == insecure_skip_verify {
            debug!("TLS trust unchanged, skipping swap");
            return Ok(false);
        }

        let pool = if pool_unchanged {
            installed.pool.clone()
        } else {
            Arc::new(candidate)
        };
        let tls = Arc::new(TlsTrust {
            pool,
            insecure_skip_verify,
        });
        let http_client = build_client(&self.user_agent, &tls)?;
        let certificates = tls.pool.len();

        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(ConnectionSnapshot {
            http_client: Some(http_client),
            tls: Some(tls),
        });

        info!(
            certificates,
            insecure_skip_verify, "TLS trust material updated"
        );

        Ok(true)
    }
}

fn build_client(user_agent: &str, tls: &TlsTrust) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .use_rustls_tls()
        .min_tls_version(Version::TLS_1_2)
        .connect_timeout(CONNECT_TIMEOUT)
        .danger_accept_invalid_certs(tls.insecure_skip_verify);

    // A configured bundle replaces the platform roots; an empty one falls back to them.
    if !tls.pool.is_empty() {
        builder = builder.tls_built_in_root_certs(false);
        for der in tls.pool.iter() {
            let cert = Certificate::from_der(der.as_ref())
                .map_err(|e| Error::Precondition(format!("invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
    }

    builder
        .build()
        .map_err(|e| Error::Precondition(format!("failed to build HTTP client: {e}")))
}
