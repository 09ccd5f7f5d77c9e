use crate::{
    api::{self, AdminToken},
    backend::{Backend, BackendSettings, FileStorage, InmemStorage, Storage},
    cli::{globals::GlobalArgs, telemetry},
};
use anyhow::{Context, Result};
use std::{fmt::Write as _, path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub storage_dir: Option<PathBuf>,
    pub tls_refresh_interval: Duration,
    pub request_timeout: Duration,
    pub max_lease_ttl: Duration,
    pub globals: GlobalArgs,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the backend cannot start or the listener fails.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let storage: Arc<dyn Storage> = match &args.storage_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("could not create storage dir {}", dir.display()))?;
            Arc::new(FileStorage::new(dir.clone()))
        }
        None => {
            warn!("no storage dir configured, records will not survive a restart");
            Arc::new(InmemStorage::new())
        }
    };

    let settings = BackendSettings {
        leader_token: args.globals.leader_token,
        max_lease_ttl: args.max_lease_ttl,
        tls_refresh_interval: args.tls_refresh_interval,
        request_timeout: args.request_timeout,
    };

    let backend = Arc::new(Backend::new(storage, settings).context("could not build backend")?);
    backend
        .setup()
        .await
        .context("could not start trust material updater")?;

    let served = api::serve(
        args.port,
        backend.clone(),
        AdminToken::new(args.globals.admin_token),
        shutdown_signal(),
    )
    .await;

    backend.cleanup().await;
    telemetry::shutdown_tracer();

    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("could not listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "storage",
            args.storage_dir
                .as_ref()
                .map_or_else(|| "memory".to_string(), |d| d.display().to_string()),
        ),
        (
            "tls_refresh_interval",
            humantime::format_duration(args.tls_refresh_interval).to_string(),
        ),
        (
            "request_timeout",
            humantime::format_duration(args.request_timeout).to_string(),
        ),
        (
            "max_lease_ttl",
            humantime::format_duration(args.max_lease_ttl).to_string(),
        ),
        (
            "leader_token_set",
            args.globals.leader_token.is_some().to_string(),
        ),
        (
            "admin_token_set",
            args.globals.admin_token.is_some().to_string(),
        ),
    ];
    info!("{}", render_entries(&entries));
}

fn render_entries(entries: &[(&str, String)]) -> String {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ = write!(message, "\n  {key}:{padding} {value}");
    }
    message
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_commit() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit(" abc "), "abc");
    }

    #[test]
    fn test_render_entries_aligns_keys() {
        let rendered = render_entries(&[
            ("port", "8080".to_string()),
            ("storage", "memory".to_string()),
        ]);
        assert!(rendered.contains("\n  port:    8080"));
        assert!(rendered.contains("\n  storage: memory"));
    }
}
