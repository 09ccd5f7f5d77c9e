use crate::cli::{
    actions::{server::Args, Action},
    globals::GlobalArgs,
};
use anyhow::{Context, Result};
use std::{path::PathBuf, time::Duration};

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let storage_dir = matches.get_one::<String>("storage-dir").map(PathBuf::from);

    let tls_refresh_interval = matches
        .get_one::<u64>("tls-refresh-interval")
        .copied()
        .map(Duration::from_secs)
        .context("missing required argument: --tls-refresh-interval")?;
    let request_timeout = matches
        .get_one::<u64>("request-timeout")
        .copied()
        .map(Duration::from_secs)
        .context("missing required argument: --request-timeout")?;
    let max_lease_ttl = matches
        .get_one::<Duration>("max-lease-ttl")
        .copied()
        .context("missing required argument: --max-lease-ttl")?;

    let globals = GlobalArgs::new(
        matches.get_one::<String>("leader-token").cloned(),
        matches.get_one::<String>("admin-token").cloned(),
    );

    Ok(Action::Server(Args {
        port,
        storage_dir,
        tls_refresh_interval,
        request_timeout,
        max_lease_ttl,
        globals,
    }))
}
