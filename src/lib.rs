//! # Cross Vault Auth
//!
//! `cross-vault-auth` lets a *follower* Vault trust domain authenticate callers that
//! hold a credential issued by a peered *leader* cluster. A caller presents a
//! response-wrapped secret; the backend unwraps it at the leader, looks the
//! resulting token (or accessor) up, checks the reported entity and its metadata
//! against a configured role, and mints a locally-scoped credential descriptor.
//!
//! ## Trust material
//!
//! The HTTP client used to reach the leader is shared by every login and is rebuilt
//! by a single background task whenever the configured CA bundle changes. Readers
//! always see a complete snapshot (client + pool + verification flag from the same
//! configuration read); the updater swaps snapshots, it never mutates one.
//!
//! ## Failure policy
//!
//! Login failures are split into *rejections* (bad secret, unknown role, policy
//! mismatch) and *failures* (storage, leader unreachable). Both collapse to a
//! generic response at the HTTP boundary so callers cannot probe which stage failed.

pub mod api;
pub mod backend;
pub mod cli;
pub mod error;
pub mod vault;

pub use error::{Disposition, Error, Result};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
