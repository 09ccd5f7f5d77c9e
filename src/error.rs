//! Error taxonomy shared by the backend and the leader client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// How a failed login is reported: as a policy decision or as an infrastructure fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Terminal policy decision. Retrying the same request will not help.
    Rejected,
    /// Infrastructure fault. The caller may retry the whole login.
    Failed,
}

impl Disposition {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Rejected => "rejected",
            Disposition::Failed => "failed",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Shared HTTP client or TLS trust is missing.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("unwrap failed: {0}")]
    Unwrap(String),

    #[error("field '{0}' not found in unwrapped data")]
    MissingField(&'static str),

    #[error("unknown login method: {0}")]
    UnknownMethod(String),

    #[error("remote lookup failed: {0}")]
    RemoteLookup(String),

    #[error("role validation failed")]
    PolicyMismatch,

    #[error("role with provided name not found")]
    RoleNotFound,

    #[error("backend is not configured")]
    NotConfigured,

    #[error("{0}")]
    InvalidRequest(String),
}

impl Error {
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        match self {
            Error::Precondition(_) | Error::Storage(_) | Error::RemoteLookup(_) => {
                Disposition::Failed
            }
            Error::Unwrap(_)
            | Error::MissingField(_)
            | Error::UnknownMethod(_)
            | Error::PolicyMismatch
            | Error::RoleNotFound
            | Error::NotConfigured
            | Error::InvalidRequest(_) => Disposition::Rejected,
        }
    }

    #[must_use]
    pub fn is_rejection(&self) -> bool {
        self.disposition() == Disposition::Rejected
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Storage(format!("malformed record: {err}"))
    }
}
