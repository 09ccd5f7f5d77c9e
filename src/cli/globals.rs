use secrecy::SecretString;

/// Secrets handed to the server at startup.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub leader_token: Option<SecretString>,
    pub admin_token: Option<SecretString>,
}

impl GlobalArgs {
    /// Empty values are treated as unset.
    #[must_use]
    pub fn new(leader_token: Option<String>, admin_token: Option<String>) -> Self {
        Self {
            leader_token: non_empty(leader_token),
            admin_token: non_empty(admin_token),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<SecretString> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}
