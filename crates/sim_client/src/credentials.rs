/// Read-only source of the current auth token.
pub trait CredentialStore: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token, typically from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

impl CredentialStore for StaticCredentials {
    fn token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Reads the token from an environment variable on every call, so a token
/// refreshed by another process is picked up.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new("SIM_AUTH_TOKEN")
    }
}

impl CredentialStore for EnvCredentials {
    fn token(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_static_token_is_absent() {
        assert_eq!(StaticCredentials::new(Some("  ".to_string())).token(), None);
        assert_eq!(
            StaticCredentials::new(Some("abc".to_string())).token(),
            Some("abc".to_string())
        );
    }

    #[test]
    fn env_credentials_read_named_variable() {
        let var = "SIM_CLIENT_TEST_TOKEN_7F3A";
        std::env::set_var(var, "from-env");
        assert_eq!(EnvCredentials::new(var).token(), Some("from-env".to_string()));
        std::env::remove_var(var);
        assert_eq!(EnvCredentials::new(var).token(), None);
    }
}
