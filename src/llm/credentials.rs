//! API key sources

/// Warning logged while no API key is configured
pub const MISSING_API_KEY_WARNING: &str = "API key not set. Export OPENAI_API_KEY (or configure the \
     credential source) with a key from your completion provider.";

/// Read-only accessor for the completion service API key.
///
/// Queried on every request, so a key configured after startup is picked up
/// without rebuilding the service.
pub trait CredentialSource: Send + Sync {
    fn api_key(&self) -> String;

    fn is_configured(&self) -> bool {
        !self.api_key().is_empty()
    }
}

/// Reads the key from an environment variable on each call
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub const DEFAULT_VAR: &'static str = "OPENAI_API_KEY";

    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VAR)
    }
}

impl CredentialSource for EnvCredentials {
    fn api_key(&self) -> String {
        std::env::var(&self.var).unwrap_or_default()
    }
}

/// Fixed key, mostly for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(String);

impl StaticCredentials {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl CredentialSource for StaticCredentials {
    fn api_key(&self) -> String {
        self.0.clone()
    }
}

/// Emit the configuration warning if the key is empty
pub fn warn_if_missing(credentials: &dyn CredentialSource) {
    if !credentials.is_configured() {
        tracing::warn!("{MISSING_API_KEY_WARNING}");
    }
}
