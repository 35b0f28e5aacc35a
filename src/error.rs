use crate::types::BrokerType;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider {requested} not available. Available providers: {}", join_brokers(.available))]
    ProviderUnavailable {
        requested: BrokerType,
        available: Vec<BrokerType>,
    },

    #[error("{provider} does not support {operation}. {remediation}")]
    Unsupported {
        provider: &'static str,
        operation: &'static str,
        remediation: String,
    },

    #[error("instance {instance_id} has no usable credentials: {reason}")]
    CredentialsMissing { instance_id: String, reason: String },

    #[error("credentials for instance {instance_id} were rejected: {reason}")]
    CredentialsInvalid { instance_id: String, reason: String },

    #[error("invalid phone number `{input}`: expected at least 10 digits, got {digits}")]
    InvalidPhoneNumber { input: String, digits: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("circuit open for {category} endpoints, retry in {retry_after_ms}ms")]
    CircuitOpen {
        category: &'static str,
        retry_after_ms: u64,
    },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("credential store error: {0}")]
    Store(String),
}

fn join_brokers(brokers: &[BrokerType]) -> String {
    if brokers.is_empty() {
        return "none".to_string();
    }
    brokers
        .iter()
        .map(|b| b.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ProviderError {
    pub fn unsupported(
        provider: &'static str,
        operation: &'static str,
        remediation: impl Into<String>,
    ) -> Self {
        ProviderError::Unsupported {
            provider,
            operation,
            remediation: remediation.into(),
        }
    }

    pub fn credentials_missing(instance_id: &str, reason: impl Into<String>) -> Self {
        ProviderError::CredentialsMissing {
            instance_id: instance_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Maps a reqwest failure, keeping timeouts distinct from other transport errors.
    pub fn from_reqwest(err: reqwest::Error, url: &str, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout {
                url: url.to_string(),
                timeout_ms,
            }
        } else {
            ProviderError::Transport(err)
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout { .. } | ProviderError::Transport(_) => true,
            ProviderError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::ProviderUnavailable { .. } => "provider_unavailable",
            ProviderError::Unsupported { .. } => "unsupported_capability",
            ProviderError::CredentialsMissing { .. } => "credentials_missing",
            ProviderError::CredentialsInvalid { .. } => "credentials_invalid",
            ProviderError::InvalidPhoneNumber { .. } | ProviderError::InvalidInput(_) => {
                "validation_error"
            }
            ProviderError::Timeout { .. } => "timeout",
            ProviderError::Http { .. } | ProviderError::Transport(_) => "transport_error",
            ProviderError::CircuitOpen { .. } => "circuit_open",
            ProviderError::Decode(_) => "decode_error",
            ProviderError::Store(_) => "store_error",
        }
    }
}

impl From<sqlx::Error> for ProviderError {
    fn from(err: sqlx::Error) -> Self {
        ProviderError::Store(err.to_string())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
