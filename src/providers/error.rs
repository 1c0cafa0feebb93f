use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("No numbers available")]
    NoNumbers,

    #[error("Provider account balance exhausted")]
    NoBalance,

    #[error("Provider rejected the API key")]
    BadKey,

    #[error("Provider rejected request: {0}")]
    Rejected(String),

    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    #[error("Provider transport error: {0}")]
    Transport(String),

    #[error("Unexpected provider response: {0}")]
    Unexpected(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// The provider definitely did not act on the request.
    ///
    /// Transport and parse failures are ambiguous: the order may exist upstream.
    pub fn is_explicit(&self) -> bool {
        !matches!(
            self,
            ProviderError::Transport(_) | ProviderError::Unexpected(_)
        )
    }

    /// Stable code stored with failed purchases
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::NoNumbers => "NO_NUMBERS",
            ProviderError::NoBalance | ProviderError::BadKey => "PROVIDER_UNAVAILABLE",
            ProviderError::Unreachable(_) => "PROVIDER_UNAVAILABLE",
            ProviderError::Rejected(_) => "PROVIDER_REJECTED",
            ProviderError::Transport(_) | ProviderError::Unexpected(_) => "PROVIDER_ERROR",
            ProviderError::NotConfigured(_) => "UNSUPPORTED_PROVIDER",
        }
    }
}
