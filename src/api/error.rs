//! Collaborator error types shared by every external API adapter

use std::fmt;

/// Errors that can occur when calling an external collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 401 Unauthorized - token invalid or expired
    Unauthorized { provider: String },
    /// 403 Forbidden - token lacks required permissions
    Forbidden { provider: String },
    /// 429 Rate Limited
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },
    /// Transport failure (DNS, connection reset, TLS)
    NetworkError { provider: String, message: String },
    /// The call did not finish within the configured timeout
    Timeout { provider: String, secs: u64 },
    /// Other non-2xx HTTP responses
    HttpError {
        provider: String,
        status: u16,
        message: String,
    },
    /// 2xx response whose body could not be understood
    InvalidResponse { provider: String, message: String },
    /// Provider not configured (no credentials in environment)
    NotConfigured { provider: String },
}

impl ApiError {
    /// Check if this is an authentication error (401 or 403)
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::Forbidden { .. }
        )
    }

    /// Get the provider name for this error
    pub fn provider_name(&self) -> &str {
        match self {
            ApiError::Unauthorized { provider }
            | ApiError::Forbidden { provider }
            | ApiError::RateLimited { provider, .. }
            | ApiError::NetworkError { provider, .. }
            | ApiError::Timeout { provider, .. }
            | ApiError::HttpError { provider, .. }
            | ApiError::InvalidResponse { provider, .. }
            | ApiError::NotConfigured { provider } => provider,
        }
    }

    /// Check if this is a rate limiting error
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }

    /// Get retry-after seconds if rate limited
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    pub fn unauthorized(provider: impl Into<String>) -> Self {
        ApiError::Unauthorized {
            provider: provider.into(),
        }
    }

    pub fn forbidden(provider: impl Into<String>) -> Self {
        ApiError::Forbidden {
            provider: provider.into(),
        }
    }

    pub fn rate_limited(provider: impl Into<String>, retry_after: Option<u64>) -> Self {
        ApiError::RateLimited {
            provider: provider.into(),
            retry_after_secs: retry_after,
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::NetworkError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn timeout(provider: impl Into<String>, secs: u64) -> Self {
        ApiError::Timeout {
            provider: provider.into(),
            secs,
        }
    }

    pub fn http(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ApiError::HttpError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn not_configured(provider: impl Into<String>) -> Self {
        ApiError::NotConfigured {
            provider: provider.into(),
        }
    }

    /// Map a non-success HTTP status to the matching error variant
    pub fn from_status(
        provider: &str,
        status: u16,
        retry_after_secs: Option<u64>,
        body: impl Into<String>,
    ) -> Self {
        match status {
            401 => ApiError::unauthorized(provider),
            403 => ApiError::forbidden(provider),
            429 => ApiError::rate_limited(provider, retry_after_secs),
            status => ApiError::http(provider, status, body),
        }
    }

    /// Map a reqwest transport error, keeping timeouts distinct
    pub fn from_reqwest(provider: &str, err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ApiError::timeout(provider, timeout_secs)
        } else {
            ApiError::network(provider, err.to_string())
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized { provider } => {
                write!(f, "{}: Unauthorized (401) - check the API key", provider)
            }
            ApiError::Forbidden { provider } => {
                write!(
                    f,
                    "{}: Forbidden (403) - insufficient permissions",
                    provider
                )
            }
            ApiError::RateLimited {
                provider,
                retry_after_secs,
            } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "{}: Rate limited - retry after {}s", provider, secs)
                } else {
                    write!(f, "{}: Rate limited", provider)
                }
            }
            ApiError::NetworkError { provider, message } => {
                write!(f, "{}: Network error - {}", provider, message)
            }
            ApiError::Timeout { provider, secs } => {
                write!(f, "{}: Timed out after {}s", provider, secs)
            }
            ApiError::HttpError {
                provider,
                status,
                message,
            } => {
                write!(f, "{}: HTTP {} - {}", provider, status, message)
            }
            ApiError::InvalidResponse { provider, message } => {
                write!(f, "{}: Invalid response - {}", provider, message)
            }
            ApiError::NotConfigured { provider } => {
                write!(f, "{}: Not configured (no API credentials)", provider)
            }
        }
    }
}

impl std::error::Error for ApiError {}
