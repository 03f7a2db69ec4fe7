use std::sync::Arc;

use thiserror::Error;

/// Produces the `export_date` stamped into every archive.
pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

/// Ordered request parameters for one remote method call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.0.push((key.to_string(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("authorization failed: {0}")]
    Auth(String),
    #[error("daily request quota exhausted")]
    QuotaExhausted,
    #[error("cancelled")]
    Cancelled,
}

impl ApiError {
    /// Errors the gateway retries with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::Transient(_))
    }
}

/// Failure of one target's harvest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarvestError {
    /// Scoped to the target; the run continues without it.
    #[error("{0}")]
    Target(ApiError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("community {0} is closed")]
    ClosedCommunity(String),
    /// Ends the whole run.
    #[error("{0}")]
    Fatal(ApiError),
    #[error("cancelled, partial harvest discarded")]
    Cancelled,
}

impl From<ApiError> for HarvestError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::QuotaExhausted => Self::Fatal(err),
            ApiError::Cancelled => Self::Cancelled,
            other => Self::Target(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("access token rejected: {0}")]
    Auth(String),
    #[error("daily request quota exhausted before any target was harvested")]
    Quota,
    #[error("remote API unreachable: {0}")]
    Unreachable(ApiError),
    #[error("output directory unusable: {0}")]
    Output(#[from] crate::persist::PersistError),
    #[error("cancelled before any target was harvested")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_keep_insertion_order() {
        let params = Params::new().with("owner_id", -5).with("count", 100).with("sort", "asc");
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("owner_id", "-5"), ("count", "100"), ("sort", "asc")]);
        assert_eq!(params.get("count"), Some("100"));
        assert_eq!(params.get("offset"), None);
    }

    #[test]
    fn only_quota_and_cancel_escalate() {
        assert_eq!(
            HarvestError::from(ApiError::QuotaExhausted),
            HarvestError::Fatal(ApiError::QuotaExhausted)
        );
        assert_eq!(HarvestError::from(ApiError::Cancelled), HarvestError::Cancelled);
        assert!(matches!(
            HarvestError::from(ApiError::Auth("scope".into())),
            HarvestError::Target(ApiError::Auth(_))
        ));
    }
}
