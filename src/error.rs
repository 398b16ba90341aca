use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResolveError>;

/// Unified error type for the resolution pipeline.
///
/// Callers match on *kind* through the `is_*` helpers; wrap-chains are
/// preserved so the original cause stays reachable via `source()`.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    // Lookup outcomes
    #[error("record could not be found")]
    NotFound,
    #[error("invalid query: {0}")]
    Invalid(String),
    #[error("query targets the localhost namespace")]
    Localhost,

    // Policy outcomes
    #[error("query was blocked by policy")]
    Blocked,
    #[error("test domains are disabled")]
    TestDomainsDisabled,
    #[error("special domains are disabled")]
    SpecialDomainsDisabled,
    #[error("no compliant resolvers for this query")]
    NoCompliance,
    #[error("query was blocked upstream by resolver {resolver}")]
    BlockedUpstream { resolver: String },

    // Transport outcomes
    #[error("resolver query timed out")]
    Timeout,
    #[error("device is offline")]
    Offline,
    #[error("query failed: {0}")]
    Failure(String),
    #[error("resolver asked to continue with the next resolver")]
    Continue,

    // Module state
    #[error("resolver module is shutting down")]
    ShuttingDown,

    // Aggregate outcome of the two-pass runner
    #[error("all {count} query-compliant resolvers failed, last error: {last}")]
    AllFailed {
        count: usize,
        #[source]
        last: Box<ResolveError>,
    },
}

impl ResolveError {
    /// No such record: NXDomain, store miss, or a malformed query.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound | Self::Invalid(_))
    }

    /// Refused by policy, locally or upstream.
    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            Self::Blocked
                | Self::TestDomainsDisabled
                | Self::SpecialDomainsDisabled
                | Self::NoCompliance
                | Self::BlockedUpstream { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline)
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    pub fn is_shutting_down(&self) -> bool {
        matches!(self, Self::ShuttingDown)
    }
}

/// Errors returned by the record store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The sentinel for a missing record; never logged as a failure.
    #[error("record not found in store")]
    NotFound,
    #[error("store failure: {0}")]
    Failure(String),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid TTL bounds: min {min}s exceeds max {max}s")]
    InvalidTtlBounds { min: u32, max: u32 },
    #[error("invalid cache size: {0}")]
    InvalidCacheSize(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("configuration parse error: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_kinds_classify_as_blocked() {
        assert!(ResolveError::Blocked.is_blocked());
        assert!(ResolveError::TestDomainsDisabled.is_blocked());
        assert!(ResolveError::SpecialDomainsDisabled.is_blocked());
        assert!(ResolveError::NoCompliance.is_blocked());
        assert!(
            ResolveError::BlockedUpstream {
                resolver: "dot#1".into()
            }
            .is_blocked()
        );
        assert!(!ResolveError::Timeout.is_blocked());
    }

    #[test]
    fn test_invalid_wraps_not_found() {
        assert!(ResolveError::Invalid("empty domain".into()).is_not_found());
        assert!(ResolveError::NotFound.is_not_found());
        assert!(!ResolveError::Offline.is_not_found());
    }

    #[test]
    fn test_all_failed_preserves_cause() {
        use std::error::Error as _;
        let err = ResolveError::AllFailed {
            count: 2,
            last: Box::new(ResolveError::Timeout),
        };
        let source = err.source().expect("cause must be preserved");
        assert!(source.to_string().contains("timed out"));
    }
}
