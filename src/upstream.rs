use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

use crate::constants::{RESOLVER_FAIL_DURATION, RESOLVER_FAIL_THRESHOLD};
use crate::error::{ResolveError, Result};
use crate::cache::RRCache;
use crate::query::{Query, SecurityLevel};

/// Where a resolver was learned from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ResolverSource {
    #[default]
    Configured,
    Env,
    Dhcp,
    Mdns,
}

/// Identity and capabilities of an upstream resolver.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResolverInfo {
    /// Stable identity, also used for cache provenance.
    pub id: String,
    pub name: String,
    pub source: ResolverSource,
    /// Reachable on the local network only.
    pub local: bool,
    /// Transport is encrypted (DoT/DoH).
    pub encrypted: bool,
}

/// Transport connection to one upstream resolver.
#[async_trait]
pub trait ResolverConn: Send + Sync {
    async fn query(&self, q: &Query) -> Result<RRCache>;
}

/// Consecutive-failure tracking for one resolver.
///
/// A resolver is failing after enough consecutive failures; the state lapses
/// on its own after the fail duration, or immediately on a reset.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: AtomicU64,
    failing_until: Mutex<Option<Instant>>,
}

impl FailureTracker {
    pub fn is_failing(&self) -> bool {
        match *self.failing_until.lock() {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    pub fn report_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= RESOLVER_FAIL_THRESHOLD {
            *self.failing_until.lock() = Some(Instant::now() + RESOLVER_FAIL_DURATION);
        }
    }

    pub fn reset_failure(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.failing_until.lock() = None;
    }
}

/// An upstream resolver: identity, transport, and health.
pub struct UpstreamResolver {
    pub info: ResolverInfo,
    pub conn: Arc<dyn ResolverConn>,
    health: FailureTracker,
}

impl UpstreamResolver {
    pub fn new(info: ResolverInfo, conn: Arc<dyn ResolverConn>) -> Self {
        Self {
            info,
            conn,
            health: FailureTracker::default(),
        }
    }

    pub fn is_failing(&self) -> bool {
        self.health.is_failing()
    }

    pub fn report_failure(&self) {
        debug!("resolver {} reported failing", self.info.id);
        self.health.report_failure();
    }

    pub fn reset_failure(&self) {
        self.health.reset_failure();
    }

    /// Whether this resolver satisfies the query's policy requirements.
    pub fn check_compliance(&self, q: &Query) -> Result<()> {
        if q.local_resolvers_only && !self.info.local {
            return Err(ResolveError::NoCompliance);
        }
        if q.security_level >= SecurityLevel::High && !self.info.encrypted {
            return Err(ResolveError::NoCompliance);
        }
        Ok(())
    }
}

/// Ordered resolver selection for one query.
pub struct ScopedResolvers {
    /// Try-order list; already filtered for compliance.
    pub resolvers: Vec<Arc<UpstreamResolver>>,
    /// Source of the primary resolver scope.
    pub primary_source: ResolverSource,
    /// Keep trying the next resolver on NXDomain / not-found answers.
    pub try_all: bool,
}

/// Resolver registry and scope selection, as seen by the core.
pub trait ResolverPool: Send + Sync {
    /// Ordered, query-compliant resolvers plus scope policy.
    fn resolvers_in_scope(&self, q: &Query) -> ScopedResolvers;

    /// Look up an active resolver by identity; used for cache provenance.
    fn by_id(&self, id: &str) -> Option<Arc<UpstreamResolver>>;
}

/// A fixed resolver list behind the pool interface.
pub struct StaticResolverPool {
    resolvers: RwLock<Vec<Arc<UpstreamResolver>>>,
    primary_source: ResolverSource,
    try_all: bool,
}

impl StaticResolverPool {
    pub fn new(primary_source: ResolverSource, try_all: bool) -> Self {
        Self {
            resolvers: RwLock::new(Vec::new()),
            primary_source,
            try_all,
        }
    }

    pub fn add(&self, resolver: Arc<UpstreamResolver>) {
        self.resolvers.write().push(resolver);
    }

    pub fn remove(&self, id: &str) {
        self.resolvers.write().retain(|r| r.info.id != id);
    }
}

impl ResolverPool for StaticResolverPool {
    fn resolvers_in_scope(&self, q: &Query) -> ScopedResolvers {
        let resolvers = self
            .resolvers
            .read()
            .iter()
            .filter(|r| r.check_compliance(q).is_ok())
            .cloned()
            .collect();
        ScopedResolvers {
            resolvers,
            primary_source: self.primary_source,
            try_all: self.try_all,
        }
    }

    fn by_id(&self, id: &str) -> Option<Arc<UpstreamResolver>> {
        self.resolvers
            .read()
            .iter()
            .find(|r| r.info.id == id)
            .cloned()
    }
}
