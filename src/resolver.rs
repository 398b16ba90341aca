use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

use crate::cache::{RRCache, RecordStore};
use crate::config::ResolverConfig;
use crate::constants::{CACHE_RESET_BACKOFF, CACHE_RESET_THRESHOLD};
use crate::dedupe::{DedupeOutcome, QueryDeduper};
use crate::error::{ResolveError, Result, StoreError};
use crate::netenv::{DNS_TEST_DOMAIN, NetEnv, OnlineStatus, ProbeOutcome};
use crate::notify::Notifier;
use crate::query::Query;
use crate::rr::{RecordType, ResponseCode};
use crate::shutdown::ShutdownSignal;
use crate::upstream::{ResolverPool, ResolverSource};

/// Name scopes that must never be sent upstream.
const LOCALHOST_SCOPES: &[&str] = &[".localhost.", ".127.in-addr.arpa."];

/// Reserved test and documentation scopes.
const TEST_SCOPES: &[&str] = &[".test.", ".example.", ".invalid."];

/// Special-use service scopes resolved only by local resolvers.
const SPECIAL_SERVICE_SCOPES: &[&str] = &[".local.", ".home.arpa.", ".onion."];

/// Tally of repeated identical queries, driving periodic cache resets.
#[derive(Default)]
struct CacheResetTally {
    last_id: String,
    count: i32,
}

struct ResolverInner {
    config: ResolverConfig,
    store: Arc<dyn RecordStore>,
    pool: Arc<dyn ResolverPool>,
    netenv: Arc<NetEnv>,
    notifier: Arc<dyn Notifier>,
    shutdown: ShutdownSignal,
    deduper: Arc<QueryDeduper>,
    reset_tally: Mutex<CacheResetTally>,
}

/// The query resolution pipeline.
///
/// Coordinates the cache gate, single-flight deduplication, the two-pass
/// resolver runner, backup serving, and background refresh. Cheap to clone;
/// all state is shared.
#[derive(Clone)]
pub struct NameResolver {
    inner: Arc<ResolverInner>,
}

impl NameResolver {
    pub fn new(
        config: ResolverConfig,
        store: Arc<dyn RecordStore>,
        pool: Arc<dyn ResolverPool>,
        netenv: Arc<NetEnv>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let deduper = Arc::new(QueryDeduper::new(config.max_request_timeout));
        let resolver = Self {
            inner: Arc::new(ResolverInner {
                config,
                store,
                pool,
                netenv,
                notifier,
                shutdown: ShutdownSignal::new(),
                deduper,
                reset_tally: Mutex::new(CacheResetTally::default()),
            }),
        };
        resolver.install_probe();
        resolver
    }

    /// Signal the module to stop; in-flight runs abort with `ShuttingDown`.
    pub fn shutdown(&self) {
        self.inner.shutdown.trigger();
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.inner.shutdown.clone()
    }

    /// Wire the connectivity probe into the net-env callback slot, so that
    /// layer can test DNS reachability without depending on this one.
    fn install_probe(&self) {
        let weak: Weak<ResolverInner> = Arc::downgrade(&self.inner);
        self.inner.netenv.set_dns_test_query(Arc::new(
            move |fqdn: String| -> BoxFuture<'static, ProbeOutcome> {
                let weak = weak.clone();
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(inner) => {
                            let resolver = NameResolver { inner };
                            resolver.test_connectivity(&fqdn).await
                        }
                        None => ProbeOutcome {
                            ips: Vec::new(),
                            ok: false,
                            err: Some(ResolveError::ShuttingDown),
                        },
                    }
                })
            },
        ));
    }

    /// Resolve a query from cache, an in-flight duplicate, or upstream.
    pub async fn resolve(&self, mut q: Query) -> Result<RRCache> {
        if !q.normalize() {
            return Err(ResolveError::Invalid("domain name is empty".to_string()));
        }
        self.check_query_compliance(&q)?;
        trace!("resolving {}", q.id());

        let mut old_cache = None;
        if !q.no_caching {
            if let Some(rr_cache) = self.check_cache(&q) {
                if !rr_cache.expired() {
                    return Ok(rr_cache);
                }
                // Expired but successful: keep as a backup seed.
                old_cache = Some(rr_cache);
            }

            match self.inner.deduper.join(&q.id()).await {
                DedupeOutcome::Owner(_finish) => {
                    // We own the upstream request; completion signals on drop
                    // of the guard, after the result was saved.
                    return self.resolve_and_cache(&q, old_cache).await;
                }
                DedupeOutcome::Released => {
                    // Another caller finished this query; its answer should
                    // now be cached.
                    if let Some(rr_cache) = self.check_cache(&q) {
                        if !rr_cache.expired() {
                            return Ok(rr_cache);
                        }
                        old_cache = Some(rr_cache);
                    }
                    // The leader's result was not cached; resolve ourselves
                    // without re-entering deduplication.
                }
            }
        }

        self.resolve_and_cache(&q, old_cache).await
    }

    /// Reject queries the policy never sends upstream.
    fn check_query_compliance(&self, q: &Query) -> Result<()> {
        if q.in_scope(LOCALHOST_SCOPES) {
            return Err(ResolveError::Localhost);
        }
        if !self.inner.config.allow_test_domains && q.in_scope(TEST_SCOPES) {
            return Err(ResolveError::TestDomainsDisabled);
        }
        if !self.inner.config.allow_special_domains && q.in_scope(SPECIAL_SERVICE_SCOPES) {
            return Err(ResolveError::SpecialDomainsDisabled);
        }
        Ok(())
    }

    /// The cache gate: returns a stored entry only if its provenance and
    /// compliance still hold. Expired entries with a successful response
    /// code are returned as backup seeds; near-expiry entries trigger an
    /// async refresh.
    fn check_cache(&self, q: &Query) -> Option<RRCache> {
        if self.inner.netenv.is_connectivity_domain(&q.fqdn) {
            // Connectivity checks must always observe the live state.
            return None;
        }

        let mut rr_cache = match self.inner.store.get(&q.fqdn, q.qtype) {
            Ok(rr_cache) => rr_cache,
            Err(StoreError::NotFound) => return None,
            Err(err) => {
                warn!("loading {} from cache failed: {}", q.id(), err);
                return None;
            }
        };

        // The producing resolver must still be registered.
        let Some(resolver) = self.inner.pool.by_id(&rr_cache.resolver.id) else {
            debug!(
                "dropping cached {}: resolver {} is gone",
                q.id(),
                rr_cache.resolver.id
            );
            return None;
        };
        if resolver.check_compliance(q).is_err() {
            return None;
        }

        if self.should_reset_cache(q) {
            if let Err(err) = self.inner.store.reset(&q.fqdn, q.qtype) {
                warn!("resetting cache for {} failed: {}", q.id(), err);
            } else {
                info!("cache for {} was reset due to repeated queries", q.id());
            }
            return None;
        }

        if rr_cache.expired() {
            if rr_cache.rcode == ResponseCode::NoError {
                return Some(rr_cache);
            }
            return None;
        }

        if rr_cache.expires_soon() {
            rr_cache.requesting_new = true;
            debug!("refreshing cache for {}", q.id());

            // The requester may vanish the moment it gets the stale entry;
            // the refresh is bound to module shutdown instead.
            let resolver = self.clone();
            let refresh_q = q.clone();
            tokio::spawn(async move {
                let shutdown = resolver.inner.shutdown.clone();
                tokio::select! {
                    _ = shutdown.wait() => {}
                    result = resolver.resolve_and_cache(&refresh_q, None) => {
                        if let Err(err) = result {
                            debug!("background refresh of {} failed: {}", refresh_q.id(), err);
                        }
                    }
                }
            });
        }

        Some(rr_cache)
    }

    /// Repeated identical queries reset their cache entry on the 3rd
    /// consecutive hit, then every 10th after that. A different query ID
    /// restarts the tally.
    fn should_reset_cache(&self, q: &Query) -> bool {
        let id = q.id();
        let mut tally = self.inner.reset_tally.lock();
        if tally.last_id != id {
            tally.last_id = id;
            tally.count = 1;
            return false;
        }
        tally.count += 1;
        if tally.count >= CACHE_RESET_THRESHOLD {
            tally.count = CACHE_RESET_BACKOFF;
            return true;
        }
        false
    }

    fn offline_and_not_probe(&self, q: &Query) -> bool {
        self.inner.netenv.get_online_status() == OnlineStatus::Offline
            && q.fqdn != DNS_TEST_DOMAIN
            && !self.inner.netenv.is_connectivity_domain(&q.fqdn)
    }

    /// Query the in-scope resolvers and cache the elected answer.
    ///
    /// Two passes over the try-order list: the first skips resolvers that
    /// are marked failing, the second includes them. The first successful
    /// response wins.
    pub async fn resolve_and_cache(
        &self,
        q: &Query,
        mut old_cache: Option<RRCache>,
    ) -> Result<RRCache> {
        let scoped = self.inner.pool.resolvers_in_scope(q);
        if scoped.resolvers.is_empty() {
            return Err(ResolveError::NoCompliance);
        }

        if self.offline_and_not_probe(q) {
            debug!("not resolving {}, device is offline", q.id());
            return backup_or(old_cache, ResolveError::Offline);
        }

        let mut fresh: Option<RRCache> = None;
        let mut last_err: Option<ResolveError> = None;

        'passes: for pass in 0..2 {
            for resolver in &scoped.resolvers {
                if self.inner.shutdown.is_shutdown() {
                    return Err(ResolveError::ShuttingDown);
                }
                if pass == 0 && !q.ignore_failing && resolver.is_failing() {
                    trace!("skipping failing resolver {}", resolver.info.id);
                    continue;
                }

                debug!("sending query for {} to {}", q.id(), resolver.info.id);
                match resolver.conn.query(q).await {
                    Ok(mut rr_cache) => {
                        last_err = None;
                        rr_cache.resolver = resolver.info.clone();

                        if rr_cache.rcode == ResponseCode::NoError {
                            resolver.reset_failure();
                            if scoped.primary_source == ResolverSource::Configured {
                                self.inner.notifier.reset_failing_resolvers();
                            }
                            fresh = Some(rr_cache);
                            break 'passes;
                        }
                        if scoped.try_all {
                            // Another resolver may still know this name.
                            fresh = Some(rr_cache);
                            continue;
                        }
                        resolver.reset_failure();
                        fresh = Some(rr_cache);
                        break 'passes;
                    }
                    Err(err) => {
                        fresh = None;
                        if err.is_not_found() {
                            if scoped.try_all {
                                last_err = Some(err);
                                continue;
                            }
                            return Err(err);
                        }
                        if err.is_blocked() {
                            // Blocking is authoritative; no fallback.
                            return Err(err);
                        }
                        if self.offline_and_not_probe(q) {
                            debug!("not resolving {}, device went offline", q.id());
                            return backup_or(old_cache, ResolveError::Offline);
                        }
                        if err.is_continue() {
                            last_err = Some(err);
                            continue;
                        }
                        if err.is_timeout() {
                            resolver.report_failure();
                            last_err = Some(err);
                            continue;
                        }
                        if err.is_shutting_down() {
                            return Err(err);
                        }
                        warn!(
                            "query to {} for {} failed: {}",
                            resolver.info.id,
                            q.id(),
                            err
                        );
                        resolver.report_failure();
                        last_err = Some(err);
                    }
                }
            }
        }

        let err = last_err.map(|last| {
            let failed = ResolveError::AllFailed {
                count: scoped.resolvers.len(),
                last: Box::new(last),
            };
            if scoped.primary_source == ResolverSource::Configured
                && self.inner.netenv.online()
                && self.inner.notifier.self_check_is_failing()
            {
                self.inner.notifier.notify_failing_resolvers(&failed);
            } else {
                self.inner.notifier.reset_failing_resolvers();
            }
            failed
        });

        // Backup policy: a stale success beats a fresh failure.
        if let Some(old) = old_cache.as_mut() {
            old.is_backup = true;
        }
        if let Some(err) = err {
            return match old_cache {
                Some(old) => {
                    debug!("serving backup for {} after failure: {}", q.id(), err);
                    Ok(old)
                }
                None => Err(err),
            };
        }

        let mut rr_cache = fresh.ok_or_else(|| {
            ResolveError::Failure("no resolver attempt produced a result".to_string())
        })?;

        if !rr_cache.cacheable() {
            if let Some(old) = old_cache {
                debug!(
                    "serving backup for {}, fresh answer was {}",
                    q.id(),
                    rr_cache.rcode
                );
                return Ok(old);
            }
        }

        let min_ttl = if rr_cache.resolver.source == ResolverSource::Mdns {
            self.inner.config.min_mdns_ttl
        } else {
            self.inner.config.min_ttl
        };
        rr_cache.clean(min_ttl, self.inner.config.max_ttl);

        if !q.no_caching && rr_cache.cacheable() {
            if let Err(err) = self.inner.store.save(&rr_cache) {
                warn!("saving {} to cache failed: {}", q.id(), err);
            }
        }

        Ok(rr_cache)
    }

    /// Probe DNS reachability with a fixed-shape A query, bypassing cache
    /// and deduplication. The probe counts as successful whenever an
    /// upstream answered at all, even negatively.
    pub async fn test_connectivity(&self, fqdn: &str) -> ProbeOutcome {
        let mut q = Query::new(fqdn, RecordType::A);
        q.no_caching = true;
        if !q.normalize() {
            return ProbeOutcome {
                ips: Vec::new(),
                ok: false,
                err: Some(ResolveError::Invalid("domain name is empty".to_string())),
            };
        }

        match self.resolve_and_cache(&q, None).await {
            Ok(rr_cache) => match rr_cache.rcode {
                ResponseCode::NameError => ProbeOutcome {
                    ips: Vec::new(),
                    ok: true,
                    err: Some(ResolveError::NotFound),
                },
                ResponseCode::Refused => ProbeOutcome {
                    ips: Vec::new(),
                    ok: true,
                    err: Some(ResolveError::Failure("refused".to_string())),
                },
                _ => {
                    let ips = rr_cache.export_all_a_records();
                    if ips.is_empty() {
                        ProbeOutcome {
                            ips,
                            ok: true,
                            err: Some(ResolveError::NotFound),
                        }
                    } else {
                        ProbeOutcome {
                            ips,
                            ok: true,
                            err: None,
                        }
                    }
                }
            },
            Err(err) => {
                let ok = err.is_not_found() || err.is_blocked();
                ProbeOutcome {
                    ips: Vec::new(),
                    ok,
                    err: Some(err),
                }
            }
        }
    }
}

/// Serve the stale entry as a backup, or fail with `err` if there is none.
fn backup_or(old_cache: Option<RRCache>, err: ResolveError) -> Result<RRCache> {
    match old_cache {
        Some(mut rr_cache) => {
            rr_cache.is_backup = true;
            Ok(rr_cache)
        }
        None => Err(err),
    }
}
