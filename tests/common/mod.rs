//! Common test utilities for vordr resolver tests
//!
//! This module consolidates the stub collaborators (transport, pool, store,
//! net-env) shared across the integration test files.

#![allow(dead_code)] // These helpers are used by various test files

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use vordr::cache::{MemoryStore, unix_now};
use vordr::config::ResolverConfig;
use vordr::error::{ResolveError, Result};
use vordr::netenv::NetEnv;
use vordr::notify::LogNotifier;
use vordr::query::Query;
use vordr::resolver::NameResolver;
use vordr::rr::{Record, RecordType, ResponseCode};
use vordr::upstream::{
    ResolverConn, ResolverInfo, ResolverSource, StaticResolverPool, UpstreamResolver,
};
use vordr::{RRCache, RecordStore};

pub type ReplyFn = dyn Fn(&Query) -> Result<RRCache> + Send + Sync;

/// Scriptable transport stub that counts invocations.
pub struct StubConn {
    pub queries: AtomicUsize,
    delay: Duration,
    reply: Box<ReplyFn>,
    call_log: Option<Arc<Mutex<Vec<String>>>>,
    log_name: String,
}

impl StubConn {
    pub fn new(reply: impl Fn(&Query) -> Result<RRCache> + Send + Sync + 'static) -> Self {
        Self {
            queries: AtomicUsize::new(0),
            delay: Duration::ZERO,
            reply: Box::new(reply),
            call_log: None,
            log_name: String::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Record each invocation under `name` in a shared call log.
    pub fn with_call_log(mut self, name: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.call_log = Some(log);
        self.log_name = name.to_string();
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResolverConn for StubConn {
    async fn query(&self, q: &Query) -> Result<RRCache> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.call_log {
            log.lock().push(self.log_name.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.reply)(q)
    }
}

/// A successful A-record answer for the queried name.
pub fn a_answer(q: &Query, addr: Ipv4Addr, ttl: u32) -> Result<RRCache> {
    let mut rr = RRCache::new(q.fqdn.clone(), q.qtype, ResponseCode::NoError);
    rr.answer.push(Record::a(&q.fqdn, ttl, addr));
    Ok(rr)
}

/// An answer with the given response code and no records.
pub fn rcode_answer(q: &Query, rcode: ResponseCode) -> Result<RRCache> {
    Ok(RRCache::new(q.fqdn.clone(), q.qtype, rcode))
}

pub fn resolver_info(id: &str) -> ResolverInfo {
    ResolverInfo {
        id: id.to_string(),
        name: id.to_string(),
        source: ResolverSource::Configured,
        local: false,
        encrypted: false,
    }
}

pub fn upstream(id: &str, conn: Arc<StubConn>) -> Arc<UpstreamResolver> {
    Arc::new(UpstreamResolver::new(resolver_info(id), conn))
}

/// Test config: test domains allowed so `*.test.` scenarios resolve.
pub fn test_config() -> ResolverConfig {
    ResolverConfig {
        allow_test_domains: true,
        ..Default::default()
    }
}

/// Everything a pipeline test needs to drive and inspect the resolver.
pub struct TestSetup {
    pub resolver: NameResolver,
    pub store: Arc<MemoryStore>,
    pub pool: Arc<StaticResolverPool>,
    pub netenv: Arc<NetEnv>,
    pub notifier: Arc<LogNotifier>,
}

pub fn setup_with_config(
    config: ResolverConfig,
    resolvers: Vec<Arc<UpstreamResolver>>,
) -> TestSetup {
    let store = Arc::new(MemoryStore::new(config.max_cache_entries));
    let pool = Arc::new(StaticResolverPool::new(ResolverSource::Configured, false));
    for resolver in resolvers {
        pool.add(resolver);
    }
    let netenv = Arc::new(NetEnv::new());
    let notifier = Arc::new(LogNotifier::default());
    let resolver = NameResolver::new(
        config,
        store.clone(),
        pool.clone(),
        netenv.clone(),
        notifier.clone(),
    );
    TestSetup {
        resolver,
        store,
        pool,
        netenv,
        notifier,
    }
}

pub fn setup(resolvers: Vec<Arc<UpstreamResolver>>) -> TestSetup {
    setup_with_config(test_config(), resolvers)
}

/// A normalized query for `fqdn`, type A.
pub fn query(fqdn: &str) -> Query {
    let mut q = Query::new(fqdn, RecordType::A);
    assert!(q.normalize());
    q
}

/// Store a cached answer attributed to `resolver_id`, expiring at `expires`.
pub fn preload(
    store: &MemoryStore,
    fqdn: &str,
    resolver_id: &str,
    rcode: ResponseCode,
    expires: i64,
) {
    let mut rr = RRCache::new(fqdn, RecordType::A, rcode);
    if rcode == ResponseCode::NoError {
        rr.answer
            .push(Record::a(fqdn, 600, Ipv4Addr::new(192, 0, 2, 10)));
    }
    rr.expires = expires;
    rr.resolver = resolver_info(resolver_id);
    store.save(&rr).expect("preload must succeed");
}

/// Unix timestamp `secs` from now.
pub fn now_plus(secs: i64) -> i64 {
    unix_now() + secs
}

/// Wait until `predicate` holds, failing after two seconds.
pub async fn wait_until(mut predicate: impl FnMut() -> bool, what: &str) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Error stub replies.
pub fn fail_with(err: ResolveError) -> impl Fn(&Query) -> Result<RRCache> + Send + Sync {
    move |_q| Err(err.clone())
}
