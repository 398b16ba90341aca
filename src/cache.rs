use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

use crate::constants::REFRESH_TTL;
use crate::error::StoreError;
use crate::rr::{RData, Record, RecordType, ResponseCode};
use crate::upstream::ResolverInfo;

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// A response record set with caching metadata.
#[derive(Clone, Debug, Default)]
pub struct RRCache {
    pub fqdn: String,
    pub qtype: RecordType,
    pub rcode: ResponseCode,

    pub answer: Vec<Record>,
    pub ns: Vec<Record>,
    pub extra: Vec<Record>,

    /// Absolute expiry, unix seconds.
    pub expires: i64,
    /// Identity of the resolver that produced this entry.
    pub resolver: ResolverInfo,

    /// An async refresh is in flight for this entry.
    pub requesting_new: bool,
    /// The entry is being served as a stale fallback.
    pub is_backup: bool,
}

impl RRCache {
    pub fn new(fqdn: impl Into<String>, qtype: RecordType, rcode: ResponseCode) -> Self {
        Self {
            fqdn: fqdn.into(),
            qtype,
            rcode,
            ..Default::default()
        }
    }

    pub fn id(&self) -> String {
        format!("{}{}", self.fqdn, self.qtype)
    }

    pub fn expired(&self) -> bool {
        self.expires <= unix_now()
    }

    /// Whether the entry is close enough to expiry to warrant a refresh.
    pub fn expires_soon(&self) -> bool {
        self.expires <= unix_now() + REFRESH_TTL as i64
    }

    /// Whether the entry may be written to the record store.
    pub fn cacheable(&self) -> bool {
        self.rcode == ResponseCode::NoError
    }

    /// Clamp record TTLs into `[min_ttl, max_ttl]` and derive the expiry.
    ///
    /// All records are leveled to the lowest TTL in the set, so the whole
    /// entry ages out at once.
    pub fn clean(&mut self, min_ttl: u32, max_ttl: u32) {
        let mut lowest = self
            .answer
            .iter()
            .chain(self.ns.iter())
            .chain(self.extra.iter())
            .map(|r| r.ttl)
            .min()
            .unwrap_or(min_ttl);

        lowest = lowest.clamp(min_ttl, max_ttl);
        for record in self
            .answer
            .iter_mut()
            .chain(self.ns.iter_mut())
            .chain(self.extra.iter_mut())
        {
            record.ttl = lowest;
        }
        self.expires = unix_now() + lowest as i64;
    }

    /// All IPv4 addresses in the answer section.
    pub fn export_all_a_records(&self) -> Vec<Ipv4Addr> {
        self.answer
            .iter()
            .filter_map(|record| match record.rdata {
                RData::A(addr) => Some(addr),
                _ => None,
            })
            .collect()
    }
}

/// Persistent store for resolved record sets.
///
/// A missing record is reported through the `StoreError::NotFound` sentinel,
/// never as an empty entry.
pub trait RecordStore: Send + Sync {
    fn get(&self, fqdn: &str, qtype: RecordType) -> Result<RRCache, StoreError>;
    fn save(&self, record: &RRCache) -> Result<(), StoreError>;
    fn reset(&self, fqdn: &str, qtype: RecordType) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct StoreKey {
    fqdn: String,
    qtype: RecordType,
}

impl StoreKey {
    fn new(fqdn: &str, qtype: RecordType) -> Self {
        Self {
            fqdn: fqdn.to_ascii_lowercase(),
            qtype,
        }
    }
}

/// Store counters for monitoring.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub resets: AtomicU64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// In-memory record store with a bounded entry count.
///
/// Expired entries are kept until evicted or pruned: the cache gate serves
/// them as backup seeds when upstream resolution fails.
pub struct MemoryStore {
    records: DashMap<StoreKey, RRCache>,
    max_entries: usize,
    insertion_order: Mutex<Vec<StoreKey>>,
    stats: CacheStats,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            records: DashMap::new(),
            max_entries,
            insertion_order: Mutex::new(Vec::new()),
            stats: CacheStats::default(),
        }
    }

    /// Drop entries that expired more than `grace` ago.
    pub fn prune_expired(&self, grace: Duration) {
        let cutoff = unix_now() - grace.as_secs() as i64;
        let stale: Vec<StoreKey> = self
            .records
            .iter()
            .filter(|entry| entry.value().expires <= cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        let count = stale.len();
        let mut order = self.insertion_order.lock();
        for key in &stale {
            self.records.remove(key);
            order.retain(|k| k != key);
        }
        if count > 0 {
            debug!("pruned {} stale record sets", count);
        }
    }

    fn evict_oldest(&self) {
        let evicted = {
            let mut order = self.insertion_order.lock();
            if order.is_empty() {
                None
            } else {
                Some(order.remove(0))
            }
        };
        if let Some(key) = evicted {
            self.records.remove(&key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            trace!("evicted oldest record set for {}", key.fqdn);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn debug_info(&self) -> String {
        format!(
            "store: size={}/{}, hits={}, misses={}, hit_rate={:.2}%, evictions={}, resets={}",
            self.len(),
            self.max_entries,
            self.stats.hits.load(Ordering::Relaxed),
            self.stats.misses.load(Ordering::Relaxed),
            self.stats.hit_rate() * 100.0,
            self.stats.evictions.load(Ordering::Relaxed),
            self.stats.resets.load(Ordering::Relaxed),
        )
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, fqdn: &str, qtype: RecordType) -> Result<RRCache, StoreError> {
        let key = StoreKey::new(fqdn, qtype);
        match self.records.get(&key) {
            Some(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                trace!("store hit for {} {}", fqdn, qtype);
                Ok(entry.value().clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                trace!("store miss for {} {}", fqdn, qtype);
                Err(StoreError::NotFound)
            }
        }
    }

    fn save(&self, record: &RRCache) -> Result<(), StoreError> {
        let key = StoreKey::new(&record.fqdn, record.qtype);
        if self.records.len() >= self.max_entries && !self.records.contains_key(&key) {
            self.evict_oldest();
        }
        self.records.insert(key.clone(), record.clone());

        let mut order = self.insertion_order.lock();
        order.retain(|k| k != &key);
        order.push(key);
        Ok(())
    }

    fn reset(&self, fqdn: &str, qtype: RecordType) -> Result<(), StoreError> {
        let key = StoreKey::new(fqdn, qtype);
        self.records.remove(&key);
        self.insertion_order.lock().retain(|k| k != &key);
        self.stats.resets.fetch_add(1, Ordering::Relaxed);
        debug!("reset cached record for {} {}", fqdn, qtype);
        Ok(())
    }
}
