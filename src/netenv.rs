use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::debug;

use crate::error::ResolveError;

/// Domain queried to test DNS reachability.
pub const DNS_TEST_DOMAIN: &str = "one.one.one.one.";

/// Domains used by connectivity and captive-portal checks. Queries for these
/// must get through even while the device looks offline.
const CONNECTIVITY_DOMAINS: &[&str] = &[
    "one.one.one.one.",
    "captive.apple.com.",
    "connectivitycheck.gstatic.com.",
    "detectportal.firefox.com.",
    "www.msftconnecttest.com.",
    "nmcheck.gnome.org.",
    "connectivity-check.ubuntu.com.",
];

/// Observed network connectivity state.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum OnlineStatus {
    #[default]
    Unknown,
    Offline,
    Portal,
    SemiOnline,
    Online,
}

/// Outcome of a DNS connectivity probe.
#[derive(Debug, Default)]
pub struct ProbeOutcome {
    pub ips: Vec<Ipv4Addr>,
    /// Whether the probe itself worked, regardless of the answer.
    pub ok: bool,
    pub err: Option<ResolveError>,
}

/// Callback slot for the DNS test query.
///
/// The resolver installs its probe here at init so this layer can test
/// connectivity without depending on the resolver.
pub type DnsTestQueryFn =
    dyn Fn(String) -> BoxFuture<'static, ProbeOutcome> + Send + Sync + 'static;

/// Network environment signals, as seen by the resolution core.
pub struct NetEnv {
    status: RwLock<OnlineStatus>,
    dns_test_query: RwLock<Option<Arc<DnsTestQueryFn>>>,
}

impl NetEnv {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(OnlineStatus::Unknown),
            dns_test_query: RwLock::new(None),
        }
    }

    pub fn get_online_status(&self) -> OnlineStatus {
        *self.status.read()
    }

    pub fn set_online_status(&self, status: OnlineStatus) {
        let previous = {
            let mut current = self.status.write();
            std::mem::replace(&mut *current, status)
        };
        if previous != status {
            debug!("online status changed: {:?} -> {:?}", previous, status);
        }
    }

    /// Whether the device has (at least partial) connectivity.
    pub fn online(&self) -> bool {
        matches!(
            self.get_online_status(),
            OnlineStatus::SemiOnline | OnlineStatus::Online
        )
    }

    /// Whether queries for this domain belong to connectivity checking.
    pub fn is_connectivity_domain(&self, fqdn: &str) -> bool {
        CONNECTIVITY_DOMAINS.contains(&fqdn)
    }

    /// Install the DNS test probe; called once at resolver init.
    pub fn set_dns_test_query(&self, probe: Arc<DnsTestQueryFn>) {
        *self.dns_test_query.write() = Some(probe);
    }

    /// Run the installed DNS test probe against `fqdn`, if any.
    pub async fn dns_test_query(&self, fqdn: &str) -> Option<ProbeOutcome> {
        let probe = self.dns_test_query.read().clone()?;
        Some(probe(fqdn.to_string()).await)
    }
}

impl Default for NetEnv {
    fn default() -> Self {
        Self::new()
    }
}
