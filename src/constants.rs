use std::time::Duration;

/// Lowest TTL written to the record store.
pub const MIN_TTL: u32 = 60;

/// Lowest TTL for records answered by multicast resolvers.
pub const MIN_MDNS_TTL: u32 = 60;

/// Highest TTL written to the record store.
pub const MAX_TTL: u32 = 86_400;

/// Remaining lifetime below which a cached record is refreshed in the background.
pub const REFRESH_TTL: u32 = MIN_TTL / 2;

/// Upper bound on waiting for an in-flight duplicate query.
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(7);

/// Repeated identical queries needed to trip a cache reset.
pub const CACHE_RESET_THRESHOLD: i32 = 3;

/// Tally offset applied after a cache reset trips.
pub const CACHE_RESET_BACKOFF: i32 = -7;

/// Consecutive transport failures before a resolver is reported as failing.
pub const RESOLVER_FAIL_THRESHOLD: u64 = 3;

/// How long a resolver stays in the failing state without new failures.
pub const RESOLVER_FAIL_DURATION: Duration = Duration::from_secs(300);
