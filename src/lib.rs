pub mod cache;
pub mod config;
pub mod constants;
pub mod dedupe;
pub mod error;
pub mod netenv;
pub mod notify;
pub mod psl;
pub mod query;
pub mod resolver;
pub mod rr;
pub mod shutdown;
pub mod upstream;

pub use cache::{MemoryStore, RRCache, RecordStore};
pub use error::{ResolveError, Result};
pub use query::{Query, SecurityLevel};
pub use resolver::NameResolver;
pub use rr::{RData, Record, RecordType, ResponseCode};
pub use upstream::{ResolverConn, ResolverInfo, ResolverPool, UpstreamResolver};
