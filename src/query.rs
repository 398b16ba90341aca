use crate::psl;
use crate::rr::RecordType;

/// Security level a query is issued under; affects resolver eligibility.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum SecurityLevel {
    #[default]
    Normal,
    High,
    Extreme,
}

/// A DNS question, immutable once normalized.
#[derive(Clone, Debug, Default)]
pub struct Query {
    /// Canonical trailing-dot domain name, lowercase.
    pub fqdn: String,
    pub qtype: RecordType,
    pub security_level: SecurityLevel,

    /// Bypass the cache gate and skip saving the answer.
    pub no_caching: bool,
    /// Query resolvers even while they are marked failing.
    pub ignore_failing: bool,
    /// Only resolvers on the local network are eligible.
    pub local_resolvers_only: bool,

    /// Whether the domain sits under an ICANN-managed public suffix.
    pub icann_space: bool,
    /// Effective TLD plus one label, trailing-dot form; empty for bare suffixes.
    pub domain_root: String,

    dot_prefixed_fqdn: String,
}

impl Query {
    pub fn new(fqdn: impl Into<String>, qtype: RecordType) -> Self {
        Self {
            fqdn: fqdn.into(),
            qtype,
            ..Default::default()
        }
    }

    /// Dedupe and cache key: FQDN followed by the record type name.
    pub fn id(&self) -> String {
        format!("{}{}", self.fqdn, self.qtype)
    }

    /// Canonicalize the query and derive the public-suffix fields.
    ///
    /// Returns false iff the FQDN is empty; all other inputs normalize.
    pub fn normalize(&mut self) -> bool {
        if self.fqdn.is_empty() {
            return false;
        }

        self.fqdn.make_ascii_lowercase();
        if !self.fqdn.ends_with('.') {
            self.fqdn.push('.');
        }

        self.dot_prefixed_fqdn = if self.fqdn == "." {
            self.fqdn.clone()
        } else {
            format!(".{}", self.fqdn)
        };

        self.init_public_suffix_data();
        true
    }

    /// FQDN with a leading dot, for suffix-scope matching.
    pub fn dot_prefixed_fqdn(&self) -> &str {
        &self.dot_prefixed_fqdn
    }

    /// Whether the FQDN falls into one of the given dot-prefixed scopes.
    pub fn in_scope(&self, scopes: &[&str]) -> bool {
        scopes
            .iter()
            .any(|scope| self.dot_prefixed_fqdn.ends_with(scope))
    }

    fn init_public_suffix_data(&mut self) {
        self.icann_space = false;
        self.domain_root = String::new();

        let domain = self.fqdn.trim_end_matches('.');
        let Some(found) = psl::suffixes().public_suffix(domain) else {
            return;
        };

        // A dotted suffix is a multi-label rule on the ICANN side of the
        // namespace even when the list keeps it in the private section.
        if found.icann || found.suffix.contains('.') {
            self.icann_space = true;
        }
        match found.suffix.as_str() {
            "example" | "invalid" | "local" | "localhost" | "test" => self.icann_space = true,
            "onion" => self.icann_space = false,
            _ => {}
        }

        let suffix_with_dot_len = found.suffix.len() + 1;
        if self.fqdn.len() == suffix_with_dot_len {
            // The FQDN is a bare public suffix; there is no domain root.
            return;
        }
        let head = &self.fqdn[..self.fqdn.len() - suffix_with_dot_len - 1];
        let root_start = head.rfind('.').map(|i| i + 1).unwrap_or(0);
        self.domain_root = self.fqdn[root_start..].to_string();
    }
}
