use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// A public-suffix rule as parsed from the suffix list.
#[derive(Debug, Clone, Copy)]
struct Rule {
    icann: bool,
    exception: bool,
}

/// Result of a public-suffix lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suffix {
    /// The matched suffix, without a trailing dot.
    pub suffix: String,
    /// Whether the suffix sits in the ICANN-managed section of the list.
    pub icann: bool,
}

/// Public-suffix table for domain classification.
///
/// Loaded once from the embedded list at startup; a full list can be swapped
/// in at runtime without touching readers.
pub struct PublicSuffixes {
    rules: RwLock<HashMap<String, Rule>>,
}

impl PublicSuffixes {
    pub fn new() -> Self {
        let table = Self {
            rules: RwLock::new(HashMap::new()),
        };
        // The embedded list is always parseable; an empty table would make
        // every domain fall back to the implicit last-label rule.
        let count = table.load_from_string(include_str!("../assets/common_suffixes.txt"));
        debug!("loaded {} built-in public-suffix rules", count);
        table
    }

    /// Parse suffix rules from list data, replacing the current table.
    ///
    /// Follows the list format: comments, `!` exceptions, `*.` wildcards,
    /// and the ICANN / PRIVATE section markers.
    pub fn load_from_string(&self, data: &str) -> usize {
        let mut rules = HashMap::new();
        let mut in_private_section = false;

        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                if line.contains("===BEGIN PRIVATE DOMAINS===") {
                    in_private_section = true;
                } else if line.contains("===BEGIN ICANN DOMAINS===") {
                    in_private_section = false;
                }
                continue;
            }

            let (domain, exception) = match line.strip_prefix('!') {
                Some(rest) => (rest, true),
                None => (line, false),
            };

            rules.insert(
                domain.to_ascii_lowercase(),
                Rule {
                    icann: !in_private_section,
                    exception,
                },
            );
        }

        let count = rules.len();
        *self.rules.write() = rules;
        count
    }

    /// Find the public suffix of `domain` (no trailing dot expected).
    ///
    /// Returns the longest matching rule; exceptions shed their leftmost
    /// label per the list algorithm. Unlisted TLDs fall back to the implicit
    /// last-label rule and are not considered ICANN-managed.
    pub fn public_suffix(&self, domain: &str) -> Option<Suffix> {
        if domain.is_empty() {
            return None;
        }

        let domain = domain.to_ascii_lowercase();
        let labels: Vec<&str> = domain.split('.').collect();
        if labels.iter().any(|l| l.is_empty()) {
            return None;
        }

        let rules = self.rules.read();
        for i in 0..labels.len() {
            let candidate = labels[i..].join(".");

            if let Some(rule) = rules.get(&candidate) {
                if rule.exception {
                    // An exception rule's suffix is the rule minus its
                    // leftmost label.
                    return Some(Suffix {
                        suffix: labels[i + 1..].join("."),
                        icann: rule.icann,
                    });
                }
                return Some(Suffix {
                    suffix: candidate,
                    icann: rule.icann,
                });
            }

            if i + 1 < labels.len() {
                let wildcard = format!("*.{}", labels[i + 1..].join("."));
                if let Some(rule) = rules.get(&wildcard) {
                    if !rule.exception {
                        return Some(Suffix {
                            suffix: candidate,
                            icann: rule.icann,
                        });
                    }
                }
            }
        }

        // Implicit "*" rule: the last label is the suffix.
        Some(Suffix {
            suffix: labels[labels.len() - 1].to_string(),
            icann: false,
        })
    }
}

impl Default for PublicSuffixes {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide suffix table, initialized once on first use.
pub fn suffixes() -> &'static PublicSuffixes {
    static SUFFIXES: std::sync::LazyLock<PublicSuffixes> = std::sync::LazyLock::new(PublicSuffixes::new);
    &SUFFIXES
}
