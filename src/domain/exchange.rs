/// Exchange Whitelist — static + dynamically-augmented set of CEX / AMM /
/// routing addresses, with O(1) membership (spec §4.12).
///
/// The static set never shrinks; auto-detected entries (spec §4.10) are
/// appended and the whole set is republished behind an `arc-swap`-style
/// copy-on-write pointer so readers never take a lock on the hot path,
/// matching the "extend-only sets use append-and-publish" re-shape in
/// Design Notes §9.
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoDetectedExchange {
    pub address: String,
    pub label: String,
    pub detected_at: chrono::DateTime<chrono::Utc>,
    pub source: String,
}

/// Thread-safe, write-once-mostly exchange address set.
pub struct ExchangeWhitelist {
    static_set: HashSet<String>,
    published: RwLock<Arc<HashSet<String>>>,
    auto_detected: RwLock<Vec<AutoDetectedExchange>>,
    generation: AtomicUsize,
}

impl ExchangeWhitelist {
    pub fn new(static_set: HashSet<String>) -> Self {
        let published = Arc::new(static_set.clone());
        Self {
            static_set,
            published: RwLock::new(published),
            auto_detected: RwLock::new(Vec::new()),
            generation: AtomicUsize::new(0),
        }
    }

    /// O(1) membership test against the current published snapshot.
    pub fn contains(&self, address: &str) -> bool {
        self.published.read().unwrap().contains(address)
    }

    /// Snapshot the current set for batch filtering.
    pub fn snapshot(&self) -> Arc<HashSet<String>> {
        self.published.read().unwrap().clone()
    }

    /// Promote an address into the whitelist from an opportunistically
    /// labelled RPC/oracle response (spec §4.10). A label is only
    /// accepted if it matches the exchange-keyword regex; first writer
    /// for a given address wins (subsequent detections are no-ops).
    pub fn try_auto_detect(&self, address: &str, label: &str, source: &str) -> bool {
        if !exchange_keyword_regex().is_match(&label.to_lowercase()) {
            return false;
        }
        if self.contains(address) {
            return false;
        }

        {
            let mut auto = self.auto_detected.write().unwrap();
            if auto.iter().any(|e| e.address == address) {
                return false;
            }
            auto.push(AutoDetectedExchange {
                address: address.to_string(),
                label: label.to_string(),
                detected_at: chrono::Utc::now(),
                source: source.to_string(),
            });
        }

        self.publish();
        crate::metrics::EXCHANGE_AUTO_DETECTED.inc();
        true
    }

    fn publish(&self) {
        let mut merged = self.static_set.clone();
        for entry in self.auto_detected.read().unwrap().iter() {
            merged.insert(entry.address.clone());
        }
        *self.published.write().unwrap() = Arc::new(merged);
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn auto_detected(&self) -> Vec<AutoDetectedExchange> {
        self.auto_detected.read().unwrap().clone()
    }

    pub fn generation(&self) -> usize {
        self.generation.load(Ordering::Relaxed)
    }
}

fn exchange_keyword_regex() -> &'static Regex {
    lazy_static::lazy_static! {
        static ref RE: Regex = Regex::new(
            "binance|okx|bybit|kucoin|gate|htx|coinbase|kraken|bitget|mexc|cex"
        ).unwrap();
    }
    &RE
}

/// Static labelled-entity directories (CEX / swap / mixer / bridge) used
/// by the funding-source analyzer and the on-chain tracer (spec §4.5,
/// §4.9). First match wins; a plain wallet is the default.
#[derive(Debug, Clone)]
pub struct EntityDirectory {
    pub cex: HashMap<String, HashSet<String>>,
    pub swap: HashMap<String, HashSet<String>>,
    pub mixer: HashMap<String, HashSet<String>>,
    pub bridge: HashMap<String, HashSet<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

pub struct EntityMatch {
    pub entity_type: crate::domain::schema::EntityType,
    pub label: String,
    pub risk_tier: RiskTier,
}

impl EntityDirectory {
    pub fn new(
        cex: HashMap<String, HashSet<String>>,
        swap: HashMap<String, HashSet<String>>,
        mixer: HashMap<String, HashSet<String>>,
        bridge: HashMap<String, HashSet<String>>,
    ) -> Self {
        Self { cex, swap, mixer, bridge }
    }

    /// Classify an address by exact equality only (spec's Open Questions
    /// fix this — no fuzzy/substring matching). CEX first, then swap
    /// (HIGH), then bridge (MEDIUM); a plain wallet is the default.
    pub fn classify(&self, address: &str) -> Option<EntityMatch> {
        for (name, set) in &self.cex {
            if set.contains(address) {
                return Some(EntityMatch {
                    entity_type: crate::domain::schema::EntityType::Cex,
                    label: name.clone(),
                    risk_tier: RiskTier::Low,
                });
            }
        }
        for (name, set) in &self.swap {
            if set.contains(address) {
                return Some(EntityMatch {
                    entity_type: crate::domain::schema::EntityType::Swap,
                    label: name.clone(),
                    risk_tier: RiskTier::High,
                });
            }
        }
        for (name, set) in &self.mixer {
            if set.contains(address) {
                return Some(EntityMatch {
                    entity_type: crate::domain::schema::EntityType::Mixer,
                    label: name.clone(),
                    risk_tier: RiskTier::High,
                });
            }
        }
        for (name, set) in &self.bridge {
            if set.contains(address) {
                return Some(EntityMatch {
                    entity_type: crate::domain::schema::EntityType::Bridge,
                    label: name.clone(),
                    risk_tier: RiskTier::Medium,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_membership() {
        let mut set = HashSet::new();
        set.insert("Exch1".to_string());
        let wl = ExchangeWhitelist::new(set);
        assert!(wl.contains("Exch1"));
        assert!(!wl.contains("Other"));
    }

    #[test]
    fn auto_detect_requires_keyword_match() {
        let wl = ExchangeWhitelist::new(HashSet::new());
        assert!(!wl.try_auto_detect("Addr1", "Random Wallet", "rpc"));
        assert!(wl.try_auto_detect("Addr1", "Binance Hot Wallet 3", "rpc"));
        assert!(wl.contains("Addr1"));
    }

    #[test]
    fn auto_detect_is_first_writer_wins() {
        let wl = ExchangeWhitelist::new(HashSet::new());
        assert!(wl.try_auto_detect("Addr1", "Coinbase", "rpc"));
        assert!(!wl.try_auto_detect("Addr1", "Coinbase 2", "rpc"));
        assert_eq!(wl.auto_detected().len(), 1);
    }

    #[test]
    fn exact_match_only_directory() {
        let mut cex = HashMap::new();
        let mut set = HashSet::new();
        set.insert("Full44CharAddressXXXXXXXXXXXXXXXXXXXXXXXXXX".to_string());
        cex.insert("Coinbase".to_string(), set);
        let dir = EntityDirectory::new(cex, HashMap::new(), HashMap::new(), HashMap::new());
        assert!(dir.classify("Full44CharAddressXXXXXXXXXXXXXXXXXXXXXXXXXX").is_some());
        assert!(dir.classify("Full44Char").is_none());
    }
}
