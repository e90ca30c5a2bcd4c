//! Deterministic entity detection over the alias registry

use regex::Regex;
use std::sync::Arc;

use crate::store::KnowledgeStore;

use super::registry::EntityRegistry;

/// Detection result for a user message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Entity named and already covered by the knowledge store
    Known(String),
    /// Entity named but absent from the store; a learning candidate
    Unknown(String),
    /// No specific entity, including generic "which banks" phrasing
    None,
}

/// Phrases that mark a generic or plural bank query
const GENERIC_PATTERNS: &[&str] = &[
    "哪些银行",
    "什么银行",
    "哪个银行好",
    "哪家银行",
    "银行比较",
    "外资银行",
    "国外银行",
    "大陆银行",
    "国内银行",
    "which bank",
    "what bank",
];

/// Generic words that an `XX银行` pattern capture must not name
const GENERIC_CAPTURES: &[&str] = &[
    "哪些", "什么", "国外", "外资", "大陆", "国内", "台湾", "这些", "那些", "所有", "知名",
    "其他", "别的", "一些", "各大", "商业", "中央",
];

/// Entity detector
///
/// Precedence: canonical full-name substring (longest, then earliest), then
/// generic suppression, then alias match, then an `XX银行` pattern capture.
pub struct EntityDetector {
    registry: Arc<EntityRegistry>,
    bank_pattern: Regex,
}

impl EntityDetector {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self {
            registry,
            bank_pattern: Regex::new(r"([\p{Han}A-Za-z]{2,8}银行)").expect("valid regex"),
        }
    }

    /// Detect the entity a message is about
    pub fn detect(&self, message: &str, store: &KnowledgeStore) -> Detection {
        match self.detect_name(message) {
            Some(name) => {
                if store.contains_entity(&name) {
                    Detection::Known(name)
                } else {
                    Detection::Unknown(name)
                }
            }
            None => Detection::None,
        }
    }

    /// Name resolution without the store probe
    pub fn detect_name(&self, message: &str) -> Option<String> {
        let lowered = message.to_lowercase();

        // 1. Canonical full-name substrings win outright; longest first, ties
        //    broken by earliest occurrence
        let mut best: Option<(String, usize, usize)> = None; // (name, len, pos)
        for canonical in self.registry.canonical_names() {
            if let Some(pos) = lowered.find(&canonical.to_lowercase()) {
                let len = canonical.chars().count();
                let better = match &best {
                    Some((_, best_len, best_pos)) => {
                        len > *best_len || (len == *best_len && pos < *best_pos)
                    }
                    None => true,
                };
                if better {
                    best = Some((canonical, len, pos));
                }
            }
        }
        if let Some((name, _, _)) = best {
            return Some(name);
        }

        // 2. Generic phrasing means no specific entity
        if GENERIC_PATTERNS.iter().any(|p| lowered.contains(p)) {
            return None;
        }

        // 3. Alias match; short aliases need bank context in the message
        let mut best_alias: Option<(String, usize, usize)> = None;
        for (canonical, alias) in self.registry.alias_pairs() {
            let alias_lower = alias.to_lowercase();
            let Some(pos) = lowered.find(&alias_lower) else {
                continue;
            };
            let alias_len = alias.chars().count();
            if alias_len <= 2 && !lowered.contains("银行") {
                // Two-character aliases like 平安 or 中信 are ambiguous
                // without bank context
                continue;
            }
            let better = match &best_alias {
                Some((_, best_len, best_pos)) => {
                    alias_len > *best_len || (alias_len == *best_len && pos < *best_pos)
                }
                None => true,
            };
            if better {
                best_alias = Some((canonical, alias_len, pos));
            }
        }
        if let Some((name, _, _)) = best_alias {
            return Some(name);
        }

        // 4. XX银行 pattern capture, filtered against generic words
        for capture in self.bank_pattern.captures_iter(message) {
            let candidate = capture[1].to_string();
            let stem = candidate.trim_end_matches("银行");
            if stem.is_empty() || GENERIC_CAPTURES.iter().any(|g| stem.contains(g)) {
                continue;
            }
            return Some(candidate);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnowledgeChunk;

    fn detector() -> EntityDetector {
        EntityDetector::new(Arc::new(EntityRegistry::seeded()))
    }

    #[test]
    fn canonical_name_wins() {
        assert_eq!(
            detector().detect_name("招商银行的信用贷款利率是多少"),
            Some("招商银行".to_string())
        );
    }

    #[test]
    fn two_canonical_names_earliest_wins_on_tie() {
        assert_eq!(
            detector().detect_name("中国银行和花旗银行哪个好"),
            Some("中国银行".to_string())
        );
    }

    #[test]
    fn longer_canonical_beats_shorter() {
        // 三井住友银行 (6 chars) should beat any shorter canonical hit
        assert_eq!(
            detector().detect_name("三井住友银行在上海有分行吗"),
            Some("三井住友银行".to_string())
        );
    }

    #[test]
    fn generic_query_suppressed() {
        let d = detector();
        assert_eq!(d.detect_name("介绍一下国外有哪些银行在中国有业务"), None);
        assert_eq!(d.detect_name("什么银行的利率最低"), None);
        assert_eq!(d.detect_name("哪家银行适合小微企业"), None);
    }

    #[test]
    fn alias_resolves_to_canonical() {
        let d = detector();
        assert_eq!(d.detect_name("HSBC的房贷怎么样"), Some("汇丰银行".to_string()));
        assert_eq!(d.detect_name("花旗的银行业务怎么样"), Some("花旗银行".to_string()));
    }

    #[test]
    fn short_alias_needs_bank_context() {
        let d = detector();
        // 平安 alone is the insurance group, not the bank
        assert_eq!(d.detect_name("平安保险的理赔流程"), None);
        assert_eq!(d.detect_name("中信的银行卡怎么办理"), Some("中信银行".to_string()));
    }

    #[test]
    fn pattern_capture_finds_unlisted_bank() {
        assert_eq!(
            detector().detect_name("恒丰银行的贷款产品有哪些特点"),
            Some("恒丰银行".to_string())
        );
    }

    #[test]
    fn known_vs_unknown_by_store() {
        let d = detector();
        let store = KnowledgeStore::ephemeral(4);
        store
            .insert(KnowledgeChunk::new("招商银行简介", "招商银行总部位于深圳", "bank_info"))
            .unwrap();

        assert_eq!(
            d.detect("招商银行的利率", &store),
            Detection::Known("招商银行".to_string())
        );
        assert_eq!(
            d.detect("星展银行的利率", &store),
            Detection::Unknown("星展银行".to_string())
        );
        assert_eq!(d.detect("今天天气怎么样", &store), Detection::None);
    }
}
