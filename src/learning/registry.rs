//! Canonical entity names and their aliases

use parking_lot::RwLock;
use std::collections::HashMap;

/// Seed table: canonical bank name, aliases
///
/// Canonical names never change after seeding; the learner may add new
/// canonical entries and extend alias sets.
const SEED_BANKS: &[(&str, &[&str])] = &[
    ("中国银行", &["中行", "BOC"]),
    ("工商银行", &["中国工商银行", "工行", "ICBC"]),
    ("建设银行", &["中国建设银行", "建行", "CCB"]),
    ("农业银行", &["中国农业银行", "农行", "ABChina"]),
    ("交通银行", &["交行", "BOCOM"]),
    ("招商银行", &["招行", "CMB"]),
    ("浦发银行", &["浦发", "SPDB"]),
    ("民生银行", &["民生", "CMBC"]),
    ("兴业银行", &["兴业", "CIB"]),
    ("平安银行", &["PAB"]),
    ("中信银行", &["中信", "CITIC"]),
    ("光大银行", &["光大", "CEB"]),
    ("华夏银行", &["华夏", "HXB"]),
    ("广发银行", &["广发", "CGB"]),
    ("邮储银行", &["邮政储蓄银行", "邮储", "PSBC"]),
    ("北京银行", &["BOB"]),
    ("上海银行", &["BOSC"]),
    ("花旗银行", &["花旗", "Citibank", "Citi"]),
    ("汇丰银行", &["汇丰", "HSBC"]),
    ("渣打银行", &["渣打", "Standard Chartered"]),
    ("星展银行", &["星展", "DBS"]),
    ("摩根大通", &["JPMorgan Chase", "JPM"]),
    ("德意志银行", &["德银", "Deutsche Bank"]),
    ("瑞银", &["UBS", "瑞士银行"]),
    ("巴克莱银行", &["巴克莱", "Barclays"]),
    ("三菱UFJ银行", &["三菱", "MUFG"]),
    ("三井住友银行", &["三井住友", "SMBC"]),
    ("瑞穗银行", &["瑞穗", "Mizuho"]),
];

/// Canonical name to alias set mapping
pub struct EntityRegistry {
    entities: RwLock<HashMap<String, Vec<String>>>,
}

impl EntityRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Registry seeded with the lending-domain bank table
    pub fn seeded() -> Self {
        let mut entities = HashMap::new();
        for (canonical, aliases) in SEED_BANKS {
            entities.insert(
                canonical.to_string(),
                aliases.iter().map(|a| a.to_string()).collect(),
            );
        }
        Self {
            entities: RwLock::new(entities),
        }
    }

    /// Register a new canonical entity; a no-op if it already exists
    pub fn add_entity(&self, canonical: &str, aliases: Vec<String>) {
        let mut entities = self.entities.write();
        let entry = entities.entry(canonical.to_string()).or_default();
        for alias in aliases {
            let alias = alias.trim().to_string();
            if !alias.is_empty() && alias != canonical && !entry.contains(&alias) {
                entry.push(alias);
            }
        }
    }

    /// Extend the alias set of an existing canonical entity
    pub fn add_aliases(&self, canonical: &str, aliases: &[String]) -> bool {
        let mut entities = self.entities.write();
        let Some(entry) = entities.get_mut(canonical) else {
            return false;
        };
        for alias in aliases {
            let alias = alias.trim().to_string();
            if !alias.is_empty() && alias != canonical && !entry.contains(&alias) {
                entry.push(alias);
            }
        }
        true
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.entities.read().contains_key(canonical)
    }

    /// All canonical names, longest first for longest-match scans
    pub fn canonical_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.read().keys().cloned().collect();
        names.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });
        names
    }

    /// `(canonical, alias)` pairs for alias scanning
    pub fn alias_pairs(&self) -> Vec<(String, String)> {
        let entities = self.entities.read();
        let mut pairs = Vec::new();
        for (canonical, aliases) in entities.iter() {
            for alias in aliases {
                pairs.push((canonical.clone(), alias.clone()));
            }
        }
        pairs
    }

    /// Canonical name plus its aliases
    pub fn all_names(&self, canonical: &str) -> Vec<String> {
        let entities = self.entities.read();
        let mut names = vec![canonical.to_string()];
        if let Some(aliases) = entities.get(canonical) {
            names.extend(aliases.iter().cloned());
        }
        names
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::seeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_registry_knows_major_banks() {
        let registry = EntityRegistry::seeded();
        assert!(registry.contains("中国银行"));
        assert!(registry.contains("花旗银行"));
        assert!(registry
            .alias_pairs()
            .iter()
            .any(|(c, a)| c == "汇丰银行" && a == "HSBC"));
    }

    #[test]
    fn learner_can_add_but_not_rename() {
        let registry = EntityRegistry::seeded();
        registry.add_entity("恒生银行", vec!["恒生".to_string(), "Hang Seng".to_string()]);
        assert!(registry.contains("恒生银行"));
        assert_eq!(
            registry.all_names("恒生银行"),
            vec!["恒生银行", "恒生", "Hang Seng"]
        );

        // Extending aliases never touches the canonical key
        registry.add_aliases("恒生银行", &["HSB".to_string()]);
        assert!(registry.contains("恒生银行"));
        assert!(!registry.add_aliases("不存在银行", &["x".to_string()]));
    }

    #[test]
    fn canonical_names_longest_first() {
        let registry = EntityRegistry::seeded();
        let names = registry.canonical_names();
        let first_len = names[0].chars().count();
        let last_len = names.last().unwrap().chars().count();
        assert!(first_len >= last_len);
    }
}
