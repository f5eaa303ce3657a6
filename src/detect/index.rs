//! Alias index — the read-only lookup structure built from campaign config.
//!
//! Construction enforces the one invariant configuration can violate: an
//! alias may never map to two creators. The index itself is immutable; a
//! config reload builds a fresh one (see [`crate::config::ConfigProvider`]).

use std::collections::HashMap;

use crate::config::CampaignConfig;
use crate::error::ConfigError;

/// A campaign creator with its code and matchable names.
#[derive(Debug, Clone)]
pub struct Creator {
    /// Canonical handle — the unique key.
    pub handle: String,
    /// Discount code issued for this creator.
    pub code: String,
    /// Lowercased alias strings, including the handle itself and its
    /// underscore-to-space variant.
    pub aliases: Vec<String>,
    /// Per-creator fuzzy acceptance override.
    pub fuzzy_threshold: Option<f64>,
}

/// Static mapping from aliases to creators.
#[derive(Debug, Clone)]
pub struct AliasIndex {
    creators: Vec<Creator>,
    by_handle: HashMap<String, usize>,
}

impl AliasIndex {
    /// Build the index from campaign configuration.
    ///
    /// Fails if any alias (after case folding) belongs to more than one
    /// creator.
    pub fn from_config(config: &CampaignConfig) -> Result<Self, ConfigError> {
        let mut creators = Vec::with_capacity(config.creators.len());
        let mut by_handle = HashMap::new();
        let mut alias_owner: HashMap<String, String> = HashMap::new();

        for (handle, entry) in &config.creators {
            let mut aliases: Vec<String> = Vec::with_capacity(entry.aliases.len() + 2);
            let mut push_alias = |aliases: &mut Vec<String>, alias: String| {
                if !alias.is_empty() && !aliases.contains(&alias) {
                    aliases.push(alias);
                }
            };

            push_alias(&mut aliases, handle.to_lowercase());
            push_alias(&mut aliases, handle.to_lowercase().replace('_', " "));
            for alias in &entry.aliases {
                push_alias(&mut aliases, alias.trim().to_lowercase());
            }

            for alias in &aliases {
                if let Some(owner) = alias_owner.get(alias) {
                    if owner != handle {
                        return Err(ConfigError::DuplicateAlias {
                            alias: alias.clone(),
                            first: owner.clone(),
                            second: handle.clone(),
                        });
                    }
                } else {
                    alias_owner.insert(alias.clone(), handle.clone());
                }
            }

            by_handle.insert(handle.clone(), creators.len());
            creators.push(Creator {
                handle: handle.clone(),
                code: entry.code.clone(),
                aliases,
                fuzzy_threshold: entry.fuzzy_threshold,
            });
        }

        Ok(Self { creators, by_handle })
    }

    /// All creators, in stable (handle-sorted) order.
    pub fn creators(&self) -> &[Creator] {
        &self.creators
    }

    /// Look up a creator by canonical handle.
    pub fn creator(&self, handle: &str) -> Option<&Creator> {
        self.by_handle.get(handle).map(|&i| &self.creators[i])
    }

    /// Number of creators in the campaign.
    pub fn len(&self) -> usize {
        self.creators.len()
    }

    /// True if no creators are configured.
    pub fn is_empty(&self) -> bool {
        self.creators.is_empty()
    }

    /// Fuzzy acceptance threshold for a handle, with the global default.
    pub fn threshold_for(&self, handle: &str, default: f64) -> f64 {
        self.creator(handle)
            .and_then(|c| c.fuzzy_threshold)
            .unwrap_or(default)
    }

    /// Canonical handles — the fallback caller's allow-list.
    pub fn allow_list(&self) -> Vec<&str> {
        self.creators.iter().map(|c| c.handle.as_str()).collect()
    }

    /// Compact "handle (alias, alias, ...)" lines for the fallback prompt.
    pub fn hint_list(&self) -> Vec<String> {
        self.creators
            .iter()
            .map(|c| {
                let aliases: Vec<&str> = c
                    .aliases
                    .iter()
                    .filter(|a| *a != &c.handle)
                    .map(String::as_str)
                    .collect();
                if aliases.is_empty() {
                    c.handle.clone()
                } else {
                    format!("{} ({})", c.handle, aliases.join(", "))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CampaignConfig;

    fn demo_index() -> AliasIndex {
        AliasIndex::from_config(&CampaignConfig::demo()).unwrap()
    }

    #[test]
    fn builds_from_demo_config() {
        let index = demo_index();
        assert_eq!(index.len(), 4);
        let mkbhd = index.creator("mkbhd").unwrap();
        assert_eq!(mkbhd.code, "MARQUES20");
        assert!(mkbhd.aliases.contains(&"marques brownlee".to_string()));
        // Handle itself is always an alias
        assert!(mkbhd.aliases.contains(&"mkbhd".to_string()));
    }

    #[test]
    fn handle_underscore_variant_is_an_alias() {
        let index = demo_index();
        let casey = index.creator("casey_neistat").unwrap();
        assert!(casey.aliases.contains(&"casey neistat".to_string()));
    }

    #[test]
    fn rejects_cross_creator_duplicate_alias() {
        let raw = r#"
campaign = "x"
[creators.a]
code = "A1"
aliases = ["shared"]
[creators.b]
code = "B1"
aliases = ["shared"]
"#;
        let config = CampaignConfig::from_toml(raw).unwrap();
        let err = AliasIndex::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateAlias { .. }));
    }

    #[test]
    fn same_creator_duplicate_alias_is_deduped() {
        let raw = r#"
campaign = "x"
[creators.mkbhd]
code = "M1"
aliases = ["mkbhd", "MKBHD", "marques"]
"#;
        let config = CampaignConfig::from_toml(raw).unwrap();
        let index = AliasIndex::from_config(&config).unwrap();
        let aliases = &index.creator("mkbhd").unwrap().aliases;
        assert_eq!(
            aliases.iter().filter(|a| *a == "mkbhd").count(),
            1
        );
    }

    #[test]
    fn threshold_override_wins() {
        let raw = r#"
campaign = "x"
[creators.a]
code = "A1"
fuzzy_threshold = 0.9
[creators.b]
code = "B1"
"#;
        let config = CampaignConfig::from_toml(raw).unwrap();
        let index = AliasIndex::from_config(&config).unwrap();
        assert!((index.threshold_for("a", 0.8) - 0.9).abs() < 1e-9);
        assert!((index.threshold_for("b", 0.8) - 0.8).abs() < 1e-9);
        assert!((index.threshold_for("missing", 0.8) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn hint_list_mentions_handles_and_aliases() {
        let index = demo_index();
        let hints = index.hint_list();
        assert_eq!(hints.len(), 4);
        assert!(hints.iter().any(|h| h.starts_with("mkbhd (")));
        assert!(hints.iter().any(|h| h.contains("marques brownlee")));
    }

    #[test]
    fn allow_list_is_handles_only() {
        let index = demo_index();
        let allow = index.allow_list();
        assert!(allow.contains(&"mkbhd"));
        assert!(allow.contains(&"casey_neistat"));
        assert!(!allow.contains(&"marques"));
    }
}
