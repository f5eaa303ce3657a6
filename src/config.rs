//! Campaign and template configuration.
//!
//! Configuration is loaded from TOML files into an immutable [`Snapshot`]
//! (alias index + templates + thresholds). The [`ConfigProvider`] publishes
//! the active snapshot behind a single pointer swap: readers clone an `Arc`
//! and keep working on whatever snapshot they grabbed; `reload` builds a
//! brand-new snapshot and swaps it in atomically. No reader ever observes a
//! half-updated index.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::detect::index::AliasIndex;
use crate::error::ConfigError;

// ── Campaign config ─────────────────────────────────────────────────

/// One creator entry in the campaign file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatorEntry {
    /// Discount code issued for this creator.
    pub code: String,
    /// Alternate names and handle variants (case-insensitive).
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Per-creator fuzzy acceptance threshold; falls back to
    /// `thresholds.fuzzy_accept` when unset.
    #[serde(default)]
    pub fuzzy_threshold: Option<f64>,
}

/// Matching thresholds, all in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Global fuzzy acceptance threshold (per-creator overrides win).
    #[serde(default = "default_fuzzy_accept")]
    pub fuzzy_accept: f64,
    /// Scores below this are discarded outright; between floor and accept
    /// is a recorded near-miss.
    #[serde(default = "default_fuzzy_reject_floor")]
    pub fuzzy_reject_floor: f64,
    /// Looser threshold used by the intent gate's "from <candidate>"
    /// referral detector. Intentionally below `fuzzy_accept` so near-miss
    /// mentions still reach full detection.
    #[serde(default = "default_gate_referral")]
    pub gate_referral: f64,
}

fn default_fuzzy_accept() -> f64 {
    0.8
}

fn default_fuzzy_reject_floor() -> f64 {
    0.6
}

fn default_gate_referral() -> f64 {
    0.7
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fuzzy_accept: default_fuzzy_accept(),
            fuzzy_reject_floor: default_fuzzy_reject_floor(),
            gate_referral: default_gate_referral(),
        }
    }
}

/// Feature flags for the detection cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flags {
    #[serde(default = "default_true")]
    pub enable_fuzzy_matching: bool,
    #[serde(default = "default_true")]
    pub enable_llm_fallback: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            enable_fuzzy_matching: true,
            enable_llm_fallback: true,
        }
    }
}

/// Top-level campaign configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Campaign name — the scoping unit for the one-code-per-user rule.
    pub campaign: String,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub flags: Flags,
    /// Keyed by canonical creator handle.
    pub creators: BTreeMap<String, CreatorEntry>,
}

impl CampaignConfig {
    /// Parse a campaign TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Parse campaign TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.creators.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "creators".into(),
                hint: "at least one [creators.<handle>] table is required".into(),
            });
        }
        for (key, bound) in [
            ("thresholds.fuzzy_accept", self.thresholds.fuzzy_accept),
            ("thresholds.fuzzy_reject_floor", self.thresholds.fuzzy_reject_floor),
            ("thresholds.gate_referral", self.thresholds.gate_referral),
        ] {
            if !(0.0..=1.0).contains(&bound) {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: format!("{bound} is outside [0, 1]"),
                });
            }
        }
        if self.thresholds.fuzzy_reject_floor > self.thresholds.fuzzy_accept {
            return Err(ConfigError::InvalidValue {
                key: "thresholds.fuzzy_reject_floor".into(),
                message: "reject floor exceeds acceptance threshold".into(),
            });
        }
        // The gate is meant to be the looser bar: a referral candidate that
        // passes it must still be able to fail full fuzzy acceptance.
        if self.thresholds.gate_referral > self.thresholds.fuzzy_accept {
            return Err(ConfigError::InvalidValue {
                key: "thresholds.gate_referral".into(),
                message: "gate referral threshold exceeds fuzzy acceptance threshold".into(),
            });
        }
        for (handle, entry) in &self.creators {
            if entry.code.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("creators.{handle}.code"),
                    message: "discount code must not be empty".into(),
                });
            }
            if let Some(t) = entry.fuzzy_threshold {
                if !(0.0..=1.0).contains(&t) {
                    return Err(ConfigError::InvalidValue {
                        key: format!("creators.{handle}.fuzzy_threshold"),
                        message: format!("{t} is outside [0, 1]"),
                    });
                }
            }
        }
        Ok(())
    }

    /// The built-in demo campaign used by the CLI and tests.
    pub fn demo() -> Self {
        let mut creators = BTreeMap::new();
        creators.insert(
            "mkbhd".to_string(),
            CreatorEntry {
                code: "MARQUES20".into(),
                aliases: vec!["marques brownlee".into(), "marques".into(), "brownlee".into()],
                fuzzy_threshold: None,
            },
        );
        creators.insert(
            "casey_neistat".to_string(),
            CreatorEntry {
                code: "CASEY15OFF".into(),
                aliases: vec!["casey".into(), "casey neistat".into(), "neistat".into()],
                fuzzy_threshold: None,
            },
        );
        creators.insert(
            "lily_singh".to_string(),
            CreatorEntry {
                code: "LILY25".into(),
                aliases: vec!["lily".into(), "lily singh".into(), "superwoman".into()],
                fuzzy_threshold: None,
            },
        );
        creators.insert(
            "peter_mckinnon".to_string(),
            CreatorEntry {
                code: "PETER10".into(),
                aliases: vec!["peter".into(), "peter mckinnon".into(), "mckinnon".into()],
                fuzzy_threshold: None,
            },
        );
        Self {
            campaign: "creator_launch".into(),
            thresholds: Thresholds::default(),
            flags: Flags::default(),
            creators,
        }
    }
}

// ── Reply templates ─────────────────────────────────────────────────

/// Reply templates, keyed by outcome.
///
/// Recognized placeholders: `{creator_handle}`, `{discount_code}`,
/// `{alternate_creator}`. Rendering lives in [`crate::reply`]; a missing
/// key falls back to a generic reply rather than erroring past the
/// boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSet {
    #[serde(default)]
    pub replies: BTreeMap<String, String>,
}

impl TemplateSet {
    /// Parse a templates TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Parse templates TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Look up a template by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.replies.get(key).map(String::as_str)
    }

    /// The built-in demo templates used by the CLI and tests.
    pub fn demo() -> Self {
        let mut replies = BTreeMap::new();
        replies.insert(
            "issue_code".to_string(),
            "Awesome — you came from {creator_handle}! Your discount code is {discount_code}."
                .to_string(),
        );
        replies.insert(
            "repeat_code".to_string(),
            "You already claimed this one. Here is your code again: {discount_code} (from {creator_handle})."
                .to_string(),
        );
        replies.insert(
            "already_committed".to_string(),
            "Your discount is linked to {creator_handle} — your code is {discount_code}. Codes can't be switched to {alternate_creator}."
                .to_string(),
        );
        replies.insert(
            "ask_creator".to_string(),
            "Happy to help! Which creator sent you? Reply with their name or handle.".to_string(),
        );
        replies.insert(
            "out_of_scope".to_string(),
            "Hi! If a creator sent you here for a discount code, tell us which one and we'll take care of it."
                .to_string(),
        );
        replies.insert(
            "error".to_string(),
            "Sorry — something went wrong on our side. Please try again in a moment.".to_string(),
        );
        Self { replies }
    }
}

// ── Snapshot & provider ─────────────────────────────────────────────

/// Immutable view of the active configuration.
///
/// Handed to the pipeline as a read-only value; safe for unlimited
/// concurrent readers. Replaced wholesale on reload.
#[derive(Debug)]
pub struct Snapshot {
    pub campaign: String,
    pub index: AliasIndex,
    pub templates: TemplateSet,
    pub thresholds: Thresholds,
    pub flags: Flags,
}

impl Snapshot {
    /// Build a snapshot from parsed configuration.
    pub fn build(config: &CampaignConfig, templates: TemplateSet) -> Result<Self, ConfigError> {
        let index = AliasIndex::from_config(config)?;
        Ok(Self {
            campaign: config.campaign.clone(),
            index,
            templates,
            thresholds: config.thresholds.clone(),
            flags: config.flags.clone(),
        })
    }

    /// Snapshot of the built-in demo campaign.
    pub fn demo() -> Self {
        // Demo config is static and validated by tests; build cannot fail.
        match Self::build(&CampaignConfig::demo(), TemplateSet::demo()) {
            Ok(snapshot) => snapshot,
            Err(e) => unreachable!("demo config is invalid: {e}"),
        }
    }
}

/// Publishes the active [`Snapshot`] and performs atomic reloads.
pub struct ConfigProvider {
    paths: Option<(PathBuf, PathBuf)>,
    active: RwLock<Arc<Snapshot>>,
}

impl ConfigProvider {
    /// Provider over fixed in-memory configuration (no reload source).
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            paths: None,
            active: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Provider backed by campaign + template files; supports `reload`.
    pub fn from_files(campaign: &Path, templates: &Path) -> Result<Self, ConfigError> {
        let snapshot = load_snapshot(campaign, templates)?;
        Ok(Self {
            paths: Some((campaign.to_path_buf(), templates.to_path_buf())),
            active: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Clone the active snapshot. In-flight requests keep whatever
    /// snapshot they grabbed; a concurrent reload never mixes views.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        match self.active.read() {
            Ok(guard) => Arc::clone(&guard),
            // A poisoned lock still holds a fully-built snapshot.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Rebuild the snapshot from the backing files and swap it in.
    ///
    /// On any error the previous snapshot stays active.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let (campaign, templates) = self.paths.as_ref().ok_or_else(|| {
            ConfigError::MissingRequired {
                key: "config paths".into(),
                hint: "provider was built from an in-memory snapshot".into(),
            }
        })?;
        let snapshot = load_snapshot(campaign, templates)?;
        let creators = snapshot.index.len();
        match self.active.write() {
            Ok(mut guard) => *guard = Arc::new(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(snapshot),
        }
        info!(creators, "Configuration reloaded");
        Ok(())
    }
}

fn load_snapshot(campaign: &Path, templates: &Path) -> Result<Snapshot, ConfigError> {
    let config = CampaignConfig::from_file(campaign)?;
    let templates = TemplateSet::from_file(templates)?;
    Snapshot::build(&config, templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CAMPAIGN_TOML: &str = r#"
campaign = "spring"

[thresholds]
fuzzy_accept = 0.85

[creators.mkbhd]
code = "MARQUES20"
aliases = ["marques brownlee", "marques"]

[creators.casey_neistat]
code = "CASEY15OFF"
aliases = ["casey"]
fuzzy_threshold = 0.75
"#;

    const TEMPLATES_TOML: &str = r#"
[replies]
issue_code = "Code: {discount_code}"
ask_creator = "Who sent you?"
"#;

    #[test]
    fn parses_campaign_toml() {
        let config = CampaignConfig::from_toml(CAMPAIGN_TOML).unwrap();
        assert_eq!(config.campaign, "spring");
        assert_eq!(config.creators.len(), 2);
        assert!((config.thresholds.fuzzy_accept - 0.85).abs() < 1e-9);
        // defaults fill unspecified thresholds
        assert!((config.thresholds.fuzzy_reject_floor - 0.6).abs() < 1e-9);
        assert_eq!(
            config.creators["casey_neistat"].fuzzy_threshold,
            Some(0.75)
        );
    }

    #[test]
    fn rejects_empty_creator_table() {
        let raw = "campaign = \"x\"\n[creators]\n";
        assert!(matches!(
            CampaignConfig::from_toml(raw),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let raw = r#"
campaign = "x"
[thresholds]
fuzzy_accept = 1.4
[creators.a]
code = "A1"
"#;
        assert!(matches!(
            CampaignConfig::from_toml(raw),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_floor_above_accept() {
        let raw = r#"
campaign = "x"
[thresholds]
fuzzy_accept = 0.5
fuzzy_reject_floor = 0.7
[creators.a]
code = "A1"
"#;
        assert!(CampaignConfig::from_toml(raw).is_err());
    }

    #[test]
    fn rejects_gate_threshold_above_fuzzy_accept() {
        let raw = r#"
campaign = "x"
[thresholds]
fuzzy_accept = 0.8
gate_referral = 0.9
[creators.a]
code = "A1"
"#;
        assert!(matches!(
            CampaignConfig::from_toml(raw),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_empty_code() {
        let raw = r#"
campaign = "x"
[creators.a]
code = "  "
"#;
        assert!(CampaignConfig::from_toml(raw).is_err());
    }

    #[test]
    fn parses_templates() {
        let templates = TemplateSet::from_toml(TEMPLATES_TOML).unwrap();
        assert_eq!(templates.get("issue_code"), Some("Code: {discount_code}"));
        assert!(templates.get("missing").is_none());
    }

    #[test]
    fn demo_snapshot_builds() {
        let snapshot = Snapshot::demo();
        assert_eq!(snapshot.index.len(), 4);
        assert!(snapshot.templates.get("issue_code").is_some());
        assert!(snapshot.templates.get("error").is_some());
    }

    #[test]
    fn provider_snapshot_is_stable_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let campaign_path = dir.path().join("campaign.toml");
        let templates_path = dir.path().join("templates.toml");
        std::fs::write(&campaign_path, CAMPAIGN_TOML).unwrap();
        std::fs::write(&templates_path, TEMPLATES_TOML).unwrap();

        let provider = ConfigProvider::from_files(&campaign_path, &templates_path).unwrap();
        let before = provider.snapshot();
        assert_eq!(before.index.len(), 2);

        // Swap in a one-creator campaign; the old Arc keeps its full view.
        let mut f = std::fs::File::create(&campaign_path).unwrap();
        write!(
            f,
            "campaign = \"spring\"\n[creators.mkbhd]\ncode = \"MARQUES20\"\n"
        )
        .unwrap();
        provider.reload().unwrap();

        assert_eq!(before.index.len(), 2);
        assert_eq!(provider.snapshot().index.len(), 1);
    }

    #[test]
    fn reload_failure_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let campaign_path = dir.path().join("campaign.toml");
        let templates_path = dir.path().join("templates.toml");
        std::fs::write(&campaign_path, CAMPAIGN_TOML).unwrap();
        std::fs::write(&templates_path, TEMPLATES_TOML).unwrap();

        let provider = ConfigProvider::from_files(&campaign_path, &templates_path).unwrap();
        std::fs::write(&campaign_path, "not toml [").unwrap();
        assert!(provider.reload().is_err());
        assert_eq!(provider.snapshot().index.len(), 2);
    }

    #[test]
    fn in_memory_provider_refuses_reload() {
        let provider = ConfigProvider::from_snapshot(Snapshot::demo());
        assert!(provider.reload().is_err());
    }
}
