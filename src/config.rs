//! Repository configuration loaded from `.nt/config` (TOML).
//!
//! Every section deserialises with serde defaults so a partially written
//! config stays valid. Durations are kept as strings at rest (`"30s"`,
//! `"7d"`) and parsed on access; the `NT_GENERATOR_TIMEOUT` and
//! `NT_GC_RETENTION` environment variables override the file.

use std::{collections::BTreeMap, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{attribute::schema::SchemaScope, errors::NtError, utils::parse_duration};

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub lint: LintConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub deck: BTreeMap<String, DeckConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CoreConfig {
    /// File extensions considered by `add`.
    pub extensions: Vec<String>,
    /// Wall-clock budget for one generator subprocess.
    pub generator_timeout: String,
    /// How long orphan packfiles/blobs survive before `gc` deletes them.
    pub gc_retention: String,
    /// Nesting limit for generators that emit further generators.
    pub generator_max_depth: usize,
    /// When true, schema violations fail `add` instead of being recorded.
    pub strict_mode: bool,
    /// Worker count for media hashing during `add`; 0 = CPU count.
    pub media_workers: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["md".to_string(), "markdown".to_string()],
            generator_timeout: "30s".to_string(),
            gc_retention: "7d".to_string(),
            generator_max_depth: 4,
            strict_mode: false,
            media_workers: 0,
        }
    }
}

impl CoreConfig {
    /// Generator timeout with the `NT_GENERATOR_TIMEOUT` override applied.
    pub fn generator_timeout(&self) -> Duration {
        if let Ok(raw) = std::env::var("NT_GENERATOR_TIMEOUT")
            && let Ok(secs) = raw.trim().parse::<u64>()
        {
            return Duration::from_secs(secs);
        }
        parse_duration(&self.generator_timeout).unwrap_or(Duration::from_secs(30))
    }

    /// Orphan retention with the `NT_GC_RETENTION` override applied.
    pub fn gc_retention(&self) -> Duration {
        if let Ok(raw) = std::env::var("NT_GC_RETENTION")
            && let Ok(d) = parse_duration(raw.trim())
        {
            return d;
        }
        parse_duration(&self.gc_retention).unwrap_or(Duration::from_secs(7 * 24 * 3600))
    }

    /// Bounded worker count for media hashing.
    pub fn media_workers(&self) -> usize {
        match self.media_workers {
            0 => num_cpus::get(),
            n => n,
        }
    }

    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LintConfig {
    /// Attribute schema scopes, matched by path glob and note kind.
    pub schema: Vec<SchemaScope>,
    /// Rule names to skip.
    pub disabled_rules: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct RemoteConfig {
    /// Reserved for replication targets.
    pub url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DeckConfig {
    /// Pathspec/tag filter selecting this deck's flashcards.
    pub query: String,
    /// New cards introduced per day.
    pub new_per_day: u32,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            new_per_day: 20,
        }
    }
}

impl Config {
    /// Load the configuration from a file, tolerating a missing file.
    pub fn load(path: &Path) -> Result<Config, NtError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| NtError::InvalidConfig(e.to_string()))
    }

    /// Serialise back to TOML.
    pub fn save(&self, path: &Path) -> Result<(), NtError> {
        let raw = toml::to_string_pretty(self).map_err(|e| NtError::InvalidConfig(e.to_string()))?;
        crate::utils::atomic_write(path, raw.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.core.extensions, vec!["md", "markdown"]);
        assert_eq!(config.core.generator_timeout(), Duration::from_secs(30));
        assert_eq!(
            config.core.gc_retention(),
            Duration::from_secs(7 * 24 * 3600)
        );
        assert!(!config.core.strict_mode);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [core]
            strict_mode = true
            gc_retention = "24h"

            [deck.main]
            query = "flashcards/**"
            "#,
        )
        .unwrap();
        assert!(config.core.strict_mode);
        assert_eq!(config.core.gc_retention(), Duration::from_secs(24 * 3600));
        assert_eq!(config.deck["main"].query, "flashcards/**");
        assert_eq!(config.deck["main"].new_per_day, 20);
    }

    #[test]
    fn test_extension_match() {
        let core = CoreConfig::default();
        assert!(core.matches_extension(Path::new("notes/a.md")));
        assert!(core.matches_extension(Path::new("notes/a.MARKDOWN")));
        assert!(!core.matches_extension(Path::new("notes/a.png")));
    }
}
