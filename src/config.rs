use crate::utils::get_config_path;
use serde::Deserialize;
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Default maximum number of live entries
pub const DEFAULT_MAX_ENTRIES: usize = 50_000_000;

/// Default limit for resolved path length, in characters
pub const DEFAULT_MAX_PATH_LEN: usize = 1024;

/// Default number of retries for an event whose parent is unknown
pub const DEFAULT_PENDING_RETRY_LIMIT: u32 = 8;

/// Default cap on queued out-of-order events
pub const DEFAULT_MAX_PENDING_EVENTS: usize = 10_000;

/// Default number of memoised `count` results
pub const DEFAULT_COUNT_CACHE_SIZE: usize = 128;

/// Default diagnostics ring capacity
pub const DEFAULT_DIAGNOSTICS_CAPACITY: usize = 1024;

/// Default debounce window for live events in milliseconds (0 disables)
pub const DEFAULT_DEBOUNCE_MS: u64 = 50;

/// Configuration file format (TOML)
/// Located at ~/Library/Application Support/fnx/config.toml (macOS)
/// or %LOCALAPPDATA%/fnx/config.toml (Windows)
/// or ~/.local/share/fnx/config.toml (Linux)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub index: IndexConfigFile,
    #[serde(default)]
    pub updater: UpdaterConfigFile,
    #[serde(default)]
    pub query: QueryConfigFile,
}

impl ConfigFile {
    pub fn parse(content: &str) -> crate::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// `[index]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexConfigFile {
    pub max_entries: Option<usize>,
    pub max_path_len: Option<usize>,
    /// Glob patterns skipped during enumeration (with their subtrees)
    pub exclude: Option<Vec<String>>,
}

/// `[updater]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdaterConfigFile {
    pub pending_retry_limit: Option<u32>,
    pub max_pending_events: Option<usize>,
    pub debounce_ms: Option<u64>,
    pub diagnostics_capacity: Option<usize>,
}

/// `[query]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryConfigFile {
    pub count_cache_size: Option<usize>,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Builds abort with `ResourceExhausted` past this many entries
    pub max_entries: usize,
    /// `full_path` fails with `PathTooLong` past this many characters
    pub max_path_len: usize,
    pub pending_retry_limit: u32,
    pub max_pending_events: usize,
    pub exclude: Vec<String>,
    pub count_cache_size: usize,
    pub diagnostics_capacity: usize,
    pub debounce_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_path_len: DEFAULT_MAX_PATH_LEN,
            pending_retry_limit: DEFAULT_PENDING_RETRY_LIMIT,
            max_pending_events: DEFAULT_MAX_PENDING_EVENTS,
            exclude: Vec::new(),
            count_cache_size: DEFAULT_COUNT_CACHE_SIZE,
            diagnostics_capacity: DEFAULT_DIAGNOSTICS_CAPACITY,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl EngineConfig {
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Load config from the app data directory.
    /// Returns None if the file doesn't exist; a malformed file is logged
    /// and ignored.
    fn load_from_file() -> Option<ConfigFile> {
        let config_path = get_config_path().ok()?;
        if !config_path.exists() {
            return None;
        }

        let content = fs::read_to_string(&config_path).ok()?;
        match ConfigFile::parse(&content) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Ignoring {}: {}", config_path.display(), e);
                None
            }
        }
    }

    /// Load config with priority: environment variables > config file > defaults
    pub fn load() -> Self {
        let mut config = Self::default();
        if let Some(file) = Self::load_from_file() {
            config.apply_file(file);
        }
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Overlay the values present in a parsed config file
    pub fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.index.max_entries {
            self.max_entries = v;
        }
        if let Some(v) = file.index.max_path_len {
            self.max_path_len = v;
        }
        if let Some(v) = file.index.exclude {
            self.exclude = v;
        }
        if let Some(v) = file.updater.pending_retry_limit {
            self.pending_retry_limit = v;
        }
        if let Some(v) = file.updater.max_pending_events {
            self.max_pending_events = v;
        }
        if let Some(v) = file.updater.debounce_ms {
            self.debounce_ms = v;
        }
        if let Some(v) = file.updater.diagnostics_capacity {
            self.diagnostics_capacity = v;
        }
        if let Some(v) = file.query.count_cache_size {
            self.count_cache_size = v;
        }
    }

    /// Overlay `FNX_*` variables read through `var`
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            var(key).and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = parsed(&var, "FNX_MAX_ENTRIES") {
            self.max_entries = v;
        }
        if let Some(v) = parsed(&var, "FNX_MAX_PATH") {
            self.max_path_len = v;
        }
        if let Some(v) = parsed(&var, "FNX_RETRY_LIMIT") {
            self.pending_retry_limit = v;
        }
        if let Some(v) = parsed(&var, "FNX_MAX_PENDING") {
            self.max_pending_events = v;
        }
        if let Some(v) = parsed(&var, "FNX_DEBOUNCE_MS") {
            self.debounce_ms = v;
        }
        if let Some(v) = parsed(&var, "FNX_COUNT_CACHE") {
            self.count_cache_size = v;
        }
        if let Some(v) = var("FNX_EXCLUDE") {
            self.exclude = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.max_path_len, 1024);
        assert_eq!(config.pending_retry_limit, DEFAULT_PENDING_RETRY_LIMIT);
        assert!(config.exclude.is_empty());
        assert_eq!(config.debounce_duration(), Duration::from_millis(DEFAULT_DEBOUNCE_MS));
    }

    #[test]
    fn test_config_file_parse_full() {
        let toml_content = r#"
[index]
max_entries = 1000
max_path_len = 260
exclude = ["*.tmp", "node_modules"]

[updater]
pending_retry_limit = 3
max_pending_events = 50
debounce_ms = 0
diagnostics_capacity = 16

[query]
count_cache_size = 8
"#;

        let file: ConfigFile = toml::from_str(toml_content).unwrap();
        let mut config = EngineConfig::default();
        config.apply_file(file);

        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.max_path_len, 260);
        assert_eq!(config.exclude, vec!["*.tmp", "node_modules"]);
        assert_eq!(config.pending_retry_limit, 3);
        assert_eq!(config.max_pending_events, 50);
        assert_eq!(config.debounce_ms, 0);
        assert_eq!(config.diagnostics_capacity, 16);
        assert_eq!(config.count_cache_size, 8);
    }

    #[test]
    fn test_config_file_parse_partial() {
        let toml_content = r#"
[updater]
pending_retry_limit = 20
"#;

        let file: ConfigFile = toml::from_str(toml_content).unwrap();
        assert_eq!(file.updater.pending_retry_limit, Some(20));
        assert_eq!(file.updater.debounce_ms, None);
        assert_eq!(file.index.max_entries, None);

        let mut config = EngineConfig::default();
        config.apply_file(file);
        assert_eq!(config.pending_retry_limit, 20);
        assert_eq!(config.max_entries, DEFAULT_MAX_ENTRIES);
    }

    #[test]
    fn test_config_file_parse_empty() {
        let file: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(file.index.max_path_len, None);
        assert_eq!(file.query.count_cache_size, None);
    }

    #[test]
    fn test_config_file_rejects_wrong_types() {
        let result = ConfigFile::parse("[index]\nmax_entries = \"lots\"\n");
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FNX_MAX_PATH", "300"),
            ("FNX_DEBOUNCE_MS", "not-a-number"),
            ("FNX_EXCLUDE", "*.log, .git ,"),
        ]);
        let mut config = EngineConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.max_path_len, 300);
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert_eq!(config.exclude, vec!["*.log", ".git"]);
    }
}
