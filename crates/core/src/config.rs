use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{InputError, InputResult};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

/// Values accepted as "true" by the boolean switches.
const TRUE_SYNONYMS: &[&str] = &[
    "true", "True", "TRUE", "enabled", "Enabled", "ENABLED", "on", "On", "ON", "1",
];

/// Interpret a boolean switch. Anything not in the synonym list is false.
pub fn parse_bool(value: Option<&str>) -> bool {
    value.is_some_and(|v| TRUE_SYNONYMS.contains(&v))
}

pub const ENV_CSV: &str = "INNCABS_CSV_OUTPUT";
pub const ENV_MIN: &str = "INNCABS_MIN_OUTPUT";
pub const ENV_REPEATS: &str = "INNCABS_REPEATS";
pub const ENV_LAUNCH: &str = "INNCABS_LAUNCH_TYPES";
pub const ENV_TIMEOUT: &str = "INNCABS_TIMEOUT";
pub const ENV_WORKER_THREADS: &str = "INNCABS_WORKER_THREADS";
pub const ENV_ADMISSION_LIMIT: &str = "INNCABS_ADMISSION_LIMIT";

const DEFAULT_LAUNCH_TYPES: &str = "deferred,async,optional";

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub harness: HarnessConfig,
    pub engine: EngineConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `INNCABS_PROFILE`. When set (e.g. `CI`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("INNCABS_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let lookup = |key: &str| profiled_env_opt(&p, key);
        Self {
            harness: HarnessConfig::from_lookup(lookup),
            engine: EngineConfig::default().with_overrides(lookup),
            profile: p.clone(),
        }
    }

    /// Look up `key` the same way `from_env` did, honouring the profile.
    pub fn lookup(&self, key: &str) -> Option<String> {
        profiled_env_opt(&self.profile, key)
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  harness: format={:?}, repeats={}, launch={}, timeout={:?}",
            self.harness.output,
            self.harness.repeats,
            self.harness.launch_types.join(","),
            self.harness.timeout
        );
        tracing::info!(
            "  engine:  workers={}, admission_limit={}",
            self.engine.resolved_worker_threads(),
            self.engine.resolved_admission_limit()
        );
    }
}

// ── Harness ───────────────────────────────────────────────────

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Multi-line human readable report per launch type.
    Verbose,
    /// One CSV row per launch type, with a header.
    Csv,
    /// `median,stddev` only.
    Minimal,
}

/// Repetition, selection and reporting switches for a benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub output: OutputFormat,
    /// Number of timed trials per launch type.
    pub repeats: u32,
    /// Launch type names to exercise, in the order given.
    pub launch_types: Vec<String>,
    /// Wall-clock limit for the whole process. `None` = unlimited.
    #[serde(with = "optional_millis")]
    pub timeout: Option<Duration>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl HarnessConfig {
    /// Build from an arbitrary key lookup. Minimal output wins over CSV when
    /// both switches are set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let csv = parse_bool(lookup(ENV_CSV).as_deref());
        let min = parse_bool(lookup(ENV_MIN).as_deref());
        let output = if min {
            OutputFormat::Minimal
        } else if csv {
            OutputFormat::Csv
        } else {
            OutputFormat::Verbose
        };

        let repeats = lookup(ENV_REPEATS)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|&r| r > 0)
            .unwrap_or(1);

        let launch = lookup(ENV_LAUNCH).unwrap_or_else(|| DEFAULT_LAUNCH_TYPES.to_string());
        let launch_types = split_launch_types(&launch);

        let timeout = lookup(ENV_TIMEOUT)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis);

        Self { output, repeats, launch_types, timeout }
    }
}

fn split_launch_types(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis))
    }
}

// ── Engine ────────────────────────────────────────────────────

/// Worker pool and admission-control settings, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default)]
    pub worker_threads: usize,
    /// In-flight async task limit for the adaptive policy. 0 = available parallelism.
    #[serde(default)]
    pub admission_limit: usize,
    /// Prefix for worker thread names.
    #[serde(default = "default_thread_prefix")]
    pub thread_name_prefix: String,
}

fn default_thread_prefix() -> String {
    "inncabs-worker".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            admission_limit: 0,
            thread_name_prefix: default_thread_prefix(),
        }
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> InputResult<Self> {
        toml::from_str(text).map_err(|e| InputError::Config(e.to_string()))
    }

    /// Load a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> InputResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Apply `INNCABS_WORKER_THREADS` / `INNCABS_ADMISSION_LIMIT` overrides.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(n) = lookup(ENV_WORKER_THREADS).and_then(|v| v.trim().parse().ok()) {
            self.worker_threads = n;
        }
        if let Some(n) = lookup(ENV_ADMISSION_LIMIT).and_then(|v| v.trim().parse().ok()) {
            self.admission_limit = n;
        }
        self
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            available_parallelism()
        } else {
            self.worker_threads
        }
    }

    /// Resolve the admission limit (0 means use available parallelism).
    pub fn resolved_admission_limit(&self) -> usize {
        if self.admission_limit == 0 {
            available_parallelism()
        } else {
            self.admission_limit
        }
    }
}
