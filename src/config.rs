//! Configuration loading and types for s3verify.
//!
//! Configuration is read from an optional YAML file and deserialized into
//! the [`Config`] struct; command-line flags are applied on top by the
//! binary.  Each subsection governs a different part of a run: the target
//! endpoint, how fixtures are generated, where pre-existing fixtures are
//! described, and logging.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Endpoint under test.
    #[serde(default)]
    pub target: TargetConfig,

    /// Run behaviour.
    #[serde(default)]
    pub run: RunConfig,

    /// Pre-existing fixture settings.
    #[serde(default)]
    pub fixtures: FixturesConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Endpoint and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Base URL, e.g. `https://s3.amazonaws.com` or `http://127.0.0.1:9000`.
    #[serde(default)]
    pub url: String,

    /// Access key (also accepts `access_key_id`).
    #[serde(alias = "access_key_id", default)]
    pub access_key: String,

    /// Secret key (also accepts `secret_access_key`).
    #[serde(alias = "secret_access_key", default)]
    pub secret_key: String,

    /// Region used for signing and bucket creation.
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            region: default_region(),
        }
    }
}

/// Run behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Create and exercise harness-owned fixtures instead of the
    /// pre-existing ones.
    #[serde(default)]
    pub prepare: bool,

    /// Seed for range selection and random names.  Unset means seed from
    /// the clock.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Buckets created by the setup phase.
    #[serde(default = "default_bucket_count")]
    pub bucket_count: usize,

    /// Objects uploaded to the first prepared bucket.
    #[serde(default = "default_object_count")]
    pub object_count: usize,

    /// Size in bytes of each prepared object.
    #[serde(default = "default_object_size")]
    pub object_size: usize,

    /// Per-request timeout in seconds.  Unset means wait forever.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            prepare: false,
            seed: None,
            bucket_count: default_bucket_count(),
            object_count: default_object_count(),
            object_size: default_object_size(),
            timeout_secs: None,
        }
    }
}

/// Where the pre-existing fixture set is described.
#[derive(Debug, Clone, Deserialize)]
pub struct FixturesConfig {
    /// Path to the JSON fixture manifest.
    #[serde(default = "default_manifest")]
    pub manifest: String,
}

impl Default for FixturesConfig {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Check that everything needed to reach the target is present.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.target.url.is_empty() {
            anyhow::bail!("target URL is required (--url or S3_URL)");
        }
        if self.target.access_key.is_empty() || self.target.secret_key.is_empty() {
            anyhow::bail!("access and secret keys are required (--access/--secret or S3_ACCESS/S3_SECRET)");
        }
        if self.run.prepare && (self.run.bucket_count == 0 || self.run.object_size == 0) {
            anyhow::bail!("run.bucket_count and run.object_size must be positive with --prepare");
        }
        Ok(())
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_bucket_count() -> usize {
    2
}

fn default_object_count() -> usize {
    3
}

fn default_object_size() -> usize {
    1024
}

fn default_manifest() -> String {
    "s3verify-fixtures.json".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.target.region, "us-east-1");
        assert!(!config.run.prepare);
        assert_eq!(config.run.bucket_count, 2);
        assert_eq!(config.run.object_count, 3);
        assert_eq!(config.run.object_size, 1024);
        assert_eq!(config.fixtures.manifest, "s3verify-fixtures.json");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "target:\n  url: http://127.0.0.1:9000\n  access_key_id: ak\n  secret_access_key: sk\n\
             run:\n  prepare: true\n  seed: 42\n  object_size: 100\n\
             logging:\n  level: debug"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.target.url, "http://127.0.0.1:9000");
        assert_eq!(config.target.access_key, "ak");
        assert_eq!(config.target.secret_key, "sk");
        assert!(config.run.prepare);
        assert_eq!(config.run.seed, Some(42));
        assert_eq!(config.run.object_size, 100);
        assert_eq!(config.logging.level, "debug");
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_requires_target() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("URL"));
    }
}
