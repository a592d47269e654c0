//! Rotator configuration
//!
//! `RotatorOptions` is the raw, user-facing form (config files, CLI flags).
//! Options layer over each other key by key and validate into an immutable
//! `RotatorConfig`. Supported configuration file formats:
//! - TOML (.toml)
//! - YAML (.yaml, .yml)
//! - JSON (.json)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::types::{BoundaryUnit, Encoding, FileOptions, Frequency, OpenFlags, TimestampFormat};
use crate::units::parse_size;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// A size given either as a byte count or as a human-readable string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeValue {
    Bytes(u64),
    Text(String),
}

impl SizeValue {
    pub fn to_bytes(&self) -> Result<u64> {
        match self {
            SizeValue::Bytes(0) => Err(Error::InvalidSize("0".to_string())),
            SizeValue::Bytes(n) => Ok(*n),
            SizeValue::Text(s) => parse_size(s),
        }
    }
}

/// Raw rotator options, every key optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotatorOptions {
    /// Destination directory (default: current directory)
    #[serde(alias = "dir", alias = "path")]
    pub directory: Option<PathBuf>,
    /// Base file name, without extension
    pub name: Option<String>,
    /// File extension (default: log)
    #[serde(alias = "ext")]
    pub extension: Option<String>,
    /// Maximum file size, e.g. 10485760 or "10M"
    pub size: Option<SizeValue>,
    /// Number of rotated files to keep
    #[serde(alias = "retention")]
    pub keep: Option<usize>,
    /// Poll interval in seconds for external change detection
    pub poll: Option<u64>,
    /// Calendar boundary: day, hour, minute, second
    pub boundary: Option<String>,
    /// Rotation frequency, e.g. "2 hours"
    pub frequency: Option<String>,
    /// Open flags: "a" (append) or "w" (truncate)
    pub flags: Option<String>,
    /// Permission mode for new files
    pub mode: Option<u32>,
    /// Default encoding for string payloads
    pub encoding: Option<String>,
    /// strftime format used in rotated names
    pub timestamp_format: Option<String>,
}

impl RotatorOptions {
    /// Load options from file, automatically detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unsupported config file extension: {}. Expected .toml, .yaml, .yml, or .json",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse options content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Toml => Ok(toml::from_str(content)?),
            ConfigFormat::Yaml => Ok(serde_yaml::from_str(content)?),
            ConfigFormat::Json => Ok(serde_json::from_str(content)?),
        }
    }

    /// Find the first known config file in a directory
    pub fn find(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Copy every key set in `overrides` over `self`
    pub fn merge(self, overrides: RotatorOptions) -> RotatorOptions {
        RotatorOptions {
            directory: overrides.directory.or(self.directory),
            name: overrides.name.or(self.name),
            extension: overrides.extension.or(self.extension),
            size: overrides.size.or(self.size),
            keep: overrides.keep.or(self.keep),
            poll: overrides.poll.or(self.poll),
            boundary: overrides.boundary.or(self.boundary),
            frequency: overrides.frequency.or(self.frequency),
            flags: overrides.flags.or(self.flags),
            mode: overrides.mode.or(self.mode),
            encoding: overrides.encoding.or(self.encoding),
            timestamp_format: overrides.timestamp_format.or(self.timestamp_format),
        }
    }

    /// Validate into a rotator configuration
    pub fn into_config(self) -> Result<RotatorConfig> {
        let name = self
            .name
            .ok_or_else(|| Error::config("A base file name is required"))?;
        let directory = self.directory.unwrap_or_else(|| PathBuf::from("."));

        let mut config = RotatorConfig::new(directory, name);

        if let Some(ext) = self.extension {
            config.extension = ext;
        }
        if let Some(size) = self.size {
            config.max_size = Some(size.to_bytes()?);
        }
        if let Some(keep) = self.keep {
            config.retention = keep;
        }
        config.poll_interval = self
            .poll
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        if let Some(boundary) = self.boundary {
            config.boundary = Some(boundary.parse()?);
        }
        if let Some(frequency) = self.frequency {
            config.frequency = Some(frequency.parse()?);
        }
        if let Some(flags) = self.flags {
            config.file.flags = flags.parse()?;
        }
        if let Some(mode) = self.mode {
            config.file.mode = Some(mode);
        }
        if let Some(encoding) = self.encoding {
            config.file.encoding = encoding.parse()?;
        }
        if let Some(format) = self.timestamp_format {
            config.timestamp_format = TimestampFormat::new(format)?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Immutable rotator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatorConfig {
    /// Directory holding the current and rotated files
    pub directory: PathBuf,
    /// Base file name, without extension
    pub base_name: String,
    /// File extension, without the leading dot
    pub extension: String,
    /// Rotate before a write would grow the file past this many bytes
    pub max_size: Option<u64>,
    /// Number of rotated files to keep
    pub retention: usize,
    /// Interval for polling the current path for external changes
    pub poll_interval: Option<Duration>,
    /// Calendar boundary that forces rotation
    pub boundary: Option<BoundaryUnit>,
    /// Boundary-aligned rotation period
    pub frequency: Option<Frequency>,
    /// Options passed through to the backing file
    pub file: FileOptions,
    /// Timestamp format for rotated names
    pub timestamp_format: TimestampFormat,
}

impl RotatorConfig {
    /// Create a config with defaults for everything but the location
    pub fn new(directory: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            base_name: base_name.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            max_size: None,
            retention: DEFAULT_RETENTION,
            poll_interval: None,
            boundary: None,
            frequency: None,
            file: FileOptions::default(),
            timestamp_format: TimestampFormat::default(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn with_retention(mut self, count: usize) -> Self {
        self.retention = count;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_boundary(mut self, unit: BoundaryUnit) -> Self {
        self.boundary = Some(unit);
        self
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn with_flags(mut self, flags: OpenFlags) -> Self {
        self.file.flags = flags;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.file.encoding = encoding;
        self
    }

    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// Check the invariants the naming scheme relies on
    pub fn validate(&self) -> Result<()> {
        if self.base_name.is_empty() {
            return Err(Error::config("Base file name must not be empty"));
        }
        if self.base_name.contains(&['/', '\\'][..]) {
            return Err(Error::config(format!(
                "Base file name must not contain path separators: {}",
                self.base_name
            )));
        }
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err(Error::config(format!(
                "Extension must be non-empty and given without a leading dot: {:?}",
                self.extension
            )));
        }
        if self.extension.contains(&['/', '\\'][..]) {
            return Err(Error::config(format!(
                "Extension must not contain path separators: {}",
                self.extension
            )));
        }
        if self.max_size == Some(0) {
            return Err(Error::InvalidSize("0".to_string()));
        }
        if let Some(frequency) = &self.frequency {
            frequency.validate()?;
        }
        if self.poll_interval == Some(Duration::ZERO) {
            return Err(Error::config("Poll interval must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RotatorOptions {
            name: Some("app".to_string()),
            ..Default::default()
        }
        .into_config()
        .unwrap();

        assert_eq!(config.directory, PathBuf::from("."));
        assert_eq!(config.extension, "log");
        assert_eq!(config.retention, 2);
        assert_eq!(config.max_size, None);
        assert_eq!(config.file.flags, OpenFlags::Append);
        assert_eq!(config.timestamp_format.as_str(), DEFAULT_TIMESTAMP_FORMAT);
    }

    #[test]
    fn test_name_required() {
        let err = RotatorOptions::default().into_config().unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_merge_overrides_set_keys_only() {
        let base = RotatorOptions {
            name: Some("app".to_string()),
            keep: Some(5),
            size: Some(SizeValue::Text("1M".to_string())),
            ..Default::default()
        };
        let overrides = RotatorOptions {
            keep: Some(9),
            boundary: Some("hour".to_string()),
            ..Default::default()
        };

        let merged = base.merge(overrides);
        assert_eq!(merged.name.as_deref(), Some("app"));
        assert_eq!(merged.keep, Some(9));
        assert_eq!(merged.size, Some(SizeValue::Text("1M".to_string())));
        assert_eq!(merged.boundary.as_deref(), Some("hour"));
    }

    #[test]
    fn test_parse_toml() {
        let content = r#"
            dir = "/var/log/app"
            name = "access"
            size = "10MiB"
            keep = 4
            frequency = "2 hours"
            mode = 0o600
        "#;

        let config = RotatorOptions::parse(content, ConfigFormat::Toml)
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.directory, PathBuf::from("/var/log/app"));
        assert_eq!(config.max_size, Some(10 * 1024 * 1024));
        assert_eq!(config.retention, 4);
        assert_eq!(config.frequency, Some(Frequency::new(2, BoundaryUnit::Hour)));
        assert_eq!(config.file.mode, Some(0o600));
    }

    #[test]
    fn test_parse_yaml_numeric_size() {
        let content = "name: app\nsize: 2048\nboundary: day\npoll: 5\n";
        let config = RotatorOptions::parse(content, ConfigFormat::Yaml)
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.max_size, Some(2048));
        assert_eq!(config.boundary, Some(BoundaryUnit::Day));
        assert_eq!(config.poll_interval, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_json() {
        let content = r#"{"name": "app", "ext": "txt", "flags": "w", "encoding": "hex"}"#;
        let config = RotatorOptions::parse(content, ConfigFormat::Json)
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.extension, "txt");
        assert_eq!(config.file.flags, OpenFlags::Truncate);
        assert_eq!(config.file.encoding, Encoding::Hex);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_size = RotatorOptions {
            name: Some("app".to_string()),
            size: Some(SizeValue::Text("lots".to_string())),
            ..Default::default()
        };
        assert!(matches!(bad_size.into_config(), Err(Error::InvalidSize(_))));

        let bad_boundary = RotatorOptions {
            name: Some("app".to_string()),
            boundary: Some("week".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            bad_boundary.into_config(),
            Err(Error::InvalidBoundary(_))
        ));

        let bad_name = RotatorOptions {
            name: Some("../app".to_string()),
            ..Default::default()
        };
        assert!(bad_name.into_config().is_err());

        let too_long = RotatorConfig::new("/tmp", "app")
            .with_frequency(Frequency::new(200_000_000, BoundaryUnit::Day));
        assert!(matches!(too_long.validate(), Err(Error::InvalidFrequency(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rotastream.toml");
        std::fs::write(&path, "name = \"svc\"\nkeep = 3\n").unwrap();

        assert_eq!(RotatorOptions::find(dir.path()), Some(path.clone()));
        let options = RotatorOptions::load(&path).unwrap();
        assert_eq!(options.name.as_deref(), Some("svc"));
        assert_eq!(options.keep, Some(3));
    }

    #[test]
    fn test_load_missing_file() {
        let result = RotatorOptions::load(Path::new("/nonexistent/rotastream.toml"));
        assert!(matches!(result, Err(Error::ConfigNotFound(_))));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a.yml")),
            Some(ConfigFormat::Yaml)
        );
        assert_eq!(ConfigFormat::from_path(Path::new("a.ini")), None);
    }
}
