//! CLI argument definitions

use clap::Parser;
use rotastream_core::{RotatorOptions, SizeValue};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rotastream")]
#[command(version, about = "Pipe stdin into a rotating file")]
pub struct Cli {
    /// Directory for the current and rotated files
    pub directory: Option<PathBuf>,

    /// Base file name (writes go to <name>.<ext>)
    #[arg(short, long, env = "ROTASTREAM_NAME")]
    pub name: Option<String>,

    /// Config file (.toml, .yaml, .yml or .json); flags override its keys
    #[arg(short, long, env = "ROTASTREAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// File extension without the leading dot
    #[arg(long)]
    pub ext: Option<String>,

    /// Rotate before the file would exceed this size (e.g. 10M, 512k)
    #[arg(short, long)]
    pub size: Option<String>,

    /// Number of rotated files to keep
    #[arg(short, long)]
    pub keep: Option<usize>,

    /// Check the current path for external moves this often (e.g. 30s, 5m)
    #[arg(long, value_parser = parse_duration)]
    pub poll: Option<u64>,

    /// Rotate when a calendar unit has passed (second, minute, hour, day)
    #[arg(short, long)]
    pub boundary: Option<String>,

    /// Rotate on a fixed schedule (e.g. "2 hours", "30m", "day")
    #[arg(short, long)]
    pub frequency: Option<String>,

    /// Open mode: a (append) or w (truncate)
    #[arg(long)]
    pub flags: Option<String>,

    /// Permission bits for new files, in octal (e.g. 640)
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<u32>,

    /// Encoding of the input text: utf8, latin1 or hex
    #[arg(long)]
    pub encoding: Option<String>,

    /// strftime format used in rotated file names
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Print events to stderr as JSON lines
    #[arg(long)]
    pub json_events: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Options given on the command line, to merge over a config file
    pub fn to_options(&self) -> RotatorOptions {
        RotatorOptions {
            directory: self.directory.clone(),
            name: self.name.clone(),
            extension: self.ext.clone(),
            size: self.size.clone().map(SizeValue::Text),
            keep: self.keep,
            poll: self.poll,
            boundary: self.boundary.clone(),
            frequency: self.frequency.clone(),
            flags: self.flags.clone(),
            mode: self.mode,
            encoding: self.encoding.clone(),
            timestamp_format: self.timestamp_format.clone(),
        }
    }
}

/// Parse a duration string like "30s", "5m", "1h30m" into seconds.
///
/// A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<u64, String> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let mut total: u64 = 0;
    let mut digits = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return Err(format!("Invalid duration format: {}", s));
        }
        let unit_secs = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            _ => return Err(format!("Unknown duration unit: {}", c)),
        };
        total = duration_component(&digits, unit_secs)
            .and_then(|secs| total.checked_add(secs).ok_or_else(|| too_large(&s)))?;
        digits.clear();
    }

    if !digits.is_empty() {
        total = duration_component(&digits, 1)
            .and_then(|secs| total.checked_add(secs).ok_or_else(|| too_large(&s)))?;
    }

    if total == 0 {
        return Err("Duration must be greater than 0".to_string());
    }
    Ok(total)
}

fn duration_component(digits: &str, unit_secs: u64) -> Result<u64, String> {
    let count: u64 = digits
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", digits))?;
    count
        .checked_mul(unit_secs)
        .ok_or_else(|| too_large(digits))
}

fn too_large(s: &str) -> String {
    format!("Duration too large: {}", s)
}

/// Parse octal permission bits such as "644", "0640" or "0o600"
pub fn parse_mode(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let digits = s.strip_prefix("0o").unwrap_or(s);
    let mode = u32::from_str_radix(digits, 8).map_err(|_| format!("Invalid octal mode: {}", s))?;
    if mode > 0o7777 {
        return Err(format!("Mode out of range: {}", s));
    }
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30s").unwrap(), 30);
        assert_eq!(parse_duration("5m").unwrap(), 300);
        assert_eq!(parse_duration("1h30m").unwrap(), 5400);
        assert_eq!(parse_duration("1D").unwrap(), 86400);
    }

    #[test]
    fn test_parse_duration_plain_number() {
        assert_eq!(parse_duration("60").unwrap(), 60);
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("1x").is_err());
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert!(parse_duration("99999999999999999d").is_err());
        assert!(parse_duration("99999999999999999999999").is_err());
        assert!(parse_duration("18446744073709551615s1s").is_err());
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("644").unwrap(), 0o644);
        assert_eq!(parse_mode("0640").unwrap(), 0o640);
        assert_eq!(parse_mode("0o600").unwrap(), 0o600);
        assert!(parse_mode("999").is_err());
        assert!(parse_mode("17777").is_err());
    }

    #[test]
    fn test_flags_become_options() {
        let cli = Cli::parse_from([
            "rotastream",
            "/var/log/app",
            "--name",
            "app",
            "--size",
            "10MiB",
            "--keep",
            "5",
            "--poll",
            "1m",
            "--mode",
            "600",
        ]);
        let options = cli.to_options();

        assert_eq!(options.directory, Some(PathBuf::from("/var/log/app")));
        assert_eq!(options.name.as_deref(), Some("app"));
        assert_eq!(options.keep, Some(5));
        assert_eq!(options.poll, Some(60));
        assert_eq!(options.mode, Some(0o600));

        let config = options.into_config().unwrap();
        assert_eq!(config.max_size, Some(10 * 1024 * 1024));
        assert_eq!(config.retention, 5);
    }

    #[test]
    fn test_flags_override_file_options() {
        let file = RotatorOptions::parse(
            "name = \"from-file\"\nkeep = 9\nsize = \"1M\"",
            rotastream_core::ConfigFormat::Toml,
        )
        .unwrap();
        let cli = Cli::parse_from(["rotastream", "--keep", "3"]);

        let merged = file.merge(cli.to_options());
        assert_eq!(merged.name.as_deref(), Some("from-file"));
        assert_eq!(merged.keep, Some(3));
        assert!(merged.size.is_some());
    }
}
