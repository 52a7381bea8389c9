//! Configuration: the INI-style file format and the validated settings
//! derived from it.
//!
//! The file format is deliberately forgiving (unknown sections and keys
//! are ignored, values may be quoted, `;` and `#` start comments), but the
//! four recognised keys are all required and validated strictly, because a
//! daemon that half-understands its trigger configuration is worse than
//! one that refuses to start.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::uid::is_valid_uid;

/// Default configuration file location.
pub const CONFIG_FILE: &str = "/etc/easy-switcher/default.conf";
/// The one section the daemon reads.
pub const CONFIG_SECTION: &str = "Easy Switcher";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid '{key}' value")]
    MissingOrInvalid { key: &'static str },
    #[error("invalid '{key}' value: {value}")]
    Unparsable { key: &'static str, value: String },
    #[error("invalid '{key}' value: key code is out of valid range (0..255)")]
    KeyOutOfRange { key: &'static str },
    #[error("invalid 'delay' value: must be a positive number of milliseconds")]
    DelayOutOfRange,
}

fn section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*\[\s*([^\]]+?)\s*\]\s*(?:[;#].*)?$"#).expect("section regex"))
}

fn keyval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r##"^\s*([^#;=\s]+)\s*=\s*"?\s*([^"#;]*?)\s*"?\s*(?:[;#].*)?$"##)
            .expect("keyval regex")
    })
}

/// A parsed INI file: section name → key → raw value.
#[derive(Debug, Default)]
pub struct IniConfig {
    sections: HashMap<String, HashMap<String, String>>,
}

impl IniConfig {
    /// Reads and parses `path`. Lines that match neither the section nor
    /// the key=value grammar are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Parses INI text. Infallible: malformed lines are ignored.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current = String::new();

        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            if let Some(caps) = section_re().captures(line) {
                current = caps[1].to_string();
                continue;
            }
            if let Some(caps) = keyval_re().captures(line) {
                sections
                    .entry(current.clone())
                    .or_default()
                    .insert(caps[1].to_string(), caps[2].to_string());
            }
        }

        IniConfig { sections }
    }

    pub fn get_str(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|keys| keys.get(key))
            .map(String::as_str)
    }

    /// Strictly parsed integer value. `None` covers both a missing key
    /// and a value with trailing garbage; the callers treat them alike.
    pub fn get_int(&self, section: &str, key: &str) -> Option<i64> {
        self.get_str(section, key)?.parse().ok()
    }
}

/// `scanf("%d+%d")`-style parsing of the layout-switch value: the first
/// integer is required, an optional `+` may introduce a second one, and a
/// missing or unparsable second field yields 0. Trailing garbage after a
/// parsed field is ignored, matching the original format.
#[must_use]
pub fn parse_key_combo(value: &str) -> Option<(i64, i64)> {
    let (first, rest) = scan_int(value)?;
    let second = rest
        .strip_prefix('+')
        .and_then(scan_int)
        .map_or(0, |(second, _)| second);
    Some((first, second))
}

/// Scans one decimal integer (optional sign, leading whitespace allowed)
/// and returns it with the unconsumed remainder.
fn scan_int(s: &str) -> Option<(i64, &str)> {
    let s = s.trim_start();
    let after_sign = s.strip_prefix(&['+', '-'][..]).unwrap_or(s);
    let digits = after_sign.len() - after_sign.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let end = s.len() - after_sign.len() + digits;
    let value: i64 = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

/// The validated daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Layout-switch shortcut; a zero second element means a single key.
    pub ls_keys: [u16; 2],
    /// Trigger key; 0 selects the default double-shift trigger.
    pub conv_key: u16,
    /// Pause after each injected event, milliseconds.
    pub delay_ms: u64,
    /// Well-formed blacklist UIDs. Malformed entries are logged and
    /// dropped here rather than failing the load.
    pub blacklist: Vec<String>,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let ini = IniConfig::load(path)?;
        Self::from_ini(&ini)
    }

    pub fn from_ini(ini: &IniConfig) -> Result<Self, ConfigError> {
        let ls_value = ini
            .get_str(CONFIG_SECTION, "layout-switch")
            .ok_or(ConfigError::MissingOrInvalid {
                key: "layout-switch",
            })?;
        let (primary, secondary) =
            parse_key_combo(ls_value).ok_or_else(|| ConfigError::Unparsable {
                key: "layout-switch",
                value: ls_value.to_string(),
            })?;
        if !(key_in_range(primary) && key_in_range(secondary)) {
            return Err(ConfigError::KeyOutOfRange {
                key: "layout-switch",
            });
        }

        let conv_key = ini
            .get_int(CONFIG_SECTION, "convert-key")
            .ok_or(ConfigError::MissingOrInvalid { key: "convert-key" })?;
        if !key_in_range(conv_key) {
            return Err(ConfigError::KeyOutOfRange { key: "convert-key" });
        }

        let delay = ini
            .get_int(CONFIG_SECTION, "delay")
            .ok_or(ConfigError::MissingOrInvalid { key: "delay" })?;
        if delay <= 0 {
            return Err(ConfigError::DelayOutOfRange);
        }

        let blacklist_value = ini
            .get_str(CONFIG_SECTION, "blacklist")
            .ok_or(ConfigError::MissingOrInvalid { key: "blacklist" })?;
        let mut blacklist = Vec::new();
        for entry in blacklist_value.split(',') {
            let uid = entry.trim();
            if uid.is_empty() {
                continue;
            }
            if is_valid_uid(uid) {
                blacklist.push(uid.to_string());
            } else {
                tracing::debug!("ignoring invalid UID: {uid}");
            }
        }

        Ok(Settings {
            ls_keys: [primary as u16, secondary as u16],
            conv_key: conv_key as u16,
            delay_ms: delay as u64,
            blacklist,
        })
    }
}

fn key_in_range(code: i64) -> bool {
    (0..=255).contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "\
[Easy Switcher]
layout-switch=29+42
convert-key=0
delay=10
blacklist=
";

    #[test]
    fn parses_sections_and_values() {
        let ini = IniConfig::parse(GOOD);
        assert_eq!(ini.get_str(CONFIG_SECTION, "layout-switch"), Some("29+42"));
        assert_eq!(ini.get_int(CONFIG_SECTION, "delay"), Some(10));
    }

    #[test]
    fn quoted_values_and_comments() {
        let ini = IniConfig::parse(
            "[Easy Switcher] ; main section\ndelay = \"25\"  # tuned\n; convert-key=9\n",
        );
        assert_eq!(ini.get_int(CONFIG_SECTION, "delay"), Some(25));
        // The commented-out line must not register.
        assert_eq!(ini.get_str(CONFIG_SECTION, "convert-key"), None);
    }

    #[test]
    fn unknown_sections_are_kept_apart() {
        let ini = IniConfig::parse("[Other]\ndelay=5\n[Easy Switcher]\ndelay=10\n");
        assert_eq!(ini.get_int(CONFIG_SECTION, "delay"), Some(10));
        assert_eq!(ini.get_int("Other", "delay"), Some(5));
    }

    #[test]
    fn int_with_trailing_garbage_is_rejected() {
        let ini = IniConfig::parse("[Easy Switcher]\ndelay=10ms\n");
        assert_eq!(ini.get_int(CONFIG_SECTION, "delay"), None);
    }

    #[test]
    fn combo_single_key() {
        assert_eq!(parse_key_combo("125"), Some((125, 0)));
    }

    #[test]
    fn combo_two_keys() {
        assert_eq!(parse_key_combo("29+42"), Some((29, 42)));
    }

    #[test]
    fn combo_dangling_plus_keeps_first_key() {
        assert_eq!(parse_key_combo("62+"), Some((62, 0)));
        assert_eq!(parse_key_combo("62+x"), Some((62, 0)));
    }

    #[test]
    fn combo_trailing_garbage_after_first_field() {
        // scanf stops at the first non-digit and reports one conversion.
        assert_eq!(parse_key_combo("125abc"), Some((125, 0)));
    }

    #[test]
    fn combo_rejects_non_numeric() {
        assert_eq!(parse_key_combo("alt+shift"), None);
        assert_eq!(parse_key_combo(""), None);
    }

    #[test]
    fn combo_accepts_negative_first_key() {
        // Range validation happens later; the scan itself allows a sign.
        assert_eq!(parse_key_combo("-5"), Some((-5, 0)));
    }

    #[test]
    fn settings_from_good_config() {
        let ini = IniConfig::parse(GOOD);
        let settings = Settings::from_ini(&ini).expect("valid settings");
        assert_eq!(settings.ls_keys, [29, 42]);
        assert_eq!(settings.conv_key, 0);
        assert_eq!(settings.delay_ms, 10);
        assert!(settings.blacklist.is_empty());
    }

    #[test]
    fn settings_require_every_key() {
        for missing in ["layout-switch", "convert-key", "delay", "blacklist"] {
            let text: String = GOOD
                .lines()
                .filter(|line| !line.starts_with(missing))
                .map(|line| format!("{line}\n"))
                .collect();
            let ini = IniConfig::parse(&text);
            assert!(
                Settings::from_ini(&ini).is_err(),
                "missing '{missing}' should be fatal"
            );
        }
    }

    #[test]
    fn settings_reject_out_of_range_codes() {
        let ini = IniConfig::parse("[Easy Switcher]\nlayout-switch=300\nconvert-key=0\ndelay=10\nblacklist=\n");
        assert!(matches!(
            Settings::from_ini(&ini),
            Err(ConfigError::KeyOutOfRange { key: "layout-switch" })
        ));

        let ini = IniConfig::parse("[Easy Switcher]\nlayout-switch=62\nconvert-key=-1\ndelay=10\nblacklist=\n");
        assert!(matches!(
            Settings::from_ini(&ini),
            Err(ConfigError::KeyOutOfRange { key: "convert-key" })
        ));
    }

    #[test]
    fn settings_reject_non_positive_delay() {
        let ini = IniConfig::parse("[Easy Switcher]\nlayout-switch=62\nconvert-key=0\ndelay=0\nblacklist=\n");
        assert!(matches!(
            Settings::from_ini(&ini),
            Err(ConfigError::DelayOutOfRange)
        ));
    }

    #[test]
    fn blacklist_filters_malformed_uids() {
        let good_uid = "0003:046d:c31c:0111:00000000deadbeef";
        let text = format!(
            "[Easy Switcher]\nlayout-switch=62\nconvert-key=0\ndelay=10\nblacklist= {good_uid} , junk, 0000:0000 \n"
        );
        let ini = IniConfig::parse(&text);
        let settings = Settings::from_ini(&ini).expect("valid settings");
        assert_eq!(settings.blacklist, vec![good_uid.to_string()]);
    }
}
