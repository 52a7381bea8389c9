//! Configuration-file tests against real files on disk.

use std::io::Write;

use easy_switcher::config::{ConfigError, IniConfig, Settings, CONFIG_SECTION};

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("default.conf");
    let mut file = std::fs::File::create(&path).expect("create config");
    file.write_all(contents.as_bytes()).expect("write config");
    (dir, path)
}

#[test]
fn loads_a_complete_config_file() {
    let (_dir, path) = write_config(
        "[Easy Switcher]\n\
         # produced by the wizard\n\
         layout-switch=29+42\n\
         convert-key=70\n\
         delay=25\n\
         blacklist=0003:046d:c31c:0111:00000000deadbeef\n",
    );

    let settings = Settings::load(&path).expect("load settings");
    assert_eq!(settings.ls_keys, [29, 42]);
    assert_eq!(settings.conv_key, 70);
    assert_eq!(settings.delay_ms, 25);
    assert_eq!(
        settings.blacklist,
        vec!["0003:046d:c31c:0111:00000000deadbeef".to_string()]
    );
}

#[test]
fn missing_file_is_an_open_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = Settings::load(dir.path().join("nope.conf")).unwrap_err();
    assert!(matches!(err, ConfigError::Open { .. }));
}

#[test]
fn unknown_keys_and_sections_are_ignored() {
    let (_dir, path) = write_config(
        "[Fancy Extras]\n\
         sparkle=yes\n\
         [Easy Switcher]\n\
         layout-switch=125\n\
         convert-key=0\n\
         delay=10\n\
         blacklist=\n\
         future-option=42\n",
    );

    let settings = Settings::load(&path).expect("unknown keys must not break loading");
    assert_eq!(settings.ls_keys, [125, 0]);
}

#[test]
fn quoted_and_commented_values_parse() {
    let (_dir, path) = write_config(
        "[ Easy Switcher ]   ; section with padding\n\
         layout-switch = \"29+42\"   # quoted\n\
         convert-key = 0 ; default trigger\n\
         delay = 10\n\
         blacklist =\n",
    );

    let ini = IniConfig::load(&path).expect("load ini");
    assert_eq!(ini.get_str(CONFIG_SECTION, "layout-switch"), Some("29+42"));

    let settings = Settings::load(&path).expect("settings");
    assert_eq!(settings.ls_keys, [29, 42]);
    assert_eq!(settings.conv_key, 0);
}

#[test]
fn malformed_required_value_is_fatal() {
    let (_dir, path) = write_config(
        "[Easy Switcher]\n\
         layout-switch=alt+shift\n\
         convert-key=0\n\
         delay=10\n\
         blacklist=\n",
    );
    assert!(matches!(
        Settings::load(&path),
        Err(ConfigError::Unparsable {
            key: "layout-switch",
            ..
        })
    ));
}

#[test]
fn malformed_blacklist_entries_are_dropped_not_fatal() {
    let (_dir, path) = write_config(
        "[Easy Switcher]\n\
         layout-switch=125\n\
         convert-key=0\n\
         delay=10\n\
         blacklist=not-a-uid, 0003:046d:c31c:0111:00000000deadbeef ,also junk\n",
    );

    let settings = Settings::load(&path).expect("valid entries must survive");
    assert_eq!(
        settings.blacklist,
        vec!["0003:046d:c31c:0111:00000000deadbeef".to_string()]
    );
}
