use musea::Settings;
use std::env;
use tempfile::TempDir;

#[test]
fn env_overrides_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("musea.toml");
    std::fs::write(
        &config_path,
        r#"
[http]
timeout_secs = 30

[semantic]
filter_threshold = 20000
"#,
    )
    .unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("MUSEA_HTTP__TIMEOUT_SECS", "45");
        env::set_var("MUSEA_CACHE__CAPACITY", "64");
    }

    let settings = Settings::load_from(&config_path).unwrap();

    // Environment variable overrides the config file
    assert_eq!(settings.http.timeout_secs, 45);
    // Env var supplies a value the file never mentions
    assert_eq!(settings.cache.capacity, 64);
    // File value survives when no env var competes
    assert_eq!(settings.semantic.filter_threshold, 20_000);
    // Defaults fill the rest
    assert_eq!(settings.http.max_connections_per_host, 25);

    unsafe {
        env::remove_var("MUSEA_HTTP__TIMEOUT_SECS");
        env::remove_var("MUSEA_CACHE__CAPACITY");
    }
}
