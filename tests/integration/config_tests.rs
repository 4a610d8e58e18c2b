use dupevault::config::Config;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.io_threads, 4);
    assert!(config.exclude_empty_from_cache);
}

#[test]
fn test_config_load_from_toml() {
    figment::Jail::expect_with(|_jail| {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
database_path = "/var/lib/dupevault/cache.db"
io_threads = 8
hide_empty_files = false
prune_vanished = true
ignore_patterns = ["*.tmp", "node_modules/"]

[trash]
dir_name = ".Trash-dv"
volume_roots = ["/mnt/photos"]
"#,
        )
        .unwrap();

        let config = Config::load(Some(&config_path)).unwrap();

        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/var/lib/dupevault/cache.db"))
        );
        assert_eq!(config.io_threads, 8);
        assert!(!config.hide_empty_files);
        assert!(config.prune_vanished);
        assert_eq!(config.ignore_patterns, vec!["*.tmp", "node_modules/"]);
        assert_eq!(config.trash.dir_name, ".Trash-dv");
        assert_eq!(config.trash.volume_roots, vec![PathBuf::from("/mnt/photos")]);
        // Unset keys keep their defaults.
        assert!(config.exclude_empty_from_cache);
        Ok(())
    });
}

#[test]
fn test_config_missing_file_uses_defaults() {
    figment::Jail::expect_with(|_jail| {
        let temp_dir = tempdir().unwrap();
        let config = Config::load(Some(&temp_dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.io_threads, 4);
        Ok(())
    });
}

#[test]
fn test_config_env_overrides_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "io_threads = 8\n").unwrap();

    figment::Jail::expect_with(|jail| {
        jail.set_env("DUPEVAULT_IO_THREADS", "16");
        jail.set_env("DUPEVAULT_TRASH__DIR_NAME", ".env-trash");

        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("DUPEVAULT_").split("__"))
            .extract()?;

        assert_eq!(config.io_threads, 16);
        assert_eq!(config.trash.dir_name, ".env-trash");
        Ok(())
    });
}

#[test]
fn test_config_save_roundtrip() {
    figment::Jail::expect_with(|_jail| {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.io_threads = 2;
        config.ignore_patterns.push("*.bak".to_string());
        config.save(&config_path).unwrap();

        let saved = fs::read_to_string(&config_path).unwrap();
        assert!(saved.contains("io_threads = 2"));
        assert!(saved.contains("[trash]"));
        assert!(!saved.contains("database_path"));

        let loaded = Config::load(Some(&config_path)).unwrap();
        assert_eq!(loaded.io_threads, 2);
        assert_eq!(loaded.ignore_patterns, vec!["*.bak"]);
        Ok(())
    });
}

#[test]
fn test_config_invalid_toml_is_error() {
    figment::Jail::expect_with(|_jail| {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "io_threads = \"many\"").unwrap();

        assert!(Config::load(Some(&config_path)).is_err());
        Ok(())
    });
}
