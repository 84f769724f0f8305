//! Configuration vault – reads/writes `~/.ballnav/session.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use ballnav_runtime::SessionConfig;

/// Return the path to `~/.ballnav/session.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".ballnav").join("session.toml")
}

/// Load and validate the config at `path`, with environment overrides
/// applied.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<SessionConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: SessionConfig =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    cfg.validate().map_err(|e| e.to_string())?;
    Ok(Some(cfg))
}

/// Load `path`, or the defaults (plus overrides) when it does not exist.
pub fn load_or_default(path: &Path) -> Result<SessionConfig, String> {
    match load_from(path)? {
        Some(cfg) => Ok(cfg),
        None => {
            let mut cfg = SessionConfig::default();
            apply_env_overrides(&mut cfg);
            cfg.validate().map_err(|e| e.to_string())?;
            Ok(cfg)
        }
    }
}

/// Apply `BALLNAV_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `BALLNAV_TICK_PERIOD_MS` | `tick_period_ms` |
/// | `BALLNAV_TRIAL_DURATION_MS` | `task.trial_duration_ms` |
/// | `BALLNAV_EXTINCTION_FACTOR` | `extinction_factor` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut SessionConfig) {
    if let Ok(v) = std::env::var("BALLNAV_TICK_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.tick_period_ms = ms;
    }
    if let Ok(v) = std::env::var("BALLNAV_TRIAL_DURATION_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.task.trial_duration_ms = ms;
    }
    if let Ok(v) = std::env::var("BALLNAV_EXTINCTION_FACTOR")
        && let Ok(e) = v.parse::<f64>()
    {
        cfg.extinction_factor = e;
    }
}

/// Save `cfg` to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &SessionConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&SessionConfig::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = SessionConfig::default();
        cfg.task.reward_amount = 6.5;
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.task.reward_amount, 6.5);
        assert_eq!(loaded.sources, cfg.sources);
    }

    #[test]
    fn config_path_points_to_ballnav_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".ballnav"));
        assert!(p.to_string_lossy().ends_with("session.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn load_from_rejects_invalid_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[arena]\nsize = 0.0\n").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("arena_size"), "unexpected error: {err}");
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "tick_period_ms = \"fast\"").unwrap();
        assert!(load_from(&path).unwrap_err().starts_with("Failed to parse config"));
    }

    #[test]
    fn apply_env_overrides_changes_tick_period() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("BALLNAV_TICK_PERIOD_MS", "4") };
        let mut cfg = SessionConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.tick_period_ms, 4);
        unsafe { std::env::remove_var("BALLNAV_TICK_PERIOD_MS") };
    }

    #[test]
    fn apply_env_overrides_changes_trial_duration() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("BALLNAV_TRIAL_DURATION_MS", "12000") };
        let mut cfg = SessionConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.task.trial_duration_ms, 12_000);
        unsafe { std::env::remove_var("BALLNAV_TRIAL_DURATION_MS") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_extinction() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("BALLNAV_EXTINCTION_FACTOR", "steep") };
        let mut cfg = SessionConfig::default();
        let original = cfg.extinction_factor;
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.extinction_factor, original);
        unsafe { std::env::remove_var("BALLNAV_EXTINCTION_FACTOR") };
    }
}
