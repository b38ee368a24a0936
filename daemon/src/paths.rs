/// Canonical file locations for the daemon.
///
/// Everything lives in one data directory:
///   - config.toml        Read once at startup.
///   - status.toml        Written by the daemon after each cycle that changes state.
///   - play_events.jsonl  Default play-event log.
///   - titles.toml        Default title catalog.
///
/// The directory is `$SYS_WEBHOOK_DIR` when set, otherwise
/// `$XDG_CONFIG_HOME/sys-webhook`, otherwise `$HOME/.config/sys-webhook`.
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "sys-webhook";
pub const DATA_DIR_ENV: &str = "SYS_WEBHOOK_DIR";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";
pub const PLAY_LOG_FILE_NAME: &str = "play_events.jsonl";
pub const TITLE_CATALOG_FILE_NAME: &str = "titles.toml";

/// Resolves the data directory from the process environment.
/// Returns `None` when no candidate variable is set.
pub fn app_data_dir() -> Option<PathBuf> {
    resolve_data_dir(|key| std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from))
}

fn resolve_data_dir(var: impl Fn(&str) -> Option<PathBuf>) -> Option<PathBuf> {
    if let Some(dir) = var(DATA_DIR_ENV) {
        return Some(dir);
    }
    if let Some(xdg) = var("XDG_CONFIG_HOME") {
        return Some(xdg.join(APP_DIR_NAME));
    }
    var("HOME").map(|home| home.join(".config").join(APP_DIR_NAME))
}

/// Returns the full path to the config file inside `data_dir`.
pub fn config_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

/// Returns the full path to the status file inside `data_dir`.
pub fn status_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(STATUS_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<PathBuf> {
        let map: HashMap<String, PathBuf> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), PathBuf::from(v)))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn explicit_dir_wins() {
        let dir = resolve_data_dir(env(&[
            (DATA_DIR_ENV, "/srv/webhook"),
            ("XDG_CONFIG_HOME", "/home/u/.cfg"),
            ("HOME", "/home/u"),
        ]));
        assert_eq!(dir, Some(PathBuf::from("/srv/webhook")));
    }

    #[test]
    fn xdg_config_home_is_next() {
        let dir = resolve_data_dir(env(&[("XDG_CONFIG_HOME", "/home/u/.cfg"), ("HOME", "/home/u")]));
        assert_eq!(dir, Some(PathBuf::from("/home/u/.cfg/sys-webhook")));
    }

    #[test]
    fn home_is_the_fallback() {
        let dir = resolve_data_dir(env(&[("HOME", "/home/u")]));
        assert_eq!(dir, Some(PathBuf::from("/home/u/.config/sys-webhook")));
    }

    #[test]
    fn no_environment_means_no_dir() {
        assert_eq!(resolve_data_dir(env(&[])), None);
    }

    #[test]
    fn config_and_status_share_same_parent_dir() {
        let dir = Path::new("/data");
        let config = config_file_path(dir);
        let status = status_file_path(dir);
        assert_eq!(config.parent(), status.parent());
        assert_eq!(config.file_name().unwrap(), CONFIG_FILE_NAME);
        assert_eq!(status.file_name().unwrap(), STATUS_FILE_NAME);
    }
}
