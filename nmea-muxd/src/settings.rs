//! Configuration file location

use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

/// Get the XDG config directory for nmea-mux
/// Uses $XDG_CONFIG_HOME/nmea-mux, falls back to ~/.config/nmea-mux
fn config_dir(xdg_config: Option<&str>, home: Option<&Path>) -> Option<PathBuf> {
    if let Some(xdg_config) = xdg_config {
        let path = PathBuf::from(xdg_config);
        if path.is_absolute() {
            return Some(path.join("nmea-mux"));
        }
    }

    home.map(|h| h.join(".config").join("nmea-mux"))
}

/// Pick the configuration file: an explicit path, else the XDG location
fn resolve(
    explicit: Option<PathBuf>,
    xdg_config: Option<&str>,
    home: Option<&Path>,
) -> Option<PathBuf> {
    explicit
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| config_dir(xdg_config, home).map(|dir| dir.join(CONFIG_FILE)))
}

/// Configuration path for this process
///
/// `explicit` comes from the command line or `NMEA_MUX_CONFIG`.
pub fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    let xdg = std::env::var("XDG_CONFIG_HOME").ok();
    resolve(explicit, xdg.as_deref(), dirs::home_dir().as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let path = resolve(
            Some("/etc/boat.json".into()),
            Some("/xdg"),
            Some(Path::new("/home/skipper")),
        );
        assert_eq!(path, Some(PathBuf::from("/etc/boat.json")));
    }

    #[test]
    fn test_empty_explicit_path_ignored() {
        let path = resolve(Some(PathBuf::new()), Some("/xdg"), None);
        assert_eq!(path, Some(PathBuf::from("/xdg/nmea-mux/config.json")));
    }

    #[test]
    fn test_xdg_config_home() {
        let path = resolve(None, Some("/xdg"), Some(Path::new("/home/skipper")));
        assert_eq!(path, Some(PathBuf::from("/xdg/nmea-mux/config.json")));
    }

    #[test]
    fn test_relative_xdg_ignored() {
        let path = resolve(None, Some("xdg"), Some(Path::new("/home/skipper")));
        assert_eq!(
            path,
            Some(PathBuf::from("/home/skipper/.config/nmea-mux/config.json"))
        );
    }

    #[test]
    fn test_no_home() {
        assert_eq!(resolve(None, None, None), None);
    }
}
