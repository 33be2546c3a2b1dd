// src/config.rs
use std::path::PathBuf;

pub const SYSFS_ROOT_ENV: &str = "TOPOBIND_SYSFS_ROOT";
pub const LOG_ENV: &str = "TOPOBIND_LOG";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Root of the sysfs tree topology discovery reads from.
    pub sysfs_root: PathBuf,
    /// env_logger filter overriding the level picked from `-v`.
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self { sysfs_root: PathBuf::from("/sys"), log_filter: None }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut cfg = Self::default();
        if let Some(root) = lookup(SYSFS_ROOT_ENV).filter(|s| !s.is_empty()) {
            cfg.sysfs_root = PathBuf::from(root);
        }
        cfg.log_filter = lookup(LOG_ENV).filter(|s| !s.trim().is_empty());
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        assert_eq!(Config::from_lookup(|_| None), Config::default());
        assert_eq!(Config::default().sysfs_root, PathBuf::from("/sys"));
    }

    #[test]
    fn env_overrides() {
        let cfg = Config::from_lookup(|k| match k {
            SYSFS_ROOT_ENV => Some("/tmp/fake-sys".into()),
            LOG_ENV => Some("trace".into()),
            _ => None,
        });
        assert_eq!(cfg.sysfs_root, PathBuf::from("/tmp/fake-sys"));
        assert_eq!(cfg.log_filter.as_deref(), Some("trace"));
    }

    #[test]
    fn empty_values_are_ignored() {
        let cfg = Config::from_lookup(|_| Some(String::new()));
        assert_eq!(cfg, Config::default());
    }
}
