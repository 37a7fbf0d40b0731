use std::path::PathBuf;
use std::str::FromStr;

use crate::model::{HOUR_MS, Ms};

/// Runtime settings, read once from `FLEXIBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub public_url: String,
    pub meeting_base_url: String,
    pub compact_threshold: u64,
    pub session_ttl_hours: u64,
    pub metrics_port: Option<u16>,
    pub seed: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3000,
            data_dir: PathBuf::from("./data"),
            public_url: "http://localhost:3000".into(),
            meeting_base_url: "https://meet.flexibook.app".into(),
            compact_threshold: 1000,
            session_ttl_hours: 720,
            metrics_port: None,
            seed: false,
        }
    }
}

fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    get(key).and_then(|s| s.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable numbers keep their default.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            bind: get("FLEXIBOOK_BIND").unwrap_or(d.bind),
            port: parsed(&get, "FLEXIBOOK_PORT").unwrap_or(d.port),
            data_dir: get("FLEXIBOOK_DATA_DIR").map(PathBuf::from).unwrap_or(d.data_dir),
            public_url: get("FLEXIBOOK_PUBLIC_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(d.public_url),
            meeting_base_url: get("FLEXIBOOK_MEETING_BASE_URL").unwrap_or(d.meeting_base_url),
            compact_threshold: parsed(&get, "FLEXIBOOK_COMPACT_THRESHOLD").unwrap_or(d.compact_threshold),
            session_ttl_hours: parsed(&get, "FLEXIBOOK_SESSION_TTL_HOURS").unwrap_or(d.session_ttl_hours),
            metrics_port: parsed(&get, "FLEXIBOOK_METRICS_PORT"),
            seed: get("FLEXIBOOK_SEED").is_some_and(|v| v.trim() == "1"),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("flexibook.wal")
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn session_ttl_ms(&self) -> Ms {
        self.session_ttl_hours as Ms * HOUR_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let c = config(&[]);
        assert_eq!(c, Config::default());
        assert_eq!(c.addr(), "0.0.0.0:3000");
        assert_eq!(c.wal_path(), PathBuf::from("./data/flexibook.wal"));
        assert_eq!(c.session_ttl_ms(), 720 * HOUR_MS);
    }

    #[test]
    fn overrides_apply() {
        let c = config(&[
            ("FLEXIBOOK_PORT", "8080"),
            ("FLEXIBOOK_PUBLIC_URL", "https://flexibook.app/"),
            ("FLEXIBOOK_METRICS_PORT", "9100"),
            ("FLEXIBOOK_SEED", "1"),
        ]);
        assert_eq!(c.port, 8080);
        assert_eq!(c.public_url, "https://flexibook.app");
        assert_eq!(c.metrics_port, Some(9100));
        assert!(c.seed);
    }

    #[test]
    fn bad_numbers_fall_back() {
        let c = config(&[("FLEXIBOOK_PORT", "eighty"), ("FLEXIBOOK_COMPACT_THRESHOLD", "-5")]);
        assert_eq!(c.port, 3000);
        assert_eq!(c.compact_threshold, 1000);
        assert!(!config(&[("FLEXIBOOK_SEED", "yes")]).seed);
    }
}
