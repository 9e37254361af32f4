#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub geoip_path: String,
    pub cors_origins: Vec<String>,
    pub duckdb_memory_limit: String,
    /// Suppress repeat notifications from a rule within its own time window.
    pub alert_dedup: bool,
    pub alert_queue_size: usize,
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let smtp = match var("PULSETRACK_SMTP_HOST").filter(|h| !h.trim().is_empty()) {
            Some(host) => Some(SmtpConfig {
                host,
                port: var("PULSETRACK_SMTP_PORT")
                    .unwrap_or_else(|| "587".to_string())
                    .parse()
                    .map_err(|e| format!("invalid smtp port: {e}"))?,
                from: var("PULSETRACK_SMTP_FROM")
                    .unwrap_or_else(|| "pulsetrack@localhost".to_string()),
                username: var("PULSETRACK_SMTP_USERNAME"),
                password: var("PULSETRACK_SMTP_PASSWORD"),
            }),
            None => None,
        };

        Ok(Self {
            port: var("PULSETRACK_PORT")
                .unwrap_or_else(|| "8001".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: var("PULSETRACK_DATA_DIR").unwrap_or_else(|| "./data".to_string()),
            geoip_path: var("PULSETRACK_GEOIP_PATH")
                .unwrap_or_else(|| "./GeoLite2-City.mmdb".to_string()),
            cors_origins: var("PULSETRACK_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            duckdb_memory_limit: var("PULSETRACK_DUCKDB_MEMORY")
                .unwrap_or_else(|| "1GB".to_string()),
            alert_dedup: var("PULSETRACK_ALERT_DEDUP")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            alert_queue_size: var("PULSETRACK_ALERT_QUEUE_SIZE")
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(1024),
            smtp,
        })
    }

    /// Path of the DuckDB database file inside `data_dir`.
    pub fn db_path(&self) -> String {
        format!("{}/pulsetrack.db", self.data_dir.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Result<Config, String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = from_map(&[]).expect("config");
        assert_eq!(config.port, 8001);
        assert_eq!(config.data_dir, "./data");
        assert_eq!(config.duckdb_memory_limit, "1GB");
        assert!(config.alert_dedup);
        assert_eq!(config.alert_queue_size, 1024);
        assert!(config.cors_origins.is_empty());
        assert!(config.smtp.is_none());
        assert_eq!(config.db_path(), "./data/pulsetrack.db");
    }

    #[test]
    fn overrides_and_smtp() {
        let config = from_map(&[
            ("PULSETRACK_PORT", "9000"),
            ("PULSETRACK_CORS_ORIGINS", "https://a.test, https://b.test,"),
            ("PULSETRACK_ALERT_DEDUP", "false"),
            ("PULSETRACK_SMTP_HOST", "smtp.test"),
            ("PULSETRACK_SMTP_USERNAME", "mailer"),
        ])
        .expect("config");
        assert_eq!(config.port, 9000);
        assert_eq!(config.cors_origins, vec!["https://a.test", "https://b.test"]);
        assert!(!config.alert_dedup);
        let smtp = config.smtp.expect("smtp");
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.from, "pulsetrack@localhost");
        assert_eq!(smtp.username.as_deref(), Some("mailer"));
        assert_eq!(smtp.password, None);
    }

    #[test]
    fn invalid_port_is_an_error() {
        assert!(from_map(&[("PULSETRACK_PORT", "http")]).is_err());
        assert!(from_map(&[
            ("PULSETRACK_SMTP_HOST", "smtp.test"),
            ("PULSETRACK_SMTP_PORT", "99999")
        ])
        .is_err());
    }
}
