use segmentation::config::{
    ConnectionConfig, ImportConfig, Listener, StorageConfig, ValidationError, parse_duration,
};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    #[serde(default = "default_statsd_port")]
    pub statsd_port: u16,
}

fn default_statsd_port() -> u16 {
    8125
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub file_name: String,
    /// Log files older than this are removed at startup.
    pub cleanup_max_age_days: u64,
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            dir: PathBuf::from("log"),
            file_name: "segmentation_import.log".into(),
            cleanup_max_age_days: 7,
            sentry_dsn: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Deployment environment, selects the log format: `local`, `dev` or anything else.
    pub env: String,
    pub listener: Listener,
    pub connection: ConnectionConfig,
    pub import: ImportConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub metrics: Option<MetricsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            env: "local".into(),
            listener: Listener::default(),
            connection: ConnectionConfig::default(),
            import: ImportConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            metrics: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// File (or defaults), then process environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override values with the variables returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &'static str| lookup(name).map(|value| (name, value));

        if let Some((_, value)) = var("ENV") {
            self.env = value;
        }

        if let Some((_, value)) = var("APP_HOST") {
            self.listener.host = value;
        }
        if let Some((name, value)) = var("APP_PORT") {
            self.listener.port = parse_env(name, value)?;
        }

        if let StorageConfig::Postgres(pg) = &mut self.storage {
            if let Some((_, value)) = var("DB_HOST") {
                pg.host = value;
            }
            if let Some((name, value)) = var("DB_PORT") {
                pg.port = parse_env(name, value)?;
            }
            if let Some((_, value)) = var("DB_NAME") {
                pg.name = value;
            }
            if let Some((_, value)) = var("DB_USER") {
                pg.user = value;
            }
            if let Some((_, value)) = var("DB_PASSWORD") {
                pg.password = value;
            }
        }

        let connection = &mut self.connection;
        if let Some((name, value)) = var("CONN_URI") {
            connection.url = Url::parse(&value).map_err(|_| invalid_env(name, value))?;
        }
        if let Some((_, value)) = var("CONN_AUTH_LOGIN_PWD") {
            connection.credential = value;
        }
        if let Some((_, value)) = var("CONN_USER_AGENT") {
            connection.user_agent = value;
        }
        if let Some((name, value)) = var("CONN_TIMEOUT") {
            connection.timeout = parse_duration(&value).map_err(|_| invalid_env(name, value))?;
        }
        if let Some((name, value)) = var("CONN_INTERVAL") {
            connection.interval = parse_duration(&value).map_err(|_| invalid_env(name, value))?;
        }

        let import = &mut self.import;
        if let Some((name, value)) = var("IMPORT_BATCH_SIZE") {
            import.batch_size = parse_env(name, value)?;
        }
        if let Some((name, value)) = var("USE_TEST_DATA") {
            import.use_test_data = parse_bool(name, value)?;
        }
        if let Some((name, value)) = var("IMPORT_ON_STARTUP") {
            import.on_startup = parse_bool(name, value)?;
        }
        if let Some((name, value)) = var("SYNTHETIC_COUNT") {
            import.synthetic.count = parse_env(name, value)?;
        }
        if let Some((name, value)) = var("SYNTHETIC_SEED") {
            import.synthetic.seed = Some(parse_env(name, value)?);
        }

        if let Some((_, value)) = var("LOG_DIR") {
            self.logging.dir = PathBuf::from(value);
        }
        if let Some((name, value)) = var("LOG_CLEANUP_MAX_AGE") {
            self.logging.cleanup_max_age_days = parse_env(name, value)?;
        }
        if let Some((_, value)) = var("SENTRY_DSN") {
            self.logging.sentry_dsn = Some(value).filter(|dsn| !dsn.is_empty());
        }

        if let Some((_, value)) = var("STATSD_HOST") {
            let port = self
                .metrics
                .as_ref()
                .map_or_else(default_statsd_port, |m| m.statsd_port);
            self.metrics = Some(MetricsConfig {
                statsd_host: value,
                statsd_port: port,
            });
        }
        if let Some((name, value)) = var("STATSD_PORT")
            && let Some(metrics) = &mut self.metrics
        {
            metrics.statsd_port = parse_env(name, value)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.connection.validate()?;
        self.import.validate()?;
        Ok(())
    }
}

fn invalid_env(name: &'static str, value: String) -> ConfigError {
    ConfigError::InvalidEnv { name, value }
}

fn parse_env<T: FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid_env(name, value))
}

fn parse_bool(name: &'static str, value: String) -> Result<bool, ConfigError> {
    let parsed = match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    };
    parsed.ok_or_else(|| invalid_env(name, value))
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use segmentation::config::PostgresConfig;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.env, "local");
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.import.batch_size, 50);
        assert_eq!(config.connection.interval, Duration::from_millis(1500));
        assert_eq!(config.logging.cleanup_max_age_days, 7);
        assert_eq!(config.storage, StorageConfig::Postgres(PostgresConfig::default()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let yaml = r#"
            env: production
            listener:
                host: 127.0.0.1
                port: 9000
            connection:
                url: https://sap.internal/segmentation
                credential: "user:pwd"
                interval: 100ms
            import:
                batch_size: 10
                synthetic:
                    seed: 42
            storage:
                type: sqlite
                path: /var/lib/segmentation/db.sqlite
            logging:
                dir: /var/log/segmentation
                sentry_dsn: https://key@sentry.internal/1
            metrics:
                statsd_host: 127.0.0.1
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.env, "production");
        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.connection.url.as_str(), "https://sap.internal/segmentation");
        assert_eq!(config.connection.interval, Duration::from_millis(100));
        assert_eq!(config.connection.user_agent, "spacecount-test");
        assert_eq!(config.import.batch_size, 10);
        assert_eq!(config.import.synthetic.seed, Some(42));
        assert_eq!(config.import.synthetic.count, 30);
        assert_eq!(
            config.storage,
            StorageConfig::Sqlite {
                path: "/var/lib/segmentation/db.sqlite".into()
            }
        );
        assert_eq!(config.logging.file_name, "segmentation_import.log");
        assert_eq!(
            config.metrics,
            Some(MetricsConfig {
                statsd_host: "127.0.0.1".into(),
                statsd_port: 8125
            })
        );
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/segmentation.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        let tmp = write_tmp_file("listener:\n  port: 9000\nimport:\n  batch_size: 10\n");
        let mut config = Config::from_file(tmp.path()).unwrap();

        config
            .apply_env(env(&[
                ("ENV", "dev"),
                ("APP_PORT", "9100"),
                ("DB_HOST", "db.internal"),
                ("CONN_URI", "http://127.0.0.1:9999/segmentation"),
                ("CONN_TIMEOUT", "2s"),
                ("CONN_INTERVAL", "250"),
                ("IMPORT_BATCH_SIZE", "25"),
                ("USE_TEST_DATA", "true"),
                ("IMPORT_ON_STARTUP", "0"),
                ("SYNTHETIC_SEED", "7"),
                ("LOG_CLEANUP_MAX_AGE", "3"),
                ("STATSD_HOST", "statsd"),
                ("STATSD_PORT", "9125"),
            ]))
            .unwrap();

        assert_eq!(config.env, "dev");
        assert_eq!(config.listener.port, 9100);
        assert_eq!(config.import.batch_size, 25);
        assert!(config.import.use_test_data);
        assert!(!config.import.on_startup);
        assert_eq!(config.import.synthetic.seed, Some(7));
        assert_eq!(config.connection.timeout, Duration::from_secs(2));
        assert_eq!(config.connection.interval, Duration::from_millis(250));
        assert_eq!(config.connection.url.port(), Some(9999));
        assert_eq!(config.logging.cleanup_max_age_days, 3);

        let StorageConfig::Postgres(pg) = &config.storage else {
            panic!("expected postgres storage");
        };
        assert_eq!(pg.host, "db.internal");

        let metrics = config.metrics.unwrap();
        assert_eq!(metrics.statsd_host, "statsd");
        assert_eq!(metrics.statsd_port, 9125);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("IMPORT_BATCH_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: "IMPORT_BATCH_SIZE",
                ..
            }
        ));

        let err = config
            .apply_env(env(&[("CONN_INTERVAL", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_validation_after_env() {
        let mut config = Config::default();
        config.apply_env(env(&[("IMPORT_BATCH_SIZE", "0")])).unwrap();
        assert_eq!(config.validate(), Err(ValidationError::InvalidBatchSize));
    }
}
