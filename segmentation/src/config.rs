use serde::{Deserialize, Deserializer};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Batch size must be greater than 0")]
    InvalidBatchSize,

    #[error("Synthetic record count must be greater than 0")]
    InvalidSyntheticCount,

    #[error("Connection URL must use http or https, got: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Connection to the upstream SAP segmentation endpoint.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Endpoint queried with `p_limit` / `p_offset`.
    pub url: Url,
    /// `login:password`, sent base64 encoded as HTTP Basic credentials.
    pub credential: String,
    pub user_agent: String,
    /// Deadline for each individual HTTP call.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Pause between two page requests.
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            url: Url::parse("http://bsm.api.iql.ru/ords/bsm/segmentation/get_segmentation")
                .expect("default connection url is valid"),
            credential: String::new(),
            user_agent: "spacecount-test".into(),
            timeout: Duration::from_secs(5),
            interval: Duration::from_millis(1500),
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ValidationError::UnsupportedScheme(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyntheticConfig {
    pub count: usize,
    /// Fixed seed for reproducible data. A fresh seed is drawn per run when unset.
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig {
            count: 30,
            seed: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImportConfig {
    /// Records requested per page.
    pub batch_size: u32,
    /// Skip the upstream entirely and import generated records.
    pub use_test_data: bool,
    /// Run one import in the background when the server starts.
    pub on_startup: bool,
    pub synthetic: SyntheticConfig,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            batch_size: 50,
            use_test_data: false,
            on_startup: true,
            synthetic: SyntheticConfig::default(),
        }
    }
}

impl ImportConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::InvalidBatchSize);
        }
        if self.synthetic.count == 0 {
            return Err(ValidationError::InvalidSyntheticCount);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        PostgresConfig {
            host: "127.0.0.1".into(),
            port: 5432,
            name: "mesh_group".into(),
            user: "postgres".into(),
            password: "postgres".into(),
            max_connections: 5,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StorageConfig {
    Postgres(PostgresConfig),
    Sqlite { path: String },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Postgres(PostgresConfig::default())
    }
}

/// Parses a bare number of milliseconds (`1500`) or a Go style duration made
/// of one or more `<number><unit>` parts, e.g. `1500ms`, `1.5s`, `1m30s`, `2h`.
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`.
pub fn parse_duration(value: &str) -> Result<Duration, ValidationError> {
    let value = value.trim();
    let invalid = || ValidationError::InvalidDuration(value.to_string());

    if value.is_empty() {
        return Err(invalid());
    }
    if let Ok(ms) = value.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }

    let mut total_nanos: u128 = 0;
    let mut rest = value;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => return Err(invalid()),
        };
        total_nanos = total_nanos
            .checked_add(scaled_nanos(number, unit_nanos).ok_or_else(invalid)?)
            .ok_or_else(invalid)?;
        rest = tail;
    }

    u64::try_from(total_nanos)
        .map(Duration::from_nanos)
        .map_err(|_| invalid())
}

/// `number` (digits with an optional fraction) times `unit_nanos`, truncated
/// to whole nanoseconds.
fn scaled_nanos(number: &str, unit_nanos: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }

    let parse = |digits: &str| -> Option<u128> {
        if digits.is_empty() {
            Some(0)
        } else {
            digits.parse().ok()
        }
    };
    // Precision beyond 18 fractional digits is below a nanosecond for every unit
    let fraction = &fraction[..fraction.len().min(18)];
    let scale = 10u128.pow(fraction.len() as u32);

    let whole_nanos = parse(whole)?.checked_mul(unit_nanos)?;
    let fraction_nanos = parse(fraction)?.checked_mul(unit_nanos)? / scale;
    whole_nanos.checked_add(fraction_nanos)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Millis(u64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Millis(ms) => Ok(Duration::from_millis(ms)),
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1500ms"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("250"), Ok(Duration::from_millis(250)));
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("1.2.3s").is_err());
        assert!(parse_duration(".s").is_err());
    }

    #[test]
    fn test_parse_go_durations() {
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration(".5s"), Ok(Duration::from_millis(500)));
        assert_eq!(
            parse_duration("1h2m3.25s"),
            Ok(Duration::from_millis(3_723_250))
        );
        assert_eq!(parse_duration("250us"), Ok(Duration::from_micros(250)));
        assert_eq!(parse_duration("10ns"), Ok(Duration::from_nanos(10)));
    }

    #[test]
    fn test_parse_sections() {
        let yaml = r#"
url: "https://sap.internal/segmentation"
credential: "user:pwd"
user_agent: "segmentation-sync"
timeout: 3s
interval: 200
"#;
        let connection: ConnectionConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(connection.validate().is_ok());
        assert_eq!(connection.timeout, Duration::from_secs(3));
        assert_eq!(connection.interval, Duration::from_millis(200));

        let storage: StorageConfig = serde_yaml::from_str(
            r#"
type: sqlite
path: /var/lib/segmentation/db.sqlite
"#,
        )
        .unwrap();
        assert_eq!(
            storage,
            StorageConfig::Sqlite {
                path: "/var/lib/segmentation/db.sqlite".into()
            }
        );

        let storage: StorageConfig = serde_yaml::from_str(
            r#"
type: postgres
host: db
port: 5433
name: segments
user: sync
password: secret
"#,
        )
        .unwrap();
        let StorageConfig::Postgres(pg) = storage else {
            panic!("expected postgres storage");
        };
        assert_eq!(pg.port, 5433);
        assert_eq!(pg.max_connections, 5);
    }

    #[test]
    fn test_validation_errors() {
        let mut import = ImportConfig::default();
        assert!(import.validate().is_ok());

        import.batch_size = 0;
        assert_eq!(import.validate(), Err(ValidationError::InvalidBatchSize));

        let mut import = ImportConfig::default();
        import.synthetic.count = 0;
        assert_eq!(
            import.validate(),
            Err(ValidationError::InvalidSyntheticCount)
        );

        let listener = Listener {
            host: "0.0.0.0".into(),
            port: 0,
        };
        assert_eq!(listener.validate(), Err(ValidationError::InvalidPort));

        let connection = ConnectionConfig {
            url: Url::parse("ftp://sap.internal/").unwrap(),
            ..Default::default()
        };
        assert!(matches!(
            connection.validate(),
            Err(ValidationError::UnsupportedScheme(_))
        ));

        // Invalid URLs are rejected during deserialization
        assert!(serde_yaml::from_str::<ConnectionConfig>("url: not-a-url").is_err());
    }
}
