use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_TEMP_PREFIX: &str = "temp";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("environment variable {name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// The bucket holding both the temp area and the permanent post files.
    pub s3_bucket: String,
    pub s3_region: String,
    /// Key prefix under which freshly uploaded, not yet claimed files live. No slashes.
    pub s3_temp_prefix: String,
    pub bind_address: SocketAddr,
    pub disable_migrations: bool,
    /// Requests running longer than this get a 408.
    pub request_timeout: Duration,
}

impl Config {
    /// Gets the relevant data from ENV and returns a new instance of Config.
    pub fn initialize() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let s3_bucket = required("S3_BUCKET_NAME")?;

        let s3_region = env::var("S3_REGION")
            .or_else(|_| env::var("AWS_REGION"))
            .unwrap_or_else(|_| DEFAULT_REGION.to_string());

        let s3_temp_prefix = env::var("S3_TEMP_PREFIX")
            .map(|prefix| prefix.trim_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_TEMP_PREFIX.to_string());

        if s3_temp_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                name: "S3_TEMP_PREFIX",
                reason: "the temp prefix can't be empty".to_string(),
            });
        }

        let bind_address = env::var("BIND_ADDRESS")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string())
            .parse()
            .map_err(|err: std::net::AddrParseError| ConfigError::Invalid {
                name: "BIND_ADDRESS",
                reason: err.to_string(),
            })?;

        let request_timeout = match env::var("REQUEST_TIMEOUT_SECS") {
            Err(_) => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            Ok(secs) => secs
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::Invalid {
                    name: "REQUEST_TIMEOUT_SECS",
                    reason: format!("{secs} is not a positive amount of seconds"),
                })?,
        };

        Ok(Self {
            database_url,
            s3_bucket,
            s3_region,
            s3_temp_prefix,
            bind_address,
            disable_migrations: env::var("DISABLE_MIGRATIONS").is_ok(),
            request_timeout,
        })
    }

    /// The public URL of an object in the bucket.
    pub fn public_url(&self, key: &str) -> String {
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.s3_bucket, self.s3_region, encoded_key
        )
    }

    /// Whether the given key sits in the temp upload area.
    pub fn is_temp_key(&self, key: &str) -> bool {
        key.strip_prefix(&self.s3_temp_prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| !rest.is_empty())
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/postboard_test".to_string(),
        s3_bucket: "postboard-media".to_string(),
        s3_region: "eu-west-1".to_string(),
        s3_temp_prefix: "temp".to_string(),
        bind_address: DEFAULT_BIND_ADDRESS.parse().unwrap(),
        disable_migrations: true,
        request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
    }
}
