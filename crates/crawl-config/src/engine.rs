use crate::{env_or_default, ConfigError, FromEnv};

/// Worker-pool sizing and the seed-file CLI entry point (§10). Unlike
/// `RedisConfig`, every field here has a sensible default — a missing
/// worker-count variable scales the pool down, it does not fail startup.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub high_workers: usize,
    pub medium_workers: usize,
    pub store_workers: usize,
    pub retry_workers: usize,
    pub buffer_capacity_multiplier: usize,
    pub seed_file: Option<String>,
}

impl FromEnv for EngineConfig {
    /// Reads from environment variables with sensible defaults:
    /// - `HIGH_WORKERS` / `MEDIUM_WORKERS` / `STORE_WORKERS` /
    ///   `RETRY_WORKERS`: default 2 each.
    /// - `BUFFER_CAPACITY_MULTIPLIER`: default 2 (buffer capacity is
    ///   `multiplier * worker_count` per queue, §4.3).
    /// - `SEED_FILE`: unset by default; only read at startup when present.
    fn from_env() -> Result<Self, ConfigError> {
        let parse_usize = |key: &str, default: &str| -> Result<usize, ConfigError> {
            env_or_default(key, default)
                .parse()
                .map_err(|e| ConfigError::ParseError {
                    key: key.to_string(),
                    details: format!("{}", e),
                })
        };

        Ok(Self {
            high_workers: parse_usize("HIGH_WORKERS", "2")?,
            medium_workers: parse_usize("MEDIUM_WORKERS", "2")?,
            store_workers: parse_usize("STORE_WORKERS", "2")?,
            retry_workers: parse_usize("RETRY_WORKERS", "1")?,
            buffer_capacity_multiplier: parse_usize("BUFFER_CAPACITY_MULTIPLIER", "2")?,
            seed_file: std::env::var("SEED_FILE").ok(),
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            high_workers: 2,
            medium_workers: 2,
            store_workers: 2,
            retry_workers: 1,
            buffer_capacity_multiplier: 2,
            seed_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        temp_env::with_vars(
            [
                ("HIGH_WORKERS", None::<&str>),
                ("MEDIUM_WORKERS", None::<&str>),
                ("STORE_WORKERS", None::<&str>),
                ("RETRY_WORKERS", None::<&str>),
                ("BUFFER_CAPACITY_MULTIPLIER", None::<&str>),
                ("SEED_FILE", None::<&str>),
            ],
            || {
                let config = EngineConfig::from_env().unwrap();
                assert_eq!(config.high_workers, 2);
                assert_eq!(config.medium_workers, 2);
                assert_eq!(config.store_workers, 2);
                assert_eq!(config.retry_workers, 1);
                assert_eq!(config.buffer_capacity_multiplier, 2);
                assert_eq!(config.seed_file, None);
            },
        );
    }

    #[test]
    fn reads_custom_worker_counts() {
        temp_env::with_vars(
            [("HIGH_WORKERS", Some("8")), ("STORE_WORKERS", Some("1"))],
            || {
                let config = EngineConfig::from_env().unwrap();
                assert_eq!(config.high_workers, 8);
                assert_eq!(config.store_workers, 1);
            },
        );
    }

    #[test]
    fn reads_seed_file_when_set() {
        temp_env::with_var("SEED_FILE", Some("/tmp/seeds.txt"), || {
            let config = EngineConfig::from_env().unwrap();
            assert_eq!(config.seed_file.as_deref(), Some("/tmp/seeds.txt"));
        });
    }

    #[test]
    fn invalid_worker_count_is_a_parse_error() {
        temp_env::with_var("HIGH_WORKERS", Some("not_a_number"), || {
            let result = EngineConfig::from_env();
            assert!(result.is_err());
            assert!(result.unwrap_err().to_string().contains("HIGH_WORKERS"));
        });
    }
}
