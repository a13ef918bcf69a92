use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::env;
use config;

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    // Populated from the .env file
    pub database_path: String,
    pub uploads_path: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub news_managers_moderate_all: bool,
    pub news_author_reads_unpublished: bool,
}

fn required_var(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| config::ConfigError::Message(format!(
        "FATAL: Environment variable '{}' is not set in your .env file.", name
    )))
}

fn flag_var(name: &str) -> bool {
    env::var(name)
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// The signing secret must be hex so it can be decoded into raw key bytes.
pub fn validate_jwt_secret(secret: &str) -> Result<(), config::ConfigError> {
    let len = secret.len();
    if !(64..=128).contains(&len) || len % 2 != 0 || !secret.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(config::ConfigError::Message(
            "FATAL: 'JWT_SECRET' must be an even number of hexadecimal characters, between 64 and 128 long.".to_string()
        ));
    }
    Ok(())
}

fn absolute_path(name: &str, value: &str) -> Result<(), config::ConfigError> {
    if Path::new(value).is_relative() {
        return Err(config::ConfigError::Message(format!(
            "FATAL: The '{}' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
            name, value
        )));
    }
    Ok(())
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path)
            .map_err(|e| config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}", env_path.display(), e
            )))?;

        let database_path = required_var("DATABASE_PATH")?;
        let uploads_path = required_var("UPLOADS_PATH")?;
        absolute_path("DATABASE_PATH", &database_path)?;
        absolute_path("UPLOADS_PATH", &uploads_path)?;

        let jwt_secret = required_var("JWT_SECRET")?;
        validate_jwt_secret(&jwt_secret)?;

        let jwt_ttl_hours = env::var("JWT_TTL_HOURS")
            .unwrap_or_else(|_| "24".to_string())
            .parse::<i64>()
            .ok()
            .filter(|h| *h > 0)
            .ok_or_else(|| config::ConfigError::Message(
                "FATAL: 'JWT_TTL_HOURS' must be a positive whole number.".to_string()
            ))?;

        let bcrypt_cost = match env::var("BCRYPT_COST") {
            Ok(v) => v.parse::<u32>()
                .ok()
                .filter(|c| (4..=31).contains(c))
                .ok_or_else(|| config::ConfigError::Message(
                    "FATAL: 'BCRYPT_COST' must be a whole number between 4 and 31.".to_string()
                ))?,
            Err(_) => bcrypt::DEFAULT_COST,
        };

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_default();
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let builder = config::Config::builder()
            // Base settings (web host/port) come from the TOML file.
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("uploads_path", uploads_path)?
            .set_override("jwt_secret", jwt_secret)?
            .set_override("jwt_ttl_hours", jwt_ttl_hours)?
            .set_override("bcrypt_cost", i64::from(bcrypt_cost))?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("news_managers_moderate_all", flag_var("NEWS_MANAGERS_MODERATE_ALL"))?
            .set_override("news_author_reads_unpublished", flag_var("NEWS_AUTHOR_READS_UNPUBLISHED"))?
            .build()?;

        builder.try_deserialize()
    }

    /// Full path to the portal database file.
    pub fn portal_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("portal.db")
    }

    pub fn uploads_root(&self) -> PathBuf {
        PathBuf::from(&self.uploads_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&"ab".repeat(32), true)]
    #[case(&"0f".repeat(64), true)]
    #[case(&"ab".repeat(16), false)]
    #[case(&"a".repeat(65), false)]
    #[case(&"zz".repeat(32), false)]
    #[case(&"ab".repeat(65), false)]
    fn jwt_secret_validation(#[case] secret: &str, #[case] ok: bool) {
        assert_eq!(validate_jwt_secret(secret).is_ok(), ok);
    }
}
