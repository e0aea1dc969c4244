use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use thiserror::Error;

use crate::{
    authentication::cryptography::generate_access_token,
    database::actions::users::AdminAccount,
    constants::{MAX_PAGE_SIZE, MAX_SESSION_LIFETIME_HOURS, RECIPE_COUNT_PER_PAGE},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {key} value: {info}")]
    Invalid { key: String, info: String },

    #[error("Environment variable {0} is required")]
    Missing(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub session_lifetime_hours: i64,
    pub media_root: PathBuf,
    pub page_size: i64,
    pub ingredients_file: Option<PathBuf>,
    pub admin: Option<AdminAccount>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            log::warn!("JWT_SECRET not set, sessions will not survive a restart");
            generate_access_token(64)
        });

        let page_size: i64 = try_load(&lookup, "PAGE_SIZE", &RECIPE_COUNT_PER_PAGE.to_string())?;
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ConfigError::Invalid {
                key: String::from("PAGE_SIZE"),
                info: format!("must be between 1 and {MAX_PAGE_SIZE}"),
            });
        }

        let session_lifetime_hours: i64 = try_load(&lookup, "SESSION_LIFETIME_HOURS", "24")?;
        if !(1..=MAX_SESSION_LIFETIME_HOURS).contains(&session_lifetime_hours) {
            return Err(ConfigError::Invalid {
                key: String::from("SESSION_LIFETIME_HOURS"),
                info: format!("must be between 1 and {MAX_SESSION_LIFETIME_HOURS}"),
            });
        }

        Ok(Self {
            port: try_load(&lookup, "FOODGRAM_PORT", "8000")?,
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| ConfigError::Missing(String::from("DATABASE_URL")))?,
            jwt_secret,
            session_lifetime_hours,
            media_root: try_load(&lookup, "MEDIA_ROOT", "media")?,
            page_size,
            ingredients_file: lookup("INGREDIENTS_FILE").map(PathBuf::from),
            admin: load_admin(&lookup)?,
        })
    }
}

/// `ADMIN_EMAIL` and `ADMIN_PASSWORD` come as a pair; neither means no admin bootstrap.
fn load_admin<F>(lookup: &F) -> Result<Option<AdminAccount>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match (lookup("ADMIN_EMAIL"), lookup("ADMIN_PASSWORD")) {
        (None, None) => Ok(None),
        (Some(email), Some(password)) => Ok(Some(AdminAccount {
            email,
            username: try_load(lookup, "ADMIN_USERNAME", "admin")?,
            password,
        })),
        (Some(_), None) => Err(ConfigError::Missing(String::from("ADMIN_PASSWORD"))),
        (None, Some(_)) => Err(ConfigError::Missing(String::from("ADMIN_EMAIL"))),
    }
}

fn try_load<T, F>(lookup: &F, key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| {
            log::info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            log::warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                info: e.to_string(),
            }
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_fill_missing_values() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://db")])).unwrap();

        assert_eq!(config.port, 8000);
        assert_eq!(config.session_lifetime_hours, 24);
        assert_eq!(config.page_size, 6);
        assert_eq!(config.media_root, PathBuf::from("media"));
        assert_eq!(config.ingredients_file, None);
        assert_eq!(config.admin, None);
        assert_eq!(config.jwt_secret.len(), 64);
    }

    #[test]
    fn bad_values_are_reported() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("FOODGRAM_PORT", "eighty"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));

        let result = Config::from_lookup(lookup(&[]));
        assert_eq!(
            result.unwrap_err(),
            ConfigError::Missing(String::from("DATABASE_URL"))
        );
    }

    #[test]
    fn admin_credentials_come_in_pairs() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("ADMIN_EMAIL", "root@example.com"),
            ("ADMIN_PASSWORD", "hunter2"),
        ]))
        .unwrap();
        assert_eq!(
            config.admin,
            Some(AdminAccount {
                email: String::from("root@example.com"),
                username: String::from("admin"),
                password: String::from("hunter2"),
            })
        );

        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("ADMIN_EMAIL", "root@example.com"),
        ]));
        assert_eq!(
            result.unwrap_err(),
            ConfigError::Missing(String::from("ADMIN_PASSWORD"))
        );
    }

    #[test]
    fn session_lifetime_is_bounded() {
        for hours in ["0", "-5", "9223372036854775807"] {
            let result = Config::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://db"),
                ("SESSION_LIFETIME_HOURS", hours),
            ]));
            assert_eq!(
                result.unwrap_err(),
                ConfigError::Invalid {
                    key: String::from("SESSION_LIFETIME_HOURS"),
                    info: format!("must be between 1 and {MAX_SESSION_LIFETIME_HOURS}"),
                }
            );
        }
    }
}
