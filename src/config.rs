use std::path::PathBuf;

use crate::purchases::model::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::{AppError, AppResult};

pub const DB_ENV: &str = "STOCKTAKE_DB";
pub const LOG_ENV: &str = "STOCKTAKE_LOG";
pub const LOG_FORMAT_ENV: &str = "STOCKTAKE_LOG_FORMAT";
pub const PAGE_SIZE_ENV: &str = "STOCKTAKE_PAGE_SIZE";

pub const DEFAULT_LOG_FILTER: &str = "stocktake=info,sqlx=warn";
const APP_DIR: &str = "stocktake";
const DB_FILE: &str = "stocktake.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_filter: String,
    pub log_json: bool,
    pub page_size: u32,
}

/// Values supplied on the command line. They win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub db_path: Option<PathBuf>,
    pub log_filter: Option<String>,
    pub log_json: bool,
    pub page_size: Option<u32>,
}

impl Config {
    pub fn resolve(overrides: ConfigOverrides) -> AppResult<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve using `env` as the environment lookup.
    pub fn resolve_with<F>(overrides: ConfigOverrides, env: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = match overrides.db_path.or_else(|| env(DB_ENV).map(PathBuf::from)) {
            Some(path) => path,
            None => default_db_path()?,
        };

        let log_filter = overrides
            .log_filter
            .or_else(|| env(LOG_ENV))
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let log_json = overrides.log_json
            || env(LOG_FORMAT_ENV).is_some_and(|format| format.eq_ignore_ascii_case("json"));

        let page_size = match overrides.page_size {
            Some(size) => size,
            None => match env(PAGE_SIZE_ENV) {
                Some(raw) => raw.trim().parse::<u32>().map_err(|err| {
                    AppError::new("CONFIG/INVALID", "Page size must be a positive integer")
                        .with_context("variable", PAGE_SIZE_ENV)
                        .with_context("value", raw.clone())
                        .with_context("error", err.to_string())
                })?,
                None => DEFAULT_PAGE_SIZE,
            },
        };
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(
                AppError::new("CONFIG/INVALID", "Page size is out of range")
                    .with_context("page_size", page_size.to_string())
                    .with_context("max", MAX_PAGE_SIZE.to_string()),
            );
        }

        Ok(Config {
            db_path,
            log_filter,
            log_json,
            page_size,
        })
    }
}

pub fn default_db_path() -> AppResult<PathBuf> {
    let base = match dirs::data_dir() {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    Ok(base.join(APP_DIR).join(DB_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_env_or_flags() {
        let config = Config::resolve_with(ConfigOverrides::default(), env_of(&[])).unwrap();
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert!(!config.log_json);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert!(config.db_path.ends_with("stocktake/stocktake.sqlite3"));
    }

    #[test]
    fn env_is_read_when_no_flag_given() {
        let env = env_of(&[
            (DB_ENV, "/tmp/st.sqlite3"),
            (LOG_ENV, "stocktake=debug"),
            (LOG_FORMAT_ENV, "JSON"),
            (PAGE_SIZE_ENV, "25"),
        ]);
        let config = Config::resolve_with(ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/st.sqlite3"));
        assert_eq!(config.log_filter, "stocktake=debug");
        assert!(config.log_json);
        assert_eq!(config.page_size, 25);
    }

    #[test]
    fn flags_override_env() {
        let env = env_of(&[(DB_ENV, "/tmp/env.sqlite3"), (PAGE_SIZE_ENV, "25")]);
        let overrides = ConfigOverrides {
            db_path: Some(PathBuf::from("/tmp/flag.sqlite3")),
            page_size: Some(5),
            ..ConfigOverrides::default()
        };
        let config = Config::resolve_with(overrides, env).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/flag.sqlite3"));
        assert_eq!(config.page_size, 5);
    }

    #[test]
    fn rejects_unparseable_or_out_of_range_page_size() {
        let err = Config::resolve_with(ConfigOverrides::default(), env_of(&[(PAGE_SIZE_ENV, "ten")]))
            .unwrap_err();
        assert_eq!(err.code(), "CONFIG/INVALID");

        let overrides = ConfigOverrides {
            page_size: Some(MAX_PAGE_SIZE + 1),
            ..ConfigOverrides::default()
        };
        let err = Config::resolve_with(overrides, env_of(&[])).unwrap_err();
        assert_eq!(err.code(), "CONFIG/INVALID");
    }
}
