use std::path::PathBuf;

use crate::models::Actor;

const DEFAULT_DB_NAME: &str = "nrghax.db";
const APP_DIR: &str = "nrghax";

pub const DB_ENV: &str = "NRGHAX_DB";
pub const LOCAL_STORE_ENV: &str = "NRGHAX_LOCAL_STORE";
pub const USER_ENV: &str = "NRGHAX_USER";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub local_store_dir: PathBuf,
    pub actor: Actor,
}

impl Config {
    /// Resolves paths and the acting user. `user_override` wins over `NRGHAX_USER`.
    pub fn resolve(user_override: Option<String>) -> Self {
        let user = user_override.or_else(|| std::env::var(USER_ENV).ok());
        Self {
            db_path: db_path(),
            local_store_dir: local_store_dir(),
            actor: Actor::from_user(user),
        }
    }
}

pub fn db_path() -> PathBuf {
    if let Ok(path) = std::env::var(DB_ENV) {
        return PathBuf::from(path);
    }

    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);

    if let Err(e) = std::fs::create_dir_all(&config_dir) {
        tracing::warn!(dir = %config_dir.display(), error = %e, "could not create config directory");
    }
    config_dir.join(DEFAULT_DB_NAME)
}

pub fn local_store_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(LOCAL_STORE_ENV) {
        return PathBuf::from(dir);
    }

    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Environment variables are process-wide, so everything touching them
    // lives in one test.
    #[test]
    fn env_overrides_and_defaults() {
        env::set_var(DB_ENV, "/tmp/test_nrghax.db");
        env::set_var(LOCAL_STORE_ENV, "/tmp/nrghax-local");
        env::set_var(USER_ENV, "env-user");

        let config = Config::resolve(None);
        assert_eq!(config.db_path, PathBuf::from("/tmp/test_nrghax.db"));
        assert_eq!(config.local_store_dir, PathBuf::from("/tmp/nrghax-local"));
        assert_eq!(config.actor, Actor::User("env-user".to_string()));

        let config = Config::resolve(Some("flag-user".to_string()));
        assert_eq!(config.actor, Actor::User("flag-user".to_string()));

        env::remove_var(DB_ENV);
        env::remove_var(LOCAL_STORE_ENV);
        env::remove_var(USER_ENV);

        let config = Config::resolve(None);
        assert!(config.db_path.ends_with("nrghax/nrghax.db"));
        assert!(config.local_store_dir.ends_with("nrghax"));
        assert_eq!(config.actor, Actor::Anonymous);
    }
}
