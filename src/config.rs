//! Runtime configuration, resolved once at startup and handed to the router.

use std::path::PathBuf;

use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub const DEFAULT_SESSION_COOKIE: &str = "projecthub_session";

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database file (from PROJECTHUB_DB_PATH). Defaults to the platform data dir.
    pub database_path: Option<PathBuf>,
    /// Cookie carrying the session token (from PROJECTHUB_SESSION_COOKIE).
    pub session_cookie: String,
    /// Allowed CORS origins (from PROJECTHUB_CORS_ORIGINS, comma-separated).
    /// Unset means permissive CORS.
    pub cors_origins: Option<Vec<String>>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let database_path = get("PROJECTHUB_DB_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let session_cookie = get("PROJECTHUB_SESSION_COOKIE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string());

        let cors_origins = get("PROJECTHUB_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty());

        Self {
            database_path,
            session_cookie,
            cors_origins,
        }
    }

    pub fn resolve_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => crate::db::default_path(),
        }
    }

    pub fn cors_layer(&self) -> CorsLayer {
        let Some(origins) = &self.cors_origins else {
            return CorsLayer::permissive();
        };
        if origins.iter().any(|o| o == "*") {
            return CorsLayer::permissive();
        }

        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin: {}", o);
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = AppConfig::default();
        assert!(config.database_path.is_none());
        assert_eq!(config.session_cookie, DEFAULT_SESSION_COOKIE);
        assert!(config.cors_origins.is_none());
    }

    #[test]
    fn reads_all_variables() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PROJECTHUB_DB_PATH", "/tmp/hub.db"),
            ("PROJECTHUB_SESSION_COOKIE", "sid"),
            ("PROJECTHUB_CORS_ORIGINS", "https://a.example, https://b.example,"),
        ]));

        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/hub.db")));
        assert_eq!(config.session_cookie, "sid");
        assert_eq!(
            config.cors_origins,
            Some(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PROJECTHUB_SESSION_COOKIE", "  "),
            ("PROJECTHUB_CORS_ORIGINS", " , "),
        ]));
        assert_eq!(config.session_cookie, DEFAULT_SESSION_COOKIE);
        assert!(config.cors_origins.is_none());
    }

    #[test]
    fn explicit_database_path_wins() {
        let config = AppConfig::from_lookup(lookup(&[("PROJECTHUB_DB_PATH", "/srv/hub.db")]));
        assert_eq!(
            config.resolve_database_path().unwrap(),
            PathBuf::from("/srv/hub.db")
        );
    }
}
