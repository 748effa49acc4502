use std::fmt::Display;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use tracing::info;

use crate::api::upload::DEFAULT_MAX_IMAGE_BYTES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Supabase { url: String, key: String },
    Memory { tokens: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub storage_bucket: String,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Reads the process environment. `main` loads `.env` beforehand.
    pub fn new() -> anyhow::Result<Self> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let backend = match lookup("TODO_BACKEND").as_deref().unwrap_or("supabase") {
            "supabase" => BackendKind::Supabase {
                url: required(&lookup, "SUPABASE_URL")?,
                key: required(&lookup, "SUPABASE_KEY")?,
            },
            "memory" => BackendKind::Memory {
                tokens: lookup("MEMORY_TOKENS").unwrap_or_default(),
            },
            other => return Err(anyhow!("Unknown TODO_BACKEND `{other}`")),
        };
        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parsed(&lookup, "PORT", 8080)?,
            backend,
            storage_bucket: lookup("STORAGE_BUCKET").unwrap_or_else(|| "todolist".to_string()),
            max_upload_bytes: parsed(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_IMAGE_BYTES)?,
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    lookup(key).with_context(|| format!("{key} must be set"))
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .parse()
            .with_context(|| format!("Invalid {key} value `{value}`")),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_for_memory_backend() {
        let config = Config::from_lookup(lookup(&[("TODO_BACKEND", "memory")])).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.storage_bucket, "todolist");
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(
            config.backend,
            BackendKind::Memory {
                tokens: String::new()
            }
        );
    }

    #[test]
    fn supabase_requires_credentials() {
        let err = Config::from_lookup(lookup(&[("SUPABASE_URL", "https://x.supabase.co")]))
            .unwrap_err();
        assert!(err.to_string().contains("SUPABASE_KEY"));

        let config = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_KEY", "secret"),
            ("PORT", "9000"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert!(matches!(config.backend, BackendKind::Supabase { .. }));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::from_lookup(lookup(&[("TODO_BACKEND", "mongo")])).is_err());
        assert!(Config::from_lookup(lookup(&[
            ("TODO_BACKEND", "memory"),
            ("PORT", "eighty")
        ]))
        .is_err());
    }
}
