use anyhow::Context;
use serde::Deserialize;

use crate::analysis::SummaryKind;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    fn from_lookup(var: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            url: var("DATABASE_URL").unwrap_or_else(|| "sqlite://labnote.db".into()),
            max_connections: var("DB_MAX_CONNECTIONS")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(5),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

impl JwtConfig {
    fn from_lookup(var: &impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            secret: var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "labnote".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "labnote-users".into()),
            ttl_minutes: var("JWT_TTL_MINUTES")
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: var("JWT_REFRESH_TTL_MINUTES")
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        })
    }
}

/// How uploaded result files are interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub time_column: String,
    pub metric_column: String,
    pub summary: SummaryKind,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            time_column: "time".into(),
            metric_column: "conversion".into(),
            summary: SummaryKind::Max,
        }
    }
}

/// Settings of the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    /// `false` replaces a reaction's result on re-upload, `true` keeps every upload.
    pub allow_multiple_results_per_reaction: bool,
    pub upload: UploadConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(&env_var)
    }

    fn from_lookup(var: &impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = UploadConfig::default();
        let upload = UploadConfig {
            time_column: var("UPLOAD_TIME_COLUMN").unwrap_or(defaults.time_column),
            metric_column: var("UPLOAD_METRIC_COLUMN").unwrap_or(defaults.metric_column),
            summary: match var("UPLOAD_SUMMARY") {
                Some(v) => v.parse()?,
                None => defaults.summary,
            },
        };

        Ok(Self {
            database: DatabaseConfig::from_lookup(var),
            jwt: JwtConfig::from_lookup(var)?,
            allow_multiple_results_per_reaction: parse_flag(
                var("ALLOW_MULTIPLE_RESULTS_PER_REACTION").as_deref(),
            ),
            upload,
        })
    }
}

/// Settings of the maintenance subcommands. They never touch tokens, so no
/// JWT settings are read.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub database: DatabaseConfig,
    pub admin_key: Option<String>,
}

impl AdminConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(&env_var)
    }

    fn from_lookup(var: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            database: DatabaseConfig::from_lookup(var),
            admin_key: var("LABNOTE_ADMIN_KEY").filter(|k| !k.trim().is_empty()),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn flag_parsing_accepts_common_truthy_values() {
        assert!(parse_flag(Some("true")));
        assert!(parse_flag(Some(" YES ")));
        assert!(parse_flag(Some("1")));
        assert!(!parse_flag(Some("false")));
        assert!(!parse_flag(Some("")));
        assert!(!parse_flag(None));
    }

    #[test]
    fn upload_defaults() {
        let cfg = UploadConfig::default();
        assert_eq!(cfg.time_column, "time");
        assert_eq!(cfg.metric_column, "conversion");
        assert_eq!(cfg.summary, SummaryKind::Max);
    }

    #[test]
    fn server_config_requires_jwt_secret() {
        let err = AppConfig::from_lookup(&lookup(&[("DATABASE_URL", "sqlite://x.db")])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));

        let cfg = AppConfig::from_lookup(&lookup(&[
            ("JWT_SECRET", "s"),
            ("UPLOAD_SUMMARY", "mean"),
            ("ALLOW_MULTIPLE_RESULTS_PER_REACTION", "true"),
        ]))
        .unwrap();
        assert_eq!(cfg.database.url, "sqlite://labnote.db");
        assert_eq!(cfg.database.max_connections, 5);
        assert_eq!(cfg.upload.summary, SummaryKind::Mean);
        assert!(cfg.allow_multiple_results_per_reaction);
    }

    #[test]
    fn unknown_upload_summary_is_rejected() {
        assert!(AppConfig::from_lookup(&lookup(&[
            ("JWT_SECRET", "s"),
            ("UPLOAD_SUMMARY", "median"),
        ]))
        .is_err());
    }

    #[test]
    fn admin_config_needs_no_jwt_settings() {
        let cfg = AdminConfig::from_lookup(&lookup(&[
            ("DATABASE_URL", "sqlite://lab.db"),
            ("LABNOTE_ADMIN_KEY", "k"),
        ]));
        assert_eq!(cfg.database.url, "sqlite://lab.db");
        assert_eq!(cfg.admin_key.as_deref(), Some("k"));

        let blank = AdminConfig::from_lookup(&lookup(&[("LABNOTE_ADMIN_KEY", "  ")]));
        assert!(blank.admin_key.is_none());
    }
}
