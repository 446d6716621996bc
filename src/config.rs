// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! typed settings built from them. Configuration is loaded once at startup
//! and injected into constructors; nothing reads the environment afterwards.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATABASE_PATH` | redb database file | `./data/ctflab.redb` |
//! | `JWT_ACCESS_SECRET` | Access token secret (`JWT_SECRET` accepted as legacy alias) | Required |
//! | `JWT_REFRESH_SECRET` | Refresh token secret, must differ from the access secret | Required |
//! | `JWT_ISSUER` | `iss` claim | `ctflab` |
//! | `JWT_ACCESS_EXPIRE_HOURS` | Access token lifetime | `1` |
//! | `JWT_REFRESH_EXPIRE_HOURS` | Refresh token lifetime | `168` |
//! | `JWT_LEEWAY_SECONDS` | Expiry skew allowance | `0` |
//! | `REVOCATION_CAPACITY` | Max revoked tokens remembered | `10000` |
//! | `OAUTH_LINK_BY_USERNAME` | Attach new OAuth identities to a user with the same username | `true` |
//! | `SESSION_SECRET` | Key for signing the OAuth `state` parameter | Required with any provider |
//! | `GITHUB_KEY` / `GITHUB_SECRET` / `GITHUB_CALLBACK` | GitHub OAuth app | Optional |
//! | `GOOGLE_KEY` / `GOOGLE_SECRET` / `GOOGLE_CALLBACK` | Google OAuth app | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::time::Duration;

use crate::oauth::Provider;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATABASE_PATH_ENV: &str = "DATABASE_PATH";

pub const JWT_ACCESS_SECRET_ENV: &str = "JWT_ACCESS_SECRET";
/// Pre-split name for the access secret, still honored.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const JWT_REFRESH_SECRET_ENV: &str = "JWT_REFRESH_SECRET";
pub const JWT_ISSUER_ENV: &str = "JWT_ISSUER";
pub const JWT_ACCESS_EXPIRE_HOURS_ENV: &str = "JWT_ACCESS_EXPIRE_HOURS";
pub const JWT_REFRESH_EXPIRE_HOURS_ENV: &str = "JWT_REFRESH_EXPIRE_HOURS";
pub const JWT_LEEWAY_SECONDS_ENV: &str = "JWT_LEEWAY_SECONDS";

pub const REVOCATION_CAPACITY_ENV: &str = "REVOCATION_CAPACITY";
pub const OAUTH_LINK_BY_USERNAME_ENV: &str = "OAUTH_LINK_BY_USERNAME";
pub const SESSION_SECRET_ENV: &str = "SESSION_SECRET";

pub const GITHUB_KEY_ENV: &str = "GITHUB_KEY";
pub const GITHUB_SECRET_ENV: &str = "GITHUB_SECRET";
pub const GITHUB_CALLBACK_ENV: &str = "GITHUB_CALLBACK";
pub const GOOGLE_KEY_ENV: &str = "GOOGLE_KEY";
pub const GOOGLE_SECRET_ENV: &str = "GOOGLE_SECRET";
pub const GOOGLE_CALLBACK_ENV: &str = "GOOGLE_CALLBACK";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATABASE_PATH: &str = "./data/ctflab.redb";
pub const DEFAULT_ISSUER: &str = "ctflab";
pub const DEFAULT_ACCESS_EXPIRE_HOURS: u64 = 1;
pub const DEFAULT_REFRESH_EXPIRE_HOURS: u64 = 168;
/// Ten years. Anything longer is a typo, not a policy.
pub const MAX_EXPIRE_HOURS: u64 = 87_600;
pub const DEFAULT_REVOCATION_CAPACITY: usize = 10_000;

/// Secrets shorter than this are accepted but logged as weak.
const RECOMMENDED_SECRET_LEN: usize = 32;

/// Configuration errors. Any of these aborts startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{0} must not be empty")]
    EmptySecret(&'static str),

    #[error("JWT_REFRESH_SECRET must differ from the access token secret")]
    SharedSecret,

    #[error("access token lifetime must be positive")]
    NonPositiveLifetime,

    #[error("refresh token lifetime ({refresh_secs}s) must exceed access token lifetime ({access_secs}s)")]
    LifetimeOrder { access_secs: u64, refresh_secs: u64 },

    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },

    #[error("SESSION_SECRET is required when an OAuth provider is configured")]
    MissingSessionSecret,
}

// =============================================================================
// Token Settings
// =============================================================================

/// Inputs for the token manager.
#[derive(Clone)]
pub struct TokenSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Zero unless explicitly configured.
    pub leeway: Duration,
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("leeway", &self.leeway)
            .finish()
    }
}

impl TokenSettings {
    /// Settings with default issuer and lifetimes.
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            issuer: DEFAULT_ISSUER.to_string(),
            access_ttl: hours(DEFAULT_ACCESS_EXPIRE_HOURS),
            refresh_ttl: hours(DEFAULT_REFRESH_EXPIRE_HOURS),
            leeway: Duration::ZERO,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_lifetimes(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Enforce the dual-secret and lifetime-ordering guarantees.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.is_empty() {
            return Err(ConfigError::EmptySecret(JWT_ACCESS_SECRET_ENV));
        }
        if self.refresh_secret.is_empty() {
            return Err(ConfigError::EmptySecret(JWT_REFRESH_SECRET_ENV));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::SharedSecret);
        }
        if self.access_ttl.is_zero() {
            return Err(ConfigError::NonPositiveLifetime);
        }
        if self.refresh_ttl <= self.access_ttl {
            return Err(ConfigError::LifetimeOrder {
                access_secs: self.access_ttl.as_secs(),
                refresh_secs: self.refresh_ttl.as_secs(),
            });
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                var: JWT_ISSUER_ENV,
                value: self.issuer.clone(),
            });
        }
        for (var, secret) in [
            (JWT_ACCESS_SECRET_ENV, &self.access_secret),
            (JWT_REFRESH_SECRET_ENV, &self.refresh_secret),
        ] {
            if secret.len() < RECOMMENDED_SECRET_LEN {
                tracing::warn!(
                    var,
                    min_len = RECOMMENDED_SECRET_LEN,
                    "JWT secret is shorter than recommended"
                );
            }
        }
        Ok(())
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let access_secret = lookup(JWT_ACCESS_SECRET_ENV)
            .or_else(|| lookup(JWT_SECRET_ENV))
            .ok_or(ConfigError::Missing(JWT_ACCESS_SECRET_ENV))?;
        // No fallback to the access secret: a shared secret would let a leaked
        // access key mint refresh tokens.
        let refresh_secret =
            lookup(JWT_REFRESH_SECRET_ENV).ok_or(ConfigError::Missing(JWT_REFRESH_SECRET_ENV))?;

        let issuer = lookup(JWT_ISSUER_ENV)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ISSUER.to_string());

        let access_hours =
            parse_hours(lookup, JWT_ACCESS_EXPIRE_HOURS_ENV, DEFAULT_ACCESS_EXPIRE_HOURS)?;
        let refresh_hours =
            parse_hours(lookup, JWT_REFRESH_EXPIRE_HOURS_ENV, DEFAULT_REFRESH_EXPIRE_HOURS)?;

        let leeway_secs = match lookup(JWT_LEEWAY_SECONDS_ENV) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                var: JWT_LEEWAY_SECONDS_ENV,
                value: raw,
            })?,
            None => 0,
        };

        let settings = TokenSettings::new(access_secret, refresh_secret)
            .with_issuer(issuer)
            .with_lifetimes(hours(access_hours), hours(refresh_hours))
            .with_leeway(Duration::from_secs(leeway_secs));
        settings.validate()?;
        Ok(settings)
    }
}

/// Lifetimes in hours: unset, unparsable or non-positive values fall back to
/// the default. Values above [`MAX_EXPIRE_HOURS`] are rejected.
fn parse_hours(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(h) if h > 0 => {
            let h = h.unsigned_abs();
            if h > MAX_EXPIRE_HOURS {
                return Err(ConfigError::InvalidValue { var, value: raw });
            }
            Ok(h)
        }
        _ => {
            tracing::warn!(var, value = %raw, default, "ignoring invalid token lifetime");
            Ok(default)
        }
    }
}

fn hours(h: u64) -> Duration {
    Duration::from_secs(h.saturating_mul(3600))
}

// =============================================================================
// OAuth Settings
// =============================================================================

/// Client credentials for one OAuth provider.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_url", &self.redirect_url)
            .finish()
    }
}

/// OAuth provider configuration and linking policy.
#[derive(Clone, Default)]
pub struct OAuthSettings {
    pub github: Option<ProviderCredentials>,
    pub google: Option<ProviderCredentials>,
    /// Key for the HMAC over the `state` parameter.
    pub state_secret: Option<String>,
    /// Attach a first-time OAuth identity to an existing user whose username
    /// matches the derived one. This trusts the provider's display name.
    pub link_by_username: bool,
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("github", &self.github)
            .field("google", &self.google)
            .field("state_secret", &self.state_secret.as_ref().map(|_| "<redacted>"))
            .field("link_by_username", &self.link_by_username)
            .finish()
    }
}

impl OAuthSettings {
    /// Credentials for a provider, if configured.
    pub fn credentials(&self, provider: Provider) -> Option<&ProviderCredentials> {
        match provider {
            Provider::GitHub => self.github.as_ref(),
            Provider::Google => self.google.as_ref(),
        }
    }

    /// Whether any provider is configured.
    pub fn any_provider(&self) -> bool {
        self.github.is_some() || self.google.is_some()
    }

    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let credentials = |key: &str, secret: &str, callback: &str| {
            Some(ProviderCredentials {
                client_id: lookup(key).filter(|s| !s.is_empty())?,
                client_secret: lookup(secret).filter(|s| !s.is_empty())?,
                redirect_url: lookup(callback).filter(|s| !s.is_empty())?,
            })
        };

        let link_by_username = match lookup(OAUTH_LINK_BY_USERNAME_ENV) {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidValue {
                var: OAUTH_LINK_BY_USERNAME_ENV,
                value: raw,
            })?,
            None => true,
        };

        let settings = OAuthSettings {
            github: credentials(GITHUB_KEY_ENV, GITHUB_SECRET_ENV, GITHUB_CALLBACK_ENV),
            google: credentials(GOOGLE_KEY_ENV, GOOGLE_SECRET_ENV, GOOGLE_CALLBACK_ENV),
            state_secret: lookup(SESSION_SECRET_ENV).filter(|s| !s.is_empty()),
            link_by_username,
        };

        if settings.any_provider() && settings.state_secret.is_none() {
            return Err(ConfigError::MissingSessionSecret);
        }
        Ok(settings)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// Application Config
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT` on its own, so logging can be set up before the
    /// rest of the configuration is loaded.
    pub fn from_env() -> Self {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        match lookup(LOG_FORMAT_ENV).as_deref().map(str::trim) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Everything the server needs at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub tokens: TokenSettings,
    pub oauth: OAuthSettings,
    pub revocation_capacity: usize,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary name → value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup(PORT_ENV) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                var: PORT_ENV,
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let revocation_capacity = match lookup(REVOCATION_CAPACITY_ENV) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: REVOCATION_CAPACITY_ENV,
                        value: raw,
                    })
                }
            },
            None => DEFAULT_REVOCATION_CAPACITY,
        };

        let log_format = LogFormat::from_lookup(&lookup);

        Ok(Self {
            host: lookup(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            database_path: lookup(DATABASE_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            tokens: TokenSettings::from_lookup(&lookup)?,
            oauth: OAuthSettings::from_lookup(&lookup)?,
            revocation_capacity,
            log_format,
        })
    }

    /// `host:port` for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const ACCESS: &str = "access-secret-access-secret-0123456789";
    const REFRESH: &str = "refresh-secret-refresh-secret-012345678";

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(move |name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[
            (JWT_ACCESS_SECRET_ENV, ACCESS),
            (JWT_REFRESH_SECRET_ENV, REFRESH),
        ])
        .unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.tokens.issuer, "ctflab");
        assert_eq!(config.tokens.access_ttl, Duration::from_secs(3600));
        assert_eq!(config.tokens.refresh_ttl, Duration::from_secs(168 * 3600));
        assert_eq!(config.tokens.leeway, Duration::ZERO);
        assert!(config.oauth.link_by_username);
        assert!(!config.oauth.any_provider());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn refresh_secret_is_required() {
        let err = load(&[(JWT_ACCESS_SECRET_ENV, ACCESS)]).unwrap_err();
        assert_eq!(err, ConfigError::Missing(JWT_REFRESH_SECRET_ENV));
    }

    #[test]
    fn shared_secret_is_rejected() {
        let err = load(&[
            (JWT_ACCESS_SECRET_ENV, ACCESS),
            (JWT_REFRESH_SECRET_ENV, ACCESS),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::SharedSecret);
    }

    #[test]
    fn legacy_secret_name_is_honored() {
        let config = load(&[(JWT_SECRET_ENV, ACCESS), (JWT_REFRESH_SECRET_ENV, REFRESH)]).unwrap();
        assert_eq!(config.tokens.access_secret, ACCESS);
    }

    #[test]
    fn invalid_hours_fall_back_to_defaults() {
        let config = load(&[
            (JWT_ACCESS_SECRET_ENV, ACCESS),
            (JWT_REFRESH_SECRET_ENV, REFRESH),
            (JWT_ACCESS_EXPIRE_HOURS_ENV, "-3"),
            (JWT_REFRESH_EXPIRE_HOURS_ENV, "soon"),
        ])
        .unwrap();
        assert_eq!(config.tokens.access_ttl, Duration::from_secs(3600));
        assert_eq!(config.tokens.refresh_ttl, Duration::from_secs(168 * 3600));
    }

    #[test]
    fn absurd_hours_are_rejected() {
        let err = load(&[
            (JWT_ACCESS_SECRET_ENV, ACCESS),
            (JWT_REFRESH_SECRET_ENV, REFRESH),
            (JWT_REFRESH_EXPIRE_HOURS_ENV, "9223372036854775807"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                var: JWT_REFRESH_EXPIRE_HOURS_ENV,
                value: "9223372036854775807".to_string(),
            }
        );

        let config = load(&[
            (JWT_ACCESS_SECRET_ENV, ACCESS),
            (JWT_REFRESH_SECRET_ENV, REFRESH),
            (JWT_REFRESH_EXPIRE_HOURS_ENV, "87600"),
        ])
        .unwrap();
        assert_eq!(config.tokens.refresh_ttl, Duration::from_secs(87_600 * 3600));
    }

    #[test]
    fn log_format_reads_independently() {
        let lookup = |name: &str| (name == LOG_FORMAT_ENV).then(|| " json ".to_string());
        assert_eq!(LogFormat::from_lookup(&lookup), LogFormat::Json);
        assert_eq!(LogFormat::from_lookup(&|_: &str| None), LogFormat::Pretty);

        // Secrets are not needed to decide the log format.
        assert!(load(&[(LOG_FORMAT_ENV, "json")]).is_err());
    }

    #[test]
    fn refresh_must_outlive_access() {
        let err = load(&[
            (JWT_ACCESS_SECRET_ENV, ACCESS),
            (JWT_REFRESH_SECRET_ENV, REFRESH),
            (JWT_ACCESS_EXPIRE_HOURS_ENV, "48"),
            (JWT_REFRESH_EXPIRE_HOURS_ENV, "24"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::LifetimeOrder {
                access_secs: 48 * 3600,
                refresh_secs: 24 * 3600
            }
        );
    }

    #[test]
    fn provider_requires_session_secret() {
        let base = [
            (JWT_ACCESS_SECRET_ENV, ACCESS),
            (JWT_REFRESH_SECRET_ENV, REFRESH),
            (GITHUB_KEY_ENV, "id"),
            (GITHUB_SECRET_ENV, "secret"),
            (GITHUB_CALLBACK_ENV, "http://localhost:8080/v1/auth/oauth/github/callback"),
        ];
        assert_eq!(load(&base).unwrap_err(), ConfigError::MissingSessionSecret);

        let mut with_secret = base.to_vec();
        with_secret.push((SESSION_SECRET_ENV, "state-key"));
        let config = load(&with_secret).unwrap();
        assert!(config.oauth.credentials(Provider::GitHub).is_some());
        assert!(config.oauth.credentials(Provider::Google).is_none());
    }

    #[test]
    fn link_policy_parses_booleans() {
        let config = load(&[
            (JWT_ACCESS_SECRET_ENV, ACCESS),
            (JWT_REFRESH_SECRET_ENV, REFRESH),
            (OAUTH_LINK_BY_USERNAME_ENV, "false"),
        ])
        .unwrap();
        assert!(!config.oauth.link_by_username);

        let err = load(&[
            (JWT_ACCESS_SECRET_ENV, ACCESS),
            (JWT_REFRESH_SECRET_ENV, REFRESH),
            (OAUTH_LINK_BY_USERNAME_ENV, "maybe"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn debug_redacts_secrets() {
        let settings = TokenSettings::new(ACCESS, REFRESH);
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains(ACCESS));
        assert!(!rendered.contains(REFRESH));
    }
}
