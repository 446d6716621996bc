// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider HTTP client: authorization URLs, code exchange, profile fetch.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{header::ACCEPT, header::USER_AGENT, Client};
use serde::Deserialize;
use url::Url;

use super::{OAuthError, Provider};
use crate::config::{OAuthSettings, ProviderCredentials};
use crate::identity::ProviderIdentity;
use crate::models::ProviderTokens;

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";
const GITHUB_SCOPES: &str = "read:user user:email";

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GOOGLE_SCOPES: &str = "openid email profile";

/// GitHub's API rejects requests without one.
const CLIENT_USER_AGENT: &str = concat!("ctflab-server/", env!("CARGO_PKG_VERSION"));

/// Talks to identity providers on behalf of the OAuth handlers.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// URL to redirect the browser to.
    fn authorize_url(&self, provider: Provider, state: &str) -> Result<String, OAuthError>;

    /// Exchange an authorization code and fetch the user's profile.
    async fn complete(&self, provider: Provider, code: &str)
        -> Result<ProviderIdentity, OAuthError>;
}

/// reqwest-backed [`ProviderClient`] for GitHub and Google.
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    http: Client,
    settings: OAuthSettings,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// GitHub reports failures with 200 and an `error` field.
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct GoogleUser {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
}

impl HttpProviderClient {
    pub fn new(settings: OAuthSettings) -> Self {
        Self {
            http: Client::new(),
            settings,
        }
    }

    fn credentials(&self, provider: Provider) -> Result<&ProviderCredentials, OAuthError> {
        self.settings
            .credentials(provider)
            .ok_or(OAuthError::NotConfigured(provider))
    }

    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<ProviderTokens, OAuthError> {
        let creds = self.credentials(provider)?;
        let token_url = match provider {
            Provider::GitHub => GITHUB_TOKEN_URL,
            Provider::Google => GOOGLE_TOKEN_URL,
        };
        let params = [
            ("code", code),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("redirect_uri", creds.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(token_url)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| OAuthError::TokenExchange(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(%provider, %status, "token exchange rejected");
            return Err(OAuthError::TokenExchange(format!("status {status}")));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::TokenExchange(e.to_string()))?;

        if let Some(error) = body.error {
            tracing::error!(%provider, error = %error, "token exchange returned an error");
            return Err(OAuthError::TokenExchange(error));
        }

        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| OAuthError::TokenExchange("no access token in response".to_string()))?;

        Ok(ProviderTokens {
            access_token,
            refresh_token: body.refresh_token.filter(|t| !t.is_empty()),
            expires_at: body
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, OAuthError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| OAuthError::Profile(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OAuthError::Profile(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::Profile(e.to_string()))
    }

    async fn github_identity(&self, tokens: ProviderTokens) -> Result<ProviderIdentity, OAuthError> {
        let user: GitHubUser = self.get_json(GITHUB_USER_URL, &tokens.access_token).await?;

        // Private addresses are omitted from /user.
        let email = match user.email.filter(|e| !e.is_empty()) {
            Some(email) => email,
            None => {
                let emails: Vec<GitHubEmail> =
                    self.get_json(GITHUB_EMAILS_URL, &tokens.access_token).await?;
                pick_github_email(emails).unwrap_or_default()
            }
        };

        Ok(ProviderIdentity {
            provider: Provider::GitHub,
            provider_user_id: user.id.to_string(),
            email,
            name: user.name,
            nickname: Some(user.login),
            tokens,
        })
    }

    async fn google_identity(&self, tokens: ProviderTokens) -> Result<ProviderIdentity, OAuthError> {
        let user: GoogleUser = self
            .get_json(GOOGLE_USERINFO_URL, &tokens.access_token)
            .await?;

        Ok(ProviderIdentity {
            provider: Provider::Google,
            provider_user_id: user.sub,
            email: user.email.unwrap_or_default(),
            name: user.name,
            nickname: user.given_name,
            tokens,
        })
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    fn authorize_url(&self, provider: Provider, state: &str) -> Result<String, OAuthError> {
        let creds = self.credentials(provider)?;
        let url = match provider {
            Provider::GitHub => Url::parse_with_params(
                GITHUB_AUTHORIZE_URL,
                &[
                    ("client_id", creds.client_id.as_str()),
                    ("redirect_uri", creds.redirect_url.as_str()),
                    ("scope", GITHUB_SCOPES),
                    ("state", state),
                ],
            )?,
            Provider::Google => Url::parse_with_params(
                GOOGLE_AUTHORIZE_URL,
                &[
                    ("client_id", creds.client_id.as_str()),
                    ("redirect_uri", creds.redirect_url.as_str()),
                    ("response_type", "code"),
                    ("scope", GOOGLE_SCOPES),
                    ("access_type", "offline"),
                    ("state", state),
                ],
            )?,
        };
        Ok(url.into())
    }

    async fn complete(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<ProviderIdentity, OAuthError> {
        let tokens = self.exchange_code(provider, code).await?;
        match provider {
            Provider::GitHub => self.github_identity(tokens).await,
            Provider::Google => self.google_identity(tokens).await,
        }
    }
}

/// Primary verified address, else any verified one.
fn pick_github_email(emails: Vec<GitHubEmail>) -> Option<String> {
    let mut verified = emails.into_iter().filter(|e| e.verified);
    let first = verified.next()?;
    if first.primary {
        return Some(first.email);
    }
    Some(
        verified
            .find(|e| e.primary)
            .map(|e| e.email)
            .unwrap_or(first.email),
    )
}
