//! Bearer token parsing and acquisition.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use dockyard_core::error::{DockError, Result};

/// Claims carried in a bearer token.
///
/// Only the time-based claims are interpreted; the rest are carried for
/// diagnostics.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Claims {
    /// Expiration time, seconds since the epoch
    pub exp: Option<f64>,
    /// Not-before time, seconds since the epoch
    pub nbf: Option<f64>,
    /// Issued-at time, seconds since the epoch
    pub iat: Option<f64>,
    pub iss: Option<String>,
    pub aud: Option<String>,
    pub sub: Option<String>,
    pub jti: Option<String>,
    /// Registry access grants; not interpreted here
    pub access: Option<serde_json::Value>,
}

/// A parsed bearer token.
///
/// Construction validates structure only: three `.`-separated base64
/// segments whose header and claims decode to JSON. Time validity is a
/// separate query (`is_valid`), so an expired token is distinguishable from
/// a garbled one.
#[derive(Debug, Clone)]
pub struct Token {
    raw: String,
    header: serde_json::Value,
    claims: Claims,
}

impl Token {
    /// Parse a raw token string.
    pub fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() != 3 {
            return Err(DockError::TokenMalformed(format!(
                "expected three dot-separated segments, found {}",
                segments.len()
            )));
        }

        let header_bytes = decode_segment(segments[0], "header")?;
        let claims_bytes = decode_segment(segments[1], "claims")?;
        // The signature is opaque; it only has to be valid base64.
        decode_segment(segments[2], "signature")?;

        let header: serde_json::Value = serde_json::from_slice(&header_bytes)
            .map_err(|e| DockError::TokenMalformed(format!("header is not JSON: {}", e)))?;

        let claims: Claims = serde_json::from_slice(&claims_bytes)
            .map_err(|e| DockError::TokenMalformed(format!("claims are not JSON: {}", e)))?;

        Ok(Token {
            raw: raw.to_string(),
            header,
            claims,
        })
    }

    /// The raw string presented in `Authorization: Bearer` headers.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The decoded JOSE header.
    pub fn header(&self) -> &serde_json::Value {
        &self.header
    }

    /// The decoded claims.
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Whether the token is usable right now.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Whether the token is usable at `now`.
    ///
    /// A token without `exp` never expires. `nbf` in the future makes an
    /// otherwise well-formed token unusable.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let now_secs = now.timestamp() as f64;

        if let Some(exp) = self.claims.exp {
            if now_secs >= exp {
                return false;
            }
        }

        if let Some(nbf) = self.claims.nbf {
            if now_secs < nbf {
                return false;
            }
        }

        true
    }
}

/// Decode one token segment. Tokens in the wild are base64url without
/// padding, but padded standard encoding is accepted as well.
fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| STANDARD.decode(segment))
        .map_err(|e| DockError::TokenMalformed(format!("{} is not valid base64: {}", what, e)))
}

/// Fetches bearer tokens from a configured token endpoint.
pub struct TokenManager {
    auth_url: String,
    client: reqwest::Client,
}

impl TokenManager {
    /// Create a token manager for the given token endpoint.
    pub fn new(auth_url: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Request a token for `service`/`scope`, optionally on behalf of
    /// `account`.
    ///
    /// The returned token is structurally validated but may still be
    /// expired or not yet valid; callers check `Token::is_valid`.
    pub async fn get_token(
        &self,
        service: &str,
        scope: &str,
        account: Option<&str>,
    ) -> Result<Token> {
        let mut query: Vec<(&str, &str)> = vec![("service", service), ("scope", scope)];
        if let Some(account) = account {
            query.push(("account", account));
        }

        tracing::debug!(
            auth_url = %self.auth_url,
            service = %service,
            scope = %scope,
            "Requesting bearer token"
        );

        let response = self
            .client
            .get(&self.auth_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                DockError::TokenRequest(format!(
                    "failed to reach auth server {}: {}",
                    self.auth_url, e
                ))
            })?;

        if !response.status().is_success() {
            return Err(DockError::TokenRequest(format!(
                "auth server returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            DockError::TokenMalformed(format!("token response is not JSON: {}", e))
        })?;

        let raw = body
            .get("token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                DockError::TokenMalformed("token response lacks a 'token' field".to_string())
            })?;

        Token::parse(raw)
    }
}
