//! Authenticated Docker v2 registry client.
//!
//! Every operation follows the same two-phase flow: an unauthenticated GET,
//! and on `401 Unauthorized` a token exchange followed by exactly one
//! authenticated retry. Blob fetches additionally follow a single
//! `307 Temporary Redirect` to the blob-storage backend; the redirect
//! target gets the same headers but never a fresh auth dance, because
//! blob-storage URLs carry their own signed query parameters.

use std::collections::HashMap;
use std::path::Path;

use futures::StreamExt;
use reqwest::{header, StatusCode};
use tokio::io::AsyncWriteExt;

use dockyard_core::error::{DockError, Result};

use crate::manifest::{self, DockerImageManifest};
use crate::reference::ImageName;

use super::token::{Token, TokenManager};

/// A parsed `WWW-Authenticate: Bearer` challenge.
#[derive(Debug)]
struct AuthChallenge {
    realm: Option<String>,
    service: String,
    scope: String,
}

/// Client for the registry v2 HTTP API.
pub struct RegistryClient {
    registry_url: String,
    token_manager: TokenManager,
    account: Option<String>,
    client: reqwest::Client,
}

impl RegistryClient {
    /// Create a client against `registry_url`, acquiring tokens from
    /// `auth_url` when challenged.
    ///
    /// HTTP-level redirect following is disabled; the single-follow rule
    /// for blob redirects is enforced here.
    pub fn new(
        registry_url: impl Into<String>,
        auth_url: impl Into<String>,
        account: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DockError::RegistryRequest(format!("failed to build client: {}", e)))?;

        Ok(Self {
            registry_url: registry_url.into().trim_end_matches('/').to_string(),
            token_manager: TokenManager::new(auth_url),
            account,
            client,
        })
    }

    /// Fetch and validate the manifest for `name`.
    ///
    /// The manifest is returned in wire order: `history[0]` is the top
    /// layer.
    pub async fn get_manifest(&self, name: &ImageName) -> Result<DockerImageManifest> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.registry_url, name.repository, name.tag
        );

        tracing::debug!(image = %name, url = %url, "Fetching manifest");

        let response = self.get_with_auth(&url).await?;
        let body = response.text().await.map_err(|e| {
            DockError::RegistryRequest(format!("failed to read manifest body: {}", e))
        })?;

        manifest::parse(&body)
    }

    /// Fetch the blob `digest` for `name`, streaming it to `destination`.
    ///
    /// Returns the number of bytes written. The destination file (and its
    /// parent directories) are created; an existing file is truncated.
    pub async fn get_blob(
        &self,
        name: &ImageName,
        digest: &str,
        destination: &Path,
    ) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DockError::StoreIo(format!(
                    "failed to create blob directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let url = format!(
            "{}/v2/{}/blobs/{}",
            self.registry_url, name.repository, digest
        );

        tracing::debug!(image = %name, digest = %digest, "Fetching blob");

        let response = self.get_with_auth(&url).await?;

        let mut file = tokio::fs::File::create(destination).await.map_err(|e| {
            DockError::StoreIo(format!(
                "failed to create blob file {}: {}",
                destination.display(),
                e
            ))
        })?;

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                DockError::RegistryRequest(format!("blob stream interrupted: {}", e))
            })?;
            file.write_all(&chunk).await.map_err(|e| {
                DockError::StoreIo(format!(
                    "failed to write blob file {}: {}",
                    destination.display(),
                    e
                ))
            })?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| {
            DockError::StoreIo(format!(
                "failed to flush blob file {}: {}",
                destination.display(),
                e
            ))
        })?;

        tracing::debug!(digest = %digest, bytes = written, "Blob written");

        Ok(written)
    }

    /// Issue a GET, resolving a `401` challenge once and a `307` redirect
    /// once.
    async fn get_with_auth(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.send(self.client.get(url)).await?;

        match response.status() {
            StatusCode::OK => Ok(response),
            StatusCode::UNAUTHORIZED => {
                let challenge = parse_challenge(&response)?;
                if let Some(ref realm) = challenge.realm {
                    tracing::debug!(realm = %realm, "Registry advertised auth realm");
                }

                let token = self
                    .token_manager
                    .get_token(
                        &challenge.service,
                        &challenge.scope,
                        self.account.as_deref(),
                    )
                    .await?;

                if !token.is_valid() {
                    return Err(DockError::TokenInvalid(
                        "token from auth server is expired or not yet valid".to_string(),
                    ));
                }

                let retried = self
                    .send(self.client.get(url).bearer_auth(token.raw()))
                    .await?;

                match retried.status() {
                    StatusCode::OK => Ok(retried),
                    StatusCode::TEMPORARY_REDIRECT => {
                        self.follow_redirect(retried, Some(&token)).await
                    }
                    // A second 401 lands here too; retrying again cannot
                    // make progress.
                    _ => Err(Self::response_error(retried).await),
                }
            }
            StatusCode::TEMPORARY_REDIRECT => self.follow_redirect(response, None).await,
            _ => Err(Self::response_error(response).await),
        }
    }

    /// Follow one redirect to the blob-storage backend. Only `200 OK` is
    /// accepted from the target.
    async fn follow_redirect(
        &self,
        response: reqwest::Response,
        token: Option<&Token>,
    ) -> Result<reqwest::Response> {
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                DockError::RegistryRequest(
                    "redirect response without a Location header".to_string(),
                )
            })?
            .to_string();

        tracing::debug!(location = %location, "Following blob redirect");

        let mut request = self.client.get(&location);
        if let Some(token) = token {
            request = request.bearer_auth(token.raw());
        }

        let redirected = self.send(request).await?;
        if redirected.status() == StatusCode::OK {
            Ok(redirected)
        } else {
            Err(Self::response_error(redirected).await)
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| DockError::RegistryRequest(format!("request failed: {}", e)))
    }

    /// Turn a non-success response into an error, preferring the messages
    /// in a registry `errors` body over the bare status line.
    async fn response_error(response: reqwest::Response) -> DockError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match extract_error_messages(&body) {
            Some(messages) => DockError::RegistryResponse(format!(
                "{} [{}]",
                status,
                messages.join(", ")
            )),
            None => DockError::RegistryRequest(format!("unexpected response: {}", status)),
        }
    }
}

/// Parse the `WWW-Authenticate` header of a `401` response.
///
/// Attributes are collected generically; `service` and `scope` are
/// required, `realm` is recorded when present.
fn parse_challenge(response: &reqwest::Response) -> Result<AuthChallenge> {
    let header_value = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            DockError::AuthChallenge("no WWW-Authenticate header in 401 response".to_string())
        })?;

    let (scheme, params) = header_value.split_once(' ').ok_or_else(|| {
        DockError::AuthChallenge(format!("invalid challenge header '{}'", header_value))
    })?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(DockError::AuthChallenge(format!(
            "unsupported challenge scheme '{}'",
            scheme
        )));
    }

    let mut attributes = HashMap::new();
    for param in params.split(',') {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        let (key, value) = param.split_once('=').ok_or_else(|| {
            DockError::AuthChallenge(format!("malformed challenge attribute '{}'", param))
        })?;
        attributes.insert(
            key.trim().to_string(),
            value.trim().trim_matches('"').to_string(),
        );
    }

    let service = attributes.get("service").cloned().ok_or_else(|| {
        DockError::AuthChallenge("challenge lacks a 'service' attribute".to_string())
    })?;

    let scope = attributes.get("scope").cloned().ok_or_else(|| {
        DockError::AuthChallenge("challenge lacks a 'scope' attribute".to_string())
    })?;

    Ok(AuthChallenge {
        realm: attributes.get("realm").cloned(),
        service,
        scope,
    })
}

fn extract_error_messages(body: &str) -> Option<Vec<String>> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let errors = json.get("errors")?.as_array()?;

    let messages: Vec<String> = errors
        .iter()
        .filter_map(|e| e.get("message").and_then(|m| m.as_str()).map(String::from))
        .collect();

    if messages.is_empty() {
        None
    } else {
        Some(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_messages() {
        let body = r#"{"errors": [{"message": "Error1"}, {"message": "Error2"}]}"#;
        let messages = extract_error_messages(body).unwrap();
        assert_eq!(messages, vec!["Error1", "Error2"]);
    }

    #[test]
    fn test_extract_error_messages_ignores_non_objects() {
        let body = r#"{"errors": ["oops", {"message": "Error1"}]}"#;
        let messages = extract_error_messages(body).unwrap();
        assert_eq!(messages, vec!["Error1"]);
    }

    #[test]
    fn test_extract_error_messages_absent() {
        assert!(extract_error_messages("not json").is_none());
        assert!(extract_error_messages(r#"{"detail": "nope"}"#).is_none());
        assert!(extract_error_messages(r#"{"errors": []}"#).is_none());
    }

    #[test]
    fn test_registry_url_trailing_slash_trimmed() {
        let client =
            RegistryClient::new("https://registry.example.com/", "https://auth", None).unwrap();
        assert_eq!(client.registry_url, "https://registry.example.com");
    }
}
