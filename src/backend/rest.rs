//! HTTP client for the hosted backend.
//!
//! Speaks three surfaces of the same service: password-grant auth
//! (`/auth/v1`), the relational row API (`/rest/v1`, PostgREST
//! conventions: `?col=eq.val&order=col.desc`), and object storage
//! (`/storage/v1`). Realtime events ride a separate websocket owned by
//! [`RealtimeFeed`], spawned lazily on the first subscription.
//!
//! The current user is decoded from the access token's payload rather
//! than fetched, so writes can be stamped with `user_id` without an
//! extra round trip.

use std::sync::{OnceLock, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::realtime::{RealtimeFeed, TableChange};
use super::{filter_literal, Backend, BackendError, SelectQuery};
use crate::config::BackendConfig;
use crate::models::AuthUser;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// An authenticated session: the bearer token plus the user decoded
/// from it.
#[derive(Debug, Clone)]
struct Session {
    access_token: String,
    user: AuthUser,
}

/// Client over the hosted backend's REST surfaces.
pub struct RestBackend {
    config: BackendConfig,
    client: reqwest::Client,
    session: RwLock<Option<Session>>,
    feed: OnceLock<RealtimeFeed>,
}

impl RestBackend {
    pub fn new(config: BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            client,
            session: RwLock::new(None),
            feed: OnceLock::new(),
        }
    }

    /// Build an already-signed-in client from a stored access token.
    pub fn with_access_token(
        config: BackendConfig,
        access_token: &str,
    ) -> Result<Self, BackendError> {
        let backend = Self::new(config);
        let user = user_from_jwt(access_token)?;
        backend.store_session(Session {
            access_token: access_token.to_string(),
            user,
        });
        Ok(backend)
    }

    /// Exchange email + password for a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.config.base_url);
        let body = PasswordGrant { email, password };

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;
        let body = self.read_success(&url, response).await?;

        let token: TokenResponse = serde_json::from_str(&body)?;
        let user = user_from_jwt(&token.access_token)?;
        tracing::info!(user_id = %user.id, "Signed in");
        self.store_session(Session {
            access_token: token.access_token,
            user: user.clone(),
        });
        Ok(user)
    }

    /// Drop the session. Later calls fail with `NotAuthenticated`.
    pub fn sign_out(&self) {
        let mut session = self.session.write().unwrap_or_else(|p| p.into_inner());
        *session = None;
    }

    fn store_session(&self, new: Session) {
        let mut session = self.session.write().unwrap_or_else(|p| p.into_inner());
        *session = Some(new);
    }

    fn current_session(&self) -> Result<Session, BackendError> {
        let session = self.session.read().unwrap_or_else(|p| p.into_inner());
        session.clone().ok_or(BackendError::NotAuthenticated)
    }

    /// Attach the api key and the session's bearer token.
    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder, BackendError> {
        let session = self.current_session()?;
        Ok(builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(session.access_token))
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.config.base_url)
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> BackendError {
        let reason = if e.is_connect() {
            "connection refused".to_string()
        } else if e.is_timeout() {
            format!("request timed out after {REQUEST_TIMEOUT_SECS}s")
        } else {
            e.to_string()
        };
        BackendError::Connection {
            url: url.to_string(),
            reason,
        }
    }

    /// Fail on non-2xx with the response body in the error; otherwise
    /// hand the body text back for decoding.
    async fn read_success(
        &self,
        url: &str,
        response: reqwest::Response,
    ) -> Result<String, BackendError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(url, e))?;
        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

// ── Wire bodies ──

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize)]
struct SignRequest {
    #[serde(rename = "expiresIn")]
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// Claims carried in the access token payload.
///
/// The token is treated as data, not verified: the backend rejects a
/// forged one on the next request anyway.
#[derive(Deserialize)]
struct Claims {
    sub: Uuid,
    #[serde(default)]
    email: Option<String>,
}

fn user_from_jwt(token: &str) -> Result<AuthUser, BackendError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(BackendError::InvalidToken {
            reason: "expected three dot-separated segments".to_string(),
        });
    };

    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| BackendError::InvalidToken {
            reason: format!("payload is not base64url: {e}"),
        })?;
    let claims: Claims =
        serde_json::from_slice(&decoded).map_err(|e| BackendError::InvalidToken {
            reason: format!("payload is not a claims object: {e}"),
        })?;

    Ok(AuthUser {
        id: claims.sub,
        email: claims.email,
    })
}

/// Row-endpoint query string: `select=*`, one `eq.` pair per filter,
/// then the ordering.
fn select_params(query: &SelectQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    for (column, value) in query.filters() {
        params.push((column.clone(), format!("eq.{}", filter_literal(value))));
    }
    if let Some((column, order)) = query.order() {
        params.push(("order".to_string(), format!("{column}.{}", order.as_str())));
    }
    params
}

/// Signed URLs come back relative to the storage root.
fn absolute_storage_url(base_url: &str, signed: &str) -> String {
    if signed.starts_with("http://") || signed.starts_with("https://") {
        return signed.to_string();
    }
    let separator = if signed.starts_with('/') { "" } else { "/" };
    format!("{base_url}/storage/v1{separator}{signed}")
}

#[async_trait]
impl Backend for RestBackend {
    async fn current_user(&self) -> Result<AuthUser, BackendError> {
        Ok(self.current_session()?.user)
    }

    async fn insert_row(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        let url = self.rest_url(table);
        let response = self
            .authed(self.client.post(&url))?
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;
        let body = self.read_success(&url, response).await?;

        let rows: Vec<Value> = serde_json::from_str(&body)?;
        rows.into_iter().next().ok_or_else(|| BackendError::NoRows {
            operation: "insert".to_string(),
            table: table.to_string(),
        })
    }

    async fn update_row(&self, table: &str, id: Uuid, patch: Value) -> Result<Value, BackendError> {
        let url = self.rest_url(table);
        let response = self
            .authed(self.client.patch(&url))?
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;
        let body = self.read_success(&url, response).await?;

        let rows: Vec<Value> = serde_json::from_str(&body)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::RowNotFound {
                table: table.to_string(),
                id,
            })
    }

    async fn delete_row(&self, table: &str, id: Uuid) -> Result<(), BackendError> {
        let url = self.rest_url(table);
        let response = self
            .authed(self.client.delete(&url))?
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;
        // Matching zero rows is still a 2xx; absent rows are fine
        self.read_success(&url, response).await?;
        Ok(())
    }

    async fn select_rows(
        &self,
        table: &str,
        query: SelectQuery,
    ) -> Result<Vec<Value>, BackendError> {
        let url = self.rest_url(table);
        let response = self
            .authed(self.client.get(&url))?
            .query(&select_params(&query))
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;
        let body = self.read_success(&url, response).await?;

        Ok(serde_json::from_str(&body)?)
    }

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let url = format!("{}/storage/v1/object/{bucket}/{path}", self.config.base_url);
        let response = self
            .authed(self.client.post(&url))?
            .header(CONTENT_TYPE, content_type)
            // Re-uploading the same path replaces the object
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;
        self.read_success(&url, response).await?;
        Ok(())
    }

    async fn signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in_secs: u64,
    ) -> Result<String, BackendError> {
        let url = format!(
            "{}/storage/v1/object/sign/{bucket}/{path}",
            self.config.base_url
        );
        let response = self
            .authed(self.client.post(&url))?
            .json(&SignRequest {
                expires_in: expires_in_secs,
            })
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;
        let body = self.read_success(&url, response).await?;

        let signed: SignedUrlResponse = serde_json::from_str(&body)?;
        Ok(absolute_storage_url(&self.config.base_url, &signed.signed_url))
    }

    fn subscribe(&self, table: &str) -> broadcast::Receiver<TableChange> {
        self.feed
            .get_or_init(|| RealtimeFeed::spawn(self.config.realtime_url()))
            .subscribe(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_payload(payload: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload);
        format!("{header}.{payload}.signature")
    }

    fn test_config() -> BackendConfig {
        BackendConfig::new("https://example.supabase.co", "anon-key")
    }

    #[test]
    fn decodes_user_from_token_payload() {
        let id = Uuid::new_v4();
        let token = token_with_payload(&format!(
            r#"{{"sub":"{id}","email":"marie@example.fr","role":"authenticated"}}"#
        ));

        let user = user_from_jwt(&token).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email.as_deref(), Some("marie@example.fr"));
    }

    #[test]
    fn token_without_email_still_decodes() {
        let id = Uuid::new_v4();
        let token = token_with_payload(&format!(r#"{{"sub":"{id}"}}"#));
        let user = user_from_jwt(&token).unwrap();
        assert_eq!(user.email, None);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in [
            "not-a-token",
            "one.two",
            "one.two.three.four",
            "a.!!!!.c",
            &token_with_payload(r#"{"email":"no-subject@example.fr"}"#),
        ] {
            let err = user_from_jwt(token).unwrap_err();
            assert!(matches!(err, BackendError::InvalidToken { .. }), "{token}");
        }
    }

    #[test]
    fn select_params_follow_rest_conventions() {
        let query = SelectQuery::new()
            .eq("user_id", "11111111-2222-3333-4444-555555555555")
            .eq("exam_type", "biology")
            .order_desc("exam_date");

        let params = select_params(&query);
        assert_eq!(params[0], ("select".to_string(), "*".to_string()));
        assert_eq!(
            params[1],
            (
                "user_id".to_string(),
                "eq.11111111-2222-3333-4444-555555555555".to_string()
            )
        );
        assert_eq!(params[2], ("exam_type".to_string(), "eq.biology".to_string()));
        assert_eq!(
            params[3],
            ("order".to_string(), "exam_date.desc".to_string())
        );
    }

    #[test]
    fn unfiltered_query_still_selects_all_columns() {
        let params = select_params(&SelectQuery::new());
        assert_eq!(params, vec![("select".to_string(), "*".to_string())]);
    }

    #[test]
    fn signed_urls_are_anchored_at_the_storage_root() {
        let base = "https://example.supabase.co";
        assert_eq!(
            absolute_storage_url(base, "/object/sign/exam-files/a.pdf?token=t"),
            "https://example.supabase.co/storage/v1/object/sign/exam-files/a.pdf?token=t"
        );
        assert_eq!(
            absolute_storage_url(base, "object/sign/exam-files/a.pdf"),
            "https://example.supabase.co/storage/v1/object/sign/exam-files/a.pdf"
        );
        assert_eq!(
            absolute_storage_url(base, "https://cdn.example.fr/a.pdf"),
            "https://cdn.example.fr/a.pdf"
        );
    }

    #[tokio::test]
    async fn requests_require_a_session() {
        let backend = RestBackend::new(test_config());
        let err = backend.current_user().await.unwrap_err();
        assert!(matches!(err, BackendError::NotAuthenticated));
    }

    #[tokio::test]
    async fn sign_out_clears_the_session() {
        let id = Uuid::new_v4();
        let token = token_with_payload(&format!(r#"{{"sub":"{id}"}}"#));
        let backend = RestBackend::with_access_token(test_config(), &token).unwrap();

        assert_eq!(backend.current_user().await.unwrap().id, id);
        backend.sign_out();
        assert!(backend.current_user().await.is_err());
    }
}
