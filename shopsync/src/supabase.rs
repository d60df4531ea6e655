//! [`RemoteTableClient`] over Supabase's PostgREST and GoTrue HTTP APIs.

use std::collections::BTreeSet;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::CloudConfig;
use crate::error::RemoteError;
use crate::remote::{RemoteTableClient, Session};

/// Lifetime assumed when the token response carries no expiry.
const DEFAULT_SESSION_SECS: i64 = 3600;

pub struct SupabaseClient {
    http: reqwest::Client,
    config: CloudConfig,
    session: RwLock<Option<Session>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<TokenUser>,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    #[serde(default)]
    email: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: CloudConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            session: RwLock::new(None),
        }
    }

    fn base(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base(), table)
    }

    fn current_session(&self) -> Option<Session> {
        let guard = self.session.read().unwrap_or_else(|e| e.into_inner());
        guard.clone().filter(|s| !s.is_expired(Utc::now()))
    }

    fn set_session(&self, session: Option<Session>) {
        let mut guard = self.session.write().unwrap_or_else(|e| e.into_inner());
        *guard = session;
    }

    /// Attach the anon key and the best available bearer token.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .current_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.config.key.clone());
        request.header("apikey", &self.config.key).bearer_auth(token)
    }

    fn ensure_active(&self) -> Result<(), RemoteError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(RemoteError::Inactive)
        }
    }
}

/// Sorted union of the keys of `rows`.
///
/// PostgREST rejects a bulk body whose objects have different keys unless the
/// request names its columns; keys a row lacks then take the column default.
fn column_list(rows: &[Value]) -> String {
    let columns: BTreeSet<&str> = rows
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|row| row.keys().map(String::as_str))
        .collect();
    columns.into_iter().collect::<Vec<_>>().join(",")
}

/// Turn a non-2xx response into [`RemoteError::Status`] with the server's message.
async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            ["message", "error_description", "msg", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or(body);
    Err(RemoteError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RemoteTableClient for SupabaseClient {
    fn is_active(&self) -> bool {
        self.config.is_configured()
    }

    async fn fetch_all(&self, table: &str) -> Result<Vec<Value>, RemoteError> {
        self.ensure_active()?;
        let request = self.http.get(self.table_url(table)).query(&[("select", "*")]);
        let response = check(self.authorize(request).send().await?).await?;
        match response.json::<Value>().await? {
            Value::Array(rows) => Ok(rows),
            other => Err(RemoteError::Malformed(format!(
                "expected an array of rows from {table}, got {other}"
            ))),
        }
    }

    async fn upsert(&self, table: &str, rows: &[Value]) -> Result<(), RemoteError> {
        self.ensure_active()?;
        if rows.is_empty() {
            return Ok(());
        }
        let request = self
            .http
            .post(self.table_url(table))
            .query(&[("columns", column_list(rows))])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);
        check(self.authorize(request).send().await?).await?;
        log::debug!("Upserted {} rows into {table}", rows.len());
        Ok(())
    }

    async fn delete_by_id(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        self.ensure_active()?;
        let request = self
            .http
            .delete(self.table_url(table))
            .query(&[("id", format!("eq.{id}"))]);
        check(self.authorize(request).send().await?).await?;
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, RemoteError> {
        self.ensure_active()?;
        let response = self
            .http
            .post(format!("{}/auth/v1/token", self.base()))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.config.key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;

        let now_ms = Utc::now().timestamp_millis();
        let expires_at = match (token.expires_at, token.expires_in) {
            (Some(at), _) => at * 1000,
            (None, Some(secs)) => now_ms + secs * 1000,
            (None, None) => now_ms + DEFAULT_SESSION_SECS * 1000,
        };
        let session = Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            email: token.user.and_then(|u| u.email).or_else(|| Some(email.to_string())),
        };
        self.set_session(Some(session.clone()));
        log::info!("Signed in as {email}");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        let Some(session) = self.current_session() else {
            self.set_session(None);
            return Ok(());
        };
        self.set_session(None);
        self.ensure_active()?;
        let response = self
            .http
            .post(format!("{}/auth/v1/logout", self.base()))
            .header("apikey", &self.config.key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn get_session(&self) -> Option<Session> {
        self.current_session()
    }

    fn restore_session(&self, session: Session) {
        self.set_session(Some(session));
    }

    async fn probe(&self, table: &str) -> Result<(), RemoteError> {
        self.ensure_active()?;
        let request = self
            .http
            .get(self.table_url(table))
            .query(&[("select", "id"), ("limit", "1")]);
        check(self.authorize(request).send().await?).await?;
        Ok(())
    }
}
