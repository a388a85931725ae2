use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::contract::error::AssetError;
use crate::contract::model::Asset;
use crate::domain::ports::remote::UNIQUE_VIOLATION;
use crate::domain::ports::{AssetBucket, ListFilter, Lookup, RemoteError, RemoteStore, Table};
use crate::infra::remote::client::BackendClient;

static DETAIL_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Key \(([A-Za-z0-9_]+)\)=").expect("valid regex"));
static CONSTRAINT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"constraint "([A-Za-z0-9_]+)""#).expect("valid regex"));

/// PostgREST error body.
#[derive(Debug, Default, Deserialize)]
struct PgError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Storage API error body.
#[derive(Debug, Default, Deserialize)]
struct StorageError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Adapter for a PostgREST-style REST API plus object storage.
pub struct HttpRemoteStore {
    client: BackendClient,
}

impl HttpRemoteStore {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    fn table_url(&self, table: Table) -> Result<url::Url, RemoteError> {
        self.client.endpoint(["rest", "v1", table.as_str()])
    }

    async fn send(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<Response, RemoteError> {
        let resp = self
            .client
            .execute(builder)
            .await
            .map_err(|e| RemoteError::transport(format!("{what}: {e}")))?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(rest_error(resp, what).await)
        }
    }

    async fn rows(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<Vec<Value>, RemoteError> {
        self.send(builder, what)
            .await?
            .json::<Vec<Value>>()
            .await
            .map_err(|e| RemoteError::transport(format!("{what}: unreadable response: {e}")))
    }

    fn public_url(&self, bucket: AssetBucket, path: &str) -> String {
        let encoded = path
            .split('/')
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.client.base().as_str().trim_end_matches('/'),
            bucket.as_str(),
            encoded
        )
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    #[instrument(name = "nested.http.get", skip(self), fields(table = table.as_str()))]
    async fn get(&self, table: Table, key: &str) -> Result<Option<Value>, RemoteError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("id", &format!("eq.{key}"));
        let rows = self
            .rows(self.client.request(Method::GET, url), "GET row")
            .await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(name = "nested.http.upsert", skip(self, row), fields(table = table.as_str()))]
    async fn upsert(&self, table: Table, key: &str, row: &Value) -> Result<Value, RemoteError> {
        let mut body = row.clone();
        match &mut body {
            Value::Object(map) => {
                map.insert("id".to_string(), Value::String(key.to_string()));
            }
            _ => return Err(RemoteError::transport("upsert body must be a JSON object")),
        }
        let builder = self
            .client
            .request(Method::POST, self.table_url(table)?)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&body);
        self.rows(builder, "upsert row")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::transport("upsert returned no row"))
    }

    #[instrument(name = "nested.http.delete", skip(self), fields(table = table.as_str()))]
    async fn delete(&self, table: Table, key: &str) -> Result<bool, RemoteError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{key}"));
        let builder = self
            .client
            .request(Method::DELETE, url)
            .header("Prefer", "return=representation");
        Ok(!self.rows(builder, "delete row").await?.is_empty())
    }

    #[instrument(name = "nested.http.list", skip(self), fields(table = table.as_str()))]
    async fn list(&self, table: Table, filter: &ListFilter) -> Result<Vec<Value>, RemoteError> {
        let mut url = self.table_url(table)?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("select", "*");
            match filter {
                ListFilter::OwnedBy(user) => q.append_pair("owner_id", &format!("eq.{user}")),
                ListFilter::Published => q.append_pair("published", "eq.true"),
            };
            q.append_pair("order", "updated_at.desc");
        }
        self.rows(self.client.request(Method::GET, url), "list rows")
            .await
    }

    #[instrument(name = "nested.http.lookup", skip(self))]
    async fn lookup(&self, lookup: &Lookup) -> Result<bool, RemoteError> {
        match lookup {
            Lookup::UsernameTaken { username, except } => {
                let mut url = self.table_url(Table::Profiles)?;
                {
                    let mut q = url.query_pairs_mut();
                    q.append_pair("select", "id")
                        .append_pair("username", &format!("ilike.{}", escape_like(username)));
                    if let Some(user) = except {
                        q.append_pair("id", &format!("neq.{user}"));
                    }
                    q.append_pair("limit", "1");
                }
                let rows = self
                    .rows(self.client.request(Method::GET, url), "username lookup")
                    .await?;
                Ok(!rows.is_empty())
            }
            Lookup::EmailRegistered(email) => {
                let url = self.client.endpoint(["rest", "v1", "rpc", "email_exists"])?;
                let builder = self
                    .client
                    .request(Method::POST, url)
                    .json(&serde_json::json!({ "email": email }));
                let value = self
                    .send(builder, "email lookup")
                    .await?
                    .json::<Value>()
                    .await
                    .map_err(|e| RemoteError::transport(format!("email lookup: {e}")))?;
                value
                    .as_bool()
                    .ok_or_else(|| RemoteError::transport("email lookup: expected a boolean"))
            }
        }
    }

    #[instrument(
        name = "nested.http.upload_asset",
        skip(self, asset),
        fields(bucket = bucket.as_str(), size = asset.bytes.len())
    )]
    async fn upload_asset(
        &self,
        bucket: AssetBucket,
        path: &str,
        asset: &Asset,
    ) -> Result<String, RemoteError> {
        let mut segments = vec!["storage", "v1", "object", bucket.as_str()];
        segments.extend(path.split('/'));
        let url = self.client.endpoint(segments)?;
        let builder = self
            .client
            .request(Method::POST, url)
            .header("Content-Type", asset.mime_type.to_ascii_lowercase())
            .header("x-upsert", "true")
            .body(asset.bytes.clone());

        let resp = self
            .client
            .execute(builder)
            .await
            .map_err(|e| RemoteError::transport(format!("upload: {e}")))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(self.public_url(bucket, path));
        }
        let text = resp.text().await.unwrap_or_default();
        Err(storage_error(status, &text))
    }
}

async fn rest_error(resp: Response, what: &str) -> RemoteError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let body: PgError = serde_json::from_str(&text).unwrap_or_default();

    let code = match body.code {
        Some(code) if code.starts_with("23") => Some(code),
        _ if status == StatusCode::CONFLICT => Some(UNIQUE_VIOLATION.to_string()),
        _ => None,
    };
    let message = body.message.unwrap_or_else(|| text.clone());
    match code {
        Some(code) => RemoteError::Constraint {
            field: constraint_field(&message, body.details.as_deref()),
            code,
            message,
        },
        None => RemoteError::transport(format!("{what}: HTTP {status}: {message}")),
    }
}

/// Column named by a constraint violation, from the details line or the
/// conventional `<table>_<column>_key` constraint name.
fn constraint_field(message: &str, details: Option<&str>) -> Option<String> {
    if let Some(c) = details.and_then(|d| DETAIL_KEY.captures(d)) {
        return Some(c[1].to_string());
    }
    let name = CONSTRAINT_NAME.captures(message)?.get(1)?.as_str();
    let name = name.strip_suffix("_key").unwrap_or(name);
    let name = [Table::Profiles, Table::Projects]
        .iter()
        .find_map(|t| name.strip_prefix(&format!("{}_", t.as_str())).map(str::to_string))
        .unwrap_or_else(|| name.to_string());
    Some(name)
}

fn storage_error(status: StatusCode, text: &str) -> RemoteError {
    let rejected = matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNSUPPORTED_MEDIA_TYPE
    );
    let body: StorageError = serde_json::from_str(text).unwrap_or_default();
    let reason = body
        .message
        .or(body.error)
        .unwrap_or_else(|| format!("HTTP {status}"));
    if rejected {
        RemoteError::AssetRejected(AssetError::Rejected { reason })
    } else {
        RemoteError::transport(format!("upload: HTTP {status}: {reason}"))
    }
}

/// Escape LIKE metacharacters so the lookup matches the name literally.
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
