//! Traced HTTP client for the hosted backend.
//!
//! Every request carries the project's anon key (as `apikey` and bearer
//! token) and runs inside an `outgoing_http` span that records the status.

use std::time::Duration;

use anyhow::Context;
use tracing::{Instrument, Level};
use url::Url;

use crate::domain::ports::RemoteError;

#[derive(Clone)]
pub struct BackendClient {
    inner: reqwest::Client,
    base: Url,
    anon_key: String,
}

impl BackendClient {
    pub fn new(base_url: &str, anon_key: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let base = Url::parse(base_url.trim()).with_context(|| format!("backend url '{base_url}'"))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("backend url '{base_url}' cannot be used as a base");
        }
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            inner,
            base,
            anon_key: anon_key.into(),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `base` + `segments`, each segment percent-encoded.
    pub fn endpoint<I, S>(&self, segments: I) -> Result<Url, RemoteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::transport("invalid backend base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Request builder with auth headers already attached.
    pub fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.inner
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    pub async fn execute(&self, builder: reqwest::RequestBuilder) -> reqwest::Result<reqwest::Response> {
        let req = builder.build()?;
        let span = tracing::span!(
            Level::INFO, "outgoing_http",
            http.method = %req.method(),
            http.url = %req.url(),
            http.status_code = tracing::field::Empty,
            error = tracing::field::Empty,
            otel.kind = "client",
        );

        let response = self.inner.execute(req).instrument(span.clone()).await?;

        span.record("http.status_code", response.status().as_u16());
        if response.status().is_client_error() || response.status().is_server_error() {
            span.record("error", true);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn endpoint_appends_encoded_segments() {
        let c = BackendClient::new("https://abc.supabase.co/", "key", Duration::from_secs(1)).unwrap();
        let url = c.endpoint(["storage", "v1", "object", "avatars", "u 1", "avatar.png"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc.supabase.co/storage/v1/object/avatars/u%201/avatar.png"
        );
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(BackendClient::new("mailto:a@b.c", "key", Duration::from_secs(1)).is_err());
        assert!(BackendClient::new("nope", "key", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn attaches_auth_headers() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET)
                .path("/ping")
                .header("apikey", "anon-key")
                .header("authorization", "Bearer anon-key");
            then.status(200).body("ok");
        });

        let c = BackendClient::new(&server.base_url(), "anon-key", Duration::from_secs(5)).unwrap();
        let url = c.endpoint(["ping"]).unwrap();
        let resp = c.execute(c.request(reqwest::Method::GET, url)).await.unwrap();

        assert!(resp.status().is_success());
        m.assert();
    }
}
