use super::{Remote, Response};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, ETAG, HeaderMap, HeaderValue, LOCATION};
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::instrument;

/// How many redirects are followed when following is enabled.
const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Applies to the whole exchange, body included.
    pub timeout: Duration,
    pub user_agent: String,
    /// Sent verbatim as the `Authorization` header on every request.
    pub authorization: Option<String>,
    pub follow_redirects: bool,
}

/// [`Remote`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
}

impl HttpRemote {
    pub fn new(options: &HttpOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(authorization) = &options.authorization {
            let mut value = HeaderValue::from_str(authorization)
                .or_raise(|| ErrorKind::Client("authorization header".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let policy = match options.follow_redirects {
            true => Policy::limited(MAX_REDIRECTS),
            false => Policy::none(),
        };
        let client = reqwest::Client::builder()
            .redirect(policy)
            .timeout(options.timeout)
            .user_agent(options.user_agent.as_str())
            .default_headers(headers)
            .build()
            .or_raise(|| ErrorKind::Client("http client".to_string()))?;
        Ok(Self { client })
    }

    fn header(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
        headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
    }

    fn convert(url: &str, response: reqwest::Response) -> Response {
        let headers = response.headers();
        let status = response.status().as_u16();
        let etag = Self::header(headers, ETAG);
        let location = Self::header(headers, LOCATION);
        let content_length = Self::header(headers, CONTENT_LENGTH).and_then(|value| value.trim().parse().ok());
        let url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map(Vec::from).or_raise(|| ErrorKind::Network(url.clone())));
        Response { status, etag, content_length, location, body: Box::pin(body) }
    }
}

#[async_trait]
impl Remote for HttpRemote {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, url: &str) -> Result<Response> {
        let response = self.client.get(url).send().await.or_raise(|| ErrorKind::Network(url.to_string()))?;
        tracing::debug!(status = response.status().as_u16(), "response headers received");
        Ok(Self::convert(url, response))
    }
}
