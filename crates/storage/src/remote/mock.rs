//! In-memory remote for testing.

use super::{ByteStream, Remote, Response};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// How a mocked body is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBody {
    /// The whole body, in one chunk.
    Complete(Vec<u8>),
    /// The given bytes, then a network error.
    Truncated(Vec<u8>),
    /// The given bytes, then nothing ever again.
    Stalled(Vec<u8>),
}

impl MockBody {
    fn len(&self) -> usize {
        match self {
            Self::Complete(data) | Self::Truncated(data) | Self::Stalled(data) => data.len(),
        }
    }

    fn stream(self, url: String) -> ByteStream {
        match self {
            Self::Complete(data) => Box::pin(futures::stream::iter([Ok(data)])),
            Self::Truncated(data) => Box::pin(futures::stream::iter([
                Ok(data),
                Err(exn::Exn::from(ErrorKind::Network(url))),
            ])),
            Self::Stalled(data) => Box::pin(futures::stream::iter([Ok(data)]).chain(futures::stream::pending())),
        }
    }
}

/// A canned response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRoute {
    pub status: u16,
    pub etag: Option<String>,
    /// Defaults to the body length.
    pub content_length: Option<u64>,
    pub location: Option<String>,
    pub body: MockBody,
    /// Held before the headers are returned.
    pub delay: Option<Duration>,
}

impl MockRoute {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::status(200).with_body(MockBody::Complete(body.into()))
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            etag: None,
            content_length: None,
            location: None,
            body: MockBody::Complete(Vec::new()),
            delay: None,
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self { location: Some(location.into()), ..Self::status(302) }
    }

    pub fn with_body(mut self, body: MockBody) -> Self {
        self.body = body;
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn respond(self, url: &str, open: OpenResponse) -> Response {
        let content_length = self.content_length.or(Some(self.body.len() as u64));
        // The response stays open until its body is dropped.
        let body = self.body.stream(url.to_string()).map(move |chunk| {
            let _open = &open;
            chunk
        });
        Response { status: self.status, etag: self.etag, content_length, location: self.location, body: Box::pin(body) }
    }
}

/// Counts a response as open from the request until it is dropped.
#[derive(Debug)]
struct OpenResponse(Arc<AtomicUsize>);

impl OpenResponse {
    fn new(open: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = open.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(open))
    }
}

impl Drop for OpenResponse {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// [`Remote`] serving canned responses by exact URL; anything else is a 404.
///
/// # Examples
///
/// ```
/// use podarc_storage::remote::{MockRemote, MockRoute, Remote};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let remote = MockRemote::default()
///     .with_route("https://feeds.example.com/show.rss", MockRoute::ok("<rss/>"));
/// let response = remote.get("https://feeds.example.com/show.rss").await?;
/// assert_eq!(response.bytes().await?, b"<rss/>");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockRemote {
    routes: RwLock<HashMap<String, MockRoute>>,
    requests: RwLock<Vec<String>>,
    open: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

impl MockRemote {
    pub fn with_route(mut self, url: impl Into<String>, route: MockRoute) -> Self {
        self.routes.get_mut().insert(url.into(), route);
        self
    }

    /// Replace (or add) a route after construction.
    pub async fn set_route(&self, url: impl Into<String>, route: MockRoute) {
        self.routes.write().await.insert(url.into(), route);
    }

    /// Every URL requested so far, in order.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.read().await.clone()
    }

    pub async fn request_count(&self, url: &str) -> usize {
        self.requests.read().await.iter().filter(|requested| *requested == url).count()
    }

    /// The most responses ever open at once.
    pub fn peak_open(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Remote for MockRemote {
    async fn get(&self, url: &str) -> Result<Response> {
        self.requests.write().await.push(url.to_string());
        let open = OpenResponse::new(&self.open, &self.peak);
        let route = self.routes.read().await.get(url).cloned().unwrap_or_else(|| MockRoute::status(404));
        if let Some(delay) = route.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(route.respond(url, open))
    }
}
