//! The remote HTTP seam.
//!
//! Everything that talks to the network (feed hosts, episode CDNs, the
//! remote archive's front-end) goes through [`Remote`], so that the
//! reconcilers can be exercised against [`MockRemote`] in tests.

mod http;
#[cfg(feature = "mock")]
mod mock;

pub use self::http::{HttpOptions, HttpRemote};
#[cfg(feature = "mock")]
pub use self::mock::{MockBody, MockRemote, MockRoute};
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// A response whose headers have been read and whose body has not.
pub struct Response {
    pub status: u16,
    pub etag: Option<String>,
    pub content_length: Option<u64>,
    pub location: Option<String>,
    body: ByteStream,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("etag", &self.etag)
            .field("content_length", &self.content_length)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl Response {
    pub fn new(status: u16, body: ByteStream) -> Self {
        Self { status, etag: None, content_length: None, location: None, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// A 3xx carrying somewhere to go.
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status) && self.location.is_some()
    }

    /// The entity tag with any weak marker and surrounding quotes removed.
    pub fn etag_unquoted(&self) -> Option<&str> {
        self.etag.as_deref().map(|etag| etag.trim().trim_start_matches("W/").trim_matches('"')).filter(|e| !e.is_empty())
    }

    pub fn into_body(self) -> ByteStream {
        self.body
    }

    /// Buffer the whole body.
    pub async fn bytes(self) -> Result<Vec<u8>> {
        self.body
            .try_fold(Vec::new(), |mut buffer, chunk| async move {
                buffer.extend_from_slice(&chunk);
                Ok(buffer)
            })
            .await
    }
}

/// Issue requests against remote hosts.
///
/// Implementations must not buffer the body: [`Remote::get`] returns as soon
/// as the response headers are available.
#[async_trait]
pub trait Remote: Send + Sync {
    async fn get(&self, url: &str) -> Result<Response>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn response(etag: Option<&str>) -> Response {
        let mut response = Response::new(200, Box::pin(futures::stream::empty()));
        response.etag = etag.map(str::to_string);
        response
    }

    #[rstest]
    #[case(Some("\"0cc175b9c0f1b6a831c399e269772661\""), Some("0cc175b9c0f1b6a831c399e269772661"))]
    #[case(Some("W/\"abc\""), Some("abc"))]
    #[case(Some("abc"), Some("abc"))]
    #[case(Some("\"\""), None)]
    #[case(None, None)]
    fn test_etag_unquoted(#[case] etag: Option<&str>, #[case] expected: Option<&str>) {
        assert_eq!(response(etag).etag_unquoted(), expected);
    }

    #[tokio::test]
    async fn test_bytes_concatenates_chunks() {
        let chunks: Vec<Result<Vec<u8>>> = vec![Ok(b"ab".to_vec()), Ok(b"cd".to_vec())];
        let response = Response::new(200, Box::pin(futures::stream::iter(chunks)));
        assert_eq!(response.bytes().await.unwrap(), b"abcd");
    }

    #[test]
    fn test_redirect_requires_location() {
        let mut response = Response::new(302, Box::pin(futures::stream::empty()));
        assert!(!response.is_redirect());
        response.location = Some("https://elsewhere.example.org/file".to_string());
        assert!(response.is_redirect());
        assert!(!response.is_success());
    }
}
