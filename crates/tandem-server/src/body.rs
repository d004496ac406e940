//! Response bodies.

use std::fmt;

use futures::stream::{self, BoxStream, StreamExt};
use http::{header, HeaderValue, Response, StatusCode};

/// Body of a [`TandemServer`](crate::TandemServer) response.
pub enum ResponseBody {
    /// A complete body.
    Full(Vec<u8>),
    /// Chunks written as they are produced. Each chunk is one flush.
    Stream(BoxStream<'static, Vec<u8>>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self::Full(Vec::new())
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Chunks of the body; a full body is a single chunk.
    pub fn into_stream(self) -> BoxStream<'static, Vec<u8>> {
        match self {
            Self::Full(bytes) if bytes.is_empty() => stream::empty().boxed(),
            Self::Full(bytes) => stream::once(async move { bytes }).boxed(),
            Self::Stream(chunks) => chunks,
        }
    }

    /// Wait for the whole body.
    pub async fn collect(self) -> Vec<u8> {
        match self {
            Self::Full(bytes) => bytes,
            Self::Stream(chunks) => chunks.concat().await,
        }
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Full(bytes)
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        Self::Full(text.into_bytes())
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Response type of the HTTP surface.
pub type HttpResponse = Response<ResponseBody>;

pub(crate) fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<ResponseBody>,
) -> HttpResponse {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_stream() {
        let body = ResponseBody::Stream(stream::iter(vec![b"ab".to_vec(), b"cd".to_vec()]).boxed());
        assert!(body.is_stream());
        assert_eq!(body.collect().await, b"abcd");
    }

    #[tokio::test]
    async fn test_full_body_chunks() {
        let chunks: Vec<_> = ResponseBody::from("hi".to_string()).into_stream().collect().await;
        assert_eq!(chunks, vec![b"hi".to_vec()]);
        assert_eq!(ResponseBody::empty().into_stream().count().await, 0);
    }
}
