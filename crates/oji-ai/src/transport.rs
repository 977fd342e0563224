//! HTTP transport: one request in, a buffered body or a byte stream out.

use std::{pin::Pin, time::Duration};

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Raw response body chunks, in arrival order
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// A single HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// Sent as `Authorization: Bearer <key>` when present and non-empty
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
    /// Hand back the body as a byte stream instead of buffering it
    pub stream: bool,
    /// Give up if no complete answer arrives within this duration
    pub deadline: Option<Duration>,
}

impl HttpRequest {
    /// A GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            bearer: None,
            body: None,
            stream: false,
            deadline: None,
        }
    }

    /// A POST request with a JSON body
    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(url)
        }
    }

    pub fn with_bearer(mut self, key: Option<&str>) -> Self {
        self.bearer = key.filter(|k| !k.trim().is_empty()).map(str::to_string);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// A fully received 2xx response body
#[derive(Debug, Clone)]
pub struct BufferedBody {
    pub status: u16,
    pub text: String,
}

impl BufferedBody {
    /// Parse the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.text)?)
    }
}

/// What a transport hands back for a successful request
pub enum Response {
    Buffered(BufferedBody),
    Stream(ByteStream),
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Buffered(body) => f.debug_tuple("Buffered").field(body).finish(),
            Response::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Transport for issuing HTTP requests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request; non-2xx statuses come back as `Error::Status`
    async fn send(&self, request: HttpRequest, cancel: CancellationToken) -> Result<Response>;

    /// Fetch a URL with an optional credential under a hard deadline
    async fn probe(
        &self,
        url: &str,
        credential: Option<&str>,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<BufferedBody> {
        let request = HttpRequest::get(url)
            .with_bearer(credential)
            .with_deadline(deadline);
        match self.send(request, cancel).await? {
            Response::Buffered(body) => Ok(body),
            Response::Stream(_) => Err(Error::UnexpectedResponse(
                "probe returned a stream".to_string(),
            )),
        }
    }
}

/// `reqwest`-backed transport
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new() -> Self {
        Self::default()
    }

    async fn exchange(
        &self,
        request: HttpRequest,
        cancel: CancellationToken,
    ) -> Result<Response> {
        let HttpRequest {
            method,
            url,
            bearer,
            body,
            stream,
            ..
        } = request;

        let mut builder = self.client.request(method.clone(), &url);
        if let Some(key) = bearer {
            builder = builder.bearer_auth(key);
        }
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        tracing::debug!(%method, %url, stream, "Sending request");
        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), %url, "Request failed");
            return Err(Error::status(status.as_u16(), text));
        }

        if stream {
            return Ok(Response::Stream(byte_stream(response, cancel)));
        }

        let text = response.text().await?;
        Ok(Response::Buffered(BufferedBody {
            status: status.as_u16(),
            text,
        }))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest, cancel: CancellationToken) -> Result<Response> {
        let deadline = request.deadline;
        let exchange = self.exchange(request, cancel.clone());

        let bounded = async {
            match deadline {
                Some(limit) => match tokio::time::timeout(limit, exchange).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(limit)),
                },
                None => exchange.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = bounded => result,
        }
    }
}

/// Wrap a response body so every chunk read also observes cancellation.
fn byte_stream(response: reqwest::Response, cancel: CancellationToken) -> ByteStream {
    let mut chunks = Box::pin(response.bytes_stream());

    Box::pin(stream! {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                chunk = chunks.next() => Some(chunk),
            };

            match next {
                None => {
                    yield Err(Error::Cancelled);
                    break;
                }
                Some(None) => break,
                Some(Some(Ok(bytes))) => yield Ok(bytes.to_vec()),
                Some(Some(Err(e))) => {
                    yield Err(Error::Network(e));
                    break;
                }
            }
        }
    })
}
