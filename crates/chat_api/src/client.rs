use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, Url};
use tracing::{debug, warn};

use crate::config::ChatApiConfig;
use crate::error::{parse_error_message, ChatApiError};
use crate::events::{StreamEnd, StreamEvent};
use crate::headers::build_headers;
use crate::payload::ChatRequest;
use crate::sse::FrameDecoder;
use crate::url::normalize_chat_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
    endpoint: Url,
}

#[derive(Debug, Clone)]
pub struct StreamResult {
    pub events: Vec<StreamEvent>,
    pub end: StreamEnd,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let normalized = normalize_chat_url(&config.base_url);
        let endpoint = Url::parse(&normalized)
            .map_err(|error| ChatApiError::InvalidBaseUrl(format!("{normalized}: {error}")))?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self {
            http,
            config,
            endpoint,
        })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn normalized_endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    pub fn build_headers(&self, user_agent: Option<&str>) -> Result<HeaderMap, ChatApiError> {
        let headers = build_headers(&self.config, user_agent)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ChatApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::RequestBuilder, ChatApiError> {
        validate_request_payload(request)?;

        let headers = self.build_headers(self.config.user_agent.as_deref())?;
        let mut payload = request.clone();
        payload.stream = true;
        Ok(self
            .http
            .post(self.endpoint.clone())
            .headers(headers)
            .json(&payload))
    }

    /// Send the request once. Non-2xx statuses are terminal; there is no retry.
    pub async fn send(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, ChatApiError> {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );
        let response = await_or_cancel(self.build_request(request)?.send(), cancellation)
            .await?
            .map_err(ChatApiError::from)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .unwrap_or_default();
        let message = parse_error_message(status, &body);
        warn!(status = status.as_u16(), %message, "chat completion request rejected");
        Err(ChatApiError::Status(status, message))
    }

    /// Stream decoded frames to `on_event` in transport order.
    ///
    /// Cancellation is not an error here: the stream simply ends with
    /// [`StreamEnd::Cancelled`] and whatever was delivered so far stands.
    pub async fn stream_with_handler<F>(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<StreamEnd, ChatApiError>
    where
        F: FnMut(StreamEvent),
    {
        let response = match self.send(request, cancellation).await {
            Ok(response) => response,
            Err(ChatApiError::Cancelled) => return Ok(StreamEnd::Cancelled),
            Err(error) => return Err(error),
        };
        let mut bytes = response.bytes_stream();
        let mut decoder = FrameDecoder::default();

        loop {
            let next = match await_or_cancel(bytes.next(), cancellation).await {
                Ok(next) => next,
                Err(ChatApiError::Cancelled) => return Ok(StreamEnd::Cancelled),
                Err(error) => return Err(error),
            };

            let Some(chunk) = next else {
                if let Some(event) = decoder.finish() {
                    on_event(event);
                }
                return Ok(if decoder.is_terminated() {
                    StreamEnd::Terminator
                } else {
                    StreamEnd::Eof
                });
            };

            let chunk = chunk.map_err(ChatApiError::from)?;
            for event in decoder.feed(&chunk) {
                on_event(event);
            }

            if decoder.is_terminated() {
                return Ok(StreamEnd::Terminator);
            }
            if is_cancelled(cancellation) {
                return Ok(StreamEnd::Cancelled);
            }
        }
    }

    pub async fn stream(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<StreamResult, ChatApiError> {
        let mut events = Vec::new();
        let end = self
            .stream_with_handler(request, cancellation, |event| {
                events.push(event);
            })
            .await?;

        Ok(StreamResult { events, end })
    }
}

fn validate_request_payload(request: &ChatRequest) -> Result<(), ChatApiError> {
    if request.model.trim().is_empty() {
        return Err(ChatApiError::InvalidRequestPayload(
            "'model' must not be empty".to_owned(),
        ));
    }
    if request.messages.is_empty() {
        return Err(ChatApiError::InvalidRequestPayload(
            "'messages' must contain at least one message".to_owned(),
        ));
    }
    Ok(())
}

pub fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
