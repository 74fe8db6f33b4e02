//! Seam between the session and the HTTP client.

use async_trait::async_trait;
use chat_api::{
    CancellationSignal, ChatApiClient, ChatApiError, ChatRequest, StreamEnd, StreamEvent,
};

/// Streams one completion, delivering decoded events in transport order.
///
/// Cancellation ends the stream with [`StreamEnd::Cancelled`]; it is not an
/// error.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn stream(
        &self,
        request: &ChatRequest,
        cancellation: &CancellationSignal,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<StreamEnd, ChatApiError>;
}

#[async_trait]
impl CompletionTransport for ChatApiClient {
    async fn stream(
        &self,
        request: &ChatRequest,
        cancellation: &CancellationSignal,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<StreamEnd, ChatApiError> {
        self.stream_with_handler(request, Some(cancellation), |event| on_event(event))
            .await
    }
}
