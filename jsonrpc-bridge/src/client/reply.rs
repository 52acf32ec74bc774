//! ReplyFuture: caller-side future waiting for the peer's reply.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;

use super::pending::CallOutcome;
use crate::envelope::RequestId;
use crate::error::RpcError;

/// Future that resolves when the call is settled.
///
/// Settled exclusively by the router: a matching reply, a timeout, or a
/// refused send. Resolves to [`RpcError::Canceled`] if the router is dropped
/// first. Dropping the future does not cancel the call.
#[must_use = "a call's outcome is only observable by awaiting its ReplyFuture"]
pub struct ReplyFuture {
    id: RequestId,
    receiver: oneshot::Receiver<CallOutcome>,
}

impl ReplyFuture {
    pub(crate) fn new(id: RequestId, receiver: oneshot::Receiver<CallOutcome>) -> Self {
        Self { id, receiver }
    }

    /// Id allocated to the request.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Await the reply and decode the result into `T`.
    pub async fn decode<T: DeserializeOwned>(self) -> Result<T, RpcError> {
        let value = self.await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl Future for ReplyFuture {
    type Output = Result<Value, RpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RpcError::Canceled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
