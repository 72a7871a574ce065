//! Streaming response body that owns the destination's in-flight slot.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::body::Bytes;
use axum::BoxError;
use http_body::{Body as HttpBody, Frame, SizeHint};

use crate::load_balancer::InFlightGuard;

/// Relays a destination response body frame by frame.
///
/// The in-flight slot is released when the body ends or is dropped, which
/// covers callers that disconnect mid-response. A body error after headers
/// were sent cannot be retried; it is logged and passed on so the caller's
/// connection is aborted.
#[derive(Debug)]
pub struct GuardedBody<B> {
    inner: B,
    guard: Option<InFlightGuard>,
    request_id: String,
}

impl<B> GuardedBody<B> {
    pub fn new(inner: B, guard: InFlightGuard, request_id: String) -> Self {
        Self {
            inner,
            guard: Some(guard),
            request_id,
        }
    }
}

impl<B> HttpBody for GuardedBody<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => Poll::Ready(Some(Ok(frame))),
            Some(Err(err)) => {
                let err = err.into();
                if let Some(guard) = this.guard.take() {
                    tracing::error!(
                        request_id = %this.request_id,
                        address = %guard.address,
                        error = %err,
                        "Response stream failed after headers were sent, aborting caller connection"
                    );
                }
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.guard.take();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for GuardedBody<B> {
    fn drop(&mut self) {
        if self.guard.is_some() {
            tracing::debug!(request_id = %self.request_id, "Response body dropped before completion");
        }
    }
}
