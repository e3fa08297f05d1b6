//! Completion tracking for response bodies.
//!
//! This module wraps a response body so that a one-shot hook fires once
//! the body has been fully streamed to the client, or the transfer was
//! abandoned, while every frame continues to its destination unchanged.

use axum::body::{Body, Bytes};
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};

/// One-shot completion hook.
///
/// Fires when the wrapped body reaches end-of-stream, or when it is
/// dropped before that (client disconnect, mid-stream error, abandoned
/// transfer) — whichever comes first. Taking the hook out of the `Option`
/// makes a second invocation impossible, including under a close racing
/// an exhaustion.
pub(crate) struct CompletionGuard {
    hook: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl CompletionGuard {
    pub(crate) fn new<F>(hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            hook: Some(Box::new(hook)),
        }
    }

    fn fire(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook();
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.fire();
    }
}

/// Wraps `body` so `guard` fires exactly once when consumption ends.
///
/// No bytes are read eagerly; consumption stays driven entirely by the
/// downstream transport. Data and trailer frames, `is_end_stream`, and
/// `size_hint` all pass through, so response framing on the wire is
/// unaffected.
pub(crate) fn observe_completion(body: Body, guard: CompletionGuard) -> Body {
    Body::new(CompletionBody { inner: body, guard })
}

struct CompletionBody {
    inner: Body,
    guard: CompletionGuard,
}

impl HttpBody for CompletionBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(None) => {
                this.guard.fire();
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::{observe_completion, CompletionGuard};
    use axum::body::{Body, Bytes};
    use futures::stream;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_guard() -> (CompletionGuard, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let guard = CompletionGuard::new(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        (guard, fired)
    }

    #[tokio::test]
    async fn fires_once_after_full_consumption() {
        let (guard, fired) = counting_guard();
        let body = observe_completion(Body::from("Hello, World!"), guard);

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, "Hello, World!");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fires_once_when_dropped_unread() {
        let (guard, fired) = counting_guard();
        let body = observe_completion(Body::from("never read"), guard);

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        drop(body);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fires_once_when_abandoned_mid_stream() {
        let (guard, fired) = counting_guard();
        let chunks = stream::iter(vec![
            Ok::<_, std::convert::Infallible>(Bytes::from("chunk1")),
            Ok(Bytes::from("chunk2")),
            Ok(Bytes::from("chunk3")),
        ]);
        let mut body = observe_completion(Body::from_stream(chunks), guard);

        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), "chunk1");
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        drop(body);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn does_not_refire_on_drop_after_completion() {
        let (guard, fired) = counting_guard();
        let mut body = observe_completion(Body::from("tiny"), guard);

        while let Some(frame) = body.frame().await {
            frame.unwrap();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        drop(body);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fires_for_empty_body() {
        let (guard, fired) = counting_guard();
        let body = observe_completion(Body::empty(), guard);

        let collected = body.collect().await.unwrap().to_bytes();
        assert!(collected.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_frames_pass_through_and_guard_still_fires() {
        let (guard, fired) = counting_guard();
        let chunks = stream::iter(vec![
            Ok(Bytes::from("partial")),
            Err(axum::Error::new(std::io::Error::other("connection reset"))),
        ]);
        let mut body = observe_completion(Body::from_stream(chunks), guard);

        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), "partial");
        assert!(body.frame().await.unwrap().is_err());

        drop(body);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preserves_size_hint() {
        let (guard, _fired) = counting_guard();
        let body = observe_completion(Body::from("foobar"), guard);
        assert_eq!(http_body::Body::size_hint(&body).exact(), Some(6));
    }
}
