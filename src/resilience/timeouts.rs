//! Timeout enforcement.
//!
//! # Responsibilities
//! - Run synchronous dispatch off the async workers
//! - Enforce the per-request deadline
//! - Map timeouts and failed tasks to canonical responses
//!
//! # Design Decisions
//! - Uses Tokio's blocking pool and timeout facilities
//! - A timed-out handler is abandoned, not killed; its result is dropped
//! - Timed-out requests return 504 Gateway Timeout

use std::sync::Arc;
use std::time::Duration;

use crate::http::{Request, Response};
use crate::routing::Dispatcher;

/// Dispatch `request` on the blocking pool, giving up after `deadline`.
pub async fn dispatch_with_deadline(
    dispatcher: Arc<Dispatcher>,
    request: Request,
    deadline: Duration,
) -> Response {
    let path = request.path.clone();
    let task = tokio::task::spawn_blocking(move || dispatcher.dispatch(&request));

    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(path = %path, error = %e, "Dispatch task failed");
            Response::internal_error()
        }
        Err(_) => {
            tracing::warn!(path = %path, deadline = ?deadline, "Dispatch deadline exceeded");
            Response::gateway_timeout()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Arc<Dispatcher> {
        let mut builder = Dispatcher::builder();
        builder
            .register("/fast", || Ok::<_, &'static str>(Response::ok([("speed", "fast")])))
            .unwrap();
        builder
            .register("/slow", || {
                std::thread::sleep(Duration::from_millis(500));
                Ok::<_, &'static str>(Response::ok([("speed", "slow")]))
            })
            .unwrap();
        Arc::new(builder.build())
    }

    #[tokio::test]
    async fn fast_handler_completes() {
        let deadline = Duration::from_secs(5);
        let resp = dispatch_with_deadline(dispatcher(), Request::new("/fast"), deadline).await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["speed"], "fast");
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let deadline = Duration::from_millis(50);
        let resp = dispatch_with_deadline(dispatcher(), Request::new("/slow"), deadline).await;
        assert_eq!(resp, Response::gateway_timeout());
    }

    #[tokio::test]
    async fn unknown_path_still_404() {
        let deadline = Duration::from_secs(5);
        let resp = dispatch_with_deadline(dispatcher(), Request::new("/nope"), deadline).await;
        assert_eq!(resp.status, 404);
    }
}
