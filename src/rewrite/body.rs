//! Streaming response body rewriting.
//!
//! ```text
//! origin body ──▶ reader task ──chunks──▶ blocking worker (lol_html) ──out──▶ client body
//! ```
//!
//! Both channels are bounded, so the origin is read no faster than the
//! client drains the rewritten output.

use axum::body::Body;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc;

use crate::rewrite::html::rewrite_stream;
use crate::rewrite::nonce::Nonce;
use crate::rewrite::RewriteError;

/// Wrap `body` so that it is rewritten with `nonce` while it streams.
///
/// Must be called from within a tokio runtime.
pub fn rewrite_body(body: Body, nonce: Nonce, capacity: usize) -> Body {
    let (chunk_tx, mut chunk_rx) = mpsc::channel::<Result<Bytes, RewriteError>>(capacity);
    let (out_tx, out_rx) = mpsc::channel::<Result<Bytes, RewriteError>>(capacity);

    // The reader owns the origin body and the only chunk sender. Dropping
    // them once the client is gone releases the origin connection and ends
    // the worker's `blocking_recv`.
    let client_gone = out_tx.clone();
    tokio::spawn(async move {
        let mut origin = body.into_data_stream();
        loop {
            let chunk = tokio::select! {
                chunk = origin.next() => chunk,
                _ = client_gone.closed() => {
                    tracing::debug!("Client disconnected, releasing origin body");
                    break;
                }
            };
            let Some(chunk) = chunk else { break };
            let failed = chunk.is_err();
            let sent = tokio::select! {
                sent = chunk_tx.send(chunk.map_err(RewriteError::from)) => sent.is_ok(),
                _ = client_gone.closed() => false,
            };
            if !sent || failed {
                break;
            }
        }
    });

    let worker_tx = out_tx.clone();
    let worker = tokio::task::spawn_blocking(move || {
        let out = &worker_tx;
        // A closed output means the client went away; stop pulling from the origin.
        let chunks = std::iter::from_fn(|| {
            if out.is_closed() {
                None
            } else {
                chunk_rx.blocking_recv()
            }
        });
        let result = rewrite_stream(chunks, nonce.as_str(), |c| {
            let _ = out.blocking_send(Ok(Bytes::copy_from_slice(c)));
        });
        if let Err(e) = result {
            tracing::warn!(error = %e, "HTML rewrite aborted");
            let _ = out.blocking_send(Err(e));
        }
    });

    tokio::spawn(async move {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "HTML rewrite worker failed");
            let _ = out_tx.send(Err(RewriteError::Worker(e))).await;
        }
    });

    Body::from_stream(stream::unfold(out_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}
