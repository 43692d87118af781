//! Live log as Server-Sent Events
//!
//! Each line relayed from the agent's WebSocket becomes one `data:` event.
//! The relay is torn down as soon as the SSE client goes away.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::api::AppState;

/// Events buffered between the relay and the HTTP body
const EVENT_BUFFER: usize = 16;

/// GET /tasks/{job_id}/log/stream
pub async fn stream_log(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut relay = state.bridge.open(&job_id);
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    tokio::spawn(async move {
        let delivered = tokio::select! {
            n = relay.forward(
                |line| {
                    let tx = tx.clone();
                    async move { tx.send(Ok(line_event(&line))).await.is_ok() }
                },
                || !tx.is_closed(),
            ) => n,
            _ = tx.closed() => 0,
        };
        debug!("Log stream for job {} ended after {} line(s)", job_id, delivered);
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

/// SSE data may not contain carriage returns
fn line_event(line: &str) -> Event {
    Event::default().data(line.replace('\r', ""))
}
