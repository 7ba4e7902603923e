//! Streaming response body relay.
//!
//! Every upstream response body is pumped by its own task into a small
//! bounded channel, and [`RelayBody`] is the caller end of that channel. The
//! bound keeps memory flat for any body size: once the caller stops reading,
//! the pump stops pulling from upstream and hyper's flow control pushes back
//! on the origin.
//!
//! The pump owns what has to end with the relay: the upstream body, the
//! in-flight permit and the lifecycle that ends in `Complete` or `Failed`.
//! It enforces the request deadline itself, so a caller that stops reading
//! cannot pin an upstream connection or a slot past it. On failure it also
//! closes the caller connection.

use std::fmt::Display;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Instant as StdInstant;

use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::BodyExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};

use crate::error::ForwardError;
use crate::http::connection::ConnectionAbort;
use crate::observability::metrics;
use crate::proxy::limiter::InFlightPermit;
use crate::proxy::state::{RequestLifecycle, RequestPhase};

/// Frames buffered between the upstream reader and the caller.
const RELAY_BUFFER: usize = 4;

/// Request context handed from the engine to the relay.
#[derive(Debug)]
pub struct RelayContext {
    pub lifecycle: RequestLifecycle,
    pub route: String,
    pub received_at: StdInstant,
    /// Caller connection to close if the relay fails.
    pub connection: Option<ConnectionAbort>,
}

type Outcome = Result<(), ForwardError>;

/// Response body relayed from upstream to the caller.
#[derive(Debug)]
pub struct RelayBody {
    frames: mpsc::Receiver<Frame<Bytes>>,
    outcome: oneshot::Receiver<Outcome>,
    size_hint: SizeHint,
    done: bool,
}

impl RelayBody {
    /// Start relaying `upstream`. The relay gives up at `deadline`.
    pub fn spawn<B>(upstream: B, deadline: Instant, permit: Option<InFlightPermit>, context: RelayContext) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + Unpin + 'static,
        B::Error: Display + Send,
    {
        let size_hint = upstream.size_hint();
        let done = upstream.is_end_stream();
        let (frames_tx, frames) = mpsc::channel(RELAY_BUFFER);
        let (outcome_tx, outcome) = oneshot::channel();

        let mut relay = Relay {
            upstream,
            permit,
            context,
            relayed: 0,
            outcome: Some(outcome_tx),
        };
        if done {
            // hyper never polls a body that reports end-of-stream up front
            // (empty and HEAD responses), so there is nothing to pump.
            relay.finish();
        } else {
            tokio::spawn(relay.run(frames_tx, deadline));
        }

        Self {
            frames,
            outcome,
            size_hint,
            done,
        }
    }
}

impl HttpBody for RelayBody {
    type Data = Bytes;
    type Error = ForwardError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, ForwardError>>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match ready!(this.frames.poll_recv(cx)) {
            Some(frame) => Poll::Ready(Some(Ok(frame))),
            None => {
                this.done = true;
                match this.outcome.try_recv() {
                    Ok(Ok(())) => Poll::Ready(None),
                    Ok(Err(e)) => Poll::Ready(Some(Err(e))),
                    Err(_) => Poll::Ready(Some(Err(ForwardError::BodyStreamError {
                        reason: "relay ended without completing".into(),
                    }))),
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }

    fn size_hint(&self) -> SizeHint {
        self.size_hint.clone()
    }
}

/// Upstream side of a relay, run as its own task.
struct Relay<B> {
    upstream: B,
    permit: Option<InFlightPermit>,
    context: RelayContext,
    relayed: u64,
    outcome: Option<oneshot::Sender<Outcome>>,
}

impl<B> Relay<B>
where
    B: HttpBody<Data = Bytes> + Unpin,
    B::Error: Display,
{
    async fn run(mut self, frames: mpsc::Sender<Frame<Bytes>>, deadline: Instant) -> RequestPhase {
        loop {
            let next = tokio::select! {
                _ = frames.closed() => None,
                next = timeout_at(deadline, self.upstream.frame()) => Some(next),
            };
            let frame = match next {
                None => {
                    self.caller_gone();
                    break;
                }
                Some(Err(_)) => {
                    self.fail("request deadline elapsed".into());
                    break;
                }
                Some(Ok(None)) => {
                    self.finish();
                    break;
                }
                Some(Ok(Some(Err(e)))) => {
                    self.fail(e.to_string());
                    break;
                }
                Some(Ok(Some(Ok(frame)))) => frame,
            };

            let len = frame.data_ref().map_or(0, |data| data.len() as u64);
            match timeout_at(deadline, frames.send(frame)).await {
                Ok(Ok(())) => self.relayed += len,
                Ok(Err(_)) => {
                    self.caller_gone();
                    break;
                }
                Err(_) => {
                    self.fail("request deadline elapsed while caller was not reading".into());
                    break;
                }
            }
        }
        self.context.lifecycle.phase()
    }

    fn finish(&mut self) {
        if self.context.lifecycle.advance(RequestPhase::Complete) {
            tracing::debug!(
                request_id = %self.context.lifecycle.request_id(),
                route = %self.context.route,
                bytes = self.relayed,
                elapsed_ms = self.context.received_at.elapsed().as_millis() as u64,
                "Response relayed"
            );
            metrics::record_relay(&self.context.route, self.relayed, self.context.received_at);
        }
        self.permit.take();
        self.settle(Ok(()));
    }

    fn fail(&mut self, reason: String) {
        if self.context.lifecycle.fail() {
            tracing::warn!(
                request_id = %self.context.lifecycle.request_id(),
                route = %self.context.route,
                bytes = self.relayed,
                reason = %reason,
                "Response body relay aborted"
            );
            metrics::record_forward_error("body_stream_error", &self.context.route);
        }
        self.permit.take();
        if let Some(connection) = &self.context.connection {
            connection.abort();
        }
        self.settle(Err(ForwardError::BodyStreamError { reason }));
    }

    fn caller_gone(&mut self) {
        if self.context.lifecycle.fail() {
            tracing::debug!(
                request_id = %self.context.lifecycle.request_id(),
                route = %self.context.route,
                bytes = self.relayed,
                "Caller went away, dropping upstream response"
            );
            metrics::record_forward_error("caller_disconnected", &self.context.route);
        }
        self.permit.take();
    }

    fn settle(&mut self, outcome: Outcome) {
        if let Some(tx) = self.outcome.take() {
            // A dropped receiver means the caller already left.
            let _ = tx.send(outcome);
        }
    }
}
