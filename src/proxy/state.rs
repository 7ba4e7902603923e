//! Per-request lifecycle state machine.
//!
//! # State Transitions
//! ```text
//! Received → Routed → Forwarding → Relaying → Complete
//!               │          │           │
//!               └──────────┴───────────┴──→ Failed
//! ```
//!
//! No transition leads back; there are no retries between states.

use std::fmt;

/// Where a forwarded request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    Routed,
    Forwarding,
    Relaying,
    Complete,
    Failed,
}

impl RequestPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestPhase::Received => "received",
            RequestPhase::Routed => "routed",
            RequestPhase::Forwarding => "forwarding",
            RequestPhase::Relaying => "relaying",
            RequestPhase::Complete => "complete",
            RequestPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestPhase::Complete | RequestPhase::Failed)
    }

    /// Whether `self → next` is an edge of the state machine.
    pub fn can_advance_to(self, next: RequestPhase) -> bool {
        use RequestPhase::*;
        matches!(
            (self, next),
            (Received, Routed)
                | (Routed, Forwarding)
                | (Forwarding, Relaying)
                | (Relaying, Complete)
                | (Routed, Failed)
                | (Forwarding, Failed)
                | (Relaying, Failed)
        )
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one request through [`RequestPhase`]s and logs each transition.
#[derive(Debug)]
pub struct RequestLifecycle {
    request_id: String,
    phase: RequestPhase,
}

impl RequestLifecycle {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            phase: RequestPhase::Received,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Move to `next`. Invalid edges are ignored and reported, the phase is
    /// left unchanged.
    pub fn advance(&mut self, next: RequestPhase) -> bool {
        if !self.phase.can_advance_to(next) {
            tracing::warn!(
                request_id = %self.request_id,
                from = %self.phase,
                to = %next,
                "Ignoring invalid request phase transition"
            );
            return false;
        }
        tracing::trace!(request_id = %self.request_id, from = %self.phase, to = %next, "Request phase");
        self.phase = next;
        true
    }

    /// Move to `Failed` if the request is not already finished.
    pub fn fail(&mut self) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        self.advance(RequestPhase::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_complete() {
        let mut lifecycle = RequestLifecycle::new("req-1");
        for next in [
            RequestPhase::Routed,
            RequestPhase::Forwarding,
            RequestPhase::Relaying,
            RequestPhase::Complete,
        ] {
            assert!(lifecycle.advance(next));
        }
        assert_eq!(lifecycle.phase(), RequestPhase::Complete);
        assert!(!lifecycle.fail());
    }

    #[test]
    fn failure_only_from_active_phases() {
        assert!(!RequestPhase::Received.can_advance_to(RequestPhase::Failed));
        assert!(RequestPhase::Routed.can_advance_to(RequestPhase::Failed));
        assert!(RequestPhase::Forwarding.can_advance_to(RequestPhase::Failed));
        assert!(RequestPhase::Relaying.can_advance_to(RequestPhase::Failed));
        assert!(!RequestPhase::Complete.can_advance_to(RequestPhase::Failed));
    }

    #[test]
    fn no_skipping_or_going_back() {
        let mut lifecycle = RequestLifecycle::new("req-2");
        assert!(!lifecycle.advance(RequestPhase::Relaying));
        assert_eq!(lifecycle.phase(), RequestPhase::Received);

        assert!(lifecycle.advance(RequestPhase::Routed));
        assert!(!lifecycle.advance(RequestPhase::Received));
        assert!(lifecycle.fail());
        assert_eq!(lifecycle.phase(), RequestPhase::Failed);
        assert!(!lifecycle.advance(RequestPhase::Forwarding));
    }
}
