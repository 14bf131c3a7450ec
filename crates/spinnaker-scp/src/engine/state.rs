// crates/spinnaker-scp/src/engine/state.rs

/// Lifecycle of a request inside the transaction engine.
///
/// `Pending` requests wait for a window slot. `Sent` and `Retrying` occupy
/// one. The remaining states are terminal and hold until the result is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Accepted but not yet transmitted.
    Pending,
    /// Transmitted once, awaiting a reply.
    Sent,
    /// Retransmitted after a timeout; `attempt` counts transmissions so far.
    Retrying { attempt: u32 },
    /// Resolved with a successful reply.
    Acknowledged,
    /// Resolved with a failure reported by the remote end or detected locally.
    Rejected,
    /// Resolved after the retry budget ran out.
    TimedOut,
    /// Cancelled while in flight; the reply will be discarded.
    Cancelled,
    /// Resolved because the connection was closed.
    ConnectionClosed,
}

impl RequestState {
    /// Whether the request has resolved and its result awaits collection.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Acknowledged | Self::Rejected | Self::TimedOut | Self::ConnectionClosed
        )
    }
}
