// crates/spinnaker-scp/src/engine/stats.rs

/// Running counters of a transaction engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineStats {
    /// First transmissions of a request.
    pub transmissions: u64,
    /// Retransmissions after a timeout.
    pub retransmissions: u64,
    /// Requests resolved with an OK reply.
    pub acknowledged: u64,
    /// Requests rejected with a non-OK return code.
    pub nacks: u64,
    /// Requests which exhausted their retry budget.
    pub timeouts: u64,
    /// Replies whose sequence number matched nothing outstanding.
    pub stray_replies: u64,
    /// Datagrams too short to carry an SCP header.
    pub malformed_datagrams: u64,
    /// Requests cancelled by the caller.
    pub cancelled: u64,
}
