// crates/spinnaker-scp/src/engine/mod.rs
//! The SCP transaction engine.
//!
//! A single-threaded reactor which owns a [`DatagramTransport`]. Requests are
//! queued with [`TransactionEngine::submit`], transmitted as soon as the
//! outstanding window has room, retransmitted on timeout and resolved exactly
//! once: with the decoded reply, a protocol error, a timeout, or
//! `ConnectionClosed`. Time is supplied by the caller in microseconds, either
//! directly (`on_datagram_received`, `poll_timeouts`) or through a [`Clock`]
//! (`step`, `run_until_resolved`).

mod request;
mod state;
mod stats;

pub use request::{RequestHandle, RequestSummary, ScpRequest};
pub use state::RequestState;
pub use stats::EngineStats;

use crate::command::classify;
use crate::config::ScpConfig;
use crate::frame::{ScpPacket, peek_response};
use crate::hal::{Clock, DatagramTransport, ScpError};
use crate::sequence::SequenceAllocator;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::mem;

/// The outcome of a request.
pub type ScpResult = Result<ScpPacket, ScpError>;

#[derive(Debug)]
struct PendingRequest {
    handle: RequestHandle,
    request: ScpRequest,
}

#[derive(Debug)]
struct OutstandingRequest {
    handle: RequestHandle,
    summary: RequestSummary,
    datagram: Vec<u8>,
    expected_args: u8,
    attempts: u32,
    timeout_us: u64,
    deadline_us: u64,
    cancelled: bool,
}

pub struct TransactionEngine<T: DatagramTransport> {
    transport: T,
    config: ScpConfig,
    sequence: SequenceAllocator,
    next_handle: u64,
    pending: VecDeque<PendingRequest>,
    outstanding: BTreeMap<u16, OutstandingRequest>,
    states: BTreeMap<RequestHandle, RequestState>,
    results: BTreeMap<RequestHandle, ScpResult>,
    closed: Option<String>,
    receive_buffer: Vec<u8>,
    stats: EngineStats,
}

impl<T: DatagramTransport> TransactionEngine<T> {
    pub fn new(transport: T, config: ScpConfig) -> Result<Self, ScpError> {
        Self::with_sequence(transport, config, SequenceAllocator::default())
    }

    /// Creates an engine whose sequence numbers come from `sequence`.
    pub fn with_sequence(
        transport: T,
        config: ScpConfig,
        sequence: SequenceAllocator,
    ) -> Result<Self, ScpError> {
        config.validate()?;
        Ok(Self {
            transport,
            receive_buffer: vec![0u8; config.receive_length],
            config,
            sequence,
            next_handle: 0,
            pending: VecDeque::new(),
            outstanding: BTreeMap::new(),
            states: BTreeMap::new(),
            results: BTreeMap::new(),
            closed: None,
            stats: EngineStats::default(),
        })
    }

    pub fn config(&self) -> &ScpConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Number of requests currently holding a window slot.
    pub fn in_flight(&self) -> usize {
        self.outstanding.len()
    }

    /// Number of requests waiting for a window slot.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    pub fn close_reason(&self) -> Option<&str> {
        self.closed.as_deref()
    }

    /// Grows the receive buffer to at least `length` bytes.
    pub fn set_receive_length(&mut self, length: usize) {
        if length > self.receive_buffer.len() {
            self.receive_buffer.resize(length, 0);
        }
    }

    pub fn receive_length(&self) -> usize {
        self.receive_buffer.len()
    }

    /// Queues a request, transmitting it immediately if the window has room.
    pub fn submit(&mut self, request: ScpRequest, now_us: u64) -> Result<RequestHandle, ScpError> {
        if let Some(reason) = &self.closed {
            return Err(ScpError::ConnectionClosed(reason.clone()));
        }
        request.validate()?;

        let handle = RequestHandle(self.next_handle);
        self.next_handle += 1;
        self.states.insert(handle, RequestState::Pending);
        self.pending.push_back(PendingRequest { handle, request });
        self.process_queue(now_us);
        Ok(handle)
    }

    /// Current state of `handle`, or `None` once its result has been taken
    /// (or it was cancelled before transmission).
    pub fn state(&self, handle: RequestHandle) -> Option<RequestState> {
        self.states.get(&handle).copied()
    }

    pub fn is_resolved(&self, handle: RequestHandle) -> bool {
        self.results.contains_key(&handle)
    }

    /// Whether the caller has nothing left to wait for on `handle`.
    pub fn is_settled(&self, handle: RequestHandle) -> bool {
        match self.states.get(&handle) {
            None | Some(RequestState::Cancelled) => true,
            Some(state) => state.is_terminal(),
        }
    }

    /// Removes and returns the result of a resolved request.
    pub fn take_result(&mut self, handle: RequestHandle) -> Option<ScpResult> {
        let result = self.results.remove(&handle)?;
        self.states.remove(&handle);
        Some(result)
    }

    /// The earliest retransmission deadline among outstanding requests.
    pub fn next_deadline(&self) -> Option<u64> {
        self.outstanding.values().map(|o| o.deadline_us).min()
    }

    /// Cancels a request. Returns `false` if the handle is unknown.
    ///
    /// A pending request is dropped without being transmitted. A request in
    /// flight keeps its window slot until its reply or timeout arrives, and
    /// the outcome is then discarded. A resolved but untaken result is dropped.
    pub fn cancel(&mut self, handle: RequestHandle) -> bool {
        if let Some(index) = self.pending.iter().position(|p| p.handle == handle) {
            if let Some(p) = self.pending.remove(index) {
                scp_debug!(p.request.summary(), "cancelled before transmission");
            }
            self.states.remove(&handle);
            self.stats.cancelled += 1;
            return true;
        }
        if let Some(entry) = self
            .outstanding
            .values_mut()
            .find(|o| o.handle == handle && !o.cancelled)
        {
            entry.cancelled = true;
            self.states.insert(handle, RequestState::Cancelled);
            self.stats.cancelled += 1;
            scp_debug!(entry.summary, "cancelled while in flight");
            return true;
        }
        if self.results.remove(&handle).is_some() {
            self.states.remove(&handle);
            return true;
        }
        false
    }

    /// Closes the engine. Every pending and in-flight request resolves with
    /// `ConnectionClosed(reason)` and later submissions fail the same way.
    pub fn close(&mut self, reason: impl Into<String>) {
        if self.closed.is_some() {
            return;
        }
        let reason = reason.into();
        scp_info!("Closing SCP connection: {}", reason);
        self.closed = Some(reason.clone());

        for p in mem::take(&mut self.pending) {
            self.resolve(
                p.handle,
                Err(ScpError::ConnectionClosed(reason.clone())),
                RequestState::ConnectionClosed,
            );
        }
        for (_, o) in mem::take(&mut self.outstanding) {
            if o.cancelled {
                self.states.remove(&o.handle);
            } else {
                self.resolve(
                    o.handle,
                    Err(ScpError::ConnectionClosed(reason.clone())),
                    RequestState::ConnectionClosed,
                );
            }
        }
    }

    /// Handles one received datagram.
    ///
    /// Malformed datagrams and replies matching no outstanding request are
    /// counted and dropped.
    pub fn on_datagram_received(&mut self, datagram: &[u8], now_us: u64) {
        let (rc, seq) = match peek_response(datagram) {
            Ok(fields) => fields,
            Err(_) => {
                self.stats.malformed_datagrams += 1;
                scp_debug!("Ignoring malformed {}-byte datagram", datagram.len());
                return;
            }
        };
        let Some(entry) = self.outstanding.remove(&seq) else {
            self.stats.stray_replies += 1;
            scp_debug!("Ignoring reply with unknown sequence number {}", seq);
            return;
        };

        if entry.cancelled {
            scp_debug!(entry.summary, "seq={} discarding reply to cancelled request", seq);
            self.states.remove(&entry.handle);
        } else {
            scp_trace!(entry.summary, "seq={} received {} bytes, rc={:#04x}", seq, datagram.len(), rc);
            let (result, state) = match classify(rc) {
                Some(error) => {
                    self.stats.nacks += 1;
                    scp_warn!(entry.summary, "seq={} rejected: {}", seq, error);
                    (
                        Err(ScpError::Response {
                            error,
                            request: entry.summary,
                        }),
                        RequestState::Rejected,
                    )
                }
                None => match ScpPacket::decode(datagram, entry.expected_args) {
                    Ok(packet) => {
                        self.stats.acknowledged += 1;
                        (Ok(packet), RequestState::Acknowledged)
                    }
                    Err(e) => (Err(e), RequestState::Rejected),
                },
            };
            self.resolve(entry.handle, result, state);
        }
        self.process_queue(now_us);
    }

    /// Runs [`on_timeout`](Self::on_timeout) for every request whose deadline has passed.
    pub fn poll_timeouts(&mut self, now_us: u64) {
        let expired: Vec<u16> = self
            .outstanding
            .iter()
            .filter(|(_, o)| o.deadline_us <= now_us)
            .map(|(seq, _)| *seq)
            .collect();
        for seq in expired {
            self.on_timeout(seq, now_us);
        }
    }

    /// Handles the reply timer of `seq` expiring: retransmits the identical
    /// datagram, or fails the request once `n_tries` transmissions were made.
    pub fn on_timeout(&mut self, seq: u16, now_us: u64) {
        let n_tries = self.config.n_tries;
        let Some(entry) = self.outstanding.get_mut(&seq) else {
            return;
        };

        if entry.cancelled {
            let handle = entry.handle;
            self.outstanding.remove(&seq);
            self.states.remove(&handle);
        } else if entry.attempts >= n_tries {
            let attempts = entry.attempts;
            let handle = entry.handle;
            let summary = entry.summary;
            self.outstanding.remove(&seq);
            self.stats.timeouts += 1;
            scp_error!(summary, "seq={} no reply after {} attempts", seq, attempts);
            self.resolve(
                handle,
                Err(ScpError::Timeout {
                    attempts,
                    request: summary,
                }),
                RequestState::TimedOut,
            );
        } else {
            entry.attempts += 1;
            entry.deadline_us = now_us.saturating_add(entry.timeout_us);
            let attempt = entry.attempts;
            let handle = entry.handle;
            scp_warn!(entry.summary, "seq={} timed out, retransmitting (attempt {}/{})", seq, attempt, n_tries);
            let sent = self.transport.send_datagram(&entry.datagram);
            self.stats.retransmissions += 1;
            self.states.insert(handle, RequestState::Retrying { attempt });
            if let Err(e) = sent {
                scp_error!("Fatal transport error on retransmission: {}", e);
                self.close(e.to_string());
                return;
            }
        }
        self.process_queue(now_us);
    }

    /// One reactor iteration: expires timers, then waits for replies until
    /// the earliest deadline, draining every datagram already queued.
    pub fn step<C: Clock>(&mut self, clock: &C) {
        let now = clock.now_us();
        self.poll_timeouts(now);
        let Some(deadline) = self.next_deadline() else {
            return;
        };

        let mut wait_us = deadline.saturating_sub(now);
        let mut buffer = mem::take(&mut self.receive_buffer);
        loop {
            match self.transport.receive_datagram(&mut buffer, wait_us) {
                Ok(Some(length)) => {
                    let length = length.min(buffer.len());
                    self.on_datagram_received(&buffer[..length], clock.now_us());
                    if self.outstanding.is_empty() {
                        break;
                    }
                    wait_us = 0;
                }
                Ok(None) => break,
                Err(e) => {
                    scp_error!("Fatal transport error while receiving: {}", e);
                    self.close(e.to_string());
                    break;
                }
            }
        }
        self.receive_buffer = buffer;
        self.poll_timeouts(clock.now_us());
    }

    /// Steps the engine until every handle in `handles` is settled or no
    /// further progress is possible.
    pub fn run_until_resolved<C: Clock>(&mut self, handles: &[RequestHandle], clock: &C) {
        while !handles.iter().all(|h| self.is_settled(*h)) {
            if self.outstanding.is_empty() && self.pending.is_empty() {
                break;
            }
            self.step(clock);
        }
    }

    /// Transmits queued requests while the window has room.
    fn process_queue(&mut self, now_us: u64) {
        while self.closed.is_none() && self.outstanding.len() < self.config.window_size {
            let Some(next) = self.pending.pop_front() else {
                break;
            };
            self.transmit(next, now_us);
        }
    }

    fn transmit(&mut self, pending: PendingRequest, now_us: u64) {
        let PendingRequest { handle, request } = pending;
        let summary = request.summary();
        let seq = self.sequence.next();
        if self.outstanding.contains_key(&seq) {
            scp_error!(summary, "sequence number {} is still outstanding", seq);
            self.resolve(
                handle,
                Err(ScpError::SequenceCollision(seq)),
                RequestState::Rejected,
            );
            return;
        }

        let datagram = request.encode(seq);
        let timeout_us = self.config.timeout_us.saturating_add(request.additional_timeout_us);
        scp_trace!(summary, "seq={} transmitting {} bytes", seq, datagram.len());
        let sent = self.transport.send_datagram(&datagram);
        self.outstanding.insert(
            seq,
            OutstandingRequest {
                handle,
                summary,
                datagram,
                expected_args: request.expected_args,
                attempts: 1,
                timeout_us,
                deadline_us: now_us.saturating_add(timeout_us),
                cancelled: false,
            },
        );
        self.states.insert(handle, RequestState::Sent);
        self.stats.transmissions += 1;

        if let Err(e) = sent {
            scp_error!(summary, "fatal transport error: {}", e);
            self.close(e.to_string());
        }
    }

    fn resolve(&mut self, handle: RequestHandle, result: ScpResult, state: RequestState) {
        self.states.insert(handle, state);
        self.results.insert(handle, result);
    }
}
