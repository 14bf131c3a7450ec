// crates/spinnaker-scp/src/connection.rs
//! Blocking-style SCP operations on top of the transaction engine.
//!
//! [`ScpConnection`] drives a [`TransactionEngine`] with a [`Clock`] until the
//! requests it issued have resolved. Memory reads and writes are split into
//! packets no larger than the negotiated SCP data length and pipelined
//! through the engine's window.

use crate::chunk::{Chunk, ChunkPlan};
use crate::command::ScpCommand;
use crate::config::ScpConfig;
use crate::engine::{RequestHandle, ScpRequest, ScpResult, TransactionEngine};
use crate::frame::ScpPacket;
use crate::hal::{Clock, DatagramTransport, ScpError};
use crate::types::{CoreAddress, SCP_MAX_OVERHEAD};
use crate::version::CoreInfo;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

pub struct ScpConnection<T: DatagramTransport, C: Clock> {
    engine: TransactionEngine<T>,
    clock: C,
    scp_data_length: Option<usize>,
    version_probe: CoreAddress,
}

impl<T: DatagramTransport, C: Clock> ScpConnection<T, C> {
    pub fn new(transport: T, clock: C, config: ScpConfig) -> Result<Self, ScpError> {
        Ok(Self::from_engine(TransactionEngine::new(transport, config)?, clock))
    }

    /// Wraps an existing engine (for instance one with a custom sequence allocator).
    pub fn from_engine(engine: TransactionEngine<T>, clock: C) -> Self {
        Self {
            engine,
            clock,
            scp_data_length: None,
            version_probe: CoreAddress::chip(0, 0),
        }
    }

    /// Uses a known SCP data length instead of querying the machine for it.
    pub fn with_scp_data_length(mut self, length: usize) -> Self {
        self.set_scp_data_length(length);
        self
    }

    /// Core queried for the SCP data length. Defaults to (0, 0, 0).
    pub fn with_version_probe(mut self, core: CoreAddress) -> Self {
        self.version_probe = core;
        self
    }

    pub fn engine(&self) -> &TransactionEngine<T> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut TransactionEngine<T> {
        &mut self.engine
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Caches the SCP data length and grows the receive buffer to the
    /// smallest power of two that holds a full reply.
    pub fn set_scp_data_length(&mut self, length: usize) {
        self.scp_data_length = Some(length);
        self.engine
            .set_receive_length((length + SCP_MAX_OVERHEAD).next_power_of_two());
    }

    /// The largest data field the machine accepts per packet.
    ///
    /// Queried once with a software version request and cached afterwards.
    pub fn scp_data_length(&mut self) -> Result<usize, ScpError> {
        if let Some(length) = self.scp_data_length {
            return Ok(length);
        }
        let info = self.get_software_version(self.version_probe)?;
        let length = usize::from(info.buffer_size);
        scp_info!(self.version_probe, "negotiated SCP data length of {} bytes", length);
        self.set_scp_data_length(length);
        Ok(length)
    }

    /// Queues a request without waiting for it.
    pub fn submit(&mut self, request: ScpRequest) -> Result<RequestHandle, ScpError> {
        let now = self.clock.now_us();
        self.engine.submit(request, now)
    }

    /// Drives the engine until `handle` resolves.
    pub fn wait(&mut self, handle: RequestHandle) -> ScpResult {
        self.engine.run_until_resolved(&[handle], &self.clock);
        self.engine
            .take_result(handle)
            .unwrap_or(Err(ScpError::Cancelled))
    }

    /// Sends a single request and waits for its reply.
    pub fn send_scp(&mut self, request: ScpRequest) -> ScpResult {
        let handle = self.submit(request)?;
        self.wait(handle)
    }

    /// Sends a stream of requests, keeping the window full, and returns the
    /// replies in submission order.
    ///
    /// Requests are pulled from the iterator only when the window has room.
    /// On the first failure every other request of the burst is cancelled
    /// and that failure is returned.
    pub fn send_burst<I>(&mut self, requests: I) -> Result<Vec<ScpPacket>, ScpError>
    where
        I: IntoIterator<Item = ScpRequest>,
    {
        let window_size = self.engine.config().window_size;
        let mut requests = requests.into_iter();
        let mut replies: Vec<Option<ScpPacket>> = Vec::new();
        let mut unresolved: BTreeMap<RequestHandle, usize> = BTreeMap::new();
        let mut exhausted = false;

        loop {
            // Failures are collected before the window is topped up, so no
            // request is transmitted after an earlier one has failed.
            let finished: Vec<RequestHandle> = unresolved
                .keys()
                .copied()
                .filter(|h| self.engine.is_resolved(*h))
                .collect();
            for handle in finished {
                let Some(index) = unresolved.remove(&handle) else {
                    continue;
                };
                match self.engine.take_result(handle) {
                    Some(Ok(packet)) => replies[index] = Some(packet),
                    Some(Err(e)) => {
                        self.abandon(unresolved.keys());
                        return Err(e);
                    }
                    None => {
                        self.abandon(unresolved.keys());
                        return Err(ScpError::Cancelled);
                    }
                }
            }

            while !exhausted && self.engine.in_flight() + self.engine.pending_len() < window_size
            {
                let Some(request) = requests.next() else {
                    exhausted = true;
                    break;
                };
                match self.submit(request) {
                    Ok(handle) => {
                        unresolved.insert(handle, replies.len());
                        replies.push(None);
                        // Resolved on submission, e.g. by a failed send.
                        if self.engine.is_resolved(handle) {
                            break;
                        }
                    }
                    Err(e) => {
                        self.abandon(unresolved.keys());
                        return Err(e);
                    }
                }
            }

            if exhausted && unresolved.is_empty() {
                break;
            }
            if unresolved.keys().any(|h| self.engine.is_resolved(*h)) {
                continue;
            }
            if self.engine.in_flight() == 0 && self.engine.pending_len() == 0 {
                // Something outside this burst cancelled one of its requests.
                self.abandon(unresolved.keys());
                return Err(ScpError::Cancelled);
            }
            // Waits on this burst's requests and on any cancelled leftovers
            // still holding window slots.
            self.engine.step(&self.clock);
        }

        Ok(replies.into_iter().flatten().collect())
    }

    fn abandon<'a>(&mut self, handles: impl Iterator<Item = &'a RequestHandle>) {
        let handles: Vec<RequestHandle> = handles.copied().collect();
        for handle in handles {
            self.engine.cancel(handle);
        }
    }

    /// Reads the software version of a core.
    pub fn get_software_version(&mut self, core: CoreAddress) -> Result<CoreInfo, ScpError> {
        let reply = self.send_scp(ScpRequest::new(core, ScpCommand::Sver).with_expected_args(3))?;
        CoreInfo::from_packet(&reply)
    }

    /// Reads `length` bytes starting at `address` in the memory of `target`.
    pub fn read(
        &mut self,
        target: CoreAddress,
        address: u32,
        length: usize,
    ) -> Result<Vec<u8>, ScpError> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let chunks: Vec<Chunk> = ChunkPlan::new(address, length, self.scp_data_length()?).collect();
        scp_debug!(target, "reading {} bytes at {:#010x} in {} packets", length, address, chunks.len());

        let requests = chunks.iter().map(|chunk| {
            ScpRequest::new(target, ScpCommand::Read).with_args(
                Some(chunk.address),
                Some(chunk.length as u32),
                Some(chunk.data_type.into()),
            )
        });
        let replies = self.send_burst(requests)?;

        let mut data = vec![0u8; length];
        for (chunk, reply) in chunks.iter().zip(replies) {
            if reply.data.len() != chunk.length {
                return Err(ScpError::UnexpectedResponseLength {
                    expected: chunk.length,
                    actual: reply.data.len(),
                });
            }
            data[chunk.offset..chunk.offset + chunk.length].copy_from_slice(&reply.data);
        }
        Ok(data)
    }

    /// Writes `data` into the memory of `target` starting at `address`.
    pub fn write(&mut self, target: CoreAddress, address: u32, data: &[u8]) -> Result<(), ScpError> {
        if data.is_empty() {
            return Ok(());
        }
        let plan = ChunkPlan::new(address, data.len(), self.scp_data_length()?);
        scp_debug!(target, "writing {} bytes at {:#010x} in {} packets", data.len(), address, plan.len());

        let requests = plan.map(|chunk| {
            ScpRequest::new(target, ScpCommand::Write)
                .with_args(
                    Some(chunk.address),
                    Some(chunk.length as u32),
                    Some(chunk.data_type.into()),
                )
                .with_data(&data[chunk.offset..chunk.offset + chunk.length])
        });
        self.send_burst(requests)?;
        Ok(())
    }

    /// Cancels a request submitted with [`submit`](Self::submit).
    pub fn cancel(&mut self, handle: RequestHandle) -> bool {
        self.engine.cancel(handle)
    }

    /// Closes the connection, failing everything still queued or in flight.
    pub fn close(&mut self, reason: impl Into<String>) {
        self.engine.close(reason);
    }
}
