// crates/spinnaker-scp/tests/simulator/machine.rs
use super::ManualClock;
use spinnaker_scp::frame::{SdpHeader, peek_response};
use spinnaker_scp::{Clock, DatagramTransport, ScpCommand, ScpError, ScpPacket};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Rejects matching requests with a non-OK return code.
#[derive(Debug, Clone, Copy)]
pub struct NackRule {
    pub command: u16,
    /// Only reject requests whose first argument equals this value.
    pub arg1: Option<u32>,
    pub rc: u16,
}

#[derive(Debug)]
struct Reply {
    deliver_at_us: u64,
    seq: u16,
    bytes: Vec<u8>,
}

/// An in-memory SpiNNaker machine behind the datagram transport trait.
///
/// Requests are answered after `latency_us` of simulated time. Waiting for a
/// reply advances the shared [`ManualClock`], so timeouts play out without
/// real sleeps.
pub struct SimulatedMachine {
    clock: ManualClock,
    memory: HashMap<(u8, u8, u32), u8>,
    replies: VecDeque<Reply>,
    /// Sequence numbers received but not yet answered.
    unanswered: BTreeSet<u16>,
    /// Every datagram the host transmitted, in order.
    pub sent: Vec<Vec<u8>>,
    pub latency_us: u64,
    /// Number of upcoming requests to drop without reply.
    pub drop_next: usize,
    /// Never reply to anything.
    pub silent: bool,
    /// Reply to every request twice.
    pub duplicate_replies: bool,
    /// Deliver the most recent reply first.
    pub reverse_replies: bool,
    pub nack: Option<NackRule>,
    /// SCP buffer size advertised in sver replies.
    pub buffer_size: u16,
    /// Garbage datagrams delivered before the next reply.
    pub junk: VecDeque<Vec<u8>>,
    /// Makes the next receive fail fatally.
    pub fail_receive: Option<String>,
    /// Largest number of requests awaiting a reply at once.
    pub max_unanswered: usize,
    /// Set if a new request reused the sequence number of an unanswered one.
    pub sequence_collision: bool,
}

impl SimulatedMachine {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            memory: HashMap::new(),
            replies: VecDeque::new(),
            unanswered: BTreeSet::new(),
            sent: Vec::new(),
            latency_us: 100,
            drop_next: 0,
            silent: false,
            duplicate_replies: false,
            reverse_replies: false,
            nack: None,
            buffer_size: 256,
            junk: VecDeque::new(),
            fail_receive: None,
            max_unanswered: 0,
            sequence_collision: false,
        }
    }

    pub fn poke(&mut self, x: u8, y: u8, address: u32, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.memory.insert((x, y, address + i as u32), *byte);
        }
    }

    pub fn peek(&self, x: u8, y: u8, address: u32, length: usize) -> Vec<u8> {
        (0..length)
            .map(|i| *self.memory.get(&(x, y, address + i as u32)).unwrap_or(&0))
            .collect()
    }

    /// Requests the host sent, decoded with three arguments.
    pub fn sent_requests(&self) -> Vec<ScpPacket> {
        self.sent
            .iter()
            .map(|d| ScpPacket::decode(d, 3).expect("host sent a malformed datagram"))
            .collect()
    }

    pub fn transmissions_of(&self, seq: u16) -> usize {
        self.sent
            .iter()
            .filter(|d| peek_response(d).map(|(_, s)| s) == Ok(seq))
            .count()
    }

    fn respond(&mut self, request: &ScpPacket) -> Option<ScpPacket> {
        let target = request.header.destination();
        let mut reply = ScpPacket {
            header: SdpHeader::new(
                false,
                0,
                request.header.src_port,
                request.header.src_cpu,
                0,
                target.p,
                (request.header.src_x, request.header.src_y),
                (target.x, target.y),
            )
            .expect("reply header"),
            cmd_rc: 0x80,
            seq: request.seq,
            arg1: None,
            arg2: None,
            arg3: None,
            data: Vec::new(),
        };

        if let Some(rule) = self.nack {
            if rule.command == request.cmd_rc && rule.arg1.is_none_or(|a| Some(a) == request.arg1) {
                reply.cmd_rc = rule.rc;
                return Some(reply);
            }
        }

        match ScpCommand::try_from(request.cmd_rc) {
            Ok(ScpCommand::Sver) => {
                let p2p = (u32::from(target.x) << 8) | u32::from(target.y);
                reply.arg1 = Some((p2p << 16) | (u32::from(target.p) << 8) | u32::from(target.p));
                reply.arg2 = Some((128 << 16) | u32::from(self.buffer_size));
                reply.arg3 = Some(1_400_000_000);
                reply.data = b"SC&MP/SpiNNaker\0".to_vec();
            }
            Ok(ScpCommand::Read) => {
                let address = request.arg1.unwrap_or(0);
                let length = request.arg2.unwrap_or(0) as usize;
                reply.data = self.peek(target.x, target.y, address, length);
            }
            Ok(ScpCommand::Write) => {
                let address = request.arg1.unwrap_or(0);
                let length = request.arg2.unwrap_or(0) as usize;
                // Arguments beyond the declared three belong to the payload.
                let payload = request.data[..length.min(request.data.len())].to_vec();
                self.poke(target.x, target.y, address, &payload);
            }
            _ => {}
        }
        Some(reply)
    }
}

impl DatagramTransport for SimulatedMachine {
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<(), ScpError> {
        self.sent.push(datagram.to_vec());
        let request = ScpPacket::decode(datagram, 3)?;

        let retransmission = self.sent[..self.sent.len() - 1]
            .iter()
            .rev()
            .find(|d| peek_response(d).map(|(_, s)| s) == Ok(request.seq))
            .is_some_and(|d| d.as_slice() == datagram);
        if self.unanswered.contains(&request.seq) && !retransmission {
            self.sequence_collision = true;
        }
        self.unanswered.insert(request.seq);
        self.max_unanswered = self.max_unanswered.max(self.unanswered.len());

        if self.silent {
            return Ok(());
        }
        if self.drop_next > 0 {
            self.drop_next -= 1;
            return Ok(());
        }
        if let Some(reply) = self.respond(&request) {
            let copies = if self.duplicate_replies { 2 } else { 1 };
            for _ in 0..copies {
                let entry = Reply {
                    deliver_at_us: self.clock.now_us() + self.latency_us,
                    seq: reply.seq,
                    bytes: reply.to_bytes(),
                };
                if self.reverse_replies {
                    self.replies.push_front(entry);
                } else {
                    self.replies.push_back(entry);
                }
            }
        }
        Ok(())
    }

    fn receive_datagram(
        &mut self,
        buffer: &mut [u8],
        timeout_us: u64,
    ) -> Result<Option<usize>, ScpError> {
        if let Some(reason) = self.fail_receive.take() {
            return Err(ScpError::Io(reason));
        }
        if let Some(junk) = self.junk.pop_front() {
            buffer[..junk.len()].copy_from_slice(&junk);
            return Ok(Some(junk.len()));
        }

        let now = self.clock.now_us();
        match self.replies.front() {
            Some(reply) if reply.deliver_at_us <= now + timeout_us => {
                if reply.deliver_at_us > now {
                    self.clock.set(reply.deliver_at_us);
                }
            }
            _ => {
                self.clock.advance(timeout_us);
                return Ok(None);
            }
        }
        let Some(reply) = self.replies.pop_front() else {
            return Ok(None);
        };
        self.unanswered.remove(&reply.seq);
        let length = reply.bytes.len().min(buffer.len());
        buffer[..length].copy_from_slice(&reply.bytes[..length]);
        Ok(Some(length))
    }
}
