// crates/spinnaker-scp-udp/tests/loopback_test.rs
//! Drives the UDP controllers against a fake machine on the loopback interface.

use spinnaker_scp::{
    BoardCoord, CoreAddress, ProtocolError, ScpCommand, ScpConfig, ScpError, ScpPacket,
    ScpRequest, SdpHeader,
};
use spinnaker_scp_udp::{
    AppSignal, BmpController, BmpEndpoint, MachineConfig, MachineController, ScpWorker,
};
use std::collections::HashMap;
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const SDRAM_BASE: u32 = 0x6100_0000;

#[derive(Default)]
struct FakeState {
    memory: HashMap<(u8, u8, u32), u8>,
    iptags: HashMap<u8, (Ipv4Addr, u16)>,
    requests: Vec<ScpPacket>,
    next_alloc: u32,
    silent: bool,
}

/// A SpiNNaker chip (or BMP) answering SCP on a loopback UDP port.
struct FakeMachine {
    port: u16,
    state: Arc<Mutex<FakeState>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FakeMachine {
    fn start() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let port = socket.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(FakeState::default()));
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let state = Arc::clone(&state);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut buffer = [0u8; 2048];
                while !stop.load(Ordering::Relaxed) {
                    let Ok((length, peer)) = socket.recv_from(&mut buffer) else {
                        continue;
                    };
                    let Ok(request) = ScpPacket::decode(&buffer[..length], 3) else {
                        continue;
                    };
                    let reply = respond(&mut state.lock().unwrap(), request);
                    if let Some(reply) = reply {
                        socket.send_to(&reply.to_bytes(), peer).unwrap();
                    }
                }
            })
        };

        Self {
            port,
            state,
            stop,
            thread: Some(thread),
        }
    }

    fn config(&self) -> ScpConfig {
        ScpConfig::default()
            .with_port(self.port)
            .with_timeout_us(200_000)
            .with_n_tries(3)
    }

    fn requests(&self) -> Vec<ScpPacket> {
        self.state.lock().unwrap().requests.clone()
    }

    fn last_request(&self) -> ScpPacket {
        self.requests().pop().expect("no request received")
    }
}

impl Drop for FakeMachine {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn respond(state: &mut FakeState, request: ScpPacket) -> Option<ScpPacket> {
    state.requests.push(request.clone());
    if state.silent {
        return None;
    }
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
        .unwrap(),
        cmd_rc: 0x80,
        seq: request.seq,
        arg1: None,
        arg2: None,
        arg3: None,
        data: Vec::new(),
    };
    let arg = |a: Option<u32>| a.unwrap_or(0);

    match ScpCommand::try_from(request.cmd_rc) {
        Ok(ScpCommand::Sver) => {
            reply.arg1 = Some((u32::from(target.x) << 24) | (u32::from(target.y) << 16) | (u32::from(target.p) << 8) | u32::from(target.p));
            reply.arg2 = Some((211 << 16) | 256);
            reply.arg3 = Some(1_500_000_000);
            reply.data = b"SC&MP/SpiNNaker\0".to_vec();
        }
        Ok(ScpCommand::Read) => {
            let address = arg(request.arg1);
            reply.data = (0..arg(request.arg2))
                .map(|i| *state.memory.get(&(target.x, target.y, address + i)).unwrap_or(&0))
                .collect();
        }
        Ok(ScpCommand::Write) => {
            let address = arg(request.arg1);
            let length = arg(request.arg2) as usize;
            for (i, byte) in request.data.iter().take(length).enumerate() {
                state.memory.insert((target.x, target.y, address + i as u32), *byte);
            }
        }
        Ok(ScpCommand::Iptag) => {
            let tag = (arg(request.arg1) & 0xff) as u8;
            match arg(request.arg1) >> 16 {
                1 => {
                    let addr = Ipv4Addr::from(arg(request.arg3).to_le_bytes());
                    state.iptags.insert(tag, (addr, arg(request.arg2) as u16));
                }
                2 => {
                    let (addr, port) = state.iptags.get(&tag).copied().unwrap_or((Ipv4Addr::UNSPECIFIED, 0));
                    let mut data = addr.octets().to_vec();
                    data.extend_from_slice(&[0; 6]);
                    data.extend_from_slice(&port.to_le_bytes());
                    data.extend_from_slice(&[0; 13]);
                    reply.data = data;
                }
                _ => {
                    state.iptags.remove(&tag);
                }
            }
        }
        Ok(ScpCommand::AllocFree) => {
            if arg(request.arg1) & 0xff == 0 {
                let size = arg(request.arg2);
                reply.arg1 = Some(if size == 0 {
                    0
                } else {
                    let address = SDRAM_BASE + state.next_alloc;
                    state.next_alloc += size;
                    address
                });
            }
        }
        Ok(ScpCommand::Led | ScpCommand::Signal | ScpCommand::Power) => {}
        _ => reply.cmd_rc = 0x83,
    }
    Some(reply)
}

fn controller(fake: &FakeMachine) -> MachineController {
    let mut config = MachineConfig::new("127.0.0.1");
    config.scp = fake.config();
    MachineController::connect(&config).unwrap()
}

fn pattern(length: usize) -> Vec<u8> {
    (0..length).map(|i| (i as u8).wrapping_mul(7).wrapping_add(3)).collect()
}

#[test]
fn test_software_version_over_udp() {
    let fake = FakeMachine::start();
    let mut mc = controller(&fake);

    let info = mc.get_software_version(CoreAddress::new(1, 2, 3).unwrap()).unwrap();
    assert_eq!(info.position, (1, 2));
    assert_eq!(info.physical_cpu, 3);
    assert_eq!(info.version_hundredths, 211);
    assert_eq!(info.buffer_size, 256);
    assert_eq!(info.version_string, "SC&MP/SpiNNaker");
}

#[test]
fn test_write_then_read_spans_several_packets() {
    let fake = FakeMachine::start();
    let mut mc = controller(&fake);
    let core = CoreAddress::chip(0, 1);
    let data = pattern(700);

    mc.write(core, 0x6000_0001, &data).unwrap();
    assert_eq!(mc.read(core, 0x6000_0001, data.len()).unwrap(), data);
    assert_eq!(mc.scp_data_length().unwrap(), 256);

    // One sver probe, then three write and three read chunks.
    let commands: Vec<u16> = fake.requests().iter().map(|r| r.cmd_rc).collect();
    assert_eq!(commands.iter().filter(|c| **c == ScpCommand::Write as u16).count(), 3);
    assert_eq!(commands.iter().filter(|c| **c == ScpCommand::Read as u16).count(), 3);
}

#[test]
fn test_set_led_encodes_actions() {
    let fake = FakeMachine::start();
    let mut mc = controller(&fake);

    mc.set_led(CoreAddress::chip(2, 3), &[0, 1], Some(true)).unwrap();
    let request = fake.last_request();
    assert_eq!(request.cmd_rc, ScpCommand::Led as u16);
    assert_eq!(request.arg1, Some(0b1111));
    assert_eq!(request.header.destination(), CoreAddress::chip(2, 3));
}

#[test]
fn test_iptag_set_get_clear() {
    let fake = FakeMachine::start();
    let mut mc = controller(&fake);
    let chip = CoreAddress::chip(0, 0);
    let addr = Ipv4Addr::new(10, 0, 0, 42);

    mc.iptag_set(chip, 1, addr, 50000).unwrap();
    let tag = mc.iptag_get(chip, 1).unwrap();
    assert_eq!(tag.addr, addr);
    assert_eq!(tag.port, 50000);

    mc.iptag_clear(chip, 1).unwrap();
    assert_eq!(mc.iptag_get(chip, 1).unwrap().addr, Ipv4Addr::UNSPECIFIED);
}

#[test]
fn test_sdram_alloc_and_free() {
    let fake = FakeMachine::start();
    let mut mc = controller(&fake);
    let chip = CoreAddress::chip(1, 1);

    let first = mc.sdram_alloc(chip, 1024, 0, 30).unwrap();
    let second = mc.sdram_alloc(chip, 64, 5, 30).unwrap();
    assert_eq!(first, SDRAM_BASE);
    assert_eq!(second, SDRAM_BASE + 1024);

    let request = fake.last_request();
    assert_eq!(request.arg1, Some(30 << 8));
    assert_eq!(request.arg2, Some(64));
    assert_eq!(request.arg3, Some(5));

    assert_eq!(
        mc.sdram_alloc(chip, 0, 7, 30),
        Err(ScpError::SdramAllocationFailed {
            size: 0,
            x: 1,
            y: 1,
            tag: 7
        })
    );

    mc.sdram_free(chip, first).unwrap();
    let request = fake.last_request();
    assert_eq!(request.arg1, Some(1));
    assert_eq!(request.arg2, Some(first));
}

#[test]
fn test_send_signal() {
    let fake = FakeMachine::start();
    let mut mc = controller(&fake);

    mc.send_signal(AppSignal::Start, 16).unwrap();
    let request = fake.last_request();
    assert_eq!(request.cmd_rc, ScpCommand::Signal as u16);
    assert_eq!(request.arg1, Some(2));
    assert_eq!(request.arg2, Some((3 << 16) | 0xff00 | 16));
    assert_eq!(request.arg3, Some(0xffff));

    mc.send_signal(AppSignal::Usr1, 16).unwrap();
    assert_eq!(fake.last_request().arg1, Some(0));
}

#[test]
fn test_unknown_command_is_rejected() {
    let fake = FakeMachine::start();
    let mut mc = controller(&fake);

    let result = mc.send_scp(ScpRequest::new(CoreAddress::chip(0, 0), 99u16));
    match result {
        Err(ScpError::Response { error, request }) => {
            assert_eq!(error, ProtocolError::InvalidCommand);
            assert_eq!(request.cmd, 99);
        }
        other => panic!("expected a protocol error, got {other:?}"),
    }
}

#[test]
fn test_silent_machine_times_out() {
    let fake = FakeMachine::start();
    fake.state.lock().unwrap().silent = true;
    let mut config = MachineConfig::new("127.0.0.1");
    config.scp = fake.config().with_timeout_us(20_000).with_n_tries(2);
    config.scp_data_length = Some(256);
    let mut mc = MachineController::connect(&config).unwrap();

    let result = mc.set_led(CoreAddress::chip(0, 0), &[0], None);
    assert!(matches!(result, Err(ScpError::Timeout { attempts: 2, .. })));
    assert_eq!(fake.requests().len(), 2);
}

#[test]
fn test_worker_serves_many_threads() {
    let fake = FakeMachine::start();
    let connection = spinnaker_scp_udp::connect("127.0.0.1", fake.config().with_window_size(4)).unwrap();
    let worker = ScpWorker::spawn(connection).unwrap();

    thread::scope(|s| {
        for t in 0..4u32 {
            let worker = &worker;
            s.spawn(move || {
                let core = CoreAddress::chip(0, 0);
                let address = 0x6000_0000 + t * 0x1000;
                let data = vec![t as u8; 300];
                worker.write(core, address, data.clone()).unwrap();
                assert_eq!(worker.read(core, address, data.len()).unwrap(), data);
            });
        }
    });

    let info = worker.get_software_version(CoreAddress::chip(0, 0)).unwrap();
    assert_eq!(info.version_string, "SC&MP/SpiNNaker");
    worker.shutdown();
}

#[test]
fn test_bmp_controller() {
    let fake = FakeMachine::start();
    let endpoints = [BmpEndpoint {
        host: "127.0.0.1".into(),
        cabinet: 0,
        frame: 0,
        board: None,
    }];
    let mut bmp = BmpController::connect(&endpoints, fake.config()).unwrap();

    let info = bmp.get_software_version(BoardCoord::new(0, 0, 3)).unwrap();
    assert_eq!(info.board_id, 3);
    assert_eq!(fake.last_request().header.destination(), CoreAddress { x: 0, y: 0, p: 3 });

    bmp.set_power(0, 0, &[0, 2], true, Duration::from_millis(10)).unwrap();
    let request = fake.last_request();
    assert_eq!(request.cmd_rc, ScpCommand::Power as u16);
    assert_eq!(request.arg1, Some((10 << 16) | 1));
    assert_eq!(request.arg2, Some(0b101));

    bmp.set_led(0, 0, &[1], &[7], Some(false)).unwrap();
    let request = fake.last_request();
    assert_eq!(request.arg1, Some(2 << 14));
    assert_eq!(request.arg2, Some(0b10));
    assert_eq!(request.header.destination(), CoreAddress { x: 0, y: 0, p: 1 });

    assert_eq!(
        bmp.get_software_version(BoardCoord::new(1, 0, 0)),
        Err(ScpError::UnknownBoard(BoardCoord::new(1, 0, 0)))
    );
    assert!(matches!(
        bmp.set_power(0, 0, &[], false, Duration::ZERO),
        Err(ScpError::InvalidConfig(_))
    ));
}
