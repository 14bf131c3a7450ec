//! Queries the software version of a core and dumps a block of its memory.
//!
//! Usage: `cargo run -p spinnaker-scp-udp --example read_sver -- <host> [x y p]`
//!
//! Set `RUST_LOG=debug` to see the individual SCP transactions.

use log::{error, info};
use spinnaker_scp::CoreAddress;
use spinnaker_scp_udp::{MachineConfig, MachineController};
use std::{env, process};

fn main() {
    env_logger::try_init().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(host) = args.first() else {
        eprintln!("usage: read_sver <host> [x y p]");
        process::exit(2);
    };
    let coords: Vec<u8> = args[1..].iter().filter_map(|a| a.parse().ok()).collect();
    let core = match coords.as_slice() {
        [] => Ok(CoreAddress::chip(0, 0)),
        [x, y, p] => CoreAddress::new(*x, *y, *p),
        _ => {
            eprintln!("expected three coordinates");
            process::exit(2);
        }
    };

    if let Err(e) = core.and_then(|core| run(host, core)) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(host: &str, core: CoreAddress) -> Result<(), spinnaker_scp::ScpError> {
    let mut mc = MachineController::connect(&MachineConfig::new(host))?;
    let info = mc.get_software_version(core)?;
    info!(
        "{} runs '{}' v{:.2} (buffer {} bytes)",
        core,
        info.version_string,
        info.version(),
        info.buffer_size
    );

    // The start of system SDRAM.
    let data = mc.read(core, 0x6000_0000, 64)?;
    for (i, line) in data.chunks(16).enumerate() {
        println!("{:#010x}: {:02x?}", 0x6000_0000 + i * 16, line);
    }
    info!("Engine statistics: {:?}", mc.connection().engine().stats());
    Ok(())
}
