#![cfg_attr(not(feature = "std"), no_std)]

// 'alloc' is used for dynamic allocation (datagrams, pending queues, results)
extern crate alloc;

// --- Logging Macros (must come first) ---
#[macro_use]
pub mod logging;

// --- Foundation Modules ---
pub mod config;
pub mod hal;
pub mod types;

// --- Wire Level ---
pub mod command;
pub mod frame;
pub mod sequence;

// --- Transactions ---
pub mod chunk;
pub mod connection;
pub mod engine;
pub mod version;

// --- Top-level Exports ---
pub use command::{DataType, ProtocolError, ScpCommand, classify};
pub use config::ScpConfig;
pub use connection::ScpConnection;
pub use engine::{
    EngineStats, RequestHandle, RequestState, RequestSummary, ScpRequest, ScpResult,
    TransactionEngine,
};
pub use frame::{Codec, ScpPacket, SdpHeader};
pub use hal::{Clock, DatagramTransport, ScpError};
pub use types::{BoardCoord, CoreAddress};
pub use version::{BmpInfo, CoreInfo};
