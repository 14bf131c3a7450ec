// crates/spinnaker-scp/src/frame/mod.rs
//! SDP/SCP wire codec.

pub mod codec;
pub mod scp;
pub mod sdp;

pub use codec::{Codec, CodecHelpers};
pub use scp::{MAX_SCP_ARGS, ScpPacket, decode_response, encode_request, peek_response};
pub use sdp::SdpHeader;
