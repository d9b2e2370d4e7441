//! Frame replies from prompt/response devices by silence gaps.
//!
//! Modems, serial instruments and similar devices answer a prompt with a
//! burst of bytes and then go quiet. respframe reads such a burst as one
//! reply, bounded by an overall timeout for the first byte and a chunk
//! timeout for the gap that ends it.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix socket, TCP and serial port streams
//! - [`engine`]: the dual-timeout framing engine and its duplex adapters

/// Re-export transport types.
pub mod transport {
    pub use respframe_transport::*;
}

/// Re-export engine types.
pub mod engine {
    pub use respframe_engine::*;
}
