//! Transport layer for the PSEM protocol
//!
//! Provides the duplex byte-channel abstraction the session layer speaks
//! through, plus serial and TCP implementations. Link framing and CRC are
//! handled below this boundary (optical probe head, RF head-end, or
//! gateway): one `send` carries one complete service request, one `receive`
//! yields one complete service response.

pub mod serial;
pub mod stream;
pub mod tcp;

pub use serial::{SerialSettings, SerialTransport};
pub use stream::Transport;
pub use tcp::{TcpSettings, TcpTransport};
