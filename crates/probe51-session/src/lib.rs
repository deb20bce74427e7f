//! probe51 session protocol engine
//!
//! Drives an interactive MCS-51 monitor shell through its pseudo-terminal
//! and turns the raw, unframed output stream into typed, awaitable debugging
//! operations. Request/response correlation relies purely on arrival order
//! and the monitor's structural markers (prompt, echo, fixed-format dumps).

pub mod disasm;
pub mod error;
pub mod expect;
pub mod sanitize;
pub mod session;
pub mod status;
pub mod transport;
pub mod wire;

pub use disasm::Instruction;
pub use error::{Error, Result};
pub use session::{Session, SessionState};
pub use status::RegisterSnapshot;
pub use transport::{PtyTransport, Transport, TransportEvent};
