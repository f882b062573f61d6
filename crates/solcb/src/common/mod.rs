//! Common infrastructure shared by the bridge, linker and translator

mod error;
mod fatal;

pub use error::{BridgeError, BridgeResult};
pub use fatal::{FatalError, format_fatal_error};
