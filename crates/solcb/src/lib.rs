//! solcb - a stable interface over binary-distributed Solidity compilers
//!
//! Compiler modules built from different solc releases export different
//! entry points, calling conventions and output layouts. This library hides
//! those differences behind one standard JSON interface.
//!
//! ## Architecture
//!
//! - **Module** (`module/`): the loaded compiler module and capability detection
//! - **Bridge** (`bridge/`): typed calls, string marshaling, the callback trampoline
//! - **Compile** (`compile/`): entry point selection and request orchestration
//! - **Linker** (`linker/`): library placeholder linking and reference discovery
//! - **Translate** (`translate/`): legacy output normalization, assembly printing
//! - **Common** (`common/`): error types and the fatal error document

pub mod bridge;
pub mod common;
pub mod compile;
pub mod linker;
pub mod module;
pub mod translate;

// Re-exports for convenience
pub use bridge::{AbiBridge, CallbackResult, CallbackSet};
pub use common::{BridgeError, BridgeResult, FatalError, format_fatal_error};
pub use compile::{CompileStrategy, Features, Solc, SolcConfig};
pub use linker::{LibraryAddressMap, LinkReference, find_link_references, link_bytecode};
pub use module::{CapabilityFlags, CompilerModule, EntryPoint, ModuleMemory};
pub use translate::{NormalizedOutput, pretty_print_legacy_assembly, translate_output, version_to_semver};
