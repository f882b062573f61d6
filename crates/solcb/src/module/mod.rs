//! The compiler module boundary
//!
//! A compiler module is a loaded native artifact (usually an Emscripten build
//! of solc) that owns a linear memory, an export table and an indirect
//! function table. Loading it is somebody else's job; this module only
//! describes what the bridge needs from a loaded instance.

pub mod capabilities;

#[cfg(test)]
pub(crate) mod fake;

use crate::common::BridgeResult;

pub use capabilities::CapabilityFlags;

/// Offset into the module's linear memory, or an index into its function table
pub type Pointer = u32;

/// The null pointer
pub const NULL: Pointer = 0;

/// Host code callable from inside the module through a function-table pointer
///
/// Receives the module's memory view while the module is executing plus the
/// raw argument words. Returning an error aborts the module call that
/// triggered it.
pub type HostFunction = Box<dyn FnMut(&mut dyn ModuleMemory, &[Pointer]) -> BridgeResult<()>>;

/// Memory and export access to a module instance
pub trait ModuleMemory {
    /// The whole linear memory
    fn memory(&self) -> &[u8];

    fn memory_mut(&mut self) -> &mut [u8];

    /// Whether `symbol` (already in exported form, e.g. `_malloc`) exists
    fn has_export(&self, symbol: &str) -> bool;

    /// Call an exported function with 32-bit argument words
    fn invoke(&mut self, symbol: &str, args: &[Pointer]) -> BridgeResult<Option<Pointer>>;
}

/// A loaded compiler module
pub trait CompilerModule: ModuleMemory {
    /// Install `func` in the function table and return its pointer
    fn add_function(&mut self, func: HostFunction, signature: &str) -> BridgeResult<Pointer>;

    /// Remove a pointer previously returned by [`CompilerModule::add_function`]
    fn remove_function(&mut self, pointer: Pointer) -> BridgeResult<()>;
}

/// Every entry point the bridge knows how to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryPoint {
    SolidityAlloc,
    Malloc,
    SolidityVersion,
    Version,
    SolidityLicense,
    License,
    SolidityReset,
    CompileJson,
    CompileJsonMulti,
    CompileJsonCallback,
    CompileStandard,
    SolidityCompile,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 12] = [
        EntryPoint::SolidityAlloc,
        EntryPoint::Malloc,
        EntryPoint::SolidityVersion,
        EntryPoint::Version,
        EntryPoint::SolidityLicense,
        EntryPoint::License,
        EntryPoint::SolidityReset,
        EntryPoint::CompileJson,
        EntryPoint::CompileJsonMulti,
        EntryPoint::CompileJsonCallback,
        EntryPoint::CompileStandard,
        EntryPoint::SolidityCompile,
    ];

    /// Name of the entry point as the compiler sources spell it
    pub fn name(&self) -> &'static str {
        match self {
            EntryPoint::SolidityAlloc => "solidity_alloc",
            EntryPoint::Malloc => "malloc",
            EntryPoint::SolidityVersion => "solidity_version",
            EntryPoint::Version => "version",
            EntryPoint::SolidityLicense => "solidity_license",
            EntryPoint::License => "license",
            EntryPoint::SolidityReset => "solidity_reset",
            EntryPoint::CompileJson => "compileJSON",
            EntryPoint::CompileJsonMulti => "compileJSONMulti",
            EntryPoint::CompileJsonCallback => "compileJSONCallback",
            EntryPoint::CompileStandard => "compileStandard",
            EntryPoint::SolidityCompile => "solidity_compile",
        }
    }

    /// Exported symbol for this entry point
    pub fn symbol(&self) -> String {
        export_symbol(self.name())
    }
}

/// Exported symbol for a C-level function name
pub fn export_symbol(name: &str) -> String {
    format!("_{name}")
}
