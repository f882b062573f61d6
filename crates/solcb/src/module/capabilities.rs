//! Capability detection
//!
//! Probing an export that does not exist is undefined behaviour at the FFI
//! boundary, so the export table is inspected once, up front, and every later
//! binding decision reads the resulting flags.

use super::{EntryPoint, ModuleMemory};

/// Which known entry points a module exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilityFlags {
    pub alloc: bool,
    pub malloc: bool,
    pub version: bool,
    pub legacy_version: bool,
    pub license: bool,
    pub legacy_license: bool,
    pub reset: bool,
    pub compile_json: bool,
    pub compile_json_multi: bool,
    pub compile_json_callback: bool,
    pub compile_standard: bool,
    pub solidity_compile: bool,
}

impl CapabilityFlags {
    /// Inspect the export table of `module`
    pub fn detect<M: ModuleMemory + ?Sized>(module: &M) -> Self {
        let mut flags = Self::default();
        for entry in EntryPoint::ALL {
            if module.has_export(&entry.symbol()) {
                flags.set(entry);
            }
        }
        flags
    }

    /// Flags with exactly the listed entry points present
    pub fn from_entries(entries: &[EntryPoint]) -> Self {
        let mut flags = Self::default();
        for entry in entries {
            flags.set(*entry);
        }
        flags
    }

    pub fn has(&self, entry: EntryPoint) -> bool {
        match entry {
            EntryPoint::SolidityAlloc => self.alloc,
            EntryPoint::Malloc => self.malloc,
            EntryPoint::SolidityVersion => self.version,
            EntryPoint::Version => self.legacy_version,
            EntryPoint::SolidityLicense => self.license,
            EntryPoint::License => self.legacy_license,
            EntryPoint::SolidityReset => self.reset,
            EntryPoint::CompileJson => self.compile_json,
            EntryPoint::CompileJsonMulti => self.compile_json_multi,
            EntryPoint::CompileJsonCallback => self.compile_json_callback,
            EntryPoint::CompileStandard => self.compile_standard,
            EntryPoint::SolidityCompile => self.solidity_compile,
        }
    }

    fn set(&mut self, entry: EntryPoint) {
        let flag = match entry {
            EntryPoint::SolidityAlloc => &mut self.alloc,
            EntryPoint::Malloc => &mut self.malloc,
            EntryPoint::SolidityVersion => &mut self.version,
            EntryPoint::Version => &mut self.legacy_version,
            EntryPoint::SolidityLicense => &mut self.license,
            EntryPoint::License => &mut self.legacy_license,
            EntryPoint::SolidityReset => &mut self.reset,
            EntryPoint::CompileJson => &mut self.compile_json,
            EntryPoint::CompileJsonMulti => &mut self.compile_json_multi,
            EntryPoint::CompileJsonCallback => &mut self.compile_json_callback,
            EntryPoint::CompileStandard => &mut self.compile_standard,
            EntryPoint::SolidityCompile => &mut self.solidity_compile,
        };
        *flag = true;
    }

    /// Any entry point that takes standard JSON input
    pub fn native_standard_json(&self) -> bool {
        self.compile_standard || self.solidity_compile
    }
}
