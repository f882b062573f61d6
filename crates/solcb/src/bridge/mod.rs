//! ABI bridge
//!
//! Turns raw module exports into typed call sites and moves strings in and
//! out of the module's linear memory:
//! 1. Binding entry points that the capability table reports as present
//! 2. Allocating module memory through the module's own allocator
//! 3. Copying zero-terminated UTF-8 strings across the boundary
//! 4. Releasing everything allocated during a call through `solidity_reset`

pub mod scope;
pub mod trampoline;

use crate::common::{BridgeError, BridgeResult};
use crate::module::{CapabilityFlags, EntryPoint, ModuleMemory, NULL, Pointer};
use tracing::trace;

pub use scope::CallScope;
pub use trampoline::{
    CallbackKind, CallbackResult, CallbackSet, IMPORT_NOT_SUPPORTED, SMT_NOT_SUPPORTED,
    TRAMPOLINE_SIGNATURE, make_trampoline,
};

/// Which allocator export backs [`AbiBridge::allocate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocator {
    /// `solidity_alloc`, memory that `solidity_reset` reclaims
    Dedicated,
    /// The generic `malloc` export
    Malloc,
}

impl Allocator {
    /// Prefer the dedicated allocator, fall back to `malloc`, fail otherwise
    pub fn select(capabilities: &CapabilityFlags) -> BridgeResult<Self> {
        if capabilities.alloc {
            Ok(Allocator::Dedicated)
        } else if capabilities.malloc {
            Ok(Allocator::Malloc)
        } else {
            Err(BridgeError::MissingAllocator)
        }
    }

    pub fn entry(&self) -> EntryPoint {
        match self {
            Allocator::Dedicated => EntryPoint::SolidityAlloc,
            Allocator::Malloc => EntryPoint::Malloc,
        }
    }

    /// Allocate `len` bytes of module memory
    pub fn allocate<M: ModuleMemory + ?Sized>(&self, module: &mut M, len: usize) -> BridgeResult<Pointer> {
        let entry = self.entry();
        let size = u32::try_from(len)
            .map_err(|_| BridgeError::signature(entry.name(), format!("{len} bytes exceeds the address space")))?;
        match module.invoke(&entry.symbol(), &[size])? {
            Some(pointer) if pointer != NULL => {
                trace!(allocator = entry.name(), len, pointer, "allocated module memory");
                Ok(pointer)
            }
            _ => Err(BridgeError::module(format!("`{}` could not allocate {len} bytes", entry.name()))),
        }
    }
}

/// Argument kinds accepted by a bound entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Marshaled into module memory, passed as a pointer
    String,
    /// Passed through as a 32-bit word
    Number,
}

/// Return kinds of a bound entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// A pointer to a zero-terminated string, copied out on return
    String,
    Number,
    Void,
}

/// One argument at a call site
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    Str(&'a str),
    Num(u32),
}

/// Value returned from a bound entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Returned {
    Str(String),
    Num(u32),
    Void,
}

/// A typed call site for an entry point known to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    entry: EntryPoint,
    returns: ReturnKind,
    args: &'static [ArgKind],
}

impl Binding {
    pub fn entry(&self) -> EntryPoint {
        self.entry
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Marshal `args`, invoke the entry point and unmarshal its result
    ///
    /// String arguments are copied into memory obtained from `allocator`;
    /// they stay allocated until the module is reset.
    pub fn call<M: ModuleMemory + ?Sized>(
        &self,
        module: &mut M,
        allocator: Allocator,
        args: &[Arg<'_>],
    ) -> BridgeResult<Returned> {
        let name = self.entry.name();
        if args.len() != self.args.len() {
            return Err(BridgeError::signature(
                name,
                format!("expected {} arguments, got {}", self.args.len(), args.len()),
            ));
        }

        let mut words = Vec::with_capacity(args.len());
        for (index, (kind, arg)) in self.args.iter().zip(args).enumerate() {
            let word = match (kind, arg) {
                (ArgKind::String, Arg::Str(value)) => write_c_string(module, allocator, value)?,
                (ArgKind::Number, Arg::Num(value)) => *value,
                _ => {
                    return Err(BridgeError::signature(
                        name,
                        format!("argument {index} does not match {kind:?}"),
                    ));
                }
            };
            words.push(word);
        }

        let result = module.invoke(&self.entry.symbol(), &words)?;
        match self.returns {
            ReturnKind::Void => Ok(Returned::Void),
            ReturnKind::Number => result
                .map(Returned::Num)
                .ok_or_else(|| BridgeError::signature(name, "missing return value")),
            ReturnKind::String => {
                let pointer = result.ok_or_else(|| BridgeError::signature(name, "missing return value"))?;
                Ok(Returned::Str(copy_from_c_string(module.memory(), pointer)?))
            }
        }
    }

    /// [`Binding::call`] for entry points returning a string
    pub fn call_string<M: ModuleMemory + ?Sized>(
        &self,
        module: &mut M,
        allocator: Allocator,
        args: &[Arg<'_>],
    ) -> BridgeResult<String> {
        match self.call(module, allocator, args)? {
            Returned::Str(value) => Ok(value),
            other => Err(BridgeError::signature(
                self.entry.name(),
                format!("expected a string result, got {other:?}"),
            )),
        }
    }
}

/// Typed, capability-checked access to a compiler module
#[derive(Debug, Clone)]
pub struct AbiBridge {
    capabilities: CapabilityFlags,
    allocator: Allocator,
    reset: Option<Binding>,
}

impl AbiBridge {
    /// Detect capabilities and pick the allocator
    ///
    /// A module with no usable allocator cannot receive strings at all, so
    /// that is fatal here rather than at the first call.
    pub fn new<M: ModuleMemory + ?Sized>(module: &M) -> BridgeResult<Self> {
        Self::from_capabilities(CapabilityFlags::detect(module))
    }

    pub fn from_capabilities(capabilities: CapabilityFlags) -> BridgeResult<Self> {
        let allocator = Allocator::select(&capabilities)?;
        let mut bridge = Self {
            capabilities,
            allocator,
            reset: None,
        };
        bridge.reset = bridge.bind(EntryPoint::SolidityReset, ReturnKind::Void, &[]);
        Ok(bridge)
    }

    pub fn capabilities(&self) -> &CapabilityFlags {
        &self.capabilities
    }

    pub fn allocator(&self) -> Allocator {
        self.allocator
    }

    /// Bind `entry`, or `None` when the module does not export it
    pub fn bind(&self, entry: EntryPoint, returns: ReturnKind, args: &'static [ArgKind]) -> Option<Binding> {
        self.capabilities
            .has(entry)
            .then_some(Binding { entry, returns, args })
    }

    /// Bind `entry`, trying `fallback` when it is absent
    pub fn bind_with_fallback(
        &self,
        entry: EntryPoint,
        fallback: EntryPoint,
        returns: ReturnKind,
        args: &'static [ArgKind],
    ) -> Option<Binding> {
        self.bind(entry, returns, args)
            .or_else(|| self.bind(fallback, returns, args))
    }

    pub fn allocate<M: ModuleMemory + ?Sized>(&self, module: &mut M, len: usize) -> BridgeResult<Pointer> {
        self.allocator.allocate(module, len)
    }

    /// Copy `value` into fresh module memory and store its address at `slot`
    pub fn write_string<M: ModuleMemory + ?Sized>(&self, module: &mut M, value: &str, slot: Pointer) -> BridgeResult<()> {
        copy_to_c_string(module, self.allocator, value, slot)
    }

    pub fn read_string<M: ModuleMemory + ?Sized>(&self, module: &M, pointer: Pointer) -> BridgeResult<String> {
        copy_from_c_string(module.memory(), pointer)
    }

    /// Release every allocation made since the last reset
    ///
    /// Returns whether the module actually has a reset entry point.
    pub fn reset<M: ModuleMemory + ?Sized>(&self, module: &mut M) -> BridgeResult<bool> {
        match &self.reset {
            Some(binding) => {
                binding.call(module, self.allocator, &[])?;
                trace!("module memory reset");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Copy `value` plus a zero terminator into memory from `allocator`
pub fn write_c_string<M: ModuleMemory + ?Sized>(
    module: &mut M,
    allocator: Allocator,
    value: &str,
) -> BridgeResult<Pointer> {
    let bytes = value.as_bytes();
    let buffer = allocator.allocate(module, bytes.len() + 1)?;
    let target = region_mut(module.memory_mut(), buffer, bytes.len() + 1)?;
    target[..bytes.len()].copy_from_slice(bytes);
    target[bytes.len()] = 0;
    Ok(buffer)
}

/// Copy `value` into module memory and store the resulting pointer at `slot`
pub fn copy_to_c_string<M: ModuleMemory + ?Sized>(
    module: &mut M,
    allocator: Allocator,
    value: &str,
    slot: Pointer,
) -> BridgeResult<()> {
    let buffer = write_c_string(module, allocator, value)?;
    write_pointer(module.memory_mut(), slot, buffer)
}

/// Decode the zero-terminated string at `pointer`
///
/// A null pointer reads as the empty string; a run that reaches the end of
/// memory without a terminator is cut there.
pub fn copy_from_c_string(memory: &[u8], pointer: Pointer) -> BridgeResult<String> {
    if pointer == NULL {
        return Ok(String::new());
    }
    let start = pointer as usize;
    if start >= memory.len() {
        return Err(BridgeError::out_of_bounds(pointer, 1));
    }
    let tail = &memory[start..];
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

/// Store a little-endian pointer at `slot`
pub fn write_pointer(memory: &mut [u8], slot: Pointer, value: Pointer) -> BridgeResult<()> {
    region_mut(memory, slot, 4)?.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Load a little-endian pointer from `slot`
pub fn read_pointer(memory: &[u8], slot: Pointer) -> BridgeResult<Pointer> {
    let start = slot as usize;
    let bytes = memory
        .get(start..start.saturating_add(4))
        .ok_or(BridgeError::out_of_bounds(slot, 4))?;
    Ok(Pointer::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn region_mut(memory: &mut [u8], pointer: Pointer, len: usize) -> BridgeResult<&mut [u8]> {
    let start = pointer as usize;
    memory
        .get_mut(start..start.saturating_add(len))
        .ok_or(BridgeError::out_of_bounds(pointer, len))
}
