//! In-memory stand-in for a compiler module, used by the unit tests
//!
//! Emulates the parts of an Emscripten solc build the bridge touches: a flat
//! linear memory with a bump allocator, a configurable export table, an
//! indirect function table and scripted compile entry points.

use super::{CompilerModule, EntryPoint, HostFunction, ModuleMemory, NULL, Pointer};
use crate::bridge::{copy_from_c_string, read_pointer};
use crate::common::{BridgeError, BridgeResult};
use std::collections::BTreeSet;

const MEMORY_SIZE: usize = 1 << 20;
const HEAP_BASE: u32 = 1024;

pub const FAKE_VERSION: &str = "0.8.18+commit.87f61d96.Emscripten.clang";
pub const FAKE_LICENSE: &str = "Most of the code is licensed under GPLv3";

/// Arguments a compile entry point was invoked with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileCall {
    pub entry: EntryPoint,
    pub input: String,
    pub optimize: Option<bool>,
    pub callback: Option<Pointer>,
    pub context: Option<Pointer>,
}

type CompileFn = Box<dyn FnMut(&mut FakeModule, &CompileCall) -> BridgeResult<String>>;

#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub registered: usize,
    pub removed: usize,
    pub resets: usize,
    /// Sizes requested through the allocator exports
    pub allocations: Vec<usize>,
    pub compile_calls: Vec<CompileCall>,
}

pub struct FakeModule {
    memory: Vec<u8>,
    heap_top: u32,
    exports: BTreeSet<String>,
    table: Vec<Option<HostFunction>>,
    behaviour: Option<CompileFn>,
    failure: Option<String>,
    stats: Stats,
}

impl FakeModule {
    pub fn new(entries: &[EntryPoint]) -> Self {
        Self {
            memory: vec![0; MEMORY_SIZE],
            heap_top: HEAP_BASE,
            exports: entries.iter().map(EntryPoint::symbol).collect(),
            // Slot 0 is the null function pointer.
            table: vec![None],
            behaviour: None,
            failure: None,
            stats: Stats::default(),
        }
    }

    /// A 0.6+ module: dedicated allocator, reset and `solidity_compile`
    pub fn modern() -> Self {
        Self::new(&[
            EntryPoint::SolidityAlloc,
            EntryPoint::Malloc,
            EntryPoint::SolidityVersion,
            EntryPoint::SolidityLicense,
            EntryPoint::SolidityReset,
            EntryPoint::SolidityCompile,
        ])
    }

    /// Script what the compile entry points do
    pub fn on_compile(
        mut self,
        behaviour: impl FnMut(&mut FakeModule, &CompileCall) -> BridgeResult<String> + 'static,
    ) -> Self {
        self.behaviour = Some(Box::new(behaviour));
        self
    }

    /// Make every compile entry point fail with `message`
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn live_functions(&self) -> usize {
        self.table.iter().filter(|f| f.is_some()).count()
    }

    /// Call the host function at `pointer` the way the compiler does
    pub fn request(&mut self, pointer: Pointer, kind: &str, data: &str) -> BridgeResult<(Option<String>, Option<String>)> {
        self.request_with_context(pointer, NULL, kind, data)
    }

    pub fn request_with_context(
        &mut self,
        pointer: Pointer,
        context: Pointer,
        kind: &str,
        data: &str,
    ) -> BridgeResult<(Option<String>, Option<String>)> {
        let kind = self.store(kind);
        let data = self.store(data);
        let contents_slot = self.bump(4);
        let error_slot = self.bump(4);

        let index = pointer as usize;
        let mut func = self
            .table
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| BridgeError::module(format!("call through invalid function pointer {pointer}")))?;
        let result = func(&mut *self, &[context, kind, data, contents_slot, error_slot]);
        self.table[index] = Some(func);
        result?;

        Ok((self.read_slot(contents_slot)?, self.read_slot(error_slot)?))
    }

    fn read_slot(&self, slot: Pointer) -> BridgeResult<Option<String>> {
        match read_pointer(&self.memory, slot)? {
            NULL => Ok(None),
            pointer => copy_from_c_string(&self.memory, pointer).map(Some),
        }
    }

    fn bump(&mut self, len: usize) -> Pointer {
        let pointer = self.heap_top;
        let end = pointer as usize + len;
        assert!(end <= self.memory.len(), "fake module out of memory");
        self.memory[pointer as usize..end].fill(0);
        self.heap_top = ((end + 7) & !7) as u32;
        pointer
    }

    fn store(&mut self, value: &str) -> Pointer {
        let pointer = self.bump(value.len() + 1);
        let start = pointer as usize;
        self.memory[start..start + value.len()].copy_from_slice(value.as_bytes());
        pointer
    }

    fn compile(&mut self, entry: EntryPoint, args: &[Pointer]) -> BridgeResult<Option<Pointer>> {
        let word = |index: usize| {
            args.get(index)
                .copied()
                .ok_or_else(|| BridgeError::module(format!("`{}` called with {} arguments", entry.name(), args.len())))
        };
        let input = copy_from_c_string(&self.memory, word(0)?)?;
        let (optimize, callback, context) = match entry {
            EntryPoint::SolidityCompile => (None, Some(word(1)?), Some(word(2)?)),
            EntryPoint::CompileStandard => (None, Some(word(1)?), None),
            EntryPoint::CompileJsonCallback => (Some(word(1)? != 0), Some(word(2)?), None),
            _ => (Some(word(1)? != 0), None, None),
        };
        let call = CompileCall {
            entry,
            input,
            optimize,
            callback,
            context,
        };
        self.stats.compile_calls.push(call.clone());

        if let Some(message) = &self.failure {
            return Err(BridgeError::module(message.clone()));
        }

        let output = match self.behaviour.take() {
            Some(mut behaviour) => {
                let output = behaviour(self, &call);
                self.behaviour = Some(behaviour);
                output?
            }
            None => "{}".to_string(),
        };
        Ok(Some(self.store(&output)))
    }
}

impl ModuleMemory for FakeModule {
    fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    fn has_export(&self, symbol: &str) -> bool {
        self.exports.contains(symbol)
    }

    fn invoke(&mut self, symbol: &str, args: &[Pointer]) -> BridgeResult<Option<Pointer>> {
        let entry = EntryPoint::ALL
            .into_iter()
            .find(|entry| entry.symbol() == symbol && self.exports.contains(symbol))
            .ok_or_else(|| BridgeError::module(format!("no export named `{symbol}`")))?;

        match entry {
            EntryPoint::SolidityAlloc | EntryPoint::Malloc => {
                let len = args.first().copied().unwrap_or(0) as usize;
                self.stats.allocations.push(len);
                Ok(Some(self.bump(len)))
            }
            EntryPoint::SolidityReset => {
                self.stats.resets += 1;
                self.heap_top = HEAP_BASE;
                Ok(None)
            }
            EntryPoint::SolidityVersion | EntryPoint::Version => Ok(Some(self.store(FAKE_VERSION))),
            EntryPoint::SolidityLicense | EntryPoint::License => Ok(Some(self.store(FAKE_LICENSE))),
            EntryPoint::CompileJson
            | EntryPoint::CompileJsonMulti
            | EntryPoint::CompileJsonCallback
            | EntryPoint::CompileStandard
            | EntryPoint::SolidityCompile => self.compile(entry, args),
        }
    }
}

impl CompilerModule for FakeModule {
    fn add_function(&mut self, func: HostFunction, signature: &str) -> BridgeResult<Pointer> {
        if signature != "viiiii" {
            return Err(BridgeError::module(format!("unsupported signature {signature}")));
        }
        self.stats.registered += 1;
        self.table.push(Some(func));
        Ok((self.table.len() - 1) as Pointer)
    }

    fn remove_function(&mut self, pointer: Pointer) -> BridgeResult<()> {
        match self.table.get_mut(pointer as usize) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                self.stats.removed += 1;
                Ok(())
            }
            _ => Err(BridgeError::module(format!("function pointer {pointer} is not registered"))),
        }
    }
}
