//! Compile entry point selection
//!
//! Five generations of compile entry points exist. The best one the module
//! exports is picked once, when the bridge is set up, and used for every
//! call; a failing call is never retried on a lower tier.

use crate::bridge::{AbiBridge, Arg, ArgKind, Binding, CallScope, CallbackSet, ReturnKind};
use crate::common::{BridgeError, BridgeResult};
use crate::module::{CompilerModule, EntryPoint, NULL};
use tracing::debug;

const UNIFIED_ARGS: &[ArgKind] = &[ArgKind::String, ArgKind::Number, ArgKind::Number];
const STANDARD_ARGS: &[ArgKind] = &[ArgKind::String, ArgKind::Number];
const CALLBACK_ARGS: &[ArgKind] = &[ArgKind::String, ArgKind::Number, ArgKind::Number];
const LEGACY_ARGS: &[ArgKind] = &[ArgKind::String, ArgKind::Number];

/// The compile entry point in use, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStrategy {
    /// `solidity_compile(input, callback, context)`
    SolidityCompile(Binding),
    /// `compileStandard(input, callback)`
    CompileStandard(Binding),
    /// `compileJSONCallback(input, optimize, callback)`
    CompileJsonCallback(Binding),
    /// `compileJSONMulti(input, optimize)`
    CompileJsonMulti(Binding),
    /// `compileJSON(source, optimize)`, a single source file only
    CompileJson(Binding),
    Unsupported,
}

impl CompileStrategy {
    pub fn select(bridge: &AbiBridge) -> Self {
        let tiers: [(EntryPoint, &'static [ArgKind], fn(Binding) -> Self); 5] = [
            (EntryPoint::SolidityCompile, UNIFIED_ARGS, Self::SolidityCompile),
            (EntryPoint::CompileStandard, STANDARD_ARGS, Self::CompileStandard),
            (EntryPoint::CompileJsonCallback, CALLBACK_ARGS, Self::CompileJsonCallback),
            (EntryPoint::CompileJsonMulti, LEGACY_ARGS, Self::CompileJsonMulti),
            (EntryPoint::CompileJson, LEGACY_ARGS, Self::CompileJson),
        ];
        tiers
            .into_iter()
            .find_map(|(entry, args, tier)| bridge.bind(entry, ReturnKind::String, args).map(tier))
            .unwrap_or(Self::Unsupported)
    }

    pub fn binding(&self) -> Option<Binding> {
        match *self {
            Self::SolidityCompile(binding)
            | Self::CompileStandard(binding)
            | Self::CompileJsonCallback(binding)
            | Self::CompileJsonMulti(binding)
            | Self::CompileJson(binding) => Some(binding),
            Self::Unsupported => None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.binding().map_or("unsupported", |binding| binding.entry().name())
    }

    /// Whether the entry point takes standard JSON and returns modern output
    pub fn accepts_standard_json(&self) -> bool {
        matches!(self, Self::SolidityCompile(_) | Self::CompileStandard(_))
    }

    /// Whether the entry point takes a callback pointer
    pub fn uses_callbacks(&self) -> bool {
        matches!(
            self,
            Self::SolidityCompile(_) | Self::CompileStandard(_) | Self::CompileJsonCallback(_)
        )
    }

    /// Whether the entry point only takes a single source text
    pub fn single_input(&self) -> bool {
        matches!(self, Self::CompileJson(_))
    }

    /// Run one compile call and return the module's raw output
    ///
    /// `optimize` is only passed to the legacy entry points. The trampoline
    /// is registered for callback-capable tiers, and the module is reset
    /// exactly once however the call ends. A module failure takes precedence
    /// over a cleanup failure.
    pub fn invoke<M: CompilerModule>(
        &self,
        module: &mut M,
        bridge: &AbiBridge,
        input: &str,
        optimize: bool,
        callbacks: CallbackSet,
    ) -> BridgeResult<String> {
        let binding = self.binding().ok_or(BridgeError::MissingEntryPoint {
            name: EntryPoint::SolidityCompile.name(),
        })?;

        let mut scope = if self.uses_callbacks() {
            CallScope::with_callbacks(module, bridge, callbacks)?
        } else {
            if !callbacks.is_empty() {
                debug!(strategy = self.name(), "entry point takes no callback, ignoring callbacks");
            }
            CallScope::open(module, bridge)
        };

        let callback = scope.callback_pointer();
        let optimize = u32::from(optimize);
        let args: Vec<Arg<'_>> = match self {
            Self::SolidityCompile(_) => vec![Arg::Str(input), Arg::Num(callback), Arg::Num(NULL)],
            Self::CompileStandard(_) => vec![Arg::Str(input), Arg::Num(callback)],
            Self::CompileJsonCallback(_) => vec![Arg::Str(input), Arg::Num(optimize), Arg::Num(callback)],
            Self::CompileJsonMulti(_) | Self::CompileJson(_) | Self::Unsupported => {
                vec![Arg::Str(input), Arg::Num(optimize)]
            }
        };

        let output = binding.call_string(scope.module(), bridge.allocator(), &args);
        let closed = scope.close();
        let output = output?;
        closed?;
        Ok(output)
    }
}
