//! Scoped resources of one compile call
//!
//! A compile call may install the trampoline in the module's function table
//! and always leaves allocations behind. Both are released exactly once when
//! the scope closes, whether the call succeeded, failed or unwound.

use super::{AbiBridge, CallbackSet, TRAMPOLINE_SIGNATURE, make_trampoline};
use crate::common::BridgeResult;
use crate::module::{CompilerModule, NULL, Pointer};
use tracing::{trace, warn};

/// Exclusive access to a module for the duration of one compile call
pub struct CallScope<'a, M: CompilerModule> {
    module: &'a mut M,
    bridge: &'a AbiBridge,
    trampoline: Option<Pointer>,
    closed: bool,
}

impl<'a, M: CompilerModule> CallScope<'a, M> {
    /// Open a scope without a callback
    pub fn open(module: &'a mut M, bridge: &'a AbiBridge) -> Self {
        Self {
            module,
            bridge,
            trampoline: None,
            closed: false,
        }
    }

    /// Open a scope with the trampoline for `callbacks` registered
    ///
    /// The scope is open before registration, so a failed registration still
    /// resets the module.
    pub fn with_callbacks(module: &'a mut M, bridge: &'a AbiBridge, callbacks: CallbackSet) -> BridgeResult<Self> {
        let mut scope = Self::open(module, bridge);
        let trampoline = make_trampoline(bridge.allocator(), callbacks);
        let pointer = scope.module.add_function(trampoline, TRAMPOLINE_SIGNATURE)?;
        trace!(pointer, "registered callback trampoline");
        scope.trampoline = Some(pointer);
        Ok(scope)
    }

    /// Function pointer to hand to the module, null when no callback is registered
    pub fn callback_pointer(&self) -> Pointer {
        self.trampoline.unwrap_or(NULL)
    }

    pub fn module(&mut self) -> &mut M {
        self.module
    }

    pub fn bridge(&self) -> &AbiBridge {
        self.bridge
    }

    /// Deregister the trampoline and reset the module
    ///
    /// Both steps are attempted even if the first one fails; the first
    /// failure is reported.
    pub fn close(mut self) -> BridgeResult<()> {
        self.release()
    }

    fn release(&mut self) -> BridgeResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let removed = match self.trampoline.take() {
            Some(pointer) => {
                trace!(pointer, "deregistering callback trampoline");
                self.module.remove_function(pointer)
            }
            None => Ok(()),
        };
        let reset = self.bridge.reset(&mut *self.module).map(|_| ());
        removed.and(reset)
    }
}

impl<M: CompilerModule> Drop for CallScope<'_, M> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(error = %err, "failed to release compile call resources");
        }
    }
}
