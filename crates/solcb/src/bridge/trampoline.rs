//! Callback trampoline
//!
//! The module asks the host for services (reading imported sources, running
//! SMT queries) through a single function pointer with the C signature
//! `void(void* context, char const* kind, char const* data, char** contents, char** error)`.
//! The trampoline decodes the message, dispatches it to the matching host
//! callback and writes the reply back into module memory.

use super::{Allocator, copy_from_c_string, copy_to_c_string};
use crate::common::{BridgeError, BridgeResult};
use crate::module::{HostFunction, ModuleMemory, NULL, Pointer};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Emscripten signature string of the trampoline
pub const TRAMPOLINE_SIGNATURE: &str = "viiiii";

pub const IMPORT_NOT_SUPPORTED: &str = "File import callback not supported";
pub const SMT_NOT_SUPPORTED: &str = "SMT solver callback not supported";

/// Discriminant of a callback request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Source,
    SmtQuery,
}

impl CallbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackKind::Source => "source",
            CallbackKind::SmtQuery => "smt-query",
        }
    }
}

impl FromStr for CallbackKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(CallbackKind::Source),
            "smt-query" => Ok(CallbackKind::SmtQuery),
            _ => Err(BridgeError::protocol("Invalid callback kind specified.")),
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply of a host callback
///
/// Both halves are written back when present; nothing enforces that only
/// one of them is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackResult {
    pub contents: Option<String>,
    pub error: Option<String>,
}

impl CallbackResult {
    pub fn contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Some(contents.into()),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            contents: None,
            error: Some(error.into()),
        }
    }
}

/// A host callback: query in, reply out
pub type Callback = Box<dyn FnMut(&str) -> CallbackResult>;

/// Host callbacks for one compile call
///
/// Kinds left unset answer with a fixed "not supported" error.
#[derive(Default)]
pub struct CallbackSet {
    import: Option<Callback>,
    smt_solver: Option<Callback>,
}

impl CallbackSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback for `source` requests (reading imported files)
    pub fn with_import(mut self, callback: impl FnMut(&str) -> CallbackResult + 'static) -> Self {
        self.import = Some(Box::new(callback));
        self
    }

    /// Callback for `smt-query` requests
    pub fn with_smt_solver(mut self, callback: impl FnMut(&str) -> CallbackResult + 'static) -> Self {
        self.smt_solver = Some(Box::new(callback));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.import.is_none() && self.smt_solver.is_none()
    }

    pub fn has(&self, kind: CallbackKind) -> bool {
        match kind {
            CallbackKind::Source => self.import.is_some(),
            CallbackKind::SmtQuery => self.smt_solver.is_some(),
        }
    }

    /// Run the callback registered for `kind`, or its default responder
    pub fn dispatch(&mut self, kind: CallbackKind, data: &str) -> CallbackResult {
        let (callback, unsupported) = match kind {
            CallbackKind::Source => (self.import.as_mut(), IMPORT_NOT_SUPPORTED),
            CallbackKind::SmtQuery => (self.smt_solver.as_mut(), SMT_NOT_SUPPORTED),
        };
        match callback {
            Some(callback) => callback(data),
            None => CallbackResult::error(unsupported),
        }
    }
}

impl fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSet")
            .field("import", &self.import.is_some())
            .field("smt_solver", &self.smt_solver.is_some())
            .finish()
    }
}

/// Build the single native callback multiplexing `callbacks`
///
/// The returned function owns the callbacks; they are dropped when the
/// module's function table entry is removed.
pub fn make_trampoline(allocator: Allocator, mut callbacks: CallbackSet) -> HostFunction {
    Box::new(move |memory: &mut dyn ModuleMemory, args: &[Pointer]| {
        let &[context, kind, data, contents_out, error_out] = args else {
            return Err(BridgeError::protocol(format!(
                "callback expects 5 arguments, got {}",
                args.len()
            )));
        };
        if context != NULL {
            return Err(BridgeError::protocol("Callback context must be null."));
        }

        let kind: CallbackKind = copy_from_c_string(memory.memory(), kind)?.parse()?;
        let data = copy_from_c_string(memory.memory(), data)?;
        trace!(%kind, %data, "dispatching module callback");

        let result = callbacks.dispatch(kind, &data);
        if let Some(contents) = &result.contents {
            copy_to_c_string(&mut *memory, allocator, contents, contents_out)?;
        }
        if let Some(error) = &result.error {
            copy_to_c_string(&mut *memory, allocator, error, error_out)?;
        }
        Ok(())
    })
}
