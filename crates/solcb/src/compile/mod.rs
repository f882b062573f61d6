//! Compile orchestration
//!
//! [`Solc`] owns a loaded module and exposes one stable interface over it:
//! standard JSON in, standard JSON out. Requests go through the entry point
//! picked at setup; output from legacy entry points is normalized and linked
//! before it is handed back.

pub mod request;
pub mod strategy;

use crate::bridge::{AbiBridge, ArgKind, CallbackSet, ReturnKind};
use crate::common::{BridgeError, BridgeResult, FatalError, format_fatal_error};
use crate::module::{CapabilityFlags, CompilerModule, EntryPoint};
use crate::translate::{translate_output, version_to_semver};
use tracing::debug;

pub use request::{CompileRequest, Language, SourceInput, legacy_input};
pub use strategy::CompileStrategy;

const NO_ARGS: &[ArgKind] = &[];

/// Orchestrator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolcConfig {
    /// Translate legacy output into the standard layout
    pub normalize_legacy_output: bool,
    /// Log raw module output at debug level
    pub dump_raw_output: bool,
}

impl Default for SolcConfig {
    fn default() -> Self {
        Self {
            normalize_legacy_output: true,
            dump_raw_output: false,
        }
    }
}

/// What a module can do, from the caller's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Features {
    pub legacy_single_input: bool,
    pub multiple_inputs: bool,
    pub import_callback: bool,
    pub native_standard_json: bool,
}

impl Features {
    pub fn from_capabilities(flags: &CapabilityFlags) -> Self {
        Self {
            legacy_single_input: flags.compile_json,
            multiple_inputs: flags.compile_json_multi || flags.compile_json_callback || flags.native_standard_json(),
            import_callback: flags.compile_json_callback || flags.native_standard_json(),
            native_standard_json: flags.native_standard_json(),
        }
    }
}

/// A compiler module behind the stable interface
pub struct Solc<M: CompilerModule> {
    module: M,
    bridge: AbiBridge,
    strategy: CompileStrategy,
    config: SolcConfig,
}

impl<M: CompilerModule> Solc<M> {
    pub fn new(module: M) -> BridgeResult<Self> {
        Self::with_config(module, SolcConfig::default())
    }

    pub fn with_config(module: M, config: SolcConfig) -> BridgeResult<Self> {
        let bridge = AbiBridge::new(&module)?;
        let strategy = CompileStrategy::select(&bridge);
        debug!(strategy = strategy.name(), allocator = ?bridge.allocator(), "compiler module ready");
        Ok(Self {
            module,
            bridge,
            strategy,
            config,
        })
    }

    pub fn capabilities(&self) -> &CapabilityFlags {
        self.bridge.capabilities()
    }

    pub fn features(&self) -> Features {
        Features::from_capabilities(self.bridge.capabilities())
    }

    pub fn strategy(&self) -> CompileStrategy {
        self.strategy
    }

    pub fn config(&self) -> &SolcConfig {
        &self.config
    }

    /// Full compiler version string
    pub fn version(&mut self) -> BridgeResult<String> {
        let binding = self
            .bridge
            .bind_with_fallback(EntryPoint::SolidityVersion, EntryPoint::Version, ReturnKind::String, NO_ARGS)
            .ok_or(BridgeError::MissingEntryPoint {
                name: EntryPoint::SolidityVersion.name(),
            })?;
        binding.call_string(&mut self.module, self.bridge.allocator(), &[])
    }

    /// Compiler license text, `None` for modules too old to carry one
    pub fn license(&mut self) -> BridgeResult<Option<String>> {
        match self.bridge.bind_with_fallback(
            EntryPoint::SolidityLicense,
            EntryPoint::License,
            ReturnKind::String,
            NO_ARGS,
        ) {
            Some(binding) => binding
                .call_string(&mut self.module, self.bridge.allocator(), &[])
                .map(Some),
            None => Ok(None),
        }
    }

    /// Version in semver form
    pub fn semver(&mut self) -> BridgeResult<String> {
        self.version().map(|version| version_to_semver(&version))
    }

    /// Compile a standard JSON request
    ///
    /// Request and output problems come back as a fatal error document in
    /// the `Ok` value. `Err` is reserved for a broken or failing module.
    pub fn compile(&mut self, input: &str, callbacks: CallbackSet) -> BridgeResult<String> {
        match self.compile_request(input, callbacks) {
            Ok(output) => Ok(output),
            Err(Rejected::Fatal(fatal)) => {
                debug!(reason = fatal.message(), "request rejected");
                Ok(fatal.to_json())
            }
            Err(Rejected::Module(err)) => Err(err),
        }
    }

    fn compile_request(&mut self, input: &str, callbacks: CallbackSet) -> Result<String, Rejected> {
        if self.strategy == CompileStrategy::Unsupported {
            return Err(FatalError::new("Compiler does not support any known interface.").into());
        }

        let request = CompileRequest::parse(input)?;
        if self.strategy.accepts_standard_json() {
            request.validate_standard()?;
            let output = self.strategy.invoke(&mut self.module, &self.bridge, input, false, callbacks)?;
            return Ok(output);
        }

        let sources = request.legacy_sources()?;
        let legacy = if self.strategy.single_input() {
            let mut contents = sources.into_values();
            match (contents.next(), contents.next()) {
                (Some(content), None) => content,
                _ => {
                    return Err(FatalError::new(
                        "Multiple sources provided, but compiler only supports single input.",
                    )
                    .into());
                }
            }
        } else {
            legacy_input(&sources)
        };

        let raw = self
            .strategy
            .invoke(&mut self.module, &self.bridge, &legacy, request.optimize(), callbacks)?;
        if self.config.dump_raw_output {
            debug!(strategy = self.strategy.name(), output = %raw, "raw compiler output");
        }
        if !self.config.normalize_legacy_output {
            return Ok(raw);
        }

        let normalized = translate_output(&raw, &request.libraries())?;
        Ok(serde_json::to_string(&normalized).unwrap_or_else(|_| format_fatal_error("Failed to process output.")))
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    pub fn into_inner(self) -> M {
        self.module
    }
}

/// Why a compile call did not produce module output
enum Rejected {
    Fatal(FatalError),
    Module(BridgeError),
}

impl From<FatalError> for Rejected {
    fn from(fatal: FatalError) -> Self {
        Rejected::Fatal(fatal)
    }
}

impl From<BridgeError> for Rejected {
    fn from(err: BridgeError) -> Self {
        Rejected::Module(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{CallbackResult, IMPORT_NOT_SUPPORTED};
    use crate::linker::library_label;
    use crate::module::fake::{FAKE_LICENSE, FAKE_VERSION, FakeModule};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    const SINGLE_SOURCE: &str = r#"{"language": "Solidity", "sources": {"a.sol": {"content": "contract A {}"}}}"#;
    const TWO_SOURCES: &str = r#"{
        "language": "Solidity",
        "sources": {
            "a.sol": {"content": "import \"b.sol\"; contract A {}"},
            "b.sol": {"content": "contract B {}"}
        }
    }"#;

    fn fatal_message(output: &str) -> String {
        let doc: Value = serde_json::from_str(output).unwrap();
        assert_eq!(doc["errors"][0]["type"], json!("JSONError"));
        doc["errors"][0]["message"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_single_input_rejects_multiple_sources() {
        let module = FakeModule::new(&[EntryPoint::Malloc, EntryPoint::CompileJson]);
        let mut solc = Solc::new(module).unwrap();

        let output = solc.compile(TWO_SOURCES, CallbackSet::new()).unwrap();
        assert_eq!(
            fatal_message(&output),
            "Multiple sources provided, but compiler only supports single input."
        );
        assert!(solc.module().stats().compile_calls.is_empty());
    }

    #[test]
    fn test_single_input_gets_source_text() {
        let module = FakeModule::new(&[EntryPoint::Malloc, EntryPoint::CompileJson]);
        let mut solc = Solc::new(module).unwrap();

        solc.compile(SINGLE_SOURCE, CallbackSet::new()).unwrap();
        let call = &solc.module().stats().compile_calls[0];
        assert_eq!(call.entry, EntryPoint::CompileJson);
        assert_eq!(call.input, "contract A {}");
        assert_eq!(call.optimize, Some(false));
    }

    #[test]
    fn test_default_import_callback_through_compile() {
        let module = FakeModule::modern().on_compile(|module, call| {
            let (contents, error) = module.request(call.callback.unwrap_or_default(), "source", "b.sol")?;
            Ok(json!({"contents": contents, "error": error}).to_string())
        });
        let mut solc = Solc::new(module).unwrap();

        let output: Value = serde_json::from_str(&solc.compile(SINGLE_SOURCE, CallbackSet::new()).unwrap()).unwrap();
        assert_eq!(output, json!({"contents": null, "error": IMPORT_NOT_SUPPORTED}));
    }

    #[test]
    fn test_import_callback_through_compile() {
        let module = FakeModule::modern().on_compile(|module, call| {
            let (contents, _) = module.request(call.callback.unwrap_or_default(), "source", "b.sol")?;
            Ok(contents.unwrap_or_default())
        });
        let mut solc = Solc::new(module).unwrap();
        let callbacks = CallbackSet::new().with_import(|path| CallbackResult::contents(format!("// {path}")));

        assert_eq!(solc.compile(SINGLE_SOURCE, callbacks).unwrap(), "// b.sol");
    }

    #[test]
    fn test_cleanup_when_module_fails() {
        let module = FakeModule::modern().failing("unreachable executed");
        let mut solc = Solc::new(module).unwrap();

        let err = solc.compile(SINGLE_SOURCE, CallbackSet::new()).unwrap_err();
        assert!(err.to_string().contains("unreachable executed"));

        let stats = solc.module().stats();
        assert_eq!(stats.registered, stats.removed);
        assert_eq!(stats.resets, 1);
        assert_eq!(solc.module().live_functions(), 0);
    }

    #[test]
    fn test_one_reset_per_call() {
        let mut solc = Solc::new(FakeModule::modern()).unwrap();
        for _ in 0..3 {
            solc.compile(SINGLE_SOURCE, CallbackSet::new()).unwrap();
        }
        let stats = solc.module().stats();
        assert_eq!(stats.resets, 3);
        assert_eq!(stats.registered, 3);
        assert_eq!(stats.removed, 3);
    }

    #[test]
    fn test_unsupported_interface() {
        let mut solc = Solc::new(FakeModule::new(&[EntryPoint::Malloc])).unwrap();
        let output = solc.compile(SINGLE_SOURCE, CallbackSet::new()).unwrap();
        assert_eq!(fatal_message(&output), "Compiler does not support any known interface.");
    }

    #[test]
    fn test_missing_allocator_is_setup_error() {
        let result = Solc::new(FakeModule::new(&[EntryPoint::CompileJson]));
        assert!(matches!(result, Err(BridgeError::MissingAllocator)));
    }

    #[test]
    fn test_standard_output_passes_through() {
        let module = FakeModule::modern().on_compile(|_, _| Ok("{\"contracts\":{}}".to_string()));
        let mut solc = Solc::new(module).unwrap();

        assert_eq!(solc.compile(SINGLE_SOURCE, CallbackSet::new()).unwrap(), "{\"contracts\":{}}");
        let call = &solc.module().stats().compile_calls[0];
        assert_eq!(call.input, SINGLE_SOURCE);
        assert_eq!(call.context, Some(0));
    }

    #[test]
    fn test_invalid_request_never_reaches_module() {
        let mut solc = Solc::new(FakeModule::modern()).unwrap();
        let output = solc.compile("not json", CallbackSet::new()).unwrap();
        assert!(fatal_message(&output).starts_with("Invalid JSON supplied: "));

        let output = solc
            .compile(r#"{"language": "Solidity", "sources": {}}"#, CallbackSet::new())
            .unwrap();
        assert_eq!(fatal_message(&output), "No input sources specified.");
        assert!(solc.module().stats().compile_calls.is_empty());
    }

    #[test]
    fn test_legacy_tier_rejects_yul() {
        let module = FakeModule::new(&[EntryPoint::Malloc, EntryPoint::CompileJsonMulti]);
        let mut solc = Solc::new(module).unwrap();
        let output = solc
            .compile(r#"{"language": "Yul", "sources": {"a.yul": {"content": "{}"}}}"#, CallbackSet::new())
            .unwrap();
        assert_eq!(fatal_message(&output), r#"Only "Solidity" is supported as a language."#);
    }

    fn legacy_output() -> String {
        json!({
            "contracts": {
                "a.sol:A": {
                    "interface": "[]",
                    "bytecode": format!("60{}", library_label("b.sol:B")),
                    "runtimeBytecode": "",
                    "gasEstimates": {"creation": [53, 1000]}
                }
            },
            "errors": ["a.sol:1:1: Warning: Source file does not specify required compiler version!"],
            "sourceList": ["a.sol", "b.sol"],
            "sources": {"a.sol": {"AST": {}}, "b.sol": {"AST": {}}}
        })
        .to_string()
    }

    #[test]
    fn test_legacy_output_is_normalized() {
        let raw = legacy_output();
        let module = FakeModule::new(&[EntryPoint::Malloc, EntryPoint::CompileJsonMulti])
            .on_compile(move |_, _| Ok(raw.clone()));
        let mut solc = Solc::new(module).unwrap();
        let input = r#"{
            "language": "Solidity",
            "sources": {
                "a.sol": {"content": "import \"b.sol\"; contract A {}"},
                "b.sol": {"content": "library B {}"}
            },
            "settings": {
                "optimizer": {"enabled": true},
                "libraries": {"b.sol": {"B": "0x1234"}}
            }
        }"#;

        let output: Value = serde_json::from_str(&solc.compile(input, CallbackSet::new()).unwrap()).unwrap();
        let contract = &output["contracts"]["a.sol"]["A"];
        assert_eq!(contract["abi"], json!([]));
        assert_eq!(contract["evm"]["bytecode"]["object"], json!(format!("60{:0>40}", "1234")));
        assert_eq!(
            contract["evm"]["bytecode"]["linkReferences"],
            json!({"b.sol:B": [{"start": 1, "length": 20}]})
        );
        assert_eq!(contract["evm"]["deployedBytecode"]["object"], json!(""));
        assert_eq!(contract["evm"]["deployedBytecode"]["linkReferences"], json!({}));
        assert_eq!(
            contract["evm"]["gasEstimates"]["creation"],
            json!({"codeDepositCost": "1000", "executionCost": "53"})
        );
        assert_eq!(output["sources"]["b.sol"]["id"], json!(1));
        assert_eq!(output["errors"][0]["severity"], json!("warning"));

        let call = &solc.module().stats().compile_calls[0];
        assert_eq!(
            call.input,
            legacy_input(&[
                ("a.sol".to_string(), "import \"b.sol\"; contract A {}".to_string()),
                ("b.sol".to_string(), "library B {}".to_string()),
            ]
            .into_iter()
            .collect())
        );
        assert_eq!(call.optimize, Some(true));
    }

    #[test]
    fn test_raw_legacy_output_when_not_normalizing() {
        let module = FakeModule::new(&[EntryPoint::Malloc, EntryPoint::CompileJsonMulti])
            .on_compile(|_, _| Ok("{\"contracts\":{}}".to_string()));
        let config = SolcConfig {
            normalize_legacy_output: false,
            dump_raw_output: true,
        };
        let mut solc = Solc::with_config(module, config).unwrap();
        assert_eq!(solc.compile(SINGLE_SOURCE, CallbackSet::new()).unwrap(), "{\"contracts\":{}}");
    }

    #[test]
    fn test_legacy_invalid_output() {
        let module = FakeModule::new(&[EntryPoint::Malloc, EntryPoint::CompileJsonMulti])
            .on_compile(|_, _| Ok("Segmentation fault".to_string()));
        let mut solc = Solc::new(module).unwrap();
        let output = solc.compile(SINGLE_SOURCE, CallbackSet::new()).unwrap();
        assert!(fatal_message(&output).starts_with("Compiler returned invalid JSON: "));
    }

    #[test]
    fn test_bad_library_address_is_fatal() {
        let raw = legacy_output();
        let module = FakeModule::new(&[EntryPoint::Malloc, EntryPoint::CompileJsonMulti])
            .on_compile(move |_, _| Ok(raw.clone()));
        let mut solc = Solc::new(module).unwrap();
        let input = r#"{
            "language": "Solidity",
            "sources": {"a.sol": {"content": ""}},
            "settings": {"libraries": {"b.sol:B": "1234"}}
        }"#;
        let output = solc.compile(input, CallbackSet::new()).unwrap();
        assert!(fatal_message(&output).starts_with("Invalid address specified for "));
    }

    #[test]
    fn test_version_and_license() {
        let mut solc = Solc::new(FakeModule::modern()).unwrap();
        assert_eq!(solc.version().unwrap(), FAKE_VERSION);
        assert_eq!(solc.license().unwrap().as_deref(), Some(FAKE_LICENSE));
        assert_eq!(solc.semver().unwrap(), FAKE_VERSION);

        let old = FakeModule::new(&[EntryPoint::Malloc, EntryPoint::Version, EntryPoint::CompileJson]);
        let mut solc = Solc::new(old).unwrap();
        assert_eq!(solc.version().unwrap(), FAKE_VERSION);
        assert_eq!(solc.license().unwrap(), None);

        let mut solc = Solc::new(FakeModule::new(&[EntryPoint::Malloc])).unwrap();
        assert!(matches!(solc.version(), Err(BridgeError::MissingEntryPoint { .. })));
    }

    #[test]
    fn test_features() {
        let solc = Solc::new(FakeModule::modern()).unwrap();
        assert_eq!(
            solc.features(),
            Features {
                legacy_single_input: false,
                multiple_inputs: true,
                import_callback: true,
                native_standard_json: true,
            }
        );

        let solc = Solc::new(FakeModule::new(&[EntryPoint::Malloc, EntryPoint::CompileJsonMulti])).unwrap();
        let features = solc.features();
        assert!(features.multiple_inputs && !features.import_callback && !features.native_standard_json);
    }
}
