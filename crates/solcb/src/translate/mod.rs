//! Legacy output translation
//!
//! Compilers that predate standard JSON return a flat document:
//! `contracts` keyed by `file:Name`, `errors` as plain strings, numeric gas
//! estimates and ABI as an embedded JSON string. This module reshapes that
//! into the nested standard layout, linking bytecode on the way.

pub mod assembly;
pub mod output;

use crate::common::FatalError;
use crate::linker::{LibraryAddressMap, LinkError, find_link_references, link_bytecode};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

pub use assembly::pretty_print_legacy_assembly;
pub use output::{
    BytecodeOutput, ContractOutput, CreationGas, EvmOutput, GasEstimates, NormalizedOutput, OutputError,
    Severity, SourceOutput,
};

static ERROR_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*):(\d+):(\d+):(.*):").expect("error location pattern is valid"));

static CONTRACT_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^((.*):)?([^:]+)$").expect("contract key pattern is valid"));

static LEGACY_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9]+\.[0-9]+\.[0-9]+)-([0-9a-f]{8})[/*].*$").expect("version pattern is valid")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Failed to process output.")]
    Abort,

    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Parse raw legacy output and translate it
///
/// Every failure comes back as a fatal error ready to be rendered.
pub fn translate_output(raw: &str, libraries: &LibraryAddressMap) -> Result<NormalizedOutput, FatalError> {
    let parsed = parse_unbounded(raw)
        .map_err(|err| FatalError::new(format!("Compiler returned invalid JSON: {err}")))?;
    translate_json_compiler_output(&parsed, libraries).map_err(|err| FatalError::new(err.to_string()))
}

/// Parse JSON of any nesting depth
///
/// Legacy ASTs nest two levels per syntax node, well past serde_json's
/// default limit. Deep input grows the stack on the heap instead.
fn parse_unbounded(raw: &str) -> serde_json::Result<Value> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    deserializer.disable_recursion_limit();
    let value = Value::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
    deserializer.end()?;
    Ok(value)
}

/// Translate a parsed legacy output document
pub fn translate_json_compiler_output(
    output: &Value,
    libraries: &LibraryAddressMap,
) -> Result<NormalizedOutput, TranslateError> {
    let output = output.as_object().ok_or(TranslateError::Abort)?;
    let mut translated = NormalizedOutput {
        errors: translate_errors(output),
        ..NormalizedOutput::default()
    };

    for (key, contract) in object_field(output, "contracts")? {
        let (file, name) = split_contract_key(key).ok_or(TranslateError::Abort)?;
        let contract = translate_contract(contract, libraries)?;
        translated.contracts.entry(file).or_default().insert(name, contract);
    }

    let source_ids = source_index(output);
    for (path, source) in object_field(output, "sources")? {
        translated.sources.insert(
            path.clone(),
            SourceOutput {
                id: source_ids.get(path.as_str()).copied(),
                legacy_ast: source.get("AST").cloned(),
            },
        );
    }

    Ok(translated)
}

/// Classify legacy error strings
///
/// A single top-level `error` wins over the `errors` list.
pub fn translate_errors(output: &Map<String, Value>) -> Vec<OutputError> {
    let errors = match output.get("error") {
        Some(error) if is_present(error) => vec![error.clone()],
        _ => output
            .get("errors")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    };

    errors
        .iter()
        .map(|error| {
            let message = error.as_str().map_or_else(|| error.to_string(), str::to_string);
            let kind = error_type(&message);
            let severity = if kind == "Warning" {
                Severity::Warning
            } else {
                Severity::Error
            };
            OutputError {
                kind,
                component: "general".to_string(),
                severity,
                formatted_message: message.clone(),
                message,
            }
        })
        .collect()
}

fn error_type(message: &str) -> String {
    if let Some(location) = ERROR_LOCATION.captures(message) {
        if let Some(kind) = location.get(4) {
            return kind.as_str().trim().to_string();
        }
    }
    if message.contains(": Warning:") {
        "Warning".to_string()
    } else {
        "Error".to_string()
    }
}

/// Translate gas estimates: `null` is `"infinite"`, numbers become strings
pub fn translate_gas_estimates(estimate: &Value) -> Value {
    match estimate {
        Value::Null => Value::String("infinite".to_string()),
        Value::Number(n) => Value::String(n.to_string()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.clone(), translate_gas_estimates(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Split `file:Name`, `:Name` or `Name` into file and contract name
fn split_contract_key(key: &str) -> Option<(String, String)> {
    let parts = CONTRACT_KEY.captures(key)?;
    let file = parts.get(2).map_or("", |m| m.as_str());
    let name = parts.get(3)?.as_str();
    Some((file.to_string(), name.to_string()))
}

fn translate_contract(contract: &Value, libraries: &LibraryAddressMap) -> Result<ContractOutput, TranslateError> {
    let contract = contract.as_object().ok_or(TranslateError::Abort)?;

    let abi = contract
        .get("interface")
        .and_then(Value::as_str)
        .and_then(|abi| serde_json::from_str(abi).ok())
        .ok_or(TranslateError::Abort)?;

    let mut bytecode = link_section(contract.get("bytecode"), libraries)?;
    bytecode.opcodes = contract.get("opcodes").cloned();
    bytecode.source_map = contract.get("srcmap").cloned();

    let mut deployed_bytecode = link_section(contract.get("runtimeBytecode"), libraries)?;
    deployed_bytecode.source_map = contract.get("srcmapRuntime").cloned();

    Ok(ContractOutput {
        abi,
        metadata: contract.get("metadata").cloned(),
        evm: EvmOutput {
            legacy_assembly: contract.get("assembly").cloned(),
            bytecode,
            deployed_bytecode,
            method_identifiers: contract.get("functionHashes").cloned(),
            gas_estimates: translate_contract_gas(contract.get("gasEstimates")),
        },
    })
}

/// Link `raw` and record link references found in the unlinked code
fn link_section(raw: Option<&Value>, libraries: &LibraryAddressMap) -> Result<BytecodeOutput, TranslateError> {
    let Some(code) = raw.and_then(Value::as_str) else {
        return Ok(BytecodeOutput::default());
    };
    Ok(BytecodeOutput {
        object: Some(link_bytecode(code, libraries)?),
        link_references: Some(find_link_references(code)),
        ..BytecodeOutput::default()
    })
}

fn translate_contract_gas(raw: Option<&Value>) -> GasEstimates {
    let Some(raw) = raw.and_then(Value::as_object) else {
        return GasEstimates::default();
    };
    // Legacy creation estimates are `[execution, codeDeposit]`.
    let creation = raw.get("creation").filter(|c| is_present(c)).map(|creation| CreationGas {
        code_deposit_cost: translate_gas_estimates(creation.get(1).unwrap_or(&Value::Null)),
        execution_cost: translate_gas_estimates(creation.get(0).unwrap_or(&Value::Null)),
    });
    GasEstimates {
        creation,
        internal: raw.get("internal").filter(|v| is_present(v)).map(translate_gas_estimates),
        external: raw.get("external").filter(|v| is_present(v)).map(translate_gas_estimates),
    }
}

/// Invert `sourceList` into path -> index
fn source_index(output: &Map<String, Value>) -> BTreeMap<&str, usize> {
    output
        .get("sourceList")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .enumerate()
                .filter_map(|(index, path)| path.as_str().map(|path| (path, index)))
                .collect()
        })
        .unwrap_or_default()
}

/// Entries of an optional object field; anything other than an object or null aborts
fn object_field<'a>(
    output: &'a Map<String, Value>,
    key: &str,
) -> Result<impl Iterator<Item = (&'a String, &'a Value)>, TranslateError> {
    let entries = match output.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::Object(entries)) => Some(entries),
        Some(_) => return Err(TranslateError::Abort),
    };
    Ok(entries.into_iter().flatten())
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Convert a compiler version string to semver
///
/// `0.4.11-8f4f6f7c/RelWithDebInfo-Linux` style strings from early releases
/// become `0.4.11+commit.8f4f6f7c`.
pub fn version_to_semver(version: &str) -> String {
    if let Some(parts) = LEGACY_VERSION.captures(version) {
        if let (Some(release), Some(commit)) = (parts.get(1), parts.get(2)) {
            return format!("{}+commit.{}", release.as_str(), commit.as_str());
        }
    }
    if version.contains("0.1.3-0") {
        return "0.1.3".to_string();
    }
    if version.contains("0.3.5-0") {
        return "0.3.5".to_string();
    }
    version.to_string()
}
