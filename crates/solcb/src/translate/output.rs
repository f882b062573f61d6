//! Standard JSON output documents
//!
//! Only the parts the legacy translation fills in are typed; everything the
//! compiler hands over verbatim (ABI, assembly, ASTs) stays a JSON value.

use crate::linker::LinkReferences;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Output in the modern nested layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOutput {
    #[serde(default)]
    pub errors: Vec<OutputError>,
    #[serde(default)]
    pub contracts: BTreeMap<String, BTreeMap<String, ContractOutput>>,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceOutput>,
}

impl NormalizedOutput {
    pub fn contract(&self, file: &str, name: &str) -> Option<&ContractOutput> {
        self.contracts.get(file)?.get(name)
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputError {
    #[serde(rename = "type")]
    pub kind: String,
    pub component: String,
    pub severity: Severity,
    pub message: String,
    pub formatted_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractOutput {
    pub abi: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub evm: EvmOutput,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_assembly: Option<Value>,
    #[serde(default)]
    pub bytecode: BytecodeOutput,
    #[serde(default)]
    pub deployed_bytecode: BytecodeOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_identifiers: Option<Value>,
    #[serde(default)]
    pub gas_estimates: GasEstimates,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BytecodeOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opcodes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_map: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_references: Option<LinkReferences>,
}

/// Gas estimates with every leaf as a decimal string or `"infinite"`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GasEstimates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation: Option<CreationGas>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationGas {
    pub code_deposit_cost: Value,
    pub execution_cost: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<usize>,
    #[serde(rename = "legacyAST", default, skip_serializing_if = "Option::is_none")]
    pub legacy_ast: Option<Value>,
}
