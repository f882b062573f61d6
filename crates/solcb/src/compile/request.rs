//! Standard JSON compile requests
//!
//! Only the fields the bridge itself needs are typed. The request is
//! validated here and, for modern compilers, forwarded verbatim.

use crate::common::FatalError;
use crate::linker::LibraryAddressMap;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Solidity,
    Yul,
}

impl FromStr for Language {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Solidity" => Ok(Language::Solidity),
            "Yul" => Ok(Language::Yul),
            _ => Err(()),
        }
    }
}

/// One entry of `sources`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SourceInput {
    pub content: Option<String>,
    #[serde(default)]
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub optimizer: Option<OptimizerSettings>,
    pub libraries: Option<LibraryAddressMap>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptimizerSettings {
    pub enabled: Option<bool>,
    pub runs: Option<u64>,
}

/// A parsed standard JSON request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompileRequest {
    language: Option<String>,
    sources: Option<BTreeMap<String, Option<SourceInput>>>,
    #[serde(default)]
    settings: Settings,
}

impl CompileRequest {
    pub fn parse(input: &str) -> Result<Self, FatalError> {
        serde_json::from_str(input).map_err(|err| FatalError::new(format!("Invalid JSON supplied: {err}")))
    }

    pub fn language(&self) -> Option<Language> {
        self.language.as_deref()?.parse().ok()
    }

    pub fn optimize(&self) -> bool {
        self.settings
            .optimizer
            .as_ref()
            .and_then(|optimizer| optimizer.enabled)
            .unwrap_or(false)
    }

    pub fn libraries(&self) -> LibraryAddressMap {
        self.settings.libraries.clone().unwrap_or_default()
    }

    /// Checks for compilers that take the request as is
    ///
    /// A source may name `urls` instead of inline `content`; the compiler
    /// fetches those through the import callback.
    pub fn validate_standard(&self) -> Result<(), FatalError> {
        if self.language().is_none() {
            return Err(FatalError::new(r#"Only "Solidity" or "Yul" is supported as a language."#));
        }
        for source in self.declared_sources()?.values() {
            match source {
                Some(source) if source.content.is_some() || !source.urls.is_empty() => {}
                _ => return Err(FatalError::new("Failed to process sources.")),
            }
        }
        Ok(())
    }

    /// Source id -> content, for compilers that predate standard JSON
    pub fn legacy_sources(&self) -> Result<BTreeMap<String, String>, FatalError> {
        if self.language() != Some(Language::Solidity) {
            return Err(FatalError::new(r#"Only "Solidity" is supported as a language."#));
        }
        self.declared_sources()?
            .iter()
            .map(|(id, source)| match source.as_ref().and_then(|s| s.content.clone()) {
                Some(content) => Ok((id.clone(), content)),
                None => Err(FatalError::new("Failed to process sources.")),
            })
            .collect()
    }

    fn declared_sources(&self) -> Result<&BTreeMap<String, Option<SourceInput>>, FatalError> {
        self.sources
            .as_ref()
            .filter(|sources| !sources.is_empty())
            .ok_or_else(|| FatalError::new("No input sources specified."))
    }
}

/// `{"sources": {<id>: <content>}}` as taken by the multi-file legacy entry points
pub fn legacy_input(sources: &BTreeMap<String, String>) -> String {
    json!({ "sources": sources }).to_string()
}
