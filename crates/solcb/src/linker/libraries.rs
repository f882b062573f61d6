//! Library address maps
//!
//! Two shapes are accepted: the standard JSON form `{file: {Name: address}}`
//! and the older flat form `{"file:Name": address}` or `{Name: address}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Hex characters in a 20-byte address
pub const ADDRESS_HEX_LEN: usize = 40;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Invalid address specified for {library}")]
    InvalidAddress { library: String },
}

/// One value in a [`LibraryAddressMap`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LibraryEntry {
    /// `"file:Name"` or `"Name"` mapped straight to an address
    Address(String),
    /// A source unit mapping library names to addresses
    Nested(BTreeMap<String, String>),
}

/// Library references to deploy addresses, as supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryAddressMap(BTreeMap<String, LibraryEntry>);

impl LibraryAddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a flat entry (`"file:Name"` or `"Name"`)
    pub fn insert(&mut self, reference: impl Into<String>, address: impl Into<String>) {
        self.0.insert(reference.into(), LibraryEntry::Address(address.into()));
    }

    /// Add an entry under a source unit
    pub fn insert_nested(&mut self, file: impl Into<String>, name: impl Into<String>, address: impl Into<String>) {
        let entry = self
            .0
            .entry(file.into())
            .or_insert_with(|| LibraryEntry::Nested(BTreeMap::new()));
        match entry {
            LibraryEntry::Nested(names) => {
                names.insert(name.into(), address.into());
            }
            LibraryEntry::Address(_) => {
                *entry = LibraryEntry::Nested(BTreeMap::from([(name.into(), address.into())]));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten both shapes into reference name -> address
    ///
    /// Qualified and unqualified names are both registered wherever the
    /// unqualified name can be derived.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        let mut flat = BTreeMap::new();
        for (key, entry) in &self.0 {
            match entry {
                LibraryEntry::Nested(names) => {
                    for (name, address) in names {
                        flat.insert(name.clone(), address.clone());
                        flat.insert(format!("{key}:{name}"), address.clone());
                    }
                }
                LibraryEntry::Address(address) => {
                    if let Some((file, name)) = key.split_once(':') {
                        if !file.is_empty() && !name.is_empty() {
                            flat.insert(name.to_string(), address.clone());
                        }
                    }
                    flat.insert(key.clone(), address.clone());
                }
            }
        }
        flat
    }

    /// Flatten and validate, yielding zero-padded 40-character addresses
    pub fn resolve(&self) -> Result<BTreeMap<String, String>, LinkError> {
        self.flatten()
            .into_iter()
            .map(|(library, address)| {
                let padded = padded_address(&library, &address)?;
                Ok((library, padded))
            })
            .collect()
    }
}

/// Strip the `0x` prefix and left-pad to 40 hex characters
pub fn padded_address(library: &str, address: &str) -> Result<String, LinkError> {
    let hex = address
        .strip_prefix("0x")
        .filter(|hex| hex.len() <= ADDRESS_HEX_LEN && hex.bytes().all(|b| b.is_ascii_hexdigit()))
        .ok_or_else(|| LinkError::InvalidAddress {
            library: library.to_string(),
        })?;
    Ok(format!("{hex:0>40}"))
}
