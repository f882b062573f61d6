//! Bytecode linker
//!
//! Unlinked bytecode carries 40-character placeholders where library
//! addresses go. Old compilers write `__<name padded with underscores>__`,
//! newer ones `__$<34 hex chars of keccak256(name)>$__`. Linking replaces
//! both forms; reference discovery reports where placeholders sit.

mod libraries;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub use libraries::{ADDRESS_HEX_LEN, LibraryAddressMap, LibraryEntry, LinkError, padded_address};

/// Width of a placeholder in hex characters
pub const PLACEHOLDER_LEN: usize = 40;

/// Bytes occupied by a linked address
pub const ADDRESS_BYTES: usize = 20;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"__(.{36})__").expect("placeholder pattern is valid")
});

/// Byte range of one placeholder occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReference {
    pub start: usize,
    pub length: usize,
}

/// Placeholder occurrences per library name
pub type LinkReferences = BTreeMap<String, Vec<LinkReference>>;

/// Legacy placeholder for `name`: truncated to 36 characters, padded with `_`
pub fn library_label(name: &str) -> String {
    let truncated: String = name.chars().take(36).collect();
    format!("__{truncated:_<36}__")
}

/// `$<first 34 hex chars of keccak256(name)>$`
pub fn library_hash_placeholder(name: &str) -> String {
    let digest = hex::encode(Keccak256::digest(name.as_bytes()));
    format!("${}$", &digest[..34])
}

/// Replace every placeholder of every library in `libraries`
///
/// Libraries that do not occur in the bytecode are ignored.
pub fn link_bytecode(bytecode: &str, libraries: &LibraryAddressMap) -> Result<String, LinkError> {
    let mut linked = bytecode.to_string();
    for (name, address) in libraries.resolve()? {
        for label in [library_label(&name), library_label(&library_hash_placeholder(&name))] {
            // The address is pure hex, so substituting it never forms a new label.
            if linked.contains(&label) {
                linked = linked.replace(&label, &address);
            }
        }
    }
    Ok(linked)
}

/// Find every `__<36 characters>__` placeholder in `bytecode`
///
/// The library name is the placeholder body with trailing underscores
/// removed. A name that really ends in underscores cannot be told apart from
/// padding and comes back shortened. Offsets are in bytes, not hex
/// characters.
pub fn find_link_references(bytecode: &str) -> LinkReferences {
    let mut references = LinkReferences::new();
    let mut offset = 0;
    let mut rest = bytecode;

    while let Some(found) = PLACEHOLDER.captures(rest) {
        let (Some(whole), Some(body)) = (found.get(0), found.get(1)) else {
            break;
        };
        let name = body.as_str().trim_end_matches('_');
        references
            .entry(name.to_string())
            .or_default()
            .push(LinkReference {
                start: (offset + whole.start()) / 2,
                length: ADDRESS_BYTES,
            });

        offset += whole.end();
        rest = &rest[whole.end()..];
    }

    references
}
