//! solcb - offline tools around the Solidity compiler bridge
//!
//! Usage: solcb [--verbose] <COMMAND> <INPUT|->

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use solc_bridge::linker::{LibraryAddressMap, find_link_references, link_bytecode};
use solc_bridge::translate::{pretty_print_legacy_assembly, translate_output, version_to_semver};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "solcb")]
#[command(version)]
#[command(about = "Link bytecode and normalize legacy Solidity compiler output", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace library placeholders in hex bytecode
    Link {
        /// Bytecode file, or - for stdin
        input: PathBuf,

        #[command(flatten)]
        libraries: LibraryArgs,
    },

    /// List library placeholders in hex bytecode as JSON
    LinkRefs {
        /// Bytecode file, or - for stdin
        input: PathBuf,
    },

    /// Normalize legacy compiler output into the standard JSON layout
    Translate {
        /// Legacy output JSON file, or - for stdin
        input: PathBuf,

        #[command(flatten)]
        libraries: LibraryArgs,
    },

    /// Pretty print legacy assembly JSON
    Asm {
        /// Assembly JSON file, or - for stdin
        input: PathBuf,

        /// Source file to annotate instructions with
        #[arg(long)]
        source: Option<PathBuf>,
    },

    /// Print the semver form of a compiler version string
    Semver { version: String },
}

#[derive(Args, Debug, Default)]
struct LibraryArgs {
    /// Library address, repeatable
    #[arg(short, long = "library", value_name = "NAME=ADDRESS")]
    library: Vec<String>,

    /// JSON file with a library address map
    #[arg(long, value_name = "FILE")]
    libraries: Option<PathBuf>,
}

impl LibraryArgs {
    fn address_map(&self) -> Result<LibraryAddressMap> {
        let mut map = match &self.libraries {
            Some(path) => {
                let text = read_input(path)?;
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid library map in {}", path.display()))?
            }
            None => LibraryAddressMap::new(),
        };
        for entry in &self.library {
            let (name, address) = parse_library(entry)?;
            map.insert(name, address);
        }
        Ok(map)
    }
}

fn parse_library(entry: &str) -> Result<(&str, &str)> {
    match entry.split_once('=') {
        Some((name, address)) if !name.is_empty() && !address.is_empty() => Ok((name, address)),
        _ => bail!("expected NAME=ADDRESS, got `{entry}`"),
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(cli.verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(io::stderr))
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

/// Log filter used when `RUST_LOG` is not set
fn default_filter(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Link { input, libraries } => {
            let bytecode = read_input(&input)?;
            let map = libraries.address_map()?;
            let linked = link_bytecode(bytecode.trim(), &map)?;
            println!("{linked}");
        }
        Command::LinkRefs { input } => {
            let bytecode = read_input(&input)?;
            let references = find_link_references(bytecode.trim());
            debug!(libraries = references.len(), "found link references");
            println!("{}", serde_json::to_string_pretty(&references)?);
        }
        Command::Translate { input, libraries } => {
            let raw = read_input(&input)?;
            let map = libraries.address_map()?;
            match translate_output(&raw, &map) {
                Ok(output) => println!("{}", serde_json::to_string_pretty(&output)?),
                Err(fatal) => println!("{}", fatal.to_json()),
            }
        }
        Command::Asm { input, source } => {
            let assembly: serde_json::Value = serde_json::from_str(&read_input(&input)?)
                .with_context(|| format!("invalid assembly JSON in {}", input.display()))?;
            let source = source.as_deref().map(read_input).transpose()?;
            print!("{}", pretty_print_legacy_assembly(&assembly, source.as_deref()));
        }
        Command::Semver { version } => println!("{}", version_to_semver(&version)),
    }
    Ok(())
}

/// Read a whole file, or stdin for `-`
fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("failed to read stdin")?;
        return Ok(text);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_library() {
        assert_eq!(parse_library("lib.sol:L=0x01").unwrap(), ("lib.sol:L", "0x01"));
        assert!(parse_library("lib.sol:L").is_err());
        assert!(parse_library("=0x01").is_err());
    }

    #[test]
    fn test_library_flags() {
        let cli = Cli::parse_from(["solcb", "link", "-", "--library", "L=0x01", "-l", "M=0x02"]);
        let Command::Link { libraries, .. } = cli.command else {
            panic!("expected link command");
        };
        let flat = libraries.address_map().unwrap().flatten();
        assert_eq!(flat.get("L").map(String::as_str), Some("0x01"));
        assert_eq!(flat.get("M").map(String::as_str), Some("0x02"));
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), "info");
        assert_eq!(default_filter(true), "debug");
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::parse_from(["solcb", "semver", "0.4.0", "--verbose"]);
        assert!(cli.verbose);
    }
}
