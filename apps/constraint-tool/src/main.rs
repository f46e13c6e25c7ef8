//! CLI tool for constraint definitions.
//!
//! Decodes a MessagePack constraint map (from a file or a hex string),
//! collocates the result and prints every definition as JSON together with
//! its hashes and the footprint of the collocated block.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use tuple_constraint_core::constraint_def::{collocate, decode, decode_fkey, ConstraintDef};
use tuple_constraint_core::murmur::MurmurHasher32;
use tuple_constraint_core::{ConstraintConfig, Region, TupleConstraint};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a constraint map and print the definitions
    Decode {
        /// File holding the MessagePack map
        #[arg(short, long, conflicts_with = "hex")]
        input: Option<PathBuf>,

        /// The MessagePack map as a hex string
        #[arg(long)]
        hex: Option<String>,

        /// Shape of the map
        #[arg(short, long, value_enum, default_value_t = Form::Func)]
        form: Form,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Hash seed
        #[arg(long, default_value_t = 0)]
        seed: u32,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Form {
    /// `{name: function_id}`
    Func,
    /// `{name: {space, field}}`
    Fkey,
    /// `{name: {space, field_mapping}}`
    FkeyComplex,
}

#[derive(Serialize)]
struct DefReport<'a> {
    #[serde(flatten)]
    def: &'a ConstraintDef,
    hash: u32,
    entity_hash: u32,
}

#[derive(Serialize)]
struct Footprint {
    count: usize,
    object_size: usize,
    additional_size: usize,
    strings_size: usize,
    total_size: usize,
    /// Bytes of the runtime area and string region allocation
    allocated_size: usize,
}

#[derive(Serialize)]
struct Report<'a> {
    definitions: Vec<DefReport<'a>>,
    footprint: Option<Footprint>,
    region_used: usize,
}

fn read_input(input: Option<PathBuf>, hex: Option<String>) -> anyhow::Result<Vec<u8>> {
    match (input, hex) {
        (Some(path), _) => {
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
        }
        (None, Some(text)) => hex::decode(text.trim()).context("Invalid hex input"),
        (None, None) => bail!("either --input or --hex is required"),
    }
}

fn hash_with(seed: u32, f: impl FnOnce(&mut MurmurHasher32) -> u32) -> u32 {
    let mut hasher = MurmurHasher32::new(seed);
    f(&mut hasher);
    hasher.finish()
}

fn footprint(defs: &[ConstraintDef]) -> Option<Footprint> {
    TupleConstraint::collocate(defs).map(|block| {
        let layout = block.layout();
        Footprint {
            count: layout.count(),
            object_size: layout.object_size(),
            additional_size: layout.additional_size(),
            strings_size: layout.strings_size(),
            total_size: layout.total_size(),
            allocated_size: block.runtime().len() + block.strings().len(),
        }
    })
}

fn run_decode(
    data: &[u8],
    form: Form,
    config: &ConstraintConfig,
    seed: u32,
) -> anyhow::Result<()> {
    let mut region = Region::from_config(config);
    let mut defs = Vec::new();
    let mut cursor = data;
    match form {
        Form::Func => decode(&mut cursor, &mut defs, &mut region),
        Form::Fkey => decode_fkey(&mut cursor, &mut defs, &mut region, false),
        Form::FkeyComplex => decode_fkey(&mut cursor, &mut defs, &mut region, true),
    }
    .context("Failed to decode constraints")?;
    if !cursor.is_empty() {
        tracing::warn!("{} trailing bytes after the constraint map", cursor.len());
    }
    tracing::info!("Decoded {} constraint definitions", defs.len());

    // Collocated copies must compare equal to what was decoded.
    if let Some(block) = collocate(&defs) {
        if block.iter().zip(&defs).any(|(copy, def)| copy != def) {
            bail!("collocated copy differs from the decoded definition");
        }
    }

    let report = Report {
        definitions: defs
            .iter()
            .map(|def| DefReport {
                def,
                hash: hash_with(seed, |hasher| def.hash_process(hasher)),
                entity_hash: hash_with(seed, |hasher| def.hash_process_entity(hasher)),
            })
            .collect(),
        footprint: footprint(&defs),
        region_used: region.used(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Decode {
            input,
            hex,
            form,
            config,
            seed,
        } => {
            let config = match config {
                Some(path) => ConstraintConfig::from_json_file(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => ConstraintConfig::default(),
            };
            let data = read_input(input, hex)?;
            run_decode(&data, form, &config, seed)
        }
    }
}
