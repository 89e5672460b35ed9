use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use itertools::Itertools;
use log::error;

use sprite_roundtrip::{
    common::{ByteOffset, CgramPalette},
    config::Config,
    extract::{extract_to_dir, ExtractRequest},
    manifest::{ExtractionManifest, SourceFiles, Window},
    oam::SpriteAttributeMap,
    reinsert::{reinsert, ReinsertOptions, TileOutcome, REINSERTION_REPORT_FILE},
    resolve::load_external_mapping,
    validate::{load_edited_artifacts, validate, VALIDATION_REPORT_FILE},
};

/// Extract sprite tiles from memory dumps, validate edits, and write them back.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Config file; defaults to config.json in the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Slice a tile memory dump into indexed PNGs plus a manifest
    Extract {
        /// Tile memory dump
        tiles: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Palette memory dump (grayscale palettes if omitted)
        #[arg(long)]
        palettes: Option<PathBuf>,

        /// Sprite attribute memory dump
        #[arg(long)]
        attributes: Option<PathBuf>,

        /// JSON tile-to-palette mapping, e.g. from an emulator trace
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// Window start, decimal or 0x hex
        #[arg(long, default_value = "0", value_parser = parse_number)]
        offset: usize,

        /// Window length in bytes (rest of the dump if omitted)
        #[arg(long, value_parser = parse_number)]
        length: Option<usize>,

        /// Window tile index of sprite tile 0
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        attribute_base: i32,

        /// Use the palette heuristic instead of palette 0 for unmapped tiles
        #[arg(long)]
        heuristic: bool,
    },
    /// Check edited PNGs in an extraction directory
    Validate {
        dir: PathBuf,
    },
    /// Write validated PNGs back into a copy of the tile dump
    Reinsert {
        dir: PathBuf,

        /// Output dump (defaults to <source>_edited beside the source)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip writing a backup of the source dump
        #[arg(long)]
        no_backup: bool,

        /// Skip rendering <output>_preview.png
        #[arg(long)]
        no_preview: bool,
    },
    /// Summarize sprite attribute memory
    Oam {
        attributes: PathBuf,

        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        attribute_base: i32,

        /// Write the decoded sprite list as JSON
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

fn parse_number(s: &str) -> Result<usize, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {:?}: {}", s, e))
}

fn run(args: Args) -> Result<bool> {
    let config = Config::load(args.config.as_deref())?;
    match args.command {
        Command::Extract {
            tiles,
            output,
            palettes,
            attributes,
            mapping,
            offset,
            length,
            attribute_base,
            heuristic,
        } => {
            let window = match length {
                Some(length) => Window { offset, length },
                None => {
                    let size = std::fs::metadata(&tiles)
                        .with_context(|| format!("reading {}", tiles.display()))?
                        .len() as usize;
                    Window::to_end(offset, size)
                }
            };
            let external_mapping = mapping
                .as_deref()
                .map(load_external_mapping)
                .transpose()?;
            let request = ExtractRequest {
                sources: SourceFiles {
                    tiles,
                    palettes,
                    attributes,
                },
                window,
                attribute_base,
                external_mapping,
                heuristic_default: heuristic,
            };
            let extraction = extract_to_dir(&request, &output, &config)?;
            println!(
                "Extracted {} tiles from {}..{} into {}",
                extraction.artifacts.len(),
                ByteOffset(window.offset),
                ByteOffset(window.offset.saturating_add(window.length)),
                output.display()
            );
            Ok(true)
        }
        Command::Validate { dir } => {
            let manifest = ExtractionManifest::load_dir(&dir)?;
            let artifacts = load_edited_artifacts(&dir, &manifest);
            let report = validate(&manifest, &artifacts, &config.validation);
            report.save(&dir.join(VALIDATION_REPORT_FILE))?;
            for (idx, issue) in report.issues() {
                println!("tile {:4}: {:?}: {}", idx, issue.kind, issue.message);
            }
            println!(
                "{} tiles: {} valid, {} with warnings, {} invalid",
                report.total, report.valid, report.warnings, report.invalid
            );
            Ok(report.is_all_valid())
        }
        Command::Reinsert {
            dir,
            output,
            no_backup,
            no_preview,
        } => {
            let manifest = ExtractionManifest::load_dir(&dir)?;
            let artifacts = load_edited_artifacts(&dir, &manifest);
            let options = ReinsertOptions {
                output,
                backup: !no_backup,
                preview: !no_preview,
            };
            let report = reinsert(&manifest, &artifacts, &options, &config)?;
            report.save(&dir.join(REINSERTION_REPORT_FILE))?;
            for (idx, outcome) in &report.outcomes {
                match outcome {
                    TileOutcome::Written => {}
                    TileOutcome::Skipped(issue) => {
                        println!("tile {:4}: skipped: {}", idx, issue.message)
                    }
                    TileOutcome::Failed(issue) => {
                        println!("tile {:4}: failed: {}", idx, issue.message)
                    }
                }
            }
            if let Some(backup) = &report.backup {
                println!("Backup: {}", backup.display());
            }
            if let Some(preview) = &report.preview {
                println!("Preview: {}", preview.display());
            }
            println!(
                "Wrote {} tiles ({} skipped, {} failed) to {}",
                report.written,
                report.skipped,
                report.failed,
                report.output.display()
            );
            Ok(report.is_complete())
        }
        Command::Oam {
            attributes,
            attribute_base,
            save,
        } => {
            let map = SpriteAttributeMap::load(&attributes, &config.oam)?;
            if let Some(path) = &save {
                map.listing().save(path)?;
            }
            let stats = map.usage_stats();
            println!(
                "{} sprites, {} visible",
                stats.total_sprites, stats.visible_sprites
            );
            for (palette, count) in &stats.palette_counts {
                println!(
                    "palette {} (memory {}): {} sprites",
                    palette,
                    CgramPalette::from(*palette),
                    count
                );
            }
            let tiles = map.build_tile_palette_map(attribute_base);
            println!(
                "{} tiles mapped: {}",
                tiles.len(),
                tiles
                    .iter()
                    .sorted()
                    .map(|(tile, pal)| format!("{}:{}", tile, pal))
                    .join(" ")
            );
            Ok(true)
        }
    }
}

pub fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
