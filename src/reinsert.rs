use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::{info, warn};
use serde::Serialize;

use crate::{
    artifact::write_rgba_png,
    common::{TileIdx, TILE_BYTES},
    config::Config,
    error::{PipelineError, Result},
    extract::check_window,
    manifest::ExtractionManifest,
    persist::{backup_path, default_output_path, preview_path, save_keyed_json, write_atomic},
    sheet::{render_sheet, tiles_from_buffer},
    tile,
    validate::{validate, ArtifactIssue, EditedArtifacts, IssueKind, ValidationReport, Verdict},
};

pub const REINSERTION_REPORT_FILE: &str = "reinsertion_report.json";

#[derive(Clone, Debug, Default)]
pub struct ReinsertOptions {
    pub output: Option<PathBuf>,
    pub backup: bool,
    pub preview: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "issue", rename_all = "snake_case")]
pub enum TileOutcome {
    Written,
    Skipped(ArtifactIssue),
    Failed(ArtifactIssue),
}

#[derive(Clone, Debug, Serialize)]
pub struct ReinsertionReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub backup: Option<PathBuf>,
    pub preview: Option<PathBuf>,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_changed: usize,
    pub validation: ValidationReport,
    pub outcomes: BTreeMap<TileIdx, TileOutcome>,
}

impl ReinsertionReport {
    pub fn is_complete(&self) -> bool {
        self.skipped == 0 && self.failed == 0
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        save_keyed_json(path, self)
    }
}

pub fn reinsert_into(
    buffer: &mut [u8],
    manifest: &ExtractionManifest,
    artifacts: &EditedArtifacts,
    validation: &ValidationReport,
) -> (BTreeMap<TileIdx, TileOutcome>, usize) {
    let mut outcomes = BTreeMap::new();
    let mut bytes_changed = 0;
    let buffer_len = buffer.len();
    for (&idx, provenance) in &manifest.tiles {
        let outcome = match validation.verdict(idx) {
            Some(Verdict::Invalid(issue)) => TileOutcome::Skipped(issue.clone()),
            None => TileOutcome::Skipped(ArtifactIssue::new(
                IssueKind::Missing,
                format!("tile {} was not validated", idx),
            )),
            Some(Verdict::Valid | Verdict::ValidWithWarning(_)) => {
                let pixels = match artifacts.get(&idx) {
                    Some(Ok(image)) => image.tile_pixels(),
                    _ => None,
                };
                let start = provenance.offset.0;
                let target = start
                    .checked_add(TILE_BYTES)
                    .and_then(|end| buffer.get_mut(start..end));
                match (pixels, target) {
                    (None, _) => TileOutcome::Failed(ArtifactIssue::new(
                        IssueKind::Unreadable,
                        format!("tile {} could not be re-encoded", idx),
                    )),
                    (Some(_), None) => TileOutcome::Failed(ArtifactIssue::new(
                        IssueKind::OffsetOutOfRange,
                        format!(
                            "offset {} + {} is past the end of the source ({} bytes)",
                            provenance.offset,
                            TILE_BYTES,
                            buffer_len
                        ),
                    )),
                    (Some(pixels), Some(target)) => {
                        let encoded = tile::encode(&pixels);
                        bytes_changed += target.iter().zip(&encoded).filter(|(a, b)| a != b).count();
                        target.copy_from_slice(&encoded);
                        TileOutcome::Written
                    }
                }
            }
        };
        if let TileOutcome::Failed(issue) = &outcome {
            warn!("tile {}: {}", idx, issue.message);
        }
        outcomes.insert(idx, outcome);
    }
    (outcomes, bytes_changed)
}

fn read_source(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| PipelineError::io(path, e))
}

pub fn reinsert(
    manifest: &ExtractionManifest,
    artifacts: &EditedArtifacts,
    options: &ReinsertOptions,
    config: &Config,
) -> Result<ReinsertionReport> {
    let source_path = &manifest.sources.tiles;
    let original = read_source(source_path)?;
    check_window(original.len(), &manifest.window)?;

    let output = options
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(source_path));
    if output == *source_path && !options.backup {
        warn!("Overwriting source {} without a backup", source_path.display());
    }

    let backup = if options.backup {
        let path = backup_path(source_path)
            .map_err(|e| PipelineError::io(source_path, std::io::Error::other(e.to_string())))?;
        write_atomic(&path, &original).map_err(|e| PipelineError::io(&path, e))?;
        info!("Backed up {} to {}", source_path.display(), path.display());
        Some(path)
    } else {
        None
    };

    let validation = validate(manifest, artifacts, &config.validation);
    let mut buffer = original;
    let (outcomes, bytes_changed) = reinsert_into(&mut buffer, manifest, artifacts, &validation);
    write_atomic(&output, &buffer).map_err(|e| PipelineError::io(&output, e))?;

    let preview = if options.preview {
        let path = preview_path(&output);
        let tiles = tiles_from_buffer(manifest, &buffer);
        let sheet = render_sheet(manifest, &tiles, config.extraction.tiles_per_row);
        match write_rgba_png(&path, sheet.width, sheet.height, &sheet.data) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("Could not write preview: {}", e);
                None
            }
        }
    } else {
        None
    };

    let count = |f: fn(&TileOutcome) -> bool| outcomes.values().filter(|o| f(o)).count();
    let report = ReinsertionReport {
        source: source_path.clone(),
        output,
        backup,
        preview,
        written: count(|o| matches!(o, TileOutcome::Written)),
        skipped: count(|o| matches!(o, TileOutcome::Skipped(_))),
        failed: count(|o| matches!(o, TileOutcome::Failed(_))),
        bytes_changed,
        validation,
        outcomes,
    };
    info!(
        "Reinserted {} tiles into {} ({} skipped, {} failed, {} bytes changed)",
        report.written,
        report.output.display(),
        report.skipped,
        report.failed,
        report.bytes_changed
    );
    Ok(report)
}
