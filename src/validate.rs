use std::{collections::BTreeMap, path::Path};

use hashbrown::HashSet;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    artifact::{read_png, IndexedImage, PixelMode},
    common::{TileIdx, COLORS_PER_PALETTE, TILE_PIXELS, TILE_SIZE},
    config::ValidationConfig,
    manifest::{ExtractionManifest, TileProvenance},
    persist::{load_json, save_keyed_json},
};

pub const VALIDATION_REPORT_FILE: &str = "validation_report.json";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Missing,
    Unreadable,
    DimensionMismatch,
    ModeMismatch,
    IndexOutOfRange,
    PaletteDrift,
    OffsetOutOfRange,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactIssue {
    pub kind: IssueKind,
    pub message: String,
}

impl ArtifactIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "issue", rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    Invalid(ArtifactIssue),
    ValidWithWarning(ArtifactIssue),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Verdict::Invalid(_))
    }

    pub fn issue(&self) -> Option<&ArtifactIssue> {
        match self {
            Verdict::Valid => None,
            Verdict::Invalid(issue) | Verdict::ValidWithWarning(issue) => Some(issue),
        }
    }
}

pub type EditedArtifacts = BTreeMap<TileIdx, Result<IndexedImage, ArtifactIssue>>;

fn check_palette(
    provenance: &TileProvenance,
    image: &IndexedImage,
    manifest: &ExtractionManifest,
    config: &ValidationConfig,
) -> Option<ArtifactIssue> {
    let Some(snapshot) = manifest.snapshot_palette(provenance) else {
        return Some(ArtifactIssue::new(
            IssueKind::PaletteDrift,
            format!("no snapshot palette {}", provenance.cgram_palette),
        ));
    };
    if image.palette.len() < COLORS_PER_PALETTE {
        return Some(ArtifactIssue::new(
            IssueKind::PaletteDrift,
            format!(
                "palette has {} entries, expected {}",
                image.palette.len(),
                COLORS_PER_PALETTE
            ),
        ));
    }
    let drifted: Vec<usize> = snapshot
        .colors
        .iter()
        .zip(&image.palette)
        .enumerate()
        .filter(|(_, (want, got))| want.max_channel_diff(got) > config.channel_tolerance)
        .map(|(i, _)| i)
        .collect();
    let &first = drifted.first()?;
    Some(ArtifactIssue::new(
        IssueKind::PaletteDrift,
        format!(
            "{} color(s) differ from palette {} by more than {}; first at index {}: {:?} vs {:?}",
            drifted.len(),
            provenance.cgram_palette,
            config.channel_tolerance,
            first,
            image.palette[first].channels(),
            snapshot.colors[first].channels()
        ),
    ))
}

/// Classifies one edited artifact. Hard constraints are checked in order and the first
/// failure wins; palette drift only ever downgrades to a warning.
pub fn validate_artifact(
    provenance: &TileProvenance,
    image: &IndexedImage,
    manifest: &ExtractionManifest,
    config: &ValidationConfig,
) -> Verdict {
    if image.width as usize != TILE_SIZE || image.height as usize != TILE_SIZE {
        return Verdict::Invalid(ArtifactIssue::new(
            IssueKind::DimensionMismatch,
            format!(
                "image is {}x{}, expected {}x{}",
                image.width, image.height, TILE_SIZE, TILE_SIZE
            ),
        ));
    }
    if image.mode != PixelMode::Indexed {
        return Verdict::Invalid(ArtifactIssue::new(
            IssueKind::ModeMismatch,
            format!("image is {:?}, expected indexed color", image.mode),
        ));
    }
    if image.pixels.len() != TILE_PIXELS {
        return Verdict::Invalid(ArtifactIssue::new(
            IssueKind::DimensionMismatch,
            format!("image has {} pixels, expected {}", image.pixels.len(), TILE_PIXELS),
        ));
    }
    if let Some((i, &p)) = image
        .pixels
        .iter()
        .enumerate()
        .find(|(_, &p)| p as usize >= COLORS_PER_PALETTE)
    {
        return Verdict::Invalid(ArtifactIssue::new(
            IssueKind::IndexOutOfRange,
            format!(
                "pixel ({}, {}) uses index {}, max is {}",
                i % TILE_SIZE,
                i / TILE_SIZE,
                p,
                COLORS_PER_PALETTE - 1
            ),
        ));
    }
    match check_palette(provenance, image, manifest, config) {
        Some(issue) => Verdict::ValidWithWarning(issue),
        None => Verdict::Valid,
    }
}

pub fn load_edited_artifacts(dir: &Path, manifest: &ExtractionManifest) -> EditedArtifacts {
    let mut artifacts = BTreeMap::new();
    for (&idx, provenance) in &manifest.tiles {
        let path = dir.join(&provenance.artifact);
        let loaded = if !path.exists() {
            Err(ArtifactIssue::new(
                IssueKind::Missing,
                format!("{} not found", path.display()),
            ))
        } else {
            read_png(&path).map_err(|e| ArtifactIssue::new(IssueKind::Unreadable, format!("{:#}", e)))
        };
        artifacts.insert(idx, loaded);
    }

    let known: HashSet<&str> = manifest.tiles.values().map(|p| p.artifact.as_str()).collect();
    let pattern = format!("{}/tile_*.png", dir.display());
    if let Ok(paths) = glob::glob(&pattern) {
        for path in paths.flatten() {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            if !known.contains(name.as_ref()) {
                warn!(
                    "{} is not in the manifest and will be ignored (renamed or palette changed?)",
                    path.display()
                );
            }
        }
    }
    artifacts
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total: usize,
    pub valid: usize,
    pub warnings: usize,
    pub invalid: usize,
    pub tiles: BTreeMap<TileIdx, Verdict>,
}

impl ValidationReport {
    pub fn verdict(&self, tile: TileIdx) -> Option<&Verdict> {
        self.tiles.get(&tile)
    }

    pub fn is_all_valid(&self) -> bool {
        self.invalid == 0
    }

    pub fn issues(&self) -> impl Iterator<Item = (TileIdx, &ArtifactIssue)> {
        self.tiles
            .iter()
            .filter_map(|(&idx, v)| v.issue().map(|issue| (idx, issue)))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        save_keyed_json(path, self)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        load_json(path)
    }
}

pub fn validate(
    manifest: &ExtractionManifest,
    artifacts: &EditedArtifacts,
    config: &ValidationConfig,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    for (&idx, provenance) in &manifest.tiles {
        let verdict = match artifacts.get(&idx) {
            Some(Ok(image)) => validate_artifact(provenance, image, manifest, config),
            Some(Err(issue)) => Verdict::Invalid(issue.clone()),
            None => Verdict::Invalid(ArtifactIssue::new(
                IssueKind::Missing,
                format!("no artifact supplied for tile {}", idx),
            )),
        };
        match &verdict {
            Verdict::Valid => report.valid += 1,
            Verdict::ValidWithWarning(_) => report.warnings += 1,
            Verdict::Invalid(_) => report.invalid += 1,
        }
        report.total += 1;
        report.tiles.insert(idx, verdict);
    }
    info!(
        "Validated {} tiles: {} valid, {} with warnings, {} invalid",
        report.total, report.valid, report.warnings, report.invalid
    );
    for (idx, issue) in report.issues() {
        warn!("tile {}: {:?}: {}", idx, issue.kind, issue.message);
    }
    report
}
