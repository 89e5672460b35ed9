use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    common::{ByteOffset, CgramPalette, OamPalette, TileIdx, TILE_BYTES},
    error::{PipelineError, Result},
    palette::{Palette, PaletteBank},
    persist::{to_keyed_json_bytes, write_atomic},
    resolve::StrategyKind,
};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFiles {
    pub tiles: PathBuf,
    pub palettes: Option<PathBuf>,
    pub attributes: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub offset: usize,
    pub length: usize,
}

impl Window {
    pub fn to_end(offset: usize, size: usize) -> Self {
        let remaining = size.saturating_sub(offset);
        let trailing = remaining % TILE_BYTES;
        if trailing != 0 {
            warn!(
                "Ignoring {} trailing bytes after the last whole tile at {}",
                trailing,
                ByteOffset(offset + remaining - trailing)
            );
        }
        Window {
            offset,
            length: remaining - trailing,
        }
    }

    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn tile_count(&self) -> usize {
        self.length / TILE_BYTES
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileProvenance {
    pub tile: TileIdx,
    pub offset: ByteOffset,
    pub palette: OamPalette,
    pub cgram_palette: CgramPalette,
    pub resolved_by: StrategyKind,
    pub artifact: String,
}

impl TileProvenance {
    pub fn new(
        tile: TileIdx,
        offset: ByteOffset,
        palette: OamPalette,
        resolved_by: StrategyKind,
    ) -> Self {
        Self {
            tile,
            offset,
            palette,
            cgram_palette: palette.into(),
            resolved_by,
            artifact: artifact_file_name(tile, palette),
        }
    }
}

pub fn artifact_file_name(tile: TileIdx, palette: OamPalette) -> String {
    format!("tile_{:04}_pal{}.png", tile, palette)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionManifest {
    pub format_version: u32,
    pub sources: SourceFiles,
    pub window: Window,
    pub tiles: BTreeMap<TileIdx, TileProvenance>,
    pub palettes: PaletteBank,
}

impl ExtractionManifest {
    pub fn new(sources: SourceFiles, window: Window, palettes: PaletteBank) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            sources,
            window,
            tiles: BTreeMap::new(),
            palettes,
        }
    }

    pub fn snapshot_palette(&self, provenance: &TileProvenance) -> Option<&Palette> {
        self.palettes.palette(provenance.cgram_palette.0 as usize)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        info!("Saving manifest with {} tiles to {}", self.tiles.len(), path.display());
        let data = to_keyed_json_bytes(self).map_err(|e| PipelineError::Manifest {
            path: path.to_owned(),
            source: e,
        })?;
        write_atomic(path, &data).map_err(|e| PipelineError::io(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading manifest {}", path.display());
        let data = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::from_slice(&data).map_err(|e| PipelineError::Manifest {
            path: path.to_owned(),
            source: e,
        })
    }

    pub fn load_dir(dir: &Path) -> Result<Self> {
        Self::load(&dir.join(MANIFEST_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExtractionManifest {
        let mut m = ExtractionManifest::new(
            SourceFiles {
                tiles: PathBuf::from("/dumps/vram.dmp"),
                palettes: Some(PathBuf::from("/dumps/cgram.dmp")),
                attributes: None,
            },
            Window {
                offset: 0xC000,
                length: 0x100,
            },
            PaletteBank::grayscale(),
        );
        let p = TileProvenance::new(3, ByteOffset(0xC060), OamPalette(2), StrategyKind::External);
        m.tiles.insert(3, p);
        m
    }

    #[test]
    fn test_provenance_numbering() {
        let p = TileProvenance::new(12, ByteOffset(0x180), OamPalette(5), StrategyKind::Fixed);
        assert_eq!(p.cgram_palette, CgramPalette(13));
        assert_eq!(p.artifact, "tile_0012_pal5.png");
    }

    #[test]
    fn test_snapshot_palette_uses_global_id() {
        let m = sample();
        let p = &m.tiles[&3];
        assert_eq!(m.snapshot_palette(p), m.palettes.palette(10));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        let m = sample();
        m.save(&path).unwrap();
        assert!(!dir.path().join("manifest.json.tmp").exists());
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"3\": {"));
        assert!(text.contains("\"artifact\": \"tile_0003_pal2.png\""));
        let back = ExtractionManifest::load_dir(dir.path()).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.tiles[&3].offset, ByteOffset(0xC060));
    }

    #[test]
    fn test_load_garbage_is_manifest_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ExtractionManifest::load(&path),
            Err(PipelineError::Manifest { .. })
        ));
    }

    #[test]
    fn test_window_tile_count() {
        let w = Window {
            offset: 64,
            length: 96,
        };
        assert_eq!(w.tile_count(), 3);
        assert_eq!(w.end(), 160);
    }

    #[test]
    fn test_window_to_end_drops_partial_tile() {
        assert_eq!(Window::to_end(0x40, 0x40 + 100), Window { offset: 0x40, length: 96 });
        assert_eq!(Window::to_end(0, 64), Window { offset: 0, length: 64 });
        assert_eq!(Window::to_end(10, 20), Window { offset: 10, length: 0 });
        assert_eq!(Window::to_end(50, 20), Window { offset: 50, length: 0 });
    }
}
