use std::{collections::BTreeMap, path::Path};

use itertools::Itertools;
use log::{info, warn};

use crate::{
    artifact::{write_indexed_png, write_rgba_png, IndexedImage},
    common::{ByteOffset, TileBytes, TileIdx, TilePixels, TILE_BYTES},
    config::Config,
    error::{PipelineError, Result},
    heuristic::choose_palette,
    manifest::{ExtractionManifest, SourceFiles, TileProvenance, Window, MANIFEST_FILE},
    oam::{SpriteAttributeMap, TilePaletteMap},
    palette::PaletteBank,
    resolve::{PaletteStrategy, ResolutionStack},
    sheet::{render_sheet, CompanionPalette, COMPANION_PALETTE_FILE, REFERENCE_SHEET_FILE},
    tile,
};

#[derive(Clone, Debug)]
pub struct TileArtifact {
    pub provenance: TileProvenance,
    pub pixels: TilePixels,
    pub image: IndexedImage,
}

#[derive(Clone, Debug)]
pub struct Extraction {
    pub manifest: ExtractionManifest,
    pub artifacts: Vec<TileArtifact>,
}

impl Extraction {
    pub fn tile_pixels(&self) -> BTreeMap<TileIdx, TilePixels> {
        self.artifacts
            .iter()
            .map(|a| (a.provenance.tile, a.pixels))
            .collect()
    }
}

pub fn check_window(source_len: usize, window: &Window) -> Result<()> {
    if window.length % TILE_BYTES != 0 {
        return Err(PipelineError::Range(format!(
            "window length {} is not a multiple of {}",
            window.length, TILE_BYTES
        )));
    }
    if window.offset.checked_add(window.length).map_or(true, |end| end > source_len) {
        return Err(PipelineError::Range(format!(
            "window {}+{} exceeds source size {}",
            ByteOffset(window.offset),
            window.length,
            source_len
        )));
    }
    if window.tile_count() > TileIdx::MAX as usize + 1 {
        return Err(PipelineError::Range(format!(
            "window holds {} tiles, more than can be numbered",
            window.tile_count()
        )));
    }
    Ok(())
}

// All-zero tiles are skipped without renumbering the rest.
pub fn extract(
    source: &[u8],
    window: Window,
    stack: &ResolutionStack,
    palettes: PaletteBank,
    sources: SourceFiles,
) -> Result<Extraction> {
    check_window(source.len(), &window)?;
    let mut manifest = ExtractionManifest::new(sources, window, palettes);
    let mut artifacts = vec![];

    let data = &source[window.offset..window.end()];
    let mut skipped = 0;
    for (i, chunk) in data.chunks_exact(TILE_BYTES).enumerate() {
        if chunk.iter().all(|&b| b == 0) {
            skipped += 1;
            continue;
        }
        let idx = i as TileIdx;
        let bytes: &TileBytes = chunk
            .try_into()
            .map_err(|_| PipelineError::Range(format!("short tile at index {}", idx)))?;
        let Some((palette, kind)) = stack.resolve(idx) else {
            return Err(PipelineError::Range(format!(
                "no palette strategy resolved tile {}",
                idx
            )));
        };
        let pixels = tile::decode(bytes);
        let provenance =
            TileProvenance::new(idx, ByteOffset(window.offset) + i * TILE_BYTES, palette, kind);
        let colors = manifest
            .snapshot_palette(&provenance)
            .copied()
            .unwrap_or_default();
        artifacts.push(TileArtifact {
            image: IndexedImage::from_tile(&pixels, &colors),
            pixels,
            provenance: provenance.clone(),
        });
        manifest.tiles.insert(idx, provenance);
    }

    info!(
        "Extracted {} tiles from window {}+{} ({} empty skipped) using [{}]",
        artifacts.len(),
        ByteOffset(window.offset),
        window.length,
        skipped,
        stack.kinds().iter().map(|k| format!("{:?}", k)).join(", ")
    );
    Ok(Extraction {
        manifest,
        artifacts,
    })
}

#[derive(Clone, Debug, Default)]
pub struct ExtractRequest {
    pub sources: SourceFiles,
    pub window: Window,
    pub attribute_base: i32,
    pub external_mapping: Option<TilePaletteMap>,
    pub heuristic_default: bool,
}

pub fn extract_to_dir(request: &ExtractRequest, out_dir: &Path, config: &Config) -> Result<Extraction> {
    let tiles_path = &request.sources.tiles;
    info!("Extracting from {}", tiles_path.display());
    let source = std::fs::read(tiles_path).map_err(|e| PipelineError::io(tiles_path, e))?;
    check_window(source.len(), &request.window)?;

    let palettes = match &request.sources.palettes {
        Some(p) => PaletteBank::load(p)?,
        None => {
            warn!("No palette dump given, using grayscale palettes");
            PaletteBank::grayscale()
        }
    };
    let attributes = match &request.sources.attributes {
        Some(p) => Some(SpriteAttributeMap::load(p, &config.oam)?),
        None => None,
    };
    let stats = attributes.as_ref().map(|a| a.usage_stats());
    let choice = choose_palette(&palettes, stats.as_ref(), &config.heuristic);

    let mut stack = ResolutionStack::standard(
        attributes
            .as_ref()
            .map(|a| a.build_tile_palette_map(request.attribute_base)),
        request.external_mapping.clone(),
    );
    if request.heuristic_default {
        info!("Heuristic default palette: {}", choice.palette);
        stack.replace_fallback(PaletteStrategy::Heuristic(choice.palette));
    }

    let extraction = extract(
        &source,
        request.window,
        &stack,
        palettes,
        request.sources.clone(),
    )?;

    std::fs::create_dir_all(out_dir).map_err(|e| PipelineError::io(out_dir, e))?;
    for artifact in &extraction.artifacts {
        let path = out_dir.join(&artifact.provenance.artifact);
        write_indexed_png(&path, &artifact.image)?;
    }

    if config.extraction.reference_sheet {
        let sheet = render_sheet(
            &extraction.manifest,
            &extraction.tile_pixels(),
            config.extraction.tiles_per_row,
        );
        let path = out_dir.join(REFERENCE_SHEET_FILE);
        write_rgba_png(&path, sheet.width, sheet.height, &sheet.data)?;
    }
    if config.extraction.companion_palette {
        let path = out_dir.join(COMPANION_PALETTE_FILE);
        if let Err(e) = CompanionPalette::new(&extraction.manifest, &choice).save(&path) {
            warn!("Could not write companion palette {}: {}", path.display(), e);
        }
    }

    extraction.manifest.save(&out_dir.join(MANIFEST_FILE))?;
    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::{CgramPalette, OamPalette, TILE_PIXELS},
        resolve::StrategyKind,
    };

    fn window(offset: usize, length: usize) -> Window {
        Window { offset, length }
    }

    fn fixed_stack() -> ResolutionStack {
        ResolutionStack::standard(None, None)
    }

    fn nonzero_tile(seed: u8) -> TileBytes {
        let mut t = [0; TILE_BYTES];
        t[0] = seed | 1;
        t[31] = seed;
        t
    }

    #[test]
    fn test_window_must_be_whole_tiles() {
        let err = check_window(1024, &window(0, 33)).unwrap_err();
        assert!(matches!(err, PipelineError::Range(_)));
    }

    #[test]
    fn test_window_must_fit() {
        assert!(check_window(1024, &window(992, 32)).is_ok());
        assert!(matches!(
            check_window(1024, &window(1000, 32)),
            Err(PipelineError::Range(_))
        ));
        assert!(matches!(
            check_window(1024, &window(usize::MAX, 32)),
            Err(PipelineError::Range(_))
        ));
    }

    #[test]
    fn test_bad_window_produces_nothing() {
        let source = vec![0xAA; 128];
        let result = extract(&source, window(96, 64), &fixed_stack(), PaletteBank::default(), SourceFiles::default());
        assert!(matches!(result, Err(PipelineError::Range(_))));
    }

    #[test]
    fn test_sparse_indices_survive_empty_tiles() {
        // pattern: data, zero, zero, data, zero, data
        let mut source = vec![0u8; 64];
        let layout = [true, false, false, true, false, true];
        for (i, &filled) in layout.iter().enumerate() {
            if filled {
                source.extend(nonzero_tile(i as u8 + 2));
            } else {
                source.extend([0u8; TILE_BYTES]);
            }
        }
        let ex = extract(
            &source,
            window(64, layout.len() * TILE_BYTES),
            &fixed_stack(),
            PaletteBank::default(),
            SourceFiles::default(),
        )
        .unwrap();
        assert_eq!(ex.artifacts.len(), 3);
        assert_eq!(ex.manifest.tiles.keys().copied().collect::<Vec<_>>(), vec![0, 3, 5]);
        assert_eq!(ex.manifest.tiles[&3].offset, ByteOffset(64 + 3 * 32));
        for p in ex.manifest.tiles.values() {
            assert!(p.offset.0 + TILE_BYTES <= source.len());
        }
    }

    #[test]
    fn test_artifact_carries_resolved_palette() {
        let mut source = vec![0u8; 64];
        source[0] = 0xFF;
        source[32] = 0x80;
        let mut bytes = PaletteBank::grayscale().to_bytes();
        // palette 10 (sprite palette 2), color 1 = red
        bytes[(10 * 16 + 1) * 2] = 0x1F;
        bytes[(10 * 16 + 1) * 2 + 1] = 0x00;
        let bank = PaletteBank::parse(&bytes);
        let mut mapping = TilePaletteMap::new();
        mapping.insert(1, OamPalette(2));
        let stack = ResolutionStack::standard(None, Some(mapping));

        let ex = extract(&source, window(0, 64), &stack, bank.clone(), SourceFiles::default()).unwrap();
        let a0 = &ex.artifacts[0];
        assert_eq!(a0.provenance.palette, OamPalette(0));
        assert_eq!(a0.provenance.resolved_by, StrategyKind::Fixed);
        let a1 = &ex.artifacts[1];
        assert_eq!(a1.provenance.cgram_palette, CgramPalette(10));
        assert_eq!(a1.provenance.resolved_by, StrategyKind::External);
        assert_eq!(a1.image.palette, bank.palette(10).unwrap().colors.to_vec());
        assert_eq!(a1.image.pixels[0], 1);
        assert_eq!(a1.image.palette[1], crate::color::Color::new(248, 0, 0));
        assert_eq!(ex.manifest.palettes, bank);
    }

    #[test]
    fn test_decoded_pixels_match_codec() {
        let t = nonzero_tile(0x5A);
        let ex = extract(&t, window(0, 32), &fixed_stack(), PaletteBank::default(), SourceFiles::default()).unwrap();
        assert_eq!(ex.artifacts[0].pixels, tile::decode(&t));
        assert_eq!(ex.artifacts[0].image.pixels.len(), TILE_PIXELS);
    }

    #[test]
    fn test_empty_window() {
        let ex = extract(&[1, 2, 3], window(1, 0), &fixed_stack(), PaletteBank::default(), SourceFiles::default()).unwrap();
        assert!(ex.artifacts.is_empty());
        assert!(ex.manifest.tiles.is_empty());
    }

    #[test]
    fn test_unresolvable_tile_is_error() {
        let t = nonzero_tile(1);
        let result = extract(&t, window(0, 32), &ResolutionStack::new(), PaletteBank::default(), SourceFiles::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_to_dir_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let request = ExtractRequest {
            sources: SourceFiles {
                tiles: dir.path().join("missing.dmp"),
                ..Default::default()
            },
            window: window(0, 32),
            ..Default::default()
        };
        let out = dir.path().join("out");
        let err = extract_to_dir(&request, &out, &Config::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn test_extract_to_dir_bad_window_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("vram.dmp");
        std::fs::write(&src, vec![0xFFu8; 64]).unwrap();
        let request = ExtractRequest {
            sources: SourceFiles {
                tiles: src,
                ..Default::default()
            },
            window: window(0, 48),
            ..Default::default()
        };
        let out = dir.path().join("out");
        let err = extract_to_dir(&request, &out, &Config::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Range(_)));
        assert!(!out.exists());
    }
}
