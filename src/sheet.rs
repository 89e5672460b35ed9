// Reference outputs for the person doing the editing: a full-color sheet of every
// extracted tile at its original position, and a companion palette file.
use std::{collections::BTreeMap, path::Path};

use anyhow::Result;
use serde::Serialize;

use crate::{
    color::Color,
    common::{CgramPalette, TileBytes, TileIdx, TilePixels, TILE_BYTES, TILE_SIZE},
    heuristic::{HeuristicChoice, PaletteScore},
    manifest::ExtractionManifest,
    persist::save_json,
    tile,
};

pub const REFERENCE_SHEET_FILE: &str = "reference_sheet.png";
pub const COMPANION_PALETTE_FILE: &str = "companion.pal.json";

pub struct RgbaSheet {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

pub fn render_sheet(
    manifest: &ExtractionManifest,
    tiles: &BTreeMap<TileIdx, TilePixels>,
    tiles_per_row: usize,
) -> RgbaSheet {
    let tiles_per_row = tiles_per_row.max(1);
    let total = manifest.window.tile_count();
    let rows = total.div_ceil(tiles_per_row).max(1);
    let width = tiles_per_row * TILE_SIZE;
    let height = rows * TILE_SIZE;
    let mut data = vec![0u8; width * height * 4];

    for (&idx, pixels) in tiles {
        let Some(provenance) = manifest.tiles.get(&idx) else {
            continue;
        };
        let Some(palette) = manifest.snapshot_palette(provenance) else {
            continue;
        };
        let tile_x = idx as usize % tiles_per_row;
        let tile_y = idx as usize / tiles_per_row;
        if tile_y >= rows {
            continue;
        }
        for y in 0..TILE_SIZE {
            for x in 0..TILE_SIZE {
                let c = pixels[y * TILE_SIZE + x] as usize & 0xF;
                if c == 0 {
                    continue;
                }
                let color = palette.colors[c];
                let px = tile_x * TILE_SIZE + x;
                let py = tile_y * TILE_SIZE + y;
                let i = (py * width + px) * 4;
                data[i..i + 4].copy_from_slice(&[color.red, color.green, color.blue, 255]);
            }
        }
    }

    RgbaSheet {
        width: width as u32,
        height: height as u32,
        data,
    }
}

pub fn tiles_from_buffer(
    manifest: &ExtractionManifest,
    buffer: &[u8],
) -> BTreeMap<TileIdx, TilePixels> {
    let mut tiles = BTreeMap::new();
    for (&idx, provenance) in &manifest.tiles {
        let start = provenance.offset.0;
        let Some(bytes) = buffer.get(start..start + TILE_BYTES) else {
            continue;
        };
        if let Ok(bytes) = <&TileBytes>::try_from(bytes) {
            tiles.insert(idx, tile::decode(bytes));
        }
    }
    tiles
}

#[derive(Serialize)]
pub struct CompanionPalette {
    pub format_version: String,
    pub source: Option<String>,
    pub palette_index: CgramPalette,
    pub colors: Vec<Color>,
    pub scores: Vec<PaletteScore>,
}

impl CompanionPalette {
    pub fn new(manifest: &ExtractionManifest, choice: &HeuristicChoice) -> Self {
        let palette_index = CgramPalette::from(choice.palette);
        let colors = manifest
            .palettes
            .palette(palette_index.0 as usize)
            .map(|p| p.colors.to_vec())
            .unwrap_or_default();
        Self {
            format_version: "1.0".to_string(),
            source: manifest
                .sources
                .palettes
                .as_ref()
                .map(|p| p.display().to_string()),
            palette_index,
            colors,
            scores: choice.scores.clone(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(path, self)
    }
}
