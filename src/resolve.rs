use std::path::Path;

use anyhow::{Context, Result};
use hashbrown::HashMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    common::{OamPalette, TileIdx},
    oam::TilePaletteMap,
    persist::load_json,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    AttributeMap,
    External,
    Heuristic,
    Fixed,
}

#[derive(Clone, Debug)]
pub enum PaletteStrategy {
    AttributeMap(TilePaletteMap),
    External(TilePaletteMap),
    Heuristic(OamPalette),
    Fixed(OamPalette),
}

impl PaletteStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            PaletteStrategy::AttributeMap(_) => StrategyKind::AttributeMap,
            PaletteStrategy::External(_) => StrategyKind::External,
            PaletteStrategy::Heuristic(_) => StrategyKind::Heuristic,
            PaletteStrategy::Fixed(_) => StrategyKind::Fixed,
        }
    }

    pub fn resolve(&self, tile: TileIdx) -> Option<OamPalette> {
        match self {
            PaletteStrategy::AttributeMap(map) | PaletteStrategy::External(map) => {
                map.get(&tile).copied().filter(|p| p.is_valid())
            }
            PaletteStrategy::Heuristic(p) | PaletteStrategy::Fixed(p) => Some(*p),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolutionStack {
    strategies: Vec<PaletteStrategy>,
}

impl ResolutionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard(attributes: Option<TilePaletteMap>, external: Option<TilePaletteMap>) -> Self {
        let mut stack = Self::new();
        if let Some(map) = attributes {
            stack.push(PaletteStrategy::AttributeMap(map));
        }
        if let Some(map) = external {
            stack.push(PaletteStrategy::External(map));
        }
        stack.push(PaletteStrategy::Fixed(OamPalette(0)));
        stack
    }

    pub fn push(&mut self, strategy: PaletteStrategy) {
        self.strategies.push(strategy);
    }

    pub fn replace_fallback(&mut self, strategy: PaletteStrategy) {
        if let Some(PaletteStrategy::Fixed(_)) = self.strategies.last() {
            self.strategies.pop();
        }
        self.strategies.push(strategy);
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    pub fn resolve(&self, tile: TileIdx) -> Option<(OamPalette, StrategyKind)> {
        self.strategies
            .iter()
            .find_map(|s| s.resolve(tile).map(|p| (p, s.kind())))
    }
}

#[derive(Deserialize)]
struct MappingInfo {
    palette: u8,
}

#[derive(Deserialize)]
struct MappingFile {
    #[serde(default)]
    tile_mappings: std::collections::BTreeMap<TileIdx, MappingInfo>,
}

// Palettes outside 0-7 are dropped so a later strategy decides those tiles.
pub fn load_external_mapping(path: &Path) -> Result<TilePaletteMap> {
    let file: MappingFile =
        load_json(path).with_context(|| format!("loading palette mapping {}", path.display()))?;
    let mut map = HashMap::new();
    for (tile, info) in file.tile_mappings {
        let palette = OamPalette(info.palette);
        if !palette.is_valid() {
            warn!(
                "{}: tile {} has out-of-range palette {}, ignoring",
                path.display(),
                tile,
                info.palette
            );
            continue;
        }
        map.insert(tile, palette);
    }
    info!("Loaded {} palette mappings", map.len());
    Ok(map)
}
