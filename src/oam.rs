use std::{collections::BTreeMap, path::Path};

use hashbrown::{hash_map::Entry, HashMap};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{
    common::{CgramPalette, OamPalette, TileIdx},
    config::OamConfig,
    error::{PipelineError, Result},
    persist::save_keyed_json,
};

pub const OAM_ENTRY_BYTES: usize = 4;
pub const OAM_LOW_TABLE_BYTES: usize = 512;
pub const OAM_BYTES: usize = 544;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Flip {
    None = 0,
    Horizontal = 1,
    Vertical = 2,
    Both = 3,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpriteAttributeEntry {
    pub index: u8,
    pub x: u16, // 9 bits, the top bit coming from the high table
    pub y: u8,
    pub tile: u8,
    pub attribute: u8,
    pub large: bool,
}

impl SpriteAttributeEntry {
    fn from_record(index: u8, record: &[u8], high_bits: u8) -> Self {
        Self {
            index,
            x: record[0] as u16 | ((high_bits & 1) as u16) << 8,
            y: record[1],
            tile: record[2],
            attribute: record[3],
            large: (high_bits >> 1) & 1 == 1,
        }
    }

    pub fn palette(&self) -> OamPalette {
        OamPalette(self.attribute & 7)
    }

    pub fn priority(&self) -> u8 {
        (self.attribute >> 4) & 3
    }

    pub fn flip(&self) -> Flip {
        match self.attribute >> 6 {
            0 => Flip::None,
            1 => Flip::Horizontal,
            2 => Flip::Vertical,
            _ => Flip::Both,
        }
    }

    pub fn is_visible(&self, hide_threshold: u8) -> bool {
        self.y < hide_threshold
    }

    pub fn decode(&self, hide_threshold: u8) -> DecodedSprite {
        DecodedSprite {
            index: self.index,
            x: self.x,
            y: self.y,
            tile: self.tile,
            palette: self.palette(),
            priority: self.priority(),
            flip: self.flip(),
            large: self.large,
            visible: self.is_visible(hide_threshold),
        }
    }

    fn tiles(&self, expand_large: bool) -> Vec<u16> {
        let base = self.tile as u16;
        if self.large && expand_large {
            vec![base, base + 1, base + 16, base + 17]
        } else {
            vec![base]
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedSprite {
    pub index: u8,
    pub x: u16,
    pub y: u8,
    pub tile: u8,
    pub palette: OamPalette,
    pub priority: u8,
    pub flip: Flip,
    pub large: bool,
    pub visible: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteListing {
    pub stats: UsageStats,
    pub sprites: Vec<DecodedSprite>,
}

impl SpriteListing {
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        save_keyed_json(path, self)
    }
}

pub type TilePaletteMap = HashMap<TileIdx, OamPalette>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_sprites: usize,
    pub visible_sprites: usize,
    pub palette_counts: BTreeMap<OamPalette, usize>,
}

impl UsageStats {
    pub fn count(&self, palette: OamPalette) -> usize {
        self.palette_counts.get(&palette).copied().unwrap_or(0)
    }

    pub fn cgram_counts(&self) -> BTreeMap<CgramPalette, usize> {
        self.palette_counts
            .iter()
            .map(|(&p, &n)| (CgramPalette::from(p), n))
            .collect()
    }

    pub fn active_palettes(&self) -> Vec<OamPalette> {
        self.palette_counts.keys().copied().collect()
    }
}

/// Visible sprites only. When sprites disagree about a tile's palette the first one
/// in table order wins.
pub fn build_tile_palette_map(
    entries: &[SpriteAttributeEntry],
    base_offset: i32,
    config: &OamConfig,
) -> TilePaletteMap {
    let mut map = TilePaletteMap::new();
    for entry in entries {
        if !entry.is_visible(config.hide_threshold) {
            continue;
        }
        for tile in entry.tiles(config.expand_large_sprites) {
            let Ok(key) = TileIdx::try_from(tile as i32 + base_offset) else {
                continue;
            };
            match map.entry(key) {
                Entry::Vacant(vacant_entry) => {
                    vacant_entry.insert(entry.palette());
                }
                Entry::Occupied(occupied_entry) => {
                    if *occupied_entry.get() != entry.palette() {
                        debug!(
                            "tile {}: sprite {} wants palette {}, keeping {}",
                            key,
                            entry.index,
                            entry.palette(),
                            occupied_entry.get()
                        );
                    }
                }
            }
        }
    }
    map
}

#[derive(Clone, Debug)]
pub struct SpriteAttributeMap {
    entries: Vec<SpriteAttributeEntry>,
    config: OamConfig,
}

impl SpriteAttributeMap {
    pub fn parse(buffer: &[u8], config: &OamConfig) -> Self {
        let complete = buffer.len().min(OAM_LOW_TABLE_BYTES) / OAM_ENTRY_BYTES;
        let count = complete.min(config.max_entries);
        if buffer.len() < OAM_LOW_TABLE_BYTES && buffer.len() % OAM_ENTRY_BYTES != 0 {
            warn!(
                "Partial sprite attribute data: ignoring {} trailing bytes",
                buffer.len() % OAM_ENTRY_BYTES
            );
        }

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let record = &buffer[i * OAM_ENTRY_BYTES..(i + 1) * OAM_ENTRY_BYTES];
            // Two bits per sprite in the high table; absent bytes read as 0.
            let high_byte = buffer.get(OAM_LOW_TABLE_BYTES + i / 4).copied().unwrap_or(0);
            let high_bits = (high_byte >> ((i % 4) * 2)) & 3;
            entries.push(SpriteAttributeEntry::from_record(i as u8, record, high_bits));
        }

        Self {
            entries,
            config: config.clone(),
        }
    }

    pub fn load(path: &Path, config: &OamConfig) -> Result<Self> {
        info!("Loading sprite attributes from {}", path.display());
        let data = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
        let map = Self::parse(&data, config);
        let stats = map.usage_stats();
        info!(
            "{} sprites, {} visible, active palettes: [{}]",
            stats.total_sprites,
            stats.visible_sprites,
            stats.active_palettes().iter().join(", ")
        );
        Ok(map)
    }

    pub fn entries(&self) -> &[SpriteAttributeEntry] {
        &self.entries
    }

    pub fn visible_entries(&self) -> impl Iterator<Item = &SpriteAttributeEntry> {
        self.entries
            .iter()
            .filter(|e| e.is_visible(self.config.hide_threshold))
    }

    pub fn build_tile_palette_map(&self, base_offset: i32) -> TilePaletteMap {
        build_tile_palette_map(&self.entries, base_offset, &self.config)
    }

    pub fn listing(&self) -> SpriteListing {
        SpriteListing {
            stats: self.usage_stats(),
            sprites: self
                .entries
                .iter()
                .map(|e| e.decode(self.config.hide_threshold))
                .collect(),
        }
    }

    pub fn usage_stats(&self) -> UsageStats {
        let mut stats = UsageStats {
            total_sprites: self.entries.len(),
            ..Default::default()
        };
        for entry in self.visible_entries() {
            stats.visible_sprites += 1;
            *stats.palette_counts.entry(entry.palette()).or_insert(0) += 1;
        }
        stats
    }
}
