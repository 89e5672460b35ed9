use std::{fmt::Display, ops::Add};

use serde::{Deserialize, Serialize};

pub type ColorValue = u8; // 8-bit channel value (0-248 when derived from hardware)
pub type ColorIdx = u8; // Index into 4bpp palette (0-15)
pub type TileIdx = u16; // Tile number within the extraction window

pub const TILE_SIZE: usize = 8;
pub const TILE_PIXELS: usize = TILE_SIZE * TILE_SIZE;
pub const TILE_BYTES: usize = 32;

pub const COLORS_PER_PALETTE: usize = 16;
pub const PALETTE_COUNT: usize = 16;
pub const SPRITE_PALETTE_COUNT: usize = 8;

pub type TilePixels = [ColorIdx; TILE_PIXELS];
pub type TileBytes = [u8; TILE_BYTES];

// It's easy to mix up a sprite's palette number (0-7, as stored in its attribute
// byte) with the palette's position in palette memory (8-15, since sprites use the
// upper half). So we use type-safe wrappers to make these harder to mess up:
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OamPalette(pub u8);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CgramPalette(pub u8);

impl OamPalette {
    pub fn all() -> impl Iterator<Item = OamPalette> {
        (0..SPRITE_PALETTE_COUNT as u8).map(OamPalette)
    }

    pub fn is_valid(self) -> bool {
        (self.0 as usize) < SPRITE_PALETTE_COUNT
    }
}

impl From<OamPalette> for CgramPalette {
    fn from(p: OamPalette) -> Self {
        CgramPalette(p.0.saturating_add(SPRITE_PALETTE_COUNT as u8))
    }
}

impl Display for OamPalette {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for CgramPalette {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Byte offsets into the tile memory dump, printed in hex the way dump tools show them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteOffset(pub usize);

impl Add<usize> for ByteOffset {
    type Output = ByteOffset;

    fn add(self, other: usize) -> Self {
        ByteOffset(self.0 + other)
    }
}

impl Display for ByteOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}
