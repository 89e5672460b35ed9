use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    color::{to_bgr555, to_rgb, Color},
    common::{COLORS_PER_PALETTE, PALETTE_COUNT},
    error::{PipelineError, Result},
};

pub const CGRAM_BYTES: usize = PALETTE_COUNT * COLORS_PER_PALETTE * 2;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Palette {
    pub colors: [Color; COLORS_PER_PALETTE],
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaletteBank {
    palettes: [Palette; PALETTE_COUNT],
}

impl PaletteBank {
    /// Always yields 16 palettes of 16 colors; words past the end of `buffer` read as black.
    pub fn parse(buffer: &[u8]) -> Self {
        let mut bank = PaletteBank::default();
        for (i, pal) in bank.palettes.iter_mut().enumerate() {
            for (j, color) in pal.colors.iter_mut().enumerate() {
                let addr = (i * COLORS_PER_PALETTE + j) * 2;
                if addr + 1 < buffer.len() {
                    let c = buffer[addr] as u16 | (buffer[addr + 1] as u16) << 8;
                    *color = to_rgb(c);
                }
            }
        }
        bank
    }

    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading palettes from {}", path.display());
        let data = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
        if data.len() < CGRAM_BYTES {
            warn!(
                "{}: palette dump is {} bytes (expected {}), missing colors read as black",
                path.display(),
                data.len(),
                CGRAM_BYTES
            );
        }
        Ok(Self::parse(&data))
    }

    pub fn grayscale() -> Self {
        let mut pal = Palette::default();
        for idx in 1..COLORS_PER_PALETTE {
            let gray = (17 + (idx - 1) * (255 - 17) / 14) as u8;
            pal.colors[idx] = Color::new(gray, gray, gray);
        }
        PaletteBank {
            palettes: [pal; PALETTE_COUNT],
        }
    }

    pub fn palette(&self, idx: usize) -> Option<&Palette> {
        self.palettes.get(idx)
    }

    pub fn palettes(&self) -> &[Palette; PALETTE_COUNT] {
        &self.palettes
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CGRAM_BYTES);
        for pal in &self.palettes {
            for &color in &pal.colors {
                out.extend(to_bgr555(color).to_le_bytes());
            }
        }
        out
    }
}
