use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::persist::load_json;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OamConfig {
    pub hide_threshold: u8,
    pub max_entries: usize,
    pub expand_large_sprites: bool,
}

impl Default for OamConfig {
    fn default() -> Self {
        OamConfig {
            hide_threshold: 224,
            max_entries: 128,
            expand_large_sprites: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    pub near_black_max: u8,
    pub near_white_min: u8,
    // Hue window in degrees; wraps through 0 when hue_min > hue_max.
    pub hue_min: f32,
    pub hue_max: f32,
    pub min_saturation: f32,
    pub near_black_bonus: u32,
    pub hue_match_bonus: u32,
    pub near_white_bonus: u32,
    pub usage_weight: u32,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        HeuristicConfig {
            near_black_max: 40,
            near_white_min: 216,
            hue_min: 280.0,
            hue_max: 20.0,
            min_saturation: 0.25,
            near_black_bonus: 1,
            hue_match_bonus: 1,
            near_white_bonus: 1,
            usage_weight: 2,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub channel_tolerance: u8,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            channel_tolerance: 8,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub tiles_per_row: usize,
    pub reference_sheet: bool,
    pub companion_palette: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            tiles_per_row: 16,
            reference_sheet: true,
            companion_palette: true,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub oam: OamConfig,
    pub heuristic: HeuristicConfig,
    pub validation: ValidationConfig,
    pub extraction: ExtractionConfig,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("", "", "SpriteRoundtrip")
            .context("Unable to open global config directory.")?;
        Ok(project_dirs.config_dir().join("config.json"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_owned(),
            None => {
                let p = Self::default_path()?;
                if !p.exists() {
                    info!("No config at {}, using defaults", p.display());
                    return Ok(Config::default());
                }
                p
            }
        };
        load_json(&path).with_context(|| format!("loading config {}", path.display()))
    }
}
