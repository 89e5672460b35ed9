// Picks a default sprite palette when nothing says which palette a tile uses. The
// scoring only has to be deterministic; it is a guess, not ground truth.
use log::debug;
use serde::Serialize;

use crate::{
    color::Color,
    common::{CgramPalette, OamPalette},
    config::HeuristicConfig,
    oam::UsageStats,
    palette::{Palette, PaletteBank},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaletteScore {
    pub palette: OamPalette,
    pub score: u32,
    pub near_black: bool,
    pub hue_matches: u32,
    pub near_white: bool,
    pub usage: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HeuristicChoice {
    pub palette: OamPalette,
    pub scores: Vec<PaletteScore>,
}

fn is_near_black(c: &Color, config: &HeuristicConfig) -> bool {
    c.channels().iter().all(|&v| v <= config.near_black_max)
}

fn is_near_white(c: &Color, config: &HeuristicConfig) -> bool {
    c.channels().iter().all(|&v| v >= config.near_white_min)
}

fn in_hue_window(c: &Color, config: &HeuristicConfig) -> bool {
    let Some((hue, saturation)) = c.hue_saturation() else {
        return false;
    };
    if saturation < config.min_saturation {
        return false;
    }
    if config.hue_min <= config.hue_max {
        hue >= config.hue_min && hue <= config.hue_max
    } else {
        hue >= config.hue_min || hue <= config.hue_max
    }
}

pub fn score_palette(
    id: OamPalette,
    palette: &Palette,
    usage: usize,
    config: &HeuristicConfig,
) -> PaletteScore {
    let near_black = is_near_black(&palette.colors[0], config);
    let hue_matches = palette
        .colors
        .iter()
        .filter(|c| in_hue_window(c, config))
        .count() as u32;
    let near_white = palette.colors.iter().any(|c| is_near_white(c, config));

    let mut score = hue_matches * config.hue_match_bonus;
    if near_black {
        score += config.near_black_bonus;
    }
    if near_white {
        score += config.near_white_bonus;
    }
    score += usage as u32 * config.usage_weight;

    PaletteScore {
        palette: id,
        score,
        near_black,
        hue_matches,
        near_white,
        usage,
    }
}

// Ties go to the lowest palette number.
pub fn choose_palette(
    bank: &PaletteBank,
    stats: Option<&UsageStats>,
    config: &HeuristicConfig,
) -> HeuristicChoice {
    let scores: Vec<PaletteScore> = OamPalette::all()
        .map(|id| {
            let cgram = CgramPalette::from(id);
            let palette = bank.palette(cgram.0 as usize).copied().unwrap_or_default();
            let usage = stats.map(|s| s.count(id)).unwrap_or(0);
            score_palette(id, &palette, usage, config)
        })
        .collect();

    let mut best = &scores[0];
    for s in &scores[1..] {
        if s.score > best.score {
            best = s;
        }
    }
    let palette = best.palette;
    debug!(
        "Heuristic scores: {:?}, chose palette {}",
        scores.iter().map(|s| s.score).collect::<Vec<_>>(),
        palette
    );

    HeuristicChoice { palette, scores }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank_with(pal_idx: usize, colors: &[Color]) -> PaletteBank {
        let mut data = PaletteBank::default().to_bytes();
        for (i, c) in colors.iter().enumerate() {
            let w = crate::color::to_bgr555(*c).to_le_bytes();
            let addr = (pal_idx * 16 + i) * 2;
            data[addr] = w[0];
            data[addr + 1] = w[1];
        }
        PaletteBank::parse(&data)
    }

    #[test]
    fn test_all_black_bank_ties_to_lowest() {
        let bank = PaletteBank::default();
        let choice = choose_palette(&bank, None, &HeuristicConfig::default());
        assert_eq!(choice.palette, OamPalette(0));
        assert_eq!(choice.scores.len(), 8);
        assert!(choice.scores.iter().all(|s| s.score == choice.scores[0].score));
    }

    #[test]
    fn test_hue_and_white_bonuses() {
        let pink = Color::new(248, 128, 184);
        let white = Color::new(248, 248, 248);
        let bank = bank_with(11, &[Color::BLACK, pink, pink, white]);
        let choice = choose_palette(&bank, None, &HeuristicConfig::default());
        assert_eq!(choice.palette, OamPalette(3));
        let s = &choice.scores[3];
        assert_eq!(s.hue_matches, 2);
        assert!(s.near_white);
        assert!(s.near_black);
        assert_eq!(s.score, 4);
    }

    #[test]
    fn test_usage_dominates() {
        let pink = Color::new(248, 128, 184);
        let bank = bank_with(9, &[Color::BLACK, pink, pink]);
        let mut stats = UsageStats::default();
        stats.palette_counts.insert(OamPalette(5), 2);
        let choice = choose_palette(&bank, Some(&stats), &HeuristicConfig::default());
        // palette 1: 1 + 2 = 3; palette 5: 1 + 2*2 = 5
        assert_eq!(choice.palette, OamPalette(5));
    }

    #[test]
    fn test_weights_are_overridable() {
        let pink = Color::new(248, 128, 184);
        let bank = bank_with(9, &[Color::BLACK, pink, pink]);
        let mut stats = UsageStats::default();
        stats.palette_counts.insert(OamPalette(5), 2);
        let config = HeuristicConfig {
            usage_weight: 0,
            ..Default::default()
        };
        let choice = choose_palette(&bank, Some(&stats), &config);
        assert_eq!(choice.palette, OamPalette(1));
    }

    #[test]
    fn test_hue_window_wraps() {
        let config = HeuristicConfig::default();
        assert!(in_hue_window(&Color::new(248, 0, 0), &config));
        assert!(in_hue_window(&Color::new(248, 0, 248), &config));
        assert!(!in_hue_window(&Color::new(0, 248, 0), &config));
        assert!(!in_hue_window(&Color::new(120, 120, 120), &config));
        let config = HeuristicConfig {
            hue_min: 100.0,
            hue_max: 140.0,
            ..Default::default()
        };
        assert!(in_hue_window(&Color::new(0, 248, 0), &config));
    }

    #[test]
    fn test_repeated_runs_agree() {
        let bank = bank_with(13, &[Color::new(8, 8, 8), Color::new(200, 40, 40)]);
        let mut stats = UsageStats::default();
        stats.palette_counts.insert(OamPalette(2), 1);
        stats.palette_counts.insert(OamPalette(5), 1);
        let config = HeuristicConfig::default();
        let first = choose_palette(&bank, Some(&stats), &config);
        for _ in 0..10 {
            assert_eq!(choose_palette(&bank, Some(&stats), &config), first);
        }
    }
}
