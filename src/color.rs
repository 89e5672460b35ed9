use serde::{Deserialize, Serialize};

use crate::common::ColorValue;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[ColorValue; 3]", into = "[ColorValue; 3]")]
pub struct Color {
    pub red: ColorValue,
    pub green: ColorValue,
    pub blue: ColorValue,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);

    pub const fn new(red: ColorValue, green: ColorValue, blue: ColorValue) -> Self {
        Color { red, green, blue }
    }

    pub fn channels(&self) -> [ColorValue; 3] {
        [self.red, self.green, self.blue]
    }

    pub fn max_channel_diff(&self, other: &Color) -> u8 {
        self.channels()
            .iter()
            .zip(other.channels())
            .map(|(&a, b)| a.abs_diff(b))
            .max()
            .unwrap_or(0)
    }

    pub fn hue_saturation(&self) -> Option<(f32, f32)> {
        let r = self.red as f32 / 255.0;
        let g = self.green as f32 / 255.0;
        let b = self.blue as f32 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;
        if delta <= f32::EPSILON {
            return None;
        }
        let hue = if max == r {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        Some((hue, delta / max))
    }
}

impl From<[ColorValue; 3]> for Color {
    fn from(c: [ColorValue; 3]) -> Self {
        Color::new(c[0], c[1], c[2])
    }
}

impl From<Color> for [ColorValue; 3] {
    fn from(c: Color) -> Self {
        c.channels()
    }
}

// 15-bit packed layout: -bbbbbgg gggrrrrr
pub fn to_rgb(v: u16) -> Color {
    let r = v & 31;
    let g = (v >> 5) & 31;
    let b = (v >> 10) & 31;
    Color::new((r * 8) as u8, (g * 8) as u8, (b * 8) as u8)
}

// Each channel keeps only its top 5 bits.
pub fn to_bgr555(c: Color) -> u16 {
    let r = (c.red / 8) as u16;
    let g = (c.green / 8) as u16;
    let b = (c.blue / 8) as u16;
    r | g << 5 | b << 10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_rgb_white() {
        assert_eq!(to_rgb(0x7FFF), Color::new(248, 248, 248));
    }

    #[test]
    fn test_to_rgb_primaries() {
        assert_eq!(to_rgb(0x001F), Color::new(248, 0, 0));
        assert_eq!(to_rgb(0x03E0), Color::new(0, 248, 0));
        assert_eq!(to_rgb(0x7C00), Color::new(0, 0, 248));
        assert_eq!(to_rgb(0), Color::BLACK);
    }

    #[test]
    fn test_to_rgb_ignores_top_bit() {
        assert_eq!(to_rgb(0x8000 | 0x001F), to_rgb(0x001F));
    }

    #[test]
    fn test_bgr555_roundtrip_all_values() {
        for v in 0..=0x7FFFu16 {
            assert_eq!(to_bgr555(to_rgb(v)), v, "value {:#06X}", v);
        }
    }

    #[test]
    fn test_to_bgr555_is_lossy() {
        // 255 and 248 share the same 5-bit field
        assert_eq!(to_bgr555(Color::new(255, 255, 255)), 0x7FFF);
        assert_eq!(to_bgr555(Color::new(7, 0, 0)), 0);
    }

    #[test]
    fn test_max_channel_diff() {
        let a = Color::new(10, 20, 30);
        let b = Color::new(18, 20, 25);
        assert_eq!(a.max_channel_diff(&b), 8);
        assert_eq!(b.max_channel_diff(&a), 8);
    }

    #[test]
    fn test_hue_saturation() {
        assert_eq!(Color::new(128, 128, 128).hue_saturation(), None);
        let (h, s) = Color::new(248, 0, 0).hue_saturation().unwrap();
        assert_eq!(h, 0.0);
        assert_eq!(s, 1.0);
        let (h, _) = Color::new(248, 0, 248).hue_saturation().unwrap();
        assert!((h - 300.0).abs() < 0.01);
    }

    #[test]
    fn test_color_serializes_as_array() {
        let json = serde_json::to_string(&Color::new(1, 2, 3)).unwrap();
        assert_eq!(json, "[1,2,3]");
        let c: Color = serde_json::from_str("[248,0,8]").unwrap();
        assert_eq!(c, Color::new(248, 0, 8));
    }
}
