use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use anyhow::Context;
use log::debug;
use png::{BitDepth, ColorType, Transformations};
use serde::Serialize;

use crate::{
    color::Color,
    common::{ColorIdx, TilePixels, TILE_SIZE},
    error::{PipelineError, Result},
    palette::Palette,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelMode {
    Indexed,
    Grayscale,
    GrayscaleAlpha,
    Rgb,
    Rgba,
}

impl From<ColorType> for PixelMode {
    fn from(c: ColorType) -> Self {
        match c {
            ColorType::Indexed => PixelMode::Indexed,
            ColorType::Grayscale => PixelMode::Grayscale,
            ColorType::GrayscaleAlpha => PixelMode::GrayscaleAlpha,
            ColorType::Rgb => PixelMode::Rgb,
            ColorType::Rgba => PixelMode::Rgba,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedImage {
    pub width: u32,
    pub height: u32,
    pub mode: PixelMode,
    pub pixels: Vec<ColorIdx>,
    pub palette: Vec<Color>,
}

impl IndexedImage {
    pub fn from_tile(pixels: &TilePixels, palette: &Palette) -> Self {
        Self {
            width: TILE_SIZE as u32,
            height: TILE_SIZE as u32,
            mode: PixelMode::Indexed,
            pixels: pixels.to_vec(),
            palette: palette.colors.to_vec(),
        }
    }

    pub fn tile_pixels(&self) -> Option<TilePixels> {
        if self.mode != PixelMode::Indexed {
            return None;
        }
        self.pixels.as_slice().try_into().ok()
    }
}

fn unpack_row(row: &[u8], width: usize, depth: BitDepth, out: &mut Vec<ColorIdx>) {
    let bits = depth as usize;
    let per_byte = 8 / bits;
    let mask = ((1u16 << bits) - 1) as u8;
    for x in 0..width {
        let byte = row[x / per_byte];
        let shift = 8 - bits * (x % per_byte + 1);
        out.push((byte >> shift) & mask);
    }
}

pub fn read_png(path: &Path) -> anyhow::Result<IndexedImage> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(Transformations::IDENTITY);
    let mut reader = decoder
        .read_info()
        .with_context(|| format!("decoding {}", path.display()))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader
        .next_frame(&mut buf)
        .with_context(|| format!("decoding {}", path.display()))?;

    let mode = PixelMode::from(frame.color_type);
    let palette: Vec<Color> = reader
        .info()
        .palette
        .as_ref()
        .map(|p| {
            p.chunks_exact(3)
                .map(|c| Color::new(c[0], c[1], c[2]))
                .collect()
        })
        .unwrap_or_default();

    let mut pixels = vec![];
    if mode == PixelMode::Indexed {
        let width = frame.width as usize;
        for row in buf[..frame.buffer_size()].chunks_exact(frame.line_size) {
            if frame.bit_depth == BitDepth::Eight {
                pixels.extend_from_slice(&row[..width]);
            } else {
                unpack_row(row, width, frame.bit_depth, &mut pixels);
            }
        }
    }
    debug!(
        "Read {} ({}x{}, {:?}, {} palette entries)",
        path.display(),
        frame.width,
        frame.height,
        mode,
        palette.len()
    );

    Ok(IndexedImage {
        width: frame.width,
        height: frame.height,
        mode,
        pixels,
        palette,
    })
}

fn encode_error(path: &Path, e: png::EncodingError) -> PipelineError {
    let source = match e {
        png::EncodingError::IoError(io) => io,
        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
    };
    PipelineError::io(path, source)
}

pub fn write_indexed_png(path: &Path, image: &IndexedImage) -> Result<()> {
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), image.width, image.height);
    encoder.set_color(ColorType::Indexed);
    encoder.set_depth(BitDepth::Eight);
    let flat_palette: Vec<u8> = image.palette.iter().flat_map(|c| c.channels()).collect();
    encoder.set_palette(flat_palette);
    let mut writer = encoder
        .write_header()
        .map_err(|e| encode_error(path, e))?;
    writer
        .write_image_data(&image.pixels)
        .map_err(|e| encode_error(path, e))?;
    writer.finish().map_err(|e| encode_error(path, e))
}

pub fn write_rgba_png(path: &Path, width: u32, height: u32, data: &[u8]) -> Result<()> {
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder
        .write_header()
        .map_err(|e| encode_error(path, e))?;
    writer
        .write_image_data(data)
        .map_err(|e| encode_error(path, e))?;
    writer.finish().map_err(|e| encode_error(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{common::TILE_PIXELS, palette::PaletteBank};

    fn sample_tile() -> TilePixels {
        let mut pixels = [0; TILE_PIXELS];
        for (i, p) in pixels.iter_mut().enumerate() {
            *p = (i % 16) as u8;
        }
        pixels
    }

    #[test]
    fn test_indexed_png_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        let bank = PaletteBank::grayscale();
        let image = IndexedImage::from_tile(&sample_tile(), bank.palette(8).unwrap());
        write_indexed_png(&path, &image).unwrap();
        let back = read_png(&path).unwrap();
        assert_eq!(back, image);
        assert_eq!(back.tile_pixels(), Some(sample_tile()));
    }

    #[test]
    fn test_read_four_bit_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile4.png");
        let file = File::create(&path).unwrap();
        let mut encoder = png::Encoder::new(BufWriter::new(file), 8, 8);
        encoder.set_color(ColorType::Indexed);
        encoder.set_depth(BitDepth::Four);
        encoder.set_palette(vec![0u8; 16 * 3]);
        let mut writer = encoder.write_header().unwrap();
        // Each row: pixels 0x1,0x2,...,0x8 packed high nibble first
        let row = [0x12, 0x34, 0x56, 0x78];
        let data: Vec<u8> = row.iter().copied().cycle().take(32).collect();
        writer.write_image_data(&data).unwrap();
        writer.finish().unwrap();

        let image = read_png(&path).unwrap();
        assert_eq!(image.mode, PixelMode::Indexed);
        assert_eq!(&image.pixels[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(image.pixels.len(), 64);
        assert_eq!(image.palette.len(), 16);
    }

    #[test]
    fn test_read_rgb_reports_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.png");
        let data = vec![255u8; 8 * 8 * 4];
        write_rgba_png(&path, 8, 8, &data).unwrap();
        let image = read_png(&path).unwrap();
        assert_eq!(image.mode, PixelMode::Rgba);
        assert!(image.pixels.is_empty());
        assert_eq!(image.tile_pixels(), None);
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_png(Path::new("/nonexistent/tile.png")).unwrap_err();
        assert!(format!("{:#}", err).starts_with("opening /nonexistent/tile.png: "));
    }

    #[test]
    fn test_tile_pixels_requires_64() {
        let image = IndexedImage {
            width: 16,
            height: 16,
            mode: PixelMode::Indexed,
            pixels: vec![0; 256],
            palette: vec![],
        };
        assert_eq!(image.tile_pixels(), None);
    }
}
