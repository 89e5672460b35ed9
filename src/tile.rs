// Planar 4bpp tile codec. Each row is stored as four bit-planes: planes 0 and 1
// interleaved in the first 16 bytes, planes 2 and 3 interleaved in the last 16.
// The leftmost pixel of a row is the most significant bit of each plane byte.
use crate::common::{TileBytes, TilePixels, TILE_BYTES, TILE_PIXELS, TILE_SIZE};

pub fn decode(data: &TileBytes) -> TilePixels {
    let mut pixels = [0; TILE_PIXELS];
    for y in 0..TILE_SIZE {
        for x in 0..TILE_SIZE {
            let c0 = (data[y * 2] >> (7 - x)) & 1;
            let c1 = (data[y * 2 + 1] >> (7 - x)) & 1;
            let c2 = (data[y * 2 + 16] >> (7 - x)) & 1;
            let c3 = (data[y * 2 + 17] >> (7 - x)) & 1;
            pixels[y * TILE_SIZE + x] = c0 | (c1 << 1) | (c2 << 2) | (c3 << 3);
        }
    }
    pixels
}

/// Pixels are masked to 4 bits before packing; larger values are truncated, not rejected.
pub fn encode(pixels: &TilePixels) -> TileBytes {
    let mut data = [0; TILE_BYTES];
    for y in 0..TILE_SIZE {
        for x in 0..TILE_SIZE {
            let c = pixels[y * TILE_SIZE + x] & 0xF;
            let bit = 7 - x;
            data[y * 2] |= (c & 1) << bit;
            data[y * 2 + 1] |= ((c >> 1) & 1) << bit;
            data[y * 2 + 16] |= ((c >> 2) & 1) << bit;
            data[y * 2 + 17] |= ((c >> 3) & 1) << bit;
        }
    }
    data
}
