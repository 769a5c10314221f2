use image::{GrayImage, Luma, Rgb, RgbImage};

/// ITU-R 601 weights in 16.16 fixed point; they sum to 1 << 16.
const LUMA_R: u32 = 19595;
const LUMA_G: u32 = 38470;
const LUMA_B: u32 = 7471;

/// Convert a region to single-channel luminance (ITU-R 601-2, rounded)
pub fn to_grayscale(region: &RgbImage) -> GrayImage {
    GrayImage::from_fn(region.width(), region.height(), |x, y| {
        let Rgb([r, g, b]) = *region.get_pixel(x, y);
        Luma([luma(r, g, b)])
    })
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B + 0x8000) >> 16) as u8
}

/// Force every nonzero pixel to 255
pub fn normalize_mask(mask: &mut GrayImage) {
    for p in mask.pixels_mut() {
        if p[0] != 0 {
            p[0] = 255;
        }
    }
}
