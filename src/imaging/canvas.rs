//! Shared RGBA8 output buffer for tile-parallel filters.
//!
//! Each pixel is one `AtomicU32` holding the four channels little-endian, so
//! workers can write their own disjoint sub-areas through `&TileCanvas`
//! without locks. Stores use relaxed ordering; the dispatcher's thread joins
//! publish them before the canvas is read back.

use crate::geometry::Rect;
use image::RgbaImage;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

pub struct TileCanvas {
    width: u32,
    height: u32,
    pixels: Vec<AtomicU32>,
}

impl TileCanvas {
    /// Transparent black canvas.
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Canvas initialized with a copy of `image`.
    pub fn from_image(image: &RgbaImage) -> Self {
        let pixels = image
            .as_raw()
            .par_chunks_exact(4)
            .map(|p| AtomicU32::new(u32::from_le_bytes([p[0], p[1], p[2], p[3]])))
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The whole canvas as a dispatch area.
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.height as i32, self.width as i32)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y as usize * self.width as usize + x as usize
    }

    pub fn load(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels[self.offset(x, y)]
            .load(Ordering::Relaxed)
            .to_le_bytes()
    }

    pub fn store(&self, x: u32, y: u32, rgba: [u8; 4]) {
        self.pixels[self.offset(x, y)].store(u32::from_le_bytes(rgba), Ordering::Relaxed);
    }

    /// Unpack into an owned image.
    pub fn into_image(self) -> RgbaImage {
        let (width, height) = (self.width, self.height);
        let raw: Vec<u8> = self
            .pixels
            .into_par_iter()
            .flat_map_iter(|p| p.into_inner().to_le_bytes())
            .collect();
        RgbaImage::from_raw(width, height, raw).expect("canvas length matches its dimensions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn new_canvas_is_transparent() {
        let canvas = TileCanvas::new(3, 2);
        assert_eq!(canvas.load(2, 1), [0, 0, 0, 0]);
        assert_eq!(canvas.bounds(), Rect::from_size(2, 3));
    }

    #[test]
    fn store_then_load() {
        let canvas = TileCanvas::new(4, 4);
        canvas.store(1, 3, [10, 20, 30, 40]);
        assert_eq!(canvas.load(1, 3), [10, 20, 30, 40]);
        assert_eq!(canvas.load(3, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn from_image_preserves_pixels() {
        let mut image = RgbaImage::new(5, 3);
        image.put_pixel(4, 2, Rgba([1, 2, 3, 4]));
        image.put_pixel(0, 0, Rgba([255, 0, 128, 255]));

        let canvas = TileCanvas::from_image(&image);
        assert_eq!(canvas.width(), 5);
        assert_eq!(canvas.height(), 3);
        assert_eq!(canvas.load(4, 2), [1, 2, 3, 4]);
        assert_eq!(canvas.into_image(), image);
    }

    #[test]
    fn concurrent_disjoint_writes() {
        let canvas = TileCanvas::new(64, 64);
        std::thread::scope(|s| {
            for band in 0..4u32 {
                let canvas = &canvas;
                s.spawn(move || {
                    for y in band * 16..(band + 1) * 16 {
                        for x in 0..64 {
                            canvas.store(x, y, [band as u8, 0, 0, 255]);
                        }
                    }
                });
            }
        });
        let image = canvas.into_image();
        assert_eq!(image.get_pixel(10, 5).0, [0, 0, 0, 255]);
        assert_eq!(image.get_pixel(10, 63).0, [3, 0, 0, 255]);
    }
}
