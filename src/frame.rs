//! Frame construction.
//!
//! A frame is the whole image serialized as draw commands, one per pixel,
//! in a random permutation. It is built once and shared read-only by every
//! connection; handing out a copy is a reference count bump on [`Bytes`].

use crate::error::ImageDecodeError;
use crate::pixel::Pixel;
use bytes::{Bytes, BytesMut};
use image::RgbaImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::Path;
use tracing::debug;

/// Read and decode an image file (PNG, JPEG or GIF).
pub fn load_image(path: &Path) -> Result<RgbaImage, ImageDecodeError> {
    let data = std::fs::read(path).map_err(|source| ImageDecodeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let image = decode_image(&data)?;
    debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "Decoded image"
    );
    Ok(image)
}

/// Decode an in-memory image, guessing the format from its contents.
pub fn decode_image(data: &[u8]) -> Result<RgbaImage, ImageDecodeError> {
    Ok(image::load_from_memory(data)?.to_rgba8())
}

/// Serialized draw commands for one image.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Bytes,
    pixels: usize,
}

impl Frame {
    /// Number of draw commands in the frame.
    pub fn pixel_count(&self) -> usize {
        self.pixels
    }

    /// Length of the serialized frame in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A shared handle onto the frame buffer, one per enqueue.
    pub fn work_item(&self) -> Bytes {
        self.data.clone()
    }
}

/// Builds frames at a fixed canvas offset with a seeded pixel order.
#[derive(Debug, Clone, Copy)]
pub struct FrameBuilder {
    offset_x: u32,
    offset_y: u32,
    seed: u64,
}

impl FrameBuilder {
    pub fn new(offset_x: u32, offset_y: u32, seed: u64) -> Self {
        Self {
            offset_x,
            offset_y,
            seed,
        }
    }

    /// Serialize every pixel of `image` in a seeded random order.
    pub fn build(&self, image: &RgbaImage) -> Frame {
        let pixels = self.collect_pixels(image);

        let mut order: Vec<usize> = (0..pixels.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        order.shuffle(&mut rng);

        let data = serialize(&pixels, &order);

        Frame {
            data: data.freeze(),
            pixels: pixels.len(),
        }
    }

    /// Column-major walk over the image, offset applied.
    fn collect_pixels(&self, image: &RgbaImage) -> Vec<Pixel> {
        let (width, height) = image.dimensions();
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for x in 0..width {
            for y in 0..height {
                pixels.push(Pixel::new(
                    u64::from(x) + u64::from(self.offset_x),
                    u64::from(y) + u64::from(self.offset_y),
                    image.get_pixel(x, y).0,
                ));
            }
        }
        pixels
    }
}

/// Encode `pixels` in `order` into a buffer sized to the exact output length.
fn serialize(pixels: &[Pixel], order: &[usize]) -> BytesMut {
    let len = pixels.iter().map(Pixel::encoded_len).sum();
    let mut data = BytesMut::with_capacity(len);
    for &i in order {
        pixels[i].encode(&mut data);
    }
    data
}
