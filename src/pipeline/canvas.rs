use std::io::Cursor;

use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use fast_image_resize as fir;
use image::{ExtendedColorType, codecs::jpeg::JpegEncoder};
use rayon::prelude::*;

use crate::types::Frame;

pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// RGBA drawing surface the session paints each frame and overlay onto.
#[derive(Clone, Debug)]
pub struct Canvas {
    rgba: Vec<u8>,
    width: u32,
    height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            rgba: vec![0u8; width as usize * height as usize * 4],
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.rgba
    }

    pub fn clear(&mut self) {
        self.rgba.par_chunks_mut(4096).for_each(|chunk| chunk.fill(0));
    }

    pub fn is_blank(&self) -> bool {
        self.rgba.par_iter().all(|&b| b == 0)
    }

    /// Copies `frame` onto the whole surface, rescaling when the sizes differ.
    pub fn draw_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.rgba.len() != frame.expected_len() {
            return Err(anyhow!(
                "frame buffer size mismatch: got {}, expected {}",
                frame.rgba.len(),
                frame.expected_len()
            ));
        }

        if frame.width == self.width && frame.height == self.height {
            self.rgba.copy_from_slice(&frame.rgba);
            return Ok(());
        }

        let src = fir::images::Image::from_vec_u8(
            frame.width,
            frame.height,
            frame.rgba.clone(),
            fir::PixelType::U8x4,
        )?;
        let mut dst = fir::images::Image::new(self.width, self.height, fir::PixelType::U8x4);
        let options = fir::ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
        fir::Resizer::new()
            .resize(&src, &mut dst, Some(&options))
            .context("fast resize failed")?;
        self.rgba = dst.into_vec();
        Ok(())
    }

    pub fn put_pixel(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        self.rgba[idx..idx + 4].copy_from_slice(&color);
    }

    pub fn fill_disc(&mut self, cx: f32, cy: f32, radius: f32, color: [u8; 4]) {
        let r = radius.max(0.5);
        let (x0, x1) = ((cx - r).floor() as i32, (cx + r).ceil() as i32);
        let (y0, y1) = ((cy - r).floor() as i32, (cy + r).ceil() as i32);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                if dx * dx + dy * dy <= r * r {
                    self.put_pixel(x, y, color);
                }
            }
        }
    }

    /// Strokes a segment by stamping discs every half pixel along it.
    pub fn stroke_segment(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: [u8; 4]) {
        let radius = (width / 2.0).max(0.5);
        let length = ((to.0 - from.0).powi(2) + (to.1 - from.1).powi(2)).sqrt();
        let steps = (length * 2.0).ceil().max(1.0) as usize;
        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            let x = from.0 + (to.0 - from.0) * t;
            let y = from.1 + (to.1 - from.1) * t;
            self.fill_disc(x, y, radius, color);
        }
    }

    /// Encodes the surface as JPEG at `quality` (0..1) and wraps it in a data URL.
    pub fn encode_jpeg_data_url(&self, quality: f32) -> Result<String> {
        let rgb: Vec<u8> = self
            .rgba
            .par_chunks_exact(4)
            .flat_map_iter(|px| [px[0], px[1], px[2]])
            .collect();

        let quality = (quality.clamp(0.01, 1.0) * 100.0).round() as u8;
        let mut jpeg = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut jpeg, quality)
            .encode(&rgb, self.width, self.height, ExtendedColorType::Rgb8)
            .context("failed to encode canvas as JPEG")?;

        let jpeg = jpeg.into_inner();
        let mut url = String::with_capacity(JPEG_DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
        url.push_str(JPEG_DATA_URL_PREFIX);
        BASE64.encode_string(&jpeg, &mut url);
        Ok(url)
    }
}
