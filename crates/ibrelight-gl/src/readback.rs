//! GPU→host color readback and image persistence.

use std::path::Path;

use image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};

use crate::context::Context;
use crate::error::{GlError, GlResult};
use crate::format::{ColorFormat, DataType};

/// File formats a color attachment can be saved as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFileFormat {
    Png,
    Jpeg,
    Bmp,
    Tiff,
    OpenExr,
}

impl ImageFileFormat {
    /// Guesses the format from a file extension, case-insensitively.
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            "exr" => Some(Self::OpenExr),
            _ => None,
        }
    }

    /// Conventional extension, without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::OpenExr => "exr",
        }
    }

    fn encoder_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Bmp => image::ImageFormat::Bmp,
            Self::Tiff => image::ImageFormat::Tiff,
            Self::OpenExr => image::ImageFormat::OpenExr,
        }
    }
}

/// Host copy of one color attachment.
///
/// Rows are tightly packed, top row first, in the caller layout of `format`
/// (three-channel formats without padding). A readback can be reused across
/// reads; it is resized when the source changes size or format.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorReadback {
    width: u32,
    height: u32,
    format: ColorFormat,
    data: Vec<u8>,
}

impl ColorReadback {
    /// A zero-filled readback for a `width × height` attachment of `format`.
    #[must_use]
    pub fn new(width: u32, height: u32, format: ColorFormat) -> Self {
        Self {
            width,
            height,
            format,
            data: vec![0; Self::byte_len(width, height, format)],
        }
    }

    /// Wraps existing caller-layout data.
    pub fn from_data(width: u32, height: u32, format: ColorFormat, data: Vec<u8>) -> GlResult<Self> {
        let expected = Self::byte_len(width, height, format);
        if data.len() != expected {
            return Err(GlError::config(format!(
                "readback data has {} bytes, expected {expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    fn byte_len(width: u32, height: u32, format: ColorFormat) -> usize {
        let texel = format
            .bytes_per_channel()
            .map_or(4, |bytes| bytes * format.channels());
        width as usize * height as usize * texel as usize
    }

    pub(crate) fn reset(&mut self, width: u32, height: u32, format: ColorFormat) {
        self.width = width;
        self.height = height;
        self.format = format;
        self.data.clear();
        self.data.resize(Self::byte_len(width, height, format), 0);
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn format(&self) -> ColorFormat {
        self.format
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Caller-layout channel values as `f32`.
    ///
    /// Normalized formats map to `[0, 1]`; integer formats keep their value.
    #[must_use]
    pub fn to_f32(&self) -> Vec<f32> {
        let format = self.format;
        match (format.data_type(), format.bytes_per_channel()) {
            (_, None) => self
                .data
                .chunks_exact(4)
                .flat_map(|b| {
                    let packed = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                    [
                        (packed & 0x3FF) as f32 / 1023.0,
                        ((packed >> 10) & 0x3FF) as f32 / 1023.0,
                        ((packed >> 20) & 0x3FF) as f32 / 1023.0,
                        (packed >> 30) as f32 / 3.0,
                    ]
                })
                .collect(),
            (DataType::NormalizedFixedPoint | DataType::SrgbFixedPoint, _) => {
                self.data.iter().map(|&v| f32::from(v) / 255.0).collect()
            }
            (DataType::FloatingPoint, Some(2)) => self
                .data
                .chunks_exact(2)
                .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
            (DataType::FloatingPoint, _) => self
                .data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            (DataType::UnsignedInteger, Some(1)) => self.data.iter().map(|&v| f32::from(v)).collect(),
            (DataType::SignedInteger, Some(1)) => self
                .data
                .iter()
                .map(|&v| f32::from(i8::from_le_bytes([v])))
                .collect(),
            (DataType::UnsignedInteger, Some(2)) => self
                .data
                .chunks_exact(2)
                .map(|b| f32::from(u16::from_le_bytes([b[0], b[1]])))
                .collect(),
            (DataType::SignedInteger, Some(2)) => self
                .data
                .chunks_exact(2)
                .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])))
                .collect(),
            (DataType::UnsignedInteger, _) => self
                .data
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32)
                .collect(),
            (DataType::SignedInteger, _) => self
                .data
                .chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32)
                .collect(),
        }
    }

    /// Converts to an image for encoding.
    pub fn to_image(&self) -> GlResult<DynamicImage> {
        let (w, h) = (self.width, self.height);
        let invalid = || GlError::config("readback data does not match its dimensions");
        let eight_bit = matches!(
            self.format.data_type(),
            DataType::NormalizedFixedPoint | DataType::SrgbFixedPoint | DataType::UnsignedInteger
        ) && self.format.bytes_per_channel() == Some(1);

        if eight_bit {
            let data = self.data.clone();
            let image = match self.format.channels() {
                1 => DynamicImage::ImageLuma8(
                    ImageBuffer::<Luma<u8>, _>::from_raw(w, h, data).ok_or_else(invalid)?,
                ),
                2 => DynamicImage::ImageLumaA8(
                    ImageBuffer::<LumaA<u8>, _>::from_raw(w, h, data).ok_or_else(invalid)?,
                ),
                3 => DynamicImage::ImageRgb8(
                    ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, data).ok_or_else(invalid)?,
                ),
                _ => DynamicImage::ImageRgba8(
                    ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, data).ok_or_else(invalid)?,
                ),
            };
            return Ok(image);
        }

        let channels = if self.format.bytes_per_channel().is_none() {
            4
        } else {
            self.format.channels() as usize
        };
        let values = self.to_f32();
        let mut rgba = Vec::with_capacity(w as usize * h as usize * 4);
        for texel in values.chunks_exact(channels) {
            let pixel = match *texel {
                [v] => [v, v, v, 1.0],
                [r, g] => [r, g, 0.0, 1.0],
                [r, g, b] => [r, g, b, 1.0],
                [r, g, b, a, ..] => [r, g, b, a],
                [] => [0.0, 0.0, 0.0, 1.0],
            };
            rgba.extend_from_slice(&pixel);
        }
        Ok(DynamicImage::ImageRgba32F(
            ImageBuffer::<Rgba<f32>, _>::from_raw(w, h, rgba).ok_or_else(invalid)?,
        ))
    }

    /// Encodes the readback to `path`.
    pub fn save(&self, path: impl AsRef<Path>, file_format: ImageFileFormat) -> GlResult<()> {
        let image = self.to_image()?;
        let path = path.as_ref();
        match file_format {
            ImageFileFormat::OpenExr => {
                DynamicImage::ImageRgba32F(image.to_rgba32f())
                    .save_with_format(path, file_format.encoder_format())?;
            }
            ImageFileFormat::Jpeg => {
                image
                    .to_rgb8()
                    .save_with_format(path, file_format.encoder_format())?;
            }
            ImageFileFormat::Png | ImageFileFormat::Bmp | ImageFileFormat::Tiff => {
                let image = match image {
                    DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgba8(image.to_rgba8()),
                    other => other,
                };
                image.save_with_format(path, file_format.encoder_format())?;
            }
        }
        log::debug!("saved {}x{} image to {}", self.width, self.height, path.display());
        Ok(())
    }

    /// Encodes the readback as PNG in memory.
    pub fn encode_png(&self) -> GlResult<Vec<u8>> {
        let image = match self.to_image()? {
            float @ DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgba8(float.to_rgba8()),
            other => other,
        };
        let mut buffer = std::io::Cursor::new(Vec::new());
        image.write_to(&mut buffer, image::ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}

/// Row pitch of a buffer copy, aligned for the backend.
pub(crate) fn aligned_bytes_per_row(width: u32, texel_bytes: u32) -> u32 {
    let unaligned = width * texel_bytes;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

/// Copies level 0 of `texture` into `readback`.
///
/// Pending commands are flushed first so the copy observes every recorded draw.
pub(crate) fn read_texture_into(
    context: &Context,
    texture: &wgpu::Texture,
    format: ColorFormat,
    readback: &mut ColorReadback,
) -> GlResult<()> {
    context.flush()?;

    let (width, height) = (texture.width(), texture.height());
    let texel_bytes = texture
        .format()
        .block_copy_size(None)
        .ok_or(GlError::ReadbackFailed)?;
    let bytes_per_row = aligned_bytes_per_row(width, texel_bytes);
    let device = context.device();

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("ibrelight readback buffer"),
        size: u64::from(bytes_per_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("ibrelight readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    context.queue().submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|_| GlError::ReadbackFailed)?;
    rx.recv()
        .map_err(|_| GlError::ReadbackFailed)?
        .map_err(|_| GlError::ReadbackFailed)?;

    let mapped = slice.get_mapped_range();
    let row_bytes = (width * texel_bytes) as usize;
    let mut stored = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * bytes_per_row as usize;
        stored.extend_from_slice(&mapped[start..start + row_bytes]);
    }
    drop(mapped);
    buffer.unmap();

    readback.reset(width, height, format);
    readback.data = format.strip_padding(&stored);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup() {
        assert_eq!(ImageFileFormat::from_extension("PNG"), Some(ImageFileFormat::Png));
        assert_eq!(ImageFileFormat::from_extension("jpeg"), Some(ImageFileFormat::Jpeg));
        assert_eq!(ImageFileFormat::from_extension("exr"), Some(ImageFileFormat::OpenExr));
        assert_eq!(ImageFileFormat::from_extension("gif"), None);
        assert_eq!(ImageFileFormat::Tiff.extension(), "tiff");
    }

    #[test]
    fn test_aligned_bytes_per_row() {
        assert_eq!(aligned_bytes_per_row(1, 4), 256);
        assert_eq!(aligned_bytes_per_row(64, 4), 256);
        assert_eq!(aligned_bytes_per_row(65, 4), 512);
    }

    #[test]
    fn test_readback_sizes() {
        let readback = ColorReadback::new(4, 2, ColorFormat::RGB32F);
        assert_eq!(readback.data().len(), 96);
        assert!(ColorReadback::from_data(2, 2, ColorFormat::RGBA8, vec![0; 15]).is_err());
    }

    #[test]
    fn test_to_f32_normalizes_unorm() {
        let readback = ColorReadback::from_data(1, 1, ColorFormat::RGBA8, vec![0, 51, 255, 255]).unwrap();
        let values = readback.to_f32();
        assert!((values[1] - 0.2).abs() < 1e-6);
        assert!((values[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_to_f32_half_and_integer() {
        let half_one = half::f16::from_f32(1.5).to_le_bytes();
        let readback = ColorReadback::from_data(1, 1, ColorFormat::R16F, half_one.to_vec()).unwrap();
        assert!((readback.to_f32()[0] - 1.5).abs() < 1e-3);

        let readback = ColorReadback::from_data(2, 1, ColorFormat::R8UI, vec![3, 200]).unwrap();
        assert_eq!(readback.to_f32(), vec![3.0, 200.0]);
    }

    #[test]
    fn test_to_image_keeps_eight_bit_layout() {
        let readback = ColorReadback::from_data(1, 1, ColorFormat::RGB8, vec![1, 2, 3]).unwrap();
        let image = readback.to_image().unwrap();
        assert_eq!(image.to_rgb8().into_raw(), vec![1, 2, 3]);

        let readback = ColorReadback::from_data(1, 1, ColorFormat::R32F, 0.5f32.to_le_bytes().to_vec()).unwrap();
        let image = readback.to_image().unwrap();
        assert!(matches!(image, DynamicImage::ImageRgba32F(_)));
    }

    #[test]
    fn test_encode_png_round_trips_pixels() {
        let readback = ColorReadback::from_data(2, 1, ColorFormat::RGBA8, vec![10, 20, 30, 255, 40, 50, 60, 255]).unwrap();
        let png = readback.encode_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.into_raw(), readback.data().to_vec());
    }
}
