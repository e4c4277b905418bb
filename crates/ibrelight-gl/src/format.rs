//! Texture and attachment formats.
//!
//! Formats are named by channel layout and storage the way shader authors think
//! about them. Three-channel formats have no native equivalent on the backend and
//! are stored with a padding alpha channel; the texture still reports the format
//! it was created with.

/// Channel interpretation of a color format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    NormalizedFixedPoint,
    SrgbFixedPoint,
    FloatingPoint,
    UnsignedInteger,
    SignedInteger,
}

/// Color texture storage formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    R8,
    RG8,
    RGB8,
    RGBA8,
    SRGBA8,
    R8UI,
    R8I,
    RGBA8UI,
    R16UI,
    R16I,
    R16F,
    RG16F,
    RGB16F,
    RGBA16F,
    R32UI,
    R32I,
    RGBA32UI,
    R32F,
    RG32F,
    RGB32F,
    RGBA32F,
    RGB10A2,
}

impl ColorFormat {
    /// Backend storage format.
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        use wgpu::TextureFormat as F;
        match self {
            Self::R8 => F::R8Unorm,
            Self::RG8 => F::Rg8Unorm,
            Self::RGB8 | Self::RGBA8 => F::Rgba8Unorm,
            Self::SRGBA8 => F::Rgba8UnormSrgb,
            Self::R8UI => F::R8Uint,
            Self::R8I => F::R8Sint,
            Self::RGBA8UI => F::Rgba8Uint,
            Self::R16UI => F::R16Uint,
            Self::R16I => F::R16Sint,
            Self::R16F => F::R16Float,
            Self::RG16F => F::Rg16Float,
            Self::RGB16F | Self::RGBA16F => F::Rgba16Float,
            Self::R32UI => F::R32Uint,
            Self::R32I => F::R32Sint,
            Self::RGBA32UI => F::Rgba32Uint,
            Self::R32F => F::R32Float,
            Self::RG32F => F::Rg32Float,
            Self::RGB32F | Self::RGBA32F => F::Rgba32Float,
            Self::RGB10A2 => F::Rgb10a2Unorm,
        }
    }

    /// Channel interpretation.
    #[must_use]
    pub fn data_type(self) -> DataType {
        match self {
            Self::R8 | Self::RG8 | Self::RGB8 | Self::RGBA8 | Self::RGB10A2 => {
                DataType::NormalizedFixedPoint
            }
            Self::SRGBA8 => DataType::SrgbFixedPoint,
            Self::R8UI | Self::RGBA8UI | Self::R16UI | Self::R32UI | Self::RGBA32UI => {
                DataType::UnsignedInteger
            }
            Self::R8I | Self::R16I | Self::R32I => DataType::SignedInteger,
            Self::R16F
            | Self::RG16F
            | Self::RGB16F
            | Self::RGBA16F
            | Self::R32F
            | Self::RG32F
            | Self::RGB32F
            | Self::RGBA32F => DataType::FloatingPoint,
        }
    }

    /// Number of channels the caller supplies and reads back.
    #[must_use]
    pub fn channels(self) -> u32 {
        match self {
            Self::R8
            | Self::R8UI
            | Self::R8I
            | Self::R16UI
            | Self::R16I
            | Self::R16F
            | Self::R32UI
            | Self::R32I
            | Self::R32F => 1,
            Self::RG8 | Self::RG16F | Self::RG32F => 2,
            Self::RGB8 | Self::RGB16F | Self::RGB32F => 3,
            Self::RGBA8
            | Self::SRGBA8
            | Self::RGBA8UI
            | Self::RGBA16F
            | Self::RGBA32UI
            | Self::RGBA32F
            | Self::RGB10A2 => 4,
        }
    }

    /// Bytes per channel of caller-supplied data; `None` for packed formats.
    #[must_use]
    pub fn bytes_per_channel(self) -> Option<u32> {
        match self {
            Self::RGB10A2 => None,
            Self::R8
            | Self::RG8
            | Self::RGB8
            | Self::RGBA8
            | Self::SRGBA8
            | Self::R8UI
            | Self::R8I
            | Self::RGBA8UI => Some(1),
            Self::R16UI | Self::R16I | Self::R16F | Self::RG16F | Self::RGB16F | Self::RGBA16F => {
                Some(2)
            }
            Self::R32UI | Self::R32I | Self::RGBA32UI | Self::R32F | Self::RG32F | Self::RGB32F
            | Self::RGBA32F => Some(4),
        }
    }

    /// Whether the format is stored with an extra padding channel.
    #[must_use]
    pub fn is_padded(self) -> bool {
        matches!(self, Self::RGB8 | Self::RGB16F | Self::RGB32F)
    }

    /// Whether values are integers (no filtering, no blending, integer clears).
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self.data_type(),
            DataType::UnsignedInteger | DataType::SignedInteger
        )
    }

    /// Expands tightly packed texels to the backend layout.
    ///
    /// Three-channel data gets an opaque alpha channel appended per texel.
    #[must_use]
    pub fn pad_texels(self, data: &[u8]) -> Vec<u8> {
        if !self.is_padded() {
            return data.to_vec();
        }
        let channel = self.bytes_per_channel().unwrap_or(1) as usize;
        let opaque: &[u8] = match self {
            Self::RGB16F => &[0x00, 0x3C],
            Self::RGB32F => &[0x00, 0x00, 0x80, 0x3F],
            _ => &[0xFF],
        };
        let texel = 3 * channel;
        let mut padded = Vec::with_capacity(data.len() / texel * (texel + channel));
        for rgb in data.chunks_exact(texel) {
            padded.extend_from_slice(rgb);
            padded.extend_from_slice(opaque);
        }
        padded
    }

    /// Drops the padding channel from backend-layout texels.
    #[must_use]
    pub fn strip_padding(self, data: &[u8]) -> Vec<u8> {
        if !self.is_padded() {
            return data.to_vec();
        }
        let channel = self.bytes_per_channel().unwrap_or(1) as usize;
        let stored = 4 * channel;
        let mut stripped = Vec::with_capacity(data.len() / stored * 3 * channel);
        for rgba in data.chunks_exact(stored) {
            stripped.extend_from_slice(&rgba[..3 * channel]);
        }
        stripped
    }
}

/// Block-compressed color formats. Data must be supplied pre-compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionFormat {
    /// BC1: RGB with 1-bit alpha, 8 bytes per 4×4 block.
    RgbaDxt1,
    /// BC1 in sRGB space.
    SrgbaDxt1,
    /// BC3: RGBA, 16 bytes per 4×4 block.
    RgbaDxt5,
    /// BC3 in sRGB space.
    SrgbaDxt5,
    /// BC4: single channel.
    RedRgtc1,
    /// BC5: two channels.
    RedGreenRgtc2,
    /// BC7: high-quality RGBA.
    RgbaBptc,
}

impl CompressionFormat {
    /// Backend storage format.
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        use wgpu::TextureFormat as F;
        match self {
            Self::RgbaDxt1 => F::Bc1RgbaUnorm,
            Self::SrgbaDxt1 => F::Bc1RgbaUnormSrgb,
            Self::RgbaDxt5 => F::Bc3RgbaUnorm,
            Self::SrgbaDxt5 => F::Bc3RgbaUnormSrgb,
            Self::RedRgtc1 => F::Bc4RUnorm,
            Self::RedGreenRgtc2 => F::Bc5RgUnorm,
            Self::RgbaBptc => F::Bc7RgbaUnorm,
        }
    }
}

/// Depth storage precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthPrecision {
    Fixed16,
    #[default]
    Fixed24,
    Float32,
}

impl DepthPrecision {
    /// Backend depth-only format.
    #[must_use]
    pub fn depth_format(self) -> wgpu::TextureFormat {
        match self {
            Self::Fixed16 => wgpu::TextureFormat::Depth16Unorm,
            Self::Fixed24 => wgpu::TextureFormat::Depth24Plus,
            Self::Float32 => wgpu::TextureFormat::Depth32Float,
        }
    }

    /// Backend combined depth-stencil format, if the precision has one.
    #[must_use]
    pub fn depth_stencil_format(self) -> Option<wgpu::TextureFormat> {
        match self {
            Self::Fixed16 => None,
            Self::Fixed24 => Some(wgpu::TextureFormat::Depth24PlusStencil8),
            Self::Float32 => Some(wgpu::TextureFormat::Depth32FloatStencil8),
        }
    }
}

/// The format of a texture as requested at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Color(ColorFormat),
    Compressed(CompressionFormat),
    Depth(DepthPrecision),
    Stencil,
    DepthStencil(DepthPrecision),
}

impl TextureFormat {
    /// Backend storage format.
    #[must_use]
    pub fn to_wgpu(self) -> Option<wgpu::TextureFormat> {
        match self {
            Self::Color(color) => Some(color.to_wgpu()),
            Self::Compressed(compressed) => Some(compressed.to_wgpu()),
            Self::Depth(precision) => Some(precision.depth_format()),
            Self::Stencil => Some(wgpu::TextureFormat::Stencil8),
            Self::DepthStencil(precision) => precision.depth_stencil_format(),
        }
    }

    /// The color format, if this is an uncompressed color texture.
    #[must_use]
    pub fn color(self) -> Option<ColorFormat> {
        match self {
            Self::Color(color) => Some(color),
            _ => None,
        }
    }
}
