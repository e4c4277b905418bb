//! Texture builders and textures.
//!
//! A [`TextureBuilder`] is parameterized by a kind tag ([`Color`], [`Depth`],
//! [`Stencil`], [`DepthStencil`], [`ColorCubemap`], [`DepthArray`]). Common options
//! are available on every kind; format and data setters only on the kinds they
//! make sense for. Nothing touches the GPU until [`TextureBuilder::create_texture`],
//! which validates the whole configuration against the context's capabilities.

use std::marker::PhantomData;

use crate::context::Context;
use crate::error::{GlError, GlResult};
use crate::format::{ColorFormat, CompressionFormat, DepthPrecision, TextureFormat};
use crate::resource::GraphicsResource;

/// Sample counts the builders accept.
pub const SUPPORTED_SAMPLE_COUNTS: [u32; 5] = [1, 2, 4, 8, 16];

/// Largest anisotropy the samplers accept.
pub const MAX_ANISOTROPY: f32 = 16.0;

/// Dimensionality of a texture as seen by shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureShape {
    Texture2D,
    Cubemap,
    Texture2DArray,
}

impl TextureShape {
    fn view_dimension(self) -> wgpu::TextureViewDimension {
        match self {
            Self::Texture2D => wgpu::TextureViewDimension::D2,
            Self::Cubemap => wgpu::TextureViewDimension::Cube,
            Self::Texture2DArray => wgpu::TextureViewDimension::D2Array,
        }
    }
}

/// Faces of a cubemap, in layer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubemapFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubemapFace {
    /// Array layer holding this face.
    #[must_use]
    pub fn layer(self) -> u32 {
        self as u32
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Kind tag of a [`TextureBuilder`].
pub trait TextureKind: sealed::Sealed {
    /// Kind-specific builder state.
    type Config: Default;

    /// Shader-visible shape.
    const SHAPE: TextureShape;

    /// Resolves the format requested through the kind-specific setters.
    fn resolve_format(config: &Self::Config) -> GlResult<TextureFormat>;

    /// Per-layer initial data, if any was supplied.
    fn layer_data(_config: &Self::Config) -> &[Option<Vec<u8>>] {
        &[]
    }
}

/// 2D color texture.
#[derive(Debug)]
pub struct Color;
/// 2D depth texture.
#[derive(Debug)]
pub struct Depth;
/// 2D stencil texture.
#[derive(Debug)]
pub struct Stencil;
/// 2D combined depth-stencil texture.
#[derive(Debug)]
pub struct DepthStencil;
/// Six-face color cubemap.
#[derive(Debug)]
pub struct ColorCubemap;
/// Array of 2D depth textures.
#[derive(Debug)]
pub struct DepthArray;

impl sealed::Sealed for Color {}
impl sealed::Sealed for Depth {}
impl sealed::Sealed for Stencil {}
impl sealed::Sealed for DepthStencil {}
impl sealed::Sealed for ColorCubemap {}
impl sealed::Sealed for DepthArray {}

/// Format and data state of the color kinds.
#[derive(Debug, Default, Clone)]
pub struct ColorConfig {
    internal_format: Option<ColorFormat>,
    compression: Option<CompressionFormat>,
    data: Vec<Option<Vec<u8>>>,
}

impl ColorConfig {
    fn resolve(&self) -> GlResult<TextureFormat> {
        match (self.internal_format, self.compression) {
            (Some(color), Some(compressed)) => Err(GlError::config(format!(
                "color format {color:?} conflicts with compression format {compressed:?}"
            ))),
            (None, Some(compressed)) => Ok(TextureFormat::Compressed(compressed)),
            (color, None) => Ok(TextureFormat::Color(color.unwrap_or(ColorFormat::RGBA8))),
        }
    }

    fn set_layer(&mut self, layer: usize, data: Vec<u8>) {
        if self.data.len() <= layer {
            self.data.resize(layer + 1, None);
        }
        self.data[layer] = Some(data);
    }
}

/// Precision state of the depth kinds.
#[derive(Debug, Default, Clone, Copy)]
pub struct DepthConfig {
    precision: DepthPrecision,
}

impl TextureKind for Color {
    type Config = ColorConfig;
    const SHAPE: TextureShape = TextureShape::Texture2D;

    fn resolve_format(config: &ColorConfig) -> GlResult<TextureFormat> {
        config.resolve()
    }

    fn layer_data(config: &ColorConfig) -> &[Option<Vec<u8>>] {
        &config.data
    }
}

impl TextureKind for ColorCubemap {
    type Config = ColorConfig;
    const SHAPE: TextureShape = TextureShape::Cubemap;

    fn resolve_format(config: &ColorConfig) -> GlResult<TextureFormat> {
        config.resolve()
    }

    fn layer_data(config: &ColorConfig) -> &[Option<Vec<u8>>] {
        &config.data
    }
}

impl TextureKind for Depth {
    type Config = DepthConfig;
    const SHAPE: TextureShape = TextureShape::Texture2D;

    fn resolve_format(config: &DepthConfig) -> GlResult<TextureFormat> {
        Ok(TextureFormat::Depth(config.precision))
    }
}

impl TextureKind for DepthArray {
    type Config = DepthConfig;
    const SHAPE: TextureShape = TextureShape::Texture2DArray;

    fn resolve_format(config: &DepthConfig) -> GlResult<TextureFormat> {
        Ok(TextureFormat::Depth(config.precision))
    }
}

impl TextureKind for DepthStencil {
    type Config = DepthConfig;
    const SHAPE: TextureShape = TextureShape::Texture2D;

    fn resolve_format(config: &DepthConfig) -> GlResult<TextureFormat> {
        if config.precision.depth_stencil_format().is_none() {
            return Err(GlError::config(format!(
                "no combined depth-stencil format with {:?} depth",
                config.precision
            )));
        }
        Ok(TextureFormat::DepthStencil(config.precision))
    }
}

impl TextureKind for Stencil {
    type Config = ();
    const SHAPE: TextureShape = TextureShape::Texture2D;

    fn resolve_format((): &()) -> GlResult<TextureFormat> {
        Ok(TextureFormat::Stencil)
    }
}

pub type ColorTextureBuilder = TextureBuilder<Color>;
pub type DepthTextureBuilder = TextureBuilder<Depth>;
pub type StencilTextureBuilder = TextureBuilder<Stencil>;
pub type DepthStencilTextureBuilder = TextureBuilder<DepthStencil>;
pub type ColorCubemapBuilder = TextureBuilder<ColorCubemap>;
pub type DepthTextureArrayBuilder = TextureBuilder<DepthArray>;

/// Options shared by every texture kind.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TextureSettings {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) layers: u32,
    pub(crate) shape: TextureShape,
    pub(crate) multisamples: u32,
    pub(crate) mipmaps: bool,
    pub(crate) linear_filtering: bool,
    pub(crate) max_anisotropy: f32,
}

impl TextureSettings {
    pub(crate) fn new(width: u32, height: u32, layers: u32, shape: TextureShape) -> Self {
        Self {
            width,
            height,
            layers,
            shape,
            multisamples: 1,
            mipmaps: false,
            linear_filtering: false,
            max_anisotropy: 1.0,
        }
    }
}

/// What the device offers for one format.
#[derive(Debug, Clone)]
pub(crate) struct Capabilities {
    pub(crate) features: wgpu::Features,
    pub(crate) max_dimension: u32,
    pub(crate) max_layers: u32,
    pub(crate) format_features: wgpu::TextureFormatFeatures,
}

/// A validated texture allocation.
#[derive(Debug)]
pub(crate) struct TexturePlan {
    pub(crate) format: wgpu::TextureFormat,
    pub(crate) mip_level_count: u32,
    pub(crate) usage: wgpu::TextureUsages,
    /// Per layer, per mip level, in backend layout.
    pub(crate) uploads: Vec<Option<Vec<Vec<u8>>>>,
}

/// Number of levels in a full mip chain.
#[must_use]
pub fn full_mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Bytes of caller-layout data one full layer of `format` occupies.
#[must_use]
pub fn expected_data_len(format: TextureFormat, width: u32, height: u32) -> Option<usize> {
    match format {
        TextureFormat::Color(color) => {
            let texel = color
                .bytes_per_channel()
                .map_or(4, |bytes| bytes * color.channels());
            Some(width as usize * height as usize * texel as usize)
        }
        TextureFormat::Compressed(compressed) => {
            let wgpu_format = compressed.to_wgpu();
            let (bw, bh) = wgpu_format.block_dimensions();
            let block_bytes = wgpu_format.block_copy_size(None)?;
            let blocks = width.div_ceil(bw) as usize * height.div_ceil(bh) as usize;
            Some(blocks * block_bytes as usize)
        }
        TextureFormat::Depth(_) | TextureFormat::Stencil | TextureFormat::DepthStencil(_) => None,
    }
}

/// Validates `settings` for `format` and prepares the uploads.
pub(crate) fn plan_texture(
    settings: &TextureSettings,
    format: TextureFormat,
    data: &[Option<Vec<u8>>],
    caps: &Capabilities,
) -> GlResult<TexturePlan> {
    let TextureSettings {
        width,
        height,
        layers,
        shape,
        multisamples,
        mipmaps,
        linear_filtering,
        max_anisotropy,
    } = *settings;

    if width == 0 || height == 0 {
        return Err(GlError::config(format!(
            "texture dimensions must be non-zero, got {width}x{height}"
        )));
    }
    if width > caps.max_dimension || height > caps.max_dimension {
        return Err(GlError::config(format!(
            "texture {width}x{height} exceeds the device limit of {}",
            caps.max_dimension
        )));
    }
    if layers == 0 || layers > caps.max_layers {
        return Err(GlError::config(format!(
            "texture layer count {layers} outside 1..={}",
            caps.max_layers
        )));
    }
    if shape == TextureShape::Cubemap && width != height {
        return Err(GlError::config("cubemap faces must be square"));
    }

    let wgpu_format = format.to_wgpu().ok_or_else(|| {
        GlError::config(format!("{format:?} has no storage format on this backend"))
    })?;
    let required = wgpu_format.required_features();
    if !caps.features.contains(required) {
        return Err(GlError::config(format!(
            "{format:?} requires device features {required:?}"
        )));
    }
    if let TextureFormat::Compressed(_) = format {
        let (bw, bh) = wgpu_format.block_dimensions();
        if width % bw != 0 || height % bh != 0 {
            return Err(GlError::config(format!(
                "compressed texture {width}x{height} is not a multiple of the {bw}x{bh} block size"
            )));
        }
    }

    if !SUPPORTED_SAMPLE_COUNTS.contains(&multisamples) {
        return Err(GlError::config(format!(
            "unsupported sample count {multisamples}"
        )));
    }
    let multisampled = multisamples > 1;
    if multisampled {
        if !caps.format_features.flags.sample_count_supported(multisamples) {
            return Err(GlError::config(format!(
                "{format:?} does not support {multisamples}x multisampling"
            )));
        }
        if mipmaps {
            return Err(GlError::config(
                "multisampled textures cannot have mipmaps",
            ));
        }
        if shape != TextureShape::Texture2D {
            return Err(GlError::config(
                "only plain 2D textures can be multisampled",
            ));
        }
        if data.iter().any(Option::is_some) {
            return Err(GlError::config(
                "multisampled textures cannot be loaded with data",
            ));
        }
    }

    let color = format.color();
    if linear_filtering {
        let filterable = match format {
            TextureFormat::Color(_) | TextureFormat::Compressed(_) => caps
                .format_features
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE),
            // Depth is filtered through comparison samplers.
            TextureFormat::Depth(_) | TextureFormat::DepthStencil(_) => true,
            TextureFormat::Stencil => false,
        };
        if !filterable {
            return Err(GlError::config(format!(
                "{format:?} does not support linear filtering on this device"
            )));
        }
    }
    if !(1.0..=MAX_ANISOTROPY).contains(&max_anisotropy) {
        return Err(GlError::config(format!(
            "max anisotropy {max_anisotropy} outside 1..={MAX_ANISOTROPY}"
        )));
    }
    if max_anisotropy > 1.0 && !linear_filtering {
        return Err(GlError::config(
            "anisotropic filtering requires linear filtering",
        ));
    }

    let mip_level_count = if mipmaps {
        full_mip_level_count(width, height)
    } else {
        1
    };

    let expected = expected_data_len(format, width, height);
    let mut uploads = Vec::with_capacity(layers as usize);
    for layer in 0..layers as usize {
        let Some(bytes) = data.get(layer).and_then(Option::as_ref) else {
            uploads.push(None);
            continue;
        };
        let Some(expected) = expected else {
            return Err(GlError::config(format!(
                "{format:?} textures cannot be loaded with data"
            )));
        };
        if bytes.len() != expected {
            return Err(GlError::config(format!(
                "layer {layer} has {} bytes, expected {expected}",
                bytes.len()
            )));
        }
        let base = color.map_or_else(|| bytes.clone(), |c| c.pad_texels(bytes));
        let levels = if mip_level_count > 1 {
            let Some(color) = color else {
                return Err(GlError::config(
                    "mipmaps cannot be generated for compressed data",
                ));
            };
            generate_mip_chain(color, width, height, mip_level_count, base)?
        } else {
            vec![base]
        };
        uploads.push(Some(levels));
    }

    let usage = if multisampled {
        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
    } else {
        (wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::RENDER_ATTACHMENT)
            & caps.format_features.allowed_usages
    };

    Ok(TexturePlan {
        format: wgpu_format,
        mip_level_count,
        usage,
        uploads,
    })
}

/// How mip levels of a color format are averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MipSampling {
    Unorm8,
    Float32,
}

fn mip_sampling(format: ColorFormat) -> Option<MipSampling> {
    match format {
        ColorFormat::R8
        | ColorFormat::RG8
        | ColorFormat::RGB8
        | ColorFormat::RGBA8
        | ColorFormat::SRGBA8 => Some(MipSampling::Unorm8),
        ColorFormat::R32F | ColorFormat::RG32F | ColorFormat::RGB32F | ColorFormat::RGBA32F => {
            Some(MipSampling::Float32)
        }
        _ => None,
    }
}

/// Builds a box-filtered mip chain from a base level in backend layout.
pub(crate) fn generate_mip_chain(
    format: ColorFormat,
    width: u32,
    height: u32,
    levels: u32,
    base: Vec<u8>,
) -> GlResult<Vec<Vec<u8>>> {
    let sampling = mip_sampling(format).ok_or_else(|| {
        GlError::config(format!("mipmaps cannot be generated for {format:?} data"))
    })?;
    let channels = if format.is_padded() {
        4
    } else {
        format.channels() as usize
    };

    let mut chain = Vec::with_capacity(levels as usize);
    chain.push(base);
    let (mut w, mut h) = (width, height);
    for _ in 1..levels {
        let previous = chain.last().map(Vec::as_slice).unwrap_or_default();
        let next = downsample(sampling, channels, w, h, previous);
        chain.push(next);
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }
    Ok(chain)
}

fn downsample(sampling: MipSampling, channels: usize, width: u32, height: u32, src: &[u8]) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let (nw, nh) = ((w / 2).max(1), (h / 2).max(1));
    let texel_bytes = match sampling {
        MipSampling::Unorm8 => channels,
        MipSampling::Float32 => channels * 4,
    };
    let mut out = Vec::with_capacity(nw * nh * texel_bytes);

    for y in 0..nh {
        let rows = [(2 * y).min(h - 1), (2 * y + 1).min(h - 1)];
        for x in 0..nw {
            let cols = [(2 * x).min(w - 1), (2 * x + 1).min(w - 1)];
            for c in 0..channels {
                let mut sum = 0.0f32;
                for &row in &rows {
                    for &col in &cols {
                        let texel = (row * w + col) * texel_bytes;
                        sum += match sampling {
                            MipSampling::Unorm8 => f32::from(src[texel + c]),
                            MipSampling::Float32 => {
                                let at = texel + c * 4;
                                f32::from_le_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]])
                            }
                        };
                    }
                }
                let mean = sum / 4.0;
                match sampling {
                    MipSampling::Unorm8 => out.push(mean.round().clamp(0.0, 255.0) as u8),
                    MipSampling::Float32 => out.extend_from_slice(&mean.to_le_bytes()),
                }
            }
        }
    }
    out
}

/// Fluent texture configuration; see the module docs.
pub struct TextureBuilder<K: TextureKind> {
    context: Context,
    settings: TextureSettings,
    config: K::Config,
    _kind: PhantomData<K>,
}

impl<K: TextureKind> TextureBuilder<K> {
    pub(crate) fn new(context: Context, width: u32, height: u32, layers: u32) -> Self {
        Self {
            context,
            settings: TextureSettings::new(width, height, layers, K::SHAPE),
            config: K::Config::default(),
            _kind: PhantomData,
        }
    }

    #[must_use]
    pub fn set_multisamples(mut self, samples: u32) -> Self {
        self.settings.multisamples = samples;
        self
    }

    #[must_use]
    pub fn set_mipmaps_enabled(mut self, enabled: bool) -> Self {
        self.settings.mipmaps = enabled;
        self
    }

    #[must_use]
    pub fn set_linear_filtering_enabled(mut self, enabled: bool) -> Self {
        self.settings.linear_filtering = enabled;
        self
    }

    #[must_use]
    pub fn set_max_anisotropy(mut self, anisotropy: f32) -> Self {
        self.settings.max_anisotropy = anisotropy;
        self
    }

    /// Validates the configuration and allocates the texture.
    pub fn create_texture(self) -> GlResult<Texture> {
        self.context.ensure_current()?;
        let format = K::resolve_format(&self.config)?;
        let wgpu_format = format.to_wgpu().ok_or_else(|| {
            GlError::config(format!("{format:?} has no storage format on this backend"))
        })?;
        let limits = self.context.limits();
        let caps = Capabilities {
            features: self.context.features(),
            max_dimension: limits.max_texture_dimension_2d,
            max_layers: limits.max_texture_array_layers,
            format_features: self.context.format_features(wgpu_format),
        };
        let plan = plan_texture(&self.settings, format, K::layer_data(&self.config), &caps)?;
        Texture::allocate(self.context, self.settings, format, plan)
    }
}

impl TextureBuilder<Color> {
    #[must_use]
    pub fn set_internal_format(mut self, format: ColorFormat) -> Self {
        self.config.internal_format = Some(format);
        self
    }

    #[must_use]
    pub fn set_internal_compression_format(mut self, format: CompressionFormat) -> Self {
        self.config.compression = Some(format);
        self
    }

    /// Initial contents, tightly packed rows in the caller layout of the format.
    #[must_use]
    pub fn load_data(mut self, data: Vec<u8>) -> Self {
        self.config.set_layer(0, data);
        self
    }
}

impl TextureBuilder<ColorCubemap> {
    #[must_use]
    pub fn set_internal_format(mut self, format: ColorFormat) -> Self {
        self.config.internal_format = Some(format);
        self
    }

    #[must_use]
    pub fn set_internal_compression_format(mut self, format: CompressionFormat) -> Self {
        self.config.compression = Some(format);
        self
    }

    #[must_use]
    pub fn load_face(mut self, face: CubemapFace, data: Vec<u8>) -> Self {
        self.config.set_layer(face.layer() as usize, data);
        self
    }
}

macro_rules! depth_setters {
    ($kind:ty) => {
        impl TextureBuilder<$kind> {
            #[must_use]
            pub fn set_depth_precision(mut self, precision: DepthPrecision) -> Self {
                self.config.precision = precision;
                self
            }

            /// Shorthand for 32-bit float precision.
            #[must_use]
            pub fn set_float_depth_enabled(mut self, enabled: bool) -> Self {
                self.config.precision = if enabled {
                    DepthPrecision::Float32
                } else {
                    DepthPrecision::Fixed24
                };
                self
            }
        }
    };
}

depth_setters!(Depth);
depth_setters!(DepthArray);
depth_setters!(DepthStencil);

/// Which sampler a binding wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    /// Configured filtering (linear/anisotropic when enabled).
    Filtering,
    /// Point sampling.
    Nearest,
    /// Depth comparison, for shadow lookups.
    Comparison,
}

struct TextureInner {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    filtering: wgpu::Sampler,
    nearest: wgpu::Sampler,
    comparison: Option<wgpu::Sampler>,
}

/// A GPU texture with immutable construction parameters.
pub struct Texture {
    context: Context,
    format: TextureFormat,
    wgpu_format: wgpu::TextureFormat,
    settings: TextureSettings,
    mip_level_count: u32,
    inner: Option<TextureInner>,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("format", &self.format)
            .field("width", &self.settings.width)
            .field("height", &self.settings.height)
            .field("layers", &self.settings.layers)
            .field("closed", &self.inner.is_none())
            .finish_non_exhaustive()
    }
}

impl Texture {
    fn allocate(
        context: Context,
        settings: TextureSettings,
        format: TextureFormat,
        plan: TexturePlan,
    ) -> GlResult<Self> {
        let size = wgpu::Extent3d {
            width: settings.width,
            height: settings.height,
            depth_or_array_layers: settings.layers,
        };
        let texture = context.with_error_scope(|device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("ibrelight texture"),
                size,
                mip_level_count: plan.mip_level_count,
                sample_count: settings.multisamples,
                dimension: wgpu::TextureDimension::D2,
                format: plan.format,
                usage: plan.usage,
                view_formats: &[],
            })
        })?;

        for (layer, levels) in plan.uploads.iter().enumerate() {
            if let Some(levels) = levels {
                write_levels(context.queue(), &texture, plan.format, &settings, layer as u32, levels);
            }
        }

        let aspect = match format {
            TextureFormat::DepthStencil(_) => wgpu::TextureAspect::DepthOnly,
            _ => wgpu::TextureAspect::All,
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("ibrelight texture view"),
            dimension: Some(settings.shape.view_dimension()),
            aspect,
            ..Default::default()
        });

        let device = context.device();
        let filter = if settings.linear_filtering {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        };
        let filtering = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ibrelight sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: filter,
            anisotropy_clamp: settings.max_anisotropy.round() as u16,
            ..Default::default()
        });
        let nearest = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ibrelight nearest sampler"),
            ..Default::default()
        });
        let comparison = matches!(
            format,
            TextureFormat::Depth(_) | TextureFormat::DepthStencil(_)
        )
        .then(|| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("ibrelight comparison sampler"),
                mag_filter: filter,
                min_filter: filter,
                compare: Some(wgpu::CompareFunction::LessEqual),
                ..Default::default()
            })
        });

        log::debug!(
            "created {:?} texture {}x{}x{} ({} mip levels, {} samples)",
            format,
            settings.width,
            settings.height,
            settings.layers,
            plan.mip_level_count,
            settings.multisamples
        );

        Ok(Self {
            context,
            format,
            wgpu_format: plan.format,
            settings,
            mip_level_count: plan.mip_level_count,
            inner: Some(TextureInner {
                texture,
                view,
                filtering,
                nearest,
                comparison,
            }),
        })
    }

    fn inner(&self) -> GlResult<&TextureInner> {
        self.context.ensure_current()?;
        self.inner.as_ref().ok_or(GlError::ResourceClosed("texture"))
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The format requested at creation.
    #[must_use]
    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// The backend storage format.
    #[must_use]
    pub fn storage_format(&self) -> wgpu::TextureFormat {
        self.wgpu_format
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.settings.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.settings.height
    }

    #[must_use]
    pub fn layers(&self) -> u32 {
        self.settings.layers
    }

    #[must_use]
    pub fn shape(&self) -> TextureShape {
        self.settings.shape
    }

    #[must_use]
    pub fn multisamples(&self) -> u32 {
        self.settings.multisamples
    }

    #[must_use]
    pub fn mipmaps_enabled(&self) -> bool {
        self.settings.mipmaps
    }

    #[must_use]
    pub fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }

    #[must_use]
    pub fn linear_filtering_enabled(&self) -> bool {
        self.settings.linear_filtering
    }

    #[must_use]
    pub fn max_anisotropy(&self) -> f32 {
        self.settings.max_anisotropy
    }

    /// Replaces the contents of one layer (all mip levels are regenerated).
    pub fn write_layer(&self, layer: u32, data: &[u8]) -> GlResult<()> {
        let inner = self.inner()?;
        if layer >= self.settings.layers {
            return Err(GlError::config(format!(
                "layer {layer} out of range for {} layers",
                self.settings.layers
            )));
        }
        let mut data_layers = vec![None; layer as usize + 1];
        data_layers[layer as usize] = Some(data.to_vec());
        let caps = Capabilities {
            features: self.context.features(),
            max_dimension: u32::MAX,
            max_layers: u32::MAX,
            format_features: self.context.format_features(self.wgpu_format),
        };
        let plan = plan_texture(&self.settings, self.format, &data_layers, &caps)?;
        if let Some(Some(levels)) = plan.uploads.get(layer as usize) {
            write_levels(
                self.context.queue(),
                &inner.texture,
                self.wgpu_format,
                &self.settings,
                layer,
                levels,
            );
        }
        Ok(())
    }

    pub(crate) fn raw(&self) -> GlResult<&wgpu::Texture> {
        Ok(&self.inner()?.texture)
    }

    /// Shader-visible view covering every layer and level.
    pub(crate) fn sampling_view(&self) -> GlResult<&wgpu::TextureView> {
        Ok(&self.inner()?.view)
    }

    pub(crate) fn sampler(&self, kind: SamplerKind) -> GlResult<&wgpu::Sampler> {
        let inner = self.inner()?;
        match kind {
            SamplerKind::Filtering => Ok(&inner.filtering),
            SamplerKind::Nearest => Ok(&inner.nearest),
            SamplerKind::Comparison => inner.comparison.as_ref().ok_or_else(|| {
                GlError::config(format!(
                    "{:?} textures have no comparison sampler",
                    self.format
                ))
            }),
        }
    }

    /// Render-attachment view of level 0 of one layer.
    pub(crate) fn attachment_view(&self, layer: u32) -> GlResult<wgpu::TextureView> {
        let inner = self.inner()?;
        if layer >= self.settings.layers {
            return Err(GlError::config(format!(
                "layer {layer} out of range for {} layers",
                self.settings.layers
            )));
        }
        Ok(inner.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("ibrelight attachment view"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        }))
    }
}

fn write_levels(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    format: wgpu::TextureFormat,
    settings: &TextureSettings,
    layer: u32,
    levels: &[Vec<u8>],
) {
    let (bw, bh) = format.block_dimensions();
    let block_bytes = format.block_copy_size(None).unwrap_or(4);
    let (mut width, mut height) = (settings.width, settings.height);
    for (level, bytes) in levels.iter().enumerate() {
        let blocks_wide = width.div_ceil(bw);
        let blocks_high = height.div_ceil(bh);
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: level as u32,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(blocks_wide * block_bytes),
                rows_per_image: Some(blocks_high),
            },
            wgpu::Extent3d {
                width: (blocks_wide * bw).max(width),
                height: (blocks_high * bh).max(height),
                depth_or_array_layers: 1,
            },
        );
        width = (width / 2).max(1);
        height = (height / 2).max(1);
    }
}

impl GraphicsResource for Texture {
    fn close(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.texture.destroy();
            log::debug!("closed {:?} texture", self.format);
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.close();
    }
}
