#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

use super::*;
use crate::{RafxQuirksTable, RafxRenderTargetHandle, RafxResult, RafxTextureHandle};
use std::hash::{Hash, Hasher};

/// Construction options for `RafxDeviceGl`
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RafxDeviceDef {
    /// Whether the default framebuffer has an alpha channel
    pub alpha: bool,
    /// Whether the default framebuffer has a depth buffer
    pub depth: bool,
    /// Whether the default framebuffer has a stencil buffer. Requires `depth`.
    pub stencil: bool,
    /// Request a multisampled default framebuffer. May be vetoed by a quirk.
    pub antialias: bool,
    pub premultiplied_alpha: bool,
    pub preserve_drawing_buffer: bool,
    pub power_preference: RafxPowerPreference,
    pub fail_if_major_performance_caveat: bool,
    /// The first tier to attempt. Falls back to older tiers if unavailable.
    pub preferred_tier: RafxApiTier,
    pub desynchronized: bool,
    /// Panic on programming errors (bad call ordering) in addition to reporting them
    pub assert_on_programming_errors: bool,
    /// Let shaders finish compiling in the background when the driver supports it. `set_shader`
    /// reports false until the program is ready.
    pub async_shader_compile: bool,
    pub quirks: RafxQuirksTable,
}

impl Default for RafxDeviceDef {
    fn default() -> Self {
        RafxDeviceDef {
            alpha: true,
            depth: true,
            stencil: true,
            antialias: true,
            premultiplied_alpha: true,
            preserve_drawing_buffer: false,
            power_preference: RafxPowerPreference::HighPerformance,
            fail_if_major_performance_caveat: false,
            preferred_tier: RafxApiTier::Gles3,
            desynchronized: false,
            assert_on_programming_errors: cfg!(debug_assertions),
            async_shader_compile: false,
            quirks: RafxQuirksTable::legacy_defaults(),
        }
    }
}

impl RafxDeviceDef {
    pub fn verify(&self) -> RafxResult<()> {
        if self.stencil && !self.depth {
            Err("A stencil buffer requires a depth buffer")?;
        }

        Ok(())
    }

    /// Attributes handed to the context provider. `antialias` is passed separately because
    /// quirks may veto it.
    pub fn context_attributes(
        &self,
        antialias: bool,
    ) -> RafxContextAttributes {
        RafxContextAttributes {
            alpha: self.alpha,
            depth: self.depth,
            stencil: self.stencil,
            antialias,
            premultiplied_alpha: self.premultiplied_alpha,
            preserve_drawing_buffer: self.preserve_drawing_buffer,
            power_preference: self.power_preference,
            fail_if_major_performance_caveat: self.fail_if_major_performance_caveat,
            desynchronized: self.desynchronized,
        }
    }
}

/// Attributes used when creating the underlying context
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RafxContextAttributes {
    pub alpha: bool,
    pub depth: bool,
    pub stencil: bool,
    pub antialias: bool,
    pub premultiplied_alpha: bool,
    pub preserve_drawing_buffer: bool,
    pub power_preference: RafxPowerPreference,
    pub fail_if_major_performance_caveat: bool,
    pub desynchronized: bool,
}

/// Used to create a texture. Sampling parameters can be changed later on the texture itself.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RafxTextureDef {
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Depth of a volume texture, 1 otherwise
    pub depth: u32,
    pub format: RafxPixelFormat,
    pub mipmaps: bool,
    pub cubemap: bool,
    pub volume: bool,
    pub flip_y: bool,
    pub premultiply_alpha: bool,
    pub min_filter: RafxFilterType,
    pub mag_filter: RafxFilterType,
    pub address_u: RafxAddressMode,
    pub address_v: RafxAddressMode,
    pub address_w: RafxAddressMode,
    pub compare_on_read: bool,
    pub compare_func: RafxCompareOp,
    pub anisotropy: f32,
}

impl Default for RafxTextureDef {
    fn default() -> Self {
        RafxTextureDef {
            name: None,
            width: 4,
            height: 4,
            depth: 1,
            format: RafxPixelFormat::Rgba8,
            mipmaps: true,
            cubemap: false,
            volume: false,
            flip_y: false,
            premultiply_alpha: false,
            min_filter: RafxFilterType::LinearMipmapLinear,
            mag_filter: RafxFilterType::Linear,
            address_u: RafxAddressMode::Repeat,
            address_v: RafxAddressMode::Repeat,
            address_w: RafxAddressMode::Repeat,
            compare_on_read: false,
            compare_func: RafxCompareOp::Less,
            anisotropy: 1.0,
        }
    }
}

impl RafxTextureDef {
    pub fn verify(&self) -> RafxResult<()> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            Err(format!(
                "Texture {:?} has a zero extent ({}x{}x{})",
                self.name, self.width, self.height, self.depth
            ))?;
        }

        if self.cubemap && self.volume {
            Err("A texture cannot be both a cubemap and a volume")?;
        }

        if self.cubemap && self.width != self.height {
            Err(format!(
                "Cubemap faces must be square, got {}x{}",
                self.width, self.height
            ))?;
        }

        if !self.volume && self.depth != 1 {
            Err("Only volume textures may have a depth other than 1")?;
        }

        if self.volume && self.format.is_depth() {
            Err("Volume textures cannot use a depth format")?;
        }

        Ok(())
    }

    pub fn is_pot(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }

    pub fn face_count(&self) -> usize {
        if self.cubemap {
            6
        } else {
            1
        }
    }

    /// Number of mip levels implied by the largest dimension, or 1 if mipmaps are off
    pub fn required_mip_levels(&self) -> u32 {
        if self.mipmaps {
            mip_level_count_for_size(self.width, self.height)
        } else {
            1
        }
    }
}

/// `floor(log2(max(width, height))) + 1`
pub fn mip_level_count_for_size(
    width: u32,
    height: u32,
) -> u32 {
    let max_dimension = width.max(height).max(1);
    32 - max_dimension.leading_zeros()
}

/// Pixel content of one face of one mip level
#[derive(Clone, Debug, PartialEq)]
pub enum RafxTextureSource {
    /// Raw texel data, already oriented. Compressed formats take the compressed block data.
    Bytes(Vec<u8>),
    /// A decoded image. Subject to flip-y/premultiply unpack flags and downscaling to the
    /// device maximum.
    Image(image::RgbaImage),
}

impl RafxTextureSource {
    pub fn is_image(&self) -> bool {
        match self {
            RafxTextureSource::Image(_) => true,
            RafxTextureSource::Bytes(_) => false,
        }
    }
}

/// Blend configuration, compared by value against the cached state
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RafxBlendState {
    pub blend: bool,
    pub color_op: RafxBlendOp,
    pub color_src_factor: RafxBlendFactor,
    pub color_dst_factor: RafxBlendFactor,
    pub alpha_op: RafxBlendOp,
    pub alpha_src_factor: RafxBlendFactor,
    pub alpha_dst_factor: RafxBlendFactor,
    pub color_write: RafxColorFlags,
}

impl RafxBlendState {
    pub const NO_BLEND: RafxBlendState = RafxBlendState {
        blend: false,
        color_op: RafxBlendOp::Add,
        color_src_factor: RafxBlendFactor::One,
        color_dst_factor: RafxBlendFactor::Zero,
        alpha_op: RafxBlendOp::Add,
        alpha_src_factor: RafxBlendFactor::One,
        alpha_dst_factor: RafxBlendFactor::Zero,
        color_write: RafxColorFlags::ALL,
    };

    pub const NO_WRITE: RafxBlendState = RafxBlendState {
        blend: false,
        color_op: RafxBlendOp::Add,
        color_src_factor: RafxBlendFactor::One,
        color_dst_factor: RafxBlendFactor::Zero,
        alpha_op: RafxBlendOp::Add,
        alpha_src_factor: RafxBlendFactor::One,
        alpha_dst_factor: RafxBlendFactor::Zero,
        color_write: RafxColorFlags::empty(),
    };

    pub const ALPHA_BLEND: RafxBlendState = RafxBlendState {
        blend: true,
        color_op: RafxBlendOp::Add,
        color_src_factor: RafxBlendFactor::SrcAlpha,
        color_dst_factor: RafxBlendFactor::OneMinusSrcAlpha,
        alpha_op: RafxBlendOp::Add,
        alpha_src_factor: RafxBlendFactor::One,
        alpha_dst_factor: RafxBlendFactor::OneMinusSrcAlpha,
        color_write: RafxColorFlags::ALL,
    };

    pub const ADDITIVE: RafxBlendState = RafxBlendState {
        blend: true,
        color_op: RafxBlendOp::Add,
        color_src_factor: RafxBlendFactor::One,
        color_dst_factor: RafxBlendFactor::One,
        alpha_op: RafxBlendOp::Add,
        alpha_src_factor: RafxBlendFactor::One,
        alpha_dst_factor: RafxBlendFactor::One,
        color_write: RafxColorFlags::ALL,
    };
}

impl Default for RafxBlendState {
    fn default() -> Self {
        RafxBlendState::NO_BLEND
    }
}

/// Depth configuration. Requesting `write` without `test` is honored by testing with an
/// always-pass comparison.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RafxDepthState {
    pub test: bool,
    pub write: bool,
    pub func: RafxCompareOp,
    pub depth_bias: f32,
    pub depth_bias_slope: f32,
}

impl RafxDepthState {
    pub const DEFAULT: RafxDepthState = RafxDepthState {
        test: true,
        write: true,
        func: RafxCompareOp::LessOrEqual,
        depth_bias: 0.0,
        depth_bias_slope: 0.0,
    };

    pub const NO_TEST_NO_WRITE: RafxDepthState = RafxDepthState {
        test: false,
        write: false,
        func: RafxCompareOp::LessOrEqual,
        depth_bias: 0.0,
        depth_bias_slope: 0.0,
    };

    pub const WRITE_DEPTH: RafxDepthState = RafxDepthState {
        test: false,
        write: true,
        func: RafxCompareOp::LessOrEqual,
        depth_bias: 0.0,
        depth_bias_slope: 0.0,
    };
}

impl Default for RafxDepthState {
    fn default() -> Self {
        RafxDepthState::DEFAULT
    }
}

/// Stencil configuration for one face
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RafxStencilParameters {
    pub func: RafxCompareOp,
    pub reference: u32,
    pub read_mask: u32,
    pub write_mask: u32,
    pub fail: RafxStencilOp,
    pub zfail: RafxStencilOp,
    pub zpass: RafxStencilOp,
}

impl Default for RafxStencilParameters {
    fn default() -> Self {
        RafxStencilParameters {
            func: RafxCompareOp::Always,
            reference: 0,
            read_mask: 0xFF,
            write_mask: 0xFF,
            fail: RafxStencilOp::Keep,
            zfail: RafxStencilOp::Keep,
            zpass: RafxStencilOp::Keep,
        }
    }
}

/// Options for `RafxDeviceGl::clear`. Omitted fields fall back to the device defaults.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RafxClearOptions {
    pub flags: Option<RafxClearFlags>,
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
}

/// Per color attachment behavior of a render pass
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RafxColorAttachmentOps {
    pub clear: bool,
    pub clear_value: RafxColorClearValue,
    pub store: bool,
    pub resolve: bool,
    pub mipmaps: bool,
}

impl Default for RafxColorAttachmentOps {
    fn default() -> Self {
        RafxColorAttachmentOps {
            clear: false,
            clear_value: RafxColorClearValue([0.0, 0.0, 0.0, 1.0]),
            store: false,
            resolve: true,
            mipmaps: false,
        }
    }
}

/// Depth/stencil behavior of a render pass
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RafxDepthStencilAttachmentOps {
    pub clear_depth: bool,
    pub clear_depth_value: f32,
    pub clear_stencil: bool,
    pub clear_stencil_value: u32,
    pub store_depth: bool,
    pub store_stencil: bool,
}

impl Default for RafxDepthStencilAttachmentOps {
    fn default() -> Self {
        RafxDepthStencilAttachmentOps {
            clear_depth: false,
            clear_depth_value: 1.0,
            clear_stencil: false,
            clear_stencil_value: 0,
            store_depth: false,
            store_stencil: false,
        }
    }
}

/// A render pass against one target. `render_target: None` renders to the default back buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RafxRenderPassDef {
    pub render_target: Option<RafxRenderTargetHandle>,
    /// One entry per color attachment. The first entry controls clearing and resolving.
    pub color_ops: Vec<RafxColorAttachmentOps>,
    pub depth_stencil_ops: RafxDepthStencilAttachmentOps,
}

impl RafxRenderPassDef {
    pub fn primary_color_ops(&self) -> Option<&RafxColorAttachmentOps> {
        self.color_ops.first()
    }
}

/// A draw range
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RafxPrimitive {
    pub primitive_type: RafxPrimitiveType,
    /// First vertex, or first index when `indexed`
    pub base: u32,
    pub count: u32,
    pub indexed: bool,
}

/// Used to create a render target
#[derive(Clone, Debug, PartialEq)]
pub struct RafxRenderTargetDef {
    pub name: Option<String>,
    pub color_buffers: Vec<RafxTextureHandle>,
    /// An explicit depth texture. When None and `depth` is set an internal renderbuffer is used.
    pub depth_buffer: Option<RafxTextureHandle>,
    pub depth: bool,
    pub stencil: bool,
    pub samples: u32,
    /// Resolve MSAA color automatically when leaving a render pass that requests it
    pub auto_resolve: bool,
    /// Cubemap face rendered to when the color buffer is a cubemap
    pub face: u32,
}

impl Default for RafxRenderTargetDef {
    fn default() -> Self {
        RafxRenderTargetDef {
            name: None,
            color_buffers: Vec::default(),
            depth_buffer: None,
            depth: true,
            stencil: false,
            samples: 1,
            auto_resolve: true,
            face: 0,
        }
    }
}

impl RafxRenderTargetDef {
    pub fn verify(&self) -> RafxResult<()> {
        if self.color_buffers.is_empty() && self.depth_buffer.is_none() {
            Err("A render target needs at least one color buffer or a depth buffer")?;
        }

        if self.face >= 6 {
            Err(format!("Cubemap face {} is out of range", self.face))?;
        }

        if self.samples == 0 {
            Err("A render target needs at least one sample")?;
        }

        Ok(())
    }
}

/// One attribute within a vertex buffer
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RafxVertexElement {
    pub semantic: RafxVertexSemantic,
    pub component_count: u32,
    pub component_type: RafxVertexComponentType,
    pub normalize: bool,
    pub byte_offset: u32,
}

/// Attribute layout of a vertex buffer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RafxVertexLayout {
    pub elements: Vec<RafxVertexElement>,
    pub stride: u32,
    /// Advance attributes once per instance instead of once per vertex
    pub instancing: bool,
}

impl RafxVertexLayout {
    /// Content hash of the layout, used as part of the vertex array cache key
    pub fn layout_hash(&self) -> u64 {
        let mut hasher = fnv::FnvHasher::default();
        self.elements.hash(&mut hasher);
        self.stride.hash(&mut hasher);
        self.instancing.hash(&mut hasher);
        hasher.finish()
    }

    pub fn verify(&self) -> RafxResult<()> {
        for element in &self.elements {
            if element.component_count == 0 || element.component_count > 4 {
                Err(format!(
                    "Vertex element {:?} has {} components, expected 1 to 4",
                    element.semantic, element.component_count
                ))?;
            }

            let end = element.byte_offset
                + element.component_count * element.component_type.size();
            if end > self.stride {
                Err(format!(
                    "Vertex element {:?} ends at byte {}, past the stride of {}",
                    element.semantic, end, self.stride
                ))?;
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RafxVertexBufferDef {
    pub layout: RafxVertexLayout,
    pub usage: RafxBufferUsage,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RafxIndexBufferDef {
    pub index_type: RafxIndexType,
    pub usage: RafxBufferUsage,
}

/// GLSL sources of a shader program plus the attribute bindings it expects
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RafxShaderDef {
    pub name: String,
    pub vertex_source: String,
    pub fragment_source: String,
    /// Attribute name in the vertex shader and the semantic whose fixed location it is bound to
    pub attributes: Vec<(String, RafxVertexSemantic)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_level_count() {
        assert_eq!(mip_level_count_for_size(1, 1), 1);
        assert_eq!(mip_level_count_for_size(2, 1), 2);
        assert_eq!(mip_level_count_for_size(16, 16), 5);
        assert_eq!(mip_level_count_for_size(17, 3), 5);
        assert_eq!(mip_level_count_for_size(1024, 512), 11);
    }

    #[test]
    fn texture_def_verify() {
        assert!(RafxTextureDef::default().verify().is_ok());

        let mut def = RafxTextureDef::default();
        def.cubemap = true;
        def.width = 8;
        def.height = 4;
        assert!(def.verify().is_err());

        let mut def = RafxTextureDef::default();
        def.depth = 4;
        assert!(def.verify().is_err());
        def.volume = true;
        assert!(def.verify().is_ok());
    }

    #[test]
    fn layout_hash_follows_content() {
        let element = RafxVertexElement {
            semantic: RafxVertexSemantic::Position,
            component_count: 3,
            component_type: RafxVertexComponentType::Float32,
            normalize: false,
            byte_offset: 0,
        };
        let a = RafxVertexLayout {
            elements: vec![element.clone()],
            stride: 12,
            instancing: false,
        };
        let mut b = a.clone();
        assert_eq!(a.layout_hash(), b.layout_hash());
        b.stride = 16;
        assert_ne!(a.layout_hash(), b.layout_hash());
        assert!(a.verify().is_ok());

        let mut bad = a.clone();
        bad.stride = 8;
        assert!(bad.verify().is_err());
    }
}
