use crate::backends::gles_bindings;
use crate::backends::gles_bindings::types::GLenum;
use crate::{
    RafxAddressMode, RafxBlendFactor, RafxBlendOp, RafxBufferUsage, RafxCompareOp, RafxCullMode,
    RafxFilterType, RafxIndexType, RafxPrimitiveType, RafxStencilOp, RafxVertexComponentType,
};

impl RafxFilterType {
    pub fn gl_filter_type(self) -> GLenum {
        match self {
            RafxFilterType::Nearest => gles_bindings::NEAREST,
            RafxFilterType::Linear => gles_bindings::LINEAR,
            RafxFilterType::NearestMipmapNearest => gles_bindings::NEAREST_MIPMAP_NEAREST,
            RafxFilterType::NearestMipmapLinear => gles_bindings::NEAREST_MIPMAP_LINEAR,
            RafxFilterType::LinearMipmapNearest => gles_bindings::LINEAR_MIPMAP_NEAREST,
            RafxFilterType::LinearMipmapLinear => gles_bindings::LINEAR_MIPMAP_LINEAR,
        }
    }
}

impl RafxAddressMode {
    pub fn gl_address_mode(self) -> GLenum {
        match self {
            RafxAddressMode::Repeat => gles_bindings::REPEAT,
            RafxAddressMode::ClampToEdge => gles_bindings::CLAMP_TO_EDGE,
            RafxAddressMode::MirroredRepeat => gles_bindings::MIRRORED_REPEAT,
        }
    }
}

impl RafxPrimitiveType {
    pub fn gl_primitive_type(self) -> GLenum {
        match self {
            RafxPrimitiveType::Points => gles_bindings::POINTS,
            RafxPrimitiveType::Lines => gles_bindings::LINES,
            RafxPrimitiveType::LineLoop => gles_bindings::LINE_LOOP,
            RafxPrimitiveType::LineStrip => gles_bindings::LINE_STRIP,
            RafxPrimitiveType::Triangles => gles_bindings::TRIANGLES,
            RafxPrimitiveType::TriangleStrip => gles_bindings::TRIANGLE_STRIP,
            RafxPrimitiveType::TriangleFan => gles_bindings::TRIANGLE_FAN,
        }
    }
}

impl RafxIndexType {
    pub fn gl_index_type(self) -> GLenum {
        match self {
            RafxIndexType::Uint8 => gles_bindings::UNSIGNED_BYTE,
            RafxIndexType::Uint16 => gles_bindings::UNSIGNED_SHORT,
            RafxIndexType::Uint32 => gles_bindings::UNSIGNED_INT,
        }
    }
}

impl RafxBufferUsage {
    pub fn gl_usage(self) -> GLenum {
        match self {
            RafxBufferUsage::Static => gles_bindings::STATIC_DRAW,
            RafxBufferUsage::Dynamic => gles_bindings::DYNAMIC_DRAW,
            RafxBufferUsage::Stream => gles_bindings::STREAM_DRAW,
        }
    }
}

impl RafxCullMode {
    /// None means culling is disabled rather than a face to cull
    pub fn gl_cull_mode(self) -> Option<GLenum> {
        match self {
            RafxCullMode::None => None,
            RafxCullMode::Back => Some(gles_bindings::BACK),
            RafxCullMode::Front => Some(gles_bindings::FRONT),
            RafxCullMode::FrontAndBack => Some(gles_bindings::FRONT_AND_BACK),
        }
    }
}

impl RafxCompareOp {
    pub fn gl_compare_op(self) -> GLenum {
        match self {
            RafxCompareOp::Never => gles_bindings::NEVER,
            RafxCompareOp::Less => gles_bindings::LESS,
            RafxCompareOp::Equal => gles_bindings::EQUAL,
            RafxCompareOp::LessOrEqual => gles_bindings::LEQUAL,
            RafxCompareOp::Greater => gles_bindings::GREATER,
            RafxCompareOp::NotEqual => gles_bindings::NOTEQUAL,
            RafxCompareOp::GreaterOrEqual => gles_bindings::GEQUAL,
            RafxCompareOp::Always => gles_bindings::ALWAYS,
        }
    }
}

impl RafxStencilOp {
    pub fn gl_stencil_op(self) -> GLenum {
        match self {
            RafxStencilOp::Keep => gles_bindings::KEEP,
            RafxStencilOp::Zero => gles_bindings::ZERO,
            RafxStencilOp::Replace => gles_bindings::REPLACE,
            RafxStencilOp::IncrementAndClamp => gles_bindings::INCR,
            RafxStencilOp::DecrementAndClamp => gles_bindings::DECR,
            RafxStencilOp::Invert => gles_bindings::INVERT,
            RafxStencilOp::IncrementAndWrap => gles_bindings::INCR_WRAP,
            RafxStencilOp::DecrementAndWrap => gles_bindings::DECR_WRAP,
        }
    }
}

impl RafxBlendFactor {
    pub fn gl_blend_factor(self) -> GLenum {
        match self {
            RafxBlendFactor::Zero => gles_bindings::ZERO,
            RafxBlendFactor::One => gles_bindings::ONE,
            RafxBlendFactor::SrcColor => gles_bindings::SRC_COLOR,
            RafxBlendFactor::OneMinusSrcColor => gles_bindings::ONE_MINUS_SRC_COLOR,
            RafxBlendFactor::DstColor => gles_bindings::DST_COLOR,
            RafxBlendFactor::OneMinusDstColor => gles_bindings::ONE_MINUS_DST_COLOR,
            RafxBlendFactor::SrcAlpha => gles_bindings::SRC_ALPHA,
            RafxBlendFactor::OneMinusSrcAlpha => gles_bindings::ONE_MINUS_SRC_ALPHA,
            RafxBlendFactor::DstAlpha => gles_bindings::DST_ALPHA,
            RafxBlendFactor::OneMinusDstAlpha => gles_bindings::ONE_MINUS_DST_ALPHA,
            RafxBlendFactor::SrcAlphaSaturate => gles_bindings::SRC_ALPHA_SATURATE,
            RafxBlendFactor::ConstantColor => gles_bindings::CONSTANT_COLOR,
            RafxBlendFactor::OneMinusConstantColor => gles_bindings::ONE_MINUS_CONSTANT_COLOR,
        }
    }
}

impl RafxBlendOp {
    /// Min/max map to the core enums, which share values with EXT_blend_minmax
    pub fn gl_blend_op(self) -> GLenum {
        match self {
            RafxBlendOp::Add => gles_bindings::FUNC_ADD,
            RafxBlendOp::Subtract => gles_bindings::FUNC_SUBTRACT,
            RafxBlendOp::ReverseSubtract => gles_bindings::FUNC_REVERSE_SUBTRACT,
            RafxBlendOp::Min => gles_bindings::MIN,
            RafxBlendOp::Max => gles_bindings::MAX,
        }
    }
}

impl RafxVertexComponentType {
    pub fn gl_type(self) -> GLenum {
        match self {
            RafxVertexComponentType::Int8 => gles_bindings::BYTE,
            RafxVertexComponentType::Uint8 => gles_bindings::UNSIGNED_BYTE,
            RafxVertexComponentType::Int16 => gles_bindings::SHORT,
            RafxVertexComponentType::Uint16 => gles_bindings::UNSIGNED_SHORT,
            RafxVertexComponentType::Int32 => gles_bindings::INT,
            RafxVertexComponentType::Uint32 => gles_bindings::UNSIGNED_INT,
            RafxVertexComponentType::Float32 => gles_bindings::FLOAT,
        }
    }
}

/// Target used for a single face of a cubemap upload or attachment
pub fn gl_cube_face_target(face: u32) -> GLenum {
    gles_bindings::TEXTURE_CUBE_MAP_POSITIVE_X + face
}
