#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// The two capability levels of the GL family this device runs on. `Gles2` corresponds to
/// WebGL 1, `Gles3` to WebGL 2.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxApiTier {
    Gles2,
    Gles3,
}

impl RafxApiTier {
    /// Tiers to attempt, in order, when creating a context with this tier preferred
    pub fn fallback_chain(self) -> &'static [RafxApiTier] {
        match self {
            RafxApiTier::Gles3 => &[RafxApiTier::Gles3, RafxApiTier::Gles2],
            RafxApiTier::Gles2 => &[RafxApiTier::Gles2],
        }
    }

    pub fn is_gles3(self) -> bool {
        self == RafxApiTier::Gles3
    }
}

impl Default for RafxApiTier {
    fn default() -> Self {
        RafxApiTier::Gles3
    }
}

/// Hint passed to the context provider about which GPU to prefer
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxPowerPreference {
    Default,
    LowPower,
    HighPerformance,
}

impl Default for RafxPowerPreference {
    fn default() -> Self {
        RafxPowerPreference::HighPerformance
    }
}

/// How to interpret vertex data into a form of geometry
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxPrimitiveType {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl RafxPrimitiveType {
    pub const COUNT: usize = 7;

    /// Stable index used for per-type statistics
    pub fn index(self) -> usize {
        match self {
            RafxPrimitiveType::Points => 0,
            RafxPrimitiveType::Lines => 1,
            RafxPrimitiveType::LineLoop => 2,
            RafxPrimitiveType::LineStrip => 3,
            RafxPrimitiveType::Triangles => 4,
            RafxPrimitiveType::TriangleStrip => 5,
            RafxPrimitiveType::TriangleFan => 6,
        }
    }
}

impl Default for RafxPrimitiveType {
    fn default() -> Self {
        RafxPrimitiveType::Triangles
    }
}

/// The size of index buffer elements
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxIndexType {
    Uint8,
    Uint16,
    Uint32,
}

impl RafxIndexType {
    pub fn bytes_per_index(self) -> u32 {
        match self {
            RafxIndexType::Uint8 => 1,
            RafxIndexType::Uint16 => 2,
            RafxIndexType::Uint32 => 4,
        }
    }
}

impl Default for RafxIndexType {
    fn default() -> Self {
        RafxIndexType::Uint16
    }
}

/// Expected update frequency of a buffer, forwarded to the driver as a usage hint
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxBufferUsage {
    Static,
    Dynamic,
    Stream,
}

impl Default for RafxBufferUsage {
    fn default() -> Self {
        RafxBufferUsage::Static
    }
}

/// Affects blending
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxBlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturate,
    ConstantColor,
    OneMinusConstantColor,
}

impl Default for RafxBlendFactor {
    fn default() -> Self {
        RafxBlendFactor::Zero
    }
}

/// Affects blending. `Min` and `Max` require the blend-minmax capability on the older tier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxBlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

impl Default for RafxBlendOp {
    fn default() -> Self {
        RafxBlendOp::Add
    }
}

/// Affects depth testing, stencil testing and shadow sampling
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxCompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

impl Default for RafxCompareOp {
    fn default() -> Self {
        RafxCompareOp::Never
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxStencilOp {
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

impl Default for RafxStencilOp {
    fn default() -> Self {
        RafxStencilOp::Keep
    }
}

/// Determines if we cull polygons that are front-facing or back-facing
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxCullMode {
    None,
    Back,
    Front,
    FrontAndBack,
}

impl Default for RafxCullMode {
    fn default() -> Self {
        RafxCullMode::Back
    }
}

/// Texture filtering. The mipmap variants only apply to minification and degrade to their
/// non-mipmapped equivalent when the texture has no usable mip chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxFilterType {
    Nearest,
    Linear,
    NearestMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapNearest,
    LinearMipmapLinear,
}

impl RafxFilterType {
    /// The same filter with mip selection removed
    pub fn without_mipmaps(self) -> RafxFilterType {
        match self {
            RafxFilterType::NearestMipmapNearest | RafxFilterType::NearestMipmapLinear => {
                RafxFilterType::Nearest
            }
            RafxFilterType::LinearMipmapNearest | RafxFilterType::LinearMipmapLinear => {
                RafxFilterType::Linear
            }
            other => other,
        }
    }
}

impl Default for RafxFilterType {
    fn default() -> Self {
        RafxFilterType::Linear
    }
}

/// Affects image sampling, particularly for UV coordinates outside the [0, 1] range
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxAddressMode {
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

impl Default for RafxAddressMode {
    fn default() -> Self {
        RafxAddressMode::Repeat
    }
}

/// Component type of a vertex attribute
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxVertexComponentType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
}

impl RafxVertexComponentType {
    pub fn size(self) -> u32 {
        match self {
            RafxVertexComponentType::Int8 | RafxVertexComponentType::Uint8 => 1,
            RafxVertexComponentType::Int16 | RafxVertexComponentType::Uint16 => 2,
            RafxVertexComponentType::Int32
            | RafxVertexComponentType::Uint32
            | RafxVertexComponentType::Float32 => 4,
        }
    }
}

/// Meaning of a vertex attribute. Each semantic maps to a fixed attribute location so that a
/// vertex array built for one shader is valid for every shader.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxVertexSemantic {
    Position,
    Normal,
    BlendWeight,
    BlendIndices,
    Color,
    TexCoord0,
    TexCoord1,
    TexCoord2,
    TexCoord3,
    TexCoord4,
    TexCoord5,
    TexCoord6,
    TexCoord7,
    Tangent,
    Attr14,
    Attr15,
}

impl RafxVertexSemantic {
    pub fn attribute_location(self) -> u32 {
        match self {
            RafxVertexSemantic::Position => 0,
            RafxVertexSemantic::Normal => 1,
            RafxVertexSemantic::BlendWeight => 2,
            RafxVertexSemantic::BlendIndices => 3,
            RafxVertexSemantic::Color => 4,
            RafxVertexSemantic::TexCoord0 => 5,
            RafxVertexSemantic::TexCoord1 => 6,
            RafxVertexSemantic::TexCoord2 => 7,
            RafxVertexSemantic::TexCoord3 => 8,
            RafxVertexSemantic::TexCoord4 => 9,
            RafxVertexSemantic::TexCoord5 => 10,
            RafxVertexSemantic::TexCoord6 => 11,
            RafxVertexSemantic::TexCoord7 => 12,
            RafxVertexSemantic::Tangent => 13,
            RafxVertexSemantic::Attr14 => 14,
            RafxVertexSemantic::Attr15 => 15,
        }
    }
}

bitflags::bitflags! {
    /// Flags for enabling/disabling color channels, used with `RafxBlendState`
    #[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
    pub struct RafxColorFlags: u8 {
        const RED = 1;
        const GREEN = 2;
        const BLUE = 4;
        const ALPHA = 8;
        const ALL = 0x0F;
    }
}

impl Default for RafxColorFlags {
    fn default() -> Self {
        RafxColorFlags::ALL
    }
}

bitflags::bitflags! {
    /// Which buffers a clear operation touches
    #[derive(Default)]
    #[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
    pub struct RafxClearFlags: u8 {
        const COLOR = 1;
        const DEPTH = 2;
        const STENCIL = 4;
    }
}

bitflags::bitflags! {
    /// Sampling parameters of a texture that changed since they were last sent to the driver
    #[derive(Default)]
    pub struct RafxTextureParameterFlags: u8 {
        const MIN_FILTER = 1;
        const MAG_FILTER = 2;
        const ADDRESS_U = 4;
        const ADDRESS_V = 8;
        const ADDRESS_W = 16;
        const COMPARE_ON_READ = 32;
        const COMPARE_FUNC = 64;
        const ANISOTROPY = 128;
    }
}

/// A clear value for color attachments
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RafxColorClearValue(pub [f32; 4]);

/// Notifications emitted by the device. Received through `RafxDeviceGl::event_receiver`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RafxDeviceEvent {
    Lost,
    Restored,
    Resized { width: u32, height: u32 },
}

/// Whether the device currently holds a usable context
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RafxContextState {
    Active,
    Lost,
}
