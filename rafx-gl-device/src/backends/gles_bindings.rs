//! GL ES 2.0/3.0 and WebGL enum values used by the device, plus the extension enums it relies on.
#![allow(dead_code)]

pub mod types {
    pub type GLenum = u32;
    pub type GLbitfield = u32;
    pub type GLint = i32;
    pub type GLsizei = i32;
    pub type GLfloat = f32;
    pub type GLboolean = bool;
}

use types::*;

pub const NONE: GLenum = 0;
pub const NO_ERROR: GLenum = 0;
pub const INVALID_ENUM: GLenum = 0x0500;
pub const INVALID_VALUE: GLenum = 0x0501;
pub const INVALID_OPERATION: GLenum = 0x0502;
pub const OUT_OF_MEMORY: GLenum = 0x0505;
pub const INVALID_FRAMEBUFFER_OPERATION: GLenum = 0x0506;
pub const CONTEXT_LOST_WEBGL: GLenum = 0x9242;

// Strings and limits
pub const VENDOR: GLenum = 0x1F00;
pub const RENDERER: GLenum = 0x1F01;
pub const VERSION: GLenum = 0x1F02;
pub const SHADING_LANGUAGE_VERSION: GLenum = 0x8B8C;
pub const UNMASKED_VENDOR_WEBGL: GLenum = 0x9245;
pub const UNMASKED_RENDERER_WEBGL: GLenum = 0x9246;
pub const MAX_TEXTURE_SIZE: GLenum = 0x0D33;
pub const MAX_CUBE_MAP_TEXTURE_SIZE: GLenum = 0x851C;
pub const MAX_3D_TEXTURE_SIZE: GLenum = 0x8073;
pub const MAX_RENDERBUFFER_SIZE: GLenum = 0x84E8;
pub const MAX_TEXTURE_IMAGE_UNITS: GLenum = 0x8872;
pub const MAX_COMBINED_TEXTURE_IMAGE_UNITS: GLenum = 0x8B4D;
pub const MAX_VERTEX_TEXTURE_IMAGE_UNITS: GLenum = 0x8B4C;
pub const MAX_VERTEX_UNIFORM_VECTORS: GLenum = 0x8DFB;
pub const MAX_FRAGMENT_UNIFORM_VECTORS: GLenum = 0x8DFD;
pub const MAX_VERTEX_ATTRIBS: GLenum = 0x8869;
pub const MAX_DRAW_BUFFERS: GLenum = 0x8824;
pub const MAX_COLOR_ATTACHMENTS: GLenum = 0x8CDF;
pub const MAX_SAMPLES: GLenum = 0x8D57;
pub const MAX_TEXTURE_MAX_ANISOTROPY_EXT: GLenum = 0x84FF;

// Capabilities
pub const BLEND: GLenum = 0x0BE2;
pub const CULL_FACE: GLenum = 0x0B44;
pub const DEPTH_TEST: GLenum = 0x0B71;
pub const STENCIL_TEST: GLenum = 0x0B90;
pub const SCISSOR_TEST: GLenum = 0x0C11;
pub const POLYGON_OFFSET_FILL: GLenum = 0x8037;
pub const SAMPLE_ALPHA_TO_COVERAGE: GLenum = 0x809E;
pub const RASTERIZER_DISCARD: GLenum = 0x8C89;
pub const DITHER: GLenum = 0x0BD0;

// Hints
pub const NICEST: GLenum = 0x1102;
pub const FRAGMENT_SHADER_DERIVATIVE_HINT: GLenum = 0x8B8B;

// Pixel store
pub const UNPACK_ALIGNMENT: GLenum = 0x0CF5;
pub const UNPACK_FLIP_Y_WEBGL: GLenum = 0x9240;
pub const UNPACK_PREMULTIPLY_ALPHA_WEBGL: GLenum = 0x9241;
pub const UNPACK_COLORSPACE_CONVERSION_WEBGL: GLenum = 0x9243;

// Faces
pub const FRONT: GLenum = 0x0404;
pub const BACK: GLenum = 0x0405;
pub const FRONT_AND_BACK: GLenum = 0x0408;
pub const CW: GLenum = 0x0900;
pub const CCW: GLenum = 0x0901;

// Compare functions
pub const NEVER: GLenum = 0x0200;
pub const LESS: GLenum = 0x0201;
pub const EQUAL: GLenum = 0x0202;
pub const LEQUAL: GLenum = 0x0203;
pub const GREATER: GLenum = 0x0204;
pub const NOTEQUAL: GLenum = 0x0205;
pub const GEQUAL: GLenum = 0x0206;
pub const ALWAYS: GLenum = 0x0207;

// Stencil ops
pub const KEEP: GLenum = 0x1E00;
pub const ZERO: GLenum = 0;
pub const REPLACE: GLenum = 0x1E01;
pub const INCR: GLenum = 0x1E02;
pub const DECR: GLenum = 0x1E03;
pub const INVERT: GLenum = 0x150A;
pub const INCR_WRAP: GLenum = 0x8507;
pub const DECR_WRAP: GLenum = 0x8508;

// Blending
pub const ONE: GLenum = 1;
pub const SRC_COLOR: GLenum = 0x0300;
pub const ONE_MINUS_SRC_COLOR: GLenum = 0x0301;
pub const SRC_ALPHA: GLenum = 0x0302;
pub const ONE_MINUS_SRC_ALPHA: GLenum = 0x0303;
pub const DST_ALPHA: GLenum = 0x0304;
pub const ONE_MINUS_DST_ALPHA: GLenum = 0x0305;
pub const DST_COLOR: GLenum = 0x0306;
pub const ONE_MINUS_DST_COLOR: GLenum = 0x0307;
pub const SRC_ALPHA_SATURATE: GLenum = 0x0308;
pub const CONSTANT_COLOR: GLenum = 0x8001;
pub const ONE_MINUS_CONSTANT_COLOR: GLenum = 0x8002;
pub const FUNC_ADD: GLenum = 0x8006;
pub const FUNC_SUBTRACT: GLenum = 0x800A;
pub const FUNC_REVERSE_SUBTRACT: GLenum = 0x800B;
pub const MIN: GLenum = 0x8007;
pub const MAX: GLenum = 0x8008;

// Clear
pub const DEPTH_BUFFER_BIT: GLbitfield = 0x0000_0100;
pub const STENCIL_BUFFER_BIT: GLbitfield = 0x0000_0400;
pub const COLOR_BUFFER_BIT: GLbitfield = 0x0000_4000;

// Primitives
pub const POINTS: GLenum = 0x0000;
pub const LINES: GLenum = 0x0001;
pub const LINE_LOOP: GLenum = 0x0002;
pub const LINE_STRIP: GLenum = 0x0003;
pub const TRIANGLES: GLenum = 0x0004;
pub const TRIANGLE_STRIP: GLenum = 0x0005;
pub const TRIANGLE_FAN: GLenum = 0x0006;

// Data types
pub const BYTE: GLenum = 0x1400;
pub const UNSIGNED_BYTE: GLenum = 0x1401;
pub const SHORT: GLenum = 0x1402;
pub const UNSIGNED_SHORT: GLenum = 0x1403;
pub const INT: GLenum = 0x1404;
pub const UNSIGNED_INT: GLenum = 0x1405;
pub const FLOAT: GLenum = 0x1406;
pub const HALF_FLOAT: GLenum = 0x140B;
pub const HALF_FLOAT_OES: GLenum = 0x8D61;
pub const UNSIGNED_SHORT_4_4_4_4: GLenum = 0x8033;
pub const UNSIGNED_SHORT_5_5_5_1: GLenum = 0x8034;
pub const UNSIGNED_SHORT_5_6_5: GLenum = 0x8363;
pub const UNSIGNED_INT_24_8: GLenum = 0x84FA;
pub const UNSIGNED_INT_10F_11F_11F_REV: GLenum = 0x8C3B;

// Uniform types
pub const FLOAT_VEC2: GLenum = 0x8B50;
pub const FLOAT_VEC3: GLenum = 0x8B51;
pub const FLOAT_VEC4: GLenum = 0x8B52;
pub const INT_VEC2: GLenum = 0x8B53;
pub const INT_VEC3: GLenum = 0x8B54;
pub const INT_VEC4: GLenum = 0x8B55;
pub const BOOL: GLenum = 0x8B56;
pub const BOOL_VEC2: GLenum = 0x8B57;
pub const BOOL_VEC3: GLenum = 0x8B58;
pub const BOOL_VEC4: GLenum = 0x8B59;
pub const FLOAT_MAT2: GLenum = 0x8B5A;
pub const FLOAT_MAT3: GLenum = 0x8B5B;
pub const FLOAT_MAT4: GLenum = 0x8B5C;
pub const SAMPLER_2D: GLenum = 0x8B5E;
pub const SAMPLER_3D: GLenum = 0x8B5F;
pub const SAMPLER_CUBE: GLenum = 0x8B60;
pub const SAMPLER_2D_SHADOW: GLenum = 0x8B62;
pub const SAMPLER_CUBE_SHADOW: GLenum = 0x8DC5;

// Pixel formats
pub const DEPTH_COMPONENT: GLenum = 0x1902;
pub const RED: GLenum = 0x1903;
pub const ALPHA: GLenum = 0x1906;
pub const RGB: GLenum = 0x1907;
pub const RGBA: GLenum = 0x1908;
pub const LUMINANCE: GLenum = 0x1909;
pub const LUMINANCE_ALPHA: GLenum = 0x190A;
pub const DEPTH_STENCIL: GLenum = 0x84F9;
pub const RGB8: GLenum = 0x8051;
pub const RGBA8: GLenum = 0x8058;
pub const RGBA4: GLenum = 0x8056;
pub const RGB5_A1: GLenum = 0x8057;
pub const RGB565: GLenum = 0x8D62;
pub const R32F: GLenum = 0x822E;
pub const RGBA32F: GLenum = 0x8814;
pub const RGB32F: GLenum = 0x8815;
pub const RGBA16F: GLenum = 0x881A;
pub const RGB16F: GLenum = 0x881B;
pub const R11F_G11F_B10F: GLenum = 0x8C3A;
pub const SRGB_EXT: GLenum = 0x8C40;
pub const SRGB8: GLenum = 0x8C41;
pub const SRGB_ALPHA_EXT: GLenum = 0x8C42;
pub const SRGB8_ALPHA8: GLenum = 0x8C43;
pub const DEPTH_COMPONENT16: GLenum = 0x81A5;
pub const DEPTH_COMPONENT24: GLenum = 0x81A6;
pub const DEPTH_COMPONENT32F: GLenum = 0x8CAC;
pub const DEPTH24_STENCIL8: GLenum = 0x88F0;
pub const DEPTH_STENCIL_WEBGL: GLenum = 0x84F9;

// Compressed formats
pub const COMPRESSED_RGB_S3TC_DXT1_EXT: GLenum = 0x83F0;
pub const COMPRESSED_RGBA_S3TC_DXT3_EXT: GLenum = 0x83F2;
pub const COMPRESSED_RGBA_S3TC_DXT5_EXT: GLenum = 0x83F3;
pub const COMPRESSED_RGB_ETC1_WEBGL: GLenum = 0x8D64;
pub const COMPRESSED_RGB8_ETC2: GLenum = 0x9274;
pub const COMPRESSED_RGBA8_ETC2_EAC: GLenum = 0x9278;
pub const COMPRESSED_RGB_PVRTC_4BPPV1_IMG: GLenum = 0x8C00;
pub const COMPRESSED_RGB_PVRTC_2BPPV1_IMG: GLenum = 0x8C01;
pub const COMPRESSED_RGBA_PVRTC_4BPPV1_IMG: GLenum = 0x8C02;
pub const COMPRESSED_RGBA_PVRTC_2BPPV1_IMG: GLenum = 0x8C03;
pub const COMPRESSED_RGBA_ASTC_4X4_KHR: GLenum = 0x93B0;

// Textures
pub const TEXTURE_2D: GLenum = 0x0DE1;
pub const TEXTURE_3D: GLenum = 0x806F;
pub const TEXTURE_CUBE_MAP: GLenum = 0x8513;
pub const TEXTURE_CUBE_MAP_POSITIVE_X: GLenum = 0x8515;
pub const TEXTURE_CUBE_MAP_NEGATIVE_X: GLenum = 0x8516;
pub const TEXTURE_CUBE_MAP_POSITIVE_Y: GLenum = 0x8517;
pub const TEXTURE_CUBE_MAP_NEGATIVE_Y: GLenum = 0x8518;
pub const TEXTURE_CUBE_MAP_POSITIVE_Z: GLenum = 0x8519;
pub const TEXTURE_CUBE_MAP_NEGATIVE_Z: GLenum = 0x851A;
pub const TEXTURE0: GLenum = 0x84C0;
pub const TEXTURE_MAG_FILTER: GLenum = 0x2800;
pub const TEXTURE_MIN_FILTER: GLenum = 0x2801;
pub const TEXTURE_WRAP_S: GLenum = 0x2802;
pub const TEXTURE_WRAP_T: GLenum = 0x2803;
pub const TEXTURE_WRAP_R: GLenum = 0x8072;
pub const TEXTURE_COMPARE_MODE: GLenum = 0x884C;
pub const TEXTURE_COMPARE_FUNC: GLenum = 0x884D;
pub const COMPARE_REF_TO_TEXTURE: GLenum = 0x884E;
pub const TEXTURE_MAX_ANISOTROPY_EXT: GLenum = 0x84FE;
pub const NEAREST: GLenum = 0x2600;
pub const LINEAR: GLenum = 0x2601;
pub const NEAREST_MIPMAP_NEAREST: GLenum = 0x2700;
pub const LINEAR_MIPMAP_NEAREST: GLenum = 0x2701;
pub const NEAREST_MIPMAP_LINEAR: GLenum = 0x2702;
pub const LINEAR_MIPMAP_LINEAR: GLenum = 0x2703;
pub const REPEAT: GLenum = 0x2901;
pub const CLAMP_TO_EDGE: GLenum = 0x812F;
pub const MIRRORED_REPEAT: GLenum = 0x8370;

// Buffers
pub const ARRAY_BUFFER: GLenum = 0x8892;
pub const ELEMENT_ARRAY_BUFFER: GLenum = 0x8893;
pub const STREAM_DRAW: GLenum = 0x88E0;
pub const STATIC_DRAW: GLenum = 0x88E4;
pub const DYNAMIC_DRAW: GLenum = 0x88E8;

// Shaders
pub const FRAGMENT_SHADER: GLenum = 0x8B30;
pub const VERTEX_SHADER: GLenum = 0x8B31;
pub const COMPILE_STATUS: GLenum = 0x8B81;
pub const LINK_STATUS: GLenum = 0x8B82;
pub const ACTIVE_UNIFORMS: GLenum = 0x8B86;
pub const COMPLETION_STATUS_KHR: GLenum = 0x91B1;

// Framebuffers
pub const FRAMEBUFFER: GLenum = 0x8D40;
pub const READ_FRAMEBUFFER: GLenum = 0x8CA8;
pub const DRAW_FRAMEBUFFER: GLenum = 0x8CA9;
pub const RENDERBUFFER: GLenum = 0x8D41;
pub const COLOR_ATTACHMENT0: GLenum = 0x8CE0;
pub const DEPTH_ATTACHMENT: GLenum = 0x8D00;
pub const STENCIL_ATTACHMENT: GLenum = 0x8D20;
pub const DEPTH_STENCIL_ATTACHMENT: GLenum = 0x821A;
pub const FRAMEBUFFER_COMPLETE: GLenum = 0x8CD5;
pub const FRAMEBUFFER_INCOMPLETE_ATTACHMENT: GLenum = 0x8CD6;
pub const FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT: GLenum = 0x8CD7;
pub const FRAMEBUFFER_INCOMPLETE_DIMENSIONS: GLenum = 0x8CD9;
pub const FRAMEBUFFER_UNSUPPORTED: GLenum = 0x8CDD;
