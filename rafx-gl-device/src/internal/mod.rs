mod conversions;
pub use conversions::*;

pub(crate) mod gl_type_util;

mod resource_slab;
pub use resource_slab::*;

mod fullscreen_quad;
pub(crate) use fullscreen_quad::*;
