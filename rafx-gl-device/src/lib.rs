//! A stateful rendering device for GL ES 2.0/3.0 class contexts (WebGL 1 and 2).
//!
//! `RafxDeviceGl` owns the context and keeps a shadow copy of all mutable GL state so redundant
//! calls are never issued. Resources (textures, vertex/index buffers, shaders, render targets)
//! are registered with CPU-side descriptions and handed out as generation-checked handles. GL
//! objects are created lazily and recreated after the context is lost and restored.
//!
//! The GL calls themselves go through the `GlContext` trait in `backends`. A browser
//! implementation is provided on wasm32, and `backends::recording` provides an in-memory context
//! for tests and headless use.

mod error;
pub use error::*;

mod types;
pub use types::*;

pub mod backends;
pub mod internal;

mod capabilities;
pub use capabilities::*;

mod quirks;
pub use quirks::*;

mod format_table;
pub use format_table::*;

mod diagnostics;
pub use diagnostics::*;

mod uniform_scope;
pub use uniform_scope::*;

mod state_cache;
pub use state_cache::*;

mod texture;
pub use texture::*;

pub(crate) mod texture_upload;

mod buffer;
pub use buffer::*;

mod shader;
pub use shader::*;

mod render_target;
pub use render_target::*;

mod device;
pub use device::*;

mod blit;
mod draw;
mod render_pass;

#[cfg(test)]
mod device_tests;
