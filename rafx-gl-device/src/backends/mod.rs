pub mod gles_bindings;

mod gl_context;
pub use gl_context::*;

pub mod recording;

#[cfg(target_arch = "wasm32")]
pub mod web;
