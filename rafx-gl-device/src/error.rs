use crate::RafxPixelFormat;

pub type RafxResult<T> = Result<T, RafxError>;

/// Generic error that contains all the different kinds of errors that may occur when using the
/// device
#[derive(Debug, Clone, PartialEq)]
pub enum RafxError {
    StringError(String),
    /// A GL error code returned by the context
    GlError(u32),
    /// The pixel format cannot be represented with the capabilities of the active context
    UnsupportedFormat(RafxPixelFormat),
    /// No graphics context could be obtained under any attempted API tier
    ContextUnavailable(String),
    /// The operation requires a live context but the context is currently lost
    ContextLost,
}

impl std::error::Error for RafxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl core::fmt::Display for RafxError {
    fn fmt(
        &self,
        fmt: &mut core::fmt::Formatter,
    ) -> core::fmt::Result {
        match *self {
            RafxError::StringError(ref e) => e.fmt(fmt),
            RafxError::GlError(e) => write!(fmt, "GL error 0x{:04X}", e),
            RafxError::UnsupportedFormat(format) => {
                write!(fmt, "Pixel format {:?} is not supported by this context", format)
            }
            RafxError::ContextUnavailable(ref e) => {
                write!(fmt, "No usable graphics context: {}", e)
            }
            RafxError::ContextLost => "The graphics context is lost".fmt(fmt),
        }
    }
}

impl From<&str> for RafxError {
    fn from(str: &str) -> Self {
        RafxError::StringError(str.to_string())
    }
}

impl From<String> for RafxError {
    fn from(string: String) -> Self {
        RafxError::StringError(string)
    }
}

#[cfg(target_arch = "wasm32")]
impl From<wasm_bindgen::JsValue> for RafxError {
    fn from(value: wasm_bindgen::JsValue) -> Self {
        RafxError::StringError(format!("{:?}", value))
    }
}
