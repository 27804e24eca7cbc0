use crate::backends::gles_bindings;
use crate::backends::gles_bindings::types::GLenum;
use crate::{RafxCapabilities, RafxError, RafxPixelFormat, RafxResult};
use fnv::FnvHashMap;

/// The GL representation of a pixel format: the client-side format, the storage format and the
/// component type. Compressed formats use the compressed enum as `internal_format`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GlFormatInfo {
    pub format: GLenum,
    pub internal_format: GLenum,
    pub pixel_type: GLenum,
}

impl GlFormatInfo {
    const fn new(
        format: GLenum,
        internal_format: GLenum,
        pixel_type: GLenum,
    ) -> Self {
        GlFormatInfo {
            format,
            internal_format,
            pixel_type,
        }
    }
}

fn compressed(
    supported: bool,
    format: RafxPixelFormat,
    client_format: GLenum,
    internal_format: GLenum,
) -> RafxResult<GlFormatInfo> {
    if supported {
        Ok(GlFormatInfo::new(
            client_format,
            internal_format,
            gles_bindings::UNSIGNED_BYTE,
        ))
    } else {
        Err(RafxError::UnsupportedFormat(format))
    }
}

/// Translates a single format against the given capabilities
pub fn translate_format(
    capabilities: &RafxCapabilities,
    format: RafxPixelFormat,
) -> RafxResult<GlFormatInfo> {
    let gles3 = capabilities.api_tier.is_gles3();
    let features = &capabilities.features;
    let unsupported = Err(RafxError::UnsupportedFormat(format));

    let info = match format {
        RafxPixelFormat::A8 => GlFormatInfo::new(
            gles_bindings::ALPHA,
            gles_bindings::ALPHA,
            gles_bindings::UNSIGNED_BYTE,
        ),
        RafxPixelFormat::L8 => GlFormatInfo::new(
            gles_bindings::LUMINANCE,
            gles_bindings::LUMINANCE,
            gles_bindings::UNSIGNED_BYTE,
        ),
        RafxPixelFormat::LA8 => GlFormatInfo::new(
            gles_bindings::LUMINANCE_ALPHA,
            gles_bindings::LUMINANCE_ALPHA,
            gles_bindings::UNSIGNED_BYTE,
        ),
        RafxPixelFormat::Rgb565 => GlFormatInfo::new(
            gles_bindings::RGB,
            gles_bindings::RGB,
            gles_bindings::UNSIGNED_SHORT_5_6_5,
        ),
        RafxPixelFormat::Rgba5551 => GlFormatInfo::new(
            gles_bindings::RGBA,
            gles_bindings::RGBA,
            gles_bindings::UNSIGNED_SHORT_5_5_5_1,
        ),
        RafxPixelFormat::Rgba4 => GlFormatInfo::new(
            gles_bindings::RGBA,
            gles_bindings::RGBA,
            gles_bindings::UNSIGNED_SHORT_4_4_4_4,
        ),
        RafxPixelFormat::Rgb8 => GlFormatInfo::new(
            gles_bindings::RGB,
            if gles3 {
                gles_bindings::RGB8
            } else {
                gles_bindings::RGB
            },
            gles_bindings::UNSIGNED_BYTE,
        ),
        RafxPixelFormat::Rgba8 => GlFormatInfo::new(
            gles_bindings::RGBA,
            if gles3 {
                gles_bindings::RGBA8
            } else {
                gles_bindings::RGBA
            },
            gles_bindings::UNSIGNED_BYTE,
        ),
        RafxPixelFormat::Dxt1 => {
            return compressed(
                features.compressed_s3tc,
                format,
                gles_bindings::RGB,
                gles_bindings::COMPRESSED_RGB_S3TC_DXT1_EXT,
            )
        }
        RafxPixelFormat::Dxt3 => {
            return compressed(
                features.compressed_s3tc,
                format,
                gles_bindings::RGBA,
                gles_bindings::COMPRESSED_RGBA_S3TC_DXT3_EXT,
            )
        }
        RafxPixelFormat::Dxt5 => {
            return compressed(
                features.compressed_s3tc,
                format,
                gles_bindings::RGBA,
                gles_bindings::COMPRESSED_RGBA_S3TC_DXT5_EXT,
            )
        }
        RafxPixelFormat::Etc1 => {
            return compressed(
                features.compressed_etc1,
                format,
                gles_bindings::RGB,
                gles_bindings::COMPRESSED_RGB_ETC1_WEBGL,
            )
        }
        RafxPixelFormat::Etc2Rgb => {
            return compressed(
                features.compressed_etc2,
                format,
                gles_bindings::RGB,
                gles_bindings::COMPRESSED_RGB8_ETC2,
            )
        }
        RafxPixelFormat::Etc2Rgba => {
            return compressed(
                features.compressed_etc2,
                format,
                gles_bindings::RGBA,
                gles_bindings::COMPRESSED_RGBA8_ETC2_EAC,
            )
        }
        RafxPixelFormat::Pvrtc2BppRgb => {
            return compressed(
                features.compressed_pvrtc,
                format,
                gles_bindings::RGB,
                gles_bindings::COMPRESSED_RGB_PVRTC_2BPPV1_IMG,
            )
        }
        RafxPixelFormat::Pvrtc2BppRgba => {
            return compressed(
                features.compressed_pvrtc,
                format,
                gles_bindings::RGBA,
                gles_bindings::COMPRESSED_RGBA_PVRTC_2BPPV1_IMG,
            )
        }
        RafxPixelFormat::Pvrtc4BppRgb => {
            return compressed(
                features.compressed_pvrtc,
                format,
                gles_bindings::RGB,
                gles_bindings::COMPRESSED_RGB_PVRTC_4BPPV1_IMG,
            )
        }
        RafxPixelFormat::Pvrtc4BppRgba => {
            return compressed(
                features.compressed_pvrtc,
                format,
                gles_bindings::RGBA,
                gles_bindings::COMPRESSED_RGBA_PVRTC_4BPPV1_IMG,
            )
        }
        RafxPixelFormat::Astc4x4 => {
            return compressed(
                features.compressed_astc,
                format,
                gles_bindings::RGBA,
                gles_bindings::COMPRESSED_RGBA_ASTC_4X4_KHR,
            )
        }
        RafxPixelFormat::Rgb16F => {
            if gles3 {
                GlFormatInfo::new(
                    gles_bindings::RGB,
                    gles_bindings::RGB16F,
                    gles_bindings::HALF_FLOAT,
                )
            } else if features.texture_half_float {
                GlFormatInfo::new(
                    gles_bindings::RGB,
                    gles_bindings::RGB,
                    gles_bindings::HALF_FLOAT_OES,
                )
            } else {
                return unsupported;
            }
        }
        RafxPixelFormat::Rgba16F => {
            if gles3 {
                GlFormatInfo::new(
                    gles_bindings::RGBA,
                    gles_bindings::RGBA16F,
                    gles_bindings::HALF_FLOAT,
                )
            } else if features.texture_half_float {
                GlFormatInfo::new(
                    gles_bindings::RGBA,
                    gles_bindings::RGBA,
                    gles_bindings::HALF_FLOAT_OES,
                )
            } else {
                return unsupported;
            }
        }
        RafxPixelFormat::Rgb32F => {
            if gles3 {
                GlFormatInfo::new(
                    gles_bindings::RGB,
                    gles_bindings::RGB32F,
                    gles_bindings::FLOAT,
                )
            } else if features.texture_float {
                GlFormatInfo::new(gles_bindings::RGB, gles_bindings::RGB, gles_bindings::FLOAT)
            } else {
                return unsupported;
            }
        }
        RafxPixelFormat::Rgba32F => {
            if gles3 {
                GlFormatInfo::new(
                    gles_bindings::RGBA,
                    gles_bindings::RGBA32F,
                    gles_bindings::FLOAT,
                )
            } else if features.texture_float {
                GlFormatInfo::new(
                    gles_bindings::RGBA,
                    gles_bindings::RGBA,
                    gles_bindings::FLOAT,
                )
            } else {
                return unsupported;
            }
        }
        RafxPixelFormat::R32F => {
            if !gles3 {
                return unsupported;
            }
            GlFormatInfo::new(gles_bindings::RED, gles_bindings::R32F, gles_bindings::FLOAT)
        }
        RafxPixelFormat::R11G11B10F => {
            if !gles3 {
                return unsupported;
            }
            GlFormatInfo::new(
                gles_bindings::RGB,
                gles_bindings::R11F_G11F_B10F,
                gles_bindings::UNSIGNED_INT_10F_11F_11F_REV,
            )
        }
        RafxPixelFormat::Depth => {
            if gles3 {
                GlFormatInfo::new(
                    gles_bindings::DEPTH_COMPONENT,
                    gles_bindings::DEPTH_COMPONENT32F,
                    gles_bindings::FLOAT,
                )
            } else if features.depth_texture {
                GlFormatInfo::new(
                    gles_bindings::DEPTH_COMPONENT,
                    gles_bindings::DEPTH_COMPONENT,
                    gles_bindings::UNSIGNED_SHORT,
                )
            } else {
                return unsupported;
            }
        }
        RafxPixelFormat::DepthStencil => {
            if gles3 {
                GlFormatInfo::new(
                    gles_bindings::DEPTH_STENCIL,
                    gles_bindings::DEPTH24_STENCIL8,
                    gles_bindings::UNSIGNED_INT_24_8,
                )
            } else if features.depth_texture {
                GlFormatInfo::new(
                    gles_bindings::DEPTH_STENCIL,
                    gles_bindings::DEPTH_STENCIL,
                    gles_bindings::UNSIGNED_INT_24_8,
                )
            } else {
                return unsupported;
            }
        }
        RafxPixelFormat::Srgb => {
            if gles3 {
                GlFormatInfo::new(
                    gles_bindings::RGB,
                    gles_bindings::SRGB8,
                    gles_bindings::UNSIGNED_BYTE,
                )
            } else if features.srgb {
                GlFormatInfo::new(
                    gles_bindings::SRGB_EXT,
                    gles_bindings::SRGB_EXT,
                    gles_bindings::UNSIGNED_BYTE,
                )
            } else {
                return unsupported;
            }
        }
        RafxPixelFormat::Srgba => {
            if gles3 {
                GlFormatInfo::new(
                    gles_bindings::RGBA,
                    gles_bindings::SRGB8_ALPHA8,
                    gles_bindings::UNSIGNED_BYTE,
                )
            } else if features.srgb {
                GlFormatInfo::new(
                    gles_bindings::SRGB_ALPHA_EXT,
                    gles_bindings::SRGB_ALPHA_EXT,
                    gles_bindings::UNSIGNED_BYTE,
                )
            } else {
                return unsupported;
            }
        }
        RafxPixelFormat::Bgra8 => return unsupported,
    };

    Ok(info)
}

/// Translation of every pixel format for one context, built once from the capabilities
#[derive(Clone, Debug, Default)]
pub struct RafxFormatTable {
    entries: FnvHashMap<RafxPixelFormat, GlFormatInfo>,
}

impl RafxFormatTable {
    pub fn new(capabilities: &RafxCapabilities) -> Self {
        let mut entries = FnvHashMap::default();
        for &format in RafxPixelFormat::ALL.iter() {
            match translate_format(capabilities, format) {
                Ok(info) => {
                    entries.insert(format, info);
                }
                Err(_) => log::trace!("Pixel format {:?} is not supported", format),
            }
        }

        RafxFormatTable { entries }
    }

    pub fn translate(
        &self,
        format: RafxPixelFormat,
    ) -> RafxResult<GlFormatInfo> {
        self.entries
            .get(&format)
            .copied()
            .ok_or(RafxError::UnsupportedFormat(format))
    }

    pub fn is_supported(
        &self,
        format: RafxPixelFormat,
    ) -> bool {
        self.entries.contains_key(&format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::recording::{RecordingGlConfig, RecordingGlContext};
    use crate::RafxQuirksTable;

    fn table_for(config: RecordingGlConfig) -> RafxFormatTable {
        let context = RecordingGlContext::new(config);
        let capabilities =
            RafxCapabilities::probe(&context, &RafxQuirksTable::empty(), None).unwrap();
        RafxFormatTable::new(&capabilities)
    }

    #[test]
    fn translation_is_total() {
        for config in vec![RecordingGlConfig::gles3(), RecordingGlConfig::gles2()] {
            let table = table_for(config);
            for &format in RafxPixelFormat::ALL.iter() {
                match table.translate(format) {
                    Ok(info) => {
                        assert_ne!(info.format, gles_bindings::NONE);
                        assert_ne!(info.internal_format, gles_bindings::NONE);
                        assert_ne!(info.pixel_type, gles_bindings::NONE);
                    }
                    Err(RafxError::UnsupportedFormat(x)) => assert_eq!(x, format),
                    Err(e) => panic!("Unexpected error {:?} for {:?}", e, format),
                }
            }
        }
    }

    #[test]
    fn byte_swapped_rgba_always_fails() {
        let table = table_for(
            RecordingGlConfig::gles3().with_extensions(&[
                "WEBGL_compressed_texture_etc1",
                "WEBGL_compressed_texture_pvrtc",
                "WEBGL_compressed_texture_astc",
            ]),
        );
        assert_eq!(
            table.translate(RafxPixelFormat::Bgra8),
            Err(RafxError::UnsupportedFormat(RafxPixelFormat::Bgra8))
        );
        assert!(table.is_supported(RafxPixelFormat::Astc4x4));
    }

    #[test]
    fn compressed_formats_are_gated() {
        let table = table_for(RecordingGlConfig::gles3());
        assert_eq!(
            table.translate(RafxPixelFormat::Dxt5).unwrap().internal_format,
            gles_bindings::COMPRESSED_RGBA_S3TC_DXT5_EXT
        );
        assert!(!table.is_supported(RafxPixelFormat::Pvrtc4BppRgb));
        assert!(!table.is_supported(RafxPixelFormat::Etc1));
    }

    #[test]
    fn tier_dependent_representations() {
        let newer = table_for(RecordingGlConfig::gles3());
        let older = table_for(RecordingGlConfig::gles2().with_extensions(&["OES_texture_half_float"]));

        assert_eq!(
            newer.translate(RafxPixelFormat::Depth).unwrap(),
            GlFormatInfo::new(
                gles_bindings::DEPTH_COMPONENT,
                gles_bindings::DEPTH_COMPONENT32F,
                gles_bindings::FLOAT
            )
        );
        assert_eq!(
            older.translate(RafxPixelFormat::Depth).unwrap().pixel_type,
            gles_bindings::UNSIGNED_SHORT
        );
        assert_eq!(
            newer.translate(RafxPixelFormat::Rgba16F).unwrap().pixel_type,
            gles_bindings::HALF_FLOAT
        );
        assert_eq!(
            older.translate(RafxPixelFormat::Rgba16F).unwrap().pixel_type,
            gles_bindings::HALF_FLOAT_OES
        );
        assert_eq!(
            older.translate(RafxPixelFormat::Rgba8).unwrap().internal_format,
            gles_bindings::RGBA
        );

        // Full float on the older tier needs its extension
        assert_eq!(
            older.translate(RafxPixelFormat::Rgba32F),
            Err(RafxError::UnsupportedFormat(RafxPixelFormat::Rgba32F))
        );
        assert!(!older.is_supported(RafxPixelFormat::R32F));
    }
}
