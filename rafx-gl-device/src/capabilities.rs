use crate::backends::gles_bindings;
use crate::backends::GlContext;
use crate::{RafxApiTier, RafxError, RafxQuirkContext, RafxQuirkEffects, RafxQuirksTable, RafxResult};

/// Optional features, normalized across tiers. A feature that is core on the newer tier and an
/// extension on the older one reads the same way in both cases.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RafxFeatureSupport {
    pub blend_minmax: bool,
    pub draw_buffers: bool,
    pub instancing: bool,
    pub standard_derivatives: bool,
    pub element_index_uint: bool,
    pub vertex_array_objects: bool,
    pub depth_texture: bool,
    pub volume_textures: bool,
    pub texture_float: bool,
    pub texture_half_float: bool,
    pub texture_float_linear: bool,
    pub texture_half_float_linear: bool,
    pub color_buffer_float: bool,
    pub color_buffer_half_float: bool,
    pub srgb: bool,
    pub shader_texture_lod: bool,
    pub anisotropic_filtering: bool,
    pub compressed_s3tc: bool,
    pub compressed_etc1: bool,
    pub compressed_etc2: bool,
    pub compressed_pvrtc: bool,
    pub compressed_astc: bool,
    pub debug_renderer_info: bool,
    pub parallel_shader_compile: bool,
    pub disjoint_timer_query: bool,
    pub lose_context: bool,
}

/// Numeric limits of the context
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RafxLimits {
    pub max_texture_size: u32,
    pub max_cubemap_size: u32,
    pub max_volume_size: u32,
    pub max_renderbuffer_size: u32,
    pub max_textures: u32,
    pub max_combined_textures: u32,
    pub max_vertex_textures: u32,
    pub max_vertex_attributes: u32,
    pub vertex_uniform_vectors: u32,
    pub fragment_uniform_vectors: u32,
    pub max_draw_buffers: u32,
    pub max_color_attachments: u32,
    pub max_samples: u32,
    pub max_anisotropy: f32,
}

/// Everything the device knows about its context. Produced once by `probe` and replaced
/// wholesale after a context restoration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RafxCapabilities {
    pub api_tier: RafxApiTier,
    pub vendor: String,
    pub renderer: String,
    pub version: String,
    pub shading_language_version: String,
    pub unmasked_vendor: Option<String>,
    pub unmasked_renderer: Option<String>,
    pub extensions: Vec<String>,
    pub features: RafxFeatureSupport,
    pub limits: RafxLimits,
    pub bone_limit: u32,
    pub supports_multisampling: bool,
    pub supports_gpu_particles: bool,
    pub quirk_effects: RafxQuirkEffects,
}

// Uniform vectors reserved by the skinning shader for non-bone data
const BONE_LIMIT_RESERVED_VECTORS: u32 = 41;
const MAX_BONE_LIMIT: u32 = 128;
const MAX_SAMPLES_CAP: u32 = 4;

pub fn bone_limit_for_vertex_uniform_vectors(vertex_uniform_vectors: u32) -> u32 {
    (vertex_uniform_vectors.saturating_sub(BONE_LIMIT_RESERVED_VECTORS) / 3).min(MAX_BONE_LIMIT)
}

struct ExtensionProber<'a> {
    gl_context: &'a dyn GlContext,
    supported: &'a [String],
    enabled: Vec<String>,
}

impl<'a> ExtensionProber<'a> {
    /// Enables the first supported name out of a list of vendor-prefixed aliases
    fn enable_any(
        &mut self,
        names: &[&str],
    ) -> bool {
        for name in names {
            if self.supported.iter().any(|x| x == name) && self.gl_context.enable_extension(name)
            {
                self.enabled.push(name.to_string());
                return true;
            }
        }
        false
    }

    fn enable(
        &mut self,
        name: &str,
    ) -> bool {
        self.enable_any(&[name])
    }
}

fn get_limit(
    gl_context: &dyn GlContext,
    pname: u32,
) -> RafxResult<u32> {
    Ok(gl_context.gl_get_integerv(pname)?.max(0) as u32)
}

impl RafxCapabilities {
    /// Queries extensions and limits, enabling every extension the device can use. Quirks are
    /// evaluated against the context's vendor/renderer strings and the host user agent.
    #[profiling::function]
    pub fn probe(
        gl_context: &dyn GlContext,
        quirks: &RafxQuirksTable,
        user_agent: Option<&str>,
    ) -> RafxResult<RafxCapabilities> {
        let api_tier = gl_context.api_tier();
        let gles3 = api_tier.is_gles3();

        let supported = gl_context.supported_extensions();
        let mut prober = ExtensionProber {
            gl_context,
            supported: &supported,
            enabled: Vec::default(),
        };

        let mut features = RafxFeatureSupport::default();
        if gles3 {
            features.blend_minmax = true;
            features.draw_buffers = true;
            features.instancing = true;
            features.standard_derivatives = true;
            features.element_index_uint = true;
            features.vertex_array_objects = true;
            features.depth_texture = true;
            features.volume_textures = true;
            features.texture_float = true;
            features.texture_half_float = true;
            features.texture_half_float_linear = true;
            features.srgb = true;
            features.shader_texture_lod = true;
            features.color_buffer_float = prober.enable("EXT_color_buffer_float");
            // Half float rendering comes with float rendering on the newer tier
            features.color_buffer_half_float =
                features.color_buffer_float || prober.enable("EXT_color_buffer_half_float");
            features.disjoint_timer_query = prober.enable("EXT_disjoint_timer_query_webgl2");
            features.compressed_etc2 = true;
        } else {
            features.blend_minmax = prober.enable("EXT_blend_minmax");
            features.draw_buffers = prober.enable("WEBGL_draw_buffers");
            features.instancing = prober.enable("ANGLE_instanced_arrays");
            features.standard_derivatives = prober.enable("OES_standard_derivatives");
            features.element_index_uint = prober.enable("OES_element_index_uint");
            features.vertex_array_objects = prober.enable("OES_vertex_array_object");
            features.depth_texture = prober.enable("WEBGL_depth_texture");
            features.texture_float = prober.enable("OES_texture_float");
            features.texture_half_float = prober.enable("OES_texture_half_float");
            features.texture_half_float_linear = prober.enable("OES_texture_half_float_linear");
            features.color_buffer_float = prober.enable("WEBGL_color_buffer_float");
            features.color_buffer_half_float = prober.enable("EXT_color_buffer_half_float");
            features.srgb = prober.enable("EXT_sRGB");
            features.shader_texture_lod = prober.enable("EXT_shader_texture_lod");
            features.disjoint_timer_query = prober.enable("EXT_disjoint_timer_query");
            features.compressed_etc2 = prober.enable("WEBGL_compressed_texture_etc");

            if !features.vertex_array_objects {
                return Err(RafxError::ContextUnavailable(
                    "OES_vertex_array_object is required on the older API tier".to_string(),
                ));
            }
        }

        features.texture_float_linear = prober.enable("OES_texture_float_linear");
        features.anisotropic_filtering = prober.enable_any(&[
            "EXT_texture_filter_anisotropic",
            "WEBKIT_EXT_texture_filter_anisotropic",
            "MOZ_EXT_texture_filter_anisotropic",
        ]);
        features.compressed_s3tc = prober.enable_any(&[
            "WEBGL_compressed_texture_s3tc",
            "WEBKIT_WEBGL_compressed_texture_s3tc",
        ]);
        features.compressed_etc1 = prober.enable("WEBGL_compressed_texture_etc1");
        features.compressed_pvrtc = prober.enable_any(&[
            "WEBGL_compressed_texture_pvrtc",
            "WEBKIT_WEBGL_compressed_texture_pvrtc",
        ]);
        features.compressed_astc = prober.enable("WEBGL_compressed_texture_astc");
        features.debug_renderer_info = prober.enable("WEBGL_debug_renderer_info");
        features.parallel_shader_compile = prober.enable("KHR_parallel_shader_compile");
        features.lose_context = prober.enable("WEBGL_lose_context");

        let extensions = prober.enabled;

        let vendor = gl_context
            .gl_get_string(gles_bindings::VENDOR)?
            .unwrap_or_default();
        let renderer = gl_context
            .gl_get_string(gles_bindings::RENDERER)?
            .unwrap_or_default();
        let version = gl_context
            .gl_get_string(gles_bindings::VERSION)?
            .unwrap_or_default();
        let shading_language_version = gl_context
            .gl_get_string(gles_bindings::SHADING_LANGUAGE_VERSION)?
            .unwrap_or_default();

        let (unmasked_vendor, unmasked_renderer) = if features.debug_renderer_info {
            (
                gl_context.gl_get_string(gles_bindings::UNMASKED_VENDOR_WEBGL)?,
                gl_context.gl_get_string(gles_bindings::UNMASKED_RENDERER_WEBGL)?,
            )
        } else {
            (None, None)
        };

        log::debug!("Vendor: {}", vendor);
        log::debug!("Renderer: {}", renderer);
        log::debug!("Version: {}", version);
        log::debug!("Shading language version: {}", shading_language_version);
        if let Some(unmasked_renderer) = &unmasked_renderer {
            log::debug!(
                "Unmasked vendor: {} Unmasked renderer: {}",
                unmasked_vendor.as_deref().unwrap_or(""),
                unmasked_renderer
            );
        }
        log::debug!("Enabled extensions: {:?}", extensions);

        let mut limits = RafxLimits {
            max_texture_size: get_limit(gl_context, gles_bindings::MAX_TEXTURE_SIZE)?,
            max_cubemap_size: get_limit(gl_context, gles_bindings::MAX_CUBE_MAP_TEXTURE_SIZE)?,
            max_volume_size: 1,
            max_renderbuffer_size: get_limit(gl_context, gles_bindings::MAX_RENDERBUFFER_SIZE)?,
            max_textures: get_limit(gl_context, gles_bindings::MAX_TEXTURE_IMAGE_UNITS)?,
            max_combined_textures: get_limit(
                gl_context,
                gles_bindings::MAX_COMBINED_TEXTURE_IMAGE_UNITS,
            )?,
            max_vertex_textures: get_limit(
                gl_context,
                gles_bindings::MAX_VERTEX_TEXTURE_IMAGE_UNITS,
            )?,
            max_vertex_attributes: get_limit(gl_context, gles_bindings::MAX_VERTEX_ATTRIBS)?,
            vertex_uniform_vectors: get_limit(
                gl_context,
                gles_bindings::MAX_VERTEX_UNIFORM_VECTORS,
            )?,
            fragment_uniform_vectors: get_limit(
                gl_context,
                gles_bindings::MAX_FRAGMENT_UNIFORM_VECTORS,
            )?,
            max_draw_buffers: 1,
            max_color_attachments: 1,
            max_samples: 1,
            max_anisotropy: 1.0,
        };

        if gles3 {
            limits.max_volume_size = get_limit(gl_context, gles_bindings::MAX_3D_TEXTURE_SIZE)?;
            limits.max_samples =
                get_limit(gl_context, gles_bindings::MAX_SAMPLES)?.min(MAX_SAMPLES_CAP);
        }

        if features.draw_buffers {
            limits.max_draw_buffers = get_limit(gl_context, gles_bindings::MAX_DRAW_BUFFERS)?;
            limits.max_color_attachments =
                get_limit(gl_context, gles_bindings::MAX_COLOR_ATTACHMENTS)?;
        }

        if features.anisotropic_filtering {
            limits.max_anisotropy =
                gl_context.gl_get_floatv(gles_bindings::MAX_TEXTURE_MAX_ANISOTROPY_EXT)?;
        }

        let quirk_effects = quirks.evaluate(&RafxQuirkContext {
            user_agent,
            vendor: Some(unmasked_vendor.as_deref().unwrap_or(&vendor)),
            renderer: Some(unmasked_renderer.as_deref().unwrap_or(&renderer)),
        });

        let bone_limit = quirk_effects
            .bone_limit
            .unwrap_or_else(|| bone_limit_for_vertex_uniform_vectors(limits.vertex_uniform_vectors));

        if quirk_effects.disable_multisampling {
            limits.max_samples = 1;
        }

        Ok(RafxCapabilities {
            api_tier,
            vendor,
            renderer,
            version,
            shading_language_version,
            unmasked_vendor,
            unmasked_renderer,
            extensions,
            features,
            supports_multisampling: limits.max_samples > 1,
            supports_gpu_particles: !quirk_effects.disable_gpu_particles,
            limits,
            bone_limit,
            quirk_effects,
        })
    }

    pub fn is_extension_enabled(
        &self,
        name: &str,
    ) -> bool {
        self.extensions.iter().any(|x| x == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::recording::{RecordingGlConfig, RecordingGlContext};

    #[test]
    fn bone_limit_formula() {
        assert_eq!(bone_limit_for_vertex_uniform_vectors(256), 71);
        assert_eq!(bone_limit_for_vertex_uniform_vectors(1024), 128);
        assert_eq!(bone_limit_for_vertex_uniform_vectors(16), 0);
    }

    #[test]
    fn newer_tier_features_are_native() {
        let context = RecordingGlContext::new(RecordingGlConfig::gles3());
        let caps = RafxCapabilities::probe(&context, &RafxQuirksTable::empty(), None).unwrap();
        assert_eq!(caps.api_tier, RafxApiTier::Gles3);
        assert!(caps.features.instancing);
        assert!(caps.features.vertex_array_objects);
        assert!(caps.features.volume_textures);
        assert!(caps.features.color_buffer_float);
        assert!(caps.features.anisotropic_filtering);
        assert_eq!(caps.limits.max_samples, 4);
        assert_eq!(caps.limits.max_anisotropy, 16.0);
        assert_eq!(caps.limits.max_draw_buffers, 8);
        assert_eq!(caps.unmasked_renderer.as_deref(), Some("Recording Renderer"));
        assert!(caps.supports_multisampling);
        assert!(context.is_extension_enabled("EXT_color_buffer_float"));
    }

    #[test]
    fn older_tier_normalizes_extensions() {
        let context = RecordingGlContext::new(RecordingGlConfig::gles2());
        let caps = RafxCapabilities::probe(&context, &RafxQuirksTable::empty(), None).unwrap();
        assert!(caps.features.instancing);
        assert!(caps.features.vertex_array_objects);
        assert!(!caps.features.draw_buffers);
        assert!(!caps.features.volume_textures);
        assert!(!caps.features.texture_float);
        assert_eq!(caps.limits.max_draw_buffers, 1);
        assert_eq!(caps.limits.max_samples, 1);
        assert_eq!(caps.limits.max_volume_size, 1);
        assert!(!caps.supports_multisampling);
    }

    #[test]
    fn older_tier_requires_vertex_array_objects() {
        let context = RecordingGlContext::new(
            RecordingGlConfig::gles2().without_extensions(&["OES_vertex_array_object"]),
        );
        let result = RafxCapabilities::probe(&context, &RafxQuirksTable::empty(), None);
        match result {
            Err(RafxError::ContextUnavailable(_)) => {}
            other => panic!("Expected ContextUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn quirks_use_unmasked_renderer() {
        let mut config = RecordingGlConfig::gles3();
        config.unmasked_renderer = "Mali-450 MP".to_string();
        let context = RecordingGlContext::new(config);
        let caps =
            RafxCapabilities::probe(&context, &RafxQuirksTable::legacy_defaults(), None).unwrap();
        assert_eq!(caps.bone_limit, 34);
    }
}
