use crate::backends::gles_bindings;
use crate::backends::gles_bindings::types::GLenum;
use crate::backends::{GlContext, TextureId};
use crate::internal::ResourceSlabKey;
use crate::{
    GlFormatInfo, RafxAddressMode, RafxCapabilities, RafxCompareOp, RafxFilterType, RafxResult,
    RafxStateCache, RafxTextureDef, RafxTextureParameterFlags, RafxTextureSource,
};

/// Handle to a texture owned by a `RafxDeviceGl`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RafxTextureHandle(pub(crate) ResourceSlabKey<RafxTextureGl>);

/// A texture's CPU-side description and level data, plus its GL object once created. The GL
/// object is created lazily and dropped on context loss.
#[derive(Debug)]
pub struct RafxTextureGl {
    pub(crate) def: RafxTextureDef,
    pub(crate) gl_format: GlFormatInfo,
    pub(crate) gl_target: GLenum,
    pub(crate) texture_id: Option<TextureId>,
    /// Storage has been allocated for the GL object, later uploads may use sub-image calls
    pub(crate) gl_created: bool,
    /// `[mip][face]` caller supplied content. A missing entry leaves the level for mip
    /// generation (or allocation, for level 0).
    pub(crate) levels: Vec<Vec<Option<RafxTextureSource>>>,
    pub(crate) faces_updated: Vec<bool>,
    pub(crate) needs_upload: bool,
    pub(crate) needs_mipmaps_upload: bool,
    pub(crate) mipmaps_uploaded: bool,
    pub(crate) dirty_parameters: RafxTextureParameterFlags,
    /// Footprint recorded at the last upload, 0 if nothing is resident
    pub(crate) gpu_size: u64,
}

impl RafxTextureGl {
    pub(crate) fn new(
        def: RafxTextureDef,
        gl_format: GlFormatInfo,
    ) -> Self {
        let gl_target = if def.cubemap {
            gles_bindings::TEXTURE_CUBE_MAP
        } else if def.volume {
            gles_bindings::TEXTURE_3D
        } else {
            gles_bindings::TEXTURE_2D
        };

        let face_count = def.face_count();
        RafxTextureGl {
            gl_format,
            gl_target,
            texture_id: None,
            gl_created: false,
            levels: vec![vec![None; face_count]],
            faces_updated: vec![true; face_count],
            needs_upload: true,
            needs_mipmaps_upload: def.mipmaps,
            mipmaps_uploaded: false,
            dirty_parameters: RafxTextureParameterFlags::all(),
            gpu_size: 0,
            def,
        }
    }

    pub fn texture_def(&self) -> &RafxTextureDef {
        &self.def
    }

    pub fn width(&self) -> u32 {
        self.def.width
    }

    pub fn height(&self) -> u32 {
        self.def.height
    }

    pub fn gl_texture_id(&self) -> Option<TextureId> {
        self.texture_id
    }

    pub fn gl_target(&self) -> GLenum {
        self.gl_target
    }

    pub fn gpu_size(&self) -> u64 {
        self.gpu_size
    }

    pub fn needs_upload(&self) -> bool {
        self.needs_upload || self.needs_mipmaps_upload
    }

    /// Number of mip entries the caller supplied, including gaps
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(
        &self,
        mip_level: usize,
        face: usize,
    ) -> Option<&RafxTextureSource> {
        self.levels
            .get(mip_level)
            .and_then(|x| x.get(face))
            .and_then(|x| x.as_ref())
    }

    /// Footprint of the texture as currently described
    pub fn compute_gpu_size(&self) -> u64 {
        let mip_count = if self.def.mipmaps {
            crate::mip_level_count_for_size(self.def.width, self.def.height)
        } else {
            1
        };

        let mut size = 0;
        for mip_level in 0..mip_count {
            let width = (self.def.width >> mip_level).max(1);
            let height = (self.def.height >> mip_level).max(1);
            let depth = if self.def.volume {
                (self.def.depth >> mip_level).max(1)
            } else {
                1
            };
            size += self.def.format.level_size(width, height, depth);
        }

        size * self.def.face_count() as u64
    }

    pub(crate) fn set_level(
        &mut self,
        mip_level: usize,
        face: usize,
        source: RafxTextureSource,
    ) {
        let face_count = self.def.face_count();
        if self.levels.len() <= mip_level {
            self.levels.resize(mip_level + 1, vec![None; face_count]);
        }

        self.levels[mip_level][face] = Some(source);
        self.faces_updated[face] = true;
        self.needs_upload = true;
        self.needs_mipmaps_upload = self.def.mipmaps;
    }

    /// Drops the GL object and flags everything for re-upload. CPU-side state is kept.
    pub(crate) fn lose_context(
        &mut self,
        texture_vram: &mut u64,
    ) {
        *texture_vram = texture_vram.saturating_sub(self.gpu_size);
        self.texture_id = None;
        self.gl_created = false;
        for flag in &mut self.faces_updated {
            *flag = true;
        }
        self.needs_upload = true;
        self.needs_mipmaps_upload = self.def.mipmaps;
        self.mipmaps_uploaded = false;
        self.dirty_parameters = RafxTextureParameterFlags::all();
        self.gpu_size = 0;
    }

    pub(crate) fn destroy(
        &mut self,
        gl_context: &dyn GlContext,
        state: &mut RafxStateCache,
        texture_vram: &mut u64,
    ) -> RafxResult<()> {
        if let Some(texture_id) = self.texture_id.take() {
            state.unbind_texture(gl_context, texture_id)?;
            gl_context.gl_destroy_texture(texture_id)?;
        }

        *texture_vram = texture_vram.saturating_sub(self.gpu_size);
        self.gpu_size = 0;
        self.gl_created = false;
        Ok(())
    }

    pub(crate) fn has_usable_mipmaps(
        &self,
        capabilities: &RafxCapabilities,
    ) -> bool {
        if !self.def.mipmaps {
            return false;
        }

        if !capabilities.api_tier.is_gles3() && !self.def.is_pot() {
            return false;
        }

        !(self.def.format.is_compressed() && self.levels.len() == 1)
    }

    pub(crate) fn set_min_filter(
        &mut self,
        filter: RafxFilterType,
    ) {
        if self.def.min_filter != filter {
            self.def.min_filter = filter;
            self.dirty_parameters |= RafxTextureParameterFlags::MIN_FILTER;
        }
    }

    pub(crate) fn set_mag_filter(
        &mut self,
        filter: RafxFilterType,
    ) {
        if self.def.mag_filter != filter {
            self.def.mag_filter = filter;
            self.dirty_parameters |= RafxTextureParameterFlags::MAG_FILTER;
        }
    }

    pub(crate) fn set_address_modes(
        &mut self,
        address_u: RafxAddressMode,
        address_v: RafxAddressMode,
        address_w: RafxAddressMode,
    ) {
        if self.def.address_u != address_u {
            self.def.address_u = address_u;
            self.dirty_parameters |= RafxTextureParameterFlags::ADDRESS_U;
        }
        if self.def.address_v != address_v {
            self.def.address_v = address_v;
            self.dirty_parameters |= RafxTextureParameterFlags::ADDRESS_V;
        }
        if self.def.address_w != address_w {
            self.def.address_w = address_w;
            self.dirty_parameters |= RafxTextureParameterFlags::ADDRESS_W;
        }
    }

    pub(crate) fn set_compare(
        &mut self,
        compare_on_read: bool,
        compare_func: RafxCompareOp,
    ) {
        if self.def.compare_on_read != compare_on_read {
            self.def.compare_on_read = compare_on_read;
            self.dirty_parameters |= RafxTextureParameterFlags::COMPARE_ON_READ;
        }
        if self.def.compare_func != compare_func {
            self.def.compare_func = compare_func;
            self.dirty_parameters |= RafxTextureParameterFlags::COMPARE_FUNC;
        }
    }

    pub(crate) fn set_anisotropy(
        &mut self,
        anisotropy: f32,
    ) {
        if self.def.anisotropy != anisotropy {
            self.def.anisotropy = anisotropy;
            self.dirty_parameters |= RafxTextureParameterFlags::ANISOTROPY;
        }
    }

    /// Sends the dirty sampling parameters. The texture must be bound to the active unit.
    pub(crate) fn apply_parameters(
        &mut self,
        gl_context: &dyn GlContext,
        capabilities: &RafxCapabilities,
    ) -> RafxResult<()> {
        let flags = self.dirty_parameters;
        if flags.is_empty() {
            return Ok(());
        }

        let target = self.gl_target;
        let gles3 = capabilities.api_tier.is_gles3();
        // NPOT textures on the older tier only support clamping
        let npot_restricted = !gles3 && !self.def.is_pot();

        if flags.contains(RafxTextureParameterFlags::MIN_FILTER) {
            let filter = if self.has_usable_mipmaps(capabilities) {
                self.def.min_filter
            } else {
                self.def.min_filter.without_mipmaps()
            };
            gl_context.gl_tex_parameteri(
                target,
                gles_bindings::TEXTURE_MIN_FILTER,
                filter.gl_filter_type() as i32,
            )?;
        }

        if flags.contains(RafxTextureParameterFlags::MAG_FILTER) {
            gl_context.gl_tex_parameteri(
                target,
                gles_bindings::TEXTURE_MAG_FILTER,
                self.def.mag_filter.without_mipmaps().gl_filter_type() as i32,
            )?;
        }

        let address_mode = |mode: RafxAddressMode| {
            if npot_restricted {
                gles_bindings::CLAMP_TO_EDGE
            } else {
                mode.gl_address_mode()
            }
        };

        if flags.contains(RafxTextureParameterFlags::ADDRESS_U) {
            gl_context.gl_tex_parameteri(
                target,
                gles_bindings::TEXTURE_WRAP_S,
                address_mode(self.def.address_u) as i32,
            )?;
        }

        if flags.contains(RafxTextureParameterFlags::ADDRESS_V) {
            gl_context.gl_tex_parameteri(
                target,
                gles_bindings::TEXTURE_WRAP_T,
                address_mode(self.def.address_v) as i32,
            )?;
        }

        if gles3 {
            if flags.contains(RafxTextureParameterFlags::ADDRESS_W) {
                gl_context.gl_tex_parameteri(
                    target,
                    gles_bindings::TEXTURE_WRAP_R,
                    self.def.address_w.gl_address_mode() as i32,
                )?;
            }

            if flags.contains(RafxTextureParameterFlags::COMPARE_ON_READ) {
                let mode = if self.def.compare_on_read {
                    gles_bindings::COMPARE_REF_TO_TEXTURE
                } else {
                    gles_bindings::NONE
                };
                gl_context.gl_tex_parameteri(
                    target,
                    gles_bindings::TEXTURE_COMPARE_MODE,
                    mode as i32,
                )?;
            }

            if flags.contains(RafxTextureParameterFlags::COMPARE_FUNC) {
                gl_context.gl_tex_parameteri(
                    target,
                    gles_bindings::TEXTURE_COMPARE_FUNC,
                    self.def.compare_func.gl_compare_op() as i32,
                )?;
            }
        }

        if flags.contains(RafxTextureParameterFlags::ANISOTROPY)
            && capabilities.features.anisotropic_filtering
        {
            let anisotropy = self
                .def
                .anisotropy
                .max(1.0)
                .min(capabilities.limits.max_anisotropy.max(1.0));
            gl_context.gl_tex_parameterf(
                target,
                gles_bindings::TEXTURE_MAX_ANISOTROPY_EXT,
                anisotropy,
            )?;
        }

        self.dirty_parameters = RafxTextureParameterFlags::empty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RafxPixelFormat;

    fn rgba8() -> GlFormatInfo {
        GlFormatInfo {
            format: gles_bindings::RGBA,
            internal_format: gles_bindings::RGBA8,
            pixel_type: gles_bindings::UNSIGNED_BYTE,
        }
    }

    #[test]
    fn gpu_size_includes_mips_and_faces() {
        let mut def = RafxTextureDef {
            width: 4,
            height: 4,
            format: RafxPixelFormat::Rgba8,
            mipmaps: false,
            ..Default::default()
        };
        assert_eq!(RafxTextureGl::new(def.clone(), rgba8()).compute_gpu_size(), 64);

        def.mipmaps = true;
        // 4x4 + 2x2 + 1x1
        assert_eq!(RafxTextureGl::new(def.clone(), rgba8()).compute_gpu_size(), 84);

        def.cubemap = true;
        assert_eq!(RafxTextureGl::new(def, rgba8()).compute_gpu_size(), 84 * 6);
    }

    #[test]
    fn setting_a_level_grows_the_chain() {
        let mut texture = RafxTextureGl::new(RafxTextureDef::default(), rgba8());
        texture.needs_upload = false;
        texture.set_level(2, 0, RafxTextureSource::Bytes(vec![0; 4]));
        assert_eq!(texture.level_count(), 3);
        assert!(texture.level(1, 0).is_none());
        assert!(texture.level(2, 0).is_some());
        assert!(texture.needs_upload);
    }

    #[test]
    fn parameter_setters_only_flag_changes() {
        let mut texture = RafxTextureGl::new(RafxTextureDef::default(), rgba8());
        texture.dirty_parameters = RafxTextureParameterFlags::empty();
        texture.set_mag_filter(RafxFilterType::Linear);
        assert!(texture.dirty_parameters.is_empty());
        texture.set_mag_filter(RafxFilterType::Nearest);
        assert_eq!(
            texture.dirty_parameters,
            RafxTextureParameterFlags::MAG_FILTER
        );
    }
}
