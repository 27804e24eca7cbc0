use crate::backends::gles_bindings::types::GLenum;
use crate::backends::GlContext;
use crate::internal::gl_cube_face_target;
use crate::{RafxCapabilities, RafxResult, RafxStateCache, RafxTextureGl, RafxTextureSource};
use std::borrow::Cow;

/// Shrinks the image so that neither side exceeds `max_size`, keeping the aspect ratio
fn downscale_image<'a>(
    image: &'a image::RgbaImage,
    max_size: u32,
    texture_name: &Option<String>,
) -> Cow<'a, image::RgbaImage> {
    let (width, height) = image.dimensions();
    if width <= max_size && height <= max_size {
        return Cow::Borrowed(image);
    }

    let scale = max_size as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale) as u32).max(1).min(max_size);
    let new_height = ((height as f32 * scale) as u32).max(1).min(max_size);
    log::warn!(
        "Image {:?} is {}x{}, larger than the device maximum of {}. Downscaling to {}x{}",
        texture_name,
        width,
        height,
        max_size,
        new_width,
        new_height
    );

    Cow::Owned(image::imageops::resize(
        image,
        new_width,
        new_height,
        image::imageops::FilterType::Triangle,
    ))
}

fn level_extent(
    extent: u32,
    mip_level: usize,
) -> u32 {
    (extent >> mip_level).max(1)
}

struct LevelUpload<'a> {
    gl_context: &'a dyn GlContext,
    target: GLenum,
    mip_level: u32,
    width: u32,
    height: u32,
    /// Storage already exists at this level with these dimensions
    allocated: bool,
}

impl<'a> LevelUpload<'a> {
    fn image(
        &self,
        texture: &RafxTextureGl,
        image: &image::RgbaImage,
    ) -> RafxResult<()> {
        let format = &texture.gl_format;
        if self.allocated && image.dimensions() == (self.width, self.height) {
            self.gl_context.gl_tex_sub_image_2d_with_image(
                self.target,
                self.mip_level,
                format.format,
                format.pixel_type,
                image,
            )
        } else {
            self.gl_context.gl_tex_image_2d_with_image(
                self.target,
                self.mip_level,
                format.internal_format,
                format.format,
                format.pixel_type,
                image,
            )
        }
    }

    fn bytes(
        &self,
        texture: &RafxTextureGl,
        data: Option<&[u8]>,
    ) -> RafxResult<()> {
        let format = &texture.gl_format;
        if texture.def.format.is_compressed() {
            match data {
                Some(data) if self.allocated => self.gl_context.gl_compressed_tex_sub_image_2d(
                    self.target,
                    self.mip_level,
                    self.width,
                    self.height,
                    format.internal_format,
                    data,
                ),
                Some(data) => self.gl_context.gl_compressed_tex_image_2d(
                    self.target,
                    self.mip_level,
                    format.internal_format,
                    self.width,
                    self.height,
                    data,
                ),
                None => {
                    // Compressed storage cannot be allocated without data
                    log::trace!(
                        "Skipping allocation of compressed level {} of texture {:?}",
                        self.mip_level,
                        texture.def.name
                    );
                    Ok(())
                }
            }
        } else {
            match data {
                Some(data) if self.allocated => self.gl_context.gl_tex_sub_image_2d(
                    self.target,
                    self.mip_level,
                    self.width,
                    self.height,
                    format.format,
                    format.pixel_type,
                    data,
                ),
                _ => self.gl_context.gl_tex_image_2d(
                    self.target,
                    self.mip_level,
                    format.internal_format,
                    self.width,
                    self.height,
                    format.format,
                    format.pixel_type,
                    data,
                ),
            }
        }
    }
}

/// Sends the texture's pending level data to its GL object. The texture must already be bound to
/// the active unit. Does nothing unless the texture needs a full or a mipmap-only upload.
/// `texture_vram` is the device-wide texture memory counter.
#[profiling::function]
pub(crate) fn upload_texture(
    gl_context: &dyn GlContext,
    capabilities: &RafxCapabilities,
    state: &mut RafxStateCache,
    texture: &mut RafxTextureGl,
    texture_vram: &mut u64,
) -> RafxResult<()> {
    let gles3 = capabilities.api_tier.is_gles3();
    let pot = texture.def.is_pot();
    let compressed = texture.def.format.is_compressed();

    if !texture.needs_upload
        && (!texture.needs_mipmaps_upload || texture.mipmaps_uploaded || !(pot || gles3))
    {
        return Ok(());
    }

    let target = texture.gl_target;
    let required_mip_levels = texture.def.required_mip_levels() as usize;
    let populated_levels = texture
        .levels
        .iter()
        .filter(|faces| faces.iter().any(|x| x.is_some()))
        .count();

    // A partial custom chain is made complete by generating every level first and then
    // overwriting the levels the caller supplied
    let complete_partial_chain = !compressed
        && texture.levels.len() > 1
        && populated_levels < required_mip_levels
        && (pot || gles3);
    let mut chain_completed = false;

    for mip_level in 0..texture.levels.len() {
        if mip_level == 0 && !texture.needs_upload {
            continue;
        }

        if mip_level > 0 {
            if !texture.needs_mipmaps_upload || !texture.def.mipmaps {
                break;
            }

            if texture.levels[mip_level].iter().all(|x| x.is_none()) {
                continue;
            }

            if complete_partial_chain && !chain_completed {
                gl_context.gl_generate_mipmap(target)?;
                chain_completed = true;
            }
        }

        let width = level_extent(texture.def.width, mip_level);
        let height = level_extent(texture.def.height, mip_level);

        if texture.def.cubemap {
            for face in 0..6 {
                if !texture.faces_updated[face] {
                    continue;
                }

                let upload = LevelUpload {
                    gl_context,
                    target: gl_cube_face_target(face as u32),
                    mip_level: mip_level as u32,
                    width,
                    height,
                    allocated: texture.gl_created,
                };

                match &texture.levels[mip_level][face] {
                    Some(RafxTextureSource::Image(image)) => {
                        let image = downscale_image(
                            image,
                            capabilities.limits.max_cubemap_size,
                            &texture.def.name,
                        );
                        if mip_level == 0 {
                            texture.def.width = image.width();
                            texture.def.height = image.height();
                        }

                        state.set_unpack_flip_y(gl_context, false)?;
                        state.set_unpack_premultiply_alpha(
                            gl_context,
                            texture.def.premultiply_alpha,
                        )?;
                        upload.image(texture, &image)?;
                    }
                    Some(RafxTextureSource::Bytes(data)) => {
                        state.set_unpack_flip_y(gl_context, false)?;
                        state.set_unpack_premultiply_alpha(
                            gl_context,
                            texture.def.premultiply_alpha,
                        )?;
                        upload.bytes(texture, Some(data))?;
                    }
                    None if mip_level == 0 => upload.bytes(texture, None)?,
                    None => {}
                }
            }
        } else if texture.def.volume {
            let depth = level_extent(texture.def.depth, mip_level);
            let format = texture.gl_format;
            state.set_unpack_flip_y(gl_context, false)?;
            state.set_unpack_premultiply_alpha(gl_context, texture.def.premultiply_alpha)?;

            match &texture.levels[mip_level][0] {
                Some(RafxTextureSource::Bytes(data)) if compressed => {
                    gl_context.gl_compressed_tex_image_3d(
                        target,
                        mip_level as u32,
                        format.internal_format,
                        width,
                        height,
                        depth,
                        data,
                    )?;
                }
                Some(RafxTextureSource::Bytes(data)) => {
                    gl_context.gl_tex_image_3d(
                        target,
                        mip_level as u32,
                        format.internal_format,
                        width,
                        height,
                        depth,
                        format.format,
                        format.pixel_type,
                        Some(data),
                    )?;
                }
                Some(RafxTextureSource::Image(_)) => {
                    Err(format!(
                        "Volume texture {:?} only accepts raw bytes",
                        texture.def.name
                    ))?;
                }
                None if mip_level == 0 && !compressed => {
                    gl_context.gl_tex_image_3d(
                        target,
                        mip_level as u32,
                        format.internal_format,
                        width,
                        height,
                        depth,
                        format.format,
                        format.pixel_type,
                        None,
                    )?;
                }
                None => {}
            }
        } else {
            let upload = LevelUpload {
                gl_context,
                target,
                mip_level: mip_level as u32,
                width,
                height,
                allocated: texture.gl_created,
            };

            match &texture.levels[mip_level][0] {
                Some(RafxTextureSource::Image(image)) => {
                    let image = downscale_image(
                        image,
                        capabilities.limits.max_texture_size,
                        &texture.def.name,
                    );
                    if mip_level == 0 {
                        texture.def.width = image.width();
                        texture.def.height = image.height();
                    }

                    state.set_unpack_flip_y(gl_context, texture.def.flip_y)?;
                    state.set_unpack_premultiply_alpha(gl_context, texture.def.premultiply_alpha)?;

                    let upload = LevelUpload {
                        width: level_extent(texture.def.width, mip_level),
                        height: level_extent(texture.def.height, mip_level),
                        ..upload
                    };
                    upload.image(texture, &image)?;
                }
                Some(RafxTextureSource::Bytes(data)) => {
                    state.set_unpack_flip_y(gl_context, false)?;
                    state.set_unpack_premultiply_alpha(gl_context, texture.def.premultiply_alpha)?;
                    upload.bytes(texture, Some(data))?;
                }
                None => {
                    state.set_unpack_flip_y(gl_context, false)?;
                    upload.bytes(texture, None)?;
                }
            }
        }

        if mip_level > 0 {
            texture.mipmaps_uploaded = true;
        }
    }

    if chain_completed {
        texture.mipmaps_uploaded = true;
    }

    if texture.needs_upload {
        for face in &mut texture.faces_updated {
            *face = false;
        }
    }

    if !compressed
        && texture.def.mipmaps
        && texture.needs_mipmaps_upload
        && (pot || gles3)
        && texture.levels.len() == 1
    {
        gl_context.gl_generate_mipmap(target)?;
        texture.mipmaps_uploaded = true;
    }

    let gpu_size = texture.compute_gpu_size();
    *texture_vram = texture_vram.saturating_sub(texture.gpu_size) + gpu_size;
    texture.gpu_size = gpu_size;

    texture.gl_created = true;
    texture.needs_upload = false;
    texture.needs_mipmaps_upload = false;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::gles_bindings;
    use crate::backends::recording::{
        GlCall, RecordedLevelContent, RecordingGlConfig, RecordingGlContext,
    };
    use crate::{RafxFormatTable, RafxPixelFormat, RafxQuirksTable, RafxTextureDef};

    struct Fixture {
        context: RecordingGlContext,
        capabilities: RafxCapabilities,
        state: RafxStateCache,
        vram: u64,
    }

    impl Fixture {
        fn new(config: RecordingGlConfig) -> Self {
            let context = RecordingGlContext::new(config);
            let capabilities =
                RafxCapabilities::probe(&context, &RafxQuirksTable::empty(), None).unwrap();
            let mut state = RafxStateCache::new(0);
            state.apply_defaults(&context, &capabilities).unwrap();
            Fixture {
                context,
                capabilities,
                state,
                vram: 0,
            }
        }

        fn create(
            &mut self,
            def: RafxTextureDef,
        ) -> RafxTextureGl {
            let format_table = RafxFormatTable::new(&self.capabilities);
            let gl_format = format_table.translate(def.format).unwrap();
            let mut texture = RafxTextureGl::new(def, gl_format);
            let texture_id = self.context.gl_create_texture().unwrap();
            texture.texture_id = Some(texture_id);
            self.state
                .bind_texture(&self.context, 0, texture.gl_target, texture_id)
                .unwrap();
            texture
        }

        fn upload(
            &mut self,
            texture: &mut RafxTextureGl,
        ) {
            upload_texture(
                &self.context,
                &self.capabilities,
                &mut self.state,
                texture,
                &mut self.vram,
            )
            .unwrap();
        }
    }

    fn rgba_def(
        width: u32,
        height: u32,
    ) -> RafxTextureDef {
        RafxTextureDef {
            width,
            height,
            format: RafxPixelFormat::Rgba8,
            ..Default::default()
        }
    }

    #[test]
    fn second_upload_is_a_no_op() {
        let mut fixture = Fixture::new(RecordingGlConfig::gles3());
        let mut texture = fixture.create(rgba_def(4, 4));
        texture.set_level(0, 0, RafxTextureSource::Bytes(vec![7; 64]));
        fixture.upload(&mut texture);

        let start = fixture.context.call_count();
        fixture.upload(&mut texture);
        assert_eq!(fixture.context.call_count(), start);
    }

    #[test]
    fn single_level_generates_chain() {
        let mut fixture = Fixture::new(RecordingGlConfig::gles3());
        let mut texture = fixture.create(rgba_def(4, 4));
        texture.set_level(0, 0, RafxTextureSource::Bytes(vec![7; 64]));
        fixture.upload(&mut texture);

        let calls = fixture.context.calls();
        assert!(calls.contains(&GlCall::GenerateMipmap(gles_bindings::TEXTURE_2D)));
        assert!(texture.mipmaps_uploaded);

        let recorded = fixture
            .context
            .texture(texture.texture_id.unwrap())
            .unwrap();
        assert_eq!(recorded.levels.len(), 3);
    }

    #[test]
    fn partial_chain_is_completed() {
        let mut fixture = Fixture::new(RecordingGlConfig::gles3());
        let mut texture = fixture.create(rgba_def(4, 4));
        texture.set_level(0, 0, RafxTextureSource::Bytes(vec![1; 64]));
        texture.set_level(2, 0, RafxTextureSource::Bytes(vec![3; 4]));
        fixture.upload(&mut texture);

        let recorded = fixture
            .context
            .texture(texture.texture_id.unwrap())
            .unwrap();
        let target = gles_bindings::TEXTURE_2D;
        assert_eq!(
            recorded.level(target, 0).unwrap().content,
            RecordedLevelContent::Data(vec![1; 64])
        );
        assert_eq!(
            recorded.level(target, 1).unwrap().content,
            RecordedLevelContent::Generated
        );
        assert_eq!(
            recorded.level(target, 2).unwrap().content,
            RecordedLevelContent::Data(vec![3; 4])
        );
    }

    #[test]
    fn npot_on_older_tier_is_not_mipmapped() {
        let mut fixture = Fixture::new(RecordingGlConfig::gles2());
        let mut texture = fixture.create(rgba_def(6, 4));
        texture.set_level(0, 0, RafxTextureSource::Bytes(vec![0; 96]));
        fixture.upload(&mut texture);

        assert!(!fixture
            .context
            .calls()
            .iter()
            .any(|x| matches!(x, GlCall::GenerateMipmap(_))));
    }

    #[test]
    fn oversized_image_is_downscaled() {
        let mut fixture = Fixture::new(
            RecordingGlConfig::gles3().with_limit(gles_bindings::MAX_TEXTURE_SIZE, 8),
        );
        let mut def = rgba_def(32, 16);
        def.mipmaps = false;
        def.flip_y = true;
        let mut texture = fixture.create(def);
        texture.set_level(
            0,
            0,
            RafxTextureSource::Image(image::RgbaImage::new(32, 16)),
        );
        fixture.upload(&mut texture);

        assert_eq!((texture.def.width, texture.def.height), (8, 4));
        let recorded = fixture
            .context
            .texture(texture.texture_id.unwrap())
            .unwrap();
        let level = recorded.level(gles_bindings::TEXTURE_2D, 0).unwrap();
        assert_eq!((level.width, level.height), (8, 4));
        match &level.content {
            RecordedLevelContent::Image { flip_y, .. } => assert!(*flip_y),
            other => panic!("Unexpected level content {:?}", other),
        }
    }

    #[test]
    fn cubemap_uploads_only_updated_faces() {
        let mut fixture = Fixture::new(RecordingGlConfig::gles3());
        let mut def = rgba_def(2, 2);
        def.cubemap = true;
        def.mipmaps = false;
        def.flip_y = true;
        let mut texture = fixture.create(def);
        for face in 0..6 {
            texture.set_level(0, face, RafxTextureSource::Bytes(vec![face as u8; 16]));
        }
        fixture.upload(&mut texture);

        let start = fixture.context.call_count();
        texture.set_level(0, 4, RafxTextureSource::Bytes(vec![9; 16]));
        fixture.upload(&mut texture);
        let uploads: Vec<_> = fixture
            .context
            .calls_since(start)
            .into_iter()
            .filter(|x| x.is_texture_upload())
            .collect();
        assert_eq!(
            uploads,
            vec![GlCall::TexSubImage2D {
                target: gles_bindings::TEXTURE_CUBE_MAP_POSITIVE_Z,
                mip_level: 0,
                width: 2,
                height: 2,
            }]
        );
        // Byte sources ignore the texture's flip flag
        assert!(!fixture
            .context
            .calls()
            .contains(&GlCall::PixelStorei(gles_bindings::UNPACK_FLIP_Y_WEBGL, 1)));
    }

    #[test]
    fn cubemap_image_is_downscaled_at_base_level_without_flip() {
        let mut fixture = Fixture::new(
            RecordingGlConfig::gles3().with_limit(gles_bindings::MAX_CUBE_MAP_TEXTURE_SIZE, 8),
        );

        // Leave the flip flag set from a flipped 2D image
        let mut flat_def = rgba_def(2, 2);
        flat_def.mipmaps = false;
        flat_def.flip_y = true;
        let mut flat = fixture.create(flat_def);
        flat.set_level(0, 0, RafxTextureSource::Image(image::RgbaImage::new(2, 2)));
        fixture.upload(&mut flat);
        assert!(fixture
            .context
            .calls()
            .contains(&GlCall::PixelStorei(gles_bindings::UNPACK_FLIP_Y_WEBGL, 1)));

        let mut def = rgba_def(32, 32);
        def.cubemap = true;
        def.mipmaps = true;
        def.flip_y = true;
        let mut texture = fixture.create(def);
        for face in 0..6 {
            texture.set_level(0, face, RafxTextureSource::Image(image::RgbaImage::new(32, 32)));
            texture.set_level(1, face, RafxTextureSource::Image(image::RgbaImage::new(4, 4)));
        }
        fixture.upload(&mut texture);

        // Only the base level resizes the texture
        assert_eq!((texture.def.width, texture.def.height), (8, 8));

        let recorded = fixture
            .context
            .texture(texture.texture_id.unwrap())
            .unwrap();
        for face in 0..6 {
            let target = gl_cube_face_target(face);
            let base = recorded.level(target, 0).unwrap();
            assert_eq!((base.width, base.height), (8, 8));
            let second = recorded.level(target, 1).unwrap();
            assert_eq!((second.width, second.height), (4, 4));
            for level in &[base, second] {
                match &level.content {
                    RecordedLevelContent::Image { flip_y, .. } => assert!(!*flip_y),
                    other => panic!("Unexpected level content {:?}", other),
                }
            }
        }
    }

    #[test]
    fn volume_levels_scale_depth() {
        let mut fixture = Fixture::new(RecordingGlConfig::gles3());
        let mut def = rgba_def(4, 4);
        def.volume = true;
        def.depth = 4;
        def.mipmaps = true;
        let mut texture = fixture.create(def);
        texture.set_level(0, 0, RafxTextureSource::Bytes(vec![0; 256]));
        texture.set_level(1, 0, RafxTextureSource::Bytes(vec![0; 32]));
        texture.set_level(2, 0, RafxTextureSource::Bytes(vec![0; 4]));
        fixture.upload(&mut texture);

        let uploads: Vec<_> = fixture
            .context
            .calls()
            .into_iter()
            .filter(|x| x.is_texture_upload())
            .collect();
        assert_eq!(uploads.len(), 3);
        assert_eq!(
            uploads[1],
            GlCall::TexImage3D {
                mip_level: 1,
                width: 2,
                height: 2,
                depth: 2,
            }
        );
    }

    #[test]
    fn vram_tracks_footprint() {
        let mut fixture = Fixture::new(RecordingGlConfig::gles3());
        let mut def = rgba_def(4, 4);
        def.mipmaps = false;
        let mut texture = fixture.create(def);
        texture.set_level(0, 0, RafxTextureSource::Bytes(vec![0; 64]));
        fixture.upload(&mut texture);
        assert_eq!(fixture.vram, 64);

        // Re-uploading replaces rather than adds
        texture.set_level(0, 0, RafxTextureSource::Bytes(vec![1; 64]));
        fixture.upload(&mut texture);
        assert_eq!(fixture.vram, 64);
    }
}
