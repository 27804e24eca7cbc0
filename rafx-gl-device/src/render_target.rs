use crate::backends::gles_bindings;
use crate::backends::gles_bindings::types::GLenum;
use crate::backends::{FramebufferId, GlContext, RenderbufferId, TextureId};
use crate::internal::ResourceSlabKey;
use crate::{
    RafxCapabilities, RafxDiagnosticLevel, RafxDiagnostics, RafxPixelFormat, RafxRenderTargetDef,
    RafxResult, RafxStateCache, RafxTextureHandle,
};

/// Handle to a render target owned by a `RafxDeviceGl`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RafxRenderTargetHandle(pub(crate) ResourceSlabKey<RafxRenderTargetGl>);

/// A texture resolved for attachment to a framebuffer
#[derive(Copy, Clone, Debug)]
pub(crate) struct RafxAttachmentInfo {
    pub(crate) texture_id: TextureId,
    /// `TEXTURE_2D`, or the face target of a cubemap
    pub(crate) texture_target: GLenum,
    pub(crate) internal_format: GLenum,
    pub(crate) format: RafxPixelFormat,
}

#[derive(Debug)]
struct MultisampleFramebuffer {
    framebuffer_id: FramebufferId,
    color_renderbuffers: Vec<RenderbufferId>,
    depth_renderbuffer: Option<RenderbufferId>,
}

fn framebuffer_status_name(status: u32) -> &'static str {
    match status {
        gles_bindings::FRAMEBUFFER_INCOMPLETE_ATTACHMENT => "FRAMEBUFFER_INCOMPLETE_ATTACHMENT",
        gles_bindings::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT => {
            "FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT"
        }
        gles_bindings::FRAMEBUFFER_INCOMPLETE_DIMENSIONS => "FRAMEBUFFER_INCOMPLETE_DIMENSIONS",
        gles_bindings::FRAMEBUFFER_UNSUPPORTED => "FRAMEBUFFER_UNSUPPORTED",
        _ => "unknown status",
    }
}

fn color_attachment(index: usize) -> GLenum {
    gles_bindings::COLOR_ATTACHMENT0 + index as GLenum
}

/// Color and depth attachments plus the framebuffer(s) that render to them. Framebuffers are
/// created on first use and dropped on context loss.
#[derive(Debug)]
pub struct RafxRenderTargetGl {
    pub(crate) def: RafxRenderTargetDef,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) samples: u32,
    pub(crate) color_formats: Vec<RafxPixelFormat>,
    pub(crate) depth_format: Option<RafxPixelFormat>,
    framebuffer_id: Option<FramebufferId>,
    depth_renderbuffer: Option<RenderbufferId>,
    multisample: Option<MultisampleFramebuffer>,
}

impl RafxRenderTargetGl {
    pub(crate) fn new(
        def: RafxRenderTargetDef,
        width: u32,
        height: u32,
        samples: u32,
        color_formats: Vec<RafxPixelFormat>,
        depth_format: Option<RafxPixelFormat>,
    ) -> Self {
        RafxRenderTargetGl {
            def,
            width,
            height,
            samples,
            color_formats,
            depth_format,
            framebuffer_id: None,
            depth_renderbuffer: None,
            multisample: None,
        }
    }

    pub fn render_target_def(&self) -> &RafxRenderTargetDef {
        &self.def
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Effective sample count after clamping to the device maximum
    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn color_buffers(&self) -> &[RafxTextureHandle] {
        &self.def.color_buffers
    }

    pub fn depth_buffer(&self) -> Option<RafxTextureHandle> {
        self.def.depth_buffer
    }

    pub fn has_depth(&self) -> bool {
        self.def.depth || self.def.depth_buffer.is_some()
    }

    pub fn has_stencil(&self) -> bool {
        match self.depth_format {
            Some(format) => format.has_stencil(),
            None => self.def.depth && self.def.stencil,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.framebuffer_id.is_some()
    }

    /// Framebuffer that draws go to. The multisampled one when the target is multisampled.
    pub fn gl_framebuffer_id(&self) -> Option<FramebufferId> {
        match &self.multisample {
            Some(multisample) => Some(multisample.framebuffer_id),
            None => self.framebuffer_id,
        }
    }

    /// Framebuffer holding the attached textures
    pub fn gl_resolve_framebuffer_id(&self) -> Option<FramebufferId> {
        self.framebuffer_id
    }

    pub fn is_multisampled(&self) -> bool {
        self.multisample.is_some()
    }

    fn implicit_depth_format(
        &self,
        gles3: bool,
    ) -> (GLenum, GLenum) {
        match (self.def.stencil, gles3) {
            (true, true) => (
                gles_bindings::DEPTH24_STENCIL8,
                gles_bindings::DEPTH_STENCIL_ATTACHMENT,
            ),
            (true, false) => (
                gles_bindings::DEPTH_STENCIL,
                gles_bindings::DEPTH_STENCIL_ATTACHMENT,
            ),
            (false, true) => (
                gles_bindings::DEPTH_COMPONENT24,
                gles_bindings::DEPTH_ATTACHMENT,
            ),
            (false, false) => (
                gles_bindings::DEPTH_COMPONENT16,
                gles_bindings::DEPTH_ATTACHMENT,
            ),
        }
    }

    fn set_draw_buffers(
        gl_context: &dyn GlContext,
        color_count: usize,
    ) -> RafxResult<()> {
        if color_count > 1 {
            let buffers: Vec<GLenum> = (0..color_count).map(color_attachment).collect();
            gl_context.gl_draw_buffers(&buffers)?;
        }
        Ok(())
    }

    fn check_status(
        &self,
        gl_context: &dyn GlContext,
        diagnostics: &RafxDiagnostics,
    ) -> RafxResult<()> {
        let status = gl_context.gl_check_framebuffer_status(gles_bindings::FRAMEBUFFER)?;
        if status != gles_bindings::FRAMEBUFFER_COMPLETE {
            diagnostics.report(
                RafxDiagnosticLevel::Error,
                format!(
                    "Framebuffer of render target {:?} is incomplete: {}",
                    self.def.name,
                    framebuffer_status_name(status)
                ),
            );
        }
        Ok(())
    }

    /// Creates the framebuffers. The attached textures must already have storage. Leaves the
    /// rendering framebuffer bound.
    #[profiling::function]
    pub(crate) fn init(
        &mut self,
        gl_context: &dyn GlContext,
        capabilities: &RafxCapabilities,
        state: &mut RafxStateCache,
        colors: &[RafxAttachmentInfo],
        depth: Option<RafxAttachmentInfo>,
        diagnostics: &RafxDiagnostics,
    ) -> RafxResult<()> {
        let gles3 = capabilities.api_tier.is_gles3();
        let multisampled = self.samples > 1 && gles3;

        let framebuffer_id = gl_context.gl_create_framebuffer()?;
        self.framebuffer_id = Some(framebuffer_id);
        state.bind_framebuffer(gl_context, framebuffer_id)?;

        for (index, color) in colors.iter().enumerate() {
            gl_context.gl_framebuffer_texture_2d(
                gles_bindings::FRAMEBUFFER,
                color_attachment(index),
                color.texture_target,
                color.texture_id,
                0,
            )?;
        }
        Self::set_draw_buffers(gl_context, colors.len())?;

        if let Some(depth) = depth {
            let attachment = if depth.format.has_stencil() {
                gles_bindings::DEPTH_STENCIL_ATTACHMENT
            } else {
                gles_bindings::DEPTH_ATTACHMENT
            };
            gl_context.gl_framebuffer_texture_2d(
                gles_bindings::FRAMEBUFFER,
                attachment,
                depth.texture_target,
                depth.texture_id,
                0,
            )?;
        } else if self.def.depth && !multisampled {
            let (internal_format, attachment) = self.implicit_depth_format(gles3);
            let renderbuffer_id = gl_context.gl_create_renderbuffer()?;
            gl_context.gl_bind_renderbuffer(gles_bindings::RENDERBUFFER, renderbuffer_id)?;
            gl_context.gl_renderbuffer_storage(
                gles_bindings::RENDERBUFFER,
                internal_format,
                self.width,
                self.height,
            )?;
            gl_context.gl_framebuffer_renderbuffer(
                gles_bindings::FRAMEBUFFER,
                attachment,
                gles_bindings::RENDERBUFFER,
                renderbuffer_id,
            )?;
            self.depth_renderbuffer = Some(renderbuffer_id);
        }

        self.check_status(gl_context, diagnostics)?;

        if multisampled {
            let msaa_framebuffer_id = gl_context.gl_create_framebuffer()?;
            state.bind_framebuffer(gl_context, msaa_framebuffer_id)?;

            let mut color_renderbuffers = Vec::with_capacity(colors.len());
            for (index, color) in colors.iter().enumerate() {
                let renderbuffer_id = gl_context.gl_create_renderbuffer()?;
                gl_context.gl_bind_renderbuffer(gles_bindings::RENDERBUFFER, renderbuffer_id)?;
                gl_context.gl_renderbuffer_storage_multisample(
                    gles_bindings::RENDERBUFFER,
                    self.samples,
                    color.internal_format,
                    self.width,
                    self.height,
                )?;
                gl_context.gl_framebuffer_renderbuffer(
                    gles_bindings::FRAMEBUFFER,
                    color_attachment(index),
                    gles_bindings::RENDERBUFFER,
                    renderbuffer_id,
                )?;
                color_renderbuffers.push(renderbuffer_id);
            }
            Self::set_draw_buffers(gl_context, colors.len())?;

            let mut depth_renderbuffer = None;
            if self.has_depth() {
                let (internal_format, attachment) = match self.depth_format {
                    Some(format) if format.has_stencil() => (
                        gles_bindings::DEPTH24_STENCIL8,
                        gles_bindings::DEPTH_STENCIL_ATTACHMENT,
                    ),
                    Some(_) => (
                        gles_bindings::DEPTH_COMPONENT24,
                        gles_bindings::DEPTH_ATTACHMENT,
                    ),
                    None => self.implicit_depth_format(gles3),
                };
                let renderbuffer_id = gl_context.gl_create_renderbuffer()?;
                gl_context.gl_bind_renderbuffer(gles_bindings::RENDERBUFFER, renderbuffer_id)?;
                gl_context.gl_renderbuffer_storage_multisample(
                    gles_bindings::RENDERBUFFER,
                    self.samples,
                    internal_format,
                    self.width,
                    self.height,
                )?;
                gl_context.gl_framebuffer_renderbuffer(
                    gles_bindings::FRAMEBUFFER,
                    attachment,
                    gles_bindings::RENDERBUFFER,
                    renderbuffer_id,
                )?;
                depth_renderbuffer = Some(renderbuffer_id);
            }

            self.check_status(gl_context, diagnostics)?;
            self.multisample = Some(MultisampleFramebuffer {
                framebuffer_id: msaa_framebuffer_id,
                color_renderbuffers,
                depth_renderbuffer,
            });
        }

        log::trace!(
            "Created framebuffer for render target {:?} ({}x{}, {} samples)",
            self.def.name,
            self.width,
            self.height,
            self.samples
        );
        Ok(())
    }

    /// Copies the multisampled color (and optionally depth) into the attached textures
    pub(crate) fn resolve(
        &self,
        gl_context: &dyn GlContext,
        state: &mut RafxStateCache,
        color: bool,
        depth: bool,
    ) -> RafxResult<()> {
        let (multisample, framebuffer_id) = match (&self.multisample, self.framebuffer_id) {
            (Some(multisample), Some(framebuffer_id)) => (multisample, framebuffer_id),
            _ => return Ok(()),
        };

        let mut mask = 0;
        if color && !self.color_formats.is_empty() {
            mask |= gles_bindings::COLOR_BUFFER_BIT;
        }
        if depth && self.has_depth() {
            mask |= gles_bindings::DEPTH_BUFFER_BIT;
        }
        if mask == 0 {
            return Ok(());
        }

        gl_context.gl_bind_framebuffer(gles_bindings::READ_FRAMEBUFFER, multisample.framebuffer_id)?;
        gl_context.gl_bind_framebuffer(gles_bindings::DRAW_FRAMEBUFFER, framebuffer_id)?;
        let width = self.width as i32;
        let height = self.height as i32;
        gl_context.gl_blit_framebuffer(
            0,
            0,
            width,
            height,
            0,
            0,
            width,
            height,
            mask,
            gles_bindings::NEAREST,
        )?;

        // Read and draw bindings were changed directly
        state.invalidate_framebuffer();
        Ok(())
    }

    pub(crate) fn lose_context(&mut self) {
        self.framebuffer_id = None;
        self.depth_renderbuffer = None;
        self.multisample = None;
    }

    pub(crate) fn destroy(
        &mut self,
        gl_context: &dyn GlContext,
        state: &mut RafxStateCache,
    ) -> RafxResult<()> {
        let framebuffers = [
            self.framebuffer_id.take(),
            self.multisample.as_ref().map(|x| x.framebuffer_id),
        ];
        for framebuffer_id in framebuffers.iter().flatten() {
            if state.framebuffer() == Some(*framebuffer_id) {
                state.invalidate_framebuffer();
            }
            gl_context.gl_destroy_framebuffer(*framebuffer_id)?;
        }

        if let Some(renderbuffer_id) = self.depth_renderbuffer.take() {
            gl_context.gl_destroy_renderbuffer(renderbuffer_id)?;
        }

        if let Some(multisample) = self.multisample.take() {
            for renderbuffer_id in multisample.color_renderbuffers {
                gl_context.gl_destroy_renderbuffer(renderbuffer_id)?;
            }
            if let Some(renderbuffer_id) = multisample.depth_renderbuffer {
                gl_context.gl_destroy_renderbuffer(renderbuffer_id)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::recording::{GlCall, RecordingGlConfig, RecordingGlContext};
    use crate::RafxQuirksTable;

    fn color(texture_id: u32) -> RafxAttachmentInfo {
        RafxAttachmentInfo {
            texture_id: TextureId(texture_id),
            texture_target: gles_bindings::TEXTURE_2D,
            internal_format: gles_bindings::RGBA8,
            format: RafxPixelFormat::Rgba8,
        }
    }

    fn setup(config: RecordingGlConfig) -> (RecordingGlContext, RafxCapabilities, RafxStateCache) {
        let context = RecordingGlContext::new(config);
        let capabilities =
            RafxCapabilities::probe(&context, &RafxQuirksTable::empty(), None).unwrap();
        let state = RafxStateCache::new(capabilities.limits.max_combined_textures);
        (context, capabilities, state)
    }

    #[test]
    fn multiple_color_attachments_use_draw_buffers() {
        let (context, capabilities, mut state) = setup(RecordingGlConfig::gles3());
        let mut render_target = RafxRenderTargetGl::new(
            RafxRenderTargetDef::default(),
            64,
            64,
            1,
            vec![RafxPixelFormat::Rgba8; 2],
            None,
        );
        render_target
            .init(
                &context,
                &capabilities,
                &mut state,
                &[color(100), color(101)],
                None,
                &RafxDiagnostics::default(),
            )
            .unwrap();

        let calls = context.calls();
        assert!(calls.contains(&GlCall::DrawBuffers(vec![
            gles_bindings::COLOR_ATTACHMENT0,
            gles_bindings::COLOR_ATTACHMENT0 + 1
        ])));
        assert!(calls.contains(&GlCall::RenderbufferStorage {
            internal_format: gles_bindings::DEPTH_COMPONENT24,
            width: 64,
            height: 64,
        }));
        assert!(!render_target.is_multisampled());
        assert_eq!(
            render_target.gl_framebuffer_id(),
            render_target.gl_resolve_framebuffer_id()
        );
    }

    #[test]
    fn multisampled_target_resolves_with_blit() {
        let (context, capabilities, mut state) = setup(RecordingGlConfig::gles3());
        let mut def = RafxRenderTargetDef::default();
        def.stencil = true;
        let mut render_target =
            RafxRenderTargetGl::new(def, 32, 16, 4, vec![RafxPixelFormat::Rgba8], None);
        render_target
            .init(
                &context,
                &capabilities,
                &mut state,
                &[color(100)],
                None,
                &RafxDiagnostics::default(),
            )
            .unwrap();

        assert!(render_target.is_multisampled());
        assert!(context.calls().contains(&GlCall::RenderbufferStorageMultisample {
            samples: 4,
            internal_format: gles_bindings::DEPTH24_STENCIL8,
            width: 32,
            height: 16,
        }));

        let start = context.call_count();
        render_target
            .resolve(&context, &mut state, true, false)
            .unwrap();
        assert!(context.calls_since(start).contains(&GlCall::BlitFramebuffer {
            width: 32,
            height: 16,
            mask: gles_bindings::COLOR_BUFFER_BIT,
            filter: gles_bindings::NEAREST,
        }));
        assert_eq!(state.framebuffer(), None);

        render_target.destroy(&context, &mut state).unwrap();
        assert_eq!(context.live_framebuffer_count(), 0);
    }

    #[test]
    fn older_tier_depth_stencil_renderbuffer() {
        let (context, capabilities, mut state) = setup(RecordingGlConfig::gles2());
        let mut def = RafxRenderTargetDef::default();
        def.stencil = true;
        let mut render_target =
            RafxRenderTargetGl::new(def, 8, 8, 1, vec![RafxPixelFormat::Rgba8], None);
        render_target
            .init(
                &context,
                &capabilities,
                &mut state,
                &[color(100)],
                None,
                &RafxDiagnostics::default(),
            )
            .unwrap();

        assert!(context.calls().contains(&GlCall::FramebufferRenderbuffer {
            attachment: gles_bindings::DEPTH_STENCIL_ATTACHMENT,
            renderbuffer_id: render_target.depth_renderbuffer.unwrap(),
        }));
        assert!(render_target.has_stencil());
    }
}
