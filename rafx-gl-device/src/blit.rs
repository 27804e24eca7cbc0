use crate::backends::{gles_bindings, NONE_FRAMEBUFFER, NONE_VERTEX_ARRAY};
use crate::internal::FullscreenQuad;
use crate::{
    RafxBlendState, RafxCullMode, RafxDepthState, RafxDeviceGl, RafxDiagnosticLevel,
    RafxRenderTargetHandle, RafxResult,
};

impl RafxDeviceGl {
    fn reject_copy(
        &self,
        message: &str,
    ) -> RafxResult<bool> {
        self.diagnostics
            .report(RafxDiagnosticLevel::Error, format!("Copy rejected: {}", message));
        Ok(false)
    }

    /// Copies color and/or depth from `source` to `dest`. `None` on either side is the back
    /// buffer. Returns false if the copy was rejected, the reason is sent to the diagnostics
    /// channel.
    #[profiling::function]
    pub fn copy_render_target(
        &mut self,
        source: Option<RafxRenderTargetHandle>,
        dest: Option<RafxRenderTargetHandle>,
        color: bool,
        depth: bool,
    ) -> RafxResult<bool> {
        if self.observe_context_loss() {
            return Ok(false);
        }

        let result = self.copy_checked(source, dest, color, depth);
        self.absorb_context_loss(result, false)
    }

    fn copy_checked(
        &mut self,
        source: Option<RafxRenderTargetHandle>,
        dest: Option<RafxRenderTargetHandle>,
        color: bool,
        depth: bool,
    ) -> RafxResult<bool> {
        if source.is_none() && dest.is_none() {
            return self.reject_copy("source and destination are both the back buffer");
        }

        let source_target = match source {
            Some(handle) => match self.render_targets.get(handle.0) {
                Some(render_target) => Some(render_target),
                None => return self.reject_copy("source render target was destroyed"),
            },
            None => None,
        };
        let dest_target = match dest {
            Some(handle) => match self.render_targets.get(handle.0) {
                Some(render_target) => Some(render_target),
                None => return self.reject_copy("destination render target was destroyed"),
            },
            None => None,
        };

        if color {
            match (source_target, dest_target) {
                (Some(source_target), Some(dest_target)) => {
                    match (
                        source_target.color_formats.first(),
                        dest_target.color_formats.first(),
                    ) {
                        (Some(source_format), Some(dest_format)) => {
                            if source_format != dest_format {
                                return self.reject_copy(&format!(
                                    "color formats differ ({:?} and {:?})",
                                    source_format, dest_format
                                ));
                            }
                        }
                        _ => {
                            return self.reject_copy(
                                "source and destination both need a color buffer",
                            )
                        }
                    }
                }
                (Some(source_target), None) => {
                    if source_target.color_formats.is_empty() {
                        return self.reject_copy("source has no color buffer");
                    }
                }
                _ => {}
            }
        }

        if depth {
            if let Some(source_target) = source_target {
                if source_target.depth_buffer().is_some() {
                    let dest_format = dest_target.and_then(|x| x.depth_format);
                    if source_target.depth_format.is_none()
                        || source_target.depth_format != dest_format
                    {
                        return self.reject_copy("depth formats are missing or differ");
                    }
                }
            }
        }

        if self.capabilities.api_tier.is_gles3() && dest.is_some() {
            self.blit_render_target(source, dest, color, depth)
        } else {
            if depth {
                return self.reject_copy("depth copies need framebuffer blits");
            }
            match source {
                Some(source) => self.draw_copy_quad(source, dest),
                None => self.reject_copy("back buffer color cannot be read without framebuffer blits"),
            }
        }
    }

    fn blit_render_target(
        &mut self,
        source: Option<RafxRenderTargetHandle>,
        dest: Option<RafxRenderTargetHandle>,
        color: bool,
        depth: bool,
    ) -> RafxResult<bool> {
        for handle in source.iter().chain(dest.iter()) {
            if !self.ensure_render_target(*handle)? {
                return self.reject_copy("render target could not be initialized");
            }
        }

        let framebuffer_of = |handle: Option<RafxRenderTargetHandle>| {
            handle
                .and_then(|x| self.render_targets.get(x.0))
                .map(|x| (x.gl_framebuffer_id(), x.width, x.height))
        };

        let (read_framebuffer, source_size) = match framebuffer_of(source) {
            Some((framebuffer_id, width, height)) => (framebuffer_id, Some((width, height))),
            None => (Some(NONE_FRAMEBUFFER), None),
        };
        let (draw_framebuffer, width, height) = match framebuffer_of(dest) {
            Some((framebuffer_id, width, height)) => {
                let (width, height) = source_size.unwrap_or((width, height));
                (framebuffer_id, width, height)
            }
            None => return self.reject_copy("destination render target was destroyed"),
        };
        let (read_framebuffer, draw_framebuffer) = match (read_framebuffer, draw_framebuffer) {
            (Some(read_framebuffer), Some(draw_framebuffer)) => (read_framebuffer, draw_framebuffer),
            _ => return self.reject_copy("render target has no framebuffer"),
        };

        let mut mask = 0;
        if color {
            mask |= gles_bindings::COLOR_BUFFER_BIT;
        }
        if depth {
            mask |= gles_bindings::DEPTH_BUFFER_BIT;
        }
        if mask == 0 {
            return Ok(true);
        }

        let gl_context = &*self.gl_context;
        gl_context.gl_bind_framebuffer(gles_bindings::READ_FRAMEBUFFER, read_framebuffer)?;
        gl_context.gl_bind_framebuffer(gles_bindings::DRAW_FRAMEBUFFER, draw_framebuffer)?;
        gl_context.gl_blit_framebuffer(
            0,
            0,
            width as i32,
            height as i32,
            0,
            0,
            width as i32,
            height as i32,
            mask,
            gles_bindings::NEAREST,
        )?;
        self.state.invalidate_framebuffer();

        self.bind_render_target(self.current_render_target)?;
        Ok(true)
    }

    fn draw_copy_quad(
        &mut self,
        source: RafxRenderTargetHandle,
        dest: Option<RafxRenderTargetHandle>,
    ) -> RafxResult<bool> {
        if !self.ensure_render_target(source)? {
            return self.reject_copy("source render target could not be initialized");
        }

        let texture_id = self
            .render_targets
            .get(source.0)
            .and_then(|x| x.color_buffers().first().copied())
            .and_then(|x| self.textures.get(x.0))
            .and_then(|x| x.gl_texture_id());
        let texture_id = match texture_id {
            Some(texture_id) => texture_id,
            None => return self.reject_copy("source color texture has no GL object"),
        };

        let previous_render_target = self.current_render_target;
        let (width, height) = match self.bind_render_target(dest)? {
            Some(size) => size,
            None => return self.reject_copy("destination render target could not be initialized"),
        };
        self.current_render_target = previous_render_target;

        if self.fullscreen_quad.is_none() {
            self.fullscreen_quad = Some(FullscreenQuad::new(&*self.gl_context)?);
        }

        let scratch_unit = self.scratch_texture_unit();
        let max_vertex_attributes = self.capabilities.limits.max_vertex_attributes;
        let gl_context = &*self.gl_context;
        let state = &mut self.state;

        let viewport = state.viewport();
        let scissor = state.scissor();
        let depth_state = *state.depth_state();
        let blend_state = *state.blend_state();
        let cull_mode = state.cull_mode();

        let full_rect = [0, 0, width as i32, height as i32];
        state.set_viewport(gl_context, full_rect)?;
        state.set_scissor(gl_context, full_rect)?;
        state.set_depth_state(gl_context, &RafxDepthState::NO_TEST_NO_WRITE)?;
        state.set_blend_state(gl_context, &RafxBlendState::NO_BLEND)?;
        state.set_cull_mode(gl_context, RafxCullMode::None)?;
        state.bind_vertex_array(gl_context, NONE_VERTEX_ARRAY)?;
        state.set_active_unit(gl_context, scratch_unit)?;

        if let Some(fullscreen_quad) = &self.fullscreen_quad {
            fullscreen_quad.draw(gl_context, max_vertex_attributes, texture_id)?;
        }

        // The quad binds its own program and texture directly
        state.invalidate_texture_unit(scratch_unit);
        state.invalidate_program();

        state.set_viewport(gl_context, viewport)?;
        state.set_scissor(gl_context, scissor)?;
        state.set_depth_state(gl_context, &depth_state)?;
        state.set_blend_state(gl_context, &blend_state)?;
        state.set_cull_mode(gl_context, cull_mode)?;

        self.bind_render_target(self.current_render_target)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::backends::gles_bindings;
    use crate::backends::recording::{GlCall, RecordingGlConfig, RecordingGlContextProvider};
    use crate::{
        RafxDeviceDef, RafxDeviceGl, RafxPixelFormat, RafxQuirksTable, RafxRenderTargetDef,
        RafxRenderTargetHandle, RafxTextureDef,
    };

    fn create_device(config: RecordingGlConfig) -> (RecordingGlContextProvider, RafxDeviceGl) {
        let provider = RecordingGlContextProvider::new(config);
        let device_def = RafxDeviceDef {
            quirks: RafxQuirksTable::empty(),
            assert_on_programming_errors: false,
            ..Default::default()
        };
        let device = RafxDeviceGl::new(&provider, &device_def).unwrap();
        (provider, device)
    }

    fn create_target(
        device: &mut RafxDeviceGl,
        format: RafxPixelFormat,
    ) -> RafxRenderTargetHandle {
        let texture = device
            .create_texture(&RafxTextureDef {
                width: 32,
                height: 16,
                format,
                mipmaps: false,
                ..Default::default()
            })
            .unwrap();
        device
            .create_render_target(&RafxRenderTargetDef {
                color_buffers: vec![texture],
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn newer_tier_copies_with_blit() {
        let (provider, mut device) = create_device(RecordingGlConfig::gles3());
        let context = provider.last_context().unwrap();
        let source = create_target(&mut device, RafxPixelFormat::Rgba8);
        let dest = create_target(&mut device, RafxPixelFormat::Rgba8);

        assert!(device
            .copy_render_target(Some(source), Some(dest), true, false)
            .unwrap());
        assert!(context.calls().contains(&GlCall::BlitFramebuffer {
            width: 32,
            height: 16,
            mask: gles_bindings::COLOR_BUFFER_BIT,
            filter: gles_bindings::NEAREST,
        }));
    }

    #[test]
    fn older_tier_copies_color_with_quad() {
        let (provider, mut device) = create_device(RecordingGlConfig::gles2());
        let context = provider.last_context().unwrap();
        let source = create_target(&mut device, RafxPixelFormat::Rgba8);
        let dest = create_target(&mut device, RafxPixelFormat::Rgba8);
        let viewport = device.state_cache().viewport();

        let start = context.call_count();
        assert!(device
            .copy_render_target(Some(source), Some(dest), true, false)
            .unwrap());

        let calls = context.calls_since(start);
        assert!(calls.contains(&GlCall::DrawArrays {
            mode: gles_bindings::TRIANGLES,
            first: 0,
            count: 6,
        }));
        assert!(!calls
            .iter()
            .any(|x| matches!(x, GlCall::BlitFramebuffer { .. })));
        assert_eq!(device.state_cache().viewport(), viewport);
    }

    #[test]
    fn older_tier_rejects_depth_copy() {
        let (_provider, mut device) = create_device(RecordingGlConfig::gles2());
        let diagnostics = device.diagnostics_receiver();
        let source = create_target(&mut device, RafxPixelFormat::Rgba8);
        let dest = create_target(&mut device, RafxPixelFormat::Rgba8);

        assert!(!device
            .copy_render_target(Some(source), Some(dest), false, true)
            .unwrap());
        assert_eq!(diagnostics.try_iter().count(), 1);
    }

    #[test]
    fn mismatched_color_formats_are_rejected() {
        let (provider, mut device) = create_device(RecordingGlConfig::gles3());
        let context = provider.last_context().unwrap();
        let diagnostics = device.diagnostics_receiver();
        let source = create_target(&mut device, RafxPixelFormat::Rgba8);
        let dest = create_target(&mut device, RafxPixelFormat::Rgb8);

        let start = context.call_count();
        assert!(!device
            .copy_render_target(Some(source), Some(dest), true, false)
            .unwrap());
        assert_eq!(diagnostics.try_iter().count(), 1);
        assert!(context.calls_since(start).is_empty());
    }

    #[test]
    fn back_buffer_to_back_buffer_is_rejected() {
        let (_provider, mut device) = create_device(RecordingGlConfig::gles3());
        assert!(!device.copy_render_target(None, None, true, false).unwrap());
    }
}
