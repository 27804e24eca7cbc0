use crate::backends::gles_bindings;
use crate::backends::gles_bindings::types::GLenum;
use crate::backends::NONE_FRAMEBUFFER;
use crate::{
    RafxClearFlags, RafxClearOptions, RafxDeviceGl, RafxDiagnosticLevel, RafxRenderPassDef,
    RafxRenderTargetHandle, RafxResult,
};

impl RafxDeviceGl {
    pub fn is_inside_render_pass(&self) -> bool {
        self.active_render_pass.is_some()
    }

    /// Binds the render target (or the back buffer for `None`) and makes it the target of
    /// subsequent draws. Returns the size of the target, or None if the target no longer exists.
    pub(crate) fn bind_render_target(
        &mut self,
        render_target: Option<RafxRenderTargetHandle>,
    ) -> RafxResult<Option<(u32, u32)>> {
        self.current_render_target = render_target;
        let handle = match render_target {
            Some(handle) => handle,
            None => {
                self.state
                    .bind_framebuffer(&*self.gl_context, NONE_FRAMEBUFFER)?;
                return Ok(Some(self.gl_context.drawing_buffer_size()));
            }
        };

        if !self.ensure_render_target(handle)? {
            return Ok(None);
        }

        let render_target = match self.render_targets.get(handle.0) {
            Some(render_target) => render_target,
            None => return Ok(None),
        };
        let framebuffer_id = render_target
            .gl_framebuffer_id()
            .ok_or("Render target has no framebuffer")?;
        self.state
            .bind_framebuffer(&*self.gl_context, framebuffer_id)?;
        Ok(Some((render_target.width(), render_target.height())))
    }

    /// Enters a render pass: binds the target, covers it with the viewport and scissor, and
    /// performs the requested clears. Starting a pass inside another pass is a programming error.
    #[profiling::function]
    pub fn start_render_pass(
        &mut self,
        render_pass_def: &RafxRenderPassDef,
    ) -> RafxResult<()> {
        if self.active_render_pass.is_some() {
            self.report_programming_error(
                "Render pass started while another render pass is active".to_string(),
            );
        }

        self.active_render_pass = Some(render_pass_def.clone());
        if self.observe_context_loss() {
            return Ok(());
        }

        let result = self.enter_render_pass(render_pass_def);
        self.absorb_context_loss(result, ())
    }

    fn enter_render_pass(
        &mut self,
        render_pass_def: &RafxRenderPassDef,
    ) -> RafxResult<()> {
        let (width, height) = match self.bind_render_target(render_pass_def.render_target)? {
            Some(size) => size,
            None => {
                self.diagnostics.report(
                    RafxDiagnosticLevel::Error,
                    format!(
                        "Render pass target {:?} is not usable",
                        render_pass_def.render_target
                    ),
                );
                return Ok(());
            }
        };

        let gl_context = &*self.gl_context;
        let full_rect = [0, 0, width as i32, height as i32];
        self.state.set_viewport(gl_context, full_rect)?;
        self.state.set_scissor(gl_context, full_rect)?;

        let mut clear_options = RafxClearOptions::default();
        let mut flags = RafxClearFlags::empty();
        if let Some(color_ops) = render_pass_def.primary_color_ops() {
            if color_ops.clear {
                flags |= RafxClearFlags::COLOR;
                clear_options.color = Some(color_ops.clear_value.0);
            }
        }

        let depth_stencil_ops = &render_pass_def.depth_stencil_ops;
        if depth_stencil_ops.clear_depth {
            flags |= RafxClearFlags::DEPTH;
            clear_options.depth = Some(depth_stencil_ops.clear_depth_value);
        }
        if depth_stencil_ops.clear_stencil {
            flags |= RafxClearFlags::STENCIL;
            clear_options.stencil = Some(depth_stencil_ops.clear_stencil_value);
        }

        if !flags.is_empty() {
            clear_options.flags = Some(flags);
            self.clear(&clear_options)?;
        }

        self.stats.frame.render_passes += 1;
        Ok(())
    }

    /// Leaves the render pass: invalidates attachments that are neither stored nor resolved,
    /// resolves multisampled color and regenerates color mipmaps as requested.
    #[profiling::function]
    pub fn end_render_pass(&mut self) -> RafxResult<()> {
        let render_pass_def = match self.active_render_pass.take() {
            Some(render_pass_def) => render_pass_def,
            None => {
                self.report_programming_error(
                    "Render pass ended while no render pass is active".to_string(),
                );
                return Ok(());
            }
        };

        if self.observe_context_loss() {
            return Ok(());
        }

        let result = self.leave_render_pass(&render_pass_def);
        self.absorb_context_loss(result, ())
    }

    fn leave_render_pass(
        &mut self,
        render_pass_def: &RafxRenderPassDef,
    ) -> RafxResult<()> {
        // The back buffer has nothing to invalidate, resolve or mipmap
        let handle = match render_pass_def.render_target {
            Some(handle) => handle,
            None => return Ok(()),
        };

        let scratch_unit = self.scratch_texture_unit();
        let gles3 = self.capabilities.api_tier.is_gles3();
        let gl_context = &*self.gl_context;
        let render_target = match self.render_targets.get(handle.0) {
            Some(render_target) if render_target.is_initialized() => render_target,
            _ => return Ok(()),
        };

        let primary_color_ops = render_pass_def
            .primary_color_ops()
            .copied()
            .unwrap_or_default();

        if gles3 {
            let mut attachments: Vec<GLenum> = Vec::default();
            for index in 0..render_target.color_buffers().len() {
                let color_ops = render_pass_def
                    .color_ops
                    .get(index)
                    .copied()
                    .unwrap_or_default();
                if !(color_ops.store || color_ops.resolve) {
                    attachments.push(gles_bindings::COLOR_ATTACHMENT0 + index as u32);
                }
            }

            let depth_stencil_ops = &render_pass_def.depth_stencil_ops;
            if render_target.has_depth() && !depth_stencil_ops.store_depth {
                attachments.push(gles_bindings::DEPTH_ATTACHMENT);
            }
            if render_target.has_stencil() && !depth_stencil_ops.store_stencil {
                attachments.push(gles_bindings::STENCIL_ATTACHMENT);
            }

            if !attachments.is_empty() {
                gl_context.gl_invalidate_framebuffer(gles_bindings::DRAW_FRAMEBUFFER, &attachments)?;
            }
        }

        if primary_color_ops.resolve
            && gles3
            && render_target.samples() > 1
            && render_target.render_target_def().auto_resolve
        {
            render_target.resolve(gl_context, &mut self.state, true, false)?;
        }

        if primary_color_ops.mipmaps {
            let textures = &mut self.textures;
            let color_texture = render_target
                .color_buffers()
                .first()
                .and_then(|x| textures.get_mut(x.0));
            if let Some(texture) = color_texture {
                let generate = texture.def.mipmaps && (texture.def.is_pot() || gles3);
                if let (Some(texture_id), true) = (texture.texture_id, generate) {
                    self.state
                        .bind_texture(gl_context, scratch_unit, texture.gl_target, texture_id)?;
                    self.state.set_active_unit(gl_context, scratch_unit)?;
                    gl_context.gl_generate_mipmap(texture.gl_target)?;
                    texture.mipmaps_uploaded = true;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::backends::gles_bindings;
    use crate::backends::recording::{GlCall, RecordingGlConfig, RecordingGlContextProvider};
    use crate::{
        RafxColorAttachmentOps, RafxColorClearValue, RafxDepthStencilAttachmentOps,
        RafxDeviceDef, RafxDeviceGl, RafxPixelFormat, RafxQuirksTable, RafxRenderPassDef,
        RafxRenderTargetDef, RafxTextureDef,
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

    fn color_texture_def(
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
    fn back_buffer_pass_covers_drawing_buffer() {
        let (provider, mut device) = create_device(RecordingGlConfig::gles3());
        let context = provider.last_context().unwrap();
        device.resize_canvas(320, 200);

        let start = context.call_count();
        device
            .start_render_pass(&RafxRenderPassDef {
                render_target: None,
                color_ops: vec![RafxColorAttachmentOps {
                    clear: true,
                    clear_value: RafxColorClearValue([0.25, 0.5, 0.75, 1.0]),
                    ..Default::default()
                }],
                depth_stencil_ops: RafxDepthStencilAttachmentOps {
                    clear_depth: true,
                    ..Default::default()
                },
            })
            .unwrap();
        device.end_render_pass().unwrap();

        let calls = context.calls_since(start);
        assert!(calls.contains(&GlCall::Viewport(0, 0, 320, 200)));
        assert!(calls.contains(&GlCall::ClearColor([0.25, 0.5, 0.75, 1.0])));
        assert!(calls.contains(&GlCall::Clear(
            gles_bindings::COLOR_BUFFER_BIT | gles_bindings::DEPTH_BUFFER_BIT
        )));
        assert!(!calls
            .iter()
            .any(|x| matches!(x, GlCall::InvalidateFramebuffer(..))));
        assert_eq!(device.stats().frame.render_passes, 1);
    }

    #[test]
    fn unstored_attachments_are_invalidated() {
        let (provider, mut device) = create_device(RecordingGlConfig::gles3());
        let context = provider.last_context().unwrap();
        let texture = device.create_texture(&color_texture_def(64, 64)).unwrap();
        let render_target = device
            .create_render_target(&RafxRenderTargetDef {
                color_buffers: vec![texture],
                ..Default::default()
            })
            .unwrap();

        device
            .start_render_pass(&RafxRenderPassDef {
                render_target: Some(render_target),
                color_ops: vec![RafxColorAttachmentOps {
                    store: true,
                    ..Default::default()
                }],
                depth_stencil_ops: Default::default(),
            })
            .unwrap();
        let start = context.call_count();
        device.end_render_pass().unwrap();

        assert_eq!(
            context.calls_since(start),
            vec![GlCall::InvalidateFramebuffer(
                gles_bindings::DRAW_FRAMEBUFFER,
                vec![gles_bindings::DEPTH_ATTACHMENT]
            )]
        );
    }

    #[test]
    fn mipmaps_regenerate_on_newer_tier_only_for_pot_on_older() {
        for (config, width, expected) in vec![
            (RecordingGlConfig::gles3(), 48, true),
            (RecordingGlConfig::gles2(), 48, false),
            (RecordingGlConfig::gles2(), 64, true),
        ] {
            let (provider, mut device) = create_device(config);
            let context = provider.last_context().unwrap();
            let texture = device.create_texture(&color_texture_def(width, 32)).unwrap();
            let render_target = device
                .create_render_target(&RafxRenderTargetDef {
                    color_buffers: vec![texture],
                    ..Default::default()
                })
                .unwrap();

            device
                .start_render_pass(&RafxRenderPassDef {
                    render_target: Some(render_target),
                    color_ops: vec![RafxColorAttachmentOps {
                        store: true,
                        mipmaps: true,
                        ..Default::default()
                    }],
                    depth_stencil_ops: Default::default(),
                })
                .unwrap();
            let start = context.call_count();
            device.end_render_pass().unwrap();

            let generated = context
                .calls_since(start)
                .contains(&GlCall::GenerateMipmap(gles_bindings::TEXTURE_2D));
            assert_eq!(generated, expected, "width {}", width);
        }
    }

    #[test]
    fn nested_render_pass_is_reported() {
        let (_provider, mut device) = create_device(RecordingGlConfig::gles3());
        let diagnostics = device.diagnostics_receiver();
        device
            .start_render_pass(&RafxRenderPassDef::default())
            .unwrap();
        device
            .start_render_pass(&RafxRenderPassDef::default())
            .unwrap();
        device.end_render_pass().unwrap();
        device.end_render_pass().unwrap();

        assert_eq!(diagnostics.try_iter().count(), 2);
    }

    #[test]
    #[should_panic]
    fn nested_render_pass_asserts_when_requested() {
        let provider = RecordingGlContextProvider::new(RecordingGlConfig::gles3());
        let device_def = RafxDeviceDef {
            quirks: RafxQuirksTable::empty(),
            assert_on_programming_errors: true,
            ..Default::default()
        };
        let mut device = RafxDeviceGl::new(&provider, &device_def).unwrap();
        device
            .start_render_pass(&RafxRenderPassDef::default())
            .unwrap();
        let _ = device.start_render_pass(&RafxRenderPassDef::default());
    }
}
