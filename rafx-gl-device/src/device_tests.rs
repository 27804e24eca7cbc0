//! Scenarios that go through the whole device against the recording context

use crate::backends::gles_bindings;
use crate::backends::recording::{
    GlCall, RecordedLevelContent, RecordingGlConfig, RecordingGlContext,
    RecordingGlContextProvider,
};
use crate::{
    RafxApiTier, RafxBlendState, RafxBufferUsage, RafxColorAttachmentOps, RafxContextState,
    RafxDepthState, RafxDeviceDef, RafxDeviceEvent, RafxDeviceGl, RafxError, RafxIndexBufferDef,
    RafxIndexType, RafxPixelFormat, RafxPrimitive, RafxPrimitiveType, RafxQuirksTable, RafxRenderPassDef, RafxRenderTargetDef,
    RafxShaderDef, RafxShaderStatus, RafxTextureDef, RafxTextureSource, RafxUniformValue,
    RafxVertexBufferDef, RafxVertexComponentType, RafxVertexElement, RafxVertexLayout,
    RafxVertexSemantic,
};

const VERTEX_SOURCE: &str = "attribute vec2 vertex_position;
void main() {
    gl_Position = vec4(vertex_position, 0.0, 1.0);
}
";

const TEXTURED_FRAGMENT_SOURCE: &str = "precision mediump float;
uniform sampler2D texture_diffuse;
void main() {
    gl_FragColor = texture2D(texture_diffuse, vec2(0.5));
}
";

const FIREFOX_WINDOWS: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0";
const FIREFOX_LINUX: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0";

fn test_device_def() -> RafxDeviceDef {
    RafxDeviceDef {
        quirks: RafxQuirksTable::empty(),
        assert_on_programming_errors: false,
        ..Default::default()
    }
}

fn create_device(config: RecordingGlConfig) -> (RecordingGlContext, RafxDeviceGl) {
    let _ = env_logger::builder().is_test(true).try_init();
    let provider = RecordingGlContextProvider::new(config);
    let device = RafxDeviceGl::new(&provider, &test_device_def()).unwrap();
    (provider.last_context().unwrap(), device)
}

fn textured_shader() -> RafxShaderDef {
    RafxShaderDef {
        name: "textured".to_string(),
        vertex_source: VERTEX_SOURCE.to_string(),
        fragment_source: TEXTURED_FRAGMENT_SOURCE.to_string(),
        attributes: vec![("vertex_position".to_string(), RafxVertexSemantic::Position)],
    }
}

fn quad_buffer_def() -> RafxVertexBufferDef {
    RafxVertexBufferDef {
        layout: RafxVertexLayout {
            elements: vec![RafxVertexElement {
                semantic: RafxVertexSemantic::Position,
                component_count: 2,
                component_type: RafxVertexComponentType::Float32,
                normalize: false,
                byte_offset: 0,
            }],
            stride: 8,
            instancing: false,
        },
        usage: RafxBufferUsage::Static,
    }
}

fn small_texture_def() -> RafxTextureDef {
    RafxTextureDef {
        width: 2,
        height: 2,
        format: RafxPixelFormat::Rgba8,
        mipmaps: false,
        ..Default::default()
    }
}

fn triangles(count: u32) -> RafxPrimitive {
    RafxPrimitive {
        primitive_type: RafxPrimitiveType::Triangles,
        base: 0,
        count,
        indexed: false,
    }
}

#[test]
fn falls_back_to_older_tier() {
    let provider = RecordingGlContextProvider::new(RecordingGlConfig::gles2());
    let device = RafxDeviceGl::new(&provider, &test_device_def()).unwrap();
    assert_eq!(device.api_tier(), RafxApiTier::Gles2);
}

#[test]
fn no_context_is_an_error() {
    let provider = RecordingGlContextProvider::unavailable();
    let result = RafxDeviceGl::new(&provider, &test_device_def());
    assert!(matches!(result, Err(RafxError::ContextUnavailable(_))));
}

#[test]
fn quirks_veto_antialiasing_before_context_creation() {
    for (user_agent, antialias) in vec![(FIREFOX_WINDOWS, false), (FIREFOX_LINUX, true)] {
        let mut config = RecordingGlConfig::gles3();
        config.user_agent = Some(user_agent.to_string());
        let provider = RecordingGlContextProvider::new(config);
        let device_def = RafxDeviceDef {
            quirks: RafxQuirksTable::legacy_defaults(),
            assert_on_programming_errors: false,
            ..Default::default()
        };
        let _device = RafxDeviceGl::new(&provider, &device_def).unwrap();
        assert_eq!(
            provider.last_attributes().unwrap().antialias,
            antialias,
            "{}",
            user_agent
        );
    }
}

#[test]
fn resize_emits_one_event_per_change() {
    let (context, mut device) = create_device(RecordingGlConfig::gles3());
    let events = device.event_receiver();

    device.resize_canvas(800, 600);
    device.resize_canvas(800, 600);

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![RafxDeviceEvent::Resized {
            width: 800,
            height: 600
        }]
    );
    assert_eq!(crate::backends::GlContext::drawing_buffer_size(&context), (800, 600));
}

#[test]
fn image_bitmap_support_arrives_asynchronously() {
    let (context, device) = create_device(RecordingGlConfig::gles3());
    assert!(!device.supports_image_bitmap());
    context.resolve_image_bitmap_probes(true);
    assert!(device.supports_image_bitmap());
}

#[test]
fn repeated_state_is_not_resent() {
    let (context, mut device) = create_device(RecordingGlConfig::gles3());
    let blend_state = RafxBlendState::ALPHA_BLEND;

    device.set_blend_state(&blend_state).unwrap();
    let start = context.call_count();
    device.set_blend_state(&blend_state).unwrap();
    device.set_viewport(0, 0, 640, 480).unwrap();
    assert_eq!(context.call_count(), start);

    // Depth writes only happen with the test enabled, so the cache holds the compensated state
    device
        .set_depth_state(&RafxDepthState {
            test: false,
            write: true,
            ..Default::default()
        })
        .unwrap();
    let depth_state = device.state_cache().depth_state();
    assert!(depth_state.test);
    assert!(depth_state.write);
    assert_eq!(depth_state.func, crate::RafxCompareOp::Always);
}

#[test]
fn texture_upload_happens_once() {
    let (context, mut device) = create_device(RecordingGlConfig::gles3());
    let texture = device.create_texture(&small_texture_def()).unwrap();
    device
        .set_texture_level(texture, 0, 0, RafxTextureSource::Bytes(vec![9; 16]))
        .unwrap();

    assert!(device.upload_texture(texture).unwrap());
    let start = context.call_count();
    assert!(device.upload_texture(texture).unwrap());
    assert!(!context
        .calls_since(start)
        .iter()
        .any(|x| x.is_texture_upload()));

    let texture_id = device.texture(texture).unwrap().gl_texture_id().unwrap();
    let recorded = context.texture(texture_id).unwrap();
    assert_eq!(
        recorded.level(gles_bindings::TEXTURE_2D, 0).unwrap().content,
        RecordedLevelContent::Data(vec![9; 16])
    );
}

#[test]
fn draw_without_sampler_texture_is_skipped_and_reported_once() {
    let (context, mut device) = create_device(RecordingGlConfig::gles3());
    let diagnostics = device.diagnostics_receiver();
    let shader = device.create_shader(&textured_shader());
    let vertices = device
        .create_vertex_buffer(&quad_buffer_def(), vec![0; 24])
        .unwrap();
    device.set_shader(shader).unwrap();
    device.set_vertex_buffer(vertices);

    assert!(!device.draw(&triangles(3), None, true).unwrap());
    assert!(!device.draw(&triangles(3), None, true).unwrap());
    assert!(!context.calls().iter().any(|x| x.is_draw()));
    assert_eq!(diagnostics.try_iter().count(), 1);

    let texture = device.create_texture(&small_texture_def()).unwrap();
    device.set_uniform("texture_diffuse", RafxUniformValue::Texture(texture));
    assert!(device.draw(&triangles(3), None, false).unwrap());
    assert_eq!(context.calls().iter().filter(|x| x.is_draw()).count(), 1);
}

#[test]
fn vram_returns_to_zero_after_destroy() {
    let (context, mut device) = create_device(RecordingGlConfig::gles3());
    let texture = device.create_texture(&small_texture_def()).unwrap();
    device
        .set_texture_level(texture, 0, 0, RafxTextureSource::Bytes(vec![1; 16]))
        .unwrap();
    device.upload_texture(texture).unwrap();
    let vertices = device
        .create_vertex_buffer(&quad_buffer_def(), vec![0; 24])
        .unwrap();

    let vram = device.stats().vram;
    assert_eq!(vram.textures, 16);
    assert_eq!(vram.vertex_buffers, 24);
    assert_eq!(vram.total(), 40);

    device.destroy_texture(texture).unwrap();
    device.destroy_vertex_buffer(vertices).unwrap();
    assert_eq!(device.stats().vram.total(), 0);
    assert_eq!(context.live_texture_count(), 0);
    assert_eq!(context.live_buffer_count(), 0);
    assert!(device.texture(texture).is_none());
}

#[test]
fn context_loss_and_restore_recreates_resources() {
    let (context, mut device) = create_device(RecordingGlConfig::gles3());
    let events = device.event_receiver();

    let texture = device.create_texture(&small_texture_def()).unwrap();
    device
        .set_texture_level(texture, 0, 0, RafxTextureSource::Bytes(vec![5; 16]))
        .unwrap();
    device.upload_texture(texture).unwrap();
    let vertex_contents: Vec<u8> = (0..24).collect();
    let vertices = device
        .create_vertex_buffer(&quad_buffer_def(), vertex_contents.clone())
        .unwrap();
    let shader = device.create_shader(&textured_shader());
    assert!(device.set_shader(shader).unwrap());

    let old_texture_id = device.texture(texture).unwrap().gl_texture_id().unwrap();
    let old_buffer_id = device.vertex_buffer(vertices).unwrap().gl_buffer_id().unwrap();
    let old_program_id = device.shader(shader).unwrap().gl_program_id().unwrap();

    context.simulate_context_loss();
    assert_eq!(device.poll_context_state().unwrap(), RafxContextState::Lost);
    assert!(device.texture(texture).unwrap().gl_texture_id().is_none());
    assert!(device.vertex_buffer(vertices).unwrap().gl_buffer_id().is_none());
    assert!(device.shader(shader).unwrap().gl_program_id().is_none());
    assert_eq!(device.stats().vram.total(), 0);

    // Everything is a quiet no-op while lost
    assert!(!device.set_texture(texture, 0).unwrap());
    assert!(!device.draw(&triangles(3), None, false).unwrap());
    device.clear(&Default::default()).unwrap();

    context.simulate_context_restore();
    device.frame_start().unwrap();
    assert_eq!(device.context_state(), RafxContextState::Active);

    let new_buffer_id = device.vertex_buffer(vertices).unwrap().gl_buffer_id().unwrap();
    assert_ne!(new_buffer_id, old_buffer_id);
    assert_eq!(context.buffer_contents(new_buffer_id), Some(vertex_contents));

    assert!(device.set_texture(texture, 0).unwrap());
    let new_texture_id = device.texture(texture).unwrap().gl_texture_id().unwrap();
    assert_ne!(new_texture_id, old_texture_id);
    assert_eq!(
        context
            .texture(new_texture_id)
            .unwrap()
            .level(gles_bindings::TEXTURE_2D, 0)
            .unwrap()
            .content,
        RecordedLevelContent::Data(vec![5; 16])
    );

    assert!(device.set_shader(shader).unwrap());
    assert_ne!(
        device.shader(shader).unwrap().gl_program_id(),
        Some(old_program_id)
    );

    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![RafxDeviceEvent::Lost, RafxDeviceEvent::Restored]
    );
}

fn index_buffer_def() -> RafxIndexBufferDef {
    RafxIndexBufferDef {
        index_type: RafxIndexType::Uint16,
        usage: RafxBufferUsage::Static,
    }
}

fn color_texture_def() -> RafxTextureDef {
    RafxTextureDef {
        name: Some("color".to_string()),
        width: 64,
        height: 32,
        format: RafxPixelFormat::Rgba8,
        mipmaps: false,
        ..Default::default()
    }
}

fn render_pass_into(render_target: Option<crate::RafxRenderTargetHandle>) -> RafxRenderPassDef {
    RafxRenderPassDef {
        render_target,
        color_ops: vec![RafxColorAttachmentOps {
            clear: true,
            ..Default::default()
        }],
        depth_stencil_ops: Default::default(),
    }
}

#[test]
fn unpolled_loss_is_observed_by_the_next_call() {
    for entry_point in 0..4 {
        let (context, mut device) = create_device(RecordingGlConfig::gles3());
        let events = device.event_receiver();
        let texture = device.create_texture(&small_texture_def()).unwrap();
        let shader = device.create_shader(&textured_shader());
        let vertices = device
            .create_vertex_buffer(&quad_buffer_def(), vec![0; 24])
            .unwrap();
        device.set_uniform("texture_diffuse", RafxUniformValue::Texture(texture));
        if entry_point == 2 {
            assert!(device.set_shader(shader).unwrap());
            device.set_vertex_buffer(vertices);
        }

        // No poll or frame_start between the loss and the call
        context.simulate_context_loss();
        assert_eq!(device.context_state(), RafxContextState::Active);

        let result = match entry_point {
            0 => device.set_texture(texture, 0),
            1 => device.set_shader(shader),
            2 => device.draw(&triangles(3), None, false),
            _ => device
                .update_vertex_buffer(vertices, vec![1; 24])
                .map(|()| false),
        };

        assert!(!result.unwrap(), "entry point {}", entry_point);
        assert_eq!(device.context_state(), RafxContextState::Lost);
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![RafxDeviceEvent::Lost]
        );
        assert!(!context.calls().iter().any(|x| x.is_draw()));
        assert_eq!(device.stats().vram.total(), 0);
    }
}

#[test]
fn render_pass_spanning_a_loss_ends_cleanly() {
    let (context, mut device) = create_device(RecordingGlConfig::gles3());
    let color = device.create_texture(&color_texture_def()).unwrap();
    let render_target = device
        .create_render_target(&RafxRenderTargetDef {
            color_buffers: vec![color],
            ..Default::default()
        })
        .unwrap();

    device
        .start_render_pass(&render_pass_into(Some(render_target)))
        .unwrap();
    context.simulate_context_loss();
    device.clear(&Default::default()).unwrap();
    assert!(!device
        .copy_render_target(Some(render_target), None, true, false)
        .unwrap());
    device.end_render_pass().unwrap();

    assert!(!device.is_inside_render_pass());
    assert_eq!(device.context_state(), RafxContextState::Lost);

    // Starting a pass while lost is also quiet
    device.start_render_pass(&render_pass_into(None)).unwrap();
    assert!(device.is_inside_render_pass());
    device.end_render_pass().unwrap();
    assert!(!device.is_inside_render_pass());
}

#[test]
fn context_loss_and_restore_keeps_descriptions_of_targets_and_indices() {
    let (context, mut device) = create_device(RecordingGlConfig::gles3());
    let color = device.create_texture(&color_texture_def()).unwrap();
    let render_target = device
        .create_render_target(&RafxRenderTargetDef {
            name: Some("offscreen".to_string()),
            color_buffers: vec![color],
            ..Default::default()
        })
        .unwrap();
    let index_contents: Vec<u8> = vec![0, 0, 1, 0, 2, 0, 2, 0, 1, 0, 3, 0];
    let indices = device
        .create_index_buffer(&index_buffer_def(), index_contents.clone())
        .unwrap();

    device
        .start_render_pass(&render_pass_into(Some(render_target)))
        .unwrap();
    device.end_render_pass().unwrap();

    let texture_def = device.texture(color).unwrap().texture_def().clone();
    let render_target_def = device
        .render_target(render_target)
        .unwrap()
        .render_target_def()
        .clone();
    let render_target_size = {
        let render_target = device.render_target(render_target).unwrap();
        (render_target.width(), render_target.height())
    };
    let old_framebuffer_id = device
        .render_target(render_target)
        .unwrap()
        .gl_framebuffer_id()
        .unwrap();
    let old_index_buffer_id = device.index_buffer(indices).unwrap().gl_buffer_id().unwrap();

    context.simulate_context_loss();
    assert_eq!(device.poll_context_state().unwrap(), RafxContextState::Lost);
    assert!(device
        .render_target(render_target)
        .unwrap()
        .gl_framebuffer_id()
        .is_none());
    assert!(device.index_buffer(indices).unwrap().gl_buffer_id().is_none());
    assert_eq!(device.index_buffer(indices).unwrap().contents(), &index_contents[..]);

    context.simulate_context_restore();
    assert_eq!(device.poll_context_state().unwrap(), RafxContextState::Active);

    let new_index_buffer_id = device.index_buffer(indices).unwrap().gl_buffer_id().unwrap();
    assert_ne!(new_index_buffer_id, old_index_buffer_id);
    assert_eq!(
        context.buffer_contents(new_index_buffer_id),
        Some(index_contents.clone())
    );
    assert_eq!(device.index_buffer(indices).unwrap().index_count(), 6);

    device
        .start_render_pass(&render_pass_into(Some(render_target)))
        .unwrap();
    device.end_render_pass().unwrap();
    let restored = device.render_target(render_target).unwrap();
    let new_framebuffer_id = restored.gl_framebuffer_id().unwrap();
    assert_ne!(new_framebuffer_id, old_framebuffer_id);
    assert_eq!(restored.render_target_def(), &render_target_def);
    assert_eq!((restored.width(), restored.height()), render_target_size);

    let color_texture = device.texture(color).unwrap();
    assert_eq!(color_texture.texture_def(), &texture_def);
    assert_eq!((color_texture.width(), color_texture.height()), (64, 32));
    assert!(color_texture.gl_texture_id().is_some());
}

#[test]
fn vram_is_conserved_across_many_resources_and_a_loss() {
    let (context, mut device) = create_device(RecordingGlConfig::gles3());
    let mut textures = Vec::default();
    for value in 0..3 {
        let texture = device.create_texture(&small_texture_def()).unwrap();
        device
            .set_texture_level(texture, 0, 0, RafxTextureSource::Bytes(vec![value; 16]))
            .unwrap();
        device.upload_texture(texture).unwrap();
        textures.push(texture);
    }
    let color = device.create_texture(&color_texture_def()).unwrap();
    let render_target = device
        .create_render_target(&RafxRenderTargetDef {
            color_buffers: vec![color],
            ..Default::default()
        })
        .unwrap();
    device
        .start_render_pass(&render_pass_into(Some(render_target)))
        .unwrap();
    device.end_render_pass().unwrap();
    let vertices: Vec<_> = (0..2)
        .map(|_| {
            device
                .create_vertex_buffer(&quad_buffer_def(), vec![0; 24])
                .unwrap()
        })
        .collect();
    let indices = device
        .create_index_buffer(&index_buffer_def(), vec![0; 12])
        .unwrap();

    let color_size = 64 * 32 * 4;
    let vram = device.stats().vram;
    assert_eq!(vram.textures, 3 * 16 + color_size);
    assert_eq!(vram.vertex_buffers, 48);
    assert_eq!(vram.index_buffers, 12);

    device.destroy_texture(textures[0]).unwrap();
    device.destroy_vertex_buffer(vertices[0]).unwrap();
    assert_eq!(device.stats().vram.total(), 2 * 16 + color_size + 24 + 12);

    context.simulate_context_loss();
    device.frame_start().unwrap();
    assert_eq!(device.stats().vram.total(), 0);

    // Buffers come back on restore, textures on their next use
    context.simulate_context_restore();
    device.frame_start().unwrap();
    assert_eq!(device.stats().vram.total(), 24 + 12);
    assert!(device.set_texture(textures[1], 0).unwrap());
    assert_eq!(device.stats().vram.textures, 16);

    device.destroy_render_target(render_target).unwrap();
    device.destroy_texture(color).unwrap();
    for texture in &textures[1..] {
        device.destroy_texture(*texture).unwrap();
    }
    device.destroy_vertex_buffer(vertices[1]).unwrap();
    device.destroy_index_buffer(indices).unwrap();

    let vram = device.stats().vram;
    assert_eq!(
        (vram.textures, vram.vertex_buffers, vram.index_buffers),
        (0, 0, 0)
    );
    assert_eq!(context.live_texture_count(), 0);
    assert_eq!(context.live_buffer_count(), 0);
}

#[test]
fn skipped_draw_is_reported_again_after_restore() {
    let (context, mut device) = create_device(RecordingGlConfig::gles3());
    let diagnostics = device.diagnostics_receiver();
    let shader = device.create_shader(&textured_shader());
    assert!(device.set_shader(shader).unwrap());

    assert!(!device.draw(&triangles(3), None, false).unwrap());
    assert!(!device.draw(&triangles(3), None, false).unwrap());
    assert_eq!(diagnostics.try_iter().count(), 1);

    context.simulate_context_loss();
    device.frame_start().unwrap();
    context.simulate_context_restore();
    device.frame_start().unwrap();

    assert!(device.set_shader(shader).unwrap());
    assert!(!device.draw(&triangles(3), None, false).unwrap());
    assert_eq!(diagnostics.try_iter().count(), 1);
}

#[test]
fn background_compile_reports_not_ready_until_linked() {
    let mut config = RecordingGlConfig::gles3();
    config.completion_status_pending_polls = 2;
    let provider = RecordingGlContextProvider::new(config);
    let device_def = RafxDeviceDef {
        async_shader_compile: true,
        ..test_device_def()
    };
    let mut device = RafxDeviceGl::new(&provider, &device_def).unwrap();
    let diagnostics = device.diagnostics_receiver();
    let shader = device.create_shader(&textured_shader());

    assert!(!device.set_shader(shader).unwrap());
    assert_eq!(
        device.shader(shader).unwrap().status(),
        RafxShaderStatus::Compiling
    );
    assert!(!device.draw(&triangles(3), None, false).unwrap());
    assert!(device.set_shader(shader).unwrap());
    assert_eq!(diagnostics.try_iter().count(), 0);
}

#[test]
fn multisampled_pass_resolves_at_end() {
    let (context, mut device) = create_device(RecordingGlConfig::gles3());
    let texture = device
        .create_texture(&RafxTextureDef {
            width: 64,
            height: 64,
            mipmaps: false,
            ..Default::default()
        })
        .unwrap();
    let render_target = device
        .create_render_target(&RafxRenderTargetDef {
            color_buffers: vec![texture],
            samples: 16,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(device.render_target(render_target).unwrap().samples(), 4);

    device
        .start_render_pass(&RafxRenderPassDef {
            render_target: Some(render_target),
            color_ops: vec![RafxColorAttachmentOps {
                clear: true,
                resolve: true,
                ..Default::default()
            }],
            depth_stencil_ops: Default::default(),
        })
        .unwrap();
    assert!(device.is_inside_render_pass());
    let start = context.call_count();
    device.end_render_pass().unwrap();

    assert!(context.calls_since(start).contains(&GlCall::BlitFramebuffer {
        width: 64,
        height: 64,
        mask: gles_bindings::COLOR_BUFFER_BIT,
        filter: gles_bindings::NEAREST,
    }));
    assert!(!device.is_inside_render_pass());
}
