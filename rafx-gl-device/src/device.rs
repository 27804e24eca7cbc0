use crate::backends::gles_bindings;
use crate::backends::{BufferId, GlContext, ProgramId, RafxGlContextProvider, VertexArrayId};
use crate::internal::{FullscreenQuad, ResourceSlab};
use crate::texture_upload;
use crate::{
    RafxAddressMode, RafxApiTier, RafxBlendState, RafxCapabilities, RafxClearFlags,
    RafxClearOptions, RafxColorFlags, RafxCompareOp, RafxContextState, RafxCullMode,
    RafxDepthState, RafxDeviceDef, RafxDeviceEvent, RafxDiagnostic, RafxDiagnosticLevel,
    RafxDiagnostics, RafxError, RafxFilterType, RafxFormatTable, RafxIndexBufferDef,
    RafxIndexBufferGl, RafxIndexBufferHandle, RafxIndexType, RafxPrimitiveType, RafxQuirkContext,
    RafxRenderPassDef, RafxRenderTargetDef, RafxRenderTargetGl, RafxRenderTargetHandle,
    RafxResult, RafxScopeId, RafxShaderCompileStats, RafxShaderDef, RafxShaderGl,
    RafxShaderHandle, RafxShaderStatus, RafxStateCache, RafxStencilParameters, RafxTextureDef,
    RafxTextureGl, RafxTextureHandle, RafxTextureSource, RafxUniformScope, RafxUniformValue,
    RafxVertexBufferDef, RafxVertexBufferGl, RafxVertexBufferHandle,
};
use crossbeam_channel::{Receiver, Sender};
use fnv::FnvHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
const DEFAULT_CLEAR_DEPTH: f32 = 1.0;
const DEFAULT_CLEAR_STENCIL: u32 = 0;

/// Buffer ids and layout hashes of the vertex buffers bound by a vertex array, in binding order
pub(crate) type RafxVertexArrayKey = Vec<(BufferId, u64)>;

/// Counters for a single frame
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RafxFrameStats {
    pub draw_calls: u32,
    /// Indexed by `RafxPrimitiveType::index()`. Instanced draws count every instance.
    pub primitives: [u64; RafxPrimitiveType::COUNT],
    pub shader_switches: u32,
    pub render_passes: u32,
}

impl RafxFrameStats {
    pub fn primitive_count(
        &self,
        primitive_type: RafxPrimitiveType,
    ) -> u64 {
        self.primitives[primitive_type.index()]
    }
}

/// Bytes of GPU memory held by live resources, as computed by the device
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RafxVramStats {
    pub textures: u64,
    pub vertex_buffers: u64,
    pub index_buffers: u64,
}

impl RafxVramStats {
    pub fn total(&self) -> u64 {
        self.textures + self.vertex_buffers + self.index_buffers
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RafxDeviceStats {
    /// Number of frames ended with `frame_end`
    pub frame_index: u64,
    /// The frame in progress
    pub frame: RafxFrameStats,
    /// The last completed frame
    pub last_frame: RafxFrameStats,
    pub vram: RafxVramStats,
    pub shader_compiles: RafxShaderCompileStats,
}

/// Binds a texture for sampling on `unit`, creating the GL object and sending pending sampling
/// parameters and content first. Returns false if the handle is stale.
pub(crate) fn bind_texture_unit(
    gl_context: &dyn GlContext,
    capabilities: &RafxCapabilities,
    state: &mut RafxStateCache,
    textures: &mut ResourceSlab<RafxTextureGl>,
    texture_vram: &mut u64,
    handle: RafxTextureHandle,
    unit: u32,
) -> RafxResult<bool> {
    let texture = match textures.get_mut(handle.0) {
        Some(texture) => texture,
        None => return Ok(false),
    };

    let texture_id = match texture.texture_id {
        Some(texture_id) => texture_id,
        None => {
            let texture_id = gl_context.gl_create_texture()?;
            log::trace!(
                "Created GL texture {:?} for {:?}",
                texture_id,
                texture.def.name
            );
            texture.texture_id = Some(texture_id);
            texture_id
        }
    };

    state.bind_texture(gl_context, unit, texture.gl_target, texture_id)?;
    if !texture.dirty_parameters.is_empty() || texture.needs_upload() {
        // Parameter and upload calls act on the active unit
        state.set_active_unit(gl_context, unit)?;
        texture.apply_parameters(gl_context, capabilities)?;
        texture_upload::upload_texture(gl_context, capabilities, state, texture, texture_vram)?;
    }

    Ok(true)
}

/// A GL ES 2/3 device: owns the context, the shadow state cache and every resource created
/// through it. Resources keep their CPU-side description so that they can be recreated after the
/// context is lost.
pub struct RafxDeviceGl {
    pub(crate) gl_context: Box<dyn GlContext>,
    pub(crate) device_def: RafxDeviceDef,
    user_agent: Option<String>,
    pub(crate) capabilities: RafxCapabilities,
    pub(crate) format_table: RafxFormatTable,
    pub(crate) state: RafxStateCache,
    pub(crate) diagnostics: RafxDiagnostics,
    event_tx: Sender<RafxDeviceEvent>,
    event_rx: Receiver<RafxDeviceEvent>,
    context_state: RafxContextState,
    image_bitmap_supported: Arc<AtomicBool>,
    canvas_size: (u32, u32),

    pub(crate) textures: ResourceSlab<RafxTextureGl>,
    pub(crate) vertex_buffers: ResourceSlab<RafxVertexBufferGl>,
    pub(crate) index_buffers: ResourceSlab<RafxIndexBufferGl>,
    pub(crate) shaders: ResourceSlab<RafxShaderGl>,
    pub(crate) render_targets: ResourceSlab<RafxRenderTargetGl>,
    pub(crate) vertex_arrays: FnvHashMap<RafxVertexArrayKey, VertexArrayId>,
    pub(crate) fullscreen_quad: Option<FullscreenQuad>,
    pub(crate) uniform_scope: RafxUniformScope,
    pub(crate) stats: RafxDeviceStats,

    pub(crate) current_shader: Option<RafxShaderHandle>,
    pub(crate) current_vertex_buffers: Vec<RafxVertexBufferHandle>,
    pub(crate) current_index_buffer: Option<RafxIndexBufferHandle>,
    pub(crate) current_render_target: Option<RafxRenderTargetHandle>,
    pub(crate) active_render_pass: Option<RafxRenderPassDef>,

    destroyed: bool,
}

impl std::fmt::Debug for RafxDeviceGl {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        f.debug_struct("RafxDeviceGl")
            .field("api_tier", &self.capabilities.api_tier)
            .field("context_state", &self.context_state)
            .finish()
    }
}

impl Drop for RafxDeviceGl {
    fn drop(&mut self) {
        if !self.destroyed {
            if let Err(e) = self.destroy() {
                log::error!("Error destroying GL device: {}", e);
            }
        }
    }
}

impl RafxDeviceGl {
    /// Creates a context through `provider`, trying the preferred tier first and falling back to
    /// older tiers. Fails with `ContextUnavailable` if no tier yields a usable context.
    pub fn new(
        provider: &dyn RafxGlContextProvider,
        device_def: &RafxDeviceDef,
    ) -> RafxResult<Self> {
        log::debug!("Initializing GL device");
        device_def.verify()?;

        // Quirks that only need the user agent are known before a context exists
        let user_agent = provider.user_agent();
        let early_effects = device_def.quirks.evaluate(&RafxQuirkContext {
            user_agent: user_agent.as_deref(),
            vendor: None,
            renderer: None,
        });
        let antialias = device_def.antialias && !early_effects.disable_multisampling;
        if device_def.antialias && !antialias {
            log::warn!("Antialiasing disabled by a device quirk");
        }
        let attributes = device_def.context_attributes(antialias);

        let tiers = device_def.preferred_tier.fallback_chain();
        let mut gl_context = None;
        for &tier in tiers {
            match provider.create_context(tier, &attributes)? {
                Some(context) => {
                    log::debug!("Created {:?} context", tier);
                    gl_context = Some(context);
                    break;
                }
                None => log::debug!("{:?} context is unavailable", tier),
            }
        }

        let gl_context = gl_context.ok_or_else(|| {
            RafxError::ContextUnavailable(format!("no context could be created for {:?}", tiers))
        })?;

        let capabilities =
            RafxCapabilities::probe(&*gl_context, &device_def.quirks, user_agent.as_deref())?;
        let format_table = RafxFormatTable::new(&capabilities);
        let mut state = RafxStateCache::new(capabilities.limits.max_combined_textures);
        state.apply_defaults(&*gl_context, &capabilities)?;

        let image_bitmap_supported = Arc::new(AtomicBool::new(false));
        gl_context.start_image_bitmap_probe(image_bitmap_supported.clone());

        let canvas_size = gl_context.drawing_buffer_size();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();

        Ok(RafxDeviceGl {
            gl_context,
            device_def: device_def.clone(),
            user_agent,
            capabilities,
            format_table,
            state,
            diagnostics: RafxDiagnostics::default(),
            event_tx,
            event_rx,
            context_state: RafxContextState::Active,
            image_bitmap_supported,
            canvas_size,
            textures: Default::default(),
            vertex_buffers: Default::default(),
            index_buffers: Default::default(),
            shaders: Default::default(),
            render_targets: Default::default(),
            vertex_arrays: Default::default(),
            fullscreen_quad: None,
            uniform_scope: Default::default(),
            stats: Default::default(),
            current_shader: None,
            current_vertex_buffers: Vec::default(),
            current_index_buffer: None,
            current_render_target: None,
            active_render_pass: None,
            destroyed: false,
        })
    }

    pub fn device_def(&self) -> &RafxDeviceDef {
        &self.device_def
    }

    pub fn gl_context(&self) -> &dyn GlContext {
        &*self.gl_context
    }

    pub fn capabilities(&self) -> &RafxCapabilities {
        &self.capabilities
    }

    pub fn format_table(&self) -> &RafxFormatTable {
        &self.format_table
    }

    pub fn api_tier(&self) -> RafxApiTier {
        self.capabilities.api_tier
    }

    pub fn state_cache(&self) -> &RafxStateCache {
        &self.state
    }

    pub fn stats(&self) -> &RafxDeviceStats {
        &self.stats
    }

    pub fn context_state(&self) -> RafxContextState {
        self.context_state
    }

    pub fn is_context_lost(&self) -> bool {
        self.context_state == RafxContextState::Lost
    }

    /// Runs the lost transition as soon as the backend reports a loss, without waiting for
    /// `poll_context_state`. Returns true if the device is lost.
    pub(crate) fn observe_context_loss(&mut self) -> bool {
        if self.context_state == RafxContextState::Active && self.gl_context.is_context_lost() {
            self.lose_context();
        }
        self.is_context_lost()
    }

    /// A backend that loses the context in the middle of an operation fails with `ContextLost`.
    /// That is a state transition, not an error, so the device goes lost and `lost_value` is
    /// returned instead.
    pub(crate) fn absorb_context_loss<T>(
        &mut self,
        result: RafxResult<T>,
        lost_value: T,
    ) -> RafxResult<T> {
        match result {
            Err(RafxError::ContextLost) => {
                self.lose_context();
                Ok(lost_value)
            }
            result => result,
        }
    }

    /// False until the asynchronous image bitmap probe started at creation succeeds
    pub fn supports_image_bitmap(&self) -> bool {
        self.image_bitmap_supported.load(Ordering::Relaxed)
    }

    pub fn event_receiver(&self) -> Receiver<RafxDeviceEvent> {
        self.event_rx.clone()
    }

    pub fn diagnostics_receiver(&self) -> Receiver<RafxDiagnostic> {
        self.diagnostics.receiver()
    }

    pub fn uniform_scope(&self) -> &RafxUniformScope {
        &self.uniform_scope
    }

    pub fn uniform_scope_mut(&mut self) -> &mut RafxUniformScope {
        &mut self.uniform_scope
    }

    /// Sets a named uniform or sampler value for subsequent draws
    pub fn set_uniform(
        &mut self,
        name: &str,
        value: RafxUniformValue,
    ) -> RafxScopeId {
        self.uniform_scope.set(name, value)
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas_size
    }

    /// Reports a call-ordering mistake. Panics afterwards if the device was created with
    /// `assert_on_programming_errors`.
    pub(crate) fn report_programming_error(
        &self,
        message: String,
    ) {
        self.diagnostics
            .report(RafxDiagnosticLevel::Error, message.clone());
        assert!(!self.device_def.assert_on_programming_errors, "{}", message);
    }

    // Textures are bound here for uploads so that sampling bindings on low units stay intact
    pub(crate) fn scratch_texture_unit(&self) -> u32 {
        self.capabilities.limits.max_combined_textures.max(1) - 1
    }

    //
    // Frame and canvas
    //

    /// Begins a frame. Picks up context loss or restoration reported by the backend.
    pub fn frame_start(&mut self) -> RafxResult<()> {
        self.poll_context_state()?;
        self.stats.frame = RafxFrameStats::default();
        Ok(())
    }

    pub fn frame_end(&mut self) -> RafxResult<()> {
        if self.active_render_pass.is_some() {
            self.report_programming_error("Frame ended inside a render pass".to_string());
        }

        self.stats.last_frame = self.stats.frame;
        self.stats.frame_index += 1;
        Ok(())
    }

    /// Resizes the drawing buffer. Emits `Resized` if the size changed.
    pub fn resize_canvas(
        &mut self,
        width: u32,
        height: u32,
    ) {
        if self.canvas_size == (width, height) {
            return;
        }

        self.gl_context.set_drawing_buffer_size(width, height);
        self.canvas_size = (width, height);
        log::debug!("Canvas resized to {}x{}", width, height);
        self.send_event(RafxDeviceEvent::Resized { width, height });
    }

    fn send_event(
        &self,
        event: RafxDeviceEvent,
    ) {
        // The device holds a receiver itself, so the channel is never disconnected
        let _ = self.event_tx.send(event);
    }

    //
    // Render state
    //

    pub fn set_blend_state(
        &mut self,
        blend_state: &RafxBlendState,
    ) -> RafxResult<()> {
        self.state.set_blend_state(&*self.gl_context, blend_state)
    }

    pub fn set_blend_color(
        &mut self,
        color: [f32; 4],
    ) -> RafxResult<()> {
        self.state.set_blend_color(&*self.gl_context, color)
    }

    pub fn set_depth_state(
        &mut self,
        depth_state: &RafxDepthState,
    ) -> RafxResult<()> {
        self.state.set_depth_state(&*self.gl_context, depth_state)
    }

    pub fn set_cull_mode(
        &mut self,
        cull_mode: RafxCullMode,
    ) -> RafxResult<()> {
        self.state.set_cull_mode(&*self.gl_context, cull_mode)
    }

    pub fn set_stencil_test(
        &mut self,
        enabled: bool,
    ) -> RafxResult<()> {
        self.state.set_stencil_test(&*self.gl_context, enabled)
    }

    pub fn set_stencil_state(
        &mut self,
        front: &RafxStencilParameters,
        back: &RafxStencilParameters,
    ) -> RafxResult<()> {
        self.state.set_stencil_state(&*self.gl_context, front, back)
    }

    pub fn set_viewport(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> RafxResult<()> {
        self.state
            .set_viewport(&*self.gl_context, [x, y, width, height])
    }

    pub fn set_scissor(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> RafxResult<()> {
        self.state
            .set_scissor(&*self.gl_context, [x, y, width, height])
    }

    pub fn set_scissor_test(
        &mut self,
        enabled: bool,
    ) -> RafxResult<()> {
        self.state.set_scissor_test(&*self.gl_context, enabled)
    }

    /// Clears the bound framebuffer. Omitted options use the device defaults: color and depth,
    /// to opaque black and 1.0. Color clears enable all color channels and depth clears enable
    /// depth writes, since masked buffers are not cleared.
    pub fn clear(
        &mut self,
        options: &RafxClearOptions,
    ) -> RafxResult<()> {
        if self.observe_context_loss() {
            return Ok(());
        }

        let result = self.clear_framebuffer(options);
        self.absorb_context_loss(result, ())
    }

    fn clear_framebuffer(
        &mut self,
        options: &RafxClearOptions,
    ) -> RafxResult<()> {
        let gl_context = &*self.gl_context;
        let flags = options
            .flags
            .unwrap_or(RafxClearFlags::COLOR | RafxClearFlags::DEPTH);

        let mut mask = 0;
        if flags.contains(RafxClearFlags::COLOR) {
            self.state
                .set_clear_color(gl_context, options.color.unwrap_or(DEFAULT_CLEAR_COLOR))?;
            let mut blend_state = *self.state.blend_state();
            blend_state.color_write = RafxColorFlags::ALL;
            self.state.set_blend_state(gl_context, &blend_state)?;
            mask |= gles_bindings::COLOR_BUFFER_BIT;
        }

        if flags.contains(RafxClearFlags::DEPTH) {
            self.state
                .set_clear_depth(gl_context, options.depth.unwrap_or(DEFAULT_CLEAR_DEPTH))?;
            self.state
                .set_depth_state(gl_context, &RafxDepthState::WRITE_DEPTH)?;
            mask |= gles_bindings::DEPTH_BUFFER_BIT;
        }

        if flags.contains(RafxClearFlags::STENCIL) {
            self.state.set_clear_stencil(
                gl_context,
                options.stencil.unwrap_or(DEFAULT_CLEAR_STENCIL),
            )?;
            mask |= gles_bindings::STENCIL_BUFFER_BIT;
        }

        if mask != 0 {
            gl_context.gl_clear(mask)?;
        }
        Ok(())
    }

    //
    // Textures
    //

    /// Registers a texture. The GL object is created and filled on first use. Fails with
    /// `UnsupportedFormat` if the context cannot represent the format.
    pub fn create_texture(
        &mut self,
        texture_def: &RafxTextureDef,
    ) -> RafxResult<RafxTextureHandle> {
        texture_def.verify()?;
        if texture_def.volume && !self.capabilities.features.volume_textures {
            Err("Volume textures are not supported by this context")?;
        }

        let gl_format = self.format_table.translate(texture_def.format)?;
        let texture = RafxTextureGl::new(texture_def.clone(), gl_format);
        log::trace!(
            "Created texture {:?} {}x{} {:?}",
            texture_def.name,
            texture_def.width,
            texture_def.height,
            texture_def.format
        );
        Ok(RafxTextureHandle(self.textures.allocate(texture)))
    }

    pub fn texture(
        &self,
        handle: RafxTextureHandle,
    ) -> Option<&RafxTextureGl> {
        self.textures.get(handle.0)
    }

    fn texture_mut(
        &mut self,
        handle: RafxTextureHandle,
    ) -> RafxResult<&mut RafxTextureGl> {
        self.textures
            .get_mut(handle.0)
            .ok_or_else(|| "Texture handle is stale".into())
    }

    /// Supplies the content of one face of one mip level. It is sent on the next bind or upload.
    pub fn set_texture_level(
        &mut self,
        handle: RafxTextureHandle,
        mip_level: u32,
        face: u32,
        source: RafxTextureSource,
    ) -> RafxResult<()> {
        let texture = self.texture_mut(handle)?;
        let def = &texture.def;
        if face as usize >= def.face_count() {
            Err(format!(
                "Face {} is out of range for texture {:?}",
                face, def.name
            ))?;
        }

        let mip_level_count = crate::mip_level_count_for_size(def.width, def.height);
        if mip_level >= mip_level_count {
            Err(format!(
                "Mip level {} is out of range for texture {:?} with {} levels",
                mip_level, def.name, mip_level_count
            ))?;
        }

        if def.volume && source.is_image() {
            Err("Volume textures only accept raw bytes")?;
        }

        texture.set_level(mip_level as usize, face as usize, source);
        Ok(())
    }

    pub fn set_texture_filters(
        &mut self,
        handle: RafxTextureHandle,
        min_filter: RafxFilterType,
        mag_filter: RafxFilterType,
    ) -> RafxResult<()> {
        let texture = self.texture_mut(handle)?;
        texture.set_min_filter(min_filter);
        texture.set_mag_filter(mag_filter);
        Ok(())
    }

    pub fn set_texture_address_modes(
        &mut self,
        handle: RafxTextureHandle,
        address_u: RafxAddressMode,
        address_v: RafxAddressMode,
        address_w: RafxAddressMode,
    ) -> RafxResult<()> {
        self.texture_mut(handle)?
            .set_address_modes(address_u, address_v, address_w);
        Ok(())
    }

    pub fn set_texture_compare(
        &mut self,
        handle: RafxTextureHandle,
        compare_on_read: bool,
        compare_func: RafxCompareOp,
    ) -> RafxResult<()> {
        self.texture_mut(handle)?
            .set_compare(compare_on_read, compare_func);
        Ok(())
    }

    pub fn set_texture_anisotropy(
        &mut self,
        handle: RafxTextureHandle,
        anisotropy: f32,
    ) -> RafxResult<()> {
        self.texture_mut(handle)?.set_anisotropy(anisotropy);
        Ok(())
    }

    /// Binds the texture to `unit` for sampling, uploading pending content first. Returns false
    /// if the handle is stale or the context is lost.
    pub fn set_texture(
        &mut self,
        handle: RafxTextureHandle,
        unit: u32,
    ) -> RafxResult<bool> {
        if self.observe_context_loss() {
            return Ok(false);
        }

        if unit >= self.capabilities.limits.max_combined_textures {
            Err(format!(
                "Texture unit {} exceeds the {} available units",
                unit, self.capabilities.limits.max_combined_textures
            ))?;
        }

        let result = bind_texture_unit(
            &*self.gl_context,
            &self.capabilities,
            &mut self.state,
            &mut self.textures,
            &mut self.stats.vram.textures,
            handle,
            unit,
        );
        self.absorb_context_loss(result, false)
    }

    /// Sends pending content now instead of at the next bind
    pub fn upload_texture(
        &mut self,
        handle: RafxTextureHandle,
    ) -> RafxResult<bool> {
        let unit = self.scratch_texture_unit();
        self.set_texture(handle, unit)
    }

    pub fn destroy_texture(
        &mut self,
        handle: RafxTextureHandle,
    ) -> RafxResult<()> {
        if let Some(mut texture) = self.textures.free(handle.0) {
            log::trace!("Destroying texture {:?}", texture.def.name);
            texture.destroy(
                &*self.gl_context,
                &mut self.state,
                &mut self.stats.vram.textures,
            )?;
        }
        Ok(())
    }

    //
    // Buffers
    //

    /// Creates a vertex buffer and uploads `contents` immediately
    pub fn create_vertex_buffer(
        &mut self,
        vertex_buffer_def: &RafxVertexBufferDef,
        contents: Vec<u8>,
    ) -> RafxResult<RafxVertexBufferHandle> {
        let buffer = RafxVertexBufferGl::new(vertex_buffer_def.clone(), contents)?;
        let handle = RafxVertexBufferHandle(self.vertex_buffers.allocate(buffer));
        if !self.observe_context_loss() {
            self.upload_vertex_buffer(handle)?;
        }
        Ok(handle)
    }

    pub fn vertex_buffer(
        &self,
        handle: RafxVertexBufferHandle,
    ) -> Option<&RafxVertexBufferGl> {
        self.vertex_buffers.get(handle.0)
    }

    /// Replaces the contents and re-uploads them
    pub fn update_vertex_buffer(
        &mut self,
        handle: RafxVertexBufferHandle,
        contents: Vec<u8>,
    ) -> RafxResult<()> {
        self.vertex_buffers
            .get_mut(handle.0)
            .ok_or("Vertex buffer handle is stale")?
            .set_contents(contents);
        if !self.observe_context_loss() {
            self.upload_vertex_buffer(handle)?;
        }
        Ok(())
    }

    fn upload_vertex_buffer(
        &mut self,
        handle: RafxVertexBufferHandle,
    ) -> RafxResult<()> {
        let result = match self.vertex_buffers.get_mut(handle.0) {
            Some(buffer) => buffer.upload(&*self.gl_context, &mut self.stats.vram.vertex_buffers),
            None => Ok(()),
        };
        self.absorb_context_loss(result, ())
    }

    pub fn destroy_vertex_buffer(
        &mut self,
        handle: RafxVertexBufferHandle,
    ) -> RafxResult<()> {
        self.current_vertex_buffers.retain(|x| *x != handle);
        if let Some(mut buffer) = self.vertex_buffers.free(handle.0) {
            buffer.destroy(&*self.gl_context, &mut self.stats.vram.vertex_buffers)?;
        }
        Ok(())
    }

    /// Creates an index buffer and uploads `contents` immediately. 32-bit indices need
    /// element-index-uint support on the older tier.
    pub fn create_index_buffer(
        &mut self,
        index_buffer_def: &RafxIndexBufferDef,
        contents: Vec<u8>,
    ) -> RafxResult<RafxIndexBufferHandle> {
        if index_buffer_def.index_type == RafxIndexType::Uint32
            && !self.capabilities.features.element_index_uint
        {
            Err("32-bit indices are not supported by this context")?;
        }

        let buffer = RafxIndexBufferGl::new(index_buffer_def.clone(), contents)?;
        let handle = RafxIndexBufferHandle(self.index_buffers.allocate(buffer));
        if !self.observe_context_loss() {
            self.upload_index_buffer(handle)?;
        }
        Ok(handle)
    }

    pub fn index_buffer(
        &self,
        handle: RafxIndexBufferHandle,
    ) -> Option<&RafxIndexBufferGl> {
        self.index_buffers.get(handle.0)
    }

    pub fn update_index_buffer(
        &mut self,
        handle: RafxIndexBufferHandle,
        contents: Vec<u8>,
    ) -> RafxResult<()> {
        self.index_buffers
            .get_mut(handle.0)
            .ok_or("Index buffer handle is stale")?
            .set_contents(contents)?;
        if !self.observe_context_loss() {
            self.upload_index_buffer(handle)?;
        }
        Ok(())
    }

    fn upload_index_buffer(
        &mut self,
        handle: RafxIndexBufferHandle,
    ) -> RafxResult<()> {
        let result = match self.index_buffers.get_mut(handle.0) {
            Some(buffer) => buffer.upload(
                &*self.gl_context,
                &mut self.state,
                &mut self.stats.vram.index_buffers,
            ),
            None => Ok(()),
        };
        self.absorb_context_loss(result, ())
    }

    pub fn destroy_index_buffer(
        &mut self,
        handle: RafxIndexBufferHandle,
    ) -> RafxResult<()> {
        if self.current_index_buffer == Some(handle) {
            self.current_index_buffer = None;
        }

        if let Some(mut buffer) = self.index_buffers.free(handle.0) {
            if let Some(buffer_id) = buffer.gl_buffer_id() {
                self.state.forget_index_buffer(buffer_id);
            }
            buffer.destroy(&*self.gl_context, &mut self.stats.vram.index_buffers)?;
        }
        Ok(())
    }

    /// Appends a vertex buffer to the set used by the next draw
    pub fn set_vertex_buffer(
        &mut self,
        handle: RafxVertexBufferHandle,
    ) {
        self.current_vertex_buffers.push(handle);
    }

    pub fn clear_vertex_buffers(&mut self) {
        self.current_vertex_buffers.clear();
    }

    pub fn set_index_buffer(
        &mut self,
        handle: Option<RafxIndexBufferHandle>,
    ) {
        self.current_index_buffer = handle;
    }

    //
    // Shaders
    //

    /// Registers a shader. It is compiled the first time it is set.
    pub fn create_shader(
        &mut self,
        shader_def: &RafxShaderDef,
    ) -> RafxShaderHandle {
        log::trace!("Created shader {}", shader_def.name);
        RafxShaderHandle(self.shaders.allocate(RafxShaderGl::new(shader_def.clone())))
    }

    pub fn shader(
        &self,
        handle: RafxShaderHandle,
    ) -> Option<&RafxShaderGl> {
        self.shaders.get(handle.0)
    }

    /// Advances compilation of the shader and returns its program if it is ready
    pub(crate) fn prepare_shader(
        &mut self,
        handle: RafxShaderHandle,
    ) -> RafxResult<Option<ProgramId>> {
        let parallel_compile = self.device_def.async_shader_compile
            && self.capabilities.features.parallel_shader_compile;
        let shader = match self.shaders.get_mut(handle.0) {
            Some(shader) => shader,
            None => return Ok(None),
        };

        match shader.status() {
            RafxShaderStatus::Ready => {}
            RafxShaderStatus::Failed => return Ok(None),
            RafxShaderStatus::Pending | RafxShaderStatus::Compiling => {
                let status = shader.compile(
                    &*self.gl_context,
                    parallel_compile,
                    &mut self.uniform_scope,
                    &mut self.stats.shader_compiles,
                    &self.diagnostics,
                )?;
                if status != RafxShaderStatus::Ready {
                    return Ok(None);
                }
            }
        }

        Ok(shader.gl_program_id())
    }

    /// Makes the shader current for subsequent draws, compiling it if needed. Returns false if
    /// it cannot be drawn with yet: still compiling in the background, failed, or the context
    /// is lost.
    pub fn set_shader(
        &mut self,
        handle: RafxShaderHandle,
    ) -> RafxResult<bool> {
        self.current_shader = Some(handle);
        if self.observe_context_loss() {
            return Ok(false);
        }

        let result = self.use_shader(handle);
        self.absorb_context_loss(result, false)
    }

    fn use_shader(
        &mut self,
        handle: RafxShaderHandle,
    ) -> RafxResult<bool> {
        match self.prepare_shader(handle)? {
            Some(program_id) => {
                if self.state.use_program(&*self.gl_context, program_id)? {
                    self.stats.frame.shader_switches += 1;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn destroy_shader(
        &mut self,
        handle: RafxShaderHandle,
    ) -> RafxResult<()> {
        if self.current_shader == Some(handle) {
            self.current_shader = None;
        }

        if let Some(mut shader) = self.shaders.free(handle.0) {
            if shader.gl_program_id().is_some() && shader.gl_program_id() == self.state.program() {
                self.state.invalidate_program();
            }
            shader.destroy(&*self.gl_context)?;
        }
        Ok(())
    }

    //
    // Render targets
    //

    /// Registers a render target over existing textures. The framebuffer is created the first
    /// time the target is rendered to or copied.
    pub fn create_render_target(
        &mut self,
        render_target_def: &RafxRenderTargetDef,
    ) -> RafxResult<RafxRenderTargetHandle> {
        render_target_def.verify()?;

        let limits = &self.capabilities.limits;
        let color_count = render_target_def.color_buffers.len() as u32;
        if color_count > 1 && !self.capabilities.features.draw_buffers {
            Err("Multiple color attachments are not supported by this context")?;
        }
        if color_count > limits.max_color_attachments.max(1) {
            Err(format!(
                "Render target has {} color attachments but the context supports {}",
                color_count, limits.max_color_attachments
            ))?;
        }

        let mut size = None;
        let mut color_formats = Vec::with_capacity(color_count as usize);
        for handle in &render_target_def.color_buffers {
            let texture = self
                .textures
                .get(handle.0)
                .ok_or("Render target color buffer is not a live texture")?;
            if texture.def.volume || texture.def.format.is_depth() {
                Err("Render target color buffers must be 2D or cubemap color textures")?;
            }
            size.get_or_insert((texture.def.width, texture.def.height));
            color_formats.push(texture.def.format);
        }

        let depth_format = match render_target_def.depth_buffer {
            Some(handle) => {
                let texture = self
                    .textures
                    .get(handle.0)
                    .ok_or("Render target depth buffer is not a live texture")?;
                if !texture.def.format.is_depth() {
                    Err("Render target depth buffer must use a depth format")?;
                }
                size.get_or_insert((texture.def.width, texture.def.height));
                Some(texture.def.format)
            }
            None => None,
        };

        let (width, height) = size.ok_or("Render target has no attachments")?;
        let max_size = limits.max_renderbuffer_size.max(1);
        let (clamped_width, clamped_height) = (width.min(max_size), height.min(max_size));
        if (clamped_width, clamped_height) != (width, height) {
            log::warn!(
                "Render target {:?} of {}x{} clamped to {}x{}",
                render_target_def.name,
                width,
                height,
                clamped_width,
                clamped_height
            );
        }

        let samples = render_target_def
            .samples
            .max(1)
            .min(limits.max_samples.max(1));

        let render_target = RafxRenderTargetGl::new(
            render_target_def.clone(),
            clamped_width,
            clamped_height,
            samples,
            color_formats,
            depth_format,
        );
        log::trace!(
            "Created render target {:?} {}x{} ({} samples)",
            render_target_def.name,
            clamped_width,
            clamped_height,
            samples
        );
        Ok(RafxRenderTargetHandle(
            self.render_targets.allocate(render_target),
        ))
    }

    pub fn render_target(
        &self,
        handle: RafxRenderTargetHandle,
    ) -> Option<&RafxRenderTargetGl> {
        self.render_targets.get(handle.0)
    }

    /// Creates the target's framebuffers if needed, giving its textures storage first. Returns
    /// false if the target or one of its textures no longer exists.
    pub(crate) fn ensure_render_target(
        &mut self,
        handle: RafxRenderTargetHandle,
    ) -> RafxResult<bool> {
        let scratch_unit = self.scratch_texture_unit();
        let gl_context = &*self.gl_context;
        let render_target = match self.render_targets.get_mut(handle.0) {
            Some(render_target) => render_target,
            None => return Ok(false),
        };

        if render_target.is_initialized() {
            return Ok(true);
        }

        let mut attachments = Vec::with_capacity(render_target.def.color_buffers.len() + 1);
        let attachment_handles = render_target
            .def
            .color_buffers
            .iter()
            .copied()
            .chain(render_target.def.depth_buffer);
        for texture_handle in attachment_handles {
            let bound = bind_texture_unit(
                gl_context,
                &self.capabilities,
                &mut self.state,
                &mut self.textures,
                &mut self.stats.vram.textures,
                texture_handle,
                scratch_unit,
            )?;
            let texture = match self.textures.get(texture_handle.0) {
                Some(texture) if bound => texture,
                _ => {
                    self.diagnostics.report(
                        RafxDiagnosticLevel::Error,
                        format!(
                            "Render target {:?} references a destroyed texture",
                            render_target.def.name
                        ),
                    );
                    return Ok(false);
                }
            };

            let texture_target = if texture.def.cubemap {
                crate::internal::gl_cube_face_target(render_target.def.face)
            } else {
                gles_bindings::TEXTURE_2D
            };
            attachments.push(crate::render_target::RafxAttachmentInfo {
                texture_id: texture
                    .gl_texture_id()
                    .ok_or("Attachment texture has no GL object")?,
                texture_target,
                internal_format: texture.gl_format.internal_format,
                format: texture.def.format,
            });
        }

        let depth = if render_target.def.depth_buffer.is_some() {
            attachments.pop()
        } else {
            None
        };

        render_target.init(
            gl_context,
            &self.capabilities,
            &mut self.state,
            &attachments,
            depth,
            &self.diagnostics,
        )?;
        Ok(true)
    }

    pub fn destroy_render_target(
        &mut self,
        handle: RafxRenderTargetHandle,
    ) -> RafxResult<()> {
        if self.current_render_target == Some(handle) {
            self.current_render_target = None;
        }

        if let Some(mut render_target) = self.render_targets.free(handle.0) {
            render_target.destroy(&*self.gl_context, &mut self.state)?;
        }
        Ok(())
    }

    //
    // Context loss
    //

    /// Compares the backend's lost flag with the device state and runs the matching transition
    pub fn poll_context_state(&mut self) -> RafxResult<RafxContextState> {
        let lost = self.gl_context.is_context_lost();
        match (self.context_state, lost) {
            (RafxContextState::Active, true) => self.lose_context(),
            (RafxContextState::Lost, false) => self.restore_context()?,
            _ => {}
        }
        Ok(self.context_state)
    }

    /// Marks the device lost and drops every GL handle. CPU-side descriptions and contents are
    /// kept for restoration.
    pub fn lose_context(&mut self) {
        if self.context_state == RafxContextState::Lost {
            return;
        }

        log::warn!("Graphics context lost");
        self.context_state = RafxContextState::Lost;

        for (_, texture) in self.textures.iter_mut() {
            texture.lose_context(&mut self.stats.vram.textures);
        }
        for (_, buffer) in self.vertex_buffers.iter_mut() {
            buffer.lose_context(&mut self.stats.vram.vertex_buffers);
        }
        for (_, buffer) in self.index_buffers.iter_mut() {
            buffer.lose_context(&mut self.stats.vram.index_buffers);
        }
        for (_, shader) in self.shaders.iter_mut() {
            shader.lose_context();
        }
        for (_, render_target) in self.render_targets.iter_mut() {
            render_target.lose_context();
        }

        self.vertex_arrays.clear();
        self.fullscreen_quad = None;
        self.send_event(RafxDeviceEvent::Lost);
    }

    /// Re-probes the context, re-applies the default render state and re-uploads buffers.
    /// Textures, shaders and render targets are recreated on their next use.
    pub fn restore_context(&mut self) -> RafxResult<()> {
        profiling::scope!("restore_context");
        if self.context_state == RafxContextState::Active {
            return Ok(());
        }

        log::debug!("Restoring graphics context");
        let gl_context = &*self.gl_context;
        self.capabilities = RafxCapabilities::probe(
            gl_context,
            &self.device_def.quirks,
            self.user_agent.as_deref(),
        )?;
        self.format_table = RafxFormatTable::new(&self.capabilities);
        self.state.apply_defaults(gl_context, &self.capabilities)?;
        self.context_state = RafxContextState::Active;
        self.diagnostics.forget_reported();

        for (_, buffer) in self.vertex_buffers.iter_mut() {
            buffer.upload(gl_context, &mut self.stats.vram.vertex_buffers)?;
        }
        for (_, buffer) in self.index_buffers.iter_mut() {
            buffer.upload(
                gl_context,
                &mut self.state,
                &mut self.stats.vram.index_buffers,
            )?;
        }

        self.send_event(RafxDeviceEvent::Restored);
        Ok(())
    }

    /// Releases every GL object owned by the device. Called by `Drop` if not called explicitly.
    pub fn destroy(&mut self) -> RafxResult<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        log::trace!("Destroying GL device");

        let gl_context = &*self.gl_context;
        if let Some(fullscreen_quad) = self.fullscreen_quad.take() {
            fullscreen_quad.destroy(gl_context)?;
        }

        for (_, vertex_array_id) in self.vertex_arrays.drain() {
            gl_context.gl_destroy_vertex_array(vertex_array_id)?;
        }

        for mut render_target in self.render_targets.drain() {
            render_target.destroy(gl_context, &mut self.state)?;
        }

        for mut shader in self.shaders.drain() {
            shader.destroy(gl_context)?;
        }

        for mut buffer in self.vertex_buffers.drain() {
            buffer.destroy(gl_context, &mut self.stats.vram.vertex_buffers)?;
        }

        for mut buffer in self.index_buffers.drain() {
            buffer.destroy(gl_context, &mut self.stats.vram.index_buffers)?;
        }

        for mut texture in self.textures.drain() {
            texture.destroy(gl_context, &mut self.state, &mut self.stats.vram.textures)?;
        }

        self.current_shader = None;
        self.current_vertex_buffers.clear();
        self.current_index_buffer = None;
        self.current_render_target = None;
        self.diagnostics.forget_reported();
        Ok(())
    }
}
