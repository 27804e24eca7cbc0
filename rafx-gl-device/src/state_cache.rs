//! Shadow copy of the mutable GL state. Every setter compares against the cached value and only
//! reaches the context when something changed. Each sub-aspect (blend enable, blend function,
//! color mask, ...) is tracked separately, so a change to one part of a state object emits only
//! the call for that part.

use crate::backends::gles_bindings;
use crate::backends::gles_bindings::types::GLenum;
use crate::backends::{
    BufferId, FramebufferId, GlContext, ProgramId, TextureId, VertexArrayId, NONE_BUFFER,
    NONE_FRAMEBUFFER, NONE_PROGRAM, NONE_TEXTURE, NONE_VERTEX_ARRAY,
};
use crate::{
    RafxBlendState, RafxCapabilities, RafxColorFlags, RafxCompareOp, RafxCullMode,
    RafxDepthState, RafxResult, RafxStencilParameters,
};

/// Index of a texture target within the per-unit binding table
pub(crate) fn texture_slot(target: GLenum) -> usize {
    match target {
        gles_bindings::TEXTURE_CUBE_MAP => 1,
        gles_bindings::TEXTURE_3D => 2,
        _ => 0,
    }
}

const TEXTURE_TARGETS: [GLenum; 3] = [
    gles_bindings::TEXTURE_2D,
    gles_bindings::TEXTURE_CUBE_MAP,
    gles_bindings::TEXTURE_3D,
];

/// Depth state as actually applied. Depth writes are ignored by GL while the depth test is off,
/// so a request to write without testing becomes a test that always passes.
pub fn effective_depth_state(depth_state: &RafxDepthState) -> RafxDepthState {
    if depth_state.write && !depth_state.test {
        RafxDepthState {
            test: true,
            func: RafxCompareOp::Always,
            ..*depth_state
        }
    } else {
        *depth_state
    }
}

fn set_capability(
    gl_context: &dyn GlContext,
    cap: GLenum,
    enabled: bool,
) -> RafxResult<()> {
    if enabled {
        gl_context.gl_enable(cap)
    } else {
        gl_context.gl_disable(cap)
    }
}

pub struct RafxStateCache {
    blend_state: RafxBlendState,
    blend_color: [f32; 4],
    depth_state: RafxDepthState,
    cull_mode: RafxCullMode,
    // Face selection last sent, kept while culling is disabled
    cull_face: GLenum,
    stencil_test: bool,
    stencil_front: RafxStencilParameters,
    stencil_back: RafxStencilParameters,
    viewport: [i32; 4],
    scissor: [i32; 4],
    scissor_test: bool,
    // None means the binding is unknown and the next request always reaches the context
    framebuffer: Option<FramebufferId>,
    program: Option<ProgramId>,
    active_unit: u32,
    textures: Vec<[Option<TextureId>; 3]>,
    vertex_array: Option<VertexArrayId>,
    index_buffer: Option<BufferId>,
    unpack_flip_y: bool,
    unpack_premultiply_alpha: bool,
    clear_color: [f32; 4],
    clear_depth: f32,
    clear_stencil: u32,
}

impl RafxStateCache {
    pub fn new(texture_unit_count: u32) -> Self {
        RafxStateCache {
            blend_state: RafxBlendState::NO_BLEND,
            blend_color: [0.0; 4],
            depth_state: RafxDepthState::DEFAULT,
            cull_mode: RafxCullMode::Back,
            cull_face: gles_bindings::BACK,
            stencil_test: false,
            stencil_front: RafxStencilParameters::default(),
            stencil_back: RafxStencilParameters::default(),
            viewport: [0; 4],
            scissor: [0; 4],
            scissor_test: true,
            framebuffer: None,
            program: None,
            active_unit: 0,
            textures: vec![[None; 3]; texture_unit_count.max(1) as usize],
            vertex_array: None,
            index_buffer: None,
            unpack_flip_y: false,
            unpack_premultiply_alpha: false,
            clear_color: [0.0; 4],
            clear_depth: 1.0,
            clear_stencil: 0,
        }
    }

    /// Resets the cache to the default render state and sends every part of it unconditionally.
    /// Used on a fresh context, at creation and after restoration.
    #[profiling::function]
    pub fn apply_defaults(
        &mut self,
        gl_context: &dyn GlContext,
        capabilities: &RafxCapabilities,
    ) -> RafxResult<()> {
        *self = RafxStateCache::new(capabilities.limits.max_combined_textures);

        let blend = &self.blend_state;
        gl_context.gl_disable(gles_bindings::BLEND)?;
        gl_context.gl_blend_func_separate(
            blend.color_src_factor.gl_blend_factor(),
            blend.color_dst_factor.gl_blend_factor(),
            blend.alpha_src_factor.gl_blend_factor(),
            blend.alpha_dst_factor.gl_blend_factor(),
        )?;
        gl_context.gl_blend_equation_separate(
            blend.color_op.gl_blend_op(),
            blend.alpha_op.gl_blend_op(),
        )?;
        gl_context.gl_color_mask(true, true, true, true)?;
        gl_context.gl_blend_color(0.0, 0.0, 0.0, 0.0)?;

        gl_context.gl_enable(gles_bindings::CULL_FACE)?;
        gl_context.gl_cull_face(gles_bindings::BACK)?;

        gl_context.gl_enable(gles_bindings::DEPTH_TEST)?;
        gl_context.gl_depth_func(gles_bindings::LEQUAL)?;
        gl_context.gl_depth_mask(true)?;

        let stencil = &self.stencil_front;
        gl_context.gl_disable(gles_bindings::STENCIL_TEST)?;
        gl_context.gl_stencil_func_separate(
            gles_bindings::FRONT_AND_BACK,
            stencil.func.gl_compare_op(),
            stencil.reference as i32,
            stencil.read_mask,
        )?;
        gl_context.gl_stencil_op_separate(
            gles_bindings::FRONT_AND_BACK,
            stencil.fail.gl_stencil_op(),
            stencil.zfail.gl_stencil_op(),
            stencil.zpass.gl_stencil_op(),
        )?;
        gl_context.gl_stencil_mask_separate(gles_bindings::FRONT_AND_BACK, stencil.write_mask)?;

        gl_context.gl_disable(gles_bindings::POLYGON_OFFSET_FILL)?;
        gl_context.gl_polygon_offset(0.0, 0.0)?;

        gl_context.gl_clear_color(0.0, 0.0, 0.0, 0.0)?;
        gl_context.gl_clear_depthf(1.0)?;
        gl_context.gl_clear_stencil(0)?;

        gl_context.gl_enable(gles_bindings::SCISSOR_TEST)?;

        if capabilities.features.standard_derivatives {
            gl_context.gl_hint(
                gles_bindings::FRAGMENT_SHADER_DERIVATIVE_HINT,
                gles_bindings::NICEST,
            )?;
        }

        gl_context.gl_pixel_storei(gles_bindings::UNPACK_FLIP_Y_WEBGL, 0)?;
        gl_context.gl_pixel_storei(gles_bindings::UNPACK_PREMULTIPLY_ALPHA_WEBGL, 0)?;
        gl_context.gl_pixel_storei(gles_bindings::UNPACK_ALIGNMENT, 1)?;

        let (width, height) = gl_context.drawing_buffer_size();
        self.viewport = [0, 0, width as i32, height as i32];
        self.scissor = self.viewport;
        gl_context.gl_viewport(0, 0, width as i32, height as i32)?;
        gl_context.gl_scissor(0, 0, width as i32, height as i32)?;

        // A fresh context has nothing bound
        gl_context.gl_active_texture(0)?;
        self.framebuffer = Some(NONE_FRAMEBUFFER);
        self.program = Some(NONE_PROGRAM);
        self.vertex_array = Some(NONE_VERTEX_ARRAY);
        self.index_buffer = Some(NONE_BUFFER);
        for unit in &mut self.textures {
            *unit = [Some(NONE_TEXTURE); 3];
        }

        Ok(())
    }

    pub fn blend_state(&self) -> &RafxBlendState {
        &self.blend_state
    }

    pub fn set_blend_state(
        &mut self,
        gl_context: &dyn GlContext,
        blend_state: &RafxBlendState,
    ) -> RafxResult<()> {
        let cached = self.blend_state;
        if cached == *blend_state {
            return Ok(());
        }

        if cached.blend != blend_state.blend {
            set_capability(gl_context, gles_bindings::BLEND, blend_state.blend)?;
        }

        if cached.color_op != blend_state.color_op || cached.alpha_op != blend_state.alpha_op {
            gl_context.gl_blend_equation_separate(
                blend_state.color_op.gl_blend_op(),
                blend_state.alpha_op.gl_blend_op(),
            )?;
        }

        if cached.color_src_factor != blend_state.color_src_factor
            || cached.color_dst_factor != blend_state.color_dst_factor
            || cached.alpha_src_factor != blend_state.alpha_src_factor
            || cached.alpha_dst_factor != blend_state.alpha_dst_factor
        {
            gl_context.gl_blend_func_separate(
                blend_state.color_src_factor.gl_blend_factor(),
                blend_state.color_dst_factor.gl_blend_factor(),
                blend_state.alpha_src_factor.gl_blend_factor(),
                blend_state.alpha_dst_factor.gl_blend_factor(),
            )?;
        }

        if cached.color_write != blend_state.color_write {
            let mask = blend_state.color_write;
            gl_context.gl_color_mask(
                mask.intersects(RafxColorFlags::RED),
                mask.intersects(RafxColorFlags::GREEN),
                mask.intersects(RafxColorFlags::BLUE),
                mask.intersects(RafxColorFlags::ALPHA),
            )?;
        }

        self.blend_state = *blend_state;
        Ok(())
    }

    pub fn set_blend_color(
        &mut self,
        gl_context: &dyn GlContext,
        color: [f32; 4],
    ) -> RafxResult<()> {
        if self.blend_color != color {
            gl_context.gl_blend_color(color[0], color[1], color[2], color[3])?;
            self.blend_color = color;
        }
        Ok(())
    }

    /// The effective depth state, with the write-without-test compensation applied
    pub fn depth_state(&self) -> &RafxDepthState {
        &self.depth_state
    }

    pub fn set_depth_state(
        &mut self,
        gl_context: &dyn GlContext,
        depth_state: &RafxDepthState,
    ) -> RafxResult<()> {
        let requested = effective_depth_state(depth_state);
        let cached = self.depth_state;
        if cached == requested {
            return Ok(());
        }

        if cached.test != requested.test {
            set_capability(gl_context, gles_bindings::DEPTH_TEST, requested.test)?;
        }

        if cached.func != requested.func {
            gl_context.gl_depth_func(requested.func.gl_compare_op())?;
        }

        if cached.write != requested.write {
            gl_context.gl_depth_mask(requested.write)?;
        }

        let offset_enabled = |x: &RafxDepthState| x.depth_bias != 0.0 || x.depth_bias_slope != 0.0;
        if offset_enabled(&cached) != offset_enabled(&requested) {
            set_capability(
                gl_context,
                gles_bindings::POLYGON_OFFSET_FILL,
                offset_enabled(&requested),
            )?;
        }

        if cached.depth_bias != requested.depth_bias
            || cached.depth_bias_slope != requested.depth_bias_slope
        {
            gl_context.gl_polygon_offset(requested.depth_bias_slope, requested.depth_bias)?;
        }

        self.depth_state = requested;
        Ok(())
    }

    pub fn cull_mode(&self) -> RafxCullMode {
        self.cull_mode
    }

    pub fn set_cull_mode(
        &mut self,
        gl_context: &dyn GlContext,
        cull_mode: RafxCullMode,
    ) -> RafxResult<()> {
        if self.cull_mode == cull_mode {
            return Ok(());
        }

        let was_enabled = self.cull_mode != RafxCullMode::None;
        let face = cull_mode.gl_cull_mode();
        if was_enabled != face.is_some() {
            set_capability(gl_context, gles_bindings::CULL_FACE, face.is_some())?;
        }

        if let Some(face) = face {
            if face != self.cull_face {
                gl_context.gl_cull_face(face)?;
                self.cull_face = face;
            }
        }

        self.cull_mode = cull_mode;
        Ok(())
    }

    pub fn stencil_test(&self) -> bool {
        self.stencil_test
    }

    pub fn set_stencil_test(
        &mut self,
        gl_context: &dyn GlContext,
        enabled: bool,
    ) -> RafxResult<()> {
        if self.stencil_test != enabled {
            set_capability(gl_context, gles_bindings::STENCIL_TEST, enabled)?;
            self.stencil_test = enabled;
        }
        Ok(())
    }

    pub fn stencil_state(&self) -> (&RafxStencilParameters, &RafxStencilParameters) {
        (&self.stencil_front, &self.stencil_back)
    }

    /// Applies per-face stencil parameters. When both faces change to the same value a single
    /// FRONT_AND_BACK call is made instead of one per face.
    pub fn set_stencil_state(
        &mut self,
        gl_context: &dyn GlContext,
        front: &RafxStencilParameters,
        back: &RafxStencilParameters,
    ) -> RafxResult<()> {
        fn func(x: &RafxStencilParameters) -> (RafxCompareOp, u32, u32) {
            (x.func, x.reference, x.read_mask)
        }

        fn ops(x: &RafxStencilParameters) -> [crate::RafxStencilOp; 3] {
            [x.fail, x.zfail, x.zpass]
        }

        fn write_mask(x: &RafxStencilParameters) -> u32 {
            x.write_mask
        }

        // Yields the faces to update for one sub-aspect
        fn faces<T: PartialEq>(
            cached_front: T,
            cached_back: T,
            front: T,
            back: T,
        ) -> &'static [GLenum] {
            let front_changed = cached_front != front;
            let back_changed = cached_back != back;
            match (front_changed, back_changed) {
                (true, true) if front == back => &[gles_bindings::FRONT_AND_BACK],
                (true, true) => &[gles_bindings::FRONT, gles_bindings::BACK],
                (true, false) => &[gles_bindings::FRONT],
                (false, true) => &[gles_bindings::BACK],
                (false, false) => &[],
            }
        }

        let params_for = |face: GLenum| {
            if face == gles_bindings::BACK {
                back
            } else {
                front
            }
        };

        for &face in faces(
            func(&self.stencil_front),
            func(&self.stencil_back),
            func(front),
            func(back),
        ) {
            let params = params_for(face);
            gl_context.gl_stencil_func_separate(
                face,
                params.func.gl_compare_op(),
                params.reference as i32,
                params.read_mask,
            )?;
        }

        for &face in faces(
            ops(&self.stencil_front),
            ops(&self.stencil_back),
            ops(front),
            ops(back),
        ) {
            let params = params_for(face);
            gl_context.gl_stencil_op_separate(
                face,
                params.fail.gl_stencil_op(),
                params.zfail.gl_stencil_op(),
                params.zpass.gl_stencil_op(),
            )?;
        }

        for &face in faces(
            write_mask(&self.stencil_front),
            write_mask(&self.stencil_back),
            write_mask(front),
            write_mask(back),
        ) {
            gl_context.gl_stencil_mask_separate(face, params_for(face).write_mask)?;
        }

        self.stencil_front = *front;
        self.stencil_back = *back;
        Ok(())
    }

    pub fn viewport(&self) -> [i32; 4] {
        self.viewport
    }

    pub fn set_viewport(
        &mut self,
        gl_context: &dyn GlContext,
        viewport: [i32; 4],
    ) -> RafxResult<()> {
        if self.viewport != viewport {
            gl_context.gl_viewport(viewport[0], viewport[1], viewport[2], viewport[3])?;
            self.viewport = viewport;
        }
        Ok(())
    }

    pub fn scissor(&self) -> [i32; 4] {
        self.scissor
    }

    pub fn set_scissor(
        &mut self,
        gl_context: &dyn GlContext,
        scissor: [i32; 4],
    ) -> RafxResult<()> {
        if self.scissor != scissor {
            gl_context.gl_scissor(scissor[0], scissor[1], scissor[2], scissor[3])?;
            self.scissor = scissor;
        }
        Ok(())
    }

    pub fn set_scissor_test(
        &mut self,
        gl_context: &dyn GlContext,
        enabled: bool,
    ) -> RafxResult<()> {
        if self.scissor_test != enabled {
            set_capability(gl_context, gles_bindings::SCISSOR_TEST, enabled)?;
            self.scissor_test = enabled;
        }
        Ok(())
    }

    pub fn framebuffer(&self) -> Option<FramebufferId> {
        self.framebuffer
    }

    pub fn bind_framebuffer(
        &mut self,
        gl_context: &dyn GlContext,
        framebuffer_id: FramebufferId,
    ) -> RafxResult<()> {
        if self.framebuffer != Some(framebuffer_id) {
            gl_context.gl_bind_framebuffer(gles_bindings::FRAMEBUFFER, framebuffer_id)?;
            self.framebuffer = Some(framebuffer_id);
        }
        Ok(())
    }

    /// Call after binding READ/DRAW framebuffers directly
    pub fn invalidate_framebuffer(&mut self) {
        self.framebuffer = None;
    }

    /// Returns true if the program changed
    pub fn use_program(
        &mut self,
        gl_context: &dyn GlContext,
        program_id: ProgramId,
    ) -> RafxResult<bool> {
        if self.program == Some(program_id) {
            return Ok(false);
        }

        gl_context.gl_use_program(program_id)?;
        self.program = Some(program_id);
        Ok(true)
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn invalidate_program(&mut self) {
        self.program = None;
    }

    pub fn active_unit(&self) -> u32 {
        self.active_unit
    }

    pub fn set_active_unit(
        &mut self,
        gl_context: &dyn GlContext,
        unit: u32,
    ) -> RafxResult<()> {
        if self.active_unit != unit {
            gl_context.gl_active_texture(unit)?;
            self.active_unit = unit;
        }
        Ok(())
    }

    pub fn bound_texture(
        &self,
        unit: u32,
        target: GLenum,
    ) -> Option<TextureId> {
        self.textures
            .get(unit as usize)
            .and_then(|x| x[texture_slot(target)])
    }

    /// Binds a texture to `target` on `unit`, activating the unit only if the binding changes
    pub fn bind_texture(
        &mut self,
        gl_context: &dyn GlContext,
        unit: u32,
        target: GLenum,
        texture_id: TextureId,
    ) -> RafxResult<()> {
        let slot = texture_slot(target);
        if let Some(bindings) = self.textures.get(unit as usize) {
            if bindings[slot] == Some(texture_id) {
                return Ok(());
            }
        }

        self.set_active_unit(gl_context, unit)?;
        gl_context.gl_bind_texture(target, texture_id)?;
        if let Some(bindings) = self.textures.get_mut(unit as usize) {
            bindings[slot] = Some(texture_id);
        }
        Ok(())
    }

    /// Forgets any cached binding of the texture, used when it is destroyed so that a recycled id
    /// is rebound
    pub fn forget_texture(
        &mut self,
        texture_id: TextureId,
    ) {
        for bindings in &mut self.textures {
            for binding in bindings.iter_mut() {
                if *binding == Some(texture_id) {
                    *binding = None;
                }
            }
        }
    }

    /// Marks the bindings on `unit` as unknown after something bound textures directly
    pub fn invalidate_texture_unit(
        &mut self,
        unit: u32,
    ) {
        if let Some(bindings) = self.textures.get_mut(unit as usize) {
            *bindings = [None; 3];
        }
    }

    /// Unbinds every target of every unit the texture is bound to
    pub fn unbind_texture(
        &mut self,
        gl_context: &dyn GlContext,
        texture_id: TextureId,
    ) -> RafxResult<()> {
        for unit in 0..self.textures.len() as u32 {
            for (slot, target) in TEXTURE_TARGETS.iter().enumerate() {
                if self.textures[unit as usize][slot] == Some(texture_id) {
                    self.bind_texture(gl_context, unit, *target, NONE_TEXTURE)?;
                }
            }
        }
        Ok(())
    }

    pub fn vertex_array(&self) -> Option<VertexArrayId> {
        self.vertex_array
    }

    /// Binding a different vertex array also changes the element buffer binding, which lives in
    /// vertex array state
    pub fn bind_vertex_array(
        &mut self,
        gl_context: &dyn GlContext,
        vertex_array_id: VertexArrayId,
    ) -> RafxResult<()> {
        if self.vertex_array != Some(vertex_array_id) {
            gl_context.gl_bind_vertex_array(vertex_array_id)?;
            self.vertex_array = Some(vertex_array_id);
            self.index_buffer = None;
        }
        Ok(())
    }

    pub fn bind_index_buffer(
        &mut self,
        gl_context: &dyn GlContext,
        buffer_id: BufferId,
    ) -> RafxResult<()> {
        if self.index_buffer != Some(buffer_id) {
            gl_context.gl_bind_buffer(gles_bindings::ELEMENT_ARRAY_BUFFER, buffer_id)?;
            self.index_buffer = Some(buffer_id);
        }
        Ok(())
    }

    pub fn forget_index_buffer(
        &mut self,
        buffer_id: BufferId,
    ) {
        if self.index_buffer == Some(buffer_id) {
            self.index_buffer = None;
        }
    }

    pub fn set_unpack_flip_y(
        &mut self,
        gl_context: &dyn GlContext,
        flip_y: bool,
    ) -> RafxResult<()> {
        if self.unpack_flip_y != flip_y {
            gl_context.gl_pixel_storei(gles_bindings::UNPACK_FLIP_Y_WEBGL, flip_y as i32)?;
            self.unpack_flip_y = flip_y;
        }
        Ok(())
    }

    pub fn set_unpack_premultiply_alpha(
        &mut self,
        gl_context: &dyn GlContext,
        premultiply_alpha: bool,
    ) -> RafxResult<()> {
        if self.unpack_premultiply_alpha != premultiply_alpha {
            gl_context.gl_pixel_storei(
                gles_bindings::UNPACK_PREMULTIPLY_ALPHA_WEBGL,
                premultiply_alpha as i32,
            )?;
            self.unpack_premultiply_alpha = premultiply_alpha;
        }
        Ok(())
    }

    pub fn set_clear_color(
        &mut self,
        gl_context: &dyn GlContext,
        color: [f32; 4],
    ) -> RafxResult<()> {
        if self.clear_color != color {
            gl_context.gl_clear_color(color[0], color[1], color[2], color[3])?;
            self.clear_color = color;
        }
        Ok(())
    }

    pub fn set_clear_depth(
        &mut self,
        gl_context: &dyn GlContext,
        depth: f32,
    ) -> RafxResult<()> {
        if self.clear_depth != depth {
            gl_context.gl_clear_depthf(depth)?;
            self.clear_depth = depth;
        }
        Ok(())
    }

    pub fn set_clear_stencil(
        &mut self,
        gl_context: &dyn GlContext,
        stencil: u32,
    ) -> RafxResult<()> {
        if self.clear_stencil != stencil {
            gl_context.gl_clear_stencil(stencil as i32)?;
            self.clear_stencil = stencil;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::recording::{GlCall, RecordingGlConfig, RecordingGlContext};
    use crate::{RafxQuirksTable, RafxStencilOp};

    fn setup() -> (RecordingGlContext, RafxStateCache) {
        let context = RecordingGlContext::new(RecordingGlConfig::gles3());
        let capabilities =
            RafxCapabilities::probe(&context, &RafxQuirksTable::empty(), None).unwrap();
        let mut cache = RafxStateCache::new(0);
        cache.apply_defaults(&context, &capabilities).unwrap();
        context.clear_calls();
        (context, cache)
    }

    #[test]
    fn repeated_blend_state_emits_once() {
        let (context, mut cache) = setup();
        for _ in 0..3 {
            cache
                .set_blend_state(&context, &RafxBlendState::ALPHA_BLEND)
                .unwrap();
        }
        assert_eq!(
            context.calls(),
            vec![
                GlCall::Enable(gles_bindings::BLEND),
                GlCall::BlendFuncSeparate(
                    gles_bindings::SRC_ALPHA,
                    gles_bindings::ONE_MINUS_SRC_ALPHA,
                    gles_bindings::ONE,
                    gles_bindings::ONE_MINUS_SRC_ALPHA
                ),
            ]
        );

        // Only the enable flag differs from the default
        context.clear_calls();
        let mut no_blend = RafxBlendState::ALPHA_BLEND;
        no_blend.blend = false;
        cache.set_blend_state(&context, &no_blend).unwrap();
        assert_eq!(context.calls(), vec![GlCall::Disable(gles_bindings::BLEND)]);
    }

    #[test]
    fn depth_write_without_test_is_compensated() {
        let (context, mut cache) = setup();
        cache
            .set_depth_state(&context, &RafxDepthState::WRITE_DEPTH)
            .unwrap();
        assert!(cache.depth_state().test);
        assert_eq!(cache.depth_state().func, RafxCompareOp::Always);
        // Test was already on, only the comparison changes
        assert_eq!(
            context.calls(),
            vec![GlCall::DepthFunc(gles_bindings::ALWAYS)]
        );

        context.clear_calls();
        cache
            .set_depth_state(&context, &RafxDepthState::NO_TEST_NO_WRITE)
            .unwrap();
        assert_eq!(
            context.calls(),
            vec![
                GlCall::Disable(gles_bindings::DEPTH_TEST),
                GlCall::DepthFunc(gles_bindings::LEQUAL),
                GlCall::DepthMask(false),
            ]
        );
    }

    #[test]
    fn cull_mode_transitions() {
        let (context, mut cache) = setup();
        cache.set_cull_mode(&context, RafxCullMode::Back).unwrap();
        assert_eq!(context.call_count(), 0);

        cache.set_cull_mode(&context, RafxCullMode::None).unwrap();
        cache.set_cull_mode(&context, RafxCullMode::Back).unwrap();
        cache.set_cull_mode(&context, RafxCullMode::Front).unwrap();
        assert_eq!(
            context.calls(),
            vec![
                GlCall::Disable(gles_bindings::CULL_FACE),
                GlCall::Enable(gles_bindings::CULL_FACE),
                GlCall::CullFace(gles_bindings::FRONT),
            ]
        );
    }

    #[test]
    fn stencil_uses_combined_face_when_equal() {
        let (context, mut cache) = setup();
        let params = RafxStencilParameters {
            func: RafxCompareOp::Equal,
            reference: 1,
            ..Default::default()
        };
        cache.set_stencil_state(&context, &params, &params).unwrap();
        assert_eq!(
            context.calls(),
            vec![GlCall::StencilFuncSeparate {
                face: gles_bindings::FRONT_AND_BACK,
                func: gles_bindings::EQUAL,
                reference: 1,
                mask: 0xFF,
            }]
        );

        context.clear_calls();
        let back = RafxStencilParameters {
            zpass: RafxStencilOp::Replace,
            ..params
        };
        cache.set_stencil_state(&context, &params, &back).unwrap();
        assert_eq!(
            context.calls(),
            vec![GlCall::StencilOpSeparate {
                face: gles_bindings::BACK,
                fail: gles_bindings::KEEP,
                zfail: gles_bindings::KEEP,
                zpass: gles_bindings::REPLACE,
            }]
        );
    }

    #[test]
    fn texture_binding_activates_unit_on_change() {
        let (context, mut cache) = setup();
        let texture_id = TextureId(1000);
        cache
            .bind_texture(&context, 3, gles_bindings::TEXTURE_2D, texture_id)
            .unwrap();
        cache
            .bind_texture(&context, 3, gles_bindings::TEXTURE_2D, texture_id)
            .unwrap();
        assert_eq!(
            context.calls(),
            vec![
                GlCall::ActiveTexture(3),
                GlCall::BindTexture(gles_bindings::TEXTURE_2D, texture_id),
            ]
        );
        assert_eq!(
            cache.bound_texture(3, gles_bindings::TEXTURE_2D),
            Some(texture_id)
        );
        assert_eq!(
            cache.bound_texture(3, gles_bindings::TEXTURE_CUBE_MAP),
            Some(NONE_TEXTURE)
        );
    }

    #[test]
    fn vertex_array_change_forgets_index_buffer() {
        let (context, mut cache) = setup();
        cache.bind_index_buffer(&context, BufferId(5)).unwrap();
        cache.bind_vertex_array(&context, VertexArrayId(9)).unwrap();
        cache.bind_index_buffer(&context, BufferId(5)).unwrap();
        assert_eq!(
            context.calls(),
            vec![
                GlCall::BindBuffer(gles_bindings::ELEMENT_ARRAY_BUFFER, BufferId(5)),
                GlCall::BindVertexArray(VertexArrayId(9)),
                GlCall::BindBuffer(gles_bindings::ELEMENT_ARRAY_BUFFER, BufferId(5)),
            ]
        );
    }
}
