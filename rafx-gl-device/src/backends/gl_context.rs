use super::gles_bindings;
use super::gles_bindings::types::GLenum;
use crate::{RafxApiTier, RafxContextAttributes, RafxResult};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);
pub const NONE_BUFFER: BufferId = BufferId(gles_bindings::NONE);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);
pub const NONE_TEXTURE: TextureId = TextureId(gles_bindings::NONE);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);
pub const NONE_FRAMEBUFFER: FramebufferId = FramebufferId(gles_bindings::NONE);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenderbufferId(pub u32);
pub const NONE_RENDERBUFFER: RenderbufferId = RenderbufferId(gles_bindings::NONE);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);
pub const NONE_SHADER: ShaderId = ShaderId(gles_bindings::NONE);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);
pub const NONE_PROGRAM: ProgramId = ProgramId(gles_bindings::NONE);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexArrayId(pub u32);
pub const NONE_VERTEX_ARRAY: VertexArrayId = VertexArrayId(gles_bindings::NONE);

/// A uniform location within one program
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocationId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveUniformInfo {
    pub name: String,
    pub size: u32,
    pub ty: u32,
}

/// Creates contexts for the device. Implemented per platform.
pub trait RafxGlContextProvider {
    /// The user agent of the host, if there is one. Consulted by the quirks table before a
    /// context exists.
    fn user_agent(&self) -> Option<String>;

    /// Create a context of the given tier. Returns `Ok(None)` if the tier is unavailable.
    fn create_context(
        &self,
        tier: RafxApiTier,
        attributes: &RafxContextAttributes,
    ) -> RafxResult<Option<Box<dyn GlContext>>>;
}

/// The GL ES 2/3 call surface the device is written against. Calls on the older tier that only
/// exist as extensions there (instancing, vertex arrays, draw buffers) are routed to the
/// extension by the implementation once `enable_extension` has succeeded for it.
///
/// Implementations are single threaded. Every call returns an error if the context reports one.
pub trait GlContext {
    //
    // Context queries
    //
    fn api_tier(&self) -> RafxApiTier;

    fn is_context_lost(&self) -> bool;

    fn drawing_buffer_size(&self) -> (u32, u32);

    fn set_drawing_buffer_size(
        &self,
        width: u32,
        height: u32,
    );

    fn user_agent(&self) -> Option<String>;

    fn supported_extensions(&self) -> Vec<String>;

    /// Enables the named extension. Returns false if it is not supported.
    fn enable_extension(
        &self,
        name: &str,
    ) -> bool;

    fn check_for_error(&self) -> RafxResult<()>;

    fn gl_get_integerv(
        &self,
        pname: GLenum,
    ) -> RafxResult<i32>;

    fn gl_get_floatv(
        &self,
        pname: GLenum,
    ) -> RafxResult<f32>;

    fn gl_get_string(
        &self,
        pname: GLenum,
    ) -> RafxResult<Option<String>>;

    /// Starts a feature-detection round trip for image bitmap decoding. `result` is set once the
    /// probe resolves. Must not block.
    fn start_image_bitmap_probe(
        &self,
        result: Arc<AtomicBool>,
    );

    //
    // Fixed function state
    //
    fn gl_enable(
        &self,
        cap: GLenum,
    ) -> RafxResult<()>;

    fn gl_disable(
        &self,
        cap: GLenum,
    ) -> RafxResult<()>;

    fn gl_blend_func_separate(
        &self,
        src_rgb: GLenum,
        dst_rgb: GLenum,
        src_alpha: GLenum,
        dst_alpha: GLenum,
    ) -> RafxResult<()>;

    fn gl_blend_equation_separate(
        &self,
        mode_rgb: GLenum,
        mode_alpha: GLenum,
    ) -> RafxResult<()>;

    fn gl_blend_color(
        &self,
        r: f32,
        g: f32,
        b: f32,
        a: f32,
    ) -> RafxResult<()>;

    fn gl_color_mask(
        &self,
        r: bool,
        g: bool,
        b: bool,
        a: bool,
    ) -> RafxResult<()>;

    fn gl_depth_mask(
        &self,
        flag: bool,
    ) -> RafxResult<()>;

    fn gl_depth_func(
        &self,
        func: GLenum,
    ) -> RafxResult<()>;

    fn gl_polygon_offset(
        &self,
        factor: f32,
        units: f32,
    ) -> RafxResult<()>;

    fn gl_cull_face(
        &self,
        mode: GLenum,
    ) -> RafxResult<()>;

    fn gl_stencil_func_separate(
        &self,
        face: GLenum,
        func: GLenum,
        reference: i32,
        mask: u32,
    ) -> RafxResult<()>;

    fn gl_stencil_op_separate(
        &self,
        face: GLenum,
        fail: GLenum,
        zfail: GLenum,
        zpass: GLenum,
    ) -> RafxResult<()>;

    fn gl_stencil_mask_separate(
        &self,
        face: GLenum,
        mask: u32,
    ) -> RafxResult<()>;

    fn gl_viewport(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> RafxResult<()>;

    fn gl_scissor(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> RafxResult<()>;

    fn gl_clear_color(
        &self,
        r: f32,
        g: f32,
        b: f32,
        a: f32,
    ) -> RafxResult<()>;

    fn gl_clear_depthf(
        &self,
        d: f32,
    ) -> RafxResult<()>;

    fn gl_clear_stencil(
        &self,
        s: i32,
    ) -> RafxResult<()>;

    fn gl_clear(
        &self,
        mask: u32,
    ) -> RafxResult<()>;

    fn gl_hint(
        &self,
        target: GLenum,
        mode: GLenum,
    ) -> RafxResult<()>;

    fn gl_pixel_storei(
        &self,
        pname: GLenum,
        param: i32,
    ) -> RafxResult<()>;

    fn gl_flush(&self) -> RafxResult<()>;

    //
    // Textures
    //
    fn gl_create_texture(&self) -> RafxResult<TextureId>;

    fn gl_destroy_texture(
        &self,
        texture_id: TextureId,
    ) -> RafxResult<()>;

    /// Selects texture unit `unit` (0-based, not the TEXTURE0 enum)
    fn gl_active_texture(
        &self,
        unit: u32,
    ) -> RafxResult<()>;

    fn gl_bind_texture(
        &self,
        target: GLenum,
        texture_id: TextureId,
    ) -> RafxResult<()>;

    fn gl_tex_parameteri(
        &self,
        target: GLenum,
        pname: GLenum,
        param: i32,
    ) -> RafxResult<()>;

    fn gl_tex_parameterf(
        &self,
        target: GLenum,
        pname: GLenum,
        param: f32,
    ) -> RafxResult<()>;

    #[allow(clippy::too_many_arguments)]
    fn gl_tex_image_2d(
        &self,
        target: GLenum,
        mip_level: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
        format: GLenum,
        type_: GLenum,
        pixels: Option<&[u8]>,
    ) -> RafxResult<()>;

    #[allow(clippy::too_many_arguments)]
    fn gl_tex_sub_image_2d(
        &self,
        target: GLenum,
        mip_level: u32,
        width: u32,
        height: u32,
        format: GLenum,
        type_: GLenum,
        pixels: &[u8],
    ) -> RafxResult<()>;

    /// Uploads a decoded image. Unpack flip/premultiply flags apply.
    fn gl_tex_image_2d_with_image(
        &self,
        target: GLenum,
        mip_level: u32,
        internal_format: GLenum,
        format: GLenum,
        type_: GLenum,
        image: &image::RgbaImage,
    ) -> RafxResult<()>;

    fn gl_tex_sub_image_2d_with_image(
        &self,
        target: GLenum,
        mip_level: u32,
        format: GLenum,
        type_: GLenum,
        image: &image::RgbaImage,
    ) -> RafxResult<()>;

    fn gl_compressed_tex_image_2d(
        &self,
        target: GLenum,
        mip_level: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> RafxResult<()>;

    fn gl_compressed_tex_sub_image_2d(
        &self,
        target: GLenum,
        mip_level: u32,
        width: u32,
        height: u32,
        format: GLenum,
        data: &[u8],
    ) -> RafxResult<()>;

    #[allow(clippy::too_many_arguments)]
    fn gl_tex_image_3d(
        &self,
        target: GLenum,
        mip_level: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
        depth: u32,
        format: GLenum,
        type_: GLenum,
        pixels: Option<&[u8]>,
    ) -> RafxResult<()>;

    #[allow(clippy::too_many_arguments)]
    fn gl_compressed_tex_image_3d(
        &self,
        target: GLenum,
        mip_level: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
        depth: u32,
        data: &[u8],
    ) -> RafxResult<()>;

    fn gl_generate_mipmap(
        &self,
        target: GLenum,
    ) -> RafxResult<()>;

    //
    // Buffers and vertex arrays
    //
    fn gl_create_buffer(&self) -> RafxResult<BufferId>;

    fn gl_destroy_buffer(
        &self,
        buffer_id: BufferId,
    ) -> RafxResult<()>;

    fn gl_bind_buffer(
        &self,
        target: GLenum,
        buffer_id: BufferId,
    ) -> RafxResult<()>;

    fn gl_buffer_data(
        &self,
        target: GLenum,
        data: &[u8],
        usage: GLenum,
    ) -> RafxResult<()>;

    fn gl_buffer_sub_data(
        &self,
        target: GLenum,
        offset: u32,
        data: &[u8],
    ) -> RafxResult<()>;

    fn gl_create_vertex_array(&self) -> RafxResult<VertexArrayId>;

    fn gl_destroy_vertex_array(
        &self,
        vertex_array_id: VertexArrayId,
    ) -> RafxResult<()>;

    fn gl_bind_vertex_array(
        &self,
        vertex_array_id: VertexArrayId,
    ) -> RafxResult<()>;

    fn gl_vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        type_: GLenum,
        normalized: bool,
        stride: u32,
        byte_offset: u32,
    ) -> RafxResult<()>;

    fn gl_enable_vertex_attrib_array(
        &self,
        index: u32,
    ) -> RafxResult<()>;

    fn gl_disable_vertex_attrib_array(
        &self,
        index: u32,
    ) -> RafxResult<()>;

    fn gl_vertex_attrib_divisor(
        &self,
        index: u32,
        divisor: u32,
    ) -> RafxResult<()>;

    //
    // Shaders and programs
    //
    fn gl_create_shader(
        &self,
        shader_type: GLenum,
    ) -> RafxResult<ShaderId>;

    fn gl_shader_source(
        &self,
        shader_id: ShaderId,
        source: &str,
    ) -> RafxResult<()>;

    fn gl_compile_shader(
        &self,
        shader_id: ShaderId,
    ) -> RafxResult<()>;

    fn gl_get_shaderiv(
        &self,
        shader_id: ShaderId,
        pname: GLenum,
    ) -> RafxResult<i32>;

    fn gl_get_shader_info_log(
        &self,
        shader_id: ShaderId,
    ) -> RafxResult<Option<String>>;

    fn gl_destroy_shader(
        &self,
        shader_id: ShaderId,
    ) -> RafxResult<()>;

    fn gl_create_program(&self) -> RafxResult<ProgramId>;

    fn gl_attach_shader(
        &self,
        program_id: ProgramId,
        shader_id: ShaderId,
    ) -> RafxResult<()>;

    fn gl_bind_attrib_location(
        &self,
        program_id: ProgramId,
        index: u32,
        name: &str,
    ) -> RafxResult<()>;

    fn gl_link_program(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<()>;

    fn gl_get_programiv(
        &self,
        program_id: ProgramId,
        pname: GLenum,
    ) -> RafxResult<i32>;

    fn gl_get_program_info_log(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<Option<String>>;

    fn gl_destroy_program(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<()>;

    fn gl_use_program(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<()>;

    fn gl_get_active_uniform(
        &self,
        program_id: ProgramId,
        index: u32,
    ) -> RafxResult<ActiveUniformInfo>;

    fn gl_get_uniform_location(
        &self,
        program_id: ProgramId,
        name: &str,
    ) -> RafxResult<Option<LocationId>>;

    //
    // Uniforms. The element count is implied by the slice length.
    //
    fn gl_uniform_1iv(
        &self,
        location: &LocationId,
        data: &[i32],
    ) -> RafxResult<()>;

    fn gl_uniform_2iv(
        &self,
        location: &LocationId,
        data: &[i32],
    ) -> RafxResult<()>;

    fn gl_uniform_3iv(
        &self,
        location: &LocationId,
        data: &[i32],
    ) -> RafxResult<()>;

    fn gl_uniform_4iv(
        &self,
        location: &LocationId,
        data: &[i32],
    ) -> RafxResult<()>;

    fn gl_uniform_1fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()>;

    fn gl_uniform_2fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()>;

    fn gl_uniform_3fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()>;

    fn gl_uniform_4fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()>;

    fn gl_uniform_matrix_2fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()>;

    fn gl_uniform_matrix_3fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()>;

    fn gl_uniform_matrix_4fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()>;

    //
    // Framebuffers
    //
    fn gl_create_framebuffer(&self) -> RafxResult<FramebufferId>;

    fn gl_destroy_framebuffer(
        &self,
        framebuffer_id: FramebufferId,
    ) -> RafxResult<()>;

    fn gl_bind_framebuffer(
        &self,
        target: GLenum,
        framebuffer_id: FramebufferId,
    ) -> RafxResult<()>;

    fn gl_framebuffer_texture_2d(
        &self,
        target: GLenum,
        attachment: GLenum,
        texture_target: GLenum,
        texture_id: TextureId,
        mip_level: u32,
    ) -> RafxResult<()>;

    fn gl_create_renderbuffer(&self) -> RafxResult<RenderbufferId>;

    fn gl_destroy_renderbuffer(
        &self,
        renderbuffer_id: RenderbufferId,
    ) -> RafxResult<()>;

    fn gl_bind_renderbuffer(
        &self,
        target: GLenum,
        renderbuffer_id: RenderbufferId,
    ) -> RafxResult<()>;

    fn gl_renderbuffer_storage(
        &self,
        target: GLenum,
        internal_format: GLenum,
        width: u32,
        height: u32,
    ) -> RafxResult<()>;

    fn gl_renderbuffer_storage_multisample(
        &self,
        target: GLenum,
        samples: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
    ) -> RafxResult<()>;

    fn gl_framebuffer_renderbuffer(
        &self,
        target: GLenum,
        attachment: GLenum,
        renderbuffer_target: GLenum,
        renderbuffer_id: RenderbufferId,
    ) -> RafxResult<()>;

    fn gl_check_framebuffer_status(
        &self,
        target: GLenum,
    ) -> RafxResult<u32>;

    fn gl_draw_buffers(
        &self,
        buffers: &[GLenum],
    ) -> RafxResult<()>;

    #[allow(clippy::too_many_arguments)]
    fn gl_blit_framebuffer(
        &self,
        src_x0: i32,
        src_y0: i32,
        src_x1: i32,
        src_y1: i32,
        dst_x0: i32,
        dst_y0: i32,
        dst_x1: i32,
        dst_y1: i32,
        mask: u32,
        filter: GLenum,
    ) -> RafxResult<()>;

    fn gl_invalidate_framebuffer(
        &self,
        target: GLenum,
        attachments: &[GLenum],
    ) -> RafxResult<()>;

    //
    // Draws
    //
    fn gl_draw_arrays(
        &self,
        mode: GLenum,
        first: i32,
        count: i32,
    ) -> RafxResult<()>;

    fn gl_draw_elements(
        &self,
        mode: GLenum,
        count: i32,
        type_: GLenum,
        byte_offset: u32,
    ) -> RafxResult<()>;

    fn gl_draw_arrays_instanced(
        &self,
        mode: GLenum,
        first: i32,
        count: i32,
        instance_count: i32,
    ) -> RafxResult<()>;

    fn gl_draw_elements_instanced(
        &self,
        mode: GLenum,
        count: i32,
        type_: GLenum,
        byte_offset: u32,
        instance_count: i32,
    ) -> RafxResult<()>;
}

/// Compile a single shader stage, returning the info log as the error on failure
pub fn compile_shader(
    gl_context: &dyn GlContext,
    shader_type: GLenum,
    src: &str,
) -> RafxResult<ShaderId> {
    let shader_id = gl_context.gl_create_shader(shader_type)?;
    gl_context.gl_shader_source(shader_id, src)?;
    gl_context.gl_compile_shader(shader_id)?;
    if gl_context.gl_get_shaderiv(shader_id, gles_bindings::COMPILE_STATUS)? == 0 {
        let error = match gl_context.gl_get_shader_info_log(shader_id)? {
            Some(x) => format!("Error compiling shader: {}", x),
            None => "Error compiling shader, info log not available".to_string(),
        };
        gl_context.gl_destroy_shader(shader_id)?;
        Err(error)?;
    }

    if let Ok(Some(debug_info)) = gl_context.gl_get_shader_info_log(shader_id) {
        log::debug!("Debug info while compiling shader: {}", debug_info);
    }

    Ok(shader_id)
}

/// Check the link status of a program that has already been linked
pub fn check_program_link_status(
    gl_context: &dyn GlContext,
    program_id: ProgramId,
) -> RafxResult<()> {
    if gl_context.gl_get_programiv(program_id, gles_bindings::LINK_STATUS)? == 0 {
        return Err(match gl_context.gl_get_program_info_log(program_id)? {
            Some(x) => format!("Error linking shader program: {}", x),
            None => "Error linking shader program, info log not available".to_string(),
        })?;
    }

    if let Ok(Some(debug_info)) = gl_context.gl_get_program_info_log(program_id) {
        log::debug!("Debug info while linking shader program: {}", debug_info);
    }

    Ok(())
}
