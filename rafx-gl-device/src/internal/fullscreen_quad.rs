use crate::backends::gles_bindings;
use crate::backends::{
    compile_shader, BufferId, GlContext, ProgramId, TextureId, NONE_BUFFER, NONE_PROGRAM,
    NONE_TEXTURE,
};
use crate::RafxResult;

const FULLSCREEN_QUAD_VERT: &str = "attribute vec2 pos;
attribute vec2 uv;
varying vec2 v_uv;
void main() {
    v_uv = uv;
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

const FULLSCREEN_QUAD_FRAG: &str = "precision mediump float;
uniform sampler2D texture_source;
varying vec2 v_uv;
void main() {
    gl_FragColor = texture2D(texture_source, v_uv);
}
";

#[rustfmt::skip]
const QUAD_VERTICES: [f32; 24] = [
    -1.0, 1.0, 0.0, 1.0,
    -1.0, -1.0, 0.0, 0.0,
    1.0, -1.0, 1.0, 0.0,
    -1.0, 1.0, 0.0, 1.0,
    1.0, -1.0, 1.0, 0.0,
    1.0, 1.0, 1.0, 1.0
];

/// Draws a texture over the whole bound framebuffer. Used to copy color where framebuffer blits
/// are unavailable. The caller is responsible for depth/blend state and the vertex array binding,
/// and must treat the program and the texture binding on the active unit as clobbered.
pub(crate) struct FullscreenQuad {
    program_id: ProgramId,
    buffer_id: BufferId,
}

impl FullscreenQuad {
    pub(crate) fn new(gl_context: &dyn GlContext) -> RafxResult<Self> {
        let vert_shader =
            compile_shader(gl_context, gles_bindings::VERTEX_SHADER, FULLSCREEN_QUAD_VERT)?;
        let frag_shader =
            compile_shader(gl_context, gles_bindings::FRAGMENT_SHADER, FULLSCREEN_QUAD_FRAG)?;

        let program_id = gl_context.gl_create_program()?;
        gl_context.gl_attach_shader(program_id, vert_shader)?;
        gl_context.gl_attach_shader(program_id, frag_shader)?;

        gl_context.gl_bind_attrib_location(program_id, 0, "pos")?;
        gl_context.gl_bind_attrib_location(program_id, 1, "uv")?;

        gl_context.gl_link_program(program_id)?;
        crate::backends::check_program_link_status(gl_context, program_id)?;

        gl_context.gl_destroy_shader(vert_shader)?;
        gl_context.gl_destroy_shader(frag_shader)?;

        let vertex_bytes: Vec<u8> = QUAD_VERTICES
            .iter()
            .flat_map(|x| x.to_ne_bytes().to_vec())
            .collect();

        let buffer_id = gl_context.gl_create_buffer()?;
        gl_context.gl_bind_buffer(gles_bindings::ARRAY_BUFFER, buffer_id)?;
        gl_context.gl_buffer_data(
            gles_bindings::ARRAY_BUFFER,
            &vertex_bytes,
            gles_bindings::STATIC_DRAW,
        )?;
        gl_context.gl_bind_buffer(gles_bindings::ARRAY_BUFFER, NONE_BUFFER)?;

        Ok(FullscreenQuad {
            program_id,
            buffer_id,
        })
    }

    pub(crate) fn draw(
        &self,
        gl_context: &dyn GlContext,
        max_vertex_attributes: u32,
        texture_id: TextureId,
    ) -> RafxResult<()> {
        gl_context.gl_use_program(self.program_id)?;

        gl_context.gl_bind_buffer(gles_bindings::ARRAY_BUFFER, self.buffer_id)?;

        gl_context.gl_vertex_attrib_pointer(0, 2, gles_bindings::FLOAT, false, 16, 0)?;
        gl_context.gl_enable_vertex_attrib_array(0)?;

        gl_context.gl_vertex_attrib_pointer(1, 2, gles_bindings::FLOAT, false, 16, 8)?;
        gl_context.gl_enable_vertex_attrib_array(1)?;

        for i in 2..max_vertex_attributes {
            gl_context.gl_disable_vertex_attrib_array(i)?;
        }

        gl_context.gl_bind_texture(gles_bindings::TEXTURE_2D, texture_id)?;
        gl_context.gl_tex_parameteri(
            gles_bindings::TEXTURE_2D,
            gles_bindings::TEXTURE_MIN_FILTER,
            gles_bindings::LINEAR as _,
        )?;
        gl_context.gl_tex_parameteri(
            gles_bindings::TEXTURE_2D,
            gles_bindings::TEXTURE_MAG_FILTER,
            gles_bindings::LINEAR as _,
        )?;
        gl_context.gl_tex_parameteri(
            gles_bindings::TEXTURE_2D,
            gles_bindings::TEXTURE_WRAP_S,
            gles_bindings::CLAMP_TO_EDGE as _,
        )?;
        gl_context.gl_tex_parameteri(
            gles_bindings::TEXTURE_2D,
            gles_bindings::TEXTURE_WRAP_T,
            gles_bindings::CLAMP_TO_EDGE as _,
        )?;
        gl_context.gl_draw_arrays(gles_bindings::TRIANGLES, 0, 6)?;

        gl_context.gl_bind_buffer(gles_bindings::ARRAY_BUFFER, NONE_BUFFER)?;
        gl_context.gl_bind_texture(gles_bindings::TEXTURE_2D, NONE_TEXTURE)?;
        gl_context.gl_use_program(NONE_PROGRAM)?;

        Ok(())
    }

    pub(crate) fn destroy(
        &self,
        gl_context: &dyn GlContext,
    ) -> RafxResult<()> {
        gl_context.gl_destroy_program(self.program_id)?;
        gl_context.gl_destroy_buffer(self.buffer_id)?;
        Ok(())
    }
}
