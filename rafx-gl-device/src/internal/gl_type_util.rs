use crate::backends::gles_bindings;
use crate::backends::gles_bindings::types::GLenum;
use crate::backends::{GlContext, LocationId};
use crate::{RafxResult, RafxUniformValue};

pub fn is_sampler_type(gl_type: GLenum) -> bool {
    sampler_target(gl_type).is_some()
}

/// Texture target a sampler of the given type reads from
pub fn sampler_target(gl_type: GLenum) -> Option<GLenum> {
    match gl_type {
        gles_bindings::SAMPLER_2D | gles_bindings::SAMPLER_2D_SHADOW => {
            Some(gles_bindings::TEXTURE_2D)
        }
        gles_bindings::SAMPLER_CUBE | gles_bindings::SAMPLER_CUBE_SHADOW => {
            Some(gles_bindings::TEXTURE_CUBE_MAP)
        }
        gles_bindings::SAMPLER_3D => Some(gles_bindings::TEXTURE_3D),
        _ => None,
    }
}

/// Sends float data to a uniform, picking the entry point from the uniform's declared type
pub fn set_uniform_f32(
    gl_context: &dyn GlContext,
    location: &LocationId,
    gl_type: GLenum,
    data: &[f32],
) -> RafxResult<()> {
    match gl_type {
        gles_bindings::FLOAT => gl_context.gl_uniform_1fv(location, data),
        gles_bindings::FLOAT_VEC2 => gl_context.gl_uniform_2fv(location, data),
        gles_bindings::FLOAT_VEC3 => gl_context.gl_uniform_3fv(location, data),
        gles_bindings::FLOAT_VEC4 => gl_context.gl_uniform_4fv(location, data),
        gles_bindings::FLOAT_MAT2 => gl_context.gl_uniform_matrix_2fv(location, data),
        gles_bindings::FLOAT_MAT3 => gl_context.gl_uniform_matrix_3fv(location, data),
        gles_bindings::FLOAT_MAT4 => gl_context.gl_uniform_matrix_4fv(location, data),
        _ => Err(format!(
            "Float data cannot be sent to a uniform of GL type 0x{:X}",
            gl_type
        ))?,
    }
}

/// Sends integer data to a uniform. Booleans and samplers share the integer entry points.
pub fn set_uniform_i32(
    gl_context: &dyn GlContext,
    location: &LocationId,
    gl_type: GLenum,
    data: &[i32],
) -> RafxResult<()> {
    match gl_type {
        gles_bindings::INT | gles_bindings::BOOL => gl_context.gl_uniform_1iv(location, data),
        gles_bindings::INT_VEC2 | gles_bindings::BOOL_VEC2 => {
            gl_context.gl_uniform_2iv(location, data)
        }
        gles_bindings::INT_VEC3 | gles_bindings::BOOL_VEC3 => {
            gl_context.gl_uniform_3iv(location, data)
        }
        gles_bindings::INT_VEC4 | gles_bindings::BOOL_VEC4 => {
            gl_context.gl_uniform_4iv(location, data)
        }
        x if is_sampler_type(x) => gl_context.gl_uniform_1iv(location, data),
        _ => Err(format!(
            "Integer data cannot be sent to a uniform of GL type 0x{:X}",
            gl_type
        ))?,
    }
}

fn is_float_type(gl_type: GLenum) -> bool {
    matches!(
        gl_type,
        gles_bindings::FLOAT
            | gles_bindings::FLOAT_VEC2
            | gles_bindings::FLOAT_VEC3
            | gles_bindings::FLOAT_VEC4
            | gles_bindings::FLOAT_MAT2
            | gles_bindings::FLOAT_MAT3
            | gles_bindings::FLOAT_MAT4
    )
}

fn is_integer_type(gl_type: GLenum) -> bool {
    matches!(
        gl_type,
        gles_bindings::INT
            | gles_bindings::INT_VEC2
            | gles_bindings::INT_VEC3
            | gles_bindings::INT_VEC4
            | gles_bindings::BOOL
            | gles_bindings::BOOL_VEC2
            | gles_bindings::BOOL_VEC3
            | gles_bindings::BOOL_VEC4
    ) || is_sampler_type(gl_type)
}

/// True if `commit_uniform` can send `value` to a uniform of `gl_type`
pub fn value_matches_type(
    gl_type: GLenum,
    value: &RafxUniformValue,
) -> bool {
    match value {
        RafxUniformValue::Float(_)
        | RafxUniformValue::Vec2(_)
        | RafxUniformValue::Vec3(_)
        | RafxUniformValue::Vec4(_)
        | RafxUniformValue::Mat2(_)
        | RafxUniformValue::Mat3(_)
        | RafxUniformValue::Mat4(_)
        | RafxUniformValue::FloatArray(_) => is_float_type(gl_type),
        RafxUniformValue::Int(_)
        | RafxUniformValue::IVec2(_)
        | RafxUniformValue::IVec3(_)
        | RafxUniformValue::IVec4(_)
        | RafxUniformValue::IntArray(_)
        | RafxUniformValue::Bool(_)
        | RafxUniformValue::BVec2(_)
        | RafxUniformValue::BVec3(_)
        | RafxUniformValue::BVec4(_) => is_integer_type(gl_type),
        RafxUniformValue::Texture(_) | RafxUniformValue::TextureArray(_) => false,
    }
}

fn bools_to_ints<const N: usize>(values: &[bool; N]) -> [i32; N] {
    let mut ints = [0; N];
    for (dst, src) in ints.iter_mut().zip(values.iter()) {
        *dst = *src as i32;
    }
    ints
}

/// Commits a non-texture value to a uniform location
pub fn commit_uniform(
    gl_context: &dyn GlContext,
    location: &LocationId,
    gl_type: GLenum,
    value: &RafxUniformValue,
) -> RafxResult<()> {
    match value {
        RafxUniformValue::Float(x) => {
            set_uniform_f32(gl_context, location, gl_type, std::slice::from_ref(x))
        }
        RafxUniformValue::Vec2(x) => set_uniform_f32(gl_context, location, gl_type, x),
        RafxUniformValue::Vec3(x) => set_uniform_f32(gl_context, location, gl_type, x),
        RafxUniformValue::Vec4(x) => set_uniform_f32(gl_context, location, gl_type, x),
        RafxUniformValue::Mat2(x) => set_uniform_f32(gl_context, location, gl_type, x),
        RafxUniformValue::Mat3(x) => set_uniform_f32(gl_context, location, gl_type, x),
        RafxUniformValue::Mat4(x) => set_uniform_f32(gl_context, location, gl_type, x),
        RafxUniformValue::FloatArray(x) => set_uniform_f32(gl_context, location, gl_type, x),
        RafxUniformValue::Int(x) => {
            set_uniform_i32(gl_context, location, gl_type, std::slice::from_ref(x))
        }
        RafxUniformValue::IVec2(x) => set_uniform_i32(gl_context, location, gl_type, x),
        RafxUniformValue::IVec3(x) => set_uniform_i32(gl_context, location, gl_type, x),
        RafxUniformValue::IVec4(x) => set_uniform_i32(gl_context, location, gl_type, x),
        RafxUniformValue::IntArray(x) => set_uniform_i32(gl_context, location, gl_type, x),
        RafxUniformValue::Bool(x) => {
            set_uniform_i32(gl_context, location, gl_type, &[*x as i32])
        }
        RafxUniformValue::BVec2(x) => {
            set_uniform_i32(gl_context, location, gl_type, &bools_to_ints(x))
        }
        RafxUniformValue::BVec3(x) => {
            set_uniform_i32(gl_context, location, gl_type, &bools_to_ints(x))
        }
        RafxUniformValue::BVec4(x) => {
            set_uniform_i32(gl_context, location, gl_type, &bools_to_ints(x))
        }
        RafxUniformValue::Texture(_) | RafxUniformValue::TextureArray(_) => {
            Err("Textures are bound through sampler slots, not committed as uniforms")?
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::recording::{GlCall, RecordingGlConfig, RecordingGlContext};

    #[test]
    fn bool_vectors_use_integer_entry_points() {
        let context = RecordingGlContext::new(RecordingGlConfig::gles3());
        let location = LocationId(7);
        commit_uniform(
            &context,
            &location,
            gles_bindings::BOOL_VEC3,
            &RafxUniformValue::BVec3([true, false, true]),
        )
        .unwrap();

        assert_eq!(
            context.calls(),
            vec![GlCall::UniformIv {
                components: 3,
                location,
                data: vec![1, 0, 1],
            }]
        );
    }

    #[test]
    fn mismatched_type_is_an_error() {
        let context = RecordingGlContext::new(RecordingGlConfig::gles3());
        let result = commit_uniform(
            &context,
            &LocationId(1),
            gles_bindings::FLOAT_VEC4,
            &RafxUniformValue::Int(3),
        );
        assert!(result.is_err());
        assert_eq!(context.call_count(), 0);
        assert!(!value_matches_type(
            gles_bindings::FLOAT_VEC4,
            &RafxUniformValue::Int(3)
        ));
        assert!(value_matches_type(
            gles_bindings::BOOL_VEC2,
            &RafxUniformValue::IVec2([0, 1])
        ));
        assert!(value_matches_type(
            gles_bindings::FLOAT_MAT3,
            &RafxUniformValue::Mat3([0.0; 9])
        ));
    }

    #[test]
    fn sampler_targets() {
        assert_eq!(
            sampler_target(gles_bindings::SAMPLER_CUBE),
            Some(gles_bindings::TEXTURE_CUBE_MAP)
        );
        assert!(!is_sampler_type(gles_bindings::FLOAT_MAT4));
    }
}
