use crate::backends::gles_bindings;
use crate::backends::{GlContext, NONE_BUFFER, NONE_VERTEX_ARRAY};
use crate::device::{bind_texture_unit, RafxVertexArrayKey};
use crate::internal::gl_type_util;
use std::convert::TryFrom;
use crate::{
    RafxDeviceGl, RafxDiagnosticLevel, RafxPrimitive, RafxResult, RafxShaderStatus,
    RafxUniformValue, RafxVertexBufferGl,
};

fn build_vertex_array(
    gl_context: &dyn GlContext,
    buffers: &[&RafxVertexBufferGl],
) -> RafxResult<()> {
    for buffer in buffers {
        let buffer_id = buffer
            .gl_buffer_id()
            .ok_or("Vertex buffer has no GL object")?;
        gl_context.gl_bind_buffer(gles_bindings::ARRAY_BUFFER, buffer_id)?;

        let layout = buffer.layout();
        for element in &layout.elements {
            let location = element.semantic.attribute_location();
            gl_context.gl_vertex_attrib_pointer(
                location,
                element.component_count as i32,
                element.component_type.gl_type(),
                element.normalize,
                layout.stride,
                element.byte_offset,
            )?;
            gl_context.gl_enable_vertex_attrib_array(location)?;
            if layout.instancing {
                gl_context.gl_vertex_attrib_divisor(location, 1)?;
            }
        }
    }

    gl_context.gl_bind_buffer(gles_bindings::ARRAY_BUFFER, NONE_BUFFER)
}

impl RafxDeviceGl {
    /// Draws with the current shader, vertex buffers and index buffer. The vertex buffer list is
    /// cleared afterwards unless `keep_buffers` is set.
    ///
    /// Returns false if the draw was skipped. A draw is skipped when the shader is missing,
    /// failed or still compiling, when a sampler has no texture, or when a required buffer is
    /// missing. Each distinct problem is reported once through the diagnostics channel.
    #[profiling::function]
    pub fn draw(
        &mut self,
        primitive: &RafxPrimitive,
        instance_count: Option<u32>,
        keep_buffers: bool,
    ) -> RafxResult<bool> {
        let drawn = if self.observe_context_loss() {
            log::trace!("Draw skipped while the context is lost");
            false
        } else {
            let result = self.submit_draw(primitive, instance_count);
            self.absorb_context_loss(result, false)?
        };
        if !keep_buffers {
            self.current_vertex_buffers.clear();
        }
        Ok(drawn)
    }

    fn skip_draw(
        &mut self,
        message: String,
    ) -> RafxResult<bool> {
        self.diagnostics
            .report_once(RafxDiagnosticLevel::Error, message);
        Ok(false)
    }

    fn submit_draw(
        &mut self,
        primitive: &RafxPrimitive,
        instance_count: Option<u32>,
    ) -> RafxResult<bool> {
        let instances = instance_count.filter(|x| *x > 0);
        if instances.is_some() && !self.capabilities.features.instancing {
            return self.skip_draw("Draw skipped: instancing is not supported".to_string());
        }

        // Counts and offsets are GLsizei/GLint on the GL side
        let count = match i32::try_from(primitive.count) {
            Ok(count) => count,
            Err(_) => {
                return self.skip_draw(format!(
                    "Draw skipped: {} elements exceeds the GL count limit",
                    primitive.count
                ))
            }
        };
        let instances = match instances.map(i32::try_from).transpose() {
            Ok(instances) => instances,
            Err(_) => {
                return self.skip_draw("Draw skipped: instance count exceeds the GL limit".to_string())
            }
        };
        let base = match i32::try_from(primitive.base) {
            Ok(base) => base,
            Err(_) => {
                return self.skip_draw(format!(
                    "Draw skipped: base {} exceeds the GL offset limit",
                    primitive.base
                ))
            }
        };

        //
        // Shader
        //
        let shader_handle = match self.current_shader {
            Some(handle) => handle,
            None => return self.skip_draw("Draw skipped: no shader is set".to_string()),
        };

        let program_id = match self.prepare_shader(shader_handle)? {
            Some(program_id) => program_id,
            None => {
                return match self.shaders.get(shader_handle.0) {
                    Some(shader) if shader.status() == RafxShaderStatus::Compiling => {
                        log::trace!("Draw skipped: shader {} is compiling", shader.def.name);
                        Ok(false)
                    }
                    Some(shader) => {
                        let message =
                            format!("Draw skipped: shader {} failed to build", shader.def.name);
                        self.skip_draw(message)
                    }
                    None => self.skip_draw("Draw skipped: the shader was destroyed".to_string()),
                };
            }
        };

        let gl_context = &*self.gl_context;
        if self.state.use_program(gl_context, program_id)? {
            self.stats.frame.shader_switches += 1;
        }

        //
        // Samplers. Every sampler must have a texture or the draw is abandoned.
        //
        let shader = match self.shaders.get_mut(shader_handle.0) {
            Some(shader) => shader,
            None => return Ok(false),
        };

        let max_units = self.capabilities.limits.max_combined_textures;
        let mut next_unit = 0;
        for slot in &mut shader.sampler_slots {
            let handles = match self.uniform_scope.value(slot.scope_id) {
                Some(RafxUniformValue::Texture(handle)) => vec![*handle],
                Some(RafxUniformValue::TextureArray(handles)) if !handles.is_empty() => {
                    handles.clone()
                }
                _ => Vec::default(),
            };

            let mut units = Vec::with_capacity(handles.len());
            let mut complete = !handles.is_empty();
            for handle in handles {
                if next_unit >= max_units {
                    let message = format!(
                        "Draw skipped: shader {} needs more than {} texture units",
                        shader.def.name, max_units
                    );
                    self.diagnostics
                        .report_once(RafxDiagnosticLevel::Error, message);
                    return Ok(false);
                }

                let bound = bind_texture_unit(
                    gl_context,
                    &self.capabilities,
                    &mut self.state,
                    &mut self.textures,
                    &mut self.stats.vram.textures,
                    handle,
                    next_unit,
                )?;
                if !bound {
                    complete = false;
                    break;
                }
                units.push(next_unit as i32);
                next_unit += 1;
            }

            if !complete {
                let message = format!(
                    "Draw skipped: sampler {} of shader {} has no texture",
                    slot.name, shader.def.name
                );
                self.diagnostics
                    .report_once(RafxDiagnosticLevel::Error, message);
                return Ok(false);
            }

            if slot.committed_units != units {
                gl_context.gl_uniform_1iv(&slot.location, &units)?;
                slot.committed_units = units;
            }
        }

        //
        // Uniforms, re-sent only when the scope holds a newer value than the one committed
        //
        for slot in &mut shader.uniform_slots {
            let version = self.uniform_scope.version(slot.scope_id);
            if version == slot.committed_version {
                continue;
            }

            match self.uniform_scope.value(slot.scope_id) {
                Some(value) if gl_type_util::value_matches_type(slot.gl_type, value) => {
                    gl_type_util::commit_uniform(gl_context, &slot.location, slot.gl_type, value)?
                }
                Some(value) if !value.is_texture() => {
                    let message = format!(
                        "Uniform {} of shader {} was given a value that does not match GL type 0x{:X}",
                        slot.name, shader.def.name, slot.gl_type
                    );
                    self.diagnostics
                        .report_once(RafxDiagnosticLevel::Error, message);
                }
                Some(_) => {
                    let message = format!(
                        "Uniform {} of shader {} was given a texture",
                        slot.name, shader.def.name
                    );
                    self.diagnostics
                        .report_once(RafxDiagnosticLevel::Warning, message);
                }
                None => {}
            }
            slot.committed_version = version;
        }

        //
        // Vertex array, cached by the identity and layout of the bound vertex buffers
        //
        let mut buffers = Vec::with_capacity(self.current_vertex_buffers.len());
        let mut key = RafxVertexArrayKey::with_capacity(self.current_vertex_buffers.len());
        for handle in &self.current_vertex_buffers {
            let buffer = self
                .vertex_buffers
                .get(handle.0)
                .and_then(|buffer| buffer.gl_buffer_id().map(|id| (buffer, id)));
            match buffer {
                Some((buffer, buffer_id)) => {
                    if buffer.layout().instancing && !self.capabilities.features.instancing {
                        self.diagnostics.report_once(
                            RafxDiagnosticLevel::Error,
                            "Draw skipped: instanced vertex layouts are not supported",
                        );
                        return Ok(false);
                    }
                    key.push((buffer_id, buffer.layout_hash()));
                    buffers.push(buffer);
                }
                None => {
                    self.diagnostics.report_once(
                        RafxDiagnosticLevel::Error,
                        "Draw skipped: a vertex buffer was destroyed",
                    );
                    return Ok(false);
                }
            }
        }

        if key.is_empty() {
            self.state.bind_vertex_array(gl_context, NONE_VERTEX_ARRAY)?;
        } else if let Some(vertex_array_id) = self.vertex_arrays.get(&key) {
            self.state.bind_vertex_array(gl_context, *vertex_array_id)?;
        } else {
            let vertex_array_id = gl_context.gl_create_vertex_array()?;
            self.state.bind_vertex_array(gl_context, vertex_array_id)?;
            build_vertex_array(gl_context, &buffers)?;
            log::trace!(
                "Created vertex array {:?} for {} buffers",
                vertex_array_id,
                buffers.len()
            );
            self.vertex_arrays.insert(key, vertex_array_id);
        }

        //
        // Dispatch
        //
        let mode = primitive.primitive_type.gl_primitive_type();
        if primitive.indexed {
            let index_buffers = &self.index_buffers;
            let index_buffer = self
                .current_index_buffer
                .and_then(|handle| index_buffers.get(handle.0))
                .and_then(|buffer| buffer.gl_buffer_id().map(|id| (buffer, id)));
            let (index_buffer, buffer_id) = match index_buffer {
                Some(index_buffer) => index_buffer,
                None => {
                    self.diagnostics.report_once(
                        RafxDiagnosticLevel::Error,
                        "Draw skipped: indexed draw without an index buffer",
                    );
                    return Ok(false);
                }
            };

            self.state.bind_index_buffer(gl_context, buffer_id)?;
            let index_type = index_buffer.index_type();
            let byte_offset = match primitive.base.checked_mul(index_type.bytes_per_index()) {
                Some(byte_offset) if byte_offset <= i32::MAX as u32 => byte_offset,
                _ => {
                    let message =
                        format!("Draw skipped: first index {} is out of range", primitive.base);
                    self.diagnostics
                        .report_once(RafxDiagnosticLevel::Error, message);
                    return Ok(false);
                }
            };
            match instances {
                Some(instances) => gl_context.gl_draw_elements_instanced(
                    mode,
                    count,
                    index_type.gl_index_type(),
                    byte_offset,
                    instances,
                )?,
                None => gl_context.gl_draw_elements(
                    mode,
                    count,
                    index_type.gl_index_type(),
                    byte_offset,
                )?,
            }
        } else {
            match instances {
                Some(instances) => {
                    gl_context.gl_draw_arrays_instanced(mode, base, count, instances)?
                }
                None => gl_context.gl_draw_arrays(mode, base, count)?,
            }
        }

        let frame = &mut self.stats.frame;
        frame.draw_calls += 1;
        let primitives = &mut frame.primitives[primitive.primitive_type.index()];
        *primitives = primitives.saturating_add(
            u64::from(primitive.count).saturating_mul(instances.map_or(1, |x| x as u64)),
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::backends::recording::{GlCall, RecordingGlConfig, RecordingGlContextProvider};
    use crate::backends::gles_bindings;
    use crate::{
        RafxBufferUsage, RafxDeviceDef, RafxDeviceGl, RafxPrimitive, RafxPrimitiveType,
        RafxQuirksTable, RafxShaderDef, RafxVertexBufferDef, RafxVertexComponentType,
        RafxVertexElement, RafxVertexLayout, RafxVertexSemantic,
    };

    const VERTEX_SOURCE: &str = "attribute vec3 vertex_position;
uniform mat4 matrix_model;
void main() {
    gl_Position = matrix_model * vec4(vertex_position, 1.0);
}
";

    const FRAGMENT_SOURCE: &str = "precision mediump float;
uniform vec4 material_color;
void main() {
    gl_FragColor = material_color;
}
";

    fn position_buffer_def() -> RafxVertexBufferDef {
        RafxVertexBufferDef {
            layout: RafxVertexLayout {
                elements: vec![RafxVertexElement {
                    semantic: RafxVertexSemantic::Position,
                    component_count: 3,
                    component_type: RafxVertexComponentType::Float32,
                    normalize: false,
                    byte_offset: 0,
                }],
                stride: 12,
                instancing: false,
            },
            usage: RafxBufferUsage::Static,
        }
    }

    fn create_device() -> (RecordingGlContextProvider, RafxDeviceGl) {
        let provider = RecordingGlContextProvider::new(RecordingGlConfig::gles3());
        let device_def = RafxDeviceDef {
            quirks: RafxQuirksTable::empty(),
            assert_on_programming_errors: false,
            ..Default::default()
        };
        let device = RafxDeviceGl::new(&provider, &device_def).unwrap();
        (provider, device)
    }

    fn solid_shader() -> RafxShaderDef {
        RafxShaderDef {
            name: "solid".to_string(),
            vertex_source: VERTEX_SOURCE.to_string(),
            fragment_source: FRAGMENT_SOURCE.to_string(),
            attributes: vec![(
                "vertex_position".to_string(),
                RafxVertexSemantic::Position,
            )],
        }
    }

    #[test]
    fn vertex_arrays_are_reused() {
        let (provider, mut device) = create_device();
        let context = provider.last_context().unwrap();
        let shader = device.create_shader(&solid_shader());
        let buffer = device
            .create_vertex_buffer(&position_buffer_def(), vec![0; 36])
            .unwrap();
        assert!(device.set_shader(shader).unwrap());

        let primitive = RafxPrimitive {
            primitive_type: RafxPrimitiveType::Triangles,
            base: 0,
            count: 3,
            indexed: false,
        };
        for _ in 0..3 {
            device.set_vertex_buffer(buffer);
            assert!(device.draw(&primitive, None, false).unwrap());
        }

        let calls = context.calls();
        let created = calls
            .iter()
            .filter(|x| matches!(x, GlCall::CreateVertexArray(_)))
            .count();
        assert_eq!(created, 1);
        assert_eq!(calls.iter().filter(|x| x.is_draw()).count(), 3);
        assert_eq!(device.stats().frame.draw_calls, 3);
        assert_eq!(
            device
                .stats()
                .frame
                .primitive_count(RafxPrimitiveType::Triangles),
            9
        );
    }

    #[test]
    fn uniforms_are_only_sent_when_changed() {
        let (provider, mut device) = create_device();
        let context = provider.last_context().unwrap();
        let shader = device.create_shader(&solid_shader());
        let buffer = device
            .create_vertex_buffer(&position_buffer_def(), vec![0; 36])
            .unwrap();
        device.set_vertex_buffer(buffer);
        assert!(device.set_shader(shader).unwrap());
        device.set_uniform("material_color", crate::RafxUniformValue::Vec4([1.0; 4]));

        let primitive = RafxPrimitive {
            primitive_type: RafxPrimitiveType::Triangles,
            base: 0,
            count: 3,
            indexed: false,
        };
        let uniform_calls = |calls: &[GlCall]| {
            calls
                .iter()
                .filter(|x| matches!(x, GlCall::UniformFv { components: 4, .. }))
                .count()
        };

        let start = context.call_count();
        device.draw(&primitive, None, true).unwrap();
        assert_eq!(uniform_calls(&context.calls_since(start)), 1);

        let start = context.call_count();
        device.draw(&primitive, None, true).unwrap();
        assert_eq!(uniform_calls(&context.calls_since(start)), 0);

        device.set_uniform("material_color", crate::RafxUniformValue::Vec4([0.5; 4]));
        let start = context.call_count();
        device.draw(&primitive, None, true).unwrap();
        assert_eq!(uniform_calls(&context.calls_since(start)), 1);
    }

    #[test]
    fn indexed_instanced_draw_uses_byte_offset() {
        let (provider, mut device) = create_device();
        let context = provider.last_context().unwrap();
        let shader = device.create_shader(&solid_shader());
        let vertices = device
            .create_vertex_buffer(&position_buffer_def(), vec![0; 36])
            .unwrap();
        let indices = device
            .create_index_buffer(
                &crate::RafxIndexBufferDef {
                    index_type: crate::RafxIndexType::Uint16,
                    usage: RafxBufferUsage::Static,
                },
                vec![0; 12],
            )
            .unwrap();
        device.set_shader(shader).unwrap();
        device.set_vertex_buffer(vertices);
        device.set_index_buffer(Some(indices));

        let primitive = RafxPrimitive {
            primitive_type: RafxPrimitiveType::Triangles,
            base: 3,
            count: 3,
            indexed: true,
        };
        assert!(device.draw(&primitive, Some(4), false).unwrap());
        assert!(context.calls().contains(&GlCall::DrawElementsInstanced {
            mode: gles_bindings::TRIANGLES,
            count: 3,
            type_: gles_bindings::UNSIGNED_SHORT,
            byte_offset: 6,
            instance_count: 4,
        }));
        assert_eq!(
            device
                .stats()
                .frame
                .primitive_count(RafxPrimitiveType::Triangles),
            12
        );
    }

    #[test]
    fn indexed_draw_without_index_buffer_is_skipped() {
        let (provider, mut device) = create_device();
        let context = provider.last_context().unwrap();
        let diagnostics = device.diagnostics_receiver();
        let shader = device.create_shader(&solid_shader());
        device.set_shader(shader).unwrap();

        let primitive = RafxPrimitive {
            primitive_type: RafxPrimitiveType::Triangles,
            base: 0,
            count: 3,
            indexed: true,
        };
        assert!(!device.draw(&primitive, None, false).unwrap());
        assert!(!context.calls().iter().any(|x| x.is_draw()));
        assert_eq!(diagnostics.try_iter().count(), 1);
    }

    #[test]
    fn large_instanced_draw_counts_without_overflow() {
        let (provider, mut device) = create_device();
        let context = provider.last_context().unwrap();
        let shader = device.create_shader(&solid_shader());
        let buffer = device
            .create_vertex_buffer(&position_buffer_def(), vec![0; 36])
            .unwrap();
        assert!(device.set_shader(shader).unwrap());
        device.set_vertex_buffer(buffer);

        let primitive = RafxPrimitive {
            primitive_type: RafxPrimitiveType::Triangles,
            base: 0,
            count: 100_000_000,
            indexed: false,
        };
        assert!(device.draw(&primitive, Some(100), true).unwrap());
        assert!(device.draw(&primitive, Some(100), true).unwrap());
        assert!(context.calls().contains(&GlCall::DrawArraysInstanced {
            mode: gles_bindings::TRIANGLES,
            first: 0,
            count: 100_000_000,
            instance_count: 100,
        }));
        assert_eq!(
            device
                .stats()
                .frame
                .primitive_count(RafxPrimitiveType::Triangles),
            20_000_000_000
        );
    }

    #[test]
    fn counts_beyond_gl_range_are_skipped() {
        let (provider, mut device) = create_device();
        let context = provider.last_context().unwrap();
        let diagnostics = device.diagnostics_receiver();
        let shader = device.create_shader(&solid_shader());
        let buffer = device
            .create_vertex_buffer(&position_buffer_def(), vec![0; 36])
            .unwrap();
        assert!(device.set_shader(shader).unwrap());
        device.set_vertex_buffer(buffer);

        let too_many = RafxPrimitive {
            primitive_type: RafxPrimitiveType::Triangles,
            base: 0,
            count: i32::MAX as u32 + 1,
            indexed: false,
        };
        assert!(!device.draw(&too_many, None, true).unwrap());
        assert!(!device.draw(&too_many, None, true).unwrap());

        let too_far = RafxPrimitive {
            base: u32::MAX,
            count: 3,
            ..too_many
        };
        assert!(!device.draw(&too_far, None, true).unwrap());

        let three = RafxPrimitive {
            base: 0,
            count: 3,
            ..too_many
        };
        assert!(!device.draw(&three, Some(u32::MAX), true).unwrap());

        assert!(!context.calls().iter().any(|x| x.is_draw()));
        assert_eq!(diagnostics.try_iter().count(), 3);
        assert_eq!(device.stats().frame.draw_calls, 0);
    }

    #[test]
    fn mismatched_uniform_is_reported_and_skipped() {
        let (provider, mut device) = create_device();
        let context = provider.last_context().unwrap();
        let diagnostics = device.diagnostics_receiver();
        let shader = device.create_shader(&solid_shader());
        let buffer = device
            .create_vertex_buffer(&position_buffer_def(), vec![0; 36])
            .unwrap();
        assert!(device.set_shader(shader).unwrap());
        device.set_vertex_buffer(buffer);
        device.set_uniform("material_color", crate::RafxUniformValue::Int(3));

        let primitive = RafxPrimitive {
            primitive_type: RafxPrimitiveType::Triangles,
            base: 0,
            count: 3,
            indexed: false,
        };
        assert!(device.draw(&primitive, None, true).unwrap());
        device.set_uniform("material_color", crate::RafxUniformValue::Int(4));
        assert!(device.draw(&primitive, None, true).unwrap());

        let calls = context.calls();
        assert_eq!(calls.iter().filter(|x| x.is_draw()).count(), 2);
        assert!(!calls
            .iter()
            .any(|x| matches!(x, GlCall::UniformFv { components: 4, .. })));
        assert_eq!(diagnostics.try_iter().count(), 1);

        // A matching value afterwards is sent as usual
        device.set_uniform("material_color", crate::RafxUniformValue::Vec4([1.0; 4]));
        let start = context.call_count();
        assert!(device.draw(&primitive, None, true).unwrap());
        assert!(context
            .calls_since(start)
            .iter()
            .any(|x| matches!(x, GlCall::UniformFv { components: 4, .. })));
    }
}
