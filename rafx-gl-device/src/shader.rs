use crate::backends::gles_bindings;
use crate::backends::gles_bindings::types::GLenum;
use crate::backends::{GlContext, LocationId, ProgramId, ShaderId};
use crate::internal::gl_type_util;
use crate::internal::ResourceSlabKey;
use crate::{
    RafxDiagnosticLevel, RafxDiagnostics, RafxError, RafxResult, RafxScopeId, RafxShaderDef,
    RafxUniformScope,
};

/// Handle to a shader program owned by a `RafxDeviceGl`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RafxShaderHandle(pub(crate) ResourceSlabKey<RafxShaderGl>);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RafxShaderStatus {
    /// Nothing has been sent to the driver yet
    Pending,
    /// Compiled and linked in parallel by the driver, not complete yet
    Compiling,
    Ready,
    /// Compilation or linking failed. Draws with this shader are skipped.
    Failed,
}

/// Running totals of the driver-side compile work
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RafxShaderCompileStats {
    pub vertex_shaders_compiled: u32,
    pub fragment_shaders_compiled: u32,
    pub programs_linked: u32,
}

#[derive(Debug)]
pub(crate) struct RafxSamplerSlot {
    pub(crate) name: String,
    pub(crate) scope_id: RafxScopeId,
    pub(crate) location: LocationId,
    pub(crate) gl_type: GLenum,
    pub(crate) target: GLenum,
    pub(crate) array_size: u32,
    /// Texture units last committed to the location. Empty until the first commit.
    pub(crate) committed_units: Vec<i32>,
}

#[derive(Debug)]
pub(crate) struct RafxUniformSlot {
    pub(crate) name: String,
    pub(crate) scope_id: RafxScopeId,
    pub(crate) location: LocationId,
    pub(crate) gl_type: GLenum,
    pub(crate) array_size: u32,
    /// Scope version of the value last sent, 0 if nothing was sent
    pub(crate) committed_version: u64,
}

#[derive(Debug)]
struct PendingStages {
    vertex_shader: ShaderId,
    fragment_shader: ShaderId,
}

/// A program built from GLSL sources. The GL objects are created on first use and rebuilt
/// after a context restoration.
#[derive(Debug)]
pub struct RafxShaderGl {
    pub(crate) def: RafxShaderDef,
    pub(crate) program_id: Option<ProgramId>,
    pending_stages: Option<PendingStages>,
    pub(crate) status: RafxShaderStatus,
    pub(crate) sampler_slots: Vec<RafxSamplerSlot>,
    pub(crate) uniform_slots: Vec<RafxUniformSlot>,
}

impl RafxShaderGl {
    pub(crate) fn new(def: RafxShaderDef) -> Self {
        RafxShaderGl {
            def,
            program_id: None,
            pending_stages: None,
            status: RafxShaderStatus::Pending,
            sampler_slots: Vec::default(),
            uniform_slots: Vec::default(),
        }
    }

    pub fn shader_def(&self) -> &RafxShaderDef {
        &self.def
    }

    pub fn status(&self) -> RafxShaderStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == RafxShaderStatus::Ready
    }

    pub fn gl_program_id(&self) -> Option<ProgramId> {
        self.program_id
    }

    pub fn sampler_names(&self) -> impl Iterator<Item = &str> {
        self.sampler_slots.iter().map(|x| x.name.as_str())
    }

    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniform_slots.iter().map(|x| x.name.as_str())
    }

    /// Advances compilation as far as the driver allows without blocking and returns the
    /// resulting status. Compile and link failures are reported to `diagnostics` and leave the
    /// shader failed.
    #[profiling::function]
    pub(crate) fn compile(
        &mut self,
        gl_context: &dyn GlContext,
        parallel_compile: bool,
        scope: &mut RafxUniformScope,
        stats: &mut RafxShaderCompileStats,
        diagnostics: &RafxDiagnostics,
    ) -> RafxResult<RafxShaderStatus> {
        if self.status == RafxShaderStatus::Pending {
            self.start_compile(gl_context, stats)?;
            self.status = RafxShaderStatus::Compiling;
        }

        if self.status == RafxShaderStatus::Compiling {
            let program_id = self.program_id.ok_or("Compiling shader has no program")?;
            if parallel_compile
                && gl_context.gl_get_programiv(program_id, gles_bindings::COMPLETION_STATUS_KHR)?
                    == 0
            {
                return Ok(self.status);
            }

            match self.finish_compile(gl_context, scope) {
                Ok(()) => {
                    log::trace!("Shader {} is ready", self.def.name);
                    self.status = RafxShaderStatus::Ready;
                }
                Err(RafxError::ContextLost) => return Err(RafxError::ContextLost),
                Err(error) => {
                    diagnostics.report(
                        RafxDiagnosticLevel::Error,
                        format!("Failed to build shader {}: {}", self.def.name, error),
                    );
                    self.release_gl_objects(gl_context)?;
                    self.status = RafxShaderStatus::Failed;
                }
            }
        }

        Ok(self.status)
    }

    fn start_compile(
        &mut self,
        gl_context: &dyn GlContext,
        stats: &mut RafxShaderCompileStats,
    ) -> RafxResult<()> {
        let vertex_shader = gl_context.gl_create_shader(gles_bindings::VERTEX_SHADER)?;
        gl_context.gl_shader_source(vertex_shader, &self.def.vertex_source)?;
        gl_context.gl_compile_shader(vertex_shader)?;
        stats.vertex_shaders_compiled += 1;

        let fragment_shader = gl_context.gl_create_shader(gles_bindings::FRAGMENT_SHADER)?;
        gl_context.gl_shader_source(fragment_shader, &self.def.fragment_source)?;
        gl_context.gl_compile_shader(fragment_shader)?;
        stats.fragment_shaders_compiled += 1;

        let program_id = gl_context.gl_create_program()?;
        gl_context.gl_attach_shader(program_id, vertex_shader)?;
        gl_context.gl_attach_shader(program_id, fragment_shader)?;
        for (name, semantic) in &self.def.attributes {
            gl_context.gl_bind_attrib_location(program_id, semantic.attribute_location(), name)?;
        }

        gl_context.gl_link_program(program_id)?;
        stats.programs_linked += 1;

        self.program_id = Some(program_id);
        self.pending_stages = Some(PendingStages {
            vertex_shader,
            fragment_shader,
        });
        Ok(())
    }

    fn check_compile_status(
        gl_context: &dyn GlContext,
        shader_id: ShaderId,
        stage: &str,
    ) -> RafxResult<()> {
        if gl_context.gl_get_shaderiv(shader_id, gles_bindings::COMPILE_STATUS)? == 0 {
            Err(match gl_context.gl_get_shader_info_log(shader_id)? {
                Some(log) => format!("{} shader: {}", stage, log),
                None => format!("{} shader failed to compile", stage),
            })?;
        }
        Ok(())
    }

    fn finish_compile(
        &mut self,
        gl_context: &dyn GlContext,
        scope: &mut RafxUniformScope,
    ) -> RafxResult<()> {
        let program_id = self.program_id.ok_or("Shader has no program")?;
        if let Some(stages) = &self.pending_stages {
            Self::check_compile_status(gl_context, stages.vertex_shader, "Vertex")?;
            Self::check_compile_status(gl_context, stages.fragment_shader, "Fragment")?;
        }

        crate::backends::check_program_link_status(gl_context, program_id)?;

        if let Some(stages) = self.pending_stages.take() {
            gl_context.gl_destroy_shader(stages.vertex_shader)?;
            gl_context.gl_destroy_shader(stages.fragment_shader)?;
        }

        self.reflect(gl_context, program_id, scope)
    }

    fn reflect(
        &mut self,
        gl_context: &dyn GlContext,
        program_id: ProgramId,
        scope: &mut RafxUniformScope,
    ) -> RafxResult<()> {
        self.sampler_slots.clear();
        self.uniform_slots.clear();

        let uniform_count =
            gl_context.gl_get_programiv(program_id, gles_bindings::ACTIVE_UNIFORMS)?;
        for index in 0..uniform_count.max(0) as u32 {
            let info = gl_context.gl_get_active_uniform(program_id, index)?;
            // Arrays are reported as "name[0]"
            let name = info.name.trim_end_matches("[0]");
            let location = match gl_context.gl_get_uniform_location(program_id, name)? {
                Some(location) => location,
                None => continue,
            };

            let scope_id = scope.resolve(name);
            match gl_type_util::sampler_target(info.ty) {
                Some(target) => self.sampler_slots.push(RafxSamplerSlot {
                    name: name.to_string(),
                    scope_id,
                    location,
                    gl_type: info.ty,
                    target,
                    array_size: info.size,
                    committed_units: Vec::default(),
                }),
                None => self.uniform_slots.push(RafxUniformSlot {
                    name: name.to_string(),
                    scope_id,
                    location,
                    gl_type: info.ty,
                    array_size: info.size,
                    committed_version: 0,
                }),
            }
        }

        log::trace!(
            "Shader {} has {} samplers and {} uniforms",
            self.def.name,
            self.sampler_slots.len(),
            self.uniform_slots.len()
        );
        Ok(())
    }

    fn release_gl_objects(
        &mut self,
        gl_context: &dyn GlContext,
    ) -> RafxResult<()> {
        if let Some(stages) = self.pending_stages.take() {
            gl_context.gl_destroy_shader(stages.vertex_shader)?;
            gl_context.gl_destroy_shader(stages.fragment_shader)?;
        }

        if let Some(program_id) = self.program_id.take() {
            gl_context.gl_destroy_program(program_id)?;
        }

        self.sampler_slots.clear();
        self.uniform_slots.clear();
        Ok(())
    }

    /// Forgets the GL objects. The shader builds again on its next use.
    pub(crate) fn lose_context(&mut self) {
        self.program_id = None;
        self.pending_stages = None;
        self.sampler_slots.clear();
        self.uniform_slots.clear();
        self.status = RafxShaderStatus::Pending;
    }

    pub(crate) fn destroy(
        &mut self,
        gl_context: &dyn GlContext,
    ) -> RafxResult<()> {
        self.release_gl_objects(gl_context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::recording::{GlCall, RecordingGlConfig, RecordingGlContext};
    use crate::RafxVertexSemantic;

    const VERTEX_SOURCE: &str = "attribute vec3 vertex_position;
uniform mat4 matrix_model;
uniform mat4 matrix_viewProjection;
void main() {
    gl_Position = matrix_viewProjection * matrix_model * vec4(vertex_position, 1.0);
}
";

    const FRAGMENT_SOURCE: &str = "precision mediump float;
uniform sampler2D texture_diffuse;
uniform vec4 material_color;
uniform float light_intensities[4];
void main() {
    gl_FragColor = texture2D(texture_diffuse, vec2(0.0)) * material_color;
}
";

    fn shader_def(fragment_source: &str) -> RafxShaderDef {
        RafxShaderDef {
            name: "lit".to_string(),
            vertex_source: VERTEX_SOURCE.to_string(),
            fragment_source: fragment_source.to_string(),
            attributes: vec![(
                "vertex_position".to_string(),
                RafxVertexSemantic::Position,
            )],
        }
    }

    #[test]
    fn linking_reflects_slots() {
        let context = RecordingGlContext::new(RecordingGlConfig::gles3());
        let mut scope = RafxUniformScope::default();
        let mut stats = RafxShaderCompileStats::default();
        let diagnostics = RafxDiagnostics::default();

        let mut shader = RafxShaderGl::new(shader_def(FRAGMENT_SOURCE));
        let status = shader
            .compile(&context, false, &mut scope, &mut stats, &diagnostics)
            .unwrap();
        assert_eq!(status, RafxShaderStatus::Ready);

        assert_eq!(shader.sampler_names().collect::<Vec<_>>(), vec![
            "texture_diffuse"
        ]);
        let mut uniforms: Vec<_> = shader.uniform_names().collect();
        uniforms.sort();
        assert_eq!(uniforms, vec![
            "light_intensities",
            "material_color",
            "matrix_model",
            "matrix_viewProjection"
        ]);

        let array = shader
            .uniform_slots
            .iter()
            .find(|x| x.name == "light_intensities")
            .unwrap();
        assert_eq!(array.array_size, 4);
        assert!(scope.find("texture_diffuse").is_some());

        assert_eq!(stats, RafxShaderCompileStats {
            vertex_shaders_compiled: 1,
            fragment_shaders_compiled: 1,
            programs_linked: 1,
        });
        assert!(context.calls().contains(&GlCall::BindAttribLocation(
            shader.gl_program_id().unwrap(),
            0,
            "vertex_position".to_string()
        )));
    }

    #[test]
    fn compile_failure_marks_shader_failed() {
        let context = RecordingGlContext::new(RecordingGlConfig::gles3());
        let mut scope = RafxUniformScope::default();
        let mut stats = RafxShaderCompileStats::default();
        let diagnostics = RafxDiagnostics::default();
        let receiver = diagnostics.receiver();

        let mut shader = RafxShaderGl::new(shader_def("#error broken\nvoid main() {}\n"));
        let status = shader
            .compile(&context, false, &mut scope, &mut stats, &diagnostics)
            .unwrap();
        assert_eq!(status, RafxShaderStatus::Failed);
        assert!(shader.gl_program_id().is_none());
        assert_eq!(context.live_program_count(), 0);

        let reported: Vec<_> = receiver.try_iter().collect();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].message.contains("lit"));

        // A failed shader stays failed without touching the driver again
        let start = context.call_count();
        shader
            .compile(&context, false, &mut scope, &mut stats, &diagnostics)
            .unwrap();
        assert_eq!(context.call_count(), start);
    }

    #[test]
    fn parallel_compile_waits_for_completion() {
        let mut config = RecordingGlConfig::gles3();
        config.completion_status_pending_polls = 2;
        let context = RecordingGlContext::new(config);
        let mut scope = RafxUniformScope::default();
        let mut stats = RafxShaderCompileStats::default();
        let diagnostics = RafxDiagnostics::default();

        let mut shader = RafxShaderGl::new(shader_def(FRAGMENT_SOURCE));
        let mut compile = |shader: &mut RafxShaderGl| {
            shader
                .compile(&context, true, &mut scope, &mut stats, &diagnostics)
                .unwrap()
        };
        assert_eq!(compile(&mut shader), RafxShaderStatus::Compiling);
        assert_eq!(compile(&mut shader), RafxShaderStatus::Compiling);
        assert_eq!(compile(&mut shader), RafxShaderStatus::Ready);
        assert_eq!(stats.programs_linked, 1);
    }

    #[test]
    fn lost_shader_rebuilds() {
        let context = RecordingGlContext::new(RecordingGlConfig::gles3());
        let mut scope = RafxUniformScope::default();
        let mut stats = RafxShaderCompileStats::default();
        let diagnostics = RafxDiagnostics::default();

        let mut shader = RafxShaderGl::new(shader_def(FRAGMENT_SOURCE));
        shader
            .compile(&context, false, &mut scope, &mut stats, &diagnostics)
            .unwrap();
        let first_program = shader.gl_program_id().unwrap();

        shader.lose_context();
        assert_eq!(shader.status(), RafxShaderStatus::Pending);
        assert!(shader.gl_program_id().is_none());

        shader
            .compile(&context, false, &mut scope, &mut stats, &diagnostics)
            .unwrap();
        assert_ne!(shader.gl_program_id(), Some(first_program));
        assert_eq!(stats.programs_linked, 2);
    }
}
