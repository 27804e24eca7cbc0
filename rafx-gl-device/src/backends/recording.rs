//! A headless context that records every call instead of talking to a driver. It keeps enough
//! object state (texture levels, programs, bindings) to answer queries the device makes and to
//! let callers assert on what reached the "GPU".

use super::gl_context::*;
use super::gles_bindings;
use super::gles_bindings::types::GLenum;
use crate::{RafxApiTier, RafxContextAttributes, RafxError, RafxResult};
use fnv::{FnvHashMap, FnvHashSet};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A call that reached the context. Queries are not recorded.
#[derive(Clone, Debug, PartialEq)]
pub enum GlCall {
    Enable(GLenum),
    Disable(GLenum),
    BlendFuncSeparate(GLenum, GLenum, GLenum, GLenum),
    BlendEquationSeparate(GLenum, GLenum),
    BlendColor([f32; 4]),
    ColorMask([bool; 4]),
    DepthMask(bool),
    DepthFunc(GLenum),
    PolygonOffset(f32, f32),
    CullFace(GLenum),
    StencilFuncSeparate {
        face: GLenum,
        func: GLenum,
        reference: i32,
        mask: u32,
    },
    StencilOpSeparate {
        face: GLenum,
        fail: GLenum,
        zfail: GLenum,
        zpass: GLenum,
    },
    StencilMaskSeparate {
        face: GLenum,
        mask: u32,
    },
    Viewport(i32, i32, i32, i32),
    Scissor(i32, i32, i32, i32),
    ClearColor([f32; 4]),
    ClearDepth(f32),
    ClearStencil(i32),
    Clear(u32),
    Hint(GLenum, GLenum),
    PixelStorei(GLenum, i32),
    Flush,

    CreateTexture(TextureId),
    DestroyTexture(TextureId),
    ActiveTexture(u32),
    BindTexture(GLenum, TextureId),
    TexParameteri(GLenum, GLenum, i32),
    TexParameterf(GLenum, GLenum, f32),
    TexImage2D {
        target: GLenum,
        mip_level: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
        format: GLenum,
        type_: GLenum,
        has_data: bool,
    },
    TexSubImage2D {
        target: GLenum,
        mip_level: u32,
        width: u32,
        height: u32,
    },
    TexImage2DWithImage {
        target: GLenum,
        mip_level: u32,
        width: u32,
        height: u32,
    },
    TexSubImage2DWithImage {
        target: GLenum,
        mip_level: u32,
        width: u32,
        height: u32,
    },
    CompressedTexImage2D {
        target: GLenum,
        mip_level: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
    },
    CompressedTexSubImage2D {
        target: GLenum,
        mip_level: u32,
        width: u32,
        height: u32,
    },
    TexImage3D {
        mip_level: u32,
        width: u32,
        height: u32,
        depth: u32,
    },
    CompressedTexImage3D {
        mip_level: u32,
        width: u32,
        height: u32,
        depth: u32,
    },
    GenerateMipmap(GLenum),

    CreateBuffer(BufferId),
    DestroyBuffer(BufferId),
    BindBuffer(GLenum, BufferId),
    BufferData {
        target: GLenum,
        size: usize,
        usage: GLenum,
    },
    BufferSubData {
        target: GLenum,
        offset: u32,
        size: usize,
    },
    CreateVertexArray(VertexArrayId),
    DestroyVertexArray(VertexArrayId),
    BindVertexArray(VertexArrayId),
    VertexAttribPointer {
        index: u32,
        size: i32,
        type_: GLenum,
        normalized: bool,
        stride: u32,
        byte_offset: u32,
    },
    EnableVertexAttribArray(u32),
    DisableVertexAttribArray(u32),
    VertexAttribDivisor(u32, u32),

    CreateShader(ShaderId),
    ShaderSource(ShaderId),
    CompileShader(ShaderId),
    DestroyShader(ShaderId),
    CreateProgram(ProgramId),
    AttachShader(ProgramId, ShaderId),
    BindAttribLocation(ProgramId, u32, String),
    LinkProgram(ProgramId),
    DestroyProgram(ProgramId),
    UseProgram(ProgramId),
    UniformIv {
        components: u32,
        location: LocationId,
        data: Vec<i32>,
    },
    UniformFv {
        components: u32,
        location: LocationId,
        data: Vec<f32>,
    },
    UniformMatrixFv {
        dimension: u32,
        location: LocationId,
        data: Vec<f32>,
    },

    CreateFramebuffer(FramebufferId),
    DestroyFramebuffer(FramebufferId),
    BindFramebuffer(GLenum, FramebufferId),
    FramebufferTexture2D {
        attachment: GLenum,
        texture_target: GLenum,
        texture_id: TextureId,
        mip_level: u32,
    },
    CreateRenderbuffer(RenderbufferId),
    DestroyRenderbuffer(RenderbufferId),
    BindRenderbuffer(RenderbufferId),
    RenderbufferStorage {
        internal_format: GLenum,
        width: u32,
        height: u32,
    },
    RenderbufferStorageMultisample {
        samples: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
    },
    FramebufferRenderbuffer {
        attachment: GLenum,
        renderbuffer_id: RenderbufferId,
    },
    DrawBuffers(Vec<GLenum>),
    BlitFramebuffer {
        width: i32,
        height: i32,
        mask: u32,
        filter: GLenum,
    },
    InvalidateFramebuffer(GLenum, Vec<GLenum>),

    DrawArrays {
        mode: GLenum,
        first: i32,
        count: i32,
    },
    DrawElements {
        mode: GLenum,
        count: i32,
        type_: GLenum,
        byte_offset: u32,
    },
    DrawArraysInstanced {
        mode: GLenum,
        first: i32,
        count: i32,
        instance_count: i32,
    },
    DrawElementsInstanced {
        mode: GLenum,
        count: i32,
        type_: GLenum,
        byte_offset: u32,
        instance_count: i32,
    },
}

impl GlCall {
    pub fn is_draw(&self) -> bool {
        match self {
            GlCall::DrawArrays { .. }
            | GlCall::DrawElements { .. }
            | GlCall::DrawArraysInstanced { .. }
            | GlCall::DrawElementsInstanced { .. } => true,
            _ => false,
        }
    }

    pub fn is_texture_upload(&self) -> bool {
        match self {
            GlCall::TexImage2D { .. }
            | GlCall::TexSubImage2D { .. }
            | GlCall::TexImage2DWithImage { .. }
            | GlCall::TexSubImage2DWithImage { .. }
            | GlCall::CompressedTexImage2D { .. }
            | GlCall::CompressedTexSubImage2D { .. }
            | GlCall::TexImage3D { .. }
            | GlCall::CompressedTexImage3D { .. } => true,
            _ => false,
        }
    }
}

/// What a recorded texture level holds
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedLevelContent {
    /// Storage allocated with no data
    Allocated,
    /// Raw bytes (compressed or not)
    Data(Vec<u8>),
    /// A decoded image, with the unpack flags in effect when it was uploaded
    Image {
        pixels: Vec<u8>,
        flip_y: bool,
        premultiply_alpha: bool,
    },
    /// Filled by mipmap generation
    Generated,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedLevel {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub internal_format: GLenum,
    pub content: RecordedLevelContent,
}

#[derive(Clone, Debug, Default)]
pub struct RecordedTexture {
    pub target: Option<GLenum>,
    /// Keyed by (face or texture target, mip level)
    pub levels: FnvHashMap<(GLenum, u32), RecordedLevel>,
}

impl RecordedTexture {
    pub fn level(
        &self,
        target: GLenum,
        mip_level: u32,
    ) -> Option<&RecordedLevel> {
        self.levels.get(&(target, mip_level))
    }
}

/// Configuration of the simulated driver
#[derive(Clone, Debug)]
pub struct RecordingGlConfig {
    pub tier: RafxApiTier,
    pub extensions: Vec<String>,
    /// Overrides for `gl_get_integerv`
    pub limits: FnvHashMap<GLenum, i32>,
    pub max_anisotropy: f32,
    pub vendor: String,
    pub renderer: String,
    pub unmasked_vendor: String,
    pub unmasked_renderer: String,
    pub user_agent: Option<String>,
    pub drawing_buffer_size: (u32, u32),
    /// Number of COMPLETION_STATUS queries that report "still compiling" per program
    pub completion_status_pending_polls: u32,
}

impl RecordingGlConfig {
    pub fn gles3() -> Self {
        RecordingGlConfig {
            tier: RafxApiTier::Gles3,
            extensions: vec![
                "EXT_color_buffer_float".to_string(),
                "OES_texture_float_linear".to_string(),
                "EXT_texture_filter_anisotropic".to_string(),
                "WEBGL_debug_renderer_info".to_string(),
                "WEBGL_compressed_texture_s3tc".to_string(),
                "KHR_parallel_shader_compile".to_string(),
            ],
            limits: FnvHashMap::default(),
            max_anisotropy: 16.0,
            vendor: "WebKit".to_string(),
            renderer: "WebKit WebGL".to_string(),
            unmasked_vendor: "Recording Vendor".to_string(),
            unmasked_renderer: "Recording Renderer".to_string(),
            user_agent: None,
            drawing_buffer_size: (640, 480),
            completion_status_pending_polls: 0,
        }
    }

    pub fn gles2() -> Self {
        RecordingGlConfig {
            tier: RafxApiTier::Gles2,
            extensions: vec![
                "ANGLE_instanced_arrays".to_string(),
                "OES_vertex_array_object".to_string(),
                "OES_element_index_uint".to_string(),
                "OES_standard_derivatives".to_string(),
                "WEBGL_depth_texture".to_string(),
                "WEBGL_debug_renderer_info".to_string(),
            ],
            ..Self::gles3()
        }
    }

    pub fn with_extensions(
        mut self,
        extensions: &[&str],
    ) -> Self {
        for extension in extensions {
            if !self.extensions.iter().any(|x| x == extension) {
                self.extensions.push(extension.to_string());
            }
        }
        self
    }

    pub fn without_extensions(
        mut self,
        extensions: &[&str],
    ) -> Self {
        self.extensions.retain(|x| !extensions.contains(&x.as_str()));
        self
    }

    pub fn with_limit(
        mut self,
        pname: GLenum,
        value: i32,
    ) -> Self {
        self.limits.insert(pname, value);
        self
    }

    fn default_limit(
        &self,
        pname: GLenum,
    ) -> Option<i32> {
        let gles3 = self.tier.is_gles3();
        let value = match pname {
            gles_bindings::MAX_TEXTURE_SIZE => 4096,
            gles_bindings::MAX_CUBE_MAP_TEXTURE_SIZE => 4096,
            gles_bindings::MAX_3D_TEXTURE_SIZE if gles3 => 2048,
            gles_bindings::MAX_RENDERBUFFER_SIZE => 4096,
            gles_bindings::MAX_TEXTURE_IMAGE_UNITS => 16,
            gles_bindings::MAX_COMBINED_TEXTURE_IMAGE_UNITS => 32,
            gles_bindings::MAX_VERTEX_TEXTURE_IMAGE_UNITS => 16,
            gles_bindings::MAX_VERTEX_UNIFORM_VECTORS => 256,
            gles_bindings::MAX_FRAGMENT_UNIFORM_VECTORS => 224,
            gles_bindings::MAX_VERTEX_ATTRIBS => 16,
            gles_bindings::MAX_DRAW_BUFFERS => {
                if gles3 {
                    8
                } else {
                    4
                }
            }
            gles_bindings::MAX_COLOR_ATTACHMENTS => {
                if gles3 {
                    8
                } else {
                    4
                }
            }
            gles_bindings::MAX_SAMPLES if gles3 => 8,
            _ => return None,
        };
        Some(value)
    }
}

impl Default for RecordingGlConfig {
    fn default() -> Self {
        RecordingGlConfig::gles3()
    }
}

#[derive(Debug)]
struct RecordedShader {
    source: String,
    compiled: bool,
}

#[derive(Debug, Default)]
struct RecordedProgram {
    shaders: Vec<ShaderId>,
    linked: bool,
    link_log: Option<String>,
    uniforms: Vec<ActiveUniformInfo>,
    locations: FnvHashMap<String, LocationId>,
    completion_polls: u32,
}

#[derive(Default)]
struct RecordingState {
    config: RecordingGlConfig,
    calls: Vec<GlCall>,
    next_id: u32,
    lost: bool,
    drawing_buffer_size: (u32, u32),
    enabled_extensions: FnvHashSet<String>,
    textures: FnvHashMap<TextureId, RecordedTexture>,
    bound_textures: FnvHashMap<(u32, GLenum), TextureId>,
    active_unit: u32,
    buffers: FnvHashMap<BufferId, Vec<u8>>,
    bound_buffers: FnvHashMap<GLenum, BufferId>,
    vertex_arrays: FnvHashSet<VertexArrayId>,
    shaders: FnvHashMap<ShaderId, RecordedShader>,
    programs: FnvHashMap<ProgramId, RecordedProgram>,
    framebuffers: FnvHashSet<FramebufferId>,
    renderbuffers: FnvHashSet<RenderbufferId>,
    unpack_flip_y: bool,
    unpack_premultiply_alpha: bool,
    image_bitmap_probes: Vec<Arc<AtomicBool>>,
}

impl RecordingState {
    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn bound_texture(
        &self,
        target: GLenum,
    ) -> Option<TextureId> {
        let bind_target = match target {
            gles_bindings::TEXTURE_CUBE_MAP_POSITIVE_X..=gles_bindings::TEXTURE_CUBE_MAP_NEGATIVE_Z => {
                gles_bindings::TEXTURE_CUBE_MAP
            }
            other => other,
        };

        self.bound_textures
            .get(&(self.active_unit, bind_target))
            .copied()
    }

    fn write_level(
        &mut self,
        target: GLenum,
        mip_level: u32,
        level: RecordedLevel,
    ) -> RafxResult<()> {
        let texture_id = self
            .bound_texture(target)
            .ok_or("No texture bound for upload")?;
        let texture = self
            .textures
            .get_mut(&texture_id)
            .ok_or("Upload to a deleted texture")?;
        texture.levels.insert((target, mip_level), level);
        Ok(())
    }

    fn update_level(
        &mut self,
        target: GLenum,
        mip_level: u32,
        content: RecordedLevelContent,
    ) -> RafxResult<()> {
        let texture_id = self
            .bound_texture(target)
            .ok_or("No texture bound for upload")?;
        let level = self
            .textures
            .get_mut(&texture_id)
            .and_then(|x| x.levels.get_mut(&(target, mip_level)))
            .ok_or_else(|| {
                format!(
                    "Sub-image upload to unallocated level {} of target 0x{:X}",
                    mip_level, target
                )
            })?;
        level.content = content;
        Ok(())
    }

    fn program_of(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<&RecordedProgram> {
        self.programs
            .get(&program_id)
            .ok_or_else(|| RafxError::StringError(format!("Unknown program {:?}", program_id)))
    }
}

/// Headless `GlContext`. Cloning shares the same underlying recording, so a caller can keep a
/// clone to inspect the calls made through the boxed copy owned by the device.
#[derive(Clone)]
pub struct RecordingGlContext {
    state: Rc<RefCell<RecordingState>>,
}

impl RecordingGlContext {
    pub fn new(config: RecordingGlConfig) -> Self {
        let drawing_buffer_size = config.drawing_buffer_size;
        RecordingGlContext {
            state: Rc::new(RefCell::new(RecordingState {
                config,
                drawing_buffer_size,
                ..Default::default()
            })),
        }
    }

    fn record(
        &self,
        call: GlCall,
    ) {
        self.state.borrow_mut().calls.push(call);
    }

    fn allocate(&self) -> RafxResult<u32> {
        let mut state = self.state.borrow_mut();
        if state.lost {
            return Err(RafxError::ContextLost);
        }
        Ok(state.allocate_id())
    }

    pub fn calls(&self) -> Vec<GlCall> {
        self.state.borrow().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.borrow().calls.len()
    }

    /// Calls recorded after the first `start` calls
    pub fn calls_since(
        &self,
        start: usize,
    ) -> Vec<GlCall> {
        self.state.borrow().calls[start..].to_vec()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn texture(
        &self,
        texture_id: TextureId,
    ) -> Option<RecordedTexture> {
        self.state.borrow().textures.get(&texture_id).cloned()
    }

    pub fn buffer_contents(
        &self,
        buffer_id: BufferId,
    ) -> Option<Vec<u8>> {
        self.state.borrow().buffers.get(&buffer_id).cloned()
    }

    pub fn live_texture_count(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_program_count(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn live_framebuffer_count(&self) -> usize {
        self.state.borrow().framebuffers.len()
    }

    pub fn live_vertex_array_count(&self) -> usize {
        self.state.borrow().vertex_arrays.len()
    }

    /// Drops every object, as a browser does when the context is lost
    pub fn simulate_context_loss(&self) {
        let mut state = self.state.borrow_mut();
        state.lost = true;
        state.textures.clear();
        state.bound_textures.clear();
        state.buffers.clear();
        state.bound_buffers.clear();
        state.vertex_arrays.clear();
        state.shaders.clear();
        state.programs.clear();
        state.framebuffers.clear();
        state.renderbuffers.clear();
        state.enabled_extensions.clear();
        state.active_unit = 0;
        state.unpack_flip_y = false;
        state.unpack_premultiply_alpha = false;
    }

    pub fn simulate_context_restore(&self) {
        self.state.borrow_mut().lost = false;
    }

    /// Resolves every pending image bitmap probe with the given result
    pub fn resolve_image_bitmap_probes(
        &self,
        supported: bool,
    ) {
        let probes = std::mem::take(&mut self.state.borrow_mut().image_bitmap_probes);
        for probe in probes {
            probe.store(supported, Ordering::Relaxed);
        }
    }

    pub fn is_extension_enabled(
        &self,
        name: &str,
    ) -> bool {
        self.state.borrow().enabled_extensions.contains(name)
    }
}

fn parse_uniform_type(name: &str) -> Option<GLenum> {
    let ty = match name {
        "float" => gles_bindings::FLOAT,
        "vec2" => gles_bindings::FLOAT_VEC2,
        "vec3" => gles_bindings::FLOAT_VEC3,
        "vec4" => gles_bindings::FLOAT_VEC4,
        "int" => gles_bindings::INT,
        "ivec2" => gles_bindings::INT_VEC2,
        "ivec3" => gles_bindings::INT_VEC3,
        "ivec4" => gles_bindings::INT_VEC4,
        "bool" => gles_bindings::BOOL,
        "bvec2" => gles_bindings::BOOL_VEC2,
        "bvec3" => gles_bindings::BOOL_VEC3,
        "bvec4" => gles_bindings::BOOL_VEC4,
        "mat2" => gles_bindings::FLOAT_MAT2,
        "mat3" => gles_bindings::FLOAT_MAT3,
        "mat4" => gles_bindings::FLOAT_MAT4,
        "sampler2D" => gles_bindings::SAMPLER_2D,
        "sampler3D" => gles_bindings::SAMPLER_3D,
        "samplerCube" => gles_bindings::SAMPLER_CUBE,
        "sampler2DShadow" => gles_bindings::SAMPLER_2D_SHADOW,
        "samplerCubeShadow" => gles_bindings::SAMPLER_CUBE_SHADOW,
        _ => return None,
    };
    Some(ty)
}

/// Finds `uniform <precision>? <type> <name>([N])?, ...;` declarations. Good enough to reflect
/// the sources used with the recording context.
fn reflect_uniforms(sources: &[&str]) -> Vec<ActiveUniformInfo> {
    let mut uniforms: Vec<ActiveUniformInfo> = Vec::default();
    for source in sources {
        for line in source.lines() {
            let line = line.trim();
            if !line.starts_with("uniform ") {
                continue;
            }

            let declaration = line.trim_start_matches("uniform ").trim_end_matches(';');
            let mut tokens = declaration.split_whitespace().peekable();
            while let Some(&token) = tokens.peek() {
                if token == "lowp" || token == "mediump" || token == "highp" {
                    tokens.next();
                } else {
                    break;
                }
            }

            let ty = match tokens.next().and_then(parse_uniform_type) {
                Some(ty) => ty,
                None => continue,
            };

            let names: String = tokens.collect::<Vec<_>>().join("");
            for name in names.split(',').filter(|x| !x.is_empty()) {
                let (name, size) = match name.find('[') {
                    Some(bracket) => {
                        let size = name[bracket + 1..]
                            .trim_end_matches(']')
                            .parse::<u32>()
                            .unwrap_or(1);
                        (format!("{}[0]", &name[..bracket]), size)
                    }
                    None => (name.to_string(), 1),
                };

                // Declarations shared between stages are reported once
                if !uniforms.iter().any(|x| x.name == name) {
                    uniforms.push(ActiveUniformInfo { name, size, ty });
                }
            }
        }
    }
    uniforms
}

/// Creates `RecordingGlContext`s for the tiers listed in the config and remembers the last one
pub struct RecordingGlContextProvider {
    config: RecordingGlConfig,
    available: bool,
    last_context: RefCell<Option<RecordingGlContext>>,
    last_attributes: RefCell<Option<RafxContextAttributes>>,
}

impl RecordingGlContextProvider {
    pub fn new(config: RecordingGlConfig) -> Self {
        RecordingGlContextProvider {
            config,
            available: true,
            last_context: Default::default(),
            last_attributes: Default::default(),
        }
    }

    /// A provider that fails to create a context under every tier
    pub fn unavailable() -> Self {
        RecordingGlContextProvider {
            available: false,
            ..Self::new(RecordingGlConfig::default())
        }
    }

    pub fn last_context(&self) -> Option<RecordingGlContext> {
        self.last_context.borrow().clone()
    }

    pub fn last_attributes(&self) -> Option<RafxContextAttributes> {
        *self.last_attributes.borrow()
    }
}

impl RafxGlContextProvider for RecordingGlContextProvider {
    fn user_agent(&self) -> Option<String> {
        self.config.user_agent.clone()
    }

    fn create_context(
        &self,
        tier: RafxApiTier,
        attributes: &RafxContextAttributes,
    ) -> RafxResult<Option<Box<dyn GlContext>>> {
        // A newer driver can always hand out an older tier context
        if !self.available || tier > self.config.tier {
            return Ok(None);
        }

        let mut config = self.config.clone();
        config.tier = tier;
        let context = RecordingGlContext::new(config);
        *self.last_context.borrow_mut() = Some(context.clone());
        *self.last_attributes.borrow_mut() = Some(*attributes);
        Ok(Some(Box::new(context)))
    }
}

impl GlContext for RecordingGlContext {
    fn api_tier(&self) -> RafxApiTier {
        self.state.borrow().config.tier
    }

    fn is_context_lost(&self) -> bool {
        self.state.borrow().lost
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.state.borrow().drawing_buffer_size
    }

    fn set_drawing_buffer_size(
        &self,
        width: u32,
        height: u32,
    ) {
        self.state.borrow_mut().drawing_buffer_size = (width, height);
    }

    fn user_agent(&self) -> Option<String> {
        self.state.borrow().config.user_agent.clone()
    }

    fn supported_extensions(&self) -> Vec<String> {
        let state = self.state.borrow();
        if state.lost {
            return Vec::default();
        }
        state.config.extensions.clone()
    }

    fn enable_extension(
        &self,
        name: &str,
    ) -> bool {
        let mut state = self.state.borrow_mut();
        if state.lost || !state.config.extensions.iter().any(|x| x == name) {
            return false;
        }
        state.enabled_extensions.insert(name.to_string());
        true
    }

    fn check_for_error(&self) -> RafxResult<()> {
        if self.state.borrow().lost {
            Err(RafxError::GlError(gles_bindings::CONTEXT_LOST_WEBGL))
        } else {
            Ok(())
        }
    }

    fn gl_get_integerv(
        &self,
        pname: GLenum,
    ) -> RafxResult<i32> {
        let state = self.state.borrow();
        state
            .config
            .limits
            .get(&pname)
            .copied()
            .or_else(|| state.config.default_limit(pname))
            .ok_or_else(|| RafxError::GlError(gles_bindings::INVALID_ENUM))
    }

    fn gl_get_floatv(
        &self,
        pname: GLenum,
    ) -> RafxResult<f32> {
        let state = self.state.borrow();
        match pname {
            gles_bindings::MAX_TEXTURE_MAX_ANISOTROPY_EXT => Ok(state.config.max_anisotropy),
            _ => state
                .config
                .limits
                .get(&pname)
                .copied()
                .or_else(|| state.config.default_limit(pname))
                .map(|x| x as f32)
                .ok_or(RafxError::GlError(gles_bindings::INVALID_ENUM)),
        }
    }

    fn gl_get_string(
        &self,
        pname: GLenum,
    ) -> RafxResult<Option<String>> {
        let state = self.state.borrow();
        let config = &state.config;
        let value = match pname {
            gles_bindings::VENDOR => config.vendor.clone(),
            gles_bindings::RENDERER => config.renderer.clone(),
            gles_bindings::VERSION => match config.tier {
                RafxApiTier::Gles3 => "WebGL 2.0".to_string(),
                RafxApiTier::Gles2 => "WebGL 1.0".to_string(),
            },
            gles_bindings::SHADING_LANGUAGE_VERSION => match config.tier {
                RafxApiTier::Gles3 => "WebGL GLSL ES 3.00".to_string(),
                RafxApiTier::Gles2 => "WebGL GLSL ES 1.0".to_string(),
            },
            gles_bindings::UNMASKED_VENDOR_WEBGL
                if state.enabled_extensions.contains("WEBGL_debug_renderer_info") =>
            {
                config.unmasked_vendor.clone()
            }
            gles_bindings::UNMASKED_RENDERER_WEBGL
                if state.enabled_extensions.contains("WEBGL_debug_renderer_info") =>
            {
                config.unmasked_renderer.clone()
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn start_image_bitmap_probe(
        &self,
        result: Arc<AtomicBool>,
    ) {
        self.state.borrow_mut().image_bitmap_probes.push(result);
    }

    fn gl_enable(
        &self,
        cap: GLenum,
    ) -> RafxResult<()> {
        self.record(GlCall::Enable(cap));
        Ok(())
    }

    fn gl_disable(
        &self,
        cap: GLenum,
    ) -> RafxResult<()> {
        self.record(GlCall::Disable(cap));
        Ok(())
    }

    fn gl_blend_func_separate(
        &self,
        src_rgb: GLenum,
        dst_rgb: GLenum,
        src_alpha: GLenum,
        dst_alpha: GLenum,
    ) -> RafxResult<()> {
        self.record(GlCall::BlendFuncSeparate(
            src_rgb, dst_rgb, src_alpha, dst_alpha,
        ));
        Ok(())
    }

    fn gl_blend_equation_separate(
        &self,
        mode_rgb: GLenum,
        mode_alpha: GLenum,
    ) -> RafxResult<()> {
        self.record(GlCall::BlendEquationSeparate(mode_rgb, mode_alpha));
        Ok(())
    }

    fn gl_blend_color(
        &self,
        r: f32,
        g: f32,
        b: f32,
        a: f32,
    ) -> RafxResult<()> {
        self.record(GlCall::BlendColor([r, g, b, a]));
        Ok(())
    }

    fn gl_color_mask(
        &self,
        r: bool,
        g: bool,
        b: bool,
        a: bool,
    ) -> RafxResult<()> {
        self.record(GlCall::ColorMask([r, g, b, a]));
        Ok(())
    }

    fn gl_depth_mask(
        &self,
        flag: bool,
    ) -> RafxResult<()> {
        self.record(GlCall::DepthMask(flag));
        Ok(())
    }

    fn gl_depth_func(
        &self,
        func: GLenum,
    ) -> RafxResult<()> {
        self.record(GlCall::DepthFunc(func));
        Ok(())
    }

    fn gl_polygon_offset(
        &self,
        factor: f32,
        units: f32,
    ) -> RafxResult<()> {
        self.record(GlCall::PolygonOffset(factor, units));
        Ok(())
    }

    fn gl_cull_face(
        &self,
        mode: GLenum,
    ) -> RafxResult<()> {
        self.record(GlCall::CullFace(mode));
        Ok(())
    }

    fn gl_stencil_func_separate(
        &self,
        face: GLenum,
        func: GLenum,
        reference: i32,
        mask: u32,
    ) -> RafxResult<()> {
        self.record(GlCall::StencilFuncSeparate {
            face,
            func,
            reference,
            mask,
        });
        Ok(())
    }

    fn gl_stencil_op_separate(
        &self,
        face: GLenum,
        fail: GLenum,
        zfail: GLenum,
        zpass: GLenum,
    ) -> RafxResult<()> {
        self.record(GlCall::StencilOpSeparate {
            face,
            fail,
            zfail,
            zpass,
        });
        Ok(())
    }

    fn gl_stencil_mask_separate(
        &self,
        face: GLenum,
        mask: u32,
    ) -> RafxResult<()> {
        self.record(GlCall::StencilMaskSeparate { face, mask });
        Ok(())
    }

    fn gl_viewport(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> RafxResult<()> {
        self.record(GlCall::Viewport(x, y, width, height));
        Ok(())
    }

    fn gl_scissor(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> RafxResult<()> {
        self.record(GlCall::Scissor(x, y, width, height));
        Ok(())
    }

    fn gl_clear_color(
        &self,
        r: f32,
        g: f32,
        b: f32,
        a: f32,
    ) -> RafxResult<()> {
        self.record(GlCall::ClearColor([r, g, b, a]));
        Ok(())
    }

    fn gl_clear_depthf(
        &self,
        d: f32,
    ) -> RafxResult<()> {
        self.record(GlCall::ClearDepth(d));
        Ok(())
    }

    fn gl_clear_stencil(
        &self,
        s: i32,
    ) -> RafxResult<()> {
        self.record(GlCall::ClearStencil(s));
        Ok(())
    }

    fn gl_clear(
        &self,
        mask: u32,
    ) -> RafxResult<()> {
        self.record(GlCall::Clear(mask));
        Ok(())
    }

    fn gl_hint(
        &self,
        target: GLenum,
        mode: GLenum,
    ) -> RafxResult<()> {
        self.record(GlCall::Hint(target, mode));
        Ok(())
    }

    fn gl_pixel_storei(
        &self,
        pname: GLenum,
        param: i32,
    ) -> RafxResult<()> {
        {
            let mut state = self.state.borrow_mut();
            match pname {
                gles_bindings::UNPACK_FLIP_Y_WEBGL => state.unpack_flip_y = param != 0,
                gles_bindings::UNPACK_PREMULTIPLY_ALPHA_WEBGL => {
                    state.unpack_premultiply_alpha = param != 0
                }
                _ => {}
            }
        }
        self.record(GlCall::PixelStorei(pname, param));
        Ok(())
    }

    fn gl_flush(&self) -> RafxResult<()> {
        self.record(GlCall::Flush);
        Ok(())
    }

    fn gl_create_texture(&self) -> RafxResult<TextureId> {
        let texture_id = TextureId(self.allocate()?);
        self.state
            .borrow_mut()
            .textures
            .insert(texture_id, RecordedTexture::default());
        self.record(GlCall::CreateTexture(texture_id));
        Ok(texture_id)
    }

    fn gl_destroy_texture(
        &self,
        texture_id: TextureId,
    ) -> RafxResult<()> {
        {
            let mut state = self.state.borrow_mut();
            state.textures.remove(&texture_id);
            state.bound_textures.retain(|_, x| *x != texture_id);
        }
        self.record(GlCall::DestroyTexture(texture_id));
        Ok(())
    }

    fn gl_active_texture(
        &self,
        unit: u32,
    ) -> RafxResult<()> {
        self.state.borrow_mut().active_unit = unit;
        self.record(GlCall::ActiveTexture(unit));
        Ok(())
    }

    fn gl_bind_texture(
        &self,
        target: GLenum,
        texture_id: TextureId,
    ) -> RafxResult<()> {
        {
            let mut state = self.state.borrow_mut();
            let unit = state.active_unit;
            if texture_id == NONE_TEXTURE {
                state.bound_textures.remove(&(unit, target));
            } else {
                if let Some(texture) = state.textures.get_mut(&texture_id) {
                    if let Some(existing) = texture.target {
                        if existing != target {
                            return Err(RafxError::GlError(gles_bindings::INVALID_OPERATION));
                        }
                    }
                    texture.target = Some(target);
                }
                state.bound_textures.insert((unit, target), texture_id);
            }
        }
        self.record(GlCall::BindTexture(target, texture_id));
        Ok(())
    }

    fn gl_tex_parameteri(
        &self,
        target: GLenum,
        pname: GLenum,
        param: i32,
    ) -> RafxResult<()> {
        self.record(GlCall::TexParameteri(target, pname, param));
        Ok(())
    }

    fn gl_tex_parameterf(
        &self,
        target: GLenum,
        pname: GLenum,
        param: f32,
    ) -> RafxResult<()> {
        self.record(GlCall::TexParameterf(target, pname, param));
        Ok(())
    }

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
    ) -> RafxResult<()> {
        let content = match pixels {
            Some(pixels) => RecordedLevelContent::Data(pixels.to_vec()),
            None => RecordedLevelContent::Allocated,
        };
        self.state.borrow_mut().write_level(
            target,
            mip_level,
            RecordedLevel {
                width,
                height,
                depth: 1,
                internal_format,
                content,
            },
        )?;
        self.record(GlCall::TexImage2D {
            target,
            mip_level,
            internal_format,
            width,
            height,
            format,
            type_,
            has_data: pixels.is_some(),
        });
        Ok(())
    }

    fn gl_tex_sub_image_2d(
        &self,
        target: GLenum,
        mip_level: u32,
        width: u32,
        height: u32,
        _format: GLenum,
        _type_: GLenum,
        pixels: &[u8],
    ) -> RafxResult<()> {
        self.state.borrow_mut().update_level(
            target,
            mip_level,
            RecordedLevelContent::Data(pixels.to_vec()),
        )?;
        self.record(GlCall::TexSubImage2D {
            target,
            mip_level,
            width,
            height,
        });
        Ok(())
    }

    fn gl_tex_image_2d_with_image(
        &self,
        target: GLenum,
        mip_level: u32,
        internal_format: GLenum,
        _format: GLenum,
        _type_: GLenum,
        image: &image::RgbaImage,
    ) -> RafxResult<()> {
        let (width, height) = image.dimensions();
        {
            let mut state = self.state.borrow_mut();
            let content = RecordedLevelContent::Image {
                pixels: image.as_raw().clone(),
                flip_y: state.unpack_flip_y,
                premultiply_alpha: state.unpack_premultiply_alpha,
            };
            state.write_level(
                target,
                mip_level,
                RecordedLevel {
                    width,
                    height,
                    depth: 1,
                    internal_format,
                    content,
                },
            )?;
        }
        self.record(GlCall::TexImage2DWithImage {
            target,
            mip_level,
            width,
            height,
        });
        Ok(())
    }

    fn gl_tex_sub_image_2d_with_image(
        &self,
        target: GLenum,
        mip_level: u32,
        _format: GLenum,
        _type_: GLenum,
        image: &image::RgbaImage,
    ) -> RafxResult<()> {
        let (width, height) = image.dimensions();
        {
            let mut state = self.state.borrow_mut();
            let content = RecordedLevelContent::Image {
                pixels: image.as_raw().clone(),
                flip_y: state.unpack_flip_y,
                premultiply_alpha: state.unpack_premultiply_alpha,
            };
            state.update_level(target, mip_level, content)?;
        }
        self.record(GlCall::TexSubImage2DWithImage {
            target,
            mip_level,
            width,
            height,
        });
        Ok(())
    }

    fn gl_compressed_tex_image_2d(
        &self,
        target: GLenum,
        mip_level: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> RafxResult<()> {
        self.state.borrow_mut().write_level(
            target,
            mip_level,
            RecordedLevel {
                width,
                height,
                depth: 1,
                internal_format,
                content: RecordedLevelContent::Data(data.to_vec()),
            },
        )?;
        self.record(GlCall::CompressedTexImage2D {
            target,
            mip_level,
            internal_format,
            width,
            height,
        });
        Ok(())
    }

    fn gl_compressed_tex_sub_image_2d(
        &self,
        target: GLenum,
        mip_level: u32,
        width: u32,
        height: u32,
        _format: GLenum,
        data: &[u8],
    ) -> RafxResult<()> {
        self.state.borrow_mut().update_level(
            target,
            mip_level,
            RecordedLevelContent::Data(data.to_vec()),
        )?;
        self.record(GlCall::CompressedTexSubImage2D {
            target,
            mip_level,
            width,
            height,
        });
        Ok(())
    }

    fn gl_tex_image_3d(
        &self,
        target: GLenum,
        mip_level: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
        depth: u32,
        _format: GLenum,
        _type_: GLenum,
        pixels: Option<&[u8]>,
    ) -> RafxResult<()> {
        if !self.api_tier().is_gles3() {
            return Err(RafxError::GlError(gles_bindings::INVALID_OPERATION));
        }

        let content = match pixels {
            Some(pixels) => RecordedLevelContent::Data(pixels.to_vec()),
            None => RecordedLevelContent::Allocated,
        };
        self.state.borrow_mut().write_level(
            target,
            mip_level,
            RecordedLevel {
                width,
                height,
                depth,
                internal_format,
                content,
            },
        )?;
        self.record(GlCall::TexImage3D {
            mip_level,
            width,
            height,
            depth,
        });
        Ok(())
    }

    fn gl_compressed_tex_image_3d(
        &self,
        target: GLenum,
        mip_level: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
        depth: u32,
        data: &[u8],
    ) -> RafxResult<()> {
        if !self.api_tier().is_gles3() {
            return Err(RafxError::GlError(gles_bindings::INVALID_OPERATION));
        }

        self.state.borrow_mut().write_level(
            target,
            mip_level,
            RecordedLevel {
                width,
                height,
                depth,
                internal_format,
                content: RecordedLevelContent::Data(data.to_vec()),
            },
        )?;
        self.record(GlCall::CompressedTexImage3D {
            mip_level,
            width,
            height,
            depth,
        });
        Ok(())
    }

    fn gl_generate_mipmap(
        &self,
        target: GLenum,
    ) -> RafxResult<()> {
        {
            let mut state = self.state.borrow_mut();
            let texture_id = state
                .bound_texture(target)
                .ok_or("No texture bound for mipmap generation")?;
            let texture = state
                .textures
                .get_mut(&texture_id)
                .ok_or("Mipmap generation on a deleted texture")?;

            let face_targets: Vec<GLenum> = if target == gles_bindings::TEXTURE_CUBE_MAP {
                (0..6)
                    .map(|face| gles_bindings::TEXTURE_CUBE_MAP_POSITIVE_X + face)
                    .collect()
            } else {
                vec![target]
            };

            for face_target in face_targets {
                let base = texture
                    .levels
                    .get(&(face_target, 0))
                    .cloned()
                    .ok_or(RafxError::GlError(gles_bindings::INVALID_OPERATION))?;

                let mut width = base.width;
                let mut height = base.height;
                let mut depth = base.depth;
                let mut mip_level = 0;
                while width > 1 || height > 1 || depth > 1 {
                    width = (width / 2).max(1);
                    height = (height / 2).max(1);
                    depth = (depth / 2).max(1);
                    mip_level += 1;
                    texture.levels.insert(
                        (face_target, mip_level),
                        RecordedLevel {
                            width,
                            height,
                            depth,
                            internal_format: base.internal_format,
                            content: RecordedLevelContent::Generated,
                        },
                    );
                }
            }
        }
        self.record(GlCall::GenerateMipmap(target));
        Ok(())
    }

    fn gl_create_buffer(&self) -> RafxResult<BufferId> {
        let buffer_id = BufferId(self.allocate()?);
        self.state
            .borrow_mut()
            .buffers
            .insert(buffer_id, Vec::default());
        self.record(GlCall::CreateBuffer(buffer_id));
        Ok(buffer_id)
    }

    fn gl_destroy_buffer(
        &self,
        buffer_id: BufferId,
    ) -> RafxResult<()> {
        {
            let mut state = self.state.borrow_mut();
            state.buffers.remove(&buffer_id);
            state.bound_buffers.retain(|_, x| *x != buffer_id);
        }
        self.record(GlCall::DestroyBuffer(buffer_id));
        Ok(())
    }

    fn gl_bind_buffer(
        &self,
        target: GLenum,
        buffer_id: BufferId,
    ) -> RafxResult<()> {
        self.state
            .borrow_mut()
            .bound_buffers
            .insert(target, buffer_id);
        self.record(GlCall::BindBuffer(target, buffer_id));
        Ok(())
    }

    fn gl_buffer_data(
        &self,
        target: GLenum,
        data: &[u8],
        usage: GLenum,
    ) -> RafxResult<()> {
        {
            let mut state = self.state.borrow_mut();
            let buffer_id = state
                .bound_buffers
                .get(&target)
                .copied()
                .filter(|x| *x != NONE_BUFFER)
                .ok_or(RafxError::GlError(gles_bindings::INVALID_OPERATION))?;
            if let Some(contents) = state.buffers.get_mut(&buffer_id) {
                *contents = data.to_vec();
            }
        }
        self.record(GlCall::BufferData {
            target,
            size: data.len(),
            usage,
        });
        Ok(())
    }

    fn gl_buffer_sub_data(
        &self,
        target: GLenum,
        offset: u32,
        data: &[u8],
    ) -> RafxResult<()> {
        {
            let mut state = self.state.borrow_mut();
            let buffer_id = state
                .bound_buffers
                .get(&target)
                .copied()
                .ok_or(RafxError::GlError(gles_bindings::INVALID_OPERATION))?;
            let contents = state
                .buffers
                .get_mut(&buffer_id)
                .ok_or(RafxError::GlError(gles_bindings::INVALID_OPERATION))?;
            let end = offset as usize + data.len();
            if end > contents.len() {
                return Err(RafxError::GlError(gles_bindings::INVALID_VALUE));
            }
            contents[offset as usize..end].copy_from_slice(data);
        }
        self.record(GlCall::BufferSubData {
            target,
            offset,
            size: data.len(),
        });
        Ok(())
    }

    fn gl_create_vertex_array(&self) -> RafxResult<VertexArrayId> {
        let supported = {
            let state = self.state.borrow();
            state.config.tier.is_gles3()
                || state.enabled_extensions.contains("OES_vertex_array_object")
        };
        if !supported {
            Err("Vertex array objects are not available on this context")?;
        }

        let vertex_array_id = VertexArrayId(self.allocate()?);
        self.state
            .borrow_mut()
            .vertex_arrays
            .insert(vertex_array_id);
        self.record(GlCall::CreateVertexArray(vertex_array_id));
        Ok(vertex_array_id)
    }

    fn gl_destroy_vertex_array(
        &self,
        vertex_array_id: VertexArrayId,
    ) -> RafxResult<()> {
        self.state
            .borrow_mut()
            .vertex_arrays
            .remove(&vertex_array_id);
        self.record(GlCall::DestroyVertexArray(vertex_array_id));
        Ok(())
    }

    fn gl_bind_vertex_array(
        &self,
        vertex_array_id: VertexArrayId,
    ) -> RafxResult<()> {
        self.record(GlCall::BindVertexArray(vertex_array_id));
        Ok(())
    }

    fn gl_vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        type_: GLenum,
        normalized: bool,
        stride: u32,
        byte_offset: u32,
    ) -> RafxResult<()> {
        self.record(GlCall::VertexAttribPointer {
            index,
            size,
            type_,
            normalized,
            stride,
            byte_offset,
        });
        Ok(())
    }

    fn gl_enable_vertex_attrib_array(
        &self,
        index: u32,
    ) -> RafxResult<()> {
        self.record(GlCall::EnableVertexAttribArray(index));
        Ok(())
    }

    fn gl_disable_vertex_attrib_array(
        &self,
        index: u32,
    ) -> RafxResult<()> {
        self.record(GlCall::DisableVertexAttribArray(index));
        Ok(())
    }

    fn gl_vertex_attrib_divisor(
        &self,
        index: u32,
        divisor: u32,
    ) -> RafxResult<()> {
        self.record(GlCall::VertexAttribDivisor(index, divisor));
        Ok(())
    }

    fn gl_create_shader(
        &self,
        _shader_type: GLenum,
    ) -> RafxResult<ShaderId> {
        let shader_id = ShaderId(self.allocate()?);
        self.state.borrow_mut().shaders.insert(
            shader_id,
            RecordedShader {
                source: String::default(),
                compiled: false,
            },
        );
        self.record(GlCall::CreateShader(shader_id));
        Ok(shader_id)
    }

    fn gl_shader_source(
        &self,
        shader_id: ShaderId,
        source: &str,
    ) -> RafxResult<()> {
        if let Some(shader) = self.state.borrow_mut().shaders.get_mut(&shader_id) {
            shader.source = source.to_string();
        }
        self.record(GlCall::ShaderSource(shader_id));
        Ok(())
    }

    fn gl_compile_shader(
        &self,
        shader_id: ShaderId,
    ) -> RafxResult<()> {
        if let Some(shader) = self.state.borrow_mut().shaders.get_mut(&shader_id) {
            shader.compiled = !shader.source.contains("#error");
        }
        self.record(GlCall::CompileShader(shader_id));
        Ok(())
    }

    fn gl_get_shaderiv(
        &self,
        shader_id: ShaderId,
        pname: GLenum,
    ) -> RafxResult<i32> {
        let state = self.state.borrow();
        let shader = state
            .shaders
            .get(&shader_id)
            .ok_or(RafxError::GlError(gles_bindings::INVALID_VALUE))?;
        match pname {
            gles_bindings::COMPILE_STATUS => Ok(shader.compiled as i32),
            _ => Err(RafxError::GlError(gles_bindings::INVALID_ENUM)),
        }
    }

    fn gl_get_shader_info_log(
        &self,
        shader_id: ShaderId,
    ) -> RafxResult<Option<String>> {
        let state = self.state.borrow();
        let shader = state
            .shaders
            .get(&shader_id)
            .ok_or(RafxError::GlError(gles_bindings::INVALID_VALUE))?;
        if shader.compiled {
            Ok(None)
        } else {
            Ok(Some("ERROR: 0:1: '#error' : directive encountered".to_string()))
        }
    }

    fn gl_destroy_shader(
        &self,
        shader_id: ShaderId,
    ) -> RafxResult<()> {
        self.state.borrow_mut().shaders.remove(&shader_id);
        self.record(GlCall::DestroyShader(shader_id));
        Ok(())
    }

    fn gl_create_program(&self) -> RafxResult<ProgramId> {
        let program_id = ProgramId(self.allocate()?);
        self.state
            .borrow_mut()
            .programs
            .insert(program_id, RecordedProgram::default());
        self.record(GlCall::CreateProgram(program_id));
        Ok(program_id)
    }

    fn gl_attach_shader(
        &self,
        program_id: ProgramId,
        shader_id: ShaderId,
    ) -> RafxResult<()> {
        if let Some(program) = self.state.borrow_mut().programs.get_mut(&program_id) {
            program.shaders.push(shader_id);
        }
        self.record(GlCall::AttachShader(program_id, shader_id));
        Ok(())
    }

    fn gl_bind_attrib_location(
        &self,
        program_id: ProgramId,
        index: u32,
        name: &str,
    ) -> RafxResult<()> {
        self.record(GlCall::BindAttribLocation(
            program_id,
            index,
            name.to_string(),
        ));
        Ok(())
    }

    fn gl_link_program(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<()> {
        {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;
            let program = state
                .programs
                .get_mut(&program_id)
                .ok_or(RafxError::GlError(gles_bindings::INVALID_VALUE))?;

            let mut sources = Vec::default();
            let mut all_compiled = !program.shaders.is_empty();
            for shader_id in &program.shaders {
                match state.shaders.get(shader_id) {
                    Some(shader) => {
                        all_compiled &= shader.compiled;
                        sources.push(shader.source.as_str());
                    }
                    None => all_compiled = false,
                }
            }

            program.linked = all_compiled;
            program.completion_polls = state.config.completion_status_pending_polls;
            if all_compiled {
                program.link_log = None;
                program.uniforms = reflect_uniforms(&sources);
                program.locations.clear();
                for uniform in &program.uniforms {
                    state.next_id += 1;
                    let location = LocationId(state.next_id);
                    let base_name = uniform.name.trim_end_matches("[0]").to_string();
                    program.locations.insert(base_name, location);
                    program.locations.insert(uniform.name.clone(), location);
                }
            } else {
                program.link_log = Some("Attached shader is not compiled".to_string());
                program.uniforms.clear();
                program.locations.clear();
            }
        }
        self.record(GlCall::LinkProgram(program_id));
        Ok(())
    }

    fn gl_get_programiv(
        &self,
        program_id: ProgramId,
        pname: GLenum,
    ) -> RafxResult<i32> {
        if pname == gles_bindings::COMPLETION_STATUS_KHR {
            let mut state = self.state.borrow_mut();
            let program = state
                .programs
                .get_mut(&program_id)
                .ok_or(RafxError::GlError(gles_bindings::INVALID_VALUE))?;
            if program.completion_polls > 0 {
                program.completion_polls -= 1;
                return Ok(0);
            }
            return Ok(1);
        }

        let state = self.state.borrow();
        let program = state.program_of(program_id)?;
        match pname {
            gles_bindings::LINK_STATUS => Ok(program.linked as i32),
            gles_bindings::ACTIVE_UNIFORMS => Ok(program.uniforms.len() as i32),
            _ => Err(RafxError::GlError(gles_bindings::INVALID_ENUM)),
        }
    }

    fn gl_get_program_info_log(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<Option<String>> {
        let state = self.state.borrow();
        Ok(state.program_of(program_id)?.link_log.clone())
    }

    fn gl_destroy_program(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<()> {
        self.state.borrow_mut().programs.remove(&program_id);
        self.record(GlCall::DestroyProgram(program_id));
        Ok(())
    }

    fn gl_use_program(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<()> {
        self.record(GlCall::UseProgram(program_id));
        Ok(())
    }

    fn gl_get_active_uniform(
        &self,
        program_id: ProgramId,
        index: u32,
    ) -> RafxResult<ActiveUniformInfo> {
        let state = self.state.borrow();
        state
            .program_of(program_id)?
            .uniforms
            .get(index as usize)
            .cloned()
            .ok_or_else(|| {
                format!("Did not find uniform {} in gl_get_active_uniform", index).into()
            })
    }

    fn gl_get_uniform_location(
        &self,
        program_id: ProgramId,
        name: &str,
    ) -> RafxResult<Option<LocationId>> {
        let state = self.state.borrow();
        Ok(state.program_of(program_id)?.locations.get(name).copied())
    }

    fn gl_uniform_1iv(
        &self,
        location: &LocationId,
        data: &[i32],
    ) -> RafxResult<()> {
        self.record(GlCall::UniformIv {
            components: 1,
            location: *location,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn gl_uniform_2iv(
        &self,
        location: &LocationId,
        data: &[i32],
    ) -> RafxResult<()> {
        self.record(GlCall::UniformIv {
            components: 2,
            location: *location,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn gl_uniform_3iv(
        &self,
        location: &LocationId,
        data: &[i32],
    ) -> RafxResult<()> {
        self.record(GlCall::UniformIv {
            components: 3,
            location: *location,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn gl_uniform_4iv(
        &self,
        location: &LocationId,
        data: &[i32],
    ) -> RafxResult<()> {
        self.record(GlCall::UniformIv {
            components: 4,
            location: *location,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn gl_uniform_1fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        self.record(GlCall::UniformFv {
            components: 1,
            location: *location,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn gl_uniform_2fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        self.record(GlCall::UniformFv {
            components: 2,
            location: *location,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn gl_uniform_3fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        self.record(GlCall::UniformFv {
            components: 3,
            location: *location,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn gl_uniform_4fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        self.record(GlCall::UniformFv {
            components: 4,
            location: *location,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn gl_uniform_matrix_2fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        self.record(GlCall::UniformMatrixFv {
            dimension: 2,
            location: *location,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn gl_uniform_matrix_3fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        self.record(GlCall::UniformMatrixFv {
            dimension: 3,
            location: *location,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn gl_uniform_matrix_4fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        self.record(GlCall::UniformMatrixFv {
            dimension: 4,
            location: *location,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn gl_create_framebuffer(&self) -> RafxResult<FramebufferId> {
        let framebuffer_id = FramebufferId(self.allocate()?);
        self.state
            .borrow_mut()
            .framebuffers
            .insert(framebuffer_id);
        self.record(GlCall::CreateFramebuffer(framebuffer_id));
        Ok(framebuffer_id)
    }

    fn gl_destroy_framebuffer(
        &self,
        framebuffer_id: FramebufferId,
    ) -> RafxResult<()> {
        self.state
            .borrow_mut()
            .framebuffers
            .remove(&framebuffer_id);
        self.record(GlCall::DestroyFramebuffer(framebuffer_id));
        Ok(())
    }

    fn gl_bind_framebuffer(
        &self,
        target: GLenum,
        framebuffer_id: FramebufferId,
    ) -> RafxResult<()> {
        self.record(GlCall::BindFramebuffer(target, framebuffer_id));
        Ok(())
    }

    fn gl_framebuffer_texture_2d(
        &self,
        _target: GLenum,
        attachment: GLenum,
        texture_target: GLenum,
        texture_id: TextureId,
        mip_level: u32,
    ) -> RafxResult<()> {
        self.record(GlCall::FramebufferTexture2D {
            attachment,
            texture_target,
            texture_id,
            mip_level,
        });
        Ok(())
    }

    fn gl_create_renderbuffer(&self) -> RafxResult<RenderbufferId> {
        let renderbuffer_id = RenderbufferId(self.allocate()?);
        self.state
            .borrow_mut()
            .renderbuffers
            .insert(renderbuffer_id);
        self.record(GlCall::CreateRenderbuffer(renderbuffer_id));
        Ok(renderbuffer_id)
    }

    fn gl_destroy_renderbuffer(
        &self,
        renderbuffer_id: RenderbufferId,
    ) -> RafxResult<()> {
        self.state
            .borrow_mut()
            .renderbuffers
            .remove(&renderbuffer_id);
        self.record(GlCall::DestroyRenderbuffer(renderbuffer_id));
        Ok(())
    }

    fn gl_bind_renderbuffer(
        &self,
        _target: GLenum,
        renderbuffer_id: RenderbufferId,
    ) -> RafxResult<()> {
        self.record(GlCall::BindRenderbuffer(renderbuffer_id));
        Ok(())
    }

    fn gl_renderbuffer_storage(
        &self,
        _target: GLenum,
        internal_format: GLenum,
        width: u32,
        height: u32,
    ) -> RafxResult<()> {
        self.record(GlCall::RenderbufferStorage {
            internal_format,
            width,
            height,
        });
        Ok(())
    }

    fn gl_renderbuffer_storage_multisample(
        &self,
        _target: GLenum,
        samples: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
    ) -> RafxResult<()> {
        if !self.api_tier().is_gles3() {
            return Err(RafxError::GlError(gles_bindings::INVALID_OPERATION));
        }
        self.record(GlCall::RenderbufferStorageMultisample {
            samples,
            internal_format,
            width,
            height,
        });
        Ok(())
    }

    fn gl_framebuffer_renderbuffer(
        &self,
        _target: GLenum,
        attachment: GLenum,
        _renderbuffer_target: GLenum,
        renderbuffer_id: RenderbufferId,
    ) -> RafxResult<()> {
        self.record(GlCall::FramebufferRenderbuffer {
            attachment,
            renderbuffer_id,
        });
        Ok(())
    }

    fn gl_check_framebuffer_status(
        &self,
        _target: GLenum,
    ) -> RafxResult<u32> {
        Ok(gles_bindings::FRAMEBUFFER_COMPLETE)
    }

    fn gl_draw_buffers(
        &self,
        buffers: &[GLenum],
    ) -> RafxResult<()> {
        self.record(GlCall::DrawBuffers(buffers.to_vec()));
        Ok(())
    }

    fn gl_blit_framebuffer(
        &self,
        _src_x0: i32,
        _src_y0: i32,
        src_x1: i32,
        src_y1: i32,
        _dst_x0: i32,
        _dst_y0: i32,
        _dst_x1: i32,
        _dst_y1: i32,
        mask: u32,
        filter: GLenum,
    ) -> RafxResult<()> {
        if !self.api_tier().is_gles3() {
            return Err(RafxError::GlError(gles_bindings::INVALID_OPERATION));
        }
        self.record(GlCall::BlitFramebuffer {
            width: src_x1,
            height: src_y1,
            mask,
            filter,
        });
        Ok(())
    }

    fn gl_invalidate_framebuffer(
        &self,
        target: GLenum,
        attachments: &[GLenum],
    ) -> RafxResult<()> {
        self.record(GlCall::InvalidateFramebuffer(target, attachments.to_vec()));
        Ok(())
    }

    fn gl_draw_arrays(
        &self,
        mode: GLenum,
        first: i32,
        count: i32,
    ) -> RafxResult<()> {
        self.record(GlCall::DrawArrays { mode, first, count });
        Ok(())
    }

    fn gl_draw_elements(
        &self,
        mode: GLenum,
        count: i32,
        type_: GLenum,
        byte_offset: u32,
    ) -> RafxResult<()> {
        self.record(GlCall::DrawElements {
            mode,
            count,
            type_,
            byte_offset,
        });
        Ok(())
    }

    fn gl_draw_arrays_instanced(
        &self,
        mode: GLenum,
        first: i32,
        count: i32,
        instance_count: i32,
    ) -> RafxResult<()> {
        self.record(GlCall::DrawArraysInstanced {
            mode,
            first,
            count,
            instance_count,
        });
        Ok(())
    }

    fn gl_draw_elements_instanced(
        &self,
        mode: GLenum,
        count: i32,
        type_: GLenum,
        byte_offset: u32,
        instance_count: i32,
    ) -> RafxResult<()> {
        self.record(GlCall::DrawElementsInstanced {
            mode,
            count,
            type_,
            byte_offset,
            instance_count,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_reflection() {
        let vertex = "uniform highp mat4 matrix_model;\nuniform vec4 colors[3];\nvoid main() {}";
        let fragment = "precision mediump float;\nuniform sampler2D texture_diffuse;\nuniform vec4 colors[3];";
        let uniforms = reflect_uniforms(&[vertex, fragment]);
        assert_eq!(uniforms.len(), 3);
        assert_eq!(uniforms[0].name, "matrix_model");
        assert_eq!(uniforms[0].ty, gles_bindings::FLOAT_MAT4);
        assert_eq!(uniforms[1].name, "colors[0]");
        assert_eq!(uniforms[1].size, 3);
        assert_eq!(uniforms[2].ty, gles_bindings::SAMPLER_2D);
    }

    #[test]
    fn generate_mipmap_fills_chain() {
        let context = RecordingGlContext::new(RecordingGlConfig::gles3());
        let texture_id = context.gl_create_texture().unwrap();
        context
            .gl_bind_texture(gles_bindings::TEXTURE_2D, texture_id)
            .unwrap();
        context
            .gl_tex_image_2d(
                gles_bindings::TEXTURE_2D,
                0,
                gles_bindings::RGBA8,
                8,
                4,
                gles_bindings::RGBA,
                gles_bindings::UNSIGNED_BYTE,
                None,
            )
            .unwrap();
        context.gl_generate_mipmap(gles_bindings::TEXTURE_2D).unwrap();

        let texture = context.texture(texture_id).unwrap();
        assert_eq!(texture.levels.len(), 4);
        let last = texture.level(gles_bindings::TEXTURE_2D, 3).unwrap();
        assert_eq!((last.width, last.height), (1, 1));
        assert_eq!(last.content, RecordedLevelContent::Generated);
    }

    #[test]
    fn loss_invalidates_objects() {
        let context = RecordingGlContext::new(RecordingGlConfig::gles3());
        context.gl_create_texture().unwrap();
        context.simulate_context_loss();
        assert_eq!(context.live_texture_count(), 0);
        assert_eq!(context.gl_create_texture(), Err(RafxError::ContextLost));
        context.simulate_context_restore();
        assert!(context.gl_create_texture().is_ok());
    }
}
