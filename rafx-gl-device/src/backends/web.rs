use super::gles_bindings;
use super::gles_bindings::types::GLenum;
use super::{
    ActiveUniformInfo, BufferId, FramebufferId, GlContext, LocationId, ProgramId,
    RafxGlContextProvider, RenderbufferId, ShaderId, TextureId, VertexArrayId,
};
use crate::{RafxApiTier, RafxContextAttributes, RafxError, RafxPowerPreference, RafxResult};
use fnv::FnvHashMap;
use std::cell::{Cell, RefCell};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    AngleInstancedArrays, HtmlCanvasElement, OesVertexArrayObject, WebGl2RenderingContext,
    WebGlBuffer, WebGlFramebuffer, WebGlProgram, WebGlRenderbuffer, WebGlRenderingContext,
    WebGlShader, WebGlTexture, WebGlUniformLocation, WebGlVertexArrayObject, WebglDrawBuffers,
    WebglLoseContext,
};

fn convert_js_to_i32(value: &JsValue) -> Option<i32> {
    if let Some(value) = value.as_f64() {
        Some(value as i32)
    } else if let Some(value) = value.as_bool() {
        if value {
            Some(1)
        } else {
            Some(0)
        }
    } else {
        None
    }
}

enum WebGlRawContext {
    WebGl1(WebGlRenderingContext),
    WebGl2(WebGl2RenderingContext),
}

// Both context types expose the shared GL ES 2 surface under the same method names
macro_rules! with_gl {
    ($self:ident, $gl:ident => $body:expr) => {
        match &$self.context {
            WebGlRawContext::WebGl1($gl) => $body,
            WebGlRawContext::WebGl2($gl) => $body,
        }
    };
}

/// Maps the integer ids handed to the device to browser objects
struct ObjectMap<K, V> {
    objects: RefCell<FnvHashMap<K, V>>,
}

impl<K: Copy + Eq + Hash, V: Clone> ObjectMap<K, V> {
    fn insert(
        &self,
        key: K,
        value: V,
    ) {
        self.objects.borrow_mut().insert(key, value);
    }

    fn get(
        &self,
        key: K,
    ) -> Option<V> {
        self.objects.borrow().get(&key).cloned()
    }

    fn remove(
        &self,
        key: K,
    ) -> Option<V> {
        self.objects.borrow_mut().remove(&key)
    }

    fn clear(&self) {
        self.objects.borrow_mut().clear();
    }
}

impl<K, V> Default for ObjectMap<K, V> {
    fn default() -> Self {
        ObjectMap {
            objects: RefCell::new(FnvHashMap::default()),
        }
    }
}

/// `GlContext` over a browser WebGL 1 or WebGL 2 context
pub struct WebGlContext {
    canvas: HtmlCanvasElement,
    context: WebGlRawContext,
    next_id: Cell<u32>,
    lost_handled: Cell<bool>,
    listeners: Vec<(&'static str, Closure<dyn FnMut(web_sys::Event)>)>,
    extensions: RefCell<FnvHashMap<String, js_sys::Object>>,
    textures: ObjectMap<TextureId, WebGlTexture>,
    buffers: ObjectMap<BufferId, WebGlBuffer>,
    vertex_arrays: ObjectMap<VertexArrayId, WebGlVertexArrayObject>,
    shaders: ObjectMap<ShaderId, WebGlShader>,
    programs: ObjectMap<ProgramId, WebGlProgram>,
    locations: ObjectMap<LocationId, WebGlUniformLocation>,
    program_locations: RefCell<FnvHashMap<ProgramId, Vec<LocationId>>>,
    framebuffers: ObjectMap<FramebufferId, WebGlFramebuffer>,
    renderbuffers: ObjectMap<RenderbufferId, WebGlRenderbuffer>,
}

impl WebGlContext {
    fn new(
        canvas: HtmlCanvasElement,
        context: WebGlRawContext,
    ) -> RafxResult<Self> {
        // Cancelling the lost event tells the browser the page can handle a restored context.
        // Both transitions are picked up by polling is_context_lost.
        let on_context_lost = Closure::wrap(Box::new(|event: web_sys::Event| {
            log::warn!("webglcontextlost received");
            event.prevent_default();
        }) as Box<dyn FnMut(web_sys::Event)>);
        let on_context_restored = Closure::wrap(Box::new(|_event: web_sys::Event| {
            log::info!("webglcontextrestored received");
        }) as Box<dyn FnMut(web_sys::Event)>);

        let listeners = vec![
            ("webglcontextlost", on_context_lost),
            ("webglcontextrestored", on_context_restored),
        ];
        for (event_name, listener) in &listeners {
            canvas.add_event_listener_with_callback(event_name, listener.as_ref().unchecked_ref())?;
        }

        Ok(WebGlContext {
            canvas,
            context,
            next_id: Cell::new(0),
            lost_handled: Cell::new(false),
            listeners,
            extensions: Default::default(),
            textures: Default::default(),
            buffers: Default::default(),
            vertex_arrays: Default::default(),
            shaders: Default::default(),
            programs: Default::default(),
            locations: Default::default(),
            program_locations: Default::default(),
            framebuffers: Default::default(),
            renderbuffers: Default::default(),
        })
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }

    /// Asks the browser to drop the context through `WEBGL_lose_context`
    pub fn simulate_context_loss(&self) -> RafxResult<()> {
        self.lose_context_extension()?.lose_context();
        Ok(())
    }

    pub fn simulate_context_restore(&self) -> RafxResult<()> {
        self.lose_context_extension()?.restore_context();
        Ok(())
    }

    fn lose_context_extension(&self) -> RafxResult<WebglLoseContext> {
        let extension = with_gl!(self, gl => gl.get_extension("WEBGL_lose_context"))?
            .ok_or("WEBGL_lose_context is not supported")?;
        Ok(extension.unchecked_into())
    }

    fn allocate_id(&self) -> RafxResult<u32> {
        if self.is_context_lost() {
            return Err(RafxError::ContextLost);
        }
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        Ok(id)
    }

    fn created<T>(
        &self,
        object: Option<T>,
        kind: &str,
    ) -> RafxResult<T> {
        match object {
            Some(object) => Ok(object),
            None if self.is_context_lost() => Err(RafxError::ContextLost),
            None => Err(format!("Failed to create {}", kind))?,
        }
    }

    fn webgl2(
        &self,
        operation: &str,
    ) -> RafxResult<&WebGl2RenderingContext> {
        match &self.context {
            WebGlRawContext::WebGl2(gl) => Ok(gl),
            WebGlRawContext::WebGl1(_) => Err(format!("{} requires WebGL 2", operation))?,
        }
    }

    fn extension<T: JsCast>(
        &self,
        name: &str,
    ) -> RafxResult<T> {
        self.extensions
            .borrow()
            .get(name)
            .map(|x| x.clone().unchecked_into::<T>())
            .ok_or_else(|| format!("Extension {} is not enabled", name).into())
    }

    // Browser objects are invalid once the context is lost, and ids are never reused
    fn forget_objects(&self) {
        self.extensions.borrow_mut().clear();
        self.textures.clear();
        self.buffers.clear();
        self.vertex_arrays.clear();
        self.shaders.clear();
        self.programs.clear();
        self.locations.clear();
        self.program_locations.borrow_mut().clear();
        self.framebuffers.clear();
        self.renderbuffers.clear();
    }

    fn program(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<WebGlProgram> {
        self.programs
            .get(program_id)
            .ok_or_else(|| format!("Unknown program {:?}", program_id).into())
    }

    fn shader(
        &self,
        shader_id: ShaderId,
    ) -> RafxResult<WebGlShader> {
        self.shaders
            .get(shader_id)
            .ok_or_else(|| format!("Unknown shader {:?}", shader_id).into())
    }
}

impl Drop for WebGlContext {
    fn drop(&mut self) {
        for (event_name, listener) in &self.listeners {
            let _ = self
                .canvas
                .remove_event_listener_with_callback(event_name, listener.as_ref().unchecked_ref());
        }
    }
}

impl GlContext for WebGlContext {
    fn api_tier(&self) -> RafxApiTier {
        match self.context {
            WebGlRawContext::WebGl1(_) => RafxApiTier::Gles2,
            WebGlRawContext::WebGl2(_) => RafxApiTier::Gles3,
        }
    }

    fn is_context_lost(&self) -> bool {
        let lost = with_gl!(self, gl => gl.is_context_lost());
        if lost && !self.lost_handled.get() {
            self.forget_objects();
        }
        self.lost_handled.set(lost);
        lost
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        with_gl!(self, gl => (gl.drawing_buffer_width() as u32, gl.drawing_buffer_height() as u32))
    }

    fn set_drawing_buffer_size(
        &self,
        width: u32,
        height: u32,
    ) {
        self.canvas.set_width(width);
        self.canvas.set_height(height);
    }

    fn user_agent(&self) -> Option<String> {
        web_sys::window().and_then(|x| x.navigator().user_agent().ok())
    }

    fn supported_extensions(&self) -> Vec<String> {
        with_gl!(self, gl => gl.get_supported_extensions())
            .map(|x| x.iter().filter_map(|x| x.as_string()).collect())
            .unwrap_or_default()
    }

    fn enable_extension(
        &self,
        name: &str,
    ) -> bool {
        match with_gl!(self, gl => gl.get_extension(name)) {
            Ok(Some(extension)) => {
                self.extensions
                    .borrow_mut()
                    .insert(name.to_string(), extension);
                true
            }
            _ => false,
        }
    }

    fn check_for_error(&self) -> RafxResult<()> {
        let result = with_gl!(self, gl => gl.get_error());
        match result {
            gles_bindings::NO_ERROR => Ok(()),
            // Calls are ignored while lost, the device notices through is_context_lost
            gles_bindings::CONTEXT_LOST_WEBGL => Ok(()),
            _ => Err(RafxError::GlError(result)),
        }
    }

    fn gl_get_integerv(
        &self,
        pname: GLenum,
    ) -> RafxResult<i32> {
        let value = with_gl!(self, gl => gl.get_parameter(pname))?;
        self.check_for_error()?;
        Ok(convert_js_to_i32(&value).ok_or_else(|| {
            format!(
                "Parameter {} is a {:?} which is neither a number or boolean",
                pname, value
            )
        })?)
    }

    fn gl_get_floatv(
        &self,
        pname: GLenum,
    ) -> RafxResult<f32> {
        let value = with_gl!(self, gl => gl.get_parameter(pname))?;
        self.check_for_error()?;
        Ok(value
            .as_f64()
            .ok_or_else(|| format!("Parameter {} is a {:?}, not a number", pname, value))?
            as f32)
    }

    fn gl_get_string(
        &self,
        pname: GLenum,
    ) -> RafxResult<Option<String>> {
        let value = with_gl!(self, gl => gl.get_parameter(pname))?;
        self.check_for_error()?;
        Ok(value.as_string())
    }

    fn start_image_bitmap_probe(
        &self,
        result: Arc<AtomicBool>,
    ) {
        let window = match web_sys::window() {
            Some(window) => window,
            None => return,
        };

        let pixels = [0u8; 4];
        let image_data =
            match web_sys::ImageData::new_with_u8_clamped_array(wasm_bindgen::Clamped(&pixels[..]), 1) {
                Ok(image_data) => image_data,
                Err(_) => return,
            };
        let promise = match window.create_image_bitmap_with_image_data(&image_data) {
            Ok(promise) => promise,
            Err(_) => return,
        };

        wasm_bindgen_futures::spawn_local(async move {
            let supported = wasm_bindgen_futures::JsFuture::from(promise).await.is_ok();
            log::debug!("Image bitmap support: {}", supported);
            result.store(supported, Ordering::Relaxed);
        });
    }

    fn gl_enable(
        &self,
        cap: GLenum,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.enable(cap));
        self.check_for_error()
    }

    fn gl_disable(
        &self,
        cap: GLenum,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.disable(cap));
        self.check_for_error()
    }

    fn gl_blend_func_separate(
        &self,
        src_rgb: GLenum,
        dst_rgb: GLenum,
        src_alpha: GLenum,
        dst_alpha: GLenum,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha));
        self.check_for_error()
    }

    fn gl_blend_equation_separate(
        &self,
        mode_rgb: GLenum,
        mode_alpha: GLenum,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.blend_equation_separate(mode_rgb, mode_alpha));
        self.check_for_error()
    }

    fn gl_blend_color(
        &self,
        r: f32,
        g: f32,
        b: f32,
        a: f32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.blend_color(r, g, b, a));
        self.check_for_error()
    }

    fn gl_color_mask(
        &self,
        r: bool,
        g: bool,
        b: bool,
        a: bool,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.color_mask(r, g, b, a));
        self.check_for_error()
    }

    fn gl_depth_mask(
        &self,
        flag: bool,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.depth_mask(flag));
        self.check_for_error()
    }

    fn gl_depth_func(
        &self,
        func: GLenum,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.depth_func(func));
        self.check_for_error()
    }

    fn gl_polygon_offset(
        &self,
        factor: f32,
        units: f32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.polygon_offset(factor, units));
        self.check_for_error()
    }

    fn gl_cull_face(
        &self,
        mode: GLenum,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.cull_face(mode));
        self.check_for_error()
    }

    fn gl_stencil_func_separate(
        &self,
        face: GLenum,
        func: GLenum,
        reference: i32,
        mask: u32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.stencil_func_separate(face, func, reference, mask));
        self.check_for_error()
    }

    fn gl_stencil_op_separate(
        &self,
        face: GLenum,
        fail: GLenum,
        zfail: GLenum,
        zpass: GLenum,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.stencil_op_separate(face, fail, zfail, zpass));
        self.check_for_error()
    }

    fn gl_stencil_mask_separate(
        &self,
        face: GLenum,
        mask: u32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.stencil_mask_separate(face, mask));
        self.check_for_error()
    }

    fn gl_viewport(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.viewport(x, y, width, height));
        self.check_for_error()
    }

    fn gl_scissor(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.scissor(x, y, width, height));
        self.check_for_error()
    }

    fn gl_clear_color(
        &self,
        r: f32,
        g: f32,
        b: f32,
        a: f32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.clear_color(r, g, b, a));
        self.check_for_error()
    }

    fn gl_clear_depthf(
        &self,
        d: f32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.clear_depth(d));
        self.check_for_error()
    }

    fn gl_clear_stencil(
        &self,
        s: i32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.clear_stencil(s));
        self.check_for_error()
    }

    fn gl_clear(
        &self,
        mask: u32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.clear(mask));
        self.check_for_error()
    }

    fn gl_hint(
        &self,
        target: GLenum,
        mode: GLenum,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.hint(target, mode));
        self.check_for_error()
    }

    fn gl_pixel_storei(
        &self,
        pname: GLenum,
        param: i32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.pixel_storei(pname, param));
        self.check_for_error()
    }

    fn gl_flush(&self) -> RafxResult<()> {
        with_gl!(self, gl => gl.flush());
        self.check_for_error()
    }

    //
    // Textures
    //
    fn gl_create_texture(&self) -> RafxResult<TextureId> {
        let texture = self.created(with_gl!(self, gl => gl.create_texture()), "texture")?;
        let texture_id = TextureId(self.allocate_id()?);
        self.textures.insert(texture_id, texture);
        Ok(texture_id)
    }

    fn gl_destroy_texture(
        &self,
        texture_id: TextureId,
    ) -> RafxResult<()> {
        if let Some(texture) = self.textures.remove(texture_id) {
            with_gl!(self, gl => gl.delete_texture(Some(&texture)));
        }
        self.check_for_error()
    }

    fn gl_active_texture(
        &self,
        unit: u32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.active_texture(gles_bindings::TEXTURE0 + unit));
        self.check_for_error()
    }

    fn gl_bind_texture(
        &self,
        target: GLenum,
        texture_id: TextureId,
    ) -> RafxResult<()> {
        let texture = self.textures.get(texture_id);
        with_gl!(self, gl => gl.bind_texture(target, texture.as_ref()));
        self.check_for_error()
    }

    fn gl_tex_parameteri(
        &self,
        target: GLenum,
        pname: GLenum,
        param: i32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.tex_parameteri(target, pname, param));
        self.check_for_error()
    }

    fn gl_tex_parameterf(
        &self,
        target: GLenum,
        pname: GLenum,
        param: f32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.tex_parameterf(target, pname, param));
        self.check_for_error()
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
        with_gl!(self, gl => gl
            .tex_image_2d_with_i32_and_i32_and_i32_and_format_and_type_and_opt_u8_array(
                target,
                mip_level as _,
                internal_format as _,
                width as _,
                height as _,
                0,
                format,
                type_,
                pixels,
            ))?;
        self.check_for_error()
    }

    fn gl_tex_sub_image_2d(
        &self,
        target: GLenum,
        mip_level: u32,
        width: u32,
        height: u32,
        format: GLenum,
        type_: GLenum,
        pixels: &[u8],
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl
            .tex_sub_image_2d_with_i32_and_i32_and_u32_and_type_and_opt_u8_array(
                target,
                mip_level as _,
                0,
                0,
                width as _,
                height as _,
                format,
                type_,
                Some(pixels),
            ))?;
        self.check_for_error()
    }

    fn gl_tex_image_2d_with_image(
        &self,
        target: GLenum,
        mip_level: u32,
        internal_format: GLenum,
        format: GLenum,
        type_: GLenum,
        image: &image::RgbaImage,
    ) -> RafxResult<()> {
        self.gl_tex_image_2d(
            target,
            mip_level,
            internal_format,
            image.width(),
            image.height(),
            format,
            type_,
            Some(image.as_raw()),
        )
    }

    fn gl_tex_sub_image_2d_with_image(
        &self,
        target: GLenum,
        mip_level: u32,
        format: GLenum,
        type_: GLenum,
        image: &image::RgbaImage,
    ) -> RafxResult<()> {
        self.gl_tex_sub_image_2d(
            target,
            mip_level,
            image.width(),
            image.height(),
            format,
            type_,
            image.as_raw(),
        )
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
        with_gl!(self, gl => gl.compressed_tex_image_2d_with_u8_array(
            target,
            mip_level as _,
            internal_format,
            width as _,
            height as _,
            0,
            data,
        ));
        self.check_for_error()
    }

    fn gl_compressed_tex_sub_image_2d(
        &self,
        target: GLenum,
        mip_level: u32,
        width: u32,
        height: u32,
        format: GLenum,
        data: &[u8],
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.compressed_tex_sub_image_2d_with_u8_array(
            target,
            mip_level as _,
            0,
            0,
            width as _,
            height as _,
            format,
            data,
        ));
        self.check_for_error()
    }

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
    ) -> RafxResult<()> {
        self.webgl2("texImage3D")?.tex_image_3d_with_opt_u8_array(
            target,
            mip_level as _,
            internal_format as _,
            width as _,
            height as _,
            depth as _,
            0,
            format,
            type_,
            pixels,
        )?;
        self.check_for_error()
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
        self.webgl2("compressedTexImage3D")?
            .compressed_tex_image_3d_with_u8_array(
                target,
                mip_level as _,
                internal_format,
                width as _,
                height as _,
                depth as _,
                0,
                data,
            );
        self.check_for_error()
    }

    fn gl_generate_mipmap(
        &self,
        target: GLenum,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.generate_mipmap(target));
        self.check_for_error()
    }

    //
    // Buffers and vertex arrays
    //
    fn gl_create_buffer(&self) -> RafxResult<BufferId> {
        let buffer = self.created(with_gl!(self, gl => gl.create_buffer()), "buffer")?;
        let buffer_id = BufferId(self.allocate_id()?);
        self.buffers.insert(buffer_id, buffer);
        Ok(buffer_id)
    }

    fn gl_destroy_buffer(
        &self,
        buffer_id: BufferId,
    ) -> RafxResult<()> {
        if let Some(buffer) = self.buffers.remove(buffer_id) {
            with_gl!(self, gl => gl.delete_buffer(Some(&buffer)));
        }
        self.check_for_error()
    }

    fn gl_bind_buffer(
        &self,
        target: GLenum,
        buffer_id: BufferId,
    ) -> RafxResult<()> {
        let buffer = self.buffers.get(buffer_id);
        with_gl!(self, gl => gl.bind_buffer(target, buffer.as_ref()));
        self.check_for_error()
    }

    fn gl_buffer_data(
        &self,
        target: GLenum,
        data: &[u8],
        usage: GLenum,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.buffer_data_with_u8_array(target, data, usage));
        self.check_for_error()
    }

    fn gl_buffer_sub_data(
        &self,
        target: GLenum,
        offset: u32,
        data: &[u8],
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.buffer_sub_data_with_i32_and_u8_array(target, offset as _, data));
        self.check_for_error()
    }

    fn gl_create_vertex_array(&self) -> RafxResult<VertexArrayId> {
        let vertex_array = match &self.context {
            WebGlRawContext::WebGl2(gl) => gl.create_vertex_array(),
            WebGlRawContext::WebGl1(_) => self
                .extension::<OesVertexArrayObject>("OES_vertex_array_object")?
                .create_vertex_array_oes(),
        };
        let vertex_array = self.created(vertex_array, "vertex array")?;
        let vertex_array_id = VertexArrayId(self.allocate_id()?);
        self.vertex_arrays.insert(vertex_array_id, vertex_array);
        Ok(vertex_array_id)
    }

    fn gl_destroy_vertex_array(
        &self,
        vertex_array_id: VertexArrayId,
    ) -> RafxResult<()> {
        if let Some(vertex_array) = self.vertex_arrays.remove(vertex_array_id) {
            match &self.context {
                WebGlRawContext::WebGl2(gl) => gl.delete_vertex_array(Some(&vertex_array)),
                WebGlRawContext::WebGl1(_) => self
                    .extension::<OesVertexArrayObject>("OES_vertex_array_object")?
                    .delete_vertex_array_oes(Some(&vertex_array)),
            }
        }
        self.check_for_error()
    }

    fn gl_bind_vertex_array(
        &self,
        vertex_array_id: VertexArrayId,
    ) -> RafxResult<()> {
        let vertex_array = self.vertex_arrays.get(vertex_array_id);
        match &self.context {
            WebGlRawContext::WebGl2(gl) => gl.bind_vertex_array(vertex_array.as_ref()),
            WebGlRawContext::WebGl1(_) => self
                .extension::<OesVertexArrayObject>("OES_vertex_array_object")?
                .bind_vertex_array_oes(vertex_array.as_ref()),
        }
        self.check_for_error()
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
        with_gl!(self, gl => gl.vertex_attrib_pointer_with_i32(
            index,
            size,
            type_,
            normalized,
            stride as _,
            byte_offset as _,
        ));
        self.check_for_error()
    }

    fn gl_enable_vertex_attrib_array(
        &self,
        index: u32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.enable_vertex_attrib_array(index));
        self.check_for_error()
    }

    fn gl_disable_vertex_attrib_array(
        &self,
        index: u32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.disable_vertex_attrib_array(index));
        self.check_for_error()
    }

    fn gl_vertex_attrib_divisor(
        &self,
        index: u32,
        divisor: u32,
    ) -> RafxResult<()> {
        match &self.context {
            WebGlRawContext::WebGl2(gl) => gl.vertex_attrib_divisor(index, divisor),
            WebGlRawContext::WebGl1(_) => self
                .extension::<AngleInstancedArrays>("ANGLE_instanced_arrays")?
                .vertex_attrib_divisor_angle(index, divisor),
        }
        self.check_for_error()
    }

    //
    // Shaders and programs
    //
    fn gl_create_shader(
        &self,
        shader_type: GLenum,
    ) -> RafxResult<ShaderId> {
        let shader = self.created(with_gl!(self, gl => gl.create_shader(shader_type)), "shader")?;
        let shader_id = ShaderId(self.allocate_id()?);
        self.shaders.insert(shader_id, shader);
        Ok(shader_id)
    }

    fn gl_shader_source(
        &self,
        shader_id: ShaderId,
        source: &str,
    ) -> RafxResult<()> {
        let shader = self.shader(shader_id)?;
        with_gl!(self, gl => gl.shader_source(&shader, source));
        self.check_for_error()
    }

    fn gl_compile_shader(
        &self,
        shader_id: ShaderId,
    ) -> RafxResult<()> {
        let shader = self.shader(shader_id)?;
        with_gl!(self, gl => gl.compile_shader(&shader));
        self.check_for_error()
    }

    fn gl_get_shaderiv(
        &self,
        shader_id: ShaderId,
        pname: GLenum,
    ) -> RafxResult<i32> {
        let shader = self.shader(shader_id)?;
        let value = with_gl!(self, gl => gl.get_shader_parameter(&shader, pname));
        self.check_for_error()?;
        Ok(convert_js_to_i32(&value).ok_or_else(|| {
            format!(
                "Shader parameter {} is a {:?} which is neither a number or boolean",
                pname, value
            )
        })?)
    }

    fn gl_get_shader_info_log(
        &self,
        shader_id: ShaderId,
    ) -> RafxResult<Option<String>> {
        let shader = self.shader(shader_id)?;
        let log = with_gl!(self, gl => gl.get_shader_info_log(&shader));
        self.check_for_error()?;
        Ok(log.filter(|x| !x.is_empty()))
    }

    fn gl_destroy_shader(
        &self,
        shader_id: ShaderId,
    ) -> RafxResult<()> {
        if let Some(shader) = self.shaders.remove(shader_id) {
            with_gl!(self, gl => gl.delete_shader(Some(&shader)));
        }
        self.check_for_error()
    }

    fn gl_create_program(&self) -> RafxResult<ProgramId> {
        let program = self.created(with_gl!(self, gl => gl.create_program()), "program")?;
        let program_id = ProgramId(self.allocate_id()?);
        self.programs.insert(program_id, program);
        Ok(program_id)
    }

    fn gl_attach_shader(
        &self,
        program_id: ProgramId,
        shader_id: ShaderId,
    ) -> RafxResult<()> {
        let program = self.program(program_id)?;
        let shader = self.shader(shader_id)?;
        with_gl!(self, gl => gl.attach_shader(&program, &shader));
        self.check_for_error()
    }

    fn gl_bind_attrib_location(
        &self,
        program_id: ProgramId,
        index: u32,
        name: &str,
    ) -> RafxResult<()> {
        let program = self.program(program_id)?;
        with_gl!(self, gl => gl.bind_attrib_location(&program, index, name));
        self.check_for_error()
    }

    fn gl_link_program(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<()> {
        let program = self.program(program_id)?;
        with_gl!(self, gl => gl.link_program(&program));
        self.check_for_error()
    }

    fn gl_get_programiv(
        &self,
        program_id: ProgramId,
        pname: GLenum,
    ) -> RafxResult<i32> {
        let program = self.program(program_id)?;
        let value = with_gl!(self, gl => gl.get_program_parameter(&program, pname));
        self.check_for_error()?;
        Ok(convert_js_to_i32(&value).ok_or_else(|| {
            format!(
                "Program parameter {} is a {:?} which is neither a number or boolean",
                pname, value
            )
        })?)
    }

    fn gl_get_program_info_log(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<Option<String>> {
        let program = self.program(program_id)?;
        let log = with_gl!(self, gl => gl.get_program_info_log(&program));
        self.check_for_error()?;
        Ok(log.filter(|x| !x.is_empty()))
    }

    fn gl_destroy_program(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<()> {
        if let Some(locations) = self.program_locations.borrow_mut().remove(&program_id) {
            for location in locations {
                self.locations.remove(location);
            }
        }

        if let Some(program) = self.programs.remove(program_id) {
            with_gl!(self, gl => gl.delete_program(Some(&program)));
        }
        self.check_for_error()
    }

    fn gl_use_program(
        &self,
        program_id: ProgramId,
    ) -> RafxResult<()> {
        let program = self.programs.get(program_id);
        with_gl!(self, gl => gl.use_program(program.as_ref()));
        self.check_for_error()
    }

    fn gl_get_active_uniform(
        &self,
        program_id: ProgramId,
        index: u32,
    ) -> RafxResult<ActiveUniformInfo> {
        let program = self.program(program_id)?;
        let info = with_gl!(self, gl => gl.get_active_uniform(&program, index))
            .ok_or_else(|| format!("Did not find uniform {} in gl_get_active_uniform", index))?;

        Ok(ActiveUniformInfo {
            name: info.name(),
            size: info.size() as u32,
            ty: info.type_(),
        })
    }

    fn gl_get_uniform_location(
        &self,
        program_id: ProgramId,
        name: &str,
    ) -> RafxResult<Option<LocationId>> {
        let program = self.program(program_id)?;
        let location = match with_gl!(self, gl => gl.get_uniform_location(&program, name)) {
            Some(location) => location,
            None => return Ok(None),
        };

        let location_id = LocationId(self.allocate_id()?);
        self.locations.insert(location_id, location);
        self.program_locations
            .borrow_mut()
            .entry(program_id)
            .or_default()
            .push(location_id);
        Ok(Some(location_id))
    }

    //
    // Uniforms
    //
    fn gl_uniform_1iv(
        &self,
        location: &LocationId,
        data: &[i32],
    ) -> RafxResult<()> {
        let location = self.locations.get(*location);
        with_gl!(self, gl => gl.uniform1iv_with_i32_array(location.as_ref(), data));
        self.check_for_error()
    }

    fn gl_uniform_2iv(
        &self,
        location: &LocationId,
        data: &[i32],
    ) -> RafxResult<()> {
        let location = self.locations.get(*location);
        with_gl!(self, gl => gl.uniform2iv_with_i32_array(location.as_ref(), data));
        self.check_for_error()
    }

    fn gl_uniform_3iv(
        &self,
        location: &LocationId,
        data: &[i32],
    ) -> RafxResult<()> {
        let location = self.locations.get(*location);
        with_gl!(self, gl => gl.uniform3iv_with_i32_array(location.as_ref(), data));
        self.check_for_error()
    }

    fn gl_uniform_4iv(
        &self,
        location: &LocationId,
        data: &[i32],
    ) -> RafxResult<()> {
        let location = self.locations.get(*location);
        with_gl!(self, gl => gl.uniform4iv_with_i32_array(location.as_ref(), data));
        self.check_for_error()
    }

    fn gl_uniform_1fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        let location = self.locations.get(*location);
        with_gl!(self, gl => gl.uniform1fv_with_f32_array(location.as_ref(), data));
        self.check_for_error()
    }

    fn gl_uniform_2fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        let location = self.locations.get(*location);
        with_gl!(self, gl => gl.uniform2fv_with_f32_array(location.as_ref(), data));
        self.check_for_error()
    }

    fn gl_uniform_3fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        let location = self.locations.get(*location);
        with_gl!(self, gl => gl.uniform3fv_with_f32_array(location.as_ref(), data));
        self.check_for_error()
    }

    fn gl_uniform_4fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        let location = self.locations.get(*location);
        with_gl!(self, gl => gl.uniform4fv_with_f32_array(location.as_ref(), data));
        self.check_for_error()
    }

    fn gl_uniform_matrix_2fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        let location = self.locations.get(*location);
        with_gl!(self, gl => gl.uniform_matrix2fv_with_f32_array(location.as_ref(), false, data));
        self.check_for_error()
    }

    fn gl_uniform_matrix_3fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        let location = self.locations.get(*location);
        with_gl!(self, gl => gl.uniform_matrix3fv_with_f32_array(location.as_ref(), false, data));
        self.check_for_error()
    }

    fn gl_uniform_matrix_4fv(
        &self,
        location: &LocationId,
        data: &[f32],
    ) -> RafxResult<()> {
        let location = self.locations.get(*location);
        with_gl!(self, gl => gl.uniform_matrix4fv_with_f32_array(location.as_ref(), false, data));
        self.check_for_error()
    }

    //
    // Framebuffers
    //
    fn gl_create_framebuffer(&self) -> RafxResult<FramebufferId> {
        let framebuffer =
            self.created(with_gl!(self, gl => gl.create_framebuffer()), "framebuffer")?;
        let framebuffer_id = FramebufferId(self.allocate_id()?);
        self.framebuffers.insert(framebuffer_id, framebuffer);
        Ok(framebuffer_id)
    }

    fn gl_destroy_framebuffer(
        &self,
        framebuffer_id: FramebufferId,
    ) -> RafxResult<()> {
        if let Some(framebuffer) = self.framebuffers.remove(framebuffer_id) {
            with_gl!(self, gl => gl.delete_framebuffer(Some(&framebuffer)));
        }
        self.check_for_error()
    }

    fn gl_bind_framebuffer(
        &self,
        target: GLenum,
        framebuffer_id: FramebufferId,
    ) -> RafxResult<()> {
        let framebuffer = self.framebuffers.get(framebuffer_id);
        with_gl!(self, gl => gl.bind_framebuffer(target, framebuffer.as_ref()));
        self.check_for_error()
    }

    fn gl_framebuffer_texture_2d(
        &self,
        target: GLenum,
        attachment: GLenum,
        texture_target: GLenum,
        texture_id: TextureId,
        mip_level: u32,
    ) -> RafxResult<()> {
        let texture = self.textures.get(texture_id);
        with_gl!(self, gl => gl.framebuffer_texture_2d(
            target,
            attachment,
            texture_target,
            texture.as_ref(),
            mip_level as _,
        ));
        self.check_for_error()
    }

    fn gl_create_renderbuffer(&self) -> RafxResult<RenderbufferId> {
        let renderbuffer =
            self.created(with_gl!(self, gl => gl.create_renderbuffer()), "renderbuffer")?;
        let renderbuffer_id = RenderbufferId(self.allocate_id()?);
        self.renderbuffers.insert(renderbuffer_id, renderbuffer);
        Ok(renderbuffer_id)
    }

    fn gl_destroy_renderbuffer(
        &self,
        renderbuffer_id: RenderbufferId,
    ) -> RafxResult<()> {
        if let Some(renderbuffer) = self.renderbuffers.remove(renderbuffer_id) {
            with_gl!(self, gl => gl.delete_renderbuffer(Some(&renderbuffer)));
        }
        self.check_for_error()
    }

    fn gl_bind_renderbuffer(
        &self,
        target: GLenum,
        renderbuffer_id: RenderbufferId,
    ) -> RafxResult<()> {
        let renderbuffer = self.renderbuffers.get(renderbuffer_id);
        with_gl!(self, gl => gl.bind_renderbuffer(target, renderbuffer.as_ref()));
        self.check_for_error()
    }

    fn gl_renderbuffer_storage(
        &self,
        target: GLenum,
        internal_format: GLenum,
        width: u32,
        height: u32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.renderbuffer_storage(
            target,
            internal_format,
            width as _,
            height as _,
        ));
        self.check_for_error()
    }

    fn gl_renderbuffer_storage_multisample(
        &self,
        target: GLenum,
        samples: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
    ) -> RafxResult<()> {
        self.webgl2("renderbufferStorageMultisample")?
            .renderbuffer_storage_multisample(
                target,
                samples as _,
                internal_format,
                width as _,
                height as _,
            );
        self.check_for_error()
    }

    fn gl_framebuffer_renderbuffer(
        &self,
        target: GLenum,
        attachment: GLenum,
        renderbuffer_target: GLenum,
        renderbuffer_id: RenderbufferId,
    ) -> RafxResult<()> {
        let renderbuffer = self.renderbuffers.get(renderbuffer_id);
        with_gl!(self, gl => gl.framebuffer_renderbuffer(
            target,
            attachment,
            renderbuffer_target,
            renderbuffer.as_ref(),
        ));
        self.check_for_error()
    }

    fn gl_check_framebuffer_status(
        &self,
        target: GLenum,
    ) -> RafxResult<u32> {
        let status = with_gl!(self, gl => gl.check_framebuffer_status(target));
        self.check_for_error()?;
        Ok(status)
    }

    fn gl_draw_buffers(
        &self,
        buffers: &[GLenum],
    ) -> RafxResult<()> {
        let buffers: js_sys::Array = buffers.iter().map(|x| JsValue::from(*x)).collect();
        match &self.context {
            WebGlRawContext::WebGl2(gl) => gl.draw_buffers(&buffers),
            WebGlRawContext::WebGl1(_) => self
                .extension::<WebglDrawBuffers>("WEBGL_draw_buffers")?
                .draw_buffers_webgl(&buffers),
        }
        self.check_for_error()
    }

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
    ) -> RafxResult<()> {
        self.webgl2("blitFramebuffer")?.blit_framebuffer(
            src_x0, src_y0, src_x1, src_y1, dst_x0, dst_y0, dst_x1, dst_y1, mask, filter,
        );
        self.check_for_error()
    }

    fn gl_invalidate_framebuffer(
        &self,
        target: GLenum,
        attachments: &[GLenum],
    ) -> RafxResult<()> {
        let attachments: js_sys::Array = attachments.iter().map(|x| JsValue::from(*x)).collect();
        self.webgl2("invalidateFramebuffer")?
            .invalidate_framebuffer(target, &attachments)?;
        self.check_for_error()
    }

    //
    // Draws
    //
    fn gl_draw_arrays(
        &self,
        mode: GLenum,
        first: i32,
        count: i32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.draw_arrays(mode, first, count));
        self.check_for_error()
    }

    fn gl_draw_elements(
        &self,
        mode: GLenum,
        count: i32,
        type_: GLenum,
        byte_offset: u32,
    ) -> RafxResult<()> {
        with_gl!(self, gl => gl.draw_elements_with_i32(mode, count, type_, byte_offset as _));
        self.check_for_error()
    }

    fn gl_draw_arrays_instanced(
        &self,
        mode: GLenum,
        first: i32,
        count: i32,
        instance_count: i32,
    ) -> RafxResult<()> {
        match &self.context {
            WebGlRawContext::WebGl2(gl) => {
                gl.draw_arrays_instanced(mode, first, count, instance_count)
            }
            WebGlRawContext::WebGl1(_) => self
                .extension::<AngleInstancedArrays>("ANGLE_instanced_arrays")?
                .draw_arrays_instanced_angle(mode, first, count, instance_count),
        }
        self.check_for_error()
    }

    fn gl_draw_elements_instanced(
        &self,
        mode: GLenum,
        count: i32,
        type_: GLenum,
        byte_offset: u32,
        instance_count: i32,
    ) -> RafxResult<()> {
        match &self.context {
            WebGlRawContext::WebGl2(gl) => gl.draw_elements_instanced_with_i32(
                mode,
                count,
                type_,
                byte_offset as _,
                instance_count,
            ),
            WebGlRawContext::WebGl1(_) => self
                .extension::<AngleInstancedArrays>("ANGLE_instanced_arrays")?
                .draw_elements_instanced_angle_with_i32(
                    mode,
                    count,
                    type_,
                    byte_offset as _,
                    instance_count,
                ),
        }
        self.check_for_error()
    }
}

/// Creates WebGL contexts on a canvas element. A canvas can only ever hold one kind of context,
/// so the first successful `create_context` decides the tier for its lifetime.
pub struct WebGlContextProvider {
    canvas: HtmlCanvasElement,
}

impl WebGlContextProvider {
    pub fn new(canvas: HtmlCanvasElement) -> Self {
        WebGlContextProvider { canvas }
    }

    pub fn from_canvas_id(id: &str) -> RafxResult<Self> {
        let canvas = web_sys::window()
            .and_then(|x| x.document())
            .ok_or("No document is available")?
            .get_element_by_id(id)
            .ok_or_else(|| format!("No element with id {}", id))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| format!("Element {} is not a canvas", id))?;
        Ok(Self::new(canvas))
    }

    fn context_options(attributes: &RafxContextAttributes) -> RafxResult<js_sys::Object> {
        let power_preference = match attributes.power_preference {
            RafxPowerPreference::Default => "default",
            RafxPowerPreference::LowPower => "low-power",
            RafxPowerPreference::HighPerformance => "high-performance",
        };

        let options = js_sys::Object::new();
        let set = |key: &str, value: JsValue| js_sys::Reflect::set(&options, &key.into(), &value);
        set("alpha", attributes.alpha.into())?;
        set("depth", attributes.depth.into())?;
        set("stencil", attributes.stencil.into())?;
        set("antialias", attributes.antialias.into())?;
        set("premultipliedAlpha", attributes.premultiplied_alpha.into())?;
        set(
            "preserveDrawingBuffer",
            attributes.preserve_drawing_buffer.into(),
        )?;
        set("powerPreference", power_preference.into())?;
        set(
            "failIfMajorPerformanceCaveat",
            attributes.fail_if_major_performance_caveat.into(),
        )?;
        set("desynchronized", attributes.desynchronized.into())?;
        Ok(options)
    }

    fn get_context(
        &self,
        name: &str,
        options: &js_sys::Object,
    ) -> Option<js_sys::Object> {
        match self.canvas.get_context_with_context_options(name, options) {
            Ok(context) => context,
            Err(e) => {
                log::debug!("getContext({}) failed: {:?}", name, e);
                None
            }
        }
    }
}

impl RafxGlContextProvider for WebGlContextProvider {
    fn user_agent(&self) -> Option<String> {
        web_sys::window().and_then(|x| x.navigator().user_agent().ok())
    }

    fn create_context(
        &self,
        tier: RafxApiTier,
        attributes: &RafxContextAttributes,
    ) -> RafxResult<Option<Box<dyn GlContext>>> {
        let options = Self::context_options(attributes)?;
        let context = match tier {
            RafxApiTier::Gles3 => self
                .get_context("webgl2", &options)
                .and_then(|x| x.dyn_into::<WebGl2RenderingContext>().ok())
                .map(WebGlRawContext::WebGl2),
            RafxApiTier::Gles2 => self
                .get_context("webgl", &options)
                .or_else(|| self.get_context("experimental-webgl", &options))
                .and_then(|x| x.dyn_into::<WebGlRenderingContext>().ok())
                .map(WebGlRawContext::WebGl1),
        };

        match context {
            Some(context) => Ok(Some(Box::new(WebGlContext::new(
                self.canvas.clone(),
                context,
            )?))),
            None => Ok(None),
        }
    }
}
