use crate::backends::gles_bindings;
use crate::backends::gles_bindings::types::GLenum;
use crate::backends::{BufferId, GlContext, NONE_BUFFER, NONE_VERTEX_ARRAY};
use crate::internal::ResourceSlabKey;
use crate::{
    RafxBufferUsage, RafxIndexBufferDef, RafxIndexType, RafxResult, RafxStateCache,
    RafxVertexBufferDef, RafxVertexLayout,
};

/// Handle to a vertex buffer owned by a `RafxDeviceGl`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RafxVertexBufferHandle(pub(crate) ResourceSlabKey<RafxVertexBufferGl>);

/// Handle to an index buffer owned by a `RafxDeviceGl`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RafxIndexBufferHandle(pub(crate) ResourceSlabKey<RafxIndexBufferGl>);

// The CPU copy of the contents is kept for the lifetime of the buffer so that it can be sent
// again after the context is restored
#[derive(Debug)]
pub(crate) struct BufferStorage {
    target: GLenum,
    usage: RafxBufferUsage,
    contents: Vec<u8>,
    buffer_id: Option<BufferId>,
    gpu_size: u64,
}

impl BufferStorage {
    fn new(
        target: GLenum,
        usage: RafxBufferUsage,
        contents: Vec<u8>,
    ) -> Self {
        BufferStorage {
            target,
            usage,
            contents,
            buffer_id: None,
            gpu_size: 0,
        }
    }

    /// Sends the full contents. The buffer must be bindable on `target` without disturbing other
    /// state, which for index buffers means no vertex array may be bound.
    fn upload(
        &mut self,
        gl_context: &dyn GlContext,
        vram: &mut u64,
    ) -> RafxResult<BufferId> {
        let buffer_id = match self.buffer_id {
            Some(buffer_id) => buffer_id,
            None => {
                let buffer_id = gl_context.gl_create_buffer()?;
                self.buffer_id = Some(buffer_id);
                buffer_id
            }
        };

        gl_context.gl_bind_buffer(self.target, buffer_id)?;
        gl_context.gl_buffer_data(self.target, &self.contents, self.usage.gl_usage())?;

        *vram = vram.saturating_sub(self.gpu_size) + self.contents.len() as u64;
        self.gpu_size = self.contents.len() as u64;
        Ok(buffer_id)
    }

    fn lose_context(
        &mut self,
        vram: &mut u64,
    ) {
        self.buffer_id = None;
        *vram = vram.saturating_sub(self.gpu_size);
        self.gpu_size = 0;
    }

    fn destroy(
        &mut self,
        gl_context: &dyn GlContext,
        vram: &mut u64,
    ) -> RafxResult<()> {
        if let Some(buffer_id) = self.buffer_id.take() {
            gl_context.gl_destroy_buffer(buffer_id)?;
        }

        *vram = vram.saturating_sub(self.gpu_size);
        self.gpu_size = 0;
        Ok(())
    }
}

/// Vertex data plus the layout of its attributes
#[derive(Debug)]
pub struct RafxVertexBufferGl {
    pub(crate) def: RafxVertexBufferDef,
    pub(crate) layout_hash: u64,
    pub(crate) storage: BufferStorage,
}

impl RafxVertexBufferGl {
    pub(crate) fn new(
        def: RafxVertexBufferDef,
        contents: Vec<u8>,
    ) -> RafxResult<Self> {
        def.layout.verify()?;
        let layout_hash = def.layout.layout_hash();
        let storage = BufferStorage::new(gles_bindings::ARRAY_BUFFER, def.usage, contents);
        Ok(RafxVertexBufferGl {
            def,
            layout_hash,
            storage,
        })
    }

    pub fn vertex_buffer_def(&self) -> &RafxVertexBufferDef {
        &self.def
    }

    pub fn layout(&self) -> &RafxVertexLayout {
        &self.def.layout
    }

    pub fn layout_hash(&self) -> u64 {
        self.layout_hash
    }

    pub fn contents(&self) -> &[u8] {
        &self.storage.contents
    }

    pub fn gl_buffer_id(&self) -> Option<BufferId> {
        self.storage.buffer_id
    }

    pub fn gpu_size(&self) -> u64 {
        self.storage.gpu_size
    }

    pub fn vertex_count(&self) -> u32 {
        if self.def.layout.stride == 0 {
            0
        } else {
            self.storage.contents.len() as u32 / self.def.layout.stride
        }
    }

    pub(crate) fn set_contents(
        &mut self,
        contents: Vec<u8>,
    ) {
        self.storage.contents = contents;
    }

    pub(crate) fn upload(
        &mut self,
        gl_context: &dyn GlContext,
        vram: &mut u64,
    ) -> RafxResult<()> {
        self.storage.upload(gl_context, vram)?;
        gl_context.gl_bind_buffer(gles_bindings::ARRAY_BUFFER, NONE_BUFFER)
    }

    pub(crate) fn lose_context(
        &mut self,
        vram: &mut u64,
    ) {
        self.storage.lose_context(vram);
    }

    pub(crate) fn destroy(
        &mut self,
        gl_context: &dyn GlContext,
        vram: &mut u64,
    ) -> RafxResult<()> {
        self.storage.destroy(gl_context, vram)
    }
}

/// Index data of a single index type
#[derive(Debug)]
pub struct RafxIndexBufferGl {
    pub(crate) def: RafxIndexBufferDef,
    pub(crate) storage: BufferStorage,
}

impl RafxIndexBufferGl {
    pub(crate) fn new(
        def: RafxIndexBufferDef,
        contents: Vec<u8>,
    ) -> RafxResult<Self> {
        let bytes_per_index = def.index_type.bytes_per_index() as usize;
        if contents.len() % bytes_per_index != 0 {
            Err(format!(
                "Index data of {} bytes is not a multiple of the {:?} index size",
                contents.len(),
                def.index_type
            ))?;
        }

        let storage =
            BufferStorage::new(gles_bindings::ELEMENT_ARRAY_BUFFER, def.usage, contents);
        Ok(RafxIndexBufferGl { def, storage })
    }

    pub fn index_buffer_def(&self) -> &RafxIndexBufferDef {
        &self.def
    }

    pub fn index_type(&self) -> RafxIndexType {
        self.def.index_type
    }

    pub fn contents(&self) -> &[u8] {
        &self.storage.contents
    }

    pub fn gl_buffer_id(&self) -> Option<BufferId> {
        self.storage.buffer_id
    }

    pub fn gpu_size(&self) -> u64 {
        self.storage.gpu_size
    }

    pub fn index_count(&self) -> u32 {
        (self.storage.contents.len() / self.def.index_type.bytes_per_index() as usize) as u32
    }

    pub(crate) fn set_contents(
        &mut self,
        contents: Vec<u8>,
    ) -> RafxResult<()> {
        if contents.len() % self.def.index_type.bytes_per_index() as usize != 0 {
            Err("Index data size is not a multiple of the index size")?;
        }

        self.storage.contents = contents;
        Ok(())
    }

    /// The element array binding belongs to the bound vertex array, so the upload happens with no
    /// vertex array bound
    pub(crate) fn upload(
        &mut self,
        gl_context: &dyn GlContext,
        state: &mut RafxStateCache,
        vram: &mut u64,
    ) -> RafxResult<()> {
        state.bind_vertex_array(gl_context, NONE_VERTEX_ARRAY)?;
        let buffer_id = self.storage.upload(gl_context, vram)?;
        // Brings the cache in line with the binding made by the upload
        state.bind_index_buffer(gl_context, buffer_id)
    }

    pub(crate) fn lose_context(
        &mut self,
        vram: &mut u64,
    ) {
        self.storage.lose_context(vram);
    }

    pub(crate) fn destroy(
        &mut self,
        gl_context: &dyn GlContext,
        vram: &mut u64,
    ) -> RafxResult<()> {
        self.storage.destroy(gl_context, vram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::recording::{GlCall, RecordingGlConfig, RecordingGlContext};
    use crate::{RafxVertexComponentType, RafxVertexElement, RafxVertexSemantic};

    fn position_layout() -> RafxVertexLayout {
        RafxVertexLayout {
            elements: vec![RafxVertexElement {
                semantic: RafxVertexSemantic::Position,
                component_count: 3,
                component_type: RafxVertexComponentType::Float32,
                normalize: false,
                byte_offset: 0,
            }],
            stride: 12,
            instancing: false,
        }
    }

    #[test]
    fn vertex_upload_tracks_vram() {
        let context = RecordingGlContext::new(RecordingGlConfig::gles3());
        let mut buffer = RafxVertexBufferGl::new(
            RafxVertexBufferDef {
                layout: position_layout(),
                usage: RafxBufferUsage::Dynamic,
            },
            vec![0; 36],
        )
        .unwrap();
        assert_eq!(buffer.vertex_count(), 3);

        let mut vram = 0;
        buffer.upload(&context, &mut vram).unwrap();
        assert_eq!(vram, 36);

        let buffer_id = buffer.gl_buffer_id().unwrap();
        assert!(context.calls().contains(&GlCall::BufferData {
            target: gles_bindings::ARRAY_BUFFER,
            size: 36,
            usage: gles_bindings::DYNAMIC_DRAW,
        }));

        buffer.set_contents(vec![1; 24]);
        buffer.upload(&context, &mut vram).unwrap();
        assert_eq!(vram, 24);
        assert_eq!(buffer.gl_buffer_id(), Some(buffer_id));
        assert_eq!(context.buffer_contents(buffer_id), Some(vec![1; 24]));

        buffer.destroy(&context, &mut vram).unwrap();
        assert_eq!(vram, 0);
        assert_eq!(context.live_buffer_count(), 0);
    }

    #[test]
    fn index_data_must_match_index_size() {
        let def = RafxIndexBufferDef {
            index_type: RafxIndexType::Uint32,
            usage: RafxBufferUsage::Static,
        };
        assert!(RafxIndexBufferGl::new(def.clone(), vec![0; 6]).is_err());

        let buffer = RafxIndexBufferGl::new(def, vec![0; 8]).unwrap();
        assert_eq!(buffer.index_count(), 2);
    }

    #[test]
    fn index_upload_unbinds_vertex_array() {
        let context = RecordingGlContext::new(RecordingGlConfig::gles3());
        let mut state = RafxStateCache::new(1);
        let vertex_array = context.gl_create_vertex_array().unwrap();
        state.bind_vertex_array(&context, vertex_array).unwrap();

        let mut buffer = RafxIndexBufferGl::new(
            RafxIndexBufferDef {
                index_type: RafxIndexType::Uint16,
                usage: RafxBufferUsage::Static,
            },
            vec![0, 0, 1, 0, 2, 0],
        )
        .unwrap();
        let start = context.call_count();
        let mut vram = 0;
        buffer.upload(&context, &mut state, &mut vram).unwrap();

        let calls = context.calls_since(start);
        assert_eq!(calls[0], GlCall::BindVertexArray(NONE_VERTEX_ARRAY));
        assert_eq!(state.vertex_array(), Some(NONE_VERTEX_ARRAY));
        assert_eq!(vram, 6);
    }
}
