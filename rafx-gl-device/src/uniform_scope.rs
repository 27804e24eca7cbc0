use crate::RafxTextureHandle;
use fnv::FnvHashMap;
use std::sync::atomic::{AtomicU64, Ordering};

// Version 0 is reserved for "never set" so that a fresh slot always commits
static NEXT_UNIFORM_VERSION: AtomicU64 = AtomicU64::new(1);

/// Returns a version stamp greater than every stamp handed out before it
pub fn next_uniform_version() -> u64 {
    NEXT_UNIFORM_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// A value that can be assigned to a uniform or sampler slot
#[derive(Clone, Debug, PartialEq)]
pub enum RafxUniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Int(i32),
    IVec2([i32; 2]),
    IVec3([i32; 3]),
    IVec4([i32; 4]),
    Bool(bool),
    BVec2([bool; 2]),
    BVec3([bool; 3]),
    BVec4([bool; 4]),
    /// Column major
    Mat2([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
    /// Tightly packed elements of a float, vector or matrix array uniform
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
    Texture(RafxTextureHandle),
    TextureArray(Vec<RafxTextureHandle>),
}

impl RafxUniformValue {
    pub fn is_texture(&self) -> bool {
        match self {
            RafxUniformValue::Texture(_) | RafxUniformValue::TextureArray(_) => true,
            _ => false,
        }
    }
}

/// Identifies a named entry of a `RafxUniformScope`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RafxScopeId(u32);

impl RafxScopeId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug)]
struct RafxScopeEntry {
    name: String,
    value: Option<RafxUniformValue>,
    version: u64,
}

/// Named uniform values shared by every shader. Shaders resolve their slot names against the
/// scope once, at link time, and read values by id when drawing.
#[derive(Debug, Default)]
pub struct RafxUniformScope {
    ids: FnvHashMap<String, RafxScopeId>,
    entries: Vec<RafxScopeEntry>,
}

impl RafxUniformScope {
    /// Returns the id for `name`, creating an unset entry if it does not exist yet
    pub fn resolve(
        &mut self,
        name: &str,
    ) -> RafxScopeId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }

        let id = RafxScopeId(self.entries.len() as u32);
        self.entries.push(RafxScopeEntry {
            name: name.to_string(),
            value: None,
            version: 0,
        });
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn find(
        &self,
        name: &str,
    ) -> Option<RafxScopeId> {
        self.ids.get(name).copied()
    }

    pub fn set_value(
        &mut self,
        id: RafxScopeId,
        value: RafxUniformValue,
    ) {
        if let Some(entry) = self.entries.get_mut(id.0 as usize) {
            entry.value = Some(value);
            entry.version = next_uniform_version();
        }
    }

    /// Resolves and sets in one step
    pub fn set(
        &mut self,
        name: &str,
        value: RafxUniformValue,
    ) -> RafxScopeId {
        let id = self.resolve(name);
        self.set_value(id, value);
        id
    }

    pub fn clear_value(
        &mut self,
        id: RafxScopeId,
    ) {
        if let Some(entry) = self.entries.get_mut(id.0 as usize) {
            entry.value = None;
            entry.version = next_uniform_version();
        }
    }

    pub fn value(
        &self,
        id: RafxScopeId,
    ) -> Option<&RafxUniformValue> {
        self.entries
            .get(id.0 as usize)
            .and_then(|x| x.value.as_ref())
    }

    /// 0 if the entry was never set
    pub fn version(
        &self,
        id: RafxScopeId,
    ) -> u64 {
        self.entries.get(id.0 as usize).map(|x| x.version).unwrap_or(0)
    }

    pub fn name(
        &self,
        id: RafxScopeId,
    ) -> Option<&str> {
        self.entries.get(id.0 as usize).map(|x| x.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_stable() {
        let mut scope = RafxUniformScope::default();
        let a = scope.resolve("matrix_model");
        let b = scope.resolve("light_color");
        assert_ne!(a, b);
        assert_eq!(scope.resolve("matrix_model"), a);
        assert_eq!(scope.find("light_color"), Some(b));
        assert_eq!(scope.find("missing"), None);
        assert_eq!(scope.name(b), Some("light_color"));
    }

    #[test]
    fn versions_increase_on_every_set() {
        let mut scope = RafxUniformScope::default();
        let id = scope.resolve("exposure");
        assert_eq!(scope.version(id), 0);
        assert!(scope.value(id).is_none());

        scope.set_value(id, RafxUniformValue::Float(1.0));
        let first = scope.version(id);
        assert!(first > 0);

        // Setting the same value still stamps a new version
        scope.set_value(id, RafxUniformValue::Float(1.0));
        assert!(scope.version(id) > first);
        assert_eq!(scope.value(id), Some(&RafxUniformValue::Float(1.0)));
    }
}
