use std::marker::PhantomData;

/// A key into a `ResourceSlab`. Holds the slot index and the generation of the slot at the time
/// the resource was inserted, so a key that outlives its resource resolves to nothing.
pub struct ResourceSlabKey<T> {
    index: u32,
    generation: u32,
    phantom_data: PhantomData<T>,
}

impl<T> ResourceSlabKey<T> {
    fn new(
        index: u32,
        generation: u32,
    ) -> Self {
        ResourceSlabKey {
            index,
            generation,
            phantom_data: PhantomData,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

// Manual impls so that T is not required to be Copy/Eq/Hash
impl<T> Copy for ResourceSlabKey<T> {}

impl<T> Clone for ResourceSlabKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for ResourceSlabKey<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for ResourceSlabKey<T> {}

impl<T> std::hash::Hash for ResourceSlabKey<T> {
    fn hash<H: std::hash::Hasher>(
        &self,
        state: &mut H,
    ) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> std::fmt::Debug for ResourceSlabKey<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter,
    ) -> std::fmt::Result {
        write!(f, "Index: {} Generation: {}", self.index, self.generation)
    }
}

struct ResourceSlabSlot<T> {
    generation: u32,
    value: Option<T>,
}

/// Owns every live resource of one kind. Freed slots are reused with a bumped generation.
pub struct ResourceSlab<T> {
    storage: Vec<ResourceSlabSlot<T>>,
    free_list: Vec<u32>,
    live_count: usize,
}

impl<T> Default for ResourceSlab<T> {
    fn default() -> Self {
        ResourceSlab {
            storage: Vec::default(),
            free_list: Vec::default(),
            live_count: 0,
        }
    }
}

impl<T> ResourceSlab<T> {
    pub fn allocate(
        &mut self,
        value: T,
    ) -> ResourceSlabKey<T> {
        self.live_count += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.storage[index as usize];
            debug_assert!(slot.value.is_none());
            slot.generation += 1;
            slot.value = Some(value);
            ResourceSlabKey::new(index, slot.generation)
        } else {
            let index = self.storage.len() as u32;
            self.storage.push(ResourceSlabSlot {
                generation: 0,
                value: Some(value),
            });
            ResourceSlabKey::new(index, 0)
        }
    }

    /// Removes and returns the resource. Returns None if the key is stale.
    pub fn free(
        &mut self,
        key: ResourceSlabKey<T>,
    ) -> Option<T> {
        let slot = self.storage.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }

        let value = slot.value.take();
        if value.is_some() {
            self.live_count -= 1;
            self.free_list.push(key.index);
        }
        value
    }

    pub fn get(
        &self,
        key: ResourceSlabKey<T>,
    ) -> Option<&T> {
        let slot = self.storage.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(
        &mut self,
        key: ResourceSlabKey<T>,
    ) -> Option<&mut T> {
        let slot = self.storage.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn len(&self) -> usize {
        self.live_count
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceSlabKey<T>, &T)> {
        self.storage.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (ResourceSlabKey::new(index as u32, slot.generation), value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ResourceSlabKey<T>, &mut T)> {
        self.storage
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| {
                let generation = slot.generation;
                slot.value
                    .as_mut()
                    .map(|value| (ResourceSlabKey::new(index as u32, generation), value))
            })
    }

    /// Removes every resource, returning them in slot order
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.live_count);
        for (index, slot) in self.storage.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                values.push(value);
                self.free_list.push(index as u32);
            }
        }
        self.live_count = 0;
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_key_does_not_resolve() {
        let mut slab = ResourceSlab::<u32>::default();
        let first = slab.allocate(5);
        assert_eq!(slab.free(first), Some(5));

        let second = slab.allocate(6);
        assert_eq!(first.index(), second.index());
        assert!(slab.get(first).is_none());
        assert_eq!(slab.get(second), Some(&6));
        assert!(slab.free(first).is_none());
        assert_eq!(slab.len(), 1);
    }

    #[test]
    fn drain_empties_the_slab() {
        let mut slab = ResourceSlab::<&'static str>::default();
        let a = slab.allocate("a");
        slab.allocate("b");
        assert_eq!(slab.drain(), vec!["a", "b"]);
        assert_eq!(slab.len(), 0);
        assert!(slab.get(a).is_none());
        assert_eq!(slab.iter().count(), 0);
    }
}
