//! Keyed program cache
//!
//! Variants live in a vector in creation order and are addressed by index;
//! a side map gives constant-time lookup by key.

use std::collections::HashMap;
use std::hash::Hash;

use super::program::ShaderProgram;
use crate::modern::gpu_device::GpuDevice;

/// Index of a variant in its cache. Stable until the cache is truncated
/// below it or cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantId(pub usize);

/// A compiled program plus the key it was built for.
#[derive(Debug)]
pub struct ShaderVariant<K> {
    pub key: K,
    pub description: String,
    pub program: ShaderProgram,
}

#[derive(Debug)]
pub struct ProgramCache<K> {
    variants: Vec<ShaderVariant<K>>,
    index: HashMap<K, usize>,
}

impl<K: Copy + Eq + Hash> Default for ProgramCache<K> {
    fn default() -> Self {
        Self { variants: Vec::new(), index: HashMap::new() }
    }
}

impl<K: Copy + Eq + Hash> ProgramCache<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, key: K) -> Option<VariantId> {
        self.index.get(&key).map(|&i| VariantId(i))
    }

    pub fn get(&self, id: VariantId) -> Option<&ShaderVariant<K>> {
        self.variants.get(id.0)
    }

    /// Append a variant. An existing variant for the same key is kept and the
    /// new program released.
    pub fn insert(&mut self, device: &mut dyn GpuDevice, mut variant: ShaderVariant<K>) -> VariantId {
        if let Some(existing) = self.find(variant.key) {
            variant.program.release(device);
            return existing;
        }
        let i = self.variants.len();
        self.index.insert(variant.key, i);
        self.variants.push(variant);
        VariantId(i)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VariantId, &ShaderVariant<K>)> {
        self.variants.iter().enumerate().map(|(i, v)| (VariantId(i), v))
    }

    /// Release and drop every variant from `len` on.
    pub fn truncate(&mut self, device: &mut dyn GpuDevice, len: usize) {
        while self.variants.len() > len {
            if let Some(mut v) = self.variants.pop() {
                self.index.remove(&v.key);
                v.program.release(device);
            }
        }
    }

    pub fn clear(&mut self, device: &mut dyn GpuDevice) {
        self.truncate(device, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modern::headless::HeadlessDevice;
    use crate::modern::shader::loader::ShaderLoader;
    use crate::modern::shader::preamble::{Preamble, ShaderModel};

    fn variant(device: &mut HeadlessDevice, key: u32) -> ShaderVariant<u32> {
        let program = ShaderLoader::builtin()
            .build(device, "post", "post-v.sdr", "post-f.sdr", &Preamble::new(ShaderModel(4)))
            .unwrap();
        ShaderVariant { key, description: format!("variant {}", key), program }
    }

    #[test]
    fn test_insert_and_find() {
        let mut device = HeadlessDevice::new();
        let mut cache = ProgramCache::new();
        let a = variant(&mut device, 1);
        let b = variant(&mut device, 2);
        let ia = cache.insert(&mut device, a);
        let ib = cache.insert(&mut device, b);
        assert_eq!(cache.find(1), Some(ia));
        assert_eq!(cache.find(2), Some(ib));
        assert_eq!(cache.find(3), None);
        assert_eq!(cache.get(ib).map(|v| v.key), Some(2));
    }

    #[test]
    fn test_duplicate_key_keeps_first() {
        let mut device = HeadlessDevice::new();
        let mut cache = ProgramCache::new();
        let first = variant(&mut device, 7);
        let second = variant(&mut device, 7);
        let i = cache.insert(&mut device, first);
        assert_eq!(cache.insert(&mut device, second), i);
        assert_eq!(cache.len(), 1);
        assert_eq!(device.live_programs(), 1);
    }

    #[test]
    fn test_truncate_releases_tail() {
        let mut device = HeadlessDevice::new();
        let mut cache = ProgramCache::new();
        for key in 0..4 {
            let v = variant(&mut device, key);
            cache.insert(&mut device, v);
        }
        cache.truncate(&mut device, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.find(3), None);
        assert_eq!(device.live_programs(), 1);
        cache.clear(&mut device);
        assert!(cache.is_empty());
        assert_eq!(device.live_programs(), 0);
    }
}
