//! Animated model effects
//!
//! Ships in the loadout screens and cloaking ships draw with an animated
//! variant. The effect id and its timer are set by game code before the
//! draw and uploaded when the variant is bound.

use super::program::ShaderProgram;
use crate::modern::gpu_device::GpuDevice;

/// Effect selected in the animated variant through `effect_num`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimatedEffect {
    LoadoutSelectFs1,
    LoadoutSelectFs2,
    Cloak,
    /// An id declared by a `#Ship Effects` record that the built-in
    /// shader has no name for; passed through unchanged.
    Other(i32),
}

impl AnimatedEffect {
    pub fn from_id(id: i32) -> Self {
        match id {
            0 => AnimatedEffect::LoadoutSelectFs1,
            1 => AnimatedEffect::LoadoutSelectFs2,
            2 => AnimatedEffect::Cloak,
            other => AnimatedEffect::Other(other),
        }
    }

    /// Value uploaded to `effect_num`.
    pub fn id(self) -> i32 {
        match self {
            AnimatedEffect::LoadoutSelectFs1 => 0,
            AnimatedEffect::LoadoutSelectFs2 => 1,
            AnimatedEffect::Cloak => 2,
            AnimatedEffect::Other(id) => id,
        }
    }
}

/// Texture unit the scene copy is bound to for the animated variant.
pub const FRAMEBUFFER_TEXTURE_UNIT: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimatedEffectState {
    pub effect: AnimatedEffect,
    /// Seconds; counts up unless the ship effect inverts it.
    pub timer: f32,
}

impl Default for AnimatedEffectState {
    fn default() -> Self {
        Self { effect: AnimatedEffect::LoadoutSelectFs1, timer: 0.0 }
    }
}

impl AnimatedEffectState {
    pub fn set(&mut self, effect: AnimatedEffect, timer: f32) {
        self.effect = effect;
        self.timer = timer;
    }

    /// Upload the animation uniforms to `program`, which must be current.
    pub fn apply(&self, device: &mut dyn GpuDevice, program: &ShaderProgram, viewport: (u32, u32)) {
        program.set_uniform(device, "sFramebuffer", FRAMEBUFFER_TEXTURE_UNIT);
        program.set_uniform(device, "effect_num", self.effect.id());
        program.set_uniform(device, "anim_timer", self.timer);
        program.set_uniform(device, "vpwidth", 1.0 / viewport.0.max(1) as f32);
        program.set_uniform(device, "vpheight", 1.0 / viewport.1.max(1) as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modern::headless::{DeviceCall, HeadlessDevice};
    use crate::modern::render_config::RenderSettings;
    use crate::modern::shader::flags::ShaderFlags;
    use crate::modern::shader::loader::ShaderLoader;
    use crate::modern::shader::manager::ShaderVariantCache;
    use crate::modern::shader::uniforms::UniformValue;

    #[test]
    fn test_from_id() {
        assert_eq!(AnimatedEffect::from_id(2), AnimatedEffect::Cloak);
        assert_eq!(AnimatedEffect::from_id(5), AnimatedEffect::Other(5));
        assert_eq!(AnimatedEffect::from_id(5).id(), 5);
        assert_eq!(AnimatedEffect::LoadoutSelectFs2.id(), 1);
    }

    #[test]
    fn test_apply_uploads_effect() {
        let mut device = HeadlessDevice::new();
        let mut cache = ShaderVariantCache::new(&RenderSettings::default(), device.caps(), ShaderLoader::builtin());
        let id = cache.resolve(&mut device, ShaderFlags::ANIMATED | ShaderFlags::DIFFUSE_MAP).unwrap();
        cache.enable(&mut device, id);

        let mut state = AnimatedEffectState::default();
        state.set(AnimatedEffect::Cloak, 1.5);
        device.clear_calls();
        let program = &cache.get(id).unwrap().program;
        state.apply(&mut device, program, (1024, 768));

        let values: Vec<UniformValue> = device
            .calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::Uniform { value, .. } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(values.len(), 5);
        assert!(values.contains(&UniformValue::Int(2)));
        assert!(values.contains(&UniformValue::Float(1.5)));
        assert!(values.contains(&UniformValue::Float(1.0 / 1024.0)));

        state.set(AnimatedEffect::from_id(7), 0.25);
        device.clear_calls();
        state.apply(&mut device, program, (1024, 768));
        assert!(device.calls.iter().any(|c| matches!(c, DeviceCall::Uniform { value: UniformValue::Int(7), .. })));
    }
}
