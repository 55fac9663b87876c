//! Shader variant cache
//!
//! Model and particle shaders are compiled on first use for each feature
//! combination and kept until shutdown. A combination that fails to build
//! switches off the feature responsible, so later requests for it return
//! `None` straight away instead of retrying the compile every frame.

use fs2_common::common::{com_dprintf, com_printf, com_wprintf};

use super::cache::{ProgramCache, ShaderVariant, VariantId};
use super::flags::{describe, uniform_references, ShaderFlags};
use super::loader::ShaderLoader;
use super::preamble::{Preamble, ShaderModel};
use crate::modern::gpu_device::{GpuCaps, GpuDevice, TextureId};
use crate::modern::render_config::RenderSettings;
use crate::modern::RenderError;

/// How much of the programmable pipeline is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShaderLevel {
    /// The base shader failed to build; everything falls back to fixed function.
    Disabled,
    /// Models use fixed function; post-processing still runs.
    PostOnly,
    Full,
}

/// Variants that are always built at init.
const PRECOMPILED: [ShaderFlags; 3] = [
    ShaderFlags::empty(),
    ShaderFlags::SOFT_QUAD,
    ShaderFlags::SOFT_QUAD.union(ShaderFlags::DISTORTION),
];

pub struct ShaderVariantCache {
    loader: ShaderLoader,
    model: ShaderModel,
    variants: ProgramCache<ShaderFlags>,
    /// Features switched off by build failures. Only ever grows.
    degraded: ShaderFlags,
    /// Features switched off in the settings.
    user_disabled: ShaderFlags,
    models_enabled: bool,
    base_failed: bool,
    current: Option<VariantId>,
    fallback_texture: Option<TextureId>,
}

fn user_disabled_features(settings: &RenderSettings) -> ShaderFlags {
    let mut off = ShaderFlags::empty();
    if !settings.normal_map {
        off |= ShaderFlags::NORMAL_MAP;
    }
    if !settings.height_map {
        off |= ShaderFlags::HEIGHT_MAP;
    }
    off
}

impl ShaderVariantCache {
    pub fn new(settings: &RenderSettings, caps: &GpuCaps, loader: ShaderLoader) -> Self {
        Self {
            loader,
            model: ShaderModel::from_caps(caps),
            variants: ProgramCache::new(),
            degraded: ShaderFlags::empty(),
            user_disabled: user_disabled_features(settings),
            models_enabled: settings.glsl_models,
            base_failed: false,
            current: None,
            fallback_texture: None,
        }
    }

    /// Create the fallback texture and build the baseline and particle
    /// variants. A baseline failure leaves the level at
    /// [`ShaderLevel::Disabled`].
    pub fn init(&mut self, device: &mut dyn GpuDevice) {
        com_printf(&format!("Initializing shaders (shader model {})...\n", self.model.0));
        if self.fallback_texture.is_none() {
            self.fallback_texture = Some(device.create_texture(1, 1));
        }
        if self.level() == ShaderLevel::Full {
            for flags in PRECOMPILED {
                self.resolve(device, flags);
            }
        }
        com_dprintf(&format!("  {} shader variant(s) ready\n", self.variants.len()));
    }

    pub fn apply_settings(&mut self, settings: &RenderSettings) {
        self.user_disabled = user_disabled_features(settings);
        self.models_enabled = settings.glsl_models;
    }

    pub fn level(&self) -> ShaderLevel {
        if self.base_failed {
            ShaderLevel::Disabled
        } else if !self.models_enabled {
            ShaderLevel::PostOnly
        } else {
            ShaderLevel::Full
        }
    }

    pub fn shader_model(&self) -> ShaderModel {
        self.model
    }

    /// Features switched off by failed builds.
    pub fn degraded_features(&self) -> ShaderFlags {
        self.degraded
    }

    pub fn feature_enabled(&self, flags: ShaderFlags) -> bool {
        !flags.intersects(self.degraded | self.user_disabled)
    }

    /// 1x1 texture bound to samplers that have nothing else to show.
    pub fn fallback_texture(&self) -> Option<TextureId> {
        self.fallback_texture
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// The variant for `flags`, compiling it on first use.
    ///
    /// `None` means the caller should render without a shader: the level is
    /// below [`ShaderLevel::Full`], a requested feature is off, or the build
    /// just failed (which switches the responsible feature off).
    pub fn resolve(&mut self, device: &mut dyn GpuDevice, flags: ShaderFlags) -> Option<VariantId> {
        if self.level() != ShaderLevel::Full || !self.feature_enabled(flags) {
            return None;
        }
        if let Some(id) = self.variants.find(flags) {
            return Some(id);
        }
        match self.compile(device, flags) {
            Ok(id) => Some(id),
            Err(_) => {
                self.degrade(device, flags);
                None
            }
        }
    }

    pub fn get(&self, id: VariantId) -> Option<&ShaderVariant<ShaderFlags>> {
        self.variants.get(id)
    }

    pub fn find(&self, flags: ShaderFlags) -> Option<VariantId> {
        self.variants.find(flags)
    }

    pub fn current(&self) -> Option<VariantId> {
        self.current
    }

    /// Make a variant current. Rebinding the current variant is skipped.
    pub fn enable(&mut self, device: &mut dyn GpuDevice, id: VariantId) {
        if self.current == Some(id) {
            return;
        }
        if let Some(v) = self.variants.get(id) {
            v.program.bind(device);
            self.current = Some(id);
        }
    }

    pub fn disable(&mut self, device: &mut dyn GpuDevice) {
        if self.current.take().is_some() {
            device.use_program(None);
        }
    }

    pub fn shutdown(&mut self, device: &mut dyn GpuDevice) {
        self.disable(device);
        self.variants.clear(device);
        if let Some(tex) = self.fallback_texture.take() {
            device.delete_texture(tex);
        }
    }

    fn compile(&mut self, device: &mut dyn GpuDevice, flags: ShaderFlags) -> Result<VariantId, RenderError> {
        let (vert, frag) = flags.source_files();
        let description = describe(flags);
        let preamble = Preamble::new(self.model).features(flags);
        let mut program = self.loader.build(device, &description, vert, frag, &preamble)?;

        for reference in uniform_references(flags) {
            for name in reference.uniforms {
                program.add_uniform(device, name);
            }
            for name in reference.attributes {
                program.add_attribute(device, name);
            }
        }

        com_dprintf(&format!("Shader variant {:#06x} built: {}\n", flags.bits(), description));
        Ok(self.variants.insert(device, ShaderVariant { key: flags, description, program }))
    }

    fn degrade(&mut self, device: &mut dyn GpuDevice, flags: ShaderFlags) {
        let off = if flags.is_empty() {
            com_wprintf("Base shader failed to build; disabling shaders\n");
            self.base_failed = true;
            self.disable(device);
            self.variants.clear(device);
            return;
        } else if flags.intersects(ShaderFlags::HEIGHT_MAP | ShaderFlags::NORMAL_MAP) {
            ShaderFlags::HEIGHT_MAP | ShaderFlags::NORMAL_MAP
        } else {
            flags.highest_bit().unwrap_or(flags)
        };

        self.degraded |= off;
        com_wprintf(&format!("Shader variant {:#06x} failed; disabling {}\n", flags.bits(), describe(off)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modern::headless::{DeviceCall, HeadlessDevice};

    fn cache(device: &HeadlessDevice) -> ShaderVariantCache {
        ShaderVariantCache::new(&RenderSettings::default(), device.caps(), ShaderLoader::builtin())
    }

    #[test]
    fn test_init_precompiles_base_and_particles() {
        let mut device = HeadlessDevice::new();
        let mut c = cache(&device);
        c.init(&mut device);
        assert_eq!(c.len(), 3);
        assert!(c.find(ShaderFlags::empty()).is_some());
        assert!(c.find(ShaderFlags::SOFT_QUAD).is_some());
        assert!(c.find(ShaderFlags::SOFT_QUAD | ShaderFlags::DISTORTION).is_some());
        assert!(c.fallback_texture().is_some());

        let distort = c.find(ShaderFlags::SOFT_QUAD | ShaderFlags::DISTORTION).unwrap();
        let program = &c.get(distort).unwrap().program;
        assert!(program.attribute("offset_in").is_valid());
        assert!(program.uniform("distMap").is_valid());
    }

    #[test]
    fn test_resolve_is_stable() {
        let mut device = HeadlessDevice::new();
        let mut c = cache(&device);
        let flags = ShaderFlags::LIGHT | ShaderFlags::DIFFUSE_MAP;
        let a = c.resolve(&mut device, flags);
        let compiles = device.compile_count();
        let b = c.resolve(&mut device, flags);
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(device.compile_count(), compiles);

        let program = &c.get(a.unwrap()).unwrap().program;
        assert!(program.uniform("sBasemap").is_valid());
        assert!(program.uniform("n_lights").is_valid());
        assert!(!program.uniform("sGlowmap").is_valid());
    }

    #[test]
    fn test_height_failure_degrades_monotonically() {
        let mut device = HeadlessDevice::new();
        device.fail_compiles_containing("#define FLAG_HEIGHT_MAP");
        let mut c = cache(&device);

        let flags = ShaderFlags::LIGHT | ShaderFlags::NORMAL_MAP | ShaderFlags::HEIGHT_MAP;
        assert_eq!(c.resolve(&mut device, flags), None);
        assert!(c.degraded_features().contains(ShaderFlags::HEIGHT_MAP | ShaderFlags::NORMAL_MAP));

        let compiles = device.compile_count();
        assert_eq!(c.resolve(&mut device, flags), None);
        assert_eq!(c.resolve(&mut device, ShaderFlags::NORMAL_MAP), None);
        assert_eq!(device.compile_count(), compiles);

        assert!(c.resolve(&mut device, ShaderFlags::LIGHT).is_some());
        assert_eq!(c.level(), ShaderLevel::Full);
    }

    #[test]
    fn test_other_failure_disables_highest_bit() {
        let mut device = HeadlessDevice::new();
        device.fail_compiles_containing("#define FLAG_THRUSTER");
        let mut c = cache(&device);
        assert_eq!(c.resolve(&mut device, ShaderFlags::LIGHT | ShaderFlags::THRUSTER), None);
        assert_eq!(c.degraded_features(), ShaderFlags::THRUSTER);
        assert!(c.feature_enabled(ShaderFlags::LIGHT));
    }

    #[test]
    fn test_base_failure_disables_everything() {
        let mut device = HeadlessDevice::new();
        let mut c = cache(&device);
        assert!(c.resolve(&mut device, ShaderFlags::LIGHT).is_some());
        device.fail_compiles_containing("#define SHADER_MODEL");

        assert_eq!(c.resolve(&mut device, ShaderFlags::empty()), None);
        assert_eq!(c.level(), ShaderLevel::Disabled);
        assert!(c.is_empty());
        assert_eq!(device.live_programs(), 0);

        let compiles = device.compile_count();
        assert_eq!(c.resolve(&mut device, ShaderFlags::LIGHT), None);
        assert_eq!(device.compile_count(), compiles);
    }

    #[test]
    fn test_base_failure_during_init() {
        let mut device = HeadlessDevice::new();
        device.fail_compiles_containing("#define SHADER_MODEL");
        let mut c = cache(&device);
        c.init(&mut device);
        assert_eq!(c.level(), ShaderLevel::Disabled);
        assert!(c.is_empty());
        // Only the baseline was attempted; the particle variants were skipped.
        assert!(device.compile_count() <= 2);
        let compiles = device.compile_count();
        assert_eq!(c.resolve(&mut device, ShaderFlags::SOFT_QUAD), None);
        assert_eq!(device.compile_count(), compiles);
    }

    #[test]
    fn test_user_disabled_features_never_compile() {
        let mut device = HeadlessDevice::new();
        let settings = RenderSettings { normal_map: false, ..RenderSettings::default() };
        let mut c = ShaderVariantCache::new(&settings, device.caps(), ShaderLoader::builtin());
        assert_eq!(c.resolve(&mut device, ShaderFlags::NORMAL_MAP), None);
        assert_eq!(device.compile_count(), 0);
        assert!(c.degraded_features().is_empty());

        c.apply_settings(&RenderSettings::default());
        assert!(c.resolve(&mut device, ShaderFlags::NORMAL_MAP).is_some());
    }

    #[test]
    fn test_enable_skips_redundant_binds() {
        let mut device = HeadlessDevice::new();
        let mut c = cache(&device);
        let id = c.resolve(&mut device, ShaderFlags::FOG).unwrap();
        device.clear_calls();
        c.enable(&mut device, id);
        c.enable(&mut device, id);
        assert_eq!(device.count(|call| matches!(call, DeviceCall::UseProgram(Some(_)))), 1);
        c.disable(&mut device);
        c.disable(&mut device);
        assert_eq!(device.count(|call| matches!(call, DeviceCall::UseProgram(None))), 1);
    }

    #[test]
    fn test_shutdown_releases_all() {
        let mut device = HeadlessDevice::new();
        let mut c = cache(&device);
        c.init(&mut device);
        c.resolve(&mut device, ShaderFlags::LIGHT);
        c.shutdown(&mut device);
        assert_eq!(device.live_programs(), 0);
        assert_eq!(device.live_textures(), 0);
        c.shutdown(&mut device);
    }
}
