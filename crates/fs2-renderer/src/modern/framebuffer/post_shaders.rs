//! Post-processing shaders
//!
//! A fixed set of pass shaders (blur, bright pass, FXAA and its pre-pass,
//! light shafts) plus composite shaders keyed by the active effect word. The
//! baseline composite is built at init; other composites are built on demand
//! and dropped again by a reset.

use std::collections::{HashMap, HashSet};

use fs2_common::common::{com_dprintf, com_printf, com_wprintf};

use super::effects::EffectConfiguration;
use crate::modern::gpu_device::GpuDevice;
use crate::modern::shader::cache::{ProgramCache, ShaderVariant, VariantId};
use crate::modern::shader::flags::EffectFlags;
use crate::modern::shader::loader::ShaderLoader;
use crate::modern::shader::preamble::{FxaaPreset, Preamble, ShaderModel};
use crate::modern::shader::program::ShaderProgram;
use crate::modern::RenderError;

/// What each fixed post shader is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostShaderRole {
    Composite,
    BlurPass0,
    BlurPass1,
    BrightPass,
    Fxaa,
    FxaaPrepass,
    LightShaft,
}

struct PostShaderFile {
    role: PostShaderRole,
    vert: &'static str,
    frag: &'static str,
    uniforms: &'static [&'static str],
}

const POST_SHADER_FILES: [PostShaderFile; 7] = [
    PostShaderFile {
        role: PostShaderRole::Composite,
        vert: "post-v.sdr",
        frag: "post-f.sdr",
        uniforms: &["tex", "depth_tex", "bloom_tex", "timer", "bloomed", "bloom_intensity"],
    },
    PostShaderFile { role: PostShaderRole::BlurPass0, vert: "post-v.sdr", frag: "blur-f.sdr", uniforms: &["tex", "bsize"] },
    PostShaderFile { role: PostShaderRole::BlurPass1, vert: "post-v.sdr", frag: "blur-f.sdr", uniforms: &["tex", "bsize"] },
    PostShaderFile { role: PostShaderRole::BrightPass, vert: "post-v.sdr", frag: "brightpass-f.sdr", uniforms: &["tex"] },
    PostShaderFile { role: PostShaderRole::Fxaa, vert: "fxaa-v.sdr", frag: "fxaa-f.sdr", uniforms: &["tex0", "rt_w", "rt_h"] },
    PostShaderFile { role: PostShaderRole::FxaaPrepass, vert: "post-v.sdr", frag: "fxaapre-f.sdr", uniforms: &["tex"] },
    PostShaderFile {
        role: PostShaderRole::LightShaft,
        vert: "post-v.sdr",
        frag: "ls-f.sdr",
        uniforms: &["scene", "cockpit", "sun_pos", "weight", "intensity", "falloff", "density", "cp_intensity"],
    },
];

fn shader_file(role: PostShaderRole) -> &'static PostShaderFile {
    // The table has one row per role.
    POST_SHADER_FILES.iter().find(|f| f.role == role).unwrap_or(&POST_SHADER_FILES[0])
}

/// Which passes came up at init.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostShaderAvailability {
    pub composite: bool,
    pub bloom: bool,
    pub fxaa: bool,
    pub light_shafts: bool,
}

pub struct PostShaderSet {
    loader: ShaderLoader,
    model: ShaderModel,
    composites: ProgramCache<EffectFlags>,
    /// Composites built at init; a reset truncates back to these.
    fixed_composites: usize,
    passes: HashMap<PostShaderRole, ShaderProgram>,
    /// Effect words whose composite failed to build; never tried again.
    failed_composites: HashSet<EffectFlags>,
    /// Preset the current FXAA program was built with.
    fxaa_preset: Option<FxaaPreset>,
}

impl PostShaderSet {
    pub fn new(loader: ShaderLoader, model: ShaderModel) -> Self {
        Self {
            loader,
            model,
            composites: ProgramCache::new(),
            fixed_composites: 0,
            passes: HashMap::new(),
            failed_composites: HashSet::new(),
            fxaa_preset: None,
        }
    }

    /// Build the baseline composite and every pass shader.
    pub fn init(
        &mut self,
        device: &mut dyn GpuDevice,
        effects: &EffectConfiguration,
        fxaa_preset: FxaaPreset,
    ) -> PostShaderAvailability {
        let mut avail = PostShaderAvailability::default();

        if self.build_composite(device, effects, effects.always_on_flags()).is_err() {
            com_printf("Unable to build the post-processing composite shader\n");
            return avail;
        }
        self.fixed_composites = self.composites.len();
        avail.composite = true;

        let blur0 = self.build_pass(device, PostShaderRole::BlurPass0, Preamble::new(self.model).blur_pass(0));
        let blur1 = self.build_pass(device, PostShaderRole::BlurPass1, Preamble::new(self.model).blur_pass(1));
        let bright = self.build_pass(device, PostShaderRole::BrightPass, Preamble::new(self.model));
        avail.bloom = blur0 && blur1 && bright;
        if !avail.bloom {
            com_wprintf("Bloom shaders unavailable; bloom disabled\n");
        }

        let fxaa = self.rebuild_fxaa(device, fxaa_preset).is_ok();
        let prepass = self.build_pass(device, PostShaderRole::FxaaPrepass, Preamble::new(self.model));
        avail.fxaa = fxaa && prepass;
        if !avail.fxaa {
            com_wprintf("Error while compiling FXAA shaders. FXAA will be unavailable.\n");
        }

        let samples = effects.light_shafts().sample_count;
        avail.light_shafts =
            self.build_pass(device, PostShaderRole::LightShaft, Preamble::new(self.model).sample_count(samples));
        if !avail.light_shafts {
            com_wprintf("Light shaft shader unavailable\n");
        }

        avail
    }

    fn build_pass(&mut self, device: &mut dyn GpuDevice, role: PostShaderRole, preamble: Preamble) -> bool {
        let file = shader_file(role);
        if let Some(mut old) = self.passes.remove(&role) {
            old.release(device);
        }
        match self.loader.build(device, &format!("{:?} post shader", role), file.vert, file.frag, &preamble) {
            Ok(mut program) => {
                for name in file.uniforms {
                    program.add_uniform(device, name);
                }
                self.passes.insert(role, program);
                true
            }
            Err(_) => false,
        }
    }

    /// Release the FXAA program and build it again with `preset`.
    pub fn rebuild_fxaa(&mut self, device: &mut dyn GpuDevice, preset: FxaaPreset) -> Result<(), RenderError> {
        com_dprintf(&format!("Building FXAA shader with preset {}\n", preset.index()));
        self.fxaa_preset = None;
        let file = shader_file(PostShaderRole::Fxaa);
        if let Some(mut old) = self.passes.remove(&PostShaderRole::Fxaa) {
            old.release(device);
        }
        let preamble = Preamble::new(self.model).fxaa(preset);
        let mut program = self.loader.build(device, "FXAA post shader", file.vert, file.frag, &preamble)?;
        for name in file.uniforms {
            program.add_uniform(device, name);
        }
        self.passes.insert(PostShaderRole::Fxaa, program);
        self.fxaa_preset = Some(preset);
        Ok(())
    }

    pub fn fxaa_preset(&self) -> Option<FxaaPreset> {
        self.fxaa_preset
    }

    pub fn pass(&self, role: PostShaderRole) -> Option<&ShaderProgram> {
        match role {
            PostShaderRole::Composite => self.composites.get(VariantId(0)).map(|v| &v.program),
            _ => self.passes.get(&role),
        }
    }

    /// The composite for `flags`, building it if it does not exist yet.
    /// A word that failed once fails again without another compile.
    pub fn composite_for(
        &mut self,
        device: &mut dyn GpuDevice,
        effects: &EffectConfiguration,
        flags: EffectFlags,
    ) -> Result<VariantId, RenderError> {
        if let Some(id) = self.composites.find(flags) {
            return Ok(id);
        }
        if self.failed_composites.contains(&flags) {
            return Err(RenderError::Unsupported(format!("composite {:?} failed to build earlier", flags)));
        }
        self.build_composite(device, effects, flags).map_err(|err| {
            com_wprintf(&format!("Composite {:?} disabled: {}\n", flags, err));
            self.failed_composites.insert(flags);
            err
        })
    }

    pub fn composite_failed(&self, flags: EffectFlags) -> bool {
        self.failed_composites.contains(&flags)
    }

    fn build_composite(
        &mut self,
        device: &mut dyn GpuDevice,
        effects: &EffectConfiguration,
        flags: EffectFlags,
    ) -> Result<VariantId, RenderError> {
        let file = shader_file(PostShaderRole::Composite);
        let mut preamble = Preamble::new(self.model);
        for i in flags.indices() {
            if let Some(e) = effects.effect(i) {
                preamble = preamble.define(&e.define_name);
            }
        }

        let description = format!("Post-processing composite {:?}", flags);
        let mut program = self.loader.build(device, &description, file.vert, file.frag, &preamble)?;
        for name in file.uniforms {
            program.add_uniform(device, name);
        }
        for i in flags.indices() {
            if let Some(e) = effects.effect(i) {
                program.add_uniform(device, &e.uniform_name);
            }
        }
        Ok(self.composites.insert(device, ShaderVariant { key: flags, description, program }))
    }

    pub fn composite(&self, id: VariantId) -> Option<&ShaderVariant<EffectFlags>> {
        self.composites.get(id)
    }

    pub fn composite_count(&self) -> usize {
        self.composites.len()
    }

    /// Drop every composite built after init.
    pub fn reset_composites(&mut self, device: &mut dyn GpuDevice) {
        self.composites.truncate(device, self.fixed_composites);
    }

    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        self.composites.clear(device);
        self.fixed_composites = 0;
        for (_, mut program) in self.passes.drain() {
            program.release(device);
        }
        self.fxaa_preset = None;
    }
}
