//! Post-processing pipeline
//!
//! The scene is rendered into an offscreen target between [`begin_frame`] and
//! [`end_frame`]. `end_frame` then runs, in order: FXAA, light shafts, the
//! cockpit depth restore, bloom and finally the composite that writes the
//! result to the screen (or to the current render-to-texture target).
//!
//! Failures never reach the frame loop. A pass whose shaders or targets could
//! not be built is switched off and the rest of the pipeline carries on.
//!
//! [`begin_frame`]: PostProcessPipeline::begin_frame
//! [`end_frame`]: PostProcessPipeline::end_frame

use fs2_common::common::{com_dprintf, com_printf, com_wprintf};

use super::effects::{EffectChange, EffectConfiguration};
use super::light_shafts::{find_shaft_light, sun_screen_position, DirectionalLight, EyeBasis};
use super::post_shaders::{PostShaderAvailability, PostShaderRole, PostShaderSet};
use super::render_target::{FramebufferPool, FramebufferSet};
use crate::modern::gpu_device::{
    Attachment, BlendMode, ClearMask, DrawTarget, FramebufferId, GpuCaps, GpuDevice, RasterState,
    RasterToggle, TextureId, TexturedQuad,
};
use crate::modern::render_config::RenderSettings;
use crate::modern::shader::cache::VariantId;
use crate::modern::shader::flags::EffectFlags;
use crate::modern::shader::loader::{ShaderLoader, EFFECT_TABLE_FILE};
use crate::modern::shader::manager::ShaderLevel;
use crate::modern::shader::preamble::{FxaaPreset, ShaderModel};

/// Texture unit of the scene color in the composite.
const SCENE_COLOR_UNIT: u32 = 0;
/// Texture unit of the blurred bloom texture in the composite.
const BLOOM_UNIT: u32 = 1;
/// Texture unit of the scene depth in the composite.
const SCENE_DEPTH_UNIT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    InFrame,
    ShutDown,
}

/// The offscreen target the scene is drawn into. Owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneTextures {
    pub framebuffer: FramebufferId,
    pub color: TextureId,
    /// Second color attachment; FXAA writes its luminance pre-pass here.
    pub luminance: TextureId,
    pub depth: TextureId,
    pub cockpit_depth: TextureId,
    pub u_scale: f32,
    pub v_scale: f32,
}

impl SceneTextures {
    /// Create a `width` x `height` scene target with color, luminance and
    /// depth attached.
    pub fn create(device: &mut dyn GpuDevice, width: u32, height: u32) -> Self {
        let scene = Self {
            framebuffer: device.create_framebuffer(),
            color: device.create_texture(width, height),
            luminance: device.create_texture(width, height),
            depth: device.create_texture(width, height),
            cockpit_depth: device.create_texture(width, height),
            u_scale: 1.0,
            v_scale: 1.0,
        };
        device.bind_framebuffer(DrawTarget::Framebuffer(scene.framebuffer));
        device.attach_texture(Attachment::Color(0), Some(scene.color));
        device.attach_texture(Attachment::Color(1), Some(scene.luminance));
        device.attach_texture(Attachment::Depth, Some(scene.depth));
        device.bind_framebuffer(DrawTarget::Screen);
        scene
    }

    pub fn destroy(&self, device: &mut dyn GpuDevice) {
        device.delete_framebuffer(self.framebuffer);
        for tex in [self.color, self.luminance, self.depth, self.cockpit_depth] {
            device.delete_texture(tex);
        }
    }
}

/// Per-frame inputs the passes read.
#[derive(Debug, Clone, Default)]
pub struct FrameView {
    pub time_ms: u64,
    pub eye: EyeBasis,
    /// Global directional lights, in light order.
    pub lights: Vec<DirectionalLight>,
    /// Sun glare strength for this frame.
    pub sun_spot: f32,
    pub clip_aspect: f32,
    /// The subspace effect is on screen; no light shafts.
    pub subspace: bool,
    /// Full-nebula mission; bloom is toned down.
    pub full_nebula: bool,
}

/// What [`PostProcessPipeline::end_frame`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub fxaa: bool,
    pub fxaa_recompiled: bool,
    pub light_shaft: bool,
    pub zbuffer_restored: bool,
    pub bloomed: bool,
}

pub struct PostProcessPipeline {
    state: PipelineState,
    loader: ShaderLoader,

    enabled: bool,
    bloom_intensity: i32,
    fxaa: bool,
    fxaa_preset: FxaaPreset,
    no_fbo: bool,

    effects: EffectConfiguration,
    shaders: PostShaderSet,
    pool: FramebufferPool,
    available: PostShaderAvailability,
    active_composite: VariantId,

    scene: Option<SceneTextures>,
    screen: (u32, u32),
    render_target: Option<FramebufferId>,
    zbuffer_saved: bool,
}

impl PostProcessPipeline {
    pub fn new(settings: &RenderSettings, caps: &GpuCaps, loader: ShaderLoader) -> Self {
        Self {
            state: PipelineState::Uninitialized,
            shaders: PostShaderSet::new(loader.clone(), ShaderModel::from_caps(caps)),
            loader,
            enabled: settings.postprocess,
            bloom_intensity: settings.bloom_intensity,
            fxaa: settings.fxaa,
            fxaa_preset: settings.fxaa_preset,
            no_fbo: settings.no_fbo,
            effects: EffectConfiguration::new(),
            pool: FramebufferPool::new(),
            available: PostShaderAvailability::default(),
            active_composite: VariantId(0),
            scene: None,
            screen: (0, 0),
            render_target: None,
            zbuffer_saved: false,
        }
    }

    /// Load the effect table, build the post shaders and the bloom targets.
    ///
    /// On any blocking problem the pipeline stays uninitialized and frames
    /// render straight to the screen.
    pub fn init(
        &mut self,
        device: &mut dyn GpuDevice,
        level: ShaderLevel,
        scene: Option<SceneTextures>,
        screen_width: u32,
        screen_height: u32,
    ) {
        if matches!(self.state, PipelineState::Ready | PipelineState::InFrame) {
            return;
        }
        self.screen = (screen_width, screen_height);

        if !self.enabled {
            com_printf("Post-processing disabled by settings\n");
            return;
        }
        if level == ShaderLevel::Disabled {
            com_printf("Post-processing disabled: shaders unavailable\n");
            return;
        }
        let Some(scene) = scene else {
            com_printf("Post-processing disabled: no scene render target\n");
            return;
        };
        let caps = device.caps();
        if !caps.framebuffer_objects || self.no_fbo {
            com_printf("Post-processing disabled: framebuffer objects unavailable\n");
            return;
        }
        if !caps.npot_textures && caps.api_version < 20 {
            com_printf("Post-processing disabled: non-power-of-two textures unsupported\n");
            return;
        }

        let table = self.loader.effect_table();
        if let Err(err) = self.effects.load(&table) {
            com_printf(&format!("Unable to parse '{}': {}\n", EFFECT_TABLE_FILE, err));
            return;
        }

        self.available = self.shaders.init(device, &self.effects, self.fxaa_preset);
        if !self.available.composite {
            self.shaders.release(device);
            self.effects.clear();
            return;
        }

        // Failure is logged by the pool and leaves it without bloom targets.
        let _ = self.pool.create(device, screen_width, screen_height, self.available.bloom);

        self.active_composite = VariantId(0);
        self.scene = Some(scene);
        self.state = PipelineState::Ready;
        com_dprintf(&format!(
            "Post-processing ready: {} effect(s), bloom {}, FXAA {}, light shafts {}\n",
            self.effects.effects().len(),
            self.pool.bloom().is_some(),
            self.available.fxaa,
            self.available.light_shafts
        ));
    }

    /// Take over changed runtime toggles. `postprocess` and `no_fbo` only
    /// matter at the next init.
    pub fn apply_settings(&mut self, settings: &RenderSettings) {
        self.enabled = settings.postprocess;
        self.bloom_intensity = settings.bloom_intensity;
        self.fxaa = settings.fxaa;
        self.fxaa_preset = settings.fxaa_preset;
        self.no_fbo = settings.no_fbo;
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Initialized and not shut down.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, PipelineState::Ready | PipelineState::InFrame)
    }

    pub fn effects(&self) -> &EffectConfiguration {
        &self.effects
    }

    /// Effect names in table order.
    pub fn effect_names(&self) -> Vec<&str> {
        self.effects.effect_names()
    }

    pub fn active_effect_flags(&self) -> EffectFlags {
        self.effects.active_flags()
    }

    /// Flag word of the composite that will draw the next frame.
    pub fn active_composite_flags(&self) -> Option<EffectFlags> {
        self.shaders.composite(self.active_composite).map(|v| v.key)
    }

    pub fn post_shaders(&self) -> &PostShaderSet {
        &self.shaders
    }

    pub fn framebuffers(&self) -> &FramebufferPool {
        &self.pool
    }

    /// Composite into `target` instead of the screen; `None` goes back to the screen.
    pub fn set_render_target(&mut self, target: Option<FramebufferId>) {
        self.render_target = target;
    }

    /// Redirect scene rendering into the offscreen target.
    ///
    /// Returns false and does nothing unless the pipeline is ready and not
    /// already inside a frame.
    pub fn begin_frame(&mut self, device: &mut dyn GpuDevice) -> bool {
        if !self.enabled || self.state != PipelineState::Ready {
            return false;
        }
        let Some(scene) = self.scene else {
            return false;
        };

        device.bind_framebuffer(DrawTarget::Framebuffer(scene.framebuffer));
        device.draw_buffers(2);
        device.clear(ClearMask::COLOR | ClearMask::DEPTH);
        self.state = PipelineState::InFrame;
        true
    }

    /// Run every enabled pass and present the result.
    pub fn end_frame(&mut self, device: &mut dyn GpuDevice, view: &FrameView) -> FrameReport {
        let mut report = FrameReport::default();
        if self.state != PipelineState::InFrame {
            return report;
        }
        let Some(scene) = self.scene else {
            self.state = PipelineState::Ready;
            return report;
        };

        let raster = RasterState::override_all(device, false);

        if self.fxaa && self.available.fxaa && self.render_target.is_none() {
            let (ran, recompiled) = self.fxaa_pass(device, &scene);
            report.fxaa = ran;
            report.fxaa_recompiled = recompiled;
        }

        if !view.subspace && self.effects.light_shafts().on && self.available.light_shafts {
            report.light_shaft = self.light_shaft_pass(device, &scene, view);
        }

        if self.zbuffer_saved {
            self.zbuffer_saved = false;
            device.set_toggle(RasterToggle::DepthTest, true);
            device.set_toggle(RasterToggle::DepthWrite, true);
            device.clear(ClearMask::DEPTH);
            device.set_toggle(RasterToggle::DepthTest, false);
            device.set_toggle(RasterToggle::DepthWrite, false);
            device.attach_texture(Attachment::Depth, Some(scene.depth));
            report.zbuffer_restored = true;
        }

        self.bind_output(device);

        if let Some(set) = self.pool.bloom().copied() {
            if self.bloom_intensity > 0 {
                report.bloomed = self.bloom_pass(device, &scene, &set);
            }
        }

        device.clear(ClearMask::COLOR);
        self.composite_pass(device, &scene, view, report.bloomed);

        raster.restore(device);
        device.use_program(None);
        self.state = PipelineState::Ready;
        report
    }

    fn bind_output(&self, device: &mut dyn GpuDevice) {
        let target = match self.render_target {
            Some(fb) => DrawTarget::Framebuffer(fb),
            None => DrawTarget::Screen,
        };
        device.bind_framebuffer(target);
    }

    /// Returns (ran, recompiled).
    fn fxaa_pass(&mut self, device: &mut dyn GpuDevice, scene: &SceneTextures) -> (bool, bool) {
        let mut recompiled = false;
        if self.shaders.fxaa_preset() != Some(self.fxaa_preset) {
            recompiled = true;
            if let Err(err) = self.shaders.rebuild_fxaa(device, self.fxaa_preset) {
                com_wprintf(&format!("FXAA recompile failed ({}); FXAA will be unavailable\n", err));
                self.available.fxaa = false;
                return (false, recompiled);
            }
        }
        let (Some(prepass), Some(fxaa)) =
            (self.shaders.pass(PostShaderRole::FxaaPrepass), self.shaders.pass(PostShaderRole::Fxaa))
        else {
            return (false, recompiled);
        };
        let (width, height) = self.pool.size();
        let quad = TexturedQuad::fullscreen(scene.u_scale, scene.v_scale);

        device.draw_buffers(1);

        // Scene color -> RGB + luma.
        prepass.bind(device);
        prepass.set_uniform(device, "tex", 0);
        device.attach_texture(Attachment::Color(0), Some(scene.luminance));
        device.bind_texture(0, Some(scene.color));
        device.draw_textured_quad(&quad);

        // RGB + luma -> scene color.
        fxaa.bind(device);
        fxaa.set_uniform(device, "tex0", 0);
        fxaa.set_uniform(device, "rt_w", width as f32);
        fxaa.set_uniform(device, "rt_h", height as f32);
        device.attach_texture(Attachment::Color(0), Some(scene.color));
        device.bind_texture(0, Some(scene.luminance));
        device.draw_textured_quad(&quad);

        device.bind_texture(0, None);
        device.use_program(None);
        (true, recompiled)
    }

    fn light_shaft_pass(&self, device: &mut dyn GpuDevice, scene: &SceneTextures, view: &FrameView) -> bool {
        let Some(program) = self.shaders.pass(PostShaderRole::LightShaft) else {
            return false;
        };
        let Some(light) = find_shaft_light(&view.lights, &view.eye) else {
            return false;
        };
        let params = self.effects.light_shafts();

        program.bind(device);
        program.set_uniform(device, "sun_pos", sun_screen_position(light.direction, &view.eye, view.clip_aspect));
        program.set_uniform(device, "scene", 0);
        program.set_uniform(device, "cockpit", 1);
        program.set_uniform(device, "density", params.density);
        program.set_uniform(device, "falloff", params.falloff);
        program.set_uniform(device, "weight", params.weight);
        program.set_uniform(device, "intensity", view.sun_spot * params.intensity);
        program.set_uniform(device, "cp_intensity", view.sun_spot * params.cockpit_intensity());

        device.bind_texture(0, Some(scene.depth));
        device.bind_texture(1, Some(scene.cockpit_depth));
        device.set_toggle(RasterToggle::Blend, true);
        device.blend_mode(BlendMode::Additive);
        device.draw_textured_quad(&TexturedQuad::fullscreen(scene.u_scale, scene.v_scale));
        device.set_toggle(RasterToggle::Blend, false);
        device.bind_texture(1, None);
        device.bind_texture(0, None);
        true
    }

    fn bloom_pass(&self, device: &mut dyn GpuDevice, scene: &SceneTextures, set: &FramebufferSet) -> bool {
        let (Some(bright), Some(blur0), Some(blur1)) = (
            self.shaders.pass(PostShaderRole::BrightPass),
            self.shaders.pass(PostShaderRole::BlurPass0),
            self.shaders.pass(PostShaderRole::BlurPass1),
        ) else {
            return false;
        };

        let scissor = device.set_toggle(RasterToggle::ScissorTest, false);
        let quad = TexturedQuad::fullscreen(1.0, 1.0);

        // bright pass, half size
        let mut width = set.width >> 1;
        let mut height = set.height >> 1;
        device.bind_framebuffer(DrawTarget::Framebuffer(set.bright_pass));
        device.viewport(0, 0, width, height);
        device.clear(ClearMask::COLOR);
        bright.bind(device);
        bright.set_uniform(device, "tex", 0);
        device.bind_texture(0, Some(scene.color));
        device.draw_textured_quad(&quad);
        device.bind_texture(0, None);

        // blur passes, quarter size
        width >>= 1;
        height >>= 1;
        device.viewport(0, 0, width, height);
        device.bind_framebuffer(DrawTarget::Framebuffer(set.blur));
        for (pass, program) in [blur0, blur1].into_iter().enumerate() {
            device.attach_texture(Attachment::Color(0), Some(set.bloom_textures[1 + pass]));
            device.clear(ClearMask::COLOR);
            program.bind(device);
            program.set_uniform(device, "tex", 0);
            let size = if pass == 0 { height } else { width };
            program.set_uniform(device, "bsize", size as f32);
            device.bind_texture(0, Some(set.bloom_textures[pass]));
            device.draw_textured_quad(&quad);
        }
        device.bind_texture(0, None);

        device.viewport(0, 0, self.screen.0, self.screen.1);
        device.set_toggle(RasterToggle::ScissorTest, scissor);
        self.bind_output(device);
        true
    }

    fn composite_pass(&self, device: &mut dyn GpuDevice, scene: &SceneTextures, view: &FrameView, bloomed: bool) {
        let Some(variant) =
            self.shaders.composite(self.active_composite).or_else(|| self.shaders.composite(VariantId(0)))
        else {
            return;
        };
        let program = &variant.program;

        program.bind(device);
        program.set_uniform(device, "tex", SCENE_COLOR_UNIT as i32);
        program.set_uniform(device, "depth_tex", SCENE_DEPTH_UNIT as i32);
        program.set_uniform(device, "timer", (view.time_ms % 100 + 1) as f32);

        for index in variant.key.indices() {
            if let Some(effect) = self.effects.effect(index) {
                program.set_uniform(device, &effect.uniform_name, effect.intensity);
            }
        }

        match self.pool.bloom() {
            Some(set) if bloomed => {
                let mut intensity = self.bloom_intensity.min(200) as f32 * 0.01;
                if view.full_nebula {
                    intensity /= 3.0;
                }
                program.set_uniform(device, "bloom_intensity", intensity);
                program.set_uniform(device, "bloomed", 1);
                program.set_uniform(device, "bloom_tex", BLOOM_UNIT as i32);
                device.bind_texture(BLOOM_UNIT, Some(set.bloom_textures[2]));
            }
            _ => program.set_uniform(device, "bloomed", 0),
        }

        device.bind_texture(SCENE_COLOR_UNIT, Some(scene.color));
        device.bind_texture(SCENE_DEPTH_UNIT, Some(scene.depth));
        device.draw_textured_quad(&TexturedQuad::fullscreen(scene.u_scale, scene.v_scale));

        device.bind_texture(SCENE_DEPTH_UNIT, None);
        device.bind_texture(BLOOM_UNIT, None);
        device.bind_texture(SCENE_COLOR_UNIT, None);
    }

    /// Set an effect from a raw settings value and switch to the composite
    /// for the resulting flag word, building it if needed.
    ///
    /// Returns false for an unknown effect name, and before init (the effect
    /// table is only loaded by [`init`](Self::init)).
    pub fn set_effect_intensity(&mut self, device: &mut dyn GpuDevice, name: &str, value: i32) -> bool {
        if !self.is_ready() {
            return false;
        }
        match self.effects.set_effect(name, value) {
            EffectChange::Unknown => return false,
            EffectChange::LightShafts => return true,
            EffectChange::Effect(_) => {}
        }

        let flags = self.effects.active_flags();
        self.active_composite = match self.shaders.composite_for(device, &self.effects, flags) {
            Ok(id) => id,
            Err(err) => {
                com_wprintf(&format!("Post-processing composite {:?} unavailable: {}\n", flags, err));
                VariantId(0)
            }
        };
        true
    }

    /// Every effect back to its default, and every composite built since
    /// init released. Refused inside a frame.
    pub fn reset_effects(&mut self, device: &mut dyn GpuDevice) -> bool {
        if self.state == PipelineState::InFrame {
            return false;
        }
        self.effects.reset_to_defaults();
        self.shaders.reset_composites(device);
        self.active_composite = VariantId(0);
        true
    }

    /// Keep the scene depth aside while the cockpit is drawn; it is
    /// restored by the next [`end_frame`](Self::end_frame).
    pub fn save_zbuffer(&mut self, device: &mut dyn GpuDevice) {
        if let (true, Some(scene)) = (self.is_ready(), self.scene) {
            device.attach_texture(Attachment::Depth, Some(scene.cockpit_depth));
            device.clear(ClearMask::DEPTH);
            self.zbuffer_saved = true;
        } else {
            device.clear(ClearMask::DEPTH);
        }
    }

    /// Recreate the framebuffer set for a new screen size.
    pub fn resize(&mut self, device: &mut dyn GpuDevice, screen_width: u32, screen_height: u32) {
        self.screen = (screen_width, screen_height);
        if !self.is_ready() {
            return;
        }
        let _ = self.pool.create(device, screen_width, screen_height, self.available.bloom);
    }

    /// Release every shader and render target and forget the effect table.
    pub fn shutdown(&mut self, device: &mut dyn GpuDevice) {
        self.shaders.release(device);
        self.pool.destroy(device);
        self.effects.clear();
        self.available = PostShaderAvailability::default();
        self.active_composite = VariantId(0);
        self.scene = None;
        self.render_target = None;
        self.zbuffer_saved = false;
        self.state = PipelineState::ShutDown;
    }
}
