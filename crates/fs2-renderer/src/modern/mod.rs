//! Modern programmable-pipeline renderer
//!
//! This module provides the shader and post-processing half of the renderer:
//! - Feature-flag keyed shader variants, compiled lazily and cached
//! - A degrade ladder that switches off features whose shaders fail to build
//! - Table-driven post-processing effects composited in a single pass
//! - FXAA, light shafts and bloom passes around the composite
//! - Offscreen framebuffers for the bloom chain
//!
//! All graphics API calls go through the [`GpuDevice`] trait, so the same
//! code drives a real backend or the recording [`headless::HeadlessDevice`].

pub mod gpu_device;
pub mod headless;
pub mod render_config;
pub mod shader;
pub mod framebuffer;

pub use gpu_device::{GpuCaps, GpuDevice, ShaderStage};
pub use render_config::RenderSettings;
pub use framebuffer::effect_table::TableParseError;
pub use framebuffer::postprocess::{FrameReport, FrameView, PostProcessPipeline, SceneTextures};
pub use shader::animated::AnimatedEffectState;
pub use shader::loader::ShaderLoader;
pub use shader::manager::{ShaderLevel, ShaderVariantCache};

use fs2_common::common::com_wprintf;
use fs2_common::cvar::CvarContext;
use gpu_device::FramebufferStatus;
use shader::cache::VariantId;
use shader::flags::ShaderFlags;

/// Everything the renderer keeps between frames for shaders and
/// post-processing. Passed explicitly instead of living in globals.
pub struct GraphicsContext {
    pub settings: RenderSettings,
    pub shaders: ShaderVariantCache,
    pub post: PostProcessPipeline,
    pub animation: AnimatedEffectState,
}

impl GraphicsContext {
    /// Create the context. Nothing touches the device until [`init`](Self::init).
    pub fn new(settings: RenderSettings, caps: &GpuCaps, loader: ShaderLoader) -> Self {
        Self {
            shaders: ShaderVariantCache::new(&settings, caps, loader.clone()),
            post: PostProcessPipeline::new(&settings, caps, loader),
            animation: AnimatedEffectState::default(),
            settings,
        }
    }

    /// Bring up the variant cache, then the post-processing pipeline.
    ///
    /// Post-processing is brought up only if the shader level allows it;
    /// any failure there leaves the scene rendering without effects.
    pub fn init(
        &mut self,
        device: &mut dyn GpuDevice,
        scene: Option<SceneTextures>,
        screen_width: u32,
        screen_height: u32,
    ) {
        self.shaders.init(device);
        self.post.init(device, self.shaders.level(), scene, screen_width, screen_height);
    }

    /// Model variant for `flags`; see [`ShaderVariantCache::resolve`]. A
    /// baseline failure here also takes post-processing down.
    pub fn resolve(&mut self, device: &mut dyn GpuDevice, flags: ShaderFlags) -> Option<VariantId> {
        let id = self.shaders.resolve(device, flags);
        self.sync_shader_level(device);
        id
    }

    /// Start a post-processed frame. Returns false when the frame should go
    /// straight to the screen.
    pub fn begin_frame(&mut self, device: &mut dyn GpuDevice) -> bool {
        self.sync_shader_level(device);
        self.post.begin_frame(device)
    }

    /// With shaders disabled nothing may run a program, post passes included.
    fn sync_shader_level(&mut self, device: &mut dyn GpuDevice) {
        if self.shaders.level() == ShaderLevel::Disabled && self.post.is_ready() {
            com_wprintf("Shaders disabled; shutting down post-processing\n");
            self.post.shutdown(device);
        }
    }

    /// Push changed settings into the cache and the pipeline.
    pub fn apply_settings(&mut self, settings: RenderSettings) {
        self.shaders.apply_settings(&settings);
        self.post.apply_settings(&settings);
        self.settings = settings;
    }

    /// Re-read the settings if any renderer cvar changed. Returns true if
    /// new settings were applied.
    pub fn poll_cvars(&mut self, cvars: &mut CvarContext) -> bool {
        if !RenderSettings::take_changed(cvars) {
            return false;
        }
        self.apply_settings(RenderSettings::from_cvars(cvars));
        true
    }

    /// Release every GPU resource owned by the context.
    pub fn shutdown(&mut self, device: &mut dyn GpuDevice) {
        self.post.shutdown(device);
        self.shaders.shutdown(device);
    }
}

/// Errors that can occur while building shaders or render targets.
#[derive(Debug)]
pub enum RenderError {
    /// A shader stage failed to compile; carries the compiler log.
    ShaderCompilation { stage: ShaderStage, log: String },
    /// Shader linking failed.
    ShaderLinking(String),
    /// A framebuffer did not report complete after its attachments were bound.
    FramebufferIncomplete(FramebufferStatus),
    /// The effect table could not be parsed.
    TableParse(TableParseError),
    /// The device lacks something required.
    Unsupported(String),
    /// Resource not found.
    NotFound(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::ShaderCompilation { stage, log } => {
                write!(f, "{} shader compilation error: {}", stage.label(), log)
            }
            RenderError::ShaderLinking(msg) => write!(f, "Shader linking error: {}", msg),
            RenderError::FramebufferIncomplete(status) => {
                write!(f, "Framebuffer incomplete: {:?}", status)
            }
            RenderError::TableParse(err) => write!(f, "Effect table error: {}", err),
            RenderError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            RenderError::NotFound(name) => write!(f, "Resource not found: {}", name),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::TableParse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TableParseError> for RenderError {
    fn from(err: TableParseError) -> Self {
        RenderError::TableParse(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use headless::HeadlessDevice;

    #[test]
    fn test_error_display() {
        let err = RenderError::ShaderCompilation {
            stage: ShaderStage::Fragment,
            log: "0:12: syntax error".into(),
        };
        assert_eq!(err.to_string(), "Fragment shader compilation error: 0:12: syntax error");

        let err: RenderError = TableParseError::new(4, "expected #End").into();
        assert!(err.to_string().contains("line 4"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_context_lifecycle() {
        let mut device = HeadlessDevice::new();
        let scene = SceneTextures::create(&mut device, 800, 600);
        let mut ctx = GraphicsContext::new(RenderSettings::default(), device.caps(), ShaderLoader::builtin());

        ctx.init(&mut device, Some(scene), 800, 600);
        assert_eq!(ctx.shaders.level(), ShaderLevel::Full);
        assert!(ctx.post.is_ready());

        ctx.shutdown(&mut device);
        scene.destroy(&mut device);
        assert_eq!(device.live_programs(), 0);
        assert_eq!(device.live_shader_objects(), 0);
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_framebuffers(), 0);
    }

    #[test]
    fn test_poll_cvars() {
        let mut cvars = CvarContext::new();
        RenderSettings::register_cvars(&mut cvars);
        let mut device = HeadlessDevice::new();
        let mut ctx = GraphicsContext::new(RenderSettings::from_cvars(&cvars), device.caps(), ShaderLoader::builtin());
        assert!(ctx.poll_cvars(&mut cvars));
        assert!(!ctx.poll_cvars(&mut cvars));

        cvars.set("r_fxaa_preset", "2");
        assert!(ctx.poll_cvars(&mut cvars));
        assert_eq!(ctx.settings.fxaa_preset.index(), 2);
        ctx.shutdown(&mut device);
    }

    #[test]
    fn test_base_failure_at_init_keeps_post_down() {
        let mut device = HeadlessDevice::new();
        device.fail_compiles_containing("#define SHADER_MODEL");
        let scene = SceneTextures::create(&mut device, 640, 480);
        let mut ctx = GraphicsContext::new(RenderSettings::default(), device.caps(), ShaderLoader::builtin());

        ctx.init(&mut device, Some(scene), 640, 480);
        assert_eq!(ctx.shaders.level(), ShaderLevel::Disabled);
        assert!(!ctx.post.is_ready());
        assert!(!ctx.begin_frame(&mut device));
        assert_eq!(device.live_programs(), 0);
    }

    #[test]
    fn test_base_failure_after_init_shuts_post_down() {
        let mut device = HeadlessDevice::new();
        let scene = SceneTextures::create(&mut device, 640, 480);
        let post_only = RenderSettings { glsl_models: false, ..RenderSettings::default() };
        let mut ctx = GraphicsContext::new(post_only, device.caps(), ShaderLoader::builtin());
        ctx.init(&mut device, Some(scene), 640, 480);
        assert!(ctx.post.is_ready());

        // Model shaders switched on later; the first baseline build fails.
        ctx.apply_settings(RenderSettings::default());
        device.fail_compiles_containing("#define SHADER_MODEL");
        assert!(ctx.resolve(&mut device, ShaderFlags::empty()).is_none());
        assert_eq!(ctx.shaders.level(), ShaderLevel::Disabled);
        assert_eq!(ctx.post.state(), framebuffer::PipelineState::ShutDown);
        assert!(!ctx.begin_frame(&mut device));
    }

    #[test]
    fn test_begin_frame_checks_shader_level() {
        let mut device = HeadlessDevice::new();
        let scene = SceneTextures::create(&mut device, 640, 480);
        let post_only = RenderSettings { glsl_models: false, ..RenderSettings::default() };
        let mut ctx = GraphicsContext::new(post_only, device.caps(), ShaderLoader::builtin());
        ctx.init(&mut device, Some(scene), 640, 480);

        ctx.apply_settings(RenderSettings::default());
        device.fail_compiles_containing("#define SHADER_MODEL");
        assert!(ctx.shaders.resolve(&mut device, ShaderFlags::empty()).is_none());
        assert!(!ctx.begin_frame(&mut device));
        assert!(!ctx.post.is_ready());
    }

    #[test]
    fn test_post_only_level_from_settings() {
        let mut device = HeadlessDevice::new();
        let settings = RenderSettings { glsl_models: false, ..RenderSettings::default() };
        let mut ctx = GraphicsContext::new(settings, device.caps(), ShaderLoader::builtin());
        let scene = SceneTextures::create(&mut device, 640, 480);

        ctx.init(&mut device, Some(scene), 640, 480);
        assert_eq!(ctx.shaders.level(), ShaderLevel::PostOnly);
        assert!(ctx.post.is_ready());
        assert!(ctx.shaders.resolve(&mut device, ShaderFlags::LIGHT).is_none());
    }
}
