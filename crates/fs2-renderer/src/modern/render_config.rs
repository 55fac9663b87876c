//! Renderer settings.
//!
//! Registers the shader/post-processing cvars and snapshots them into a
//! plain struct the cache and pipeline read from.

use fs2_common::cvar::{with_cvar_ctx, CvarContext, CvarFlags};

use crate::modern::shader::preamble::FxaaPreset;

/// Every cvar [`RenderSettings`] reads.
pub const CVAR_NAMES: [&str; 9] = [
    "r_postprocess",
    "r_bloom_intensity",
    "r_fxaa",
    "r_fxaa_preset",
    "r_normalmap",
    "r_heightmap",
    "r_glsl_models",
    "r_no_fbo",
    "fs_external_shaders",
];

/// Shader and post-processing settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    /// Post-processing master switch (`r_postprocess`)
    pub postprocess: bool,
    /// Bloom strength in percent; 0 or less disables bloom (`r_bloom_intensity`)
    pub bloom_intensity: i32,
    /// FXAA on/off (`r_fxaa`)
    pub fxaa: bool,
    /// FXAA quality preset (`r_fxaa_preset`)
    pub fxaa_preset: FxaaPreset,
    /// Normal mapping (`r_normalmap`)
    pub normal_map: bool,
    /// Parallax mapping (`r_heightmap`)
    pub height_map: bool,
    /// Shaders for models; off leaves post-processing only (`r_glsl_models`)
    pub glsl_models: bool,
    /// Never use framebuffer objects (`r_no_fbo`)
    pub no_fbo: bool,
    /// Prefer shader sources from the search paths (`fs_external_shaders`)
    pub external_shaders: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            postprocess: true,
            bloom_intensity: 75,
            fxaa: false,
            fxaa_preset: FxaaPreset::default(),
            normal_map: true,
            height_map: true,
            glsl_models: true,
            no_fbo: false,
            external_shaders: false,
        }
    }
}

impl RenderSettings {
    /// Register every renderer cvar with its default.
    pub fn register_cvars(ctx: &mut CvarContext) {
        let archive = CvarFlags::ARCHIVE;
        ctx.get("r_postprocess", "1", archive | CvarFlags::LATCH);
        ctx.get("r_bloom_intensity", "75", archive);
        ctx.get("r_fxaa", "0", archive);
        ctx.get("r_fxaa_preset", "6", archive);
        ctx.get("r_normalmap", "1", archive);
        ctx.get("r_heightmap", "1", archive);
        ctx.get("r_glsl_models", "1", archive | CvarFlags::LATCH);
        ctx.get("r_no_fbo", "0", archive | CvarFlags::LATCH);
        ctx.get("fs_external_shaders", "0", CvarFlags::LATCH);
    }

    /// Snapshot the current cvar values.
    pub fn from_cvars(ctx: &CvarContext) -> Self {
        let on = |name: &str| ctx.variable_value(name) != 0.0;
        Self {
            postprocess: on("r_postprocess"),
            bloom_intensity: ctx.variable_value("r_bloom_intensity") as i32,
            fxaa: on("r_fxaa"),
            fxaa_preset: FxaaPreset::new(ctx.variable_value("r_fxaa_preset") as i32),
            normal_map: on("r_normalmap"),
            height_map: on("r_heightmap"),
            glsl_models: on("r_glsl_models"),
            no_fbo: on("r_no_fbo"),
            external_shaders: on("fs_external_shaders"),
        }
    }

    /// Whether any renderer cvar changed since the last call. Clears the
    /// modified marks.
    pub fn take_changed(ctx: &mut CvarContext) -> bool {
        CVAR_NAMES.iter().fold(false, |changed, name| ctx.take_modified(name) | changed)
    }

    /// Register and snapshot through the global cvar context. Defaults when
    /// the cvar system is not up.
    pub fn from_global_cvars() -> Self {
        with_cvar_ctx(|ctx| {
            Self::register_cvars(ctx);
            Self::from_cvars(ctx)
        })
        .unwrap_or_default()
    }
}
