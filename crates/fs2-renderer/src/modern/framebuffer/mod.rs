//! Post-processing and offscreen render targets
//!
//! - `effect_table` / `effects`: the table-driven effect list and its runtime state
//! - `light_shafts`: light selection and screen projection for the shaft pass
//! - `post_shaders`: pass and composite programs
//! - `render_target`: bloom framebuffers and textures
//! - `postprocess`: the per-frame pipeline tying it together

pub mod effect_table;
pub mod effects;
pub mod light_shafts;
pub mod post_shaders;
pub mod postprocess;
pub mod render_target;

pub use effects::{EffectConfiguration, PostEffect, ShipEffect};
pub use postprocess::{FrameReport, FrameView, PipelineState, PostProcessPipeline, SceneTextures};
pub use render_target::{FramebufferPool, FramebufferSet};
