//! Shader programs and variant management
//!
//! Sources are embedded (or loaded from the search paths), prefixed with a
//! generated preamble of feature defines, compiled per feature combination
//! and cached by their flag word.

pub mod animated;
pub mod cache;
pub mod flags;
pub mod loader;
pub mod manager;
pub mod preamble;
pub mod program;
pub mod uniforms;

pub use cache::{ProgramCache, ShaderVariant, VariantId};
pub use flags::{EffectFlags, ShaderFlags, MAX_POST_EFFECTS};
pub use manager::{ShaderLevel, ShaderVariantCache};
pub use program::ShaderProgram;
pub use uniforms::{Attribute, Uniform, UniformValue};
