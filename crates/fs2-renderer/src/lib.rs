#![allow(clippy::too_many_arguments, clippy::float_cmp, clippy::new_without_default,
         clippy::collapsible_if, clippy::collapsible_else_if)]
// Shader-variant management and post-processing compositing

pub mod modern;
