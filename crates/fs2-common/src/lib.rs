#![allow(clippy::needless_return, clippy::collapsible_if, clippy::collapsible_else_if,
         clippy::float_cmp, clippy::new_without_default)]

pub mod common;
pub mod cvar;
pub mod files;
