// cvar.rs — console variables
//
// Console variables are the configuration surface for the renderer's runtime
// toggles (post-processing, bloom, FXAA, mapping features, external sources).

use crate::common::com_printf;

use parking_lot::{const_mutex, Mutex};
use std::collections::HashMap;

bitflags::bitflags! {
    /// Cvar behaviour flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CvarFlags: u32 {
        /// Saved to the config file.
        const ARCHIVE = 0x0001;
        /// Only settable from the command line / code.
        const NOSET   = 0x0008;
        /// Changes take effect on the next subsystem restart.
        const LATCH   = 0x0010;
    }
}

/// One named setting with its current text and numeric value.
#[derive(Clone, Debug)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    /// Value waiting for the next renderer restart (LATCH cvars only).
    pub latched_string: Option<String>,
    pub flags: CvarFlags,
    /// Set whenever `string` changes; cleared by `take_modified`.
    pub modified: bool,
    pub value: f32,
}

/// Registry of console variables, in registration order.
#[derive(Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    by_name: HashMap<String, usize>,
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.find_var_index(name).map(|idx| &self.cvar_vars[idx])
    }

    /// Numeric value, or 0 for an unknown name.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |var| var.value)
    }

    /// Text value, or "" for an unknown name.
    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |var| var.string.as_str())
    }

    /// Register a cvar with a default, returning its index. Registering an
    /// existing name keeps its value and adds `flags` to it.
    pub fn get(&mut self, name: &str, default: &str, flags: CvarFlags) -> usize {
        if let Some(idx) = self.find_var_index(name) {
            self.cvar_vars[idx].flags.insert(flags);
            return idx;
        }

        self.cvar_vars.push(Cvar {
            name: name.to_owned(),
            string: default.to_owned(),
            latched_string: None,
            flags,
            modified: true,
            value: parse_value(default),
        });
        let idx = self.cvar_vars.len() - 1;
        self.by_name.insert(name.to_owned(), idx);
        idx
    }

    fn assign(&mut self, name: &str, value: &str, force: bool) -> usize {
        let Some(idx) = self.find_var_index(name) else {
            return self.get(name, value, CvarFlags::empty());
        };
        let var = &mut self.cvar_vars[idx];

        if force {
            var.latched_string = None;
        } else if var.flags.contains(CvarFlags::NOSET) {
            com_printf(&format!("{} is write protected.\n", name));
            return idx;
        } else if var.flags.contains(CvarFlags::LATCH) {
            if value != var.latched_string.as_deref().unwrap_or(&var.string) {
                com_printf(&format!("{} will be changed after a renderer restart.\n", name));
                var.latched_string = Some(value.to_string());
            }
            return idx;
        }

        if value != var.string {
            var.string = value.to_string();
            var.value = parse_value(value);
            var.modified = true;
        }
        idx
    }

    /// Set a cvar, honouring NOSET and LATCH.
    pub fn set(&mut self, name: &str, value: &str) -> usize {
        self.assign(name, value, false)
    }

    /// Set a cvar regardless of NOSET and LATCH; drops any pending latch.
    pub fn force_set(&mut self, name: &str, value: &str) -> usize {
        self.assign(name, value, true)
    }

    /// Set from a number. Whole numbers are stored without a fraction so
    /// `r_fxaa_preset 3` reads back as "3".
    pub fn set_value(&mut self, name: &str, value: f32) -> usize {
        let text = if value.fract() == 0.0 && value.abs() < i32::MAX as f32 {
            (value as i32).to_string()
        } else {
            value.to_string()
        };
        self.set(name, &text)
    }

    /// Promote pending latched values (called on renderer restart).
    pub fn get_latched_vars(&mut self) {
        for var in self.cvar_vars.iter_mut() {
            let Some(latched) = var.latched_string.take() else { continue };
            var.value = parse_value(&latched);
            var.string = latched;
            var.modified = true;
        }
    }

    /// Returns and clears the modified flag of a cvar.
    pub fn take_modified(&mut self, name: &str) -> bool {
        self.find_var_index(name)
            .map(|idx| std::mem::take(&mut self.cvar_vars[idx].modified))
            .unwrap_or(false)
    }
}

// ============================================================
// Process-wide registry
// ============================================================

static CVAR_CTX: Mutex<Option<CvarContext>> = const_mutex(None);

pub fn cvar_init() {
    *CVAR_CTX.lock() = Some(CvarContext::new());
}

pub fn cvar_shutdown() {
    *CVAR_CTX.lock() = None;
}

/// Access the global cvar context with a closure. Returns None if not initialized.
pub fn with_cvar_ctx<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut CvarContext) -> R,
{
    CVAR_CTX.lock().as_mut().map(f)
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CvarContext {
        let mut ctx = CvarContext::new();
        ctx.get("r_bloom_intensity", "25", CvarFlags::ARCHIVE);
        ctx.get("r_shaders_external", "0", CvarFlags::NOSET);
        ctx.get("r_postprocess", "1", CvarFlags::LATCH);
        ctx
    }

    #[test]
    fn test_values_and_lookup() {
        let mut ctx = registry();
        assert_eq!(ctx.variable_value("r_bloom_intensity"), 25.0);
        assert_eq!(ctx.variable_string("r_postprocess"), "1");
        assert_eq!(ctx.find_var_index("r_shaders_external"), Some(1));

        ctx.set("r_bloom_intensity", "80");
        assert_eq!(ctx.variable_value("r_bloom_intensity"), 80.0);

        assert_eq!(ctx.variable_value("r_missing"), 0.0);
        assert_eq!(ctx.variable_string("r_missing"), "");
    }

    #[test]
    fn test_reregister_keeps_value_adds_flags() {
        let mut ctx = registry();
        let idx = ctx.get("r_bloom_intensity", "100", CvarFlags::LATCH);
        assert_eq!(idx, 0);
        let var = &ctx.cvar_vars[idx];
        assert_eq!(var.string, "25");
        assert_eq!(var.flags, CvarFlags::ARCHIVE | CvarFlags::LATCH);
    }

    #[test]
    fn test_write_protected() {
        let mut ctx = registry();
        ctx.set("r_shaders_external", "1");
        assert_eq!(ctx.variable_value("r_shaders_external"), 0.0);
        ctx.force_set("r_shaders_external", "1");
        assert_eq!(ctx.variable_value("r_shaders_external"), 1.0);
    }

    #[test]
    fn test_set_value_formatting() {
        let mut ctx = CvarContext::new();
        ctx.set_value("r_fxaa_preset", 3.0);
        assert_eq!(ctx.variable_string("r_fxaa_preset"), "3");
        ctx.set_value("r_fxaa_preset", 0.5);
        assert_eq!(ctx.variable_string("r_fxaa_preset"), "0.5");
    }

    #[test]
    fn test_latched_until_restart() {
        let mut ctx = registry();
        ctx.set("r_postprocess", "0");
        assert_eq!(ctx.variable_string("r_postprocess"), "1");
        assert_eq!(ctx.find_var("r_postprocess").and_then(|v| v.latched_string.as_deref()), Some("0"));

        ctx.get_latched_vars();
        assert_eq!(ctx.variable_value("r_postprocess"), 0.0);
        assert!(ctx.cvar_vars[2].latched_string.is_none());
    }

    #[test]
    fn test_take_modified() {
        let mut ctx = registry();
        assert!(ctx.take_modified("r_bloom_intensity"));
        assert!(!ctx.take_modified("r_bloom_intensity"));

        ctx.set("r_bloom_intensity", "25");
        assert!(!ctx.take_modified("r_bloom_intensity"));
        ctx.set("r_bloom_intensity", "40");
        assert!(ctx.take_modified("r_bloom_intensity"));
        assert!(!ctx.take_modified("r_missing"));
    }
}
