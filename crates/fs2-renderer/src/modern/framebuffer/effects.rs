//! Post-processing effect configuration
//!
//! The effect table declares the optional composite effects in order; an
//! effect's position is its bit in [`EffectFlags`]. Intensities are mutable at
//! runtime and decide which bits are active.

use fs2_common::common::{com_dprintf, com_wprintf};

use super::effect_table::{self, TableParseError};
use super::light_shafts::LightShaftParams;
use crate::modern::shader::animated::{AnimatedEffect, AnimatedEffectState};
use crate::modern::shader::flags::{EffectFlags, MAX_POST_EFFECTS};

/// Effect name that controls light shafts instead of a table entry.
pub const LIGHT_SHAFTS_EFFECT: &str = "lightshafts";

/// One table-declared composite effect.
#[derive(Debug, Clone, PartialEq)]
pub struct PostEffect {
    pub name: String,
    pub uniform_name: String,
    pub define_name: String,
    pub intensity: f32,
    pub default_intensity: f32,
    pub div: f32,
    pub add: f32,
    pub always_on: bool,
}

impl PostEffect {
    pub fn new(
        name: String,
        uniform_name: String,
        define_name: String,
        always_on: bool,
        default_intensity: f32,
        div: f32,
        add: f32,
    ) -> Self {
        Self {
            name,
            uniform_name,
            define_name,
            intensity: default_intensity,
            default_intensity,
            div,
            add,
            always_on,
        }
    }

    /// Whether this effect's bit belongs in the active flag word.
    pub fn is_active(&self) -> bool {
        self.always_on || self.intensity != self.default_intensity
    }
}

/// An animated model effect selectable by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipEffect {
    pub name: String,
    pub shader_effect: i32,
    /// The ship itself is not drawn while the effect runs.
    pub disables_rendering: bool,
    /// Timer counts down instead of up.
    pub invert_timer: bool,
}

impl ShipEffect {
    /// Animation state `elapsed` seconds into an effect lasting `duration`.
    pub fn animation_state(&self, elapsed: f32, duration: f32) -> AnimatedEffectState {
        let effect = AnimatedEffect::from_id(self.shader_effect);
        let timer = if self.invert_timer { (duration - elapsed).max(0.0) } else { elapsed };
        AnimatedEffectState { effect, timer }
    }
}

fn builtin_ship_effects() -> Vec<ShipEffect> {
    vec![ShipEffect {
        name: "FS1 Ship select".into(),
        shader_effect: AnimatedEffect::LoadoutSelectFs1.id(),
        disables_rendering: false,
        invert_timer: false,
    }]
}

/// Result of [`EffectConfiguration::set_effect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectChange {
    /// Light-shaft toggle/intensity changed.
    LightShafts,
    /// The effect at this index changed.
    Effect(usize),
    /// No effect has that name.
    Unknown,
}

/// What a successful load kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub effects: usize,
    pub discarded: usize,
    pub ship_effects: usize,
}

#[derive(Debug, Clone)]
pub struct EffectConfiguration {
    effects: Vec<PostEffect>,
    ship_effects: Vec<ShipEffect>,
    light_shafts: LightShaftParams,
    flags: EffectFlags,
}

impl Default for EffectConfiguration {
    fn default() -> Self {
        Self {
            effects: Vec::new(),
            ship_effects: builtin_ship_effects(),
            light_shafts: LightShaftParams::default(),
            flags: EffectFlags::empty(),
        }
    }
}

impl EffectConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configuration with the contents of `text`.
    ///
    /// On error the current configuration is kept as it was. Effects past
    /// the 32nd are dropped with a warning.
    pub fn load(&mut self, text: &str) -> Result<LoadSummary, TableParseError> {
        let table = effect_table::parse(text)?;

        let mut effects = table.effects;
        let discarded = effects.len().saturating_sub(MAX_POST_EFFECTS);
        if discarded > 0 {
            com_wprintf(&format!(
                "Post-processing table declares {} effects; only the first {} are used\n",
                effects.len(),
                MAX_POST_EFFECTS
            ));
            effects.truncate(MAX_POST_EFFECTS);
        }

        let mut ship_effects = builtin_ship_effects();
        ship_effects.extend(table.ship_effects);

        self.effects = effects;
        self.ship_effects = ship_effects;
        self.light_shafts = table.light_shafts.unwrap_or_default();
        self.flags = self.derive_flags();

        com_dprintf(&format!(
            "Loaded {} post-processing effect(s), {} ship effect(s)\n",
            self.effects.len(),
            self.ship_effects.len()
        ));
        Ok(LoadSummary { effects: self.effects.len(), discarded, ship_effects: self.ship_effects.len() })
    }

    pub fn effects(&self) -> &[PostEffect] {
        &self.effects
    }

    pub fn effect(&self, index: usize) -> Option<&PostEffect> {
        self.effects.get(index)
    }

    /// Effect names in table order, for settings UIs.
    pub fn effect_names(&self) -> Vec<&str> {
        self.effects.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn ship_effects(&self) -> &[ShipEffect] {
        &self.ship_effects
    }

    pub fn find_ship_effect(&self, name: &str) -> Option<&ShipEffect> {
        self.ship_effects.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn light_shafts(&self) -> &LightShaftParams {
        &self.light_shafts
    }

    /// The active flag word, kept current by every mutation.
    pub fn active_flags(&self) -> EffectFlags {
        self.flags
    }

    /// Always-on bits only; the word the baseline composite is built with.
    pub fn always_on_flags(&self) -> EffectFlags {
        let mut flags = EffectFlags::empty();
        for (i, e) in self.effects.iter().enumerate() {
            flags.set_index(i, e.always_on);
        }
        flags
    }

    /// Recompute the active word from the current intensities.
    pub fn derive_flags(&self) -> EffectFlags {
        let mut flags = EffectFlags::empty();
        for (i, e) in self.effects.iter().enumerate() {
            flags.set_index(i, e.is_active());
        }
        flags
    }

    /// Set an effect from a raw settings value. Names match case-insensitively.
    ///
    /// The light-shaft name toggles light shafts and sets their intensity to
    /// `raw / 100`; table effects store `raw / div + add`.
    pub fn set_effect(&mut self, name: &str, raw: i32) -> EffectChange {
        if name.eq_ignore_ascii_case(LIGHT_SHAFTS_EFFECT) {
            self.light_shafts.intensity = raw as f32 / 100.0;
            self.light_shafts.on = raw != 0;
            return EffectChange::LightShafts;
        }

        let Some(index) = self.effects.iter().position(|e| e.name.eq_ignore_ascii_case(name)) else {
            return EffectChange::Unknown;
        };
        let effect = &mut self.effects[index];
        effect.intensity = raw as f32 / effect.div + effect.add;
        let active = effect.is_active();
        self.flags.set_index(index, active);
        EffectChange::Effect(index)
    }

    /// Every intensity back to its table default.
    pub fn reset_to_defaults(&mut self) {
        for e in &mut self.effects {
            e.intensity = e.default_intensity;
        }
        self.flags = self.derive_flags();
    }

    /// Forget the table. Light-shaft parameters return to their defaults.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fs2_common::common::{com_begin_redirect, com_end_redirect};

    fn record(name: &str, always_on: bool, default: f32, div: f32) -> String {
        format!(
            "$Name: {name}\n$Uniform: u_{name}\n$Define: FLAG_{name}\n$AlwaysOn: {}\n$Default: {default}\n$Div: {div}\n$Add: 0\n",
            if always_on { "yes" } else { "no" }
        )
    }

    fn table(records: &[String]) -> String {
        format!("#Effects\n{}#End\n", records.concat())
    }

    #[test]
    fn test_overflow_keeps_first_32() {
        let records: Vec<String> = (0..33).map(|i| record(&format!("e{}", i), false, 0.0, 1.0)).collect();
        let mut cfg = EffectConfiguration::new();
        com_begin_redirect();
        let summary = cfg.load(&table(&records)).unwrap();
        let console = com_end_redirect().unwrap_or_default();
        assert_eq!(summary.effects, 32);
        assert_eq!(summary.discarded, 1);
        assert_eq!(cfg.effect_names().last(), Some(&"e31"));
        assert!(console.contains("declares 33 effects; only the first 32 are used"));
    }

    #[test]
    fn test_set_effect_scales_and_resets() {
        let mut cfg = EffectConfiguration::new();
        cfg.load(&table(&[record("bloom_x", false, 0.5, 100.0)])).unwrap();

        assert_eq!(cfg.set_effect("BLOOM_X", 150), EffectChange::Effect(0));
        assert_eq!(cfg.effect(0).unwrap().intensity, 1.5);
        assert!(cfg.active_flags().contains_index(0));

        cfg.reset_to_defaults();
        assert_eq!(cfg.effect(0).unwrap().intensity, 0.5);
        assert_eq!(cfg.active_flags(), EffectFlags::empty());
    }

    #[test]
    fn test_setting_default_value_clears_bit() {
        let mut cfg = EffectConfiguration::new();
        cfg.load(&table(&[record("saturation", false, 1.0, 100.0)])).unwrap();
        cfg.set_effect("saturation", 50);
        assert!(cfg.active_flags().contains_index(0));
        cfg.set_effect("saturation", 100);
        assert!(!cfg.active_flags().contains_index(0));
    }

    #[test]
    fn test_reset_keeps_always_on_bits() {
        let mut cfg = EffectConfiguration::new();
        cfg.load(&table(&[
            record("a", false, 0.0, 1.0),
            record("b", true, 0.0, 1.0),
            record("c", false, 0.0, 1.0),
        ]))
        .unwrap();
        cfg.set_effect("a", 3);
        cfg.set_effect("c", 3);
        cfg.reset_to_defaults();
        assert_eq!(cfg.active_flags(), EffectFlags::empty().with_index(1));
        assert_eq!(cfg.active_flags(), cfg.always_on_flags());
        assert_eq!(cfg.derive_flags(), cfg.active_flags());
    }

    #[test]
    fn test_unknown_and_lightshafts() {
        let mut cfg = EffectConfiguration::new();
        cfg.load(&table(&[record("a", false, 0.0, 1.0)])).unwrap();
        assert_eq!(cfg.set_effect("nope", 5), EffectChange::Unknown);
        assert_eq!(cfg.active_flags(), EffectFlags::empty());

        assert_eq!(cfg.set_effect("LightShafts", 40), EffectChange::LightShafts);
        assert!(cfg.light_shafts().on);
        assert!((cfg.light_shafts().intensity - 0.4).abs() < 1e-6);
        cfg.set_effect("lightshafts", 0);
        assert!(!cfg.light_shafts().on);
    }

    #[test]
    fn test_failed_load_keeps_previous() {
        let mut cfg = EffectConfiguration::new();
        cfg.load(&table(&[record("a", false, 0.0, 1.0)])).unwrap();
        cfg.set_effect("a", 2);
        assert!(cfg.load("#Effects\n$Name: broken\n").is_err());
        assert_eq!(cfg.effect_names(), vec!["a"]);
        assert_eq!(cfg.effect(0).unwrap().intensity, 2.0);
    }

    #[test]
    fn test_builtin_ship_effect_first() {
        let mut cfg = EffectConfiguration::new();
        cfg.load("#Ship Effects\n$Name: Cloak\n$Shader Effect: 2\n$Disables Rendering: no\n$Invert timer: yes\n#End")
            .unwrap();
        assert_eq!(cfg.ship_effects()[0].name, "FS1 Ship select");
        let cloak = cfg.find_ship_effect("cloak").unwrap();
        let state = cloak.animation_state(0.5, 2.0);
        assert_eq!(state.effect, AnimatedEffect::Cloak);
        assert_eq!(state.timer, 1.5);
        assert_eq!(cfg.ship_effects()[0].animation_state(0.5, 2.0).timer, 0.5);
        assert_eq!(cfg.light_shafts(), &LightShaftParams::default());
    }

    #[test]
    fn test_table_declared_effect_id() {
        let mut cfg = EffectConfiguration::new();
        cfg.load("#Ship Effects\n$Name: Warp shimmer\n$Shader Effect: 5\n$Disables Rendering: yes\n$Invert timer: no\n#End")
            .unwrap();
        let shimmer = cfg.find_ship_effect("warp shimmer").unwrap();
        assert!(shimmer.disables_rendering);
        let state = shimmer.animation_state(0.75, 2.0);
        assert_eq!(state.effect, AnimatedEffect::Other(5));
        assert_eq!(state.effect.id(), 5);
        assert_eq!(state.timer, 0.75);
    }

    #[test]
    fn test_builtin_table_loads() {
        let mut cfg = EffectConfiguration::new();
        let text = crate::modern::shader::loader::ShaderLoader::builtin().effect_table();
        let summary = cfg.load(&text).unwrap();
        assert!(summary.effects > 0);
        assert_eq!(summary.discarded, 0);
        assert_eq!(cfg.active_flags(), cfg.always_on_flags());
    }
}
