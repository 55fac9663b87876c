//! Source preamble
//!
//! Every stage is compiled with a generated header in front of its body: the
//! language version, the shader model and one `#define` per enabled feature.

use super::flags::ShaderFlags;
use crate::modern::gpu_device::GpuCaps;

/// Coarse capability level exposed to shader sources as `SHADER_MODEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShaderModel(pub u32);

impl ShaderModel {
    pub fn from_caps(caps: &GpuCaps) -> Self {
        match caps.glsl_version {
            v if v >= 130 => ShaderModel(4),
            v if v >= 120 => ShaderModel(3),
            _ => ShaderModel(2),
        }
    }

    fn version_line(self) -> &'static str {
        match self.0 {
            4 => "#version 130",
            3 => "#version 120",
            _ => "#version 110",
        }
    }
}

/// Anti-aliasing quality preset, clamped to 0..=9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FxaaPreset(u8);

struct FxaaQuality {
    preset: u32,
    edge_threshold: &'static str,
    edge_threshold_min: &'static str,
}

const FXAA_SUBPIX: &str = "0.33";

const FXAA_QUALITY: [FxaaQuality; 10] = [
    FxaaQuality { preset: 10, edge_threshold: "(1.0/6.0)", edge_threshold_min: "(1.0/12.0)" },
    FxaaQuality { preset: 11, edge_threshold: "(1.0/7.0)", edge_threshold_min: "(1.0/14.0)" },
    FxaaQuality { preset: 12, edge_threshold: "(1.0/8.0)", edge_threshold_min: "(1.0/16.0)" },
    FxaaQuality { preset: 13, edge_threshold: "(1.0/9.0)", edge_threshold_min: "(1.0/18.0)" },
    FxaaQuality { preset: 14, edge_threshold: "(1.0/10.0)", edge_threshold_min: "(1.0/20.0)" },
    FxaaQuality { preset: 25, edge_threshold: "(1.0/11.0)", edge_threshold_min: "(1.0/22.0)" },
    FxaaQuality { preset: 26, edge_threshold: "(1.0/12.0)", edge_threshold_min: "(1.0/24.0)" },
    FxaaQuality { preset: 27, edge_threshold: "(1.0/13.0)", edge_threshold_min: "(1.0/26.0)" },
    FxaaQuality { preset: 28, edge_threshold: "(1.0/14.0)", edge_threshold_min: "(1.0/28.0)" },
    FxaaQuality { preset: 39, edge_threshold: "(1.0/15.0)", edge_threshold_min: "(1.0/32.0)" },
];

impl FxaaPreset {
    pub const MAX: u8 = 9;

    pub fn new(preset: i32) -> Self {
        FxaaPreset(preset.clamp(0, Self::MAX as i32) as u8)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// The `FXAA_QUALITY__PRESET` value this preset selects.
    pub fn quality_preset(self) -> u32 {
        FXAA_QUALITY[self.0 as usize].preset
    }

    fn push_defines(self, out: &mut Vec<String>) {
        let q = &FXAA_QUALITY[self.0 as usize];
        out.push(format!("FXAA_QUALITY__PRESET {}", q.preset));
        out.push(format!("FXAA_QUALITY__SUBPIX {}", FXAA_SUBPIX));
        out.push(format!("FXAA_QUALITY__EDGE_THRESHOLD {}", q.edge_threshold));
        out.push(format!("FXAA_QUALITY__EDGE_THRESHOLD_MIN {}", q.edge_threshold_min));
        if self.0 == 7 {
            out.push("FXAA_PC 1".into());
        }
    }
}

impl Default for FxaaPreset {
    fn default() -> Self {
        FxaaPreset(6)
    }
}

/// Builder for the text prepended to each stage.
#[derive(Debug, Clone)]
pub struct Preamble {
    model: ShaderModel,
    defines: Vec<String>,
}

impl Preamble {
    pub fn new(model: ShaderModel) -> Self {
        Self { model, defines: Vec::new() }
    }

    /// `FLAG_*` for every feature bit.
    pub fn features(mut self, flags: ShaderFlags) -> Self {
        self.defines.extend(flags.defines().map(str::to_string));
        self
    }

    /// A bare define, as named by an effect table entry.
    pub fn define(mut self, name: &str) -> Self {
        self.defines.push(name.to_string());
        self
    }

    /// `PASS_0` / `PASS_1` for the separable blur.
    pub fn blur_pass(self, pass: u32) -> Self {
        self.define(&format!("PASS_{}", pass))
    }

    /// Loop length of the light-shaft march.
    pub fn sample_count(self, samples: u32) -> Self {
        self.define(&format!("SAMPLE_NUM {}", samples))
    }

    pub fn fxaa(mut self, preset: FxaaPreset) -> Self {
        let glsl = if self.model.0 >= 4 { "FXAA_GLSL_130 1" } else { "FXAA_GLSL_120 1" };
        self.defines.push(glsl.into());
        preset.push_defines(&mut self.defines);
        self
    }

    pub fn build(&self) -> String {
        let mut out = String::with_capacity(64 + self.defines.len() * 32);
        out.push_str(self.model.version_line());
        out.push('\n');
        out.push_str(&format!("#define SHADER_MODEL {}\n", self.model.0));
        for d in &self.defines {
            out.push_str("#define ");
            out.push_str(d);
            out.push('\n');
        }
        out
    }
}
