//! Light shafts
//!
//! Screen-space crepuscular rays from the sun. Only lights that have a glare
//! and sit close enough to the view direction qualify, and only the first
//! qualifying light is drawn.

use std::f32::consts::PI;

/// Minimum cosine between a light and the view direction for a shaft.
pub const GLARE_DOT_THRESHOLD: f32 = 0.7;

/// Tuning for the light-shaft pass, from the `#Light Shafts` table section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightShaftParams {
    pub on: bool,
    pub density: f32,
    pub falloff: f32,
    pub weight: f32,
    pub intensity: f32,
    pub sample_count: u32,
}

impl Default for LightShaftParams {
    fn default() -> Self {
        Self { on: false, density: 0.5, falloff: 1.0, weight: 0.02, intensity: 0.5, sample_count: 50 }
    }
}

impl LightShaftParams {
    /// Total weight of the march, scaled by intensity; used for the
    /// cockpit-occluded part of the shaft.
    pub fn cockpit_intensity(&self) -> f32 {
        let mut cp = self.weight;
        let mut decay = 1.0f32;
        for _ in 1..self.sample_count {
            decay *= self.falloff;
            cp += self.weight * decay;
        }
        cp * self.intensity
    }
}

/// Orthonormal view basis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeBasis {
    pub rvec: [f32; 3],
    pub uvec: [f32; 3],
    pub fvec: [f32; 3],
}

impl Default for EyeBasis {
    fn default() -> Self {
        Self { rvec: [1.0, 0.0, 0.0], uvec: [0.0, 1.0, 0.0], fvec: [0.0, 0.0, 1.0] }
    }
}

/// A global directional light, pointing from the scene toward the light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: [f32; 3],
    pub has_glare: bool,
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// The first glaring light within the acceptance cone.
pub fn find_shaft_light<'a>(lights: &'a [DirectionalLight], eye: &EyeBasis) -> Option<&'a DirectionalLight> {
    lights
        .iter()
        .filter(|l| l.has_glare)
        .find(|l| dot(l.direction, eye.fvec) > GLARE_DOT_THRESHOLD)
}

/// Texture-space position of the light for the radial blur.
pub fn sun_screen_position(direction: [f32; 3], eye: &EyeBasis, clip_aspect: f32) -> [f32; 2] {
    let x = dot(direction, eye.rvec).clamp(-1.0, 1.0).asin() / PI * 1.5 + 0.5;
    let y = dot(direction, eye.uvec).clamp(-1.0, 1.0).asin() / PI * 1.5 * clip_aspect + 0.5;
    [x, y]
}
