//! Feature flags and per-feature uniform tables
//!
//! A shader variant is keyed by a [`ShaderFlags`] word (model and particle
//! shaders) or an [`EffectFlags`] word (post-processing composite shaders).
//! Each feature bit maps to a preprocessor define and to the uniforms the
//! variant must register once it links.

use std::fmt;

bitflags::bitflags! {
    /// Rendering features a model or particle shader is built with.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ShaderFlags: u32 {
        const LIGHT       = 1 << 0;
        const FOG         = 1 << 1;
        const DIFFUSE_MAP = 1 << 2;
        const GLOW_MAP    = 1 << 3;
        const SPEC_MAP    = 1 << 4;
        const NORMAL_MAP  = 1 << 5;
        const HEIGHT_MAP  = 1 << 6;
        const ENV_MAP     = 1 << 7;
        const ANIMATED    = 1 << 8;
        const SOFT_QUAD   = 1 << 9;
        const DISTORTION  = 1 << 10;
        const MISC_MAP    = 1 << 11;
        const TEAMCOLOR   = 1 << 12;
        const THRUSTER    = 1 << 13;
    }
}

/// Preprocessor define per feature bit. Soft particles select a different
/// source file instead of a define.
const FEATURE_DEFINES: &[(ShaderFlags, &str)] = &[
    (ShaderFlags::LIGHT, "FLAG_LIGHT"),
    (ShaderFlags::FOG, "FLAG_FOG"),
    (ShaderFlags::DIFFUSE_MAP, "FLAG_DIFFUSE_MAP"),
    (ShaderFlags::GLOW_MAP, "FLAG_GLOW_MAP"),
    (ShaderFlags::SPEC_MAP, "FLAG_SPEC_MAP"),
    (ShaderFlags::NORMAL_MAP, "FLAG_NORMAL_MAP"),
    (ShaderFlags::HEIGHT_MAP, "FLAG_HEIGHT_MAP"),
    (ShaderFlags::ENV_MAP, "FLAG_ENV_MAP"),
    (ShaderFlags::ANIMATED, "FLAG_ANIMATED"),
    (ShaderFlags::DISTORTION, "FLAG_DISTORTION"),
    (ShaderFlags::MISC_MAP, "FLAG_MISC_MAP"),
    (ShaderFlags::TEAMCOLOR, "FLAG_TEAMCOLOR"),
    (ShaderFlags::THRUSTER, "FLAG_THRUSTER"),
];

impl ShaderFlags {
    /// Defines for every set bit, lowest bit first.
    pub fn defines(self) -> impl Iterator<Item = &'static str> {
        FEATURE_DEFINES.iter().filter(move |(f, _)| self.contains(*f)).map(|(_, d)| *d)
    }

    /// The highest-order set bit, if any.
    pub fn highest_bit(self) -> Option<ShaderFlags> {
        if self.is_empty() {
            None
        } else {
            ShaderFlags::from_bits(1 << (31 - self.bits().leading_zeros()))
        }
    }

    pub fn is_particle(self) -> bool {
        self.contains(ShaderFlags::SOFT_QUAD)
    }

    /// Source files (vertex, fragment) the variant is built from.
    pub fn source_files(self) -> (&'static str, &'static str) {
        if self.is_particle() {
            ("soft-v.sdr", "soft-f.sdr")
        } else {
            ("main-v.sdr", "main-f.sdr")
        }
    }
}

/// Uniforms and attributes a feature needs.
#[derive(Debug)]
pub struct UniformReference {
    pub flags: ShaderFlags,
    pub uniforms: &'static [&'static str],
    pub attributes: &'static [&'static str],
    pub name: &'static str,
}

/// Main (model) shaders: one row per feature bit, applied for every set bit.
pub const MAIN_UNIFORMS: &[UniformReference] = &[
    UniformReference { flags: ShaderFlags::LIGHT, uniforms: &["n_lights"], attributes: &[], name: "Lighting" },
    UniformReference { flags: ShaderFlags::FOG, uniforms: &[], attributes: &[], name: "Fog Effect" },
    UniformReference {
        flags: ShaderFlags::DIFFUSE_MAP,
        uniforms: &["sBasemap", "desaturate", "desaturate_r", "desaturate_g", "desaturate_b"],
        attributes: &[],
        name: "Diffuse Mapping",
    },
    UniformReference { flags: ShaderFlags::GLOW_MAP, uniforms: &["sGlowmap"], attributes: &[], name: "Glow Mapping" },
    UniformReference { flags: ShaderFlags::SPEC_MAP, uniforms: &["sSpecmap"], attributes: &[], name: "Specular Mapping" },
    UniformReference { flags: ShaderFlags::NORMAL_MAP, uniforms: &["sNormalmap"], attributes: &[], name: "Normal Mapping" },
    UniformReference { flags: ShaderFlags::HEIGHT_MAP, uniforms: &["sHeightmap"], attributes: &[], name: "Parallax Mapping" },
    UniformReference {
        flags: ShaderFlags::ENV_MAP,
        uniforms: &["sEnvmap", "alpha_spec", "envMatrix"],
        attributes: &[],
        name: "Environment Mapping",
    },
    UniformReference {
        flags: ShaderFlags::ANIMATED,
        uniforms: &["sFramebuffer", "effect_num", "anim_timer", "vpwidth", "vpheight"],
        attributes: &[],
        name: "Animated Effects",
    },
    UniformReference { flags: ShaderFlags::MISC_MAP, uniforms: &["sMiscmap"], attributes: &[], name: "Misc Map" },
    UniformReference {
        flags: ShaderFlags::TEAMCOLOR,
        uniforms: &["stripe_color", "base_color"],
        attributes: &[],
        name: "Team Colors",
    },
    UniformReference { flags: ShaderFlags::THRUSTER, uniforms: &["thruster_scale"], attributes: &[], name: "Thruster scaling" },
];

/// Particle shaders: matched by exact flag-word equality.
pub const PARTICLE_UNIFORMS: &[UniformReference] = &[
    UniformReference {
        flags: ShaderFlags::SOFT_QUAD.union(ShaderFlags::DISTORTION),
        uniforms: &["baseMap", "window_width", "window_height", "distMap", "frameBuffer", "use_offset"],
        attributes: &["offset_in"],
        name: "Distorted Particles",
    },
    UniformReference {
        flags: ShaderFlags::SOFT_QUAD,
        uniforms: &["baseMap", "depthMap", "window_width", "window_height", "nearZ", "farZ"],
        attributes: &["radius_in"],
        name: "Depth-blended Particles",
    },
];

/// The rows that apply to a variant with `flags`.
pub fn uniform_references(flags: ShaderFlags) -> Vec<&'static UniformReference> {
    if flags.is_particle() {
        PARTICLE_UNIFORMS.iter().filter(|r| r.flags == flags).collect()
    } else {
        MAIN_UNIFORMS.iter().filter(|r| flags.contains(r.flags)).collect()
    }
}

/// Human-readable variant description for the log.
pub fn describe(flags: ShaderFlags) -> String {
    let refs = uniform_references(flags);
    if refs.is_empty() {
        return if flags.is_particle() { "Particles".into() } else { "Base".into() };
    }
    refs.iter().map(|r| r.name).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// Post-processing effect word
// ============================================================================

/// Maximum number of post-processing effects; one bit each in [`EffectFlags`].
pub const MAX_POST_EFFECTS: usize = 32;

/// Which post-processing effects a composite shader variant is built with.
/// Bit `i` is the effect at index `i` of the effect table.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EffectFlags(u32);

impl EffectFlags {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn contains_index(self, index: usize) -> bool {
        index < MAX_POST_EFFECTS && self.0 & (1 << index) != 0
    }

    pub fn set_index(&mut self, index: usize, on: bool) {
        if index >= MAX_POST_EFFECTS {
            return;
        }
        if on {
            self.0 |= 1 << index;
        } else {
            self.0 &= !(1 << index);
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.set_index(index, true);
        self
    }

    /// Set indices, lowest first.
    pub fn indices(self) -> impl Iterator<Item = usize> {
        (0..MAX_POST_EFFECTS).filter(move |&i| self.contains_index(i))
    }
}

impl fmt::Debug for EffectFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EffectFlags({:#010x})", self.0)
    }
}
