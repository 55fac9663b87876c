//! GPU device interface
//!
//! The renderer never talks to the graphics API directly. Everything it needs
//! (shader objects, programs, uniforms, textures, framebuffers, a handful of
//! raster toggles and a textured quad) is expressed through [`GpuDevice`],
//! which a backend implements and passes into each operation.

// ============================================================================
// Handles
// ============================================================================

/// A compiled shader stage object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderObjectId(pub u32);

/// A linked program object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// A 2D texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// A framebuffer object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

// ============================================================================
// Enums and small value types
// ============================================================================

/// Programmable pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 3] = [ShaderStage::Vertex, ShaderStage::Fragment, ShaderStage::Geometry];

    pub fn index(self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Fragment => 1,
            ShaderStage::Geometry => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "Vertex",
            ShaderStage::Fragment => "Fragment",
            ShaderStage::Geometry => "Geometry",
        }
    }
}

/// Where draws land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawTarget {
    /// The default framebuffer.
    Screen,
    Framebuffer(FramebufferId),
}

/// Attachment points on the bound framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    Color(u32),
    Depth,
}

/// Result of a completeness check on the bound framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    IncompleteAttachment,
    MissingAttachment,
    Unsupported,
}

bitflags::bitflags! {
    /// Buffers cleared by [`GpuDevice::clear`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ClearMask: u32 {
        const COLOR = 0x1;
        const DEPTH = 0x2;
    }
}

/// Fixed-function state the post passes switch off while they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterToggle {
    DepthTest,
    DepthWrite,
    Lighting,
    Blend,
    CullFace,
    ScissorTest,
}

impl RasterToggle {
    /// Toggles captured and restored around post-processing.
    pub const POST_PASS: [RasterToggle; 5] = [
        RasterToggle::DepthTest,
        RasterToggle::DepthWrite,
        RasterToggle::Lighting,
        RasterToggle::Blend,
        RasterToggle::CullFace,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Alpha,
    Additive,
}

/// Snapshot of the [`RasterToggle::POST_PASS`] toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterState {
    enabled: [bool; 5],
}

impl RasterState {
    /// Force every post-pass toggle to `enabled`, returning what was there before.
    pub fn override_all(device: &mut dyn GpuDevice, enabled: bool) -> Self {
        let mut state = Self { enabled: [false; 5] };
        for (slot, toggle) in state.enabled.iter_mut().zip(RasterToggle::POST_PASS) {
            *slot = device.set_toggle(toggle, enabled);
        }
        state
    }

    pub fn restore(&self, device: &mut dyn GpuDevice) {
        for (&on, toggle) in self.enabled.iter().zip(RasterToggle::POST_PASS) {
            device.set_toggle(toggle, on);
        }
    }

    pub fn is_enabled(&self, toggle: RasterToggle) -> bool {
        RasterToggle::POST_PASS
            .iter()
            .position(|&t| t == toggle)
            .map_or(false, |i| self.enabled[i])
    }
}

/// A screen-aligned textured quad, in normalized device coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexturedQuad {
    pub x1: f32,
    pub y1: f32,
    pub u1: f32,
    pub v1: f32,
    pub x2: f32,
    pub y2: f32,
    pub u2: f32,
    pub v2: f32,
}

impl TexturedQuad {
    /// Covers the whole target, sampling `[0, u_scale] x [0, v_scale]`.
    pub fn fullscreen(u_scale: f32, v_scale: f32) -> Self {
        Self { x1: -1.0, y1: -1.0, u1: 0.0, v1: 0.0, x2: 1.0, y2: 1.0, u2: u_scale, v2: v_scale }
    }
}

/// Output of a successful compile or link: the handle plus any warnings.
#[derive(Debug, Clone)]
pub struct BuildOutput<T> {
    pub handle: T,
    pub log: String,
}

/// What the device can do. Queried once at init.
#[derive(Debug, Clone)]
pub struct GpuCaps {
    /// Shading-language version times 100 (1.30 -> 130).
    pub glsl_version: u32,
    /// API version times 10 (2.0 -> 20).
    pub api_version: u32,
    pub max_renderbuffer_size: u32,
    pub npot_textures: bool,
    pub framebuffer_objects: bool,
}

impl Default for GpuCaps {
    fn default() -> Self {
        Self {
            glsl_version: 130,
            api_version: 30,
            max_renderbuffer_size: 4096,
            npot_textures: true,
            framebuffer_objects: true,
        }
    }
}

// ============================================================================
// Device trait
// ============================================================================

/// The graphics API as seen by the renderer.
///
/// Uniform and attribute locations are per program; `-1`-style "not found"
/// results come back as `None`.
pub trait GpuDevice {
    fn caps(&self) -> &GpuCaps;

    // ---- shaders ----

    /// Compile one stage. `Err` carries the compiler log.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<BuildOutput<ShaderObjectId>, String>;
    fn delete_shader(&mut self, shader: ShaderObjectId);
    /// Link compiled stages. `Err` carries the linker log.
    fn link_program(&mut self, stages: &[ShaderObjectId]) -> Result<BuildOutput<ProgramId>, String>;
    fn delete_program(&mut self, program: ProgramId);
    fn use_program(&mut self, program: Option<ProgramId>);
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<i32>;
    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<i32>;

    // Uploads target the given location of the current program.
    fn uniform_1i(&mut self, location: i32, value: i32);
    fn uniform_1f(&mut self, location: i32, value: f32);
    fn uniform_2f(&mut self, location: i32, value: [f32; 2]);
    fn uniform_3f(&mut self, location: i32, value: [f32; 3]);
    /// Column-major.
    fn uniform_matrix4(&mut self, location: i32, value: &[f32; 16]);

    // ---- textures ----

    /// RGBA8, linear filtering, clamped to edge.
    fn create_texture(&mut self, width: u32, height: u32) -> TextureId;
    fn delete_texture(&mut self, texture: TextureId);
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);

    // ---- framebuffers ----

    fn create_framebuffer(&mut self) -> FramebufferId;
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    fn bind_framebuffer(&mut self, target: DrawTarget);
    /// Attach to (or with `None`, detach from) the bound framebuffer.
    fn attach_texture(&mut self, attachment: Attachment, texture: Option<TextureId>);
    fn check_framebuffer(&mut self) -> FramebufferStatus;
    fn draw_buffers(&mut self, count: u32);

    // ---- raster ----

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32);
    fn clear(&mut self, mask: ClearMask);
    /// Returns the previous value.
    fn set_toggle(&mut self, toggle: RasterToggle, enabled: bool) -> bool;
    fn blend_mode(&mut self, mode: BlendMode);
    fn draw_textured_quad(&mut self, quad: &TexturedQuad);
}
