//! Headless recording device
//!
//! A [`GpuDevice`] that keeps no pixels. It tracks object lifetimes, records
//! every call in order and can be told to fail compiles, links or framebuffer
//! checks. Uniform and attribute locations are derived from the declarations
//! in the submitted sources, so a name the shader never declares is not found,
//! like on a real driver.

use std::collections::HashMap;

use super::gpu_device::{
    Attachment, BlendMode, BuildOutput, ClearMask, DrawTarget, FramebufferId, FramebufferStatus,
    GpuCaps, GpuDevice, ProgramId, RasterToggle, ShaderObjectId, ShaderStage, TextureId, TexturedQuad,
};
use super::shader::uniforms::UniformValue;

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CompileShader { stage: ShaderStage, source: String, ok: bool },
    DeleteShader(ShaderObjectId),
    LinkProgram { program: Option<ProgramId> },
    DeleteProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    Uniform { program: Option<ProgramId>, location: i32, value: UniformValue },
    CreateTexture { texture: TextureId, width: u32, height: u32 },
    DeleteTexture(TextureId),
    BindTexture { unit: u32, texture: Option<TextureId> },
    CreateFramebuffer(FramebufferId),
    DeleteFramebuffer(FramebufferId),
    BindFramebuffer(DrawTarget),
    AttachTexture { attachment: Attachment, texture: Option<TextureId> },
    CheckFramebuffer(FramebufferStatus),
    DrawBuffers(u32),
    Viewport { x: i32, y: i32, width: u32, height: u32 },
    Clear(ClearMask),
    SetToggle { toggle: RasterToggle, enabled: bool },
    BlendMode(BlendMode),
    DrawQuad(TexturedQuad),
}

struct ShaderRecord {
    stage: ShaderStage,
    uniforms: Vec<String>,
    attributes: Vec<String>,
}

#[derive(Default)]
struct ProgramRecord {
    uniforms: Vec<String>,
    attributes: Vec<String>,
}

/// Recording device for tests and offscreen tooling.
pub struct HeadlessDevice {
    caps: GpuCaps,
    next_handle: u32,
    shaders: HashMap<u32, ShaderRecord>,
    programs: HashMap<u32, ProgramRecord>,
    textures: HashMap<u32, (u32, u32)>,
    framebuffers: HashMap<u32, HashMap<Attachment, TextureId>>,
    bound_framebuffer: DrawTarget,
    current_program: Option<ProgramId>,
    toggles: HashMap<RasterToggle, bool>,
    /// Every call, in order.
    pub calls: Vec<DeviceCall>,
    /// Compiles fail when the source contains any of these strings.
    pub fail_compile_markers: Vec<String>,
    /// Every link fails.
    pub fail_link: bool,
    /// Every framebuffer check reports an incomplete attachment.
    pub incomplete_framebuffers: bool,
    /// Compiles succeed with this text as a warning log.
    pub compile_warning: Option<String>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::with_caps(GpuCaps::default())
    }

    pub fn with_caps(caps: GpuCaps) -> Self {
        Self {
            caps,
            next_handle: 1,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            bound_framebuffer: DrawTarget::Screen,
            current_program: None,
            toggles: HashMap::new(),
            calls: Vec::new(),
            fail_compile_markers: Vec::new(),
            fail_link: false,
            incomplete_framebuffers: false,
            compile_warning: None,
        }
    }

    /// Make every compile whose source contains `marker` fail.
    pub fn fail_compiles_containing(&mut self, marker: &str) {
        self.fail_compile_markers.push(marker.to_string());
    }

    fn alloc(&mut self) -> u32 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    pub fn live_shader_objects(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture.0).copied()
    }

    pub fn current_program(&self) -> Option<ProgramId> {
        self.current_program
    }

    pub fn bound_framebuffer(&self) -> DrawTarget {
        self.bound_framebuffer
    }

    pub fn toggle(&self, toggle: RasterToggle) -> bool {
        self.toggles.get(&toggle).copied().unwrap_or(false)
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Number of compile attempts whose source contains `marker`.
    pub fn compiles_containing(&self, marker: &str) -> usize {
        self.count(|c| matches!(c, DeviceCall::CompileShader { source, .. } if source.contains(marker)))
    }

    pub fn compile_count(&self) -> usize {
        self.count(|c| matches!(c, DeviceCall::CompileShader { .. }))
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn record_uniform(&mut self, location: i32, value: UniformValue) {
        self.calls.push(DeviceCall::Uniform { program: self.current_program, location, value });
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Names declared by `keyword` lines (`uniform vec3 a, b[4];`).
fn declared_names(source: &str, keyword: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in source.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix(keyword) else { continue };
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        let decl = rest.split(';').next().unwrap_or("");
        let mut tokens = decl.trim().splitn(2, char::is_whitespace);
        let mut ty = tokens.next().unwrap_or("");
        let mut tail = tokens.next().unwrap_or("");
        if matches!(ty, "lowp" | "mediump" | "highp") {
            let mut more = tail.trim().splitn(2, char::is_whitespace);
            ty = more.next().unwrap_or("");
            tail = more.next().unwrap_or("");
        }
        if ty.is_empty() {
            continue;
        }
        for name in tail.split(',') {
            let name = name.split('[').next().unwrap_or("").trim();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

impl GpuDevice for HeadlessDevice {
    fn caps(&self) -> &GpuCaps {
        &self.caps
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<BuildOutput<ShaderObjectId>, String> {
        let failing = self.fail_compile_markers.iter().find(|m| source.contains(m.as_str())).cloned();
        self.calls.push(DeviceCall::CompileShader { stage, source: source.to_string(), ok: failing.is_none() });
        if let Some(marker) = failing {
            return Err(format!("0:1: error: rejected source containing '{}'", marker));
        }

        let attributes = match stage {
            ShaderStage::Vertex => declared_names(source, "attribute"),
            _ => Vec::new(),
        };
        let id = self.alloc();
        self.shaders.insert(id, ShaderRecord { stage, uniforms: declared_names(source, "uniform"), attributes });
        Ok(BuildOutput { handle: ShaderObjectId(id), log: self.compile_warning.clone().unwrap_or_default() })
    }

    fn delete_shader(&mut self, shader: ShaderObjectId) {
        self.shaders.remove(&shader.0);
        self.calls.push(DeviceCall::DeleteShader(shader));
    }

    fn link_program(&mut self, stages: &[ShaderObjectId]) -> Result<BuildOutput<ProgramId>, String> {
        let has_vertex = stages
            .iter()
            .any(|s| self.shaders.get(&s.0).map_or(false, |r| r.stage == ShaderStage::Vertex));
        if self.fail_link || !has_vertex {
            self.calls.push(DeviceCall::LinkProgram { program: None });
            return Err("error: program has no valid vertex stage or linking was rejected".into());
        }

        let mut record = ProgramRecord::default();
        for stage in stages {
            if let Some(shader) = self.shaders.get(&stage.0) {
                for u in &shader.uniforms {
                    if !record.uniforms.contains(u) {
                        record.uniforms.push(u.clone());
                    }
                }
                for a in &shader.attributes {
                    if !record.attributes.contains(a) {
                        record.attributes.push(a.clone());
                    }
                }
            }
        }
        let id = self.alloc();
        self.programs.insert(id, record);
        self.calls.push(DeviceCall::LinkProgram { program: Some(ProgramId(id)) });
        Ok(BuildOutput { handle: ProgramId(id), log: String::new() })
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program.0);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.calls.push(DeviceCall::DeleteProgram(program));
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current_program = program;
        self.calls.push(DeviceCall::UseProgram(program));
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<i32> {
        let record = self.programs.get(&program.0)?;
        record.uniforms.iter().position(|u| u == name).map(|i| i as i32)
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<i32> {
        let record = self.programs.get(&program.0)?;
        record.attributes.iter().position(|a| a == name).map(|i| i as i32)
    }

    fn uniform_1i(&mut self, location: i32, value: i32) {
        self.record_uniform(location, UniformValue::Int(value));
    }

    fn uniform_1f(&mut self, location: i32, value: f32) {
        self.record_uniform(location, UniformValue::Float(value));
    }

    fn uniform_2f(&mut self, location: i32, value: [f32; 2]) {
        self.record_uniform(location, UniformValue::Vec2(value));
    }

    fn uniform_3f(&mut self, location: i32, value: [f32; 3]) {
        self.record_uniform(location, UniformValue::Vec3(value));
    }

    fn uniform_matrix4(&mut self, location: i32, value: &[f32; 16]) {
        self.record_uniform(location, UniformValue::Mat4(bytemuck::cast(*value)));
    }

    fn create_texture(&mut self, width: u32, height: u32) -> TextureId {
        let id = self.alloc();
        self.textures.insert(id, (width, height));
        self.calls.push(DeviceCall::CreateTexture { texture: TextureId(id), width, height });
        TextureId(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture.0);
        self.calls.push(DeviceCall::DeleteTexture(texture));
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        self.calls.push(DeviceCall::BindTexture { unit, texture });
    }

    fn create_framebuffer(&mut self) -> FramebufferId {
        let id = self.alloc();
        self.framebuffers.insert(id, HashMap::new());
        self.calls.push(DeviceCall::CreateFramebuffer(FramebufferId(id)));
        FramebufferId(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer.0);
        if self.bound_framebuffer == DrawTarget::Framebuffer(framebuffer) {
            self.bound_framebuffer = DrawTarget::Screen;
        }
        self.calls.push(DeviceCall::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&mut self, target: DrawTarget) {
        self.bound_framebuffer = target;
        self.calls.push(DeviceCall::BindFramebuffer(target));
    }

    fn attach_texture(&mut self, attachment: Attachment, texture: Option<TextureId>) {
        if let DrawTarget::Framebuffer(fb) = self.bound_framebuffer {
            if let Some(attachments) = self.framebuffers.get_mut(&fb.0) {
                match texture {
                    Some(t) => {
                        attachments.insert(attachment, t);
                    }
                    None => {
                        attachments.remove(&attachment);
                    }
                }
            }
        }
        self.calls.push(DeviceCall::AttachTexture { attachment, texture });
    }

    fn check_framebuffer(&mut self) -> FramebufferStatus {
        let status = match self.bound_framebuffer {
            DrawTarget::Screen => FramebufferStatus::Complete,
            _ if self.incomplete_framebuffers => FramebufferStatus::IncompleteAttachment,
            DrawTarget::Framebuffer(fb) => match self.framebuffers.get(&fb.0) {
                Some(a) if a.keys().any(|k| matches!(k, Attachment::Color(_))) => FramebufferStatus::Complete,
                Some(_) => FramebufferStatus::MissingAttachment,
                None => FramebufferStatus::Unsupported,
            },
        };
        self.calls.push(DeviceCall::CheckFramebuffer(status));
        status
    }

    fn draw_buffers(&mut self, count: u32) {
        self.calls.push(DeviceCall::DrawBuffers(count));
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.calls.push(DeviceCall::Viewport { x, y, width, height });
    }

    fn clear(&mut self, mask: ClearMask) {
        self.calls.push(DeviceCall::Clear(mask));
    }

    fn set_toggle(&mut self, toggle: RasterToggle, enabled: bool) -> bool {
        self.calls.push(DeviceCall::SetToggle { toggle, enabled });
        self.toggles.insert(toggle, enabled).unwrap_or(false)
    }

    fn blend_mode(&mut self, mode: BlendMode) {
        self.calls.push(DeviceCall::BlendMode(mode));
    }

    fn draw_textured_quad(&mut self, quad: &TexturedQuad) {
        self.calls.push(DeviceCall::DrawQuad(*quad));
    }
}
