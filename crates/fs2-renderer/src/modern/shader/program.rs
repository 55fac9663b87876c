//! Shader program
//!
//! Owns one linked program plus the stage objects that feed it, and the
//! uniform/attribute handles registered against it.

use std::collections::HashMap;

use fs2_common::common::{com_dprintf, com_wprintf};

use super::uniforms::{Attribute, Uniform, UniformValue, INVALID_ATTRIBUTE, INVALID_UNIFORM};
use crate::modern::gpu_device::{GpuDevice, ProgramId, ShaderObjectId, ShaderStage};
use crate::modern::RenderError;

/// Compiler/linker logs shorter than this are noise ("No errors.").
const MIN_REPORTED_LOG_LEN: usize = 5;

/// A linked shader program.
#[derive(Debug)]
pub struct ShaderProgram {
    name: String,
    handle: Option<ProgramId>,
    stages: [Option<ShaderObjectId>; 3],
    uniforms: HashMap<String, Uniform>,
    attributes: HashMap<String, Attribute>,
}

impl ShaderProgram {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            handle: None,
            stages: [None; 3],
            uniforms: HashMap::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Option<ProgramId> {
        self.handle
    }

    pub fn is_linked(&self) -> bool {
        self.handle.is_some()
    }

    /// Compile `body` for `stage` with `preamble` in front of it.
    ///
    /// A stage that was already loaded is replaced.
    pub fn load_source(
        &mut self,
        device: &mut dyn GpuDevice,
        stage: ShaderStage,
        preamble: &str,
        body: &str,
    ) -> Result<(), RenderError> {
        let mut source = String::with_capacity(preamble.len() + body.len() + 1);
        source.push_str(preamble);
        if !preamble.is_empty() && !preamble.ends_with('\n') {
            source.push('\n');
        }
        source.push_str(body);

        match device.compile_shader(stage, &source) {
            Ok(out) => {
                if out.log.len() > MIN_REPORTED_LOG_LEN {
                    com_wprintf(&format!(
                        "{} shader '{}' compiled with warnings:\n{}\n",
                        stage.label(),
                        self.name,
                        out.log
                    ));
                }
                if let Some(old) = self.stages[stage.index()].replace(out.handle) {
                    device.delete_shader(old);
                }
                Ok(())
            }
            Err(log) => Err(RenderError::ShaderCompilation { stage, log }),
        }
    }

    /// Link every loaded stage. Stage objects are released either way.
    pub fn link(&mut self, device: &mut dyn GpuDevice) -> Result<(), RenderError> {
        let stages: Vec<ShaderObjectId> = self.stages.iter().flatten().copied().collect();
        let result = device.link_program(&stages);

        for stage in self.stages.iter_mut() {
            if let Some(obj) = stage.take() {
                device.delete_shader(obj);
            }
        }

        let out = result.map_err(RenderError::ShaderLinking)?;
        if out.log.len() > MIN_REPORTED_LOG_LEN {
            com_wprintf(&format!("Shader '{}' linked with warnings:\n{}\n", self.name, out.log));
        }
        if let Some(old) = self.handle.replace(out.handle) {
            device.delete_program(old);
        }
        self.uniforms.clear();
        self.attributes.clear();
        Ok(())
    }

    /// Resolve and remember a uniform. Unknown names give the invalid handle.
    pub fn add_uniform(&mut self, device: &dyn GpuDevice, name: &str) -> &Uniform {
        let Some(program) = self.handle else { return &INVALID_UNIFORM };
        let uniform = Uniform::resolve(device, program, name);
        if !uniform.is_valid() {
            com_dprintf(&format!("Shader '{}': uniform '{}' not found\n", self.name, name));
        }
        self.uniforms.entry(name.to_string()).or_insert(uniform)
    }

    /// Resolve and remember a vertex attribute.
    pub fn add_attribute(&mut self, device: &dyn GpuDevice, name: &str) -> &Attribute {
        let Some(program) = self.handle else { return &INVALID_ATTRIBUTE };
        let attribute = Attribute::resolve(device, program, name);
        if !attribute.is_valid() {
            com_dprintf(&format!("Shader '{}': attribute '{}' not found\n", self.name, name));
        }
        self.attributes.entry(name.to_string()).or_insert(attribute)
    }

    pub fn uniform(&self, name: &str) -> &Uniform {
        self.uniforms.get(name).unwrap_or(&INVALID_UNIFORM)
    }

    pub fn attribute(&self, name: &str) -> &Attribute {
        self.attributes.get(name).unwrap_or(&INVALID_ATTRIBUTE)
    }

    /// Set a registered uniform; no-op if it was never registered.
    pub fn set_uniform(&self, device: &mut dyn GpuDevice, name: &str, value: impl Into<UniformValue>) {
        self.uniform(name).set(device, value);
    }

    /// Make this program current.
    pub fn bind(&self, device: &mut dyn GpuDevice) {
        device.use_program(self.handle);
    }

    /// Free the program and any stage objects. Safe to call repeatedly.
    pub fn release(&mut self, device: &mut dyn GpuDevice) {
        for stage in self.stages.iter_mut() {
            if let Some(obj) = stage.take() {
                device.delete_shader(obj);
            }
        }
        if let Some(program) = self.handle.take() {
            device.delete_program(program);
        }
        self.uniforms.clear();
        self.attributes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modern::headless::{DeviceCall, HeadlessDevice};

    const VERT: &str = "attribute vec4 radius_in;\nuniform float window_width;\nvoid main() {}\n";
    const FRAG: &str = "uniform sampler2D baseMap;\nvoid main() {}\n";

    fn build(device: &mut HeadlessDevice) -> ShaderProgram {
        let mut p = ShaderProgram::new("test");
        p.load_source(device, ShaderStage::Vertex, "#version 120", VERT).unwrap();
        p.load_source(device, ShaderStage::Fragment, "#version 120", FRAG).unwrap();
        p.link(device).unwrap();
        p
    }

    #[test]
    fn test_link_releases_stage_objects() {
        let mut device = HeadlessDevice::new();
        let p = build(&mut device);
        assert!(p.is_linked());
        assert_eq!(device.live_shader_objects(), 0);
        assert_eq!(device.live_programs(), 1);
    }

    #[test]
    fn test_preamble_prepended() {
        let mut device = HeadlessDevice::new();
        build(&mut device);
        match &device.calls[0] {
            DeviceCall::CompileShader { source, .. } => assert!(source.starts_with("#version 120\nattribute")),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_compile_error_carries_stage() {
        let mut device = HeadlessDevice::new();
        device.fail_compiles_containing("baseMap");
        let mut p = ShaderProgram::new("broken");
        let err = p.load_source(&mut device, ShaderStage::Fragment, "", FRAG).unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompilation { stage: ShaderStage::Fragment, .. }));
    }

    #[test]
    fn test_link_failure_still_releases_stages() {
        let mut device = HeadlessDevice::new();
        device.fail_link = true;
        let mut p = ShaderProgram::new("nolink");
        p.load_source(&mut device, ShaderStage::Vertex, "", VERT).unwrap();
        assert!(matches!(p.link(&mut device), Err(RenderError::ShaderLinking(_))));
        assert_eq!(device.live_shader_objects(), 0);
        assert!(!p.is_linked());
    }

    #[test]
    fn test_uniform_registration() {
        let mut device = HeadlessDevice::new();
        let mut p = build(&mut device);
        assert!(p.add_uniform(&device, "baseMap").is_valid());
        assert!(!p.add_uniform(&device, "depthMap").is_valid());
        assert!(p.add_attribute(&device, "radius_in").is_valid());
        assert!(!p.uniform("never_added").is_valid());

        device.clear_calls();
        p.set_uniform(&mut device, "depthMap", 1);
        assert!(device.calls.is_empty());
        p.set_uniform(&mut device, "baseMap", 0);
        assert_eq!(device.calls.len(), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut device = HeadlessDevice::new();
        let mut p = build(&mut device);
        p.release(&mut device);
        p.release(&mut device);
        assert!(!p.is_linked());
        assert_eq!(device.live_programs(), 0);
        assert_eq!(device.count(|c| matches!(c, DeviceCall::DeleteProgram(_))), 1);
    }
}
