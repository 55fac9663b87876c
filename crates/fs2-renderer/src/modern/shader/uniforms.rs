//! Uniform and attribute handles
//!
//! A handle stores the location resolved when the owning program linked.
//! Names the program does not declare resolve to the invalid handle, and
//! setting an invalid handle does nothing.

use crate::modern::gpu_device::{GpuDevice, ProgramId};

/// A value uploaded to a uniform location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    /// Column-major 4x4 matrix.
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    /// Upload to `location` of the current program.
    pub fn apply(&self, device: &mut dyn GpuDevice, location: i32) {
        match self {
            UniformValue::Int(v) => device.uniform_1i(location, *v),
            UniformValue::Float(v) => device.uniform_1f(location, *v),
            UniformValue::Vec2(v) => device.uniform_2f(location, *v),
            UniformValue::Vec3(v) => device.uniform_3f(location, *v),
            UniformValue::Mat4(m) => device.uniform_matrix4(location, bytemuck::cast_ref(m)),
        }
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<[[f32; 4]; 4]> for UniformValue {
    fn from(v: [[f32; 4]; 4]) -> Self {
        UniformValue::Mat4(v)
    }
}

/// A named uniform of one program. The program handle is not owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uniform {
    name: String,
    location: Option<i32>,
    program: Option<ProgramId>,
}

/// Returned for names that were never registered.
pub static INVALID_UNIFORM: Uniform = Uniform { name: String::new(), location: None, program: None };

impl Uniform {
    /// Resolve `name` in `program`.
    pub fn resolve(device: &dyn GpuDevice, program: ProgramId, name: &str) -> Self {
        Self {
            name: name.to_string(),
            location: device.uniform_location(program, name),
            program: Some(program),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Option<i32> {
        self.location
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn is_valid(&self) -> bool {
        self.location.is_some()
    }

    /// Upload `value`. The owning program must be current.
    pub fn set(&self, device: &mut dyn GpuDevice, value: impl Into<UniformValue>) {
        if let Some(location) = self.location {
            value.into().apply(device, location);
        }
    }
}

/// A named vertex attribute of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    location: Option<i32>,
    program: Option<ProgramId>,
}

pub static INVALID_ATTRIBUTE: Attribute = Attribute { name: String::new(), location: None, program: None };

impl Attribute {
    pub fn resolve(device: &dyn GpuDevice, program: ProgramId, name: &str) -> Self {
        Self {
            name: name.to_string(),
            location: device.attribute_location(program, name),
            program: Some(program),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Option<i32> {
        self.location
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn is_valid(&self) -> bool {
        self.location.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modern::gpu_device::ShaderStage;
    use crate::modern::headless::{DeviceCall, HeadlessDevice};

    fn linked(device: &mut HeadlessDevice) -> ProgramId {
        let v = device
            .compile_shader(ShaderStage::Vertex, "attribute vec4 radius_in;\nuniform mat4 envMatrix;\n")
            .unwrap()
            .handle;
        device.link_program(&[v]).unwrap().handle
    }

    #[test]
    fn test_matrix_upload_is_column_major_flat() {
        let mut device = HeadlessDevice::new();
        let mut m = [[0.0f32; 4]; 4];
        m[1][0] = 5.0;
        UniformValue::Mat4(m).apply(&mut device, 0);
        assert_eq!(
            device.calls.last(),
            Some(&DeviceCall::Uniform { program: None, location: 0, value: UniformValue::Mat4(m) })
        );
        let flat: &[f32; 16] = bytemuck::cast_ref(&m);
        assert_eq!(flat[4], 5.0);
    }

    #[test]
    fn test_invalid_uniform_is_noop() {
        let mut device = HeadlessDevice::new();
        let program = linked(&mut device);
        let missing = Uniform::resolve(&device, program, "nope");
        assert!(!missing.is_valid());

        device.clear_calls();
        missing.set(&mut device, 1.0f32);
        INVALID_UNIFORM.set(&mut device, 2);
        assert!(device.calls.is_empty());
    }

    #[test]
    fn test_resolved_handles() {
        let mut device = HeadlessDevice::new();
        let program = linked(&mut device);
        let u = Uniform::resolve(&device, program, "envMatrix");
        assert!(u.is_valid());
        assert_eq!(u.program(), Some(program));

        let a = Attribute::resolve(&device, program, "radius_in");
        assert_eq!(a.location(), Some(0));
        assert!(!INVALID_ATTRIBUTE.is_valid());
    }
}
