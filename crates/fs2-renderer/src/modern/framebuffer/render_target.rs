//! Offscreen render targets for post-processing
//!
//! The bloom chain needs two framebuffers and three textures: the bright pass
//! renders into texture 0 at half size, the two blur passes ping-pong into
//! textures 1 and 2 at quarter size. Sizes derive from the screen, clamped to
//! the device's renderbuffer limit.

use fs2_common::common::{com_dprintf, com_wprintf};

use crate::modern::gpu_device::{
    Attachment, DrawTarget, FramebufferId, FramebufferStatus, GpuDevice, TextureId,
};
use crate::modern::RenderError;

/// The bloom framebuffers and textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferSet {
    pub bright_pass: FramebufferId,
    pub blur: FramebufferId,
    /// 0: bright pass (half size); 1, 2: blur ping-pong (quarter size).
    pub bloom_textures: [TextureId; 3],
    pub width: u32,
    pub height: u32,
}

impl FramebufferSet {
    fn destroy(&self, device: &mut dyn GpuDevice) {
        device.delete_framebuffer(self.bright_pass);
        device.delete_framebuffer(self.blur);
        for tex in self.bloom_textures {
            device.delete_texture(tex);
        }
    }
}

/// Owner of the post-processing render targets.
#[derive(Debug, Default)]
pub struct FramebufferPool {
    set: Option<FramebufferSet>,
    width: u32,
    height: u32,
    /// Set once a completeness check fails; bloom targets are never tried again.
    bloom_failed: bool,
}

impl FramebufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post texture size (screen size clamped to the renderbuffer limit).
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn bloom(&self) -> Option<&FramebufferSet> {
        self.set.as_ref()
    }

    pub fn bloom_failed(&self) -> bool {
        self.bloom_failed
    }

    /// (Re)create targets for a `screen_w` x `screen_h` screen.
    ///
    /// Bloom targets are only made when `want_bloom` and no earlier attempt
    /// failed. A failed completeness check destroys what was made, marks bloom
    /// as failed for good and returns the error; the pool is still usable.
    pub fn create(
        &mut self,
        device: &mut dyn GpuDevice,
        screen_w: u32,
        screen_h: u32,
        want_bloom: bool,
    ) -> Result<(), RenderError> {
        self.destroy(device);

        let limit = device.caps().max_renderbuffer_size;
        self.width = screen_w.min(limit);
        self.height = screen_h.min(limit);

        if !want_bloom || self.bloom_failed {
            return Ok(());
        }

        let result = self.create_bloom(device);
        device.bind_framebuffer(DrawTarget::Screen);
        match result {
            Ok(set) => {
                com_dprintf(&format!("Bloom targets {}x{} created\n", set.width, set.height));
                self.set = Some(set);
                Ok(())
            }
            Err(err) => {
                com_wprintf(&format!("Unable to create bloom framebuffers ({}); bloom disabled\n", err));
                self.bloom_failed = true;
                Err(err)
            }
        }
    }

    fn create_bloom(&self, device: &mut dyn GpuDevice) -> Result<FramebufferSet, RenderError> {
        let half = ((self.width >> 1).max(1), (self.height >> 1).max(1));
        let quarter = ((self.width >> 2).max(1), (self.height >> 2).max(1));

        let set = FramebufferSet {
            bright_pass: device.create_framebuffer(),
            blur: device.create_framebuffer(),
            bloom_textures: [
                device.create_texture(half.0, half.1),
                device.create_texture(quarter.0, quarter.1),
                device.create_texture(quarter.0, quarter.1),
            ],
            width: self.width,
            height: self.height,
        };

        let checks = [
            (set.bright_pass, set.bloom_textures[0]),
            (set.blur, set.bloom_textures[1]),
            (set.blur, set.bloom_textures[2]),
        ];
        for (fb, tex) in checks {
            device.bind_framebuffer(DrawTarget::Framebuffer(fb));
            device.attach_texture(Attachment::Color(0), Some(tex));
            let status = device.check_framebuffer();
            if status != FramebufferStatus::Complete {
                device.bind_framebuffer(DrawTarget::Screen);
                set.destroy(device);
                return Err(RenderError::FramebufferIncomplete(status));
            }
        }
        Ok(set)
    }

    /// Release all targets. Keeps the failure mark.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        if let Some(set) = self.set.take() {
            set.destroy(device);
        }
    }
}
