//! Shader and table source loading
//!
//! Built-in sources are embedded at compile time. When external sources are
//! enabled, a file of the same name in the search paths replaces the built-in
//! one, except for the anti-aliasing shaders, which always come from the
//! embedded copy.

use std::borrow::Cow;

use fs2_common::common::{com_dprintf, com_printf};
use fs2_common::files::{with_fs_ctx, FsContext, EFFECTS_DIR, TABLES_DIR};

use super::preamble::Preamble;
use super::program::ShaderProgram;
use crate::modern::gpu_device::{GpuDevice, ShaderStage};
use crate::modern::render_config::RenderSettings;
use crate::modern::RenderError;

/// Name of the effect table, in the tables directory.
pub const EFFECT_TABLE_FILE: &str = "post_processing.tbl";

const BUILTIN_SOURCES: &[(&str, &str)] = &[
    ("main-v.sdr", include_str!("../../../shaders/main-v.sdr")),
    ("main-f.sdr", include_str!("../../../shaders/main-f.sdr")),
    ("soft-v.sdr", include_str!("../../../shaders/soft-v.sdr")),
    ("soft-f.sdr", include_str!("../../../shaders/soft-f.sdr")),
    ("post-v.sdr", include_str!("../../../shaders/post-v.sdr")),
    ("post-f.sdr", include_str!("../../../shaders/post-f.sdr")),
    ("blur-f.sdr", include_str!("../../../shaders/blur-f.sdr")),
    ("brightpass-f.sdr", include_str!("../../../shaders/brightpass-f.sdr")),
    ("fxaa-v.sdr", include_str!("../../../shaders/fxaa-v.sdr")),
    ("fxaa-f.sdr", include_str!("../../../shaders/fxaa-f.sdr")),
    ("fxaapre-f.sdr", include_str!("../../../shaders/fxaapre-f.sdr")),
    ("ls-f.sdr", include_str!("../../../shaders/ls-f.sdr")),
];

const BUILTIN_EFFECT_TABLE: &str = include_str!("../../../shaders/post_processing.tbl");

/// Never overridden from disk.
const EMBEDDED_ONLY: &[&str] = &["fxaa-v.sdr", "fxaa-f.sdr", "fxaapre-f.sdr"];

pub fn builtin_source(filename: &str) -> Option<&'static str> {
    BUILTIN_SOURCES.iter().find(|(n, _)| *n == filename).map(|(_, s)| *s)
}

/// Resolves shader and table text and builds programs from it.
#[derive(Debug, Clone, Default)]
pub struct ShaderLoader {
    search: Option<FsContext>,
    external_shaders: bool,
}

impl ShaderLoader {
    /// Embedded sources and the embedded effect table only.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Look up the effect table in `fs`; shader sources too if `external_shaders`.
    pub fn with_search_paths(fs: FsContext, external_shaders: bool) -> Self {
        Self { search: Some(fs), external_shaders }
    }

    /// Use the global filesystem, if it has been initialized.
    pub fn from_settings(settings: &RenderSettings) -> Self {
        match with_fs_ctx(|fs| fs.clone()) {
            Some(fs) => Self::with_search_paths(fs, settings.external_shaders),
            None => Self::builtin(),
        }
    }

    pub fn external_shaders(&self) -> bool {
        self.external_shaders && self.search.is_some()
    }

    /// Text of a shader source file.
    pub fn source(&self, filename: &str) -> Result<Cow<'static, str>, RenderError> {
        if self.external_shaders && !EMBEDDED_ONLY.contains(&filename) {
            if let Some(text) = self.search.as_ref().and_then(|fs| fs.load_text(EFFECTS_DIR, filename)) {
                com_dprintf(&format!("Loading external shader source {}\n", filename));
                return Ok(Cow::Owned(text));
            }
        }
        builtin_source(filename)
            .map(Cow::Borrowed)
            .ok_or_else(|| RenderError::NotFound(filename.to_string()))
    }

    /// Text of the effect table. A table on disk always wins over the built-in one.
    pub fn effect_table(&self) -> Cow<'static, str> {
        match self.search.as_ref().and_then(|fs| fs.load_text(TABLES_DIR, EFFECT_TABLE_FILE)) {
            Some(text) => Cow::Owned(text),
            None => Cow::Borrowed(BUILTIN_EFFECT_TABLE),
        }
    }

    /// Compile and link a vertex/fragment pair. On failure nothing is left
    /// allocated and the error is logged.
    pub fn build(
        &self,
        device: &mut dyn GpuDevice,
        name: &str,
        vert: &str,
        frag: &str,
        preamble: &Preamble,
    ) -> Result<ShaderProgram, RenderError> {
        com_dprintf(&format!("Compiling new shader: {}\n", name));
        let header = preamble.build();
        let mut program = ShaderProgram::new(name);
        match self.compile_and_link(device, &mut program, vert, frag, &header) {
            Ok(()) => Ok(program),
            Err(err) => {
                program.release(device);
                com_printf(&format!("Shader '{}' ({} / {}) failed: {}\n", name, vert, frag, err));
                Err(err)
            }
        }
    }

    fn compile_and_link(
        &self,
        device: &mut dyn GpuDevice,
        program: &mut ShaderProgram,
        vert: &str,
        frag: &str,
        header: &str,
    ) -> Result<(), RenderError> {
        let vert_src = self.source(vert)?;
        let frag_src = self.source(frag)?;
        program.load_source(device, ShaderStage::Vertex, header, &vert_src)?;
        program.load_source(device, ShaderStage::Fragment, header, &frag_src)?;
        program.link(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modern::headless::HeadlessDevice;
    use crate::modern::shader::preamble::ShaderModel;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fs2-loader-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join(EFFECTS_DIR)).unwrap();
        fs::create_dir_all(dir.join(TABLES_DIR)).unwrap();
        dir
    }

    #[test]
    fn test_every_builtin_present() {
        for name in ["main-v.sdr", "soft-f.sdr", "post-f.sdr", "ls-f.sdr", "fxaa-f.sdr"] {
            assert!(builtin_source(name).is_some(), "{} missing", name);
        }
        assert!(ShaderLoader::builtin().source("nothing.sdr").is_err());
        assert!(ShaderLoader::builtin().effect_table().contains("#End"));
    }

    #[test]
    fn test_external_override_skips_fxaa() {
        let dir = scratch_dir("override");
        fs::write(dir.join(EFFECTS_DIR).join("post-f.sdr"), "// external post").unwrap();
        fs::write(dir.join(EFFECTS_DIR).join("fxaa-f.sdr"), "// external fxaa").unwrap();
        let mut fsctx = FsContext::new();
        fsctx.add_game_directory(&dir);

        let loader = ShaderLoader::with_search_paths(fsctx.clone(), true);
        assert_eq!(loader.source("post-f.sdr").unwrap(), "// external post");
        assert_ne!(loader.source("fxaa-f.sdr").unwrap(), "// external fxaa");

        let loader = ShaderLoader::with_search_paths(fsctx, false);
        assert_ne!(loader.source("post-f.sdr").unwrap(), "// external post");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_external_table_always_considered() {
        let dir = scratch_dir("table");
        fs::write(dir.join(TABLES_DIR).join(EFFECT_TABLE_FILE), "#End\n").unwrap();
        let mut fsctx = FsContext::new();
        fsctx.add_game_directory(&dir);

        let loader = ShaderLoader::with_search_paths(fsctx, false);
        assert_eq!(loader.effect_table(), "#End\n");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_from_settings_uses_global_search_paths() {
        use fs2_common::files::{fs_add_game_directory, fs_init, fs_shutdown};

        let dir = scratch_dir("global");
        fs::write(dir.join(EFFECTS_DIR).join("blur-f.sdr"), "// modded blur").unwrap();
        let settings = RenderSettings { external_shaders: true, ..RenderSettings::default() };

        fs_init();
        fs_add_game_directory(&dir);
        let loader = ShaderLoader::from_settings(&settings);
        fs_shutdown();
        assert!(loader.external_shaders());
        assert_eq!(loader.source("blur-f.sdr").unwrap(), "// modded blur");
        assert!(!ShaderLoader::from_settings(&settings).external_shaders());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_build_failure_leaves_nothing_behind() {
        let mut device = HeadlessDevice::new();
        device.fail_compiles_containing("#define BROKEN");
        let preamble = Preamble::new(ShaderModel(4)).define("BROKEN");
        let loader = ShaderLoader::builtin();
        assert!(loader.build(&mut device, "post", "post-v.sdr", "post-f.sdr", &preamble).is_err());
        assert_eq!(device.live_shader_objects(), 0);
        assert_eq!(device.live_programs(), 0);

        let ok = loader.build(&mut device, "post", "post-v.sdr", "post-f.sdr", &Preamble::new(ShaderModel(4)));
        assert!(ok.map(|p| p.is_linked()).unwrap_or(false));
    }
}
