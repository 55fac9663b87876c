// files.rs — search-path file loading
//
// Data files (effect tables, shader sources) are looked up through an ordered
// list of directories; the most recently added directory wins, so a mod
// directory added after the base directory overrides it.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use parking_lot::{const_mutex, Mutex};

use crate::common::{com_dprintf, com_printf};

/// Subdirectory holding shader sources under each search path.
pub const EFFECTS_DIR: &str = "effects";
/// Subdirectory holding data tables under each search path.
pub const TABLES_DIR: &str = "tables";

/// A single search path entry.
#[derive(Debug, Clone)]
pub struct SearchPath {
    pub dir: PathBuf,
}

/// The filesystem context.
#[derive(Debug, Clone, Default)]
pub struct FsContext {
    /// Searched front to back; `add_game_directory` pushes to the front.
    search_paths: Vec<SearchPath>,
}

impl FsContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory with highest priority.
    pub fn add_game_directory(&mut self, dir: impl AsRef<Path>) {
        let dir = dir.as_ref().to_path_buf();
        com_dprintf(&format!("FS: added search path {}\n", dir.display()));
        self.search_paths.insert(0, SearchPath { dir });
    }

    /// Currently configured search paths, highest priority first.
    pub fn search_paths(&self) -> &[SearchPath] {
        &self.search_paths
    }

    /// Resolves `filename` inside `subdir` of the first search path that has it.
    pub fn find_file(&self, subdir: &str, filename: &str) -> Option<PathBuf> {
        for sp in &self.search_paths {
            let netpath = sp.dir.join(subdir).join(filename);
            if netpath.is_file() {
                com_dprintf(&format!("FindFile: {}\n", netpath.display()));
                return Some(netpath);
            }
        }
        com_dprintf(&format!("FindFile: can't find {}/{}\n", subdir, filename));
        None
    }

    /// Whether the file exists anywhere in the search paths.
    pub fn file_exists(&self, subdir: &str, filename: &str) -> bool {
        self.find_file(subdir, filename).is_some()
    }

    /// Loads a file into memory. Returns `None` if not found or unreadable.
    pub fn load_file(&self, subdir: &str, filename: &str) -> Option<Vec<u8>> {
        let path = self.find_file(subdir, filename)?;
        match Self::read_all(&path) {
            Ok(buf) => Some(buf),
            Err(e) => {
                com_printf(&format!("FS_LoadFile: read error on {}: {}\n", path.display(), e));
                None
            }
        }
    }

    /// Loads a text file. Invalid UTF-8 is replaced rather than rejected.
    pub fn load_text(&self, subdir: &str, filename: &str) -> Option<String> {
        self.load_file(subdir, filename)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_all(path: &Path) -> io::Result<Vec<u8>> {
        let mut f = File::open(path)?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

// ============================================================
// Global singleton and free-function wrappers
// ============================================================

static FS_CTX: Mutex<Option<FsContext>> = const_mutex(None);

pub fn fs_init() {
    *FS_CTX.lock() = Some(FsContext::new());
}

pub fn fs_shutdown() {
    *FS_CTX.lock() = None;
}

pub fn fs_add_game_directory(dir: impl AsRef<Path>) {
    if let Some(c) = FS_CTX.lock().as_mut() {
        c.add_game_directory(dir);
    }
}

/// Access the global filesystem context with a closure. Returns None if not initialized.
pub fn with_fs_ctx<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut FsContext) -> R,
{
    FS_CTX.lock().as_mut().map(f)
}
