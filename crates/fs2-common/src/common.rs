// common.rs — console printing shared by the renderer and its collaborators
//
// Every message is forwarded to the `log` facade so the host application
// decides where it ends up. A redirect buffer can capture console output
// instead (used by the console "condump"-style commands and by tests).

use parking_lot::{const_mutex, Mutex};

/// Longest single console message; longer messages are truncated.
pub const MAXPRINTMSG: usize = 4096;

// ============================================================
// Redirect buffer for Com_Printf
// ============================================================

static RD_BUFFER: Mutex<Option<String>> = const_mutex(None);

/// Begin redirecting printf output into a buffer.
pub fn com_begin_redirect() {
    *RD_BUFFER.lock() = Some(String::new());
}

/// End redirect and return the captured output.
pub fn com_end_redirect() -> Option<String> {
    RD_BUFFER.lock().take()
}

/// Appends to the redirect buffer if one is active. Returns true if captured.
fn redirect(msg: &str) -> bool {
    let mut buf = RD_BUFFER.lock();
    match buf.as_mut() {
        Some(s) => {
            s.push_str(msg);
            true
        }
        None => false,
    }
}

/// Clip to MAXPRINTMSG on a char boundary and drop the trailing newline the
/// console convention carries (the log backend adds its own).
fn clip(msg: &str) -> &str {
    let mut end = msg.len().min(MAXPRINTMSG);
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    msg[..end].trim_end_matches('\n')
}

// ============================================================
// Com_Printf / Com_DPrintf / Com_WPrintf
// ============================================================

/// General-purpose print function.
pub fn com_printf(msg: &str) {
    if redirect(msg) {
        return;
    }
    log::info!("{}", clip(msg));
}

/// Developer-only print. Emitted at debug level.
pub fn com_dprintf(msg: &str) {
    if redirect(msg) {
        return;
    }
    log::debug!("{}", clip(msg));
}

/// Warning print, for degraded-but-recoverable conditions.
pub fn com_wprintf(msg: &str) {
    if redirect(msg) {
        return;
    }
    log::warn!("{}", clip(msg));
}
