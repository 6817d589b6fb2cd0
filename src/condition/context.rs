// src/condition/context.rs

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::fs::{FileSystem, RealFileSystem};

/// Facts a [`Condition`](super::Condition) is evaluated against.
pub trait ConditionContext {
    fn is_safe_mode(&self) -> bool;
    fn boot_volume_is_read_only(&self) -> bool;
    /// Whether the volume containing `path` is mounted read-only.
    fn is_read_only(&self, path: &Path) -> bool;
    fn file_exists(&self, path: &Path) -> bool;
}

/// Production context.
///
/// The safe-mode and boot-volume flags are captured once when the daemon
/// starts and never re-read during evaluation.
#[derive(Debug, Clone)]
pub struct SystemContext {
    safe_mode: bool,
    boot_read_only: bool,
    fs: Arc<dyn FileSystem>,
}

impl SystemContext {
    pub fn new(safe_mode: bool, boot_read_only: bool, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            safe_mode,
            boot_read_only,
            fs,
        }
    }

    /// Capture the current system state.
    ///
    /// `safe_mode` comes from the command line; it is also enabled when
    /// `LAUNCH_DAEMON_SAFEMODE` is set to `1`/`true`.
    pub fn detect(safe_mode: bool) -> Self {
        let env_safe_mode = std::env::var("LAUNCH_DAEMON_SAFEMODE")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let boot_read_only = volume_is_read_only(Path::new("/"));
        debug!(
            safe_mode = safe_mode || env_safe_mode,
            boot_read_only, "captured system context"
        );
        Self::new(
            safe_mode || env_safe_mode,
            boot_read_only,
            Arc::new(RealFileSystem),
        )
    }
}

impl ConditionContext for SystemContext {
    fn is_safe_mode(&self) -> bool {
        self.safe_mode
    }

    fn boot_volume_is_read_only(&self) -> bool {
        self.boot_read_only
    }

    fn is_read_only(&self, path: &Path) -> bool {
        volume_is_read_only(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.fs.exists(path)
    }
}

fn volume_is_read_only(path: &Path) -> bool {
    use nix::sys::statvfs::{FsFlags, statvfs};

    match statvfs(path) {
        Ok(stat) => stat.flags().contains(FsFlags::ST_RDONLY),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "statvfs failed; assuming writable");
            false
        }
    }
}
