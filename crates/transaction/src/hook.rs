//! Configuration hook execution with an isolated root
//!
//! The hook runner is an injectable dependency so tests can substitute a
//! recording fake for the chroot-based production runner, which needs root
//! privileges.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use atomos_errors::{Result, TransactionError};

/// Runs a configuration script with its root rebound to a snapshot path
#[async_trait]
pub trait HookRunner: Send + Sync {
    /// Execute `script` (a path valid inside `root`) with `root` as the
    /// process filesystem root.
    ///
    /// # Errors
    /// `TransactionError::Hook` when the isolation setup fails;
    /// `TransactionError::HookScript` carrying the script's own failure when
    /// the root was correctly set up but the script exited non-zero.
    async fn run(&self, root: &Path, script: &Path) -> Result<()>;
}

/// Production runner: chroots the child process into the snapshot root
/// before exec. Requires a privileged process.
#[derive(Debug, Default)]
pub struct ChrootHookRunner;

#[async_trait]
impl HookRunner for ChrootHookRunner {
    async fn run(&self, root: &Path, script: &Path) -> Result<()> {
        debug!(root = %root.display(), script = %script.display(), "running configuration hook");

        let root_c = CString::new(root.as_os_str().as_bytes()).map_err(|_| {
            TransactionError::Hook {
                id: 0,
                message: format!("snapshot path contains NUL: {}", root.display()),
            }
        })?;

        let mut cmd = Command::new(script);
        // SAFETY: chroot/chdir are async-signal-safe and the closure touches
        // only the pre-allocated CString.
        unsafe {
            cmd.pre_exec(move || {
                if libc::chroot(root_c.as_ptr()) != 0 {
                    return Err(io::Error::last_os_error());
                }
                if libc::chdir(c"/".as_ptr()) != 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let output = cmd.output().await.map_err(|e| TransactionError::Hook {
            id: 0,
            message: format!("failed to enter snapshot root: {e}"),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransactionError::HookScript {
                message: format!(
                    "{} exited with {}: {}",
                    script.display(),
                    output.status,
                    stderr.trim()
                ),
            }
            .into());
        }

        Ok(())
    }
}
