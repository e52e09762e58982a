//! OS idle inhibitor held by a long-lived child process:
//! `systemd-inhibit` on Linux, `caffeinate` on macOS. The lock lasts as long
//! as the child does, so a child that exits on its own is a revoked lease.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};

use crate::utils::host::find_on_path;

use super::{WakeLease, WakeLockProvider};

pub struct InhibitorLock {
    program: PathBuf,
    args: Vec<String>,
}

impl InhibitorLock {
    pub fn detect() -> Option<Self> {
        if cfg!(target_os = "macos") {
            find_on_path("caffeinate").map(|program| Self {
                program,
                args: vec!["-d".into(), "-i".into()],
            })
        } else if cfg!(target_os = "linux") {
            find_on_path("systemd-inhibit").map(|program| Self {
                program,
                args: vec![
                    "--what=idle:sleep".into(),
                    "--who=pacer".into(),
                    "--why=Workout in progress".into(),
                    "--mode=block".into(),
                    "sleep".into(),
                    "infinity".into(),
                ],
            })
        } else {
            None
        }
    }

    /// Inhibitor backed by an arbitrary long-running command.
    pub fn with_command(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl WakeLockProvider for InhibitorLock {
    fn request(&mut self) -> Result<Box<dyn WakeLease>> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start {}", self.program.display()))?;
        Ok(Box::new(InhibitorLease { child }))
    }
}

struct InhibitorLease {
    child: Child,
}

impl WakeLease for InhibitorLease {
    fn is_active(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn release(mut self: Box<Self>) -> Result<()> {
        if self.is_active() {
            self.child.kill().context("failed to stop inhibitor")?;
        }
        self.child.wait().context("failed to reap inhibitor")?;
        Ok(())
    }
}
