//! Locating and signalling the target process.

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::InjectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Term => "TERM",
            Signal::Kill => "KILL",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.as_str())
    }
}

/// How the target process is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessSelector {
    /// `pgrep -f` pattern over full command lines.
    Pattern(String),
    /// A fixed pid.
    Pid(u32),
}

/// Process-level operations used by fault injection.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Pids currently matching the target. Empty when the target is down.
    async fn find(&self) -> Result<Vec<u32>, InjectionError>;

    /// Deliver `signal`. `Ok(false)` means the process was already gone.
    async fn signal(&self, pid: u32, signal: Signal) -> Result<bool, InjectionError>;

    async fn is_running(&self, pid: u32) -> bool;
}

/// Drives real processes through `pgrep` and the shell's `kill` builtin.
pub struct SystemProcessControl {
    selector: ProcessSelector,
}

impl SystemProcessControl {
    pub fn new(selector: ProcessSelector) -> Self {
        Self { selector }
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::new(ProcessSelector::Pattern(pattern.into()))
    }

    pub fn pid(pid: u32) -> Self {
        Self::new(ProcessSelector::Pid(pid))
    }

    pub fn selector(&self) -> &ProcessSelector {
        &self.selector
    }

    async fn shell_kill(pid: u32, flag: &str) -> std::io::Result<std::process::Output> {
        Command::new("sh")
            .arg("-c")
            .arg(format!("kill {} {}", flag, pid))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
    }
}

#[async_trait]
impl ProcessControl for SystemProcessControl {
    async fn find(&self) -> Result<Vec<u32>, InjectionError> {
        match &self.selector {
            ProcessSelector::Pid(pid) => {
                if self.is_running(*pid).await {
                    Ok(vec![*pid])
                } else {
                    Ok(Vec::new())
                }
            }
            ProcessSelector::Pattern(pattern) => {
                let output = Command::new("pgrep")
                    .arg("-f")
                    .arg(pattern)
                    .stdin(Stdio::null())
                    .output()
                    .await
                    .map_err(|e| InjectionError::ProcessLookup(format!("pgrep: {}", e)))?;

                // pgrep exits 1 when nothing matched.
                match output.status.code() {
                    Some(0) | Some(1) => {}
                    code => {
                        return Err(InjectionError::ProcessLookup(format!(
                            "pgrep exited with {:?}: {}",
                            code,
                            String::from_utf8_lossy(&output.stderr).trim()
                        )))
                    }
                }

                let own = std::process::id();
                let pids: Vec<u32> = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .filter_map(|line| line.trim().parse::<u32>().ok())
                    .filter(|pid| *pid != own)
                    .collect();
                debug!(pattern = %pattern, ?pids, "Target process lookup");
                Ok(pids)
            }
        }
    }

    async fn signal(&self, pid: u32, signal: Signal) -> Result<bool, InjectionError> {
        let output = Self::shell_kill(pid, &format!("-s {}", signal.as_str()))
            .await
            .map_err(|e| InjectionError::Signal {
                pid,
                signal: signal.as_str(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            debug!(pid, %signal, "Signal delivered");
            return Ok(true);
        }
        if !self.is_running(pid).await {
            return Ok(false);
        }
        Err(InjectionError::Signal {
            pid,
            signal: signal.as_str(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn is_running(&self, pid: u32) -> bool {
        Self::shell_kill(pid, "-0")
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spawn_sleeper() -> (u32, tokio::task::JoinHandle<()>) {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id().unwrap();
        // Reap on exit so the pid does not linger as a zombie.
        let reaper = tokio::spawn(async move {
            let _ = child.wait().await;
        });
        (pid, reaper)
    }

    #[tokio::test]
    async fn test_kill_by_pid() {
        let (pid, reaper) = spawn_sleeper();
        let control = SystemProcessControl::pid(pid);
        assert_eq!(control.find().await.unwrap(), vec![pid]);

        assert!(control.signal(pid, Signal::Kill).await.unwrap());
        tokio::time::timeout(Duration::from_secs(5), reaper).await.unwrap().unwrap();

        assert!(!control.is_running(pid).await);
        assert!(control.find().await.unwrap().is_empty());
        // Second kill is a no-op rather than an error.
        assert!(!control.signal(pid, Signal::Kill).await.unwrap());
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(Signal::Term.as_str(), "TERM");
        assert_eq!(Signal::Kill.to_string(), "SIGKILL");
    }
}
