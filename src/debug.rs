//! Starting the project behind a panel so requests have something to hit.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DebugState {
    Idle,
    Starting,
    Running,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugStatus {
    pub status: DebugState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DebugStatus {
    pub fn new(status: DebugState, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
        }
    }
}

pub trait DebugLauncher: Send + Sync {
    /// Starts `project_file` with `env` layered over the current
    /// environment. Returns the process id.
    fn launch(&self, project_file: &Path, env: &BTreeMap<String, String>) -> Result<u32>;
}

/// Runs `dotnet run --project <file>`; children are killed on drop.
#[derive(Debug)]
pub struct DotnetLauncher {
    program: String,
    children: Mutex<Vec<Child>>,
}

impl DotnetLauncher {
    pub fn new() -> Self {
        Self::with_program("dotnet")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn running(&self) -> usize {
        let Ok(mut children) = self.children.lock() else {
            return 0;
        };
        children.retain_mut(|child| matches!(child.try_wait(), Ok(None)));
        children.len()
    }
}

impl Default for DotnetLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugLauncher for DotnetLauncher {
    fn launch(&self, project_file: &Path, env: &BTreeMap<String, String>) -> Result<u32> {
        let mut command = Command::new(&self.program);
        command
            .arg("run")
            .arg("--project")
            .arg(project_file)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        if let Some(dir) = project_file.parent() {
            command.current_dir(dir);
        }
        let child = command
            .spawn()
            .with_context(|| format!("spawn {} run --project {}", self.program, project_file.display()))?;
        let pid = child.id();
        info!(pid, project = %project_file.display(), "project started");
        if let Ok(mut children) = self.children.lock() {
            children.push(child);
        }
        Ok(pid)
    }
}

impl Drop for DotnetLauncher {
    fn drop(&mut self) {
        let Ok(children) = self.children.get_mut() else {
            return;
        };
        for child in children.iter_mut() {
            if let Err(err) = child.kill() {
                warn!(pid = child.id(), "failed to stop project: {err}");
            }
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_lowercase() {
        let status = DebugStatus::new(DebugState::Running, "Api is running");
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({"status": "running", "message": "Api is running"})
        );
        let idle = DebugStatus {
            status: DebugState::Idle,
            message: None,
        };
        assert_eq!(serde_json::to_value(&idle).unwrap(), json!({"status": "idle"}));
    }

    #[test]
    fn missing_program_is_an_error() {
        let launcher = DotnetLauncher::with_program("definitely-not-a-real-dotnet-binary");
        let err = launcher
            .launch(Path::new("/tmp/Api/Api.csproj"), &BTreeMap::new())
            .unwrap_err();
        assert!(format!("{err:#}").contains("spawn"));
        assert_eq!(launcher.running(), 0);
    }
}
