/// SSH-driven packet capture agent
///
/// Starts and stops a remote `tshark` process and copies capture files back
/// with `scp`. Authentication is whatever the local ssh client is configured
/// for; `BatchMode=yes` keeps it from ever prompting.
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
    sync::Arc,
};

use crate::{api::traits::CaptureAgent, core::task_manager::run_blocking};

#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub user: String,
    pub port: u16,
}

impl SshTarget {
    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

pub struct SshCaptureAgent {
    target: SshTarget,
    running_pid: Arc<Mutex<Option<u32>>>,
}

impl SshCaptureAgent {
    pub fn new(target: SshTarget) -> Self {
        Self {
            target,
            running_pid: Arc::new(Mutex::new(None)),
        }
    }

    /// Build (but do not run) an ssh invocation for a remote command.
    pub(crate) fn ssh_command(target: &SshTarget, remote_cmd: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-p")
            .arg(target.port.to_string())
            .arg(target.destination())
            .arg(remote_cmd);
        cmd
    }

    fn scp_command(target: &SshTarget, remote_path: &str, local_path: &Path) -> Command {
        let mut cmd = Command::new("scp");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-P")
            .arg(target.port.to_string())
            .arg(format!("{}:{}", target.destination(), remote_path))
            .arg(local_path);
        cmd
    }
}

fn run_checked(mut cmd: Command, what: &str) -> Result<Output> {
    let output = cmd
        .output()
        .with_context(|| format!("failed to spawn {what}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{what} exited with {}: {}", output.status, stderr.trim());
    }
    Ok(output)
}

/// The remote shell echoes the background job pid as its only output line.
pub(crate) fn parse_pid(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().parse::<u32>().ok())
}

#[async_trait]
impl CaptureAgent for SshCaptureAgent {
    async fn start_capture(&self, interface: &str, output_path: &str) -> Result<()> {
        let remote = format!("nohup tshark -i {interface} -w {output_path} > /dev/null 2>&1 & echo $!");
        let target = self.target.clone();
        let output =
            run_blocking(move || run_checked(Self::ssh_command(&target, &remote), "ssh start capture"))
                .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let pid = parse_pid(&stdout)
            .ok_or_else(|| anyhow!("could not read sniffer pid from '{}'", stdout.trim()))?;
        *self.running_pid.lock() = Some(pid);
        log::info!("Started sniffer on {interface} with pid {pid}, writing {output_path}");
        Ok(())
    }

    async fn stop_capture(&self) -> Result<()> {
        let pid = self.running_pid.lock().take();
        let remote = match pid {
            Some(pid) => format!("kill -9 {pid}"),
            None => "killall -9 tshark".to_string(),
        };
        let target = self.target.clone();
        run_blocking(move || run_checked(Self::ssh_command(&target, &remote), "ssh stop capture"))
            .await?;
        log::info!("Stopped sniffer ({})", pid.map_or("all".to_string(), |p| p.to_string()));
        Ok(())
    }

    async fn fetch_file(&self, remote_path: &str, local_dir: &Path) -> Result<PathBuf> {
        let file_name = Path::new(remote_path)
            .file_name()
            .ok_or_else(|| anyhow!("remote path '{remote_path}' has no file name"))?;
        let local_path = local_dir.join(file_name);
        let target = self.target.clone();
        let remote = remote_path.to_string();
        let dest = local_path.clone();
        run_blocking(move || run_checked(Self::scp_command(&target, &remote, &dest), "scp"))
            .await?;
        Ok(local_path)
    }
}
