//! 外部工具进程调用
//!
//! 统一处理：PATH 查找、超时、stdout/stderr 捕获。退出码只做参考，
//! 校验失败时很多工具本来就返回非 0。

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AdapterCondition;

/// 进程捕获结果
#[derive(Debug, Clone, Default)]
pub struct Captured {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Captured {
    /// stdout 在前、stderr 在后的合并缓冲
    pub fn combined(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.stdout.len() + self.stderr.len());
        buf.extend_from_slice(&self.stdout);
        buf.extend_from_slice(&self.stderr);
        buf
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.combined()).into_owned()
    }
}

/// 在 PATH 中查找工具；绝对/相对路径直接检查
pub fn locate(bin: &str) -> Option<PathBuf> {
    match which::which(bin) {
        Ok(path) => Some(path),
        Err(e) => {
            debug!(bin, error = %e, "tool not resolvable");
            None
        }
    }
}

/// 运行一次外部工具并等待退出（超时即杀掉进程）
pub async fn run<I, S>(
    tool: &str,
    program: &Path,
    args: I,
    cwd: Option<&Path>,
    timeout: Duration,
) -> Result<Captured, AdapterCondition>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    debug!(tool, program = %program.display(), cwd = ?cwd, "spawning tool");
    let start = Instant::now();

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(tool, error = %e, "failed to spawn tool");
            return Err(AdapterCondition::SpawnFailed {
                tool: tool.to_string(),
                reason: e.to_string(),
            });
        }
        Err(_) => {
            // future 被丢弃时 kill_on_drop 负责回收子进程
            warn!(tool, timeout_secs = timeout.as_secs_f64(), "tool timed out");
            return Err(AdapterCondition::TimedOut {
                tool: tool.to_string(),
                after: timeout,
            });
        }
    };

    debug!(
        tool,
        exit_code = ?output.status.code(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "tool finished"
    );

    Ok(Captured {
        success: output.status.success(),
        exit_code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}
