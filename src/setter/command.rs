// command.rs — 外部命令执行
// 所有子进程都有超时，卡住的命令不会阻塞引擎

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::SetterError;

/// 外部命令的默认超时
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// 成功时原样返回，否则转换成带 stderr 的错误
    pub fn check(self, program: &str) -> Result<Self, SetterError> {
        if self.success {
            Ok(self)
        } else {
            Err(SetterError::Failed {
                program: program.to_string(),
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// 执行外部命令的抽象，测试中用假实现替换
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, SetterError>;

    /// 程序是否在 $PATH 中
    fn is_available(&self, program: &str) -> bool;
}

/// 使用 tokio::process 执行真实命令
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::with_timeout(COMMAND_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, SetterError> {
        debug!(program, ?args, "running command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        // 超时后 future 被丢弃，kill_on_drop 会结束子进程
        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| SetterError::Timeout {
                program: program.to_string(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| SetterError::Spawn {
                program: program.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn is_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
