//! Local process actions: `shell_script` and `python_script`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::params::{required_str, secs_or, str_param, string_list, string_or};
use super::ActionHandler;
use crate::errors::ActionError;
use crate::models::value::{Params, Value};

/// Run a script through `<shell> -c`. The child is killed on timeout.
pub struct ShellScript;

impl ShellScript {
    const DEFAULT_SHELL: &'static str = "/bin/sh";
    const DEFAULT_TIMEOUT_SECS: u64 = 300;
}

#[async_trait]
impl ActionHandler for ShellScript {
    async fn execute(&self, params: &Params) -> Result<Value, ActionError> {
        let script = required_str(params, "script")?;
        let shell = string_or(params, "shell", Self::DEFAULT_SHELL);
        let timeout_secs = secs_or(params, "timeout", Self::DEFAULT_TIMEOUT_SECS);

        let mut command = Command::new(&shell);
        command
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = str_param(params, "workdir").filter(|d| !d.is_empty()) {
            command.current_dir(dir);
        }

        tracing::info!(shell = %shell, timeout_secs, "Executing shell script");
        tracing::debug!(script, "Shell script body");

        let child = command
            .spawn()
            .map_err(|e| ActionError::Process(format!("failed to spawn {shell}: {e}")))?;

        let output = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ActionError::Process(format!("script execution failed: {e}")));
            }
            Err(_) => {
                tracing::warn!(timeout_secs, "Shell script timed out");
                return Err(ActionError::Timeout(timeout_secs));
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            tracing::debug!(exit_code, "Shell script returned non-zero exit code");
        }

        Ok(Value::map([
            ("exit_code", Value::Int(i64::from(exit_code))),
            ("stdout", Value::from(String::from_utf8_lossy(&output.stdout).into_owned())),
            ("stderr", Value::from(String::from_utf8_lossy(&output.stderr).into_owned())),
            ("success", Value::Bool(output.status.success())),
        ]))
    }
}

/// Run a Python script with positional arguments; stdout and stderr are combined.
pub struct PythonScript;

impl PythonScript {
    const DEFAULT_INTERPRETER: &'static str = "python3";
}

#[async_trait]
impl ActionHandler for PythonScript {
    async fn execute(&self, params: &Params) -> Result<Value, ActionError> {
        let script = required_str(params, "script")?;
        let interpreter = string_or(params, "python", Self::DEFAULT_INTERPRETER);
        let args = string_list(params, "args");

        tracing::info!(interpreter = %interpreter, script, args = ?args, "Executing Python script");

        let output = Command::new(&interpreter)
            .arg(script)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ActionError::Process(format!("failed to run {interpreter}: {e}")))?;

        let exit_code = output.status.code().unwrap_or(-1);
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(Value::map([
            ("exit_code", Value::Int(i64::from(exit_code))),
            ("output", Value::from(combined)),
            ("success", Value::Bool(output.status.success())),
        ]))
    }
}
