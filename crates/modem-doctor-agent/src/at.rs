//! Running external helpers: the AT command tool and `ifdown`/`ifup`.
//!
//! Every run is bounded by a deadline and the child is killed if it is
//! still alive when the deadline passes.

use std::time::Duration;

use thiserror::Error;

use modem_doctor_common::config::ModemConfig;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {after:?}")]
    Timeout { program: String, after: Duration },
    #[error("{program} exited with {status}: {output}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
        output: String,
    },
    #[error("modem answered ERROR: {response}")]
    Rejected { response: String },
}

/// Run `argv` and return its stdout.
pub async fn run(argv: &[String], timeout: Duration) -> Result<String, CommandError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(CommandError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args).kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(CommandError::Spawn {
                program: program.clone(),
                source,
            })
        }
        Err(_) => {
            return Err(CommandError::Timeout {
                program: program.clone(),
                after: timeout,
            })
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let text = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(CommandError::Exit {
            program: program.clone(),
            status: output.status,
            output: text,
        });
    }
    Ok(stdout)
}

/// The helper argv for one AT command, with `{port}` substituted and the
/// command appended.
pub fn at_argv(config: &ModemConfig, command: &str) -> Vec<String> {
    let mut argv: Vec<String> = config
        .at_command
        .iter()
        .map(|arg| arg.replace("{port}", &config.at_port))
        .collect();
    argv.push(command.to_string());
    argv
}

/// Send one AT command and return the modem's response text.
pub async fn send(config: &ModemConfig, command: &str) -> Result<String, CommandError> {
    let argv = at_argv(config, command);
    tracing::debug!(command, port = %config.at_port, "AT command");
    let response = run(&argv, config.command_timeout).await?;
    if is_error_response(&response) {
        return Err(CommandError::Rejected {
            response: response.trim().to_string(),
        });
    }
    Ok(response)
}

/// `ERROR`, `+CME ERROR: <n>` or `+CMS ERROR: <n>` on a line of its own.
pub fn is_error_response(response: &str) -> bool {
    response.lines().map(str::trim).any(|line| {
        line == "ERROR" || line.starts_with("+CME ERROR") || line.starts_with("+CMS ERROR")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_is_substituted_and_command_appended() {
        let config = ModemConfig {
            at_port: "/dev/ttyUSB3".into(),
            ..Default::default()
        };
        assert_eq!(
            at_argv(&config, "ATI"),
            vec!["sms_tool", "-d", "/dev/ttyUSB3", "at", "ATI"]
        );
    }

    #[test]
    fn custom_helper_without_placeholder() {
        let config = ModemConfig {
            at_command: vec!["atinout".into(), "-".into()],
            ..Default::default()
        };
        assert_eq!(at_argv(&config, "AT+CFUN=1,1"), vec!["atinout", "-", "AT+CFUN=1,1"]);
    }

    #[test]
    fn error_lines_are_detected() {
        assert!(is_error_response("\r\nERROR\r\n"));
        assert!(is_error_response("+CME ERROR: 3\n"));
        assert!(!is_error_response("+QENG: \"servingcell\",\"NOCONN\"\nOK\n"));
        // A payload mentioning ERROR is not an error line.
        assert!(!is_error_response("+QCFG: \"ERROR_LOG\",0\nOK\n"));
    }

    #[tokio::test]
    async fn empty_argv_is_a_spawn_error() {
        let err = run(&[], Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let argv = vec!["/nonexistent/modem-doctor-helper".to_string()];
        let err = run(&argv, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
