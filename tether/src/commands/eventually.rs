//! eventually command - re-runs a command until it exits successfully

use anyhow::{bail, Result};
use colored::Colorize;
use std::path::Path;
use std::time::Duration;

use crate::config::TetherConfig;
use crate::eventually::RetryScheduler;
use crate::tool::{SubprocessRunner, ToolRunner};

/// Run `command` as a probe until it exits zero or `timeout` elapses
///
/// Each run is bounded by the overall timeout, so a hung command cannot
/// stall the retry loop forever.
pub fn execute(config: &TetherConfig, command: &[String], timeout: Option<Duration>) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        bail!("No command given");
    };

    let timeout = timeout.unwrap_or_else(|| config.retry.timeout());
    let runner = SubprocessRunner::with_timeout(timeout.max(Duration::from_millis(1)));
    let display = command.join(" ");

    let result = RetryScheduler::new(timeout).run(|c| {
        let invocation = c.require_ok(
            runner.invoke(Path::new(program), args),
            &format!("failed to start `{display}`"),
        )?;
        c.require(invocation.success(), format!("`{display}` {invocation}"))
    });

    match result {
        Ok(()) => {
            println!("{} {}", "✓".green().bold(), display);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), display);
            Err(e.into())
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_passing_command() {
        let config = TetherConfig::default();
        execute(&config, &sh("exit 0"), Some(Duration::from_secs(5))).unwrap();
    }

    #[test]
    fn test_failing_command_reports_stderr() {
        let config = TetherConfig::default();
        let err = execute(
            &config,
            &sh("echo 'not listening' >&2; exit 3"),
            Some(Duration::from_millis(20)),
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("exit status 3"), "{message}");
        assert!(message.contains("not listening"), "{message}");
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let config = TetherConfig::default();
        assert!(execute(&config, &[], None).is_err());
    }
}
