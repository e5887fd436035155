//! Accelerator probes.

use std::process::{Command, Stdio};

use crate::tools::process::split_command_line;

/// Result of probing for an accelerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// An accelerator answered; carries its description.
    Available(String),
    /// The probe ran and found nothing.
    Absent,
    /// The probe itself could not run.
    Failed(String),
}

/// Looks for a usable accelerator.
pub trait DeviceProbe: Send + Sync {
    fn probe(&self) -> ProbeOutcome;
}

/// Probe that runs a command such as `nvidia-smi -L`.
///
/// Exit status 0 with output means an accelerator is present.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: String,
}

impl CommandProbe {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl DeviceProbe for CommandProbe {
    fn probe(&self) -> ProbeOutcome {
        let words = split_command_line(&self.command);
        let Some((program, args)) = words.split_first() else {
            return ProbeOutcome::Failed("empty probe command".to_string());
        };

        let output = match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
        {
            Ok(output) => output,
            Err(e) => return ProbeOutcome::Failed(format!("{}: {}", program, e)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return ProbeOutcome::Failed(format!(
                "{} exited with {}: {}",
                program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
            Some(first) => ProbeOutcome::Available(first.to_string()),
            None => ProbeOutcome::Absent,
        }
    }
}

/// Probe with a fixed answer.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    outcome: ProbeOutcome,
}

impl StaticProbe {
    pub fn new(outcome: ProbeOutcome) -> Self {
        Self { outcome }
    }
}

impl DeviceProbe for StaticProbe {
    fn probe(&self) -> ProbeOutcome {
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_command_fails() {
        let probe = CommandProbe::new("kmp-no-such-probe -L");
        assert!(matches!(probe.probe(), ProbeOutcome::Failed(_)));
    }

    #[test]
    fn empty_command_fails() {
        assert!(matches!(CommandProbe::new("").probe(), ProbeOutcome::Failed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn output_means_available() {
        let probe = CommandProbe::new("sh -c 'echo \"GPU 0: Test Card\"'");
        assert_eq!(
            probe.probe(),
            ProbeOutcome::Available("GPU 0: Test Card".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn silent_success_means_absent() {
        assert_eq!(CommandProbe::new("true").probe(), ProbeOutcome::Absent);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_fails() {
        assert!(matches!(
            CommandProbe::new("false").probe(),
            ProbeOutcome::Failed(_)
        ));
    }
}
