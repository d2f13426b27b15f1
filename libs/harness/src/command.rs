//! Device-side command lines.

use std::ffi::OsString;
use std::fmt;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::HarnessError;

/// A program and its arguments, optionally run through `sudo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandLine {
    pub fn new(program: impl Into<OsString>, use_sudo: bool) -> Self {
        let program = program.into();
        if use_sudo {
            Self {
                program: OsString::from("sudo"),
                args: vec![program],
            }
        } else {
            Self {
                program,
                args: Vec::new(),
            }
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null()).kill_on_drop(true);
        command
    }

    /// Run to completion, capturing output.
    pub(crate) async fn output(&self) -> Result<std::process::Output, HarnessError> {
        self.to_command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| HarnessError::Process {
                program: self.to_string(),
                source,
            })
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}
