// Shell command execution for xtask steps.

use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use derive_builder::Builder;

#[derive(Clone, Copy, Debug, Default)]
pub enum StreamMode {
    #[default]
    Inherit,
    Null,
}

impl StreamMode {
    fn stdio(self) -> Stdio {
        match self {
            StreamMode::Inherit => Stdio::inherit(),
            StreamMode::Null => Stdio::null(),
        }
    }
}

#[derive(Clone, Debug, Default, Builder)]
#[builder(default)]
pub struct ShOptions {
    pub stdout: StreamMode,
    pub stderr: StreamMode,
    /// Extra environment for the command.
    pub env: Vec<(String, String)>,
}

impl ShOptions {
    /// Options that hide command output unless `verbose` is set.
    pub fn quiet_unless(verbose: bool) -> Self {
        let mode = if verbose {
            StreamMode::Inherit
        } else {
            StreamMode::Null
        };
        Self {
            stdout: mode,
            ..Self::default()
        }
    }

    fn apply(&self, cmd: &mut Command) {
        cmd.stdout(self.stdout.stdio());
        cmd.stderr(self.stderr.stdio());
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));
    }
}

#[macro_export]
macro_rules! sh {
    (options($opts:expr), $cmd:expr $(,)?) => {{ $crate::sh::sh($cmd, &$opts) }};
}

/// Run `cmd` through `sh -c`, failing on a non-zero exit status.
pub fn sh(cmd: impl AsRef<str>, opts: &ShOptions) -> Result<()> {
    let cmd = cmd.as_ref();
    log::debug!("[sh] {cmd}");

    let mut command = Command::new("sh");
    command.arg("-c").arg(cmd);
    opts.apply(&mut command);

    let status = command
        .status()
        .with_context(|| format!("spawning `{cmd}`"))?;
    if !status.success() {
        bail!(
            "command failed with exit code {}: {cmd}",
            status.code().unwrap_or(-1)
        );
    }
    Ok(())
}
