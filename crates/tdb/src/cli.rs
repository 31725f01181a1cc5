//! Command-line surface: argument parsing and the top-level command
//! handlers.
//!
//! The grammar is small and order-independent, so parsing is a single
//! pass over the argument vector. Anything that is not a recognized
//! flag is a target name; backslashes in target names are normalized to
//! forward slashes so Windows shell tab completion produces usable keys.

use std::sync::Arc;

use thiserror::Error;

use crate::builder::{Builder, Mode};
use crate::logger::{Filtered, Verbosity};
use crate::rule::TargetName;

/// What one invocation asked for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildParameters {
    pub targets: Vec<TargetName>,
    pub verbosity: Option<Verbosity>,
    pub mode: Option<Mode>,
    pub help: bool,
    pub list_targets: bool,
    pub describe_targets: bool,
}

/// Rejected command lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("Unrecognized argument: {0}")]
    UnrecognizedArgument(String),

    #[error("invalid verbosity level `{0}`")]
    InvalidVerbosity(String),
}

/// Parse an argument vector (without the program name).
pub fn parse_command_line_args(args: &[String]) -> Result<BuildParameters, UsageError> {
    let mut params = BuildParameters::default();

    for arg in args {
        match arg.as_str() {
            "--help" => params.help = true,
            "--list-targets" => params.list_targets = true,
            "--describe-targets" => params.describe_targets = true,
            "-v" => params.verbosity = Some(Verbosity::INFO),
            "-q" => params.verbosity = Some(Verbosity::ERRORS),
            "--serial" => params.mode = Some(Mode::Serial),
            "--parallel" => params.mode = Some(Mode::Parallel),
            other => {
                if let Some(level) = other.strip_prefix("--verbosity=") {
                    let level = level
                        .parse()
                        .map_err(|_| UsageError::InvalidVerbosity(level.to_string()))?;
                    params.verbosity = Some(Verbosity(level));
                } else if other.starts_with('-') {
                    return Err(UsageError::UnrecognizedArgument(other.to_string()));
                } else {
                    params.targets.push(other.replace('\\', "/"));
                }
            }
        }
    }

    Ok(params)
}

impl Builder {
    /// Execute one parsed invocation: a listing command, or a build of
    /// the requested (or default) targets.
    pub async fn run(self: &Arc<Self>, params: BuildParameters) -> crate::Result<()> {
        if params.help {
            print!("{}", self.usage());
            return Ok(());
        }
        if params.list_targets {
            print!("{}", self.render_target_list().await?);
            return Ok(());
        }
        if params.describe_targets {
            print!("{}", self.render_target_descriptions().await?);
            return Ok(());
        }

        if let Some(verbosity) = params.verbosity {
            self.set_logger(Arc::new(Filtered::new(self.base_logger.clone(), verbosity)));
        }

        match params.mode {
            Some(Mode::Parallel) if self.configured_mode == Mode::Serial => {
                // Seriality is presumed to come from an external
                // constraint, not user preference.
                self.logger()
                    .warn("builder is configured serial; ignoring --parallel");
            }
            Some(mode) => self.set_mode(mode),
            None => {}
        }

        let targets = if params.targets.is_empty() {
            self.default_targets.clone()
        } else {
            params.targets
        };
        if targets.is_empty() {
            self.logger()
                .warn("no targets requested and no default targets configured");
            return Ok(());
        }

        let trace = vec!["root".to_string()];
        self.build_all(&targets, &trace).await?;
        Ok(())
    }

    /// Parse, run, report, join. Returns the process exit code.
    pub async fn process_command_line(self: &Arc<Self>, args: &[String]) -> i32 {
        let code = match parse_command_line_args(args) {
            Ok(params) => match self.run(params).await {
                Ok(()) => 0,
                Err(e) => {
                    let mut message = format!("build failed: {e}");
                    if let Some(chain) = e.trace_line() {
                        message.push_str(&format!(" (while building {chain})"));
                    }
                    self.logger().error(&message);
                    1
                }
            },
            Err(e) => {
                self.logger().error(&e.to_string());
                1
            }
        };

        self.join().await;
        code
    }

    pub(crate) fn usage(&self) -> String {
        let script = &self.script_name;
        let mut out = format!("Usage: {script} [options] [targets...]\n\nOptions:\n");
        for (flag, help) in [
            ("--help", "show this help and exit"),
            ("--list-targets", "print one target name per line"),
            ("--describe-targets", "print each target with its description"),
            ("-v", "verbose output (info)"),
            ("-q", "quiet output (errors only)"),
            (
                "--verbosity=<N>",
                "numeric verbosity: 0 silent, 50 errors, 100 warnings, 200 info, 300 debug",
            ),
            ("--serial", "build prerequisites one at a time"),
            ("--parallel", "build prerequisites concurrently"),
        ] {
            out.push_str(&format!("  {flag:<20} {help}\n"));
        }
        out
    }

    pub(crate) async fn render_target_list(&self) -> crate::Result<String> {
        let mut out = String::new();
        for (name, _) in self.rules.materialized().await? {
            out.push_str(&name);
            out.push('\n');
        }
        Ok(out)
    }

    pub(crate) async fn render_target_descriptions(&self) -> crate::Result<String> {
        let entries = self.rules.materialized().await?;
        let width = entries
            .iter()
            .map(|(name, _)| name.chars().count())
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        for (name, rule) in &entries {
            match rule.description() {
                Some(description) => {
                    let mut lines = description.lines();
                    let first = lines.next().unwrap_or("");
                    out.push_str(&format!("{name:<width$}  {first}\n"));
                    for line in lines {
                        out.push_str(&format!("{:width$}  {line}\n", ""));
                    }
                }
                None => {
                    out.push_str(name);
                    out.push('\n');
                }
            }
        }

        if !self.default_targets.is_empty() {
            out.push_str(&format!(
                "\ndefault targets: {}\n",
                self.default_targets.join(" ")
            ));
        }
        Ok(out)
    }
}
