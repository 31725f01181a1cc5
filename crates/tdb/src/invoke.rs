//! Translating a rule declaration into a concrete build callable.
//!
//! A rule either carries an inline callable, an external command vector,
//! or nothing at all ("no build step; just verify what exists").
//! Command arguments get directive rewriting before spawn: `tdb:target`
//! becomes the target name, `tdb:prereqs` splices the prerequisite list,
//! and `tdb:literal:` is the escape hatch for arguments that would
//! otherwise collide with the directive namespace.

use std::sync::Arc;

use crate::builder::BuildContext;
use crate::error::{BuildError, BuildErrorKind, Result};
use crate::rule::{BuildFn, Rule, WrapFn};

const DIRECTIVE_PREFIX: &str = "tdb:";

/// Resolve the effective build callable for a rule.
///
/// Declaring both an inline callable and a command is a configuration
/// error. Declaring neither returns `None`.
pub(crate) fn resolve_callable(rule: &Rule, target: &str) -> Result<Option<BuildFn>> {
    match (&rule.run, &rule.command) {
        (Some(_), Some(_)) => Err(BuildError::new(BuildErrorKind::ConflictingRule {
            target: target.to_string(),
        })),
        (Some(run), None) => Ok(Some(run.clone())),
        (None, Some(argv)) => Ok(Some(command_callable(argv.clone()))),
        (None, None) => Ok(None),
    }
}

/// The rule's wrapper transformer, or identity.
pub(crate) fn resolve_wrapper(rule: &Rule) -> WrapFn {
    match &rule.wrap {
        Some(wrap) => wrap.clone(),
        None => Arc::new(|inner| inner),
    }
}

/// Rewrite a command argument vector against a target and its
/// materialized prerequisites.
pub(crate) fn rewrite_args(argv: &[String], target: &str, prereqs: &[String]) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(argv.len());
    for arg in argv {
        let Some(directive) = arg.strip_prefix(DIRECTIVE_PREFIX) else {
            out.push(arg.clone());
            continue;
        };
        if let Some(text) = directive.strip_prefix("literal:") {
            out.push(text.to_string());
        } else if directive == "target" {
            out.push(target.to_string());
        } else if directive == "prereq" {
            let first = prereqs
                .first()
                .ok_or_else(|| BuildError::new(BuildErrorKind::NoPrereq))?;
            out.push(first.clone());
        } else if directive == "prereqs" {
            out.extend(prereqs.iter().cloned());
        } else {
            return Err(BuildError::new(BuildErrorKind::UnknownDirective {
                directive: arg.clone(),
            }));
        }
    }
    Ok(out)
}

fn command_callable(argv: Vec<String>) -> BuildFn {
    Arc::new(move |ctx: BuildContext| {
        let argv = argv.clone();
        Box::pin(async move {
            let args = rewrite_args(&argv, &ctx.target, &ctx.prereqs)?;
            let Some((program, rest)) = args.split_first() else {
                return Err(BuildError::new(BuildErrorKind::EmptyCommand {
                    target: ctx.target.clone(),
                }));
            };

            tracing::debug!(name = %ctx.target, program = %program, "spawning build command");
            let status = tokio::process::Command::new(program)
                .args(rest)
                .status()
                .await
                .map_err(|e| {
                    BuildError::new(BuildErrorKind::Spawn {
                        program: program.clone(),
                        message: e.to_string(),
                    })
                })?;

            if status.success() {
                Ok(())
            } else {
                Err(BuildError::new(BuildErrorKind::CommandFailed {
                    program: program.clone(),
                    status,
                }))
            }
        })
    })
}
