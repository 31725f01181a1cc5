//! Resolving a single target: freshness decision, rule invocation,
//! artifact verification and failure cleanup.

use std::sync::Arc;

use camino::Utf8Path;

use crate::builder::{Builder, BuildContext, Built, pushed, dedup_first_occurrence};
use crate::error::{BuildError, BuildErrorKind, Result};
use crate::invoke;
use crate::rule::{BuildFn, Rule, TargetName, TargetType};
use crate::stamp::{Stamp, tree_stamp};

impl Builder {
    /// Entry point of every memoized build future.
    pub(crate) async fn run_target(
        self: Arc<Self>,
        name: TargetName,
        trace: Vec<TargetName>,
    ) -> Result<Built> {
        let traced = pushed(&trace, &name);

        let rule = self
            .rules
            .lookup(&name)
            .await
            .map_err(|e| e.with_trace(&traced))?;

        match rule {
            Some(rule) => self.resolve_rule(name, rule, traced).await,
            None => {
                // No rule: the target must be a pre-existing artifact.
                match self.current_stamp(&name).await.map_err(|e| e.with_trace(&traced))? {
                    Some(stamp) => Ok(Built { stamp }),
                    None => Err(BuildError::new(BuildErrorKind::MissingTarget {
                        target: name.clone(),
                    })
                    .with_trace(&traced)),
                }
            }
        }
    }

    /// The resolver pipeline for a target that has a rule. `trace`
    /// already ends with `name`.
    async fn resolve_rule(
        self: Arc<Self>,
        name: TargetName,
        rule: Arc<Rule>,
        trace: Vec<TargetName>,
    ) -> Result<Built> {
        // Explicit prereqs first, then globals. A global naming this
        // very target is skipped so global prereqs can have rules of
        // their own without self-deadlocking.
        let mut prereqs = rule.prereqs.materialize();
        prereqs.extend(
            self.global_prereqs
                .iter()
                .filter(|global| global.as_str() != name)
                .cloned(),
        );
        let prereqs = dedup_first_occurrence(&prereqs);

        let phony = rule.target_type == TargetType::Phony;
        let current = if phony {
            Stamp::Never
        } else {
            self.current_stamp(&name)
                .await
                .map_err(|e| e.with_trace(&trace))?
                .unwrap_or(Stamp::Never)
        };

        let latest_prereq = self.build_all(&prereqs, &trace).await?;

        if current != Stamp::Never && latest_prereq.stamp <= current {
            tracing::debug!(name = %name, stamp = %current, "target is fresh");
            self.logger().log(&format!("`{name}` is up to date"));
            return Ok(Built { stamp: current });
        }

        let body = invoke::resolve_callable(&rule, &name).map_err(|e| e.with_trace(&trace))?;
        let wrapped = invoke::resolve_wrapper(&rule)(inner_body(body, &name, rule.target_type));

        let ctx = BuildContext {
            builder: Arc::clone(&self),
            logger: self.logger(),
            target: name.clone(),
            prereqs: prereqs.clone(),
            trace: trace.clone(),
        };

        tracing::debug!(name = %name, current = %current, latest_prereq = %latest_prereq.stamp, "building stale target");
        match wrapped(ctx).await {
            Ok(()) => {
                let stamp = if phony {
                    Stamp::Always
                } else {
                    self.current_stamp(&name)
                        .await
                        .map_err(|e| e.with_trace(&trace))?
                        .unwrap_or(Stamp::Never)
                };
                Ok(Built { stamp })
            }
            Err(e) => {
                let delete = match rule.keep_on_failure {
                    Some(keep) => !keep,
                    None => rule.target_type == TargetType::File,
                };
                if delete {
                    if let Err(cleanup) = tdb_io::remove_all(Utf8Path::new(&name)).await {
                        self.logger().warn(&format!(
                            "failed to remove `{name}` after build failure: {cleanup}"
                        ));
                    }
                }
                Err(e.with_trace(&trace))
            }
        }
    }

    /// Current stamp of a target path: the alternate stamp source when
    /// one is configured and answers, otherwise the filesystem oracle.
    /// `None` means the artifact does not exist.
    pub(crate) async fn current_stamp(&self, name: &str) -> Result<Option<Stamp>> {
        let path = Utf8Path::new(name);

        if let Some(stamps) = &self.stamps {
            if let Some(stamp) = stamps
                .probe(path)
                .await
                .map_err(|e| BuildError::io(path, e))?
            {
                return Ok(Some(stamp));
            }
        }

        match tree_stamp(path, None, Stamp::Always).await {
            Ok(stamp) => Ok(Some(stamp)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BuildError::io(path, e)),
        }
    }
}

/// The body the wrapper transformer decorates: run the build callable if
/// the rule has one, then verify the artifact's shape, then post-process.
fn inner_body(body: Option<BuildFn>, name: &str, target_type: TargetType) -> BuildFn {
    let name = name.to_string();
    Arc::new(move |ctx: BuildContext| {
        let body = body.clone();
        let name = name.clone();
        Box::pin(async move {
            match &body {
                Some(run) => run(ctx).await?,
                None => ctx
                    .logger
                    .log(&format!("no build recipe for `{name}`; assuming up to date")),
            }
            verify_artifact(target_type, &name).await?;
            post_process(target_type, &name).await?;
            Ok(())
        })
    })
}

/// Post-build verification that the artifact matches its declared type.
async fn verify_artifact(target_type: TargetType, name: &str) -> Result<()> {
    let path = Utf8Path::new(name);
    match target_type {
        TargetType::Auto | TargetType::Phony => Ok(()),
        TargetType::File => match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => Ok(()),
            Ok(_) => Err(BuildError::new(BuildErrorKind::NotAFile {
                path: path.to_owned(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BuildError::new(BuildErrorKind::NotAFile {
                    path: path.to_owned(),
                }))
            }
            Err(e) => Err(BuildError::io(path, e)),
        },
        TargetType::Directory => match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(BuildError::new(BuildErrorKind::NotADirectory {
                path: path.to_owned(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BuildError::new(BuildErrorKind::NotADirectory {
                    path: path.to_owned(),
                }))
            }
            Err(e) => Err(BuildError::io(path, e)),
        },
    }
}

/// Directory targets get their mtime refreshed after a successful
/// build; some filesystems do not bump a directory's mtime when a
/// nested file changes.
async fn post_process(target_type: TargetType, name: &str) -> Result<()> {
    match target_type {
        TargetType::Directory => {
            let path = Utf8Path::new(name);
            tdb_io::touch_dir(path)
                .await
                .map_err(|e| BuildError::io(path, e))
        }
        _ => Ok(()),
    }
}
