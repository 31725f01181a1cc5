//! The build coordinator: memoized concurrent scheduling of targets.
//!
//! Each target gets at most one in-flight build future per [`Builder`];
//! every caller that asks for the target shares its outcome. Futures are
//! backed by spawned tasks, so work progresses whether or not a caller
//! is polling, and [`Builder::join`] can settle everything before the
//! process exits.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use camino::Utf8Path;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

use crate::error::{BuildError, BuildErrorKind, Result};
use crate::logger::{Logger, TracingLogger};
use crate::rule::{RuleSet, TargetName};
use crate::stamp::{Stamp, StampSource};

/// Concurrency mode for prerequisite builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Build prerequisites strictly one at a time, in declaration order.
    Serial,
    /// Launch all prerequisite builds concurrently.
    Parallel,
}

/// The single output of any successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Built {
    pub stamp: Stamp,
}

/// A memoized build outcome, shareable between any number of callers.
pub type BuildFuture = Shared<BoxFuture<'static, Result<Built>>>;

/// Configuration for a [`Builder`].
pub struct BuilderConfig {
    pub(crate) rules: RuleSet,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) global_prereqs: Vec<TargetName>,
    pub(crate) default_targets: Vec<TargetName>,
    pub(crate) mode: Mode,
    pub(crate) script_name: String,
    pub(crate) stamps: Option<Arc<dyn StampSource>>,
}

impl BuilderConfig {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            logger: Arc::new(TracingLogger),
            global_prereqs: Vec::new(),
            default_targets: Vec::new(),
            mode: Mode::Parallel,
            script_name: "tdb".to_string(),
            stamps: None,
        }
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Prerequisites appended to every rule's explicit list.
    pub fn global_prereqs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TargetName>,
    {
        self.global_prereqs = names.into_iter().map(Into::into).collect();
        self
    }

    /// Targets built when the command line names none.
    pub fn default_targets<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TargetName>,
    {
        self.default_targets = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Label used in usage output and log messages.
    pub fn script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = name.into();
        self
    }

    /// Alternate timestamp source, consulted before the filesystem.
    pub fn stamps(mut self, stamps: Arc<dyn StampSource>) -> Self {
        self.stamps = Some(stamps);
        self
    }

    pub fn into_builder(self) -> Arc<Builder> {
        Builder::new(self)
    }
}

/// The build coordinator.
pub struct Builder {
    pub(crate) rules: RuleSet,
    pub(crate) base_logger: Arc<dyn Logger>,
    pub(crate) effective_logger: RwLock<Arc<dyn Logger>>,
    pub(crate) global_prereqs: Vec<TargetName>,
    pub(crate) default_targets: Vec<TargetName>,
    pub(crate) configured_mode: Mode,
    pub(crate) mode: RwLock<Mode>,
    pub(crate) script_name: String,
    pub(crate) stamps: Option<Arc<dyn StampSource>>,
    /// Memo table. The lock is held across the check-then-insert so a
    /// target never gets two futures.
    pending: Mutex<HashMap<TargetName, BuildFuture>>,
}

impl Builder {
    pub fn new(config: BuilderConfig) -> Arc<Self> {
        Arc::new(Self {
            rules: config.rules,
            base_logger: config.logger.clone(),
            effective_logger: RwLock::new(config.logger),
            global_prereqs: config.global_prereqs,
            default_targets: config.default_targets,
            configured_mode: config.mode,
            mode: RwLock::new(config.mode),
            script_name: config.script_name,
            stamps: config.stamps,
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn mode(&self) -> Mode {
        *self.mode.read().unwrap()
    }

    pub(crate) fn set_mode(&self, mode: Mode) {
        *self.mode.write().unwrap() = mode;
    }

    pub(crate) fn logger(&self) -> Arc<dyn Logger> {
        self.effective_logger.read().unwrap().clone()
    }

    pub(crate) fn set_logger(&self, logger: Arc<dyn Logger>) {
        *self.effective_logger.write().unwrap() = logger;
    }

    /// Request a build of `name`. Returns the shared future for the
    /// target, creating (and starting) it if this is the first request.
    ///
    /// `trace` is the chain of target names leading to this request; it
    /// seeds error traces and catches cycles before they deadlock.
    pub fn build(self: &Arc<Self>, name: &str, trace: &[TargetName]) -> BuildFuture {
        if trace.iter().any(|t| t.as_str() == name) {
            let err = BuildError::new(BuildErrorKind::Cycle {
                target: name.to_string(),
            })
            .with_trace(&pushed(trace, name));
            return futures_util::future::ready(Err(err)).boxed().shared();
        }

        let mut pending = self.pending.lock().unwrap();
        if let Some(existing) = pending.get(name) {
            tracing::trace!(name, "joining in-flight build");
            return existing.clone();
        }

        tracing::debug!(name, "starting build");
        let this = Arc::clone(self);
        let owned_name = name.to_string();
        let owned_trace = trace.to_vec();
        let task = tokio::spawn(async move { this.run_target(owned_name, owned_trace).await });

        let future: BuildFuture = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(BuildError::msg(format!("build task aborted: {e}"))),
            }
        }
        .boxed()
        .shared();

        pending.insert(name.to_string(), future.clone());
        future
    }

    /// Build several targets and fold their stamps with `max`.
    ///
    /// The input is deduplicated preserving first occurrence. In
    /// parallel mode all sub-builds launch up front; in serial mode each
    /// completes before the next is requested.
    pub async fn build_all(
        self: &Arc<Self>,
        names: &[TargetName],
        trace: &[TargetName],
    ) -> Result<Built> {
        let names = dedup_first_occurrence(names);
        let mut latest = Stamp::Never;

        match self.mode() {
            Mode::Parallel => {
                let futures: Vec<BuildFuture> =
                    names.iter().map(|name| self.build(name, trace)).collect();
                for built in futures_util::future::try_join_all(futures).await? {
                    latest = latest.max(built.stamp);
                }
            }
            Mode::Serial => {
                for name in &names {
                    let built = self.build(name, trace).await?;
                    latest = latest.max(built.stamp);
                }
            }
        }

        Ok(Built { stamp: latest })
    }

    /// Wait for every outstanding build future to settle, success or
    /// failure. Builds spawned while the join is in progress (a rule
    /// asking for more targets dynamically) are covered: the join
    /// re-polls until a pass observes no new futures.
    pub async fn join(&self) {
        loop {
            let snapshot: Vec<BuildFuture> =
                self.pending.lock().unwrap().values().cloned().collect();
            let seen = snapshot.len();
            for future in snapshot {
                let _ = future.await;
            }
            if self.pending.lock().unwrap().len() == seen {
                break;
            }
        }
    }
}

/// Per-invocation context handed to each build callable.
#[derive(Clone)]
pub struct BuildContext {
    /// Handle back to the coordinator, for rules that request additional
    /// builds dynamically.
    pub builder: Arc<Builder>,
    pub logger: Arc<dyn Logger>,
    /// The target being built.
    pub target: TargetName,
    /// Materialized prerequisites: the rule's explicit list first, then
    /// the coordinator's global prereqs, deduplicated.
    pub prereqs: Vec<TargetName>,
    /// Chain of target names from the root request down to this target.
    pub trace: Vec<TargetName>,
}

impl BuildContext {
    /// Build additional targets from inside a rule, carrying this
    /// target's trace.
    pub async fn build_all(&self, names: &[TargetName]) -> Result<Built> {
        self.builder.build_all(names, &self.trace).await
    }

    pub fn target_path(&self) -> &Utf8Path {
        Utf8Path::new(&self.target)
    }

    /// The first prerequisite; an error when the rule has none.
    pub fn prereq(&self) -> Result<&str> {
        self.prereqs
            .first()
            .map(String::as_str)
            .ok_or_else(|| BuildError::new(BuildErrorKind::NoPrereq).with_trace(&self.trace))
    }
}

pub(crate) fn pushed(trace: &[TargetName], name: &str) -> Vec<TargetName> {
    let mut out = Vec::with_capacity(trace.len() + 1);
    out.extend_from_slice(trace);
    out.push(name.to_string());
    out
}

pub(crate) fn dedup_first_occurrence(names: &[TargetName]) -> Vec<TargetName> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        if seen.insert(name.clone()) {
            out.push(name.clone());
        }
    }
    out
}
