//! Rule declarations and the rule registry.
//!
//! A [`Rule`] is the declarative recipe for one target: its
//! prerequisites, how to build it (an inline async callable or an
//! external command, never both), what shape the artifact must have
//! afterwards, and what to do with the artifact if the build fails.
//! A [`RuleSet`] holds rules keyed by target name, plus an optional
//! lazy hook producing generated rules that is resolved once and cached.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::OnceCell;

use crate::builder::BuildContext;
use crate::error::{BuildError, Result};

/// A string key identifying a target. Doubles as the filesystem path for
/// file, directory and auto targets.
pub type TargetName = String;

/// Inline build callable: the body of a rule.
pub type BuildFn = Arc<dyn Fn(BuildContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrapper transformer: receives the effective build callable and
/// returns a replacement. The supported hook for per-rule mutexes,
/// timing, tracing and similar decoration.
pub type WrapFn = Arc<dyn Fn(BuildFn) -> BuildFn + Send + Sync>;

/// Lazy prerequisite list, drained when the rule is resolved.
pub type PrereqFn = Arc<dyn Fn() -> Vec<TargetName> + Send + Sync>;

/// Hook producing generated rules, resolved at most once per registry.
pub type GenerateFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<(TargetName, Rule)>>> + Send + Sync>;

/// What kind of artifact a target produces, and therefore how the engine
/// verifies and post-processes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetType {
    /// No post-verification; mtime read if the artifact is present.
    #[default]
    Auto,
    /// Must stat as a regular file after a successful build. Partial
    /// artifacts are deleted on failure unless the rule says otherwise.
    File,
    /// Must stat as a directory after a successful build; the engine
    /// refreshes its mtime afterwards.
    Directory,
    /// No filesystem artifact; always stale, reports [`crate::Stamp::Always`]
    /// on success.
    Phony,
}

#[derive(Clone)]
pub(crate) enum Prereqs {
    Eager(Vec<TargetName>),
    Lazy(PrereqFn),
}

impl Prereqs {
    pub(crate) fn materialize(&self) -> Vec<TargetName> {
        match self {
            Prereqs::Eager(names) => names.clone(),
            Prereqs::Lazy(f) => f(),
        }
    }
}

impl Default for Prereqs {
    fn default() -> Self {
        Prereqs::Eager(Vec::new())
    }
}

/// The declarative recipe for building one target.
#[derive(Clone, Default)]
pub struct Rule {
    pub(crate) describe: Option<String>,
    pub(crate) prereqs: Prereqs,
    pub(crate) run: Option<BuildFn>,
    pub(crate) command: Option<Vec<String>>,
    pub(crate) wrap: Option<WrapFn>,
    pub(crate) target_type: TargetType,
    pub(crate) keep_on_failure: Option<bool>,
}

impl Rule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Human description, shown by `--describe-targets`.
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.describe = Some(text.into());
        self
    }

    /// Ordered prerequisites.
    pub fn prereqs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TargetName>,
    {
        self.prereqs = Prereqs::Eager(names.into_iter().map(Into::into).collect());
        self
    }

    /// Prerequisites computed lazily, at resolve time.
    pub fn prereqs_with(mut self, f: impl Fn() -> Vec<TargetName> + Send + Sync + 'static) -> Self {
        self.prereqs = Prereqs::Lazy(Arc::new(f));
        self
    }

    /// Inline async build callable. Mutually exclusive with [`Rule::command`].
    pub fn run<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(BuildContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.run = Some(Arc::new(move |ctx| Box::pin(f(ctx))));
        self
    }

    /// External command argument vector. Arguments get directive
    /// rewriting before spawn (`tdb:target`, `tdb:prereqs`, ...).
    /// Mutually exclusive with [`Rule::run`].
    pub fn command<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(argv.into_iter().map(Into::into).collect());
        self
    }

    /// Wrapper transformer around the effective build callable.
    pub fn wrap(mut self, f: impl Fn(BuildFn) -> BuildFn + Send + Sync + 'static) -> Self {
        self.wrap = Some(Arc::new(f));
        self
    }

    pub fn target_type(mut self, target_type: TargetType) -> Self {
        self.target_type = target_type;
        self
    }

    /// Explicit failure file policy. Unset means: delete the artifact on
    /// failure when the target type is `File`, keep it otherwise.
    pub fn keep_on_failure(mut self, keep: bool) -> Self {
        self.keep_on_failure = Some(keep);
        self
    }

    pub fn description(&self) -> Option<&str> {
        self.describe.as_deref()
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("describe", &self.describe)
            .field("run", &self.run.as_ref().map(|_| ".."))
            .field("command", &self.command)
            .field("target_type", &self.target_type)
            .field("keep_on_failure", &self.keep_on_failure)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Generated {
    order: Vec<TargetName>,
    rules: HashMap<TargetName, Arc<Rule>>,
}

/// Rules keyed by target name.
///
/// Static rules are registered up front; generated rules come from an
/// optional async hook that runs on first lookup and is cached forever
/// after. On a name collision the generated rule wins. Enumeration order
/// for the listing commands is static rules first, then generated ones,
/// each in insertion order.
#[derive(Default)]
pub struct RuleSet {
    order: Vec<TargetName>,
    rules: HashMap<TargetName, Arc<Rule>>,
    generate: Option<GenerateFn>,
    generated: OnceCell<Generated>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a static rule. A later insert for the same name replaces
    /// the earlier one without changing its enumeration position.
    pub fn rule(mut self, name: impl Into<TargetName>, rule: Rule) -> Self {
        self.insert(name, rule);
        self
    }

    pub fn insert(&mut self, name: impl Into<TargetName>, rule: Rule) {
        let name = name.into();
        if !self.rules.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.rules.insert(name, Arc::new(rule));
    }

    /// Install the generated-rules hook.
    pub fn generate_with<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<(TargetName, Rule)>>> + Send + 'static,
    {
        self.generate = Some(Arc::new(move || Box::pin(f())));
        self
    }

    async fn generated(&self) -> Result<&Generated> {
        self.generated
            .get_or_try_init(|| async {
                let Some(generate) = &self.generate else {
                    return Ok(Generated::default());
                };
                tracing::debug!("materializing generated rules");
                let mut generated = Generated::default();
                for (name, rule) in generate().await? {
                    if !generated.rules.contains_key(&name) {
                        generated.order.push(name.clone());
                    }
                    generated.rules.insert(name, Arc::new(rule));
                }
                Ok::<_, BuildError>(generated)
            })
            .await
    }

    /// Look up the rule for `name`, materializing generated rules on
    /// first use. Generated rules shadow static ones.
    pub async fn lookup(&self, name: &str) -> Result<Option<Arc<Rule>>> {
        let generated = self.generated().await?;
        if let Some(rule) = generated.rules.get(name) {
            return Ok(Some(rule.clone()));
        }
        Ok(self.rules.get(name).cloned())
    }

    /// All rules in enumeration order: static first, then generated
    /// names that did not collide with a static one. Collisions keep the
    /// static position but resolve to the generated rule.
    pub async fn materialized(&self) -> Result<Vec<(TargetName, Arc<Rule>)>> {
        let generated = self.generated().await?;
        let mut out = Vec::with_capacity(self.order.len() + generated.order.len());
        for name in &self.order {
            let rule = generated
                .rules
                .get(name)
                .or_else(|| self.rules.get(name))
                .expect("registered name must resolve");
            out.push((name.clone(), rule.clone()));
        }
        for name in &generated.order {
            if !self.rules.contains_key(name) {
                out.push((name.clone(), generated.rules[name].clone()));
            }
        }
        Ok(out)
    }
}

impl<S: Into<TargetName>> FromIterator<(S, Rule)> for RuleSet {
    fn from_iter<I: IntoIterator<Item = (S, Rule)>>(iter: I) -> Self {
        let mut set = RuleSet::new();
        for (name, rule) in iter {
            set.insert(name, rule);
        }
        set
    }
}
