//! tdb - target-driven build engine
//!
//! Given a set of named build targets and the rules for producing them,
//! the engine decides which targets are out of date relative to their
//! prerequisites, invokes the builder for each stale target, and does so
//! with maximum parallelism consistent with the declared dependency
//! graph. Freshness is derived on demand from filesystem modification
//! times (recursively for directories); "phony" targets have no artifact
//! and always run.
//!
//! The usual shape of a build script:
//!
//! ```no_run
//! use tdb::{BuilderConfig, Rule, RuleSet};
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let rules = RuleSet::new()
//!         .rule(
//!             "out/app",
//!             Rule::new()
//!                 .describe("link the application")
//!                 .prereqs(["out/app.o"])
//!                 .command(["cc", "-o", "tdb:target", "tdb:prereqs"])
//!                 .target_type(tdb::TargetType::File),
//!         )
//!         .rule(
//!             "out/app.o",
//!             Rule::new()
//!                 .prereqs(["src/app.c"])
//!                 .command(["cc", "-c", "-o", "tdb:target", "tdb:prereq"])
//!                 .target_type(tdb::TargetType::File),
//!         );
//!
//!     let builder = BuilderConfig::new(rules)
//!         .default_targets(["out/app"])
//!         .script_name("build.rs")
//!         .into_builder();
//!
//!     let args: Vec<String> = std::env::args().skip(1).collect();
//!     std::process::ExitCode::from(builder.process_command_line(&args).await as u8)
//! }
//! ```

mod builder;
mod cli;
mod error;
mod invoke;
mod logger;
mod resolve;
mod rule;
mod stamp;

pub use builder::{BuildContext, BuildFuture, Builder, BuilderConfig, Built, Mode};
pub use cli::{BuildParameters, UsageError, parse_command_line_args};
pub use error::{BuildError, BuildErrorKind, Result};
pub use logger::{Filtered, Logger, NullLogger, Prefixed, TracingLogger, Verbosity};
pub use rule::{BuildFn, GenerateFn, PrereqFn, Rule, RuleSet, TargetName, TargetType, WrapFn};
pub use stamp::{Stamp, StampSource, tree_stamp};
