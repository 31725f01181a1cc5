//! Scheduling tests: memoization, serial vs parallel ordering, dynamic
//! builds and join semantics.

mod harness;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use harness::{CaptureLogger, TestEnv};
use tdb::{BuildParameters, BuilderConfig, Mode, Rule, RuleSet, TargetType};

fn root_trace() -> Vec<String> {
    vec!["root".to_string()]
}

/// Phony rule that records its invocation count.
fn counting_rule(calls: &Arc<AtomicUsize>) -> Rule {
    let counter = calls.clone();
    Rule::new().target_type(TargetType::Phony).run(move |_ctx| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

#[tokio::test]
async fn diamond_builds_the_shared_prereq_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let rules = RuleSet::new()
        .rule("shared", counting_rule(&calls))
        .rule(
            "e1",
            Rule::new().prereqs(["shared"]).target_type(TargetType::Phony),
        )
        .rule(
            "e2",
            Rule::new().prereqs(["shared"]).target_type(TargetType::Phony),
        )
        .rule(
            "d",
            Rule::new().prereqs(["e1", "e2"]).target_type(TargetType::Phony),
        );
    let builder = BuilderConfig::new(rules).into_builder();

    let built = builder.build("d", &root_trace()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(built.stamp, tdb::Stamp::Always);
}

#[tokio::test]
async fn repeated_requests_share_one_outcome() {
    let calls = Arc::new(AtomicUsize::new(0));
    let rules = RuleSet::new().rule("once", counting_rule(&calls));
    let builder = BuilderConfig::new(rules).into_builder();

    let (first, second) = tokio::join!(
        builder.build("once", &root_trace()),
        builder.build("once", &root_trace()),
    );
    let first = first.unwrap();
    let second = second.unwrap();
    let third = builder.build("once", &root_trace()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
    assert_eq!(first, third);
}

#[tokio::test]
async fn duplicate_names_in_one_request_are_deduplicated() {
    let calls = Arc::new(AtomicUsize::new(0));
    let rules = RuleSet::new().rule("t", counting_rule(&calls));
    let builder = BuilderConfig::new(rules).into_builder();

    builder
        .build_all(
            &["t".to_string(), "t".to_string(), "t".to_string()],
            &root_trace(),
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn build_all_of_nothing_reports_never() {
    let builder = BuilderConfig::new(RuleSet::new()).into_builder();
    let built = builder.build_all(&[], &root_trace()).await.unwrap();
    assert_eq!(built.stamp, tdb::Stamp::Never);
}

#[tokio::test]
async fn serial_mode_finishes_each_prereq_before_the_next() {
    let events: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::default();

    let recording = |start: &'static str, end: &'static str| {
        let events = events.clone();
        Rule::new().target_type(TargetType::Phony).run(move |_ctx| {
            let events = events.clone();
            async move {
                events.lock().unwrap().push(start);
                tokio::time::sleep(Duration::from_millis(10)).await;
                events.lock().unwrap().push(end);
                Ok(())
            }
        })
    };

    let rules = RuleSet::new()
        .rule("a", recording("start a", "end a"))
        .rule("b", recording("start b", "end b"))
        .rule(
            "all",
            Rule::new().prereqs(["a", "b"]).target_type(TargetType::Phony),
        );
    let builder = BuilderConfig::new(rules).mode(Mode::Serial).into_builder();

    builder.build("all", &root_trace()).await.unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        ["start a", "end a", "start b", "end b"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_mode_overlaps_sibling_prereqs() {
    // both rules must be in flight at once for the barrier to clear
    let barrier = Arc::new(tokio::sync::Barrier::new(2));

    let meeting = || {
        let barrier = barrier.clone();
        Rule::new().target_type(TargetType::Phony).run(move |_ctx| {
            let barrier = barrier.clone();
            async move {
                barrier.wait().await;
                Ok(())
            }
        })
    };

    let rules = RuleSet::new()
        .rule("left", meeting())
        .rule("right", meeting())
        .rule(
            "both",
            Rule::new()
                .prereqs(["left", "right"])
                .target_type(TargetType::Phony),
        );
    let builder = BuilderConfig::new(rules).mode(Mode::Parallel).into_builder();

    tokio::time::timeout(Duration::from_secs(5), builder.build("both", &root_trace()))
        .await
        .expect("parallel siblings must overlap")
        .unwrap();
}

#[tokio::test]
async fn wrapper_transformer_decorates_the_build_body() {
    let events: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::default();

    let body_events = events.clone();
    let wrap_events = events.clone();
    let rules = RuleSet::new().rule(
        "wrapped",
        Rule::new()
            .target_type(TargetType::Phony)
            .run(move |_ctx| {
                let events = body_events.clone();
                async move {
                    events.lock().unwrap().push("body");
                    Ok(())
                }
            })
            .wrap(move |inner| {
                let events = wrap_events.clone();
                Arc::new(move |ctx| {
                    let inner = inner.clone();
                    let events = events.clone();
                    Box::pin(async move {
                        events.lock().unwrap().push("before");
                        let result = inner(ctx).await;
                        events.lock().unwrap().push("after");
                        result
                    })
                })
            }),
    );
    let builder = BuilderConfig::new(rules).into_builder();

    builder.build("wrapped", &root_trace()).await.unwrap();

    assert_eq!(*events.lock().unwrap(), ["before", "body", "after"]);
}

#[tokio::test]
async fn global_prereqs_follow_explicit_ones() {
    let env = TestEnv::new();
    env.write_file("explicit.txt", "e");
    env.write_file("global.txt", "g");

    let seen: Arc<std::sync::Mutex<Vec<String>>> = Arc::default();
    let capture = seen.clone();
    let rules = RuleSet::new().rule(
        "top",
        Rule::new()
            .prereqs([env.target("explicit.txt")])
            .target_type(TargetType::Phony)
            .run(move |ctx| {
                let capture = capture.clone();
                async move {
                    capture.lock().unwrap().extend(ctx.prereqs.iter().cloned());
                    Ok(())
                }
            }),
    );
    let builder = BuilderConfig::new(rules)
        .global_prereqs([env.target("global.txt")])
        .into_builder();

    builder.build("top", &root_trace()).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        [env.target("explicit.txt"), env.target("global.txt")]
    );
}

#[tokio::test]
async fn rules_can_request_additional_builds_dynamically() {
    let env = TestEnv::new();
    let extra = env.target("extra.txt");
    let extra_path = env.path("extra.txt");

    let rules = RuleSet::new()
        .rule(
            extra.clone(),
            Rule::new().run(move |_ctx| {
                let extra_path = extra_path.clone();
                async move {
                    tokio::fs::write(&extra_path, b"made on demand").await?;
                    Ok(())
                }
            }),
        )
        .rule(
            "driver",
            Rule::new().target_type(TargetType::Phony).run(move |ctx| {
                let extra = extra.clone();
                async move {
                    ctx.build_all(&[extra]).await?;
                    Ok(())
                }
            }),
        );
    let builder = BuilderConfig::new(rules).into_builder();

    builder.build("driver", &root_trace()).await.unwrap();

    assert_eq!(env.read_file("extra.txt"), "made on demand");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn join_settles_builds_spawned_without_awaiting() {
    let finished = Arc::new(AtomicBool::new(false));

    let flag = finished.clone();
    let rules = RuleSet::new()
        .rule(
            "background",
            Rule::new().target_type(TargetType::Phony).run(move |_ctx| {
                let flag = flag.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .rule(
            "spawner",
            Rule::new().target_type(TargetType::Phony).run(|ctx| async move {
                // fire and forget; join must still wait for it
                let _ = ctx.builder.build("background", &ctx.trace);
                Ok(())
            }),
        );
    let builder = BuilderConfig::new(rules).into_builder();

    builder.build("spawner", &root_trace()).await.unwrap();
    builder.join().await;

    assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn serial_builders_refuse_a_parallel_downgrade() {
    let logger = CaptureLogger::shared();
    let builder = BuilderConfig::new(RuleSet::new())
        .mode(Mode::Serial)
        .logger(logger.clone())
        .into_builder();

    let params = BuildParameters {
        mode: Some(Mode::Parallel),
        ..Default::default()
    };
    builder.run(params).await.unwrap();

    assert_eq!(builder.mode(), Mode::Serial);
    assert!(logger.contains("ignoring --parallel"));
}

#[tokio::test]
async fn parallel_builders_accept_a_serial_override() {
    let builder = BuilderConfig::new(RuleSet::new())
        .mode(Mode::Parallel)
        .logger(CaptureLogger::shared())
        .into_builder();

    let params = BuildParameters {
        mode: Some(Mode::Serial),
        ..Default::default()
    };
    builder.run(params).await.unwrap();

    assert_eq!(builder.mode(), Mode::Serial);
}

#[tokio::test]
async fn default_targets_build_when_none_are_requested() {
    let calls = Arc::new(AtomicUsize::new(0));
    let rules = RuleSet::new().rule("default-job", counting_rule(&calls));
    let builder = BuilderConfig::new(rules)
        .default_targets(["default-job"])
        .logger(CaptureLogger::shared())
        .into_builder();

    let code = builder.process_command_line(&[]).await;

    assert_eq!(code, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
