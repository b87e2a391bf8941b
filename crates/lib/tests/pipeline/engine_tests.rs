//! Scheduling, failure and cancellation behaviour of the engine.

use std::time::Duration;

use quire_lib::module::FilterDocuments;
use quire_lib::{
  CancellationToken, Engine, EngineConfig, EngineError, ExecuteError, Metadata, ModuleError, Phase, Pipeline,
  PipelineStatus, Value,
};
use tracing_test::traced_test;

use super::common::{Concat, EventLog, Explode, Fail, Hang, Record, seed, text};

fn engine() -> Engine {
  Engine::new(EngineConfig {
    parallelism: 4,
    cancel_on_failure: false,
  })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dependent_process_waits_for_dependency() {
  let log = EventLog::default();
  let mut engine = engine();
  engine
    .add_pipeline("a", Pipeline::new().input(seed(1)).process(Record::new(&log, 50)))
    .unwrap();
  engine
    .add_pipeline(
      "b",
      Pipeline::new()
        .depends_on("a")
        .input(seed(1))
        .process(Record::new(&log, 0)),
    )
    .unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();
  assert!(result.is_success());

  let a_end = log.position("end:a:process").unwrap();
  let b_start = log.position("start:b:process").unwrap();
  assert!(a_end < b_start, "events: {:?}", log.events());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_pipelines_run_concurrently() {
  let log = EventLog::default();
  let mut engine = engine();
  engine
    .add_pipeline("x", Pipeline::new().process(Record::new(&log, 100)))
    .unwrap();
  engine
    .add_pipeline("y", Pipeline::new().process(Record::new(&log, 100)))
    .unwrap();

  engine.run(CancellationToken::new()).await.unwrap();

  let events = log.events();
  let first_end = events.iter().position(|e| e.starts_with("end:")).unwrap();
  let starts_before_first_end = events[..first_end].iter().filter(|e| e.starts_with("start:")).count();
  assert_eq!(starts_before_first_end, 2, "events: {events:?}");
}

#[tokio::test]
async fn parallelism_of_one_serializes_phases() {
  let log = EventLog::default();
  let mut engine = Engine::new(EngineConfig {
    parallelism: 1,
    cancel_on_failure: false,
  });
  engine
    .add_pipeline("x", Pipeline::new().process(Record::new(&log, 20)))
    .unwrap();
  engine
    .add_pipeline("y", Pipeline::new().process(Record::new(&log, 20)))
    .unwrap();

  engine.run(CancellationToken::new()).await.unwrap();

  let events = log.events();
  assert!(events[0].starts_with("start:"));
  assert!(events[1].starts_with("end:"), "events: {events:?}");
}

#[tokio::test]
async fn cycle_is_rejected_naming_members() {
  let mut engine = engine();
  engine.add_pipeline("a", Pipeline::new().depends_on("b")).unwrap();
  engine.add_pipeline("b", Pipeline::new().depends_on("a")).unwrap();
  engine.add_pipeline("c", Pipeline::new()).unwrap();

  let err = engine.run(CancellationToken::new()).await.unwrap_err();
  assert_eq!(
    err,
    EngineError::CycleDetected {
      members: vec!["a".to_string(), "b".to_string()]
    }
  );
  assert!(err.to_string().contains("a -> b"));
}

#[tokio::test]
async fn unknown_dependency_is_fatal_before_running() {
  let log = EventLog::default();
  let mut engine = engine();
  engine
    .add_pipeline("a", Pipeline::new().input(Record::new(&log, 0)).depends_on("ghost"))
    .unwrap();

  let err = engine.run(CancellationToken::new()).await.unwrap_err();
  assert!(matches!(err, EngineError::UnknownDependency { .. }));
  assert!(log.events().is_empty());
}

#[tokio::test]
async fn dependents_read_dependency_process_output() {
  let mut engine = engine();
  engine.add_pipeline("a", Pipeline::new().input(seed(2))).unwrap();
  engine
    .add_pipeline("b", Pipeline::new().depends_on("a").process(Concat("a")))
    .unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();
  let docs = result.documents("b").unwrap();
  assert_eq!(docs.len(), 2);
  assert!(docs.iter().all(|d| text(d, "origin").as_deref() == Some("a")));
}

#[tokio::test]
async fn post_process_reads_any_shared_pipeline() {
  let log = EventLog::default();
  let mut engine = engine();
  engine
    .add_pipeline("a", Pipeline::new().input(seed(3)).process(Record::new(&log, 30)))
    .unwrap();
  engine
    .add_pipeline("b", Pipeline::new().input(seed(1)).post_process(Concat("a")))
    .unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();
  assert_eq!(result.documents("b").map(<[_]>::len), Some(4));
}

#[tokio::test]
async fn process_cannot_read_undeclared_pipeline() {
  let mut engine = engine();
  engine.add_pipeline("a", Pipeline::new().input(seed(1))).unwrap();
  engine
    .add_pipeline("b", Pipeline::new().process(Concat("a")))
    .unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();
  match result.status("b") {
    Some(PipelineStatus::Failed(ExecuteError::Module {
      phase, module, source, ..
    })) => {
      assert_eq!(*phase, Phase::Process);
      assert_eq!(module, "Concat");
      assert!(matches!(source, ModuleError::OutputsUnavailable { .. }));
    }
    other => panic!("unexpected status: {other:?}"),
  }
  assert!(result.status("a").is_some_and(PipelineStatus::is_completed));
}

#[tokio::test]
async fn isolated_pipeline_reads_nothing_but_can_be_depended_on() {
  let mut engine = engine();
  engine.add_pipeline("shared", Pipeline::new().input(seed(1))).unwrap();
  engine
    .add_pipeline("iso", Pipeline::new().isolated().input(seed(2)))
    .unwrap();
  engine
    .add_pipeline("reader", Pipeline::new().isolated().post_process(Concat("shared")))
    .unwrap();
  engine
    .add_pipeline("consumer", Pipeline::new().depends_on("iso").process(Concat("iso")))
    .unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();
  assert!(matches!(result.status("reader"), Some(PipelineStatus::Failed(_))));
  assert_eq!(result.documents("consumer").map(<[_]>::len), Some(2));
  assert_eq!(result.documents("iso").map(<[_]>::len), Some(2));
}

#[tokio::test]
async fn failure_propagates_to_dependents_only() {
  let mut engine = engine();
  engine
    .add_pipeline("a", Pipeline::new().input(seed(1)).process(Fail))
    .unwrap();
  engine.add_pipeline("b", Pipeline::new().depends_on("a")).unwrap();
  engine.add_pipeline("c", Pipeline::new().depends_on("b")).unwrap();
  engine.add_pipeline("d", Pipeline::new().input(seed(1))).unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();

  match result.status("a") {
    Some(PipelineStatus::Failed(ExecuteError::Module { pipeline, module, .. })) => {
      assert_eq!(pipeline, "a");
      assert_eq!(module, "Fail");
    }
    other => panic!("unexpected status: {other:?}"),
  }
  assert!(matches!(
    result.status("b"),
    Some(PipelineStatus::UpstreamFailed { dependency }) if dependency == "a"
  ));
  assert!(matches!(
    result.status("c"),
    Some(PipelineStatus::UpstreamFailed { dependency }) if dependency == "b"
  ));
  assert_eq!(result.documents("d").map(<[_]>::len), Some(1));
  assert_eq!(result.failed(), 3);
  assert_eq!(result.completed(), 1);
}

#[tokio::test]
async fn late_dependency_failure_fails_dependents() {
  for (failing_phase, build) in [
    (Phase::PostProcess, Pipeline::new().input(seed(1)).post_process(Fail)),
    (Phase::Output, Pipeline::new().input(seed(1)).output(Fail)),
  ] {
    let mut engine = engine();
    engine.add_pipeline("a", build).unwrap();
    engine
      .add_pipeline("b", Pipeline::new().depends_on("a").process(Concat("a")))
      .unwrap();
    engine.add_pipeline("c", Pipeline::new().depends_on("b")).unwrap();
    engine.add_pipeline("d", Pipeline::new().input(seed(1))).unwrap();

    let result = engine.run(CancellationToken::new()).await.unwrap();

    match result.status("a") {
      Some(PipelineStatus::Failed(ExecuteError::Module { phase, .. })) => assert_eq!(*phase, failing_phase),
      other => panic!("unexpected status: {other:?}"),
    }
    assert!(matches!(
      result.status("b"),
      Some(PipelineStatus::UpstreamFailed { dependency }) if dependency == "a"
    ));
    assert!(matches!(
      result.status("c"),
      Some(PipelineStatus::UpstreamFailed { dependency }) if dependency == "b"
    ));
    assert!(result.status("d").is_some_and(PipelineStatus::is_completed));
  }
}

#[tokio::test]
async fn panicking_module_is_captured() {
  let mut engine = engine();
  engine.add_pipeline("boom", Pipeline::new().process(Explode)).unwrap();
  engine.add_pipeline("after", Pipeline::new().depends_on("boom")).unwrap();
  engine.add_pipeline("fine", Pipeline::new().input(seed(1))).unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();

  match result.status("boom") {
    Some(PipelineStatus::Failed(ExecuteError::Panicked { message, .. })) => {
      assert!(message.contains("module exploded"));
    }
    other => panic!("unexpected status: {other:?}"),
  }
  assert!(matches!(result.status("after"), Some(PipelineStatus::UpstreamFailed { .. })));
  assert!(result.status("fine").is_some_and(PipelineStatus::is_completed));
}

fn cancel_after(token: &CancellationToken, ms: u64) -> tokio::task::JoinHandle<()> {
  let token = token.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    token.cancel();
  })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_keeps_completed_pipelines() {
  let mut engine = engine();
  engine.add_pipeline("quick", Pipeline::new().input(seed(2))).unwrap();
  engine
    .add_pipeline("slow", Pipeline::new().input(seed(1)).post_process(Hang))
    .unwrap();
  engine
    .add_pipeline("waiting", Pipeline::new().depends_on("slow").input(seed(1)))
    .unwrap();

  let token = CancellationToken::new();
  let canceller = cancel_after(&token, 100);

  let result = tokio::time::timeout(Duration::from_secs(5), engine.run(token))
    .await
    .expect("run should stop after cancellation")
    .unwrap();
  canceller.await.unwrap();

  assert!(result.status("quick").is_some_and(PipelineStatus::is_completed));
  assert_eq!(result.documents("quick").map(<[_]>::len), Some(2));
  assert!(matches!(result.status("slow"), Some(PipelineStatus::Cancelled)));
  // finished its own phases but was still waiting on "slow"
  assert!(matches!(result.status("waiting"), Some(PipelineStatus::Cancelled)));
  assert_eq!(result.completed(), 1);
  assert_eq!(result.cancelled(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_during_post_process_barrier() {
  let log = EventLog::default();
  let mut engine = engine();
  engine.add_pipeline("stuck", Pipeline::new().process(Hang)).unwrap();
  engine
    .add_pipeline(
      "blocked",
      Pipeline::new()
        .input(seed(1))
        .process(Record::new(&log, 0))
        .post_process(Record::new(&log, 0)),
    )
    .unwrap();

  let token = CancellationToken::new();
  let canceller = cancel_after(&token, 100);

  let result = tokio::time::timeout(Duration::from_secs(5), engine.run(token))
    .await
    .expect("run should stop after cancellation")
    .unwrap();
  canceller.await.unwrap();

  assert!(matches!(result.status("stuck"), Some(PipelineStatus::Cancelled)));
  assert!(matches!(result.status("blocked"), Some(PipelineStatus::Cancelled)));
  assert!(log.position("end:blocked:process").is_some());
  assert_eq!(log.position("start:blocked:post-process"), None);
}

#[tokio::test]
async fn cancel_on_failure_stops_the_run() {
  let mut engine = Engine::new(EngineConfig {
    parallelism: 4,
    cancel_on_failure: true,
  });
  engine.add_pipeline("bad", Pipeline::new().process(Fail)).unwrap();
  engine.add_pipeline("stuck", Pipeline::new().process(Hang)).unwrap();

  let result = tokio::time::timeout(Duration::from_secs(5), engine.run(CancellationToken::new()))
    .await
    .expect("run should stop after the failure")
    .unwrap();

  assert!(matches!(result.status("bad"), Some(PipelineStatus::Failed(_))));
  assert!(matches!(result.status("stuck"), Some(PipelineStatus::Cancelled)));
}

#[tokio::test]
async fn documents_created_through_context_inherit_settings() {
  let mut engine = engine().with_settings(Metadata::from_items([("site", "blog")]));
  engine.add_pipeline("a", Pipeline::new().input(seed(1))).unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();
  let docs = result.documents("a").unwrap();
  assert_eq!(docs[0].get_raw("site"), Some(&Value::from("blog")));
  assert_eq!(docs[0].get_raw("origin"), Some(&Value::from("a")));
}

#[tokio::test]
async fn output_phase_result_is_published() {
  let mut engine = engine();
  engine
    .add_pipeline(
      "a",
      Pipeline::new().input(seed(4)).output(FilterDocuments::new(quire_lib::Config::from_document(
        |doc, _| Ok(doc.metadata().get_raw_as::<i64>("n")?.unwrap_or(0) >= 2),
      ))),
    )
    .unwrap();

  let result = engine.run(CancellationToken::new()).await.unwrap();
  assert_eq!(result.documents("a").map(<[_]>::len), Some(2));
}

#[traced_test]
#[tokio::test]
async fn run_logs_progress() {
  let mut engine = engine();
  engine.add_pipeline("a", Pipeline::new().process(Fail)).unwrap();
  engine.add_pipeline("b", Pipeline::new().depends_on("a")).unwrap();

  engine.run(CancellationToken::new()).await.unwrap();

  assert!(logs_contain("starting pipeline execution"));
  assert!(logs_contain("pipeline failed"));
  assert!(logs_contain("skipping pipeline due to failed dependency"));
  assert!(logs_contain("pipeline execution complete"));
}
