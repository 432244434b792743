#![allow(clippy::disallowed_methods)]

mod common;

use std::collections::{HashMap, HashSet};
use std::future::pending;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{ScriptRunner, TestResult, XorShift, jobs};
use dispatch_actors::{
    BatchSource, DispatchError, Dispatcher, PayloadWorkflow, SharedWorkflow, WorkflowResolver,
};
use dispatch_core::{
    AdmissionPolicy, ConfigError, DispatchConfig, DispatchEvent, Job, JobError, ParseError,
    Workflow,
};
use tokio::sync::broadcast;

fn shared(steps: &[&str]) -> Arc<dyn WorkflowResolver> {
    Arc::new(SharedWorkflow::new(Workflow::new("test", steps.iter().copied())))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_job_runs_exactly_once() -> TestResult {
    let mut rng = XorShift::new(0x5eed_cafe);

    for trial in 0..12 {
        let n = rng.range(0, 40) as usize;
        let workers = rng.range(1, 5) as usize;
        let capacity = rng.range(0, 4) as usize;
        let policy = if rng.range(0, 1) == 0 {
            AdmissionPolicy::Block
        } else {
            AdmissionPolicy::Reject
        };
        let producers = rng.range(1, 3) as usize;

        let config = DispatchConfig::default()
            .with_workers(workers)
            .with_capacity(capacity)
            .with_policy(policy);
        let runner = ScriptRunner::new();
        let mut dispatcher = Dispatcher::builder(config, runner.shared(), shared(&["sleep 1"]))
            .start()
            .await?;

        let mut submitted = HashSet::new();
        for p in 0..producers {
            let batch: Vec<Job> = jobs(&format!("t{}-p{}", trial, p), n / producers);
            submitted.extend(batch.iter().map(|j| j.id));
            dispatcher.add_source(
                BatchSource::new(format!("producer-{}", p), batch)
                    .with_retry_delay(Duration::from_millis(2)),
            );
        }

        let summary = dispatcher.run_until(pending()).await?;

        let executed: Vec<_> = summary.report.records.iter().map(|r| r.job_id).collect();
        let unique: HashSet<_> = executed.iter().copied().collect();
        assert_eq!(
            executed.len(),
            submitted.len(),
            "trial {} (n={}, w={}, c={}, {}): lost or duplicated jobs",
            trial,
            n,
            workers,
            capacity,
            policy
        );
        assert_eq!(unique, submitted, "trial {}: executed set differs", trial);
        assert_eq!(summary.report.completed(), submitted.len());
        assert_eq!(runner.calls().len(), submitted.len());

        let accepted: u64 = summary.sources.iter().map(|s| s.submitted).sum();
        assert_eq!(accepted as usize, submitted.len());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_job_does_not_affect_others() -> TestResult {
    let resolver = |job: &Job| -> Result<Arc<Workflow>, ParseError> {
        let steps = if job.name == "bad" {
            vec!["ok", "fail", "never"]
        } else {
            vec!["ok"]
        };
        Ok(Arc::new(Workflow::new(job.name.clone(), steps)))
    };
    let runner = ScriptRunner::new();
    let config = DispatchConfig::default().with_workers(2);
    let dispatcher = Dispatcher::builder(config, runner.shared(), Arc::new(resolver))
        .start()
        .await?;

    let bad = Job::new("bad");
    let bad_id = bad.id;
    let queue = dispatcher.queue();
    queue.submit(Job::new("good-1")).await?;
    queue.submit(bad).await?;
    queue.submit(Job::new("good-2")).await?;

    let summary = dispatcher.shutdown().await?;

    assert_eq!(summary.report.executed(), 3);
    assert_eq!(summary.report.completed(), 2);
    assert_eq!(summary.report.failed(), 1);
    let record = summary.report.get(bad_id).ok_or("bad job not recorded")?;
    assert_eq!(record.outcome.failed_step(), Some(1));
    assert_eq!(runner.calls_for(bad_id), ["ok", "fail"]);
    assert!(runner.calls().iter().all(|c| c.command != "never"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panics_are_contained_to_their_job() -> TestResult {
    let resolver = |job: &Job| -> Result<Arc<Workflow>, ParseError> {
        match job.name.as_str() {
            "explode" => panic!("resolver blew up"),
            "panic-step" => Ok(Arc::new(Workflow::new("p", ["panic"]))),
            _ => Ok(Arc::new(Workflow::new("ok", ["ok"]))),
        }
    };
    let config = DispatchConfig::default().with_workers(1);
    let dispatcher = Dispatcher::builder(config, ScriptRunner::new().shared(), Arc::new(resolver))
        .start()
        .await?;

    let explode = Job::new("explode");
    let panic_step = Job::new("panic-step");
    let after = Job::new("after");
    let ids = [explode.id, panic_step.id, after.id];
    let queue = dispatcher.queue();
    for job in [explode, panic_step, after] {
        queue.submit(job).await?;
    }

    let summary = dispatcher.shutdown().await?;
    let report = &summary.report;
    assert_eq!(report.executed(), 3);

    let outcome = |i: usize| report.get(ids[i]).map(|r| r.outcome.clone());
    assert!(matches!(
        outcome(0).as_ref().and_then(|o| o.error()),
        Some(JobError::ExecutionFault { index: None, .. })
    ));
    assert!(matches!(
        outcome(1).as_ref().and_then(|o| o.error()),
        Some(JobError::ExecutionFault { index: Some(0), .. })
    ));
    assert!(outcome(2).is_some_and(|o| o.is_completed()));
    assert!(report.records.iter().all(|r| r.worker_id == "worker-1"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_definition_fails_only_that_job() -> TestResult {
    let runner = ScriptRunner::new();
    let dispatcher = Dispatcher::builder(
        DispatchConfig::default().with_workers(2),
        runner.shared(),
        Arc::new(PayloadWorkflow),
    )
    .start()
    .await?;

    let broken = Job::new("broken").with_payload(serde_json::json!({ "workflow": "{not json" }));
    let missing = Job::new("missing");
    let inline = Job::new("inline")
        .with_payload(serde_json::json!({ "workflow": { "name": "inline", "steps": ["a", "b"] } }));
    let text = Job::new("text")
        .with_payload(serde_json::json!({ "workflow": r#"{"name": "text", "steps": ["c"]}"# }));
    let (broken_id, missing_id, inline_id, text_id) = (broken.id, missing.id, inline.id, text.id);

    let queue = dispatcher.queue();
    for job in [broken, missing, inline, text] {
        queue.submit(job).await?;
    }
    let summary = dispatcher.shutdown().await?;
    let report = &summary.report;

    for id in [broken_id, missing_id] {
        let record = report.get(id).ok_or("job not recorded")?;
        assert!(matches!(
            record.outcome.error(),
            Some(JobError::Parse { .. })
        ));
        assert!(runner.calls_for(id).is_empty());
    }
    assert_eq!(runner.calls_for(inline_id), ["a", "b"]);
    assert_eq!(runner.calls_for(text_id), ["c"]);
    assert_eq!(report.completed(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_waits_for_in_flight_jobs() -> TestResult {
    let config = DispatchConfig::default().with_workers(2).with_capacity(4);
    let dispatcher = Dispatcher::builder(config, ScriptRunner::new().shared(), shared(&["sleep 150"]))
        .start()
        .await?;

    let queue = dispatcher.queue();
    for job in jobs("slow", 4) {
        queue.submit(job).await?;
    }

    let started = Instant::now();
    let summary = dispatcher.shutdown().await?;

    // Two rounds of two jobs each.
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(summary.report.executed(), 4);
    assert_eq!(summary.report.completed(), 4);
    assert_eq!(queue.stats().await, None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn events_for_each_job_arrive_in_order() -> TestResult {
    let (tx, mut rx) = broadcast::channel(4096);
    let config = DispatchConfig::default().with_workers(3);
    let dispatcher = Dispatcher::builder(config, ScriptRunner::new().shared(), shared(&["a", "b"]))
        .with_event_tx(tx)
        .start()
        .await?;

    let batch = jobs("observed", 6);
    let queue = dispatcher.queue();
    for job in &batch {
        queue.submit(job.clone()).await?;
    }
    dispatcher.shutdown().await?;

    let mut per_job: HashMap<_, Vec<String>> = HashMap::new();
    let mut workers_started = 0;
    let mut workers_exited = 0;
    let mut closes = 0;
    while let Ok(event) = rx.try_recv() {
        match &event {
            DispatchEvent::WorkerStarted { .. } => workers_started += 1,
            DispatchEvent::WorkerExited { .. } => workers_exited += 1,
            DispatchEvent::QueueClosed { .. } => closes += 1,
            _ => {}
        }
        if let Some(job_id) = event.job_id() {
            let kind = serde_json::to_value(&event)?["event"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            per_job.entry(job_id).or_default().push(kind);
        }
    }

    assert_eq!(workers_started, 3);
    assert_eq!(workers_exited, 3);
    assert_eq!(closes, 1);
    for job in &batch {
        assert_eq!(
            per_job.get(&job.id).ok_or("no events for job")?,
            &[
                "job_enqueued",
                "job_started",
                "step_started",
                "step_finished",
                "step_started",
                "step_finished",
                "job_completed",
            ]
        );
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resolver_panic_still_reports_job_started() -> TestResult {
    let resolver = |job: &Job| -> Result<Arc<Workflow>, ParseError> {
        if job.name == "explode" {
            panic!("resolver blew up");
        }
        Ok(Arc::new(Workflow::new("fine", ["ok"])))
    };
    let (tx, mut rx) = broadcast::channel(256);
    let config = DispatchConfig::default().with_workers(1).with_capacity(4);
    let dispatcher = Dispatcher::builder(config, ScriptRunner::new().shared(), Arc::new(resolver))
        .with_event_tx(tx)
        .start()
        .await?;

    let explode = Job::new("explode");
    let fine = Job::new("fine");
    let (explode_id, fine_id) = (explode.id, fine.id);
    let queue = dispatcher.queue();
    queue.submit(explode).await?;
    queue.submit(fine).await?;
    let summary = dispatcher.shutdown().await?;

    let mut kinds = Vec::new();
    let mut started_workflow = None;
    while let Ok(event) = rx.try_recv() {
        if event.job_id() != Some(explode_id) {
            continue;
        }
        if let DispatchEvent::JobStarted { workflow, .. } = &event {
            started_workflow = Some(workflow.clone());
        }
        kinds.push(
            serde_json::to_value(&event)?["event"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        );
    }
    assert_eq!(kinds, ["job_enqueued", "job_started", "job_failed"]);
    assert_eq!(started_workflow, Some(None));

    let record = summary.report.get(explode_id).ok_or("job not recorded")?;
    assert!(matches!(
        record.outcome.error(),
        Some(JobError::ExecutionFault { index: None, .. })
    ));
    // The worker survives and picks up the next job.
    assert!(summary.report.get(fine_id).is_some_and(|r| r.outcome.is_completed()));
    Ok(())
}

#[tokio::test]
async fn zero_workers_is_rejected_at_start() -> TestResult {
    let config = DispatchConfig::default().with_workers(0);
    let result = Dispatcher::builder(config, ScriptRunner::new().shared(), shared(&["a"]))
        .start()
        .await;
    assert!(matches!(
        result,
        Err(DispatchError::Config(ConfigError::NoWorkers))
    ));
    Ok(())
}
