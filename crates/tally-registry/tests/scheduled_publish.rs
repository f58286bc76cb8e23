//! The publish thread against the system clock with a short step.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tally_core::{Counter, Statistic, SystemClock};
use tally_registry::{LoggingPublisher, StepMeterRegistry, StepRegistryConfig};
use tally_test_utils::RecordingPublisher;

fn short_step() -> StepRegistryConfig {
    StepRegistryConfig {
        prefix: "sched".to_string(),
        step: Duration::from_millis(20),
        ..StepRegistryConfig::default()
    }
}

fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn publishes_every_step_until_closed() {
    let publisher = Arc::new(RecordingPublisher::new());
    let registry =
        StepMeterRegistry::new(short_step(), SystemClock::shared(), Arc::clone(&publisher))
            .unwrap();
    let counter = registry.counter("ticks").unwrap();

    registry.start().unwrap();
    assert!(registry.is_running());
    counter.increment_by(5.0);
    wait_for("three publishes", || publisher.publish_count() >= 3);

    registry.close();
    assert!(!registry.is_running());
    let published: f64 = publisher.values("ticks", Statistic::Count).iter().sum();
    assert_eq!(published, 5.0);
    assert!(registry.last_publish_start().is_some());
}

#[test]
fn start_with_uses_the_given_thread_builder() {
    let publisher = Arc::new(RecordingPublisher::new());
    let names = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&names);
    publisher.set_pre_publish(move || {
        let name = thread::current().name().map(str::to_string);
        seen.lock().unwrap().push(name);
    });
    let registry =
        StepMeterRegistry::new(short_step(), SystemClock::shared(), Arc::clone(&publisher))
            .unwrap();
    registry.counter("named").unwrap().increment();

    registry
        .start_with(thread::Builder::new().name("metrics-poller".into()))
        .unwrap();
    wait_for("a scheduled publish", || publisher.publish_count() >= 1);
    registry.stop();

    let names = names.lock().unwrap();
    assert_eq!(names[0].as_deref(), Some("metrics-poller"));
}

#[test]
fn restart_replaces_the_running_thread() {
    let publisher = Arc::new(RecordingPublisher::new());
    let registry =
        StepMeterRegistry::new(short_step(), SystemClock::shared(), Arc::clone(&publisher))
            .unwrap();
    registry.counter("restarts").unwrap();
    registry.start().unwrap();
    registry.start().unwrap();
    assert!(registry.is_running());
    registry.stop();
    assert!(!registry.is_running());
    registry.stop();
}

#[test]
fn logging_publisher_runs_on_the_schedule() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("tally=debug,tally_registry=debug")
        .try_init();

    let config = short_step();
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&lines);
    let publisher = LoggingPublisher::with_sink(&config, move |line| {
        tracing::info!("{line}");
        sink.lock().unwrap().push(line.to_string());
    });
    let registry = StepMeterRegistry::new(config, SystemClock::shared(), publisher).unwrap();
    registry.counter("logged").unwrap().increment_by(3.0);

    registry.start().unwrap();
    registry.close();

    let lines = lines.lock().unwrap();
    assert!(
        lines.iter().any(|l| l.starts_with("logged delta_count=3 ")),
        "{lines:?}"
    );
}
