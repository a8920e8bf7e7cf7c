// Monitor lifecycle: idempotent start/stop, bounded history, publication, shutdown

mod common;

use common::{FakeProvider, RecordingSink, established_tcp};
use netpulse::models::*;
use netpulse::monitor::{Monitor, MonitorConfig, MonitorError};
use std::sync::Arc;
use tokio::time::{Duration, Instant, sleep};

fn fast_config() -> MonitorConfig {
    MonitorConfig {
        bandwidth_interval: Duration::from_millis(10),
        connection_interval: Duration::from_millis(25),
        history_capacity: 5,
        recent_connections_limit: 10,
        shutdown_grace: Duration::from_millis(300),
    }
}

fn monitor_with(
    provider: FakeProvider,
    config: MonitorConfig,
) -> (Monitor, Arc<FakeProvider>, Arc<RecordingSink>) {
    let provider = Arc::new(provider);
    let sink = Arc::new(RecordingSink::new());
    let monitor = Monitor::new(provider.clone(), sink.clone(), config).expect("inside runtime");
    (monitor, provider, sink)
}

#[test]
fn new_outside_runtime_fails() {
    let provider = Arc::new(FakeProvider::new());
    let sink = Arc::new(RecordingSink::new());
    let err = Monitor::new(provider, sink, MonitorConfig::default()).err();
    assert!(matches!(err, Some(MonitorError::NoRuntime)));
}

#[tokio::test]
async fn starts_stopped_with_empty_views() {
    let (monitor, _, sink) = monitor_with(FakeProvider::new(), fast_config());
    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert!(monitor.history().is_empty());
    assert_eq!(monitor.connections().total_connections(), 0);
    assert_eq!(monitor.active_samplers(), 0);
    assert!(sink.states().is_empty());
}

#[tokio::test]
async fn start_twice_runs_one_pair_of_samplers() {
    let (monitor, _, sink) = monitor_with(FakeProvider::new(), fast_config());
    monitor.start();
    monitor.start();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(monitor.state(), MonitorState::Running);
    assert_eq!(monitor.active_samplers(), 2);
    assert_eq!(sink.states(), vec![MonitorState::Running]);
    monitor.shutdown().await;
}

#[tokio::test]
async fn stop_while_stopped_is_a_no_op() {
    let (monitor, _, sink) = monitor_with(FakeProvider::new(), fast_config());
    monitor.stop();
    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert!(sink.states().is_empty());

    monitor.start();
    monitor.stop();
    monitor.stop();
    assert_eq!(
        sink.states(),
        vec![MonitorState::Running, MonitorState::Stopped]
    );
    monitor.shutdown().await;
}

#[tokio::test]
async fn history_is_bounded_and_chronological() {
    let provider = FakeProvider::new().with_linear_counters(1024, 10_000);
    let (monitor, _, sink) = monitor_with(provider, fast_config());
    monitor.start();
    sleep(Duration::from_millis(200)).await;
    monitor.shutdown().await;

    let history = monitor.history();
    assert_eq!(history.len(), 5);
    assert!(history.upload_series().iter().all(|&kb| kb == 1.0));
    assert!(history.download_series().iter().all(|&kb| kb == 1.0));
    let stamps: Vec<u64> = history.iter().map(|p| p.timestamp).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));

    let lens: Vec<usize> = sink.bandwidth_updates().iter().map(|h| h.len()).collect();
    assert!(!lens.is_empty());
    assert!(lens.windows(2).all(|w| w[0] <= w[1]));
    assert!(lens.iter().all(|&n| n <= 5));
}

#[tokio::test]
async fn seed_reading_produces_no_point() {
    let provider = FakeProvider::new().with_counters(vec![(0, 0), (1024, 512), (2048, 512)]);
    let mut config = fast_config();
    config.history_capacity = 50;
    let (monitor, _, sink) = monitor_with(provider, config);
    monitor.start();
    sleep(Duration::from_millis(100)).await;
    monitor.shutdown().await;

    let first = sink.bandwidth_updates();
    assert_eq!(first[0].len(), 1);
    let history = monitor.history();
    let up = history.upload_series();
    let down = history.download_series();
    assert_eq!(&up[..2], &[1.0, 1.0]);
    assert_eq!(&down[..2], &[0.5, 0.0]);
    // script exhausted: the last reading repeats, so later rates are zero
    assert!(up[2..].iter().all(|&kb| kb == 0.0));
}

#[tokio::test]
async fn restart_begins_with_a_fresh_history() {
    let provider = FakeProvider::new().with_linear_counters(2048, 10_000);
    let (monitor, _, _) = monitor_with(provider, fast_config());
    monitor.start();
    sleep(Duration::from_millis(100)).await;
    assert!(!monitor.history().is_empty());

    monitor.stop();
    monitor.start();
    assert!(monitor.history().is_empty());

    sleep(Duration::from_millis(100)).await;
    let history = monitor.history();
    assert!(!history.is_empty());
    assert!(history.upload_series().iter().all(|&kb| kb == 2.0));
    monitor.shutdown().await;
}

#[tokio::test]
async fn connection_snapshot_is_published() {
    let provider = FakeProvider::new()
        .with_connections(vec![
            established_tcp(50000, "93.184.216.34:443", 10),
            established_tcp(50001, "93.184.216.34:80", 10),
        ])
        .with_process(10, "curl");
    let (monitor, _, sink) = monitor_with(provider, fast_config());
    let mut rx = monitor.subscribe_connections();
    monitor.start();

    tokio::time::timeout(Duration::from_secs(2), rx.changed())
        .await
        .expect("snapshot within timeout")
        .expect("monitor alive");
    let snapshot = monitor.connections();
    assert_eq!(snapshot.count(Protocol::Tcp), 2);
    assert_eq!(snapshot.distinct_remote_hosts.len(), 1);
    assert_eq!(snapshot.recent_connections[0].process_name.as_str(), "curl");
    assert!(snapshot.timestamp > 0);

    monitor.shutdown().await;
    assert!(!sink.connection_updates().is_empty());
}

#[tokio::test]
async fn connection_table_failure_skips_ticks_without_stopping() {
    let provider = FakeProvider::new().deny_connections();
    let (monitor, _, sink) = monitor_with(provider, fast_config());
    monitor.start();
    sleep(Duration::from_millis(150)).await;

    assert_eq!(monitor.active_samplers(), 2);
    assert!(monitor.stats().skipped_ticks > 0);
    assert_eq!(monitor.stats().connection_ticks, 0);
    assert!(sink.connection_updates().is_empty());
    assert!(monitor.stats().bandwidth_ticks > 0);
    monitor.shutdown().await;
}

#[tokio::test]
async fn shutdown_after_stop_is_prompt_and_final() {
    let provider = FakeProvider::new().with_linear_counters(1024, 10_000);
    let mut config = fast_config();
    config.connection_interval = Duration::from_secs(2);
    let (monitor, provider, sink) = monitor_with(provider, config);
    monitor.start();
    sleep(Duration::from_millis(60)).await;

    monitor.stop();
    let started = Instant::now();
    monitor.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(monitor.active_samplers(), 0);
    assert_eq!(monitor.state(), MonitorState::Stopped);

    let reads = provider.counter_reads();
    let updates = sink.bandwidth_updates().len();
    let history = monitor.history();
    sleep(Duration::from_millis(60)).await;
    assert_eq!(provider.counter_reads(), reads);
    assert_eq!(sink.bandwidth_updates().len(), updates);
    assert_eq!(monitor.history(), history);
}

#[tokio::test]
async fn shutdown_without_start_returns_immediately() {
    let (monitor, _, sink) = monitor_with(FakeProvider::new(), fast_config());
    monitor.shutdown().await;
    assert_eq!(monitor.state(), MonitorState::Stopped);
    assert!(sink.states().is_empty());
}

async fn wait_until_held(provider: &FakeProvider) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !provider.read_is_held() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("counter read parked");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_during_a_tick_still_publishes_it() {
    let provider = FakeProvider::new()
        .with_counters(vec![(0, 0), (1024, 1024)])
        .hold_read(1);
    let mut config = fast_config();
    config.connection_interval = Duration::from_secs(2);
    let (monitor, provider, sink) = monitor_with(provider, config);
    monitor.start();
    wait_until_held(&provider).await;

    monitor.stop();
    provider.release_read();
    monitor.shutdown().await;

    assert_eq!(monitor.active_samplers(), 0);
    let updates = sink.bandwidth_updates();
    assert_eq!(updates.len(), 1);
    let history = monitor.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history.upload_series(), vec![1.0]);
    assert_eq!(history.download_series(), vec![1.0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tick_from_a_stopped_run_does_not_reach_a_newer_run() {
    let provider = FakeProvider::new()
        .with_counters(vec![(0, 0), (1024, 1024)])
        .hold_read(1);
    let mut config = fast_config();
    config.connection_interval = Duration::from_secs(2);
    let (monitor, provider, sink) = monitor_with(provider, config);
    monitor.start();
    wait_until_held(&provider).await;

    monitor.stop();
    monitor.start();
    provider.release_read();
    sleep(Duration::from_millis(80)).await;
    monitor.shutdown().await;

    let history = monitor.history();
    assert!(!history.is_empty());
    assert!(history.upload_series().iter().all(|&kb| kb == 0.0));
    assert!(
        sink.bandwidth_updates()
            .iter()
            .all(|h| h.upload_series().iter().all(|&kb| kb == 0.0))
    );
}
