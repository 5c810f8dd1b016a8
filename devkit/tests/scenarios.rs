//! End-to-end scheduler scenarios on virtual time
//!
//! Every test runs the real `Scheduler` against the in-memory store and the
//! scripted prober; `start_paused` makes a 300s round cost nothing.

use pingport::{Health, TimeSeriesStore};
use pingport_devkit::TestHarness;
use std::time::Duration;

const F: bool = false;
const T: bool = true;

#[tokio::test(start_paused = true)]
async fn test_always_refusing_host_goes_down_on_fifth_round() {
    let mut harness = TestHarness::new();
    harness.host("db-1", "10.0.0.5");
    harness.script("db-1", &[F]);

    harness.run_rounds(7).await.unwrap();

    assert_eq!(
        harness.health_history("db-1"),
        vec![
            Health::Failed,
            Health::Failed,
            Health::Failed,
            Health::Failed,
            Health::Down,
            Health::Down,
            Health::Down,
        ]
    );

    let samples = harness.store.samples(&harness.key("db-1"));
    assert_eq!(samples.len(), 7);
    assert!(samples.iter().all(|s| s.connect == 0.0 && s.time == 0.0));
}

#[tokio::test(start_paused = true)]
async fn test_alternating_host_is_flappy_on_each_failure() {
    let mut harness = TestHarness::new();
    harness.host("web-1", "10.0.0.1");
    harness.script("web-1", &[T, F]);

    harness.run_rounds(6).await.unwrap();

    assert_eq!(
        harness.health_history("web-1"),
        vec![Health::Ok, Health::Flappy, Health::Ok, Health::Flappy, Health::Ok, Health::Flappy]
    );

    // Succès stockés avec le timeout comme valeur de connect
    let connects: Vec<f64> = harness
        .store
        .samples(&harness.key("web-1"))
        .iter()
        .map(|s| s.connect)
        .collect();
    assert_eq!(connects, vec![30.0, 0.0, 30.0, 0.0, 30.0, 0.0]);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_then_single_failure_is_flappy() {
    let mut harness = TestHarness::new();
    harness.host("web-2", "10.0.0.2");
    harness.script("web-2", &[F, F, F, F, F, T, F]);

    harness.run_rounds(7).await.unwrap();

    assert_eq!(
        harness.health_history("web-2"),
        vec![
            Health::Failed,
            Health::Failed,
            Health::Failed,
            Health::Failed,
            Health::Down,
            Health::Ok,
            Health::Flappy,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_success_in_window_delays_down() {
    let mut harness = TestHarness::new();
    harness.host("mail", "10.0.0.9");
    harness.script("mail", &[F, F, T, F, F, F, F, F]);

    harness.run_rounds(8).await.unwrap();

    assert_eq!(
        harness.health_history("mail"),
        vec![
            Health::Failed,
            Health::Failed,
            Health::Ok,
            Health::Flappy,
            Health::Failed,
            Health::Failed,
            Health::Failed,
            Health::Down,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_host_is_never_probed() {
    let mut harness = TestHarness::new();
    harness
        .host("web-1", "10.0.0.1")
        .unresolvable("ghost.invalid")
        .expect_samples("web-1", 3)
        .expect_samples("ghost.invalid", 0);

    let reports = harness.run_rounds(3).await.unwrap();
    assert!(reports.iter().all(|r| r.hosts.len() == 1));

    let scheduler = harness.scheduler().unwrap();
    assert_eq!(scheduler.hosts().skipped(), &["ghost.invalid".to_string()]);
    assert_eq!(harness.prober.total_probes(), 3);
    assert!(harness.health_history("ghost.invalid").is_empty());
    assert_eq!(harness.store.series_count(), 1);

    harness.verify_expectations().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_second_name_on_same_address_is_skipped() {
    let mut harness = TestHarness::new();
    harness.host("www", "10.0.0.1").host("blog", "10.0.0.1");
    harness.script("www", &[T, F]);

    let reports = harness.run_rounds(4).await.unwrap();
    assert!(reports.iter().all(|r| r.hosts.len() == 1 && r.store_errors() == 0));

    let scheduler = harness.scheduler().unwrap();
    assert_eq!(scheduler.hosts().skipped(), &["blog".to_string()]);
    assert!(harness.health_history("blog").is_empty());
    assert_eq!(
        harness.health_history("www"),
        vec![Health::Ok, Health::Flappy, Health::Ok, Health::Flappy]
    );

    // Une seule écriture par round sur la série partagée
    assert_eq!(harness.store.sample_count(&harness.key("www")), 4);
    assert_eq!(harness.prober.probe_count(harness.addr("www")), 4);
}

#[tokio::test(start_paused = true)]
async fn test_one_sample_per_host_per_round() {
    let mut harness = TestHarness::new();
    harness
        .host("a", "10.0.1.1")
        .host("b", "10.0.1.2")
        .host("c", "10.0.1.3")
        .expect_samples("a", 4)
        .expect_samples("b", 4)
        .expect_samples("c", 4);
    harness.script("b", &[F]).script("c", &[T, F, F]);

    let reports = harness.run_rounds(4).await.unwrap();
    assert!(reports.iter().all(|r| r.hosts.len() == 3 && r.store_errors() == 0));

    harness.verify_expectations().unwrap();
    for name in ["a", "b", "c"] {
        assert_eq!(harness.prober.probe_count(harness.addr(name)), 4);
    }
    harness.get_stats().print();
}

#[tokio::test(start_paused = true)]
async fn test_samples_are_one_interval_apart() {
    let mut harness = TestHarness::new();
    harness.host("web-1", "10.0.0.1");

    harness.run_rounds(4).await.unwrap();

    let samples = harness.store.samples(&harness.key("web-1"));
    let gaps: Vec<i64> = samples
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds())
        .collect();
    assert_eq!(gaps, vec![300, 300, 300]);
}

#[tokio::test(start_paused = true)]
async fn test_drift_stays_bounded_with_slow_host() {
    let mut harness = TestHarness::new();
    harness.host("slow", "10.0.2.1").host("fast", "10.0.2.2");
    harness.latency("slow", Duration::from_secs(20));

    let reports = harness.run_rounds(10).await.unwrap();

    // Chaque round dure pause + 20s, la pause suivante absorbe ces 20s
    for report in reports {
        assert!(
            (report.drift - 20.0).abs() < 1e-6,
            "round {} drift {}",
            report.round,
            report.drift
        );
    }

    let cadence = harness.scheduler().unwrap().cadence().unwrap();
    assert_eq!(cadence.round(), 10);
    assert!((cadence.drift() - 20.0).abs() < 1e-6);

    let samples = harness.store.samples(&harness.key("slow"));
    assert!(samples.iter().all(|s| s.time == 20.0));
    let gaps: Vec<i64> = samples
        .windows(2)
        .skip(1)
        .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds())
        .collect();
    assert!(gaps.iter().all(|gap| *gap == 300), "gaps {:?}", gaps);
}

#[tokio::test(start_paused = true)]
async fn test_failed_update_is_retried_once() {
    let mut harness = TestHarness::new();
    harness.host("web-1", "10.0.0.1").host("web-2", "10.0.0.2");
    let key = harness.key("web-1");

    harness.store.fail_next_updates(&key, 1);
    let report = harness.run_rounds(1).await.unwrap()[0].clone();
    assert_eq!(report.store_errors(), 0);
    assert_eq!(harness.store.sample_count(&key), 1);

    harness.store.fail_next_updates(&key, 2);
    let report = harness.run_rounds(1).await.unwrap()[0].clone();
    assert_eq!(report.store_errors(), 1);
    assert_eq!(harness.store.sample_count(&key), 1);
    assert_eq!(harness.samples("web-2"), 2);

    // Le round suivant n'est pas affecté
    let report = harness.run_rounds(1).await.unwrap()[0].clone();
    assert_eq!(report.store_errors(), 0);
    assert_eq!(harness.store.sample_count(&key), 2);
}

#[tokio::test(start_paused = true)]
async fn test_restart_keeps_existing_series() {
    let mut harness = TestHarness::new();
    harness.host("a", "10.0.3.1").host("b", "10.0.3.2");

    harness.run_rounds(2).await.unwrap();
    assert_eq!(harness.store.create_calls(), 2);

    // Nouveau scheduler sur le même store : create ne touche pas l'historique
    harness.build().await.unwrap();
    assert_eq!(harness.store.create_calls(), 4);
    assert_eq!(harness.store.series_count(), 2);
    assert_eq!(harness.samples("a"), 2);

    harness.run_rounds(1).await.unwrap();
    assert_eq!(harness.samples("a"), 3);
    assert_eq!(harness.samples("b"), 3);

    let last = harness.store.last_sample(&harness.key("a")).unwrap().unwrap();
    assert_eq!(last.connect, 30.0);
}
