//! Security Monitor Integration Tests
//!
//! ルール評価からイベント配信、フィードバック学習までのパイプライン全体をテストします。

use chrono::{Duration, Utc};
use netsentinel_rs::security::ids::ml::{MLConfig, ThreatDetectionEngine};
use netsentinel_rs::security::ids::{
    MonitorConfig, MonitorState, RequestObservation, ResourceSample, ResponseSummary,
    SecurityEvent, SecurityEventType, SecurityMonitor, Severity,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// テスト用の軽量ML設定
fn light_ml(seed: u64) -> MLConfig {
    MLConfig {
        forest_trees: 7,
        isolation_trees: 15,
        seed: Some(seed),
        ..MLConfig::default()
    }
}

/// 稼働中のモニターを作成
async fn start_monitor(config: MonitorConfig, seed: u64) -> Arc<SecurityMonitor> {
    let engine = Arc::new(ThreatDetectionEngine::new(light_ml(seed)).await);
    let monitor = Arc::new(SecurityMonitor::new(config, engine));
    monitor.start().await.unwrap();
    monitor
}

fn transport_failure(host: &str) -> RequestObservation {
    RequestObservation::failed(format!("https://{}/", host), "connection refused", 5.0)
}

#[tokio::test]
async fn test_domain_burst_emits_single_resource_abuse() {
    let monitor = start_monitor(MonitorConfig::default(), 1).await;
    let start = Utc::now();

    let mut emitted = Vec::new();
    for i in 0..101 {
        let observation =
            RequestObservation::completed("https://api.example.com/v1/items", 200, 40.0, 1_024)
                .at(start + Duration::milliseconds(i * 5));
        emitted.push(monitor.observe_request(observation).await);
    }

    assert!(
        emitted[..100].iter().all(Vec::is_empty),
        "No event before the threshold is crossed"
    );
    assert_eq!(emitted[100].len(), 1);

    let event = &emitted[100][0];
    assert_eq!(event.event_type, SecurityEventType::ResourceAbuse);
    assert_eq!(event.severity, Severity::Medium);
    assert_eq!(event.source, "api.example.com");

    let prediction = event.prediction.as_ref().expect("prediction attached");
    assert!((0.0..=1.0).contains(&prediction.threat_score));
    assert!((0.0..=1.0).contains(&prediction.confidence));

    let stats = monitor.stats().await;
    assert_eq!(stats.total_events, 1);
    assert_eq!(stats.observed_signals, 101);
}

#[tokio::test]
async fn test_window_expiry_allows_refire() {
    let config = MonitorConfig {
        domain_request_threshold: 3,
        observation_window_secs: 10,
        ..MonitorConfig::default()
    };
    let monitor = start_monitor(config, 2).await;
    let start = Utc::now();

    let mut fired = 0;
    for burst in 0..2 {
        let base = start + Duration::seconds(burst * 30);
        for i in 0..4 {
            let observation = RequestObservation::completed("https://cdn.test/a", 200, 10.0, 10)
                .at(base + Duration::milliseconds(i * 100));
            fired += monitor.observe_request(observation).await.len();
        }
    }

    assert_eq!(fired, 2);
}

#[tokio::test]
async fn test_ring_buffer_keeps_newest_hundred() {
    let monitor = start_monitor(MonitorConfig::default(), 3).await;

    let mut ids = Vec::new();
    for i in 0..120 {
        let events = monitor
            .observe_request(transport_failure(&format!("host{}.test", i)))
            .await;
        assert_eq!(events.len(), 1);
        ids.push(events[0].id);
    }

    let buffered: Vec<Uuid> = monitor.events().await.iter().map(|e| e.id).collect();
    assert_eq!(buffered.len(), 100);
    assert_eq!(buffered, ids[20..].to_vec());

    let stats = monitor.stats().await;
    assert_eq!(stats.total_events, 120);
    assert_eq!(stats.evicted_events, 20);
    assert_eq!(
        stats.events_by_type[&SecurityEventType::SuspiciousRequest],
        120
    );
}

#[tokio::test]
async fn test_unsubscribe_mid_stream() {
    let monitor = start_monitor(MonitorConfig::default(), 4).await;

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&first);
    let handle = monitor.on_security_event(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&second);
    let _keep = monitor.on_security_event(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    for i in 0..3 {
        monitor
            .observe_request(transport_failure(&format!("a{}.test", i)))
            .await;
    }
    assert!(handle.unsubscribe());
    for i in 0..2 {
        monitor
            .observe_request(transport_failure(&format!("b{}.test", i)))
            .await;
    }

    assert_eq!(first.load(Ordering::SeqCst), 3);
    assert_eq!(second.load(Ordering::SeqCst), 5);
    assert!(!monitor.unsubscribe(handle.id()));
}

#[tokio::test]
async fn test_callbacks_and_channel_preserve_firing_order() {
    let monitor = start_monitor(MonitorConfig::default(), 5).await;
    let mut rx = monitor.subscribe_events();

    let seen: Arc<Mutex<Vec<(Uuid, SecurityEventType)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _handle = monitor.on_security_event(move |event| {
        sink.lock().unwrap().push((event.id, event.event_type));
    });

    // 低速応答 + 大容量転送の2ルールが同時に発火する
    let mut fired = monitor
        .observe_request(RequestObservation::completed(
            "https://media.example.com/archive.zip",
            200,
            11_000.0,
            64 * 1024 * 1024,
        ))
        .await;
    fired.extend(
        monitor
            .observe_resource_usage(ResourceSample {
                memory_used: 97,
                memory_limit: 100,
                cpu_usage: 70.0,
            })
            .await,
    );

    let expected: Vec<(Uuid, SecurityEventType)> =
        fired.iter().map(|e| (e.id, e.event_type)).collect();
    assert_eq!(
        expected.iter().map(|(_, t)| *t).collect::<Vec<_>>(),
        vec![
            SecurityEventType::UnusualActivity,
            SecurityEventType::UnusualActivity,
            SecurityEventType::ResourceAbuse,
        ]
    );
    assert_eq!(*seen.lock().unwrap(), expected);

    for (id, _) in &expected {
        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, *id);
    }
}

#[tokio::test]
async fn test_late_subscriber_gets_no_replay() {
    let monitor = start_monitor(MonitorConfig::default(), 6).await;
    monitor.observe_request(transport_failure("early.test")).await;

    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let _handle = monitor.on_security_event(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let mut rx = monitor.subscribe_events();

    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(rx.try_recv().is_err());

    monitor.observe_request(transport_failure("late.test")).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(rx.recv().await.unwrap().source, "late.test");
}

#[tokio::test]
async fn test_feedback_loop_retrains_every_fifty_samples() {
    let monitor = start_monitor(MonitorConfig::default(), 7).await;
    let engine = Arc::clone(monitor.engine());

    let before = engine.model_stats().await;
    assert_eq!(before.training_data_size, 250);
    assert_eq!(before.model_version, 1);

    for i in 0..50 {
        monitor
            .observe_request(transport_failure(&format!("svc{}.test", i)))
            .await;
    }

    let after = engine.model_stats().await;
    assert_eq!(after.training_data_size, 300);
    assert_eq!(after.retrain_count, 1);
    assert_eq!(after.model_version, 2);
    assert!(after.model_trained);
}

#[tokio::test]
async fn test_learning_can_be_disabled() {
    let config = MonitorConfig {
        learn_from_events: false,
        ..MonitorConfig::default()
    };
    let monitor = start_monitor(config, 8).await;

    monitor.observe_request(transport_failure("x.test")).await;
    assert_eq!(monitor.engine().model_stats().await.training_data_size, 250);
}

#[tokio::test]
async fn test_signals_ignored_outside_running_state() {
    let monitor = start_monitor(MonitorConfig::default(), 9).await;
    monitor.stop().await;
    assert_eq!(monitor.state().await, MonitorState::Stopped);

    assert!(monitor
        .observe_request(transport_failure("stopped.test"))
        .await
        .is_empty());
    assert!(monitor.observe_click().await.is_empty());
    assert!(monitor.observe_navigation().await.is_empty());

    let result = monitor
        .instrument("https://stopped.test/", async {
            Ok::<_, std::io::Error>(ResponseSummary {
                status: 500,
                bytes: 0,
            })
        })
        .await;
    assert!(result.is_ok());

    let stats = monitor.stats().await;
    assert_eq!(stats.ignored_signals, 4);
    assert_eq!(stats.total_events, 0);
    assert!(monitor.events().await.is_empty());
}

#[tokio::test]
async fn test_interaction_rules() {
    let monitor = start_monitor(MonitorConfig::default(), 10).await;
    let start = Utc::now();

    let mut click_events = Vec::new();
    for i in 0..11 {
        click_events.extend(
            monitor
                .observe_click_at(start + Duration::milliseconds(i * 60))
                .await,
        );
    }
    assert_eq!(click_events.len(), 1);
    assert_eq!(click_events[0].severity, Severity::Medium);
    assert_eq!(click_events[0].source, "user_interaction");

    let mut navigation_events: Vec<SecurityEvent> = Vec::new();
    for i in 0..21 {
        navigation_events.extend(
            monitor
                .observe_navigation_at(start + Duration::seconds(i))
                .await,
        );
    }
    assert_eq!(navigation_events.len(), 1);
    assert_eq!(navigation_events[0].severity, Severity::Low);

    let snapshot = monitor.metrics_snapshot().await;
    assert_eq!(snapshot.suspicious_patterns, 2.0);
    assert!(snapshot.click_rate > 0.0);
}

#[tokio::test]
async fn test_failed_auth_threshold() {
    let monitor = start_monitor(MonitorConfig::default(), 11).await;

    let mut events = Vec::new();
    for status in [401, 403, 401, 404, 401, 403, 401] {
        events.extend(
            monitor
                .observe_request(RequestObservation::completed(
                    "https://auth.example.com/login",
                    status,
                    90.0,
                    128,
                ))
                .await,
        );
    }

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, SecurityEventType::FailedAuth);
    assert_eq!(events[0].severity, Severity::High);

    // 5xxは4xxウィンドウに数えない
    let server_errors = monitor
        .observe_request(RequestObservation::completed(
            "https://other.example.com/",
            503,
            90.0,
            0,
        ))
        .await;
    assert!(server_errors.is_empty());
}

#[tokio::test]
async fn test_concurrent_observers() {
    let monitor = start_monitor(
        MonitorConfig {
            learn_from_events: false,
            ..MonitorConfig::default()
        },
        12,
    )
    .await;
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let _handle = monitor.on_security_event(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let mut tasks = Vec::new();
    for worker in 0..4 {
        let monitor = Arc::clone(&monitor);
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                monitor
                    .observe_request(transport_failure(&format!("w{}-{}.test", worker, i)))
                    .await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(delivered.load(Ordering::SeqCst), 40);
    assert_eq!(monitor.events().await.len(), 40);
    assert_eq!(monitor.stats().await.total_events, 40);
}

#[tokio::test]
async fn test_event_view_dismiss_is_consumer_local() {
    let monitor = start_monitor(MonitorConfig::default(), 13).await;
    for i in 0..3 {
        monitor
            .observe_request(transport_failure(&format!("v{}.test", i)))
            .await;
    }

    let mut view = monitor.event_view().await;
    let target = monitor.events().await[1].id;
    assert!(view.dismiss(target));
    assert_eq!(view.visible_count(), 2);

    assert_eq!(monitor.events().await.len(), 3);
    assert_eq!(monitor.event_view().await.visible_count(), 3);
}

#[tokio::test]
async fn test_event_json_shape() {
    let monitor = start_monitor(MonitorConfig::default(), 14).await;
    let events = monitor
        .observe_resource_usage(ResourceSample {
            memory_used: 99,
            memory_limit: 100,
            cpu_usage: 50.0,
        })
        .await;

    let json = serde_json::to_value(&events[0]).unwrap();
    assert_eq!(json["event_type"], "resource_abuse");
    assert_eq!(json["severity"], "high");
    assert_eq!(json["source"], "system");
    assert!(json["prediction"]["threat_score"].is_number());
}
