//! Threat Detection Engine Integration Tests
//!
//! 初期学習、予測の融合、フィードバック学習と同時実行時の挙動をテストします。

use netsentinel_rs::security::ids::ml::synthetic;
use netsentinel_rs::security::ids::ml::{
    DetectionAlgorithm, FeatureExtractor, Label, MLConfig, RawMetrics, RiskLevel,
    ThreatDetectionEngine, TrainingSample,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

fn light_ml(seed: u64) -> MLConfig {
    MLConfig {
        forest_trees: 11,
        isolation_trees: 20,
        seed: Some(seed),
        ..MLConfig::default()
    }
}

fn attack() -> RawMetrics {
    RawMetrics {
        request_count: 300.0,
        failed_requests: 25.0,
        response_time: 2_200.0,
        data_transferred: 8_000.0,
        unique_domains: 60.0,
        http_errors: 20.0,
        suspicious_patterns: 10.0,
        memory_usage: 92.0,
        cpu_usage: 95.0,
        click_rate: 45.0,
        navigation_rate: 25.0,
    }
}

fn quiet() -> RawMetrics {
    RawMetrics {
        request_count: 30.0,
        failed_requests: 0.0,
        response_time: 150.0,
        data_transferred: 800.0,
        unique_domains: 4.0,
        http_errors: 1.0,
        suspicious_patterns: 0.0,
        memory_usage: 35.0,
        cpu_usage: 15.0,
        click_rate: 4.0,
        navigation_rate: 2.0,
    }
}

#[tokio::test]
async fn test_attack_and_quiet_traffic_are_separated() {
    let engine = ThreatDetectionEngine::new(light_ml(21)).await;

    let threat = engine.detect_threats(&attack()).await;
    assert_eq!(threat.algorithm, DetectionAlgorithm::Ensemble);
    assert!(threat.is_anomaly);
    assert!(threat.risk_level >= RiskLevel::High);
    assert_eq!(
        threat.contributing_features,
        vec![
            "High failed request rate",
            "Unusual request volume",
            "Slow response times",
            "Multiple security violations",
            "High memory usage",
            "Rapid clicking pattern",
        ]
    );

    let normal = engine.detect_threats(&quiet()).await;
    assert_eq!(normal.random_forest_vote, Label::Normal);
    assert_eq!(normal.risk_level, RiskLevel::Low);
    assert!(normal.contributing_features.is_empty());
    assert!(normal.threat_score < threat.threat_score);
}

#[tokio::test]
async fn test_partial_metrics_json_is_scored() {
    let engine = ThreatDetectionEngine::new(light_ml(22)).await;
    let metrics: RawMetrics =
        serde_json::from_str(r#"{"requestCount": 12, "cpuUsage": 10}"#).unwrap();

    let prediction = engine.detect_threats(&metrics).await;
    assert!((0.0..=1.0).contains(&prediction.threat_score));
    assert!((0.0..=1.0).contains(&prediction.confidence));
    assert!((0.0..=1.0).contains(&prediction.anomaly_score));
}

#[tokio::test]
async fn test_explicit_training_replaces_dataset() {
    let engine = ThreatDetectionEngine::untrained(light_ml(23));
    assert!(!engine.is_trained().await);

    let mut rng = StdRng::seed_from_u64(23);
    let samples = synthetic::bootstrap_dataset(60, 20, &mut rng);
    engine.train(samples).await.unwrap();

    let stats = engine.model_stats().await;
    assert!(stats.model_trained);
    assert_eq!(stats.training_data_size, 80);
    assert_eq!(stats.model_version, 1);

    assert!(engine.train(Vec::new()).await.is_err());
    // 失敗しても既存モデルと学習データは保持される
    assert!(engine.is_trained().await);
    assert_eq!(engine.model_stats().await.training_data_size, 80);
}

#[tokio::test]
async fn test_training_set_is_capped() {
    let config = MLConfig {
        forest_trees: 3,
        isolation_trees: 5,
        retrain_interval: 1_000_000,
        seed: Some(24),
        ..MLConfig::default()
    };
    let engine = ThreatDetectionEngine::new(config).await;
    let features = FeatureExtractor::extract(&quiet());

    let mut last = 0;
    for _ in 0..750 {
        last = engine
            .retrain_with_feedback(&features, false)
            .await
            .training_data_size;
    }
    assert_eq!(last, 1000);

    let outcome = engine.retrain_with_feedback(&features, true).await;
    assert_eq!(outcome.training_data_size, 800);
    assert!(!outcome.retrained);
}

#[tokio::test]
async fn test_predictions_during_retraining_stay_valid() {
    let engine = Arc::new(ThreatDetectionEngine::new(light_ml(25)).await);

    let trainer = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(99);
            for i in 0..100 {
                let (features, is_threat) = if i % 3 == 0 {
                    (synthetic::threat_vector(&mut rng), true)
                } else {
                    (synthetic::normal_vector(&mut rng), false)
                };
                engine.retrain_with_feedback(&features, is_threat).await;
            }
        })
    };

    let scorer = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut scores = Vec::new();
            for _ in 0..100 {
                let prediction = engine.detect_threats(&attack()).await;
                scores.push(prediction.threat_score);
                tokio::task::yield_now().await;
            }
            scores
        })
    };

    trainer.await.unwrap();
    let scores = scorer.await.unwrap();
    assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));

    let stats = engine.model_stats().await;
    assert_eq!(stats.training_data_size, 350);
    assert_eq!(stats.retrain_count, 2);
    assert_eq!(stats.model_version, 3);
    assert!(stats.feature_history_size >= 100);
}

#[tokio::test]
async fn test_feedback_labels_shift_the_classifier() {
    // 正常域の点を脅威として繰り返し学習させるとランダムフォレストの投票が変わる
    let engine = ThreatDetectionEngine::new(light_ml(26)).await;
    let target = quiet();
    assert_eq!(
        engine.detect_threats(&target).await.random_forest_vote,
        Label::Normal
    );

    let features = FeatureExtractor::extract(&target);
    let samples: Vec<TrainingSample> = (0..300)
        .map(|_| TrainingSample::new(features, Label::Threat))
        .chain({
            let mut rng = StdRng::seed_from_u64(26);
            (0..50).map(move |_| TrainingSample::new(synthetic::normal_vector(&mut rng), Label::Normal))
        })
        .collect();
    engine.train(samples).await.unwrap();

    assert_eq!(
        engine.detect_threats(&target).await.random_forest_vote,
        Label::Threat
    );
}
