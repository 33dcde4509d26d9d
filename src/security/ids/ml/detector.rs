//! Threat Detection Engine
//!
//! ランダムフォレストとIsolation Forestの予測を融合する脅威検知エンジン。

use super::{
    features::{FeatureExtractor, RawMetrics},
    synthetic, DetectionAlgorithm, FeatureVector, IsolationForest, Label, MLConfig, ModelStats,
    RandomForest, RiskLevel, ThreatPrediction, TrainingSample,
};
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// 学習済みモデル一式
///
/// 再学習時は新しいインスタンスに丸ごと差し替えるため、
/// 予測中の呼び出しは開始時点のモデルを使い続ける。
#[derive(Debug)]
struct TrainedModels {
    random_forest: RandomForest,
    isolation_forest: IsolationForest,
}

/// 学習統計
#[derive(Debug, Clone, Default)]
struct TrainingStats {
    last_training_time: Option<DateTime<Utc>>,
    model_version: u32,
    retrain_count: u64,
}

/// フィードバック反映結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    /// 反映後の学習データ数
    pub training_data_size: usize,
    /// 再学習が実行されたか
    pub retrained: bool,
}

/// 脅威検知エンジン
pub struct ThreatDetectionEngine {
    /// 設定
    config: MLConfig,
    /// 学習済みモデル（未学習時はNone）
    models: RwLock<Option<Arc<TrainedModels>>>,
    /// 学習データ（追加のみ、上限超過時は古いものから削除）
    training_data: RwLock<Vec<TrainingSample>>,
    /// 特徴量履歴
    feature_history: RwLock<VecDeque<(DateTime<Utc>, FeatureVector)>>,
    /// 学習用乱数（ロック取得者のみが学習を実行する）
    trainer: Mutex<StdRng>,
    /// 学習統計
    stats: RwLock<TrainingStats>,
}

impl ThreatDetectionEngine {
    /// 合成データで初期学習済みのエンジンを作成
    ///
    /// 初期学習に失敗してもエラーは返さず、未学習状態で起動する。
    pub async fn new(config: MLConfig) -> Self {
        info!("Initializing threat detection engine");
        let engine = Self::untrained(config);

        let samples = {
            let mut rng = engine.trainer.lock().await;
            synthetic::bootstrap_dataset(
                engine.config.bootstrap_normal_samples,
                engine.config.bootstrap_threat_samples,
                &mut *rng,
            )
        };

        if let Err(e) = engine.train(samples).await {
            warn!("Bootstrap training failed, engine stays untrained: {}", e);
        }

        engine
    }

    /// 未学習のエンジンを作成
    pub fn untrained(config: MLConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            models: RwLock::new(None),
            training_data: RwLock::new(Vec::new()),
            feature_history: RwLock::new(VecDeque::new()),
            trainer: Mutex::new(rng),
            stats: RwLock::new(TrainingStats::default()),
            config,
        }
    }

    /// 学習データを置き換えてモデルを学習
    ///
    /// 学習に失敗した場合は既存のモデルと学習データを保持する。
    pub async fn train(&self, samples: Vec<TrainingSample>) -> Result<()> {
        self.rebuild_models(samples.clone()).await?;
        *self.training_data.write().await = samples;
        Ok(())
    }

    /// 脅威を検知
    ///
    /// 未学習またはモデル内部のエラー時は中立な予測を返す。
    pub async fn detect_threats(&self, metrics: &RawMetrics) -> ThreatPrediction {
        let models = match self.models.read().await.clone() {
            Some(models) => models,
            None => {
                debug!("Models not trained yet, returning neutral prediction");
                return ThreatPrediction::neutral();
            }
        };

        let features = FeatureExtractor::extract(metrics);
        self.record_history(features).await;

        match self.fuse(&models, &features, metrics) {
            Ok(prediction) => {
                debug!(
                    "Threat prediction [{}]: score={:.3}, risk={:?}, anomaly={}",
                    prediction.algorithm.tag(),
                    prediction.threat_score,
                    prediction.risk_level,
                    prediction.is_anomaly
                );
                prediction
            }
            Err(e) => {
                warn!("Threat detection degraded to neutral prediction: {}", e);
                ThreatPrediction::neutral()
            }
        }
    }

    /// フィードバックを学習データに追加し、必要なら再学習
    pub async fn retrain_with_feedback(
        &self,
        features: &FeatureVector,
        is_threat: bool,
    ) -> FeedbackOutcome {
        let (training_data_size, snapshot) = {
            let mut data = self.training_data.write().await;
            data.push(TrainingSample::new(*features, Label::from(is_threat)));

            if data.len() > self.config.max_training_samples {
                let excess = data
                    .len()
                    .saturating_sub(self.config.retained_training_samples);
                data.drain(..excess);
                debug!("Training set trimmed to {} samples", data.len());
            }

            let interval = self.config.retrain_interval;
            let snapshot = if interval > 0 && data.len() % interval == 0 {
                Some(data.clone())
            } else {
                None
            };
            (data.len(), snapshot)
        };

        let retrained = match snapshot {
            Some(samples) => {
                info!("Retraining models with {} samples", samples.len());
                match self.rebuild_models(samples).await {
                    Ok(()) => {
                        self.stats.write().await.retrain_count += 1;
                        true
                    }
                    Err(e) => {
                        warn!("Feedback retraining failed, keeping previous models: {}", e);
                        false
                    }
                }
            }
            None => false,
        };

        FeedbackOutcome {
            training_data_size,
            retrained,
        }
    }

    /// モデル統計情報を取得
    pub async fn model_stats(&self) -> ModelStats {
        let feature_history_size = {
            let mut history = self.feature_history.write().await;
            prune_history(&mut history, Utc::now(), self.history_window());
            history.len()
        };
        let stats = self.stats.read().await.clone();

        ModelStats {
            training_data_size: self.training_data.read().await.len(),
            model_trained: self.is_trained().await,
            feature_history_size,
            last_training_time: stats.last_training_time,
            model_version: stats.model_version,
            retrain_count: stats.retrain_count,
        }
    }

    /// モデルが学習済みかチェック
    pub async fn is_trained(&self) -> bool {
        self.models.read().await.as_ref().is_some_and(|models| {
            models.random_forest.is_trained() && models.isolation_forest.is_trained()
        })
    }

    /// 設定を取得
    pub fn config(&self) -> &MLConfig {
        &self.config
    }

    /// 両モデルを再構築して差し替え
    ///
    /// 構築はブロッキングスレッドで行い、非同期ワーカーを占有しない。
    async fn rebuild_models(&self, samples: Vec<TrainingSample>) -> Result<()> {
        let mut rng = self.trainer.lock().await;
        let task_rng = std::mem::replace(&mut *rng, StdRng::seed_from_u64(0));
        let config = self.config.clone();
        let sample_count = samples.len();

        let built = tokio::task::spawn_blocking(move || {
            let mut task_rng = task_rng;
            let built = build_models(&config, &samples, &mut task_rng);
            (built, task_rng)
        })
        .await;

        let models = match built {
            Ok((built, task_rng)) => {
                *rng = task_rng;
                built?
            }
            Err(e) => {
                *rng = StdRng::from_entropy();
                return Err(Error::Training(format!("Model build task failed: {}", e)));
            }
        };
        drop(rng);

        *self.models.write().await = Some(Arc::new(models));

        let mut stats = self.stats.write().await;
        stats.last_training_time = Some(Utc::now());
        stats.model_version += 1;
        info!(
            "Models trained: version={}, samples={}",
            stats.model_version, sample_count
        );
        Ok(())
    }

    /// 2モデルの予測を融合
    fn fuse(
        &self,
        models: &TrainedModels,
        features: &FeatureVector,
        metrics: &RawMetrics,
    ) -> Result<ThreatPrediction> {
        let vote = models.random_forest.predict(features);
        let isolation = models.isolation_forest.score(features)?;

        let threat_score = (self.config.classifier_weight * vote.prediction.value()
            + self.config.anomaly_weight * isolation.anomaly_score)
            .clamp(0.0, 1.0);
        let isolation_agrees = if isolation.anomaly_score > self.config.anomaly_threshold {
            1.0
        } else {
            0.0
        };
        let confidence = ((vote.confidence + isolation_agrees) / 2.0).clamp(0.0, 1.0);

        Ok(ThreatPrediction {
            is_anomaly: vote.prediction.is_threat() || isolation.is_anomaly,
            threat_score,
            confidence,
            risk_level: RiskLevel::from_score(threat_score),
            contributing_features: contributing_features(metrics),
            algorithm: DetectionAlgorithm::Ensemble,
            random_forest_vote: vote.prediction,
            anomaly_score: isolation.anomaly_score,
            timestamp: Utc::now(),
        })
    }

    async fn record_history(&self, features: FeatureVector) {
        let now = Utc::now();
        let mut history = self.feature_history.write().await;
        history.push_back((now, features));
        prune_history(&mut history, now, self.history_window());
    }

    fn history_window(&self) -> Duration {
        self.config.history_window()
    }

    #[cfg(test)]
    pub(crate) async fn lock_trainer(&self) -> tokio::sync::MutexGuard<'_, StdRng> {
        self.trainer.lock().await
    }
}

fn build_models(
    config: &MLConfig,
    samples: &[TrainingSample],
    rng: &mut StdRng,
) -> Result<TrainedModels> {
    let mut random_forest = RandomForest::new(
        config.forest_trees,
        config.max_depth,
        config.min_samples_split,
    );
    random_forest.train(samples, &mut *rng)?;

    let vectors: Vec<FeatureVector> = samples.iter().map(|s| s.features).collect();
    let mut isolation_forest = IsolationForest::new(
        config.isolation_trees,
        config.isolation_sample_size,
        config.anomaly_threshold,
    );
    isolation_forest.train(&vectors, &mut *rng)?;

    Ok(TrainedModels {
        random_forest,
        isolation_forest,
    })
}

/// 保持期間を過ぎた履歴を削除
fn prune_history(
    history: &mut VecDeque<(DateTime<Utc>, FeatureVector)>,
    now: DateTime<Utc>,
    window: Duration,
) {
    let cutoff = now - window;
    while history.front().is_some_and(|(at, _)| *at < cutoff) {
        history.pop_front();
    }
}

/// 生メトリクスのしきい値判定による寄与特徴の説明
pub fn contributing_features(metrics: &RawMetrics) -> Vec<String> {
    let checks = [
        (metrics.failed_requests > 10.0, "High failed request rate"),
        (metrics.request_count > 100.0, "Unusual request volume"),
        (metrics.response_time > 1000.0, "Slow response times"),
        (metrics.suspicious_patterns > 5.0, "Multiple security violations"),
        (metrics.memory_usage > 80.0, "High memory usage"),
        (metrics.click_rate > 20.0, "Rapid clicking pattern"),
    ];

    checks
        .iter()
        .filter(|(triggered, _)| *triggered)
        .map(|(_, label)| label.to_string())
        .collect()
}
