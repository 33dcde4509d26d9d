//! Machine Learning Threat Detection
//!
//! ランダムフォレストとIsolation Forestを組み合わせたアンサンブル脅威検知。
//!
//! ## 主要機能
//!
//! - **特徴量抽出**: ネットワーク/操作メトリクスから11次元の特徴量を生成
//! - **分類**: ブートストラップ集約した決定木による多数決分類
//! - **異常検知**: Isolation Forestによる平均パス長ベースの異常スコア
//! - **オンライン学習**: フィードバックによる学習データ追加と定期再学習
//!
//! ## 使用例
//!
//! ```rust,no_run
//! use netsentinel_rs::security::ids::ml::{MLConfig, RawMetrics, ThreatDetectionEngine};
//!
//! # async fn example() {
//! let engine = ThreatDetectionEngine::new(MLConfig::default()).await;
//!
//! let metrics = RawMetrics {
//!     request_count: 250.0,
//!     failed_requests: 40.0,
//!     ..Default::default()
//! };
//!
//! let prediction = engine.detect_threats(&metrics).await;
//! if prediction.is_anomaly {
//!     println!("脅威検知: スコア={:.2}", prediction.threat_score);
//! }
//! # }
//! ```

pub mod decision_tree;
pub mod detector;
pub mod features;
pub mod isolation_forest;
pub mod random_forest;
pub mod synthetic;

use super::config::MAX_WINDOW_SECS;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

pub use decision_tree::DecisionTree;
pub use detector::{FeedbackOutcome, ThreatDetectionEngine};
pub use features::{FeatureExtractor, RawMetrics};
pub use isolation_forest::{IsolationForest, IsolationScore, IsolationTree};
pub use random_forest::{ForestVote, RandomForest};

/// 特徴量の次元数
pub const FEATURE_COUNT: usize = 11;

/// 特徴量スロット名（順序は学習済みモデルとの契約）
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "request_count",
    "failed_requests",
    "response_time",
    "data_transferred",
    "unique_domains",
    "http_errors",
    "suspicious_patterns",
    "memory_usage",
    "cpu_usage",
    "click_rate",
    "navigation_rate",
];

/// ML脅威検知設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MLConfig {
    /// ランダムフォレストの決定木数
    pub forest_trees: usize,
    /// 決定木の最大深さ
    pub max_depth: usize,
    /// 分割に必要な最小サンプル数
    pub min_samples_split: usize,
    /// Isolation Treeの数
    pub isolation_trees: usize,
    /// Isolation Treeごとのサブサンプルサイズ
    pub isolation_sample_size: usize,
    /// 異常スコアのしきい値（0.0-1.0）
    pub anomaly_threshold: f64,
    /// 融合時のランダムフォレストの重み
    pub classifier_weight: f64,
    /// 融合時の異常スコアの重み
    pub anomaly_weight: f64,
    /// 学習データの最大保持数
    pub max_training_samples: usize,
    /// 上限超過時に残すサンプル数
    pub retained_training_samples: usize,
    /// 再学習間隔（学習データ数がこの倍数になったら再学習）
    pub retrain_interval: usize,
    /// 特徴量履歴の保持期間（秒）
    pub history_window_secs: i64,
    /// 初期化時の正常合成サンプル数
    pub bootstrap_normal_samples: usize,
    /// 初期化時の脅威合成サンプル数
    pub bootstrap_threat_samples: usize,
    /// 乱数シード（テストの再現性用）
    pub seed: Option<u64>,
}

impl Default for MLConfig {
    fn default() -> Self {
        Self {
            forest_trees: 50,
            max_depth: 10,
            min_samples_split: 2,
            isolation_trees: 100,
            isolation_sample_size: 256,
            anomaly_threshold: 0.6,
            classifier_weight: 0.6,
            anomaly_weight: 0.4,
            max_training_samples: 1000,
            retained_training_samples: 800,
            retrain_interval: 50,
            history_window_secs: 300, // 5分
            bootstrap_normal_samples: 200,
            bootstrap_threat_samples: 50,
            seed: None,
        }
    }
}

impl MLConfig {
    /// 特徴量履歴の保持期間（0秒から `MAX_WINDOW_SECS` の範囲）
    pub fn history_window(&self) -> Duration {
        Duration::seconds(self.history_window_secs.clamp(0, MAX_WINDOW_SECS as i64))
    }
}

/// 特徴量ベクトル（11次元固定）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    /// 全て0の特徴量ベクトル
    pub fn zeros() -> Self {
        Self([0.0; FEATURE_COUNT])
    }

    /// 名前付きで特徴量を列挙
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.0.iter().copied())
    }
}

impl Deref for FeatureVector {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl From<[f64; FEATURE_COUNT]> for FeatureVector {
    fn from(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }
}

/// 学習ラベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// 正常 (0)
    Normal,
    /// 脅威 (1)
    Threat,
}

impl Label {
    /// 数値表現（0.0 / 1.0）
    pub fn value(self) -> f64 {
        match self {
            Label::Normal => 0.0,
            Label::Threat => 1.0,
        }
    }

    pub fn is_threat(self) -> bool {
        self == Label::Threat
    }
}

impl From<bool> for Label {
    fn from(is_threat: bool) -> Self {
        if is_threat {
            Label::Threat
        } else {
            Label::Normal
        }
    }
}

/// 学習サンプル
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: FeatureVector,
    pub label: Label,
}

impl TrainingSample {
    pub fn new(features: FeatureVector, label: Label) -> Self {
        Self { features, label }
    }
}

/// リスクレベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// 低
    Low,
    /// 中
    Medium,
    /// 高
    High,
    /// 緊急
    Critical,
}

impl RiskLevel {
    /// 脅威スコアからリスクレベルを判定
    pub fn from_score(threat_score: f64) -> Self {
        if threat_score > 0.8 {
            RiskLevel::Critical
        } else if threat_score > 0.6 {
            RiskLevel::High
        } else if threat_score > 0.4 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// 検知アルゴリズム
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionAlgorithm {
    /// モデル未学習（中立応答）
    Untrained,
    /// ランダムフォレスト + Isolation Forest
    Ensemble,
}

impl DetectionAlgorithm {
    pub fn tag(self) -> &'static str {
        match self {
            DetectionAlgorithm::Untrained => "Untrained",
            DetectionAlgorithm::Ensemble => "Ensemble (Random Forest + Isolation Forest)",
        }
    }
}

/// 脅威予測結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatPrediction {
    /// 異常フラグ
    pub is_anomaly: bool,
    /// 脅威スコア（0.0-1.0）
    pub threat_score: f64,
    /// 信頼度（0.0-1.0）
    pub confidence: f64,
    /// リスクレベル
    pub risk_level: RiskLevel,
    /// 寄与した特徴の説明
    pub contributing_features: Vec<String>,
    /// 検知アルゴリズム
    pub algorithm: DetectionAlgorithm,
    /// ランダムフォレストの投票結果
    pub random_forest_vote: Label,
    /// Isolation Forestの異常スコア
    pub anomaly_score: f64,
    /// タイムスタンプ
    pub timestamp: DateTime<Utc>,
}

impl ThreatPrediction {
    /// モデル未学習時の中立な予測
    pub fn neutral() -> Self {
        Self {
            is_anomaly: false,
            threat_score: 0.0,
            confidence: 0.0,
            risk_level: RiskLevel::Low,
            contributing_features: Vec::new(),
            algorithm: DetectionAlgorithm::Untrained,
            random_forest_vote: Label::Normal,
            anomaly_score: 0.0,
            timestamp: Utc::now(),
        }
    }
}

/// モデル統計情報
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStats {
    /// 学習データ数
    pub training_data_size: usize,
    /// 学習済みフラグ
    pub model_trained: bool,
    /// 特徴量履歴数（保持期間内）
    pub feature_history_size: usize,
    /// 最終学習日時
    pub last_training_time: Option<DateTime<Utc>>,
    /// モデルバージョン
    pub model_version: u32,
    /// フィードバックによる再学習回数
    pub retrain_count: u64,
}
