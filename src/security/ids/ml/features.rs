//! Feature Extraction
//!
//! ネットワーク/操作メトリクスのスナップショットから機械学習用の特徴量を抽出します。

use super::FeatureVector;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// 生メトリクスのスナップショット
///
/// 欠けているフィールドは0として扱う。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawMetrics {
    /// リクエスト数
    pub request_count: f64,
    /// 失敗リクエスト数
    pub failed_requests: f64,
    /// 平均応答時間（ミリ秒）
    pub response_time: f64,
    /// 転送量（KB）
    pub data_transferred: f64,
    /// ユニークドメイン数
    pub unique_domains: f64,
    /// HTTPエラー数
    pub http_errors: f64,
    /// ルール違反数
    pub suspicious_patterns: f64,
    /// メモリ使用率（%）
    pub memory_usage: f64,
    /// CPU使用率（%）
    pub cpu_usage: f64,
    /// クリック頻度（毎分）
    pub click_rate: f64,
    /// ページ遷移頻度（毎分）
    pub navigation_rate: f64,
}

/// 特徴量抽出器
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// メトリクスを固定順の11次元ベクトルに変換
    pub fn extract(metrics: &RawMetrics) -> FeatureVector {
        let features = FeatureVector([
            metrics.request_count,
            metrics.failed_requests,
            metrics.response_time,
            metrics.data_transferred,
            metrics.unique_domains,
            metrics.http_errors,
            metrics.suspicious_patterns,
            metrics.memory_usage,
            metrics.cpu_usage,
            metrics.click_rate,
            metrics.navigation_rate,
        ]);
        trace!(features = ?features.named().collect::<Vec<_>>(), "Extracted feature vector");
        features
    }
}
