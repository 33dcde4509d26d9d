//! Security Monitor Types
//!
//! セキュリティイベントと観測シグナルの型定義

use crate::security::ids::ml::ThreatPrediction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// セキュリティイベントタイプ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    /// 不審なリクエスト（通信失敗など）
    SuspiciousRequest,
    /// 認証失敗（4xx応答の多発）
    FailedAuth,
    /// 異常な操作・通信
    UnusualActivity,
    /// リソースの乱用
    ResourceAbuse,
}

/// 深刻度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 低
    Low,
    /// 中
    Medium,
    /// 高
    High,
    /// 緊急
    Critical,
}

impl Severity {
    /// フィードバック学習で脅威ラベルとして扱う深刻度か
    pub fn is_threat_label(self) -> bool {
        self >= Severity::High
    }
}

/// セキュリティイベント
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// イベントID
    pub id: Uuid,
    /// イベントタイプ
    pub event_type: SecurityEventType,
    /// 深刻度
    pub severity: Severity,
    /// 発生源（ドメイン、"user_interaction"、"system"）
    pub source: String,
    /// 説明
    pub description: String,
    /// 発生時刻
    pub timestamp: DateTime<Utc>,
    /// 詳細情報
    pub details: HashMap<String, serde_json::Value>,
    /// 脅威予測
    pub prediction: Option<ThreatPrediction>,
}

/// リクエスト観測データ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestObservation {
    /// リクエストURL（またはホスト名）
    pub url: String,
    /// HTTPステータス（通信失敗・プローブ時はNone）
    pub status: Option<u16>,
    /// 応答時間（ミリ秒）
    pub latency_ms: f64,
    /// 転送バイト数
    pub bytes: u64,
    /// 通信レベルのエラー
    pub error: Option<String>,
    /// 観測時刻
    pub timestamp: DateTime<Utc>,
}

impl RequestObservation {
    /// 応答を受信したリクエスト
    pub fn completed(url: impl Into<String>, status: u16, latency_ms: f64, bytes: u64) -> Self {
        Self {
            url: url.into(),
            status: Some(status),
            latency_ms,
            bytes,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// 通信レベルで失敗したリクエスト
    pub fn failed(url: impl Into<String>, error: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            url: url.into(),
            status: None,
            latency_ms,
            bytes: 0,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    /// 観測時刻を指定
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// ドメイン名（URLとして解釈できない場合は文字列そのもの）
    pub fn domain(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.url.clone())
    }

    /// 4xx応答か
    pub fn is_client_error(&self) -> bool {
        matches!(self.status, Some(400..=499))
    }
}

/// リソース使用状況のサンプル
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// 使用メモリ（バイト）
    pub memory_used: u64,
    /// メモリ上限（バイト）
    pub memory_limit: u64,
    /// CPU使用率（%）
    pub cpu_usage: f64,
}

impl ResourceSample {
    /// メモリ使用率（%）
    pub fn memory_percent(&self) -> f64 {
        if self.memory_limit == 0 {
            return 0.0;
        }
        self.memory_used as f64 / self.memory_limit as f64 * 100.0
    }
}
