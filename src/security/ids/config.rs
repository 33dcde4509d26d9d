//! Security Monitor Configuration
//!
//! セキュリティモニターの設定と統計

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::types::{SecurityEventType, Severity};

/// 時間ウィンドウ設定の上限（7日）
pub const MAX_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

/// セキュリティモニター設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// イベントバッファの上限（古いものから破棄）
    pub max_events: usize,
    /// ドメイン別カウントの観測ウィンドウ（秒）
    pub observation_window_secs: u64,
    /// ウィンドウ内のドメイン別リクエスト数の閾値
    pub domain_request_threshold: usize,
    /// ウィンドウ内のドメイン別4xx応答数の閾値
    pub client_error_threshold: usize,
    /// 低速応答とみなす応答時間（ミリ秒）
    pub slow_response_ms: f64,
    /// メモリ使用率の閾値（%）
    pub memory_usage_threshold: f64,
    /// 連続クリックの閾値
    pub rapid_click_threshold: usize,
    /// 連続クリックの判定ウィンドウ（ミリ秒）
    pub rapid_click_window_ms: u64,
    /// セッション内のページ遷移数の閾値
    pub navigation_threshold: u64,
    /// 大容量転送とみなすバイト数
    pub large_transfer_bytes: u64,
    /// ブロードキャストチャネルの容量
    pub event_channel_capacity: usize,
    /// イベントからのフィードバック学習の有効化
    pub learn_from_events: bool,
    /// プローブ対象（"host" または "host:port"）
    pub probe_targets: Vec<String>,
    /// プローブ間隔（秒）
    pub probe_interval_secs: u64,
    /// プローブのタイムアウト（ミリ秒）
    pub probe_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_events: 100,
            observation_window_secs: 60,
            domain_request_threshold: 100,
            client_error_threshold: 5,
            slow_response_ms: 10_000.0,
            memory_usage_threshold: 90.0,
            rapid_click_threshold: 10,
            rapid_click_window_ms: 1_000,
            navigation_threshold: 20,
            large_transfer_bytes: 10 * 1024 * 1024,
            event_channel_capacity: 256,
            learn_from_events: true,
            probe_targets: Vec::new(),
            probe_interval_secs: 30,
            probe_timeout_ms: 3_000,
        }
    }
}

impl MonitorConfig {
    /// 観測ウィンドウ（上限は `MAX_WINDOW_SECS`）
    pub fn observation_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.observation_window_secs.min(MAX_WINDOW_SECS) as i64)
    }

    /// 連続クリックの判定ウィンドウ（上限は `MAX_WINDOW_SECS`）
    pub fn rapid_click_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(
            self.rapid_click_window_ms.min(MAX_WINDOW_SECS * 1000) as i64,
        )
    }

    /// プローブ間隔
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }

    /// プローブのタイムアウト
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// モニター統計
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStats {
    /// 発行したイベント総数
    pub total_events: u64,
    /// タイプ別イベント数
    pub events_by_type: HashMap<SecurityEventType, u64>,
    /// 深刻度別イベント数
    pub events_by_severity: HashMap<Severity, u64>,
    /// バッファから破棄したイベント数
    pub evicted_events: u64,
    /// 観測したシグナル数
    pub observed_signals: u64,
    /// 停止中に無視したシグナル数
    pub ignored_signals: u64,
    /// 最終イベント時刻
    pub last_event: Option<chrono::DateTime<chrono::Utc>>,
}

impl Default for MonitorStats {
    fn default() -> Self {
        Self {
            total_events: 0,
            events_by_type: HashMap::new(),
            events_by_severity: HashMap::new(),
            evicted_events: 0,
            observed_signals: 0,
            ignored_signals: 0,
            last_event: None,
        }
    }
}
