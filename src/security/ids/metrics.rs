//! Running Network Metrics
//!
//! セッション中のリクエスト・操作・リソースの累積カウンターと、
//! ルール判定用のスライディングウィンドウ。

use super::types::{RequestObservation, ResourceSample};
use crate::security::ids::ml::RawMetrics;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashSet, VecDeque};

/// 累積ネットワークメトリクス
///
/// リセットされるまで単調増加する（メモリ/CPUは最新値）。
#[derive(Debug, Clone)]
pub struct NetworkMetrics {
    request_count: u64,
    failed_requests: u64,
    responded_requests: u64,
    total_response_time_ms: f64,
    unique_domains: HashSet<String>,
    http_errors: u64,
    violations: u64,
    click_count: u64,
    navigation_count: u64,
    bytes_transferred: u64,
    memory_usage_percent: f64,
    cpu_usage_percent: f64,
    started_at: DateTime<Utc>,
}

impl NetworkMetrics {
    /// 新しいセッションを開始
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            request_count: 0,
            failed_requests: 0,
            responded_requests: 0,
            total_response_time_ms: 0.0,
            unique_domains: HashSet::new(),
            http_errors: 0,
            violations: 0,
            click_count: 0,
            navigation_count: 0,
            bytes_transferred: 0,
            memory_usage_percent: 0.0,
            cpu_usage_percent: 0.0,
            started_at,
        }
    }

    /// リクエストを記録
    ///
    /// 通信失敗は失敗数に、400以上の応答はHTTPエラー数に計上する。
    pub fn record_request(&mut self, observation: &RequestObservation) {
        self.request_count += 1;
        self.unique_domains.insert(observation.domain());

        if observation.error.is_some() {
            self.failed_requests += 1;
            return;
        }

        self.responded_requests += 1;
        self.total_response_time_ms += observation.latency_ms.max(0.0);
        self.bytes_transferred += observation.bytes;
        if matches!(observation.status, Some(status) if status >= 400) {
            self.http_errors += 1;
        }
    }

    /// リソース使用状況を記録（最新値で上書き）
    pub fn record_resources(&mut self, sample: &ResourceSample) {
        self.memory_usage_percent = sample.memory_percent();
        self.cpu_usage_percent = sample.cpu_usage;
    }

    /// ルール違反を記録
    pub fn record_violation(&mut self) {
        self.violations += 1;
    }

    /// クリックを記録
    pub fn record_click(&mut self) {
        self.click_count += 1;
    }

    /// ページ遷移を記録し、セッション内の遷移数を返す
    pub fn record_navigation(&mut self) -> u64 {
        self.navigation_count += 1;
        self.navigation_count
    }

    /// 特徴量抽出用のスナップショット
    ///
    /// クリック/遷移頻度は毎分換算。経過時間が1分未満の場合は1分として扱う。
    pub fn snapshot(&self, now: DateTime<Utc>) -> RawMetrics {
        let elapsed_minutes = (now - self.started_at).num_milliseconds() as f64 / 60_000.0;
        let minutes = elapsed_minutes.max(1.0);

        let response_time = if self.responded_requests > 0 {
            self.total_response_time_ms / self.responded_requests as f64
        } else {
            0.0
        };

        RawMetrics {
            request_count: self.request_count as f64,
            failed_requests: self.failed_requests as f64,
            response_time,
            data_transferred: self.bytes_transferred as f64 / 1024.0,
            unique_domains: self.unique_domains.len() as f64,
            http_errors: self.http_errors as f64,
            suspicious_patterns: self.violations as f64,
            memory_usage: self.memory_usage_percent,
            cpu_usage: self.cpu_usage_percent,
            click_rate: self.click_count as f64 / minutes,
            navigation_rate: self.navigation_count as f64 / minutes,
        }
    }

    /// カウンターをゼロに戻しセッションを再開
    pub fn reset(&mut self, now: DateTime<Utc>) {
        *self = Self::new(now);
    }

    /// ルール違反数
    pub fn violations(&self) -> u64 {
        self.violations
    }

    /// セッション開始時刻
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// 時刻のスライディングウィンドウ
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow {
    timestamps: VecDeque<DateTime<Utc>>,
}

impl SlidingWindow {
    /// 時刻を追加し、`window` より古いエントリを削除した後の件数を返す
    ///
    /// 遅れて届いた時刻も順序どおりの位置に挿入し、最新の時刻を基準に判定する。
    pub fn record(&mut self, at: DateTime<Utc>, window: Duration) -> usize {
        let position = self
            .timestamps
            .iter()
            .rposition(|timestamp| *timestamp <= at)
            .map_or(0, |index| index + 1);
        self.timestamps.insert(position, at);

        if let Some(&latest) = self.timestamps.back() {
            self.prune(latest - window);
        }
        self.timestamps.len()
    }

    /// `cutoff` 以前のエントリを削除
    pub fn prune(&mut self, cutoff: DateTime<Utc>) {
        while let Some(timestamp) = self.timestamps.front() {
            if *timestamp <= cutoff {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// 現在の件数
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}
