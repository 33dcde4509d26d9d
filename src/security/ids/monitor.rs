//! Security Monitor
//!
//! 通信・操作・リソースのシグナルをルールで評価し、発火したルールごとに
//! 脅威予測付きのセキュリティイベントを発行します。
//!
//! 1回の発火につき、以下を順番に実行する:
//!
//! 1. ルール違反数の加算
//! 2. メトリクスのスナップショットと特徴量抽出
//! 3. 脅威検知エンジンによる予測
//! 4. イベントバッファへの追加（上限超過分は古い順に破棄）
//! 5. コールバック購読者への通知（登録順）とブロードキャスト
//! 6. イベントの深刻度をラベルとしたフィードバック学習（ルール評価のロック解放後）

use super::config::{MonitorConfig, MonitorStats};
use super::events::{EventBus, SecurityEventView, SubscriptionHandle};
use super::metrics::{NetworkMetrics, SlidingWindow};
use super::probe::{Probe, ProbeOutcome};
use super::types::{
    RequestObservation, ResourceSample, SecurityEvent, SecurityEventType, Severity,
};
use crate::error::{Error, Result};
use crate::security::ids::ml::{
    FeatureExtractor, FeatureVector, RawMetrics, ThreatDetectionEngine,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// モニターの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    /// 作成済み（未開始）
    Created,
    /// 稼働中
    Running,
    /// 停止済み
    Stopped,
}

/// ドメイン別のスライディングウィンドウ
#[derive(Debug, Default)]
struct DomainWindows {
    requests: SlidingWindow,
    client_errors: SlidingWindow,
}

/// ルール評価の状態（1つのロックで保護し、発火順を保証する）
struct PipelineState {
    metrics: NetworkMetrics,
    domains: HashMap<String, DomainWindows>,
    clicks: SlidingWindow,
    next_sweep: Option<DateTime<Utc>>,
}

impl PipelineState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            metrics: NetworkMetrics::new(now),
            domains: HashMap::new(),
            clicks: SlidingWindow::default(),
            next_sweep: None,
        }
    }

    /// ウィンドウ外になったドメインを削除（観測ウィンドウ1つ分ごと）
    fn sweep_domains(&mut self, now: DateTime<Utc>, window: Duration) {
        if self.next_sweep.is_some_and(|next| now < next) {
            return;
        }

        let cutoff = now - window;
        let before = self.domains.len();
        self.domains.retain(|_, windows| {
            windows.requests.prune(cutoff);
            windows.client_errors.prune(cutoff);
            !(windows.requests.is_empty() && windows.client_errors.is_empty())
        });
        self.next_sweep = Some(now + window);

        let removed = before - self.domains.len();
        if removed > 0 {
            debug!("Dropped {} idle domain windows", removed);
        }
    }

    /// カウンターとウィンドウをリセット
    fn reset(&mut self, now: DateTime<Utc>) {
        self.metrics.reset(now);
        self.domains.clear();
        self.clicks = SlidingWindow::default();
        self.next_sweep = None;
    }
}

/// 発火したルール
struct Trigger {
    event_type: SecurityEventType,
    severity: Severity,
    source: String,
    description: String,
    details: HashMap<String, Value>,
}

impl Trigger {
    fn new(
        event_type: SecurityEventType,
        severity: Severity,
        source: impl Into<String>,
        description: String,
    ) -> Self {
        Self {
            event_type,
            severity,
            source: source.into(),
            description,
            details: HashMap::new(),
        }
    }

    fn detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

/// セキュリティモニター
pub struct SecurityMonitor {
    /// 設定
    config: MonitorConfig,
    /// 脅威検知エンジン
    engine: Arc<ThreatDetectionEngine>,
    /// ルール評価の状態
    pipeline: Mutex<PipelineState>,
    /// イベントバッファ（古い順）
    events: RwLock<VecDeque<SecurityEvent>>,
    /// イベントバス
    bus: EventBus,
    /// 統計
    stats: RwLock<MonitorStats>,
    /// 状態
    state: RwLock<MonitorState>,
    /// 疎通確認の実装
    probe: Option<Arc<dyn Probe>>,
    /// プローブループのタスク
    probe_task: Mutex<Option<JoinHandle<()>>>,
}

impl SecurityMonitor {
    /// 新しいセキュリティモニターを作成
    pub fn new(config: MonitorConfig, engine: Arc<ThreatDetectionEngine>) -> Self {
        info!(
            "Initializing security monitor (buffer={}, window={}s)",
            config.max_events, config.observation_window_secs
        );

        let bus = EventBus::new(config.event_channel_capacity);
        Self {
            config,
            engine,
            pipeline: Mutex::new(PipelineState::new(Utc::now())),
            events: RwLock::new(VecDeque::new()),
            bus,
            stats: RwLock::new(MonitorStats::default()),
            state: RwLock::new(MonitorState::Created),
            probe: None,
            probe_task: Mutex::new(None),
        }
    }

    /// 疎通確認の実装を設定（対象は `probe_targets`）
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// 監視を開始
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state == MonitorState::Running {
                return Err(Error::InvalidState(
                    "Security monitor is already running".to_string(),
                ));
            }
            *state = MonitorState::Running;
        }

        if let Some(probe) = &self.probe {
            if !self.config.probe_targets.is_empty() {
                let handle = self.spawn_probe_loop(Arc::clone(probe));
                *self.probe_task.lock().await = Some(handle);
            }
        }

        info!("Security monitor started");
        Ok(())
    }

    /// 監視を停止
    pub async fn stop(&self) {
        *self.state.write().await = MonitorState::Stopped;

        if let Some(handle) = self.probe_task.lock().await.take() {
            handle.abort();
        }

        info!(
            "Security monitor stopped ({} subscribers registered)",
            self.bus.subscriber_count()
        );
    }

    /// 現在の状態
    pub async fn state(&self) -> MonitorState {
        *self.state.read().await
    }

    fn spawn_probe_loop(self: &Arc<Self>, probe: Arc<dyn Probe>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let targets = self.config.probe_targets.clone();
        let mut interval = tokio::time::interval(self.config.probe_interval());

        info!("Starting probe loop for {} targets", targets.len());

        tokio::spawn(async move {
            loop {
                interval.tick().await;
                for target in &targets {
                    let outcome = probe.probe(target).await;
                    let Some(monitor) = weak.upgrade() else {
                        return;
                    };
                    monitor.observe_probe(target, outcome).await;
                }
            }
        })
    }

    /// シグナルを受け付けるか判定し、統計を更新
    async fn accept_signal(&self) -> bool {
        let running = *self.state.read().await == MonitorState::Running;
        let mut stats = self.stats.write().await;
        if running {
            stats.observed_signals += 1;
        } else {
            stats.ignored_signals += 1;
            debug!("Ignoring signal while security monitor is not running");
        }
        running
    }

    /// リクエストを観測
    pub async fn observe_request(&self, observation: RequestObservation) -> Vec<SecurityEvent> {
        if !self.accept_signal().await {
            return Vec::new();
        }

        let mut pipeline = self.pipeline.lock().await;
        pipeline.metrics.record_request(&observation);

        let domain = observation.domain();
        let window = self.config.observation_window();
        let (request_count, client_errors) = {
            let windows = pipeline.domains.entry(domain.clone()).or_default();
            let request_count = windows.requests.record(observation.timestamp, window);
            let client_errors = if observation.is_client_error() {
                windows.client_errors.record(observation.timestamp, window)
            } else {
                windows.client_errors.len()
            };
            (request_count, client_errors)
        };
        pipeline.sweep_domains(observation.timestamp, window);

        let mut triggers = Vec::new();

        if request_count == self.config.domain_request_threshold + 1 {
            triggers.push(
                Trigger::new(
                    SecurityEventType::ResourceAbuse,
                    Severity::Medium,
                    &domain,
                    format!(
                        "Excessive requests to {}: {} within {}s",
                        domain, request_count, self.config.observation_window_secs
                    ),
                )
                .detail("domain", json!(domain))
                .detail("requestCount", json!(request_count)),
            );
        }

        if observation.is_client_error()
            && client_errors == self.config.client_error_threshold + 1
        {
            triggers.push(
                Trigger::new(
                    SecurityEventType::FailedAuth,
                    Severity::High,
                    &domain,
                    format!(
                        "Repeated client errors from {}: {} responses within {}s",
                        domain, client_errors, self.config.observation_window_secs
                    ),
                )
                .detail("domain", json!(domain))
                .detail("clientErrors", json!(client_errors))
                .detail("status", json!(observation.status)),
            );
        }

        if observation.error.is_none() && observation.latency_ms > self.config.slow_response_ms {
            triggers.push(
                Trigger::new(
                    SecurityEventType::UnusualActivity,
                    Severity::Low,
                    &domain,
                    format!(
                        "Slow response from {}: {:.0}ms",
                        domain, observation.latency_ms
                    ),
                )
                .detail("url", json!(observation.url))
                .detail("latencyMs", json!(observation.latency_ms)),
            );
        }

        if let Some(error) = &observation.error {
            triggers.push(
                Trigger::new(
                    SecurityEventType::SuspiciousRequest,
                    Severity::Medium,
                    &domain,
                    format!("Request to {} failed: {}", domain, error),
                )
                .detail("url", json!(observation.url))
                .detail("error", json!(error)),
            );
        }

        if observation.bytes > self.config.large_transfer_bytes {
            triggers.push(
                Trigger::new(
                    SecurityEventType::UnusualActivity,
                    Severity::Medium,
                    &domain,
                    format!(
                        "Large data transfer from {}: {} bytes",
                        domain, observation.bytes
                    ),
                )
                .detail("url", json!(observation.url))
                .detail("bytes", json!(observation.bytes)),
            );
        }

        self.emit_all(pipeline, triggers).await
    }

    /// リソース使用状況を観測
    pub async fn observe_resource_usage(&self, sample: ResourceSample) -> Vec<SecurityEvent> {
        if !self.accept_signal().await {
            return Vec::new();
        }

        let mut pipeline = self.pipeline.lock().await;
        pipeline.metrics.record_resources(&sample);

        let memory_percent = sample.memory_percent();
        let mut triggers = Vec::new();
        if memory_percent > self.config.memory_usage_threshold {
            triggers.push(
                Trigger::new(
                    SecurityEventType::ResourceAbuse,
                    Severity::High,
                    "system",
                    format!("High memory usage: {:.1}%", memory_percent),
                )
                .detail("memoryUsed", json!(sample.memory_used))
                .detail("memoryLimit", json!(sample.memory_limit))
                .detail("memoryPercent", json!(memory_percent)),
            );
        }

        self.emit_all(pipeline, triggers).await
    }

    /// クリックを観測
    pub async fn observe_click(&self) -> Vec<SecurityEvent> {
        self.observe_click_at(Utc::now()).await
    }

    /// 指定時刻のクリックを観測
    pub async fn observe_click_at(&self, at: DateTime<Utc>) -> Vec<SecurityEvent> {
        if !self.accept_signal().await {
            return Vec::new();
        }

        let mut pipeline = self.pipeline.lock().await;
        pipeline.metrics.record_click();
        let recent_clicks = pipeline
            .clicks
            .record(at, self.config.rapid_click_window());

        let mut triggers = Vec::new();
        if recent_clicks == self.config.rapid_click_threshold + 1 {
            triggers.push(
                Trigger::new(
                    SecurityEventType::UnusualActivity,
                    Severity::Medium,
                    "user_interaction",
                    format!(
                        "Rapid clicking detected: {} clicks within {}ms",
                        recent_clicks, self.config.rapid_click_window_ms
                    ),
                )
                .detail("clicks", json!(recent_clicks)),
            );
        }

        self.emit_all(pipeline, triggers).await
    }

    /// ページ遷移を観測
    pub async fn observe_navigation(&self) -> Vec<SecurityEvent> {
        self.observe_navigation_at(Utc::now()).await
    }

    /// 指定時刻のページ遷移を観測
    pub async fn observe_navigation_at(&self, at: DateTime<Utc>) -> Vec<SecurityEvent> {
        if !self.accept_signal().await {
            return Vec::new();
        }

        let mut pipeline = self.pipeline.lock().await;
        let navigations = pipeline.metrics.record_navigation();

        let mut triggers = Vec::new();
        if navigations == self.config.navigation_threshold + 1 {
            triggers.push(
                Trigger::new(
                    SecurityEventType::UnusualActivity,
                    Severity::Low,
                    "user_interaction",
                    format!(
                        "Excessive navigation: {} page transitions in session",
                        navigations
                    ),
                )
                .detail("navigations", json!(navigations))
                .detail("observedAt", json!(at)),
            );
        }

        self.emit_all(pipeline, triggers).await
    }

    /// プローブ結果を観測（到達不能は通信失敗として扱う）
    pub async fn observe_probe(&self, target: &str, outcome: ProbeOutcome) -> Vec<SecurityEvent> {
        let observation = match outcome {
            ProbeOutcome::Reachable { latency_ms } => RequestObservation {
                url: target.to_string(),
                status: None,
                latency_ms,
                bytes: 0,
                error: None,
                timestamp: Utc::now(),
            },
            ProbeOutcome::Unreachable { reason } => {
                RequestObservation::failed(target, reason, 0.0)
            }
        };
        self.observe_request(observation).await
    }

    /// 発火をまとめて処理し、ロック解放後にフィードバック学習を行う
    async fn emit_all(
        &self,
        mut pipeline: MutexGuard<'_, PipelineState>,
        triggers: Vec<Trigger>,
    ) -> Vec<SecurityEvent> {
        let mut emitted = Vec::with_capacity(triggers.len());
        let mut feedback = Vec::with_capacity(triggers.len());
        for trigger in triggers {
            let (event, features) = self.emit(&mut pipeline, trigger).await;
            feedback.push((event.id, features, event.severity.is_threat_label()));
            emitted.push(event);
        }
        drop(pipeline);

        if self.config.learn_from_events {
            for (id, features, is_threat) in feedback {
                let outcome = self.engine.retrain_with_feedback(&features, is_threat).await;
                debug!(
                    "Feedback recorded for event {}: training_size={}, retrained={}",
                    id, outcome.training_data_size, outcome.retrained
                );
            }
        }

        emitted
    }

    /// 1件の発火を処理
    async fn emit(
        &self,
        pipeline: &mut PipelineState,
        trigger: Trigger,
    ) -> (SecurityEvent, FeatureVector) {
        pipeline.metrics.record_violation();
        let raw = pipeline.metrics.snapshot(Utc::now());
        let features = FeatureExtractor::extract(&raw);
        let prediction = self.engine.detect_threats(&raw).await;

        let event = SecurityEvent {
            id: Uuid::new_v4(),
            event_type: trigger.event_type,
            severity: trigger.severity,
            source: trigger.source,
            description: trigger.description,
            timestamp: Utc::now(),
            details: trigger.details,
            prediction: Some(prediction),
        };

        if event.severity >= Severity::High {
            warn!(
                "Security event [{:?}/{:?}] {}",
                event.event_type, event.severity, event.description
            );
        } else {
            info!(
                "Security event [{:?}/{:?}] {}",
                event.event_type, event.severity, event.description
            );
        }

        self.store(&event).await;
        self.bus.publish(&event);

        (event, features)
    }

    async fn store(&self, event: &SecurityEvent) {
        let evicted = {
            let mut events = self.events.write().await;
            events.push_back(event.clone());
            let mut evicted = 0u64;
            while events.len() > self.config.max_events {
                events.pop_front();
                evicted += 1;
            }
            evicted
        };

        let mut stats = self.stats.write().await;
        stats.total_events += 1;
        stats.evicted_events += evicted;
        *stats.events_by_type.entry(event.event_type).or_insert(0) += 1;
        *stats.events_by_severity.entry(event.severity).or_insert(0) += 1;
        stats.last_event = Some(event.timestamp);
    }

    /// コールバック購読者を登録
    pub fn on_security_event<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&SecurityEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    /// 購読を解除
    pub fn unsubscribe(&self, subscription_id: Uuid) -> bool {
        self.bus.unsubscribe(subscription_id)
    }

    /// 非同期受信用のレシーバー（登録以降のイベントのみ）
    pub fn subscribe_events(&self) -> broadcast::Receiver<SecurityEvent> {
        self.bus.receiver()
    }

    /// バッファ内のイベント（古い順）
    pub async fn events(&self) -> Vec<SecurityEvent> {
        self.events.read().await.iter().cloned().collect()
    }

    /// 最新のイベント（新しい順）
    pub async fn recent_events(&self, limit: usize) -> Vec<SecurityEvent> {
        self.events
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// 利用者側のイベントビュー
    pub async fn event_view(&self) -> SecurityEventView {
        SecurityEventView::new(self.events().await)
    }

    /// 統計を取得
    pub async fn stats(&self) -> MonitorStats {
        self.stats.read().await.clone()
    }

    /// 現在のメトリクス
    pub async fn metrics_snapshot(&self) -> RawMetrics {
        self.pipeline.lock().await.metrics.snapshot(Utc::now())
    }

    /// メトリクスとウィンドウをリセット（イベントバッファは保持）
    pub async fn reset_metrics(&self) {
        let mut pipeline = self.pipeline.lock().await;
        info!(
            "Resetting security monitor metrics ({} violations since {})",
            pipeline.metrics.violations(),
            pipeline.metrics.started_at()
        );
        pipeline.reset(Utc::now());
    }

    /// 脅威検知エンジン
    pub fn engine(&self) -> &Arc<ThreatDetectionEngine> {
        &self.engine
    }

    /// 設定
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}

impl Drop for SecurityMonitor {
    fn drop(&mut self) {
        if let Ok(mut task) = self.probe_task.try_lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}
