//! Security Monitoring & Intrusion Detection
//!
//! 通信・操作・リソースのシグナルをルールで評価し、アンサンブル機械学習による
//! 脅威予測を付与したセキュリティイベントを発行します。
//!
//! ## 主要機能
//!
//! - **ルールベース検知**: ドメイン別リクエスト数、4xx応答、低速応答、通信失敗、
//!   大容量転送、メモリ使用率、連続クリック、過剰なページ遷移
//! - **ML脅威予測**: ランダムフォレスト + Isolation Forestの融合スコア
//! - **イベント配信**: 登録順のコールバック通知とブロードキャストチャネル
//! - **オンライン学習**: 発行したイベントを学習データとして還元
//!
//! ## 使用例
//!
//! ```rust,no_run
//! use netsentinel_rs::security::ids::ml::{MLConfig, ThreatDetectionEngine};
//! use netsentinel_rs::security::ids::{MonitorConfig, RequestObservation, SecurityMonitor};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(ThreatDetectionEngine::new(MLConfig::default()).await);
//! let monitor = Arc::new(SecurityMonitor::new(MonitorConfig::default(), engine));
//! monitor.start().await?;
//!
//! let _subscription = monitor.on_security_event(|event| {
//!     println!("[{:?}] {}", event.severity, event.description);
//! });
//!
//! let events = monitor
//!     .observe_request(RequestObservation::failed(
//!         "https://api.example.com/v1/data",
//!         "connection reset",
//!         120.0,
//!     ))
//!     .await;
//! assert_eq!(events.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod events;
pub mod instrument;
pub mod metrics;
pub mod ml;
pub mod monitor;
pub mod probe;
pub mod types;

pub use config::{MonitorConfig, MonitorStats, MAX_WINDOW_SECS};
pub use events::{EventCallback, SecurityEventView, SubscriptionHandle};
pub use instrument::{ObservedResponse, ResponseSummary};
pub use metrics::NetworkMetrics;
pub use monitor::{MonitorState, SecurityMonitor};
pub use probe::{Probe, ProbeOutcome, TcpConnectProbe};
pub use types::{RequestObservation, ResourceSample, SecurityEvent, SecurityEventType, Severity};
