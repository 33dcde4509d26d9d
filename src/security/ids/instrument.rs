//! Request Instrumentation
//!
//! 呼び出し側の通信処理をラップして観測する。結果はそのまま呼び出し側に返す。

use super::monitor::SecurityMonitor;
use super::types::RequestObservation;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

/// 観測可能な応答
pub trait ObservedResponse {
    /// HTTPステータスコード
    fn status_code(&self) -> u16;

    /// 応答サイズ（不明ならNone）
    fn body_size(&self) -> Option<u64>;
}

impl ObservedResponse for reqwest::Response {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }

    fn body_size(&self) -> Option<u64> {
        self.content_length()
    }
}

/// 応答の要約（ステータスとサイズのみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSummary {
    /// HTTPステータスコード
    pub status: u16,
    /// 応答サイズ（バイト）
    pub bytes: u64,
}

impl ObservedResponse for ResponseSummary {
    fn status_code(&self) -> u16 {
        self.status
    }

    fn body_size(&self) -> Option<u64> {
        Some(self.bytes)
    }
}

impl SecurityMonitor {
    /// 通信処理を計測して観測する
    ///
    /// 成功時はステータス・応答時間・サイズを、失敗時は通信失敗を記録する。
    pub async fn instrument<F, T, E>(&self, url: &str, call: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        T: ObservedResponse,
        E: Display,
    {
        let started = Instant::now();
        let result = call.await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let observation = match &result {
            Ok(response) => RequestObservation::completed(
                url,
                response.status_code(),
                latency_ms,
                response.body_size().unwrap_or(0),
            ),
            Err(e) => RequestObservation::failed(url, e.to_string(), latency_ms),
        };
        self.observe_request(observation).await;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::ids::config::MonitorConfig;
    use crate::security::ids::ml::{MLConfig, ThreatDetectionEngine};
    use crate::security::ids::types::SecurityEventType;
    use std::sync::Arc;

    async fn monitor() -> Arc<SecurityMonitor> {
        let engine = Arc::new(ThreatDetectionEngine::untrained(MLConfig::default()));
        let monitor = Arc::new(SecurityMonitor::new(MonitorConfig::default(), engine));
        monitor.start().await.unwrap();
        monitor
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let monitor = monitor().await;
        let response = monitor
            .instrument("https://api.example.com/items", async {
                Ok::<_, std::io::Error>(ResponseSummary {
                    status: 200,
                    bytes: 4096,
                })
            })
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        let snapshot = monitor.metrics_snapshot().await;
        assert_eq!(snapshot.request_count, 1.0);
        assert_eq!(snapshot.data_transferred, 4.0);
        assert!(monitor.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_returned() {
        let monitor = monitor().await;
        let result = monitor
            .instrument("https://api.example.com/items", async {
                Err::<ResponseSummary, _>(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                ))
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset);

        let events = monitor.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SecurityEventType::SuspiciousRequest);
        assert_eq!(events[0].details["error"], "connection reset by peer");
    }
}
