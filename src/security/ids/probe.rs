//! Reachability Probes
//!
//! 監視対象ホストへの疎通確認。到達不能な対象は通信失敗として扱われる。

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

/// プローブ結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    /// 到達可能
    Reachable {
        /// 接続までの時間（ミリ秒）
        latency_ms: f64,
    },
    /// 到達不能
    Unreachable {
        /// 失敗理由
        reason: String,
    },
}

impl ProbeOutcome {
    /// 到達可能か
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable { .. })
    }

    /// 接続時間を取り出す（到達不能ならエラー）
    pub fn latency(self) -> Result<f64> {
        match self {
            ProbeOutcome::Reachable { latency_ms } => Ok(latency_ms),
            ProbeOutcome::Unreachable { reason } => Err(Error::Probe(reason)),
        }
    }
}

/// 疎通確認の実装
#[async_trait]
pub trait Probe: Send + Sync {
    /// 対象に対して疎通確認を行う
    async fn probe(&self, target: &str) -> ProbeOutcome;
}

/// TCP接続による疎通確認
#[derive(Debug, Clone)]
pub struct TcpConnectProbe {
    timeout: Duration,
    default_port: u16,
}

impl TcpConnectProbe {
    /// 新しいTCPプローブを作成（ポート省略時は80）
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            default_port: 80,
        }
    }

    /// ポート省略時の接続先ポートを指定
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// 接続先アドレス（"host" → "host:default_port"）
    fn address(&self, target: &str) -> String {
        let has_port = match target.rsplit_once(':') {
            // IPv6リテラルは "[::1]:443" の形式のみポート付きとみなす
            Some((host, port)) => {
                port.parse::<u16>().is_ok() && (!host.contains(':') || host.ends_with(']'))
            }
            None => false,
        };

        if has_port {
            target.to_string()
        } else {
            format!("{}:{}", target, self.default_port)
        }
    }
}

#[async_trait]
impl Probe for TcpConnectProbe {
    async fn probe(&self, target: &str) -> ProbeOutcome {
        let address = self.address(target);
        let started = Instant::now();

        let outcome = match tokio::time::timeout(self.timeout, TcpStream::connect(&address)).await {
            Ok(Ok(_stream)) => ProbeOutcome::Reachable {
                latency_ms: started.elapsed().as_secs_f64() * 1000.0,
            },
            Ok(Err(e)) => ProbeOutcome::Unreachable {
                reason: e.to_string(),
            },
            Err(_) => ProbeOutcome::Unreachable {
                reason: format!("connect timed out after {:?}", self.timeout),
            },
        };

        debug!("Probe {} -> {:?}", address, outcome);
        outcome
    }
}
