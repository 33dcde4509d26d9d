//! # netsentinel-rs
//!
//! Real-time ensemble threat detection for network monitoring dashboards.
//!
//! Network, interaction and resource signals are evaluated against a set of
//! security rules; every rule that fires becomes a [`SecurityEvent`] annotated
//! with a fused Random Forest + Isolation Forest threat prediction, and the
//! event is fed back into the models as a training sample.
//!
//! [`SecurityEvent`]: security::ids::SecurityEvent

pub mod config;
pub mod error;
pub mod logging;
pub mod security;

pub use config::SentinelConfig;
pub use error::{Error, Result};
pub use security::ids::ml::{RawMetrics, ThreatDetectionEngine, ThreatPrediction};
pub use security::ids::{SecurityEvent, SecurityMonitor};
