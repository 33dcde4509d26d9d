use crate::error::{Error, Result};
use crate::logging::LogSettings;
use crate::security::ids::ml::MLConfig;
use crate::security::ids::{MonitorConfig, MAX_WINDOW_SECS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// 環境変数のプレフィックス（例: SENTINEL_MONITOR__MAX_EVENTS=200）
pub const ENV_PREFIX: &str = "SENTINEL";

/// 既定の設定ファイル探索パス
const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "netsentinel.toml",
    "config/netsentinel.toml",
    "config.toml",
];

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// ログ設定
    pub log: LogSettings,
    /// ML脅威検知設定
    pub ml: MLConfig,
    /// セキュリティモニター設定
    pub monitor: MonitorConfig,
}

impl SentinelConfig {
    /// デフォルト値 → 設定ファイル → 環境変数の順に読み込み
    ///
    /// パス未指定の場合は既定の場所を探し、見つからなければデフォルト値を使う。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Configuration file not found: {}",
                        path.display()
                    )));
                }
                info!("Loading configuration from {}", path.display());
                settings = settings.add_source(
                    config::File::from(path)
                        .format(config::FileFormat::Toml)
                        .required(true),
                );
            }
            None => {
                if let Some(found) = DEFAULT_CONFIG_PATHS
                    .iter()
                    .map(Path::new)
                    .find(|p| p.exists())
                {
                    info!("Loading configuration from {}", found.display());
                    settings = settings.add_source(
                        config::File::from(found).format(config::FileFormat::Toml),
                    );
                }
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: SentinelConfig = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 設定値の整合性を検証
    pub fn validate(&self) -> Result<()> {
        let ml = &self.ml;
        if ml.retained_training_samples > ml.max_training_samples {
            return Err(Error::Config(format!(
                "ml.retained_training_samples ({}) exceeds ml.max_training_samples ({})",
                ml.retained_training_samples, ml.max_training_samples
            )));
        }
        if !(0.0..=1.0).contains(&ml.anomaly_threshold) {
            return Err(Error::Config(format!(
                "ml.anomaly_threshold must be within 0.0-1.0, got {}",
                ml.anomaly_threshold
            )));
        }
        if ml.classifier_weight < 0.0 || ml.anomaly_weight < 0.0 {
            return Err(Error::Config(
                "ml fusion weights must be non-negative".to_string(),
            ));
        }
        if !(0..=MAX_WINDOW_SECS as i64).contains(&ml.history_window_secs) {
            return Err(Error::Config(format!(
                "ml.history_window_secs must be within 0-{}, got {}",
                MAX_WINDOW_SECS, ml.history_window_secs
            )));
        }
        let monitor = &self.monitor;
        if monitor.observation_window_secs > MAX_WINDOW_SECS
            || monitor.rapid_click_window_ms > MAX_WINDOW_SECS * 1000
        {
            return Err(Error::Config(format!(
                "monitor time windows must not exceed {}s",
                MAX_WINDOW_SECS
            )));
        }
        if self.monitor.max_events == 0 {
            return Err(Error::Config(
                "monitor.max_events must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// サンプル設定ファイルの内容を生成
    pub fn sample_toml() -> Result<String> {
        let body = toml::to_string_pretty(&Self::default())
            .map_err(|e| Error::Config(format!("Failed to render sample config: {}", e)))?;

        Ok(format!(
            r#"# netsentinel configuration
#
# 環境変数での上書きも可能です
# (例: SENTINEL_MONITOR__MAX_EVENTS=200, SENTINEL_LOG__LEVEL=debug)

{}"#,
            body
        ))
    }

    /// サンプル設定ファイルを書き出し
    pub fn write_sample(path: &Path) -> Result<()> {
        std::fs::write(path, Self::sample_toml()?)?;
        info!("Sample configuration written to {}", path.display());
        Ok(())
    }
}
