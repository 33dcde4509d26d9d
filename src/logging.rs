use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// ログ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// ログレベル (trace, debug, info, warn, error) または EnvFilter 形式
    pub level: String,
    /// ログディレクトリ（None の場合はファイル出力なし）
    pub log_dir: Option<PathBuf>,
    /// ファイルローテーション設定
    pub rotation: LogRotation,
    /// JSON 形式で出力
    pub json: bool,
    /// コンソール出力有効
    pub console_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// 日次ローテーション
    Daily,
    /// 時間毎ローテーション
    Hourly,
    /// ローテーションなし
    Never,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            rotation: LogRotation::Daily,
            json: false,
            console_enabled: true,
        }
    }
}

impl LogSettings {
    /// ログレベルを上書き
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// カスタムログディレクトリを設定
    pub fn with_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// EnvFilter を構築（RUST_LOG が優先）
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// ログシステムを初期化
///
/// ファイル出力時は返却される `WorkerGuard` をプロセス終了まで保持すること。
pub fn init_logging(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let env_filter = settings.env_filter();

    let guard = match (&settings.log_dir, settings.console_enabled) {
        (Some(dir), console) => {
            ensure_log_dir(dir)?;
            let file_appender = match settings.rotation {
                LogRotation::Daily => rolling::daily(dir, "netsentinel.log"),
                LogRotation::Hourly => rolling::hourly(dir, "netsentinel.log"),
                LogRotation::Never => rolling::never(dir, "netsentinel.log"),
            };
            let (file_writer, guard) = non_blocking(file_appender);

            let builder = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_line_number(true);

            let installed = match (console, settings.json) {
                (true, true) => builder
                    .json()
                    .with_writer(std::io::stderr.and(file_writer))
                    .try_init(),
                (true, false) => builder
                    .with_writer(std::io::stderr.and(file_writer))
                    .try_init(),
                (false, true) => builder.json().with_writer(file_writer).try_init(),
                (false, false) => builder.with_ansi(false).with_writer(file_writer).try_init(),
            };
            installed.map_err(|e| anyhow::anyhow!("failed to install subscriber: {}", e))?;

            Some(guard)
        }
        (None, true) => {
            let builder = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_writer(std::io::stderr);

            let installed = if settings.json {
                builder.json().try_init()
            } else {
                builder.try_init()
            };
            installed.map_err(|e| anyhow::anyhow!("failed to install subscriber: {}", e))?;

            None
        }
        (None, false) => {
            // 最低限の警告出力
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::WARN)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install subscriber: {}", e))?;
            None
        }
    };

    tracing::info!(
        level = %settings.level,
        json = settings.json,
        file = ?settings.log_dir,
        "Logging initialized"
    );

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_settings_default() {
        let settings = LogSettings::default();
        assert_eq!(settings.level, "info");
        assert!(settings.console_enabled);
        assert!(settings.log_dir.is_none());
        assert_eq!(settings.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_log_settings_builders() {
        let settings = LogSettings::default()
            .with_level("debug")
            .with_log_dir("/tmp/netsentinel-logs");
        assert_eq!(settings.level, "debug");
        assert_eq!(
            settings.log_dir,
            Some(PathBuf::from("/tmp/netsentinel-logs"))
        );
    }

    #[test]
    fn test_ensure_log_dir() {
        let temp_dir = tempdir().unwrap();
        let log_dir = temp_dir.path().join("test_logs");

        assert!(ensure_log_dir(&log_dir).is_ok());
        assert!(log_dir.exists());
    }

    #[test]
    fn test_rotation_deserialize() {
        let rotation: LogRotation = serde_json::from_str("\"hourly\"").unwrap();
        assert_eq!(rotation, LogRotation::Hourly);
    }
}
