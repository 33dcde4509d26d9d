use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use netsentinel_rs::config::SentinelConfig;
use netsentinel_rs::logging::init_logging;
use netsentinel_rs::security::ids::ml::{MLConfig, RawMetrics, ThreatDetectionEngine};
use netsentinel_rs::security::ids::{
    Probe, RequestObservation, ResourceSample, SecurityMonitor, TcpConnectProbe,
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 設定ファイル（TOML）
    #[arg(short, long, global = true, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// ログレベル（設定ファイルより優先）
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 合成トラフィックをモニターに流し、発行されたイベントをJSONで出力
    Simulate {
        /// 単一ドメインへのバーストリクエスト数
        #[arg(long, default_value_t = 120)]
        requests: usize,
        /// バースト対象のドメイン
        #[arg(long, default_value = "api.example.com")]
        domain: String,
        /// 乱数シード
        #[arg(long)]
        seed: Option<u64>,
    },
    /// RawMetrics のJSONをスコアリング（ファイル省略時は標準入力）
    Score {
        /// 入力JSONファイル
        input: Option<PathBuf>,
    },
    /// 初期学習後のモデル統計を出力
    Stats,
    /// 対象ホストへのTCP疎通確認
    Probe {
        /// 対象（"host" または "host:port"）
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// サンプル設定ファイルを生成
    InitConfig {
        /// 出力先
        #[arg(short, long, default_value = "netsentinel.toml.example")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        SentinelConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    let _guard = init_logging(&config.log)?;

    match cli.command {
        Commands::Simulate {
            requests,
            domain,
            seed,
        } => {
            if let Some(seed) = seed {
                config.ml.seed = Some(seed);
            }
            simulate(config, requests, &domain).await
        }
        Commands::Score { input } => score(config.ml, input).await,
        Commands::Stats => stats(config.ml).await,
        Commands::Probe { targets } => probe(&config, &targets).await,
        Commands::InitConfig { output } => {
            SentinelConfig::write_sample(&output)?;
            println!("{}", output.display());
            Ok(())
        }
    }
}

async fn simulate(config: SentinelConfig, requests: usize, domain: &str) -> Result<()> {
    let engine = Arc::new(ThreatDetectionEngine::new(config.ml).await);
    let monitor = Arc::new(SecurityMonitor::new(config.monitor, engine));

    let subscription = monitor.on_security_event(|event| match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("Failed to serialize event {}: {}", event.id, e),
    });

    monitor.start().await?;
    info!("Running simulated traffic scenario against {}", domain);

    let url = format!("https://{}/api/v1/data", domain);
    let start = Utc::now();
    for i in 0..requests {
        let observation = RequestObservation::completed(&url, 200, 80.0, 2_048)
            .at(start + ChronoDuration::milliseconds(i as i64 * 20));
        monitor.observe_request(observation).await;
    }

    let login = format!("https://auth.{}/login", domain);
    for _ in 0..8 {
        monitor
            .observe_request(RequestObservation::completed(&login, 401, 120.0, 256))
            .await;
    }

    monitor
        .observe_request(RequestObservation::completed(
            format!("https://reports.{}/export", domain),
            200,
            12_500.0,
            24 * 1024 * 1024,
        ))
        .await;
    monitor
        .observe_request(RequestObservation::failed(
            format!("https://legacy.{}/", domain),
            "connection refused",
            15.0,
        ))
        .await;

    monitor
        .observe_resource_usage(ResourceSample {
            memory_used: 940 * 1024 * 1024,
            memory_limit: 1024 * 1024 * 1024,
            cpu_usage: 85.0,
        })
        .await;

    let clicks_at = Utc::now();
    for i in 0..12 {
        monitor
            .observe_click_at(clicks_at + ChronoDuration::milliseconds(i * 40))
            .await;
    }
    for _ in 0..25 {
        monitor.observe_navigation().await;
    }

    monitor.stop().await;
    subscription.unsubscribe();

    let stats = monitor.stats().await;
    let model_stats = monitor.engine().model_stats().await;
    info!(
        "Simulation finished: {} events, training set {}, model version {}",
        stats.total_events, model_stats.training_data_size, model_stats.model_version
    );
    eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn score(ml: MLConfig, input: Option<PathBuf>) -> Result<()> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let metrics: RawMetrics = serde_json::from_str(&raw).context("Invalid RawMetrics JSON")?;

    let engine = ThreatDetectionEngine::new(ml).await;
    let prediction = engine.detect_threats(&metrics).await;
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

async fn stats(ml: MLConfig) -> Result<()> {
    let engine = ThreatDetectionEngine::new(ml).await;
    println!("{}", serde_json::to_string_pretty(&engine.model_stats().await)?);
    Ok(())
}

async fn probe(config: &SentinelConfig, targets: &[String]) -> Result<()> {
    let prober = TcpConnectProbe::new(config.monitor.probe_timeout());
    let mut unreachable = 0usize;

    for target in targets {
        match prober.probe(target).await.latency() {
            Ok(latency_ms) => println!("{}\treachable\t{:.1}ms", target, latency_ms),
            Err(e) => {
                unreachable += 1;
                println!("{}\tunreachable\t{}", target, e);
            }
        }
    }

    if unreachable > 0 {
        anyhow::bail!("{} of {} targets unreachable", unreachable, targets.len());
    }
    Ok(())
}
