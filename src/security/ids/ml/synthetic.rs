//! Synthetic Bootstrap Data
//!
//! 初期化直後から予測できるよう、正常/脅威の合成サンプルを生成する。
//! 2つの分布は全スロットで重ならない。

use super::{FeatureVector, Label, TrainingSample, FEATURE_COUNT};
use rand::Rng;

/// スロットごとの一様分布の範囲 [min, max)
type SlotRanges = [(f64, f64); FEATURE_COUNT];

/// 正常トラフィック: 少ないリクエスト・エラー、低いリソース使用率
const NORMAL_RANGES: SlotRanges = [
    (5.0, 60.0),      // request_count
    (0.0, 3.0),       // failed_requests
    (50.0, 500.0),    // response_time
    (100.0, 2_000.0), // data_transferred
    (1.0, 10.0),      // unique_domains
    (0.0, 2.0),       // http_errors
    (0.0, 1.0),       // suspicious_patterns
    (20.0, 60.0),     // memory_usage
    (5.0, 50.0),      // cpu_usage
    (0.0, 10.0),      // click_rate
    (0.0, 5.0),       // navigation_rate
];

/// 脅威トラフィック: 大量のリクエスト・エラー、高負荷、バースト的な操作
const THREAT_RANGES: SlotRanges = [
    (100.0, 400.0),      // request_count
    (10.0, 60.0),        // failed_requests
    (800.0, 3_000.0),    // response_time
    (3_000.0, 12_000.0), // data_transferred
    (20.0, 80.0),        // unique_domains
    (5.0, 30.0),         // http_errors
    (3.0, 15.0),         // suspicious_patterns
    (70.0, 99.0),        // memory_usage
    (70.0, 100.0),       // cpu_usage
    (20.0, 60.0),        // click_rate
    (10.0, 30.0),        // navigation_rate
];

fn draw<R: Rng + ?Sized>(ranges: &SlotRanges, rng: &mut R) -> FeatureVector {
    let mut values = [0.0; FEATURE_COUNT];
    for (value, &(min, max)) in values.iter_mut().zip(ranges.iter()) {
        *value = rng.gen_range(min..max);
    }
    FeatureVector(values)
}

/// 正常な合成特徴量ベクトル
pub fn normal_vector<R: Rng + ?Sized>(rng: &mut R) -> FeatureVector {
    draw(&NORMAL_RANGES, rng)
}

/// 脅威の合成特徴量ベクトル
pub fn threat_vector<R: Rng + ?Sized>(rng: &mut R) -> FeatureVector {
    draw(&THREAT_RANGES, rng)
}

/// 初期学習用の合成データセット（正常 → 脅威の順）
pub fn bootstrap_dataset<R: Rng + ?Sized>(
    normal_count: usize,
    threat_count: usize,
    rng: &mut R,
) -> Vec<TrainingSample> {
    let mut samples = Vec::with_capacity(normal_count + threat_count);
    samples.extend((0..normal_count).map(|_| TrainingSample::new(normal_vector(rng), Label::Normal)));
    samples.extend((0..threat_count).map(|_| TrainingSample::new(threat_vector(rng), Label::Threat)));
    samples
}
