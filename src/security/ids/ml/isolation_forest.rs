//! Isolation Forest
//!
//! ランダム分割で点を孤立させるまでのパス長から異常スコアを算出する。
//! 異常点は少ない分割で孤立するため、平均パス長が短くなる。

use super::{FeatureVector, FEATURE_COUNT};
use crate::error::{Error, Result};
use rand::distributions::Open01;
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// オイラー・マスケローニ定数
const EULER_GAMMA: f64 = 0.5772156649;

/// サイズ n の部分木における平均パス長の補正値 c(n)
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
}

/// Isolation Treeのノード
#[derive(Debug, Clone, Serialize, Deserialize)]
enum IsolationNode {
    /// 外部ノード（パーティションサイズ）
    External { size: usize },
    /// 内部ノード（`value < split_value` なら左）
    Internal {
        feature: usize,
        split_value: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
}

/// 単一のIsolation Tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationTree {
    root: IsolationNode,
    height_limit: usize,
}

impl IsolationTree {
    /// サブサンプルから木を構築
    ///
    /// 深さの上限は `ceil(log2(サブサンプルサイズ))`。
    pub fn build<R: Rng + ?Sized>(points: &[&FeatureVector], rng: &mut R) -> Self {
        let height_limit = (points.len().max(1) as f64).log2().ceil() as usize;
        let root = Self::build_node(points.to_vec(), 0, height_limit, rng);
        Self { root, height_limit }
    }

    fn build_node<R: Rng + ?Sized>(
        points: Vec<&FeatureVector>,
        depth: usize,
        height_limit: usize,
        rng: &mut R,
    ) -> IsolationNode {
        let external = IsolationNode::External { size: points.len() };
        if depth >= height_limit || points.len() <= 1 {
            return external;
        }

        let feature = rng.gen_range(0..FEATURE_COUNT);
        let (min, max) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, p| {
            (acc.0.min(p.0[feature]), acc.1.max(p.0[feature]))
        });

        // 定数の特徴量は分割できない
        if max <= min {
            return external;
        }

        let unit: f64 = rng.sample(Open01);
        let split_value = min + (max - min) * unit;
        if split_value <= min || split_value >= max {
            return external;
        }

        let (left, right): (Vec<&FeatureVector>, Vec<&FeatureVector>) = points
            .into_iter()
            .partition(|p| p.0[feature] < split_value);

        IsolationNode::Internal {
            feature,
            split_value,
            left: Box::new(Self::build_node(left, depth + 1, height_limit, rng)),
            right: Box::new(Self::build_node(right, depth + 1, height_limit, rng)),
        }
    }

    /// 点のパス長（外部ノードでは c(size) を加算）
    pub fn path_length(&self, point: &FeatureVector) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;

        loop {
            match node {
                IsolationNode::External { size } => {
                    return depth as f64 + average_path_length(*size);
                }
                IsolationNode::Internal {
                    feature,
                    split_value,
                    left,
                    right,
                } => {
                    node = if point.0[*feature] < *split_value {
                        left
                    } else {
                        right
                    };
                    depth += 1;
                }
            }
        }
    }

    /// 深さの上限
    pub fn height_limit(&self) -> usize {
        self.height_limit
    }
}

/// Isolation Forestの判定結果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsolationScore {
    /// 異常スコア（0.0 < score <= 1.0）
    pub anomaly_score: f64,
    /// 異常フラグ
    pub is_anomaly: bool,
    /// 平均パス長
    pub mean_path_length: f64,
}

/// Isolation Forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    n_trees: usize,
    sample_size: usize,
    threshold: f64,
    /// 学習時の実サブサンプルサイズ
    effective_sample_size: usize,
}

impl IsolationForest {
    /// 新しいIsolation Forestを作成
    pub fn new(n_trees: usize, sample_size: usize, threshold: f64) -> Self {
        Self {
            trees: Vec::with_capacity(n_trees),
            n_trees,
            sample_size,
            threshold,
            effective_sample_size: 0,
        }
    }

    /// 各木を非復元抽出のサブサンプルで学習
    pub fn train<R: Rng + ?Sized>(&mut self, data: &[FeatureVector], rng: &mut R) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidInput(
                "No training samples provided".to_string(),
            ));
        }
        if self.n_trees == 0 || self.sample_size == 0 {
            return Err(Error::InvalidInput(
                "Isolation forest needs trees and a positive sample size".to_string(),
            ));
        }

        let sample_size = self.sample_size.min(data.len());
        let mut trees = Vec::with_capacity(self.n_trees);

        for _ in 0..self.n_trees {
            let subsample: Vec<&FeatureVector> = index::sample(rng, data.len(), sample_size)
                .into_iter()
                .map(|i| &data[i])
                .collect();
            trees.push(IsolationTree::build(&subsample, rng));
        }

        self.trees = trees;
        self.effective_sample_size = sample_size;
        debug!(
            "Isolation forest trained: {} trees, sample size {}, height limit {}",
            self.tree_count(),
            sample_size,
            self.trees.first().map_or(0, IsolationTree::height_limit)
        );
        Ok(())
    }

    /// 異常スコアを計算: 2^(-平均パス長 / c(サブサンプルサイズ))
    pub fn score(&self, point: &FeatureVector) -> Result<IsolationScore> {
        if self.trees.is_empty() {
            return Err(Error::ModelNotTrained("isolation forest".to_string()));
        }

        let mean_path_length = self
            .trees
            .iter()
            .map(|tree| tree.path_length(point))
            .sum::<f64>()
            / self.trees.len() as f64;

        let normalizer = average_path_length(self.effective_sample_size);
        let anomaly_score = if normalizer > 0.0 {
            2f64.powf(-mean_path_length / normalizer)
        } else {
            // サブサンプルが1点のみの場合は全点が同じパス長
            1.0
        };

        Ok(IsolationScore {
            anomaly_score,
            is_anomaly: anomaly_score > self.threshold,
            mean_path_length,
        })
    }

    /// 学習済みかチェック
    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    /// 学習済みの木の数
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}
