//! Random Forest Classifier
//!
//! ブートストラップ標本で学習した決定木の多数決による分類器。

use super::{DecisionTree, FeatureVector, Label, TrainingSample};
use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 多数決の結果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestVote {
    /// 予測ラベル
    pub prediction: Label,
    /// 信頼度（0: 票が二分、1: 全会一致）
    pub confidence: f64,
    /// 脅威に投票した木の数
    pub threat_votes: usize,
    /// 木の総数
    pub total_trees: usize,
}

/// ランダムフォレスト
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_trees: usize,
    max_depth: usize,
    min_samples: usize,
}

impl RandomForest {
    /// 新しいランダムフォレストを作成
    pub fn new(n_trees: usize, max_depth: usize, min_samples: usize) -> Self {
        Self {
            trees: Vec::with_capacity(n_trees),
            n_trees,
            max_depth,
            min_samples,
        }
    }

    /// 各木をブートストラップ標本（復元抽出・同サイズ）で学習
    pub fn train<R: Rng + ?Sized>(&mut self, samples: &[TrainingSample], rng: &mut R) -> Result<()> {
        if samples.is_empty() {
            return Err(Error::InvalidInput(
                "No training samples provided".to_string(),
            ));
        }
        if self.n_trees == 0 {
            return Err(Error::InvalidInput(
                "Random forest needs at least one tree".to_string(),
            ));
        }

        let mut trees = Vec::with_capacity(self.n_trees);
        let mut bootstrap = vec![0usize; samples.len()];

        for _ in 0..self.n_trees {
            for slot in bootstrap.iter_mut() {
                *slot = rng.gen_range(0..samples.len());
            }

            let mut tree = DecisionTree::new();
            tree.train_indices(samples, &bootstrap, self.max_depth, self.min_samples)?;
            trees.push(tree);
        }

        self.trees = trees;
        debug!(
            "Random forest trained: {} trees on {} samples (max depth {}, {} nodes)",
            self.tree_count(),
            samples.len(),
            self.trees.iter().map(DecisionTree::depth).max().unwrap_or(0),
            self.trees.iter().map(DecisionTree::node_count).sum::<usize>()
        );
        Ok(())
    }

    /// 多数決で予測
    ///
    /// 脅威票が木の数の半分を超えた場合のみ脅威とする（同数は正常）。
    pub fn predict(&self, features: &FeatureVector) -> ForestVote {
        let total_trees = self.trees.len();
        if total_trees == 0 {
            return ForestVote {
                prediction: Label::Normal,
                confidence: 0.0,
                threat_votes: 0,
                total_trees: 0,
            };
        }

        let threat_votes = self
            .trees
            .iter()
            .filter(|tree| tree.predict(features).is_threat())
            .count();

        let prediction = if threat_votes as f64 > total_trees as f64 / 2.0 {
            Label::Threat
        } else {
            Label::Normal
        };
        let threat_fraction = threat_votes as f64 / total_trees as f64;
        let confidence = ((threat_fraction - 0.5).abs() * 2.0).clamp(0.0, 1.0);

        ForestVote {
            prediction,
            confidence,
            threat_votes,
            total_trees,
        }
    }

    /// 学習済みかチェック
    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty() && self.trees.iter().all(DecisionTree::is_trained)
    }

    /// 学習済みの木の数
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// テスト用: 任意の木で構成
    #[cfg(test)]
    fn from_trees(trees: Vec<DecisionTree>) -> Self {
        let n_trees = trees.len();
        Self {
            trees,
            n_trees,
            max_depth: 0,
            min_samples: 0,
        }
    }
}
