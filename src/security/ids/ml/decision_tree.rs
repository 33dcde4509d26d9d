//! Decision Tree Classifier
//!
//! Gini不純度を最小化する二分割を再帰的に選択する分類木。

use super::{FeatureVector, Label, TrainingSample, FEATURE_COUNT};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// 分割による不純度の改善とみなす最小差分
const MIN_IMPURITY_DECREASE: f64 = 1e-12;

/// 決定木ノード
#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    /// 葉ノード（多数派ラベル）
    Leaf { prediction: Label },
    /// 内部ノード（`value <= threshold` なら左）
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// 最良分割候補
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    cost: f64,
}

/// ラベル別の件数
#[derive(Debug, Clone, Copy, Default)]
struct LabelCounts {
    normal: usize,
    threat: usize,
}

impl LabelCounts {
    fn add(&mut self, label: Label) {
        match label {
            Label::Normal => self.normal += 1,
            Label::Threat => self.threat += 1,
        }
    }

    fn total(&self) -> usize {
        self.normal + self.threat
    }

    fn gini(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let p_normal = self.normal as f64 / total as f64;
        let p_threat = self.threat as f64 / total as f64;
        1.0 - p_normal * p_normal - p_threat * p_threat
    }

    fn is_pure(&self) -> bool {
        self.normal == 0 || self.threat == 0
    }
}

/// 決定木分類器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
}

impl DecisionTree {
    /// 未学習の決定木を作成
    pub fn new() -> Self {
        Self { root: None }
    }

    /// 学習データ全体で木を構築
    pub fn train(
        &mut self,
        samples: &[TrainingSample],
        max_depth: usize,
        min_samples: usize,
    ) -> Result<()> {
        let indices: Vec<usize> = (0..samples.len()).collect();
        self.train_indices(samples, &indices, max_depth, min_samples)
    }

    /// インデックスで指定した行（重複可）で木を構築
    ///
    /// ブートストラップ標本を行のコピーなしで学習するために使用する。
    pub fn train_indices(
        &mut self,
        samples: &[TrainingSample],
        indices: &[usize],
        max_depth: usize,
        min_samples: usize,
    ) -> Result<()> {
        if indices.is_empty() {
            return Err(Error::InvalidInput(
                "No training samples provided".to_string(),
            ));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= samples.len()) {
            return Err(Error::InvalidInput(format!(
                "Sample index {} out of range ({} samples)",
                bad,
                samples.len()
            )));
        }

        let builder = TreeBuilder {
            samples,
            max_depth,
            min_samples,
        };
        self.root = Some(builder.build(indices.to_vec(), 0));
        Ok(())
    }

    /// ラベルを予測（未学習の場合は正常）
    pub fn predict(&self, features: &FeatureVector) -> Label {
        let mut node = match &self.root {
            Some(root) => root,
            None => return Label::Normal,
        };

        loop {
            match node {
                TreeNode::Leaf { prediction } => return *prediction,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if features.0[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    /// 学習済みかチェック
    pub fn is_trained(&self) -> bool {
        self.root.is_some()
    }

    /// 木の深さ（葉のみなら0）
    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        self.root.as_ref().map(walk).unwrap_or(0)
    }

    /// ノード数
    pub fn node_count(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + walk(left) + walk(right),
            }
        }
        self.root.as_ref().map(walk).unwrap_or(0)
    }
}

/// 再帰的な木構築
struct TreeBuilder<'a> {
    samples: &'a [TrainingSample],
    max_depth: usize,
    min_samples: usize,
}

impl TreeBuilder<'_> {
    fn build(&self, indices: Vec<usize>, depth: usize) -> TreeNode {
        let mut counts = LabelCounts::default();
        for &i in &indices {
            counts.add(self.samples[i].label);
        }
        let leaf = TreeNode::Leaf {
            prediction: self.majority(&indices, counts),
        };

        if depth >= self.max_depth || indices.len() < self.min_samples || counts.is_pure() {
            return leaf;
        }

        let split = match self.best_split(&indices, counts) {
            Some(split) if counts.gini() - split.cost > MIN_IMPURITY_DECREASE => split,
            _ => return leaf,
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.samples[i].features.0[split.feature] <= split.threshold);

        // 中点の丸めで片側が空になる場合は分割しない
        if left.is_empty() || right.is_empty() {
            return leaf;
        }

        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.build(left, depth + 1)),
            right: Box::new(self.build(right, depth + 1)),
        }
    }

    /// 多数派ラベル（同数の場合は先頭サンプルのラベル）
    fn majority(&self, indices: &[usize], counts: LabelCounts) -> Label {
        if counts.threat > counts.normal {
            Label::Threat
        } else if counts.normal > counts.threat {
            Label::Normal
        } else {
            indices
                .first()
                .map(|&i| self.samples[i].label)
                .unwrap_or(Label::Normal)
        }
    }

    /// 全特徴量・全中点から重み付きGini不純度が最小の分割を探索
    fn best_split(&self, indices: &[usize], totals: LabelCounts) -> Option<SplitCandidate> {
        let n = indices.len() as f64;
        let mut best: Option<SplitCandidate> = None;
        let mut column: Vec<(f64, Label)> = Vec::with_capacity(indices.len());

        for feature in 0..FEATURE_COUNT {
            column.clear();
            column.extend(
                indices
                    .iter()
                    .map(|&i| (self.samples[i].features.0[feature], self.samples[i].label)),
            );
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = LabelCounts::default();
            for pos in 0..column.len() - 1 {
                left.add(column[pos].1);

                let (value, next) = (column[pos].0, column[pos + 1].0);
                if value == next {
                    continue;
                }

                let right = LabelCounts {
                    normal: totals.normal - left.normal,
                    threat: totals.threat - left.threat,
                };
                let cost = (left.total() as f64 * left.gini()
                    + right.total() as f64 * right.gini())
                    / n;

                if best.map_or(true, |b| cost < b.cost) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (value + next) / 2.0,
                        cost,
                    });
                }
            }
        }

        best
    }
}
