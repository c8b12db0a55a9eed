//! Weighted gini decision tree stored as a flat node arena.

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Node in a pre-order arena. Children always follow their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum Node {
    Leaf {
        /// Weighted fraction of positive samples that reached this leaf.
        positive: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(super) struct DecisionTree {
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy)]
pub(super) struct GrowParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: usize,
}

struct Builder<'a, R> {
    x: &'a [Vec<f64>],
    y: &'a [bool],
    weights: &'a [f64],
    params: GrowParams,
    rng: &'a mut R,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    decrease: f64,
    position: usize,
}

fn gini(positive: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let p = positive / total;
    2.0 * p * (1.0 - p)
}

impl<R: Rng> Builder<'_, R> {
    fn totals(&self, samples: &[usize]) -> (f64, f64) {
        samples.iter().fold((0.0, 0.0), |(pos, total), &i| {
            let w = self.weights[i];
            (if self.y[i] { pos + w } else { pos }, total + w)
        })
    }

    fn grow(&mut self, samples: &mut [usize], depth: usize) -> usize {
        let id = self.nodes.len();
        let (w_pos, w_total) = self.totals(samples);
        let leaf_value = if w_total > 0.0 { w_pos / w_total } else { 0.0 };
        self.nodes.push(Node::Leaf {
            positive: leaf_value,
        });

        let pure = w_pos <= 0.0 || w_pos >= w_total;
        if pure || depth >= self.params.max_depth || samples.len() < self.params.min_samples_split
        {
            return id;
        }

        let Some(best) = self.best_split(samples, w_pos, w_total) else {
            return id;
        };

        self.importances[best.feature] += best.decrease;

        // Re-sort by the winning feature so the partition is contiguous.
        let feature = best.feature;
        samples.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));
        let (left_samples, right_samples) = samples.split_at_mut(best.position);

        let left = self.grow(left_samples, depth + 1);
        let right = self.grow(right_samples, depth + 1);
        self.nodes[id] = Node::Split {
            feature,
            threshold: best.threshold,
            left,
            right,
        };
        id
    }

    fn best_split(&mut self, samples: &[usize], w_pos: f64, w_total: f64) -> Option<BestSplit> {
        let n_features = self.importances.len();
        let k = self.params.max_features.clamp(1, n_features);
        let candidates = index::sample(&mut *self.rng, n_features, k);

        let parent = w_total * gini(w_pos, w_total);
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<BestSplit> = None;
        let mut order = samples.to_vec();

        for feature in candidates.iter() {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left_pos = 0.0;
            let mut left_total = 0.0;
            for split in 1..order.len() {
                let prev = order[split - 1];
                let w = self.weights[prev];
                left_total += w;
                if self.y[prev] {
                    left_pos += w;
                }

                let lo = self.x[prev][feature];
                let hi = self.x[order[split]][feature];
                if hi <= lo || split < min_leaf || order.len() - split < min_leaf {
                    continue;
                }

                let right_pos = w_pos - left_pos;
                let right_total = w_total - left_total;
                let children = left_total * gini(left_pos, left_total)
                    + right_total * gini(right_pos, right_total);
                let decrease = parent - children;

                if decrease > 1e-12 && best.as_ref().map_or(true, |b| decrease > b.decrease) {
                    best = Some(BestSplit {
                        feature,
                        threshold: lo + (hi - lo) / 2.0,
                        decrease,
                        position: split,
                    });
                }
            }
        }
        best
    }
}

impl DecisionTree {
    /// Grow a tree over `samples` (bootstrap indices into `x`, repeats allowed).
    pub(super) fn grow<R: Rng>(
        x: &[Vec<f64>],
        y: &[bool],
        weights: &[f64],
        samples: &mut [usize],
        params: GrowParams,
        rng: &mut R,
    ) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let mut builder = Builder {
            x,
            y,
            weights,
            params,
            rng,
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
        };
        builder.grow(samples, 0);

        let mut importances = builder.importances;
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in &mut importances {
                *v /= total;
            }
        }
        Self {
            nodes: builder.nodes,
            importances,
        }
    }

    /// Positive fraction at the leaf reached by `x`.
    pub(super) fn predict(&self, x: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes.get(id) {
                Some(Node::Leaf { positive }) => return *positive,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    id = if x[*feature] <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub(super) fn importances(&self) -> &[f64] {
        &self.importances
    }

    pub(super) fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match nodes.get(id) {
                Some(Node::Split { left, right, .. }) => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    /// Arena invariants: non-empty, children strictly after parents, feature
    /// indices in range, leaf values in `[0, 1]`.
    pub(super) fn is_consistent(&self, n_features: usize) -> bool {
        !self.nodes.is_empty()
            && self.importances.len() == n_features
            && self.nodes.iter().enumerate().all(|(id, node)| match node {
                Node::Leaf { positive } => (0.0..=1.0).contains(positive),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    *feature < n_features
                        && threshold.is_finite()
                        && *left > id
                        && *right > id
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn params() -> GrowParams {
        GrowParams {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 1,
        }
    }

    #[test]
    fn test_separable_threshold() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![f64::from(i)]).collect();
        let y: Vec<bool> = (0..10).map(|i| i >= 5).collect();
        let weights = vec![1.0; 10];
        let mut samples: Vec<usize> = (0..10).collect();
        let mut rng = ChaCha20Rng::seed_from_u64(0);

        let tree = DecisionTree::grow(&x, &y, &weights, &mut samples, params(), &mut rng);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&[2.0]), 0.0);
        assert_eq!(tree.predict(&[7.0]), 1.0);
        assert_eq!(tree.importances(), &[1.0]);
        assert!(tree.is_consistent(1));
    }

    #[test]
    fn test_depth_limit() {
        let x: Vec<Vec<f64>> = (0..16).map(|i| vec![f64::from(i)]).collect();
        let y: Vec<bool> = (0..16).map(|i| i % 2 == 0).collect();
        let weights = vec![1.0; 16];
        let mut samples: Vec<usize> = (0..16).collect();
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let limited = GrowParams {
            max_depth: 2,
            ..params()
        };

        let tree = DecisionTree::grow(&x, &y, &weights, &mut samples, limited, &mut rng);
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn test_pure_node_is_leaf() {
        let x = vec![vec![1.0], vec![2.0]];
        let y = vec![false, false];
        let mut samples = vec![0, 1];
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let tree = DecisionTree::grow(&x, &y, &[1.0, 1.0], &mut samples, params(), &mut rng);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.importances(), &[0.0]);
    }
}
