//! Gradient boosted tree evaluator for XGBoost JSON model documents.
//!
//! Only the fields needed for scoring are read. Splits compare in `f32`
//! like the reference runtime: go left when `x < threshold`, missing values
//! follow the node's default direction.

use pricing_core::{FeatureRow, PricingError, PricingResult, Regressor};
use serde::Deserialize;

const ARTIFACT: &str = "model";

// ─── Document layout ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ModelDocument {
    learner: LearnerDoc,
}

#[derive(Deserialize)]
struct LearnerDoc {
    #[serde(default)]
    attributes: AttributesDoc,
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: GradientBoosterDoc,
    learner_model_param: LearnerModelParamDoc,
    objective: ObjectiveDoc,
}

/// Training attributes; early stopping records `best_iteration` here.
#[derive(Default, Deserialize)]
struct AttributesDoc {
    #[serde(default)]
    best_iteration: Option<String>,
}

#[derive(Deserialize)]
struct GradientBoosterDoc {
    name: String,
    model: Option<GbTreeModelDoc>,
}

#[derive(Deserialize)]
struct GbTreeModelDoc {
    #[serde(default)]
    gbtree_model_param: Option<GbTreeModelParamDoc>,
    trees: Vec<TreeDoc>,
    #[serde(default)]
    iteration_indptr: Option<Vec<usize>>,
}

#[derive(Deserialize)]
struct GbTreeModelParamDoc {
    #[serde(default)]
    num_parallel_tree: Option<String>,
}

#[derive(Deserialize)]
struct LearnerModelParamDoc {
    base_score: String,
    #[serde(default)]
    num_feature: Option<String>,
    #[serde(default)]
    num_class: Option<String>,
    #[serde(default)]
    num_target: Option<String>,
}

#[derive(Deserialize)]
struct ObjectiveDoc {
    name: String,
}

#[derive(Deserialize)]
struct TreeDoc {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f32>,
    default_left: Vec<Flag>,
    #[serde(default)]
    split_type: Vec<i64>,
}

/// Older exports write `default_left` as 0/1, newer ones as booleans.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Int(i) => *i != 0,
        }
    }
}

// ─── Compiled model ─────────────────────────────────────────────────────────

/// Output transform of the training objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Identity,
    Logistic,
    Exp,
}

impl Link {
    pub fn from_objective(name: &str) -> Option<Self> {
        match name {
            "reg:squarederror" | "reg:linear" | "reg:squaredlogerror"
            | "reg:pseudohubererror" | "reg:absoluteerror" | "reg:quantileerror" => {
                Some(Link::Identity)
            }
            "reg:logistic" | "binary:logistic" => Some(Link::Logistic),
            "count:poisson" | "reg:gamma" | "reg:tweedie" => Some(Link::Exp),
            _ => None,
        }
    }

    pub fn apply(&self, margin: f64) -> f64 {
        match self {
            Link::Identity => margin,
            Link::Logistic => 1.0 / (1.0 + (-margin).exp()),
            Link::Exp => margin.exp(),
        }
    }

    /// Map an output-space value (the stored `base_score`) to margin space.
    fn inverse(&self, value: f64) -> PricingResult<f64> {
        match self {
            Link::Identity => Ok(value),
            Link::Logistic if value > 0.0 && value < 1.0 => Ok((value / (1.0 - value)).ln()),
            Link::Exp if value > 0.0 => Ok(value.ln()),
            _ => Err(PricingError::invalid(
                ARTIFACT,
                format!("base_score {value} is outside the domain of the {self:?} link"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        default_left: bool,
    },
    Leaf(f32),
}

#[derive(Debug, Clone, PartialEq)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn compile(index: usize, doc: TreeDoc, num_features: usize) -> PricingResult<Self> {
        let n = doc.left_children.len();
        let bad = |reason: String| PricingError::invalid(ARTIFACT, format!("tree {index}: {reason}"));

        if n == 0 {
            return Err(bad("no nodes".into()));
        }
        if doc.right_children.len() != n
            || doc.split_indices.len() != n
            || doc.split_conditions.len() != n
            || doc.default_left.len() != n
        {
            return Err(bad("node arrays have different lengths".into()));
        }
        if doc.split_type.iter().any(|t| *t != 0) {
            return Err(bad("categorical splits are not supported".into()));
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let (left, right) = (doc.left_children[i], doc.right_children[i]);
            if left == -1 {
                nodes.push(Node::Leaf(doc.split_conditions[i]));
                continue;
            }
            // Children are always allocated after their parent, which also
            // guarantees traversal terminates.
            let child = |c: i64| -> PricingResult<usize> {
                usize::try_from(c)
                    .ok()
                    .filter(|c| *c > i && *c < n)
                    .ok_or_else(|| bad(format!("node {i} has invalid child {c}")))
            };
            let feature = usize::try_from(doc.split_indices[i])
                .ok()
                .filter(|f| *f < num_features)
                .ok_or_else(|| {
                    bad(format!(
                        "node {i} splits on feature {} (model has {num_features})",
                        doc.split_indices[i]
                    ))
                })?;
            nodes.push(Node::Split {
                feature,
                threshold: doc.split_conditions[i],
                left: child(left)?,
                right: child(right)?,
                default_left: doc.default_left[i].is_set(),
            });
        }

        Ok(Self { nodes })
    }

    fn leaf_value(&self, row: &[f64]) -> f32 {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let x = row[*feature];
                    idx = if x.is_nan() {
                        if *default_left {
                            *left
                        } else {
                            *right
                        }
                    } else if (x as f32) < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// A loaded, immutable tree ensemble.
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    trees: Vec<Tree>,
    /// Tree offsets per boosting round; round `i` owns `round_ptr[i]..round_ptr[i + 1]`.
    round_ptr: Vec<usize>,
    /// Last round used by `predict` when the model was early-stopped.
    best_iteration: Option<usize>,
    base_margin: f64,
    link: Link,
    objective: String,
    num_features: usize,
    feature_names: Vec<String>,
}

impl GradientBoostedTrees {
    /// Parse and validate an XGBoost JSON model document.
    pub fn from_json(bytes: &[u8]) -> PricingResult<Self> {
        let doc: ModelDocument = serde_json::from_slice(bytes)
            .map_err(|e| PricingError::invalid(ARTIFACT, e.to_string()))?;
        let learner = doc.learner;
        let params = learner.learner_model_param;

        if learner.gradient_booster.name != "gbtree" {
            return Err(PricingError::invalid(
                ARTIFACT,
                format!("unsupported booster '{}'", learner.gradient_booster.name),
            ));
        }
        if parse_count(params.num_class.as_deref(), "num_class")? > 1 {
            return Err(PricingError::invalid(ARTIFACT, "multi-class models are not supported"));
        }
        if parse_count(params.num_target.as_deref(), "num_target")? > 1 {
            return Err(PricingError::invalid(ARTIFACT, "multi-target models are not supported"));
        }

        let objective = learner.objective.name;
        let link = Link::from_objective(&objective).ok_or_else(|| {
            PricingError::invalid(ARTIFACT, format!("unsupported objective '{objective}'"))
        })?;
        let base_margin = link.inverse(parse_base_score(&params.base_score)?)?;

        let num_features = match parse_count(params.num_feature.as_deref(), "num_feature")? {
            0 if !learner.feature_names.is_empty() => learner.feature_names.len(),
            0 => return Err(PricingError::invalid(ARTIFACT, "num_feature is missing")),
            n => n,
        };
        if !learner.feature_names.is_empty() && learner.feature_names.len() != num_features {
            return Err(PricingError::invalid(
                ARTIFACT,
                format!(
                    "{} feature names for {num_features} features",
                    learner.feature_names.len()
                ),
            ));
        }

        let model = learner
            .gradient_booster
            .model
            .ok_or_else(|| PricingError::invalid(ARTIFACT, "gradient_booster.model is missing"))?;
        let num_parallel_tree = model
            .gbtree_model_param
            .as_ref()
            .map(|p| parse_count(p.num_parallel_tree.as_deref(), "num_parallel_tree"))
            .transpose()?
            .filter(|n| *n > 0)
            .unwrap_or(1);

        let trees = model
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, t)| Tree::compile(i, t, num_features))
            .collect::<PricingResult<Vec<_>>>()?;
        if trees.is_empty() {
            return Err(PricingError::invalid(ARTIFACT, "model has no trees"));
        }

        let round_ptr = match model.iteration_indptr {
            Some(ptr) => ptr,
            None => (0..=trees.len()).step_by(num_parallel_tree).collect(),
        };
        validate_round_ptr(&round_ptr, trees.len())?;

        let num_rounds = round_ptr.len() - 1;
        let best_iteration = learner
            .attributes
            .best_iteration
            .as_deref()
            .map(|raw| parse_count(Some(raw), "best_iteration"))
            .transpose()?;
        if let Some(best) = best_iteration {
            if best >= num_rounds {
                return Err(PricingError::invalid(
                    ARTIFACT,
                    format!("best_iteration {best} is outside {num_rounds} rounds"),
                ));
            }
            if best + 1 < num_rounds {
                tracing::warn!(
                    "Model was early-stopped: price predictions use rounds 0..={} of {}, \
                     confidence spread uses all rounds",
                    best,
                    num_rounds
                );
            }
        }

        Ok(Self {
            trees,
            round_ptr,
            best_iteration,
            base_margin,
            link,
            objective,
            num_features,
            feature_names: learner.feature_names,
        })
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Feature names stored in the model, empty if it was trained without them.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn link(&self) -> Link {
        self.link
    }

    pub fn base_margin(&self) -> f64 {
        self.base_margin
    }

    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    fn check_row(&self, row: &FeatureRow) -> PricingResult<()> {
        if row.as_slice().len() < self.num_features {
            return Err(PricingError::Inference(format!(
                "row has {} values, model expects {}",
                row.as_slice().len(),
                self.num_features
            )));
        }
        Ok(())
    }

    fn margin_of_trees(&self, row: &[f64], trees: &[Tree]) -> f64 {
        self.base_margin
            + trees
                .iter()
                .map(|t| f64::from(t.leaf_value(row)))
                .sum::<f64>()
    }
}

fn parse_base_score(raw: &str) -> PricingResult<f64> {
    // Newer exports bracket the value: "[5E-1]"
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    trimmed
        .split(',')
        .next()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .ok_or_else(|| PricingError::invalid(ARTIFACT, format!("invalid base_score '{raw}'")))
}

fn parse_count(raw: Option<&str>, field: &str) -> PricingResult<usize> {
    match raw {
        None => Ok(0),
        Some(s) => s
            .trim()
            .parse::<usize>()
            .map_err(|_| PricingError::invalid(ARTIFACT, format!("invalid {field} '{s}'"))),
    }
}

fn validate_round_ptr(ptr: &[usize], num_trees: usize) -> PricingResult<()> {
    let well_formed = ptr.len() >= 2
        && ptr[0] == 0
        && ptr[ptr.len() - 1] == num_trees
        && ptr.windows(2).all(|w| w[0] < w[1]);
    if well_formed {
        Ok(())
    } else {
        Err(PricingError::invalid(
            ARTIFACT,
            format!("iteration_indptr does not partition {num_trees} trees into rounds"),
        ))
    }
}

impl Regressor for GradientBoostedTrees {
    fn predict(&self, row: &FeatureRow) -> PricingResult<f64> {
        self.check_row(row)?;
        let trees = match self.best_iteration {
            Some(best) => &self.trees[..self.round_ptr[best + 1]],
            None => &self.trees[..],
        };
        let margin = self.margin_of_trees(row.as_slice(), trees);
        Ok(self.link.apply(margin))
    }

    fn predict_margin(&self, row: &FeatureRow, begin: usize, end: usize) -> PricingResult<f64> {
        self.check_row(row)?;
        if begin >= end || end > self.num_rounds() {
            return Err(PricingError::Inference(format!(
                "round range [{begin}, {end}) is outside 0..{}",
                self.num_rounds()
            )));
        }
        let trees = &self.trees[self.round_ptr[begin]..self.round_ptr[end]];
        Ok(self.margin_of_trees(row.as_slice(), trees))
    }

    fn num_rounds(&self) -> usize {
        self.round_ptr.len() - 1
    }

    fn num_trees(&self) -> usize {
        self.trees.len()
    }

    fn objective(&self) -> &str {
        &self.objective
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pricing_core::FEATURE_COUNT;
    use serde_json::{json, Value};

    /// Stump on `feature`: left leaf below `threshold`, right leaf otherwise.
    pub(crate) fn stump(feature: usize, threshold: f32, left: f32, right: f32, default_left: bool) -> Value {
        json!({
            "tree_param": {"num_nodes": "3", "num_feature": FEATURE_COUNT.to_string()},
            "id": 0,
            "left_children": [1, -1, -1],
            "right_children": [2, -1, -1],
            "parents": [2147483647, 0, 0],
            "split_indices": [feature, 0, 0],
            "split_conditions": [threshold, left, right],
            "split_type": [0, 0, 0],
            "default_left": [default_left as i32, 0, 0],
            "base_weights": [0.0, left, right],
            "loss_changes": [1.0, 0.0, 0.0],
            "sum_hessian": [10.0, 5.0, 5.0],
            "categories": [], "categories_nodes": [], "categories_segments": [], "categories_sizes": []
        })
    }

    pub(crate) fn model_json(trees: Vec<Value>, base_score: &str, objective: &str) -> Value {
        let n = trees.len();
        json!({
            "learner": {
                "attributes": {},
                "feature_names": [],
                "feature_types": [],
                "gradient_booster": {
                    "name": "gbtree",
                    "model": {
                        "gbtree_model_param": {"num_parallel_tree": "1", "num_trees": n.to_string()},
                        "iteration_indptr": (0..=n).collect::<Vec<_>>(),
                        "tree_info": vec![0; n],
                        "trees": trees
                    }
                },
                "learner_model_param": {
                    "base_score": base_score,
                    "boost_from_average": "1",
                    "num_class": "0",
                    "num_feature": FEATURE_COUNT.to_string(),
                    "num_target": "1"
                },
                "objective": {"name": objective, "reg_loss_param": {"scale_pos_weight": "1"}}
            },
            "version": [2, 0, 3]
        })
    }

    fn load(doc: &Value) -> PricingResult<GradientBoostedTrees> {
        GradientBoostedTrees::from_json(&serde_json::to_vec(doc).unwrap())
    }

    fn row(values: &[(usize, f64)]) -> FeatureRow {
        let mut r = [0.0; FEATURE_COUNT];
        for (i, v) in values {
            r[*i] = *v;
        }
        FeatureRow(r)
    }

    #[test]
    fn test_stump_branches_and_base_score() {
        let doc = model_json(vec![stump(0, 5.0, -1.0, 2.0, true)], "1E1", "reg:squarederror");
        let model = load(&doc).unwrap();

        assert_eq!(model.num_rounds(), 1);
        assert_eq!(model.num_trees(), 1);
        assert_eq!(model.objective(), "reg:squarederror");
        assert_eq!(model.predict(&row(&[(0, 4.9)])).unwrap(), 9.0);
        // Threshold itself goes right
        assert_eq!(model.predict(&row(&[(0, 5.0)])).unwrap(), 12.0);
    }

    #[test]
    fn test_missing_follows_default_direction() {
        let doc = model_json(
            vec![stump(1, 0.5, 1.0, 3.0, true), stump(2, 0.5, 10.0, 30.0, false)],
            "0",
            "reg:squarederror",
        );
        let model = load(&doc).unwrap();
        let r = row(&[(1, f64::NAN), (2, f64::NAN)]);
        assert_eq!(model.predict(&r).unwrap(), 31.0);
    }

    #[test]
    fn test_split_compares_in_f32() {
        // 0.1f32 is slightly above 0.1f64; the f64 row value must round first
        let doc = model_json(vec![stump(0, 0.1, 1.0, 2.0, true)], "0", "reg:squarederror");
        let model = load(&doc).unwrap();
        assert_eq!(model.predict(&row(&[(0, 0.1)])).unwrap(), 2.0);
    }

    #[test]
    fn test_per_round_margins_sum_to_prediction() {
        let trees = vec![
            stump(0, 5.0, 1.0, 2.0, true),
            stump(3, 0.0, -0.5, 0.25, true),
            stump(4, 100.0, 0.125, -4.0, false),
        ];
        let doc = model_json(trees, "[5E-1]", "reg:squarederror");
        let model = load(&doc).unwrap();
        let r = row(&[(0, 6.0), (3, 1.0), (4, 50.0)]);

        let per_round: Vec<f64> = (0..model.num_rounds())
            .map(|i| model.predict_margin(&r, i, i + 1).unwrap())
            .collect();
        assert_eq!(per_round, vec![2.5, 0.75, 0.625]);

        let whole = model.predict(&r).unwrap();
        let from_rounds = model.base_margin() + per_round.iter().map(|m| m - 0.5).sum::<f64>();
        assert!((whole - from_rounds).abs() < 1e-9);
        assert_eq!(model.predict_margin(&r, 0, 3).unwrap(), whole);
    }

    #[test]
    fn test_round_range_validation() {
        let doc = model_json(vec![stump(0, 1.0, 0.0, 1.0, true)], "0", "reg:squarederror");
        let model = load(&doc).unwrap();
        let r = row(&[]);
        assert!(model.predict_margin(&r, 0, 2).is_err());
        assert!(model.predict_margin(&r, 1, 1).is_err());
    }

    #[test]
    fn test_early_stopped_model_predicts_up_to_best_iteration() {
        let trees = vec![
            stump(0, 5.0, 1.0, 2.0, true),
            stump(0, 5.0, 0.5, 0.5, true),
            stump(0, 5.0, 100.0, 100.0, true),
        ];
        let mut doc = model_json(trees, "0", "reg:squarederror");
        doc["learner"]["attributes"] = json!({"best_iteration": "1", "best_score": "0.25"});
        let model = load(&doc).unwrap();
        let r = row(&[(0, 1.0)]);

        assert_eq!(model.best_iteration(), Some(1));
        assert_eq!(model.predict(&r).unwrap(), 1.5);
        // Every round still contributes a margin
        assert_eq!(model.num_rounds(), 3);
        assert_eq!(model.predict_margin(&r, 2, 3).unwrap(), 100.0);
    }

    #[test]
    fn test_best_iteration_must_be_a_known_round() {
        let mut doc = model_json(vec![stump(0, 5.0, 1.0, 2.0, true)], "0", "reg:squarederror");
        doc["learner"]["attributes"] = json!({"best_iteration": "3"});
        assert!(matches!(load(&doc), Err(PricingError::InvalidArtifact { .. })));

        doc["learner"]["attributes"] = json!({"best_iteration": "last"});
        assert!(matches!(load(&doc), Err(PricingError::InvalidArtifact { .. })));
    }

    #[test]
    fn test_logistic_link() {
        let doc = model_json(vec![stump(0, 1.0, 0.0, 0.0, true)], "5E-1", "reg:logistic");
        let model = load(&doc).unwrap();
        assert_eq!(model.link(), Link::Logistic);
        assert!(model.base_margin().abs() < 1e-12);
        assert!((model.predict(&row(&[])).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_exp_link_base_score() {
        let doc = model_json(vec![stump(0, 1.0, 0.0, 0.0, true)], "2", "reg:gamma");
        let model = load(&doc).unwrap();
        assert!((model.base_margin() - 2f64.ln()).abs() < 1e-12);
        assert!((model.predict(&row(&[])).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_parallel_trees_without_indptr() {
        let mut doc = model_json(
            vec![
                stump(0, 1.0, 1.0, 1.0, true),
                stump(0, 1.0, 2.0, 2.0, true),
                stump(0, 1.0, 3.0, 3.0, true),
                stump(0, 1.0, 4.0, 4.0, true),
            ],
            "0",
            "reg:squarederror",
        );
        let gb = &mut doc["learner"]["gradient_booster"]["model"];
        gb.as_object_mut().unwrap().remove("iteration_indptr");
        gb["gbtree_model_param"]["num_parallel_tree"] = json!("2");

        let model = load(&doc).unwrap();
        assert_eq!(model.num_trees(), 4);
        assert_eq!(model.num_rounds(), 2);
        assert_eq!(model.predict_margin(&row(&[]), 1, 2).unwrap(), 7.0);
    }

    #[test]
    fn test_boolean_default_left() {
        let mut tree = stump(0, 1.0, 5.0, 7.0, true);
        tree["default_left"] = json!([false, false, false]);
        let model = load(&model_json(vec![tree], "0", "reg:squarederror")).unwrap();
        assert_eq!(model.predict(&row(&[(0, f64::NAN)])).unwrap(), 7.0);
    }

    #[test]
    fn test_rejects_malformed_models() {
        let mut out_of_range = stump(0, 1.0, 0.0, 1.0, true);
        out_of_range["split_indices"] = json!([FEATURE_COUNT, 0, 0]);

        let mut cycle = stump(0, 1.0, 0.0, 1.0, true);
        cycle["left_children"] = json!([0, -1, -1]);

        let mut ragged = stump(0, 1.0, 0.0, 1.0, true);
        ragged["split_conditions"] = json!([1.0, 0.0]);

        let mut categorical = stump(0, 1.0, 0.0, 1.0, true);
        categorical["split_type"] = json!([1, 0, 0]);

        let cases = vec![
            model_json(vec![out_of_range], "0", "reg:squarederror"),
            model_json(vec![cycle], "0", "reg:squarederror"),
            model_json(vec![ragged], "0", "reg:squarederror"),
            model_json(vec![categorical], "0", "reg:squarederror"),
            model_json(vec![], "0", "reg:squarederror"),
            model_json(vec![stump(0, 1.0, 0.0, 1.0, true)], "0", "multi:softprob"),
            model_json(vec![stump(0, 1.0, 0.0, 1.0, true)], "abc", "reg:squarederror"),
            model_json(vec![stump(0, 1.0, 0.0, 1.0, true)], "0", "reg:logistic"),
            json!({"learner": {}}),
        ];
        for doc in cases {
            let err = load(&doc).unwrap_err();
            assert!(matches!(err, PricingError::InvalidArtifact { .. }), "{err}");
        }
        assert!(GradientBoostedTrees::from_json(b"\x80\x04pickle").is_err());
    }
}
