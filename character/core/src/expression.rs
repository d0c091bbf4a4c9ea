//! Expression Engine
//!
//! Facial expressions are named sets of blend shape weights. Applying one
//! first resets every blend shape used by *any* configured expression to zero
//! and then sets the target's weights, so two expressions never blend into
//! each other.
//!
//! The mesh is reached through the [`BlendShapeMesh`] trait. Blend shape names
//! are resolved to indices once, when the mesh is attached; names the mesh
//! does not have are skipped individually.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::messages::Message;

/// A single blend shape setting
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendShapeWeight {
    /// Blend shape name on the mesh
    pub name: String,
    /// Weight to apply
    pub weight: f32,
}

impl BlendShapeWeight {
    /// Create a blend shape weight
    pub fn new(name: impl Into<String>, weight: f32) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }
}

/// A named expression
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpressionConfig {
    /// Expression name, as sent by the dialogue service
    pub name: String,
    /// Blend shapes set by this expression, in order
    #[serde(default)]
    pub blend_shapes: Vec<BlendShapeWeight>,
}

impl ExpressionConfig {
    /// Create an expression
    pub fn new(name: impl Into<String>, blend_shapes: Vec<BlendShapeWeight>) -> Self {
        Self {
            name: name.into(),
            blend_shapes,
        }
    }
}

/// Immutable table of configured expressions
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpressionTable(Vec<ExpressionConfig>);

impl ExpressionTable {
    /// Build a table from expressions
    #[must_use]
    pub fn new(expressions: Vec<ExpressionConfig>) -> Self {
        Self(expressions)
    }

    /// Look up an expression by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ExpressionConfig> {
        self.0.iter().find(|e| e.name == name)
    }

    /// Every blend shape referenced by any expression, de-duplicated, in
    /// first-seen order. This is the set reset before each application.
    #[must_use]
    pub fn blend_shapes(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.0
            .iter()
            .flat_map(|e| e.blend_shapes.iter())
            .map(|b| b.name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Number of expressions
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over expressions
    pub fn iter(&self) -> impl Iterator<Item = &ExpressionConfig> {
        self.0.iter()
    }
}

impl From<Vec<ExpressionConfig>> for ExpressionTable {
    fn from(expressions: Vec<ExpressionConfig>) -> Self {
        Self::new(expressions)
    }
}

/// Mesh that exposes weighted blend shapes
pub trait BlendShapeMesh: Send + Sync {
    /// Names of the mesh's blend shapes, by index
    fn blend_shape_names(&self) -> Vec<String>;

    /// Set the weight of the blend shape at `index`
    fn set_blend_shape_weight(&mut self, index: usize, weight: f32);
}

/// Applies expressions to an attached mesh
pub struct ExpressionEngine {
    table: ExpressionTable,
    reset_set: Vec<String>,
    mesh: Option<Box<dyn BlendShapeMesh>>,
    indexes: HashMap<String, usize>,
    current: Option<String>,
}

impl ExpressionEngine {
    /// Create an engine without a mesh
    #[must_use]
    pub fn new(table: ExpressionTable) -> Self {
        let reset_set = table.blend_shapes().into_iter().map(str::to_string).collect();
        Self {
            table,
            reset_set,
            mesh: None,
            indexes: HashMap::new(),
            current: None,
        }
    }

    /// Attach a mesh and resolve blend shape indices
    pub fn attach(&mut self, mesh: Box<dyn BlendShapeMesh>) {
        self.indexes = mesh
            .blend_shape_names()
            .into_iter()
            .enumerate()
            .map(|(index, name)| (name, index))
            .collect();
        tracing::debug!(blend_shapes = self.indexes.len(), "Mesh attached");
        self.mesh = Some(mesh);
    }

    /// Whether a mesh is attached
    #[must_use]
    pub fn has_mesh(&self) -> bool {
        self.mesh.is_some()
    }

    /// The expression table
    #[must_use]
    pub fn table(&self) -> &ExpressionTable {
        &self.table
    }

    /// Name of the last successfully applied expression
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Every blend shape any expression touches
    #[must_use]
    pub fn expression_blend_shapes(&self) -> &[String] {
        &self.reset_set
    }

    /// Apply an expression by name
    ///
    /// Returns `false` (state unchanged) when no mesh is attached or the
    /// expression is unknown.
    pub fn apply_expression(&mut self, name: &str) -> bool {
        let Some(mesh) = self.mesh.as_mut() else {
            tracing::debug!(expression = %name, "No mesh attached; expression ignored");
            return false;
        };

        let Some(expression) = self.table.get(name) else {
            tracing::warn!(expression = %name, "Expression not found");
            return false;
        };

        for shape in &self.reset_set {
            if let Some(&index) = self.indexes.get(shape) {
                mesh.set_blend_shape_weight(index, 0.0);
            }
        }

        for shape in &expression.blend_shapes {
            match self.indexes.get(&shape.name) {
                Some(&index) => mesh.set_blend_shape_weight(index, shape.weight),
                None => tracing::debug!(blend_shape = %shape.name, "Blend shape missing on mesh"),
            }
        }

        tracing::debug!(expression = %name, "Expression applied");
        self.current = Some(name.to_string());
        true
    }

    /// Apply the `next` expression of the first expression behavior of the
    /// last message, if there is one
    pub fn apply_last_expression(&mut self, history: &[Message]) -> bool {
        let next = history
            .last()
            .and_then(Message::first_expression)
            .map(|e| e.next.clone());

        match next {
            Some(next) => self.apply_expression(&next),
            None => false,
        }
    }
}

impl std::fmt::Debug for ExpressionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionEngine")
            .field("expressions", &self.table.len())
            .field("has_mesh", &self.mesh.is_some())
            .field("current", &self.current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{Behavior, Expression};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    /// Mesh recording weights into shared storage
    struct TestMesh {
        names: Vec<String>,
        weights: Arc<Mutex<Vec<f32>>>,
    }

    fn mesh(names: &[&str]) -> (Box<dyn BlendShapeMesh>, Arc<Mutex<Vec<f32>>>) {
        let weights = Arc::new(Mutex::new(vec![-1.0; names.len()]));
        let mesh = TestMesh {
            names: names.iter().map(|n| (*n).to_string()).collect(),
            weights: weights.clone(),
        };
        (Box::new(mesh), weights)
    }

    impl BlendShapeMesh for TestMesh {
        fn blend_shape_names(&self) -> Vec<String> {
            self.names.clone()
        }

        fn set_blend_shape_weight(&mut self, index: usize, weight: f32) {
            self.weights.lock()[index] = weight;
        }
    }

    fn table() -> ExpressionTable {
        ExpressionTable::new(vec![
            ExpressionConfig::new(
                "smile",
                vec![
                    BlendShapeWeight::new("mouthSmile", 80.0),
                    BlendShapeWeight::new("cheekRaise", 30.0),
                ],
            ),
            ExpressionConfig::new(
                "frown",
                vec![
                    BlendShapeWeight::new("browDown", 60.0),
                    BlendShapeWeight::new("cheekRaise", 10.0),
                ],
            ),
            ExpressionConfig::new("neutral", Vec::new()),
        ])
    }

    #[test]
    fn test_blend_shapes_deduplicated_in_order() {
        assert_eq!(
            table().blend_shapes(),
            vec!["mouthSmile", "cheekRaise", "browDown"]
        );
    }

    #[test]
    fn test_reset_then_set() {
        let (m, weights) = mesh(&["mouthSmile", "cheekRaise", "browDown", "blink"]);
        let mut engine = ExpressionEngine::new(table());
        engine.attach(m);

        assert!(engine.apply_expression("smile"));
        assert_eq!(*weights.lock(), vec![80.0, 30.0, 0.0, -1.0]);

        assert!(engine.apply_expression("frown"));
        assert_eq!(*weights.lock(), vec![0.0, 10.0, 60.0, -1.0]);

        assert!(engine.apply_expression("neutral"));
        assert_eq!(*weights.lock(), vec![0.0, 0.0, 0.0, -1.0]);
        assert_eq!(engine.current(), Some("neutral"));
    }

    #[test]
    fn test_unknown_expression_leaves_state() {
        let (m, weights) = mesh(&["mouthSmile", "cheekRaise", "browDown"]);
        let mut engine = ExpressionEngine::new(table());
        engine.attach(m);
        engine.apply_expression("smile");

        assert!(!engine.apply_expression("surprised"));
        assert_eq!(*weights.lock(), vec![80.0, 30.0, 0.0]);
        assert_eq!(engine.current(), Some("smile"));
    }

    #[test]
    fn test_missing_shapes_are_skipped() {
        let (m, weights) = mesh(&["cheekRaise"]);
        let mut engine = ExpressionEngine::new(table());
        engine.attach(m);

        assert!(engine.apply_expression("smile"));
        assert_eq!(*weights.lock(), vec![30.0]);
    }

    #[test]
    fn test_no_mesh_is_noop() {
        let mut engine = ExpressionEngine::new(table());
        assert!(!engine.has_mesh());
        assert!(!engine.apply_expression("smile"));
        assert_eq!(engine.current(), None);
    }

    #[test]
    fn test_apply_last_expression() {
        let (m, weights) = mesh(&["mouthSmile", "cheekRaise", "browDown"]);
        let mut engine = ExpressionEngine::new(table());
        engine.attach(m);

        let mut first = Message::new("a");
        first.behaviors.push(Behavior::Expression(Expression {
            current: "frown".to_string(),
            next: "frown".to_string(),
        }));
        let mut last = Message::new("b");
        last.behaviors.push(Behavior::Expression(Expression {
            current: "frown".to_string(),
            next: "smile".to_string(),
        }));

        assert!(engine.apply_last_expression(&[first, last]));
        assert_eq!(*weights.lock(), vec![80.0, 30.0, 0.0]);

        assert!(!engine.apply_last_expression(&[Message::new("plain")]));
        assert!(!engine.apply_last_expression(&[]));
    }
}
