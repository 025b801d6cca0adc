//! The filter expression engine: a serializable predicate AST over
//! `(id, meta, attrs)`, plus best-effort candidate preselection against an
//! external attribute-index reader.
//!
//! The AST is a value, not a closure, so it can be persisted alongside a
//! saved query or exercised directly in tests. [`FilterExpr::compile`]
//! turns it into a pure predicate function; preselection is a separate,
//! advisory optimization layered on top.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Meta,
    Attrs,
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Attrs
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RangeBounds {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

impl RangeBounds {
    fn test(&self, v: f64) -> bool {
        self.gt.map_or(true, |b| v > b)
            && self.gte.map_or(true, |b| v >= b)
            && self.lt.map_or(true, |b| v < b)
            && self.lte.map_or(true, |b| v <= b)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HasId {
    pub values: Vec<u32>,
}

/// A single AST node. Fields are mutually-exclusive by role (leaf /
/// id-set / bool combinator), matching the tagged-union grammar, but
/// `has_id` is allowed to sit alongside the bool combinator fields on the
/// same node since it composes with them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterExpr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeBounds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_null: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_id: Option<HasId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub must: Option<Vec<FilterExpr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub must_not: Option<Vec<FilterExpr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should: Option<Vec<FilterExpr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_min: Option<usize>,
}

impl FilterExpr {
    pub fn leaf_match(key: impl Into<String>, scope: Scope, value: Value) -> Self {
        Self {
            key: Some(key.into()),
            scope: Some(scope),
            match_value: Some(value),
            ..Default::default()
        }
    }

    pub fn leaf_range(key: impl Into<String>, scope: Scope, range: RangeBounds) -> Self {
        Self {
            key: Some(key.into()),
            scope: Some(scope),
            range: Some(range),
            ..Default::default()
        }
    }

    pub fn leaf_exists(key: impl Into<String>, scope: Scope, exists: bool) -> Self {
        Self {
            key: Some(key.into()),
            scope: Some(scope),
            exists: Some(exists),
            ..Default::default()
        }
    }

    pub fn has_id(values: Vec<u32>) -> Self {
        Self {
            has_id: Some(HasId { values }),
            ..Default::default()
        }
    }

    pub fn must(exprs: Vec<FilterExpr>) -> Self {
        Self {
            must: Some(exprs),
            ..Default::default()
        }
    }

    /// Evaluates the predicate for a single row. `meta` is the row's
    /// decoded JSON metadata (if any); `attrs` resolves `attrs`-scoped
    /// keys.
    pub fn eval(&self, id: u32, meta: Option<&Value>, attrs: &dyn AttrsAccessor) -> bool {
        if let Some(has_id) = &self.has_id {
            if !has_id.values.contains(&id) {
                return false;
            }
        }

        if self.key.is_some() && !self.eval_leaf(id, meta, attrs) {
            return false;
        }

        if let Some(must) = &self.must {
            if !must.iter().all(|e| e.eval(id, meta, attrs)) {
                return false;
            }
        }
        if let Some(must_not) = &self.must_not {
            if must_not.iter().any(|e| e.eval(id, meta, attrs)) {
                return false;
            }
        }
        if let Some(should) = &self.should {
            if !should.is_empty() {
                let min = self.should_min.unwrap_or(1);
                let passed = should.iter().filter(|e| e.eval(id, meta, attrs)).count();
                if passed < min {
                    return false;
                }
            }
        }

        true
    }

    fn eval_leaf(&self, id: u32, meta: Option<&Value>, attrs: &dyn AttrsAccessor) -> bool {
        let key = self.key.as_deref().unwrap_or_default();
        let scope = self.scope.unwrap_or_default();
        let accessed = match scope {
            Scope::Meta => meta.and_then(|m| m.get(key)).cloned(),
            Scope::Attrs => attrs.get(id, key),
        };

        if let Some(expected) = &self.match_value {
            return eval_match(accessed.as_ref(), expected);
        }
        if let Some(range) = &self.range {
            return accessed
                .as_ref()
                .and_then(Value::as_f64)
                .map(|v| range.test(v))
                .unwrap_or(false);
        }
        if let Some(want_exists) = self.exists {
            let present = matches!(&accessed, Some(v) if !v.is_null());
            return present == want_exists;
        }
        if let Some(want_null) = self.is_null {
            let is_null = matches!(&accessed, None | Some(Value::Null));
            return is_null == want_null;
        }
        true
    }
}

fn eval_match(accessed: Option<&Value>, expected: &Value) -> bool {
    let accessed = match accessed {
        Some(v) => v,
        None => return false,
    };
    if let Value::Array(items) = accessed {
        match expected {
            Value::Array(wanted) => items.iter().any(|i| wanted.contains(i)),
            scalar => items.contains(scalar),
        }
    } else {
        match expected {
            Value::Array(wanted) => wanted.contains(accessed),
            scalar => accessed == scalar,
        }
    }
}

/// External accessor for `attrs`-scoped leaf lookups. Not owned by the
/// index; typically a thin wrapper over the embedder's own metadata
/// projection.
pub trait AttrsAccessor {
    fn get(&self, id: u32, key: &str) -> Option<Value>;
}

/// No-op accessor for contexts that only ever filter on `meta` scope.
pub struct NoAttrs;
impl AttrsAccessor for NoAttrs {
    fn get(&self, _id: u32, _key: &str) -> Option<Value> {
        None
    }
}

/// External collaborator that can answer `attrs`-scoped queries with a
/// precomputed id set, used for preselection. Returning `None` means "no
/// index support for this predicate", which falls back to a full
/// predicate scan.
pub trait AttributeIndexReader {
    fn eq(&self, key: &str, value: &Value) -> Option<RoaringBitmap>;
    fn exists(&self, key: &str) -> Option<RoaringBitmap>;
    fn range(&self, key: &str, range: RangeBounds) -> Option<RoaringBitmap>;
}

/// Attempts to narrow `expr` to a finite candidate set. `None` means no
/// preselection was possible (fall back to scanning with `eval`).
pub fn preselect(expr: &FilterExpr, reader: &dyn AttributeIndexReader) -> Option<RoaringBitmap> {
    if let Some(has_id) = &expr.has_id {
        let mut set = RoaringBitmap::new();
        set.extend(has_id.values.iter().copied());
        return Some(set);
    }

    if expr.key.is_some() && expr.scope.unwrap_or_default() == Scope::Attrs {
        let key = expr.key.as_deref().unwrap();
        if let Some(value) = &expr.match_value {
            if let Value::Array(_) = value {
                // overlap-style matches aren't representable as a single
                // equality lookup; fall back to scanning.
            } else if let Some(set) = reader.eq(key, value) {
                return Some(set);
            }
        }
        if let Some(true) = expr.exists {
            if let Some(set) = reader.exists(key) {
                return Some(set);
            }
        }
        if let Some(range) = &expr.range {
            if let Some(set) = reader.range(key, *range) {
                return Some(set);
            }
        }
    }

    let mut result: Option<RoaringBitmap> = None;

    if let Some(must) = &expr.must {
        for sub in must {
            match preselect(sub, reader) {
                Some(set) => {
                    result = Some(match result {
                        Some(acc) => acc & set,
                        None => set,
                    });
                }
                None => return None,
            }
        }
    }

    if let Some(should) = &expr.should {
        if !should.is_empty() {
            let mut union = RoaringBitmap::new();
            for sub in should {
                match preselect(sub, reader) {
                    Some(set) => union |= set,
                    None => return result,
                }
            }
            result = Some(match result {
                Some(acc) => acc & union,
                None => union,
            });
        }
    }

    if let Some(must_not) = &expr.must_not {
        if let Some(acc) = result {
            let mut acc = acc;
            for sub in must_not {
                if let Some(set) = preselect(sub, reader) {
                    acc -= set;
                }
            }
            result = Some(acc);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticAttrs(std::collections::HashMap<(u32, String), Value>);
    impl AttrsAccessor for StaticAttrs {
        fn get(&self, id: u32, key: &str) -> Option<Value> {
            self.0.get(&(id, key.to_string())).cloned()
        }
    }

    #[test]
    fn match_scalar_equality() {
        let expr = FilterExpr::leaf_match("color", Scope::Meta, json!("red"));
        let meta = json!({"color": "red"});
        assert!(expr.eval(1, Some(&meta), &NoAttrs));
        let meta2 = json!({"color": "blue"});
        assert!(!expr.eval(1, Some(&meta2), &NoAttrs));
    }

    #[test]
    fn match_array_overlap() {
        let expr = FilterExpr::leaf_match("tags", Scope::Meta, json!(["a", "b"]));
        let meta = json!({"tags": ["b", "c"]});
        assert!(expr.eval(1, Some(&meta), &NoAttrs));
        let meta2 = json!({"tags": ["x", "y"]});
        assert!(!expr.eval(1, Some(&meta2), &NoAttrs));
    }

    #[test]
    fn range_bounds() {
        let expr = FilterExpr::leaf_range(
            "age",
            Scope::Meta,
            RangeBounds {
                gte: Some(18.0),
                lt: Some(65.0),
                ..Default::default()
            },
        );
        assert!(expr.eval(1, Some(&json!({"age": 30})), &NoAttrs));
        assert!(!expr.eval(1, Some(&json!({"age": 17})), &NoAttrs));
        assert!(!expr.eval(1, Some(&json!({"age": 65})), &NoAttrs));
    }

    #[test]
    fn exists_and_is_null() {
        let exists = FilterExpr::leaf_exists("k", Scope::Meta, true);
        assert!(exists.eval(1, Some(&json!({"k": 1})), &NoAttrs));
        assert!(!exists.eval(1, Some(&json!({})), &NoAttrs));

        let is_null = FilterExpr {
            key: Some("k".to_string()),
            scope: Some(Scope::Meta),
            is_null: Some(true),
            ..Default::default()
        };
        assert!(is_null.eval(1, Some(&json!({"k": null})), &NoAttrs));
        assert!(!is_null.eval(1, Some(&json!({"k": 1})), &NoAttrs));
    }

    #[test]
    fn bool_must_must_not_should() {
        let expr = FilterExpr {
            must: Some(vec![FilterExpr::leaf_match("a", Scope::Meta, json!(1))]),
            must_not: Some(vec![FilterExpr::leaf_match("b", Scope::Meta, json!(2))]),
            should: Some(vec![
                FilterExpr::leaf_match("c", Scope::Meta, json!(3)),
                FilterExpr::leaf_match("c", Scope::Meta, json!(4)),
            ]),
            should_min: Some(1),
            ..Default::default()
        };
        assert!(expr.eval(1, Some(&json!({"a": 1, "b": 9, "c": 3})), &NoAttrs));
        assert!(!expr.eval(1, Some(&json!({"a": 1, "b": 2, "c": 3})), &NoAttrs));
        assert!(!expr.eval(1, Some(&json!({"a": 1, "b": 9, "c": 9})), &NoAttrs));
    }

    #[test]
    fn has_id_restricts() {
        let expr = FilterExpr::has_id(vec![1, 3]);
        assert!(expr.eval(1, None, &NoAttrs));
        assert!(!expr.eval(2, None, &NoAttrs));
    }

    #[test]
    fn attrs_scope_uses_external_accessor() {
        let mut map = std::collections::HashMap::new();
        map.insert((1u32, "k".to_string()), json!("v"));
        let attrs = StaticAttrs(map);
        let expr = FilterExpr::leaf_match("k", Scope::Attrs, json!("v"));
        assert!(expr.eval(1, None, &attrs));
        assert!(!expr.eval(2, None, &attrs));
    }

    struct StaticIndex;
    impl AttributeIndexReader for StaticIndex {
        fn eq(&self, key: &str, value: &Value) -> Option<RoaringBitmap> {
            if key == "color" && value == &json!("red") {
                let mut set = RoaringBitmap::new();
                set.insert(1);
                set.insert(2);
                Some(set)
            } else {
                None
            }
        }
        fn exists(&self, _key: &str) -> Option<RoaringBitmap> {
            None
        }
        fn range(&self, _key: &str, _range: RangeBounds) -> Option<RoaringBitmap> {
            None
        }
    }

    #[test]
    fn preselect_via_index_reader() {
        let expr = FilterExpr::leaf_match("color", Scope::Attrs, json!("red"));
        let set = preselect(&expr, &StaticIndex).unwrap();
        assert!(set.contains(1));
        assert!(set.contains(2));
    }

    #[test]
    fn preselect_has_id_always_succeeds() {
        let expr = FilterExpr::has_id(vec![5, 6]);
        let set = preselect(&expr, &StaticIndex).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn preselect_falls_back_to_none_without_index_support() {
        let expr = FilterExpr::leaf_match("shape", Scope::Attrs, json!("circle"));
        assert!(preselect(&expr, &StaticIndex).is_none());
    }
}
