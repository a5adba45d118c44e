//! Field-level change tracking between the last applied local model and the proposed one.
//!
//! Paths are dotted member names of the models' `serde_json` form, e.g. `ingress` or
//! `template.revision_suffix`. A changed leaf also marks every ancestor. Arrays compare
//! as a whole.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// The set of paths whose values differ.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    paths: BTreeSet<String>,
}

impl ChangeSet {
    pub fn between<M: Serialize>(prior: &M, proposed: &M) -> Result<Self, serde_json::Error> {
        let before = serde_json::to_value(prior)?;
        let after = serde_json::to_value(proposed)?;
        let mut changes = Self::default();
        changes.diff("", &before, &after);
        Ok(changes)
    }

    pub fn has_change(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    fn diff(&mut self, path: &str, before: &Value, after: &Value) -> bool {
        let changed = match (before, after) {
            (Value::Object(b), Value::Object(a)) => self.diff_objects(path, b, a),
            (Value::Null, Value::Object(a)) => self.diff_objects(path, &Map::new(), a),
            (Value::Object(b), Value::Null) => self.diff_objects(path, b, &Map::new()),
            (b, a) => b != a,
        };
        if changed && !path.is_empty() {
            self.paths.insert(path.to_string());
        }
        changed
    }

    fn diff_objects(
        &mut self,
        path: &str,
        before: &Map<String, Value>,
        after: &Map<String, Value>,
    ) -> bool {
        let mut changed = false;
        let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        for key in keys {
            let child = if path.is_empty() {
                key.clone()
            } else {
                format!("{path}.{key}")
            };
            let b = before.get(key).unwrap_or(&Value::Null);
            let a = after.get(key).unwrap_or(&Value::Null);
            changed |= self.diff(&child, b, a);
        }
        changed
    }
}

/// A proposed transition of one object's local model.
#[derive(Debug, Clone)]
pub struct Plan<M> {
    pub prior: M,
    pub proposed: M,
    changes: ChangeSet,
}

impl<M: Serialize> Plan<M> {
    pub fn new(prior: M, proposed: M) -> Result<Self, serde_json::Error> {
        let changes = ChangeSet::between(&prior, &proposed)?;
        Ok(Self {
            prior,
            proposed,
            changes,
        })
    }
}

impl<M> Plan<M> {
    pub fn has_change(&self, path: &str) -> bool {
        self.changes.has_change(path)
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }
}
