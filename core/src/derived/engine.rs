use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use crate::action::{Model, PropsOf, StateOf};
use crate::error::ConfigError;
use crate::graph::DependencyGraph;

use super::field::{Dep, DerivedField, DerivedValue, DerivedValues};

struct Memo {
    deps: Option<Vec<Dep>>,
    value: DerivedValue,
}

/// Evaluates derived fields in dependency order, reusing memoized values.
pub struct DerivedEngine<M: Model> {
    /// Fields in evaluation order
    fields: Vec<DerivedField<M>>,
    memo: Vec<Option<Memo>>,
}

impl<M: Model> DerivedEngine<M> {
    /// Orders the fields and rejects unknown or cyclic derived dependencies.
    pub fn new(fields: Vec<DerivedField<M>>) -> Result<Self, ConfigError> {
        let mut graph = DependencyGraph::new();
        for field in &fields {
            graph.add_node(field.name.clone(), field.derived_deps.iter().cloned())?;
        }
        graph.validate()?;

        let order = graph.evaluation_order()?;
        let mut pool: Vec<Option<DerivedField<M>>> = fields.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(pool.len());
        for name in order {
            if let Some(slot) = pool
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|f| f.name == name))
            {
                ordered.extend(slot.take());
            }
        }

        let memo = ordered.iter().map(|_| None).collect();
        Ok(Self {
            fields: ordered,
            memo,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Brings every field up to date with `state` and `props`.
    ///
    /// A field is recomputed when its extracted dependencies differ from the
    /// previous evaluation or when a derived field it depends on was
    /// recomputed in this pass. Otherwise the previous `Arc` is returned.
    pub fn evaluate(&mut self, state: &StateOf<M>, props: &PropsOf<M>) -> DerivedValues {
        let mut values = DerivedValues::default();
        let mut recomputed: HashSet<&str> = HashSet::new();

        for (field, memo) in self.fields.iter().zip(self.memo.iter_mut()) {
            let deps = field.deps.as_ref().map(|extract| extract(state, props));
            let upstream_changed = field
                .derived_deps
                .iter()
                .any(|dep| recomputed.contains(dep.as_str()));

            let cached = match memo.as_ref() {
                Some(prev) if !upstream_changed => match (&deps, &prev.deps) {
                    (Some(next), Some(last)) => next == last,
                    // Derived-only fields follow their upstream fields.
                    (None, None) => !field.derived_deps.is_empty(),
                    _ => false,
                },
                _ => false,
            };

            let value = match memo.as_ref() {
                Some(prev) if cached => Arc::clone(&prev.value),
                _ => {
                    let value = (field.compute)(state, props, &values);
                    recomputed.insert(field.name.as_str());
                    *memo = Some(Memo {
                        deps,
                        value: Arc::clone(&value),
                    });
                    value
                }
            };
            values.insert(&field.name, value);
        }

        if !recomputed.is_empty() {
            trace!(
                recomputed = recomputed.len(),
                total = self.fields.len(),
                "derived fields updated"
            );
        }
        values
    }
}
