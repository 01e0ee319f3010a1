use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::action::{Model, PropsOf, StateOf};

/// Type-erased derived value. Reference identity is meaningful: an
/// unchanged field hands back the same `Arc`.
pub type DerivedValue = Arc<dyn Any + Send + Sync>;

pub(crate) type DepsFn<M> = Arc<dyn Fn(&StateOf<M>, &PropsOf<M>) -> Vec<Dep> + Send + Sync>;
pub(crate) type ComputeFn<M> =
    Arc<dyn Fn(&StateOf<M>, &PropsOf<M>, &DerivedValues) -> DerivedValue + Send + Sync>;

/// Comparable value extracted from state or props.
pub trait DepValue: Any + Send + Sync + fmt::Debug {
    fn dep_eq(&self, other: &dyn DepValue) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<T> DepValue for T
where
    T: PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn dep_eq(&self, other: &dyn DepValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One element of a derived field's dependency list.
#[derive(Debug)]
pub struct Dep(Box<dyn DepValue>);

impl Dep {
    pub fn new<T>(value: T) -> Self
    where
        T: PartialEq + fmt::Debug + Send + Sync + 'static,
    {
        Self(Box::new(value))
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        (*self.0).dep_eq(&*other.0)
    }
}

/// Builds a dependency list: `deps![state.filter.clone(), state.list.clone()]`.
#[macro_export]
macro_rules! deps {
    ($($value:expr),* $(,)?) => {
        vec![$($crate::derived::Dep::new($value)),*]
    };
}

/// Current values of every derived field.
#[derive(Clone, Default)]
pub struct DerivedValues {
    values: HashMap<String, DerivedValue>,
}

impl DerivedValues {
    pub fn get<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.values
            .get(name)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn raw(&self, name: &str) -> Option<&DerivedValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn insert(&mut self, name: &str, value: DerivedValue) {
        self.values.insert(name.to_string(), value);
    }
}

impl fmt::Debug for DerivedValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// A memoized value computed from state, props and other derived fields.
pub struct DerivedField<M: Model> {
    pub(crate) name: String,
    pub(crate) deps: Option<DepsFn<M>>,
    pub(crate) derived_deps: Vec<String>,
    pub(crate) compute: ComputeFn<M>,
}

impl<M: Model> DerivedField<M> {
    pub fn new<T, F>(name: impl Into<String>, compute: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&StateOf<M>, &PropsOf<M>, &DerivedValues) -> T + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            deps: None,
            derived_deps: Vec::new(),
            compute: Arc::new(move |state, props, derived| {
                Arc::new(compute(state, props, derived)) as DerivedValue
            }),
        }
    }

    /// Recompute only when an element of the extracted list changes.
    pub fn depends_on<F>(mut self, deps: F) -> Self
    where
        F: Fn(&StateOf<M>, &PropsOf<M>) -> Vec<Dep> + Send + Sync + 'static,
    {
        self.deps = Some(Arc::new(deps));
        self
    }

    /// Recompute whenever one of these derived fields recomputes.
    pub fn depends_on_derived<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.derived_deps = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
