use std::fmt;

/// Type bundle describing one store.
///
/// A store manages a single `State` snapshot, receives `Props` from its
/// host, and dispatches actions taking `Args`. Asynchronous calls resolve
/// with `Output`.
///
/// ```ignore
/// struct Todos;
///
/// impl Model for Todos {
///     type State = TodoState;
///     type Props = ();
///     type Args = TodoArgs;
///     type Output = Vec<Todo>;
/// }
/// ```
pub trait Model: Send + Sync + 'static {
    type State: Send + Sync + 'static;
    type Props: Send + Sync + 'static;
    /// Compared argument-for-argument by the reuse policy.
    type Args: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;
    type Output: Clone + fmt::Debug + Send + Sync + 'static;
}

pub type StateOf<M> = <M as Model>::State;
pub type PropsOf<M> = <M as Model>::Props;
pub type ArgsOf<M> = <M as Model>::Args;
pub type OutputOf<M> = <M as Model>::Output;
