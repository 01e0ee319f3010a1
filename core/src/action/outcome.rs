use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::error::ActionError;

/// How a dispatched action settled.
#[derive(Debug, Clone)]
pub enum Outcome<R> {
    /// A synchronous action committed its effect.
    Applied,
    /// An asynchronous call succeeded.
    Done(R),
    /// Dropped by the ignore policy; state untouched.
    Ignored,
    /// The call function declined to run.
    Skipped,
    /// Replaced in the keep-last queue by a newer call.
    Superseded,
    /// Cancelled through `Store::abort`.
    Aborted,
    /// The call failed but the action handles its errors.
    Failed(ActionError),
}

impl<R> Outcome<R> {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn into_output(self) -> Option<R> {
        match self {
            Self::Done(value) => Some(value),
            _ => None,
        }
    }
}

pub type ActionResult<R> = Result<Outcome<R>, ActionError>;

/// Handle to the result of one dispatched action.
///
/// Cloning yields another handle to the same call; awaiting any of them
/// produces the same result.
pub struct Pending<R>
where
    R: Clone + Send + Sync + 'static,
{
    inner: Shared<BoxFuture<'static, ActionResult<R>>>,
}

impl<R> Pending<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub(crate) fn ready(result: ActionResult<R>) -> Self {
        Self {
            inner: futures::future::ready(result).boxed().shared(),
        }
    }

    pub(crate) fn channel(action: &str) -> (oneshot::Sender<ActionResult<R>>, Self) {
        let (tx, rx) = oneshot::channel();
        let action = action.to_string();
        let inner = async move {
            rx.await
                .unwrap_or_else(|_| Err(ActionError::Dropped { action }))
        }
        .boxed()
        .shared();
        (tx, Self { inner })
    }

    /// True if both handles refer to the same call.
    ///
    /// Only meaningful while the call is unsettled: a handle that has been
    /// awaited to completion no longer compares equal to anything.
    pub fn same_call(&self, other: &Self) -> bool {
        Shared::ptr_eq(&self.inner, &other.inner)
    }

    /// The result, if the call has already settled.
    pub fn peek(&self) -> Option<&ActionResult<R>> {
        self.inner.peek()
    }
}

impl<R> Clone for Pending<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R> Future for Pending<R>
where
    R: Clone + Send + Sync + 'static,
{
    type Output = ActionResult<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<R> std::fmt::Debug for Pending<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending")
            .field("settled", &self.inner.peek().is_some())
            .finish()
    }
}
