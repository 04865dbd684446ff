//! Native stack safety for the evaluator.
//!
//! Evaluation is a chain of boxed futures, so polling a deep call nests one
//! native frame per IR level. Every `Evaluator::eval` future is polled
//! through [`StackSafe`], which moves the poll onto a fresh stack segment
//! when the current one runs low. The IR state itself lives on the heap, so
//! a future suspended on one segment resumes fine on another.

use futures::future::LocalBoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Space that must remain before a poll continues on the current segment.
const RED_ZONE: usize = 128 * 1024;

/// Size of each additional segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// A boxed future whose every poll runs with at least `RED_ZONE` bytes of
/// native stack available.
pub struct StackSafe<'a, T> {
    inner: LocalBoxFuture<'a, T>,
}

impl<'a, T> StackSafe<'a, T> {
    pub fn new(inner: LocalBoxFuture<'a, T>) -> Self {
        StackSafe { inner }
    }
}

impl<T> Future for StackSafe<'_, T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let inner = &mut self.get_mut().inner;
        ensure_sufficient_stack(|| inner.as_mut().poll(cx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::FutureExt;

    fn countdown(n: u64) -> LocalBoxFuture<'static, u64> {
        StackSafe::new(
            async move {
                if n == 0 {
                    0
                } else {
                    countdown(n - 1).await + 1
                }
            }
            .boxed_local(),
        )
        .boxed_local()
    }

    #[test]
    fn test_deeply_nested_futures_complete() {
        assert_eq!(block_on(countdown(20_000)), 20_000);
    }

    #[test]
    fn test_returns_closure_result() {
        assert_eq!(ensure_sufficient_stack(|| 42), 42);
    }
}
