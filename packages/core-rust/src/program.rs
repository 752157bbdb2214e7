//! Deferred compositions of service calls.
//!
//! A [`Program`] is a description: a boxed step that, given a shared
//! execution context, produces a future resolving to an [`Outcome`].
//! Nothing runs until [`Program::run`] is awaited, so callers assemble a
//! full request's worth of service calls up front and hand the result to a
//! runtime for execution.
//!
//! Steps sequence strictly left-to-right. The first `Failure` short-circuits
//! the rest of the chain; later steps never observe it, and the failure
//! reaches the caller unchanged unless an explicit [`Program::map_failure`]
//! step was composed in.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::fault::Fault;
use crate::outcome::Outcome;

type BoxedOutcome<T, E> = Pin<Box<dyn Future<Output = Outcome<T, E>> + Send>>;
type BoxedStep<C, T, E> = Box<dyn FnOnce(Arc<C>) -> BoxedOutcome<T, E> + Send>;

/// A composed, not-yet-executed sequence of service calls.
///
/// `C` is the execution context the steps read services from; `T` the
/// success value; `E` the failure channel (defaulting to [`Fault`]).
/// Programs own nothing: they borrow the context for the duration of one
/// execution and are consumed by it.
pub struct Program<C, T, E = Fault> {
    step: BoxedStep<C, T, E>,
}

impl<C, T, E> Program<C, T, E>
where
    C: Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    /// Lifts an async closure over the context into a program.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(Arc<C>) -> Fut + Send + 'static,
        Fut: Future<Output = Outcome<T, E>> + Send + 'static,
    {
        Self {
            step: Box::new(move |ctx| Box::pin(f(ctx))),
        }
    }

    /// A program that immediately succeeds with `value`.
    pub fn succeed(value: T) -> Self {
        Self::from_fn(move |_ctx| async move { Outcome::Success(value) })
    }

    /// A program that immediately fails with `error`.
    pub fn fail(error: E) -> Self {
        Self::from_fn(move |_ctx| async move { Outcome::Failure(error) })
    }

    /// Transforms the success value; the failure channel is untouched.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U + Send + 'static) -> Program<C, U, E>
    where
        U: Send + 'static,
    {
        Program::from_fn(move |ctx| async move { (self.step)(ctx).await.map(f) })
    }

    /// Sequences a dependent program chosen from the previous success value.
    ///
    /// On `Failure` the continuation is never constructed and the failure
    /// propagates unchanged.
    #[must_use]
    pub fn and_then<U, F>(self, f: F) -> Program<C, U, E>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Program<C, U, E> + Send + 'static,
    {
        Program::from_fn(move |ctx: Arc<C>| async move {
            match (self.step)(Arc::clone(&ctx)).await {
                Outcome::Success(value) => (f(value).step)(ctx).await,
                Outcome::Failure(error) => Outcome::Failure(error),
            }
        })
    }

    /// Maps the failure to a different declared kind. Explicit and visible:
    /// this is the only place a program changes a failure's kind.
    #[must_use]
    pub fn map_failure<E2>(self, f: impl FnOnce(E) -> E2 + Send + 'static) -> Program<C, T, E2>
    where
        E2: Send + 'static,
    {
        Program::from_fn(move |ctx| async move { (self.step)(ctx).await.map_failure(f) })
    }

    /// Executes the program against the given context.
    pub async fn run(self, ctx: Arc<C>) -> Outcome<T, E> {
        tracing::trace!("executing program");
        (self.step)(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::fault::Fault;

    /// Minimal context: a step counter the tests can observe.
    #[derive(Default)]
    struct Counter {
        steps: AtomicUsize,
    }

    impl Counter {
        fn tick(&self) -> usize {
            self.steps.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    #[tokio::test]
    async fn succeed_and_fail_are_immediate() {
        let ctx = Arc::new(Counter::default());

        let ok: Program<Counter, i32> = Program::succeed(5);
        assert_eq!(ok.run(Arc::clone(&ctx)).await, Outcome::Success(5));

        let failed: Program<Counter, i32> = Program::fail(Fault::validation("bad"));
        assert_eq!(
            failed.run(ctx).await,
            Outcome::Failure(Fault::validation("bad"))
        );
    }

    #[tokio::test]
    async fn steps_run_left_to_right() {
        let ctx = Arc::new(Counter::default());

        let program: Program<Counter, (usize, usize)> =
            Program::from_fn(|ctx: Arc<Counter>| async move { Outcome::Success(ctx.tick()) })
                .and_then(|first| {
                    Program::from_fn(move |ctx: Arc<Counter>| async move {
                        Outcome::Success((first, ctx.tick()))
                    })
                });

        assert_eq!(program.run(ctx).await, Outcome::Success((1, 2)));
    }

    #[tokio::test]
    async fn failure_at_step_k_skips_the_rest() {
        let ctx = Arc::new(Counter::default());

        let program: Program<Counter, usize> =
            Program::from_fn(|ctx: Arc<Counter>| async move {
                ctx.tick();
                Outcome::Failure(Fault::not_found("entity-7"))
            })
            .and_then(|_: usize| {
                Program::from_fn(|ctx: Arc<Counter>| async move { Outcome::Success(ctx.tick()) })
            })
            .map(|n| n + 100);

        let outcome = program.run(Arc::clone(&ctx)).await;
        assert_eq!(outcome, Outcome::Failure(Fault::not_found("entity-7")));
        assert_eq!(
            ctx.steps.load(Ordering::SeqCst),
            1,
            "steps after the failure must not run"
        );
    }

    #[tokio::test]
    async fn map_failure_is_the_only_kind_change() {
        let ctx = Arc::new(Counter::default());

        let program: Program<Counter, usize> =
            Program::fail(Fault::resource_unavailable("backend down"))
                .map_failure(|fault| match fault {
                    Fault::ResourceUnavailable { cause } => Fault::Validation {
                        message: format!("rejected: {cause}"),
                    },
                    other => other,
                });

        assert_eq!(
            program.run(ctx).await,
            Outcome::Failure(Fault::validation("rejected: backend down"))
        );
    }

    #[tokio::test]
    async fn map_transforms_success_only() {
        let ctx = Arc::new(Counter::default());
        let program: Program<Counter, String> =
            Program::succeed(21).map(|n: i32| (n * 2).to_string());
        assert_eq!(
            program.run(ctx).await,
            Outcome::Success("42".to_string())
        );
    }
}
