//! The long-lived runtime: resolved service graph plus program execution.
//!
//! A [`Runtime`] is built once from a [`LayerSet`] and a connection pool.
//! Construction resolves the dependency graph (rejecting cycles before any
//! layer runs), instantiates every service in topological order threading
//! the one shared [`ResourceHandle`] through, and freezes the result. From
//! then on any number of programs (typically one per inbound request, many
//! concurrently) execute against the same live graph via [`Runtime::run`].
//!
//! Lifecycle follows the deferred pattern used across Lattice: `build()`
//! creates everything, `run()` serves, `shutdown()` drains in-flight
//! programs and releases the resource. `Drop` releases as a last resort,
//! and release is idempotent end to end.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use lattice_core::{Fault, Outcome, Program};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::graph::layer::BuildContext;
use crate::graph::resolve::resolution_order;
use crate::graph::{Layer, LayerSet, ServiceRegistry};
use crate::resource::ResourceHandle;
use crate::storage::Pool;

/// A program executable by a [`Runtime`]: its context is the live registry.
pub type ServiceProgram<T> = Program<ServiceRegistry, T, Fault>;

/// Runtime lifecycle state: `Ready` from a successful build until
/// [`Runtime::shutdown`] (or drop) moves it to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Ready,
    Closed,
}

/// The resolved, long-lived service graph plus the entry point for
/// executing programs.
///
/// The runtime exclusively owns the registry and the resource handle;
/// programs borrow the registry per execution and own nothing.
pub struct Runtime {
    services: Arc<ServiceRegistry>,
    resource: Arc<ResourceHandle>,
    state: ArcSwap<RuntimeState>,
    in_flight: Arc<AtomicU64>,
}

impl Runtime {
    /// Resolves the layer graph and instantiates every service.
    ///
    /// Cycle and missing-dependency checks run before any build closure, so
    /// a rejected graph has no partial side effects. If a build closure
    /// fails partway, the resource handle is released before the fault is
    /// returned.
    ///
    /// # Errors
    ///
    /// - [`Fault::CyclicDependency`] naming the tokens on the cycle.
    /// - [`Fault::NotFound`] naming a required but unprovided token.
    /// - Whatever fault a layer's build closure produced.
    pub async fn build(layers: LayerSet, pool: Arc<dyn Pool>) -> Result<Self, Fault> {
        let layers = layers.into_layers();
        let order = resolution_order(&layers)?;

        let resource = Arc::new(ResourceHandle::new(pool));
        let mut registry = ServiceRegistry::new();
        let mut slots: Vec<Option<Layer>> = layers.into_iter().map(Some).collect();

        for idx in order {
            let Some(layer) = slots[idx].take() else {
                continue;
            };
            let id = layer.descriptor().id;
            let ctx = BuildContext::new(registry.clone(), Arc::clone(&resource));
            match layer.build(ctx).await {
                Ok(instance) => {
                    registry.insert(id, instance);
                    debug!(service = %id, "service initialized");
                }
                Err(fault) => {
                    warn!(service = %id, %fault, "service initialization failed");
                    resource.release();
                    return Err(fault);
                }
            }
        }

        info!(services = registry.len(), "runtime built");
        Ok(Self {
            services: Arc::new(registry),
            resource,
            state: ArcSwap::from_pointee(RuntimeState::Ready),
            in_flight: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Executes one program against the live service graph.
    ///
    /// Concurrent invocations against the same runtime are the expected
    /// case. A failed program leaves every service exactly as able to serve
    /// the next one; the runtime is reusable across an unbounded number of
    /// executions.
    pub async fn run<T>(&self, program: ServiceProgram<T>) -> Outcome<T>
    where
        T: Send + 'static,
    {
        if self.state() == RuntimeState::Closed {
            return Outcome::Failure(Fault::resource_unavailable("runtime is closed"));
        }

        let run_id = Uuid::new_v4();
        let _guard = InFlightGuard::new(Arc::clone(&self.in_flight));
        metrics::counter!("lattice_program_runs_total").increment(1);
        trace!(%run_id, "program started");

        let outcome = program.run(Arc::clone(&self.services)).await;
        if let Outcome::Failure(fault) = &outcome {
            metrics::counter!("lattice_program_failures_total").increment(1);
            debug!(%run_id, code = ?fault.code(), "program failed");
        }
        outcome
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RuntimeState {
        **self.state.load()
    }

    /// Number of programs currently executing.
    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Moves to `Closed`, waits (bounded) for in-flight programs to drain,
    /// then releases the resource handle. Idempotent; only the first call
    /// releases.
    pub async fn shutdown(&self) {
        let previous = self.state.swap(Arc::new(RuntimeState::Closed));
        if *previous == RuntimeState::Closed {
            return;
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.in_flight.load(Ordering::Acquire) > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    in_flight = self.in_flight_count(),
                    "shutdown drain timeout expired"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        self.resource.release();
        info!("runtime shut down");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.state.store(Arc::new(RuntimeState::Closed));
        self.resource.release();
    }
}

/// RAII guard tracking one in-flight program; decrements on drop so the
/// count stays accurate even if an execution future is abandoned.
struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl InFlightGuard {
    fn new(in_flight: Arc<AtomicU64>) -> Self {
        in_flight.fetch_add(1, Ordering::AcqRel);
        Self { in_flight }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use lattice_core::FaultCode;

    use super::*;
    use crate::graph::{GraphService, ServiceDescriptor, ServiceId};
    use crate::storage::{MemoryPool, StoreBackend};

    struct Alpha {
        seq: AtomicU64,
    }

    impl Alpha {
        fn next(&self) -> u64 {
            self.seq.fetch_add(1, Ordering::AcqRel) + 1
        }
    }

    impl GraphService for Alpha {
        const ID: ServiceId = ServiceId::new("alpha");
    }

    struct Beta {
        alpha: Arc<Alpha>,
    }

    impl Beta {
        fn doubled(&self) -> u64 {
            self.alpha.next() * 2
        }
    }

    impl GraphService for Beta {
        const ID: ServiceId = ServiceId::new("beta");
        fn descriptor() -> ServiceDescriptor {
            ServiceDescriptor::new(Self::ID).requires(Alpha::ID)
        }
    }

    fn alpha_layer() -> Layer {
        Layer::new::<Alpha, _, _>(|_ctx| async {
            Ok(Alpha {
                seq: AtomicU64::new(0),
            })
        })
    }

    fn beta_layer() -> Layer {
        Layer::new::<Beta, _, _>(|ctx: BuildContext| async move {
            let alpha = ctx.resolve::<Alpha>()?;
            Ok(Beta { alpha })
        })
    }

    fn pool() -> Arc<MemoryPool> {
        Arc::new(MemoryPool::new())
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[tokio::test]
    async fn two_service_graph_builds_in_either_order() {
        init_tracing();
        for set in [
            LayerSet::new().with(alpha_layer()).unwrap().with(beta_layer()).unwrap(),
            LayerSet::new().with(beta_layer()).unwrap().with(alpha_layer()).unwrap(),
        ] {
            let runtime = Runtime::build(set, pool()).await.unwrap();
            assert_eq!(runtime.state(), RuntimeState::Ready);

            // Beta is live and can call through to Alpha.
            let outcome = runtime
                .run(Program::from_fn(|ctx: Arc<ServiceRegistry>| async move {
                    match ctx.resolve::<Beta>() {
                        Ok(beta) => Outcome::Success(beta.doubled()),
                        Err(fault) => Outcome::Failure(fault),
                    }
                }))
                .await;
            assert_eq!(outcome, Outcome::Success(2));
        }
    }

    #[tokio::test]
    async fn missing_dependency_fails_before_any_build() {
        let built = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&built);
        let beta_only = LayerSet::new()
            .with(Layer::new::<Beta, _, _>(move |ctx: BuildContext| async move {
                flag.store(true, Ordering::Release);
                let alpha = ctx.resolve::<Alpha>()?;
                Ok(Beta { alpha })
            }))
            .unwrap();

        let fault = Runtime::build(beta_only, pool()).await.err().unwrap();
        assert_eq!(fault, Fault::not_found("alpha"));
        assert!(!built.load(Ordering::Acquire), "no layer may have run");
    }

    #[tokio::test]
    async fn cycle_fails_with_no_partial_side_effects() {
        struct X;
        impl GraphService for X {
            const ID: ServiceId = ServiceId::new("x");
            fn descriptor() -> ServiceDescriptor {
                ServiceDescriptor::new(Self::ID).requires(Y::ID)
            }
        }
        struct Y;
        impl GraphService for Y {
            const ID: ServiceId = ServiceId::new("y");
            fn descriptor() -> ServiceDescriptor {
                ServiceDescriptor::new(Self::ID).requires(X::ID)
            }
        }

        let built = Arc::new(AtomicBool::new(false));
        let (fx, fy) = (Arc::clone(&built), Arc::clone(&built));
        let set = LayerSet::new()
            .with(Layer::new::<X, _, _>(move |_ctx| async move {
                fx.store(true, Ordering::Release);
                Ok(X)
            }))
            .unwrap()
            .with(Layer::new::<Y, _, _>(move |_ctx| async move {
                fy.store(true, Ordering::Release);
                Ok(Y)
            }))
            .unwrap();

        let test_pool = pool();
        let fault = Runtime::build(set, Arc::clone(&test_pool) as Arc<dyn Pool>)
            .await
            .err().unwrap();

        assert_eq!(fault.code(), FaultCode::CyclicDependency);
        assert!(!built.load(Ordering::Acquire), "no service may be instantiated");
        assert_eq!(test_pool.connect_count(), 0, "no connection may be opened");
    }

    #[tokio::test]
    async fn build_failure_partway_releases_the_handle() {
        struct Broken;
        impl GraphService for Broken {
            const ID: ServiceId = ServiceId::new("broken");
            fn descriptor() -> ServiceDescriptor {
                ServiceDescriptor::new(Self::ID).requires(Alpha::ID)
            }
        }

        // Alpha acquires the connection; Broken then fails its build.
        let set = LayerSet::new()
            .with(Layer::new::<Alpha, _, _>(|ctx: BuildContext| async move {
                let _store: Arc<dyn StoreBackend> = ctx.acquire_store().await?;
                Ok(Alpha {
                    seq: AtomicU64::new(0),
                })
            }))
            .unwrap()
            .with(Layer::new::<Broken, _, _>(|_ctx| async {
                Err::<Broken, _>(Fault::validation("bad config"))
            }))
            .unwrap();

        let test_pool = pool();
        let fault = Runtime::build(set, Arc::clone(&test_pool) as Arc<dyn Pool>)
            .await
            .err().unwrap();

        assert_eq!(fault, Fault::validation("bad config"));
        assert_eq!(test_pool.store().close_count(), 1, "handle must be released");
    }

    #[tokio::test]
    async fn failed_program_leaves_runtime_reusable() {
        let set = LayerSet::new().with(alpha_layer()).unwrap();
        let runtime = Runtime::build(set, pool()).await.unwrap();

        let failed = runtime
            .run(ServiceProgram::<u64>::fail(Fault::validation("nope")))
            .await;
        assert!(failed.is_failure());
        assert_eq!(runtime.in_flight_count(), 0);

        let ok = runtime
            .run(Program::from_fn(|ctx: Arc<ServiceRegistry>| async move {
                match ctx.resolve::<Alpha>() {
                    Ok(alpha) => Outcome::Success(alpha.next()),
                    Err(fault) => Outcome::Failure(fault),
                }
            }))
            .await;
        assert_eq!(ok, Outcome::Success(1));
    }

    #[tokio::test]
    async fn concurrent_runs_both_complete() {
        let set = LayerSet::new().with(alpha_layer()).unwrap();
        let runtime = Arc::new(Runtime::build(set, pool()).await.unwrap());

        let program = |label: u64| {
            Program::from_fn(move |ctx: Arc<ServiceRegistry>| async move {
                match ctx.resolve::<Alpha>() {
                    Ok(alpha) => Outcome::Success((label, alpha.next())),
                    Err(fault) => Outcome::Failure(fault),
                }
            })
        };

        let (a, b) = tokio::join!(runtime.run(program(1)), runtime.run(program(2)));
        let (a, b) = (a.success().unwrap(), b.success().unwrap());

        // Each run keeps its own label; the shared sequence never hands the
        // same id to both.
        assert_eq!(a.0, 1);
        assert_eq!(b.0, 2);
        assert_ne!(a.1, b.1);
        assert_eq!(runtime.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn run_after_shutdown_is_rejected() {
        let set = LayerSet::new().with(alpha_layer()).unwrap();
        let runtime = Runtime::build(set, pool()).await.unwrap();

        runtime.shutdown().await;
        assert_eq!(runtime.state(), RuntimeState::Closed);

        let outcome = runtime.run(ServiceProgram::<u64>::succeed(1)).await;
        assert_eq!(
            outcome.failure().unwrap().code(),
            FaultCode::ResourceUnavailable
        );
    }

    #[tokio::test]
    async fn shutdown_releases_exactly_once() {
        let test_pool = pool();
        let set = LayerSet::new()
            .with(Layer::new::<Alpha, _, _>(|ctx: BuildContext| async move {
                ctx.acquire_store().await?;
                Ok(Alpha {
                    seq: AtomicU64::new(0),
                })
            }))
            .unwrap();

        let runtime = Runtime::build(set, Arc::clone(&test_pool) as Arc<dyn Pool>)
            .await
            .unwrap();

        runtime.shutdown().await;
        runtime.shutdown().await;
        drop(runtime);

        assert_eq!(test_pool.store().close_count(), 1);
    }

    #[tokio::test]
    async fn dropping_the_runtime_releases_the_resource() {
        let test_pool = pool();
        {
            let set = LayerSet::new()
                .with(Layer::new::<Alpha, _, _>(|ctx: BuildContext| async move {
                    ctx.acquire_store().await?;
                    Ok(Alpha {
                        seq: AtomicU64::new(0),
                    })
                }))
                .unwrap();
            let _runtime = Runtime::build(set, Arc::clone(&test_pool) as Arc<dyn Pool>)
                .await
                .unwrap();
        }
        assert_eq!(test_pool.store().close_count(), 1);
    }

    #[tokio::test]
    async fn unreachable_pool_fails_layers_that_acquire() {
        let set = LayerSet::new()
            .with(Layer::new::<Alpha, _, _>(|ctx: BuildContext| async move {
                ctx.acquire_store().await?;
                Ok(Alpha {
                    seq: AtomicU64::new(0),
                })
            }))
            .unwrap();

        let fault = Runtime::build(set, Arc::new(crate::storage::UnreachablePool))
            .await
            .err().unwrap();
        assert_eq!(fault.code(), FaultCode::ResourceUnavailable);
    }
}
