pub mod publisher;

use std::future::Future;

use tokio::{
    runtime::{Handle, Runtime},
    sync::broadcast,
    task::JoinHandle,
};
use tracing::info;

/// Owns the node runtime and the shutdown signal shared by every spawned service.
pub struct ReamExecutor {
    runtime: Runtime,
    spawner: TaskSpawner,
}

impl ReamExecutor {
    pub fn new() -> std::io::Result<Self> {
        let runtime = Runtime::new()?;
        Ok(Self::with_runtime(runtime))
    }

    /// Creates a new executor with an existing runtime
    pub fn with_runtime(runtime: Runtime) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        let spawner = TaskSpawner {
            handle: runtime.handle().clone(),
            shutdown,
        };
        Self { runtime, spawner }
    }

    /// A cloneable handle services use to spawn their own workers.
    pub fn spawner(&self) -> TaskSpawner {
        self.spawner.clone()
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Triggers a shutdown signal to all spawned tasks
    pub fn shutdown(&self) {
        self.spawner.shutdown();
    }
}

/// Spawns named tasks on a runtime handle. Every async task races the shutdown signal and
/// resolves to `None` when it loses.
#[derive(Clone)]
pub struct TaskSpawner {
    handle: Handle,
    shutdown: broadcast::Sender<()>,
}

impl TaskSpawner {
    /// Spawner bound to the runtime of the calling task with its own shutdown signal.
    ///
    /// Panics outside of a tokio runtime, mainly useful in tests.
    pub fn current() -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            handle: Handle::current(),
            shutdown,
        }
    }

    pub fn spawn<F>(&self, name: &'static str, future: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();
        self.handle.spawn(async move {
            tokio::select! {
                result = future => Some(result),
                _ = shutdown.recv() => {
                    info!(task = name, "Task shutdown");
                    None
                }
            }
        })
    }

    /// Spawns a blocking task in a dedicated thread pool
    pub fn spawn_blocking<F, R>(&self, task: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.spawn_blocking(task)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}
