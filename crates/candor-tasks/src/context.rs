//! Execution context adapter.
//!
//! A task callable may need ambient application state (a storage handle,
//! mail settings, ...). Instead of discovering that state at call time,
//! the application hands the manager an [`AppContext`] explicitly, either
//! at construction or later through [`ContextAdapter::attach`]. Each
//! attempt then runs between [`AppContext::enter`] and the drop of the
//! returned [`ContextGuard`].

use crate::task::{Task, TaskFuture, TaskId};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Application state made available to task callables.
pub trait AppContext: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str {
        "app"
    }

    /// Establishes ambient state for one attempt.
    ///
    /// The returned guard is dropped when the attempt ends, whatever the
    /// outcome, including a panic inside the callable.
    fn enter(&self, task_id: &TaskId) -> ContextGuard {
        let _ = task_id;
        ContextGuard::noop()
    }

    /// Upcast used by [`TaskContext::state`].
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to an application context.
pub type SharedContext = Arc<dyn AppContext>;

/// Scope guard returned by [`AppContext::enter`].
#[must_use = "the context is torn down when the guard is dropped"]
pub struct ContextGuard {
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl ContextGuard {
    /// A guard with nothing to tear down.
    pub fn noop() -> Self {
        Self { teardown: None }
    }

    /// A guard that runs `teardown` on drop.
    pub fn on_exit(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextGuard")
            .field("has_teardown", &self.teardown.is_some())
            .finish()
    }
}

/// Per-attempt information handed to a callable.
#[derive(Clone)]
pub struct TaskContext {
    /// Task id.
    pub task_id: TaskId,

    /// Current attempt number (1-based).
    pub attempt: u32,

    /// Maximum attempts allowed (`max_retries + 1`).
    pub max_attempts: u32,

    /// When this attempt started.
    pub started_at: DateTime<Utc>,

    app: Option<SharedContext>,
}

impl TaskContext {
    /// Context for a callable invoked outside a manager.
    pub fn detached(task_id: TaskId) -> Self {
        Self {
            task_id,
            attempt: 1,
            max_attempts: 1,
            started_at: Utc::now(),
            app: None,
        }
    }

    /// Attaches an application context.
    #[must_use]
    pub fn with_app(mut self, app: SharedContext) -> Self {
        self.app = Some(app);
        self
    }

    /// The resolved application context, if any.
    #[must_use]
    pub fn app(&self) -> Option<&SharedContext> {
        self.app.as_ref()
    }

    /// Downcasts the application context to a concrete type.
    #[must_use]
    pub fn state<T: 'static>(&self) -> Option<&T> {
        self.app.as_ref()?.as_any().downcast_ref::<T>()
    }

    /// Returns true if this is the last attempt.
    #[must_use]
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .field("attempt", &self.attempt)
            .field("max_attempts", &self.max_attempts)
            .field("started_at", &self.started_at)
            .field("app", &self.app.as_ref().map(|a| a.name().to_string()))
            .finish()
    }
}

/// Resolves which context an attempt runs in and wraps the callable.
#[derive(Default)]
pub struct ContextAdapter {
    attached: RwLock<Option<SharedContext>>,
}

impl ContextAdapter {
    /// Creates an adapter with an optional initial context.
    pub fn new(context: Option<SharedContext>) -> Self {
        Self {
            attached: RwLock::new(context),
        }
    }

    /// Attaches a context if none is attached yet.
    ///
    /// Returns false, leaving the existing context in place, otherwise.
    pub fn attach(&self, context: SharedContext) -> bool {
        let mut attached = self.attached.write();
        if attached.is_some() {
            return false;
        }
        debug!(context = context.name(), "Attached application context");
        *attached = Some(context);
        true
    }

    /// Currently attached context.
    pub fn current(&self) -> Option<SharedContext> {
        self.attached.read().clone()
    }

    /// Task-level context first, then the attached one.
    pub fn resolve(&self, task_context: Option<&SharedContext>) -> Option<SharedContext> {
        task_context.cloned().or_else(|| self.current())
    }

    /// Builds the future for one attempt of `task`.
    ///
    /// The context is entered before the callable is invoked and torn
    /// down when the future completes or is dropped. Arguments, return
    /// value and errors pass through untouched.
    pub fn wrap(&self, task: &Task) -> TaskFuture {
        let app = self.resolve(task.context());
        let handler = Arc::clone(task.handler());
        let args = task.args().clone();
        let ctx = TaskContext {
            task_id: task.id().clone(),
            attempt: task.attempt(),
            max_attempts: task.max_retries().saturating_add(1),
            started_at: Utc::now(),
            app: app.clone(),
        };

        async move {
            let _guard = app.as_ref().map(|app| app.enter(&ctx.task_id));
            handler(args, ctx).await
        }
        .boxed()
    }
}

impl fmt::Debug for ContextAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextAdapter")
            .field(
                "attached",
                &self.attached.read().as_ref().map(|c| c.name().to_string()),
            )
            .finish()
    }
}
