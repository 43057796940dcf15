//! Task definitions.

use crate::context::{SharedContext, TaskContext};
use crate::error::{TaskError, TaskResult};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Default retry budget for a task.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Caller-supplied task identifier.
///
/// Not enforced unique: a second submission with the same id overwrites
/// the first one's ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Arguments bound to a task at submission time.
///
/// Positional values and named values are kept apart so a callable can
/// read either by index or by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    /// Positional arguments.
    #[serde(default)]
    pub positional: Vec<Value>,

    /// Named arguments.
    #[serde(default)]
    pub named: Map<String, Value>,
}

impl TaskArgs {
    /// Creates an empty argument set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn with_arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a named argument.
    #[must_use]
    pub fn with_kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Appends any serializable value as a positional argument.
    pub fn push_serialized<T: Serialize>(&mut self, value: &T) -> TaskResult<()> {
        self.positional.push(serde_json::to_value(value)?);
        Ok(())
    }

    /// Decodes the positional argument at `index`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> TaskResult<T> {
        let value = self.positional.get(index).ok_or_else(|| {
            TaskError::InvalidArguments(format!(
                "missing positional argument {index} (got {})",
                self.positional.len()
            ))
        })?;
        T::deserialize(value).map_err(|e| {
            TaskError::InvalidArguments(format!("positional argument {index}: {e}"))
        })
    }

    /// Decodes the named argument `name`.
    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> TaskResult<T> {
        self.kwarg_opt(name)?
            .ok_or_else(|| TaskError::InvalidArguments(format!("missing named argument '{name}'")))
    }

    /// Decodes the named argument `name`, if present and not null.
    pub fn kwarg_opt<T: DeserializeOwned>(&self, name: &str) -> TaskResult<Option<T>> {
        match self.named.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|e| TaskError::InvalidArguments(format!("named argument '{name}': {e}"))),
        }
    }

    /// Total number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    /// True when no arguments are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Value a callable produces on success.
pub type TaskOutput = Value;

/// Future returned by a task callable.
pub type TaskFuture = BoxFuture<'static, TaskResult<TaskOutput>>;

/// Type-erased task callable.
pub type TaskHandler = Arc<dyn Fn(TaskArgs, TaskContext) -> TaskFuture + Send + Sync>;

/// Wraps an async function as a [`TaskHandler`].
pub fn handler<F, Fut>(f: F) -> TaskHandler
where
    F: Fn(TaskArgs, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskResult<TaskOutput>> + Send + 'static,
{
    Arc::new(move |args, ctx| f(args, ctx).boxed())
}

/// Wraps a synchronous function as a [`TaskHandler`].
///
/// The function runs on tokio's blocking pool, so it may do file or
/// network I/O with std APIs without stalling the runtime.
pub fn blocking_handler<F>(f: F) -> TaskHandler
where
    F: Fn(TaskArgs, TaskContext) -> TaskResult<TaskOutput> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |args, ctx| {
        let f = Arc::clone(&f);
        async move { tokio::task::spawn_blocking(move || f(args, ctx)).await? }.boxed()
    })
}

/// A deferred unit of work.
///
/// Everything except the retry counter is fixed at construction. The
/// counter only moves forward and never exceeds `max_retries`.
pub struct Task {
    id: TaskId,
    handler: TaskHandler,
    args: TaskArgs,
    max_retries: u32,
    current_retry: u32,
    created_at: DateTime<Utc>,
    context: Option<SharedContext>,
}

impl Task {
    /// Creates a task with no arguments and the default retry budget.
    pub fn new(id: impl Into<TaskId>, handler: TaskHandler) -> Self {
        Self::builder(id, handler).build()
    }

    /// Starts building a task.
    pub fn builder(id: impl Into<TaskId>, handler: TaskHandler) -> TaskBuilder {
        TaskBuilder::new(id.into(), handler)
    }

    /// Task id.
    #[must_use]
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Bound arguments.
    #[must_use]
    pub fn args(&self) -> &TaskArgs {
        &self.args
    }

    /// Callable.
    #[must_use]
    pub fn handler(&self) -> &TaskHandler {
        &self.handler
    }

    /// Retry ceiling.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Retries consumed so far.
    #[must_use]
    pub fn current_retry(&self) -> u32 {
        self.current_retry
    }

    /// Construction time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Task-level context, if one was bound.
    #[must_use]
    pub fn context(&self) -> Option<&SharedContext> {
        self.context.as_ref()
    }

    /// 1-based number of the attempt about to run.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.current_retry.saturating_add(1)
    }

    /// True once the retry budget is spent.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.current_retry >= self.max_retries
    }

    /// Consumes one retry. Returns false if the budget was already spent.
    pub(crate) fn increment_retry(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.current_retry += 1;
        true
    }

    /// Serializable snapshot for the ledger.
    #[must_use]
    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id.clone(),
            args: self.args.clone(),
            max_retries: self.max_retries,
            current_retry: self.current_retry,
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("args", &self.args)
            .field("max_retries", &self.max_retries)
            .field("current_retry", &self.current_retry)
            .field("created_at", &self.created_at)
            .field("context", &self.context.as_ref().map(|c| c.name().to_string()))
            .finish_non_exhaustive()
    }
}

/// Builder for [`Task`].
pub struct TaskBuilder {
    id: TaskId,
    handler: TaskHandler,
    args: TaskArgs,
    max_retries: u32,
    context: Option<SharedContext>,
}

impl TaskBuilder {
    fn new(id: TaskId, handler: TaskHandler) -> Self {
        Self {
            id,
            handler,
            args: TaskArgs::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            context: None,
        }
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.positional.push(value.into());
        self
    }

    /// Sets a named argument.
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.named.insert(name.into(), value.into());
        self
    }

    /// Replaces the whole argument set.
    #[must_use]
    pub fn args(mut self, args: TaskArgs) -> Self {
        self.args = args;
        self
    }

    /// Sets the retry ceiling.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Binds a context that takes precedence over the manager's.
    #[must_use]
    pub fn context(mut self, context: SharedContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Finishes the task.
    #[must_use]
    pub fn build(self) -> Task {
        Task {
            id: self.id,
            handler: self.handler,
            args: self.args,
            max_retries: self.max_retries,
            current_retry: 0,
            created_at: Utc::now(),
            context: self.context,
        }
    }
}

/// Point-in-time snapshot of a task, as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub args: TaskArgs,
    pub max_retries: u32,
    pub current_retry: u32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> TaskHandler {
        handler(|_, _| async { Ok(Value::Null) })
    }

    #[test]
    fn test_task_id_conversions() {
        let id = TaskId::from("thumbnails_7");
        assert_eq!(id.as_str(), "thumbnails_7");
        assert_eq!(id.to_string(), "thumbnails_7");
        assert_eq!(id, TaskId::from(String::from("thumbnails_7")));
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("thumbnails_7"));
    }

    #[test]
    fn test_args_typed_access() {
        let args = TaskArgs::new()
            .with_arg(42)
            .with_arg("hello")
            .with_kwarg("recipient", "a@example.com");

        assert_eq!(args.arg::<i64>(0).unwrap(), 42);
        assert_eq!(args.arg::<String>(1).unwrap(), "hello");
        assert_eq!(args.kwarg::<String>("recipient").unwrap(), "a@example.com");
        assert_eq!(args.kwarg_opt::<String>("sender").unwrap(), None);
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_args_errors() {
        let args = TaskArgs::new().with_arg("not a number");

        assert!(matches!(args.arg::<i64>(0), Err(TaskError::InvalidArguments(_))));
        assert!(matches!(args.arg::<i64>(5), Err(TaskError::InvalidArguments(_))));
        assert!(matches!(
            args.kwarg::<String>("missing"),
            Err(TaskError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_push_serialized() {
        #[derive(Serialize)]
        struct Payload {
            submission_id: u64,
        }

        let mut args = TaskArgs::new();
        args.push_serialized(&Payload { submission_id: 9 }).unwrap();
        assert_eq!(args.positional[0], json!({"submission_id": 9}));
    }

    #[test]
    fn test_builder_defaults() {
        let task = Task::new("t1", noop());
        assert_eq!(task.max_retries(), DEFAULT_MAX_RETRIES);
        assert_eq!(task.current_retry(), 0);
        assert_eq!(task.attempt(), 1);
        assert!(task.args().is_empty());
        assert!(task.context().is_none());
    }

    #[test]
    fn test_retry_counter_never_exceeds_budget() {
        let mut task = Task::builder("t1", noop()).max_retries(2).build();

        assert!(task.increment_retry());
        assert!(task.increment_retry());
        assert!(task.is_exhausted());
        assert!(!task.increment_retry());
        assert_eq!(task.current_retry(), 2);
        assert_eq!(task.attempt(), 3);
    }

    #[test]
    fn test_info_snapshot() {
        let task = Task::builder("email_upload_3", noop())
            .arg("user@example.com")
            .kwarg("subject", "Thanks")
            .max_retries(3)
            .build();

        let info = task.info();
        assert_eq!(info.id.as_str(), "email_upload_3");
        assert_eq!(info.args.positional, vec![json!("user@example.com")]);
        assert_eq!(info.max_retries, 3);
        assert_eq!(info.created_at, task.created_at());
    }

    #[tokio::test]
    async fn test_blocking_handler_runs_off_runtime() {
        let h = blocking_handler(|args, _| Ok(json!(args.arg::<i64>(0)? * 2)));
        let ctx = TaskContext::detached(TaskId::from("double"));
        let out = h(TaskArgs::new().with_arg(21), ctx).await.unwrap();
        assert_eq!(out, json!(42));
    }
}
