//! Process-wide manager accessor.
//!
//! Prefer passing an `Arc<TaskManager>` (or `Arc<dyn TaskQueueInterface>`)
//! explicitly. This accessor exists for call sites with no injection
//! point, such as framework callbacks with fixed signatures.

use crate::config::ManagerConfig;
use crate::context::SharedContext;
use crate::error::TaskResult;
use crate::manager::TaskManager;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

static GLOBAL: Mutex<Option<Arc<TaskManager>>> = parking_lot::const_mutex(None);

/// Returns the process-wide manager, creating and starting it with the
/// default configuration on first use.
///
/// A context passed to a later call is attached only if the existing
/// manager has none yet. Must be called from within a tokio runtime the
/// first time.
pub fn get_or_create(context: Option<SharedContext>) -> TaskResult<Arc<TaskManager>> {
    get_or_create_with(ManagerConfig::default(), context)
}

/// Like [`get_or_create`], with an explicit configuration for the first
/// construction. Ignored once the manager exists.
pub fn get_or_create_with(
    config: ManagerConfig,
    context: Option<SharedContext>,
) -> TaskResult<Arc<TaskManager>> {
    let mut slot = GLOBAL.lock();

    if let Some(manager) = slot.as_ref() {
        if let Some(context) = context {
            manager.attach_context(context);
        }
        return Ok(Arc::clone(manager));
    }

    let manager = Arc::new(match context {
        Some(context) => TaskManager::with_context(config, context),
        None => TaskManager::new(config),
    });
    manager.start()?;
    info!(manager_id = %manager.id(), "Global task manager created");

    *slot = Some(Arc::clone(&manager));
    Ok(manager)
}

/// The process-wide manager, if it has been created.
pub fn try_global() -> Option<Arc<TaskManager>> {
    GLOBAL.lock().clone()
}

/// Stops and forgets the process-wide manager.
///
/// A later [`get_or_create`] builds a fresh one.
pub async fn shutdown_global() {
    let manager = GLOBAL.lock().take();
    if let Some(manager) = manager {
        manager.stop().await;
    }
}
