//! Glue between an in-process store and an in-process hub.
//!
//! In production the backing service mirrors table changes into the
//! realtime stream itself. `MemoryStore` only emits [`StoreEvent`]s, so
//! loopback runs and integration tests pump them into a [`LocalHub`]
//! with this task.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use fichaje_realtime::LocalHub;
use fichaje_store::{MemoryStore, StoreEvent};

pub fn bridge_store_events(store: &MemoryStore, hub: Arc<LocalHub>) -> JoinHandle<()> {
    let mut events = store.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StoreEvent::MessageInserted(message)) => hub.publish_insert(message),
                Ok(StoreEvent::MessageUpdated(message)) => hub.publish_update(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Store event bridge lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
