//! Mission engine, proposal lifecycle, and feed broadcaster for PulZ.
//! The three pieces share one process-wide [`MissionStateHandle`]: the mission
//! loop and the stop path mutate it, every other reader (status route,
//! heartbeat, lifecycle gating) only ever sees a cloned snapshot.

pub mod broadcaster;
pub mod lifecycle;
pub mod mission;

pub use broadcaster::Broadcaster;
pub use lifecycle::{LifecycleError, MissionEngineHandle};
pub use mission::{MissionEngine, MissionStartError};

use std::sync::Arc;

use pulz_types::MissionState;
use tokio::sync::RwLock;

/// Shared, short-lived-lock handle onto the process-wide [`MissionState`]
/// singleton (`SPEC_FULL.md` §4.5). Cloning is cheap; every clone points at
/// the same underlying state.
#[derive(Clone, Default)]
pub struct MissionStateHandle {
    inner: Arc<RwLock<MissionState>>,
}

impl MissionStateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> MissionState {
        self.inner.read().await.clone()
    }

    pub async fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut MissionState),
    {
        let mut guard = self.inner.write().await;
        f(&mut guard);
    }
}
