use anyhow::Result;
use reconcile::Reconciler;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info};

use events::EngineEvent;

pub mod elapsed;
pub mod events;
pub mod reconcile;
pub mod status;

/// Single consumer of [EngineEvent]s. Owns the [Reconciler] so nothing else can mutate engine
/// state; runs until every producer dropped its sender.
pub struct EngineModule {
    receiver: Receiver<EngineEvent>,
    reconciler: Reconciler,
}

impl EngineModule {
    pub fn new(receiver: Receiver<EngineEvent>, reconciler: Reconciler) -> Self {
        Self {
            receiver,
            reconciler,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        while let Some(event) = self.receiver.recv().await {
            debug!("Handling event {:?}", event);
            self.reconciler.handle(event).await;
        }

        self.receiver.close();
        info!("Event queue closed, final state {:?}", self.reconciler.state());
        Ok(())
    }
}
