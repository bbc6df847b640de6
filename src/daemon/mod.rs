//! Process-level plumbing: the shutdown token, the restart monitor and
//! the wiring of one machine's building blocks

pub mod monitor;
pub mod shutdown;

pub use monitor::{BlockFactory, BuildingBlock, Exit, Monitor};
pub use shutdown::Shutdown;

use crate::backend::{channel, Supervisor};
use crate::capability::Registry;
use crate::config::DaemonConfig;
use crate::delivery::Wrapper;
use std::sync::Arc;

/// Start a Supervisor + Wrapper pair for one machine.
///
/// Both ends of the queue are cloned into the factories, so a restarted
/// block reattaches to the same queue.
pub fn spawn_machine(
    monitor: &mut Monitor,
    config: DaemonConfig,
    registry: Arc<Registry>,
    shutdown: Shutdown,
) {
    let (tx, rx) = channel(config.runtime.channel_capacity);
    let name = config.name.clone();

    let supervisor_config = config.clone();
    let supervisor_shutdown = shutdown.clone();
    monitor.spawn(
        format!("{}/acquisition", name),
        Box::new(move || -> Box<dyn BuildingBlock> {
            Box::new(Supervisor::new(
                supervisor_config.clone(),
                registry.clone(),
                tx.clone(),
                supervisor_shutdown.clone(),
            ))
        }),
    );

    monitor.spawn(
        format!("{}/delivery", name),
        Box::new(move || -> Box<dyn BuildingBlock> {
            Box::new(Wrapper::from_config(&config, rx.clone(), shutdown.clone()))
        }),
    );
}
