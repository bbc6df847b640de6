//! Supervision of building-block threads
//!
//! Each block runs on its own OS thread. When a block exits without
//! shutdown having been requested (an error or a panic), the monitor builds
//! a fresh instance from the block's factory and starts it again. Blocks
//! that exit after shutdown are left alone.

use super::Shutdown;
use std::thread::JoinHandle;
use std::time::Duration;

/// How a building block finished
#[derive(Debug, Clone, PartialEq)]
pub enum Exit {
    /// Drained after shutdown was requested
    Graceful,
    /// Stopped on its own; the reason is logged
    Unplanned(String),
}

/// A long-running unit of the daemon (acquisition or delivery)
pub trait BuildingBlock: Send {
    fn name(&self) -> &str;

    /// Run to completion on the current thread
    fn run(self: Box<Self>) -> Exit;
}

pub type BlockFactory = Box<dyn Fn() -> Box<dyn BuildingBlock> + Send>;

struct Slot {
    name: String,
    factory: BlockFactory,
    handle: Option<JoinHandle<Exit>>,
    restarts: usize,
}

impl Slot {
    fn start(&mut self) {
        let block = (self.factory)();
        let thread_name = format!("bb-{}", block.name());
        let spawned = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || block.run());
        match spawned {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => tracing::error!("Failed to spawn '{}': {}", self.name, e),
        }
    }

    fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    fn join(&mut self) -> Exit {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(exit)) => exit,
            Some(Err(_)) => Exit::Unplanned("thread panicked".to_string()),
            None => Exit::Unplanned("thread never started".to_string()),
        }
    }
}

pub struct Monitor {
    shutdown: Shutdown,
    slots: Vec<Slot>,
    poll_interval: Duration,
    restart_delay: Duration,
}

impl Monitor {
    pub fn new(shutdown: Shutdown) -> Self {
        Self {
            shutdown,
            slots: Vec::new(),
            poll_interval: Duration::from_millis(200),
            restart_delay: Duration::from_secs(1),
        }
    }

    /// Pause between an unplanned exit and the restart
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Register and start a block
    pub fn spawn(&mut self, name: impl Into<String>, factory: BlockFactory) {
        let mut slot = Slot {
            name: name.into(),
            factory,
            handle: None,
            restarts: 0,
        };
        tracing::info!("Starting '{}'", slot.name);
        slot.start();
        self.slots.push(slot);
    }

    /// Supervise until every block has exited for good.
    ///
    /// Returns the number of restarts per block, in registration order.
    pub fn run(mut self) -> Vec<(String, usize)> {
        // slots whose thread never spawned have nothing to wait for
        let mut active = self.slots.iter().filter(|s| s.handle.is_some()).count();
        while active > 0 {
            std::thread::sleep(self.poll_interval);

            for slot in &mut self.slots {
                if slot.handle.is_none() || !slot.is_finished() {
                    continue;
                }
                match slot.join() {
                    Exit::Graceful => {
                        tracing::info!("'{}' stopped", slot.name);
                        active -= 1;
                    }
                    Exit::Unplanned(reason) if self.shutdown.is_triggered() => {
                        tracing::warn!("'{}' exited during shutdown: {}", slot.name, reason);
                        active -= 1;
                    }
                    Exit::Unplanned(reason) => {
                        tracing::error!("'{}' exited unexpectedly: {}; restarting", slot.name, reason);
                        std::thread::sleep(self.restart_delay);
                        slot.restarts += 1;
                        slot.start();
                        if slot.handle.is_none() {
                            active -= 1;
                        }
                    }
                }
            }
        }

        self.slots
            .into_iter()
            .map(|slot| (slot.name, slot.restarts))
            .collect()
    }
}
