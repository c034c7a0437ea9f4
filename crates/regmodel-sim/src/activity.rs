//! Activity simulator task
//!
//! Perturbs a device model on a fixed interval, independent of connection
//! traffic. Each tick locks the shared device once, lets the model advance,
//! and forwards any raised interrupt ids over a channel once the lock has
//! been released. The task uses a select! loop to:
//! - Tick the device on the interval timer
//! - Handle pause and shutdown commands from a channel

use std::time::Duration;

use fastrand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::model::{lock_device, SharedDevice};

/// Commands that can be sent to a running activity task
#[derive(Debug, Clone)]
pub enum ActivityCommand {
    /// Suspend or resume ticking
    SetPaused(bool),
    /// Stop the task
    Shutdown,
}

/// Default tick interval in milliseconds
const TICK_INTERVAL_MS: u64 = 500;

/// Default delay before the first tick in milliseconds
const STARTUP_DELAY_MS: u64 = 2000;

/// Activity simulator timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Time between ticks
    pub tick_interval_ms: u64,
    /// Time before the first tick
    pub startup_delay_ms: u64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: TICK_INTERVAL_MS,
            startup_delay_ms: STARTUP_DELAY_MS,
            seed: None,
        }
    }
}

/// Run the activity simulator for one device
///
/// Interrupt ids raised by the model are sent on `irq_tx`; ids that do not
/// fit in the channel are dropped with a warning. The task ends on
/// [`ActivityCommand::Shutdown`], when the command channel closes, or when
/// the interrupt receiver is dropped.
pub async fn run_activity_task(
    device: SharedDevice,
    config: ActivityConfig,
    irq_tx: mpsc::Sender<u32>,
    mut cmd_rx: mpsc::Receiver<ActivityCommand>,
) {
    let mut rng = match config.seed {
        Some(seed) => Rng::with_seed(seed),
        None => Rng::new(),
    };

    let period = Duration::from_millis(config.tick_interval_ms.max(1));
    let start = Instant::now() + Duration::from_millis(config.startup_delay_ms);
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut paused = false;

    let name = {
        let dev = lock_device(&device);
        format!("{} {}", dev.kind(), dev.device_id())
    };
    info!("Starting activity simulator for {}", name);

    loop {
        tokio::select! {
            _ = ticker.tick(), if !paused => {
                let raised = lock_device(&device).tick(&mut rng);
                for interrupt_id in raised {
                    debug!("Activity on {} raised interrupt {}", name, interrupt_id);
                    match irq_tx.try_send(interrupt_id) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            warn!("Interrupt queue full, dropping interrupt {} from {}", interrupt_id, name);
                        }
                        Err(TrySendError::Closed(_)) => {
                            warn!("Interrupt receiver closed for {}", name);
                            return;
                        }
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ActivityCommand::SetPaused(value)) => {
                        info!("Activity simulator for {} paused={}", name, value);
                        paused = value;
                        if !paused {
                            ticker.reset();
                        }
                    }
                    Some(ActivityCommand::Shutdown) => {
                        info!("Shutdown requested for activity simulator {}", name);
                        break;
                    }
                    None => {
                        debug!("Command channel closed for activity simulator {}", name);
                        break;
                    }
                }
            }
        }
    }

    info!("Activity simulator ended for {}", name);
}
