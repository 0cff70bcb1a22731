//! ---
//! section: "01-core-functionality"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Service lifecycle, device state, and request handling."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
//! Simulated radio interrupt: recompute the RSSI from the tick clock.
use std::sync::{Arc, Weak};

use tracing::{debug, trace};
use wifi_rssi_common::config::DeviceConfig;
use wifi_rssi_common::time::Clock;
use wifi_rssi_rt::DeferredWork;

use crate::state::DeviceState;

/// Deferred work writing `base + (ticks mod window)` into the device state.
///
/// Holds the state weakly: once the service has released it, a run is a
/// no-op instead of touching freed telemetry.
pub struct RssiUpdate {
    device: Weak<DeviceState>,
    clock: Arc<dyn Clock>,
    base_dbm: i32,
    window: u32,
}

impl RssiUpdate {
    pub fn new(
        device: &Arc<DeviceState>,
        clock: Arc<dyn Clock>,
        base_dbm: i32,
        window: u32,
    ) -> Self {
        Self {
            device: Arc::downgrade(device),
            clock,
            base_dbm,
            window: window.max(1),
        }
    }

    pub fn from_config(
        device: &Arc<DeviceState>,
        clock: Arc<dyn Clock>,
        config: &DeviceConfig,
    ) -> Self {
        Self::new(device, clock, config.irq_base_dbm, config.irq_window)
    }

    /// Value a run at `ticks` would write.
    pub fn value_at(&self, ticks: u64) -> i32 {
        let offset = (ticks % u64::from(self.window)) as i64;
        (i64::from(self.base_dbm) + offset) as i32
    }
}

impl DeferredWork for RssiUpdate {
    fn run(&self) {
        let Some(device) = self.device.upgrade() else {
            trace!("device state released, skipping update");
            return;
        };
        let ticks = self.clock.ticks();
        let stored = device.update(self.value_at(ticks), ticks);
        debug!(rssi_dbm = stored, ticks, "simulated interrupt updated RSSI");
    }

    fn name(&self) -> &'static str {
        "rssi_update"
    }
}
