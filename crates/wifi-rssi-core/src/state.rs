//! ---
//! section: "01-core-functionality"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Service lifecycle, device state, and request handling."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};

use wifi_rssi_common::config::{RSSI_CEILING_DBM, RSSI_FLOOR_DBM};

/// One consistent observation of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub rssi_dbm: i32,
    /// Clock tick of the last update, truncated to 32 bits; 0 until the
    /// first update.
    pub updated_at_tick: u32,
}

impl Reading {
    fn pack(self) -> u64 {
        (u64::from(self.updated_at_tick) << 32) | u64::from(self.rssi_dbm as u32)
    }

    fn unpack(raw: u64) -> Self {
        Self {
            rssi_dbm: raw as u32 as i32,
            updated_at_tick: (raw >> 32) as u32,
        }
    }
}

/// Telemetry record shared by the request path and the deferred update.
///
/// Value and timestamp live in a single atomic word, so a reader sees either
/// the previous or the next reading and never a mix of both. Neither `read`
/// nor `update` blocks or allocates.
#[derive(Debug)]
pub struct DeviceState {
    reading: AtomicU64,
    updates: AtomicU64,
}

impl DeviceState {
    pub fn new(initial_rssi_dbm: i32) -> Self {
        let reading = Reading {
            rssi_dbm: clamp_rssi(initial_rssi_dbm),
            updated_at_tick: 0,
        };
        Self {
            reading: AtomicU64::new(reading.pack()),
            updates: AtomicU64::new(0),
        }
    }

    /// Current signal strength in dBm.
    pub fn read(&self) -> i32 {
        self.snapshot().rssi_dbm
    }

    pub fn snapshot(&self) -> Reading {
        Reading::unpack(self.reading.load(Ordering::Acquire))
    }

    /// Publish a new value and return what was stored after clamping to
    /// the plausible band.
    pub fn update(&self, rssi_dbm: i32, tick: u64) -> i32 {
        let reading = Reading {
            rssi_dbm: clamp_rssi(rssi_dbm),
            updated_at_tick: tick as u32,
        };
        self.reading.store(reading.pack(), Ordering::Release);
        self.updates.fetch_add(1, Ordering::Relaxed);
        reading.rssi_dbm
    }

    /// Number of updates applied since creation.
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

fn clamp_rssi(rssi_dbm: i32) -> i32 {
    rssi_dbm.clamp(RSSI_FLOOR_DBM, RSSI_CEILING_DBM)
}
