//! ---
//! section: "01-core-functionality"
//! subsection: "module"
//! type: "source"
//! scope: "code"
//! description: "Service lifecycle, device state, and request handling."
//! version: "v0.1.0-sim"
//! owner: "tbd"
//! ---
//! Service context: everything the driver module kept in globals, owned by
//! one value and torn down in a fixed order.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};
use wifi_rssi_common::config::{ChannelConfig, DeviceConfig, TransportKind};
use wifi_rssi_common::time::{Clock, MonotonicClock};
use wifi_rssi_msg::types::Address;
use wifi_rssi_msg::{Channel, InMemoryChannel, MessagingMetricsExporter};
use wifi_rssi_rt::{Tasklet, TaskletSchedule, TaskletStats};

use crate::errors::ServiceError;
use crate::irq::RssiUpdate;
use crate::server::{MessageServer, ServerCounters, ServerStats};
use crate::state::{DeviceState, Reading};

/// Create the channel selected by `config`.
pub fn open_channel(config: &ChannelConfig) -> Result<Arc<dyn Channel>, ServiceError> {
    match config.transport {
        TransportKind::InMemory => Ok(Arc::new(InMemoryChannel::new(
            config.protocol,
            config.backlog,
        ))),
        #[cfg(unix)]
        TransportKind::UnixDatagram => {
            let channel =
                wifi_rssi_msg::UnixDatagramChannel::new(&config.socket_dir, config.protocol)
                    .map_err(ServiceError::Channel)?;
            Ok(Arc::new(channel))
        }
        #[cfg(not(unix))]
        TransportKind::UnixDatagram => Err(ServiceError::Channel(
            wifi_rssi_msg::MessagingError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix datagram channel requires a unix host",
            )),
        )),
    }
}

/// Service description; `start` turns it into a running [`ServiceHandle`].
pub struct WifiService {
    device: DeviceConfig,
    channel: Arc<dyn Channel>,
    clock: Option<Arc<dyn Clock>>,
    metrics: Option<MessagingMetricsExporter>,
}

impl WifiService {
    pub fn new(device: DeviceConfig, channel: Arc<dyn Channel>) -> Self {
        Self {
            device,
            channel,
            clock: None,
            metrics: None,
        }
    }

    /// Replace the tick clock; defaults to a [`MonotonicClock`] with the
    /// configured tick length.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_metrics(mut self, metrics: MessagingMetricsExporter) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Bind the service endpoint, arm the deferred update and start serving.
    ///
    /// Failing to bind is the only fatal start-up error; nothing has been
    /// spawned at that point and the device state is released on return.
    pub async fn start(self) -> Result<ServiceHandle, ServiceError> {
        let device = Arc::new(DeviceState::new(self.device.initial_rssi_dbm));
        let endpoint = self
            .channel
            .bind(Address::SERVICE)
            .map_err(ServiceError::Endpoint)?;
        let address = endpoint.local_address();

        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(MonotonicClock::new(self.device.tick)),
        };
        let work = Arc::new(RssiUpdate::from_config(&device, clock, &self.device));
        let schedule = match self.device.rearm_interval {
            Some(period) => TaskletSchedule::Periodic {
                delay: self.device.irq_delay,
                period,
            },
            None => TaskletSchedule::OneShot {
                delay: self.device.irq_delay,
            },
        };
        let tasklet = Tasklet::spawn(work, schedule);

        let mut server = MessageServer::new(endpoint, device.clone());
        if let Some(metrics) = self.metrics {
            server = server.with_metrics(metrics);
        }
        let counters = server.counters();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let server_task = tokio::spawn(server.serve(shutdown_rx));

        info!(
            protocol = self.channel.protocol(),
            channel = self.channel.name(),
            %address,
            initial_rssi_dbm = device.read(),
            ?schedule,
            "wifi rssi service started"
        );
        Ok(ServiceHandle {
            device,
            counters,
            tasklet,
            shutdown: shutdown_tx,
            server_task,
            address,
        })
    }
}

/// Final state reported by [`ServiceHandle::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub server: ServerStats,
    pub tasklet: TaskletStats,
    pub final_reading: Reading,
}

/// Running service.
pub struct ServiceHandle {
    device: Arc<DeviceState>,
    counters: Arc<ServerCounters>,
    tasklet: Tasklet,
    shutdown: broadcast::Sender<()>,
    server_task: JoinHandle<ServerStats>,
    address: Address,
}

impl ServiceHandle {
    pub fn device(&self) -> &Arc<DeviceState> {
        &self.device
    }

    pub fn local_address(&self) -> Address {
        self.address
    }

    pub fn stats(&self) -> ServerStats {
        self.counters.snapshot()
    }

    pub fn tasklet_stats(&self) -> TaskletStats {
        self.tasklet.stats()
    }

    /// Raise the simulated interrupt outside the configured schedule.
    pub fn raise_irq(&self) -> bool {
        self.tasklet.schedule()
    }

    /// Stop the service: the deferred update is cancelled and awaited
    /// first, then the server loop is stopped, which releases the endpoint,
    /// and only then is the device state dropped.
    pub async fn shutdown(self) -> ShutdownReport {
        let tasklet = self.tasklet.kill().await;

        let _ = self.shutdown.send(());
        let server = match self.server_task.await {
            Ok(stats) => stats,
            Err(err) => {
                error!(error = %err, "message server task join error");
                self.counters.snapshot()
            }
        };

        let final_reading = self.device.snapshot();
        drop(self.device);
        info!(
            replied = server.replied,
            updates = tasklet.runs,
            "wifi rssi service shutdown complete"
        );
        ShutdownReport {
            server,
            tasklet,
            final_reading,
        }
    }
}
