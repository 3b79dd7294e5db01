//! Daemon lifecycle for kon8-dash.
//!
//! Owns the miner session, refreshes it in the background and publishes
//! every fresh status on a watch channel until a shutdown signal arrives.
//!
//! A display or HTTP front end attaches through [`Daemon::subscribe`] and
//! [`Daemon::session`], and reads device settings through
//! [`Daemon::settings`]. [`crate::panel`], [`crate::climate`] and
//! [`crate::view`] hold the logic such a front end drives.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ::time::OffsetDateTime;
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::cgminer::{TcpTransport, Transport};
use crate::config::DashConfig;
use crate::device::DeviceSettings;
use crate::session::{MinerSession, SharedSession};
use crate::status::MinerStatus;
use crate::store::{JsonFileStore, Store};
use crate::tracing::prelude::*;
use crate::view;

pub struct Daemon {
    config: DashConfig,
    settings: DeviceSettings,
    config_mode: bool,
    session: SharedSession<TcpTransport>,
    status_tx: watch::Sender<MinerStatus>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    /// Open the settings file and restore the miner session.
    ///
    /// Consumes the force-AP flag left by a factory reset; see
    /// [`Daemon::config_mode`].
    pub fn new(config: DashConfig) -> anyhow::Result<Self> {
        let store = JsonFileStore::open(&config.store_path).with_context(|| {
            format!("opening settings file {}", config.store_path.display())
        })?;
        debug!(path = %store.path().display(), "Settings loaded");
        let store: Arc<dyn Store> = Arc::new(store);

        let settings = DeviceSettings::new(store.clone());
        let config_mode = settings.take_force_ap();
        if config_mode {
            info!("Configuration mode requested");
        }

        let transport = TcpTransport::new(config.command_timeout);
        let session = MinerSession::load(transport, store, config.miner_port);
        let (status_tx, _) = watch::channel(session.status());

        Ok(Self {
            config,
            settings,
            config_mode,
            session: session.into_shared(),
            status_tx,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// Whether this boot should serve the configuration access point.
    pub fn config_mode(&self) -> bool {
        self.config_mode
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    /// Session handle for issuing commands alongside the refresh loop.
    pub fn session(&self) -> SharedSession<TcpTransport> {
        self.session.clone()
    }

    /// Receive every status published by the refresh loop.
    pub fn subscribe(&self) -> watch::Receiver<MinerStatus> {
        self.status_tx.subscribe()
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run(self) -> anyhow::Result<()> {
        self.tracker.spawn(refresh_task(
            self.session.clone(),
            self.config.poll_interval,
            self.status_tx.clone(),
            self.shutdown.clone(),
        ));
        self.tracker.close();

        let (date, clock) =
            view::clock_strings(OffsetDateTime::now_utc(), self.settings.utc_offset());
        info!(
            store = %self.config.store_path.display(),
            poll_interval = ?self.config.poll_interval,
            config_mode = self.config_mode,
            local_time = %format_args!("{date} {clock}"),
            "Started."
        );

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            },
        }

        trace!("Shutting down.");
        self.shutdown.cancel();

        self.tracker.wait().await;
        info!("Exiting.");

        Ok(())
    }
}

/// Shortest accepted refresh period.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll the miner every `interval`, publishing each resulting status.
///
/// The first poll runs immediately. Intervals below [`MIN_POLL_INTERVAL`]
/// are raised to it. A failed poll still publishes, so
/// subscribers see the error and the cleared values.
pub async fn refresh_task<T>(
    session: SharedSession<T>,
    interval: Duration,
    status_tx: watch::Sender<MinerStatus>,
    shutdown: CancellationToken,
) where
    T: Transport + 'static,
{
    if interval < MIN_POLL_INTERVAL {
        warn!(?interval, "Poll interval too short, using {MIN_POLL_INTERVAL:?}");
    }
    let mut ticker = time::interval(interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Refresh task shutting down");
                break;
            }
            _ = ticker.tick() => {}
        }

        let status = {
            let mut session = session.lock().await;
            let outcome = session.poll().await;
            let status = session.status();
            match outcome {
                Ok(()) => debug!(
                    ip = %status.ip,
                    mode = %status.work_mode,
                    active = status.is_active,
                    "Miner refreshed"
                ),
                Err(e) => trace!(error = %e, "Refresh failed"),
            }
            status
        };

        let was_active = status_tx.borrow().is_active;
        if was_active != status.is_active {
            info!(active = status.is_active, "Miner activity changed");
        }
        status_tx.send_replace(status);
    }
}
