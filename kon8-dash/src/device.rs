//! Device-level settings around the miner session.
//!
//! Besides the miner (namespace `miner`), the controller persists its WiFi
//! credentials (`wifi`), the clock's UTC offset (`timecfg`) and a flag that
//! forces the configuration access point on next boot (`sys`). The daemon
//! consumes that flag at startup; the WiFi setters back the configuration
//! portal.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::cgminer::Transport;
use crate::session::MinerSession;
use crate::store::Store;
use crate::tracing::prelude::*;

const NS_WIFI: &str = "wifi";
const NS_TIME: &str = "timecfg";
const NS_SYS: &str = "sys";

const DEFAULT_UTC_OFFSET: i8 = 1;
const MAX_UTC_OFFSET: i8 = 12;

/// Lead time given to soft-off/soft-on so the miner receives the command
/// before it is due.
const SOFT_SWITCH_DELAY_SECS: u64 = 5;

/// Credentials of the network to join at boot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
}

pub struct DeviceSettings {
    store: Arc<dyn Store>,
}

impl DeviceSettings {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Clock offset from UTC in whole hours, within -12..=12.
    pub fn utc_offset(&self) -> i8 {
        let raw = self
            .store
            .load_i32(NS_TIME, "utcOffset", i32::from(DEFAULT_UTC_OFFSET));
        clamp_offset(raw)
    }

    /// Persist a new offset, clamped to -12..=12. Returns the stored value.
    pub fn set_utc_offset(&self, hours: i32) -> i8 {
        let offset = clamp_offset(hours);
        info!(offset, "UTC offset set");
        self.store.save_i32(NS_TIME, "utcOffset", i32::from(offset));
        offset
    }

    /// Saved WiFi network, if any.
    pub fn wifi_credentials(&self) -> Option<WifiCredentials> {
        let ssid = self.store.load_string(NS_WIFI, "ssid", "");
        if ssid.is_empty() {
            return None;
        }
        Some(WifiCredentials {
            ssid,
            password: self.store.load_string(NS_WIFI, "pass", ""),
        })
    }

    /// Save WiFi credentials. An empty SSID is refused.
    pub fn save_wifi(&self, credentials: &WifiCredentials) -> bool {
        if credentials.ssid.is_empty() {
            warn!("Refusing to save WiFi settings without SSID");
            return false;
        }
        self.store.save_string(NS_WIFI, "ssid", &credentials.ssid);
        self.store.save_string(NS_WIFI, "pass", &credentials.password);
        true
    }

    pub fn forget_wifi(&self) {
        self.store.clear(NS_WIFI);
    }

    /// Read and consume the force-AP flag.
    ///
    /// Consuming it keeps the controller from being stuck in configuration
    /// mode on every boot.
    pub fn take_force_ap(&self) -> bool {
        let force = self.store.load_bool(NS_SYS, "forceAP", false);
        if force {
            self.store.save_bool(NS_SYS, "forceAP", false);
        }
        force
    }

    /// Wipe WiFi, clock and miner settings, then request configuration
    /// mode on next boot.
    pub fn factory_reset<T: Transport>(&self, session: &mut MinerSession<T>) {
        self.store.clear(NS_WIFI);
        self.store.clear(NS_TIME);
        session.factory_reset();
        self.store.save_bool(NS_SYS, "forceAP", true);
        warn!("Factory reset done");
    }
}

fn clamp_offset(hours: i32) -> i8 {
    let max = i32::from(MAX_UTC_OFFSET);
    // Clamped into i8 range, so the conversion cannot fail.
    i8::try_from(hours.clamp(-max, max)).unwrap_or(DEFAULT_UTC_OFFSET)
}

/// Unix time at which a soft-off/soft-on issued `now` should take effect.
pub fn command_timestamp(now: OffsetDateTime) -> u64 {
    u64::try_from(now.unix_timestamp()).unwrap_or(0) + SOFT_SWITCH_DELAY_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgminer::transport::MockTransport;
    use crate::store::MemoryStore;
    use test_case::test_case;
    use time::macros::datetime;

    fn settings() -> (Arc<MemoryStore>, DeviceSettings) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), DeviceSettings::new(store))
    }

    #[test]
    fn should_default_utc_offset_to_plus_one() {
        let (_, settings) = settings();
        assert_eq!(settings.utc_offset(), 1);
    }

    #[test_case(-5, -5)]
    #[test_case(12, 12)]
    #[test_case(14, 12; "clamped high")]
    #[test_case(-40, -12; "clamped low")]
    fn should_clamp_utc_offset(requested: i32, stored: i8) {
        let (store, settings) = settings();
        assert_eq!(settings.set_utc_offset(requested), stored);
        assert_eq!(settings.utc_offset(), stored);
        assert_eq!(store.load_i32(NS_TIME, "utcOffset", 0), i32::from(stored));
    }

    #[test]
    fn should_clamp_stored_utc_offset() {
        let (store, settings) = settings();
        store.save_i32(NS_TIME, "utcOffset", 99);
        assert_eq!(settings.utc_offset(), 12);
    }

    #[test]
    fn should_save_and_forget_wifi() {
        let (_, settings) = settings();
        assert_eq!(settings.wifi_credentials(), None);

        let creds = WifiCredentials {
            ssid: "workshop".into(),
            password: "hunter22".into(),
        };
        assert!(settings.save_wifi(&creds));
        assert_eq!(settings.wifi_credentials(), Some(creds));

        settings.forget_wifi();
        assert_eq!(settings.wifi_credentials(), None);
    }

    #[test]
    fn should_require_ssid_for_wifi() {
        let (_, settings) = settings();
        let creds = WifiCredentials {
            ssid: String::new(),
            password: "hunter22".into(),
        };
        assert!(!settings.save_wifi(&creds));
        assert_eq!(settings.wifi_credentials(), None);
    }

    #[test]
    fn should_consume_force_ap() {
        let (store, settings) = settings();
        assert!(!settings.take_force_ap());

        store.save_bool(NS_SYS, "forceAP", true);
        assert!(settings.take_force_ap());
        assert!(!settings.take_force_ap());
    }

    #[test]
    fn should_wipe_everything_and_force_ap() {
        let (store, settings) = settings();
        store.save_string("miner", "ip", "192.168.1.50");
        store.save_string("miner", "mode", "eco");
        store.save_string(NS_WIFI, "ssid", "workshop");
        store.save_i32(NS_TIME, "utcOffset", -3);
        let mut session = MinerSession::load(MockTransport::new(), store.clone(), 4028);

        settings.factory_reset(&mut session);

        assert_eq!(session.ip(), "");
        assert_eq!(store.load_string("miner", "ip", ""), "");
        assert_eq!(settings.wifi_credentials(), None);
        assert_eq!(settings.utc_offset(), 1);
        assert!(settings.take_force_ap());
    }

    #[test]
    fn should_put_command_timestamp_five_seconds_ahead() {
        let now = datetime!(2024-06-10 06:13:20 UTC);
        assert_eq!(command_timestamp(now), 1718000005);
    }
}
