//! Miner session: poll cycle and control commands.
//!
//! The session remembers the miner address and work mode across restarts
//! (namespace `miner` of the [`Store`]), and keeps the status gathered by
//! the last poll. Operations are strictly sequential; share a session
//! between tasks through [`SharedSession`].
//!
//! A poll sends `version`, `summary`, `stats` and `estats` in that order.
//! The first three must answer or the cycle stops at the silent step;
//! `estats` is optional and only refreshes work mode, power and work state.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::cgminer::{Command, MinerError, MinerResult, Step, Transport, parser};
use crate::status::{MinerStatus, SummaryInfo, VersionInfo, WorkMode};
use crate::store::Store;
use crate::tracing::prelude::*;

const NAMESPACE: &str = "miner";
const KEY_IP: &str = "ip";
const KEY_MODE: &str = "mode";

/// Session shared between the refresh loop and command callers.
pub type SharedSession<T> = Arc<Mutex<MinerSession<T>>>;

pub struct MinerSession<T> {
    transport: T,
    store: Arc<dyn Store>,
    port: u16,

    ip: String,
    mode: WorkMode,
    power: Option<String>,
    last_error: Option<String>,
    version: VersionInfo,
    summary: SummaryInfo,
    work_state: String,
    is_active: bool,
}

impl<T: Transport> MinerSession<T> {
    /// Create a session, restoring IP and mode from `store`.
    pub fn load(transport: T, store: Arc<dyn Store>, port: u16) -> Self {
        let ip = store.load_string(NAMESPACE, KEY_IP, "");
        let mode: WorkMode = store
            .load_string(NAMESPACE, KEY_MODE, "")
            .parse()
            .unwrap_or_default();

        debug!(ip = %ip, mode = %mode, "Loaded miner settings");

        Self {
            transport,
            store,
            port,
            ip,
            mode,
            power: None,
            last_error: None,
            version: VersionInfo::default(),
            summary: SummaryInfo::default(),
            work_state: String::new(),
            is_active: false,
        }
    }

    /// Wrap the session for sharing between tasks.
    pub fn into_shared(self) -> SharedSession<T> {
        Arc::new(Mutex::new(self))
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Set and persist the miner address.
    pub fn set_ip(&mut self, ip: &str) {
        let ip = ip.trim();
        info!(ip, "Miner address set");
        self.ip = ip.to_string();
        self.store.save_string(NAMESPACE, KEY_IP, ip);
    }

    /// Snapshot of the current state.
    pub fn status(&self) -> MinerStatus {
        MinerStatus {
            ip: self.ip.clone(),
            version: self.version.clone(),
            summary: self.summary.clone(),
            work_mode: self.mode,
            power: self.power.clone(),
            last_error: self.last_error.clone(),
            work_state: self.work_state.clone(),
            is_active: self.is_active,
        }
    }

    /// Query the miner and refresh the status.
    ///
    /// Version, summary, work state and activity are reset first, so a
    /// failed cycle leaves empty values for every step it did not reach.
    /// Mode and power keep their last known values unless `estats`
    /// answers.
    pub async fn poll(&mut self) -> MinerResult<()> {
        self.last_error = None;
        self.version = VersionInfo::default();
        self.summary = SummaryInfo::default();
        self.work_state.clear();
        self.is_active = false;

        if self.ip.is_empty() {
            return Err(self.fail(MinerError::NotConfigured));
        }

        debug!(ip = %self.ip, "Polling miner");

        let reply = self.query(Command::Version, Step::Version).await?;
        self.version = parser::parse_version(&reply);

        let reply = self.query(Command::Summary, Step::Summary).await?;
        self.summary = parser::parse_summary(&reply);

        // Only proves the miner is alive; the body is not used.
        self.query(Command::Stats, Step::Stats).await?;

        let reply = self.send(Command::Estats).await;
        if reply.is_empty() {
            debug!(ip = %self.ip, "No estats reply, keeping mode and power");
        } else {
            self.apply_estats(&reply);
        }

        Ok(())
    }

    /// Switch the miner to `mode` (`eco`, `standard`/`normal`, `super`).
    ///
    /// Returns the raw reply. On success the mode is persisted.
    pub async fn set_mode(&mut self, mode: &str) -> MinerResult<String> {
        self.last_error = None;
        if self.ip.is_empty() {
            return Err(self.fail(MinerError::NotConfigured));
        }

        let Some((requested, index)) =
            WorkMode::from_request(mode).and_then(|m| m.index().map(|i| (m, i)))
        else {
            return Err(self.fail(MinerError::UnknownMode(mode.to_string())));
        };

        let reply = self.command(Command::SetWorkMode(index)).await?;

        info!(ip = %self.ip, mode = %requested, "Work mode changed");
        self.mode = requested;
        self.store
            .save_string(NAMESPACE, KEY_MODE, &requested.to_string());

        Ok(reply)
    }

    /// Schedule the miner to go idle at Unix time `at`.
    pub async fn set_standby(&mut self, at: u64) -> MinerResult<String> {
        self.soft_switch(Command::SoftOff(at)).await
    }

    /// Schedule the miner to resume hashing at Unix time `at`.
    pub async fn set_wakeup(&mut self, at: u64) -> MinerResult<String> {
        self.soft_switch(Command::SoftOn(at)).await
    }

    /// Forget the miner: clear persisted settings and in-memory state.
    pub fn factory_reset(&mut self) {
        self.store.clear(NAMESPACE);

        self.ip.clear();
        self.mode = WorkMode::Unknown;
        self.power = None;
        self.last_error = None;
        self.version = VersionInfo::default();
        self.summary = SummaryInfo::default();
        self.work_state.clear();
        self.is_active = false;

        info!("Miner settings cleared");
    }

    async fn soft_switch(&mut self, command: Command) -> MinerResult<String> {
        self.last_error = None;
        if self.ip.is_empty() {
            return Err(self.fail(MinerError::NotConfigured));
        }

        let reply = self.command(command).await?;
        info!(ip = %self.ip, command = %command, "Soft switch scheduled");
        Ok(reply)
    }

    fn apply_estats(&mut self, reply: &str) {
        let estats = parser::parse_estats(reply);

        if let Some(mode) = estats.work_mode {
            self.mode = mode;
        }
        self.power = Some(estats.power).filter(|p| !p.is_empty());

        if !estats.work_state.is_empty() {
            // Anything else leaves is_active at its reset value.
            if estats.work_state.contains("In Work") {
                self.is_active = true;
            } else if estats.work_state.contains("In Idle") {
                self.is_active = false;
            }
            self.work_state = estats.work_state;
        }

        trace!(
            mode = %self.mode,
            power = ?self.power,
            work_state = %self.work_state,
            "Applied estats"
        );
    }

    /// Send a poll query, failing with `step` on silence.
    async fn query(&mut self, command: Command, step: Step) -> MinerResult<String> {
        let reply = self.send(command).await;
        if command.accepted(&reply) {
            Ok(reply)
        } else {
            Err(self.fail(MinerError::NoResponse(step)))
        }
    }

    /// Send a control command, failing with the raw reply when rejected.
    async fn command(&mut self, command: Command) -> MinerResult<String> {
        let reply = self.send(command).await;
        if command.accepted(&reply) {
            Ok(reply)
        } else {
            Err(self.fail(MinerError::Rejected(reply)))
        }
    }

    async fn send(&self, command: Command) -> String {
        self.transport
            .send(&self.ip, self.port, &command.to_string())
            .await
    }

    /// Record `err` as the last error and hand it back.
    fn fail(&mut self, err: MinerError) -> MinerError {
        warn!(ip = %self.ip, error = %err, "Miner operation failed");
        self.last_error = Some(err.to_string());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgminer::transport::MockTransport;
    use crate::store::MemoryStore;

    const IP: &str = "192.168.1.50";

    const VERSION: &str = "STATUS=S,Msg=CGMiner versions|VERSION,CGMiner=4.11.1,API=3.7,\
        PROD=Avalon Nano3s,MODEL=Nano3s,MAC=e0e1a9c4d7b2|";
    const SUMMARY: &str = "STATUS=S,Msg=Summary|SUMMARY,Elapsed=93784,MHS av=6012345.67,\
        Accepted=4821,Rejected=7,Hardware Errors=2,MHS 5s=5998765.43|";
    const STATS: &str = "STATUS=S,Msg=CGMiner stats|STATS=0,ID=AVA100|";
    const ESTATS_WORKING: &str = "STATUS=S|STATS=0,MM ID0=Ver[Nano3s] \
        SYSTEMSTATU[Work: In Work, Hash Board: 1] WORKMODE[2] PS[0 1209 2349 55 1306 2350 1364]|";
    const ESTATS_IDLE: &str = "STATUS=S|STATS=0,MM ID0=SYSTEMSTATU[Work: In Idle] WORKMODE[0] PS[7]|";

    fn store_with_ip() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.save_string(NAMESPACE, KEY_IP, IP);
        store
    }

    fn session(transport: MockTransport, store: Arc<MemoryStore>) -> MinerSession<MockTransport> {
        MinerSession::load(transport, store, 4028)
    }

    fn healthy_miner() -> MockTransport {
        MockTransport::new()
            .reply("version", VERSION)
            .reply("summary", SUMMARY)
            .reply("stats", STATS)
            .reply("estats", ESTATS_WORKING)
    }

    #[test]
    fn should_restore_ip_and_mode_on_load() {
        let store = store_with_ip();
        store.save_string(NAMESPACE, KEY_MODE, "super");

        let session = session(MockTransport::new(), store);

        assert_eq!(session.ip(), IP);
        assert_eq!(session.status().work_mode, WorkMode::Super);
    }

    #[test]
    fn should_ignore_unparseable_mode_on_load() {
        let store = store_with_ip();
        store.save_string(NAMESPACE, KEY_MODE, "turbo");

        let session = session(MockTransport::new(), store);
        assert_eq!(session.status().work_mode, WorkMode::Unknown);
    }

    #[test]
    fn should_trim_and_persist_ip() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session(MockTransport::new(), store.clone());

        session.set_ip("  10.0.0.7 \n");

        assert_eq!(session.ip(), "10.0.0.7");
        assert_eq!(store.load_string(NAMESPACE, KEY_IP, ""), "10.0.0.7");
    }

    #[tokio::test]
    async fn should_not_poll_without_ip() {
        let mut session = session(healthy_miner(), Arc::new(MemoryStore::new()));

        let result = session.poll().await;

        assert_eq!(result, Err(MinerError::NotConfigured));
        assert!(session.transport.sent().is_empty());
        assert_eq!(
            session.status().last_error.as_deref(),
            Some("IP not configured")
        );
    }

    #[tokio::test]
    async fn should_poll_full_cycle() {
        let mut session = session(healthy_miner(), store_with_ip());

        session.poll().await.unwrap();

        assert_eq!(
            session.transport.sent(),
            vec!["version", "summary", "stats", "estats"]
        );
        let status = session.status();
        assert_eq!(status.ip, IP);
        assert_eq!(status.version.prod, "Avalon Nano3s");
        assert_eq!(status.version.mac, "e0e1a9c4d7b2");
        assert_eq!(status.summary.mhs_av, "6012345.67");
        assert_eq!(status.summary.hw_errors, "2");
        assert_eq!(status.work_mode, WorkMode::Super);
        assert_eq!(status.power.as_deref(), Some("1364"));
        assert_eq!(status.work_state, "In Work");
        assert!(status.is_active);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn should_stop_poll_when_version_is_silent() {
        let transport = MockTransport::new()
            .reply("summary", SUMMARY)
            .reply("stats", STATS)
            .reply("estats", ESTATS_WORKING);
        let mut session = session(transport, store_with_ip());

        let result = session.poll().await;

        assert_eq!(result, Err(MinerError::NoResponse(Step::Version)));
        assert_eq!(session.transport.sent(), vec!["version"]);
        assert_eq!(
            session.status().last_error.as_deref(),
            Some("no response (version)")
        );
    }

    #[tokio::test]
    async fn should_stop_poll_when_summary_is_silent() {
        let transport = MockTransport::new()
            .reply("version", VERSION)
            .reply("stats", STATS);
        let mut session = session(transport, store_with_ip());

        let result = session.poll().await;

        assert_eq!(result, Err(MinerError::NoResponse(Step::Summary)));
        assert_eq!(session.transport.sent(), vec!["version", "summary"]);
        let status = session.status();
        assert_eq!(status.version.model, "Nano3s");
        assert_eq!(status.summary, SummaryInfo::default());
    }

    #[tokio::test]
    async fn should_stop_poll_when_stats_is_silent() {
        let transport = MockTransport::new()
            .reply("version", VERSION)
            .reply("summary", SUMMARY)
            .reply("estats", ESTATS_WORKING);
        let mut session = session(transport, store_with_ip());

        let result = session.poll().await;

        assert_eq!(result, Err(MinerError::NoResponse(Step::Stats)));
        assert_eq!(session.transport.sent(), vec!["version", "summary", "stats"]);
        assert!(!session.status().is_active);
    }

    #[tokio::test]
    async fn should_tolerate_missing_estats() {
        let store = store_with_ip();
        store.save_string(NAMESPACE, KEY_MODE, "eco");
        let transport = MockTransport::new()
            .reply("version", VERSION)
            .reply("summary", SUMMARY)
            .reply("stats", STATS);
        let mut session = session(transport, store);

        session.poll().await.unwrap();

        let status = session.status();
        assert_eq!(status.work_mode, WorkMode::Eco);
        assert_eq!(status.power, None);
        assert_eq!(status.work_state, "");
        assert!(!status.is_active);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn should_reset_previous_values_on_failed_poll() {
        let mut session = session(healthy_miner(), store_with_ip());
        session.poll().await.unwrap();

        // Miner goes away.
        session.transport = MockTransport::new();
        let result = session.poll().await;

        assert!(result.is_err());
        let status = session.status();
        assert_eq!(status.version, VersionInfo::default());
        assert_eq!(status.summary, SummaryInfo::default());
        assert_eq!(status.work_state, "");
        assert!(!status.is_active);
        // Not reset by a poll.
        assert_eq!(status.work_mode, WorkMode::Super);
        assert_eq!(status.power.as_deref(), Some("1364"));
    }

    #[tokio::test]
    async fn should_read_idle_state() {
        let transport = MockTransport::new()
            .reply("version", VERSION)
            .reply("summary", SUMMARY)
            .reply("stats", STATS)
            .reply("estats", ESTATS_IDLE);
        let mut session = session(transport, store_with_ip());

        session.poll().await.unwrap();

        let status = session.status();
        assert_eq!(status.work_mode, WorkMode::Eco);
        assert_eq!(status.power.as_deref(), Some("7"));
        assert_eq!(status.work_state, "In Idle");
        assert!(!status.is_active);
    }

    #[tokio::test]
    async fn should_treat_unrecognised_work_state_as_inactive() {
        let transport = healthy_miner().reply(
            "estats",
            "STATUS=S|MM ID0=SYSTEMSTATU[Work: Booting, Hash Board: 1] WORKMODE[9]|",
        );
        let store = store_with_ip();
        store.save_string(NAMESPACE, KEY_MODE, "standard");
        let mut session = session(transport, store);

        session.poll().await.unwrap();

        let status = session.status();
        assert_eq!(status.work_state, "Booting");
        assert!(!status.is_active);
        // Index 9 is not a mode; the previous one stays.
        assert_eq!(status.work_mode, WorkMode::Standard);
        assert_eq!(status.power, None);
    }

    #[tokio::test]
    async fn should_persist_mode_on_success() {
        let transport = MockTransport::new().reply(
            "ascset|0,workmode,set,0",
            "STATUS=S,When=1718000000,Code=119,Msg=ASC 0 set OK|",
        );
        let store = store_with_ip();
        let mut session = session(transport, store.clone());

        let reply = session.set_mode("eco").await.unwrap();

        assert!(reply.contains("STATUS=S"));
        assert_eq!(session.transport.sent(), vec!["ascset|0,workmode,set,0"]);
        assert_eq!(session.status().work_mode, WorkMode::Eco);
        assert_eq!(store.load_string(NAMESPACE, KEY_MODE, ""), "eco");
    }

    #[tokio::test]
    async fn should_store_normal_as_standard() {
        let transport =
            MockTransport::new().reply("ascset|0,workmode,set,1", "STATUS=S,Msg=ASC 0 set OK|");
        let store = store_with_ip();
        let mut session = session(transport, store.clone());

        session.set_mode("normal").await.unwrap();

        assert_eq!(session.status().work_mode, WorkMode::Standard);
        assert_eq!(store.load_string(NAMESPACE, KEY_MODE, ""), "standard");
    }

    #[tokio::test]
    async fn should_keep_persisted_mode_on_rejection() {
        let rejection = "STATUS=E,When=1718000000,Code=120,Msg=ASC 0 set failed|";
        let transport = MockTransport::new().reply("ascset|0,workmode,set,2", rejection);
        let store = store_with_ip();
        store.save_string(NAMESPACE, KEY_MODE, "eco");
        let mut session = session(transport, store.clone());

        let result = session.set_mode("super").await;

        assert_eq!(result, Err(MinerError::Rejected(rejection.to_string())));
        assert_eq!(store.load_string(NAMESPACE, KEY_MODE, ""), "eco");
        assert_eq!(session.status().work_mode, WorkMode::Eco);
        assert_eq!(
            session.status().last_error,
            Some(format!("miner response: {rejection}"))
        );
    }

    #[tokio::test]
    async fn should_not_send_unknown_mode() {
        let mut session = session(MockTransport::new(), store_with_ip());

        let result = session.set_mode("turbo").await;

        assert_eq!(result, Err(MinerError::UnknownMode("turbo".into())));
        assert!(session.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn should_refuse_mode_without_ip() {
        let mut session = session(MockTransport::new(), Arc::new(MemoryStore::new()));
        assert_eq!(
            session.set_mode("eco").await,
            Err(MinerError::NotConfigured)
        );
        assert!(session.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn should_require_both_markers_for_standby() {
        let transport = MockTransport::new().reply(
            "ascset|0,softoff,1:1718000005",
            "STATUS=I,When=1718000000,Code=118,Msg=ASC 0 set info|",
        );
        let mut session = session(transport, store_with_ip());

        let result = session.set_standby(1718000005).await;

        assert!(matches!(result, Err(MinerError::Rejected(_))));
    }

    #[tokio::test]
    async fn should_schedule_standby() {
        let transport = MockTransport::new().reply(
            "ascset|0,softoff,1:1718000005",
            "STATUS=I,When=1718000000,Code=118,Msg=ASC 0 set info: success softoff:1718000005|",
        );
        let mut session = session(transport, store_with_ip());

        assert!(session.set_standby(1718000005).await.is_ok());
        assert_eq!(session.status().last_error, None);
    }

    #[tokio::test]
    async fn should_schedule_wakeup() {
        let transport = MockTransport::new().reply(
            "ascset|0,softon,1:1718000005",
            "STATUS=I,When=1718000000,Code=118,Msg=ASC 0 set info: success softon:1718000005|",
        );
        let mut session = session(transport, store_with_ip());

        assert!(session.set_wakeup(1718000005).await.is_ok());
        assert_eq!(session.transport.sent(), vec!["ascset|0,softon,1:1718000005"]);
    }

    #[tokio::test]
    async fn should_reject_silent_wakeup() {
        let mut session = session(MockTransport::new(), store_with_ip());

        let result = session.set_wakeup(1718000005).await;

        assert_eq!(result, Err(MinerError::Rejected(String::new())));
        assert_eq!(
            session.status().last_error.as_deref(),
            Some("miner response: ")
        );
    }

    #[tokio::test]
    async fn should_reset_idempotently() {
        let store = store_with_ip();
        store.save_string(NAMESPACE, KEY_MODE, "super");
        let mut session = session(healthy_miner(), store.clone());
        session.poll().await.unwrap();

        session.factory_reset();
        let once = session.status();
        session.factory_reset();
        let twice = session.status();

        assert_eq!(once, twice);
        assert_eq!(once, MinerStatus::default());
        assert_eq!(store.load_string(NAMESPACE, KEY_IP, ""), "");
        assert_eq!(store.load_string(NAMESPACE, KEY_MODE, ""), "");
    }

    #[tokio::test]
    async fn should_reset_without_contacting_miner() {
        let mut session = session(healthy_miner(), store_with_ip());
        session.factory_reset();
        assert!(session.transport.sent().is_empty());
    }
}
