//! Command-line interface for kon8-dash.
//!
//! Talks to the miner directly, sharing the daemon's settings file so an
//! address or mode set here is picked up by the daemon on its next start.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use time::OffsetDateTime;

use kon8_dash::cgminer::TcpTransport;
use kon8_dash::config::DashConfig;
use kon8_dash::device::{DeviceSettings, command_timestamp};
use kon8_dash::session::MinerSession;
use kon8_dash::store::{JsonFileStore, Store};
use kon8_dash::view;

fn usage() -> ! {
    eprintln!("Usage: kon8-cli <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status [--json]    Poll the miner and show its status");
    eprintln!("  set-ip <ip>        Set the miner address");
    eprintln!("  mode <mode>        Set work mode (eco, standard, super)");
    eprintln!("  standby            Put the miner to sleep");
    eprintln!("  wakeup             Wake the miner up");
    eprintln!("  reset              Forget all settings");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  KON8_STORE_PATH           Settings file (default: kon8-dash.json)");
    eprintln!("  KON8_MINER_PORT           CGMiner API port (default: 4028)");
    eprintln!("  KON8_COMMAND_TIMEOUT_MS   Per-command timeout (default: 3000)");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        usage();
    }

    let config = DashConfig::from_env();
    let store: Arc<dyn Store> = Arc::new(
        JsonFileStore::open(&config.store_path).with_context(|| {
            format!("opening settings file {}", config.store_path.display())
        })?,
    );
    let transport = TcpTransport::new(config.command_timeout);
    let mut session = MinerSession::load(transport, store.clone(), config.miner_port);

    let command = &args[1];
    let arg = args.get(2).map(String::as_str);

    match (command.as_str(), arg) {
        ("status", None) => cmd_status(&mut session, false).await?,
        ("status", Some("--json")) => cmd_status(&mut session, true).await?,
        ("set-ip", Some(ip)) => {
            session.set_ip(ip);
            println!("Miner address: {}", session.ip());
        }
        ("mode", Some(mode)) => {
            session
                .set_mode(mode)
                .await
                .context("setting work mode")?;
            println!("Work mode: {}", view::mode_label(session.status().work_mode));
        }
        ("standby", None) => {
            let at = command_timestamp(OffsetDateTime::now_utc());
            session.set_standby(at).await.context("scheduling standby")?;
            println!("Standby scheduled at {at}");
        }
        ("wakeup", None) => {
            let at = command_timestamp(OffsetDateTime::now_utc());
            session.set_wakeup(at).await.context("scheduling wakeup")?;
            println!("Wakeup scheduled at {at}");
        }
        ("reset", None) => {
            DeviceSettings::new(store).factory_reset(&mut session);
            println!("Settings cleared");
        }
        _ => {
            eprintln!("Unknown command: {}", args[1..].join(" "));
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Poll once and print the result. The status is printed even when the
/// poll fails, so the error and the reset fields are visible.
async fn cmd_status(session: &mut MinerSession<TcpTransport>, json: bool) -> Result<()> {
    let outcome = session.poll().await;
    let status = session.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        let page = view::MinerPage::from_poll(outcome.is_ok(), &status);
        println!("Miner:    {}", page.ip);
        if !status.version.prod.is_empty() {
            println!("Model:    {}", status.version.prod);
        }
        println!("Mode:     {}", page.mode_label);
        println!("Hashrate: {:.2} TH/s", page.hashrate_ths);
        println!("Power:    {:.0} W", page.power_w);
        println!("Uptime:   {}", view::format_elapsed(&status.summary.elapsed));
        println!(
            "Shares:   {} accepted, {} rejected",
            status.summary.accepted, status.summary.rejected
        );
        if !status.work_state.is_empty() {
            println!("State:    {}", status.work_state);
        }
    }

    outcome.context("polling miner")?;
    Ok(())
}
