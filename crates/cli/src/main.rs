//! `marketdesk-auth`: sign in to MarketDesk from the terminal.
//!
//! Run with: `marketdesk-auth <command>`
//!
//! Command results go to stdout; logs go to stderr so `token` output can be
//! piped.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use marketdesk_auth::{ErrorClassification, MonitorEvent, RefreshOutcome, TokenRefreshMonitor};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod context;

use context::CliContext;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();

    let result = match args.first().map(String::as_str) {
        Some("login") => run_login(),
        Some("callback") => match args.get(1) {
            Some(url) => run_callback(url).await,
            None => Err(anyhow::anyhow!("Usage: marketdesk-auth callback <redirect-url>")),
        },
        Some("status") => run_status(),
        Some("token") => run_token().await,
        Some("refresh") => run_refresh().await,
        Some("logout") => run_logout(),
        Some("monitor") => run_monitor().await,
        Some("help") | None => {
            print_help();
            Ok(())
        }
        Some(unknown) => {
            eprintln!("Unknown command: {unknown}");
            eprintln!();
            print_help();
            Err(anyhow::anyhow!("Unknown command"))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("MARKETDESK_LOG_JSON")
        .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_help() {
    println!("MarketDesk Authentication");
    println!();
    println!("USAGE:");
    println!("    marketdesk-auth <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("    login           Start a login and print the authorization URL");
    println!("    callback <url>  Complete a login from the redirect URL");
    println!("    status          Show whether a valid session exists");
    println!("    token           Print the access token, refreshing it if expired");
    println!("    refresh         Refresh the access token now");
    println!("    logout          Clear the session");
    println!("    monitor         Keep the session fresh until Ctrl-C or logout");
    println!("    help            Show this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("    MARKETDESK_AUTH_*     Client configuration (see marketdesk-auth.toml)");
    println!("    MARKETDESK_STATE_DIR  State directory (default ./.marketdesk)");
    println!("    MARKETDESK_STORE      Token store: file (default) or keychain");
    println!("    MARKETDESK_LOG_JSON   Set to 1 for JSON logs");
}

fn run_login() -> anyhow::Result<()> {
    let ctx = CliContext::from_env()?;
    let navigation = ctx.client.initiate_login()?;

    println!("Open this URL in your browser to sign in:");
    println!();
    println!("    {navigation}");
    println!();
    println!("Then run: marketdesk-auth callback '<redirect-url>'");
    Ok(())
}

async fn run_callback(url: &str) -> anyhow::Result<()> {
    let ctx = CliContext::from_env()?;

    match ctx.client.handle_callback(url).await {
        Ok(tokens) => {
            println!("Signed in. Access token expires at {}", tokens.expires_at);
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, severity = %e.severity(), "Callback failed");
            Err(anyhow::anyhow!(e.user_message())).context("Sign-in failed")
        }
    }
}

fn run_status() -> anyhow::Result<()> {
    let ctx = CliContext::from_env()?;

    let Some(tokens) = ctx.client.stored_tokens() else {
        println!("Not signed in");
        return Ok(());
    };

    let monitor = TokenRefreshMonitor::new(Arc::clone(&ctx.client));
    if monitor.is_expired() {
        println!("Session expired at {}", tokens.expires_at);
    } else {
        println!(
            "Signed in, access token valid for {}",
            format_remaining(monitor.time_until_expiry())
        );
    }
    println!(
        "Refresh token: {}",
        if tokens.refresh_token.is_some() { "present" } else { "absent" }
    );
    Ok(())
}

async fn run_token() -> anyhow::Result<()> {
    let ctx = CliContext::from_env()?;

    match ctx.client.get_access_token().await {
        Some(token) => {
            println!("{token}");
            Ok(())
        }
        None => anyhow::bail!("Not signed in. Run 'marketdesk-auth login' first."),
    }
}

async fn run_refresh() -> anyhow::Result<()> {
    let ctx = CliContext::from_env()?;
    let monitor = TokenRefreshMonitor::new(Arc::clone(&ctx.client));

    match monitor.force_refresh().await {
        RefreshOutcome::Refreshed { expires_at } => {
            println!("Access token refreshed, expires at {expires_at}");
            Ok(())
        }
        RefreshOutcome::LoggedOut { navigation } => {
            anyhow::bail!("Refresh failed, signed out (return to {navigation})")
        }
        RefreshOutcome::NoSession => anyhow::bail!("Not signed in"),
        RefreshOutcome::InFlight | RefreshOutcome::NotNeeded => {
            println!("Nothing to do");
            Ok(())
        }
    }
}

fn run_logout() -> anyhow::Result<()> {
    let ctx = CliContext::from_env()?;
    let navigation = ctx.client.logout()?;
    println!("Signed out. Return to {navigation}");
    Ok(())
}

async fn run_monitor() -> anyhow::Result<()> {
    let ctx = CliContext::from_env()?;
    if ctx.client.stored_tokens().is_none() {
        anyhow::bail!("Not signed in. Run 'marketdesk-auth login' first.");
    }

    let monitor = Arc::new(TokenRefreshMonitor::new(Arc::clone(&ctx.client)));
    let mut events = monitor.subscribe();
    monitor.start();

    println!(
        "Monitoring session (checks every {}s, refreshes below {}s). Press Ctrl-C to stop.",
        monitor.poll_interval().as_secs(),
        monitor.refresh_threshold().as_secs()
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted, stopping monitor");
                monitor.stop();
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(MonitorEvent::Refreshed { expires_at }) => {
                    println!("Access token refreshed, expires at {expires_at}");
                }
                Ok(MonitorEvent::LoggedOut { navigation }) => {
                    println!("Session ended. Return to {navigation}");
                    return Ok(());
                }
                Ok(MonitorEvent::SessionEnded) => {
                    println!("Signed out elsewhere, monitor stopped");
                    return Ok(());
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed monitor events");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

/// Render a duration as `1h 02m 03s`
fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else {
        format!("{minutes}m {seconds:02}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_hours_and_minutes() {
        assert_eq!(format_remaining(Duration::from_secs(3723)), "1h 02m 03s");
        assert_eq!(format_remaining(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_remaining(Duration::ZERO), "0m 00s");
    }
}
