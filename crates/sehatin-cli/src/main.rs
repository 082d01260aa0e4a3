//! Sehat-In CLI - drive the Sehat-In session from a terminal.
//!
//! Restores the saved session on every run, then performs one command:
//! log in or out, register, complete a third-party login handoff, or check
//! whether a route would render for the current session.

use std::io;

use anyhow::Result;
use sehatin_core::{
    Config, GateDecision, HandoffSource, LoginRequest, NoticeLevel, Route, SessionEvent,
    SessionManager,
};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable checked for a password before prompting
const PASSWORD_ENV: &str = "SEHATIN_PASSWORD";

const USAGE: &str = "\
Usage: sehatin <command>

Commands:
  status                 Restore the saved session and show who is logged in
  login [username]       Log in (defaults to the last username; password
                         from SEHATIN_PASSWORD or prompt)
  register <username>    Create an account
  logout                 Forget the saved session
  handoff <url|key>      Complete a Google login from a callback URL or key
  handoff --cookie       Complete a Google login from the handoff cookie
  google-url             Print the URL that starts a Google login
  route <path>           Show whether a page would render, load or redirect";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    let session = SessionManager::from_config(&config)?;
    let mut events = session.subscribe();

    let status = session.restore().await;
    info!(%status, "Session restored");

    let result = match (command, args.get(1).map(String::as_str)) {
        ("status", _) => {
            print_status(&session);
            Ok(())
        }
        ("login", given) => match config.login_username(given) {
            Some(username) => login(&session, &mut config, &username).await,
            None => {
                eprintln!("No previous login; run `sehatin login <username>`.");
                Ok(())
            }
        },
        ("register", Some(username)) => register(&session, username).await,
        ("logout", _) => {
            session.logout().await;
            println!("Logged out.");
            Ok(())
        }
        ("handoff", Some("--cookie")) => handoff(&session, HandoffSource::Cookie).await,
        ("handoff", Some(arg)) => {
            let source = if arg.contains("://") {
                HandoffSource::from_callback_url(arg)?
            } else {
                HandoffSource::Key(arg.to_string())
            };
            handoff(&session, source).await
        }
        ("google-url", _) => {
            println!("{}", session.google_login_url());
            Ok(())
        }
        ("route", Some(path)) => check_route(&session, path),
        _ => {
            eprintln!("{}", USAGE);
            Ok(())
        }
    };

    print_notices(&mut events);
    result
}

/// Print toasts emitted while the command ran.
fn print_notices(events: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Notice(notice) => {
                let tag = match notice.level {
                    NoticeLevel::Success => "ok",
                    NoticeLevel::Error => "error",
                };
                match notice.message {
                    Some(message) => eprintln!("[{}] {}: {}", tag, notice.title, message),
                    None => eprintln!("[{}] {}", tag, notice.title),
                }
            }
            SessionEvent::Invalidated { redirect, .. } => {
                info!(%redirect, "Identity changed");
            }
            SessionEvent::Status(_) => {}
        }
    }
}

fn print_status(session: &SessionManager) {
    match session.user() {
        Some(user) => {
            println!("Logged in as {} ({})", user.display_name(), user.username());
            println!("  email:        {}", user.identity.email);
            println!("  account type: {}", user.identity.account_type);
            if let Some(at) = session.refreshed_at() {
                println!("  refreshed:    {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
        None => println!("Not logged in."),
    }
}

async fn login(session: &SessionManager, config: &mut Config, username: &str) -> Result<()> {
    if session.gate(&Route::Login) == GateDecision::Redirect(Route::Home) {
        println!("Already logged in. Run `sehatin logout` first.");
        return Ok(());
    }

    println!("Logging in as {}", username);
    let password = read_password()?;
    session.login(LoginRequest::new(username, password)).await?;

    config.last_username = Some(username.to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    print_status(session);
    Ok(())
}

async fn register(session: &SessionManager, username: &str) -> Result<()> {
    let password = read_password()?;
    session.register(LoginRequest::new(username, password)).await?;
    println!("Account created. Log in with `sehatin login {}`.", username);
    Ok(())
}

async fn handoff(session: &SessionManager, source: HandoffSource) -> Result<()> {
    match session.complete_handoff(source).await {
        Ok(_) => {
            print_status(session);
            Ok(())
        }
        Err(e) => {
            println!("Redirecting to {}", Route::Login);
            Err(e.into())
        }
    }
}

fn check_route(session: &SessionManager, path: &str) -> Result<()> {
    let route = Route::parse(path).ok_or_else(|| anyhow::anyhow!("Unknown route: {}", path))?;
    match session.gate(&route) {
        GateDecision::Render => println!("{}: render", route),
        GateDecision::Loading => println!("{}: loading", route),
        GateDecision::Redirect(to) => println!("{}: redirect to {}", route, to),
    }
    Ok(())
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            return Ok(password);
        }
    }
    Ok(rpassword::prompt_password("Password: ")?)
}
