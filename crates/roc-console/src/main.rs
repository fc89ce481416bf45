mod state;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use roc_core::Credential;
use roc_session::{Session, SessionConfig, SessionHandle};
use state::{App, Command};
use std::{fs, io, path::PathBuf, time::Duration};
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

#[derive(Parser, Debug)]
#[command(name = "roc-console", about = "Live operator console for the realm admin surface")]
struct Args {
    /// Admin HTTP base URL (env ROC_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,
    /// Chat WebSocket URL; derived from the base URL when omitted
    /// (env ROC_CHAT_URL)
    #[arg(long)]
    chat_url: Option<String>,
    /// Log WebSocket URL; derived from the base URL when omitted
    /// (env ROC_LOG_URL)
    #[arg(long)]
    log_url: Option<String>,
    /// Display name used for the chat handshake (env ROC_DISPLAY_NAME)
    #[arg(long)]
    display_name: Option<String>,
    /// Credentials file, JSON `{"uid": ..., "token": ...}`
    /// (env ROC_CREDENTIALS)
    #[arg(long)]
    credentials: Option<PathBuf>,
    /// Poll interval in seconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    poll_interval: u64,
    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout: u64,
    /// Reconnect dropped stream channels with exponential backoff
    #[arg(long)]
    reconnect: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    let config = load_config(args)?;
    tracing::info!(event = "console_starting", base = %config.base_url);

    let handle = Session::start(config).context("failed to start dashboard session")?;

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, handle).await;
    restore_terminal(&mut terminal)?;

    if let Err(err) = &result {
        eprintln!("roc-console: {err}");
    }
    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut handle: SessionHandle,
) -> Result<()> {
    let mut app = App::new();
    let mut events = EventStream::new();
    // Redraw cadence for the local clock in the header.
    let mut clock = tokio::time::interval(Duration::from_secs(1));

    loop {
        terminal.draw(|frame| ui::render(frame, &mut app))?;
        tokio::select! {
            Some(view) = handle.views.recv() => {
                app.apply_view(view);
            }
            Some(event) = handle.chat_events.recv() => {
                app.chat.apply(event);
            }
            Some(event) = handle.log_events.recv() => {
                app.log.apply(event);
            }
            Some(note) = handle.notices.recv() => {
                app.apply_notice(note);
            }
            _ = clock.tick() => {}
            maybe_event = events.next() => {
                let Some(Ok(Event::Key(key))) = maybe_event else {
                    continue;
                };
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match app.handle_key(key) {
                    Some(Command::Quit) => break,
                    Some(Command::SendChat(text)) => handle.send_chat(&text),
                    Some(Command::Broadcast(message)) => handle.broadcast(message),
                    Some(Command::Restart) => handle.restart(),
                    None => {}
                }
            }
        }
    }

    handle.stop();
    Ok(())
}

fn load_config(args: Args) -> Result<SessionConfig> {
    let base_url = resolve_base_url(args.base_url.as_deref())?;
    let chat_url = resolve_stream_url(args.chat_url.as_deref(), "ROC_CHAT_URL", &base_url, "chat")?;
    let log_url = resolve_stream_url(args.log_url.as_deref(), "ROC_LOG_URL", &base_url, "log")?;
    let display_name = resolve_display_name(args.display_name);
    let credential = load_credential(args.credentials)?;

    Ok(SessionConfig {
        base_url,
        chat_url,
        log_url,
        credential,
        display_name,
        poll_interval: Duration::from_secs(args.poll_interval.max(1)),
        request_timeout: Duration::from_secs(args.request_timeout.max(1)),
        reconnect: args.reconnect || env_flag("ROC_RECONNECT"),
    })
}

fn resolve_base_url(arg: Option<&str>) -> Result<Url> {
    let raw = arg
        .map(str::to_string)
        .or_else(|| std::env::var("ROC_BASE_URL").ok())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    Url::parse(&raw).with_context(|| format!("invalid base URL '{raw}'"))
}

/// Stream endpoints are deployment configuration. When unset they derive
/// from the base URL: http(s) flips to ws(s), with `/chat` or `/log`.
fn resolve_stream_url(arg: Option<&str>, env: &str, base: &Url, path: &str) -> Result<Url> {
    if let Some(raw) = arg
        .map(str::to_string)
        .or_else(|| std::env::var(env).ok())
    {
        return Url::parse(&raw).with_context(|| format!("invalid stream URL '{raw}'"));
    }
    let mut url = base.join(path)?;
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("cannot derive a websocket URL from '{base}'"))?;
    Ok(url)
}

fn resolve_display_name(arg: Option<String>) -> String {
    arg.or_else(|| std::env::var("ROC_DISPLAY_NAME").ok())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "operator".to_string())
}

/// Credential lookup order: env pair, explicit file, default file in the
/// user config dir. Missing everything degrades to empty fields, which the
/// server will reject per request; the dashboard still runs.
fn load_credential(path: Option<PathBuf>) -> Result<Credential> {
    if let (Ok(identity), Ok(token)) = (std::env::var("ROC_UID"), std::env::var("ROC_TOKEN")) {
        return Ok(Credential { identity, token });
    }

    let path = path
        .or_else(|| std::env::var("ROC_CREDENTIALS").ok().map(PathBuf::from))
        .or_else(default_credentials_path);
    if let Some(path) = path {
        if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let credential: Credential = serde_json::from_str(&raw)
                .with_context(|| format!("invalid credentials in {}", path.display()))?;
            return Ok(credential);
        }
    }

    Ok(Credential {
        identity: String::new(),
        token: String::new(),
    })
}

fn default_credentials_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("realm-ops-console").join("credentials.json"))
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).ok().as_deref(),
        Some("1") | Some("true") | Some("TRUE") | Some("yes") | Some("YES")
    )
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // The TUI owns the terminal; logs go nowhere unless explicitly routed.
    if env_flag("ROC_LOG_STDOUT") {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_derives_scheme_and_path() {
        let base = Url::parse("http://example.net:8080/").unwrap();
        let url = resolve_stream_url(None, "ROC_TEST_UNSET_CHAT", &base, "chat").unwrap();
        assert_eq!(url.as_str(), "ws://example.net:8080/chat");

        let secure = Url::parse("https://example.net/").unwrap();
        let url = resolve_stream_url(None, "ROC_TEST_UNSET_LOG", &secure, "log").unwrap();
        assert_eq!(url.as_str(), "wss://example.net/log");
    }

    #[test]
    fn explicit_stream_url_wins_over_derivation() {
        let base = Url::parse("http://example.net/").unwrap();
        let url = resolve_stream_url(
            Some("ws://chat.example.net:9010/ws"),
            "ROC_TEST_UNSET",
            &base,
            "chat",
        )
        .unwrap();
        assert_eq!(url.as_str(), "ws://chat.example.net:9010/ws");
    }

    #[test]
    fn display_name_falls_back_to_operator() {
        assert_eq!(resolve_display_name(None), "operator");
        assert_eq!(
            resolve_display_name(Some("Warden".to_string())),
            "Warden"
        );
        assert_eq!(resolve_display_name(Some("   ".to_string())), "operator");
    }
}
