//! Watch command: follow the trace stream

use crate::config::{last_message_file, Config};
use crate::output::LinePresenter;
use crate::tui::{TuiAction, TuiApp};
use crate::viewer::{
    LastMessageFile, Presenter, SseTransport, StreamConnection, StreamEvent, ViewerContext,
    ViewerEvent,
};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableFocusChange, EnableFocusChange, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Watch options from the command line
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub endpoint: Option<String>,
    pub reconnect_delay: Option<u64>,
    pub plain: bool,
    pub no_persist: bool,
    pub max_rows: Option<usize>,
}

impl WatchOptions {
    /// Layer command line overrides on top of the config file
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(delay) = self.reconnect_delay {
            config.reconnect_delay_secs = delay;
        }
        if self.no_persist {
            config.persist_last_message = false;
        }
        if let Some(max_rows) = self.max_rows {
            config.max_rows = max_rows;
        }
        config
    }
}

/// Handle watch command
pub async fn run(opts: WatchOptions) -> Result<()> {
    let config = opts.apply(Config::load()?);
    tracing::debug!("Watching {} with {:?}", config.endpoint, config);

    if opts.plain {
        run_plain(config).await
    } else {
        run_tui(config).await
    }
}

fn build_context<P: Presenter>(
    config: &Config,
    presenter: P,
    events: mpsc::Sender<StreamEvent>,
) -> Result<ViewerContext<SseTransport, P>> {
    let transport = SseTransport::new().context("Failed to build HTTP client")?;

    let mut connection = StreamConnection::new(
        config.endpoint.clone(),
        transport,
        events,
        config.reconnect_delay(),
    );
    if config.persist_last_message {
        connection.set_sink(Box::new(LastMessageFile::new(last_message_file())));
    }

    Ok(ViewerContext::new(connection, presenter, config.max_rows))
}

/// Resolves when the pending reconnect is due, never if there is none
async fn reconnect_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_plain(config: Config) -> Result<()> {
    let (events_tx, mut events_rx) = mpsc::channel::<StreamEvent>(100);
    let presenter = LinePresenter::new(config.endpoint.clone());
    let mut ctx = build_context(&config, presenter, events_tx)?;

    ctx.start();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let deadline = ctx.reconnect_deadline();

        tokio::select! {
            _ = &mut ctrl_c => break,

            Some(event) = events_rx.recv() => {
                ctx.dispatch(ViewerEvent::Transport(event));
            }

            _ = reconnect_due(deadline) => {
                ctx.dispatch(ViewerEvent::ReconnectDue);
            }
        }
    }

    ctx.dispatch(ViewerEvent::Shutdown);
    Ok(())
}

async fn run_tui(config: Config) -> Result<()> {
    let (events_tx, events_rx) = mpsc::channel::<StreamEvent>(100);
    let app = TuiApp::new(config.endpoint.clone());
    let mut ctx = build_context(&config, app, events_tx)?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    ctx.start();
    let result = run_tui_loop(&mut terminal, &mut ctx, events_rx).await;
    ctx.dispatch(ViewerEvent::Shutdown);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

async fn run_tui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ctx: &mut ViewerContext<SseTransport, TuiApp>,
    mut events_rx: mpsc::Receiver<StreamEvent>,
) -> Result<()> {
    let mut tick_interval = tokio::time::interval(Duration::from_millis(100));

    loop {
        let open_requests = ctx.store().len();
        ctx.presenter_mut().open_requests = open_requests;

        // Draw UI
        terminal.draw(|f| crate::tui::draw(f, ctx.presenter()))?;

        let deadline = ctx.reconnect_deadline();

        tokio::select! {
            // Handle terminal events (non-blocking)
            _ = tick_interval.tick() => {
                while event::poll(Duration::from_millis(0))? {
                    match event::read()? {
                        Event::Key(key) if key.kind == KeyEventKind::Press => {
                            match ctx.presenter_mut().handle_key(key) {
                                Some(TuiAction::Quit) => return Ok(()),
                                Some(TuiAction::Reconnect) => {
                                    ctx.dispatch(ViewerEvent::VisibilityTick)
                                }
                                Some(TuiAction::Clear) => ctx.dispatch(ViewerEvent::Clear),
                                None => {}
                            }
                        }
                        Event::FocusGained => ctx.dispatch(ViewerEvent::VisibilityTick),
                        _ => {}
                    }
                }
            }

            // Stream events from the transport task
            Some(event) = events_rx.recv() => {
                ctx.dispatch(ViewerEvent::Transport(event));
            }

            _ = reconnect_due(deadline) => {
                ctx.dispatch(ViewerEvent::ReconnectDue);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let opts = WatchOptions {
            endpoint: Some("http://127.0.0.1:9000/events".to_string()),
            reconnect_delay: Some(2),
            no_persist: true,
            ..Default::default()
        };

        let config = opts.apply(Config::default());
        assert_eq!(config.endpoint, "http://127.0.0.1:9000/events");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(2));
        assert!(!config.persist_last_message);
        assert_eq!(config.max_rows, Config::default().max_rows);
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let config = Config {
            max_rows: 42,
            ..Default::default()
        };
        assert_eq!(WatchOptions::default().apply(config.clone()), config);
    }

    #[tokio::test]
    async fn test_reconnect_due() {
        let deadline = Instant::now() + Duration::from_millis(10);
        tokio::time::timeout(Duration::from_secs(1), reconnect_due(Some(deadline)))
            .await
            .unwrap();

        let never = tokio::time::timeout(Duration::from_millis(20), reconnect_due(None)).await;
        assert!(never.is_err());
    }
}
