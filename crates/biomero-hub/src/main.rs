mod app;

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::info;
use tracing_subscriber::EnvFilter;

use biomero_admin::{AdminTool, ScriptsTool};
use biomero_api::executor::ApiExecutor;
use biomero_api::{BiomeroClient, ClientConfig};
use biomero_core::db;
use biomero_core::store::NodeStore;
use biomero_run::RunTool;
use biomero_status::StatusTool;
use biomero_upload::UploadTool;

use app::{App, Session};

/// Log to `<data dir>/biomero.log`; the terminal belongs to the UI.
fn init_logging(config: &ClientConfig) -> Result<()> {
    let path = db::data_dir()?.join("biomero.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let config = ClientConfig::load().context("Failed to load configuration")?;
    init_logging(&config)?;
    info!(server = %config.server.base_url, "starting biomero");

    let session = Session {
        server: config.server.base_url.clone(),
        user_name: config.user.name.clone(),
        group_id: config.user.group_id,
        group_name: None,
    };
    let dashboard_url = config.dashboard.url.clone();
    let client = BiomeroClient::new(config)?;

    // Run and Upload browse the same OMERO tree
    let omero = NodeStore::shared("OMERO");

    // Each tool gets its own connection to avoid borrow issues
    let run = RunTool::new(db::open_db()?, client.clone(), omero.clone())?;
    let upload = UploadTool::new(db::open_db()?, client.clone(), omero)?;
    let scripts = ScriptsTool::new(client.clone());
    let admin = AdminTool::new(client.clone());
    let status = StatusTool::new(db::open_db()?, dashboard_url)?;

    let conn = db::open_db()?;
    let mut app = App::new(
        vec![
            Box::new(run),
            Box::new(upload),
            Box::new(scripts),
            Box::new(admin),
            Box::new(status),
        ],
        session,
        ApiExecutor::spawn(client),
    );
    app.init_db(&conn)?;
    app.load_groups();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    if let Err(err) = result {
        tracing::error!(error = ?err, "biomero exited with an error");
        eprintln!("Error: {err:?}");
    }

    Ok(())
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    const TICK_RATE: Duration = Duration::from_millis(50);

    loop {
        terminal.draw(|frame| {
            app.render(frame);
        })?;

        if app.should_quit {
            return Ok(());
        }

        // Poll with timeout so background results keep flowing in
        if event::poll(TICK_RATE)? {
            let ev = event::read()?;
            app.handle_event(ev);
        }

        app.tick();
    }
}
