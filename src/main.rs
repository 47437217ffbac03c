use std::{
    error::Error,
    fs::File,
    io::{self, stdin},
    path::PathBuf,
    time::Duration,
};

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use scorekeep::{
    app::App,
    app_dirs::AppDirs,
    auth::AuthService,
    config::{ConfigStore, FileConfigStore},
    export::export_user_history,
    logging::init_file_logging,
    migration::migrate,
    runtime::{CrosstermEventSource, Runner, Step},
    session::SessionService,
    storage::{SqliteStore, Storage},
    ui, TICK_RATE_MS,
};

/// track game and activity sessions with win/loss tallies and history
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A terminal tracker for personal sessions: log in, start a session, record victories and defeats (or raw scores), and review your history and statistics. Everything is kept in a local database file."
)]
pub struct Cli {
    /// database file to use instead of the default state location
    #[clap(short = 'd', long)]
    data: Option<PathBuf>,

    /// config file to use instead of the default config location
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// write the logged-in user's session history as CSV to this path and exit
    #[clap(short = 'e', long)]
    export: Option<PathBuf>,

    /// upgrade the data file to the current layout and exit
    #[clap(long)]
    migrate_only: bool,

    /// log file to write to instead of the default state location
    #[clap(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn data_path(&self) -> PathBuf {
        self.data
            .clone()
            .or_else(AppDirs::db_path)
            .unwrap_or_else(|| PathBuf::from("scorekeep.db"))
    }

    fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .or_else(AppDirs::log_path)
            .unwrap_or_else(|| PathBuf::from("scorekeep.log"))
    }

    fn config_store(&self) -> FileConfigStore {
        match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Err(e) = init_file_logging(&cli.log_path()) {
        eprintln!("logging disabled: {}", e);
    }

    let storage = Storage::new(SqliteStore::open(cli.data_path())?);
    let report = migrate(&storage)?;

    if cli.migrate_only {
        println!(
            "schema v{} -> v{}: {} users, {} sessions, {} events moved, {} orphaned event logs removed",
            report.from_version,
            report.to_version,
            report.users_moved,
            report.sessions_moved,
            report.events_moved,
            report.event_logs_pruned
        );
        return Ok(());
    }

    if let Some(path) = &cli.export {
        if !AuthService::new(&storage).is_logged_in() {
            let mut cmd = Cli::command();
            cmd.error(ErrorKind::InvalidValue, "no user is logged in; log in through the TUI first")
                .exit();
        }
        let service = SessionService::new(&storage);
        let rows = export_user_history(&service, File::create(path)?)?;
        println!("exported {} sessions to {}", rows, path.display());
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let config = cli.config_store().load();
    let mut app = App::new(storage, config);

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        Duration::from_millis(TICK_RATE_MS),
    );

    terminal.draw(|f| ui::draw(app, f))?;

    loop {
        match runner.step(app) {
            Step::Quit => break,
            Step::Redraw => {
                terminal.draw(|f| ui::draw(app, f))?;
            }
            Step::Idle => {}
        }
    }

    Ok(())
}
