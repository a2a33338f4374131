use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use log::error;
use ratatui::prelude::*;

use mailform::app::{App, AppError, AppResult};
use mailform::config::Config;
use mailform::form::FormState;
use mailform::submit::{status_line, Submitter};
use mailform::ui::ui;

/// Terminal form that posts a recipient, subject, message and optional
/// attachment to a mail backend
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to config file
    #[clap(short, long)]
    config: Option<String>,

    /// Backend URL to post to, overriding the config file
    #[clap(short, long)]
    endpoint: Option<String>,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,

    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one message without opening the form
    Send {
        /// Recipient email address
        #[clap(short, long)]
        to: String,

        /// Subject line
        #[clap(short, long, default_value = "")]
        subject: String,

        /// Message body
        #[clap(short, long, default_value = "")]
        message: String,

        /// File to attach
        #[clap(short, long)]
        file: Option<String>,
    },

    /// Print the effective configuration
    ShowConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.debug, args.command.is_none());

    // Load configuration
    let config_path = match &args.config {
        Some(path) => shellexpand::tilde(path).into_owned(),
        None => Config::default_path().to_string_lossy().into_owned(),
    };
    let config_exists = std::path::Path::new(&config_path).exists();
    let mut config = Config::load(&config_path).unwrap_or_else(|e| {
        println!("Could not load config at {}: {}. Using defaults.", config_path, e);
        Config::default()
    });

    // Save config in case it was created for the first time
    if !config_exists {
        if let Err(e) = config.save(&config_path) {
            println!("Failed to save config: {}", e);
        }
    }

    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let submitter = Submitter::http(config.endpoint.clone());

    match args.command {
        Some(Commands::Send {
            to,
            subject,
            message,
            file,
        }) => {
            let mut form = FormState::new();
            form.recipient = to;
            form.subject = subject;
            form.body = message;
            if let Some(file) = file {
                form.attach(PathBuf::from(shellexpand::tilde(&file).into_owned()));
            }

            let result = runtime.block_on(submitter.submit(&form));
            println!("{}", status_line(&result));
            return result.context("Send failed");
        }
        Some(Commands::ShowConfig) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }
        None => {}
    }

    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    io::stdout()
        .execute(EnterAlternateScreen)
        .context("Failed to enter alternate screen")?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
        .context("Failed to create terminal")?;

    let mut app = App::new(config, submitter, runtime.handle().clone());

    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode().context("Failed to disable raw mode")?;
    io::stdout()
        .execute(LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;

    if let Err(err) = result {
        error!("Error: {:?}", err);
        println!("Error: {:?}", err);
    }

    Ok(())
}

/// The form owns the terminal, so interactive sessions log to a file in the
/// cache directory instead of stderr.
fn init_logging(debug: bool, interactive: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });

    if interactive {
        let log_file = dirs::cache_dir().and_then(|dir| {
            let dir = dir.join("mailform");
            std::fs::create_dir_all(&dir).ok()?;
            // One session per file; the previous run's log is replaced
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(dir.join("mailform.log"))
                .ok()
        });
        match log_file {
            Some(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            None => {
                // Nowhere to write that won't garble the screen
                builder.filter_level(log::LevelFilter::Off);
            }
        }
    }

    builder.init();
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> AppResult<()> {
    let mut consecutive_errors = 0;
    const MAX_CONSECUTIVE_ERRORS: u32 = 10;

    loop {
        if let Err(e) = terminal.draw(|frame| ui(frame, app)) {
            consecutive_errors += 1;
            if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                return Err(AppError::IoError(e));
            }
            continue;
        }

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Err(e) = app.handle_key_event(key) {
                        app.show_error(&format!("Error: {}", e));
                        consecutive_errors += 1;

                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            return Err(e);
                        }
                    } else {
                        consecutive_errors = 0;
                    }

                    if app.should_quit {
                        return Ok(());
                    }
                }
            }
        }

        // Picks up finished sends and expires messages
        if let Err(e) = app.tick() {
            app.show_error(&format!("Update error: {}", e));
            consecutive_errors += 1;

            if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                return Err(e);
            }
        } else if consecutive_errors > 0 {
            consecutive_errors = 0;
        }
    }
}
