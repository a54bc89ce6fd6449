use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod controller;
mod domain;
mod inputter;
mod model;
mod settings;
mod table;
mod ui;

use controller::Controller;
use domain::{Message, PbConfig, PbError};
use model::{Model, Status};
use settings::Settings;
use ui::TableUI;

#[derive(Parser, Debug)]
#[command(
    name = "pbook",
    about = "A tui based phone book viewer for staff contact files."
)]
struct Args {
    /// Contact file to open (CSV or XLSX). When omitted, the last loaded
    /// file or a conventionally named file in the working directory is used.
    file: Option<String>,

    /// Sheet name to read when loading a spreadsheet
    #[arg(long)]
    sheet: Option<String>,

    /// Write tracing output to this file, filtered through RUST_LOG
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    match run() {
        Err(e) => {
            ratatui::restore();
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => {
            ratatui::restore();
            ExitCode::SUCCESS
        }
    }
}

fn init_logging(path: &Path) -> Result<(), PbError> {
    // The terminal belongs to the UI, logs go to a file.
    let file = File::create(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn run() -> Result<(), PbError> {
    let args = Args::parse();
    if let Some(path) = &args.log_file {
        init_logging(path)?;
    }

    let cfg = PbConfig::default();
    let settings = Settings::load(settings::SETTINGS_FILE);

    let cli_path = args.file.as_deref().map(|raw| {
        let expanded = shellexpand::full(raw)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        PathBuf::from(expanded)
    });
    let cwd = std::env::current_dir()?;
    let initial = settings::resolve_input_path(cli_path.as_deref(), &settings, &cwd);
    info!("Resolved initial data file: {:?}", initial);

    let mut model = Model::init(
        &cfg,
        settings,
        PathBuf::from(settings::SETTINGS_FILE),
        args.sheet,
    );
    if let Some(path) = initial {
        model.load_file(path);
    }

    let controller = Controller::new(&cfg);
    let mut ui = TableUI::new(&cfg);
    let mut terminal = ratatui::init();

    let size = terminal.size()?;
    model.update(Some(Message::Resize(
        size.width as usize,
        size.height as usize,
    )))?;

    while model.status != Status::QUITTING {
        terminal.draw(|frame| ui.draw(&model, frame))?;
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }

    Ok(())
}
