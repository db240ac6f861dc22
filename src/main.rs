mod api;
mod cli;
mod commands;
mod config;
mod logging;
mod model;
mod render;
mod sync;
#[cfg(test)]
mod testing;
mod ui;
mod week;

use anyhow::Result;
use clap::Parser;
use cli::Command;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let command = args.command.unwrap_or(Command::Tui);
    if let Command::Init { url } = &command {
        return commands::init(url.clone());
    }

    let location = config::locate_settings(&std::env::current_dir()?)?;
    let mut settings = config::load_settings(&location)?;
    config::apply_overrides(&mut settings, args.server, args.window);

    let level = settings
        .log_level
        .clone()
        .unwrap_or_else(|| logging::default_log_level().to_string());
    let _logger = match config::log_dir().and_then(|dir| logging::init_logging(&level, &dir)) {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("warning: logging disabled: {:#}", err);
            None
        }
    };
    log::info!(
        "event=settings_loaded scope={} server={} window={:?}",
        location.scope.label(),
        settings.server_url,
        settings.window
    );

    match command {
        Command::Init { .. } => Ok(()),
        Command::Show { date, all } => commands::show(&settings, date, all),
        Command::Task(task) => commands::task(&settings, task),
        Command::Category(category) => commands::category(&settings, category),
        Command::Person(person) => commands::person(&settings, person),
        Command::Note(note) => commands::note(&settings, note),
        Command::Backup { path } => commands::backup(&settings, path),
        Command::Restore { path } => commands::restore(&settings, path),
        Command::ExportPdf { date, out } => commands::export_pdf(&settings, date, out),
        Command::Theme { theme } => commands::theme(&location, theme),
        Command::Tui => commands::tui(&settings, &location),
    }
}
