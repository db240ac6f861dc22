use crate::config::Theme;
use crate::week::WindowPreset;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "weekboard", version, about = "Weekly task-assignment board client")]
pub struct Cli {
    /// Backend base URL (overrides settings and WEEKBOARD_SERVER)
    #[arg(long, global = true)]
    pub server: Option<String>,
    /// Day window layout
    #[arg(long, global = true, value_enum)]
    pub window: Option<WindowPreset>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a project settings file in the current directory
    Init {
        /// Backend URL to store in the new settings
        #[arg(long = "url")]
        url: Option<String>,
    },
    /// Print the board for a window
    Show {
        /// Any day inside the window to show (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Show every done task instead of the latest three
        #[arg(long)]
        all: bool,
    },
    /// Manage tasks
    #[command(subcommand)]
    Task(TaskCommand),
    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Manage people
    #[command(subcommand)]
    Person(PersonCommand),
    /// Manage day notes
    #[command(subcommand)]
    Note(NoteCommand),
    /// Download a JSON snapshot of the whole board
    Backup {
        /// Output file (defaults to weekboard_backup.json)
        path: Option<PathBuf>,
    },
    /// Replace the whole board with a JSON snapshot
    Restore {
        /// Snapshot file produced by `backup`
        path: PathBuf,
    },
    /// Download the printable document for a window
    ExportPdf {
        /// Any day inside the window (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Output file (defaults to weekboard-<week start>.pdf)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Set the color theme
    Theme {
        #[arg(value_enum)]
        theme: Theme,
    },
    /// Launch the interactive TUI
    Tui,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Add a task to a category
    Add {
        category_id: i64,
        text: String,
    },
    /// Mark a task done
    Done {
        id: i64,
        /// Mark the task as not done instead
        #[arg(long)]
        undo: bool,
    },
    /// Replace a task's text
    Edit {
        id: i64,
        text: String,
    },
    /// Assign a task to a person, or unassign it when no person is given
    Assign {
        id: i64,
        person_id: Option<i64>,
    },
    /// Delete a task
    Rm {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    /// List categories in display order
    List,
    /// Create a category
    Add {
        name: String,
        /// Label color, any CSS color
        #[arg(long, default_value = "#4a90d9")]
        color: String,
    },
    /// Rename a category
    Rename {
        id: i64,
        name: String,
    },
    /// Swap a category with its neighbour
    Move {
        id: i64,
        #[arg(value_enum)]
        direction: Direction,
    },
    /// Delete a category and its tasks
    Rm {
        id: i64,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum PersonCommand {
    /// List people
    List,
    /// Add a person
    Add {
        name: String,
    },
    /// Delete a person; their tasks become unassigned
    Rm {
        id: i64,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum NoteCommand {
    /// Write the note for a task on a day; empty content clears it
    Set {
        task_id: i64,
        /// Day of the note (YYYY-MM-DD)
        date: String,
        content: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}
