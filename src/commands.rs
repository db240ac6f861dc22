use crate::api::HttpApi;
use crate::cli::{CategoryCommand, Direction, NoteCommand, PersonCommand, TaskCommand};
use crate::config::{init_project_settings, save_theme, Settings, SettingsLocation, Theme};
use crate::model::MoveDirection;
use crate::render::{Matrix, MatrixRow};
use crate::sync::{BoardController, DEFAULT_BACKUP_FILE};
use crate::ui;
use crate::week::parse_date;
use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

pub fn init(url: Option<String>) -> Result<()> {
    let location = init_project_settings(url)?;
    println!("Initialized settings at {}", location.path.display());
    Ok(())
}

pub fn show(settings: &Settings, date: Option<String>, all: bool) -> Result<()> {
    let mut board = connect(settings)?;
    if let Some(day) = parse_day(date.as_deref())? {
        board.go_to(day)?;
    }
    if all {
        let ids: Vec<_> = board.state().categories.iter().map(|c| c.id).collect();
        for id in ids {
            board.toggle_expanded(id);
        }
    }
    print!("{}", format_matrix(&board.matrix(today())));
    Ok(())
}

pub fn task(settings: &Settings, command: TaskCommand) -> Result<()> {
    let mut board = connect(settings)?;
    match command {
        TaskCommand::Add { category_id, text } => {
            let task = board.add_task(category_id, &text)?;
            println!("Added task {} to category {}", task.id, category_id);
        }
        TaskCommand::Done { id, undo } => {
            let task = board.set_done(id, !undo)?;
            println!(
                "Task {} marked {}",
                task.id,
                if task.done { "done" } else { "not done" }
            );
        }
        TaskCommand::Edit { id, text } => {
            board.edit_task_text(id, &text)?;
            println!("Updated task {}", id);
        }
        TaskCommand::Assign { id, person_id } => {
            let task = board.assign_person(id, person_id)?;
            match task.person_id.and_then(|p| board.state().find_person(p)) {
                Some(person) => println!("Assigned task {} to {}", id, person.name),
                None => println!("Task {} is unassigned", id),
            }
        }
        TaskCommand::Rm { id, yes } => {
            if !yes && !confirm("Delete task?")? {
                println!("Delete canceled");
                return Ok(());
            }
            board.delete_task(id)?;
            println!("Deleted task {}", id);
        }
    }
    Ok(())
}

pub fn category(settings: &Settings, command: CategoryCommand) -> Result<()> {
    let mut board = connect(settings)?;
    match command {
        CategoryCommand::List => {
            let orders = board.state().effective_orders();
            for (category, order) in board.state().categories.iter().zip(orders) {
                println!(
                    "{:>4}  #{:<3} {} ({}) - {} task(s)",
                    category.id,
                    order,
                    category.name,
                    category.color,
                    category.tasks.len()
                );
            }
        }
        CategoryCommand::Add { name, color } => {
            let category = board.add_category(&name, &color)?;
            println!("Added category {} ({})", category.id, category.name);
        }
        CategoryCommand::Rename { id, name } => {
            let category = board.rename_category(id, &name)?;
            println!("Category {} is now {}", category.id, category.name);
        }
        CategoryCommand::Move { id, direction } => {
            let direction = match direction {
                Direction::Up => MoveDirection::Up,
                Direction::Down => MoveDirection::Down,
            };
            board.move_category(id, direction)?;
            println!("Moved category {}", id);
        }
        CategoryCommand::Rm { id, yes } => {
            if !yes && !confirm("Delete category?")? {
                println!("Delete canceled");
                return Ok(());
            }
            board.delete_category(id)?;
            println!("Deleted category {}", id);
        }
    }
    Ok(())
}

pub fn person(settings: &Settings, command: PersonCommand) -> Result<()> {
    let mut board = connect(settings)?;
    match command {
        PersonCommand::List => {
            for person in &board.state().people {
                println!("{:>4}  {}", person.id, person.name);
            }
        }
        PersonCommand::Add { name } => {
            let person = board.add_person(&name)?;
            println!("Added person {} ({})", person.id, person.name);
        }
        PersonCommand::Rm { id, yes } => {
            if !yes && !confirm("Delete person?")? {
                println!("Delete canceled");
                return Ok(());
            }
            board.delete_person(id)?;
            println!("Deleted person {}", id);
        }
    }
    Ok(())
}

pub fn note(settings: &Settings, command: NoteCommand) -> Result<()> {
    let mut board = connect(settings)?;
    match command {
        NoteCommand::Set {
            task_id,
            date,
            content,
        } => {
            let day = parse_date(&date)
                .map_err(|_| anyhow!("invalid date format (use YYYY-MM-DD): {}", date))?;
            board.save_note(task_id, day, &content)?;
            if content.is_empty() {
                println!("Cleared note for task {} on {}", task_id, day);
            } else {
                println!("Saved note for task {} on {}", task_id, day);
            }
        }
    }
    Ok(())
}

pub fn backup(settings: &Settings, path: Option<PathBuf>) -> Result<()> {
    let board = connect(settings)?;
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_FILE));
    let written = board.backup_to(&path)?;
    println!("Backup written to {}", written.display());
    Ok(())
}

pub fn restore(settings: &Settings, path: PathBuf) -> Result<()> {
    let mut board = connect(settings)?;
    board.restore_from(&path, today())?;
    println!("Restore successful!");
    Ok(())
}

pub fn export_pdf(settings: &Settings, date: Option<String>, out: Option<PathBuf>) -> Result<()> {
    let mut board = connect(settings)?;
    if let Some(day) = parse_day(date.as_deref())? {
        board.go_to(day)?;
    }
    let written = board.export_pdf_to(out.as_deref())?;
    println!("PDF written to {}", written.display());
    Ok(())
}

pub fn theme(location: &SettingsLocation, theme: Theme) -> Result<()> {
    save_theme(location, theme)?;
    println!(
        "Theme set to {}",
        match theme {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    );
    Ok(())
}

pub fn tui(settings: &Settings, location: &SettingsLocation) -> Result<()> {
    let api = HttpApi::new(&settings.server_url).context("building HTTP client")?;
    let board = BoardController::new(api, settings.window.rule(), settings.task_order, today());
    ui::run(board, settings, location.clone())
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn connect(settings: &Settings) -> Result<BoardController<HttpApi>> {
    let api = HttpApi::new(&settings.server_url).context("building HTTP client")?;
    let mut board = BoardController::new(api, settings.window.rule(), settings.task_order, today());
    board
        .load()
        .with_context(|| format!("connecting to {}", settings.server_url))?;
    Ok(board)
}

fn parse_day(input: Option<&str>) -> Result<Option<NaiveDate>> {
    let raw = match input {
        Some(r) => r.trim(),
        None => return Ok(None),
    };
    if raw.is_empty() {
        return Ok(None);
    }
    let day =
        parse_date(raw).map_err(|_| anyhow!("invalid date format (use YYYY-MM-DD): {}", raw))?;
    Ok(Some(day))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Plain-text rendering of the matrix for `show`.
pub fn format_matrix(matrix: &Matrix) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}  {}\n", matrix.title, matrix.range_label));
    let days: Vec<&str> = matrix
        .days
        .iter()
        .map(|day| day.label.as_str())
        .collect();
    out.push_str(&format!("days: {}\n", days.join(" | ")));
    if matrix.groups.is_empty() {
        out.push_str("(no categories)\n");
    }
    for group in &matrix.groups {
        out.push_str(&format!("\n{} [{}]\n", group.name, group.category_id));
        for row in &group.rows {
            match row {
                MatrixRow::Placeholder => out.push_str("  (no tasks)\n"),
                MatrixRow::Task(task) => {
                    out.push_str(&format!(
                        "  [{}] {}: {}",
                        if task.done { "x" } else { " " },
                        task.task_id,
                        task.text
                    ));
                    if let Some(name) = &task.person_name {
                        out.push_str(&format!("  @{}", name));
                    }
                    out.push('\n');
                    for (cell, day) in task.cells.iter().zip(&matrix.days) {
                        if !cell.content.is_empty() {
                            out.push_str(&format!("      {}: {}\n", day.label, cell.content));
                        }
                    }
                }
            }
        }
        if group.hidden_done > 0 {
            out.push_str(&format!("  ... {} more done\n", group.hidden_done));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoardState, Category, Note, Person, Task};
    use crate::render::{render_matrix, TaskOrder};
    use crate::week::WindowPreset;

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn text_rendering_lists_tasks_notes_and_hidden_count() {
        let mut state = BoardState::new(d("2026-10-16"));
        let mut tasks = vec![Task {
            id: 7,
            category_id: 1,
            text: "Ship report".into(),
            done: false,
            person_id: Some(2),
            order: Some(1),
        }];
        for id in 8..13 {
            tasks.push(Task {
                id,
                category_id: 1,
                text: format!("old {}", id),
                done: true,
                person_id: None,
                order: Some(id),
            });
        }
        state.replace_board(
            vec![
                Category {
                    id: 1,
                    name: "Ops".into(),
                    color: "#f00".into(),
                    order: Some(1),
                    tasks,
                },
                Category {
                    id: 2,
                    name: "Later".into(),
                    color: "#0f0".into(),
                    order: Some(2),
                    tasks: Vec::new(),
                },
            ],
            vec![Person {
                id: 2,
                name: "Ana".into(),
            }],
        );
        state.replace_notes(vec![Note {
            task_id: 7,
            date: d("2026-10-18"),
            content: "waiting on numbers".into(),
        }]);

        let matrix = render_matrix(
            &state,
            &WindowPreset::FourDay.rule(),
            d("2026-10-19"),
            TaskOrder::DoneLast,
        );
        let text = format_matrix(&matrix);
        assert!(text.starts_with("OCTOBER 2026  Fri 16 - Mon 19\n"));
        assert!(text.contains("  [ ] 7: Ship report  @Ana\n"));
        assert!(text.contains("      SUN 18: waiting on numbers\n"));
        assert!(text.contains("  ... 2 more done\n"));
        assert!(text.contains("Later [2]\n  (no tasks)\n"));
    }

    #[test]
    fn day_arguments_are_validated() {
        assert_eq!(parse_day(None).unwrap(), None);
        assert_eq!(parse_day(Some(" ")).unwrap(), None);
        assert_eq!(parse_day(Some("2026-10-16")).unwrap(), Some(d("2026-10-16")));
        assert!(parse_day(Some("16.10.2026")).is_err());
    }
}
