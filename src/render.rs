//! Builds the task × day matrix shown by the TUI and the `show` command.
//!
//! Everything here is a pure function of the board state and the window;
//! drawing to a terminal happens elsewhere.

use crate::model::{BoardState, Category, CategoryId, PersonId, Task, TaskId};
use crate::week::{day_label, month_title, short_day_label, WindowRule};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Done tasks shown per category while it is collapsed.
pub const VISIBLE_DONE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TaskOrder {
    /// Tasks in the order the backend returns them
    Insertion,
    /// Open tasks first, then done tasks by most recent completion
    #[default]
    DoneLast,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub title: String,
    pub range_label: String,
    pub days: Vec<DayHeader>,
    pub groups: Vec<CategoryGroup>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayHeader {
    pub date: NaiveDate,
    pub label: String,
    pub is_today: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Even,
    Odd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGroup {
    pub category_id: CategoryId,
    pub name: String,
    pub color: String,
    pub band: Band,
    pub rows: Vec<MatrixRow>,
    pub hidden_done: usize,
    pub expanded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatrixRow {
    /// Stand-in row for a category without tasks.
    Placeholder,
    Task(TaskRow),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRow {
    pub task_id: TaskId,
    pub text: String,
    pub done: bool,
    pub person_id: Option<PersonId>,
    pub person_name: Option<String>,
    pub cells: Vec<NoteCell>,
    pub previews: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteCell {
    pub date: NaiveDate,
    pub content: String,
}

impl Matrix {
    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|g| g.rows.len()).sum()
    }

    #[cfg(test)]
    pub fn group(&self, category_id: CategoryId) -> Option<&CategoryGroup> {
        self.groups.iter().find(|g| g.category_id == category_id)
    }
}

#[cfg(test)]
impl CategoryGroup {
    pub fn task_rows(&self) -> impl Iterator<Item = &TaskRow> {
        self.rows.iter().filter_map(|row| match row {
            MatrixRow::Task(task) => Some(task),
            MatrixRow::Placeholder => None,
        })
    }
}

pub fn render_matrix(
    state: &BoardState,
    rule: &WindowRule,
    today: NaiveDate,
    order: TaskOrder,
) -> Matrix {
    let dates = rule.dates(state.week_start);
    let days = dates
        .iter()
        .map(|&date| DayHeader {
            date,
            label: day_label(date),
            is_today: date == today,
        })
        .collect();
    let groups = state
        .categories
        .iter()
        .enumerate()
        .map(|(idx, category)| render_group(state, category, idx, &dates, order))
        .collect();
    Matrix {
        title: month_title(state.week_start),
        range_label: rule.range_label(state.week_start),
        days,
        groups,
    }
}

fn render_group(
    state: &BoardState,
    category: &Category,
    idx: usize,
    dates: &[NaiveDate],
    order: TaskOrder,
) -> CategoryGroup {
    let expanded = state.is_expanded(category.id);
    let (tasks, hidden_done) = order_tasks(state, &category.tasks, order, expanded);
    let rows = if category.tasks.is_empty() {
        vec![MatrixRow::Placeholder]
    } else {
        tasks
            .into_iter()
            .map(|task| MatrixRow::Task(render_task(state, task, dates)))
            .collect()
    };
    CategoryGroup {
        category_id: category.id,
        name: category.name.clone(),
        color: category.color.clone(),
        band: if idx % 2 == 0 { Band::Even } else { Band::Odd },
        rows,
        hidden_done,
        expanded,
    }
}

fn order_tasks<'a>(
    state: &BoardState,
    tasks: &'a [Task],
    order: TaskOrder,
    expanded: bool,
) -> (Vec<&'a Task>, usize) {
    match order {
        TaskOrder::Insertion => (tasks.iter().collect(), 0),
        TaskOrder::DoneLast => {
            let mut ordered: Vec<&Task> = tasks.iter().filter(|t| !t.done).collect();
            let mut done: Vec<&Task> = tasks.iter().filter(|t| t.done).collect();
            // Stable: untimed done tasks trail in insertion order.
            done.sort_by(|a, b| {
                let a_ts = state.done_timestamps.get(&a.id);
                let b_ts = state.done_timestamps.get(&b.id);
                b_ts.cmp(&a_ts)
            });
            let mut hidden = 0;
            if !expanded && done.len() > VISIBLE_DONE {
                hidden = done.len() - VISIBLE_DONE;
                done.truncate(VISIBLE_DONE);
            }
            ordered.extend(done);
            (ordered, hidden)
        }
    }
}

fn render_task(state: &BoardState, task: &Task, dates: &[NaiveDate]) -> TaskRow {
    let cells: Vec<NoteCell> = dates
        .iter()
        .map(|&date| NoteCell {
            date,
            content: state
                .note_for(task.id, date)
                .map(|n| n.content.clone())
                .unwrap_or_default(),
        })
        .collect();
    let previews = cells
        .iter()
        .filter(|cell| !cell.content.trim().is_empty())
        .map(|cell| format!("({}) {}", short_day_label(cell.date), cell.content))
        .collect();
    TaskRow {
        task_id: task.id,
        text: task.text.clone(),
        done: task.done,
        person_id: task.person_id,
        person_name: task
            .person_id
            .and_then(|id| state.find_person(id))
            .map(|p| p.name.clone()),
        cells,
        previews,
    }
}
