use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

pub type CategoryId = i64;
pub type TaskId = i64;
pub type PersonId = i64;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub category_id: CategoryId,
    pub text: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub person_id: Option<PersonId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
}

/// Free-text annotation keyed by `(task_id, date)`.
///
/// An empty `content` means the same as no note at all.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Note {
    pub task_id: TaskId,
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BoardError {
    #[error("category not found: {0}")]
    CategoryNotFound(CategoryId),
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("person not found: {0}")]
    PersonNotFound(PersonId),
    #[error("category {0} cannot move further")]
    CategoryAtEdge(CategoryId),
}

/// One order update of a category move. `from` is the order the category
/// is displayed with before the move; `stored` is what the backend holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderChange {
    pub category_id: CategoryId,
    pub stored: Option<i64>,
    pub from: i64,
    pub to: i64,
}

impl OrderChange {
    /// True when the update also writes a position the backend never had.
    pub fn renumbers(&self) -> bool {
        self.stored != Some(self.from)
    }
}

/// Client-side cache of the board plus the view state that never leaves
/// the client (`done_timestamps`, `expanded_done`).
#[derive(Debug, Clone, PartialEq)]
pub struct BoardState {
    pub categories: Vec<Category>,
    pub people: Vec<Person>,
    pub notes: Vec<Note>,
    pub week_start: NaiveDate,
    pub done_timestamps: HashMap<TaskId, i64>,
    pub expanded_done: HashMap<CategoryId, bool>,
}

impl BoardState {
    pub fn new(week_start: NaiveDate) -> Self {
        BoardState {
            categories: Vec::new(),
            people: Vec::new(),
            notes: Vec::new(),
            week_start,
            done_timestamps: HashMap::new(),
            expanded_done: HashMap::new(),
        }
    }

    pub fn replace_board(&mut self, mut categories: Vec<Category>, people: Vec<Person>) {
        sort_categories(&mut categories);
        self.categories = categories;
        self.people = people;
    }

    /// Replaces the note cache. Notes with empty content are dropped since
    /// they read the same as no note.
    pub fn replace_notes(&mut self, mut notes: Vec<Note>) {
        notes.retain(|n| !n.content.is_empty());
        self.notes = notes;
    }

    pub fn find_category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn find_task(&self, id: TaskId) -> Option<&Task> {
        self.categories
            .iter()
            .flat_map(|c| c.tasks.iter())
            .find(|t| t.id == id)
    }

    pub fn find_person(&self, id: PersonId) -> Option<&Person> {
        self.people.iter().find(|p| p.id == id)
    }

    pub fn note_for(&self, task_id: TaskId, date: NaiveDate) -> Option<&Note> {
        self.notes
            .iter()
            .find(|n| n.task_id == task_id && n.date == date)
    }

    /// Inserts or replaces a task as returned by the backend. A task whose
    /// `category_id` changed is moved to the end of its new category.
    pub fn upsert_task(&mut self, task: Task) -> Result<(), BoardError> {
        let target = self
            .categories
            .iter()
            .position(|c| c.id == task.category_id)
            .ok_or(BoardError::CategoryNotFound(task.category_id))?;
        if let Some(slot) = self.categories[target]
            .tasks
            .iter_mut()
            .find(|t| t.id == task.id)
        {
            *slot = task;
            return Ok(());
        }
        for category in self.categories.iter_mut() {
            category.tasks.retain(|t| t.id != task.id);
        }
        self.categories[target].tasks.push(task);
        Ok(())
    }

    pub fn remove_task(&mut self, id: TaskId) -> Result<Task, BoardError> {
        for category in self.categories.iter_mut() {
            if let Some(idx) = category.tasks.iter().position(|t| t.id == id) {
                let task = category.tasks.remove(idx);
                self.notes.retain(|n| n.task_id != id);
                self.done_timestamps.remove(&id);
                return Ok(task);
            }
        }
        Err(BoardError::TaskNotFound(id))
    }

    /// Applies a category returned by POST/PUT. Those responses carry no
    /// tasks, so an existing category keeps the tasks already cached.
    pub fn upsert_category(&mut self, mut category: Category) {
        if let Some(existing) = self.categories.iter_mut().find(|c| c.id == category.id) {
            category.tasks = std::mem::take(&mut existing.tasks);
            *existing = category;
        } else {
            self.categories.push(category);
        }
        sort_categories(&mut self.categories);
    }

    pub fn remove_category(&mut self, id: CategoryId) -> Result<Category, BoardError> {
        let idx = self
            .categories
            .iter()
            .position(|c| c.id == id)
            .ok_or(BoardError::CategoryNotFound(id))?;
        let category = self.categories.remove(idx);
        for task in &category.tasks {
            self.notes.retain(|n| n.task_id != task.id);
            self.done_timestamps.remove(&task.id);
        }
        self.expanded_done.remove(&id);
        Ok(category)
    }

    pub fn upsert_person(&mut self, person: Person) {
        if let Some(existing) = self.people.iter_mut().find(|p| p.id == person.id) {
            *existing = person;
        } else {
            self.people.push(person);
        }
    }

    /// Removes a person and unassigns every task that pointed at them.
    pub fn remove_person(&mut self, id: PersonId) -> Result<Person, BoardError> {
        let idx = self
            .people
            .iter()
            .position(|p| p.id == id)
            .ok_or(BoardError::PersonNotFound(id))?;
        let person = self.people.remove(idx);
        for task in self.categories.iter_mut().flat_map(|c| c.tasks.iter_mut()) {
            if task.person_id == Some(id) {
                task.person_id = None;
            }
        }
        Ok(person)
    }

    /// Upserts a note by `(task_id, date)`; empty content removes it.
    pub fn apply_note(&mut self, note: Note) {
        let existing = self
            .notes
            .iter()
            .position(|n| n.task_id == note.task_id && n.date == note.date);
        match (existing, note.content.is_empty()) {
            (Some(idx), true) => {
                self.notes.remove(idx);
            }
            (Some(idx), false) => self.notes[idx] = note,
            (None, true) => {}
            (None, false) => self.notes.push(note),
        }
    }

    pub fn record_done(&mut self, task_id: TaskId, done: bool, at_ms: i64) {
        if done {
            self.done_timestamps.insert(task_id, at_ms);
        } else {
            self.done_timestamps.remove(&task_id);
        }
    }

    pub fn is_expanded(&self, category_id: CategoryId) -> bool {
        self.expanded_done
            .get(&category_id)
            .copied()
            .unwrap_or(false)
    }

    /// Flips the show-all flag for a category's done tasks and returns the
    /// new value.
    pub fn toggle_expanded(&mut self, category_id: CategoryId) -> bool {
        let next = !self.is_expanded(category_id);
        self.expanded_done.insert(category_id, next);
        next
    }

    /// Order values as displayed. Explicit orders are used when every
    /// category has one and they are strictly increasing; otherwise the
    /// 1-based array position stands in.
    pub fn effective_orders(&self) -> Vec<i64> {
        let explicit: Option<Vec<i64>> = self.categories.iter().map(|c| c.order).collect();
        match explicit {
            Some(orders) if orders.windows(2).all(|w| w[0] < w[1]) => orders,
            _ => (1..=self.categories.len() as i64).collect(),
        }
    }

    /// Computes the order updates that swap a category with its neighbour
    /// in `direction`. The swapped pair comes first. When the stored orders
    /// are missing or not strictly increasing, every category whose stored
    /// order differs from its new position is renumbered as well, so the
    /// whole list sorts the same way on the next load.
    pub fn swap_plan(
        &self,
        id: CategoryId,
        direction: MoveDirection,
    ) -> Result<Vec<OrderChange>, BoardError> {
        let idx = self
            .categories
            .iter()
            .position(|c| c.id == id)
            .ok_or(BoardError::CategoryNotFound(id))?;
        let other = match direction {
            MoveDirection::Up if idx > 0 => idx - 1,
            MoveDirection::Down if idx + 1 < self.categories.len() => idx + 1,
            _ => return Err(BoardError::CategoryAtEdge(id)),
        };
        let before = self.effective_orders();
        let mut after = before.clone();
        after.swap(idx, other);

        let change = |pos: usize| OrderChange {
            category_id: self.categories[pos].id,
            stored: self.categories[pos].order,
            from: before[pos],
            to: after[pos],
        };
        let mut plan = vec![change(idx), change(other)];
        plan.extend(
            (0..self.categories.len())
                .filter(|&pos| pos != idx && pos != other)
                .map(change)
                .filter(|c| c.stored != Some(c.to)),
        );
        Ok(plan)
    }
}

fn sort_categories(categories: &mut [Category]) {
    categories.sort_by_key(|c| c.order);
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn task(id: TaskId, category_id: CategoryId, text: &str) -> Task {
        Task {
            id,
            category_id,
            text: text.into(),
            done: false,
            person_id: None,
            order: None,
        }
    }

    fn category(id: CategoryId, order: Option<i64>, tasks: Vec<Task>) -> Category {
        Category {
            id,
            name: format!("cat {}", id),
            color: "#336699".into(),
            order,
            tasks,
        }
    }

    fn sample() -> BoardState {
        let mut state = BoardState::new(date("2026-10-16"));
        state.replace_board(
            vec![
                category(2, Some(2), vec![task(20, 2, "second")]),
                category(1, Some(1), vec![task(10, 1, "first"), task(11, 1, "other")]),
            ],
            vec![Person {
                id: 5,
                name: "Ana".into(),
            }],
        );
        state
    }

    #[test]
    fn replace_board_sorts_by_order() {
        let state = sample();
        let ids: Vec<_> = state.categories.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn note_deserializes_null_content_as_empty() {
        let note: Note =
            serde_json::from_str(r#"{"id":3,"task_id":7,"date":"2026-10-16","content":null}"#)
                .unwrap();
        assert_eq!(note.content, "");
        assert_eq!(note.date, date("2026-10-16"));
    }

    #[test]
    fn category_without_tasks_field_deserializes() {
        let cat: Category =
            serde_json::from_str(r##"{"id":1,"name":"Ops","color":"#fff","order":3}"##).unwrap();
        assert!(cat.tasks.is_empty());
        assert_eq!(cat.order, Some(3));
    }

    #[test]
    fn upsert_task_replaces_in_place_and_moves_between_categories() {
        let mut state = sample();
        let mut edited = task(10, 1, "renamed");
        edited.done = true;
        state.upsert_task(edited).unwrap();
        assert_eq!(state.categories[0].tasks[0].text, "renamed");

        state.upsert_task(task(11, 2, "moved")).unwrap();
        assert_eq!(state.categories[0].tasks.len(), 1);
        assert_eq!(state.categories[1].tasks.last().unwrap().id, 11);

        assert_eq!(
            state.upsert_task(task(99, 42, "orphan")),
            Err(BoardError::CategoryNotFound(42))
        );
    }

    #[test]
    fn remove_task_drops_its_notes_and_timestamp() {
        let mut state = sample();
        state.apply_note(Note {
            task_id: 10,
            date: date("2026-10-16"),
            content: "x".into(),
        });
        state.record_done(10, true, 1_000);
        state.remove_task(10).unwrap();
        assert!(state.notes.is_empty());
        assert!(state.done_timestamps.is_empty());
        assert_eq!(state.remove_task(10), Err(BoardError::TaskNotFound(10)));
    }

    #[test]
    fn upsert_category_keeps_cached_tasks() {
        let mut state = sample();
        let mut renamed = category(1, Some(1), Vec::new());
        renamed.name = "Renamed".into();
        state.upsert_category(renamed);
        assert_eq!(state.categories[0].name, "Renamed");
        assert_eq!(state.categories[0].tasks.len(), 2);
    }

    #[test]
    fn remove_person_unassigns_tasks() {
        let mut state = sample();
        let mut assigned = task(10, 1, "first");
        assigned.person_id = Some(5);
        state.upsert_task(assigned).unwrap();
        state.remove_person(5).unwrap();
        assert_eq!(state.find_task(10).unwrap().person_id, None);
        assert!(state.people.is_empty());
    }

    #[test]
    fn apply_note_upserts_and_empty_content_removes() {
        let mut state = sample();
        let d = date("2026-10-17");
        state.apply_note(Note {
            task_id: 10,
            date: d,
            content: "draft".into(),
        });
        state.apply_note(Note {
            task_id: 10,
            date: d,
            content: "final".into(),
        });
        assert_eq!(state.notes.len(), 1);
        assert_eq!(state.note_for(10, d).unwrap().content, "final");

        state.apply_note(Note {
            task_id: 10,
            date: d,
            content: String::new(),
        });
        assert!(state.note_for(10, d).is_none());
    }

    #[test]
    fn expansion_is_per_category() {
        let mut state = sample();
        assert!(state.toggle_expanded(1));
        assert!(state.is_expanded(1));
        assert!(!state.is_expanded(2));
        assert!(!state.toggle_expanded(1));
    }

    #[test]
    fn swap_plan_exchanges_neighbour_orders() {
        let state = sample();
        let plan = state.swap_plan(2, MoveDirection::Up).unwrap();
        assert_eq!(
            plan,
            vec![
                OrderChange {
                    category_id: 2,
                    stored: Some(2),
                    from: 2,
                    to: 1
                },
                OrderChange {
                    category_id: 1,
                    stored: Some(1),
                    from: 1,
                    to: 2
                },
            ]
        );
        assert!(plan.iter().all(|c| !c.renumbers()));
        assert_eq!(
            state.swap_plan(1, MoveDirection::Up),
            Err(BoardError::CategoryAtEdge(1))
        );
    }

    fn targets(plan: &[OrderChange]) -> Vec<(CategoryId, i64)> {
        let mut targets: Vec<_> = plan.iter().map(|c| (c.category_id, c.to)).collect();
        targets.sort();
        targets
    }

    #[test]
    fn tied_orders_renumber_every_category() {
        let mut state = BoardState::new(date("2026-10-16"));
        state.replace_board(
            vec![
                category(1, Some(0), Vec::new()),
                category(2, Some(0), Vec::new()),
                category(3, Some(0), Vec::new()),
            ],
            Vec::new(),
        );
        let plan = state.swap_plan(1, MoveDirection::Down).unwrap();
        assert_eq!(plan[0].category_id, 1);
        assert_eq!(plan[1].category_id, 2);
        assert_eq!(targets(&plan), vec![(1, 2), (2, 1), (3, 3)]);
        assert!(plan.iter().all(|c| c.renumbers()));
    }

    #[test]
    fn missing_orders_renumber_every_category() {
        let mut state = BoardState::new(date("2026-10-16"));
        state.replace_board(
            vec![
                category(1, None, Vec::new()),
                category(2, None, Vec::new()),
                category(3, None, Vec::new()),
            ],
            Vec::new(),
        );
        let plan = state.swap_plan(3, MoveDirection::Up).unwrap();
        assert_eq!(targets(&plan), vec![(1, 1), (2, 3), (3, 2)]);
    }

    #[test]
    fn categories_already_at_their_position_are_skipped() {
        let mut state = BoardState::new(date("2026-10-16"));
        state.replace_board(
            vec![
                category(1, Some(1), Vec::new()),
                category(2, Some(1), Vec::new()),
                category(3, Some(3), Vec::new()),
            ],
            Vec::new(),
        );
        let plan = state.swap_plan(2, MoveDirection::Up).unwrap();
        assert_eq!(targets(&plan), vec![(1, 2), (2, 1)]);
    }
}
