mod ui;
mod widgets;

use std::collections::HashSet;
use std::io;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::completion::{CompletionOutcome, CompletionStore};
use crate::db::Database;
use crate::error::{ProgressError, Result as ProgressResult};
use crate::local_store::LocalStore;
use crate::models::{Actor, CompletionRecord, SubjectKind, SubjectRef, SubjectStatus};
use crate::tracker::{select_store, ChecklistProgress, PartialProgress, Stats, Tracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Dashboard,
    Hacks,
    Routines,
    Levels,
    Detail,
}

impl View {
    fn next(&self) -> Self {
        match self {
            View::Dashboard => View::Hacks,
            View::Hacks => View::Routines,
            View::Routines => View::Levels,
            View::Levels => View::Dashboard,
            View::Detail => View::Detail,
        }
    }

    fn prev(&self) -> Self {
        match self {
            View::Dashboard => View::Levels,
            View::Hacks => View::Dashboard,
            View::Routines => View::Hacks,
            View::Levels => View::Routines,
            View::Detail => View::Detail,
        }
    }

    fn kind(&self) -> Option<SubjectKind> {
        match self {
            View::Hacks => Some(SubjectKind::Hack),
            View::Routines => Some(SubjectKind::Routine),
            View::Levels => Some(SubjectKind::Level),
            View::Dashboard | View::Detail => None,
        }
    }
}

pub struct StatefulList<T> {
    pub items: Vec<T>,
    pub selected: Option<usize>,
}

impl<T> StatefulList<T> {
    fn with_items(items: Vec<T>) -> Self {
        let selected = if items.is_empty() { None } else { Some(0) };
        Self { items, selected }
    }

    // Keeps the cursor where it was, clamped to the new length
    fn replace_items(&mut self, items: Vec<T>) {
        self.selected = match (self.selected, items.len()) {
            (_, 0) => None,
            (Some(i), len) => Some(i.min(len - 1)),
            (None, _) => Some(0),
        };
        self.items = items;
    }

    fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(i) if i + 1 < self.items.len() => i + 1,
            _ => 0,
        };
        self.selected = Some(i);
    }

    fn previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(0) | None => self.items.len() - 1,
            Some(i) => i - 1,
        };
        self.selected = Some(i);
    }

    fn selected_item(&self) -> Option<&T> {
        self.selected.and_then(|i| self.items.get(i))
    }
}

/// Stands in when the actor's progress cannot be read: nothing counts as
/// completed, so anything behind a prerequisite shows locked.
struct NoProgress;

impl CompletionStore for NoProgress {
    fn get(&self, _actor: &Actor, _subject: SubjectRef) -> ProgressResult<Option<CompletionRecord>> {
        Ok(None)
    }

    fn record_if_cooled(
        &self,
        _actor: &Actor,
        _subject: SubjectRef,
        _now: DateTime<Utc>,
        _cooldown: chrono::Duration,
    ) -> ProgressResult<Option<CompletionRecord>> {
        Ok(None)
    }

    fn completed_ids(&self, _actor: &Actor, _kind: SubjectKind) -> ProgressResult<HashSet<i64>> {
        Ok(HashSet::new())
    }
}

pub struct PrerequisiteLine {
    pub id: i64,
    pub name: Option<String>,
    pub done: bool,
}

pub struct SubjectDetail {
    pub status: SubjectStatus,
    pub prerequisites: Vec<PrerequisiteLine>,
    pub level_progress: Option<PartialProgress>,
    pub checklist: Option<ChecklistProgress>,
}

pub struct App<'a> {
    db: &'a Database,
    local: &'a LocalStore,
    pub actor: Actor,
    pub view: View,
    pub detail_parent: View,
    pub hacks: StatefulList<SubjectStatus>,
    pub routines: StatefulList<SubjectStatus>,
    pub levels: StatefulList<SubjectStatus>,
    pub selected: Option<SubjectDetail>,
    pub stats: Stats,
    pub ready: Vec<SubjectStatus>,
    pub status_message: Option<String>,
    pub should_quit: bool,
}

impl<'a> App<'a> {
    pub fn new(db: &'a Database, local: &'a LocalStore, actor: Actor) -> Self {
        let mut app = Self {
            db,
            local,
            actor,
            view: View::Dashboard,
            detail_parent: View::Hacks,
            hacks: StatefulList::with_items(Vec::new()),
            routines: StatefulList::with_items(Vec::new()),
            levels: StatefulList::with_items(Vec::new()),
            selected: None,
            stats: Stats::default(),
            ready: Vec::new(),
            status_message: None,
            should_quit: false,
        };
        app.refresh_data();
        app
    }

    fn tracker(&self) -> Tracker<'a> {
        Tracker::new(
            self.db,
            select_store(&self.actor, self.db, self.local),
            self.actor.clone(),
        )
    }

    fn load_statuses(&mut self, kind: SubjectKind, now: DateTime<Utc>) -> Vec<SubjectStatus> {
        match self.tracker().statuses(kind, now) {
            Ok(statuses) => statuses,
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "progress unavailable");
                self.status_message = Some(format!("Progress unavailable: {}", e));
                Tracker::new(self.db, &NoProgress, self.actor.clone())
                    .statuses(kind, now)
                    .unwrap_or_default()
            }
        }
    }

    pub fn refresh_data(&mut self) {
        let now = Utc::now();
        let hacks = self.load_statuses(SubjectKind::Hack, now);
        let routines = self.load_statuses(SubjectKind::Routine, now);
        let levels = self.load_statuses(SubjectKind::Level, now);

        self.stats = Stats::from_statuses(hacks.iter().chain(&routines).chain(&levels));
        self.ready = hacks
            .iter()
            .chain(&routines)
            .filter(|s| s.is_ready())
            .take(5)
            .cloned()
            .collect();

        self.hacks.replace_items(hacks);
        self.routines.replace_items(routines);
        self.levels.replace_items(levels);

        if let Some(id) = self.selected.as_ref().map(|d| d.status.subject.id) {
            self.open_detail(id);
        }
    }

    fn list(&self, view: View) -> Option<&StatefulList<SubjectStatus>> {
        match view {
            View::Hacks => Some(&self.hacks),
            View::Routines => Some(&self.routines),
            View::Levels => Some(&self.levels),
            View::Dashboard | View::Detail => None,
        }
    }

    fn list_mut(&mut self, view: View) -> Option<&mut StatefulList<SubjectStatus>> {
        match view {
            View::Hacks => Some(&mut self.hacks),
            View::Routines => Some(&mut self.routines),
            View::Levels => Some(&mut self.levels),
            View::Dashboard | View::Detail => None,
        }
    }

    fn selected_subject_id(&self) -> Option<i64> {
        match self.view {
            View::Detail => self.selected.as_ref().map(|d| d.status.subject.id),
            view => self
                .list(view)
                .and_then(|l| l.selected_item())
                .map(|s| s.subject.id),
        }
    }

    fn open_detail(&mut self, id: i64) {
        match self.load_detail(id) {
            Ok(detail) => self.selected = Some(detail),
            Err(e) => {
                self.status_message = Some(format!("Could not load {}: {}", id, e));
                self.selected = None;
                if self.view == View::Detail {
                    self.view = self.detail_parent;
                }
            }
        }
    }

    fn load_detail(&self, id: i64) -> ProgressResult<SubjectDetail> {
        let tracker = self.tracker();
        let status = tracker.status(id, Utc::now())?;
        let kind = status.subject.kind;
        let completed = tracker.completed(kind)?;

        let mut prerequisites = Vec::new();
        for required in tracker.graph(kind)?.prerequisites_of(id) {
            prerequisites.push(PrerequisiteLine {
                id: required,
                name: self.db.get_subject(required)?.map(|s| s.name),
                done: completed.contains(&required),
            });
        }

        let level_progress = match kind {
            SubjectKind::Level => Some(tracker.level_progress(id)?),
            _ => None,
        };
        let checklist = match tracker.checklist(id) {
            Ok(checklist) => Some(checklist),
            Err(ProgressError::AccountRequired) => None,
            Err(e) => return Err(e),
        };

        Ok(SubjectDetail {
            status,
            prerequisites,
            level_progress,
            checklist,
        })
    }

    fn select_current(&mut self) {
        if let Some(id) = self.selected_subject_id() {
            self.detail_parent = self.view;
            self.view = View::Detail;
            self.open_detail(id);
        }
    }

    fn close_detail(&mut self) {
        self.view = self.detail_parent;
        self.selected = None;
    }

    fn complete_selected(&mut self) {
        let Some(id) = self.selected_subject_id() else {
            return;
        };
        let message = match self.tracker().complete(id, Utc::now()) {
            Ok(CompletionOutcome::Recorded { count, first: true }) => {
                format!("First completion! ({}x)", count)
            }
            Ok(CompletionOutcome::Recorded { count, .. }) => format!("Completed ({}x)", count),
            Ok(CompletionOutcome::CoolingDown { remaining_minutes }) => {
                format!("Cooling down, try again in {} min", remaining_minutes)
            }
            Err(ProgressError::Locked { name, missing }) => {
                format!("'{}' is locked, complete {:?} first", name, missing)
            }
            Err(e) => format!("Could not record completion: {}", e),
        };
        self.status_message = Some(message);
        self.refresh_data();
    }

    fn handle_key(&mut self, key: KeyCode, modifiers: KeyModifiers) {
        match key {
            KeyCode::Char('q') => self.should_quit = true,

            KeyCode::Char('r') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.status_message = None;
                self.refresh_data();
            }

            KeyCode::Char('c') => self.complete_selected(),

            KeyCode::Esc => {
                if self.view == View::Detail {
                    self.close_detail();
                } else {
                    self.status_message = None;
                }
            }

            KeyCode::Char('h') | KeyCode::Left => match self.view {
                View::Detail => self.close_detail(),
                _ => self.view = self.view.prev(),
            },
            KeyCode::Char('l') | KeyCode::Right => match self.view {
                View::Hacks | View::Routines | View::Levels => self.select_current(),
                _ => self.view = self.view.next(),
            },

            KeyCode::Tab if self.view != View::Detail => {
                if modifiers.contains(KeyModifiers::SHIFT) {
                    self.view = self.view.prev();
                } else {
                    self.view = self.view.next();
                }
            }
            KeyCode::BackTab if self.view != View::Detail => {
                self.view = self.view.prev();
            }

            KeyCode::Char('j') | KeyCode::Down => {
                if let Some(list) = self.list_mut(self.view) {
                    list.next();
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if let Some(list) = self.list_mut(self.view) {
                    list.previous();
                }
            }

            KeyCode::Char('g') => {
                if let Some(list) = self.list_mut(self.view) {
                    if !list.items.is_empty() {
                        list.selected = Some(0);
                    }
                }
            }
            KeyCode::Char('G') => {
                if let Some(list) = self.list_mut(self.view) {
                    if !list.items.is_empty() {
                        list.selected = Some(list.items.len() - 1);
                    }
                }
            }

            KeyCode::Enter if self.view.kind().is_some() => self.select_current(),

            _ => {}
        }
    }
}

pub fn run(
    db: &Database,
    local: &LocalStore,
    actor: Actor,
) -> Result<(), Box<dyn std::error::Error>> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(db, local, actor);

    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key.code, key.modifiers);
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::Tier;

    fn setup_db() -> Database {
        let db = Database::open(":memory:").expect("Failed to create in-memory database");
        db.init().expect("Failed to initialize database");
        db
    }

    fn press(app: &mut App, key: KeyCode) {
        app.handle_key(key, KeyModifiers::NONE);
    }

    mod navigation_tests {
        use super::*;

        #[test]
        fn views_cycle() {
            let db = setup_db();
            let dir = tempfile::tempdir().unwrap();
            let local = LocalStore::new(dir.path());
            let mut app = App::new(&db, &local, Actor::Anonymous);

            assert_eq!(app.view, View::Dashboard);
            press(&mut app, KeyCode::Tab);
            assert_eq!(app.view, View::Hacks);
            press(&mut app, KeyCode::Char('l'));
            // Empty list, nothing to open
            assert_eq!(app.view, View::Hacks);
            press(&mut app, KeyCode::Char('h'));
            press(&mut app, KeyCode::Char('h'));
            assert_eq!(app.view, View::Levels);
        }

        #[test]
        fn replace_items_keeps_cursor() {
            let mut list = StatefulList::with_items(vec![1, 2, 3]);
            list.next();
            list.next();
            list.replace_items(vec![1, 2]);
            assert_eq!(list.selected, Some(1));
            list.replace_items(vec![]);
            assert_eq!(list.selected, None);
        }

        #[test]
        fn list_wraps() {
            let mut list = StatefulList::with_items(vec!['a', 'b']);
            list.previous();
            assert_eq!(list.selected_item(), Some(&'b'));
            list.next();
            assert_eq!(list.selected_item(), Some(&'a'));
        }
    }

    mod completion_tests {
        use super::*;

        #[test]
        fn complete_from_detail_unlocks_dependent() {
            let db = setup_db();
            let dir = tempfile::tempdir().unwrap();
            let local = LocalStore::new(dir.path());
            let pomodoro = db
                .add_subject(SubjectKind::Hack, "Pomodoro Technique", None, None)
                .unwrap();
            let breathing = db
                .add_subject(SubjectKind::Hack, "Box Breathing", None, None)
                .unwrap();
            db.add_prerequisite(breathing, pomodoro).unwrap();

            let mut app = App::new(&db, &local, Actor::Anonymous);
            // Sorted by name, so Box Breathing comes first
            assert_eq!(app.hacks.items[0].tier, Tier::Locked);

            press(&mut app, KeyCode::Tab);
            press(&mut app, KeyCode::Char('j'));
            press(&mut app, KeyCode::Enter);
            assert_eq!(app.view, View::Detail);
            press(&mut app, KeyCode::Char('c'));

            let detail = app.selected.as_ref().unwrap();
            assert_eq!(detail.status.tier, Tier::Green);
            assert!(detail.checklist.is_none());
            assert_eq!(app.hacks.items[0].tier, Tier::Gray);
            assert_eq!(app.stats.total_completions, 1);

            press(&mut app, KeyCode::Char('c'));
            assert!(app
                .status_message
                .as_deref()
                .unwrap()
                .starts_with("Cooling down"));

            press(&mut app, KeyCode::Esc);
            assert_eq!(app.view, View::Hacks);
            assert!(app.selected.is_none());
        }

        #[test]
        fn locked_subject_reports_why() {
            let db = setup_db();
            let a = db.add_subject(SubjectKind::Routine, "Wake", None, None).unwrap();
            let b = db.add_subject(SubjectKind::Routine, "Wind down", None, None).unwrap();
            db.add_prerequisite(b, a).unwrap();
            let dir = tempfile::tempdir().unwrap();
            let local = LocalStore::new(dir.path());
            let mut app = App::new(&db, &local, Actor::Anonymous);

            app.view = View::Routines;
            press(&mut app, KeyCode::Char('j'));
            press(&mut app, KeyCode::Char('c'));
            assert!(app.status_message.as_deref().unwrap().contains("is locked"));
            assert_eq!(app.routines.items[1].completion_count, 0);
        }

        #[test]
        fn unreadable_progress_shows_everything_locked() {
            let db = setup_db();
            let a = db.add_subject(SubjectKind::Hack, "A", None, None).unwrap();
            let b = db.add_subject(SubjectKind::Hack, "B", None, None).unwrap();
            db.add_prerequisite(b, a).unwrap();

            // A directory where the progress file should be makes every read fail
            let dir = tempfile::tempdir().unwrap();
            let local = LocalStore::new(dir.path());
            std::fs::create_dir(local.path()).unwrap();

            let app = App::new(&db, &local, Actor::Anonymous);
            assert!(app
                .status_message
                .as_deref()
                .unwrap()
                .starts_with("Progress unavailable"));
            assert_eq!(app.hacks.items.len(), 2);
            assert_eq!(app.hacks.items[0].tier, Tier::Gray);
            assert_eq!(app.hacks.items[1].tier, Tier::Locked);
        }
    }
}
