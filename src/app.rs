use crate::api::{ApiClient, ApiError, TaskSnapshot};
use crate::cache::{FetchTicket, TaskCache};
use crate::models::{Mentor, NewTask, SubmissionReceipt, Task, TaskPatch};
use crate::parser::QuickAddParser;
use crate::views::{self, MentorQuery, TaskBoard, TaskQuery};
use chrono::{DateTime, Duration, Utc};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::widgets::ListState;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// Due date given to quick-added tasks without a `^date` marker.
const DEFAULT_DUE_DAYS: i64 = 7;

/// Results of background requests, delivered back to the event loop.
#[derive(Debug)]
pub enum AppEvent {
    TasksLoaded {
        ticket: FetchTicket,
        snapshot: TaskSnapshot,
    },
    TaskLoaded(Task),
    TaskSaved(Task),
    Submitted(SubmissionReceipt),
    TaskDeleted(String),
    Failed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Tasks,
    Mentors,
}

impl Page {
    pub const ALL: [Page; 3] = [Page::Dashboard, Page::Tasks, Page::Mentors];

    pub fn title(&self) -> &'static str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::Tasks => "Tasks",
            Page::Mentors => "Mentors",
        }
    }

    fn next(&self) -> Page {
        match self {
            Page::Dashboard => Page::Tasks,
            Page::Tasks => Page::Mentors,
            Page::Mentors => Page::Dashboard,
        }
    }
}

/// Which bucket the tasks page shows while no search is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket {
    DeadlineSoon,
    Newest,
    Recommended,
}

impl Bucket {
    pub fn title(&self) -> &'static str {
        match self {
            Bucket::DeadlineSoon => "Time Limit",
            Bucket::Newest => "New Tasks",
            Bucket::Recommended => "Recommended",
        }
    }

    fn next(&self) -> Bucket {
        match self {
            Bucket::DeadlineSoon => Bucket::Newest,
            Bucket::Newest => Bucket::Recommended,
            Bucket::Recommended => Bucket::DeadlineSoon,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
    Create,
    Submit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveInput {
    QuickAdd,
    Description,
}

/// One line of feedback in the footer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub is_error: bool,
}

pub struct App {
    pub api: ApiClient,
    pub cache: TaskCache,
    pub mentors: Vec<Mentor>,
    pub page: Page,
    pub bucket: Bucket,
    pub input_mode: InputMode,
    pub active_input: ActiveInput,
    pub query: TaskQuery,
    pub mentor_query: MentorQuery,
    pub task_state: ListState,
    pub mentor_state: ListState,
    /// Task shown in the detail popup.
    pub detail: Option<String>,
    pub new_task_title: String,
    pub new_task_description: String,
    pub submit_paths: String,
    pub notice: Option<Notice>,
    pub loading: bool,
    parser: QuickAddParser,
    tx: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        api: ApiClient,
        parser: QuickAddParser,
        mentors: Vec<Mentor>,
        tx: UnboundedSender<AppEvent>,
    ) -> App {
        let mut mentor_state = ListState::default();
        if !mentors.is_empty() {
            mentor_state.select(Some(0));
        }
        App {
            api,
            cache: TaskCache::new(),
            mentors,
            page: Page::Dashboard,
            bucket: Bucket::DeadlineSoon,
            input_mode: InputMode::Normal,
            active_input: ActiveInput::QuickAdd,
            query: TaskQuery::default(),
            mentor_query: MentorQuery::default(),
            task_state: ListState::default(),
            mentor_state,
            detail: None,
            new_task_title: String::new(),
            new_task_description: String::new(),
            submit_paths: String::new(),
            notice: None,
            loading: false,
            parser,
            tx,
        }
    }

    pub fn is_mentor(&self) -> bool {
        self.api.actor().is_mentor()
    }

    /// Fetches every task in the background. Page filters are applied locally,
    /// so the dashboard always summarizes the whole collection.
    pub fn refresh(&mut self) {
        let ticket = self.cache.begin_fetch();
        let api = self.api.clone();
        let tx = self.tx.clone();
        self.loading = true;
        debug!(?ticket, "refreshing tasks");
        tokio::spawn(async move {
            let snapshot = api.load_tasks(&TaskQuery::default()).await;
            deliver(&tx, AppEvent::TasksLoaded { ticket, snapshot });
        });
    }

    pub fn handle_event(&mut self, event: AppEvent, now: DateTime<Utc>) {
        match event {
            AppEvent::TasksLoaded { ticket, snapshot } => {
                let offline = snapshot.offline;
                if self.cache.apply_fetch(ticket, snapshot.tasks, offline) {
                    self.loading = false;
                    if offline {
                        self.error("API unreachable, showing demo tasks");
                    }
                }
            }
            AppEvent::TaskLoaded(task) => self.cache.upsert(task),
            AppEvent::TaskSaved(task) => {
                self.info(format!("Saved \"{}\" ({})", task.title, task.status.label()));
                self.cache.upsert(task);
            }
            AppEvent::Submitted(receipt) => {
                self.info(format!(
                    "Submitted {} file(s) for \"{}\"",
                    receipt.files.len(),
                    receipt.task.title
                ));
                self.cache.upsert(receipt.task);
            }
            AppEvent::TaskDeleted(id) => {
                if let Some(task) = self.cache.remove(&id) {
                    self.info(format!("Deleted \"{}\"", task.title));
                }
                if self.detail.as_deref() == Some(id.as_str()) {
                    self.detail = None;
                }
            }
            AppEvent::Failed(message) => self.error(message),
        }
        self.clamp_selection(now);
    }

    /// Tasks in the list on the tasks page: search hits, or the current bucket.
    pub fn visible_tasks(&self, now: DateTime<Utc>) -> Vec<Task> {
        let board = TaskBoard::derive(&self.cache.snapshot(), &self.query, now);
        if self.query.is_search() {
            return board.matches;
        }
        match self.bucket {
            Bucket::DeadlineSoon => board.deadline_soon,
            Bucket::Newest => board.newest,
            Bucket::Recommended => board.recommended,
        }
    }

    pub fn visible_mentors(&self) -> Vec<Mentor> {
        views::filter_mentors(&self.mentors, &self.mentor_query)
    }

    pub fn selected_task(&self, now: DateTime<Utc>) -> Option<Task> {
        let index = self.task_state.selected()?;
        self.visible_tasks(now).into_iter().nth(index)
    }

    pub fn detail_task(&self) -> Option<&Task> {
        self.detail.as_deref().and_then(|id| self.cache.get(id))
    }

    /// Keeps both list selections inside their lists.
    pub fn clamp_selection(&mut self, now: DateTime<Utc>) {
        let tasks = self.visible_tasks(now).len();
        clamp(&mut self.task_state, tasks);
        let mentors = self.visible_mentors().len();
        clamp(&mut self.mentor_state, mentors);
    }

    fn move_selection(&mut self, forward: bool, now: DateTime<Utc>) {
        match self.page {
            Page::Tasks => {
                let len = self.visible_tasks(now).len();
                step(&mut self.task_state, len, forward);
            }
            Page::Mentors => {
                let len = self.visible_mentors().len();
                step(&mut self.mentor_state, len, forward);
            }
            Page::Dashboard => {}
        }
    }

    fn info(&mut self, text: impl Into<String>) {
        self.notice = Some(Notice {
            text: text.into(),
            is_error: false,
        });
    }

    fn error(&mut self, text: impl Into<String>) {
        self.notice = Some(Notice {
            text: text.into(),
            is_error: true,
        });
    }

    /// Handles one key press. Returns true when the app should quit.
    /// `now` is read once by the caller and used for the whole pass.
    pub fn handle_input(&mut self, key: KeyEvent, now: DateTime<Utc>) -> bool {
        match self.input_mode {
            InputMode::Normal => return self.handle_normal(key, now),
            InputMode::Search => self.handle_search(key, now),
            InputMode::Create => self.handle_create(key, now),
            InputMode::Submit => self.handle_submit(key),
        }
        false
    }

    fn handle_normal(&mut self, key: KeyEvent, now: DateTime<Utc>) -> bool {
        if self.detail.is_some() {
            match key.code {
                KeyCode::Esc | KeyCode::Enter => self.detail = None,
                KeyCode::Char('s') => self.cycle_status(now),
                KeyCode::Char('u') => self.start_submit(now),
                KeyCode::Char('q') => return true,
                _ => {}
            }
            return false;
        }

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Tab => self.page = self.page.next(),
            KeyCode::Char('1') => self.page = Page::Dashboard,
            KeyCode::Char('2') => self.page = Page::Tasks,
            KeyCode::Char('3') => self.page = Page::Mentors,
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(true, now),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(false, now),
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('/') if self.page != Page::Dashboard => {
                self.input_mode = InputMode::Search;
            }
            _ => match self.page {
                Page::Tasks => self.handle_tasks_key(key, now),
                Page::Mentors => self.handle_mentors_key(key, now),
                Page::Dashboard => {}
            },
        }
        false
    }

    fn handle_tasks_key(&mut self, key: KeyEvent, now: DateTime<Utc>) {
        match key.code {
            KeyCode::Char('f') => {
                self.query.status = self.query.status.cycle();
                self.task_state.select(Some(0));
            }
            KeyCode::Char('b') => {
                self.bucket = self.bucket.next();
                self.task_state.select(Some(0));
            }
            KeyCode::Enter => {
                if let Some(task) = self.selected_task(now) {
                    self.open_detail(task.id);
                }
            }
            KeyCode::Char('s') => self.cycle_status(now),
            KeyCode::Char('u') => self.start_submit(now),
            KeyCode::Char('a') => {
                if self.is_mentor() {
                    self.input_mode = InputMode::Create;
                    self.active_input = ActiveInput::QuickAdd;
                    self.new_task_title.clear();
                    self.new_task_description.clear();
                } else {
                    self.error("Only mentors can create tasks");
                }
            }
            KeyCode::Char('d') => self.delete_selected(now),
            _ => {}
        }
        self.clamp_selection(now);
    }

    fn handle_mentors_key(&mut self, key: KeyEvent, now: DateTime<Utc>) {
        if key.code == KeyCode::Char('e') {
            self.mentor_query.expertise = next_expertise(
                &views::all_expertise(&self.mentors),
                self.mentor_query.expertise.as_deref(),
            );
            self.mentor_state.select(Some(0));
            self.clamp_selection(now);
        }
    }

    fn handle_search(&mut self, key: KeyEvent, now: DateTime<Utc>) {
        let text = match self.page {
            Page::Mentors => &mut self.mentor_query.text,
            _ => &mut self.query.text,
        };
        match key.code {
            KeyCode::Char(c) => text.push(c),
            KeyCode::Backspace => {
                text.pop();
            }
            KeyCode::Esc | KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                return;
            }
            _ => return,
        }
        if self.page == Page::Tasks {
            self.task_state.select(Some(0));
        } else {
            self.mentor_state.select(Some(0));
        }
        self.clamp_selection(now);
    }

    fn handle_create(&mut self, key: KeyEvent, now: DateTime<Utc>) {
        let field = match self.active_input {
            ActiveInput::QuickAdd => &mut self.new_task_title,
            ActiveInput::Description => &mut self.new_task_description,
        };
        match key.code {
            KeyCode::Char(c) => field.push(c),
            KeyCode::Backspace => {
                field.pop();
            }
            KeyCode::Tab => {
                self.active_input = match self.active_input {
                    ActiveInput::QuickAdd => ActiveInput::Description,
                    ActiveInput::Description => ActiveInput::QuickAdd,
                };
            }
            KeyCode::Enter => self.create_task(now),
            KeyCode::Esc => {
                self.new_task_title.clear();
                self.new_task_description.clear();
                self.input_mode = InputMode::Normal;
            }
            _ => {}
        }
    }

    fn handle_submit(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(c) => self.submit_paths.push(c),
            KeyCode::Backspace => {
                self.submit_paths.pop();
            }
            KeyCode::Enter => self.submit_files(),
            KeyCode::Esc => {
                self.submit_paths.clear();
                self.input_mode = InputMode::Normal;
            }
            _ => {}
        }
    }

    /// The task an action applies to: the open detail, else the list selection.
    fn target_task(&self, now: DateTime<Utc>) -> Option<Task> {
        match self.detail_task() {
            Some(task) => Some(task.clone()),
            None if self.page == Page::Tasks => self.selected_task(now),
            None => None,
        }
    }

    /// Shows the cached copy at once and refetches it in the background.
    fn open_detail(&mut self, id: String) {
        self.detail = Some(id.clone());
        if self.cache.is_offline() {
            return;
        }
        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match api.fetch_task(&id).await {
                Ok(task) => AppEvent::TaskLoaded(task),
                Err(err) => AppEvent::Failed(format!("Could not load task: {err}")),
            };
            deliver(&tx, event);
        });
    }

    fn cycle_status(&mut self, now: DateTime<Utc>) {
        let Some(task) = self.target_task(now) else {
            return;
        };
        if !self.api.actor().can_edit(&task) {
            self.error("Can only update your own tasks");
            return;
        }
        let patch = TaskPatch::status(task.status.cycle());
        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match api.update_task(&task.id, &patch).await {
                Ok(task) => AppEvent::TaskSaved(task),
                Err(err) => AppEvent::Failed(format!("Update failed: {err}")),
            };
            deliver(&tx, event);
        });
    }

    fn start_submit(&mut self, now: DateTime<Utc>) {
        let Some(task) = self.target_task(now) else {
            return;
        };
        if task.assigned_to != self.api.actor().id {
            self.error("Can only submit your own tasks");
            return;
        }
        self.detail = Some(task.id);
        self.submit_paths.clear();
        self.input_mode = InputMode::Submit;
    }

    fn submit_files(&mut self) {
        let paths = parse_paths(&self.submit_paths);
        if paths.is_empty() {
            self.error(ApiError::NoFiles.to_string());
            return;
        }
        let Some(id) = self.detail.clone() else {
            self.input_mode = InputMode::Normal;
            return;
        };
        info!(%id, files = paths.len(), "submitting");
        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match api.submit_files(&id, &paths).await {
                Ok(receipt) => AppEvent::Submitted(receipt),
                Err(err) => AppEvent::Failed(format!("Submission failed: {err}")),
            };
            deliver(&tx, event);
        });
        self.submit_paths.clear();
        self.input_mode = InputMode::Normal;
    }

    fn create_task(&mut self, now: DateTime<Utc>) {
        let new = match self.build_new_task(now) {
            Ok(new) => new,
            Err(message) => {
                self.error(message);
                return;
            }
        };
        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match api.create_task(&new).await {
                Ok(task) => AppEvent::TaskSaved(task),
                Err(err) => AppEvent::Failed(format!("Create failed: {err}")),
            };
            deliver(&tx, event);
        });
        self.new_task_title.clear();
        self.new_task_description.clear();
        self.input_mode = InputMode::Normal;
    }

    fn build_new_task(&self, now: DateTime<Utc>) -> Result<NewTask, String> {
        let parsed = self.parser.parse(&self.new_task_title);
        if parsed.title.is_empty() {
            return Err("Task title cannot be empty".into());
        }
        let Some(assignee) = parsed.assignee else {
            return Err("Add an @assignee to the task".into());
        };
        let description = self.new_task_description.trim();
        if description.is_empty() {
            return Err("Task description cannot be empty".into());
        }
        Ok(NewTask {
            title: parsed.title,
            description: description.to_string(),
            image: None,
            status: None,
            priority: parsed.priority,
            progress: None,
            assigned_to: assignee,
            due_date: parsed
                .due_date
                .unwrap_or_else(|| (now + Duration::days(DEFAULT_DUE_DAYS)).date_naive()),
        })
    }

    fn delete_selected(&mut self, now: DateTime<Utc>) {
        if !self.is_mentor() {
            self.error("Only mentors can delete tasks");
            return;
        }
        let Some(task) = self.selected_task(now) else {
            return;
        };
        let api = self.api.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match api.delete_task(&task.id).await {
                Ok(()) => AppEvent::TaskDeleted(task.id),
                Err(err) => AppEvent::Failed(format!("Delete failed: {err}")),
            };
            deliver(&tx, event);
        });
    }
}

// the receiver only goes away when the event loop has exited
fn deliver(tx: &UnboundedSender<AppEvent>, event: AppEvent) {
    if let Err(err) = tx.send(event) {
        debug!(event = ?err.0, "event loop gone, dropping result");
    }
}

/// Comma-separated file paths, blanks dropped.
pub fn parse_paths(input: &str) -> Vec<PathBuf> {
    input
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// All → first tag → ... → last tag → all.
fn next_expertise(tags: &[String], current: Option<&str>) -> Option<String> {
    match current {
        None => tags.first().cloned(),
        Some(tag) => tags
            .iter()
            .position(|t| t == tag)
            .and_then(|i| tags.get(i + 1))
            .cloned(),
    }
}

fn step(state: &mut ListState, len: usize, forward: bool) {
    if len == 0 {
        state.select(None);
        return;
    }
    let i = match state.selected() {
        Some(i) if forward => {
            if i >= len - 1 {
                0
            } else {
                i + 1
            }
        }
        Some(i) => {
            if i == 0 {
                len - 1
            } else {
                i - 1
            }
        }
        None => 0,
    };
    state.select(Some(i));
}

fn clamp(state: &mut ListState, len: usize) {
    match state.selected() {
        _ if len == 0 => state.select(None),
        Some(i) if i >= len => state.select(Some(len - 1)),
        None => state.select(Some(0)),
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::task;
    use crate::models::{Actor, Role, StatusFilter, TaskStatus};
    use crossterm::event::KeyModifiers;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn app(role: Role) -> (App, UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let api = ApiClient::new(
            "http://127.0.0.1:1",
            Actor { id: "student1".into(), role },
        );
        let mentors = crate::mock_data::mentors().unwrap();
        (App::new(api, QuickAddParser::new().unwrap(), mentors, tx), rx)
    }

    fn press(app: &mut App, code: KeyCode) -> bool {
        app.handle_input(KeyEvent::new(code, KeyModifiers::NONE), Utc::now())
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn load(app: &mut App, tasks: Vec<Task>) {
        let ticket = app.cache.begin_fetch();
        app.handle_event(
            AppEvent::TasksLoaded {
                ticket,
                snapshot: TaskSnapshot { tasks, offline: false },
            },
            Utc::now(),
        );
    }

    #[test]
    fn test_step_wraps_and_handles_empty() {
        let mut state = ListState::default();
        step(&mut state, 0, true);
        assert_eq!(state.selected(), None);
        step(&mut state, 3, true);
        assert_eq!(state.selected(), Some(0));
        step(&mut state, 3, false);
        assert_eq!(state.selected(), Some(2));
        step(&mut state, 3, true);
        assert_eq!(state.selected(), Some(0));
    }

    #[test]
    fn test_next_expertise_cycles_through_all() {
        let tags = vec!["React".to_string(), "AWS".to_string()];
        assert_eq!(next_expertise(&tags, None).as_deref(), Some("React"));
        assert_eq!(next_expertise(&tags, Some("React")).as_deref(), Some("AWS"));
        assert_eq!(next_expertise(&tags, Some("AWS")), None);
    }

    #[test]
    fn test_parse_paths() {
        assert_eq!(
            parse_paths(" essay.md, ,notes/draft one.txt "),
            [PathBuf::from("essay.md"), PathBuf::from("notes/draft one.txt")]
        );
        assert!(parse_paths("  ,  ").is_empty());
    }

    #[test]
    fn test_stale_list_is_ignored() {
        let (mut app, _rx) = app(Role::Student);
        let old = app.cache.begin_fetch();
        let new = app.cache.begin_fetch();
        let now = Utc::now();
        app.handle_event(
            AppEvent::TasksLoaded {
                ticket: new,
                snapshot: TaskSnapshot { tasks: vec![task("new")], offline: false },
            },
            now,
        );
        app.handle_event(
            AppEvent::TasksLoaded {
                ticket: old,
                snapshot: TaskSnapshot { tasks: vec![task("old")], offline: true },
            },
            now,
        );
        assert_eq!(app.cache.snapshot()[0].id, "new");
        assert!(app.notice.is_none());
    }

    #[tokio::test]
    async fn test_search_switches_list_to_matches() {
        let (mut app, _rx) = app(Role::Student);
        let mut hit = task("hit");
        hit.title = "Database Migration".into();
        load(&mut app, vec![task("a"), hit]);

        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char('/'));
        assert_eq!(app.input_mode, InputMode::Search);
        type_text(&mut app, "migr");
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.input_mode, InputMode::Normal);
        let visible = app.visible_tasks(Utc::now());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "hit");
        assert_eq!(app.task_state.selected(), Some(0));
    }

    #[test]
    fn test_status_filter_cycles() {
        let (mut app, mut rx) = app(Role::Student);
        let mut started = task("started");
        started.status = TaskStatus::InProgress;
        load(&mut app, vec![task("pending"), started]);
        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char('b'));
        press(&mut app, KeyCode::Char('b'));
        assert_eq!(app.bucket, Bucket::Recommended);
        assert_eq!(app.visible_tasks(Utc::now()).len(), 2);

        press(&mut app, KeyCode::Char('f'));
        assert_eq!(app.query.status, StatusFilter::Only(TaskStatus::Pending));
        let visible = app.visible_tasks(Utc::now());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "pending");
        assert!(!app.loading);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dashboard_counts_ignore_task_filters() {
        let (url, _dir) = crate::api::tests::spawn_server().await;
        let api = crate::api::tests::mentor(&url);
        let mut started = crate::api::tests::new_task("Chart the survey", "student1");
        started.status = Some(TaskStatus::InProgress);
        api.create_task(&started).await.unwrap();
        api.create_task(&crate::api::tests::new_task("Write the essay", "student1"))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mentors = crate::mock_data::mentors().unwrap();
        let mut app = App::new(api, QuickAddParser::new().unwrap(), mentors, tx);
        app.query.status = StatusFilter::Only(TaskStatus::Pending);
        app.query.text = "essay".into();
        app.refresh();
        let event = rx.recv().await.unwrap();
        let now = Utc::now();
        app.handle_event(event, now);

        let dashboard = views::Dashboard::derive(&app.cache.snapshot());
        assert_eq!(dashboard.stats.total, 2);
        assert_eq!(dashboard.stats.in_progress, 1);
        let visible = app.visible_tasks(now);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].title, "Write the essay");
    }

    #[test]
    fn test_selection_wraps_on_tasks_and_mentors() {
        let (mut app, _rx) = app(Role::Student);
        load(&mut app, vec![task("1"), task("2"), task("3")]);
        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char('b'));
        press(&mut app, KeyCode::Char('b'));
        assert_eq!(app.task_state.selected(), Some(0));
        press(&mut app, KeyCode::Char('j'));
        assert_eq!(app.task_state.selected(), Some(1));
        press(&mut app, KeyCode::Char('k'));
        press(&mut app, KeyCode::Char('k'));
        assert_eq!(app.task_state.selected(), Some(2));
        press(&mut app, KeyCode::Down);
        assert_eq!(app.task_state.selected(), Some(0));

        press(&mut app, KeyCode::Char('3'));
        let mentors = app.visible_mentors().len();
        assert_eq!(app.mentor_state.selected(), Some(0));
        press(&mut app, KeyCode::Up);
        assert_eq!(app.mentor_state.selected(), Some(mentors - 1));
        press(&mut app, KeyCode::Char('j'));
        assert_eq!(app.mentor_state.selected(), Some(0));
    }

    #[test]
    fn test_submit_without_files_is_rejected_locally() {
        let (mut app, mut rx) = app(Role::Student);
        load(&mut app, vec![task("1")]);
        app.detail = Some("1".into());
        press(&mut app, KeyCode::Char('u'));
        assert_eq!(app.input_mode, InputMode::Submit);
        type_text(&mut app, " , ");
        press(&mut app, KeyCode::Enter);

        let notice = app.notice.clone().unwrap();
        assert!(notice.is_error);
        assert_eq!(notice.text, ApiError::NoFiles.to_string());
        assert_eq!(app.input_mode, InputMode::Submit);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cannot_submit_someone_elses_task() {
        let (mut app, _rx) = app(Role::Student);
        let mut other = task("1");
        other.assigned_to = "student2".into();
        load(&mut app, vec![other]);
        app.detail = Some("1".into());
        press(&mut app, KeyCode::Char('u'));
        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(app.notice.unwrap().is_error);
    }

    #[test]
    fn test_students_cannot_open_create_form() {
        let (mut app, _rx) = app(Role::Student);
        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char('a'));
        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(app.notice.unwrap().is_error);
    }

    #[test]
    fn test_build_new_task_from_quick_add() {
        let (mut app, _rx) = app(Role::Mentor);
        let now = crate::models::tests::at(2025, 1, 10);
        app.new_task_title = "Write report !high @alice".into();
        assert_eq!(
            app.build_new_task(now).unwrap_err(),
            "Task description cannot be empty"
        );

        app.new_task_description = "Summarize the quarter.".into();
        let new = app.build_new_task(now).unwrap();
        assert_eq!(new.title, "Write report");
        assert_eq!(new.assigned_to, "alice");
        assert_eq!(new.due_date, (now + Duration::days(DEFAULT_DUE_DAYS)).date_naive());

        app.new_task_title = "No assignee".into();
        assert!(app.build_new_task(now).is_err());
    }

    #[test]
    fn test_saved_task_patches_cache() {
        let (mut app, _rx) = app(Role::Student);
        load(&mut app, vec![task("1"), task("2")]);
        let mut done = task("2");
        done.status = TaskStatus::Completed;
        done.progress = 100;
        app.handle_event(AppEvent::TaskSaved(done), Utc::now());
        assert_eq!(app.cache.get("2").map(|t| t.progress), Some(100));
        assert_eq!(app.cache.snapshot().len(), 2);
        assert!(!app.notice.unwrap().is_error);
    }

    #[test]
    fn test_deleted_task_closes_detail() {
        let (mut app, _rx) = app(Role::Mentor);
        load(&mut app, vec![task("1")]);
        app.detail = Some("1".into());
        app.handle_event(AppEvent::TaskDeleted("1".into()), Utc::now());
        assert!(app.detail.is_none());
        assert!(app.cache.snapshot().is_empty());
    }

    #[test]
    fn test_mentor_expertise_filter_key() {
        let (mut app, _rx) = app(Role::Student);
        press(&mut app, KeyCode::Char('3'));
        press(&mut app, KeyCode::Char('e'));
        assert_eq!(app.mentor_query.expertise.as_deref(), Some("React"));
        assert_eq!(app.visible_mentors().len(), 1);
    }

    #[test]
    fn test_quit() {
        let (mut app, _rx) = app(Role::Student);
        assert!(!press(&mut app, KeyCode::Tab));
        assert_eq!(app.page, Page::Tasks);
        assert!(press(&mut app, KeyCode::Char('q')));
    }
}
