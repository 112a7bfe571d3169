use crate::app::{ActiveInput, App, AppEvent, Bucket, InputMode, Page};
use crate::models::{Mentor, Task, TaskStatus};
use crate::views::{self, Dashboard, ProgressBand};
use chrono::{DateTime, Utc};
use crossterm::event::{self, Event as CEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph, Sparkline, Tabs, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn centered_rect_absolute(width: u16, height: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length((r.height.saturating_sub(height)) / 2),
            Constraint::Length(height),
            Constraint::Length((r.height.saturating_sub(height) + 1) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length((r.width.saturating_sub(width)) / 2),
            Constraint::Length(width),
            Constraint::Length((r.width.saturating_sub(width) + 1) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn key(label: &'static str) -> Span<'static> {
    Span::styled(label, Style::default().fg(Color::Red))
}

fn get_legend(app: &App) -> Line<'static> {
    let spans = match app.input_mode {
        InputMode::Search => vec![
            key(" Enter/Esc "),
            Span::raw(": Done "),
            key(" Backspace "),
            Span::raw(": Delete "),
        ],
        InputMode::Create => vec![
            key(" Enter "),
            Span::raw(": Create "),
            key(" Tab "),
            Span::raw(": Switch Field "),
            key(" Esc "),
            Span::raw(": Cancel "),
        ],
        InputMode::Submit => vec![
            key(" Enter "),
            Span::raw(": Submit "),
            key(" Esc "),
            Span::raw(": Cancel "),
        ],
        InputMode::Normal if app.detail.is_some() => vec![
            key(" s "),
            Span::raw(": Cycle Status "),
            key(" u "),
            Span::raw(": Submit Files "),
            key(" Esc "),
            Span::raw(": Close "),
        ],
        InputMode::Normal => {
            let mut spans = vec![
                key(" q "),
                Span::raw(": Quit "),
                key(" Tab "),
                Span::raw(": Page "),
                key(" j/k "),
                Span::raw(": Down/Up "),
                key(" r "),
                Span::raw(": Refresh "),
            ];
            match app.page {
                Page::Tasks => {
                    spans.extend([
                        key(" / "),
                        Span::raw(": Search "),
                        key(" f "),
                        Span::raw(": Status Filter "),
                        key(" b "),
                        Span::raw(": Bucket "),
                        key(" Enter "),
                        Span::raw(": Details "),
                        key(" s "),
                        Span::raw(": Cycle Status "),
                    ]);
                    if app.is_mentor() {
                        spans.extend([
                            key(" a "),
                            Span::raw(": Add Task "),
                            key(" d "),
                            Span::raw(": Delete "),
                        ]);
                    }
                }
                Page::Mentors => spans.extend([
                    key(" / "),
                    Span::raw(": Search "),
                    key(" e "),
                    Span::raw(": Expertise "),
                ]),
                Page::Dashboard => {}
            }
            spans
        }
    };
    Line::from(spans)
}

pub fn band_color(progress: u8) -> Color {
    match ProgressBand::of(progress) {
        ProgressBand::Done => Color::Green,
        ProgressBand::Good => Color::Blue,
        ProgressBand::Halfway => Color::Yellow,
        ProgressBand::Started => Color::LightRed,
        ProgressBand::Barely => Color::DarkGray,
    }
}

fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Pending => Color::Yellow,
        TaskStatus::InProgress => Color::Blue,
        TaskStatus::Completed => Color::Green,
        TaskStatus::Overdue => Color::Red,
    }
}

fn due_span(task: &Task, now: DateTime<Utc>) -> Span<'static> {
    let days = task.days_until(now);
    if task.is_late(now) {
        Span::styled(
            format!("late by {} days", -days),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )
    } else if task.status == TaskStatus::Completed {
        Span::styled("done", Style::default().fg(Color::Green))
    } else if days == 0 {
        Span::styled("due today", Style::default().fg(Color::Yellow))
    } else {
        Span::raw(format!("{days} days left"))
    }
}

fn title_case(label: &str) -> String {
    label
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn bold(label: &'static str) -> Span<'static> {
    Span::styled(label, Style::default().add_modifier(Modifier::BOLD))
}

fn task_item(task: &Task, now: DateTime<Utc>, show_progress: bool) -> ListItem<'static> {
    let mut spans = vec![
        Span::styled(
            format!("{:<12}", task.status.label()),
            Style::default().fg(status_color(task.status)),
        ),
        Span::raw(task.title.clone()),
        Span::raw("  "),
        due_span(task, now),
    ];
    if show_progress {
        spans.push(Span::styled(
            format!("  {}%", task.progress),
            Style::default().fg(band_color(task.progress)),
        ));
    }
    ListItem::new(Line::from(spans))
}

fn mentor_item(mentor: &Mentor) -> ListItem<'static> {
    let (shown, more) = views::expertise_preview(mentor);
    let mut tags = shown.join(", ");
    if more > 0 {
        tags.push_str(&format!(" +{more} more"));
    }
    let presence = if mentor.is_online {
        Span::styled("● ", Style::default().fg(Color::Green))
    } else {
        Span::styled("○ ", Style::default().fg(Color::DarkGray))
    };
    ListItem::new(Line::from(vec![
        presence,
        Span::styled(
            mentor.name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" · {} ", mentor.role)),
        Span::styled(format!("[{tags}]"), Style::default().fg(Color::Cyan)),
    ]))
}

fn highlight() -> Style {
    Style::default()
        .fg(Color::Green)
        .add_modifier(Modifier::BOLD)
}

pub fn draw(f: &mut Frame, app: &mut App, now: DateTime<Utc>) {
    let size = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(2),
        ])
        .split(size);

    let selected = Page::ALL.iter().position(|p| *p == app.page).unwrap_or(0);
    let mut title = format!("taskboard · {} ({})", app.api.actor().id, app.api.actor().role);
    if app.cache.is_offline() {
        title.push_str(" · offline");
    } else if app.loading {
        title.push_str(" · loading");
    }
    let tabs = Tabs::new(Page::ALL.iter().map(|p| Line::from(p.title())))
        .block(Block::default().borders(Borders::ALL).title(title))
        .select(selected)
        .highlight_style(highlight());
    f.render_widget(tabs, chunks[0]);

    app.clamp_selection(now);
    match app.page {
        Page::Dashboard => draw_dashboard(f, app, chunks[1], now),
        Page::Tasks => draw_tasks(f, app, chunks[1], now),
        Page::Mentors => draw_mentors(f, app, chunks[1]),
    }

    if let Some(task) = app.detail_task().cloned() {
        draw_detail(f, &task, chunks[1], now);
    }
    match app.input_mode {
        InputMode::Create => draw_create(f, app, chunks[1]),
        InputMode::Submit => draw_submit(f, app, chunks[1]),
        _ => {}
    }

    let mut footer = vec![get_legend(app)];
    if let Some(notice) = &app.notice {
        let color = if notice.is_error { Color::Red } else { Color::Green };
        footer.push(Line::from(Span::styled(
            notice.text.clone(),
            Style::default().fg(color),
        )));
    }
    let legend = Paragraph::new(Text::from(footer))
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });
    f.render_widget(legend, chunks[2]);
}

fn draw_dashboard(f: &mut Frame, app: &App, area: Rect, now: DateTime<Utc>) {
    let tasks = app.cache.snapshot();
    let dashboard = Dashboard::derive(&tasks);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(5),
            Constraint::Min(0),
        ])
        .split(area);

    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 5); 5])
        .split(rows[0]);
    let stats = &dashboard.stats;
    let mut figures = vec![("Total".to_string(), stats.total, Color::White)];
    figures.extend(
        TaskStatus::ALL
            .iter()
            .map(|s| (title_case(&s.label()), stats.count(*s), status_color(*s))),
    );
    for ((label, count, color), card) in figures.into_iter().zip(cards.iter()) {
        let widget = Paragraph::new(Span::styled(
            count.to_string(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(label));
        f.render_widget(widget, *card);
    }

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Overall Progress"))
        .gauge_style(Style::default().fg(band_color(dashboard.overall_progress)))
        .percent(u16::from(dashboard.overall_progress));
    f.render_widget(gauge, rows[1]);

    let sparkline = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title("Activity"))
        .data(&dashboard.activity)
        .max(100)
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(sparkline, rows[2]);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(rows[3]);

    let recent: Vec<ListItem> = if dashboard.recent.is_empty() {
        vec![ListItem::new("No tasks yet")]
    } else {
        dashboard
            .recent
            .iter()
            .map(|t| task_item(t, now, true))
            .collect()
    };
    f.render_widget(
        List::new(recent).block(Block::default().borders(Borders::ALL).title("Recent Tasks")),
        bottom[0],
    );

    let mentors: Vec<ListItem> = views::featured_mentors(&app.mentors)
        .iter()
        .map(mentor_item)
        .collect();
    f.render_widget(
        List::new(mentors).block(Block::default().borders(Borders::ALL).title("Mentors")),
        bottom[1],
    );
}

fn draw_tasks(f: &mut Frame, app: &mut App, area: Rect, now: DateTime<Utc>) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let search_style = if app.input_mode == InputMode::Search {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let search = Paragraph::new(Line::from(vec![
        bold("Search: "),
        Span::styled(app.query.text.clone(), search_style),
        bold("   Status: "),
        Span::raw(app.query.status.to_string()),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(search, rows[0]);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(rows[1]);

    let tasks = app.visible_tasks(now);
    let list_title = if app.query.is_search() {
        format!("Search Results ({})", tasks.len())
    } else {
        format!("{} ({})", app.bucket.title(), tasks.len())
    };
    let show_progress = app.query.is_search() || app.bucket != Bucket::Recommended;

    let tasks_widget = if !tasks.is_empty() {
        let items: Vec<ListItem> = tasks
            .iter()
            .map(|t| task_item(t, now, show_progress))
            .collect();
        List::new(items)
            .block(Block::default().borders(Borders::ALL).title(list_title))
            .highlight_style(highlight())
            .highlight_symbol(">> ")
    } else {
        let empty = if app.cache.is_loaded() {
            "No tasks found"
        } else {
            "Loading tasks..."
        };
        List::new(vec![ListItem::new(empty)])
            .block(Block::default().borders(Borders::ALL).title(list_title))
    };
    f.render_stateful_widget(tasks_widget, chunks[0], &mut app.task_state);

    let detail_block = Block::default().borders(Borders::ALL).title("Task Details");
    let selected = app
        .task_state
        .selected()
        .and_then(|i| tasks.get(i));
    let paragraph = match selected {
        Some(task) => Paragraph::new(summary_lines(task, now)),
        None => Paragraph::new("Select a task to see its details"),
    };
    f.render_widget(
        paragraph.block(detail_block).wrap(Wrap { trim: true }),
        chunks[1],
    );
}

fn summary_lines(task: &Task, now: DateTime<Utc>) -> Vec<Line<'static>> {
    vec![
        Line::from(Span::styled(
            task.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            bold("Status: "),
            Span::styled(task.status.label(), Style::default().fg(status_color(task.status))),
        ]),
        Line::from(vec![bold("Priority: "), Span::raw(task.priority.to_string())]),
        Line::from(vec![bold("Assigned to: "), Span::raw(task.assigned_to.clone())]),
        Line::from(vec![
            bold("Due: "),
            Span::raw(format!("{} ", task.due_date.format("%b %e, %Y"))),
            due_span(task, now),
        ]),
        Line::from(vec![
            bold("Progress: "),
            Span::styled(
                format!("{}%", task.progress),
                Style::default().fg(band_color(task.progress)),
            ),
        ]),
    ]
}

fn draw_detail(f: &mut Frame, task: &Task, area: Rect, now: DateTime<Utc>) {
    let mut lines = summary_lines(task, now);
    lines.push(Line::from(""));
    lines.push(Line::from(bold("Description:")));
    lines.push(Line::from(task.description.clone()));
    lines.push(Line::from(""));
    lines.push(Line::from(bold("Essence:")));
    for (i, point) in views::essence_points(&task.description).into_iter().enumerate() {
        lines.push(Line::from(format!(" {}. {}", i + 1, point)));
    }

    let width = (area.width * 70 / 100).max(30);
    let height = (lines.len() as u16 + 4).min(area.height);
    let popup_area = centered_rect_absolute(width, height, area);
    let popup = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Task")
                .style(Style::default().fg(Color::White)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(Clear, popup_area);
    f.render_widget(popup, popup_area);
}

fn draw_mentors(f: &mut Frame, app: &mut App, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let search_style = if app.input_mode == InputMode::Search {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let expertise = app.mentor_query.expertise.clone().unwrap_or_else(|| "all".into());
    let search = Paragraph::new(Line::from(vec![
        bold("Search: "),
        Span::styled(app.mentor_query.text.clone(), search_style),
        bold("   Expertise: "),
        Span::raw(expertise),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(search, rows[0]);

    let mentors = app.visible_mentors();
    let title = format!("Mentors ({})", mentors.len());
    let widget = if mentors.is_empty() {
        List::new(vec![ListItem::new("No mentors match")])
            .block(Block::default().borders(Borders::ALL).title(title))
    } else {
        List::new(mentors.iter().map(mentor_item).collect::<Vec<_>>())
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(highlight())
            .highlight_symbol(">> ")
    };
    f.render_stateful_widget(widget, rows[1], &mut app.mentor_state);
}

fn input_block(title: &'static str, active: bool) -> Block<'static> {
    let color = if active { Color::Green } else { Color::Gray };
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .style(Style::default().fg(color))
}

fn draw_create(f: &mut Frame, app: &App, area: Rect) {
    let popup_width = (area.width * 60 / 100).saturating_sub(2);
    let title_lines = calculate_wrapped_lines(&app.new_task_title, popup_width).max(1) as u16;
    let desc_lines = calculate_wrapped_lines(&app.new_task_description, popup_width).max(1) as u16;
    let popup_height = (title_lines + desc_lines + 6).min(area.height);
    let popup_area = centered_rect_absolute(popup_width + 2, popup_height, area);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(title_lines + 2),
            Constraint::Length(desc_lines + 2),
            Constraint::Min(0),
        ])
        .split(popup_area);

    f.render_widget(Clear, popup_area);
    f.render_widget(
        Paragraph::new(app.new_task_title.as_str())
            .block(input_block(
                "New Task (Title !priority @assignee ^YYYY-MM-DD)",
                app.active_input == ActiveInput::QuickAdd,
            ))
            .wrap(Wrap { trim: false }),
        parts[0],
    );
    f.render_widget(
        Paragraph::new(app.new_task_description.as_str())
            .block(input_block(
                "Description",
                app.active_input == ActiveInput::Description,
            ))
            .wrap(Wrap { trim: false }),
        parts[1],
    );
}

fn draw_submit(f: &mut Frame, app: &App, area: Rect) {
    let popup_width = (area.width * 60 / 100).saturating_sub(2);
    let lines = calculate_wrapped_lines(&app.submit_paths, popup_width).max(1) as u16;
    let popup_area = centered_rect_absolute(popup_width + 2, lines + 2, area);
    f.render_widget(Clear, popup_area);
    f.render_widget(
        Paragraph::new(app.submit_paths.as_str())
            .block(input_block("Files to submit (comma separated)", true))
            .wrap(Wrap { trim: false }),
        popup_area,
    );
}

fn calculate_wrapped_lines(text: &str, max_width: u16) -> usize {
    let max_width = usize::from(max_width.max(1));
    text.lines()
        .map(|line| line.chars().count().div_ceil(max_width).max(1))
        .sum()
}

pub async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    mut rx: UnboundedReceiver<AppEvent>,
) -> io::Result<()> {
    app.refresh();
    loop {
        let now = Utc::now();
        while let Ok(event) = rx.try_recv() {
            app.handle_event(event, now);
        }

        terminal.draw(|f| draw(f, &mut app, now))?;

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_input(key, Utc::now()) {
                    return Ok(());
                }
            }
        }
    }
}
