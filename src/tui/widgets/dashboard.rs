use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use crate::progression::Tier;
use crate::truncate;
use crate::tui::ui::tier_color;
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(9), // Stats + ready row
            Constraint::Min(0),    // Tier breakdown
        ])
        .split(area);

    let top_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[0]);

    draw_stats(f, app, top_chunks[0]);
    draw_ready(f, app, top_chunks[1]);
    draw_tiers(f, app, chunks[1]);
}

fn stat_line<'a>(label: &'a str, value: String, color: Color) -> Line<'a> {
    Line::from(vec![
        Span::styled(label, Style::default().fg(Color::Gray)),
        Span::styled(value, Style::default().fg(color)),
    ])
}

fn draw_stats(f: &mut Frame, app: &App, area: Rect) {
    let stats = &app.stats;

    let text = vec![
        Line::from(vec![
            Span::styled("Subjects: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}", stats.total_subjects),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        stat_line("Unlocked: ", stats.unlocked.to_string(), Color::Green),
        stat_line("Locked: ", stats.locked.to_string(), Color::DarkGray),
        stat_line(
            "Ready now: ",
            stats.ready_now.to_string(),
            if stats.ready_now > 0 {
                Color::Yellow
            } else {
                Color::White
            },
        ),
        stat_line(
            "Completions: ",
            stats.total_completions.to_string(),
            Color::Cyan,
        ),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Stats ")
        .title_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(text).block(block);
    f.render_widget(paragraph, area);
}

fn draw_ready(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .ready
        .iter()
        .enumerate()
        .map(|(i, status)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("{}. ", i + 1), Style::default().fg(Color::DarkGray)),
                Span::styled(
                    truncate(&status.subject.name, 24),
                    Style::default().fg(tier_color(status.tier)),
                ),
                Span::raw(" "),
                Span::styled(
                    status.subject.kind.as_str(),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Ready Now ")
        .title_style(Style::default().fg(Color::Yellow));

    let list = List::new(items).block(block);
    f.render_widget(list, area);
}

fn draw_tiers(f: &mut Frame, app: &App, area: Rect) {
    let widest = app.stats.by_tier.values().copied().max().unwrap_or(0).max(1);
    let bar_room = usize::from(area.width.saturating_sub(16));

    let items: Vec<ListItem> = Tier::ALL
        .iter()
        .map(|tier| {
            let count = app.stats.by_tier.get(tier).copied().unwrap_or(0);
            let filled = count * bar_room / widest;
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<8}", tier.label()),
                    Style::default().fg(tier_color(*tier)),
                ),
                Span::styled(format!("{:>4} ", count), Style::default().fg(Color::White)),
                Span::styled("█".repeat(filled), Style::default().fg(tier_color(*tier))),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Tiers ")
        .title_style(Style::default().fg(Color::Magenta));

    let list = List::new(items).block(block);
    f.render_widget(list, area);
}
