use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::tracker::PartialProgress;
use crate::tui::ui::{badge_color, tier_color};
use crate::tui::{App, SubjectDetail};

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let Some(detail) = &app.selected else {
        let block = Block::default().borders(Borders::ALL).title(" Detail ");
        let paragraph = Paragraph::new("Nothing selected").block(block);
        f.render_widget(paragraph, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Header info
            Constraint::Length(6), // Progress
            Constraint::Length(3), // Level or checklist gauge
            Constraint::Min(0),    // Prerequisites + checklist items
        ])
        .split(area);

    draw_header(f, detail, chunks[0]);
    draw_progress(f, detail, chunks[1]);
    draw_gauge(f, detail, chunks[2]);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[3]);
    draw_prerequisites(f, detail, bottom[0]);
    draw_checklist(f, detail, bottom[1]);
}

fn draw_header(f: &mut Frame, detail: &SubjectDetail, area: Rect) {
    let subject = &detail.status.subject;
    let description = subject.description.as_deref().unwrap_or("No description");

    let text = vec![
        Line::from(vec![
            Span::styled("Description: ", Style::default().fg(Color::Gray)),
            Span::styled(description, Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::styled("Kind: ", Style::default().fg(Color::Gray)),
            Span::styled(subject.kind.label(), Style::default().fg(Color::Cyan)),
            Span::styled("  ID: ", Style::default().fg(Color::Gray)),
            Span::styled(subject.id.to_string(), Style::default().fg(Color::White)),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", subject.name))
        .title_style(
            Style::default()
                .fg(tier_color(detail.status.tier))
                .add_modifier(Modifier::BOLD),
        );

    let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

fn draw_progress(f: &mut Frame, detail: &SubjectDetail, area: Rect) {
    let status = &detail.status;
    let tier = status.tier;

    let state = if status.locked {
        Span::styled(
            format!("Locked ({} prerequisite(s) left)", status.missing_prerequisites.len()),
            Style::default().fg(Color::DarkGray),
        )
    } else if status.cooldown_remaining > 0 {
        Span::styled(
            format!("Cooling down, {} min left", status.cooldown_remaining),
            Style::default().fg(Color::Yellow),
        )
    } else {
        Span::styled("Ready", Style::default().fg(Color::Green))
    };

    let last = status
        .last_completed_at
        .map(|dt| dt.format("%b %d %H:%M").to_string())
        .unwrap_or_else(|| "Never".to_string());

    let text = vec![
        Line::from(vec![
            Span::styled("Tier: ", Style::default().fg(Color::Gray)),
            Span::styled(
                tier.label(),
                Style::default()
                    .fg(tier_color(tier))
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  ({})", tier.css_class()), Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(vec![
            Span::styled("Completed: ", Style::default().fg(Color::Gray)),
            Span::styled(
                status.completion_count.to_string(),
                Style::default().fg(Color::White),
            ),
            Span::styled(
                format!("  {}", status.formatted_count),
                Style::default().fg(tier_color(tier)),
            ),
        ]),
        Line::from(vec![
            Span::styled("Last: ", Style::default().fg(Color::Gray)),
            Span::styled(last, Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::styled("State: ", Style::default().fg(Color::Gray)),
            state,
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Progress ")
        .title_style(Style::default().fg(Color::Cyan));

    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_gauge(f: &mut Frame, detail: &SubjectDetail, area: Rect) {
    let (title, progress): (&str, Option<&PartialProgress>) = match (&detail.level_progress, &detail.checklist) {
        (Some(level), _) => (" Level ", Some(level)),
        (None, Some(checklist)) => (" Checklist ", Some(&checklist.progress)),
        (None, None) => (" Checklist ", None),
    };

    let Some(progress) = progress else {
        let paragraph = Paragraph::new(Span::styled(
            "Sign in (--user) to keep a checklist",
            Style::default().fg(Color::DarkGray),
        ))
        .block(Block::default().borders(Borders::ALL).title(title));
        f.render_widget(paragraph, area);
        return;
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .gauge_style(Style::default().fg(badge_color(progress.badge)))
        .percent(u16::from(progress.percentage))
        .label(format!(
            "{}/{} ({}%)",
            progress.done, progress.total, progress.percentage
        ));
    f.render_widget(gauge, area);
}

fn draw_prerequisites(f: &mut Frame, detail: &SubjectDetail, area: Rect) {
    let items: Vec<ListItem> = detail
        .prerequisites
        .iter()
        .map(|line| {
            let (mark, color) = if line.done {
                ("✓", Color::Green)
            } else {
                ("·", Color::DarkGray)
            };
            let name = line
                .name
                .clone()
                .unwrap_or_else(|| format!("missing #{}", line.id));
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", mark), Style::default().fg(color)),
                Span::styled(name, Style::default().fg(Color::White)),
            ]))
        })
        .collect();

    let title = if items.is_empty() {
        " Requires: nothing "
    } else {
        " Requires "
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_style(Style::default().fg(Color::Magenta));

    f.render_widget(List::new(items).block(block), area);
}

fn draw_checklist(f: &mut Frame, detail: &SubjectDetail, area: Rect) {
    let items: Vec<ListItem> = detail
        .checklist
        .iter()
        .flat_map(|c| c.items.iter())
        .map(|item| {
            let (mark, color) = if item.checked {
                ("[x]", Color::Green)
            } else {
                ("[ ]", Color::White)
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", mark), Style::default().fg(color)),
                Span::raw(item.title.clone()),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Checklist items ")
        .title_style(Style::default().fg(Color::Yellow));

    f.render_widget(List::new(items).block(block), area);
}
