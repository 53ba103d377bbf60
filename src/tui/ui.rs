use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Frame,
};

use super::widgets::{dashboard, subject_detail, subjects};
use super::{App, View};
use crate::progression::{BadgeColor, Tier};

pub fn tier_color(tier: Tier) -> Color {
    match tier {
        Tier::Locked => Color::DarkGray,
        Tier::Gray => Color::Gray,
        Tier::Green => Color::Green,
        Tier::Blue => Color::Blue,
        Tier::Purple => Color::Magenta,
        Tier::Orange => Color::Rgb(255, 140, 0),
    }
}

pub fn badge_color(badge: BadgeColor) -> Color {
    match badge {
        BadgeColor::Gray => Color::Gray,
        BadgeColor::Yellow => Color::Yellow,
        BadgeColor::Blue => Color::Blue,
        BadgeColor::Green => Color::Green,
    }
}

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Tab bar
            Constraint::Min(0),    // Content
            Constraint::Length(1), // Status line
            Constraint::Length(1), // Help bar
        ])
        .split(f.area());

    draw_tabs(f, app, chunks[0]);
    draw_content(f, app, chunks[1]);
    draw_status_line(f, app, chunks[2]);
    draw_help_bar(f, app, chunks[3]);
}

fn draw_tabs(f: &mut Frame, app: &App, area: Rect) {
    let tab_titles = vec!["Dashboard", "Hacks", "Routines", "Levels"];
    let current = match app.view {
        View::Detail => app.detail_parent,
        view => view,
    };
    let selected = match current {
        View::Dashboard | View::Detail => 0,
        View::Hacks => 1,
        View::Routines => 2,
        View::Levels => 3,
    };

    let tabs = Tabs::new(tab_titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" NRGHax · {} ", app.actor)),
        )
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    f.render_widget(tabs, area);
}

fn draw_content(f: &mut Frame, app: &App, area: Rect) {
    match app.view {
        View::Dashboard => dashboard::draw(f, app, area),
        View::Hacks => subjects::draw(f, &app.hacks, " Hacks ", area),
        View::Routines => subjects::draw(f, &app.routines, " Routines ", area),
        View::Levels => subjects::draw(f, &app.levels, " Levels ", area),
        View::Detail => subject_detail::draw(f, app, area),
    }
}

fn draw_status_line(f: &mut Frame, app: &App, area: Rect) {
    let line = match &app.status_message {
        Some(msg) => Line::from(Span::styled(
            format!(" {}", msg),
            Style::default().fg(Color::Yellow),
        )),
        None => Line::from(""),
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_help_bar(f: &mut Frame, app: &App, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Cyan));

    let mut spans = vec![key("h/l"), Span::raw(" Views  ")];

    match app.view {
        View::Dashboard => {
            spans.extend(vec![key("^r"), Span::raw(" Refresh  ")]);
        }
        View::Hacks | View::Routines | View::Levels => {
            spans.extend(vec![
                key("j/k"),
                Span::raw(" Nav  "),
                key("g/G"),
                Span::raw(" Top/Bot  "),
                key("l/<CR>"),
                Span::raw(" Open  "),
                key("c"),
                Span::raw(" Complete  "),
            ]);
        }
        View::Detail => {
            spans.extend(vec![
                key("h/<Esc>"),
                Span::raw(" Back  "),
                key("c"),
                Span::raw(" Complete  "),
                key("^r"),
                Span::raw(" Refresh  "),
            ]);
        }
    }

    spans.extend(vec![key("q"), Span::raw(" Quit")]);

    let help = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));

    f.render_widget(help, area);
}
