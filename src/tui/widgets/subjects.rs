use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use crate::models::SubjectStatus;
use crate::truncate;
use crate::tui::ui::tier_color;
use crate::tui::StatefulList;

pub fn draw(f: &mut Frame, list: &StatefulList<SubjectStatus>, title: &str, area: Rect) {
    let items: Vec<ListItem> = list
        .items
        .iter()
        .map(|status| {
            let color = tier_color(status.tier);
            let (state_color, state_text) = if status.locked {
                (Color::DarkGray, format!("needs {}", status.missing_prerequisites.len()))
            } else if status.cooldown_remaining > 0 {
                (Color::Yellow, format!("{}m", status.cooldown_remaining))
            } else {
                (Color::Green, "ready".to_string())
            };

            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<32}", truncate(&status.subject.name, 30)),
                    Style::default().fg(color),
                ),
                Span::styled(
                    format!("{:<8}", status.tier.label()),
                    Style::default().fg(color),
                ),
                Span::styled(
                    format!("{:<6}", status.formatted_count),
                    Style::default().fg(Color::White),
                ),
                Span::styled(state_text, Style::default().fg(state_color)),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title.to_string())
        .title_style(Style::default().fg(Color::Cyan));

    let header_style = Style::default()
        .fg(Color::DarkGray)
        .add_modifier(Modifier::BOLD);
    let header = Line::from(vec![
        Span::styled(format!("  {:<32}", "Name"), header_style),
        Span::styled(format!("{:<8}", "Tier"), header_style),
        Span::styled(format!("{:<6}", "Done"), header_style),
        Span::styled("State", header_style),
    ]);

    let list_widget = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(list.selected);

    // Header sits on the first row inside the border
    let header_area = Rect {
        x: area.x + 1,
        y: area.y + 1,
        width: area.width.saturating_sub(2),
        height: 1,
    };
    f.render_widget(Paragraph::new(header), header_area);

    let list_area = Rect {
        x: area.x,
        y: area.y + 1,
        width: area.width,
        height: area.height.saturating_sub(1),
    };

    f.render_stateful_widget(list_widget, list_area, &mut state);
}
