use pdfchat_core::{Role, SessionView};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::App;
use crate::markdown;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, transcript, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_transcript(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let (status, status_color) = match app.backend_online {
        Some(true) => ("● online", Color::Green),
        Some(false) => ("● offline", Color::Red),
        None => ("● checking", Color::Gray),
    };

    let title = Line::from(vec![
        Span::styled(" PDF Chatbot ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!("{} ", app.endpoint_label), Style::default().fg(Color::Gray)),
        Span::styled(status, Style::default().fg(status_color)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

/// Build the transcript lines for a session view
fn transcript_lines(view: &SessionView<'_>, animation_frame: u8) -> Vec<Line<'static>> {
    let user_label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let bot_label = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let mut lines: Vec<Line<'static>> = Vec::new();

    for msg in view.messages {
        match msg.role {
            Role::User => {
                lines.push(Line::from(Span::styled(format!("{}:", msg.role.label()), user_label)));
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
            }
            Role::Bot => {
                lines.push(Line::from(Span::styled(format!("{}:", msg.role.label()), bot_label)));
                lines.extend(markdown::render(&msg.content));
            }
        }
        lines.push(Line::default());
    }

    if view.busy {
        lines.push(Line::from(Span::styled(format!("{}:", Role::Bot.label()), bot_label)));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat(animation_frame as usize + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

/// Rows the text occupies once word-wrapped to `width` columns, measured
/// with the same wrapping the transcript pane draws with.
fn wrapped_height(text: &Text<'_>, width: u16) -> u16 {
    let rows = Paragraph::new(text.clone())
        .wrap(Wrap { trim: false })
        .line_count(width.max(1));
    u16::try_from(rows).unwrap_or(u16::MAX)
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store area for mouse hit-testing and inner size for scroll calculations
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let view = app.session.render();
    let text = if view.messages.is_empty() && !view.busy {
        Text::from(Span::styled(
            "Ask a question about your PDF...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(transcript_lines(&view, app.animation_frame))
    };

    let total = wrapped_height(&text, app.chat_width);
    app.follow_transcript(total);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Conversation ");

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let view = app.session.render();

    let (title, border_color) = if view.busy {
        (" Ask (waiting for answer) ", Color::DarkGray)
    } else if view.can_submit {
        (" Ask (Enter to send) ", Color::Yellow)
    } else {
        (" Ask ", Color::DarkGray)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scrolling keeps the cursor inside the box
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;
    let scroll_offset = if inner_width == 0 || cursor_pos < inner_width {
        0
    } else {
        cursor_pos - inner_width + 1
    };

    let visible_text: String = view
        .draft
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);

    frame.render_widget(input, area);

    let cursor_x = u16::try_from(cursor_pos - scroll_offset).unwrap_or(0);
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

fn render_footer(frame: &mut Frame, area: Rect) {
    let key_style = Style::default().fg(Color::Yellow).bold();
    let hint_style = Style::default().fg(Color::DarkGray);

    let hints = Line::from(vec![
        Span::styled(" Enter", key_style),
        Span::styled(" send  ", hint_style),
        Span::styled("↑↓ PgUp PgDn", key_style),
        Span::styled(" scroll  ", hint_style),
        Span::styled("Ctrl+U", key_style),
        Span::styled(" clear  ", hint_style),
        Span::styled("Esc", key_style),
        Span::styled(" quit", hint_style),
    ]);

    frame.render_widget(Paragraph::new(hints), area);
}
