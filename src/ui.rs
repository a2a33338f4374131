use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, AppMode, FormField};
use crate::form::SendPhase;

pub fn ui(f: &mut Frame, app: &App) {
    let size = f.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(0),    // Form
            Constraint::Length(1), // Status bar
        ])
        .split(size);

    render_title_bar(f, app, chunks[0]);
    render_form(f, app, chunks[1]);
    render_status_bar(f, app, chunks[2]);

    match app.mode {
        AppMode::Compose => {}
        AppMode::FileBrowser => render_file_browser(f, app, centered_rect(70, 70, size)),
        AppMode::AttachmentInput => render_attachment_input(f, app, centered_rect(70, 20, size)),
        AppMode::Help => render_help(f, centered_rect(60, 60, size)),
    }
}

fn render_title_bar(f: &mut Frame, app: &App, area: Rect) {
    let title = Paragraph::new(Line::from(vec![
        Span::styled(
            "Send Mail",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  →  {}", app.submitter.endpoint()),
            Style::default().fg(Color::DarkGray),
        ),
    ]))
    .block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(title, area);
}

fn field_block(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(style)
}

fn render_form(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Recipient
            Constraint::Length(3), // Subject
            Constraint::Min(5),    // Body
            Constraint::Length(1), // Attachment
            Constraint::Length(1), // Send button
            Constraint::Length(1), // Send status
        ])
        .split(area);

    let recipient = Paragraph::new(app.form.recipient.as_str())
        .block(field_block("To", app.focus == FormField::Recipient));
    f.render_widget(recipient, chunks[0]);

    let subject = Paragraph::new(app.form.subject.as_str())
        .block(field_block("Subject", app.focus == FormField::Subject));
    f.render_widget(subject, chunks[1]);

    let body = Paragraph::new(app.form.body.as_str())
        .block(field_block("Message", app.focus == FormField::Body))
        .wrap(Wrap { trim: false });
    f.render_widget(body, chunks[2]);

    let attachment = match &app.form.attachment {
        Some(attachment) => Line::from(vec![
            Span::raw("📎 "),
            Span::styled(attachment.filename.as_str(), Style::default().fg(Color::Gray)),
            Span::styled("  (Ctrl+R to remove)", Style::default().fg(Color::DarkGray)),
        ]),
        None => Line::from(Span::styled(
            "📎 No attachment (Ctrl+O browse, Ctrl+P type a path)",
            Style::default().fg(Color::DarkGray),
        )),
    };
    f.render_widget(Paragraph::new(attachment), chunks[3]);

    let button = if app.form.phase == SendPhase::Sending {
        Span::styled("[ Sending... ]", Style::default().fg(Color::DarkGray))
    } else {
        Span::styled(
            "[ 📨 Send (Ctrl+S) ]",
            Style::default().fg(Color::Black).bg(Color::Cyan),
        )
    };
    f.render_widget(Paragraph::new(Line::from(button)), chunks[4]);

    let status_color = match app.form.phase {
        SendPhase::Idle | SendPhase::Sending => Color::Gray,
        SendPhase::Succeeded => Color::Green,
        SendPhase::Failed => Color::Red,
    };
    let status = Paragraph::new(app.form.status.as_str()).style(Style::default().fg(status_color));
    f.render_widget(status, chunks[5]);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let (text, style) = if let Some(error) = &app.error_message {
        (error.as_str(), Style::default().fg(Color::Red))
    } else if let Some(info) = &app.info_message {
        (info.as_str(), Style::default().fg(Color::Green))
    } else {
        (
            "Tab: next field | Ctrl+S: send | Ctrl+O: attach | F1: help | Ctrl+Q: quit",
            Style::default().fg(Color::DarkGray),
        )
    };
    f.render_widget(Paragraph::new(text).style(style), area);
}

fn render_file_browser(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .file_browser_items
        .iter()
        .map(|item| {
            let label = if item.is_directory {
                format!("📁 {}/", item.name)
            } else {
                match item.size {
                    Some(size) => format!("📄 {} ({})", item.name, format_size(size)),
                    None => format!("📄 {}", item.name),
                }
            };
            ListItem::new(label)
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .title(format!("Select file: {}", app.file_browser_current_path.display()))
                .borders(Borders::ALL),
        )
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if !app.file_browser_items.is_empty() {
        state.select(Some(app.file_browser_selected));
    }

    f.render_widget(Clear, area);
    f.render_stateful_widget(list, area, &mut state);
}

fn render_attachment_input(f: &mut Frame, app: &App, area: Rect) {
    let input = Paragraph::new(app.attachment_input_text.as_str())
        .block(
            Block::default()
                .title("Attach file (Enter to confirm, Tab for ~/Downloads/)")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(Clear, area);
    f.render_widget(input, area);
}

fn render_help(f: &mut Frame, area: Rect) {
    let lines = vec![
        Line::from(Span::styled("Keys", Style::default().add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from("Tab / ↓        next field"),
        Line::from("Shift+Tab / ↑  previous field"),
        Line::from("Enter          new line in message, next field elsewhere"),
        Line::from("Ctrl+S         send"),
        Line::from("Ctrl+O         browse for an attachment"),
        Line::from("Ctrl+P         type an attachment path"),
        Line::from("Ctrl+R         remove the attachment"),
        Line::from("Esc            clear messages"),
        Line::from("Ctrl+Q         quit"),
    ];
    let help = Paragraph::new(lines).block(Block::default().title("Help").borders(Borders::ALL));
    f.render_widget(Clear, area);
    f.render_widget(help, area);
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(12), "12 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
