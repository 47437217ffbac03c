use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::{CredentialsForm, Field};
use crate::ui::centered_rect;

const FORM_WIDTH: u16 = 48;
const FORM_HEIGHT: u16 = 12;

fn field_line<'a>(label: &'a str, value: String, focused: bool) -> Line<'a> {
    let label_style = if focused {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };
    let cursor = if focused { "▏" } else { "" };

    Line::from(vec![
        Span::styled(format!("{:>9}: ", label), label_style),
        Span::styled(value, Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(cursor, Style::default().add_modifier(Modifier::SLOW_BLINK)),
    ])
}

/// Username/password form shared by the login and register screens
pub fn render_credentials_form(title: &str, help: &str, form: &CredentialsForm, f: &mut Frame) {
    let area = centered_rect(FORM_WIDTH, FORM_HEIGHT, f.area());

    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {} ", title),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ))
        .title_alignment(Alignment::Center);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(1), // username
            Constraint::Length(1), // spacing
            Constraint::Length(1), // password
            Constraint::Min(1),    // spacing
            Constraint::Length(3), // help
        ])
        .split(inner);

    f.render_widget(
        Paragraph::new(field_line(
            "Username",
            form.username.clone(),
            form.focus == Field::Username,
        )),
        chunks[0],
    );
    f.render_widget(
        Paragraph::new(field_line(
            "Password",
            form.masked_password(),
            form.focus == Field::Password,
        )),
        chunks[2],
    );

    let help = Paragraph::new(help.to_string())
        .style(
            Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::ITALIC),
        )
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(help, chunks[4]);
}
