pub mod charting;
pub mod dashboard;
pub mod forms;
pub mod screen;

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Span,
    widgets::{Clear, Paragraph},
    Frame,
};

use crate::app::{App, Toast, ToastKind};

pub const HORIZONTAL_MARGIN: u16 = 2;
pub const VERTICAL_MARGIN: u16 = 1;

pub fn draw(app: &App, f: &mut Frame) {
    screen::current_screen(&app.state).render(app, f);

    if let Some(toast) = &app.toast {
        render_toast(toast, f);
    }
}

pub fn toast_style(kind: ToastKind) -> Style {
    let color = match kind {
        ToastKind::Success => Color::Green,
        ToastKind::Info => Color::Cyan,
        ToastKind::Error => Color::Red,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

/// One line pinned to the bottom of the screen
fn render_toast(toast: &Toast, f: &mut Frame) {
    let area = f.area();
    if area.height == 0 {
        return;
    }
    let line = Rect::new(area.x, area.y + area.height - 1, area.width, 1);
    let widget = Paragraph::new(Span::styled(toast.message.clone(), toast_style(toast.kind)))
        .alignment(Alignment::Center);
    f.render_widget(Clear, line);
    f.render_widget(widget, line);
}

/// A `width` x `height` rectangle centered in `area`, clamped to fit
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length((area.height - height) / 2),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length((area.width - width) / 2),
            Constraint::Length(width),
            Constraint::Min(0),
        ])
        .split(vertical[1])[1]
}
