use ratatui::Frame;

use crate::{
    app::{App, AppState},
    ui::{dashboard::render_dashboard, forms::render_credentials_form},
};

/// A UI Screen boundary: responsible for rendering one app state
pub trait Screen {
    fn render(&self, app: &App, f: &mut Frame);
}

pub struct LoginScreen;

impl Screen for LoginScreen {
    fn render(&self, app: &App, f: &mut Frame) {
        render_credentials_form(
            "Login",
            "(enter) login  (tab) switch field  (ctrl+r) create account  (esc) quit",
            &app.form,
            f,
        );
    }
}

pub struct RegisterScreen;

impl Screen for RegisterScreen {
    fn render(&self, app: &App, f: &mut Frame) {
        render_credentials_form(
            "Register",
            "(enter) create account  (tab) switch field  (esc) back to login",
            &app.form,
            f,
        );
    }
}

pub struct DashboardScreen;

impl Screen for DashboardScreen {
    fn render(&self, app: &App, f: &mut Frame) {
        render_dashboard(app, f);
    }
}

/// Helper to construct the appropriate screen for the current state
pub fn current_screen(state: &AppState) -> Box<dyn Screen> {
    match state {
        AppState::Login => Box::new(LoginScreen),
        AppState::Register => Box::new(RegisterScreen),
        AppState::Dashboard => Box::new(DashboardScreen),
    }
}
