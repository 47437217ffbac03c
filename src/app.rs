use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, error};

use crate::auth::AuthService;
use crate::config::Config;
use crate::error::{AuthError, SessionError};
use crate::model::{Session, User};
use crate::session::SessionService;
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum AppState {
    Login,
    Register,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Username,
    Password,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialsForm {
    pub username: String,
    pub password: String,
    pub focus: Field,
}

impl Default for CredentialsForm {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            focus: Field::Username,
        }
    }
}

impl CredentialsForm {
    fn focused_mut(&mut self) -> &mut String {
        match self.focus {
            Field::Username => &mut self.username,
            Field::Password => &mut self.password,
        }
    }

    pub fn push(&mut self, c: char) {
        self.focused_mut().push(c);
    }

    pub fn pop(&mut self) {
        self.focused_mut().pop();
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Field::Username => Field::Password,
            Field::Password => Field::Username,
        };
    }

    pub fn masked_password(&self) -> String {
        "•".repeat(self.password.chars().count())
    }

    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Info,
    Error,
}

/// Transient one-line status message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
    pub ticks_left: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardMode {
    Browse,
    NamingSession(String),
    EnteringScore(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardState {
    pub selected: usize,
    pub mode: DashboardMode,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            selected: 0,
            mode: DashboardMode::Browse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Quit,
}

pub struct App {
    pub storage: Storage,
    pub config: Config,
    pub state: AppState,
    pub form: CredentialsForm,
    pub dashboard: DashboardState,
    pub toast: Option<Toast>,
}

impl App {
    pub fn new(storage: Storage, config: Config) -> Self {
        let mut app = Self {
            storage,
            config,
            state: AppState::Login,
            form: CredentialsForm::default(),
            dashboard: DashboardState::default(),
            toast: None,
        };
        app.navigate(AppState::Dashboard);
        app
    }

    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(&self.storage)
    }

    pub fn sessions(&self) -> SessionService<'_> {
        SessionService::new(&self.storage)
    }

    pub fn current_user(&self) -> Option<User> {
        self.auth().current_user()
    }

    /// Move to `target`, honouring the login guards: the dashboard needs a
    /// user, the login and register screens need there to be none.
    pub fn navigate(&mut self, target: AppState) {
        let logged_in = self.auth().is_logged_in();
        let resolved = match (target, logged_in) {
            (AppState::Dashboard, false) => AppState::Login,
            (AppState::Login | AppState::Register, true) => AppState::Dashboard,
            (t, _) => t,
        };
        if resolved != self.state {
            debug!(from = %self.state, to = %resolved, "navigate");
            self.form = CredentialsForm::default();
            self.dashboard = DashboardState::default();
        }
        self.state = resolved;
    }

    pub fn notify(&mut self, kind: ToastKind, message: impl Into<String>) {
        self.toast = Some(Toast {
            kind,
            message: message.into(),
            ticks_left: self.config.toast_ticks,
        });
    }

    pub fn on_tick(&mut self) {
        if let Some(toast) = &mut self.toast {
            toast.ticks_left = toast.ticks_left.saturating_sub(1);
            if toast.ticks_left == 0 {
                self.toast = None;
            }
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Action::Quit;
        }

        match self.state {
            AppState::Login | AppState::Register => self.on_form_key(key),
            AppState::Dashboard => self.on_dashboard_key(key),
        }
    }

    fn on_form_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Esc if self.state == AppState::Register => {
                self.navigate(AppState::Login);
            }
            KeyCode::Esc => return Action::Quit,
            KeyCode::Char('r')
                if key.modifiers.contains(KeyModifiers::CONTROL)
                    && self.state == AppState::Login =>
            {
                self.navigate(AppState::Register);
            }
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                self.form.toggle_focus()
            }
            KeyCode::Backspace => self.form.pop(),
            KeyCode::Enter => match self.state {
                AppState::Login => self.submit_login(),
                _ => self.submit_register(),
            },
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.form.push(c)
            }
            _ => {}
        }
        Action::Continue
    }

    pub fn submit_login(&mut self) {
        if !self.form.is_complete() {
            self.notify(ToastKind::Error, "Username and password are required");
            return;
        }
        let result = self.auth().login(&self.form.username, &self.form.password);
        match result {
            Ok(_) => self.navigate(AppState::Dashboard),
            Err(AuthError::InvalidCredentials) => {
                self.form.password.clear();
                self.notify(ToastKind::Error, "Invalid credentials");
            }
            Err(e) => self.report_error("login", &e),
        }
    }

    pub fn submit_register(&mut self) {
        if !self.form.is_complete() {
            self.notify(ToastKind::Error, "Username and password are required");
            return;
        }
        let user = User::new(self.form.username.clone(), self.form.password.clone());
        let result = self.auth().register(user);
        match result {
            Ok(()) => {
                self.navigate(AppState::Login);
                self.notify(ToastKind::Success, "Account created! Login now.");
            }
            Err(AuthError::UsernameTaken) => {
                self.notify(ToastKind::Error, "Username already exists");
            }
            Err(e) => self.report_error("register", &e),
        }
    }

    fn on_dashboard_key(&mut self, key: KeyEvent) -> Action {
        match self.dashboard.mode.clone() {
            DashboardMode::NamingSession(mut name) => match key.code {
                KeyCode::Esc => self.dashboard.mode = DashboardMode::Browse,
                KeyCode::Enter => {
                    self.dashboard.mode = DashboardMode::Browse;
                    self.start_session(&name);
                }
                KeyCode::Backspace => {
                    name.pop();
                    self.dashboard.mode = DashboardMode::NamingSession(name);
                }
                KeyCode::Char(c) => {
                    name.push(c);
                    self.dashboard.mode = DashboardMode::NamingSession(name);
                }
                _ => {}
            },
            DashboardMode::EnteringScore(mut input) => match key.code {
                KeyCode::Esc => self.dashboard.mode = DashboardMode::Browse,
                KeyCode::Enter => {
                    self.dashboard.mode = DashboardMode::Browse;
                    self.add_score(&input);
                }
                KeyCode::Backspace => {
                    input.pop();
                    self.dashboard.mode = DashboardMode::EnteringScore(input);
                }
                KeyCode::Char(c) if c.is_ascii_digit() || matches!(c, '.' | '-') => {
                    input.push(c);
                    self.dashboard.mode = DashboardMode::EnteringScore(input);
                }
                _ => {}
            },
            DashboardMode::Browse => match key.code {
                KeyCode::Esc | KeyCode::Char('q') => return Action::Quit,
                KeyCode::Char('s') => {
                    self.dashboard.mode =
                        DashboardMode::NamingSession(self.config.default_session_name.clone())
                }
                KeyCode::Char('#') => {
                    if self.sessions().active_session().is_some() {
                        self.dashboard.mode = DashboardMode::EnteringScore(String::new());
                    }
                }
                KeyCode::Char('e') => self.end_session(),
                KeyCode::Char('u') => self.undo_last_event(),
                KeyCode::Char('d') => self.delete_selected(),
                KeyCode::Char('l') => self.logout(),
                KeyCode::Char(c @ '1'..='9') => {
                    let n = c.to_digit(10).unwrap_or(1) as usize;
                    self.record_outcome(n - 1);
                }
                KeyCode::Up => {
                    self.dashboard.selected = self.dashboard.selected.saturating_sub(1);
                }
                KeyCode::Down => {
                    let len = self.sessions().user_sessions().len();
                    if self.dashboard.selected + 1 < len {
                        self.dashboard.selected += 1;
                    }
                }
                _ => {}
            },
        }
        Action::Continue
    }

    pub fn start_session(&mut self, name: &str) {
        let options = self.config.default_options.clone();
        let result = self.sessions().start_session(name, &options);
        match result {
            Ok(session) => {
                self.dashboard.selected = 0;
                self.notify(ToastKind::Success, format!("Session \"{}\" started!", session.name));
            }
            Err(e) => self.report_session_error("start session", e),
        }
    }

    pub fn end_session(&mut self) {
        let Some(active) = self.sessions().active_session() else {
            return;
        };
        let result = self.sessions().end_session(&active.id);
        match result {
            Ok(_) => self.notify(ToastKind::Info, "Session ended."),
            Err(e) => self.report_session_error("end session", e),
        }
    }

    /// Record the `index`-th option of the active session
    pub fn record_outcome(&mut self, index: usize) {
        let Some(active) = self.sessions().active_session() else {
            return;
        };
        let Some(option) = active.options.get(index) else {
            return;
        };
        let result = self.sessions().add_outcome(&active.id, &option.label);
        if let Err(e) = result {
            self.report_session_error("record outcome", e);
        }
    }

    pub fn undo_last_event(&mut self) {
        let Some(active) = self.sessions().active_session() else {
            return;
        };
        let result = self.sessions().undo_last_event(&active.id);
        match result {
            Ok(true) => self.notify(ToastKind::Info, "Last outcome removed."),
            Ok(false) => {}
            Err(e) => self.report_session_error("undo", e),
        }
    }

    pub fn add_score(&mut self, input: &str) {
        let score = match input.trim().parse::<f64>() {
            Ok(score) if score.is_finite() => score,
            Ok(_) => {
                self.notify(ToastKind::Error, "Score is out of range");
                return;
            }
            Err(_) => {
                self.notify(ToastKind::Error, format!("{:?} is not a number", input));
                return;
            }
        };
        let Some(active) = self.sessions().active_session() else {
            return;
        };
        let result = self.sessions().add_score(&active.id, score);
        match result {
            Ok(()) => self.notify(ToastKind::Success, "Score added!"),
            Err(e) => self.report_session_error("add score", e),
        }
    }

    pub fn selected_session(&self) -> Option<Session> {
        self.sessions()
            .user_sessions()
            .into_iter()
            .nth(self.dashboard.selected)
    }

    pub fn delete_selected(&mut self) {
        let Some(session) = self.selected_session() else {
            return;
        };
        let result = self.sessions().delete_session(&session.id);
        match result {
            Ok(true) => {
                let remaining = self.sessions().user_sessions().len();
                self.dashboard.selected = self.dashboard.selected.min(remaining.saturating_sub(1));
                self.notify(ToastKind::Info, format!("Session #{} deleted.", session.short_id()));
            }
            Ok(false) => {}
            Err(e) => self.report_session_error("delete session", e),
        }
    }

    pub fn logout(&mut self) {
        let result = self.auth().logout();
        if let Err(e) = result {
            self.report_error("logout", &e);
            return;
        }
        self.navigate(AppState::Login);
    }

    fn report_session_error(&mut self, ctx: &str, e: SessionError) {
        match e {
            // acting on a closed or vanished session is silently ignored
            SessionError::NotActive(_)
            | SessionError::NotFound(_)
            | SessionError::EventNotFound { .. }
            | SessionError::UnknownOption(_) => {
                debug!(context = ctx, error = %e, "ignored action");
            }
            SessionError::NotLoggedIn => self.navigate(AppState::Login),
            SessionError::InvalidOptions(_) | SessionError::InvalidScore(_) => {
                self.notify(ToastKind::Error, e.to_string())
            }
            SessionError::Store(_) => self.report_error(ctx, &e),
        }
    }

    fn report_error(&mut self, ctx: &str, e: &dyn std::error::Error) {
        error!(context = ctx, error = %e, "operation failed");
        self.notify(ToastKind::Error, format!("Could not {}: {}", ctx, e));
    }
}
