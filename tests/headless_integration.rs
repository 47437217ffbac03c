use std::sync::mpsc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use scorekeep::app::{Action, App, AppState};
use scorekeep::config::Config;
use scorekeep::runtime::{AppEvent, ChannelEventSource, Runner, Step};
use scorekeep::storage::Storage;

fn send_str(tx: &mpsc::Sender<AppEvent>, s: &str) {
    for c in s.chars() {
        send_key(tx, KeyCode::Char(c));
    }
}

fn send_key(tx: &mpsc::Sender<AppEvent>, code: KeyCode) {
    tx.send(AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)))
        .unwrap();
}

// Headless integration using the internal runtime + App without a TTY
#[test]
fn headless_register_login_and_track_flow() {
    let mut app = App::new(Storage::in_memory(), Config::default());
    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(ChannelEventSource::new(rx), Duration::from_millis(5));

    // create an account
    tx.send(AppEvent::Key(KeyEvent::new(
        KeyCode::Char('r'),
        KeyModifiers::CONTROL,
    )))
    .unwrap();
    send_str(&tx, "ana");
    send_key(&tx, KeyCode::Tab);
    send_str(&tx, "secret");
    send_key(&tx, KeyCode::Enter);
    runner.drain(&mut app);
    assert_eq!(app.state, AppState::Login);

    // log in
    send_str(&tx, "ana");
    send_key(&tx, KeyCode::Tab);
    send_str(&tx, "secret");
    send_key(&tx, KeyCode::Enter);
    runner.drain(&mut app);
    assert_eq!(app.state, AppState::Dashboard);

    // start a session with the default name, record V V D, end it
    send_key(&tx, KeyCode::Char('s'));
    send_key(&tx, KeyCode::Enter);
    send_str(&tx, "112e");
    runner.drain(&mut app);

    let sessions = app.sessions().user_sessions();
    assert_eq!(sessions.len(), 1);
    assert!(!sessions[0].is_active);
    let stats = app.sessions().session_stats(&sessions[0]);
    assert_eq!((stats.victories, stats.defeats, stats.balance), (2, 1, 1));
    assert_eq!(app.sessions().session_events(&sessions[0].id).len(), 3);

    // quit from the dashboard
    send_key(&tx, KeyCode::Char('q'));
    assert_eq!(runner.drain(&mut app), Action::Quit);
}

#[test]
fn headless_toast_expires_on_ticks() {
    let mut app = App::new(
        Storage::in_memory(),
        Config {
            toast_ticks: 3,
            ..Config::default()
        },
    );
    let (_tx, rx) = mpsc::channel::<AppEvent>();
    let runner = Runner::new(ChannelEventSource::new(rx), Duration::from_millis(1));

    // submitting an empty login form produces an error toast
    app.submit_login();
    assert!(app.toast.is_some());

    let steps: Vec<Step> = (0..3).map(|_| runner.step(&mut app)).collect();
    assert_eq!(steps, vec![Step::Idle, Step::Idle, Step::Redraw]);
    assert!(app.toast.is_none());
}
