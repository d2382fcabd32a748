//! Raw-mode key handling, driven by scripted key events instead of a tty.

use std::collections::VecDeque;
use std::io::{self, Write};

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio_util::sync::CancellationToken;

use operator_relay::input::terminal::{forward_key_events, key_action, CrlfWriter, KeyAction};
use operator_relay::input::{InputUnit, InputUnits};

fn press(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn ctrl(ch: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
}

/// Event source that replays `events`, then reports a closed terminal.
fn scripted(events: Vec<Event>) -> impl FnMut() -> io::Result<Event> {
    let mut events: VecDeque<Event> = events.into();
    move || {
        events
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
    }
}

async fn drain(units: &mut InputUnits) -> Vec<InputUnit> {
    let mut out = Vec::new();
    while let Some(unit) = units.recv().await {
        out.push(unit);
    }
    out
}

#[test]
fn printable_keys_become_keystrokes() {
    assert_eq!(
        key_action(&press(KeyCode::Char('a'))),
        KeyAction::Forward(InputUnit::Keystroke('a'))
    );
    assert_eq!(
        key_action(&KeyEvent::new(KeyCode::Char('A'), KeyModifiers::SHIFT)),
        KeyAction::Forward(InputUnit::Keystroke('A'))
    );
    assert_eq!(
        key_action(&press(KeyCode::Char('é'))),
        KeyAction::Forward(InputUnit::Keystroke('é'))
    );
}

#[test]
fn enter_tab_and_backspace_map_to_units() {
    assert_eq!(
        key_action(&press(KeyCode::Enter)),
        KeyAction::Forward(InputUnit::Keystroke('\n'))
    );
    assert_eq!(
        key_action(&press(KeyCode::Tab)),
        KeyAction::Forward(InputUnit::Keystroke('\t'))
    );
    assert_eq!(
        key_action(&press(KeyCode::Backspace)),
        KeyAction::Forward(InputUnit::Erase)
    );
}

#[test]
fn control_keys_interrupt_or_end_input() {
    assert_eq!(key_action(&ctrl('c')), KeyAction::Interrupt);
    assert_eq!(key_action(&ctrl('d')), KeyAction::EndOfInput);
    assert_eq!(key_action(&ctrl('x')), KeyAction::Ignore);
}

#[test]
fn releases_and_navigation_keys_are_ignored() {
    let release = KeyEvent::new_with_kind(
        KeyCode::Char('a'),
        KeyModifiers::NONE,
        KeyEventKind::Release,
    );
    assert_eq!(key_action(&release), KeyAction::Ignore);
    assert_eq!(key_action(&press(KeyCode::Left)), KeyAction::Ignore);
    assert_eq!(key_action(&press(KeyCode::F(1))), KeyAction::Ignore);
}

#[tokio::test]
async fn each_key_press_is_forwarded_and_echoed() {
    let (tx, mut units) = InputUnits::channel();
    let interrupt = CancellationToken::new();
    let mut echo = Vec::new();

    forward_key_events(
        scripted(vec![
            Event::Key(press(KeyCode::Char('h'))),
            Event::Resize(80, 24),
            Event::Key(press(KeyCode::Char('x'))),
            Event::Key(press(KeyCode::Backspace)),
            Event::Key(press(KeyCode::Char('i'))),
            Event::Key(press(KeyCode::Enter)),
        ]),
        &mut echo,
        &tx,
        &interrupt,
    );
    drop(tx);

    assert_eq!(
        drain(&mut units).await,
        vec![
            InputUnit::Keystroke('h'),
            InputUnit::Keystroke('x'),
            InputUnit::Erase,
            InputUnit::Keystroke('i'),
            InputUnit::Keystroke('\n'),
        ]
    );
    assert_eq!(echo, b"hx\x08 \x08i\r\n");
    assert!(!interrupt.is_cancelled());
}

#[tokio::test]
async fn ctrl_c_cancels_and_stops_reading() {
    let (tx, mut units) = InputUnits::channel();
    let interrupt = CancellationToken::new();

    forward_key_events(
        scripted(vec![
            Event::Key(press(KeyCode::Char('a'))),
            Event::Key(ctrl('c')),
            Event::Key(press(KeyCode::Char('b'))),
        ]),
        io::sink(),
        &tx,
        &interrupt,
    );
    drop(tx);

    assert!(interrupt.is_cancelled());
    assert_eq!(drain(&mut units).await, vec![InputUnit::Keystroke('a')]);
}

#[tokio::test]
async fn ctrl_d_ends_input_without_interrupt() {
    let (tx, mut units) = InputUnits::channel();
    let interrupt = CancellationToken::new();

    forward_key_events(
        scripted(vec![
            Event::Key(ctrl('d')),
            Event::Key(press(KeyCode::Char('b'))),
        ]),
        io::sink(),
        &tx,
        &interrupt,
    );
    drop(tx);

    assert!(!interrupt.is_cancelled());
    assert!(drain(&mut units).await.is_empty());
}

#[test]
fn crlf_writer_expands_newlines_only_when_asked() {
    let mut raw = Vec::new();
    {
        let mut writer = CrlfWriter::new(&mut raw, true);
        write!(writer, "alice says: hi\nReply: ").unwrap();
        writer.flush().unwrap();
    }

    let mut plain = Vec::new();
    {
        let mut writer = CrlfWriter::new(&mut plain, false);
        write!(writer, "a\nb\n").unwrap();
    }

    assert_eq!(raw, b"alice says: hi\r\nReply: ");
    assert_eq!(plain, b"a\nb\n");
}
