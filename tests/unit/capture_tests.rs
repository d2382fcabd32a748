//! Timing behaviour of reply capture, run on a paused tokio clock so every
//! elapsed-time assertion is exact.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{sleep, Instant};

use operator_relay::capture::{capture_response, CaptureOutcome};
use operator_relay::input::{InputUnit, InputUnits};

const D: Duration = Duration::from_secs(10);

/// Send `units` from a background task, sleeping `gap` before each one.
fn type_slowly(tx: UnboundedSender<InputUnit>, units: Vec<(Duration, InputUnit)>) {
    tokio::spawn(async move {
        for (gap, unit) in units {
            sleep(gap).await;
            if tx.send(unit).is_err() {
                return;
            }
        }
        // Keep the sender alive so the stream does not look closed.
        std::future::pending::<()>().await;
    });
}

fn key(ch: char) -> InputUnit {
    InputUnit::Keystroke(ch)
}

#[tokio::test(start_paused = true)]
async fn typing_hi_then_enter_completes_before_deadline() {
    let (tx, mut input) = InputUnits::channel();
    type_slowly(
        tx,
        vec![
            (Duration::from_secs(1), key('h')),
            (Duration::from_secs(1), key('i')),
            (Duration::from_secs(3), key('\n')),
        ],
    );

    let start = Instant::now();
    let capture = capture_response(&mut input, D).await;
    let elapsed = start.elapsed();

    assert_eq!(capture.outcome, CaptureOutcome::Completed);
    assert_eq!(capture.text, "hi\n");
    assert!(elapsed >= Duration::from_secs(5), "elapsed {elapsed:?}");
    assert!(elapsed < D, "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn silence_times_out_at_the_deadline() {
    let (tx, mut input) = InputUnits::channel();

    let start = Instant::now();
    let capture = capture_response(&mut input, D).await;
    let elapsed = start.elapsed();

    assert_eq!(capture.outcome, CaptureOutcome::TimedOut);
    assert!(capture.text.is_empty());
    assert!(elapsed >= D, "elapsed {elapsed:?}");
    assert!(elapsed < D + Duration::from_millis(50), "elapsed {elapsed:?}");
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn steady_typing_outlasts_the_deadline() {
    let (tx, mut input) = InputUnits::channel();
    let gap = Duration::from_secs(9);
    let mut units: Vec<_> = "keep typing".chars().map(|ch| (gap, key(ch))).collect();
    units.push((gap, key('\n')));
    type_slowly(tx, units);

    let start = Instant::now();
    let capture = capture_response(&mut input, D).await;

    assert_eq!(capture.outcome, CaptureOutcome::Completed);
    assert_eq!(capture.text, "keep typing\n");
    assert!(
        start.elapsed() > D * 5,
        "total time far exceeds the deadline without timing out"
    );
}

#[tokio::test(start_paused = true)]
async fn idle_after_partial_input_times_out_from_last_unit() {
    let (tx, mut input) = InputUnits::channel();
    type_slowly(
        tx,
        vec![
            (Duration::from_secs(4), key('a')),
            (Duration::from_secs(4), key('b')),
        ],
    );

    let start = Instant::now();
    let capture = capture_response(&mut input, D).await;
    let elapsed = start.elapsed();

    assert_eq!(capture.outcome, CaptureOutcome::TimedOut);
    assert_eq!(capture.text, "ab", "partial reply is reported, not delivered");
    assert!(elapsed >= Duration::from_secs(18), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(19), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn timed_out_capture_leaves_no_stale_timer() {
    let (tx, mut input) = InputUnits::channel();

    let first = capture_response(&mut input, D).await;
    assert_eq!(first.outcome, CaptureOutcome::TimedOut);

    tx.send(key('x')).expect("send");
    tx.send(key('\n')).expect("send");
    let second = capture_response(&mut input, D).await;
    assert_eq!(second.outcome, CaptureOutcome::Completed);
    assert_eq!(second.text, "x\n");

    let third_tx = tx.clone();
    type_slowly(third_tx, vec![(Duration::from_secs(9), key('\n'))]);
    let third = capture_response(&mut input, D).await;
    assert_eq!(third.outcome, CaptureOutcome::Completed);
    assert_eq!(third.text, "\n");
}

#[tokio::test(start_paused = true)]
async fn ready_input_wins_over_an_expired_timer() {
    let (tx, mut input) = InputUnits::channel();
    tx.send(InputUnit::Line("just in time\n".into())).expect("send");

    let capture = capture_response(&mut input, Duration::ZERO).await;

    assert_eq!(capture.outcome, CaptureOutcome::Completed);
    assert_eq!(capture.text, "just in time\n");
}

#[tokio::test(start_paused = true)]
async fn closed_input_completes_with_buffer() {
    let (tx, mut input) = InputUnits::channel();
    tx.send(key('b')).expect("send");
    tx.send(key('y')).expect("send");
    tx.send(key('e')).expect("send");
    drop(tx);

    let capture = capture_response(&mut input, D).await;

    assert_eq!(capture.outcome, CaptureOutcome::Completed);
    assert_eq!(capture.text, "bye");
    assert!(input.is_closed());
}

#[tokio::test(start_paused = true)]
async fn closed_input_without_text_completes_empty_immediately() {
    let (tx, mut input) = InputUnits::channel();
    drop(tx);

    let start = Instant::now();
    let capture = capture_response(&mut input, D).await;

    assert!(capture.is_completed());
    assert!(capture.text.is_empty());
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn line_units_complete_on_terminated_line() {
    let (tx, mut input) = InputUnits::channel();
    type_slowly(
        tx,
        vec![
            (Duration::from_secs(2), InputUnit::Line("partial ".into())),
            (Duration::from_secs(2), InputUnit::Line("line\n".into())),
        ],
    );

    let capture = capture_response(&mut input, D).await;

    assert_eq!(capture.outcome, CaptureOutcome::Completed);
    assert_eq!(capture.text, "partial line\n");
}

#[tokio::test(start_paused = true)]
async fn units_after_the_terminator_stay_queued_for_the_next_capture() {
    let (tx, mut input) = InputUnits::channel();
    for ch in "one\ntwo\n".chars() {
        tx.send(key(ch)).expect("send");
    }

    let first = capture_response(&mut input, D).await;
    let second = capture_response(&mut input, D).await;

    assert_eq!(first.text, "one\n");
    assert_eq!(second.text, "two\n");
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn oversized_deadline_survives_keystrokes() {
    let (tx, mut input) = InputUnits::channel();
    type_slowly(
        tx,
        vec![
            (Duration::from_secs(1), key('a')),
            (Duration::from_secs(1), key('\n')),
        ],
    );

    let capture = capture_response(&mut input, Duration::from_secs(u64::MAX)).await;

    assert_eq!(capture.outcome, CaptureOutcome::Completed);
    assert_eq!(capture.text, "a\n");
}

#[tokio::test(start_paused = true)]
async fn erase_removes_last_character_and_resets_deadline() {
    let (tx, mut input) = InputUnits::channel();
    type_slowly(
        tx,
        vec![
            (Duration::from_secs(6), key('h')),
            (Duration::from_secs(6), key('x')),
            (Duration::from_secs(6), InputUnit::Erase),
            (Duration::from_secs(6), key('i')),
            (Duration::from_secs(6), key('\n')),
        ],
    );

    let start = Instant::now();
    let capture = capture_response(&mut input, D).await;

    assert_eq!(capture.outcome, CaptureOutcome::Completed);
    assert_eq!(capture.text, "hi\n");
    assert_eq!(start.elapsed(), Duration::from_secs(30));
}
