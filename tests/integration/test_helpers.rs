//! Shared fixtures for relay integration tests.

use std::collections::HashMap;
use std::future::Future;
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use operator_relay::input::{InputUnit, InputUnits};
use operator_relay::models::event::{InboundEvent, QueuedItem};
use operator_relay::relay::console::OperatorConsole;
use operator_relay::relay::queue::DeliveryQueue;
use operator_relay::relay::retry::RetryPolicy;
use operator_relay::relay::worker::{RelayWorker, WorkerSettings};
use operator_relay::relay::ReplySink;
use operator_relay::{AppError, Result};

pub const DEADLINE: Duration = Duration::from_secs(10);
pub const PACING: Duration = Duration::from_millis(500);

/// Reply sink that fails a scripted number of times per event.
#[derive(Default)]
pub struct ScriptedSink {
    failures: Mutex<HashMap<String, u32>>,
    stalled: Mutex<Vec<String>>,
    attempts: Mutex<Vec<String>>,
    delivered: Mutex<Vec<(String, String)>>,
}

impl ScriptedSink {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `times` deliveries for `event_id`.
    pub fn fail_times(&self, event_id: &str, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert(event_id.to_owned(), times);
    }

    /// Never complete deliveries for `event_id`.
    pub fn stall(&self, event_id: &str) {
        self.stalled.lock().unwrap().push(event_id.to_owned());
    }

    /// `(event_id, text)` pairs accepted so far, in order.
    pub fn delivered(&self) -> Vec<(String, String)> {
        self.delivered.lock().unwrap().clone()
    }

    /// Event ids of accepted replies, in order.
    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered().into_iter().map(|(id, _)| id).collect()
    }

    /// Every event id handed to the sink, including failed attempts.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

impl ReplySink for ScriptedSink {
    fn send_reply<'a>(
        &'a self,
        _channel: &'a str,
        text: &'a str,
        original: &'a InboundEvent,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.attempts.lock().unwrap().push(original.id.clone());

            let stalled = self.stalled.lock().unwrap().contains(&original.id);
            if stalled {
                std::future::pending::<()>().await;
            }

            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&original.id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AppError::Delivery("scripted failure".into()));
                }
            }
            drop(failures);

            self.delivered
                .lock()
                .unwrap()
                .push((original.id.clone(), text.to_owned()));
            Ok(())
        })
    }
}

/// In-memory writer whose contents stay readable after the console takes it.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn settings() -> WorkerSettings {
    WorkerSettings {
        deadline: DEADLINE,
        pacing: PACING,
        retry: RetryPolicy::unlimited(),
    }
}

/// A worker wired to a fresh queue, a scripted sink and a silent console.
pub struct Harness {
    pub queue: DeliveryQueue,
    pub sink: Arc<ScriptedSink>,
    pub input: UnboundedSender<InputUnit>,
    pub worker: RelayWorker,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(settings())
    }

    pub fn with_settings(settings: WorkerSettings) -> Self {
        Self::build(settings, OperatorConsole::silent())
    }

    pub fn with_console(console: OperatorConsole) -> Self {
        Self::build(settings(), console)
    }

    fn build(settings: WorkerSettings, console: OperatorConsole) -> Self {
        let queue = DeliveryQueue::new();
        let sink = ScriptedSink::shared();
        let (input, units): (_, InputUnits) = InputUnits::channel();
        let worker = RelayWorker::new(
            queue.clone(),
            units,
            Arc::clone(&sink) as Arc<dyn ReplySink>,
            console,
            settings,
        );
        Self {
            queue,
            sink,
            input,
            worker,
        }
    }

    /// Enqueue a message from `author` and return its event id.
    pub fn receive(&self, author: &str, text: &str) -> String {
        let event = InboundEvent::new(
            author.to_owned(),
            text.to_owned(),
            "C1".into(),
            "1700000000.000100".into(),
        );
        let id = event.id.clone();
        self.queue.enqueue(QueuedItem::new(event));
        id
    }

    /// Queue `text` as keystrokes, ahead of the capture that reads them.
    pub fn type_text(&self, text: &str) {
        for ch in text.chars() {
            self.input.send(InputUnit::Keystroke(ch)).unwrap();
        }
    }
}
