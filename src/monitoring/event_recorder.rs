use crate::shared_data::{SignalEvent, SignalEventKind, SignalId};
use crate::signal_system::scheduler::run_isolated;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Receives every observable step of every signal.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &SignalEvent);
}

/// Fans one event out to several sinks, in registration order.
#[derive(Clone, Default)]
pub struct EventSinks {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for EventSinks {
    // a panicking sink does not starve the ones after it
    fn record(&self, event: &SignalEvent) {
        for sink in &self.sinks {
            run_isolated("event sink", || sink.record(event));
        }
    }
}

/// Writes each event as a log line. Phase changes at info, the rest at debug.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: &SignalEvent) {
        match (event.kind, event.green_units) {
            (SignalEventKind::Transition, Some(units)) => log::info!(
                "Signal [{}]: switching to {:?} for {} units (cars: {}, pedestrians: {})",
                event.signal_id,
                event.phase,
                units,
                event.car_demand,
                event.pedestrian_demand
            ),
            (SignalEventKind::Transition, None) | (SignalEventKind::Timeout, _) => log::info!(
                "Signal [{}]: {:?}, switching to {:?} (cars: {}, pedestrians: {})",
                event.signal_id,
                event.kind,
                event.phase,
                event.car_demand,
                event.pedestrian_demand
            ),
            _ => log::debug!(
                "Signal [{}]: {:?} in {:?} (cars: {}, pedestrians: {})",
                event.signal_id,
                event.kind,
                event.phase,
                event.car_demand,
                event.pedestrian_demand
            ),
        }
    }
}

/// Appends events to a CSV file. The header is written only when the file
/// is new, so several runs can share one log.
pub struct CsvEventLog {
    writer: Mutex<csv::Writer<File>>,
}

impl CsvEventLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let path = path.as_ref();
        let file_exists = path.exists() && path.metadata()?.len() > 0;
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(!file_exists)
            .from_writer(file);
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }
}

impl EventSink for CsvEventLog {
    fn record(&self, event: &SignalEvent) {
        let mut writer = lock(&self.writer);
        if let Err(e) = writer.serialize(event) {
            log::error!("Error logging signal event: {}", e);
            return;
        }
        if let Err(e) = writer.flush() {
            log::error!("Error flushing signal event log: {}", e);
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct EventHistory {
    events: Mutex<Vec<SignalEvent>>,
}

impl EventHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SignalEvent> {
        lock(&self.events).clone()
    }

    pub fn for_signal(&self, id: &SignalId) -> Vec<SignalEvent> {
        lock(&self.events)
            .iter()
            .filter(|event| &event.signal_id == id)
            .cloned()
            .collect()
    }

    pub fn count(&self, id: &SignalId, kind: SignalEventKind) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| &event.signal_id == id && event.kind == kind)
            .count()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl EventSink for EventHistory {
    fn record(&self, event: &SignalEvent) {
        lock(&self.events).push(event.clone());
    }
}

/// Per-signal totals for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub signal_id: SignalId,
    pub admissions: usize,
    pub sent: usize,
    pub received: usize,
    pub transitions: usize,
    pub timeouts: usize,
}

impl EventSummary {
    fn new(signal_id: SignalId) -> Self {
        Self {
            signal_id,
            admissions: 0,
            sent: 0,
            received: 0,
            transitions: 0,
            timeouts: 0,
        }
    }
}

/// Totals events per signal, in order of each signal's first event.
pub fn summarize_events(events: &[SignalEvent]) -> Vec<EventSummary> {
    let mut summaries: Vec<EventSummary> = Vec::new();
    for event in events {
        let index = match summaries
            .iter()
            .position(|summary| summary.signal_id == event.signal_id)
        {
            Some(index) => index,
            None => {
                summaries.push(EventSummary::new(event.signal_id.clone()));
                summaries.len() - 1
            }
        };
        let summary = &mut summaries[index];
        match event.kind {
            SignalEventKind::Admit => summary.admissions += 1,
            SignalEventKind::Send => summary.sent += 1,
            SignalEventKind::Receive => summary.received += 1,
            SignalEventKind::Transition => summary.transitions += 1,
            SignalEventKind::Timeout => summary.timeouts += 1,
        }
    }
    summaries
}

/// Reads back a log written by [`CsvEventLog`].
pub fn read_event_log(path: impl AsRef<Path>) -> Result<Vec<SignalEvent>, Box<dyn Error>> {
    let file = File::open(path)?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut events = Vec::new();
    for result in rdr.deserialize() {
        let event: SignalEvent = result?;
        events.push(event);
    }
    Ok(events)
}

// A sink that panicked mid-record must not silence monitoring for good.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
