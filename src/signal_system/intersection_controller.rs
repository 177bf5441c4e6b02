use crate::error::{ConfigurationError, SignalError};
use crate::monitoring::event_recorder::{EventSink, EventSinks, LogSink};
use crate::shared_data::{SignalId, SignalSnapshot};
use crate::signal_system::scheduler::{Scheduler, TimerHandle};
use crate::signal_system::signal::Signal;
use crate::signal_system::signal_actor::{
    signal_mailbox, MailboxDirectory, PeerDirectory, SignalActor, SignalHandle,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Owns every signal of one intersection, wires them all-to-all and drives
/// the periodic demand tick.
///
/// Lifecycle: `register` signals, `connect_all`, then `start_signals` or
/// `run`. The set of signals and their peers is frozen once started. The
/// tick runs at most once per controller. Dropping the controller stops the
/// tick and asks every signal to shut down.
pub struct IntersectionController {
    scheduler: Arc<dyn Scheduler>,
    time_unit: Duration,
    sinks: EventSinks,
    pending: Vec<Signal>,
    connected: bool,
    handles: Vec<SignalHandle>,
    actors: Vec<JoinHandle<()>>,
    tick: Option<TimerHandle>,
    ticked: bool,
    shut_down: bool,
}

impl IntersectionController {
    /// `time_unit` is the wall-clock length of one green-duration unit.
    pub fn new(scheduler: Arc<dyn Scheduler>, time_unit: Duration) -> Self {
        let mut sinks = EventSinks::new();
        sinks.push(Arc::new(LogSink));
        Self {
            scheduler,
            time_unit,
            sinks,
            pending: Vec::new(),
            connected: false,
            handles: Vec::new(),
            actors: Vec::new(),
            tick: None,
            ticked: false,
            shut_down: false,
        }
    }

    fn is_started(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Adds a sink that receives every event of every signal.
    pub fn add_event_sink(&mut self, sink: Arc<dyn EventSink>) -> Result<(), ConfigurationError> {
        if self.is_started() {
            return Err(ConfigurationError::TopologyFrozen);
        }
        self.sinks.push(sink);
        Ok(())
    }

    pub fn register(&mut self, signal: Signal) -> Result<(), ConfigurationError> {
        if self.is_started() {
            return Err(ConfigurationError::TopologyFrozen);
        }
        if self.pending.iter().any(|s| s.id() == signal.id()) {
            return Err(ConfigurationError::DuplicateSignalId(signal.id().clone()));
        }
        log::debug!("Registered signal [{}] ({:?})", signal.id(), signal.kind());
        self.pending.push(signal);
        // a late registration needs to be connected as well
        self.connected = false;
        Ok(())
    }

    /// Makes every signal a peer of every other one. Safe to repeat: peers
    /// are kept as a set.
    pub fn connect_all(&mut self) -> Result<(), ConfigurationError> {
        if self.is_started() {
            return Err(ConfigurationError::TopologyFrozen);
        }
        if self.pending.is_empty() {
            return Err(ConfigurationError::NoSignalsRegistered);
        }
        let ids: Vec<SignalId> = self.pending.iter().map(|s| s.id().clone()).collect();
        for signal in self.pending.iter_mut() {
            for id in &ids {
                signal.add_peer(id.clone());
            }
        }
        self.connected = true;
        log::info!("Connected {} signals all-to-all", ids.len());
        Ok(())
    }

    /// Hands each signal to its own actor task. After this the signals only
    /// change through their handles.
    pub fn start_signals(&mut self) -> Result<(), ConfigurationError> {
        if self.shut_down {
            return Err(ConfigurationError::ShutDown);
        }
        if self.is_started() {
            return Err(ConfigurationError::AlreadyRunning);
        }
        if !self.connected {
            return Err(ConfigurationError::NotConnected);
        }
        let runtime = Handle::try_current().map_err(|_| ConfigurationError::NoRuntime)?;

        let signals = std::mem::take(&mut self.pending);
        let mailboxes: Vec<_> = signals.iter().map(signal_mailbox).collect();
        let directory: Arc<dyn PeerDirectory> = Arc::new(MailboxDirectory::new(
            mailboxes.iter().map(|(handle, _)| handle.clone()),
        ));
        let events: Arc<dyn EventSink> = Arc::new(self.sinks.clone());

        for (signal, (handle, mailbox)) in signals.into_iter().zip(mailboxes) {
            let actor = SignalActor::new(
                signal,
                mailbox,
                handle.clone(),
                Arc::clone(&directory),
                Arc::clone(&self.scheduler),
                Arc::clone(&events),
                self.time_unit,
            );
            self.actors.push(runtime.spawn(actor.run()));
            self.handles.push(handle);
        }
        log::info!("Started {} signals", self.handles.len());
        Ok(())
    }

    /// Starts the periodic tick, starting the signals first if needed.
    ///
    /// Each tick admits one unit of native demand to every signal, then asks
    /// every signal to re-evaluate. The first tick fires immediately. A
    /// stopped tick cannot be restarted.
    pub fn run(&mut self, tick_interval: Duration) -> Result<(), ConfigurationError> {
        if self.shut_down {
            return Err(ConfigurationError::ShutDown);
        }
        if self.ticked {
            return Err(ConfigurationError::AlreadyRunning);
        }
        if tick_interval.is_zero() {
            return Err(ConfigurationError::InvalidTickInterval);
        }
        if !self.is_started() {
            self.start_signals()?;
        }

        let handles = self.handles.clone();
        let mut tick_number: u64 = 0;
        let timer = self.scheduler.schedule_repeating(
            tick_interval,
            Box::new(move || {
                tick_number += 1;
                log::debug!("Tick {}", tick_number);
                run_tick(&handles);
            }),
        );
        self.tick = Some(timer);
        self.ticked = true;
        log::info!("Intersection running, tick every {:?}", tick_interval);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.tick.is_some()
    }

    /// Stops scheduling ticks. Signals keep running and finish whatever is
    /// already queued. Returns whether a tick was running.
    pub fn stop(&mut self) -> bool {
        match self.tick.take() {
            Some(timer) => {
                timer.cancel();
                log::info!("Intersection tick stopped");
                true
            }
            None => false,
        }
    }

    /// Stops the tick, then every signal after its queued work, and waits
    /// for them to exit.
    pub async fn shutdown(&mut self) {
        self.stop_signals();
        for actor in self.actors.drain(..) {
            if let Err(e) = actor.await {
                log::warn!("Signal task ended abnormally: {}", e);
            }
        }
        log::info!("Intersection shut down");
    }

    fn stop_signals(&mut self) {
        self.stop();
        self.shut_down = true;
        for handle in &self.handles {
            if let Err(e) = handle.shutdown() {
                log::debug!("Signal [{}] already stopped: {}", handle.id(), e);
            }
        }
    }

    pub fn signal(&self, id: &SignalId) -> Option<&SignalHandle> {
        self.handles.iter().find(|handle| handle.id() == id)
    }

    pub fn handles(&self) -> &[SignalHandle] {
        &self.handles
    }

    /// Ids in registration order.
    pub fn signal_ids(&self) -> Vec<SignalId> {
        if self.is_started() {
            self.handles.iter().map(|h| h.id().clone()).collect()
        } else {
            self.pending.iter().map(|s| s.id().clone()).collect()
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every running signal, in registration order.
    pub async fn snapshots(&self) -> Result<Vec<SignalSnapshot>, SignalError> {
        if !self.is_started() {
            return Ok(self.pending.iter().map(Signal::snapshot).collect());
        }
        let mut snapshots = Vec::with_capacity(self.handles.len());
        for handle in &self.handles {
            snapshots.push(handle.snapshot().await?);
        }
        Ok(snapshots)
    }
}

impl Drop for IntersectionController {
    fn drop(&mut self) {
        if !self.shut_down {
            self.stop_signals();
        }
    }
}

fn run_tick(handles: &[SignalHandle]) {
    for handle in handles {
        if let Err(e) = handle.admit_native_demand() {
            log::warn!("Tick could not admit demand: {}", e);
        }
    }
    for handle in handles {
        if let Err(e) = handle.reevaluate() {
            log::warn!("Tick could not re-evaluate: {}", e);
        }
    }
}
