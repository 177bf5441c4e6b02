// signal_actor.rs
//
// Each signal is owned by one task that drains a single mailbox. Admission,
// notification receipt, re-evaluation and timeout firing for a signal all go
// through that mailbox, so they never run concurrently with each other.

use crate::error::SignalError;
use crate::monitoring::event_recorder::EventSink;
use crate::shared_data::{Notification, SignalId, SignalKind, SignalSnapshot};
use crate::signal_system::scheduler::{panic_message, run_isolated, Scheduler, TimerHandle};
use crate::signal_system::signal::{Reaction, Signal, SignalEffect};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum SignalCommand {
    AdmitCarDemand,
    AdmitPedestrianDemand,
    AdmitNativeDemand,
    Receive(Notification),
    Reevaluate,
    TimeoutElapsed { generation: u64 },
    Snapshot(oneshot::Sender<SignalSnapshot>),
    Shutdown,
}

/// Routes commands to peers by id.
///
/// The live implementation is [`MailboxDirectory`]; any other implementation
/// can stand in for the peer set without running real signals.
pub trait PeerDirectory: Send + Sync {
    fn deliver(&self, to: &SignalId, command: SignalCommand) -> Result<(), SignalError>;
}

/// Cloneable address of a running signal. Every call only enqueues a
/// command; none of them waits for the signal except [`SignalHandle::snapshot`].
#[derive(Debug, Clone)]
pub struct SignalHandle {
    id: SignalId,
    kind: SignalKind,
    sender: mpsc::UnboundedSender<SignalCommand>,
}

impl SignalHandle {
    pub fn id(&self) -> &SignalId {
        &self.id
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn send(&self, command: SignalCommand) -> Result<(), SignalError> {
        self.sender
            .send(command)
            .map_err(|_| SignalError::MailboxClosed(self.id.clone()))
    }

    pub fn admit_car_demand(&self) -> Result<(), SignalError> {
        self.send(SignalCommand::AdmitCarDemand)
    }

    pub fn admit_pedestrian_demand(&self) -> Result<(), SignalError> {
        self.send(SignalCommand::AdmitPedestrianDemand)
    }

    pub fn admit_native_demand(&self) -> Result<(), SignalError> {
        self.send(SignalCommand::AdmitNativeDemand)
    }

    pub fn receive_notification(&self, notification: Notification) -> Result<(), SignalError> {
        self.send(SignalCommand::Receive(notification))
    }

    pub fn reevaluate(&self) -> Result<(), SignalError> {
        self.send(SignalCommand::Reevaluate)
    }

    /// State of the signal once every command queued before this one has run.
    pub async fn snapshot(&self) -> Result<SignalSnapshot, SignalError> {
        let (reply, response) = oneshot::channel();
        self.send(SignalCommand::Snapshot(reply))?;
        response
            .await
            .map_err(|_| SignalError::NoReply(self.id.clone()))
    }

    /// Stops the signal after the commands already queued.
    pub fn shutdown(&self) -> Result<(), SignalError> {
        self.send(SignalCommand::Shutdown)
    }
}

pub type SignalMailbox = mpsc::UnboundedReceiver<SignalCommand>;

pub fn signal_mailbox(signal: &Signal) -> (SignalHandle, SignalMailbox) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let handle = SignalHandle {
        id: signal.id().clone(),
        kind: signal.kind(),
        sender,
    };
    (handle, receiver)
}

/// The adjacency of a running intersection: id to mailbox.
#[derive(Debug, Clone, Default)]
pub struct MailboxDirectory {
    mailboxes: HashMap<SignalId, SignalHandle>,
}

impl MailboxDirectory {
    pub fn new(handles: impl IntoIterator<Item = SignalHandle>) -> Self {
        let mailboxes = handles
            .into_iter()
            .map(|handle| (handle.id().clone(), handle))
            .collect();
        Self { mailboxes }
    }

    pub fn get(&self, id: &SignalId) -> Option<&SignalHandle> {
        self.mailboxes.get(id)
    }
}

impl PeerDirectory for MailboxDirectory {
    fn deliver(&self, to: &SignalId, command: SignalCommand) -> Result<(), SignalError> {
        self.mailboxes
            .get(to)
            .ok_or_else(|| SignalError::UnknownPeer(to.clone()))?
            .send(command)
    }
}

pub struct SignalActor {
    signal: Signal,
    mailbox: SignalMailbox,
    own_handle: SignalHandle,
    directory: Arc<dyn PeerDirectory>,
    scheduler: Arc<dyn Scheduler>,
    events: Arc<dyn EventSink>,
    time_unit: Duration,
    pending_timer: Option<(u64, TimerHandle)>,
}

impl SignalActor {
    pub fn new(
        signal: Signal,
        mailbox: SignalMailbox,
        own_handle: SignalHandle,
        directory: Arc<dyn PeerDirectory>,
        scheduler: Arc<dyn Scheduler>,
        events: Arc<dyn EventSink>,
        time_unit: Duration,
    ) -> Self {
        Self {
            signal,
            mailbox,
            own_handle,
            directory,
            scheduler,
            events,
            time_unit,
            pending_timer: None,
        }
    }

    /// Processes commands until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        log::debug!("Signal [{}]: started", self.signal.id());
        while let Some(command) = self.mailbox.recv().await {
            if !self.handle_isolated(command) {
                break;
            }
        }
        if let Some((_, timer)) = self.pending_timer.take() {
            timer.cancel();
        }
        log::debug!("Signal [{}]: stopped", self.signal.id());
    }

    // A panicking command is logged and dropped; the signal keeps serving
    // its mailbox.
    fn handle_isolated(&mut self, command: SignalCommand) -> bool {
        match catch_unwind(AssertUnwindSafe(|| self.handle_command(command))) {
            Ok(keep_running) => keep_running,
            Err(panic) => {
                log::error!(
                    "Signal [{}]: command panicked: {}",
                    self.signal.id(),
                    panic_message(panic.as_ref())
                );
                true
            }
        }
    }

    fn handle_command(&mut self, command: SignalCommand) -> bool {
        let reaction = match command {
            SignalCommand::AdmitCarDemand => self.signal.admit_car_demand(),
            SignalCommand::AdmitPedestrianDemand => self.signal.admit_pedestrian_demand(),
            SignalCommand::AdmitNativeDemand => self.signal.admit_native_demand(),
            SignalCommand::Receive(notification) => {
                self.signal.receive_notification(&notification)
            }
            SignalCommand::Reevaluate => self.signal.reevaluate(),
            SignalCommand::TimeoutElapsed { generation } => {
                if matches!(self.pending_timer, Some((pending, _)) if pending == generation) {
                    self.pending_timer = None;
                }
                self.signal.fire_timeout(generation)
            }
            SignalCommand::Snapshot(reply) => {
                // the caller may have given up waiting
                let _ = reply.send(self.signal.snapshot());
                return true;
            }
            SignalCommand::Shutdown => return false,
        };
        self.apply(reaction);
        true
    }

    fn apply(&mut self, reaction: Reaction) {
        for event in &reaction.events {
            run_isolated("event sink", || self.events.record(event));
        }
        for effect in reaction.effects {
            match effect {
                SignalEffect::Broadcast(notification) => {
                    for peer in self.signal.peers() {
                        self.deliver(peer, SignalCommand::Receive(notification.clone()));
                    }
                }
                SignalEffect::ReevaluatePeers => {
                    for peer in self.signal.peers() {
                        self.deliver(peer, SignalCommand::Reevaluate);
                    }
                }
                SignalEffect::ScheduleTimeout { generation, units } => {
                    let handle = self.own_handle.clone();
                    let timer = self.scheduler.schedule_once(
                        self.time_unit * units,
                        Box::new(move || {
                            if let Err(e) = handle.send(SignalCommand::TimeoutElapsed { generation })
                            {
                                log::debug!("Dropping phase timeout: {}", e);
                            }
                        }),
                    );
                    if let Some((_, previous)) = self.pending_timer.replace((generation, timer)) {
                        previous.cancel();
                    }
                }
                SignalEffect::CancelTimeout { generation } => {
                    if matches!(self.pending_timer, Some((pending, _)) if pending == generation) {
                        if let Some((_, timer)) = self.pending_timer.take() {
                            timer.cancel();
                        }
                    }
                }
            }
        }
    }

    fn deliver(&self, peer: &SignalId, command: SignalCommand) {
        if let Err(e) = self.directory.deliver(peer, command) {
            log::warn!("Signal [{}]: delivery failed: {}", self.signal.id(), e);
        }
    }
}
