use crate::global_variables::{
    BASE_VEHICLE_GREEN_UNITS, CAR_DRAIN_ON_TIMEOUT, MAX_CARS, MAX_PEDESTRIANS,
    MAX_VEHICLE_GREEN_UNITS, PEDESTRIAN_DRAIN_ON_TIMEOUT, PEDESTRIAN_GREEN_UNITS,
};
use crate::shared_data::{
    current_timestamp, Notification, Phase, SignalEvent, SignalEventKind, SignalId, SignalKind,
    SignalSnapshot,
};

/// Work a signal asks its runtime to carry out after a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalEffect {
    /// Deliver this notification to every peer, in peer order.
    Broadcast(Notification),
    /// Ask every peer to re-evaluate. Fire-and-forget.
    ReevaluatePeers,
    /// Arm the phase timeout for the green phase just entered.
    ScheduleTimeout { generation: u64, units: u32 },
    /// Disarm a timeout whose green phase ended early.
    CancelTimeout { generation: u64 },
}

/// Everything one operation on a signal produced: effects to execute and
/// events to publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    pub effects: Vec<SignalEffect>,
    pub events: Vec<SignalEvent>,
}

impl Reaction {
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty() && self.events.is_empty()
    }

    pub fn extend(&mut self, other: Reaction) {
        self.effects.extend(other.effects);
        self.events.extend(other.events);
    }

    pub fn broadcasts(&self) -> impl Iterator<Item = &Notification> {
        self.effects.iter().filter_map(|effect| match effect {
            SignalEffect::Broadcast(notification) => Some(notification),
            _ => None,
        })
    }

    /// The timeout armed by this reaction, as `(generation, units)`.
    pub fn scheduled_timeout(&self) -> Option<(u64, u32)> {
        self.effects.iter().find_map(|effect| match effect {
            SignalEffect::ScheduleTimeout { generation, units } => Some((*generation, *units)),
            _ => None,
        })
    }

    pub fn has_event(&self, kind: SignalEventKind) -> bool {
        self.events.iter().any(|event| event.kind == kind)
    }
}

/// One traffic signal: its phase, its demand counters and the ids of the
/// peers it notifies.
///
/// `Signal` holds no clock and does no I/O. Each operation mutates the state
/// and returns a [`Reaction`]; the actor that owns the signal executes it.
/// Counters stay within `0..=MAX_CARS` and `0..=MAX_PEDESTRIANS`.
#[derive(Debug, Clone)]
pub struct Signal {
    id: SignalId,
    kind: SignalKind,
    phase: Phase,
    car_demand: u32,
    pedestrian_demand: u32,
    peers: Vec<SignalId>,
    pending_timeout: Option<u64>,
    next_generation: u64,
}

impl Signal {
    pub fn new(id: impl Into<SignalId>, kind: SignalKind) -> Self {
        Self {
            id: id.into(),
            kind,
            phase: Phase::Red,
            car_demand: 0,
            pedestrian_demand: 0,
            peers: Vec::new(),
            pending_timeout: None,
            next_generation: 0,
        }
    }

    pub fn vehicle(id: impl Into<SignalId>) -> Self {
        Self::new(id, SignalKind::Vehicle)
    }

    pub fn pedestrian(id: impl Into<SignalId>) -> Self {
        Self::new(id, SignalKind::Pedestrian)
    }

    pub fn id(&self) -> &SignalId {
        &self.id
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn car_demand(&self) -> u32 {
        self.car_demand
    }

    pub fn pedestrian_demand(&self) -> u32 {
        self.pedestrian_demand
    }

    pub fn peers(&self) -> &[SignalId] {
        &self.peers
    }

    pub fn timeout_pending(&self) -> bool {
        self.pending_timeout.is_some()
    }

    /// Adds a peer to notify. Self-loops and duplicates are ignored, so the
    /// peer list behaves as an ordered set.
    pub fn add_peer(&mut self, peer: SignalId) -> bool {
        if peer == self.id || self.peers.contains(&peer) {
            return false;
        }
        self.peers.push(peer);
        true
    }

    pub fn admit_car_demand(&mut self) -> Reaction {
        if self.kind != SignalKind::Vehicle || self.car_demand >= MAX_CARS {
            return Reaction::default();
        }
        self.car_demand += 1;
        self.admitted()
    }

    pub fn admit_pedestrian_demand(&mut self) -> Reaction {
        if self.kind != SignalKind::Pedestrian || self.pedestrian_demand >= MAX_PEDESTRIANS {
            return Reaction::default();
        }
        self.pedestrian_demand += 1;
        self.admitted()
    }

    /// Admits one unit of whichever demand this signal's kind accumulates.
    pub fn admit_native_demand(&mut self) -> Reaction {
        match self.kind {
            SignalKind::Vehicle => self.admit_car_demand(),
            SignalKind::Pedestrian => self.admit_pedestrian_demand(),
        }
    }

    fn admitted(&mut self) -> Reaction {
        let mut reaction = Reaction::default();
        reaction.events.push(self.event(SignalEventKind::Admit, None));
        self.broadcast(&mut reaction);
        reaction
    }

    /// Merges a peer's demand into this signal's counters, then re-evaluates.
    ///
    /// The merge is a saturating accumulator: non-positive counts are
    /// dropped and repeated notifications keep adding until the cap. Demand
    /// of the kind this signal cannot serve is kept as-is and never drained.
    pub fn receive_notification(&mut self, notification: &Notification) -> Reaction {
        if notification.sender_id == self.id {
            return Reaction::default();
        }
        self.car_demand = saturating_merge(self.car_demand, notification.car_count, MAX_CARS);
        self.pedestrian_demand = saturating_merge(
            self.pedestrian_demand,
            notification.pedestrian_count,
            MAX_PEDESTRIANS,
        );

        let mut reaction = Reaction::default();
        reaction.events.push(self.event(SignalEventKind::Receive, None));
        reaction.extend(self.reevaluate());
        reaction
    }

    /// Applies the phase transition rules.
    ///
    /// Red enters the green phase of the signal's kind when that kind has
    /// demand. A green phase whose demand is gone returns to red early and
    /// disarms its timeout. Any transition is broadcast and every peer is
    /// asked to re-evaluate.
    pub fn reevaluate(&mut self) -> Reaction {
        let mut reaction = Reaction::default();
        let mut transitioned = false;

        match (self.phase, self.kind) {
            (Phase::Red, SignalKind::Vehicle) if self.car_demand > 0 => {
                let units = self.green_duration_units();
                self.enter_green(Phase::GreenVehicle, units, &mut reaction);
                transitioned = true;
            }
            (Phase::Red, SignalKind::Pedestrian) if self.pedestrian_demand > 0 => {
                self.enter_green(Phase::GreenPedestrian, PEDESTRIAN_GREEN_UNITS, &mut reaction);
                transitioned = true;
            }
            _ => {}
        }

        match self.phase {
            Phase::GreenVehicle if self.car_demand == 0 => {
                self.enter_red_early(&mut reaction);
                transitioned = true;
            }
            Phase::GreenPedestrian if self.pedestrian_demand == 0 => {
                self.enter_red_early(&mut reaction);
                transitioned = true;
            }
            _ => {}
        }

        if transitioned {
            self.broadcast(&mut reaction);
            reaction.effects.push(SignalEffect::ReevaluatePeers);
        }
        reaction
    }

    /// Ends the green phase armed with `generation`: back to red, drain the
    /// native counter, broadcast, and ask peers to re-evaluate.
    ///
    /// A generation that is no longer pending belongs to a phase that already
    /// ended, and is ignored.
    pub fn fire_timeout(&mut self, generation: u64) -> Reaction {
        if self.pending_timeout != Some(generation) {
            log::debug!(
                "Signal [{}]: ignoring stale timeout (generation {})",
                self.id,
                generation
            );
            return Reaction::default();
        }
        self.pending_timeout = None;
        self.phase = Phase::Red;
        match self.kind {
            SignalKind::Vehicle => {
                self.car_demand = self.car_demand.saturating_sub(CAR_DRAIN_ON_TIMEOUT);
            }
            SignalKind::Pedestrian => {
                self.pedestrian_demand = self
                    .pedestrian_demand
                    .saturating_sub(PEDESTRIAN_DRAIN_ON_TIMEOUT);
            }
        }

        let mut reaction = Reaction::default();
        reaction.events.push(self.event(SignalEventKind::Timeout, None));
        self.broadcast(&mut reaction);
        reaction.effects.push(SignalEffect::ReevaluatePeers);
        reaction
    }

    /// Green duration, in time-units, this signal would get if it turned
    /// green now.
    pub fn green_duration_units(&self) -> u32 {
        match self.kind {
            SignalKind::Vehicle => {
                (BASE_VEHICLE_GREEN_UNITS + self.car_demand / 2).min(MAX_VEHICLE_GREEN_UNITS)
            }
            SignalKind::Pedestrian => PEDESTRIAN_GREEN_UNITS,
        }
    }

    pub fn notification(&self) -> Notification {
        Notification {
            sender_id: self.id.clone(),
            car_count: i64::from(self.car_demand),
            pedestrian_count: i64::from(self.pedestrian_demand),
            sender_phase: self.phase,
        }
    }

    pub fn snapshot(&self) -> SignalSnapshot {
        SignalSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            phase: self.phase,
            car_demand: self.car_demand,
            pedestrian_demand: self.pedestrian_demand,
            peer_count: self.peers.len(),
            timeout_pending: self.pending_timeout.is_some(),
        }
    }

    fn enter_green(&mut self, phase: Phase, units: u32, reaction: &mut Reaction) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.pending_timeout = Some(generation);
        self.phase = phase;
        reaction
            .effects
            .push(SignalEffect::ScheduleTimeout { generation, units });
        reaction
            .events
            .push(self.event(SignalEventKind::Transition, Some(units)));
    }

    fn enter_red_early(&mut self, reaction: &mut Reaction) {
        if let Some(generation) = self.pending_timeout.take() {
            reaction
                .effects
                .push(SignalEffect::CancelTimeout { generation });
        }
        self.phase = Phase::Red;
        reaction
            .events
            .push(self.event(SignalEventKind::Transition, None));
    }

    fn broadcast(&self, reaction: &mut Reaction) {
        reaction
            .effects
            .push(SignalEffect::Broadcast(self.notification()));
        reaction.events.push(self.event(SignalEventKind::Send, None));
    }

    fn event(&self, kind: SignalEventKind, green_units: Option<u32>) -> SignalEvent {
        SignalEvent {
            timestamp: current_timestamp(),
            signal_id: self.id.clone(),
            kind,
            phase: self.phase,
            car_demand: self.car_demand,
            pedestrian_demand: self.pedestrian_demand,
            green_units,
        }
    }
}

fn saturating_merge(current: u32, delta: i64, cap: u32) -> u32 {
    let delta = delta.clamp(0, i64::from(cap)) as u32;
    current.saturating_add(delta).min(cap)
}
