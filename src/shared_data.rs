// src/shared_data.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Stable identity of a signal, fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(pub String);

impl SignalId {
    pub fn new(id: impl Into<String>) -> Self {
        SignalId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SignalId {
    fn from(id: String) -> Self {
        SignalId(id)
    }
}

impl From<&str> for SignalId {
    fn from(id: &str) -> Self {
        SignalId(id.to_string())
    }
}

/// Which demand a signal accumulates and which green rule it follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    Vehicle,
    Pedestrian,
}

/// The light a signal currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Red,
    GreenVehicle,
    GreenPedestrian,
}

impl Phase {
    pub fn is_green(self) -> bool {
        !matches!(self, Phase::Red)
    }
}

/// Snapshot of a sender's demand and phase, broadcast to every peer.
///
/// Counts are signed: a receiver drops non-positive deltas rather than
/// trusting the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub sender_id: SignalId,
    pub car_count: i64,
    pub pedestrian_count: i64,
    pub sender_phase: Phase,
}

/// Point-in-time view of one signal, as returned by a snapshot query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub id: SignalId,
    pub kind: SignalKind,
    pub phase: Phase,
    pub car_demand: u32,
    pub pedestrian_demand: u32,
    pub peer_count: usize,
    pub timeout_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalEventKind {
    Admit,
    Send,
    Receive,
    Transition,
    Timeout,
}

/// One observable step of a signal, flattened so it can be written as a CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub timestamp: u64,
    pub signal_id: SignalId,
    pub kind: SignalEventKind,
    pub phase: Phase,
    pub car_demand: u32,
    pub pedestrian_demand: u32,
    /// Green duration in time-units, set only on transitions into a green phase.
    pub green_units: Option<u32>,
}

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
