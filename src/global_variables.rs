// Demand capacity per signal
pub const MAX_CARS: u32 = 20;
pub const MAX_PEDESTRIANS: u32 = 50;

// Green duration rules, in time-units
pub const BASE_VEHICLE_GREEN_UNITS: u32 = 5;
pub const MAX_VEHICLE_GREEN_UNITS: u32 = 60;
pub const PEDESTRIAN_GREEN_UNITS: u32 = 10;

// Demand drained when a green phase times out
pub const CAR_DRAIN_ON_TIMEOUT: u32 = 5;
pub const PEDESTRIAN_DRAIN_ON_TIMEOUT: u32 = 10;

// Simulation defaults
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_TIME_UNIT_MS: u64 = 1000;
pub const DEFAULT_VEHICLE_SIGNALS: usize = 4;
pub const DEFAULT_PEDESTRIAN_SIGNALS: usize = 8;

// Monitoring output
pub const EVENT_LOG_FILE: &str = "signal_events.csv";
