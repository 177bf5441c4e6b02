// signal_system/mod.rs
pub mod intersection_controller;
pub mod scheduler;
pub mod signal;
pub mod signal_actor;
