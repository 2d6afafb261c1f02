//! Fleetcheck Library
//!
//! Core modules for fleet-wide network state validation.

pub mod cache;
pub mod checks;
pub mod command;
pub mod device;
pub mod errors;
pub mod inventory;
pub mod logs;
pub mod report;
pub mod runner;
