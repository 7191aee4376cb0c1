//! Route handlers

pub mod faults;
pub mod logs;
pub mod monitor;
pub mod report;
