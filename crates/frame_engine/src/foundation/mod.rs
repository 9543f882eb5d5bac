//! Foundation utilities

pub mod logging;
