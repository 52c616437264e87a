//! Session orchestration: the launch gate and the version probe.

pub mod registry;
