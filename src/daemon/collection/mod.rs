//! Producers of engine events: the device poller and the periodic timer.

pub mod poller;
pub mod timer;
