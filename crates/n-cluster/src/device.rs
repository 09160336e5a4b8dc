//! Logical devices attached to monitor cells.
//!
//! A device (a computer wired to the monitor, typically) attaches to one
//! cell but hears about the whole cluster: resize and touch events fan out
//! to every device on every member cell. Devices come and go independently
//! of geometry, so cells store only their ids and events are pushed into a
//! caller-provided sink.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies an attached device. Doubles as its attachment name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor_{}", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An event queued for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceEvent {
    /// The cluster's terminal changed size.
    Resize { cols: u16, rows: u16 },
    /// The cluster was touched at a 1-based character position.
    Touch { col: u16, row: u16 },
}

/// Receives device events.
pub trait DeviceSink {
    fn queue_event(&mut self, device: DeviceId, event: DeviceEvent);
}

impl DeviceSink for Vec<(DeviceId, DeviceEvent)> {
    fn queue_event(&mut self, device: DeviceId, event: DeviceEvent) {
        self.push((device, event));
    }
}
