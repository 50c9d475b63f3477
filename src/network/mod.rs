//! Network side of the control center: address ranges, liveness probes,
//! the discovery loop and outgoing device commands.

pub mod command;
pub mod discovery;
pub mod probe;
pub mod range;

pub use command::{CommandDispatcher, CommandError, DeviceCommand, LineState};
pub use discovery::{DiscoveryPoller, PollerConfig};
pub use probe::{HttpProbe, LivenessProbe, ProbeOutcome, StatusReport, UnreachableReason};
pub use range::{expand, AddressRange, RangeError};
