//! `opwatch` core: operation model, progress/ETA arithmetic, clock and wire messages.

pub mod clock;
pub mod messages;
pub mod operation;
pub mod types;

pub use clock::{format_timestamp, ClockSource, ManualClock, SystemClock};
pub use messages::{ClientMessage, PongData, ProgressUpdatePayload, ServerMessage};
pub use operation::{estimate_eta, step_fraction, Operation, STARTING_MESSAGE};
pub use types::{OperationKind, OperationStatus};
