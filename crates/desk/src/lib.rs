//! Operator desk: translates operator actions into draft, commit, receipt and report
//! calls, and maps every outcome into a serializable reply.

pub mod app;

pub use app::ShipmentDesk;
pub use app::dto::{DeskRequest, DeskResponse, OperatorAction};
pub use app::errors::DeskError;
