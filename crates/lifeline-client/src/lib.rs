//! Client side of Lifeline: the SOS transmission coordinator, its auto-send
//! countdown, backend delivery and crowd report submission.

pub mod auto_send;
pub mod backend;
pub mod coordinator;
pub mod draft;
pub mod events;
pub mod reports;
pub mod state;

pub use auto_send::AutoSend;
pub use backend::{HttpBackend, ReportDelivery, SosDelivery};
pub use coordinator::SosCoordinator;
pub use draft::SosDraft;
pub use events::ClientEvent;
pub use reports::{NewsReport, ReportCategory, ReportError, ReportSubmitter};
pub use state::SosState;
