//! Client-side session management for the cycle tracking service: the
//! authenticated HTTP transport, typed gateways over the remote API, the
//! session state machine and the navigation guard built on top of it.

pub mod auth_gateway;
pub mod config;
pub mod error;
pub mod predictions_gateway;
pub mod profile_gateway;
pub mod records_gateway;
pub mod route_gate;
pub mod session;
pub mod transport;
pub mod types;

pub use auth_gateway::AuthGateway;
pub use config::{load_settings, prepare_database_url, ClientSettings};
pub use error::{classify, ClassifiedError, ErrorKind, RequestContext, TransportError};
pub use predictions_gateway::PredictionsGateway;
pub use profile_gateway::ProfileGateway;
pub use records_gateway::RecordsGateway;
pub use route_gate::{post_auth_destination, GateDecision, ProfilePolicy, Route, RouteGate};
pub use session::SessionController;
pub use transport::{ExpiryNotice, Transport};
pub use types::{AuthOutcome, ProfileStatus, SessionEvent, SessionPhase, SessionSnapshot};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
