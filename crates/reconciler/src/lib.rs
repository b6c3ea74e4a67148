//! Cross-Border Reconciler
//!
//! Pairs the states of two stations in neighbouring jurisdictions:
//! - checks both sides are reliable (not missing)
//! - asks a transport model which side is upwind and how long transport takes
//! - emits one deterministic coordination event per pair, window and level tuple
//!
//! Decisions only ever look at owned snapshots, never live state.

mod error;
mod pair;
mod playbook;
mod reconciler;
mod transport;

pub use error::ReconcileError;
pub use pair::{PairSide, StationPair};
pub use playbook::{CountryPlaybook, PolicyPlaybook};
pub use reconciler::{Reconciler, ReconcilerConfig};
pub use transport::{FixedTransportModel, TransportEstimate, TransportModel, WindTransportModel};
