// Remote operation adapters
//
// The workflow only sees the `PoolAdapters` trait; the transport behind it is
// supplied by the host. `SimulatedNetwork` is an in-memory implementation with
// eventual consistency used by the CLI and the integration tests.

pub mod errors;
pub mod simulated;
pub mod traits;

pub use errors::AdapterError;
pub use simulated::{Operation, SimulatedNetwork, SimulationProfile};
pub use traits::{PoolAdapters, PoolLookup};
