//! Remote data service consumed by the sync manager and the offline client.

mod http;
mod traits;

pub use http::HttpRemote;
pub use traits::{Method, RemoteService};
