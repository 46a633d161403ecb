pub mod admin;
pub mod archival;
pub mod auth;
pub mod error;
pub mod events;
pub mod functions;
pub mod listing;
pub mod maintenance;
pub mod middleware;
pub mod newsletter;
pub mod routes;
pub mod state;
pub mod store;
pub mod tickets;

pub use routes::router;
pub use state::{AppState, AppStateInner};
