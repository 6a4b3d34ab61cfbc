pub mod api;
pub mod config;
pub mod decision;
pub mod error;
pub mod face;
pub mod ingress;
pub mod state;
pub mod store;
pub mod warmup;

pub use config::VerifyServiceConfig;
pub use error::VerifyError;
pub use state::VerifyServiceState;
