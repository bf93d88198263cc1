pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod services;
pub mod session;
pub mod state;

pub use errors::{ClientError, ErrorKind};
pub use models::Navigation;
pub use services::checkout::{CheckoutOptions, CheckoutSession};
