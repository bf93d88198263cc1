pub mod api;
pub mod availability;
pub mod board;
pub mod checkout;
pub mod guard;
pub mod locking;
pub mod poller;
pub mod retry;
