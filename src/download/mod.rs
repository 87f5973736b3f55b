pub mod error;
pub mod history;
pub mod http_client;
pub mod http_errors;
pub mod lane;
pub mod progress;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod task;
pub mod transfer;
