pub mod log;
pub mod retry;
pub mod sanitize;
