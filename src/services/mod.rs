// Services module - Business logic

pub mod attendance;
pub mod monitor;
pub mod recognition;
pub mod sessions;
