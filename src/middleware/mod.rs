pub mod permission;
pub mod throttle;

pub use permission::{CurrentAccount, AUTH_COOKIE};
pub use throttle::{throttle_anonymous, throttle_callers, Throttle};
