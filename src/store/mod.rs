//! Queries shared by several handlers. Single-screen reads stay in the handlers.

pub mod accounts;
pub mod bookings;
pub mod finances;
pub mod inventory;

#[cfg(test)]
pub mod testing;
