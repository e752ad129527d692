pub mod bookings;
pub mod invoicing;
pub mod notifications;
pub mod payments;
pub mod sweeper;
pub mod tours;
