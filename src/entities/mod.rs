pub mod booking;
pub mod invoice;
pub mod payment;
pub mod tour;
