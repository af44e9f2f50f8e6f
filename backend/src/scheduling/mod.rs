// Booking links: slot availability and the booking state machine

pub mod availability;
pub mod booking;

pub use availability::{compute_slots, fits_schedule, is_slot_free, overlaps};
pub use booking::{validate_request, BookerInfo, BookingService};
