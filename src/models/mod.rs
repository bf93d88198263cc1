pub mod lock;
pub mod marker;
pub mod navigation;
pub mod reservation;
pub mod slot;

pub use lock::{LockState, LockToken};
pub use marker::BookingMarker;
pub use navigation::Navigation;
pub use reservation::{
    NewReservation, PaymentMethod, PaymentStatus, PaymentUpdate, Reservation, ReservationForm,
    ReservationStatus,
};
pub use slot::{Availability, SlotKey, TimeRange, TimeSlot};
