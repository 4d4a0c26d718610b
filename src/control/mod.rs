//! Flow control: the shared clock and the admission budgets it resets

pub mod admission;
pub mod clock;

pub use admission::{AdmissionController, QpsAdmission};
pub use clock::Clock;
