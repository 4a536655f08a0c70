pub mod controller;
pub mod state_machine;

pub use controller::TrackerController;
pub use state_machine::{DurationAdvance, StatusUpdate};
