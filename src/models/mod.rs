mod cabin;
mod detection;
mod session;

pub use cabin::{Cabin, CabinStatus};
pub use detection::{DetectionMethod, DetectionResult, DetectionSubmission};
pub use session::SessionRecord;
