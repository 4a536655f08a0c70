mod brightness;
mod frame_source;
mod inspector;
mod motion;
mod smoothing;

pub use frame_source::FrameSource;
pub use inspector::CabinInspector;
pub use motion::MotionDetector;
pub use smoothing::DetectionSmoother;
