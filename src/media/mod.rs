pub mod capture;
pub mod synthetic;

pub use capture::{CaptureTrack, DeviceCapture, MediaHandle, ReleaseTracker, TrackKind};
pub use synthetic::SyntheticCapture;
