pub mod capture;
pub mod lanforge;
pub mod sim;
pub mod traits;

// Re-export the seams and their concrete implementations
pub use traits::{AttenuatorInfo, CaptureAgent, DeviceController, MonitorSpec, Pacer, PortState};

pub use capture::{SshCaptureAgent, SshTarget};
pub use lanforge::LanforgeClient;
pub use sim::{CaptureCall, SimulatedBench};
