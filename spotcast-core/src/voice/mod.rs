pub mod capture;
pub mod pcm;
pub mod policy;
pub mod registry;
pub mod supervisor;
pub mod transport;

pub use capture::{CaptureSettings, FfmpegCapture};
pub use policy::{FixedDelay, RestartPolicy, DEFAULT_RESTART_DELAY};
pub use registry::SessionRegistry;
pub use supervisor::{SessionHandle, SessionState, StreamSupervisor};
pub use transport::ConnectionStateTracker;
