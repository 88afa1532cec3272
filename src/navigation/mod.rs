pub mod monitor;
pub mod video_ref;

pub use monitor::{debounce_loop, NavigationMonitor, NavigationTrigger};
pub use video_ref::VideoRef;
