mod machine;
mod session;
pub mod timing;

pub use machine::{fruits_for, FocusState};
pub use session::{FocusSession, PauseInterval, SessionStatus};
pub use timing::SessionTiming;
