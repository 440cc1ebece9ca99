mod control;
mod doctor;
mod logs;
mod status;
mod watch;

pub use control::{run_add, run_control, run_remove, run_update};
pub use doctor::run_doctor;
pub use logs::{LogFormat, run_logs};
pub use status::run_status;
pub use watch::run_watch;
