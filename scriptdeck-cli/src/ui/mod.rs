pub mod dashboard;
pub mod theme;

pub use dashboard::run_dashboard;
pub use theme::styles;
