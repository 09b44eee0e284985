//! Data models

pub mod user;
pub mod report;
pub mod alert;
pub mod map;
pub mod audit_log;

pub use user::*;
pub use report::*;
pub use alert::*;
pub use map::*;
pub use audit_log::*;
