// Re-export audit traits from core for convenience
pub use waypoint_core::{AuditContext, AuditLogger, AuditOperation};

pub mod services;
pub use services::*;

pub mod plugin;
pub use plugin::AuditPlugin;
