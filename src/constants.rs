//! # System Constants
//!
//! Task type names, queue names and status strings shared by the checkout
//! workflow, the task distributor and the task processor.

// Re-export state types for convenience
pub use crate::state_machine::{OrderStatus, TaskState};

/// Registered task types carried in every queued task envelope
pub mod task_types {
    pub const SEND_VERIFY_EMAIL: &str = "task:send_verify_email";
    pub const SEND_ORDER_CONFIRMATION: &str = "task:send_order_confirmation";
}

/// Queue names, highest priority first
pub mod queues {
    pub const CRITICAL: &str = "critical";
    pub const DEFAULT: &str = "default";
}

/// Payment status strings persisted on `payments.status`
pub mod payment_status {
    pub const NOT_PAID: &str = "not_paid";
    pub const PAID: &str = "paid";
}

/// Operational limits
pub mod system {
    /// Validity window of an email verification code
    pub const VERIFY_EMAIL_TTL_MINUTES: i64 = 15;
    /// Upper bound on visibility timeouts requested from the queue
    pub const MAX_VISIBILITY_TIMEOUT_SECONDS: u64 = 12 * 60 * 60;
}
