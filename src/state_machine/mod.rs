// State definitions for orders and queued tasks
//
// Transitions are enforced by the lifecycle operations (orders) and the task
// processor (tasks); this module only owns the allowed-transition tables.

pub mod states;

pub use states::{OrderStatus, TaskState};
