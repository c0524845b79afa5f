use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status values persisted on `orders.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Initial state when checkout creates the order
    WaitForConfirming,
    /// Merchant accepted the order
    Confirmed,
    /// Order handed to the carrier
    Delivering,
    /// Carrier reported delivery
    Delivered,
    /// Order was cancelled and its stock returned
    Cancelled,
    /// Delivered order was refunded
    Refunded,
    /// Delivered order was closed out
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        Self::WaitForConfirming,
        Self::Confirmed,
        Self::Delivering,
        Self::Delivered,
        Self::Cancelled,
        Self::Refunded,
        Self::Completed,
    ];

    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded | Self::Completed)
    }

    /// Orders may only be cancelled before they leave the warehouse
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::WaitForConfirming | Self::Confirmed)
    }

    /// Allowed next states
    pub fn successors(&self) -> &'static [OrderStatus] {
        match self {
            Self::WaitForConfirming => &[Self::Confirmed, Self::Cancelled],
            Self::Confirmed => &[Self::Delivering, Self::Cancelled],
            Self::Delivering => &[Self::Delivered],
            Self::Delivered => &[Self::Completed, Self::Refunded],
            Self::Cancelled | Self::Refunded | Self::Completed => &[],
        }
    }

    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        self.successors().contains(&target)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitForConfirming => "wait_for_confirming",
            Self::Confirmed => "confirmed",
            Self::Delivering => "delivering",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wait_for_confirming" => Ok(Self::WaitForConfirming),
            "confirmed" => Ok(Self::Confirmed),
            "delivering" => Ok(Self::Delivering),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid order status: {s}")),
        }
    }
}

/// Lifecycle of a queued task as observed by the processor
///
/// `enqueued → in_flight → {completed | retrying → in_flight … → dead_lettered | skipped}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Enqueued,
    InFlight,
    Completed,
    Retrying,
    DeadLettered,
    Skipped,
}

impl TaskState {
    /// Check if this is a terminal state (task has left the queue)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::DeadLettered | Self::Skipped)
    }

    pub fn can_transition_to(&self, target: TaskState) -> bool {
        matches!(
            (self, target),
            (Self::Enqueued, Self::InFlight)
                | (Self::InFlight, Self::Completed)
                | (Self::InFlight, Self::Retrying)
                | (Self::InFlight, Self::DeadLettered)
                | (Self::InFlight, Self::Skipped)
                | (Self::Retrying, Self::InFlight)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enqueued => write!(f, "enqueued"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Completed => write!(f, "completed"),
            Self::Retrying => write!(f, "retrying"),
            Self::DeadLettered => write!(f, "dead_lettered"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_round_trip_strings() {
        for status in OrderStatus::ALL {
            let parsed: OrderStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_cancellation_window() {
        assert!(OrderStatus::WaitForConfirming.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivering.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Refunded.can_transition_to(OrderStatus::Cancelled));

        for status in OrderStatus::ALL {
            assert_eq!(
                status.is_cancellable(),
                status.can_transition_to(OrderStatus::Cancelled)
            );
        }
    }

    #[test]
    fn test_terminal_states_have_no_successors() {
        for status in OrderStatus::ALL {
            assert_eq!(status.is_terminal(), status.successors().is_empty());
        }
    }

    #[test]
    fn test_task_state_transitions() {
        assert!(TaskState::Enqueued.can_transition_to(TaskState::InFlight));
        assert!(TaskState::Retrying.can_transition_to(TaskState::InFlight));
        assert!(!TaskState::Completed.can_transition_to(TaskState::InFlight));
        assert!(!TaskState::Enqueued.can_transition_to(TaskState::Completed));
        assert!(TaskState::Skipped.is_terminal());
        assert!(!TaskState::Retrying.is_terminal());
    }
}
