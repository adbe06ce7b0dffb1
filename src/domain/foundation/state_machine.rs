//! Lifecycle enums with a fixed transition table.

use super::ValidationError;

/// A `Copy` enum whose legal moves are listed per state.
///
/// ```ignore
/// impl StateMachine for ConnectionState {
///     fn successors(&self) -> &'static [Self] {
///         match self {
///             Connecting => &[Open, Closed],
///             Open => &[Closing],
///             Closing => &[Closed],
///             Closed => &[],
///         }
///     }
/// }
///
/// entry.state = entry.state.transition_to(ConnectionState::Closing)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug + 'static {
    /// States reachable in one step.
    fn successors(&self) -> &'static [Self];

    fn can_transition_to(&self, target: &Self) -> bool {
        self.successors().contains(target)
    }

    /// `target` if the move is legal, otherwise a validation error naming both ends.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            return Ok(target);
        }
        Err(ValidationError::invalid_format(
            "state_transition",
            format!("{:?} -> {:?} is not allowed", self, target),
        ))
    }

    /// No further moves possible.
    fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }
}
