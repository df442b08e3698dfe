pub mod bids;
pub mod delivery;
pub mod disputes;
pub mod earnings;
pub mod payments;
pub mod reviews;
pub mod routes;
pub mod selection;
pub mod settlement;
pub mod withdrawals;

#[cfg(test)]
pub(crate) mod fixtures;

/// Outcome of a compare-and-swap status transition.
///
/// `Unchanged` is returned when the row was not in the expected source state,
/// including when a concurrent caller already applied the same transition.
#[derive(Debug, Clone)]
pub enum Transition<T> {
    Applied(T),
    Unchanged(T),
}

impl<T> Transition<T> {
    pub fn applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Transition::Applied(value) | Transition::Unchanged(value) => value,
        }
    }
}
