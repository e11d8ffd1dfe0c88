//! Distinguishing values created by a lookup from values that were already there.

/// Result of a get-or-create lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seen<T> {
    /// Created by the lookup
    New(T),
    /// Already present
    Old(T),
}

impl<T> Seen<T> {
    /// Extracts the inner value regardless of whether it's new or old.
    pub fn any(self) -> T {
        match self {
            Seen::New(x) | Seen::Old(x) => x,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Seen::New(_))
    }
}
