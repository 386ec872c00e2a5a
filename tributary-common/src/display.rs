use std::fmt::{Display, Formatter};

use tracing::Value;

use crate::models::amount::UFix64;

/// Wrapper that makes `Option<T>` implement `Display`, rendering `None` as `-`.
pub struct DisplayOption<'a, T>(&'a Option<T>);

impl<'a, T: Display> Display for DisplayOption<'a, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(inner) => write!(f, "{}", inner),
            None => write!(f, "-"),
        }
    }
}

/// Convenience function so you can write `op = opt(&self.id)` in `tracing` logs.
pub fn opt<T: Display>(val: &Option<T>) -> impl Value + '_ {
    tracing::field::display(DisplayOption(val))
}

/// Wrapper rendering a sink capacity, where `None` means unbounded.
pub struct Capacity(pub Option<UFix64>);

impl Display for Capacity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(capacity) => write!(f, "{}", capacity),
            None => write!(f, "unbounded"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display_option() {
        assert_eq!(DisplayOption(&Some(3)).to_string(), "3");
        assert_eq!(DisplayOption::<u8>(&None).to_string(), "-");
        assert_eq!(Capacity(None).to_string(), "unbounded");
        assert_eq!(Capacity(Some(UFix64::ONE)).to_string(), "1.00000000");
    }
}
