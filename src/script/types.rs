//! Value types of the NWScript virtual machine.

use strum::{Display, EnumCount, EnumIter, EnumString};

/// Type of a script variable, routine argument or routine return value.
///
/// Every type except [`VariableType::Vector`] occupies exactly one 4-byte stack frame.
/// Vectors occupy three consecutive `Float` frames (`x`, `y`, `z`), and
/// [`VariableType::Action`] never lives on the stack at all: it denotes a deferred block of
/// code captured by `STORE_STATE`.
///
/// The `Display`/`FromStr` forms are the lowercase NWScript keywords (`int`, `float`, ...).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, EnumIter, EnumCount,
)]
#[strum(serialize_all = "lowercase")]
pub enum VariableType {
    /// No value.
    #[default]
    Void,
    /// 32-bit signed integer.
    Int,
    /// 32-bit float.
    Float,
    /// String.
    String,
    /// Game object handle.
    Object,
    /// Engine effect.
    Effect,
    /// Engine event.
    Event,
    /// Engine location.
    Location,
    /// Engine talent.
    Talent,
    /// Three floats.
    Vector,
    /// Deferred command block.
    Action,
}

impl VariableType {
    /// Number of 4-byte stack frames a value of this type occupies.
    #[must_use]
    pub const fn frame_count(self) -> usize {
        match self {
            VariableType::Void | VariableType::Action => 0,
            VariableType::Vector => 3,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn keywords_round_trip() {
        for ty in VariableType::iter() {
            assert_eq!(VariableType::from_str(&ty.to_string()).ok(), Some(ty));
        }
        assert_eq!(VariableType::Location.to_string(), "location");
        assert!(VariableType::from_str("matrix").is_err());
    }

    #[test]
    fn frame_counts() {
        assert_eq!(VariableType::Vector.frame_count(), 3);
        assert_eq!(VariableType::Action.frame_count(), 0);
        assert_eq!(VariableType::Effect.frame_count(), 1);
    }
}
