use std::fmt;

/// A tag read from a file that was either recognized as a known variant `T`,
/// or is an unrecognized raw value `Raw`.
///
/// Most of the formats handled here are only partially reverse-engineered, so
/// datatype and format tags regularly turn up values nobody has named yet. The
/// raw value is kept so callers can report it or skip over it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Recognized<T, Raw = u32> {
    Known(T),
    Unknown(Raw),
}

impl<T: Copy, Raw: Copy> Copy for Recognized<T, Raw> {}

impl<T, Raw> Recognized<T, Raw>
where
    T: TryFrom<Raw>,
    Raw: Copy,
{
    /// Classify a raw tag, keeping it as `Unknown` when `T` has no variant for it.
    pub fn from_raw(raw: Raw) -> Self {
        match T::try_from(raw) {
            Ok(t) => Recognized::Known(t),
            Err(_) => Recognized::Unknown(raw),
        }
    }
}

impl<T, Raw> Recognized<T, Raw> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Recognized::Known(t) => Some(t),
            Recognized::Unknown(_) => None,
        }
    }

    pub fn unknown(&self) -> Option<&Raw> {
        match self {
            Recognized::Known(_) => None,
            Recognized::Unknown(raw) => Some(raw),
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Recognized::Known(_))
    }
}

impl<T, Raw> From<T> for Recognized<T, Raw> {
    fn from(value: T) -> Self {
        Recognized::Known(value)
    }
}

impl<T: fmt::Display, Raw: fmt::UpperHex> fmt::Display for Recognized<T, Raw> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recognized::Known(t) => t.fmt(f),
            Recognized::Unknown(raw) => write!(f, "unknown(0x{raw:02X})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Tag {
        One,
    }

    impl TryFrom<u32> for Tag {
        type Error = u32;

        fn try_from(value: u32) -> Result<Self, Self::Error> {
            match value {
                1 => Ok(Tag::One),
                other => Err(other),
            }
        }
    }

    #[test]
    fn classifies_raw_values() {
        let known: Recognized<Tag> = Recognized::from_raw(1);
        assert_eq!(known.known(), Some(&Tag::One));
        assert!(known.is_known());

        let unknown: Recognized<Tag> = Recognized::from_raw(0x42);
        assert_eq!(unknown.unknown(), Some(&0x42));
        assert!(!unknown.is_known());
    }
}
