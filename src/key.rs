use std::cmp::Ordering;
use std::str::FromStr;

use crate::field::Field;
use crate::field_type::FieldType;

/// A comparable value extracted from one field of a line.
#[derive(Debug)]
pub(crate) enum Key<'a> {
    Str {
        s: &'a str
    },
    Owned {
        s: String
    },
    Integer {
        i: i64
    },
    Number {
        n: f64
    },
}

impl<'a> Key<'a> {
    /// Parse `field` according to `field_def`. None when a numeric field does not parse.
    pub(crate) fn new(field: &'a str, field_def: &Field) -> Option<Key<'a>> {
        match field_def.field_type() {
            FieldType::String => {
                let mut key = field;
                if field_def.ignore_blanks() {
                    key = key.trim();
                }

                if field_def.ignore_case() {
                    Some(
                        Key::Owned {
                            s: key.to_uppercase()
                        }
                    )
                } else {
                    Some(
                        Key::Str {
                            s: key
                        }
                    )
                }
            }
            FieldType::Integer => {
                i64::from_str(field.trim()).ok().map(|i| Key::Integer { i })
            }
            FieldType::Number => {
                f64::from_str(field.trim()).ok().map(|n| Key::Number { n })
            }
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str { s } => Some(*s),
            Key::Owned { s } => Some(s.as_str()),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Str { .. } | Key::Owned { .. } => 0,
            Key::Integer { .. } => 1,
            Key::Number { .. } => 2,
        }
    }
}

impl Eq for Key<'_> {}

impl PartialEq<Self> for Key<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd<Self> for Key<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Integer { i }, Key::Integer { i: other }) => i.cmp(other),
            (Key::Number { n }, Key::Number { n: other }) => {
                match (n.is_nan(), other.is_nan()) {
                    (true, true) => Ordering::Equal,
                    (false, true) => Ordering::Greater,
                    (true, false) => Ordering::Less,
                    (false, false) => n.partial_cmp(other).unwrap_or(Ordering::Equal),
                }
            }
            _ => match (self.as_str(), other.as_str()) {
                (Some(s), Some(other)) => s.cmp(other),
                // keys built from the same field definition always share a variant
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use crate::field::Field;
    use crate::field_type::FieldType;
    use crate::key::Key;

    #[test]
    fn test_integer_keys() {
        let field = Field::new(1, FieldType::Integer);
        let a = Key::new(" 9", &field).unwrap();
        let b = Key::new("10 ", &field).unwrap();
        assert_eq!(a.cmp(&b), Ordering::Less);
        assert!(Key::new("ten", &field).is_none());
    }

    #[test]
    fn test_nan_orders_first() {
        let field = Field::new(1, FieldType::Number);
        let nan = Key::new("NaN", &field).unwrap();
        let small = Key::new("-1e300", &field).unwrap();
        assert_eq!(nan.cmp(&small), Ordering::Less);
        assert_eq!(nan.cmp(&Key::new("nan", &field).unwrap()), Ordering::Equal);
    }

    #[test]
    fn test_string_flags() {
        let field = Field::new(1, FieldType::String)
            .with_ignore_blanks(true)
            .with_ignore_case(true);
        let a = Key::new("  Apple ", &field).unwrap();
        let b = Key::new("aPPLE", &field).unwrap();
        assert_eq!(a, b);
    }
}
