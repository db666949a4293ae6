use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{Result, SortError};
use crate::field::Field;
use crate::field_type::FieldType;
use crate::key::Key;
use crate::order::Order;

/// A total order over records.
///
/// The comparator alone defines the sort order. It is shared read-only between the partition
/// sorting workers and the merge, so it must be deterministic: an inconsistent comparator does not
/// crash the sort but leaves the output order undefined.
pub type Comparator<R> = Arc<dyn Fn(&R, &R) -> Ordering + Send + Sync>;

/// Wrap a closure as a [Comparator].
pub fn comparator<R, F>(f: F) -> Comparator<R>
where
    F: Fn(&R, &R) -> Ordering + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The [Ord] order of the record type. Byte-wise lexicographic for text records.
pub fn natural_order<R: Ord + 'static>() -> Comparator<R> {
    Arc::new(|a: &R, b: &R| a.cmp(b))
}

/// Compares text lines by a list of typed fields.
///
/// # Examples
/// ```
/// use std::cmp::Ordering;
/// use text_spill_sort::compare::LineComparator;
/// use text_spill_sort::field::Field;
/// use text_spill_sort::field_type::FieldType;
/// use text_spill_sort::order::Order;
///
/// let by_id = LineComparator::new(vec![Field::new(2, FieldType::Integer)], ',', Order::Asc).unwrap();
/// assert_eq!(by_id.compare("b,10", "a,9"), Ordering::Greater);
/// ```
#[derive(Clone, Debug)]
pub struct LineComparator {
    fields: Vec<Field>,
    field_separator: char,
    order: Order,
}

impl LineComparator {
    /// An empty field list compares complete lines as strings.
    pub fn new(fields: Vec<Field>, field_separator: char, order: Order) -> Result<LineComparator> {
        let fields = if fields.is_empty() {
            vec![Field::new(0, FieldType::String)]
        } else {
            fields
        };

        if fields.len() > 1 && fields.iter().any(|field| field.index() == 0) {
            return Err(
                SortError::config(
                    "Field index of 0 must be specified only once, meaning the entire line is to be used as a key"
                )
            );
        }

        Ok(
            LineComparator {
                fields,
                field_separator,
                order,
            }
        )
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        for field in &self.fields {
            let ordering = self.key(a, field).cmp(&self.key(b, field));
            if ordering != Ordering::Equal {
                return self.order.apply(ordering);
            }
        }
        Ordering::Equal
    }

    // missing and unparsable fields yield None, which orders first
    fn key<'a>(&self, line: &'a str, field: &Field) -> Option<Key<'a>> {
        if field.index() == 0 {
            Key::new(line, field)
        } else {
            line.split(self.field_separator)
                .nth(field.index() - 1)
                .and_then(|part| Key::new(part, field))
        }
    }

    pub fn into_comparator(self) -> Comparator<String> {
        Arc::new(move |a: &String, b: &String| self.compare(a, b))
    }
}
