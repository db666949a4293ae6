use crate::field_type::FieldType;

/// Defines a field in a line record.
///
/// The Field definition is used by [LineComparator](crate::compare::LineComparator) to extract
/// and compare keys.
///
/// # Examples
/// ```
/// // compare the second field of the record as a String, stripping blanks and ignoring case
/// use text_spill_sort::field::Field;
/// use text_spill_sort::field_type::FieldType;
/// let field = Field::new(2, FieldType::String)
///     .with_ignore_blanks(true)
///     .with_ignore_case(true);
/// ```
#[derive(Clone, Debug)]
pub struct Field {
    index: usize,
    field_type: FieldType,
    ignore_blanks: bool,
    ignore_case: bool,
}

impl Field {
    /// Create a new [Field]
    ///
    /// # Arguments
    /// * `index` - the index of the field, starting at 1. Index of 0 treats the complete line as a
    ///   field
    /// * `field_type` - the type of the field. See [FieldType] for supported types
    ///
    /// # Examples
    /// ```
    /// use text_spill_sort::field::Field;
    /// use text_spill_sort::field_type::FieldType;
    /// let field = Field::new(1, FieldType::Integer);
    /// ```
    pub fn new(index: usize, field_type: FieldType) -> Field {
        Field {
            index,
            field_type,
            ignore_blanks: false,
            ignore_case: false,
        }
    }

    /// Get the index for this field.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Get the [FieldType] for this field.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Get the ignore blanks setting for this field
    pub fn ignore_blanks(&self) -> bool {
        self.ignore_blanks
    }

    /// Get the ignore case setting for this field.
    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    /// Specify whether to ignore blanks for comparison. When true the field will be trimmed before
    /// comparison.
    pub fn with_ignore_blanks(mut self, ignore_blanks: bool) -> Field {
        self.ignore_blanks = ignore_blanks;
        self
    }

    /// Specify whether to ignore case for comparison.
    pub fn with_ignore_case(mut self, ignore_case: bool) -> Field {
        self.ignore_case = ignore_case;
        self
    }
}
