//! This module contains classes and enums for column information.

use std::fmt;

use crate::expressions::Literal;

/// A shorthand type for storing a column name in (table_name, column_name) form. A `None` column
/// name represents a wildcard.
pub type ColumnName = (Option<String>, Option<String>);

/// Convert a column name to string form, with wildcards.
pub fn column_name_to_string(name: &ColumnName) -> String {
    match *name {
        (Some(ref table_name), Some(ref col_name)) => format!("{}.{}", table_name, col_name),
        (None, Some(ref col_name)) => col_name.clone(),
        (Some(ref table_name), None) => format!("{}.*", table_name),
        (None, None) => "*".to_string(),
    }
}

/// Returns true if the given string is usable as a column name in a stored table schema: the
/// first character must be a letter or underscore, and the remaining characters must be
/// alphanumeric or underscores.
pub fn is_valid_column_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// An empty Char column type. Useful for comparing type IDs.
pub const EMPTY_CHAR: ColumnType = ColumnType::Char { length: 0 };

/// An empty VarChar column type. Useful for comparing type IDs.
pub const EMPTY_VARCHAR: ColumnType = ColumnType::VarChar { length: 0 };

/// An empty Numeric column type. Useful for comparing type IDs.
pub const EMPTY_NUMERIC: ColumnType = ColumnType::Numeric {
    precision: 0,
    scale: 0,
};

/// The type of a single column in a relation. Two column types are equal iff their base type and
/// all type-specific modifiers (length, precision, scale) match.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// A placeholder type for `NULL` literals.
    Null,
    /// A 1-byte signed integer.
    TinyInt,
    /// A 2-byte signed integer.
    SmallInt,
    /// A 4-byte signed integer.
    Integer,
    /// An 8-byte signed integer.
    BigInt,
    /// A 4-byte signed floating-point number.
    Float,
    /// An 8-byte signed floating-point number.
    Double,
    /// A decimal value with a specified precision and scale.
    Numeric {
        /// The total number of digits stored.
        precision: u16,
        /// The number of digits stored to the right of the decimal point.
        scale: u16,
    },
    /// A fixed-length character-sequence, with a specified length.
    Char {
        /// The length of the string.
        length: u16,
    },
    /// A variable-length character-sequence, with a specified maximum length.
    VarChar {
        /// The maximum length of the string.
        length: u16,
    },
    /// A date value containing year, month, and day.
    Date,
    /// A time value containing hours, minutes, and seconds.
    Time,
    /// A date/time value with sub-second precision.
    Timestamp,
    /// A file-pointer value. This is not exposed in SQL, but is used internally.
    FilePointer,
}

impl From<ColumnType> for u8 {
    fn from(col_type: ColumnType) -> u8 {
        match col_type {
            ColumnType::Null => 0,
            ColumnType::Integer => 1,
            ColumnType::SmallInt => 2,
            ColumnType::BigInt => 3,
            ColumnType::TinyInt => 4,
            ColumnType::Float => 5,
            ColumnType::Double => 6,
            ColumnType::Numeric { .. } => 7,
            ColumnType::Char { .. } => 21,
            ColumnType::VarChar { .. } => 22,
            ColumnType::Date => 31,
            ColumnType::Time => 32,
            ColumnType::Timestamp => 34,
            ColumnType::FilePointer => 41,
        }
    }
}

impl ColumnType {
    /// Looks up a column type from its stored type ID. Returns `None` for IDs that do not name a
    /// supported SQL type; the caller reports these as storage-format errors.
    pub fn from_type_id(byte: u8) -> Option<ColumnType> {
        match byte {
            0 => Some(ColumnType::Null),
            1 => Some(ColumnType::Integer),
            2 => Some(ColumnType::SmallInt),
            3 => Some(ColumnType::BigInt),
            4 => Some(ColumnType::TinyInt),
            5 => Some(ColumnType::Float),
            6 => Some(ColumnType::Double),
            7 => Some(EMPTY_NUMERIC),
            21 => Some(EMPTY_CHAR),
            22 => Some(EMPTY_VARCHAR),
            31 => Some(ColumnType::Date),
            32 => Some(ColumnType::Time),
            34 => Some(ColumnType::Timestamp),
            41 => Some(ColumnType::FilePointer),
            _ => None,
        }
    }

    /// Returns true if the type's modifiers are in their legal ranges: CHAR/VARCHAR lengths in
    /// [1, 65535], and NUMERIC with `scale <= precision`.
    pub fn has_valid_modifiers(&self) -> bool {
        match *self {
            ColumnType::Char { length } | ColumnType::VarChar { length } => length >= 1,
            ColumnType::Numeric { precision, scale } => scale <= precision,
            _ => true,
        }
    }

    /// Determines whether a value of this type can store the literal given.
    pub fn can_store_literal(&self, value: &Literal) -> bool {
        match *value {
            Literal::Long(_) => matches!(*self, ColumnType::BigInt | ColumnType::Timestamp),
            Literal::Int(_) => matches!(
                *self,
                ColumnType::Integer
                    | ColumnType::TinyInt
                    | ColumnType::SmallInt
                    | ColumnType::BigInt
                    | ColumnType::Date
                    | ColumnType::Time
                    | ColumnType::Timestamp
            ),
            Literal::Double(_) => matches!(*self, ColumnType::Double | ColumnType::Numeric { .. }),
            Literal::Float(_) => matches!(
                *self,
                ColumnType::Float | ColumnType::Double | ColumnType::Numeric { .. }
            ),
            Literal::String(ref s) => match *self {
                ColumnType::Char { length } | ColumnType::VarChar { length } => {
                    s.len() as u32 <= length as u32
                }
                _ => false,
            },
            Literal::True | Literal::False => matches!(*self, ColumnType::TinyInt),
            Literal::Null => true,
            Literal::FilePointer { .. } => matches!(*self, ColumnType::FilePointer),
        }
    }

    /// Generates a default literal for the given type.
    pub fn default_literal(&self) -> Literal {
        match *self {
            ColumnType::TinyInt | ColumnType::SmallInt | ColumnType::Integer => Literal::Int(0),
            ColumnType::BigInt => Literal::Long(0),
            ColumnType::Float => Literal::Float(0.0),
            ColumnType::Double | ColumnType::Numeric { .. } => Literal::Double(0.0),
            ColumnType::Char { .. } | ColumnType::VarChar { .. } => Literal::String("".into()),
            ColumnType::Date | ColumnType::Time => Literal::Int(0),
            ColumnType::Timestamp => Literal::Long(0),
            _ => Literal::Null,
        }
    }

    /// Whether the column type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            *self,
            ColumnType::TinyInt
                | ColumnType::SmallInt
                | ColumnType::Integer
                | ColumnType::BigInt
                | ColumnType::Float
                | ColumnType::Double
                | ColumnType::Numeric { .. }
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ColumnType::Numeric { precision, scale } => {
                write!(f, "NUMERIC({}, {})", precision, scale)
            }
            ColumnType::Char { length } => write!(f, "CHAR({})", length),
            ColumnType::VarChar { length } => write!(f, "VARCHAR({})", length),
            _ => write!(f, "{}", format!("{:?}", self).to_uppercase()),
        }
    }
}

/// Basic information about a table column, including its name and SQL type. Constraints, even
/// `NOT NULL` constraints, appear at the table level, since some constraints can involve multiple
/// columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnInfo {
    /// The type information for the column.
    pub column_type: ColumnType,
    /// The name of the attribute. If the name is `None`, this is a wildcard.
    pub name: Option<String>,
    /// An optional table-name for the attribute, in cases where a join or Cartesian product
    /// generates a result with duplicate attribute-names.
    pub table_name: Option<String>,
}

impl ColumnInfo {
    /// Create a new column-info object with a name, but not associated with a table.
    pub fn with_name<S: Into<String>>(column_type: ColumnType, name: S) -> ColumnInfo {
        ColumnInfo {
            column_type,
            name: Some(name.into()),
            table_name: None,
        }
    }

    /// Create a new column-info object with a name that is associated with a table.
    pub fn with_table_name<S1: Into<String>, S2: Into<String>>(
        column_type: ColumnType,
        name: S1,
        table_name: S2,
    ) -> ColumnInfo {
        ColumnInfo {
            column_type,
            name: Some(name.into()),
            table_name: Some(table_name.into()),
        }
    }

    /// Returns the column name for a column-info object.
    pub fn get_column_name(&self) -> ColumnName {
        (self.table_name.clone(), self.name.clone())
    }
}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ColumnInfo[{}:{}]",
            column_name_to_string(&self.get_column_name()),
            self.column_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_display() {
        assert_eq!(format!("{}", ColumnType::Integer), "INTEGER");
        assert_eq!(format!("{}", ColumnType::Char { length: 12 }), "CHAR(12)");
        assert_eq!(
            format!("{}", ColumnType::VarChar { length: 13 }),
            "VARCHAR(13)"
        );
        assert_eq!(
            format!(
                "{}",
                ColumnType::Numeric {
                    precision: 16,
                    scale: 2,
                }
            ),
            "NUMERIC(16, 2)"
        );
    }

    #[test]
    fn test_type_id_round_trip() {
        let types = [
            ColumnType::TinyInt,
            ColumnType::SmallInt,
            ColumnType::Integer,
            ColumnType::BigInt,
            ColumnType::Float,
            ColumnType::Double,
            EMPTY_NUMERIC,
            EMPTY_CHAR,
            EMPTY_VARCHAR,
            ColumnType::Date,
            ColumnType::Time,
            ColumnType::Timestamp,
            ColumnType::FilePointer,
        ];
        for t in types.iter() {
            assert_eq!(ColumnType::from_type_id(u8::from(*t)), Some(*t));
        }
        assert_eq!(ColumnType::from_type_id(99), None);
        assert_eq!(ColumnType::from_type_id(200), None);
    }

    #[test]
    fn test_modifier_validation() {
        assert!(ColumnType::Char { length: 1 }.has_valid_modifiers());
        assert!(ColumnType::VarChar { length: 65535 }.has_valid_modifiers());
        assert!(!ColumnType::Char { length: 0 }.has_valid_modifiers());
        assert!(ColumnType::Numeric {
            precision: 10,
            scale: 2
        }
        .has_valid_modifiers());
        assert!(!ColumnType::Numeric {
            precision: 2,
            scale: 10
        }
        .has_valid_modifiers());
    }

    #[test]
    fn test_valid_column_names() {
        assert!(is_valid_column_name("a"));
        assert!(is_valid_column_name("_tmp"));
        assert!(is_valid_column_name("col_2"));
        assert!(!is_valid_column_name(""));
        assert!(!is_valid_column_name("2col"));
        assert!(!is_valid_column_name("has space"));
        assert!(!is_valid_column_name("has-dash"));
    }

    #[test]
    fn test_is_numeric() {
        assert!(ColumnType::Integer.is_numeric());
        assert!(ColumnType::BigInt.is_numeric());
        assert!(ColumnType::Float.is_numeric());
        assert!(ColumnType::Double.is_numeric());
        assert!(EMPTY_NUMERIC.is_numeric());
        assert!(!ColumnType::Date.is_numeric());
        assert!(!ColumnType::Char { length: 4 }.is_numeric());
        assert!(!ColumnType::FilePointer.is_numeric());
    }

    #[test]
    fn test_column_info_display() {
        assert_eq!(
            format!("{}", ColumnInfo::with_name(ColumnType::Integer, "foo")),
            "ColumnInfo[foo:INTEGER]"
        );
        assert_eq!(
            format!(
                "{}",
                ColumnInfo::with_table_name(ColumnType::Integer, "bar", "foo")
            ),
            "ColumnInfo[foo.bar:INTEGER]"
        );
    }
}
