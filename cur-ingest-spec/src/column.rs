/*!
The closed set of column types a normalized [`Manifest`](crate::manifest::Manifest)
can report, and the per-(name, type) pair that makes up its schema.
*/

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A column type drawn from the closed set vendor types are mapped into.
///
/// Unknown source types fall back to [`ColumnType::String`] rather than
/// growing this enum at parse time.
pub enum ColumnType {
    /// Plain text
    String,
    /// A timestamp without sub-second precision
    DateTime,
    /// A timestamp with `precision` digits of sub-second precision (AWS CUR v2)
    DateTime64(u8),
    /// Fixed point decimal with (precision, scale)
    Decimal(u8, u8),
    /// 64-bit floating point
    Float64,
    /// A string-keyed map of values of a single type
    Map(Box<ColumnType>),
    /// A fixed set of named fields (AWS CUR v2 `struct` columns)
    Tuple(Vec<(String, ColumnType)>),
    /// Wraps another type to mark it as nullable
    Nullable(Box<ColumnType>),
}

impl ColumnType {
    /// Shorthand for a nullable string column
    pub fn nullable_string() -> Self {
        ColumnType::Nullable(Box::new(ColumnType::String))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A single column in a normalized manifest's schema
pub struct Column {
    /// Column name, already normalized (vendor separators replaced)
    pub name: String,
    /// The column's type
    pub r#type: ColumnType,
}

impl Column {
    /// Construct a new column
    pub fn new(name: impl Into<String>, r#type: ColumnType) -> Self {
        Column {
            name: name.into(),
            r#type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullable_string_wraps_string() {
        assert_eq!(ColumnType::nullable_string(), ColumnType::Nullable(Box::new(ColumnType::String)));
    }

    #[test]
    fn column_new_carries_name_and_type() {
        let column = Column::new("lineItem_UnblendedCost", ColumnType::Decimal(20, 8));
        assert_eq!(column.name, "lineItem_UnblendedCost");
        assert_eq!(column.r#type, ColumnType::Decimal(20, 8));
    }

    #[test]
    fn map_and_tuple_types_compare_structurally() {
        let map = ColumnType::Map(Box::new(ColumnType::nullable_string()));
        let same = ColumnType::Map(Box::new(ColumnType::nullable_string()));
        assert_eq!(map, same);

        let tuple = ColumnType::Tuple(vec![("a".to_string(), ColumnType::String)]);
        let different = ColumnType::Tuple(vec![("b".to_string(), ColumnType::String)]);
        assert_ne!(tuple, different);
    }
}
