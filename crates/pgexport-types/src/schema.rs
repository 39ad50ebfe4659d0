use serde::{Deserialize, Serialize};

/// The source side's logical type, analogous to an Arrow `DataType` but
/// restricted to exactly what §4.2 of the spec knows how to map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalType {
    String,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
    TimestampTz,
    TimestampNaive,
    ListString,
    Json,
}

impl LogicalType {
    pub fn is_signed_int(self) -> bool {
        matches!(
            self,
            LogicalType::Int8 | LogicalType::Int16 | LogicalType::Int32 | LogicalType::Int64
        )
    }

    pub fn is_unsigned_int(self) -> bool {
        matches!(
            self,
            LogicalType::UInt8 | LogicalType::UInt16 | LogicalType::UInt32 | LogicalType::UInt64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, LogicalType::Float32 | LogicalType::Float64)
    }
}

/// One column in a record batch's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub nullable: bool,
    pub logical_type: LogicalType,
}

impl Field {
    pub fn new(name: impl Into<String>, logical_type: LogicalType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            nullable,
            logical_type,
        }
    }
}

/// The schema shared by every record batch within one export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// §4.9 step 6: force every field nullable and drop the internal
    /// ordering column before it reaches DDL/COPY.
    pub fn normalized_for_destination(&self, ordering_column: &str) -> Schema {
        Schema {
            fields: self
                .fields
                .iter()
                .filter(|f| f.name != ordering_column)
                .map(|f| Field {
                    name: f.name.clone(),
                    nullable: true,
                    logical_type: f.logical_type,
                })
                .collect(),
        }
    }
}
