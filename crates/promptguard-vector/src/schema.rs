use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

use promptguard_core::types::IndexSchema;

/// Arrow layout of a similarity document row.
pub fn similarity_schema(schema: &IndexSchema) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("details", DataType::Utf8, false),
        Field::new(
            IndexSchema::VECTOR_FIELD,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), schema.dimension as i32),
            true,
        ),
    ]))
}
