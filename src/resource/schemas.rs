//! Custom schema functions.
//!
//! `schemars` derives a reasonable default for most fields, but a few
//! integer fields need hand-written schemas to stay non-negative (or, for
//! the scale set id, strictly positive) at the CRD validation layer.
use schemars::{gen::SchemaGenerator, schema::Schema};
use serde_json::{from_value, json};

pub fn non_negative_i32(_: &mut SchemaGenerator) -> Schema {
    from_value(json!({
        "type": "integer",
        "format": "int32",
        "minimum": 0,
    }))
    .unwrap()
}

pub fn non_negative_i64(_: &mut SchemaGenerator) -> Schema {
    from_value(json!({
        "type": "integer",
        "format": "int64",
        "minimum": 0,
    }))
    .unwrap()
}

pub fn runner_scale_set_id(_: &mut SchemaGenerator) -> Schema {
    from_value(json!({
        "type": "integer",
        "format": "int32",
        "minimum": 1,
    }))
    .unwrap()
}
