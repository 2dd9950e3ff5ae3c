#![allow(clippy::unwrap_used, clippy::expect_used)]

use bson::{Bson, doc};
use serde_json::json;

use docsift::{FieldOp, Filter, SanitizeOptions, SecurityPolicy, Value, sanitize};
use docsift_mongo::{
    CastConfig, CompileError, CompileOptions, FieldType, compile, compile_with, merge_permanent,
};

const OID_HEX: &str = "507f1f77bcf86cd799439011";

fn pipeline(raw: serde_json::Value) -> bson::Document {
    let out = sanitize(&raw, &SecurityPolicy::default(), &SanitizeOptions::default());
    compile(&out.filter).expect("compiles")
}

#[test]
fn between_out_of_order_is_a_compile_error() {
    let filter = Filter::new(vec![Filter::field_ops(
        "age",
        vec![(
            FieldOp::Between,
            Value::Array(vec![65i64.into(), 18i64.into()]),
        )],
    )]);
    assert_eq!(compile(&filter), Err(CompileError::BetweenOrder));
}

#[test]
fn between_in_order_compiles_to_inclusive_range() {
    let compiled = pipeline(json!({"age": {"between": [18, 65]}}));
    assert_eq!(
        compiled,
        doc! { "age": { "$gte": 18_i64, "$lte": 65_i64 } }
    );
}

#[test]
fn between_on_primary_key_always_raises() {
    for bounds in [json!([1, 2]), json!([2, 1])] {
        let out = sanitize(
            &json!({"_id": {"between": bounds}}),
            &SecurityPolicy::default(),
            &SanitizeOptions::default(),
        );
        assert_eq!(compile(&out.filter), Err(CompileError::BetweenOnId));
    }
}

#[test]
fn between_with_mixed_bound_types_is_rejected() {
    let filter = Filter::new(vec![Filter::field_ops(
        "age",
        vec![(
            FieldOp::Between,
            Value::Array(vec![18i64.into(), "65".into()]),
        )],
    )]);
    assert_eq!(compile(&filter), Err(CompileError::BetweenBounds));
}

#[test]
fn like_escapes_regex_metacharacters() {
    let compiled = pipeline(json!({"name": {"like": "a.b"}}));
    assert_eq!(
        compiled,
        doc! { "name": { "$regex": "a\\.b", "$options": "i" } }
    );

    // The escaped pattern matches the literal "a.b" but not "aXb".
    let pattern = regex::Regex::new("a\\.b").unwrap();
    assert!(pattern.is_match("xxa.bxx"));
    assert!(!pattern.is_match("aXb"));
}

#[test]
fn not_like_wraps_the_same_regex_in_not() {
    let compiled = pipeline(json!({"name": {"not like": "a.b"}}));
    let cond = compiled.get_document("name").unwrap();
    let Some(Bson::RegularExpression(re)) = cond.get("$not") else {
        panic!("expected $not regex, got {cond:?}");
    };
    assert_eq!(re.pattern.as_str(), "a\\.b");
    assert_eq!(re.options.as_str(), "i");
}

#[test]
fn id_suffix_convention_casts_valid_object_ids() {
    let compiled = pipeline(json!({"external_id": OID_HEX}));
    let cond = compiled.get_document("external_id").unwrap();
    assert!(matches!(cond.get("$eq"), Some(Bson::ObjectId(_))));
}

#[test]
fn escape_marker_suppresses_cast() {
    let compiled = pipeline(json!({"external_id*": OID_HEX}));
    assert_eq!(
        compiled,
        doc! { "external_id": { "$eq": OID_HEX } }
    );
}

#[test]
fn no_cast_set_suppresses_cast() {
    let out = sanitize(
        &json!({"external_id": OID_HEX}),
        &SecurityPolicy::default(),
        &SanitizeOptions::default(),
    );
    let opts = CompileOptions::new().with_cast(CastConfig::new().without_cast("external_id"));
    let compiled = compile_with(&out.filter, &opts).unwrap();
    assert_eq!(
        compiled,
        doc! { "external_id": { "$eq": OID_HEX } }
    );
}

#[test]
fn explicit_schema_overrides_the_naming_convention() {
    let out = sanitize(
        &json!({"external_id": OID_HEX, "owner": OID_HEX}),
        &SecurityPolicy::default(),
        &SanitizeOptions::default(),
    );
    let opts = CompileOptions::new().with_schema([
        ("external_id", FieldType::String),
        ("owner", FieldType::ObjectId),
    ]);
    let compiled = compile_with(&out.filter, &opts).unwrap();

    assert_eq!(
        compiled.get_document("external_id").unwrap().get("$eq"),
        Some(&Bson::String(OID_HEX.to_owned()))
    );
    assert!(matches!(
        compiled.get_document("owner").unwrap().get("$eq"),
        Some(Bson::ObjectId(_))
    ));
}

#[test]
fn non_identifier_shaped_value_passes_through_uncast() {
    let compiled = pipeline(json!({"external_id": "not-an-objectid"}));
    assert_eq!(
        compiled,
        doc! { "external_id": { "$eq": "not-an-objectid" } }
    );
}

#[test]
fn membership_on_id_field_casts_each_element() {
    let compiled = pipeline(json!({"owner_id": {"in": [OID_HEX, "plain"]}}));
    let cond = compiled.get_document("owner_id").unwrap();
    let Some(Bson::Array(items)) = cond.get("$in") else {
        panic!("expected $in array");
    };
    assert!(matches!(items[0], Bson::ObjectId(_)));
    assert_eq!(items[1], Bson::String("plain".to_owned()));
}

#[test]
fn operators_on_one_field_merge_rather_than_overwrite() {
    let compiled = pipeline(json!({"price": {">=": 10, "<": 100}}));
    assert_eq!(
        compiled,
        doc! { "price": { "$lt": 100_i64, "$gte": 10_i64 } }
    );
}

#[test]
fn repeated_field_clauses_merge_into_one_condition() {
    // Two clauses naming the same field, as a client would produce with two
    // separate operator maps.
    let filter = Filter::new(vec![
        Filter::field_ops("price", vec![(FieldOp::Gte, 10i64.into())]),
        Filter::field_ops("price", vec![(FieldOp::Lt, 100i64.into())]),
    ]);
    let compiled = compile(&filter).unwrap();
    assert_eq!(
        compiled,
        doc! { "price": { "$gte": 10_i64, "$lt": 100_i64 } }
    );
}

#[test]
fn date_operators_parse_operands_and_reject_garbage() {
    let compiled = pipeline(json!({"createdAt": {">date": "2024-01-02T03:04:05Z"}}));
    let cond = compiled.get_document("createdAt").unwrap();
    assert!(matches!(cond.get("$gt"), Some(Bson::DateTime(_))));

    let out = sanitize(
        &json!({"createdAt": {"<date": "not a date"}}),
        &SecurityPolicy::default(),
        &SanitizeOptions::default(),
    );
    assert!(matches!(
        compile(&out.filter),
        Err(CompileError::InvalidDate(_))
    ));
}

#[test]
fn logical_groups_compile_to_native_composites() {
    let compiled = pipeline(json!({
        "and": [
            {"status": "active"},
            {"or": [{"a": 1}, {"b": 2}]}
        ]
    }));
    assert_eq!(
        compiled,
        doc! { "$and": [
            { "status": { "$eq": "active" } },
            { "$or": [ { "a": { "$eq": 1_i64 } }, { "b": { "$eq": 2_i64 } } ] }
        ] }
    );
}

#[test]
fn end_to_end_where_probe_is_stripped_and_rest_compiles() {
    let raw = json!({"$where": "this.x", "status": "active", "age": {"gte": 18}});
    let out = sanitize(&raw, &SecurityPolicy::default(), &SanitizeOptions::default());

    assert_eq!(out.violations, vec!["$ operators not allowed: $where"]);
    let compiled = compile(&out.filter).unwrap();
    assert_eq!(
        compiled,
        doc! {
            "age": { "$gte": 18_i64 },
            "status": { "$eq": "active" }
        }
    );

    let merged = merge_permanent(compiled.clone(), doc! { "isDeleted": false });
    assert_eq!(
        merged,
        doc! { "$and": [ compiled, { "isDeleted": false } ] }
    );
}
