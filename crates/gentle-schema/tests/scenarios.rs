//! # End-to-End Validation Scenarios
//!
//! Each test builds a schema through the public API and drives it through
//! the public entry points only.

use gentle_schema::{
    CallOptions, EnumMember, ErrorCode, Predicate, RawDef, RawEntry, Schema, SchemaDef, SchemaError,
    SchemaOptions, Validated, ValidationResult, Validator, Value,
};
use serde_json::json;

fn compile(def: serde_json::Value) -> Schema {
    Schema::from_json(def, SchemaOptions::default()).expect("schema should compile")
}

fn run(schema: &Schema, input: serde_json::Value) -> ValidationResult {
    schema
        .validate(&Value::from(input))
        .expect("validation call should succeed")
        .into_report()
        .expect("report expected without valueOnly")
}

fn codes(result: &ValidationResult) -> Vec<ErrorCode> {
    result.errors.iter().map(|e| e.code).collect()
}

// ---- basic rules ----

#[test]
fn min_violation_excludes_field_from_value() {
    let schema = compile(json!({"age": {"type": "number", "min": 0}}));
    let result = run(&schema, json!({"age": -1}));
    assert!(!result.valid);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].path, "age");
    assert_eq!(result.errors[0].code, ErrorCode::Min);
    assert_eq!(result.value, Value::from(json!({})));
}

#[test]
fn field_level_coercion() {
    let schema = compile(json!({"qty": {"type": "number", "coerce": true}}));
    let result = run(&schema, json!({"qty": "10"}));
    assert!(result.valid, "{:?}", result.errors);
    assert_eq!(result.value, Value::from(json!({"qty": 10})));

    let result = run(&schema, json!({"qty": "ten"}));
    assert_eq!(codes(&result), vec![ErrorCode::Coerce]);
}

#[test]
fn instance_wide_coercion_yields_to_field_flag() {
    let schema = Schema::from_json(
        json!({"a": "boolean", "b": {"type": "number", "coerce": false}}),
        SchemaOptions {
            coerce_types: true,
            ..Default::default()
        },
    )
    .unwrap();
    let result = run(&schema, json!({"a": "true", "b": "2"}));
    assert_eq!(codes(&result), vec![ErrorCode::Type]);
    assert_eq!(result.value, Value::from(json!({"a": true})));
}

#[test]
fn required_and_default_boundaries() {
    let def = SchemaDef::new()
        .field("id", RawEntry::new().type_name("string").required(true))
        .field(
            "role",
            RawEntry::new()
                .type_name("string")
                .default_with(|| Value::from("member")),
        );
    let schema = Schema::new(def, SchemaOptions::default()).unwrap();

    let result = run(&schema, json!({}));
    assert!(!result.valid);
    assert_eq!(codes(&result), vec![ErrorCode::Required]);
    assert_eq!(result.errors[0].message, "Invalid id field. is required");

    let result = run(&schema, json!({"id": "u1"}));
    assert!(result.valid);
    assert_eq!(result.value, Value::from(json!({"id": "u1", "role": "member"})));
}

#[test]
fn enum_literals_and_predicates() {
    let even = Predicate::named("even", |v| v.as_f64().is_some_and(|n| n % 2.0 == 0.0));
    let def = SchemaDef::new().field(
        "n",
        RawEntry::new().type_name("number").one_of([
            EnumMember::from(1),
            EnumMember::from(3),
            EnumMember::from(even),
        ]),
    );
    let schema = Schema::new(def, SchemaOptions::default()).unwrap();
    assert!(run(&schema, json!({"n": 3})).valid);
    assert!(run(&schema, json!({"n": 8})).valid);

    let result = run(&schema, json!({"n": 5}));
    assert_eq!(codes(&result), vec![ErrorCode::Enum]);
    assert!(result.errors[0].message.contains("<fn:even>"), "{}", result.errors[0].message);

    let strict = schema
        .validate_with(&Value::from(json!({"n": 8})), &CallOptions::new().strict_enum(true))
        .unwrap();
    assert!(!strict.report().unwrap().valid);
}

#[test]
fn fixed_error_message_keeps_code_and_detail() {
    let schema = compile(json!({
        "email": {"type": "string", "regex": "^[^@\\s]+@[^@\\s]+$", "errorMessage": "Bad email"}
    }));
    let result = run(&schema, json!({"email": "nope"}));
    let entry = &result.errors[0];
    assert_eq!(entry.code, ErrorCode::Regex);
    assert_eq!(entry.message, "Invalid email field. Bad email");
    assert!(entry
        .detail
        .as_deref()
        .is_some_and(|d| d.starts_with("String should follow regex pattern")));
}

#[test]
fn custom_validator_shapes() {
    let def = SchemaDef::new()
        .field("plain", Validator::new(|v, _| v.as_str() == Some("ok")))
        .field(
            "listed",
            RawEntry::new()
                .type_name("string")
                .validator(Validator::new(|_, _| vec!["too short", "too dull"])),
        )
        .field(
            "scoped",
            Validator::new(|v, ctx| {
                let tenant = ctx.extra.get("tenant").and_then(Value::as_str);
                if tenant == v.as_str() {
                    None
                } else {
                    Some(format!("must equal tenant at {}", ctx.path))
                }
            }),
        )
        .field(
            "panicky",
            Validator::new(|_, _| -> bool { panic!("validator blew up") }),
        );
    let schema = Schema::new(def, SchemaOptions::default()).unwrap();
    let call = CallOptions::new().extra("tenant", "acme");
    let result = schema
        .validate_with(
            &Value::from(json!({"plain": "no", "listed": "x", "scoped": "acme", "panicky": 1})),
            &call,
        )
        .unwrap()
        .into_report()
        .unwrap();

    let by_path = |p: &str| result.errors.iter().filter(|e| e.path == p).count();
    assert_eq!(by_path("plain"), 1);
    assert_eq!(by_path("listed"), 2);
    assert_eq!(by_path("scoped"), 0);
    assert_eq!(by_path("panicky"), 1);
    assert!(result.errors.iter().all(|e| e.code == ErrorCode::Custom));
    let panicked = result.errors.iter().find(|e| e.path == "panicky").unwrap();
    assert!(panicked
        .raw_error
        .as_deref()
        .is_some_and(|raw| raw.contains("validator blew up")));
}

// ---- structure ----

#[test]
fn nested_paths_and_exclusion() {
    let schema = compile(json!({
        "user": {
            "type": "object",
            "properties": {
                "name": {"type": "string", "required": true},
                "tags": {"type": "array", "items": {"type": "string", "max": 3}}
            }
        }
    }));
    let result = run(&schema, json!({"user": {"tags": ["ok", "toolong"]}}));
    let paths: Vec<&str> = result.errors.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["user.name", "user.tags[1]"]);
    assert_eq!(codes(&result), vec![ErrorCode::Required, ErrorCode::Max]);
    assert_eq!(result.value, Value::from(json!({})));
}

#[test]
fn unknown_key_policy() {
    let schema = compile(json!({"a": "string"}));
    let input = Value::from(json!({"a": "x", "b": 1}));

    let strict = schema
        .validate_with(&input, &CallOptions::new().strict(true))
        .unwrap()
        .into_report()
        .unwrap();
    assert_eq!(codes(&strict), vec![ErrorCode::Unknown]);
    assert_eq!(strict.errors[0].path, "b");

    let removed = schema
        .validate_with(&input, &CallOptions::new().strict(true).remove_unknown(true))
        .unwrap()
        .into_report()
        .unwrap();
    assert!(removed.valid);
    assert_eq!(removed.value, Value::from(json!({"a": "x"})));

    let lenient = run(&schema, json!({"a": "x", "b": 1}));
    assert!(lenient.valid);
    assert_eq!(lenient.value, input);
}

#[test]
fn nested_unknown_keys_follow_the_same_policy() {
    let schema = compile(json!({"o": {"type": "object", "properties": {"k": "number"}}}));
    let input = Value::from(json!({"o": {"k": 1, "extra": true}}));
    let strict = schema
        .validate_with(&input, &CallOptions::new().strict(true))
        .unwrap()
        .into_report()
        .unwrap();
    assert_eq!(strict.errors[0].path, "o.extra");
    assert_eq!(strict.errors[0].code, ErrorCode::Unknown);
    assert!(run(&schema, json!({"o": {"k": 1, "extra": true}})).valid);
}

#[test]
fn fail_fast_counts() {
    let schema = compile(json!({"a": "string", "b": "number"}));
    let input = Value::from(json!({"a": 1, "b": "x"}));

    let all = schema.validate(&input).unwrap().into_report().unwrap();
    assert_eq!(all.errors.len(), 2);

    let first = schema
        .validate_with(&input, &CallOptions::new().fail_fast(true))
        .unwrap()
        .into_report()
        .unwrap();
    assert_eq!(first.errors.len(), 1);
    assert!(!first.valid);
}

#[test]
fn loaded_schemas_keep_document_order() {
    let from_json = compile(json!({
        "zeta": {"type": "number"},
        "alpha": {"type": "number"},
        "box": {"type": "object", "properties": {"y": "number", "x": "number"}}
    }));
    let from_yaml =
        Schema::from_yaml_str("zeta: number\nalpha: number\n", SchemaOptions::default()).unwrap();
    let from_text = Schema::new(
        SchemaDef::from_json_str(r#"{"zeta": "number", "alpha": "number"}"#).unwrap(),
        SchemaOptions::default(),
    )
    .unwrap();
    assert_eq!(from_json.field_names().collect::<Vec<_>>(), vec!["zeta", "alpha", "box"]);
    assert_eq!(from_yaml.field_names().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
    assert_eq!(from_text.field_names().collect::<Vec<_>>(), vec!["zeta", "alpha"]);

    let input = Value::from(json!({"alpha": "y", "zeta": "x", "box": {"x": "b", "y": "a"}}));
    let first = from_json
        .validate_with(&input, &CallOptions::new().fail_fast(true))
        .unwrap()
        .into_report()
        .unwrap();
    assert_eq!(first.errors[0].path, "zeta");

    let all = run(&from_json, json!({"alpha": "y", "zeta": "x", "box": {"x": "b", "y": "a"}}));
    let paths: Vec<&str> = all.errors.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["zeta", "alpha", "box.y", "box.x"]);

    let ok = run(&from_json, json!({"box": {"x": 1, "y": 2}, "alpha": 2, "zeta": 1}));
    assert!(ok.valid);
    assert_eq!(
        serde_json::to_string(&ok.value).unwrap(),
        r#"{"zeta":1,"alpha":2,"box":{"y":2,"x":1}}"#
    );
}

#[test]
fn throw_on_parent_raises_for_child_errors() {
    let def = SchemaDef::new().field(
        "cfg",
        RawEntry::new()
            .type_name("object")
            .throw(true)
            .property("port", RawEntry::new().type_name("number").max(65535.0))
            .property("host", "string"),
    );
    let schema = Schema::new(def, SchemaOptions::default()).unwrap();
    let err = schema
        .validate(&Value::from(json!({"cfg": {"port": 70000, "host": "h"}})))
        .unwrap_err();
    let raised = err.as_validation().expect("raised validation failure");
    assert_eq!(raised.codes(), vec![ErrorCode::Max]);
    assert_eq!(raised.errors[0].path, "cfg.port");
}

// ---- references ----

#[test]
fn ref_round_trip() {
    let mut schema = compile(json!({"p": {"$ref": "point"}}));
    let def = RawDef::from(json!({"type": "object", "properties": {"x": "number"}}));
    schema.add_ref("point", def.clone()).unwrap();

    let direct = gentle_schema::normalize(&def, 1000).unwrap();
    assert_eq!(schema.resolve_ref("point"), Some(direct));

    assert!(run(&schema, json!({"p": {"x": 1}})).valid);
    assert!(schema.remove_ref("point"));
    assert_eq!(schema.resolve_ref("point"), None);
    let result = run(&schema, json!({"p": {"x": 1}}));
    assert_eq!(codes(&result), vec![ErrorCode::RefUnresolved]);
    assert_eq!(result.errors[0].message, "Invalid p field. unresolved ref 'point'");
}

#[test]
fn recursive_tree_through_path_ref() {
    let schema = compile(json!({
        "node": {
            "type": "object",
            "properties": {
                "value": {"type": "number", "required": true},
                "children": {"type": "array", "items": {"$ref": "node"}}
            }
        }
    }));
    let ok = run(
        &schema,
        json!({"node": {"value": 1, "children": [{"value": 2, "children": [{"value": 3}]}]}}),
    );
    assert!(ok.valid, "{:?}", ok.errors);

    let bad = run(
        &schema,
        json!({"node": {"value": 1, "children": [{"value": 2}, {"value": "x"}]}}),
    );
    assert_eq!(codes(&bad), vec![ErrorCode::Type]);
    assert_eq!(bad.errors[0].path, "node.children[1].value");
}

#[test]
fn local_defs_and_chains() {
    let mut schema = compile(json!({
        "$defs": {"id": {"type": "string", "min": 2}},
        "owner": {"$ref": "id"},
        "alias": {"$ref": "via"}
    }));
    schema.add_ref("via", RawDef::reference("id")).unwrap();
    let result = run(&schema, json!({"owner": "x", "alias": "y"}));
    assert_eq!(codes(&result), vec![ErrorCode::Min, ErrorCode::Min]);

    schema.override_ref("via", RawDef::reference("via")).unwrap();
    let result = run(&schema, json!({"alias": "yy"}));
    assert_eq!(codes(&result), vec![ErrorCode::RefUnresolved]);
    assert!(result.errors[0].message.contains("circular ref 'via'"));
}

#[test]
fn broken_ref_degrades_to_field_error() {
    let options = SchemaOptions::default()
        .with_ref("bad", RawEntry::new().type_name("string").regex("("));
    let schema = Schema::from_json(json!({"a": {"$ref": "bad"}, "b": "number"}), options).unwrap();
    let result = run(&schema, json!({"a": "x", "b": 1}));
    assert_eq!(codes(&result), vec![ErrorCode::RefNormalize]);
    assert!(result.errors[0].raw_error.is_some());
    assert_eq!(result.value, Value::from(json!({"b": 1})));
}

#[test]
fn duplicate_refs_are_rejected_together() {
    let mut schema = compile(json!({}));
    schema
        .add_refs([("a", RawDef::from("string")), ("b", RawDef::from("number"))])
        .unwrap();
    let err = schema
        .add_refs([("b", RawDef::from("string")), ("a", RawDef::from("string"))])
        .unwrap_err();
    assert_eq!(err, SchemaError::DuplicateRefs(vec!["b".into(), "a".into()]));
}

// ---- conditionals ----

#[test]
fn conditional_ref_fragment() {
    let options = SchemaOptions::default().with_ref(
        "small",
        RawDef::from(json!({
            "type": "object",
            "properties": {"a": {"type": "string", "required": true}}
        })),
    );
    let mut schema =
        Schema::from_json(json!({"kind": "string", "payload": "object"}), options).unwrap();
    schema
        .when("kind")
        .is("small")
        .then(SchemaDef::new().field("payload", RawDef::reference("small")))
        .unwrap();

    let result = run(&schema, json!({"kind": "small", "payload": {}}));
    assert!(!result.valid);
    assert_eq!(codes(&result), vec![ErrorCode::Required]);
    assert_eq!(result.errors[0].path, "payload.a");

    assert!(run(&schema, json!({"kind": "large", "payload": {}})).valid);
}

#[test]
fn later_rules_merge_over_earlier_ones() {
    let mut schema = compile(json!({"tier": "string", "limit": {"type": "number", "min": 0}}));
    schema
        .when("tier")
        .is("pro")
        .then(SchemaDef::new().field("limit", RawEntry::new().max(100.0)))
        .unwrap();
    schema
        .when(Predicate::new(|v| v.get("tier").is_some()))
        .then(SchemaDef::new().field("limit", RawEntry::new().required(true)))
        .unwrap();

    let result = run(&schema, json!({"tier": "pro", "limit": 500}));
    assert_eq!(codes(&result), vec![ErrorCode::Max]);
    let result = run(&schema, json!({"tier": "pro"}));
    assert_eq!(codes(&result), vec![ErrorCode::Required]);
    let result = run(&schema, json!({"tier": "free", "limit": -1}));
    assert_eq!(codes(&result), vec![ErrorCode::Min]);
}

#[test]
fn conditional_fragments_reject_defs() {
    let mut schema = compile(json!({"a": "string"}));
    let err = schema
        .when("a")
        .is("x")
        .then(SchemaDef::new().define("d", "string").field("a", "number"))
        .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidArgument(_)));
}

#[test]
fn conditional_fragments_are_linted_like_the_schema() {
    let mut schema = compile(json!({"kind": "string", "n": "number"}));
    let err = schema
        .when("kind")
        .is("int")
        .then(SchemaDef::new().field("n", "integer"))
        .unwrap_err();
    let SchemaError::Definition(issues) = err else {
        panic!("expected a definition error, got {err:?}");
    };
    assert_eq!(issues.0[0].code, ErrorCode::SchemaType);
    assert_eq!(issues.0[0].path, "n");

    // The rejected rule is not registered.
    let result = run(&schema, json!({"kind": "int", "n": 2}));
    assert!(result.valid, "{:?}", result.errors);

    // Partial fragments carry no type and pass.
    schema
        .when("kind")
        .is("int")
        .then(SchemaDef::new().field("n", RawEntry::new().required(true)))
        .unwrap();
    assert_eq!(codes(&run(&schema, json!({"kind": "int"}))), vec![ErrorCode::Required]);
}

// ---- configuration loading ----

#[test]
fn yaml_schema_and_options() {
    let options = SchemaOptions::from_yaml_str(
        "
failFast: false
strict: true
pathPrefix: req
",
    )
    .unwrap();
    let schema = Schema::from_yaml_str(
        "
name:
  type: string
  required: true
tags:
  type: array
  items: string
",
        options,
    )
    .unwrap();
    let result = run(&schema, json!({"tags": ["a", 2], "zzz": 1}));
    let paths: Vec<&str> = result.errors.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["req.name", "req.tags[1]", "req.zzz"]);
}

#[test]
fn json_text_schema_definition() {
    let def = SchemaDef::from_json_str(r#"{"n": {"type": "number", "max": 3}}"#).unwrap();
    let schema = Schema::new(def, SchemaOptions::from_json_str("{}").unwrap()).unwrap();
    assert_eq!(codes(&run(&schema, json!({"n": 4}))), vec![ErrorCode::Max]);
    assert!(SchemaDef::from_json_str("[1]").is_err());
}

#[test]
fn oversize_regex_aborts_construction() {
    let err = Schema::from_json(
        json!({"a": {"type": "string", "regex": "a".repeat(20)}}),
        SchemaOptions {
            max_regex_length: 10,
            ..Default::default()
        },
    )
    .unwrap_err();
    assert_eq!(
        err.issues().iter().map(|i| i.code).collect::<Vec<_>>(),
        vec![ErrorCode::RegexTooLong]
    );
}

#[test]
fn value_only_validate() {
    let schema = Schema::from_json(
        json!({"a": {"type": "string", "default": "d"}}),
        SchemaOptions {
            value_only: true,
            ..Default::default()
        },
    )
    .unwrap();
    let out = schema.validate(&Value::from(json!({}))).unwrap();
    assert_eq!(out, Validated::Value(Value::from(json!({"a": "d"}))));
}

// ---- host types ----

#[derive(Debug)]
struct Money(i64);

#[test]
fn external_type_fields() {
    use gentle_schema::{ExternalType, ExternalValue};

    let money = ExternalType::of::<Money>().with_converter(|v| {
        v.as_f64()
            .map(|n| Value::External(ExternalValue::new(Money(n as i64))))
            .ok_or_else(|| "not an amount".to_string())
    });
    let def = SchemaDef::new()
        .field("price", RawEntry::new().type_spec(money.clone()).coerce(true))
        .field("fee", money);
    let schema = Schema::new(def, SchemaOptions::default()).unwrap();

    let result = run(&schema, json!({"price": 120, "fee": 3}));
    assert_eq!(codes(&result), vec![ErrorCode::Type]);
    assert_eq!(result.errors[0].path, "fee");
    assert!(result.errors[0]
        .message
        .ends_with("expected a valid instance of the Money class, received number"));
    match result.value.get("price") {
        Some(Value::External(ext)) => assert_eq!(ext.downcast_ref::<Money>().map(|m| m.0), Some(120)),
        other => panic!("price was not converted: {other:?}"),
    }

    // Advisory coercion failure falls through to the type check.
    let result = run(&schema, json!({"price": "abc"}));
    assert_eq!(codes(&result), vec![ErrorCode::Type]);
}
