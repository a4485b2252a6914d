//! # Descriptor Normalization
//!
//! Turns any [`RawDef`] shorthand into a [`Descriptor`].
//!
//! Two failure classes:
//!
//! - **Hard failures** abort immediately: a pattern string longer than the
//!   configured maximum (`ERR_REGEX_TOO_LONG`) or one that does not compile
//!   (`ERR_SCHEMA_REGEX`).
//! - **Lint issues** (unknown type names, non-sequence enums, malformed
//!   property maps, non-pattern regex values) are collected and returned
//!   together. Schema construction turns them into one aggregated
//!   [`SchemaError::Definition`]; reference resolution ignores them.
//!
//! Shared definitions are normalized once per build and memoized by
//! handle.

use std::collections::HashMap;

use gentle_core::{ErrorCode, Pattern, TypeSpec, Value};
use tracing::warn;

use crate::descriptor::{DefaultValue, Descriptor, EnumMember, FieldDescriptor, RegexRule};
use crate::error::{SchemaError, SchemaIssue};
use crate::raw::{RawAttr, RawDef, RawEntry};

/// Normalize one definition outside of a schema build.
///
/// Lint issues are discarded; only hard failures are reported.
pub fn normalize(raw: &RawDef, max_regex_length: usize) -> Result<Descriptor, SchemaError> {
    Normalizer::new(max_regex_length).normalize(raw, "", "")
}

/// Normalization state for one build.
#[derive(Debug)]
pub(crate) struct Normalizer {
    max_regex_length: usize,
    memo: HashMap<u64, Descriptor>,
    issues: Vec<SchemaIssue>,
}

impl Normalizer {
    pub(crate) fn new(max_regex_length: usize) -> Self {
        Self {
            max_regex_length,
            memo: HashMap::new(),
            issues: Vec::new(),
        }
    }

    /// Lint issues collected so far, draining them.
    pub(crate) fn take_issues(&mut self) -> Vec<SchemaIssue> {
        std::mem::take(&mut self.issues)
    }

    /// `key` names the field in issue messages; `path` locates it inside
    /// the definition.
    pub(crate) fn normalize(
        &mut self,
        raw: &RawDef,
        key: &str,
        path: &str,
    ) -> Result<Descriptor, SchemaError> {
        match raw {
            RawDef::TypeName(name) => {
                let spec = TypeSpec::parse(name);
                self.lint_type(&spec, key, path);
                Ok(FieldDescriptor::typed(spec).into())
            }
            RawDef::Type(spec) => {
                self.lint_type(spec, key, path);
                Ok(FieldDescriptor::typed(spec.clone()).into())
            }
            RawDef::Validator(validator) => Ok(FieldDescriptor {
                validator: Some(validator.clone()),
                ..FieldDescriptor::default()
            }
            .into()),
            RawDef::Pair(first, overrides) => match self.normalize(first, key, path)? {
                Descriptor::Ref(name) => {
                    if overrides.attrs().next().is_some() {
                        warn!(field = %path, reference = %name, "overrides on a $ref placeholder are ignored");
                    }
                    Ok(Descriptor::Ref(name))
                }
                Descriptor::Field(base) => {
                    Ok(self.apply_entry(base, overrides, key, path)?.into())
                }
            },
            RawDef::Entry(entry) => match entry.ref_name() {
                Some(name) => Ok(Descriptor::Ref(name.to_string())),
                None => Ok(self
                    .apply_entry(FieldDescriptor::default(), entry, key, path)?
                    .into()),
            },
            RawDef::Shared(shared) => {
                if let Some(done) = self.memo.get(&shared.handle()) {
                    return Ok(done.clone());
                }
                let descriptor = self.normalize(shared.def(), key, path)?;
                self.memo.insert(shared.handle(), descriptor.clone());
                Ok(descriptor)
            }
            RawDef::Literal(_) => Ok(Descriptor::default()),
        }
    }

    /// Apply every slot of `entry` over `base`. Slots absent from the entry
    /// leave `base` untouched.
    fn apply_entry(
        &mut self,
        mut out: FieldDescriptor,
        entry: &RawEntry,
        key: &str,
        path: &str,
    ) -> Result<FieldDescriptor, SchemaError> {
        for (slot, attr) in entry.attrs() {
            match slot {
                "type" => {
                    let spec = match attr {
                        RawAttr::Type(spec) => spec.clone(),
                        RawAttr::Value(Value::String(name)) => TypeSpec::parse(name),
                        other => {
                            self.issue(
                                path,
                                format!("Type for field '{key}' must be a string or constructor"),
                                ErrorCode::SchemaType,
                            );
                            out.type_spec = Some(TypeSpec::Unrecognized(describe_attr(other)));
                            continue;
                        }
                    };
                    self.lint_type(&spec, key, path);
                    out.type_spec = Some(spec);
                }
                "required" => out.required = Some(attr_truthy(attr)),
                "nullable" => out.nullable = Some(attr_truthy(attr)),
                "coerce" => out.coerce = Some(attr_truthy(attr)),
                "throw" => out.throw = Some(attr_truthy(attr)),
                "strictType" | "forceType" => {}
                "default" => match attr {
                    RawAttr::Value(value) => out.default = Some(DefaultValue::Value(value.clone())),
                    RawAttr::Producer(p) => out.default = Some(DefaultValue::Producer(p.clone())),
                    _ => {}
                },
                "validator" => match attr {
                    RawAttr::Validator(v) => out.validator = Some(v.clone()),
                    RawAttr::Value(Value::Null) => out.validator = None,
                    _ => {}
                },
                "enum" => out.enum_members = self.enum_members(attr, key, path),
                "regex" => {
                    if let Some(rule) = self.regex_rule(attr, key, path)? {
                        out.regex = Some(rule);
                    }
                }
                "min" => {
                    if let RawAttr::Value(Value::Number(n)) = attr {
                        out.min = Some(*n);
                    }
                }
                "max" => {
                    if let RawAttr::Value(Value::Number(n)) = attr {
                        out.max = Some(*n);
                    }
                }
                "items" => {
                    if let Some(def) = attr_as_def(attr) {
                        let items_path = format!("{path}.items");
                        out.items = Some(Box::new(self.normalize(&def, key, &items_path)?));
                    }
                }
                "properties" => out.properties = self.properties(attr, key, path)?,
                "errorMessage" => {
                    if let RawAttr::Value(Value::String(message)) = attr {
                        out.error_message = Some(message.clone());
                    }
                }
                "$ref" => {}
                other => {
                    if let RawAttr::Value(value) = attr {
                        out.extra.insert(other.to_string(), value.clone());
                    }
                }
            }
        }

        let strict = entry.get("strictType").map(attr_truthy);
        let force = entry.get("forceType").map(attr_truthy);
        if strict.is_some() || force.is_some() {
            out.strict_type = Some(strict.unwrap_or(false) || force.unwrap_or(false));
        }
        Ok(out)
    }

    fn enum_members(&mut self, attr: &RawAttr, key: &str, path: &str) -> Option<Vec<EnumMember>> {
        match attr {
            RawAttr::Enum(members) => Some(members.clone()),
            RawAttr::Value(Value::Array(values)) => {
                Some(values.iter().cloned().map(EnumMember::Literal).collect())
            }
            RawAttr::Value(value) if !value.is_truthy() => None,
            _ => {
                self.issue(
                    path,
                    format!("Field '{key}' enum must be an array"),
                    ErrorCode::SchemaEnum,
                );
                None
            }
        }
    }

    fn regex_rule(
        &mut self,
        attr: &RawAttr,
        key: &str,
        path: &str,
    ) -> Result<Option<RegexRule>, SchemaError> {
        let rule = match attr {
            RawAttr::Pattern(p) | RawAttr::Value(Value::Regex(p)) => RegexRule::Pattern(p.clone()),
            RawAttr::Value(Value::String(source)) if source.is_empty() => return Ok(None),
            RawAttr::Value(Value::String(source)) => {
                let len = source.chars().count();
                if len > self.max_regex_length {
                    return Err(SchemaIssue::new(
                        path,
                        format!(
                            "Regex string too long ({len} > {}). Pass a compiled pattern instead.",
                            self.max_regex_length
                        ),
                        ErrorCode::RegexTooLong,
                    )
                    .into());
                }
                let pattern = Pattern::new(source).map_err(|e| {
                    SchemaIssue::new(
                        path,
                        format!("Field '{key}' has invalid regex: {e}"),
                        ErrorCode::SchemaRegex,
                    )
                })?;
                RegexRule::Pattern(pattern)
            }
            RawAttr::Value(value) if !value.is_truthy() => return Ok(None),
            other => {
                self.issue(
                    path,
                    format!("Field '{key}' has invalid regex; must be a pattern"),
                    ErrorCode::SchemaRegex,
                );
                let kept = match other {
                    RawAttr::Value(value) => value.clone(),
                    _ => Value::String(describe_attr(other)),
                };
                RegexRule::Invalid(kept)
            }
        };
        Ok(Some(rule))
    }

    fn properties(
        &mut self,
        attr: &RawAttr,
        key: &str,
        path: &str,
    ) -> Result<Option<Vec<(String, Descriptor)>>, SchemaError> {
        let raw: Vec<(String, RawDef)> = match attr {
            RawAttr::Properties(props) => props.clone(),
            RawAttr::Value(Value::Object(map)) => map
                .iter()
                .map(|(name, def)| (name.clone(), RawDef::from(def.clone())))
                .collect(),
            RawAttr::Value(Value::Null) => Vec::new(),
            _ => {
                self.issue(
                    path,
                    format!("Field '{key}' properties must be an object"),
                    ErrorCode::SchemaProperties,
                );
                return Ok(None);
            }
        };
        let mut out = Vec::with_capacity(raw.len());
        for (name, def) in &raw {
            let child_path = format!("{path}.properties.{name}");
            out.push((name.clone(), self.normalize(def, name, &child_path)?));
        }
        Ok(Some(out))
    }

    fn lint_type(&mut self, spec: &TypeSpec, key: &str, path: &str) {
        if let TypeSpec::Unrecognized(name) = spec {
            self.issue(
                path,
                format!("Invalid type '{name}' for field '{key}'"),
                ErrorCode::SchemaType,
            );
        }
    }

    fn issue(&mut self, path: &str, message: String, code: ErrorCode) {
        self.issues.push(SchemaIssue::new(path, message, code));
    }
}

fn attr_truthy(attr: &RawAttr) -> bool {
    match attr {
        RawAttr::Value(value) => value.is_truthy(),
        _ => true,
    }
}

fn attr_as_def(attr: &RawAttr) -> Option<RawDef> {
    match attr {
        RawAttr::Def(def) => Some((**def).clone()),
        RawAttr::Value(value) => Some(RawDef::from(value.clone())),
        RawAttr::Type(spec) => Some(RawDef::Type(spec.clone())),
        RawAttr::Validator(v) => Some(RawDef::Validator(v.clone())),
        _ => None,
    }
}

fn describe_attr(attr: &RawAttr) -> String {
    match attr {
        RawAttr::Value(value) => value.kind_name().to_string(),
        RawAttr::Type(spec) => spec.to_string(),
        RawAttr::Validator(_) | RawAttr::Producer(_) => "function".to_string(),
        RawAttr::Enum(_) => "array".to_string(),
        RawAttr::Pattern(_) => "regexp".to_string(),
        RawAttr::Def(_) | RawAttr::Properties(_) => "object".to_string(),
    }
}
