//! # Checkers
//!
//! A [`Checker`] is the compiled form of one [`Descriptor`]. Nested
//! `items`/`properties` descriptors are compiled eagerly; nested `$ref`
//! slots stay as [`Checker::Ref`] and are resolved at validation time
//! through the [`RefSource`], so recursive shapes cost nothing until a
//! value actually descends into them.
//!
//! ## Evaluation order
//!
//! 1. absence: default, else `ERR_REQUIRED` when required
//! 2. null: allowed by field or instance nullability, else `ERR_NULL`
//! 3. validator-only fields run their validator and stop
//! 4. coercion (`ERR_COERCE` only for core primitive types)
//! 5. type (`ERR_TYPE`)
//! 6. enum (`ERR_ENUM`)
//! 7. regex (`ERR_REGEX`)
//! 8. numeric or length bounds (`ERR_MIN` / `ERR_MAX`)
//! 9. `items` / `properties` descent and the unknown-key policy
//! 10. the custom validator, when the field declared a type and nothing
//!     has failed so far
//!
//! Each of steps 1 to 8 stops at its first failure. A field marked
//! `throw` turns its first error, its children's included, into a raised
//! [`ValidationError`].

use gentle_core::path::{index_path, key_path};
use gentle_core::{coerce, format_number, ErrorCode, ErrorEntry, Object, Value};

use crate::descriptor::{Descriptor, EnumMember, FieldDescriptor, RegexRule};
use crate::error::ValidationError;
use crate::options::SchemaOptions;
use crate::refs::{RefFailure, RefSource};
use crate::validator::{ValidatorContext, Verdict};

/// Which parts of the pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CheckMode {
    Full,
    /// Structure and types only: custom validators are skipped.
    TypesOnly,
}

/// Everything a checker reads besides the value.
#[derive(Clone, Copy)]
pub(crate) struct CheckCtx<'a> {
    pub options: &'a SchemaOptions,
    pub refs: &'a dyn RefSource,
    pub mode: CheckMode,
}

/// Outcome of one checker run. `value` is `None` when the input was
/// absent and nothing was produced for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Checked {
    pub errors: Vec<ErrorEntry>,
    pub value: Option<Value>,
}

impl Checked {
    fn ok(value: Option<Value>) -> Self {
        Self {
            errors: Vec::new(),
            value,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Compiled validation routine for one descriptor.
#[derive(Debug)]
pub(crate) enum Checker {
    Rules(Box<RuleChecker>),
    /// Resolved through the ref source on every run.
    Ref(String),
    /// A reference that failed to resolve; always reports the failure.
    Broken(RefFailure),
}

#[derive(Debug)]
pub(crate) struct RuleChecker {
    /// The field's own rules; `items`/`properties` are compiled below.
    rules: FieldDescriptor,
    items: Option<Checker>,
    properties: Option<Vec<(String, Checker)>>,
}

impl Checker {
    pub(crate) fn compile(descriptor: &Descriptor) -> Self {
        match descriptor {
            Descriptor::Ref(name) => Self::Ref(name.clone()),
            Descriptor::Field(field) => {
                let items = field.items.as_deref().map(Self::compile);
                let properties = field.properties.as_ref().map(|props| {
                    props
                        .iter()
                        .map(|(name, d)| (name.clone(), Self::compile(d)))
                        .collect()
                });
                let rules = FieldDescriptor {
                    items: None,
                    properties: None,
                    ..field.clone()
                };
                Self::Rules(Box::new(RuleChecker {
                    rules,
                    items,
                    properties,
                }))
            }
        }
    }

    pub(crate) fn check(
        &self,
        value: Option<&Value>,
        path: &str,
        ctx: &CheckCtx<'_>,
    ) -> Result<Checked, ValidationError> {
        match self {
            Self::Rules(rules) => rules.check(value, path, ctx),
            Self::Ref(name) => ctx.refs.checker(name).check(value, path, ctx),
            Self::Broken(failure) => Ok(Checked {
                errors: vec![failure.entry(path)],
                value: value.cloned(),
            }),
        }
    }
}

/// Error construction for one field at one path.
struct Reporter<'a> {
    path: &'a str,
    fixed: Option<&'a str>,
    throw: bool,
}

impl Reporter<'_> {
    fn entry_at(&self, path: &str, reason: impl Into<String>, code: ErrorCode) -> ErrorEntry {
        match self.fixed {
            Some(fixed) => ErrorEntry::with_fixed_message(path, fixed, reason, code),
            None => ErrorEntry::new(path, reason.into(), code),
        }
    }

    fn entry(&self, reason: impl Into<String>, code: ErrorCode) -> ErrorEntry {
        self.entry_at(self.path, reason, code)
    }

    /// Report `entries` as this field's outcome, raising for `throw`.
    fn fail(
        &self,
        entries: Vec<ErrorEntry>,
        value: Option<Value>,
    ) -> Result<Checked, ValidationError> {
        if self.throw {
            return Err(ValidationError::new(entries, value));
        }
        Ok(Checked {
            errors: entries,
            value,
        })
    }

    fn fail_one(
        &self,
        reason: impl Into<String>,
        code: ErrorCode,
        value: Option<Value>,
    ) -> Result<Checked, ValidationError> {
        self.fail(vec![self.entry(reason, code)], value)
    }

    fn verdict_entries(&self, outcome: Result<Verdict, String>) -> Vec<ErrorEntry> {
        match outcome {
            Ok(Verdict::Accepted) => Vec::new(),
            Ok(Verdict::RejectedGeneric) => {
                vec![self.entry("custom validator failed", ErrorCode::Custom)]
            }
            Ok(Verdict::RejectedWithMessages(messages)) => messages
                .into_iter()
                .map(|m| self.entry(m, ErrorCode::Custom))
                .collect(),
            Err(raw) => vec![self.entry(raw.clone(), ErrorCode::Custom).with_raw(raw)],
        }
    }
}

impl RuleChecker {
    fn check(
        &self,
        value: Option<&Value>,
        path: &str,
        ctx: &CheckCtx<'_>,
    ) -> Result<Checked, ValidationError> {
        let f = &self.rules;
        let report = Reporter {
            path,
            fixed: f.error_message.as_deref(),
            throw: f.throws(),
        };
        let options = ctx.options;

        let Some(value) = value else {
            if let Some(default) = &f.default {
                return match default.produce() {
                    Ok(produced) => Ok(Checked::ok(Some(produced))),
                    Err(raw) => report.fail(
                        vec![report
                            .entry(format!("default producer failed ({raw})"), ErrorCode::Validation)
                            .with_raw(raw)],
                        None,
                    ),
                };
            }
            if f.is_required() {
                return report.fail_one("is required", ErrorCode::Required, None);
            }
            return Ok(Checked::ok(None));
        };

        if value.is_null() {
            let allowed = f.nullable.unwrap_or(options.nullable)
                || f.type_spec.as_ref().is_some_and(|t| t.is_null());
            if allowed {
                return Ok(Checked::ok(Some(Value::Null)));
            }
            return report.fail_one("must not be null", ErrorCode::Null, None);
        }

        if let (Some(validator), None) = (&f.validator, &f.type_spec) {
            if ctx.mode == CheckMode::TypesOnly {
                return Ok(Checked::ok(Some(value.clone())));
            }
            let vctx = ValidatorContext {
                path,
                extra: &options.extra,
            };
            let entries = report.verdict_entries(validator.run(value, &vctx));
            if entries.is_empty() {
                return Ok(Checked::ok(Some(value.clone())));
            }
            return report.fail(entries, Some(value.clone()));
        }

        let mut out = value.clone();

        if let Some(spec) = &f.type_spec {
            if f.coerce.unwrap_or(options.coerce_types) {
                match coerce(&out, spec) {
                    Ok(coerced) => out = coerced,
                    Err(e) if spec.is_core_primitive() => {
                        return report.fail(
                            vec![report
                                .entry(format!("coercion failed ({e})"), ErrorCode::Coerce)
                                .with_raw(e.to_string())],
                            Some(out),
                        );
                    }
                    Err(_) => {}
                }
            }

            if !spec.is_any() && !spec.matches(&out) {
                let reason = format!(
                    "expected {}, received {}",
                    spec.expected_label(),
                    out.kind_name()
                );
                return report.fail_one(reason, ErrorCode::Type, Some(out));
            }
        }

        if let Some(members) = f.enum_members.as_deref().filter(|m| !m.is_empty()) {
            if !enum_match(members, &out, options.strict_enum) {
                let allowed = members
                    .iter()
                    .map(EnumMember::label)
                    .collect::<Vec<_>>()
                    .join(", ");
                return report.fail_one(
                    format!("must be one of [{allowed}]"),
                    ErrorCode::Enum,
                    Some(out),
                );
            }
        }

        match &f.regex {
            Some(RegexRule::Invalid(_)) => {
                return report.fail_one(
                    "regex must be a compiled pattern",
                    ErrorCode::Regex,
                    Some(out),
                );
            }
            Some(RegexRule::Pattern(pattern)) => {
                let ok = out.as_str().is_some_and(|s| pattern.is_match(s));
                if !ok {
                    return report.fail_one(
                        format!("String should follow regex pattern {pattern}"),
                        ErrorCode::Regex,
                        Some(out),
                    );
                }
            }
            None => {}
        }

        if let Some((reason, code)) = bounds_violation(f, &out) {
            return report.fail_one(reason, code, Some(out));
        }

        let mut errors = Vec::new();

        if let (Value::Array(items), Some(item_checker)) = (&out, &self.items) {
            let mut rebuilt = Vec::with_capacity(items.len());
            let mut had_error = false;
            for (i, item) in items.iter().enumerate() {
                let child = item_checker.check(Some(item), &index_path(path, i), ctx)?;
                if child.is_valid() {
                    rebuilt.extend(child.value);
                    continue;
                }
                had_error = true;
                errors.extend(child.errors);
                if report.throw {
                    return Err(ValidationError::new(errors, Some(Value::Array(rebuilt))));
                }
                if options.fail_fast {
                    return Ok(Checked {
                        errors,
                        value: Some(out),
                    });
                }
            }
            if !had_error {
                out = Value::Array(rebuilt);
            }
        }

        if let (Value::Object(map), Some(props)) = (&out, &self.properties) {
            let mut nested = Object::new();
            for (name, checker) in props {
                let child = checker.check(map.get(name), &key_path(path, name), ctx)?;
                if child.is_valid() {
                    if let Some(v) = child.value {
                        nested.insert(name.clone(), v);
                    }
                    continue;
                }
                errors.extend(child.errors);
                if report.throw {
                    return Err(ValidationError::new(errors, Some(Value::Object(nested))));
                }
                if options.fail_fast {
                    return Ok(Checked {
                        errors,
                        value: Some(out),
                    });
                }
            }

            for (key, v) in map {
                if props.iter().any(|(name, _)| name == key) || options.remove_unknown {
                    continue;
                }
                if !options.strict {
                    nested.insert(key.clone(), v.clone());
                    continue;
                }
                errors.push(report.entry_at(&key_path(path, key), "unknown field", ErrorCode::Unknown));
                if report.throw {
                    return Err(ValidationError::new(errors, Some(Value::Object(nested))));
                }
                if options.fail_fast {
                    return Ok(Checked {
                        errors,
                        value: Some(out),
                    });
                }
            }
            out = Value::Object(nested);
        }

        if errors.is_empty() && ctx.mode == CheckMode::Full {
            if let Some(validator) = &f.validator {
                let vctx = ValidatorContext {
                    path,
                    extra: &options.extra,
                };
                let entries = report.verdict_entries(validator.run(&out, &vctx));
                if !entries.is_empty() {
                    return report.fail(entries, Some(out));
                }
            }
        }

        Ok(Checked {
            errors,
            value: Some(out),
        })
    }
}

fn enum_match(members: &[EnumMember], value: &Value, strict_enum: bool) -> bool {
    members.iter().any(|member| match member {
        EnumMember::Literal(literal) => literal == value,
        EnumMember::Predicate(p) => !strict_enum && p.test(value),
    })
}

fn bounds_violation(f: &FieldDescriptor, value: &Value) -> Option<(String, ErrorCode)> {
    let (measure, prefix) = match value {
        Value::Number(n) => (*n, ""),
        Value::String(s) => (s.chars().count() as f64, "length "),
        Value::Array(items) => (items.len() as f64, "length "),
        _ => return None,
    };
    if let Some(min) = f.min.filter(|min| measure < *min) {
        return Some((format!("{prefix}must be >= {}", format_number(min)), ErrorCode::Min));
    }
    if let Some(max) = f.max.filter(|max| measure > *max) {
        return Some((format!("{prefix}must be <= {}", format_number(max)), ErrorCode::Max));
    }
    None
}
