//! # Host Callbacks
//!
//! Schemas carry four kinds of host code: custom [`Validator`]s, enum and
//! conditional [`Predicate`]s, default-value [`Producer`]s, and the
//! matchers/converters of external types (in `gentle-core`).
//!
//! Every callback runs under `catch_unwind`. A panic is treated exactly
//! like a returned error, so host code can never unwind through the
//! engine.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use gentle_core::Value;

/// Error type accepted from fallible validators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a custom validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// Rejected with no specific reason.
    RejectedGeneric,
    /// Rejected with one `ERR_CUSTOM` entry per message.
    RejectedWithMessages(Vec<String>),
}

impl Verdict {
    /// Build a verdict from a `{valid, errors}` style report.
    ///
    /// `valid: false` with no messages is a generic rejection.
    pub fn report(valid: bool, errors: Vec<String>) -> Self {
        match (valid, errors.is_empty()) {
            (true, _) => Self::Accepted,
            (false, true) => Self::RejectedGeneric,
            (false, false) => Self::RejectedWithMessages(errors),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl From<bool> for Verdict {
    fn from(ok: bool) -> Self {
        if ok {
            Self::Accepted
        } else {
            Self::RejectedGeneric
        }
    }
}

impl From<&str> for Verdict {
    fn from(message: &str) -> Self {
        Self::RejectedWithMessages(vec![message.to_string()])
    }
}

impl From<String> for Verdict {
    fn from(message: String) -> Self {
        Self::RejectedWithMessages(vec![message])
    }
}

/// An empty list accepts.
impl From<Vec<String>> for Verdict {
    fn from(messages: Vec<String>) -> Self {
        if messages.is_empty() {
            Self::Accepted
        } else {
            Self::RejectedWithMessages(messages)
        }
    }
}

impl From<Vec<&str>> for Verdict {
    fn from(messages: Vec<&str>) -> Self {
        messages
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into()
    }
}

/// `None` accepts, `Some(message)` rejects.
impl From<Option<String>> for Verdict {
    fn from(message: Option<String>) -> Self {
        message.map_or(Self::Accepted, Self::from)
    }
}

/// What a validator can see besides the value.
#[derive(Debug, Clone, Copy)]
pub struct ValidatorContext<'a> {
    /// Reported path of the value.
    pub path: &'a str,
    /// Caller-defined options of the current call.
    pub extra: &'a BTreeMap<String, Value>,
}

type ValidatorFn =
    dyn Fn(&Value, &ValidatorContext<'_>) -> Result<Verdict, BoxError> + Send + Sync;

/// A custom validation gate.
#[derive(Clone)]
pub struct Validator(Arc<ValidatorFn>);

impl Validator {
    /// Wrap an infallible validator returning anything convertible to a
    /// [`Verdict`] (`bool`, `&str`, `String`, `Vec<String>`, ...).
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(&Value, &ValidatorContext<'_>) -> R + Send + Sync + 'static,
        R: Into<Verdict>,
    {
        Self(erase(move |value, ctx| Ok(f(value, ctx).into())))
    }

    /// Wrap a validator that may fail. A returned error becomes one
    /// `ERR_CUSTOM` entry carrying the error text as its raw error.
    pub fn fallible<F, R>(f: F) -> Self
    where
        F: Fn(&Value, &ValidatorContext<'_>) -> Result<R, BoxError> + Send + Sync + 'static,
        R: Into<Verdict>,
    {
        Self(erase(move |value, ctx| f(value, ctx).map(Into::into)))
    }

    /// Run the validator. `Err` carries the failure text (returned error
    /// or panic message).
    pub fn run(&self, value: &Value, ctx: &ValidatorContext<'_>) -> Result<Verdict, String> {
        match catch_unwind(AssertUnwindSafe(|| (self.0)(value, ctx))) {
            Ok(Ok(verdict)) => Ok(verdict),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(panic_message(payload.as_ref())),
        }
    }
}

fn erase<F>(f: F) -> Arc<ValidatorFn>
where
    F: Fn(&Value, &ValidatorContext<'_>) -> Result<Verdict, BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

impl PartialEq for Validator {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator(<fn>)")
    }
}

/// A boolean test over one value, used by enum members and conditional
/// rules. A panic counts as `false`.
#[derive(Clone)]
pub struct Predicate {
    name: Arc<str>,
    test: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl Predicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::named("anon", f)
    }

    /// Named predicates show up as `<fn:name>` in enum error messages.
    pub fn named<F>(name: &str, f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            test: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn test(&self, value: &Value) -> bool {
        catch_unwind(AssertUnwindSafe(|| (self.test)(value))).unwrap_or(false)
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.test, &other.test)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate(<fn:{}>)", self.name)
    }
}

/// Zero-argument default-value factory.
#[derive(Clone)]
pub struct Producer(Arc<dyn Fn() -> Value + Send + Sync>);

impl Producer {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn produce(&self) -> Result<Value, String> {
        catch_unwind(AssertUnwindSafe(|| (self.0)())).map_err(|p| panic_message(p.as_ref()))
    }
}

impl PartialEq for Producer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Producer(<fn>)")
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(extra: &BTreeMap<String, Value>) -> ValidatorContext<'_> {
        ValidatorContext { path: "f", extra }
    }

    #[test]
    fn test_verdict_conversions() {
        assert_eq!(Verdict::from(true), Verdict::Accepted);
        assert_eq!(Verdict::from(false), Verdict::RejectedGeneric);
        assert_eq!(
            Verdict::from("too short"),
            Verdict::RejectedWithMessages(vec!["too short".into()])
        );
        assert_eq!(Verdict::from(Vec::<String>::new()), Verdict::Accepted);
        assert_eq!(Verdict::from(None::<String>), Verdict::Accepted);
    }

    #[test]
    fn test_report_shape() {
        assert_eq!(Verdict::report(true, vec!["ignored".into()]), Verdict::Accepted);
        assert_eq!(Verdict::report(false, vec![]), Verdict::RejectedGeneric);
        assert_eq!(
            Verdict::report(false, vec!["a".into(), "b".into()]),
            Verdict::RejectedWithMessages(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_validator_sees_context() {
        let extra = BTreeMap::from([("limit".to_string(), Value::from(3))]);
        let v = Validator::new(|value, ctx| {
            let limit = ctx.extra.get("limit").and_then(Value::as_f64).unwrap_or(0.0);
            value.as_f64().map_or(false, |n| n <= limit)
        });
        assert_eq!(v.run(&Value::from(2), &ctx(&extra)), Ok(Verdict::Accepted));
        assert_eq!(v.run(&Value::from(5), &ctx(&extra)), Ok(Verdict::RejectedGeneric));
    }

    #[test]
    fn test_fallible_validator_error_text() {
        let extra = BTreeMap::new();
        let v = Validator::fallible(|_, _| -> Result<bool, BoxError> { Err("backend down".into()) });
        assert_eq!(v.run(&Value::Null, &ctx(&extra)), Err("backend down".to_string()));
    }

    #[test]
    fn test_panicking_callbacks_are_contained() {
        let extra = BTreeMap::new();
        let v = Validator::new(|_, _| -> bool { panic!("kaboom") });
        assert_eq!(v.run(&Value::Null, &ctx(&extra)), Err("kaboom".to_string()));

        let p = Predicate::new(|_| panic!("nope"));
        assert!(!p.test(&Value::Null));

        let producer = Producer::new(|| panic!("{}", String::from("no default")));
        assert_eq!(producer.produce(), Err("no default".to_string()));
    }

    #[test]
    fn test_identity_equality() {
        let a = Predicate::named("is_even", |v| v.as_f64().map_or(false, |n| n % 2.0 == 0.0));
        assert_eq!(a, a.clone());
        assert_ne!(a, Predicate::new(|_| true));
        assert_eq!(format!("{a:?}"), "Predicate(<fn:is_even>)");
    }
}
