//! Host record classes.
//!
//! Record adapters need a small amount of introspection over the host's record
//! classes: the declared fields in order, their defaults, how call arguments
//! bind to them, and whether a method has been overridden by the user. This is
//! expressed as the [`HostRecordLike`] capability trait, implemented once per
//! record family:
//!
//! - [`DataRecordType`]: structured output records (dataclass-style model
//!   outputs) that drop fields holding the "no value" sentinel;
//! - [`CustomRecordType`]: user subclasses of the ordered map, optionally
//!   structured, whose methods may be overridden.
//!
//! Classes are registered in a [`RecordRegistry`] which hands out stable
//! [`RecordClassRef`]s. Guards and reconstruction only ever refer to classes
//! through these references.
use std::{
    collections::{BTreeMap, HashMap},
    rc::Rc,
};

use either::Either;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    containers::{DictMethod, RecordFlavor, RecordMethod},
    utils::{Error, TraceResult},
    value::{CallArg, Literal, UserFunction},
};

/// A stable reference to a record class stored inside a [`RecordRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordClassRef {
    id: Uuid,
    name: String,
}

impl RecordClassRef {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for RecordClassRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A declared field of a record class.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,

    /// Declared default, `None` when the field is required.
    pub default: Option<Literal>,
}

impl FieldDecl {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<Literal>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// Where a method of a record class is implemented.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResolution {
    /// Inherited, unoverridden, from the base map class.
    Base,

    /// Overridden by the user type.
    Overridden(UserFunction),

    /// The class has no such method.
    Missing,
}

/// A call argument after binding against a field signature: either explicitly
/// passed at the call site, or filled in from the declared default.
pub type BoundArg = Either<CallArg, Literal>;

/// Introspection over a host record class.
pub trait HostRecordLike: std::fmt::Debug {
    fn name(&self) -> &str;

    /// Declared fields, in declaration order. Empty for unstructured records.
    fn fields(&self) -> &[FieldDecl];

    /// Whether the class declares a field signature.
    fn is_structured(&self) -> bool;

    /// Which adapter models instances of this class.
    fn flavor(&self) -> RecordFlavor;

    fn resolve_method(&self, name: &str) -> MethodResolution;

    /// Declared default of `field`, if the field exists and has one.
    fn default_of(&self, field: &str) -> Option<&Literal> {
        self.fields()
            .iter()
            .find(|f| f.name == field)
            .and_then(|f| f.default.as_ref())
    }

    /// Bind call-site arguments against the declared fields, applying defaults
    /// for omitted fields. The result is in declaration order.
    fn bind(
        &self,
        args: &[CallArg],
        kwargs: &IndexMap<String, CallArg>,
    ) -> TraceResult<IndexMap<String, BoundArg>> {
        let fields = self.fields();
        if args.len() > fields.len() {
            return Err(Error::construct(
                self.name(),
                format!(
                    "takes {} positional arguments but {} were given",
                    fields.len(),
                    args.len()
                ),
            ));
        }

        let mut explicit: HashMap<&str, &CallArg> = fields
            .iter()
            .zip(args)
            .map(|(field, arg)| (field.name.as_str(), arg))
            .collect();

        for (name, arg) in kwargs {
            if !fields.iter().any(|f| &f.name == name) {
                return Err(Error::construct(
                    self.name(),
                    format!("got an unexpected keyword argument `{}`", name),
                ));
            }
            if explicit.insert(name.as_str(), arg).is_some() {
                return Err(Error::construct(
                    self.name(),
                    format!("got multiple values for argument `{}`", name),
                ));
            }
        }

        let mut bound = IndexMap::with_capacity(fields.len());
        for field in fields {
            let arg = match (explicit.remove(field.name.as_str()), &field.default) {
                (Some(arg), _) => Either::Left(arg.clone()),
                (None, Some(default)) => Either::Right(default.clone()),
                (None, None) => {
                    return Err(Error::construct(
                        self.name(),
                        format!("missing required argument `{}`", field.name),
                    ));
                }
            };
            bound.insert(field.name.clone(), arg);
        }
        Ok(bound)
    }
}

/// A structured output record (dataclass-style model output).
///
/// All of the class's own methods are treated as part of the record protocol;
/// user code never overrides the map methods of these records.
#[derive(Debug, Clone)]
pub struct DataRecordType {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

impl DataRecordType {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

impl HostRecordLike for DataRecordType {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    fn is_structured(&self) -> bool {
        true
    }

    fn flavor(&self) -> RecordFlavor {
        RecordFlavor::PlainData
    }

    fn resolve_method(&self, name: &str) -> MethodResolution {
        if name.parse::<RecordMethod>().is_ok() || name.parse::<DictMethod>().is_ok() {
            MethodResolution::Base
        } else {
            MethodResolution::Missing
        }
    }
}

/// A user subclass of the ordered map.
#[derive(Debug, Clone, Default)]
pub struct CustomRecordType {
    pub name: String,

    /// Declared fields when the subclass is also a structured record.
    pub fields: Option<Vec<FieldDecl>>,

    /// Methods redefined by the subclass.
    pub overrides: BTreeMap<String, UserFunction>,
}

impl CustomRecordType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn structured(mut self, fields: Vec<FieldDecl>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_override(mut self, method: impl Into<String>, routine: UserFunction) -> Self {
        self.overrides.insert(method.into(), routine);
        self
    }
}

impl HostRecordLike for CustomRecordType {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> &[FieldDecl] {
        self.fields.as_deref().unwrap_or(&[])
    }

    fn is_structured(&self) -> bool {
        self.fields.is_some()
    }

    fn flavor(&self) -> RecordFlavor {
        RecordFlavor::Customized
    }

    fn resolve_method(&self, name: &str) -> MethodResolution {
        if let Some(routine) = self.overrides.get(name) {
            MethodResolution::Overridden(routine.clone())
        } else if name.parse::<DictMethod>().is_ok() {
            MethodResolution::Base
        } else {
            MethodResolution::Missing
        }
    }
}

/// Registry of the record classes known to a tracer.
///
/// ```rust
/// # use hytrace::records::{DataRecordType, FieldDecl, RecordRegistry};
/// let mut registry = RecordRegistry::default();
/// let class = registry.register(DataRecordType::new("Output", vec![FieldDecl::required("logits")]));
/// assert_eq!(registry.get(&class).unwrap().fields().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct RecordRegistry {
    classes: HashMap<Uuid, Rc<dyn HostRecordLike>>,
}

impl RecordRegistry {
    /// Register a record class and return its reference.
    pub fn register(&mut self, record: impl HostRecordLike + 'static) -> RecordClassRef {
        let id = Uuid::new_v4();
        let class = RecordClassRef {
            id,
            name: record.name().to_string(),
        };
        debug!("New record class `{}` registered with UUID {}.", class.name, id);
        self.classes.insert(id, Rc::new(record));
        class
    }

    /// Retrieve the record class behind `class`.
    pub fn get(&self, class: &RecordClassRef) -> TraceResult<Rc<dyn HostRecordLike>> {
        self.classes
            .get(&class.id)
            .cloned()
            .ok_or_else(|| Error::InvalidHandle(format!("record class {} ({})", class.name, class.id)))
    }
}
