//! Classes, instances and call receivers
//!
//! A [`Class`] holds named members (methods and accessors) and may inherit from
//! a parent class. An [`Object`] is an instance with its own fields. Objects are
//! the receivers memoized methods are bound to; their identity decides which
//! per-context cache a call uses.

use crate::callable::Callable;
use crate::error::{MemoError, Result};
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

/// The receiver a call is bound to
#[derive(Debug, Clone, Default)]
pub enum Context {
    /// No receiver (free function call)
    #[default]
    Detached,

    /// Bound to an instance
    Object(Object),
}

impl Context {
    pub fn object(&self) -> Option<&Object> {
        match self {
            Context::Detached => None,
            Context::Object(o) => Some(o),
        }
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, Context::Detached)
    }
}

impl From<Object> for Context {
    fn from(o: Object) -> Self {
        Context::Object(o)
    }
}

impl From<&Object> for Context {
    fn from(o: &Object) -> Self {
        Context::Object(o.clone())
    }
}

/// Read/write pair of a computed property
#[derive(Debug, Clone, Default)]
pub struct Accessor {
    /// Called with the receiver and no arguments
    pub read: Option<Callable>,

    /// Called with the receiver and the assigned value
    pub write: Option<Callable>,
}

impl Accessor {
    /// Read-only accessor
    pub fn getter(read: Callable) -> Self {
        Self {
            read: Some(read),
            write: None,
        }
    }

    pub fn with_setter(mut self, write: Callable) -> Self {
        self.write = Some(write);
        self
    }

    pub fn is_readable(&self) -> bool {
        self.read.is_some()
    }
}

/// A named member defined on a class
#[derive(Debug, Clone)]
pub enum Member {
    Method(Callable),
    Accessor(Accessor),
}

struct ClassInner {
    name: String,
    parent: Option<Class>,
    members: RwLock<HashMap<String, Member>>,
}

/// A type whose members are shared by all its instances
#[derive(Clone)]
pub struct Class {
    inner: Arc<ClassInner>,
}

impl Class {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ClassInner {
                name: name.into(),
                parent: None,
                members: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Create a subclass; members not found here are looked up on `parent`
    pub fn extend(name: impl Into<String>, parent: &Class) -> Self {
        Self {
            inner: Arc::new(ClassInner {
                name: name.into(),
                parent: Some(parent.clone()),
                members: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&Class> {
        self.inner.parent.as_ref()
    }

    /// Define (or replace) a method on this class
    pub fn define_method(&self, name: impl Into<String>, method: Callable) {
        self.inner
            .members
            .write()
            .insert(name.into(), Member::Method(method));
    }

    /// Define (or replace) an accessor on this class
    pub fn define_accessor(&self, name: impl Into<String>, accessor: Accessor) {
        self.inner
            .members
            .write()
            .insert(name.into(), Member::Accessor(accessor));
    }

    /// Define a read-only accessor
    pub fn define_getter(&self, name: impl Into<String>, read: Callable) {
        self.define_accessor(name, Accessor::getter(read));
    }

    /// Member defined directly on this class, ignoring parents
    pub fn own_member(&self, name: &str) -> Option<Member> {
        self.inner.members.read().get(name).cloned()
    }

    /// Member lookup walking the parent chain
    pub fn member(&self, name: &str) -> Option<Member> {
        let mut class = Some(self);
        while let Some(current) = class {
            if let Some(member) = current.own_member(name) {
                return Some(member);
            }
            class = current.parent();
        }
        None
    }

    /// Accessor pair for `name`, walking the parent chain.
    ///
    /// A method with the same name shadows any accessor further up the chain.
    pub fn find_accessor(&self, name: &str) -> Option<Accessor> {
        match self.member(name)? {
            Member::Accessor(accessor) => Some(accessor),
            Member::Method(_) => None,
        }
    }

    pub fn instantiate(&self) -> Object {
        Object::new(self)
    }

    pub fn ptr_eq(&self, other: &Class) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Class({})", self.inner.name)
    }
}

pub(crate) struct ObjectInner {
    class: Class,
    fields: RwLock<BTreeMap<String, Value>>,
}

/// An instance of a [`Class`], compared by identity
#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

impl Object {
    pub fn new(class: &Class) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                class: class.clone(),
                fields: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    /// Memberless record holding only the given fields
    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let object = Object::new(&Class::new("Object"));
        {
            let mut own = object.inner.fields.write();
            for (key, value) in fields {
                own.insert(key.into(), value);
            }
        }
        object
    }

    pub fn class(&self) -> &Class {
        &self.inner.class
    }

    /// Own field, without consulting class members
    pub fn field(&self, name: &str) -> Option<Value> {
        self.inner.fields.read().get(name).cloned()
    }

    pub fn set_field(&self, name: impl Into<String>, value: Value) {
        self.inner.fields.write().insert(name.into(), value);
    }

    /// Snapshot of the own fields in key order
    pub fn fields(&self) -> Vec<(String, Value)> {
        self.inner
            .fields
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Property read: own field, then accessor, then method.
    ///
    /// Unknown properties read as [`Value::Undefined`].
    pub fn get(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.field(name) {
            return Ok(value);
        }

        match self.class().member(name) {
            Some(Member::Accessor(Accessor { read: Some(read), .. })) => {
                read.call(&Context::from(self), &[])
            }
            Some(Member::Accessor(_)) => Ok(Value::Undefined),
            Some(Member::Method(method)) => Ok(Value::Function(method)),
            None => Ok(Value::Undefined),
        }
    }

    /// Property write: accessor setter if one exists, else an own field
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        match self.class().member(name) {
            Some(Member::Accessor(Accessor { write: Some(write), .. })) => {
                write.call(&Context::from(self), &[value])?;
                Ok(())
            }
            Some(Member::Accessor(_)) => Err(MemoError::InvalidArgument(format!(
                "property `{}` of `{}` is read-only",
                name,
                self.class().name()
            ))),
            _ => {
                self.set_field(name, value);
                Ok(())
            }
        }
    }

    /// Call a method (or function-valued field) with this object as receiver
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let callable = match self.field(name) {
            Some(Value::Function(f)) => f,
            Some(other) => {
                return Err(MemoError::InvalidArgument(format!(
                    "`{}` is a {}, not a function",
                    name,
                    other.type_name()
                )))
            }
            None => match self.class().member(name) {
                Some(Member::Method(method)) => method,
                _ => {
                    return Err(MemoError::InvalidArgument(format!(
                        "`{}` has no method `{}`",
                        self.class().name(),
                        name
                    )))
                }
            },
        };
        callable.call(&Context::from(self), args)
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.class().name(), self.addr())
    }
}

/// Non-owning handle to an [`Object`]
#[derive(Clone)]
pub struct WeakObject {
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakObject(alive: {})", self.is_alive())
    }
}
