//! Cache key derivation from call arguments

use crate::cache::serialize::ArgSerializer;
use crate::value::{float_bits, Value};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// How arguments are compared when looking up cached results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchMode {
    /// Primitives by value, lists/objects/functions by identity
    Strict,

    /// Arguments compared by their serialized form
    Loose,
}

impl MatchMode {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            MatchMode::Strict
        } else {
            MatchMode::Loose
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::Strict => write!(f, "strict"),
            MatchMode::Loose => write!(f, "loose"),
        }
    }
}

/// Reference value keyed by the address of its allocation.
///
/// The value itself is kept so the address cannot be reused while the key
/// exists.
#[derive(Clone)]
pub struct RefIdentity {
    addr: usize,
    pinned: Value,
}

impl RefIdentity {
    pub fn value(&self) -> &Value {
        &self.pinned
    }
}

impl PartialEq for RefIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for RefIdentity {}

impl Hash for RefIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl fmt::Debug for RefIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.pinned)
    }
}

/// One element of a composite key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    /// Normalized float bits
    Float(u64),
    Str(Arc<str>),
    Ref(RefIdentity),
    /// Loose-mode serialized argument
    Serialized(String),
}

impl KeyPart {
    /// Strict-mode part for a raw argument
    pub fn strict(value: &Value) -> Self {
        match value {
            Value::Undefined => KeyPart::Undefined,
            Value::Null => KeyPart::Null,
            Value::Bool(b) => KeyPart::Bool(*b),
            Value::Int(i) => KeyPart::Int(*i),
            Value::Float(f) => KeyPart::Float(float_bits(*f)),
            Value::Str(s) => KeyPart::Str(s.clone()),
            Value::List(_) | Value::Object(_) | Value::Function(_) => KeyPart::Ref(RefIdentity {
                addr: value.ref_addr().unwrap_or_default(),
                pinned: value.clone(),
            }),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Undefined => write!(f, "undefined"),
            KeyPart::Null => write!(f, "null"),
            KeyPart::Bool(b) => write!(f, "{}", b),
            KeyPart::Int(i) => write!(f, "{}", i),
            KeyPart::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            KeyPart::Str(s) => write!(f, "{:?}", s),
            KeyPart::Ref(r) => write!(f, "{:?}", r),
            KeyPart::Serialized(s) => write!(f, "{}", s),
        }
    }
}

/// Ordered composite key built from one call's arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CacheKey {
    parts: Vec<KeyPart>,
}

impl CacheKey {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// True if a strict part pins `value` by identity
    pub fn references(&self, value: &Value) -> bool {
        self.parts.iter().any(|part| match part {
            KeyPart::Ref(identity) => identity.value().same_value(value),
            _ => false,
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, ")")
    }
}

/// Builds [`CacheKey`]s under one matching mode
#[derive(Clone)]
pub struct KeyBuilder {
    mode: MatchMode,
    serializer: Arc<dyn ArgSerializer>,
}

impl KeyBuilder {
    pub fn new(mode: MatchMode, serializer: Arc<dyn ArgSerializer>) -> Self {
        Self { mode, serializer }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Derive the key for `args`. Pure: arguments are only read.
    pub fn build(&self, args: &[Value]) -> CacheKey {
        build_key(args, self.mode == MatchMode::Strict, self.serializer.as_ref())
    }
}

impl fmt::Debug for KeyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBuilder").field("mode", &self.mode).finish()
    }
}

/// Derive a key from `args`; loose mode maps each argument through `serializer`
pub fn build_key(args: &[Value], strict: bool, serializer: &dyn ArgSerializer) -> CacheKey {
    let parts = if strict {
        args.iter().map(KeyPart::strict).collect()
    } else {
        args.iter()
            .map(|arg| KeyPart::Serialized(serializer.serialize(arg)))
            .collect()
    };
    CacheKey::new(parts)
}
