//! Service identification keys.
//!
//! [`ServiceKey`] uniquely identifies a registration within the container.
//! It is either nominal (a Rust type or an interned name) or composite
//! (an origin plus an ordered list of type arguments, see [`GenericKey`]).

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use khazin_support::rendering::shorten_type_name;

/// A Rust type captured as a hashable value.
///
/// Equality and hashing only look at the [`TypeId`]; the name is kept
/// for error messages.
#[derive(Clone, Copy)]
pub struct TypeTag {
    type_id: TypeId,
    type_name: &'static str,
}

impl TypeTag {
    /// Captures type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Returns the [`TypeId`] of the captured type.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fully qualified type name.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.type_name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shorten_type_name(self.type_name))
    }
}

/// Composite key distinguishing differently-parameterized generic services.
///
/// `Repository<User>` and `Repository<Order>` share an origin but differ
/// in their argument lists, so they are distinct keys.
///
/// # Examples
/// ```
/// use khazin_container::key::GenericKey;
///
/// struct User;
/// struct Order;
///
/// let users = GenericKey::new("Repository").arg::<User>();
/// let orders = GenericKey::new("Repository").arg::<Order>();
/// assert_ne!(users, orders);
/// assert_eq!(users, GenericKey::new("Repository").arg::<User>());
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GenericKey {
    origin: Arc<str>,
    args: Vec<TypeTag>,
}

impl GenericKey {
    /// Starts a composite key with no type arguments.
    pub fn new(origin: impl Into<Arc<str>>) -> Self {
        Self {
            origin: origin.into(),
            args: Vec::new(),
        }
    }

    /// Appends the type argument `T`.
    pub fn arg<T: ?Sized + 'static>(mut self) -> Self {
        self.args.push(TypeTag::of::<T>());
        self
    }

    /// Appends an already captured type argument.
    pub fn with_arg(mut self, tag: TypeTag) -> Self {
        self.args.push(tag);
        self
    }

    /// Returns the origin identifier.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Returns the ordered type arguments.
    pub fn args(&self) -> &[TypeTag] {
        &self.args
    }
}

impl fmt::Display for GenericKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(ToString::to_string).collect();
        write!(f, "{}<{}>", self.origin, args.join(", "))
    }
}

impl fmt::Debug for GenericKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericKey({self})")
    }
}

/// Uniquely identifies a registration in the container.
///
/// # Examples
/// ```
/// use khazin_container::key::ServiceKey;
///
/// // Nominal key from a type
/// let key = ServiceKey::of::<String>();
/// assert_eq!(key.to_string(), "String");
///
/// // Nominal key from a name
/// let primary = ServiceKey::named("primary_db");
/// let replica = ServiceKey::named("replica_db");
/// assert_ne!(primary, replica);
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ServiceKey {
    /// Keyed by a Rust type.
    Type(TypeTag),
    /// Keyed by an interned name.
    Named(Arc<str>),
    /// Keyed by an origin plus type arguments.
    Generic(GenericKey),
}

impl ServiceKey {
    /// Creates a key for type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type(TypeTag::of::<T>())
    }

    /// Creates a named key.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::Named(name.into())
    }

    /// Creates a composite key.
    pub fn generic(key: GenericKey) -> Self {
        Self::Generic(key)
    }

    /// Returns the captured type when this is a type key.
    pub fn type_tag(&self) -> Option<TypeTag> {
        match self {
            Self::Type(tag) => Some(*tag),
            _ => None,
        }
    }

    /// Returns the name when this is a named key.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            _ => None,
        }
    }

    /// Full, unshortened label used for similarity suggestions.
    pub fn label(&self) -> String {
        match self {
            Self::Type(tag) => tag.type_name().to_string(),
            Self::Named(name) => name.to_string(),
            Self::Generic(key) => key.to_string(),
        }
    }
}

impl From<&str> for ServiceKey {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for ServiceKey {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

impl From<GenericKey> for ServiceKey {
    fn from(key: GenericKey) -> Self {
        Self::Generic(key)
    }
}

impl From<TypeTag> for ServiceKey {
    fn from(tag: TypeTag) -> Self {
        Self::Type(tag)
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(tag) => write!(f, "ServiceKey({})", tag.type_name()),
            Self::Named(name) => write!(f, "ServiceKey({name:?})"),
            Self::Generic(key) => write!(f, "ServiceKey({key})"),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(tag) => write!(f, "{tag}"),
            Self::Named(name) => f.write_str(name),
            Self::Generic(key) => write!(f, "{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Mailer;
    struct User;
    struct Order;

    #[test]
    fn key_of_type() {
        let key = ServiceKey::of::<Mailer>();
        assert_eq!(key.to_string(), "Mailer");
        assert!(key.label().contains("key::tests::Mailer"));
        assert_eq!(key.name(), None);
    }

    #[test]
    fn key_equality_same_type() {
        assert_eq!(ServiceKey::of::<String>(), ServiceKey::of::<String>());
    }

    #[test]
    fn key_inequality_different_types() {
        assert_ne!(ServiceKey::of::<String>(), ServiceKey::of::<i32>());
    }

    #[test]
    fn named_keys_compare_by_name() {
        assert_eq!(ServiceKey::named("db"), ServiceKey::from("db"));
        assert_ne!(ServiceKey::named("a"), ServiceKey::named("b"));
    }

    #[test]
    fn named_vs_type_different() {
        assert_ne!(ServiceKey::named("String"), ServiceKey::of::<String>());
    }

    #[test]
    fn generic_keys_differ_by_arguments() {
        let users = ServiceKey::generic(GenericKey::new("Repository").arg::<User>());
        let orders = ServiceKey::generic(GenericKey::new("Repository").arg::<Order>());
        assert_ne!(users, orders);
        assert_eq!(users.to_string(), "Repository<User>");
    }

    #[test]
    fn generic_argument_order_matters() {
        let ab = GenericKey::new("Pair").arg::<User>().arg::<Order>();
        let ba = GenericKey::new("Pair").arg::<Order>().arg::<User>();
        assert_ne!(ab, ba);
    }

    #[test]
    fn key_in_hashmap() {
        let mut map = HashMap::new();
        map.insert(ServiceKey::of::<String>(), "string");
        map.insert(ServiceKey::named("config"), "config");
        assert_eq!(map.get(&ServiceKey::of::<String>()), Some(&"string"));
        assert_eq!(map.get(&ServiceKey::from("config")), Some(&"config"));
        assert_eq!(map.get(&ServiceKey::of::<bool>()), None);
    }

    #[test]
    fn unsized_type_key() {
        trait Clock {}
        let _key = ServiceKey::of::<dyn Clock>();
    }
}
