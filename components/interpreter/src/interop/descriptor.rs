//! Member tables for host types

use std::marker::PhantomData;
use std::sync::Arc;

use core_types::{
    CallArgs, Callback, ExecutionContext, ScriptError, UserData, UserDataDescriptor, Value,
};
use indexmap::IndexMap;

type Getter<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&T, Value) -> Result<(), ScriptError> + Send + Sync>;
type Method<T> =
    Arc<dyn Fn(&mut dyn ExecutionContext, &T, CallArgs) -> Result<Value, ScriptError> + Send + Sync>;
type IndexFallback<T> = Arc<dyn Fn(&T, &str) -> Option<Value> + Send + Sync>;
type NewIndexFallback<T> = Arc<dyn Fn(&T, &str, Value) -> bool + Send + Sync>;
type Display<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// A host type that can be exposed to scripts
///
/// # Examples
///
/// ```
/// use interpreter::interop::{DescriptorBuilder, UserDataType};
/// use core_types::Value;
/// use parking_lot::Mutex;
///
/// struct Counter(Mutex<i64>);
///
/// impl UserDataType for Counter {
///     fn type_name() -> &'static str {
///         "Counter"
///     }
///
///     fn describe(builder: &mut DescriptorBuilder<Self>) {
///         builder
///             .property("value", |c| Value::from(*c.0.lock()))
///             .method("bump", |_ctx, c, _args| {
///                 *c.0.lock() += 1;
///                 Ok(Value::void())
///             });
///     }
/// }
/// ```
pub trait UserDataType: Send + Sync + Sized + 'static {
    /// Name shown in error messages
    fn type_name() -> &'static str;

    /// Declare the members scripts can reach
    fn describe(builder: &mut DescriptorBuilder<Self>);
}

enum Member<T> {
    Property {
        get: Getter<T>,
        set: Option<Setter<T>>,
    },
    Method(Method<T>),
}

/// Collects the members of a host type
pub struct DescriptorBuilder<T> {
    members: IndexMap<String, Member<T>>,
    index_fallback: Option<IndexFallback<T>>,
    newindex_fallback: Option<NewIndexFallback<T>>,
    display: Option<Display<T>>,
}

impl<T: Send + Sync + 'static> DescriptorBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            members: IndexMap::new(),
            index_fallback: None,
            newindex_fallback: None,
            display: None,
        }
    }

    /// Read-only property
    pub fn property<G>(&mut self, name: &str, get: G) -> &mut Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.members.insert(
            name.to_string(),
            Member::Property {
                get: Arc::new(get),
                set: None,
            },
        );
        self
    }

    /// Read-write property
    pub fn property_rw<G, S>(&mut self, name: &str, get: G, set: S) -> &mut Self
    where
        G: Fn(&T) -> Value + Send + Sync + 'static,
        S: Fn(&T, Value) -> Result<(), ScriptError> + Send + Sync + 'static,
    {
        self.members.insert(
            name.to_string(),
            Member::Property {
                get: Arc::new(get),
                set: Some(Arc::new(set)),
            },
        );
        self
    }

    /// Method callable as `obj.name(...)` or `obj:name(...)`
    pub fn method<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut dyn ExecutionContext, &T, CallArgs) -> Result<Value, ScriptError>
            + Send
            + Sync
            + 'static,
    {
        self.members
            .insert(name.to_string(), Member::Method(Arc::new(f)));
        self
    }

    /// Consulted for string keys that name no member
    pub fn index_fallback<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&T, &str) -> Option<Value> + Send + Sync + 'static,
    {
        self.index_fallback = Some(Arc::new(f));
        self
    }

    /// Consulted for assignments to string keys that name no member;
    /// returns whether the assignment was accepted
    pub fn newindex_fallback<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&T, &str, Value) -> bool + Send + Sync + 'static,
    {
        self.newindex_fallback = Some(Arc::new(f));
        self
    }

    /// `tostring` text
    pub fn display<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.display = Some(Arc::new(f));
        self
    }

    pub(crate) fn build(self, type_name: &str) -> TypeDescriptor<T> {
        TypeDescriptor {
            type_name: type_name.to_string(),
            members: self.members,
            index_fallback: self.index_fallback,
            newindex_fallback: self.newindex_fallback,
            display: self.display,
            _type: PhantomData,
        }
    }
}

/// Member table of one registered host type
pub struct TypeDescriptor<T> {
    type_name: String,
    members: IndexMap<String, Member<T>>,
    index_fallback: Option<IndexFallback<T>>,
    newindex_fallback: Option<NewIndexFallback<T>>,
    display: Option<Display<T>>,
    _type: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> TypeDescriptor<T> {
    /// Build the descriptor of a host type
    pub fn of() -> Self
    where
        T: UserDataType,
    {
        let mut builder = DescriptorBuilder::new();
        T::describe(&mut builder);
        builder.build(T::type_name())
    }

    /// Member names in declaration order
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    fn target<'u>(&self, object: &'u UserData) -> Result<&'u T, ScriptError> {
        object.downcast_ref::<T>().ok_or_else(|| {
            ScriptError::runtime(format!("userdata is not a {}", self.type_name))
        })
    }
}

fn bind_method<T: Send + Sync + 'static>(
    name: &str,
    type_name: &str,
    method: Method<T>,
    this: UserData,
) -> Value {
    let type_name = type_name.to_string();
    Value::Callback(Callback::new(name, move |ctx, args| {
        // `obj:m(...)` passes the receiver, `obj.m(...)` does not
        let args = match args.raw(0) {
            Some(Value::UserData(first)) if first.ptr_eq(&this) => args.skip(1),
            _ => args,
        };
        let target = this
            .downcast_ref::<T>()
            .ok_or_else(|| ScriptError::runtime(format!("userdata is not a {}", type_name)))?;
        method(ctx, target, args)
    }))
}

impl<T: Send + Sync + 'static> UserDataDescriptor for TypeDescriptor<T> {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn index(&self, object: &UserData, key: &Value) -> Result<Option<Value>, ScriptError> {
        let Some(name) = key.as_str() else {
            return Ok(None);
        };
        let target = self.target(object)?;
        match self.members.get(name) {
            Some(Member::Property { get, .. }) => Ok(Some(get(target))),
            Some(Member::Method(method)) => Ok(Some(bind_method(
                name,
                &self.type_name,
                method.clone(),
                object.clone(),
            ))),
            None => Ok(self.index_fallback.as_ref().and_then(|f| f(target, name))),
        }
    }

    fn set_index(
        &self,
        object: &UserData,
        key: &Value,
        value: Value,
    ) -> Result<bool, ScriptError> {
        let Some(name) = key.as_str() else {
            return Ok(false);
        };
        let target = self.target(object)?;
        match self.members.get(name) {
            Some(Member::Property { set: Some(set), .. }) => {
                set(target, value)?;
                Ok(true)
            }
            Some(Member::Property { set: None, .. }) => Err(ScriptError::runtime(format!(
                "property '{}' of userdata<{}> is read-only",
                name, self.type_name
            ))),
            Some(Member::Method(_)) => Ok(false),
            None => Ok(self
                .newindex_fallback
                .as_ref()
                .is_some_and(|f| f(target, name, value))),
        }
    }

    fn as_string(&self, object: &UserData) -> Option<String> {
        let display = self.display.as_ref()?;
        object.downcast_ref::<T>().map(|target| display(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Lamp {
        lit: Mutex<bool>,
    }

    impl UserDataType for Lamp {
        fn type_name() -> &'static str {
            "Lamp"
        }

        fn describe(builder: &mut DescriptorBuilder<Self>) {
            builder
                .property_rw(
                    "lit",
                    |l| Value::Boolean(*l.lit.lock()),
                    |l, v| {
                        *l.lit.lock() = v.is_truthy();
                        Ok(())
                    },
                )
                .property("kind", |_| Value::from("lamp"))
                .display(|l| format!("Lamp({})", *l.lit.lock()));
        }
    }

    fn lamp() -> (Arc<TypeDescriptor<Lamp>>, UserData) {
        let descriptor = Arc::new(TypeDescriptor::<Lamp>::of());
        let object = UserData::new(
            descriptor.clone(),
            Arc::new(Lamp {
                lit: Mutex::new(false),
            }),
        );
        (descriptor, object)
    }

    #[test]
    fn test_properties() {
        let (descriptor, object) = lamp();
        assert!(descriptor
            .set_index(&object, &Value::from("lit"), Value::Boolean(true))
            .unwrap());
        let lit = descriptor.index(&object, &Value::from("lit")).unwrap();
        assert!(lit.is_some_and(|v| v.is_truthy()));
        assert_eq!(descriptor.as_string(&object).as_deref(), Some("Lamp(true)"));
    }

    #[test]
    fn test_read_only_property() {
        let (descriptor, object) = lamp();
        let err = descriptor
            .set_index(&object, &Value::from("kind"), Value::Nil)
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_unknown_member() {
        let (descriptor, object) = lamp();
        assert!(descriptor.index(&object, &Value::from("nope")).unwrap().is_none());
        assert!(!descriptor
            .set_index(&object, &Value::from("nope"), Value::Nil)
            .unwrap());
        assert_eq!(descriptor.member_names().collect::<Vec<_>>(), vec!["lit", "kind"]);
    }
}
