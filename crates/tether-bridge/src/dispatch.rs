//! Dispatch tables and the class registry
//!
//! Every exposed native type gets one [`DispatchTable`], stored in a
//! [`ClassRegistry`] arena and addressed by [`ClassId`]. A table holds two
//! member sets (instance and static scope), each with methods, property
//! getters and property setters, plus an optional parent link.
//!
//! # Inheritance
//!
//! Parent links are plain ids into the same arena. The chain is kept acyclic
//! by an explicit check in [`ClassRegistry::set_parent`], so walking it always
//! terminates at a table without a parent.
//!
//! Native inheritance is modelled with [`Inherits`]: a derived type that can
//! hand out its parent part. `register_derived::<D, P>` records that cast on
//! the derived table, which lets a method registered on `P` run against a `D`
//! receiver.
//!
//! # Views
//!
//! Resolution looks at a table through a [`View`]:
//!
//! ```text
//! Instance  instance members, everything visible
//! Const     instance members minus mutating methods, no setter table at all
//! Static    static members
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::callable::Callable;
use crate::error::{BridgeError, BridgeResult};
use crate::logging::debug;

/// Index of a dispatch table in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(usize);

impl ClassId {
    /// Create a class id from a raw index
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw index
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Member scope used at installation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Members reached through object proxies
    Instance,
    /// Members reached through the class proxy
    Static,
}

/// How a proxy sees its class chain during resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Mutable object proxy
    Instance,
    /// Proxy created from a const reference
    Const,
    /// Class proxy
    Static,
}

// ============================================================================
// Native inheritance
// ============================================================================

/// Native single inheritance: `Self` embeds a `P` it can expose.
///
/// ```ignore
/// struct Base { x: i32 }
/// struct Derived { base: Base, y: i32 }
///
/// impl Inherits<Base> for Derived {
///     fn parent(&self) -> &Base { &self.base }
///     fn parent_mut(&mut self) -> &mut Base { &mut self.base }
/// }
/// ```
pub trait Inherits<P> {
    /// Shared access to the parent part
    fn parent(&self) -> &P;

    /// Mutable access to the parent part
    fn parent_mut(&mut self) -> &mut P;
}

/// Type-erased cast from a table's native type to its parent's
#[derive(Clone, Copy)]
pub struct Upcast {
    target: TypeId,
    cast_mut: for<'a> fn(&'a mut (dyn Any + 'static)) -> Option<&'a mut (dyn Any + 'static)>,
    cast_ref: for<'a> fn(&'a (dyn Any + 'static)) -> Option<&'a (dyn Any + 'static)>,
}

fn cast_parent_mut<'a, D, P>(object: &'a mut (dyn Any + 'static)) -> Option<&'a mut (dyn Any + 'static)>
where
    D: Inherits<P> + 'static,
    P: 'static,
{
    let derived = object.downcast_mut::<D>()?;
    Some(derived.parent_mut() as &mut (dyn Any + 'static))
}

fn cast_parent_ref<'a, D, P>(object: &'a (dyn Any + 'static)) -> Option<&'a (dyn Any + 'static)>
where
    D: Inherits<P> + 'static,
    P: 'static,
{
    let derived = object.downcast_ref::<D>()?;
    Some(derived.parent() as &(dyn Any + 'static))
}

impl Upcast {
    fn of<D: Inherits<P> + 'static, P: 'static>() -> Self {
        Self {
            target: TypeId::of::<P>(),
            cast_mut: cast_parent_mut::<D, P>,
            cast_ref: cast_parent_ref::<D, P>,
        }
    }

    /// Native type this cast produces
    pub fn target(&self) -> TypeId {
        self.target
    }

    /// Cast a mutable receiver one level up
    pub fn apply_mut<'a>(&self, object: &'a mut (dyn Any + 'static)) -> Option<&'a mut (dyn Any + 'static)> {
        (self.cast_mut)(object)
    }

    /// Cast a shared receiver one level up
    pub fn apply_ref<'a>(&self, object: &'a (dyn Any + 'static)) -> Option<&'a (dyn Any + 'static)> {
        (self.cast_ref)(object)
    }
}

impl fmt::Debug for Upcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upcast").field("target", &self.target).finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct NativeType {
    type_id: TypeId,
    type_name: &'static str,
}

impl NativeType {
    fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

// ============================================================================
// DispatchTable
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Slot {
    Method,
    Getter,
    Setter,
}

/// Symbol maps for one scope
#[derive(Default)]
pub struct MemberSet {
    methods: FxHashMap<String, Rc<Callable>>,
    getters: FxHashMap<String, Rc<Callable>>,
    setters: FxHashMap<String, Rc<Callable>>,
}

impl MemberSet {
    /// Method by symbol
    pub fn method(&self, symbol: &str) -> Option<&Rc<Callable>> {
        self.methods.get(symbol)
    }

    /// Property getter by symbol
    pub fn getter(&self, symbol: &str) -> Option<&Rc<Callable>> {
        self.getters.get(symbol)
    }

    /// Property setter by symbol
    pub fn setter(&self, symbol: &str) -> Option<&Rc<Callable>> {
        self.setters.get(symbol)
    }

    fn map_mut(&mut self, slot: Slot) -> &mut FxHashMap<String, Rc<Callable>> {
        match slot {
            Slot::Method => &mut self.methods,
            Slot::Getter => &mut self.getters,
            Slot::Setter => &mut self.setters,
        }
    }

    /// Number of installed members
    pub fn len(&self) -> usize {
        self.methods.len() + self.getters.len() + self.setters.len()
    }

    /// Whether no member is installed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for MemberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberSet")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("getters", &self.getters.keys().collect::<Vec<_>>())
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Per-class member tables plus the parent link
#[derive(Debug)]
pub struct DispatchTable {
    id: ClassId,
    name: String,
    native: Option<NativeType>,
    parent: Option<ClassId>,
    upcast: Option<Upcast>,
    instance: MemberSet,
    statics: MemberSet,
}

impl DispatchTable {
    /// Id of this table
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent table, if any
    pub fn parent(&self) -> Option<ClassId> {
        self.parent
    }

    /// Native type wrapped by this class
    pub fn native_type(&self) -> Option<TypeId> {
        self.native.map(|n| n.type_id)
    }

    /// Cast recorded by `register_derived` from this class's native type to
    /// its parent's. It only applies while the parent wraps the cast's target.
    pub fn upcast(&self) -> Option<&Upcast> {
        self.upcast.as_ref()
    }

    /// Members of one scope
    pub fn members(&self, scope: Scope) -> &MemberSet {
        match scope {
            Scope::Instance => &self.instance,
            Scope::Static => &self.statics,
        }
    }

    fn members_mut(&mut self, scope: Scope) -> &mut MemberSet {
        match scope {
            Scope::Instance => &mut self.instance,
            Scope::Static => &mut self.statics,
        }
    }

    /// Method visible through `view`
    pub fn method(&self, view: View, symbol: &str) -> Option<&Rc<Callable>> {
        match view {
            View::Instance => self.instance.method(symbol),
            View::Const => self.instance.method(symbol).filter(|m| m.is_const_safe()),
            View::Static => self.statics.method(symbol),
        }
    }

    /// Getter visible through `view`
    pub fn getter(&self, view: View, symbol: &str) -> Option<&Rc<Callable>> {
        match view {
            View::Instance | View::Const => self.instance.getter(symbol),
            View::Static => self.statics.getter(symbol),
        }
    }

    /// Setter table for `view`. Const views have none.
    pub fn setters(&self, view: View) -> Option<&MemberSet> {
        match view {
            View::Instance => Some(&self.instance),
            View::Const => None,
            View::Static => Some(&self.statics),
        }
    }
}

// ============================================================================
// ClassRegistry
// ============================================================================

/// Arena of dispatch tables
#[derive(Debug, Default)]
pub struct ClassRegistry {
    tables: Vec<DispatchTable>,
    name_to_id: FxHashMap<String, ClassId>,
    type_to_id: FxHashMap<TypeId, ClassId>,
}

impl ClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn push_table(
        &mut self,
        name: &str,
        native: Option<NativeType>,
        parent: Option<ClassId>,
        upcast: Option<Upcast>,
    ) -> BridgeResult<ClassId> {
        if self.name_to_id.contains_key(name) {
            return Err(BridgeError::DuplicateClass(name.to_string()));
        }
        if let Some(native) = native.filter(|n| self.type_to_id.contains_key(&n.type_id)) {
            return Err(BridgeError::DuplicateClass(native.type_name.to_string()));
        }
        if let Some(parent) = parent {
            self.table(parent)?;
        }

        let id = ClassId(self.tables.len());
        self.tables.push(DispatchTable {
            id,
            name: name.to_string(),
            native,
            parent,
            upcast,
            instance: MemberSet::default(),
            statics: MemberSet::default(),
        });
        self.name_to_id.insert(name.to_string(), id);
        if let Some(native) = native {
            self.type_to_id.insert(native.type_id, id);
        }

        debug!(class = name, id = id.index(), ?parent, "created dispatch table");
        Ok(id)
    }

    /// Create a table that wraps no native type.
    ///
    /// A fresh table cannot close a cycle, so only the parent's existence is checked.
    pub fn create_table(&mut self, name: &str, parent: Option<ClassId>) -> BridgeResult<ClassId> {
        self.push_table(name, None, parent, None)
    }

    /// Register the class for native type `T`.
    ///
    /// # Errors
    ///
    /// `DuplicateClass` if the name or the type is already registered.
    pub fn register_type<T: 'static>(&mut self, name: &str) -> BridgeResult<ClassId> {
        self.push_table(name, Some(NativeType::of::<T>()), None, None)
    }

    /// Register the class for `D`, deriving from the class registered for `P`.
    ///
    /// # Errors
    ///
    /// `ParentMismatch` if `parent` does not wrap `P`.
    pub fn register_derived<D, P>(&mut self, name: &str, parent: ClassId) -> BridgeResult<ClassId>
    where
        D: Inherits<P> + 'static,
        P: 'static,
    {
        let parent_table = self.table(parent)?;
        if parent_table.native_type() != Some(TypeId::of::<P>()) {
            return Err(BridgeError::ParentMismatch {
                parent: parent_table.name.clone(),
                expected: std::any::type_name::<P>(),
            });
        }
        self.push_table(
            name,
            Some(NativeType::of::<D>()),
            Some(parent),
            Some(Upcast::of::<D, P>()),
        )
    }

    /// Relink `class` under `parent`, or detach it with `None`.
    ///
    /// A native upcast recorded by `register_derived` stays with the class and
    /// is used again whenever the parent wraps its target type.
    ///
    /// # Errors
    ///
    /// `CyclicInheritance` if `class` is `parent` or one of its ancestors.
    pub fn set_parent(&mut self, class: ClassId, parent: Option<ClassId>) -> BridgeResult<()> {
        self.table(class)?;
        if let Some(parent) = parent {
            self.table(parent)?;
            if self.chain(parent).any(|table| table.id == class) {
                return Err(BridgeError::CyclicInheritance {
                    class: self.tables[class.0].name.clone(),
                    parent: self.tables[parent.0].name.clone(),
                });
            }
        }

        self.tables[class.0].parent = parent;
        Ok(())
    }

    // ========================================================================
    // Member installation
    // ========================================================================

    fn install(
        &mut self,
        class: ClassId,
        scope: Scope,
        symbol: &str,
        callable: Callable,
        slot: Slot,
    ) -> BridgeResult<()> {
        let table = self
            .tables
            .get_mut(class.0)
            .ok_or(BridgeError::UnknownClass(class.0))?;
        debug!(class = %table.name, ?scope, ?slot, symbol, "installed member");
        table
            .members_mut(scope)
            .map_mut(slot)
            .insert(symbol.to_string(), Rc::new(callable));
        Ok(())
    }

    /// Install a method. An existing entry with the same symbol is replaced.
    pub fn install_method(
        &mut self,
        class: ClassId,
        scope: Scope,
        symbol: &str,
        callable: Callable,
    ) -> BridgeResult<()> {
        self.install(class, scope, symbol, callable, Slot::Method)
    }

    /// Install a property getter
    pub fn install_getter(
        &mut self,
        class: ClassId,
        scope: Scope,
        symbol: &str,
        callable: Callable,
    ) -> BridgeResult<()> {
        self.install(class, scope, symbol, callable, Slot::Getter)
    }

    /// Install a property setter
    pub fn install_setter(
        &mut self,
        class: ClassId,
        scope: Scope,
        symbol: &str,
        callable: Callable,
    ) -> BridgeResult<()> {
        self.install(class, scope, symbol, callable, Slot::Setter)
    }

    /// Install a property. Without a setter, writes fail with `ReadOnly`.
    pub fn install_property(
        &mut self,
        class: ClassId,
        scope: Scope,
        symbol: &str,
        getter: Callable,
        setter: Option<Callable>,
    ) -> BridgeResult<()> {
        let setter = setter.unwrap_or_else(|| Callable::read_only(symbol));
        self.install_getter(class, scope, symbol, getter)?;
        self.install_setter(class, scope, symbol, setter)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Table by id
    pub fn get(&self, id: ClassId) -> Option<&DispatchTable> {
        self.tables.get(id.0)
    }

    /// Table by id, as a result
    pub fn table(&self, id: ClassId) -> BridgeResult<&DispatchTable> {
        self.get(id).ok_or(BridgeError::UnknownClass(id.0))
    }

    /// Class id by name
    pub fn by_name(&self, name: &str) -> Option<ClassId> {
        self.name_to_id.get(name).copied()
    }

    /// Class registered for a native type
    pub fn class_of_type(&self, type_id: TypeId) -> Option<ClassId> {
        self.type_to_id.get(&type_id).copied()
    }

    /// Class registered for `T`
    pub fn class_of<T: 'static>(&self) -> Option<ClassId> {
        self.class_of_type(TypeId::of::<T>())
    }

    /// Walk from `class` to the root of its chain, `class` first
    pub fn chain(&self, class: ClassId) -> Chain<'_> {
        Chain {
            registry: self,
            next: Some(class),
        }
    }

    /// Casts that turn an object of `class`'s native type into a `target`.
    ///
    /// Empty when the class wraps `target` itself, `None` when no registered
    /// cast path reaches it.
    pub fn upcasts(&self, class: ClassId, target: TypeId) -> Option<Vec<Upcast>> {
        let mut path = Vec::new();
        for table in self.chain(class) {
            if table.native_type() == Some(target) {
                return Some(path);
            }
            let upcast = table.upcast()?;
            let parent = self.get(table.parent()?)?;
            if parent.native_type() != Some(upcast.target()) {
                return None;
            }
            path.push(*upcast);
        }
        None
    }

    /// Number of tables
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterate over all tables
    pub fn iter(&self) -> impl Iterator<Item = &DispatchTable> {
        self.tables.iter()
    }
}

/// Iterator over a parent chain
pub struct Chain<'r> {
    registry: &'r ClassRegistry,
    next: Option<ClassId>,
}

impl<'r> Iterator for Chain<'r> {
    type Item = &'r DispatchTable;

    fn next(&mut self) -> Option<Self::Item> {
        let table = self.registry.get(self.next?)?;
        self.next = table.parent;
        Some(table)
    }
}
