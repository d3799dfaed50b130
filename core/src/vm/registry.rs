//! file: core/src/vm/registry.rs
//! description: the symbol registry: functions, linked classes, constants.
//!
//! The registry is written while a `VM` is being prepared (bootstrap classes,
//! compiled units, host natives) and frozen before the first instruction
//! runs. After that it is shared read-only between the main context and
//! every launched task. Class linking resolves parents, interfaces and traits
//! once, so runtime lookups never walk declarations.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use crate::ast::{ClassKind, Visibility};
use crate::ir::function::{CompiledClass, CompiledFunction, CompiledUnit, Initializer, PropertyInfo};

use super::error::RegistryError;
use super::native::{NativeFunction, NativeMethodFn};
use super::value::Value;

#[derive(Clone)]
pub enum FunctionEntry {
    User(Arc<CompiledFunction>),
    Native(Arc<dyn NativeFunction>),
}

impl fmt::Debug for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionEntry::User(func) => write!(f, "User({})", func.name),
            FunctionEntry::Native(n) => write!(f, "Native({})", n.name()),
        }
    }
}

#[derive(Clone)]
pub enum MethodImpl {
    User(Arc<CompiledFunction>),
    Native(NativeMethodFn),
}

#[derive(Clone)]
pub struct MethodEntry {
    pub name: String,
    pub imp: MethodImpl,
    /// Class whose scope the body runs in. For trait methods this is the
    /// using class.
    pub declaring: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}()", self.declaring, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct ConstantEntry {
    pub value: Initializer,
    pub declaring: String,
    pub visibility: Visibility,
}

#[derive(Debug, Clone)]
pub struct PropertyEntry {
    pub info: PropertyInfo,
    pub declaring: String,
}

/// A class after linking.
pub struct RuntimeClass {
    pub name: String,
    pub kind: ClassKind,
    pub is_abstract: bool,
    pub is_final: bool,
    pub parent: Option<Arc<RuntimeClass>>,
    /// Lowercased names of this class, its ancestors and every interface it
    /// implements.
    pub lineage: HashSet<String>,
    pub constants: IndexMap<String, ConstantEntry>,
    /// Instance properties, inherited ones first.
    pub properties: IndexMap<String, PropertyEntry>,
    pub static_props: IndexMap<String, PropertyEntry>,
    /// Methods declared here or imported from traits, keyed by lowercase
    /// name. Inherited methods are found by walking `parent`.
    pub methods: IndexMap<String, Arc<MethodEntry>>,
    pub line: u32,
}

impl fmt::Debug for RuntimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class {}", self.name)
    }
}

impl RuntimeClass {
    /// An empty class shell, used by the bootstrap table.
    pub fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        let name = name.into();
        let mut lineage = HashSet::new();
        lineage.insert(name.to_ascii_lowercase());
        RuntimeClass {
            name,
            kind,
            is_abstract: false,
            is_final: false,
            parent: None,
            lineage,
            constants: IndexMap::new(),
            properties: IndexMap::new(),
            static_props: IndexMap::new(),
            methods: IndexMap::new(),
            line: 0,
        }
    }

    /// `instanceof` test against a class or interface name.
    pub fn is_a(&self, name: &str) -> bool {
        self.lineage.contains(&name.to_ascii_lowercase())
    }

    pub fn is_subclass_of(&self, other: &RuntimeClass) -> bool {
        self.lineage.contains(&other.name.to_ascii_lowercase())
    }

    /// Method lookup along the parent chain without the registry cache.
    pub fn resolve_method(&self, lname: &str) -> Option<Arc<MethodEntry>> {
        if let Some(m) = self.methods.get(lname) {
            return Some(Arc::clone(m));
        }
        let mut cur = self.parent.as_ref();
        while let Some(class) = cur {
            if let Some(m) = class.methods.get(lname) {
                return Some(Arc::clone(m));
            }
            cur = class.parent.as_ref();
        }
        None
    }

    /// Names of every class in the parent chain, innermost first.
    pub fn ancestry(&self) -> Vec<&str> {
        let mut out = vec![self.name.as_str()];
        let mut cur = self.parent.as_ref();
        while let Some(class) = cur {
            out.push(class.name.as_str());
            cur = class.parent.as_ref();
        }
        out
    }
}

#[derive(Default)]
pub struct Registry {
    functions: HashMap<String, FunctionEntry>,
    classes: HashMap<String, Arc<RuntimeClass>>,
    constants: HashMap<String, Value>,
    method_cache: RwLock<HashMap<(String, String), Option<Arc<MethodEntry>>>>,
    frozen: bool,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.functions.len())
            .field("classes", &self.classes.len())
            .field("frozen", &self.frozen)
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Dependency {
    Parent,
    Interface,
    Trait,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze(&mut self) {
        if !self.frozen {
            log::debug!("registry frozen: {} functions, {} classes", self.functions.len(), self.classes.len());
        }
        self.frozen = true;
    }

    fn writable(&mut self, what: &str) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError::Frozen(what.to_string()));
        }
        self.method_cache.get_mut().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&FunctionEntry> {
        self.functions.get(&name.trim_start_matches('\\').to_ascii_lowercase())
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn class(&self, name: &str) -> Option<Arc<RuntimeClass>> {
        self.classes.get(name.trim_start_matches('\\')).cloned()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.constants.get(name)
    }

    pub fn define_constant(&mut self, name: &str, value: Value) -> Result<(), RegistryError> {
        self.writable(&format!("constant {}", name))?;
        self.constants.insert(name.to_string(), value);
        Ok(())
    }

    pub fn register_native(&mut self, native: Arc<dyn NativeFunction>) -> Result<(), RegistryError> {
        let name = native.name().to_string();
        self.writable(&format!("function {}()", name))?;
        let key = name.to_ascii_lowercase();
        if self.functions.contains_key(&key) {
            return Err(RegistryError::DuplicateFunction(name));
        }
        log::debug!("registered native {}()", name);
        self.functions.insert(key, FunctionEntry::Native(native));
        Ok(())
    }

    pub fn declare_function(&mut self, func: Arc<CompiledFunction>) -> Result<(), RegistryError> {
        self.writable(&format!("function {}()", func.name))?;
        let key = func.name.to_ascii_lowercase();
        if self.functions.contains_key(&key) {
            return Err(RegistryError::DuplicateFunction(func.name.clone()));
        }
        log::debug!("declared function {}()", func.name);
        self.functions.insert(key, FunctionEntry::User(func));
        Ok(())
    }

    /// Insert an already linked class (bootstrap classes).
    pub fn insert_class(&mut self, class: RuntimeClass) -> Result<Arc<RuntimeClass>, RegistryError> {
        self.writable(&format!("class {}", class.name))?;
        if self.classes.contains_key(&class.name) {
            return Err(RegistryError::DuplicateClass(class.name));
        }
        let class = Arc::new(class);
        self.classes.insert(class.name.clone(), Arc::clone(&class));
        Ok(class)
    }

    fn dependencies(c: &CompiledClass) -> impl Iterator<Item = (Dependency, &str)> {
        c.parent
            .iter()
            .map(|p| (Dependency::Parent, p.as_str()))
            .chain(c.interfaces.iter().map(|i| (Dependency::Interface, i.as_str())))
            .chain(c.traits.iter().map(|t| (Dependency::Trait, t.as_str())))
    }

    fn missing_dependency<'c>(&self, c: &'c CompiledClass) -> Option<(Dependency, &'c str)> {
        Registry::dependencies(c).find(|(_, name)| !self.classes.contains_key(*name))
    }

    fn unknown(kind: Dependency, class: &str, name: &str) -> RegistryError {
        let (class, name) = (class.to_string(), name.to_string());
        match kind {
            Dependency::Parent => RegistryError::UnknownParent { class, parent: name },
            Dependency::Interface => RegistryError::UnknownInterface { class, interface: name },
            Dependency::Trait => RegistryError::UnknownTrait { class, name },
        }
    }

    /// Declare everything a compiled unit hoists. Classes are linked in
    /// dependency order, so a child may appear before its parent.
    pub fn declare_unit(&mut self, unit: &CompiledUnit) -> Result<(), RegistryError> {
        for func in &unit.functions {
            self.declare_function(Arc::clone(func))?;
        }
        let mut pending: Vec<&CompiledClass> = unit.classes.iter().map(|c| c.as_ref()).collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut blocked = Vec::new();
            for class in pending {
                if self.missing_dependency(class).is_none() {
                    self.declare_class(class)?;
                } else {
                    blocked.push(class);
                }
            }
            if blocked.len() == before {
                return Err(self.diagnose_blocked(&blocked));
            }
            pending = blocked;
        }
        Ok(())
    }

    /// Follow missing dependencies through the blocked set until we reach a
    /// name nobody declares, or come back to a class already visited.
    fn diagnose_blocked(&self, blocked: &[&CompiledClass]) -> RegistryError {
        let by_name: HashMap<&str, &CompiledClass> = blocked.iter().map(|c| (c.name.as_str(), *c)).collect();
        let mut seen = HashSet::new();
        let mut cur = blocked[0];
        loop {
            if !seen.insert(cur.name.as_str()) {
                return RegistryError::InheritanceCycle(cur.name.clone());
            }
            let Some((kind, dep)) = self.missing_dependency(cur) else {
                return RegistryError::InheritanceCycle(cur.name.clone());
            };
            match by_name.get(dep) {
                Some(next) => cur = next,
                None => return Registry::unknown(kind, &cur.name, dep),
            }
        }
    }

    pub fn declare_class(&mut self, decl: &CompiledClass) -> Result<Arc<RuntimeClass>, RegistryError> {
        self.writable(&format!("class {}", decl.name))?;
        if self.classes.contains_key(&decl.name) {
            return Err(RegistryError::DuplicateClass(decl.name.clone()));
        }
        let class = self.link(decl)?;
        log::debug!(
            "linked {} {} ({} methods, {} properties)",
            kind_name(class.kind),
            class.name,
            class.methods.len(),
            class.properties.len() + class.static_props.len()
        );
        self.insert_class(class)
    }

    fn lookup_dependency(&self, kind: Dependency, class: &str, name: &str) -> Result<Arc<RuntimeClass>, RegistryError> {
        self.classes.get(name).cloned().ok_or_else(|| Registry::unknown(kind, class, name))
    }

    fn link(&self, decl: &CompiledClass) -> Result<RuntimeClass, RegistryError> {
        let mut class = RuntimeClass::new(decl.name.clone(), decl.kind);
        class.is_abstract = decl.is_abstract || decl.kind != ClassKind::Class;
        class.is_final = decl.is_final;
        class.line = decl.line;

        // interfaces may list their parents either way
        let mut interfaces: Vec<&str> = decl.interfaces.iter().map(String::as_str).collect();
        match (&decl.parent, decl.kind) {
            (Some(p), ClassKind::Interface) => interfaces.insert(0, p.as_str()),
            (Some(p), _) => {
                let parent = self.lookup_dependency(Dependency::Parent, &decl.name, p)?;
                if parent.kind != ClassKind::Class {
                    return Err(RegistryError::Invalid(format!(
                        "Class {} cannot extend {} {}",
                        decl.name,
                        kind_name(parent.kind),
                        parent.name
                    )));
                }
                if parent.is_final {
                    return Err(RegistryError::Invalid(format!(
                        "Class {} cannot extend final class {}",
                        decl.name, parent.name
                    )));
                }
                class.lineage.extend(parent.lineage.iter().cloned());
                class.constants = parent.constants.clone();
                class.properties = parent.properties.clone();
                class.static_props = parent.static_props.clone();
                class.parent = Some(parent);
            }
            (None, _) => {}
        }

        for name in interfaces {
            let iface = self.lookup_dependency(Dependency::Interface, &decl.name, name)?;
            if iface.kind != ClassKind::Interface {
                return Err(RegistryError::Invalid(format!(
                    "{} cannot implement {} - it is not an interface",
                    decl.name, iface.name
                )));
            }
            class.lineage.extend(iface.lineage.iter().cloned());
            for (cname, entry) in &iface.constants {
                class.constants.entry(cname.clone()).or_insert_with(|| entry.clone());
            }
            if decl.kind == ClassKind::Interface {
                for (mname, m) in &iface.methods {
                    class.methods.entry(mname.clone()).or_insert_with(|| Arc::clone(m));
                }
            }
        }

        for c in &decl.constants {
            class.constants.insert(
                c.name.clone(),
                ConstantEntry { value: c.value.clone(), declaring: decl.name.clone(), visibility: c.visibility },
            );
        }
        for p in &decl.properties {
            let entry = PropertyEntry { info: p.clone(), declaring: decl.name.clone() };
            if p.is_static {
                class.static_props.insert(p.name.clone(), entry);
            } else {
                class.properties.insert(p.name.clone(), entry);
            }
        }

        for m in &decl.methods {
            let lname = m.name.to_ascii_lowercase();
            if let Some(parent) = &class.parent {
                if let Some(inherited) = parent.resolve_method(&lname) {
                    if inherited.is_final {
                        return Err(RegistryError::Invalid(format!(
                            "Cannot override final method {}::{}()",
                            inherited.declaring, inherited.name
                        )));
                    }
                }
            }
            class.methods.insert(
                lname,
                Arc::new(MethodEntry {
                    name: m.name.clone(),
                    imp: MethodImpl::User(Arc::clone(&m.func)),
                    declaring: decl.name.clone(),
                    visibility: m.visibility,
                    is_static: m.is_static,
                    is_abstract: m.is_abstract,
                    is_final: m.is_final,
                }),
            );
        }

        for name in &decl.traits {
            let t = self.lookup_dependency(Dependency::Trait, &decl.name, name)?;
            if t.kind != ClassKind::Trait {
                return Err(RegistryError::Invalid(format!("{} cannot use {} - it is not a trait", decl.name, t.name)));
            }
            for (pname, p) in t.properties.iter().chain(t.static_props.iter()) {
                let table = if p.info.is_static { &mut class.static_props } else { &mut class.properties };
                if !decl.properties.iter().any(|own| &own.name == pname) {
                    table.insert(pname.clone(), PropertyEntry { info: p.info.clone(), declaring: decl.name.clone() });
                }
            }
            for (cname, c) in &t.constants {
                class.constants.entry(cname.clone()).or_insert_with(|| ConstantEntry {
                    value: c.value.clone(),
                    declaring: decl.name.clone(),
                    visibility: c.visibility,
                });
            }
            for (mname, m) in &t.methods {
                let own = decl.methods.iter().any(|own| own.name.eq_ignore_ascii_case(mname));
                if own {
                    continue;
                }
                let mut imported = MethodEntry::clone(m);
                imported.declaring = decl.name.clone();
                class.methods.insert(mname.clone(), Arc::new(imported));
            }
        }

        if decl.kind == ClassKind::Class && !decl.is_abstract {
            let missing = self.unimplemented(&class);
            if !missing.is_empty() {
                return Err(RegistryError::Invalid(format!(
                    "Class {} contains {} abstract method{} and must therefore be declared abstract or implement the remaining methods ({})",
                    decl.name,
                    missing.len(),
                    if missing.len() == 1 { "" } else { "s" },
                    missing.join(", ")
                )));
            }
            class.is_abstract = false;
        }
        Ok(class)
    }

    /// Abstract methods reachable from `class` that have no concrete body.
    fn unimplemented(&self, class: &RuntimeClass) -> Vec<String> {
        let mut abstract_methods: IndexMap<String, String> = IndexMap::new();
        let mut note = |m: &MethodEntry, owner: &str| {
            if m.is_abstract {
                abstract_methods.entry(m.name.to_ascii_lowercase()).or_insert_with(|| format!("{}::{}", owner, m.name));
            }
        };
        for m in class.methods.values() {
            note(m, &class.name);
        }
        let mut cur = class.parent.as_ref();
        while let Some(c) = cur {
            for m in c.methods.values() {
                note(m, &c.name);
            }
            cur = c.parent.as_ref();
        }
        let interfaces = self.classes.values().filter(|c| c.kind == ClassKind::Interface);
        for iface in interfaces.filter(|i| class.lineage.contains(&i.name.to_ascii_lowercase())) {
            for m in iface.methods.values() {
                note(m, &iface.name);
            }
        }
        abstract_methods
            .into_iter()
            .filter(|(lname, _)| !class.resolve_method(lname).is_some_and(|m| !m.is_abstract))
            .map(|(_, display)| display)
            .collect()
    }

    /// Cached method resolution. The cache survives until the next write.
    pub fn find_method(&self, class: &Arc<RuntimeClass>, name: &str) -> Option<Arc<MethodEntry>> {
        let key = (class.name.clone(), name.to_ascii_lowercase());
        if let Some(hit) = self.method_cache.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return hit.clone();
        }
        let found = class.resolve_method(&key.1);
        self.method_cache.write().unwrap_or_else(PoisonError::into_inner).insert(key, found.clone());
        found
    }
}

pub(crate) fn kind_name(kind: ClassKind) -> &'static str {
    match kind {
        ClassKind::Class => "class",
        ClassKind::Interface => "interface",
        ClassKind::Trait => "trait",
    }
}
