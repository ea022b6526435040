use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::types::constant_pool::ConstantPool;
use crate::types::{ClassDef, ClassInfo, MethodInfo};
use crate::value::string;
use crate::vm::VmError;

/// The loaded-class table.
///
/// Classes are defined once and looked up by internal name. Superclasses must
/// be defined before their subclasses so the chain can be resolved eagerly.
pub struct ClassRegistry {
    classes: RefCell<HashMap<String, Rc<ClassInfo>>>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self {
            classes: RefCell::new(HashMap::new()),
        }
    }

    /// A registry preloaded with `java/lang/Object` and `java/lang/String`.
    ///
    /// These two are enough to allocate string instances and root every other
    /// superclass chain. Both are marked initialized up front since neither
    /// carries a static initializer here.
    pub fn bootstrap() -> Self {
        let registry = Self::new();
        let object = Rc::new(ClassInfo::new(
            "java/lang/Object".to_owned(),
            None,
            vec![],
            Rc::new(ConstantPool::new()),
        ));
        object.initialized.set(true);
        object.init_statics();
        let string_class = Rc::new(ClassInfo::new(
            string::STRING_CLASS.to_owned(),
            Some(Rc::clone(&object)),
            vec![],
            Rc::new(ConstantPool::new()),
        ));
        string_class.initialized.set(true);
        string_class.init_statics();

        let mut classes = registry.classes.borrow_mut();
        classes.insert(object.name.clone(), object);
        classes.insert(string_class.name.clone(), string_class);
        drop(classes);
        registry
    }

    /// Defines a new class from raw parts, resolving its superclass by name.
    pub fn define(&self, def: ClassDef) -> Result<Rc<ClassInfo>, VmError> {
        if self.classes.borrow().contains_key(&def.name) {
            return Err(VmError::DuplicateClass(def.name));
        }
        let super_class = match &def.super_name {
            Some(name) => Some(self.by_name(name)?),
            None => None,
        };

        let pool = Rc::new(def.pool);
        let methods = def
            .methods
            .into_iter()
            .map(|m| {
                Rc::new(MethodInfo {
                    class_name: def.name.clone(),
                    name: m.name,
                    descriptor: m.descriptor,
                    is_static: m.is_static,
                    max_locals: m.max_locals,
                    code: m.code,
                    pool: Rc::clone(&pool),
                })
            })
            .collect();

        let class = Rc::new(ClassInfo::new(def.name, super_class, methods, pool));
        self.classes
            .borrow_mut()
            .insert(class.name.clone(), Rc::clone(&class));
        Ok(class)
    }

    pub fn by_name(&self, name: &str) -> Result<Rc<ClassInfo>, VmError> {
        self.classes
            .borrow()
            .get(name)
            .map(Rc::clone)
            .ok_or_else(|| VmError::ClassNotFound(name.to_owned()))
    }

    /// Resolves a method through a class's superclass chain.
    pub fn lookup_method(
        &self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<Rc<MethodInfo>, VmError> {
        let class = self.by_name(class_name)?;
        class
            .find_method(name, descriptor)
            .ok_or_else(|| VmError::MethodNotFound {
                class: class_name.to_owned(),
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
            })
    }
}
