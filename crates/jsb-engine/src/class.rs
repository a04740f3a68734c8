//! Object classes.

/// Finalize hook, called with the object's private slot after it is swept.
pub type FinalizeOp<H> = fn(&mut H, u64);

/// Index into the engine's class registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    pub const OBJECT: ClassId = ClassId(0);
    pub const ARRAY: ClassId = ClassId(1);
    pub const FUNCTION: ClassId = ClassId(2);
    pub const GLOBAL: ClassId = ClassId(3);
}

/// Class definition registered with an engine
pub struct ClassSpec<H> {
    /// Class name (diagnostics only)
    pub name: &'static str,
    /// Objects of this class carry a private `u64` slot
    pub has_private: bool,
    /// Called once per swept object whose private slot is set
    pub finalize: Option<FinalizeOp<H>>,
}

impl<H> ClassSpec<H> {
    /// Class without private data or finalizer
    pub fn plain(name: &'static str) -> Self {
        Self {
            name,
            has_private: false,
            finalize: None,
        }
    }

    /// Class whose objects report their collection through `finalize`
    pub fn with_finalizer(name: &'static str, finalize: FinalizeOp<H>) -> Self {
        Self {
            name,
            has_private: true,
            finalize: Some(finalize),
        }
    }
}

/// Registered classes, indexed by `ClassId`.
pub(crate) struct ClassRegistry<H> {
    classes: Vec<ClassSpec<H>>,
}

impl<H> ClassRegistry<H> {
    pub(crate) fn with_builtins() -> Self {
        let mut registry = Self {
            classes: Vec::with_capacity(8),
        };
        registry.register(ClassSpec::plain("Object"));
        registry.register(ClassSpec::plain("Array"));
        registry.register(ClassSpec::plain("Function"));
        registry.register(ClassSpec::plain("global"));
        registry
    }

    pub(crate) fn register(&mut self, spec: ClassSpec<H>) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(spec);
        id
    }

    pub(crate) fn get(&self, id: ClassId) -> Option<&ClassSpec<H>> {
        self.classes.get(id.0 as usize)
    }

    pub(crate) fn finalizer(&self, id: ClassId) -> Option<FinalizeOp<H>> {
        self.get(id).and_then(|c| c.finalize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(host: &mut u32, _private: u64) {
        *host += 1;
    }

    #[test]
    fn test_builtin_ids() {
        let registry: ClassRegistry<()> = ClassRegistry::with_builtins();
        assert_eq!(registry.get(ClassId::OBJECT).map(|c| c.name), Some("Object"));
        assert_eq!(registry.get(ClassId::GLOBAL).map(|c| c.name), Some("global"));
    }

    #[test]
    fn test_register_finalizer_class() {
        let mut registry: ClassRegistry<u32> = ClassRegistry::with_builtins();
        let id = registry.register(ClassSpec::with_finalizer("companion", count));

        let op = registry.finalizer(id).expect("finalizer registered");
        let mut calls = 0;
        op(&mut calls, 7);
        assert_eq!(calls, 1);
        assert!(registry.get(id).map(|c| c.has_private).unwrap_or(false));
        assert!(registry.finalizer(ClassId::OBJECT).is_none());
    }
}
