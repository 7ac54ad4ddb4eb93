//! Finalizer list editing. The list is a `Vec` for wire fidelity; uniqueness
//! is kept by [`ResourceDefinition::add_finalizer`].

use crate::ResourceDefinition;

impl ResourceDefinition {
    pub fn has_finalizer(&self, token: &str) -> bool {
        self.finalizers.iter().any(|f| f == token)
    }

    /// Append `token` unless already present. Returns whether the list changed.
    pub fn add_finalizer(&mut self, token: impl Into<String>) -> bool {
        let token = token.into();
        if self.has_finalizer(&token) {
            return false;
        }
        self.finalizers.push(token);
        true
    }

    /// Remove `token`, keeping the rest in order. Returns whether anything was removed.
    pub fn remove_finalizer(&mut self, token: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != token);
        self.finalizers.len() != before
    }
}

#[cfg(test)]
mod tests {
    use crate::ResourceDefinition;

    const CLEANUP: &str = "customresourcecleanup.apiextensions.k8s.io";

    #[test]
    fn add_is_idempotent() {
        let mut def = ResourceDefinition::named("foos.bar.io");
        assert!(def.add_finalizer(CLEANUP));
        assert!(!def.add_finalizer(CLEANUP));
        assert_eq!(def.finalizers, vec![CLEANUP.to_string()]);
        assert!(def.has_finalizer(CLEANUP));
    }

    #[test]
    fn remove_keeps_order() {
        let mut def = ResourceDefinition::named("foos.bar.io").with_finalizer("a").with_finalizer(CLEANUP).with_finalizer("b");
        assert!(def.remove_finalizer(CLEANUP));
        assert_eq!(def.finalizers, vec!["a".to_string(), "b".to_string()]);
        assert!(!def.has_finalizer(CLEANUP));
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut def = ResourceDefinition::named("foos.bar.io").with_finalizer("a");
        let before = def.clone();
        assert!(!def.remove_finalizer(CLEANUP));
        assert_eq!(def, before);

        let mut empty = ResourceDefinition::named("bars.foo.io");
        assert!(!empty.remove_finalizer(CLEANUP));
        assert!(empty.finalizers.is_empty());
        assert!(!empty.has_finalizer(CLEANUP));
    }
}
