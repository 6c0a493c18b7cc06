//! Entity trait: identity + continuity across state changes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Entity marker + minimal interface.
///
/// Entities compare by identity, not by attributes: two entities carrying
/// the same key are the same entity, regardless of how the rest of their
/// state differs. The key is optional — `None` models an instance that has
/// not been assigned an identity yet (typically: not stored).
pub trait Entity {
    /// Strongly-typed entity key.
    type Key: Clone + Eq + Hash + core::fmt::Debug;

    /// Returns the identity key, if one has been assigned.
    fn key(&self) -> Option<&Self::Key>;

    /// Identity comparison.
    ///
    /// True when both sides are the same instance, or when both keys are
    /// assigned and equal. Two distinct unkeyed instances are never the same
    /// entity — there is no value-based fallback for equality.
    fn same_identity_as(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        if core::ptr::eq(self, other) {
            return true;
        }
        match (self.key(), other.key()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Identity hash.
    ///
    /// Hashes the key when one is assigned. Unkeyed instances fall back to an
    /// address-derived hash, so distinct new instances do not collapse into a
    /// single bucket. The fallback is not stable across moves; hash unkeyed
    /// entities in place or not at all.
    fn identity_hash(&self) -> u64
    where
        Self: Sized,
    {
        let mut hasher = DefaultHasher::new();
        match self.key() {
            Some(key) => key.hash(&mut hasher),
            None => (self as *const Self as usize).hash(&mut hasher),
        }
        hasher.finish()
    }
}

/// Builder producing a fully-formed entity.
pub trait EntityBuilder {
    /// The entity type this builder produces.
    type Entity: Entity;

    /// Consume the builder and produce the entity.
    fn build(self) -> Self::Entity;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Person {
        id: Option<u32>,
        name: String,
    }

    impl Person {
        fn new(id: impl Into<Option<u32>>, name: &str) -> Self {
            Self {
                id: id.into(),
                name: name.to_string(),
            }
        }
    }

    impl Entity for Person {
        type Key = u32;

        fn key(&self) -> Option<&u32> {
            self.id.as_ref()
        }
    }

    #[test]
    fn equal_keys_are_the_same_identity_regardless_of_attributes() {
        let a = Person::new(1, "Anders");
        let b = Person::new(1, "Someone else entirely");

        assert!(a.same_identity_as(&b));
        assert!(b.same_identity_as(&a));
        assert_eq!(a.identity_hash(), b.identity_hash());
    }

    #[test]
    fn different_keys_are_different_identities() {
        let a = Person::new(1, "Anders");
        let b = Person::new(2, "Anders");

        assert!(!a.same_identity_as(&b));
    }

    #[test]
    fn distinct_unkeyed_instances_are_never_the_same() {
        let a = Person::new(None, "Anders");
        let b = Person::new(None, "Anders");

        assert!(!a.same_identity_as(&b));
        assert!(!b.same_identity_as(&a));
    }

    #[test]
    fn unkeyed_instance_is_the_same_as_itself() {
        let a = Person::new(None, "Anders");

        assert!(a.same_identity_as(&a));
    }

    #[test]
    fn keyed_instance_is_the_same_as_itself() {
        let a = Person::new(7, "Anders");

        assert!(a.same_identity_as(&a));
        assert_eq!(a.identity_hash(), a.identity_hash());
    }

    #[test]
    fn unkeyed_against_keyed_is_never_the_same() {
        let a = Person::new(None, "Anders");
        let b = Person::new(1, "Anders");

        assert!(!a.same_identity_as(&b));
        assert!(!b.same_identity_as(&a));
    }

    #[test]
    fn distinct_unkeyed_instances_hash_apart() {
        // Two live instances occupy different addresses, so the fallback
        // hashes differ.
        let a = Person::new(None, "Anders");
        let b = Person::new(None, "Anders");

        assert_ne!(a.identity_hash(), b.identity_hash());
    }

    proptest! {
        #[test]
        fn identity_is_reflexive_for_any_key(id in any::<u32>(), name in ".*") {
            let person = Person::new(id, &name);
            prop_assert!(person.same_identity_as(&person));
            prop_assert_eq!(person.identity_hash(), person.identity_hash());
        }

        #[test]
        fn key_equality_implies_identity(id in any::<u32>(), a in ".*", b in ".*") {
            let left = Person::new(id, &a);
            let right = Person::new(id, &b);
            prop_assert!(left.same_identity_as(&right));
            prop_assert_eq!(left.identity_hash(), right.identity_hash());
        }

        #[test]
        fn key_inequality_implies_distinct_identity(a in any::<u32>(), b in any::<u32>()) {
            prop_assume!(a != b);
            let left = Person::new(a, "x");
            let right = Person::new(b, "x");
            prop_assert!(!left.same_identity_as(&right));
        }
    }
}
