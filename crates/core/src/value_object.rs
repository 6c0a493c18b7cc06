//! Value object trait: equality by value, not identity.
//!
//! Value objects are domain objects that have **no identity** — they are
//! defined entirely by their attribute values. Two value objects with the
//! same values are interchangeable.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" a
/// value object, construct a new one with the new values. Immutability is
/// enforced by convention, not by the trait.
///
/// ## Value Object vs Entity
///
/// - **Value Object**: no identity (same values ⇒ equal)
/// - **Entity**: has identity (same key ⇒ same entity)
///
/// Example: `Money { amount: 100, currency: "USD" }` is a value object;
/// `Customer { id: CustomerId(...), name: "..." }` is an entity.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {
    /// Structural comparison over all attributes.
    ///
    /// Defaults to `==`; override only when the stored representation and
    /// the compared value differ (normalization, caching fields).
    fn same_value_as(&self, other: &Self) -> bool {
        self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Money {
        amount: i64,
        currency: String,
        note: Option<String>,
    }

    impl ValueObject for Money {}

    fn sek(amount: i64) -> Money {
        Money {
            amount,
            currency: "SEK".to_string(),
            note: None,
        }
    }

    #[test]
    fn same_values_are_the_same_value() {
        assert!(sek(100).same_value_as(&sek(100)));
    }

    #[test]
    fn different_values_are_different() {
        assert!(!sek(100).same_value_as(&sek(200)));

        let mut other_currency = sek(100);
        other_currency.currency = "EUR".to_string();
        assert!(!sek(100).same_value_as(&other_currency));
    }

    #[test]
    fn absent_attributes_compare_null_safely() {
        let with_note = Money {
            note: Some("invoice 42".to_string()),
            ..sek(100)
        };

        assert!(!sek(100).same_value_as(&with_note));
        assert!(with_note.same_value_as(&with_note.clone()));
    }
}
