//! Online decoration
//!
//! A factor per topic, with `"default"` as the fallback and 1 when neither
//! is set. A non-negative factor scales the real count. A negative factor
//! replaces it: its absolute value is reported as-is.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Fallback key
pub const DEFAULT_DECORATION: &str = "default";

/// What a decoration asks for
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decoration {
    /// Multiply the real count
    Scale(f64),
    /// Report this value without counting
    Fixed(i64),
}

impl Decoration {
    /// Apply to a real count
    pub fn apply(self, online: i64) -> i64 {
        match self {
            Decoration::Scale(factor) => (factor * online as f64).floor() as i64,
            Decoration::Fixed(value) => value,
        }
    }
}

/// Runtime-mutable decoration factors
#[derive(Debug, Default)]
pub struct Decorations {
    factors: RwLock<HashMap<String, f64>>,
}

impl Decorations {
    pub fn new(factors: HashMap<String, f64>) -> Self {
        Self {
            factors: RwLock::new(factors),
        }
    }

    /// Raw factor for `topic`, falling back to the default, then 1
    pub fn factor(&self, topic: &str) -> f64 {
        let factors = self.factors.read();
        factors
            .get(topic)
            .or_else(|| factors.get(DEFAULT_DECORATION))
            .copied()
            .unwrap_or(1.0)
    }

    /// Decoration in effect for `topic`
    pub fn resolve(&self, topic: &str) -> Decoration {
        let factor = self.factor(topic);
        if factor >= 0.0 {
            Decoration::Scale(factor)
        } else {
            Decoration::Fixed(-factor as i64)
        }
    }

    /// Factor stored under exactly `key`, if any
    pub fn get(&self, key: &str) -> Option<f64> {
        self.factors.read().get(key).copied()
    }

    pub fn set(&self, key: impl Into<String>, factor: f64) {
        self.factors.write().insert(key.into(), factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_chain() {
        let decorations = Decorations::default();
        assert_eq!(decorations.factor("room1"), 1.0);

        decorations.set(DEFAULT_DECORATION, 2.0);
        assert_eq!(decorations.factor("room1"), 2.0);

        decorations.set("room1", 0.5);
        assert_eq!(decorations.factor("room1"), 0.5);
        assert_eq!(decorations.factor("room2"), 2.0);
        assert_eq!(decorations.get("room2"), None);
    }

    #[test]
    fn test_scale_floors() {
        assert_eq!(Decoration::Scale(1.5).apply(7), 10);
        assert_eq!(Decoration::Scale(0.0).apply(7), 0);
        assert_eq!(Decoration::Scale(1.0).apply(7), 7);
    }

    #[test]
    fn test_negative_factor_is_fixed() {
        let decorations = Decorations::new(HashMap::from([("room1".to_string(), -300.0)]));
        assert_eq!(decorations.resolve("room1"), Decoration::Fixed(300));
        assert_eq!(decorations.resolve("room1").apply(5), 300);
        assert_eq!(decorations.resolve("room2"), Decoration::Scale(1.0));
    }
}
