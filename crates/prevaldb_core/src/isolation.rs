//! Isolation (clone) strategy.
//!
//! Values crossing the engine boundary (commands coming in, results
//! going out) may still reference state the engine owns (for example
//! through `Arc` handles into the model). The clone strategy decides
//! when such values must be deep-copied through the codec before they
//! cross, so neither the caller nor a future command can observe or
//! mutate engine-owned references.

use std::any::type_name;
use std::collections::HashSet;

/// Isolation declared by an operation for the values it produces or
/// carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// No declaration; the strategy decides.
    #[default]
    Unspecified,
    /// The operation guarantees its values share nothing with the
    /// model; the heuristic strategy skips the copy.
    Isolated,
}

/// Per-engine registry of types known to be safe to hand out without a
/// deep copy.
///
/// A type belongs here when its values cannot alias engine-owned state:
/// primitives, `String`, and application types that are plain owned
/// data. The registry is owned by the engine configuration; there is
/// no process-wide mutable set.
#[derive(Debug, Clone, Default)]
pub struct ImmutableTypes {
    names: HashSet<String>,
}

impl ImmutableTypes {
    /// Creates an empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the primitive kinds: the unit
    /// type, booleans, chars, all integer and float widths, and
    /// `String`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut reg = Self::default();
        reg.register::<()>();
        reg.register::<bool>();
        reg.register::<char>();
        reg.register::<u8>();
        reg.register::<u16>();
        reg.register::<u32>();
        reg.register::<u64>();
        reg.register::<u128>();
        reg.register::<usize>();
        reg.register::<i8>();
        reg.register::<i16>();
        reg.register::<i32>();
        reg.register::<i64>();
        reg.register::<i128>();
        reg.register::<isize>();
        reg.register::<f32>();
        reg.register::<f64>();
        reg.register::<String>();
        reg
    }

    /// Registers a type as immutable/isolated.
    pub fn register<T: ?Sized>(&mut self) {
        self.names.insert(type_name::<T>().to_string());
    }

    /// Returns whether the given type name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// Policy for deep-copying values that cross the engine boundary.
#[derive(Debug, Clone)]
pub enum CloneStrategy {
    /// Clone unconditionally. Safest, costliest.
    Always,
    /// Never clone; producers guarantee isolation. Zero cost, caller's
    /// responsibility.
    Never,
    /// Clone unless the operation declares its values isolated or the
    /// value's type is registered immutable. Conservative default:
    /// clone.
    Heuristic(ImmutableTypes),
}

impl Default for CloneStrategy {
    fn default() -> Self {
        Self::Heuristic(ImmutableTypes::with_defaults())
    }
}

impl CloneStrategy {
    /// Decides whether a value of type `type_name`, produced by an
    /// operation declaring `declared`, must be deep-copied.
    ///
    /// The heuristic consults, in order: the per-operation declaration,
    /// the immutable-type registry, then defaults to clone.
    #[must_use]
    pub fn requires_clone(&self, declared: Isolation, type_name: &str) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Heuristic(registry) => {
                declared != Isolation::Isolated && !registry.contains(type_name)
            }
        }
    }
}
