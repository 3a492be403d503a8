//! Key comparison strategies.
//!
//! Tables compare keys through an [`Equality`] type parameter, chosen once per
//! key type and resolved at compile time. [`NativeEq`] forwards to the type's
//! own `PartialEq`; [`FieldwiseEq`] compares field by field for types that
//! describe their fields with [`fieldwise_eq!`](crate::fieldwise_eq), stopping
//! at the first field that differs. Keys are always compared by reference.

/// A comparison strategy for `T`. Must be an equivalence relation that agrees
/// with the table's hasher: equal keys hash equally.
pub trait Equality<T: ?Sized> {
    fn equals(a: &T, b: &T) -> bool;
}

/// Uses `T`'s `PartialEq` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEq;

impl<T: PartialEq + ?Sized> Equality<T> for NativeEq {
    #[inline(always)]
    fn equals(a: &T, b: &T) -> bool {
        a == b
    }
}

/// Field-by-field comparison, implemented with [`fieldwise_eq!`](crate::fieldwise_eq).
pub trait Fieldwise {
    fn fields_eq(&self, other: &Self) -> bool;
}

/// Uses `T`'s [`Fieldwise`] description.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldwiseEq;

impl<T: Fieldwise + ?Sized> Equality<T> for FieldwiseEq {
    #[inline(always)]
    fn equals(a: &T, b: &T) -> bool {
        a.fields_eq(b)
    }
}

#[doc(hidden)]
#[inline(always)]
pub fn field_eq<F: PartialEq + ?Sized>(a: &F, b: &F) -> bool {
    a == b
}

/// Implements [`Fieldwise`] for a struct by listing the fields that take part
/// in equality, in comparison order. Each field is compared with its own
/// `PartialEq`.
///
/// ```
/// use compact_table::fieldwise_eq;
/// use compact_table::equality::{Equality, FieldwiseEq};
///
/// struct Cell {
///     x: i32,
///     y: i32,
///     cached_area: f64, // not part of identity
/// }
/// fieldwise_eq!(Cell { x, y });
///
/// let a = Cell { x: 1, y: 2, cached_area: 0.0 };
/// let b = Cell { x: 1, y: 2, cached_area: 9.5 };
/// assert!(FieldwiseEq::equals(&a, &b));
/// ```
#[macro_export]
macro_rules! fieldwise_eq {
    ($ty:ty { $($field:tt),+ $(,)? }) => {
        impl $crate::equality::Fieldwise for $ty {
            #[inline]
            fn fields_eq(&self, other: &Self) -> bool {
                true $(&& $crate::equality::field_eq(&self.$field, &other.$field))+
            }
        }
    };
}
