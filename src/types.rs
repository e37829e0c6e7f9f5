//! Small integer-width shorthand traits used by the free-list and point-store
//! location tables.
//!
//! Grounded on `types.rs` in the teacher crate: a `Max` trait giving each
//! unsigned width its own maximum-value constant, and a `Location` trait
//! bundling the bounds a store's location/handle table element type needs.

/// A type that has a distinguished maximum value, used as the "no value"
/// sentinel for location and handle tables.
pub trait Max {
    const MAX: Self;
}

impl Max for u8 {
    const MAX: u8 = u8::MAX;
}

impl Max for u16 {
    const MAX: u16 = u16::MAX;
}

impl Max for u32 {
    const MAX: u32 = u32::MAX;
}

impl Max for usize {
    const MAX: usize = usize::MAX;
}

/// Shorthand for the bounds required of a location/handle table element
/// type: copyable, comparable, convertible to and from `usize`, and usable
/// across thread boundaries (the forest orchestrator may fan out read-only
/// work across trees, spec.md §5).
pub trait Location:
    Copy + Max + PartialEq + TryFrom<usize> + Send + Sync + std::fmt::Debug
{
}

impl Location for u8 {}
impl Location for u16 {}
impl Location for u32 {}
impl Location for usize {}

/// A stable integer handle for a logical point in the point store.
///
/// spec.md §3 specifies an "invalid handle sentinel = −1"; since handles are
/// unsigned here, that sentinel is realized as [`INFEASIBLE`]
/// (`usize::MAX`), matching the teacher's own `L::MAX`/`usize::MAX` idiom in
/// `pointstore.rs` and `shared_point_store.rs`.
pub type Handle = usize;

/// The infeasible/invalid handle and offset sentinel (spec.md §3, §4.2).
pub const INFEASIBLE: usize = usize::MAX;

/// An index into the point store's flat numeric array.
pub type PointIndex = usize;
