//! Row schemas.
//!
//! A row is a tuple of up to eight fields that is pushed and popped as one
//! unit. The [`Row`] trait turns a slot address into one raw pointer per
//! field, which lets the same push/pop code serve row-major and
//! column-major segments.

use std::alloc::{Layout, LayoutError};
use std::ptr;

/// A fixed, ordered list of typed fields.
///
/// Implemented for tuples `(A,)` through `(A, B, C, D, E, F, G, H)`.
///
/// # Safety
///
/// `row_ptrs` and `column_ptrs` must return pointers to disjoint, aligned
/// field locations of the addressed slot, and `column_layout` must describe
/// a block large enough for every field array at the returned offsets.
pub unsafe trait Row: Sized + Send + 'static {
    /// Number of fields.
    const ARITY: usize;

    /// One raw pointer per field.
    type Ptrs: Copy;

    /// Shared references to every field.
    type Refs<'a>;

    /// Mutable references to every field.
    type RefsMut<'a>;

    /// Splits a pointer to a whole row into per-field pointers.
    ///
    /// # Safety
    ///
    /// `row` must point into an allocation large enough for `Self`.
    unsafe fn row_ptrs(row: *mut Self) -> Self::Ptrs;

    /// Layout of `len` rows stored as one array per field, plus the byte
    /// offset of each array inside the block.
    ///
    /// # Errors
    ///
    /// Returns an error if the total size overflows `isize::MAX`.
    fn column_layout(len: usize) -> Result<(Layout, Vec<usize>), LayoutError>;

    /// Per-field pointers of row `index` in a column-major block.
    ///
    /// # Safety
    ///
    /// `base` must point to a block laid out by `column_layout(len)`,
    /// `offsets` must be the offsets it returned, and `index < len`.
    unsafe fn column_ptrs(base: *mut u8, offsets: &[usize], index: usize) -> Self::Ptrs;

    /// Moves `row` into uninitialised field locations.
    ///
    /// # Safety
    ///
    /// The locations must be valid for writes and hold no live value.
    unsafe fn write(ptrs: Self::Ptrs, row: Self);

    /// Moves the fields out, leaving the locations uninitialised.
    ///
    /// # Safety
    ///
    /// Every location must hold a live value, and the caller must treat the
    /// slot as empty afterwards.
    unsafe fn read(ptrs: Self::Ptrs) -> Self;

    /// Exchanges two rows field by field. `a` and `b` may be equal.
    ///
    /// # Safety
    ///
    /// Both slots must hold live values and be exclusively accessible.
    unsafe fn swap(a: Self::Ptrs, b: Self::Ptrs);

    /// Borrows every field.
    ///
    /// # Safety
    ///
    /// The slot must hold a live value that is not mutated for `'a`.
    unsafe fn refs<'a>(ptrs: Self::Ptrs) -> Self::Refs<'a>;

    /// Mutably borrows every field.
    ///
    /// # Safety
    ///
    /// The slot must hold a live value that nothing else accesses for `'a`.
    unsafe fn refs_mut<'a>(ptrs: Self::Ptrs) -> Self::RefsMut<'a>;
}

/// Access to field `I` of a row.
pub trait Field<const I: usize>: Row {
    /// Type of the field.
    type Type;

    /// Selects the field's pointer.
    fn field_ptr(ptrs: Self::Ptrs) -> *mut Self::Type;
}

macro_rules! impl_row {
    ($($T:ident $idx:tt),+) => {
        // SAFETY: field pointers come from `addr_of_mut!` on a row, or from
        // disjoint arrays laid out by `Layout::extend`.
        unsafe impl<$($T: Send + 'static),+> Row for ($($T,)+) {
            const ARITY: usize = [$($idx),+].len();

            type Ptrs = ($(*mut $T,)+);
            type Refs<'a> = ($(&'a $T,)+);
            type RefsMut<'a> = ($(&'a mut $T,)+);

            #[inline]
            unsafe fn row_ptrs(row: *mut Self) -> Self::Ptrs {
                unsafe { ($(ptr::addr_of_mut!((*row).$idx),)+) }
            }

            fn column_layout(len: usize) -> Result<(Layout, Vec<usize>), LayoutError> {
                let mut layout = Layout::from_size_align(0, 1)?;
                let mut offsets = Vec::with_capacity(Self::ARITY);
                $(
                    let (extended, offset) = layout.extend(Layout::array::<$T>(len)?)?;
                    layout = extended;
                    offsets.push(offset);
                )+
                Ok((layout.pad_to_align(), offsets))
            }

            #[inline]
            unsafe fn column_ptrs(base: *mut u8, offsets: &[usize], index: usize) -> Self::Ptrs {
                unsafe { ($(base.add(offsets[$idx]).cast::<$T>().add(index),)+) }
            }

            #[inline]
            unsafe fn write(ptrs: Self::Ptrs, row: Self) {
                unsafe { $(ptrs.$idx.write(row.$idx);)+ }
            }

            #[inline]
            unsafe fn read(ptrs: Self::Ptrs) -> Self {
                unsafe { ($(ptrs.$idx.read(),)+) }
            }

            #[inline]
            unsafe fn swap(a: Self::Ptrs, b: Self::Ptrs) {
                unsafe { $(ptr::swap(a.$idx, b.$idx);)+ }
            }

            #[inline]
            unsafe fn refs<'a>(ptrs: Self::Ptrs) -> Self::Refs<'a> {
                unsafe { ($(&*ptrs.$idx,)+) }
            }

            #[inline]
            unsafe fn refs_mut<'a>(ptrs: Self::Ptrs) -> Self::RefsMut<'a> {
                unsafe { ($(&mut *ptrs.$idx,)+) }
            }
        }
    };
}

macro_rules! impl_field {
    (($($T:ident),+) $F:ident $idx:tt) => {
        impl<$($T: Send + 'static),+> Field<$idx> for ($($T,)+) {
            type Type = $F;

            #[inline]
            fn field_ptr(ptrs: Self::Ptrs) -> *mut $F {
                ptrs.$idx
            }
        }
    };
}

impl_row!(A 0);
impl_row!(A 0, B 1);
impl_row!(A 0, B 1, C 2);
impl_row!(A 0, B 1, C 2, D 3);
impl_row!(A 0, B 1, C 2, D 3, E 4);
impl_row!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_row!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_row!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

impl_field!((A) A 0);

impl_field!((A, B) A 0);
impl_field!((A, B) B 1);

impl_field!((A, B, C) A 0);
impl_field!((A, B, C) B 1);
impl_field!((A, B, C) C 2);

impl_field!((A, B, C, D) A 0);
impl_field!((A, B, C, D) B 1);
impl_field!((A, B, C, D) C 2);
impl_field!((A, B, C, D) D 3);

impl_field!((A, B, C, D, E) A 0);
impl_field!((A, B, C, D, E) B 1);
impl_field!((A, B, C, D, E) C 2);
impl_field!((A, B, C, D, E) D 3);
impl_field!((A, B, C, D, E) E 4);

impl_field!((A, B, C, D, E, F) A 0);
impl_field!((A, B, C, D, E, F) B 1);
impl_field!((A, B, C, D, E, F) C 2);
impl_field!((A, B, C, D, E, F) D 3);
impl_field!((A, B, C, D, E, F) E 4);
impl_field!((A, B, C, D, E, F) F 5);

impl_field!((A, B, C, D, E, F, G) A 0);
impl_field!((A, B, C, D, E, F, G) B 1);
impl_field!((A, B, C, D, E, F, G) C 2);
impl_field!((A, B, C, D, E, F, G) D 3);
impl_field!((A, B, C, D, E, F, G) E 4);
impl_field!((A, B, C, D, E, F, G) F 5);
impl_field!((A, B, C, D, E, F, G) G 6);

impl_field!((A, B, C, D, E, F, G, H) A 0);
impl_field!((A, B, C, D, E, F, G, H) B 1);
impl_field!((A, B, C, D, E, F, G, H) C 2);
impl_field!((A, B, C, D, E, F, G, H) D 3);
impl_field!((A, B, C, D, E, F, G, H) E 4);
impl_field!((A, B, C, D, E, F, G, H) F 5);
impl_field!((A, B, C, D, E, F, G, H) G 6);
impl_field!((A, B, C, D, E, F, G, H) H 7);
