use std::fmt::{self, Display};
use std::mem;
use std::ptr;
use std::slice;

use crate::internal_prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntSize {
    U1 = 1,
    U2 = 2,
    U4 = 4,
    U8 = 8,
}

impl IntSize {
    pub fn from_int(size: usize) -> Option<Self> {
        match size {
            1 => Some(Self::U1),
            2 => Some(Self::U2),
            4 => Some(Self::U4),
            8 => Some(Self::U8),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FloatSize {
    U4 = 4,
    U8 = 8,
}

impl FloatSize {
    pub fn from_int(size: usize) -> Option<Self> {
        match size {
            4 => Some(Self::U4),
            8 => Some(Self::U8),
            _ => None,
        }
    }
}

/// Element type of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Datatype {
    Integer(IntSize),
    Unsigned(IntSize),
    Float(FloatSize),
    /// Uninterpreted fixed-size records.
    Opaque(usize),
}

impl Datatype {
    pub fn size(&self) -> usize {
        match *self {
            Self::Integer(size) | Self::Unsigned(size) => size as _,
            Self::Float(size) => size as _,
            Self::Opaque(size) => size,
        }
    }

    pub fn of<T: Element>() -> Self {
        T::datatype()
    }
}

impl Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Integer(size) => write!(f, "int{}", 8 * size as usize),
            Self::Unsigned(size) => write!(f, "uint{}", 8 * size as usize),
            Self::Float(size) => write!(f, "float{}", 8 * size as usize),
            Self::Opaque(size) => write!(f, "opaque (len {})", size),
        }
    }
}

/// A plain-old-data type that can be stored in a dataset.
///
/// # Safety
///
/// Implementors must have no padding and no invalid bit patterns, and
/// `datatype().size()` must equal `mem::size_of::<Self>()`.
pub unsafe trait Element: Copy + Send + Sync + 'static {
    fn datatype() -> Datatype;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident, $size:expr) => {
        unsafe impl Element for $ty {
            #[inline]
            fn datatype() -> Datatype {
                Datatype::$variant($size)
            }
        }
    };
}

impl_element!(i8, Integer, IntSize::U1);
impl_element!(i16, Integer, IntSize::U2);
impl_element!(i32, Integer, IntSize::U4);
impl_element!(i64, Integer, IntSize::U8);
impl_element!(u8, Unsigned, IntSize::U1);
impl_element!(u16, Unsigned, IntSize::U2);
impl_element!(u32, Unsigned, IntSize::U4);
impl_element!(u64, Unsigned, IntSize::U8);
impl_element!(f32, Float, FloatSize::U4);
impl_element!(f64, Float, FloatSize::U8);

#[cfg(target_pointer_width = "32")]
impl_element!(isize, Integer, IntSize::U4);
#[cfg(target_pointer_width = "32")]
impl_element!(usize, Unsigned, IntSize::U4);

#[cfg(target_pointer_width = "64")]
impl_element!(isize, Integer, IntSize::U8);
#[cfg(target_pointer_width = "64")]
impl_element!(usize, Unsigned, IntSize::U8);

/// Views a slice of elements as raw bytes.
pub fn as_bytes<T: Element>(data: &[T]) -> &[u8] {
    // Element types are padding-free plain data.
    unsafe { slice::from_raw_parts(data.as_ptr() as *const u8, data.len() * mem::size_of::<T>()) }
}

/// Reinterprets raw bytes as a vector of elements.
pub fn from_bytes<T: Element>(bytes: &[u8]) -> Result<Vec<T>> {
    let size = mem::size_of::<T>();
    ensure!(
        size > 0 && bytes.len() % size == 0,
        format!("{} bytes do not hold a whole number of {}-byte elements", bytes.len(), size)
    );
    let n = bytes.len() / size;
    let mut out: Vec<T> = Vec::with_capacity(n);
    // Every bit pattern is a valid `T`, and the capacity covers `n` elements.
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), out.as_mut_ptr() as *mut u8, bytes.len());
        out.set_len(n);
    }
    Ok(out)
}

/// Checks that a typed buffer can be exchanged with a dataset of type `dtype`.
pub(crate) fn check_element<T: Element>(dtype: Datatype) -> Result<()> {
    let actual = T::datatype();
    ensure!(actual == dtype, format!("element type mismatch: dataset is {}, buffer is {}", dtype, actual));
    Ok(())
}
