//! Boundary value types.
//!
//! [`ObjectHandle`] and [`RawAddress`] are deliberately unrelated types: a handle is an opaque
//! token issued by the managed runtime, an address is a snapshot of where the object lived when
//! it was probed. The only way from one to the other is [`crate::ExecutionContext::resolve`].
use sptr::Strict;
use std::fmt::{self, Debug, Display, Formatter, LowerHex};

/// Signed pointer-width integer used for numeric returns across the boundary.
pub type NativeInt = isize;

/// Opaque pointee of an [`ObjectHandle`]. Never dereferenced.
#[repr(C)]
pub struct OpaqueObject {
    _private: [u8; 0],
}

/// An opaque, call-scoped reference to a managed object.
///
/// The bit pattern is owned by the runtime and is not an address.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjectHandle(*mut OpaqueObject);

// SAFETY: a handle is an opaque token that is never dereferenced on this side of the boundary;
// validity is decided by the runtime that resolves it
unsafe impl Send for ObjectHandle {}
unsafe impl Sync for ObjectHandle {}

//noinspection RsAssertEqual
// handles cross the boundary as a single pointer-sized argument
const _: () = assert!(size_of::<ObjectHandle>() == size_of::<usize>());

impl ObjectHandle {
    pub const NULL: Self = Self(std::ptr::null_mut());

    pub fn from_raw(raw: *mut OpaqueObject) -> Self {
        Self(raw)
    }

    pub fn into_raw(self) -> *mut OpaqueObject {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// Runtime-side encoding of a handle token.
    ///
    /// The resulting pointer carries no provenance and must never be dereferenced.
    pub fn from_token(token: usize) -> Self {
        Self(sptr::invalid_mut(token))
    }

    /// Runtime-side decoding of a handle token.
    pub fn token(self) -> usize {
        Strict::addr(self.0)
    }
}

impl Debug for ObjectHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("ObjectHandle(NULL)")
        } else {
            write!(f, "ObjectHandle(#{})", self.token())
        }
    }
}

/// The address backing an object at the instant it was probed.
///
/// Two probes of the same object may disagree if the runtime relocated it in between.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RawAddress(usize);

impl RawAddress {
    /// "No valid address".
    pub const SENTINEL: Self = Self(0);

    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(Strict::addr(ptr))
    }

    pub const fn get(self) -> usize {
        self.0
    }

    pub const fn is_sentinel(self) -> bool {
        self.0 == 0
    }

    /// Reinterprets the address as the boundary's signed integer, bit for bit.
    pub const fn to_native_int(self) -> NativeInt {
        self.0 as NativeInt
    }

    pub const fn from_native_int(value: NativeInt) -> Self {
        Self(value as usize)
    }
}

impl Debug for RawAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RawAddress({:#x})", self.0)
    }
}

impl Display for RawAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl LowerHex for RawAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}
