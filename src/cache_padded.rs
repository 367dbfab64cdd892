//! Provides cache-padded atomic types and the size of the destructive interference.
use crate::loom_bindings::sync::atomic::{AtomicU32, AtomicU64};
use core::ops::Deref;
use std::mem::MaybeUninit;

#[cfg(any(
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "arm64ec",
    target_arch = "powerpc64",
))]
const ALIGN: usize = 128;

#[cfg(any(
    target_arch = "arm",
    target_arch = "mips",
    target_arch = "mips32r6",
    target_arch = "mips64",
    target_arch = "mips64r6",
    target_arch = "sparc",
    target_arch = "hexagon",
))]
const ALIGN: usize = 32;

#[cfg(target_arch = "m68k")]
const ALIGN: usize = 16;

#[cfg(target_arch = "s390x")]
const ALIGN: usize = 256;

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "arm64ec",
    target_arch = "powerpc64",
    target_arch = "arm",
    target_arch = "mips",
    target_arch = "mips32r6",
    target_arch = "mips64",
    target_arch = "mips64r6",
    target_arch = "sparc",
    target_arch = "hexagon",
    target_arch = "m68k",
    target_arch = "s390x",
)))]
const ALIGN: usize = 64;

/// The minimum distance in bytes between two objects
/// that are accessed by different threads without false sharing.
pub const DESTRUCTIVE_INTERFERENCE_SIZE: usize = ALIGN;

macro_rules! generate_cache_padded_atomic {
    ($name:ident, $atomic:ident, $number:ty) => {
        /// Cache padded atomic. Can be dereferenced to the inner atomic.
        pub struct $name {
            atomic: $atomic,
            _align: MaybeUninit<
                [u8; if size_of::<$atomic>() > ALIGN {
                    0
                } else {
                    ALIGN - size_of::<$atomic>()
                }],
            >,
        }

        impl $name {
            /// Creates a new cache padded atomic with the given value.
            pub fn new(value: $number) -> Self {
                Self {
                    atomic: $atomic::new(value),
                    _align: MaybeUninit::uninit(),
                }
            }
        }

        impl Deref for $name {
            type Target = $atomic;

            fn deref(&self) -> &Self::Target {
                &self.atomic
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new(0)
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Debug::fmt(&self.atomic, f)
            }
        }
    };
}

generate_cache_padded_atomic!(CachePaddedAtomicU32, AtomicU32, u32);
generate_cache_padded_atomic!(CachePaddedAtomicU64, AtomicU64, u64);
