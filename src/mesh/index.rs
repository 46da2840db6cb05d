//! Typed slot ids for nodes, lines and elements.
//!
//! Ids are slot numbers in the store's arrays. A slot freed by a deletion is
//! handed out again, so an id is only meaningful while its entity is alive.

use std::fmt::{self, Debug};
use std::hash::Hash;

/// Integer storage behind the mesh ids.
pub trait MeshIndex: Copy + Eq + Ord + Hash + Debug + Send + Sync + 'static {
    /// Marks an empty slot reference, such as the missing second element of
    /// a boundary line.
    const INVALID: Self;

    /// Slot number to index.
    fn from_usize(v: usize) -> Self;

    /// Index to slot number.
    fn to_usize(self) -> usize;

    /// Whether this is a real slot.
    fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl MeshIndex for u32 {
    const INVALID: Self = u32::MAX;

    #[inline]
    fn from_usize(v: usize) -> Self {
        debug_assert!(v < u32::MAX as usize, "slot {} does not fit a u32 id", v);
        v as u32
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

/// A node slot.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct NodeId<I: MeshIndex = u32>(I);

/// A line slot.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct LineId<I: MeshIndex = u32>(I);

/// An element slot.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct ElementId<I: MeshIndex = u32>(I);

macro_rules! slot_id {
    ($name:ident, $tag:literal) => {
        impl<I: MeshIndex> $name<I> {
            /// The id of slot `index`.
            #[inline]
            pub fn new(index: usize) -> Self {
                Self(I::from_usize(index))
            }

            /// The empty reference.
            #[inline]
            pub fn invalid() -> Self {
                Self(I::INVALID)
            }

            /// Slot number.
            #[inline]
            pub fn index(self) -> usize {
                self.0.to_usize()
            }

            /// Whether this names a slot.
            #[inline]
            pub fn is_valid(self) -> bool {
                self.0.is_valid()
            }
        }

        impl<I: MeshIndex> Debug for $name<I> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", $tag, self.index())
                } else {
                    write!(f, "{}(-)", $tag)
                }
            }
        }
    };
}

slot_id!(NodeId, "N");
slot_id!(LineId, "L");
slot_id!(ElementId, "K");
