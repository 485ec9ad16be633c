use serde::Serialize;

/// Transaction identifier; the version key of every copy-on-write object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Xid(pub u64);

/// Virtual object identifier. Only meaningful together with an [`Xid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

/// Block number on the storage medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct PhysicalAddress(pub u64);

impl Xid {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl ObjectId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl PhysicalAddress {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Byte offset of this block, or `None` on overflow.
    #[must_use]
    pub const fn byte_offset(self, block_size: u32) -> Option<u64> {
        self.0.checked_mul(block_size as u64)
    }
}

// Physical objects (object maps, B-tree nodes of an object map) are
// addressed directly by their oid.
impl From<ObjectId> for PhysicalAddress {
    fn from(oid: ObjectId) -> Self {
        Self(oid.0)
    }
}

macro_rules! impl_display {
    ($($ty:ty),*) => {
        $(
            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl From<u64> for $ty {
                fn from(value: u64) -> Self {
                    Self(value)
                }
            }
        )*
    };
}

impl_display!(Xid, ObjectId, PhysicalAddress);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_offset() {
        assert_eq!(PhysicalAddress(3).byte_offset(4096), Some(12288));
        assert_eq!(PhysicalAddress(u64::MAX).byte_offset(4096), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Xid(7)), "7");
        assert_eq!(format!("{}", ObjectId(1026)), "1026");
    }

    #[test]
    fn test_serialize_transparent() {
        let json = serde_json::to_string(&Xid(42)).unwrap();
        assert_eq!(json, "42");
    }
}
