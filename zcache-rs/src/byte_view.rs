//! Provides an immutable view on cached bytes.
//!
//! A [ByteView](ByteView) is what a [Group](crate::group::Group) stores and hands out. It can be
//! cloned cheaply, as all clones share the same underlying buffer. As the buffer is never
//! mutated once the view has been created, callers can only ever obtain copies of the data via
//! [byte_slice](ByteView::byte_slice) or [Display](std::fmt::Display).
use std::fmt::{Display, Formatter};

use bytes::Bytes;

use crate::lru::ByteSize;

/// Represents a read-only snapshot of a cached value.
///
/// # Example
/// ```
/// # use zcache::byte_view::ByteView;
/// let view = ByteView::from(b"630".to_vec());
/// assert_eq!(view.len(), 3);
/// assert_eq!(view.to_string(), "630");
///
/// // Modifying a copy doesn't affect the view itself...
/// let mut copy = view.byte_slice();
/// copy[0] = b'7';
/// assert_eq!(view.to_string(), "630");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Returns the length of the underlying data in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determines if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a copy of the underlying data.
    pub fn byte_slice(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        ByteView {
            data: Bytes::from(data),
        }
    }
}

impl From<&str> for ByteView {
    fn from(data: &str) -> Self {
        ByteView {
            data: Bytes::copy_from_slice(data.as_bytes()),
        }
    }
}

impl Display for ByteView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

impl ByteSize for ByteView {
    fn allocated_size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::byte_view::ByteView;
    use crate::lru::ByteSize;

    #[test]
    fn clones_share_the_same_contents() {
        let view = ByteView::from("value1");
        let clone = view.clone();

        assert_eq!(view, clone);
        assert_eq!(clone.byte_slice(), b"value1".to_vec());
        assert_eq!(clone.allocated_size(), 6);
    }

    #[test]
    fn empty_views_are_detected() {
        assert_eq!(ByteView::default().is_empty(), true);
        assert_eq!(ByteView::from(Vec::new()).len(), 0);
        assert_eq!(ByteView::from("x").is_empty(), false);
    }
}
