use bytes::Bytes;
use core::ops::Deref;

/// One opaque unit of generated telemetry.
///
/// A batch is produced once by a [`Generator`](crate::Generator) and consumed
/// once by a single [`Sender`](crate::Sender) call. The pipeline only ever
/// moves it, so the bytes handed to the sender are exactly the bytes the
/// generator produced.
#[derive(Debug, PartialEq, Eq, Hash, Default)]
pub struct Batch(Bytes);

impl Batch {
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    /// Size of the batch in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the underlying buffer, e.g. to use as a request body without
    /// copying.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for Batch {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Bytes> for Batch {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Batch {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<String> for Batch {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<Batch> for Bytes {
    fn from(batch: Batch) -> Self {
        batch.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_matches_payload() {
        let batch = Batch::from(vec![0_u8; 10]);
        assert_eq!(batch.len(), 10);
        assert!(!batch.is_empty());
        assert!(Batch::default().is_empty());
    }

    #[test]
    fn into_bytes_does_not_copy() {
        let bytes = Bytes::from_static(b"payload");
        let ptr = bytes.as_ptr();
        let batch = Batch::from(bytes);
        assert_eq!(batch.into_bytes().as_ptr(), ptr);
    }
}
