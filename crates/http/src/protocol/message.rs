/// Represents the size information of an HTTP request payload.
///
/// The decoder only frames bodies by `Content-Length`, so a payload is either
/// absent or has a known length in bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn new_length(length: u64) -> Self {
        if length == 0 { PayloadSize::Empty } else { PayloadSize::Length(length) }
    }

    #[inline]
    pub fn new_empty() -> Self {
        PayloadSize::Empty
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    /// Number of body bytes the decoder must wait for.
    #[inline]
    pub fn len(&self) -> u64 {
        match self {
            PayloadSize::Length(length) => *length,
            PayloadSize::Empty => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PayloadSize;

    #[test]
    fn zero_length_is_empty() {
        assert_eq!(PayloadSize::new_length(0), PayloadSize::Empty);
        assert!(PayloadSize::new_length(0).is_empty());
        assert_eq!(PayloadSize::new_length(12).len(), 12);
    }
}
