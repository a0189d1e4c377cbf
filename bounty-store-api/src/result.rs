use serde::{Deserialize, Serialize};

/// Result of a batch operation (createMany / updateMany / deleteMany).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchPayload {
    pub count: u64,
}

impl BatchPayload {
    pub fn new(count: u64) -> Self {
        Self { count }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl From<usize> for BatchPayload {
    fn from(count: usize) -> Self {
        Self::new(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_payload_from_len() {
        let payload = BatchPayload::from(3usize);
        assert_eq!(payload.count, 3);
        assert!(!payload.is_empty());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&BatchPayload::new(0)).unwrap();
        assert_eq!(json, "{\"count\":0}");
    }
}
