use bytemuck::{Pod, Zeroable};

/// A message sent from the producer to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Message {
    /// The sequence number assigned by the producer.
    pub id: u8,
    /// The payload, an ASCII character.
    pub val: u8,
}

impl Message {
    /// Construct the `id`-th message of the producer. The payload is the
    /// `id`-th letter of the alphabet, wrapping around after `z`.
    pub fn nth(id: u8) -> Self {
        Self {
            id,
            val: b'a' + id % 26,
        }
    }

    pub fn val_char(&self) -> char {
        char::from(self.val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads() {
        assert_eq!(Message::nth(0).val_char(), 'a');
        assert_eq!(Message::nth(2).val_char(), 'c');
        assert_eq!(Message::nth(27).val_char(), 'b');
    }
}
