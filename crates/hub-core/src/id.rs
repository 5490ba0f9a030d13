//! Message identifiers

use serde::{Deserialize, Deserializer};

/// Generate a random 16-byte message id rendered as 32 lowercase hex chars
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Deserialize a string field that may be `null` on the wire
pub(crate) fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_is_32_hex_chars() {
        let id = new_message_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_message_ids_are_unique() {
        assert_ne!(new_message_id(), new_message_id());
    }
}
