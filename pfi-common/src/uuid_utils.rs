//! Identifier helpers

use uuid::Uuid;

/// Generate an opaque bearer token (hyphen-free UUIDv4)
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}
