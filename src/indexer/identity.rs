//! Content-addressed identities for chunks and stored records.
//!
//! Both ids are SHA-256 over UTF-8 parts joined with `"::"`, hex encoded.
//! The parser keys a chunk by `class_context::signature`; the store keys a
//! record by `package::class::signature`. The two call sites must agree on
//! hash and separator, so both go through [`content_hash`].

use sha2::{Digest, Sha256};

/// Separator between hashed parts.
pub const ID_SEPARATOR: &str = "::";

/// SHA-256 of `parts` joined by [`ID_SEPARATOR`], as 64 lowercase hex chars.
pub fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(ID_SEPARATOR.as_bytes());
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Chunk id: overloads differ by signature, same-named classes in other
/// packages differ by class context.
pub fn chunk_id(class_context: &str, signature: &str) -> String {
    content_hash(&[class_context, signature])
}

/// Persisted record key used by the storage collaborator.
pub fn record_key(package: &str, class_name: &str, signature: &str) -> String {
    content_hash(&[package, class_name, signature])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_sha256_of_joined_parts() {
        let expected = hex::encode(Sha256::digest(b"ctx::sig"));
        assert_eq!(chunk_id("ctx", "sig"), expected);
    }

    #[test]
    fn ids_are_64_hex_chars() {
        let id = record_key("com.example", "Dog", "public void bark()");
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn overloads_get_distinct_ids() {
        let ctx = "Package: p, Class: Calc, Fields: None";
        assert_ne!(
            chunk_id(ctx, "public int calculate(int x)"),
            chunk_id(ctx, "public int calculate(String x)")
        );
    }

    #[test]
    fn same_class_other_package_differs() {
        let sig = "public void run()";
        assert_ne!(
            chunk_id("Package: a, Class: Job, Fields: None", sig),
            chunk_id("Package: b, Class: Job, Fields: None", sig)
        );
        assert_ne!(record_key("a", "Job", sig), record_key("b", "Job", sig));
    }

    #[test]
    fn record_key_matches_three_part_join() {
        let expected = hex::encode(Sha256::digest(b"p::C::sig"));
        assert_eq!(record_key("p", "C", "sig"), expected);
    }
}
