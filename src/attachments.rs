//! Uploaded file attachments.
//!
//! Attachments live in per-purpose buckets, keyed under the owning
//! user's id so storage policies can scope access. Content types are
//! guessed from the file name.

use uuid::Uuid;

/// Default lifetime of signed attachment URLs.
pub const SIGNED_URL_TTL_SECS: u64 = 3600;

/// A file picked by the user, ready for upload.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn content_type(&self) -> String {
        mime_guess::from_path(&self.file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

/// Object key for a user's attachment. A fresh uuid segment keeps
/// same-named uploads distinct.
pub fn object_key(user_id: Uuid, file_name: &str) -> String {
    format!("{user_id}/{}_{}", Uuid::new_v4(), base_name(file_name))
}

/// Last path segment of the picked file, so keys never embed client-side
/// directory structure.
fn base_name(file_name: &str) -> &str {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_guessed_from_extension() {
        assert_eq!(
            Attachment::new("resultats.pdf", vec![]).content_type(),
            "application/pdf"
        );
        assert_eq!(
            Attachment::new("scan.jpg", vec![]).content_type(),
            "image/jpeg"
        );
        assert_eq!(
            Attachment::new("mystery.bin2", vec![]).content_type(),
            "application/octet-stream"
        );
    }

    #[test]
    fn keys_are_namespaced_by_user() {
        let user = Uuid::new_v4();
        let key = object_key(user, "resultats.pdf");
        assert!(key.starts_with(&format!("{user}/")));
        assert!(key.ends_with("_resultats.pdf"));
    }

    #[test]
    fn keys_drop_client_directories() {
        let user = Uuid::new_v4();
        for picked in ["/home/marie/Documents/bilan.pdf", r"C:\Users\marie\bilan.pdf"] {
            let key = object_key(user, picked);
            assert!(key.ends_with("_bilan.pdf"), "{key}");
            assert_eq!(key.matches('/').count(), 1);
        }
    }

    #[test]
    fn same_name_twice_yields_distinct_keys() {
        let user = Uuid::new_v4();
        assert_ne!(object_key(user, "a.pdf"), object_key(user, "a.pdf"));
    }
}
