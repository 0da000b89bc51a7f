use base64::Engine;
use sha1::{Digest, Sha1};

/// Encodes a raw password into the form stored in the directory's password
/// attribute. Only used in compare mode.
pub trait PasswordEncoder: Send + Sync {
    fn encode(&self, raw_password: &str) -> String;
}

/// The classic `userPassword` scheme: `{SHA}` followed by the base64 of the
/// SHA-1 digest.
pub struct LdapShaPasswordEncoder;

impl PasswordEncoder for LdapShaPasswordEncoder {
    fn encode(&self, raw_password: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(raw_password.as_bytes());
        format!(
            "{{SHA}}{}",
            base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
        )
    }
}
