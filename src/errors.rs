use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid configuration: `{0}`")]
    Configuration(String),
    #[error("User `{0}` not found")]
    UserNotFound(String),
    #[error("Invalid credentials")]
    BadCredentials,
    #[error("Account disabled")]
    Disabled,
    #[error("Account locked")]
    Locked,
    #[error("Account expired")]
    AccountExpired,
    #[error("Credentials expired")]
    CredentialsExpired,
    #[error("Directory error: `{0}`")]
    Directory(#[from] ldap3::LdapError),
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// Whether a directory error is an invalid-credentials condition.
///
/// Servers usually answer a wrong password with result code 49, but some
/// deployments (Active Directory behind a referral, in particular) surface a
/// connect-level error whose message merely mentions the code, e.g.
/// `resultCode=INVALID_CREDENTIALS` or the AD diagnostic `data 52e`.
pub(crate) fn is_invalid_credentials(error: &ldap3::LdapError) -> bool {
    if let ldap3::LdapError::LdapResult { result } = error {
        if result.rc == 49 {
            return true;
        }
    }
    let message = error.to_string().to_ascii_lowercase();
    message.contains("invalid credentials")
        || message.contains("invalidcredentials")
        || message.contains("invalid_credentials")
        || message.contains("data 52e")
}

impl AuthError {
    /// Remaps directory-level bind failures that are really a wrong password.
    pub(crate) fn classify_bind_failure(self) -> AuthError {
        match self {
            AuthError::Directory(e) if is_invalid_credentials(&e) => AuthError::BadCredentials,
            other => other,
        }
    }
}
