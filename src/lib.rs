#![forbid(unsafe_code)]
#![forbid(non_ascii_idents)]

pub mod account_control;
pub mod authenticator;
pub mod bind_dn;
pub mod configuration;
pub mod directory;
pub mod dn;
pub mod errors;
pub mod groups;
pub mod logging;
pub mod password;
pub mod roles;

#[cfg(test)]
pub mod test_utils;

pub use authenticator::{AuthenticationResult, Authenticator};
pub use configuration::{AuthenticationProperties, Configuration, ConnectionProperties};
pub use errors::{AuthError, Result};
