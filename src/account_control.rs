use crate::{
    configuration::AccountControlEvaluatorProperty,
    directory::DirectoryEntry,
};

/// Attribute holding the Active Directory account control flags.
pub const USER_ACCOUNT_CONTROL_ATTRIBUTE: &str = "userAccountControl";

/// The ACCOUNTDISABLE bit.
pub const ACCOUNT_DISABLED: i32 = 2;

const NORMAL_ACCOUNT: i32 = 512;
const DONT_EXPIRE_PASSWORD: i32 = 65536;

/// `None` means the attribute was absent, which counts as `default`.
pub fn is_user_account_enabled(value: Option<i32>, default: bool) -> bool {
    match value {
        None => default,
        Some(value) => value & ACCOUNT_DISABLED == 0,
    }
}

/// Toggles the disabled bit on an account control value. With no current
/// value the result starts from a normal account whose password does not
/// expire (66048).
pub fn user_account_control_value(enabled: bool, current: Option<i32>) -> i32 {
    let current = current.unwrap_or(NORMAL_ACCOUNT + DONT_EXPIRE_PASSWORD);
    if enabled {
        current & !ACCOUNT_DISABLED
    } else {
        current | ACCOUNT_DISABLED
    }
}

/// Account-state predicates checked after the password proof. All are pure
/// reads of the already-fetched user entry.
pub trait AccountControlEvaluator: Send + Sync {
    fn is_enabled(&self, user: &DirectoryEntry) -> bool;
    fn is_account_non_locked(&self, user: &DirectoryEntry) -> bool;
    fn is_account_non_expired(&self, user: &DirectoryEntry) -> bool;
    fn is_credentials_non_expired(&self, user: &DirectoryEntry) -> bool;
}

pub struct NoOpAccountControlEvaluator;

impl AccountControlEvaluator for NoOpAccountControlEvaluator {
    fn is_enabled(&self, _user: &DirectoryEntry) -> bool {
        true
    }

    fn is_account_non_locked(&self, _user: &DirectoryEntry) -> bool {
        true
    }

    fn is_account_non_expired(&self, _user: &DirectoryEntry) -> bool {
        true
    }

    fn is_credentials_non_expired(&self, _user: &DirectoryEntry) -> bool {
        true
    }
}

/// Evaluates the `userAccountControl` flags of an Active Directory entry.
/// Only the disabled bit is modeled, lockout and expiry bits are not
/// evaluated.
pub struct ActiveDirectoryAccountControlEvaluator;

impl ActiveDirectoryAccountControlEvaluator {
    fn account_control(user: &DirectoryEntry) -> Option<i32> {
        user.attr_first(USER_ACCOUNT_CONTROL_ATTRIBUTE)
            .and_then(|value| value.parse::<i32>().ok())
    }
}

impl AccountControlEvaluator for ActiveDirectoryAccountControlEvaluator {
    fn is_enabled(&self, user: &DirectoryEntry) -> bool {
        is_user_account_enabled(Self::account_control(user), true)
    }

    fn is_account_non_locked(&self, _user: &DirectoryEntry) -> bool {
        true
    }

    fn is_account_non_expired(&self, _user: &DirectoryEntry) -> bool {
        true
    }

    fn is_credentials_non_expired(&self, _user: &DirectoryEntry) -> bool {
        true
    }
}

pub fn evaluator_for(
    property: AccountControlEvaluatorProperty,
) -> Box<dyn AccountControlEvaluator> {
    match property {
        AccountControlEvaluatorProperty::None => Box::new(NoOpAccountControlEvaluator),
        AccountControlEvaluatorProperty::ActiveDirectory => {
            Box::new(ActiveDirectoryAccountControlEvaluator)
        }
    }
}
