use itertools::Itertools;

use crate::{
    configuration::{AuthenticationProperties, UsernameToBindDnConverterProperty},
    dn::parse_distinguished_name,
    errors::{AuthError, Result},
};

/// Turns a login name into the principal used for the simple bind.
pub trait UsernameToBindDnConverter: Send + Sync {
    fn convert(&self, username: &str) -> Result<String>;
}

/// Builds `<rdn_attribute>=<username>,<user_base_dn>`.
///
/// The username is embedded verbatim, DN special characters are not escaped.
pub struct ByUserRdnAttribute {
    rdn_attribute: String,
    user_base_dn: String,
}

impl ByUserRdnAttribute {
    pub fn new(properties: &AuthenticationProperties) -> Self {
        Self {
            rdn_attribute: properties.rdn_attribute().to_owned(),
            user_base_dn: properties.user_base_dn.clone(),
        }
    }
}

impl UsernameToBindDnConverter for ByUserRdnAttribute {
    fn convert(&self, username: &str) -> Result<String> {
        Ok(format!(
            "{}={},{}",
            self.rdn_attribute, username, self.user_base_dn
        ))
    }
}

/// Builds `<username>@<domain>` where the domain is the `dc` components of
/// the user base DN joined with dots. Active Directory accepts this principal
/// form for binds.
pub struct ByDomainEmail {
    user_base_dn: String,
}

impl ByDomainEmail {
    pub fn new(properties: &AuthenticationProperties) -> Self {
        Self {
            user_base_dn: properties.user_base_dn.clone(),
        }
    }
}

impl UsernameToBindDnConverter for ByDomainEmail {
    fn convert(&self, username: &str) -> Result<String> {
        let domain = parse_distinguished_name(&self.user_base_dn)?
            .into_iter()
            .filter(|(name, value)| name.eq_ignore_ascii_case("dc") && !value.is_empty())
            .map(|(_, value)| value)
            .join(".");
        if domain.is_empty() {
            return Err(AuthError::Configuration(format!(
                "Converting username `{}` to a bind dn is not possible, `{}` has no dc components",
                username, self.user_base_dn
            )));
        }
        Ok(format!("{}@{}", username, domain))
    }
}

pub fn converter_for(
    properties: &AuthenticationProperties,
) -> Box<dyn UsernameToBindDnConverter> {
    match properties.bind_dn_converter() {
        UsernameToBindDnConverterProperty::ByUserRdnAttribute => {
            Box::new(ByUserRdnAttribute::new(properties))
        }
        UsernameToBindDnConverterProperty::ByDomainEmail => {
            Box::new(ByDomainEmail::new(properties))
        }
    }
}
