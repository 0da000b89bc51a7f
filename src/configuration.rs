use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use secstr::SecUtf8;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Search scope of a directory lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchScope {
    Base,
    #[serde(rename = "ONELEVEL")]
    #[strum(serialize = "ONELEVEL")]
    OneLevel,
    Subtree,
}

/// How the set of groups of a user is fetched from the directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupFetchStrategy {
    /// The user entry lists its groups (`memberOf` style).
    UserContainsGroups,
    /// Group entries list their members, requiring one group search.
    GroupContainsUsers,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseTransformation {
    None,
    ToUpperCase,
    ToLowerCase,
}

/// Strategy turning a login name into the DN (or AD principal) used for the
/// simple bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UsernameToBindDnConverterProperty {
    ByUserRdnAttribute,
    ByDomainEmail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountControlEvaluatorProperty {
    None,
    ActiveDirectory,
}

/// Maps a raw group name to a role name. Group names are compared
/// case-insensitively; entries with an empty role name are skipped.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct GroupToRoleMapping {
    pub group_name: String,
    pub role_name: String,
}

/// A regex substitution applied to role names, in list order.
/// `regex = "[- ]"` for example replaces every '-' and every space.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct StringReplacement {
    pub regex: String,
    pub replacement: String,
}

/// Preset bundles of defaults for common directory layouts. Applying a
/// template only fills fields that were left unset, explicit values always
/// win.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Template {
    ActiveDirectory,
    OpenLdap,
    UserContainsGroups,
    GroupContainsUsers,
}

#[derive(Default)]
struct TemplatePatch {
    user_object_class: Option<&'static str>,
    username_attribute: Option<&'static str>,
    real_name_attribute: Option<&'static str>,
    email_attribute: Option<&'static str>,
    user_find_one_search_scope: Option<SearchScope>,
    member_attribute: Option<&'static str>,
    group_fetch_strategy: Option<GroupFetchStrategy>,
    account_control_evaluator: Option<AccountControlEvaluatorProperty>,
}

impl Template {
    fn patch(self) -> TemplatePatch {
        match self {
            Template::ActiveDirectory => TemplatePatch {
                user_object_class: Some("user"),
                username_attribute: Some("sAMAccountName"),
                real_name_attribute: Some("cn"),
                email_attribute: Some("mail"),
                user_find_one_search_scope: Some(SearchScope::OneLevel),
                member_attribute: Some("memberOf"),
                group_fetch_strategy: Some(GroupFetchStrategy::UserContainsGroups),
                account_control_evaluator: Some(AccountControlEvaluatorProperty::ActiveDirectory),
            },
            Template::OpenLdap => TemplatePatch {
                user_object_class: Some("inetOrgPerson"),
                username_attribute: Some("uid"),
                real_name_attribute: Some("cn"),
                email_attribute: Some("mail"),
                user_find_one_search_scope: Some(SearchScope::OneLevel),
                member_attribute: Some("memberOf"),
                group_fetch_strategy: Some(GroupFetchStrategy::UserContainsGroups),
                account_control_evaluator: None,
            },
            Template::UserContainsGroups => TemplatePatch {
                group_fetch_strategy: Some(GroupFetchStrategy::UserContainsGroups),
                ..TemplatePatch::default()
            },
            Template::GroupContainsUsers => TemplatePatch {
                group_fetch_strategy: Some(GroupFetchStrategy::GroupContainsUsers),
                ..TemplatePatch::default()
            },
        }
    }
}

fn overlay_str(field: &mut String, default: Option<&'static str>) {
    if field.is_empty() {
        if let Some(value) = default {
            *field = value.to_owned();
        }
    }
}

fn overlay_opt<T>(field: &mut Option<T>, default: Option<T>) {
    if field.is_none() {
        *field = default;
    }
}

/// Settings of one directory realm, shared read-only by the engine.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, derive_builder::Builder)]
#[builder(pattern = "owned")]
pub struct AuthenticationProperties {
    #[builder(default = "Template::ActiveDirectory")]
    pub template: Template,
    #[builder(default)]
    pub username_to_bind_dn_converter: Option<UsernameToBindDnConverterProperty>,
    /// Subtree holding the user entries, like `ou=people,dc=example,dc=org`.
    /// Always required.
    #[builder(default)]
    pub user_base_dn: String,
    #[builder(default)]
    pub user_object_class: String,
    #[builder(default)]
    pub username_attribute: String,
    /// RDN attribute used to build the bind DN, normally the same as the
    /// username attribute.
    #[builder(default)]
    pub user_rdn_attribute: String,
    /// When set, authentication compares this attribute against the encoded
    /// password using a service-account connection instead of binding as the
    /// user.
    #[builder(default)]
    pub password_attribute: String,
    /// Filter to find the user, `{0}` is the username. When empty it is
    /// generated from the object class and the username attribute, like
    /// `(&(objectClass=inetOrgPerson)(uid={0}))`.
    #[builder(default)]
    pub user_find_one_filter: String,
    #[builder(default)]
    pub user_find_one_search_scope: Option<SearchScope>,
    #[builder(default)]
    pub real_name_attribute: String,
    #[builder(default)]
    pub email_attribute: String,
    #[builder(default)]
    pub account_control_evaluator: Option<AccountControlEvaluatorProperty>,
    #[builder(default = "true")]
    pub ldap_groups_to_roles_mapping_enabled: bool,
    #[builder(default)]
    pub group_fetch_strategy: Option<GroupFetchStrategy>,
    /// Attribute of the user entry holding its groups, used with
    /// `USER_CONTAINS_GROUPS`.
    #[builder(default)]
    pub member_attribute: String,
    #[builder(default)]
    pub group_base_dn: String,
    #[builder(default)]
    pub group_search_scope: Option<SearchScope>,
    #[builder(default)]
    pub group_object_class: String,
    #[builder(default)]
    pub group_id_attribute: String,
    #[builder(default)]
    pub group_member_attribute: String,
    /// Format of the member values of a group entry, with `${username}` as
    /// placeholder. When empty the user DN is expected instead.
    #[builder(default)]
    pub group_member_format: String,
    #[builder(default)]
    pub group_to_role_mapping: Vec<GroupToRoleMapping>,
    /// Roles granted to every authenticated user, taken verbatim.
    #[builder(default)]
    pub default_roles: Vec<String>,
    #[builder(default)]
    pub role_prefix: String,
    #[builder(default = "CaseTransformation::None")]
    pub role_case_transformation: CaseTransformation,
    #[builder(default)]
    pub role_string_replacements: Vec<StringReplacement>,
}

impl std::default::Default for AuthenticationProperties {
    fn default() -> Self {
        AuthenticationPropertiesBuilder::default().build().unwrap()
    }
}

impl AuthenticationProperties {
    /// Fills every unset field covered by the configured template.
    pub fn with_template_applied(mut self) -> Self {
        let patch = self.template.patch();
        overlay_str(&mut self.user_object_class, patch.user_object_class);
        overlay_str(&mut self.username_attribute, patch.username_attribute);
        overlay_str(&mut self.real_name_attribute, patch.real_name_attribute);
        overlay_str(&mut self.email_attribute, patch.email_attribute);
        overlay_opt(
            &mut self.user_find_one_search_scope,
            patch.user_find_one_search_scope,
        );
        overlay_str(&mut self.member_attribute, patch.member_attribute);
        overlay_opt(&mut self.group_fetch_strategy, patch.group_fetch_strategy);
        overlay_opt(
            &mut self.account_control_evaluator,
            patch.account_control_evaluator,
        );
        self
    }

    /// The attribute compared against the encoded password, `None` in simple
    /// bind mode.
    pub fn compare_attribute(&self) -> Option<&str> {
        if self.password_attribute.trim().is_empty() {
            None
        } else {
            Some(&self.password_attribute)
        }
    }

    pub fn rdn_attribute(&self) -> &str {
        if self.user_rdn_attribute.is_empty() {
            &self.username_attribute
        } else {
            &self.user_rdn_attribute
        }
    }

    pub fn find_one_filter(&self) -> String {
        if self.user_find_one_filter.is_empty()
            && !self.user_object_class.is_empty()
            && !self.username_attribute.is_empty()
        {
            return format!(
                "(&(objectClass={})({}={{0}}))",
                self.user_object_class, self.username_attribute
            );
        }
        self.user_find_one_filter.clone()
    }

    pub fn find_one_scope(&self) -> SearchScope {
        self.user_find_one_search_scope
            .unwrap_or(SearchScope::OneLevel)
    }

    pub fn group_scope(&self) -> SearchScope {
        self.group_search_scope.unwrap_or(SearchScope::OneLevel)
    }

    pub fn evaluator(&self) -> AccountControlEvaluatorProperty {
        self.account_control_evaluator
            .unwrap_or(AccountControlEvaluatorProperty::None)
    }

    pub fn bind_dn_converter(&self) -> UsernameToBindDnConverterProperty {
        self.username_to_bind_dn_converter
            .unwrap_or(UsernameToBindDnConverterProperty::ByUserRdnAttribute)
    }
}

/// How to reach the directory server.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, derive_builder::Builder)]
#[builder(pattern = "owned")]
pub struct ConnectionProperties {
    #[builder(default = r#"String::from("ldap://localhost:389")"#)]
    pub ldap_url: String,
    #[builder(default = "60000")]
    pub connect_timeout_ms: u64,
    /// DN of the service account used in compare mode. Simple bind mode works
    /// without one.
    #[builder(default)]
    pub bind_dn: Option<String>,
    #[builder(default)]
    pub bind_credentials: Option<SecUtf8>,
}

impl std::default::Default for ConnectionProperties {
    fn default() -> Self {
        ConnectionPropertiesBuilder::default().build().unwrap()
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, derive_builder::Builder)]
#[builder(pattern = "owned")]
pub struct Configuration {
    #[builder(default)]
    pub connection: ConnectionProperties,
    #[builder(default)]
    pub authentication: AuthenticationProperties,
    #[builder(default = "false")]
    pub verbose: bool,
}

impl std::default::Default for Configuration {
    fn default() -> Self {
        ConfigurationBuilder::default().build().unwrap()
    }
}

pub fn init(config_file: &str) -> Result<Configuration> {
    let figment_config = Figment::from(Serialized::defaults(Configuration::default()))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed("LDAP_AUTH_").split("__"));
    let mut config: Configuration = figment_config.extract()?;
    config.authentication = config.authentication.with_template_applied();
    if config.verbose {
        println!("Configuration: {:#?}", &config);
    }
    Ok(config)
}

#[cfg(any(feature = "test", test))]
impl AuthenticationPropertiesBuilder {
    /// OpenLDAP-flavored properties with the template already applied.
    pub fn for_tests() -> AuthenticationProperties {
        AuthenticationPropertiesBuilder::default()
            .template(Template::OpenLdap)
            .user_base_dn("ou=people,dc=example,dc=org".to_owned())
            .build()
            .unwrap()
            .with_template_applied()
    }
}
