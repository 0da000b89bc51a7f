use itertools::Itertools;
use regex::Regex;

use crate::{
    configuration::{AuthenticationProperties, CaseTransformation, GroupToRoleMapping},
    errors::{AuthError, Result},
};

/// Turns raw group names into role names: mapping lookup, then the ordered
/// regex replacements, then the case transformation, then the prefix.
pub struct RoleNormalizer {
    mappings: Vec<GroupToRoleMapping>,
    replacements: Vec<(Regex, String)>,
    case_transformation: CaseTransformation,
    prefix: String,
    default_roles: Vec<String>,
}

impl RoleNormalizer {
    pub fn new(properties: &AuthenticationProperties) -> Result<Self> {
        let replacements = properties
            .role_string_replacements
            .iter()
            .map(|replacement| {
                let regex = Regex::new(&replacement.regex).map_err(|e| {
                    AuthError::Configuration(format!(
                        "Invalid role replacement regex `{}`: {}",
                        replacement.regex, e
                    ))
                })?;
                Ok((regex, replacement.replacement.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            mappings: properties.group_to_role_mapping.clone(),
            replacements,
            case_transformation: properties.role_case_transformation,
            prefix: properties.role_prefix.clone(),
            default_roles: properties.default_roles.clone(),
        })
    }

    /// Maps a group name through the configured mapping, then normalizes the
    /// result. Group names are compared case-insensitively, mappings with an
    /// empty role name are skipped.
    pub fn map_group_to_role(&self, group_name: &str) -> String {
        let role_name = self
            .mappings
            .iter()
            .filter(|mapping| group_name.eq_ignore_ascii_case(&mapping.group_name))
            .map(|mapping| mapping.role_name.as_str())
            .find(|role_name| !role_name.trim().is_empty())
            .unwrap_or(group_name);
        self.normalize(role_name)
    }

    fn normalize(&self, role_name: &str) -> String {
        let mut normalized = role_name.to_owned();
        for (regex, replacement) in &self.replacements {
            normalized = regex
                .replace_all(&normalized, replacement.as_str())
                .into_owned();
        }
        normalized = match self.case_transformation {
            CaseTransformation::None => normalized,
            CaseTransformation::ToUpperCase => normalized.to_uppercase(),
            CaseTransformation::ToLowerCase => normalized.to_lowercase(),
        };
        if self.prefix.is_empty() || normalized.starts_with(&self.prefix) {
            normalized
        } else {
            format!("{}{}", self.prefix, normalized)
        }
    }

    /// Default roles verbatim first, then the normalized group roles,
    /// deduplicated keeping the first occurrence.
    pub fn all_roles(&self, group_names: impl IntoIterator<Item = String>) -> Vec<String> {
        self.default_roles
            .iter()
            .cloned()
            .chain(
                group_names
                    .into_iter()
                    .map(|group_name| self.map_group_to_role(&group_name)),
            )
            .unique()
            .collect()
    }
}
