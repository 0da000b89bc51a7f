use tracing::{debug, instrument};

use crate::{
    configuration::{AuthenticationProperties, GroupFetchStrategy},
    directory::{DirectoryClient, DirectoryEntry, SearchRequest},
    dn::first_rdn_value,
    errors::Result,
};

pub const USERNAME_PLACEHOLDER: &str = "${username}";

/// Raw group names of the user, per the configured fetch strategy. Performs
/// no directory I/O unless the strategy needs the one group search.
#[instrument(skip_all, level = "debug", err)]
pub async fn resolve_groups(
    client: &mut dyn DirectoryClient,
    properties: &AuthenticationProperties,
    user: &DirectoryEntry,
    username: &str,
) -> Result<Vec<String>> {
    if !properties.ldap_groups_to_roles_mapping_enabled {
        return Ok(vec![]);
    }
    let groups = match properties.group_fetch_strategy {
        None => vec![],
        Some(GroupFetchStrategy::UserContainsGroups) => groups_in_user(properties, user),
        Some(GroupFetchStrategy::GroupContainsUsers) => {
            groups_with_user(client, properties, user, username).await?
        }
    };
    debug!(?groups);
    Ok(groups)
}

/// Reads the group DNs off the user entry and keeps their first RDN value.
fn groups_in_user(properties: &AuthenticationProperties, user: &DirectoryEntry) -> Vec<String> {
    user.attr_all(&properties.member_attribute)
        .into_iter()
        .map(|group_dn| first_rdn_value(&group_dn))
        .collect()
}

async fn groups_with_user(
    client: &mut dyn DirectoryClient,
    properties: &AuthenticationProperties,
    user: &DirectoryEntry,
    username: &str,
) -> Result<Vec<String>> {
    let groups = client
        .search(SearchRequest {
            base: properties.group_base_dn.clone(),
            scope: properties.group_scope(),
            filter: group_filter(properties, user, username),
            attrs: vec!["*".to_owned()],
            size_limit: None,
        })
        .await?;
    Ok(groups
        .iter()
        .map(|group| group_name(properties, group))
        .collect())
}

fn group_filter(
    properties: &AuthenticationProperties,
    user: &DirectoryEntry,
    username: &str,
) -> String {
    let member_value = if properties.group_member_format.is_empty() {
        user.dn.clone()
    } else {
        let username = user
            .attr_first(&properties.username_attribute)
            .unwrap_or(username);
        properties
            .group_member_format
            .replacen(USERNAME_PLACEHOLDER, username, 1)
    };
    format!(
        "(&(objectClass={})({}={}))",
        properties.group_object_class, properties.group_member_attribute, member_value
    )
}

fn group_name(properties: &AuthenticationProperties, group: &DirectoryEntry) -> String {
    let fallback = first_rdn_value(&group.dn);
    if properties.group_id_attribute.is_empty() {
        return fallback;
    }
    group
        .attr_first(&properties.group_id_attribute)
        .map(str::to_owned)
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{AuthenticationPropertiesBuilder, SearchScope, Template};
    use crate::test_utils::{entry as user_entry, MockDirectoryClient};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_disabled_mapping_does_no_io() {
        let mut client = MockDirectoryClient::new();
        let props = AuthenticationPropertiesBuilder::default()
            .ldap_groups_to_roles_mapping_enabled(false)
            .build()
            .unwrap();
        let user = user_entry(
            "uid=bob,ou=people,dc=example,dc=org",
            &[("memberOf", &["cn=Developers,ou=groups,dc=example,dc=org"])],
        );
        let groups = resolve_groups(&mut client, &props, &user, "bob")
            .await
            .unwrap();
        assert_eq!(groups, Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_user_contains_groups() {
        let mut client = MockDirectoryClient::new();
        let props = AuthenticationPropertiesBuilder::default()
            .template(Template::OpenLdap)
            .build()
            .unwrap()
            .with_template_applied();
        let user = user_entry(
            "uid=bob,ou=people,dc=example,dc=org",
            &[(
                "memberOf",
                &[
                    "cn=Developers,ou=groups,dc=example,dc=org",
                    "cn=Admins,ou=groups,dc=example,dc=org",
                ],
            )],
        );
        let groups = resolve_groups(&mut client, &props, &user, "bob")
            .await
            .unwrap();
        assert_eq!(groups, vec!["Developers".to_owned(), "Admins".to_owned()]);
    }

    #[tokio::test]
    async fn test_unset_strategy_resolves_nothing() {
        let mut client = MockDirectoryClient::new();
        let props = AuthenticationPropertiesBuilder::default().build().unwrap();
        let user = user_entry("uid=bob,ou=people,dc=example,dc=org", &[]);
        let groups = resolve_groups(&mut client, &props, &user, "bob")
            .await
            .unwrap();
        assert_eq!(groups, Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_group_contains_users_by_dn() {
        let mut client = MockDirectoryClient::new();
        client
            .expect_search()
            .withf(|request: &SearchRequest| {
                request.base == "ou=groups,dc=example,dc=org"
                    && request.scope == SearchScope::OneLevel
                    && request.filter
                        == "(&(objectClass=groupOfNames)(member=uid=bob,ou=people,dc=example,dc=org))"
                    && request.size_limit.is_none()
            })
            .times(1)
            .return_once(|_| {
                Ok(vec![
                    user_entry(
                        "cn=Developers,ou=groups,dc=example,dc=org",
                        &[("ou", &["dev-team"])],
                    ),
                    user_entry("cn=Admins,ou=groups,dc=example,dc=org", &[]),
                ])
            });
        let props = AuthenticationPropertiesBuilder::default()
            .template(Template::GroupContainsUsers)
            .group_base_dn("ou=groups,dc=example,dc=org".to_owned())
            .group_object_class("groupOfNames".to_owned())
            .group_member_attribute("member".to_owned())
            .group_id_attribute("ou".to_owned())
            .build()
            .unwrap()
            .with_template_applied();
        let user = user_entry("uid=bob,ou=people,dc=example,dc=org", &[]);
        let groups = resolve_groups(&mut client, &props, &user, "bob")
            .await
            .unwrap();
        // First group has the id attribute, the second falls back to its RDN.
        assert_eq!(groups, vec!["dev-team".to_owned(), "Admins".to_owned()]);
    }

    #[tokio::test]
    async fn test_group_contains_users_with_member_format() {
        let mut client = MockDirectoryClient::new();
        client
            .expect_search()
            .withf(|request: &SearchRequest| {
                request.filter
                    == "(&(objectClass=posixGroup)(memberUid=uid=bob,ou=unused))"
            })
            .times(1)
            .return_once(|_| Ok(vec![]));
        let props = AuthenticationPropertiesBuilder::default()
            .template(Template::GroupContainsUsers)
            .username_attribute("uid".to_owned())
            .group_base_dn("ou=groups,dc=example,dc=org".to_owned())
            .group_object_class("posixGroup".to_owned())
            .group_member_attribute("memberUid".to_owned())
            .group_member_format("uid=${username},ou=unused".to_owned())
            .build()
            .unwrap()
            .with_template_applied();
        let user = user_entry("uid=ignored,ou=people,dc=example,dc=org", &[("uid", &["bob"])]);
        let groups = resolve_groups(&mut client, &props, &user, "fallback")
            .await
            .unwrap();
        assert_eq!(groups, Vec::<String>::new());
    }

    #[test]
    fn test_group_filter_falls_back_to_supplied_username() {
        let props = AuthenticationPropertiesBuilder::default()
            .username_attribute("uid".to_owned())
            .group_object_class("posixGroup".to_owned())
            .group_member_attribute("memberUid".to_owned())
            .group_member_format("${username}".to_owned())
            .build()
            .unwrap();
        let user = DirectoryEntry {
            dn: "uid=bob,ou=people,dc=example,dc=org".to_owned(),
            attrs: HashMap::new(),
        };
        assert_eq!(
            group_filter(&props, &user, "bob"),
            "(&(objectClass=posixGroup)(memberUid=bob))"
        );
    }
}
