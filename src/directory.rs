use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{exop::PasswordModify, LdapConnAsync, LdapConnSettings, SearchEntry, SearchOptions};
use tracing::{debug, instrument, warn};

use crate::{
    configuration::{ConnectionProperties, SearchScope},
    errors::{AuthError, Result},
};

impl From<SearchScope> for ldap3::Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => ldap3::Scope::Base,
            SearchScope::OneLevel => ldap3::Scope::OneLevel,
            SearchScope::Subtree => ldap3::Scope::Subtree,
        }
    }
}

/// Owned view of a directory entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// First value of the attribute. Attribute names are matched
    /// case-insensitively, like the directory does.
    pub fn attr_first(&self, name: &str) -> Option<&str> {
        self.attr_values(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn attr_all(&self, name: &str) -> Vec<String> {
        self.attr_values(name).cloned().unwrap_or_default()
    }

    fn attr_values(&self, name: &str) -> Option<&Vec<String>> {
        self.attrs.get(name).or_else(|| {
            self.attrs
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, values)| values)
        })
    }
}

impl From<SearchEntry> for DirectoryEntry {
    fn from(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attrs: entry.attrs,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindRequest {
    pub dn: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
    pub base: String,
    pub scope: SearchScope,
    pub filter: String,
    pub attrs: Vec<String>,
    pub size_limit: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompareRequest {
    pub dn: String,
    pub attribute: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModifyPasswordRequest {
    pub dn: String,
    pub old_password: String,
    pub new_password: String,
}

/// One live connection to the directory. The engine opens exactly one per
/// authentication attempt and unbinds it on every exit path.
#[async_trait]
pub trait DirectoryClient: Send {
    async fn simple_bind(&mut self, request: BindRequest) -> Result<()>;
    async fn search(&mut self, request: SearchRequest) -> Result<Vec<DirectoryEntry>>;
    async fn compare(&mut self, request: CompareRequest) -> Result<bool>;
    async fn modify_password(&mut self, request: ModifyPasswordRequest) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

/// Opens directory connections.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DirectoryClient>>;
}

pub struct Ldap3Client {
    ldap: ldap3::Ldap,
}

#[async_trait]
impl DirectoryClient for Ldap3Client {
    async fn simple_bind(&mut self, request: BindRequest) -> Result<()> {
        self.ldap
            .simple_bind(&request.dn, &request.password)
            .await?
            .success()?;
        debug!(dn = %request.dn, "bound to directory");
        Ok(())
    }

    async fn search(&mut self, request: SearchRequest) -> Result<Vec<DirectoryEntry>> {
        let SearchRequest {
            base,
            scope,
            filter,
            attrs,
            size_limit,
        } = request;
        // In the wire protocol a size limit of zero means unlimited.
        let options = SearchOptions::new().sizelimit(size_limit.unwrap_or(0));
        let ldap3::SearchResult(entries, result) = self
            .ldap
            .with_search_options(options)
            .search(&base, scope.into(), &filter, attrs)
            .await?;
        // Size limit exceeded (rc 4) still carries the entries that fit the
        // limit, which is all a find-one asked for.
        if result.rc != 0 && result.rc != 4 {
            return Err(AuthError::Directory(ldap3::LdapError::LdapResult {
                result,
            }));
        }
        Ok(entries
            .into_iter()
            .map(|entry| SearchEntry::construct(entry).into())
            .collect())
    }

    async fn compare(&mut self, request: CompareRequest) -> Result<bool> {
        let outcome = self
            .ldap
            .compare(
                &request.dn,
                &request.attribute,
                request.value.as_bytes(),
            )
            .await?
            .equal()?;
        Ok(outcome)
    }

    async fn modify_password(&mut self, request: ModifyPasswordRequest) -> Result<()> {
        self.ldap
            .extended(PasswordModify {
                user_id: Some(&request.dn),
                old_pass: Some(&request.old_password),
                new_pass: Some(&request.new_password),
            })
            .await?
            .success()?;
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        self.ldap.unbind().await?;
        Ok(())
    }
}

/// Connects to the server named by [`ConnectionProperties`].
pub struct Ldap3Connector {
    connection: ConnectionProperties,
}

impl Ldap3Connector {
    pub fn new(connection: ConnectionProperties) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    #[instrument(skip_all, level = "debug", err)]
    async fn connect(&self) -> Result<Box<dyn DirectoryClient>> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_millis(self.connection.connect_timeout_ms));
        let (conn, ldap) =
            LdapConnAsync::with_settings(settings, &self.connection.ldap_url).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("directory connection error: {}", e);
            }
        });
        debug!(url = %self.connection.ldap_url, "connected to directory");
        Ok(Box::new(Ldap3Client { ldap }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry_with(dn: &str, attr: &str, values: &[&str]) -> DirectoryEntry {
        DirectoryEntry {
            dn: dn.to_owned(),
            attrs: HashMap::from([(
                attr.to_owned(),
                values.iter().map(|v| v.to_string()).collect(),
            )]),
        }
    }

    #[test]
    fn test_attr_lookup_is_case_insensitive() {
        let entry = entry_with("uid=bob,ou=people,dc=example,dc=org", "memberOf", &["cn=g"]);
        assert_eq!(entry.attr_first("memberof"), Some("cn=g"));
        assert_eq!(entry.attr_first("MEMBEROF"), Some("cn=g"));
        assert_eq!(entry.attr_first("mail"), None);
    }

    #[test]
    fn test_attr_all_returns_every_value() {
        let entry = entry_with("cn=g,ou=groups,dc=example,dc=org", "member", &["a", "b"]);
        assert_eq!(entry.attr_all("member"), vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(entry.attr_all("owner"), Vec::<String>::new());
    }

    #[test]
    fn test_scope_conversion() {
        assert!(matches!(
            ldap3::Scope::from(SearchScope::Base),
            ldap3::Scope::Base
        ));
        assert!(matches!(
            ldap3::Scope::from(SearchScope::OneLevel),
            ldap3::Scope::OneLevel
        ));
        assert!(matches!(
            ldap3::Scope::from(SearchScope::Subtree),
            ldap3::Scope::Subtree
        ));
    }
}
