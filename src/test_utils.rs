use crate::{
    directory::{
        BindRequest, CompareRequest, DirectoryClient, DirectoryConnector, DirectoryEntry,
        ModifyPasswordRequest, SearchRequest,
    },
    errors::Result,
};
use async_trait::async_trait;

mockall::mock! {
    pub DirectoryClient{}
    #[async_trait]
    impl DirectoryClient for DirectoryClient {
        async fn simple_bind(&mut self, request: BindRequest) -> Result<()>;
        async fn search(&mut self, request: SearchRequest) -> Result<Vec<DirectoryEntry>>;
        async fn compare(&mut self, request: CompareRequest) -> Result<bool>;
        async fn modify_password(&mut self, request: ModifyPasswordRequest) -> Result<()>;
        async fn unbind(&mut self) -> Result<()>;
    }
}

mockall::mock! {
    pub DirectoryConnector{}
    #[async_trait]
    impl DirectoryConnector for DirectoryConnector {
        async fn connect(&self) -> Result<Box<dyn DirectoryClient>>;
    }
}

pub fn entry(dn: &str, attrs: &[(&str, &[&str])]) -> DirectoryEntry {
    DirectoryEntry {
        dn: dn.to_owned(),
        attrs: attrs
            .iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    values.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect(),
    }
}

pub fn ldap_result_error(rc: u32, text: &str) -> ldap3::LdapError {
    ldap3::LdapError::LdapResult {
        result: ldap3::LdapResult {
            rc,
            matched: String::new(),
            text: text.to_owned(),
            refs: vec![],
            ctrls: vec![],
        },
    }
}
