use tracing::{debug, instrument};

use crate::{
    account_control::{evaluator_for, AccountControlEvaluator},
    bind_dn::{converter_for, UsernameToBindDnConverter},
    configuration::{
        AuthenticationProperties, Configuration, ConnectionProperties, GroupFetchStrategy,
    },
    directory::{
        BindRequest, CompareRequest, DirectoryClient, DirectoryConnector, DirectoryEntry,
        Ldap3Connector, ModifyPasswordRequest, SearchRequest,
    },
    errors::{AuthError, Result},
    groups::resolve_groups,
    password::PasswordEncoder,
    roles::RoleNormalizer,
};

/// Outcome of a successful authentication. The raw password is not retained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationResult {
    /// Value of the username attribute on the entry, falling back to the
    /// supplied username.
    pub name: String,
    pub dn: String,
    pub real_name: Option<String>,
    pub email: Option<String>,
    /// Ordered, deduplicated role names.
    pub authorities: Vec<String>,
}

/// Authenticates users against the directory and derives their roles.
///
/// Every attempt opens exactly one connection and unbinds it on every exit
/// path. In simple bind mode the user's own bind is the password proof; in
/// compare mode a service account reads the entry and the configured password
/// attribute is compared against the encoded password.
pub struct Authenticator<Connector: DirectoryConnector> {
    connector: Connector,
    connection: ConnectionProperties,
    properties: AuthenticationProperties,
    bind_dn_converter: Box<dyn UsernameToBindDnConverter>,
    account_control: Box<dyn AccountControlEvaluator>,
    role_normalizer: RoleNormalizer,
    password_encoder: Option<Box<dyn PasswordEncoder>>,
}

impl Authenticator<Ldap3Connector> {
    pub fn from_configuration(
        config: Configuration,
        password_encoder: Option<Box<dyn PasswordEncoder>>,
    ) -> Result<Self> {
        let connector = Ldap3Connector::new(config.connection.clone());
        Self::new(
            connector,
            config.connection,
            config.authentication,
            password_encoder,
        )
    }
}

impl<Connector: DirectoryConnector> Authenticator<Connector> {
    /// Misconfigurations are fatal here, never per-request.
    pub fn new(
        connector: Connector,
        connection: ConnectionProperties,
        properties: AuthenticationProperties,
        password_encoder: Option<Box<dyn PasswordEncoder>>,
    ) -> Result<Self> {
        let properties = properties.with_template_applied();
        if connection.ldap_url.is_empty() {
            return Err(AuthError::Configuration(
                "The directory url must not be empty".to_owned(),
            ));
        }
        if let Some(attribute) = properties.compare_attribute() {
            if password_encoder.is_none() {
                return Err(AuthError::Configuration(format!(
                    "A password attribute is set ({}) but no password encoder is present. \
                     Either delete the password attribute to perform a bind to authenticate \
                     or set a password encoder",
                    attribute
                )));
            }
            if connection.bind_dn.is_none() {
                return Err(AuthError::Configuration(
                    "Password compare authentication requires a service account bind dn"
                        .to_owned(),
                ));
            }
        }
        if properties.ldap_groups_to_roles_mapping_enabled
            && properties.group_fetch_strategy == Some(GroupFetchStrategy::GroupContainsUsers)
            && (properties.group_object_class.is_empty()
                || properties.group_member_attribute.is_empty())
        {
            return Err(AuthError::Configuration(
                "Fetching groups that list their users requires a group object class \
                 and a group member attribute"
                    .to_owned(),
            ));
        }
        let bind_dn_converter = converter_for(&properties);
        let account_control = evaluator_for(properties.evaluator());
        let role_normalizer = RoleNormalizer::new(&properties)?;
        debug!(
            template = %properties.template,
            evaluator = %properties.evaluator(),
            "authentication engine configured"
        );
        Ok(Self {
            connector,
            connection,
            properties,
            bind_dn_converter,
            account_control,
            role_normalizer,
            password_encoder,
        })
    }

    /// Replaces the converter selected from the configuration.
    pub fn with_bind_dn_converter(
        mut self,
        converter: Box<dyn UsernameToBindDnConverter>,
    ) -> Self {
        self.bind_dn_converter = converter;
        self
    }

    /// Replaces the evaluator selected from the configuration.
    pub fn with_account_control_evaluator(
        mut self,
        evaluator: Box<dyn AccountControlEvaluator>,
    ) -> Self {
        self.account_control = evaluator;
        self
    }

    #[instrument(skip_all, level = "debug", err, fields(username = %username))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthenticationResult> {
        let mut client = self.connector.connect().await?;
        let result = self
            .run_authentication(&mut *client, username, password)
            .await;
        if let Err(e) = client.unbind().await {
            debug!("failed to unbind the connection: {}", e);
        }
        result
    }

    /// Proves the current password with a full authentication, then issues a
    /// password modify for the authenticated entry, on the same connection.
    #[instrument(skip_all, level = "debug", err, fields(username = %username))]
    pub async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let mut client = self.connector.connect().await?;
        let result = self
            .run_password_change(&mut *client, username, current_password, new_password)
            .await;
        if let Err(e) = client.unbind().await {
            debug!("failed to unbind the connection: {}", e);
        }
        result
    }

    async fn run_authentication(
        &self,
        client: &mut dyn DirectoryClient,
        username: &str,
        password: &str,
    ) -> Result<AuthenticationResult> {
        self.bind_connection(client, username, password).await?;
        let user = self.find_user(client, username).await?;
        self.check_password(client, &user, password).await?;
        self.check_account_control(&user)?;
        let groups = resolve_groups(client, &self.properties, &user, username).await?;
        let authorities = self.role_normalizer.all_roles(groups);
        Ok(self.to_result(user, username, authorities))
    }

    async fn run_password_change(
        &self,
        client: &mut dyn DirectoryClient,
        username: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let authenticated = self
            .run_authentication(client, username, current_password)
            .await?;
        client
            .modify_password(ModifyPasswordRequest {
                dn: authenticated.dn,
                old_password: current_password.to_owned(),
                new_password: new_password.to_owned(),
            })
            .await
    }

    /// In simple bind mode the user's credentials open the connection, which
    /// is already the password proof. In compare mode the service account
    /// does.
    async fn bind_connection(
        &self,
        client: &mut dyn DirectoryClient,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let request = match self.properties.compare_attribute() {
            None => BindRequest {
                dn: self.bind_dn_converter.convert(username)?,
                password: password.to_owned(),
            },
            Some(_) => BindRequest {
                dn: self.connection.bind_dn.clone().unwrap_or_default(),
                password: self
                    .connection
                    .bind_credentials
                    .as_ref()
                    .map(|credentials| credentials.unsecure().to_owned())
                    .unwrap_or_default(),
            },
        };
        client
            .simple_bind(request)
            .await
            .map_err(|e| e.classify_bind_failure())
    }

    async fn find_user(
        &self,
        client: &mut dyn DirectoryClient,
        username: &str,
    ) -> Result<DirectoryEntry> {
        let filter = self.properties.find_one_filter().replace("{0}", username);
        let entries = client
            .search(SearchRequest {
                base: self.properties.user_base_dn.clone(),
                scope: self.properties.find_one_scope(),
                filter,
                attrs: vec!["*".to_owned()],
                size_limit: Some(1),
            })
            .await
            // Some servers only surface a failed lazy bind here, wrapped in a
            // connect error, so the remap applies to the lookup as well.
            .map_err(|e| e.classify_bind_failure())?;
        match entries.into_iter().next() {
            Some(user) => {
                debug!(dn = %user.dn, "found user entry");
                Ok(user)
            }
            None => Err(AuthError::UserNotFound(username.to_owned())),
        }
    }

    async fn check_password(
        &self,
        client: &mut dyn DirectoryClient,
        user: &DirectoryEntry,
        password: &str,
    ) -> Result<()> {
        let attribute = match self.properties.compare_attribute() {
            None => return Ok(()),
            Some(attribute) => attribute,
        };
        let encoder = self.password_encoder.as_ref().ok_or_else(|| {
            AuthError::Configuration("No password encoder is present".to_owned())
        })?;
        let matches = client
            .compare(CompareRequest {
                dn: user.dn.clone(),
                attribute: attribute.to_owned(),
                value: encoder.encode(password),
            })
            .await?;
        if matches {
            Ok(())
        } else {
            Err(AuthError::BadCredentials)
        }
    }

    fn check_account_control(&self, user: &DirectoryEntry) -> Result<()> {
        if !self.account_control.is_enabled(user) {
            return Err(AuthError::Disabled);
        }
        if !self.account_control.is_account_non_locked(user) {
            return Err(AuthError::Locked);
        }
        if !self.account_control.is_account_non_expired(user) {
            return Err(AuthError::AccountExpired);
        }
        if !self.account_control.is_credentials_non_expired(user) {
            return Err(AuthError::CredentialsExpired);
        }
        Ok(())
    }

    fn to_result(
        &self,
        user: DirectoryEntry,
        username: &str,
        authorities: Vec<String>,
    ) -> AuthenticationResult {
        let name = user
            .attr_first(&self.properties.username_attribute)
            .unwrap_or(username)
            .to_owned();
        let real_name = user
            .attr_first(&self.properties.real_name_attribute)
            .map(str::to_owned);
        let email = user
            .attr_first(&self.properties.email_attribute)
            .map(str::to_owned);
        AuthenticationResult {
            name,
            dn: user.dn,
            real_name,
            email,
            authorities,
        }
    }
}
