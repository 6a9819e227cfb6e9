//! Resource kinds and the nested-field kind lookup table.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

/// Every resource kind the client core knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Account,
    Group,
    Directory,
    Application,
    Organization,
    Tenant,
    CustomData,
    AccountStoreMapping,
    GroupMembership,
    ApiKey,
    Provider,
    ProviderData,
    PasswordPolicy,
    AccountCreationPolicy,
    PasswordResetToken,
    EmailVerificationToken,
    EmailVerificationRequest,
    AuthenticationResult,
    ProviderAccountResult,
}

impl ResourceKind {
    /// Name of the cache region holding entries of this kind.
    pub fn region(self) -> &'static str {
        match self {
            ResourceKind::Account => "accounts",
            ResourceKind::Group => "groups",
            ResourceKind::Directory => "directories",
            ResourceKind::Application => "applications",
            ResourceKind::Organization => "organizations",
            ResourceKind::Tenant => "tenants",
            ResourceKind::CustomData => "customData",
            ResourceKind::AccountStoreMapping => "accountStoreMappings",
            ResourceKind::GroupMembership => "groupMemberships",
            ResourceKind::ApiKey => "apiKeys",
            ResourceKind::Provider => "providers",
            ResourceKind::ProviderData => "providerData",
            ResourceKind::PasswordPolicy => "passwordPolicies",
            ResourceKind::AccountCreationPolicy => "accountCreationPolicies",
            ResourceKind::PasswordResetToken => "passwordResetTokens",
            ResourceKind::EmailVerificationToken => "emailVerificationTokens",
            ResourceKind::EmailVerificationRequest => "emailVerificationRequests",
            ResourceKind::AuthenticationResult => "authenticationResults",
            ResourceKind::ProviderAccountResult => "providerAccountResults",
        }
    }

    /// Tokens and authentication outcomes must always be fetched fresh.
    pub fn is_cacheable(self) -> bool {
        !matches!(
            self,
            ResourceKind::PasswordResetToken
                | ResourceKind::EmailVerificationToken
                | ResourceKind::EmailVerificationRequest
                | ResourceKind::AuthenticationResult
                | ResourceKind::ProviderAccountResult
        )
    }

    /// Kinds that own a `customData` sub-resource.
    pub fn is_extendable(self) -> bool {
        matches!(
            self,
            ResourceKind::Account
                | ResourceKind::Group
                | ResourceKind::Directory
                | ResourceKind::Application
                | ResourceKind::Organization
                | ResourceKind::Tenant
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.region())
    }
}

/// What a nested field holds: one resource or a collection of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Instance(ResourceKind),
    Collection(ResourceKind),
}

impl Shape {
    pub fn kind(self) -> ResourceKind {
        match self {
            Shape::Instance(kind) | Shape::Collection(kind) => kind,
        }
    }
}

/// Resolves the kind of nested resources found inside a response body.
///
/// Lookup order is field name first, then the href path (for fields such as
/// `accountStore` whose kind depends on the instance).
#[derive(Debug, Clone)]
pub struct KindTable {
    fields: HashMap<String, Shape>,
    segments: HashMap<String, ResourceKind>,
    singletons: HashMap<String, ResourceKind>,
}

impl KindTable {
    pub fn empty() -> Self {
        Self {
            fields: HashMap::new(),
            segments: HashMap::new(),
            singletons: HashMap::new(),
        }
    }

    /// Map a nested field name to the shape it holds.
    pub fn with_field(mut self, name: impl Into<String>, shape: Shape) -> Self {
        self.fields.insert(name.into(), shape);
        self
    }

    /// Map a collection path segment (`/accounts/{id}`) to a kind.
    pub fn with_segment(mut self, segment: impl Into<String>, kind: ResourceKind) -> Self {
        self.segments.insert(segment.into(), kind);
        self
    }

    /// Map a trailing singleton path segment (`/accounts/{id}/customData`) to a kind.
    pub fn with_singleton(mut self, segment: impl Into<String>, kind: ResourceKind) -> Self {
        self.singletons.insert(segment.into(), kind);
        self
    }

    pub fn field(&self, name: &str) -> Option<Shape> {
        self.fields.get(name).copied()
    }

    /// Infer the kind of an instance from its href.
    pub fn kind_for_href(&self, href: &str) -> Option<ResourceKind> {
        let path = super::entry::canonical_key(href);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [.., last] if self.singletons.contains_key(*last) => {
                self.singletons.get(*last).copied()
            }
            [.., collection, _id] => self.segments.get(*collection).copied(),
            _ => None,
        }
    }

    /// Resolve the shape of the value stored under `field`, falling back to
    /// the href of the value itself.
    pub fn resolve(&self, field: &str, href: Option<&str>) -> Option<Shape> {
        self.field(field)
            .or_else(|| href.and_then(|h| self.kind_for_href(h)).map(Shape::Instance))
    }
}

impl Default for KindTable {
    fn default() -> Self {
        use ResourceKind::*;

        let table = Self::empty()
            .with_field("account", Shape::Instance(Account))
            .with_field("group", Shape::Instance(Group))
            .with_field("directory", Shape::Instance(Directory))
            .with_field("application", Shape::Instance(Application))
            .with_field("organization", Shape::Instance(Organization))
            .with_field("tenant", Shape::Instance(Tenant))
            .with_field("customData", Shape::Instance(CustomData))
            .with_field("provider", Shape::Instance(Provider))
            .with_field("providerData", Shape::Instance(ProviderData))
            .with_field("passwordPolicy", Shape::Instance(PasswordPolicy))
            .with_field("accountCreationPolicy", Shape::Instance(AccountCreationPolicy))
            .with_field(
                "defaultAccountStoreMapping",
                Shape::Instance(AccountStoreMapping),
            )
            .with_field(
                "defaultGroupStoreMapping",
                Shape::Instance(AccountStoreMapping),
            )
            .with_field("accounts", Shape::Collection(Account))
            .with_field("groups", Shape::Collection(Group))
            .with_field("directories", Shape::Collection(Directory))
            .with_field("applications", Shape::Collection(Application))
            .with_field("organizations", Shape::Collection(Organization))
            .with_field("groupMemberships", Shape::Collection(GroupMembership))
            .with_field("accountMemberships", Shape::Collection(GroupMembership))
            .with_field("accountStoreMappings", Shape::Collection(AccountStoreMapping))
            .with_field("apiKeys", Shape::Collection(ApiKey));

        [
            ("accounts", Account),
            ("groups", Group),
            ("directories", Directory),
            ("applications", Application),
            ("organizations", Organization),
            ("tenants", Tenant),
            ("accountStoreMappings", AccountStoreMapping),
            ("groupMemberships", GroupMembership),
            ("apiKeys", ApiKey),
            ("passwordPolicies", PasswordPolicy),
            ("accountCreationPolicies", AccountCreationPolicy),
            ("passwordResetTokens", PasswordResetToken),
            ("emailVerificationTokens", EmailVerificationToken),
        ]
        .into_iter()
        .fold(table, |table, (segment, kind)| table.with_segment(segment, kind))
        .with_singleton("customData", CustomData)
        .with_singleton("provider", Provider)
        .with_singleton("providerData", ProviderData)
    }
}
