//! Field and expansion tables for queryable collections.
//!
//! These tables are plain values handed to the compiler at construction, so
//! two clients in one process can run with different schemas.

use std::collections::HashMap;

use crate::cache::ResourceKind;

/// How a field's values are compared and rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// Enumerated status-like value, rendered uppercase.
    Enum,
    Date,
    Number,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Name used on the wire.
    pub wire: String,
    pub kind: FieldKind,
}

/// Queryable fields of one collection, looked up case-insensitively by
/// member name or wire name.
#[derive(Debug, Clone, Default)]
pub struct FieldTable {
    by_name: HashMap<String, FieldDef>,
}

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, wire: &str, kind: FieldKind) -> Self {
        self.by_name.insert(
            wire.to_ascii_lowercase(),
            FieldDef {
                wire: wire.to_string(),
                kind,
            },
        );
        self
    }

    /// Register an extra member name for an existing wire field.
    pub fn alias(mut self, member: &str, wire: &str) -> Self {
        if let Some(def) = self.by_name.get(&wire.to_ascii_lowercase()).cloned() {
            self.by_name.insert(member.to_ascii_lowercase(), def);
        }
        self
    }

    pub fn lookup(&self, member: &str) -> Option<&FieldDef> {
        self.by_name.get(&member.to_ascii_lowercase())
    }
}

/// Whether an expandable property is a single link or a sub-collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionKind {
    Link,
    Collection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionDef {
    pub wire: String,
    pub kind: ExpansionKind,
}

#[derive(Debug, Clone, Default)]
pub struct ExpansionTable {
    by_name: HashMap<String, ExpansionDef>,
}

impl ExpansionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(self, wire: &str) -> Self {
        self.with(wire, ExpansionKind::Link)
    }

    pub fn collection(self, wire: &str) -> Self {
        self.with(wire, ExpansionKind::Collection)
    }

    fn with(mut self, wire: &str, kind: ExpansionKind) -> Self {
        self.by_name.insert(
            wire.to_ascii_lowercase(),
            ExpansionDef {
                wire: wire.to_string(),
                kind,
            },
        );
        self
    }

    pub fn lookup(&self, member: &str) -> Option<&ExpansionDef> {
        self.by_name.get(&member.to_ascii_lowercase())
    }
}

/// Query schema for one resource collection.
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub kind: ResourceKind,
    pub fields: FieldTable,
    pub expansions: ExpansionTable,
}

impl ResourceSchema {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            fields: FieldTable::new(),
            expansions: ExpansionTable::new(),
        }
    }

    pub fn fields(mut self, fields: FieldTable) -> Self {
        self.fields = fields;
        self
    }

    pub fn expansions(mut self, expansions: ExpansionTable) -> Self {
        self.expansions = expansions;
        self
    }
}

/// Schemas for every queryable collection.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<ResourceKind, ResourceSchema>,
}

impl SchemaRegistry {
    pub fn empty() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    pub fn register(mut self, schema: ResourceSchema) -> Self {
        self.schemas.insert(schema.kind, schema);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&ResourceSchema> {
        self.schemas.get(&kind)
    }
}

fn audited(fields: FieldTable) -> FieldTable {
    fields
        .with("createdAt", FieldKind::Date)
        .with("modifiedAt", FieldKind::Date)
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        use FieldKind::*;

        let account = ResourceSchema::new(ResourceKind::Account)
            .fields(
                audited(FieldTable::new())
                    .with("email", String)
                    .with("username", String)
                    .with("givenName", String)
                    .with("middleName", String)
                    .with("surname", String)
                    .with("status", Enum)
                    .alias("firstName", "givenName")
                    .alias("lastName", "surname"),
            )
            .expansions(
                ExpansionTable::new()
                    .link("directory")
                    .link("tenant")
                    .link("customData")
                    .link("providerData")
                    .collection("groups")
                    .collection("groupMemberships")
                    .collection("applications")
                    .collection("apiKeys"),
            );

        let group = ResourceSchema::new(ResourceKind::Group)
            .fields(
                audited(FieldTable::new())
                    .with("name", String)
                    .with("description", String)
                    .with("status", Enum),
            )
            .expansions(
                ExpansionTable::new()
                    .link("directory")
                    .link("tenant")
                    .link("customData")
                    .collection("accounts")
                    .collection("accountMemberships"),
            );

        let directory = ResourceSchema::new(ResourceKind::Directory)
            .fields(
                audited(FieldTable::new())
                    .with("name", String)
                    .with("description", String)
                    .with("status", Enum),
            )
            .expansions(
                ExpansionTable::new()
                    .link("tenant")
                    .link("customData")
                    .link("provider")
                    .link("passwordPolicy")
                    .link("accountCreationPolicy")
                    .collection("accounts")
                    .collection("groups"),
            );

        let application = ResourceSchema::new(ResourceKind::Application)
            .fields(
                audited(FieldTable::new())
                    .with("name", String)
                    .with("description", String)
                    .with("status", Enum),
            )
            .expansions(
                ExpansionTable::new()
                    .link("tenant")
                    .link("customData")
                    .link("defaultAccountStoreMapping")
                    .link("defaultGroupStoreMapping")
                    .collection("accounts")
                    .collection("groups")
                    .collection("accountStoreMappings"),
            );

        let organization = ResourceSchema::new(ResourceKind::Organization)
            .fields(
                audited(FieldTable::new())
                    .with("name", String)
                    .with("nameKey", String)
                    .with("description", String)
                    .with("status", Enum),
            )
            .expansions(
                ExpansionTable::new()
                    .link("tenant")
                    .link("customData")
                    .link("defaultAccountStoreMapping")
                    .link("defaultGroupStoreMapping")
                    .collection("accounts")
                    .collection("groups")
                    .collection("accountStoreMappings"),
            );

        let api_key = ResourceSchema::new(ResourceKind::ApiKey)
            .fields(
                FieldTable::new()
                    .with("id", String)
                    .with("status", Enum),
            )
            .expansions(ExpansionTable::new().link("account").link("tenant"));

        Self::empty()
            .register(account)
            .register(group)
            .register(directory)
            .register(application)
            .register(organization)
            .register(api_key)
    }
}
