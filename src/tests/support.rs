//! In-process identity server and helpers shared by the end-to-end tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::{
    cache::{CacheProvider, MemoryCache, ResourceKind, canonical_key},
    config::MemoryCacheConfig,
    datastore::DataStore,
    error::ClientResult,
    pagination::PaginatedCursor,
    query::Query,
    transport::{Action, AsyncTransport, Transport, TransportError, TransportRequest},
};

pub const APP_ACCOUNTS: &str = "/v1/applications/app1/accounts";
pub const DIRECTORY: &str = "/v1/directories/d1";

/// Page size applied when a listing request carries no `limit`.
pub const SERVER_DEFAULT_LIMIT: u64 = 25;
/// Largest `limit` the server honours.
pub const SERVER_MAX_LIMIT: u64 = 100;

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

pub fn account_href(index: usize) -> String {
    format!("/v1/accounts/a{index}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub action: Action,
    pub url: String,
}

#[derive(Default)]
struct State {
    resources: HashMap<String, Map<String, Value>>,
    collections: HashMap<String, Vec<String>>,
    requests: Vec<Recorded>,
    created: usize,
}

/// Fake identity server.
///
/// Accounts are returned with their directory and custom data expanded
/// inline, so every read exercises normalization. Listings honour `limit`
/// and `offset`; filters and ordering are ignored.
pub struct Backend {
    state: Mutex<State>,
}

impl Backend {
    pub fn with_accounts(count: usize) -> Arc<Self> {
        let mut state = State::default();

        state.resources.insert(
            DIRECTORY.to_string(),
            object(json!({
                "href": DIRECTORY,
                "name": "Imperial Directory",
                "status": "ENABLED"
            })),
        );

        let mut listing = Vec::with_capacity(count);
        for index in 0..count {
            let href = account_href(index);
            state.resources.insert(
                href.clone(),
                object(json!({
                    "href": href,
                    "username": format!("trooper{index}"),
                    "email": format!("trooper{index}@galacticempire.co"),
                    "status": "ENABLED",
                    "directory": {"href": DIRECTORY},
                    "customData": {
                        "href": format!("{href}/customData"),
                        "rank": "trooper"
                    },
                    "groups": {"href": format!("{href}/groups")}
                })),
            );
            listing.push(href);
        }
        state.collections.insert(APP_ACCOUNTS.to_string(), listing);

        for (href, body) in [
            (
                "/v1/passwordResetTokens/t1",
                json!({"href": "/v1/passwordResetTokens/t1", "email": "trooper0@galacticempire.co", "account": {"href": account_href(0)}}),
            ),
            (
                "/v1/accounts/emailVerificationTokens/v1",
                json!({"href": "/v1/accounts/emailVerificationTokens/v1", "account": {"href": account_href(0)}}),
            ),
            (
                "/v1/authenticationResults/r1",
                json!({"href": "/v1/authenticationResults/r1", "account": {"href": account_href(0)}}),
            ),
            (
                "/v1/providerAccountResults/p1",
                json!({"href": "/v1/providerAccountResults/p1", "newAccount": false, "account": {"href": account_href(0)}}),
            ),
        ] {
            state.resources.insert(href.to_string(), object(body));
        }

        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    /// Resource as the server holds it, with nested objects expanded.
    pub fn resource(&self, href: &str) -> Option<Map<String, Value>> {
        let state = self.state.lock().unwrap();
        state.resources.get(href).map(|r| expand(&state, r))
    }

    fn handle(&self, request: &TransportRequest) -> Result<Map<String, Value>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(Recorded {
            action: request.action,
            url: request.url(),
        });

        let path = canonical_key(&request.href);
        match request.action {
            Action::Read => {
                if let Some(listing) = state.collections.get(&path) {
                    return Ok(page(&state, &path, listing, request));
                }
                state
                    .resources
                    .get(&path)
                    .map(|r| expand(&state, r))
                    .ok_or(TransportError::NotFound(path))
            }
            Action::Create => {
                state.created += 1;
                let segment = path.rsplit('/').next().unwrap_or("resources");
                let href = format!("/v1/{segment}/created{}", state.created);
                let mut resource = request.body.clone().unwrap_or_default();
                resource.insert("href".to_string(), Value::String(href.clone()));
                if let Some(Value::Object(custom)) = resource.get_mut("customData") {
                    custom.insert(
                        "href".to_string(),
                        Value::String(format!("{href}/customData")),
                    );
                }
                state.resources.insert(href.clone(), resource.clone());
                if let Some(listing) = state.collections.get_mut(&path) {
                    listing.push(href);
                }
                Ok(resource)
            }
            Action::Update => {
                let changes = request.body.clone().unwrap_or_default();
                let resource = state
                    .resources
                    .get_mut(&path)
                    .ok_or_else(|| TransportError::NotFound(path.clone()))?;
                for (name, value) in changes {
                    match (resource.get_mut(&name), value) {
                        (Some(Value::Object(existing)), Value::Object(update)) => {
                            existing.extend(update);
                        }
                        (_, value) => {
                            resource.insert(name, value);
                        }
                    }
                }
                let updated = resource.clone();
                Ok(expand(&state, &updated))
            }
            Action::Delete => {
                if let Some((parent, property)) = path.split_once("/customData/") {
                    if let Some(Value::Object(custom)) = state
                        .resources
                        .get_mut(parent)
                        .and_then(|r| r.get_mut("customData"))
                    {
                        custom.remove(property);
                    }
                } else {
                    state.resources.remove(&path);
                    for listing in state.collections.values_mut() {
                        listing.retain(|href| *href != path);
                    }
                }
                Ok(Map::new())
            }
        }
    }
}

/// Replace the directory link with the full directory, the way an expanded
/// response would carry it.
fn expand(state: &State, resource: &Map<String, Value>) -> Map<String, Value> {
    let mut expanded = resource.clone();
    if let Some(Value::Object(link)) = expanded.get("directory")
        && let Some(Value::String(href)) = link.get("href")
        && let Some(directory) = state.resources.get(href)
    {
        let directory = Value::Object(directory.clone());
        expanded.insert("directory".to_string(), directory);
    }
    expanded
}

fn page(
    state: &State,
    href: &str,
    listing: &[String],
    request: &TransportRequest,
) -> Map<String, Value> {
    let arg = |name: &str| {
        request
            .query
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.value.parse::<u64>().ok())
    };
    let limit = arg("limit")
        .unwrap_or(SERVER_DEFAULT_LIMIT)
        .min(SERVER_MAX_LIMIT);
    let offset = arg("offset").unwrap_or(0);

    let items: Vec<Value> = listing
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .filter_map(|href| state.resources.get(href))
        .map(|r| Value::Object(expand(state, r)))
        .collect();

    object(json!({
        "href": href,
        "offset": offset,
        "limit": limit,
        "size": listing.len(),
        "items": items
    }))
}

impl Transport for Backend {
    fn execute(&self, request: &TransportRequest) -> Result<Map<String, Value>, TransportError> {
        self.handle(request)
    }
}

#[async_trait]
impl AsyncTransport for Backend {
    async fn execute(
        &self,
        request: &TransportRequest,
    ) -> Result<Map<String, Value>, TransportError> {
        tokio::task::yield_now().await;
        self.handle(request)
    }
}

pub fn memory_cache() -> Arc<MemoryCache> {
    Arc::new(MemoryCache::new(&MemoryCacheConfig::default()))
}

/// Data store wired to `backend` in both disciplines.
pub fn data_store(backend: &Arc<Backend>, cache: Option<&Arc<MemoryCache>>) -> DataStore {
    let store = DataStore::default()
        .with_transport(backend.clone())
        .with_async_transport(backend.clone());
    match cache {
        Some(cache) => store.with_cache(CacheProvider::memory(cache.clone())),
        None => store,
    }
}

/// Which calling convention a test drives the data store with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    Blocking,
    NonBlocking,
}

impl Discipline {
    pub async fn get(
        self,
        store: &DataStore,
        kind: ResourceKind,
        href: &str,
    ) -> ClientResult<Map<String, Value>> {
        match self {
            Discipline::Blocking => store.get(kind, href),
            Discipline::NonBlocking => store.get_async(kind, href).await,
        }
    }

    pub async fn create(
        self,
        store: &DataStore,
        kind: ResourceKind,
        href: &str,
        body: Map<String, Value>,
    ) -> ClientResult<Map<String, Value>> {
        match self {
            Discipline::Blocking => store.create(kind, href, body),
            Discipline::NonBlocking => store.create_async(kind, href, body).await,
        }
    }

    pub async fn update(
        self,
        store: &DataStore,
        kind: ResourceKind,
        href: &str,
        body: Map<String, Value>,
    ) -> ClientResult<Map<String, Value>> {
        match self {
            Discipline::Blocking => store.update(kind, href, body),
            Discipline::NonBlocking => store.update_async(kind, href, body).await,
        }
    }

    pub async fn delete(self, store: &DataStore, kind: ResourceKind, href: &str) -> ClientResult<()> {
        match self {
            Discipline::Blocking => store.delete(kind, href),
            Discipline::NonBlocking => store.delete_async(kind, href).await,
        }
    }

    pub async fn list(
        self,
        store: &DataStore,
        href: &str,
        query: Query,
    ) -> ClientResult<Vec<Map<String, Value>>> {
        match self {
            Discipline::Blocking => store.list(href, query),
            Discipline::NonBlocking => store.list_async(href, query).await,
        }
    }

    pub async fn advance(
        self,
        cursor: &mut PaginatedCursor,
        store: &DataStore,
    ) -> ClientResult<bool> {
        match self {
            Discipline::Blocking => cursor.advance(store),
            Discipline::NonBlocking => cursor.advance_async(store).await,
        }
    }
}
