//! Document store holding articles and logins.
//!
//! The store is a set of partitions, each mapping string keys to JSON
//! documents. Besides plain reads and writes it supports create-only writes,
//! conditional server-side [`Script`]s, and sorted search with search-after
//! pagination. Cross-process consistency of the article workflow relies
//! entirely on the first two.

use chrono::{DateTime, Utc};
use failure::Fail;
use newsdesk_error::ApiError;
use newsdesk_macros::From;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

mod elastic;
mod memory;
mod script;

pub use self::{
    elastic::{Config as ElasticConfig, ElasticStore},
    memory::MemoryStore,
    script::{Outcome, Script, SCRIPT_VERSION},
};

/// Store configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum Config {
    /// Keep everything in memory of this process.
    Memory,
    /// Elasticsearch cluster.
    Elastic(ElasticConfig),
}

impl Default for Config {
    fn default() -> Self {
        Config::Memory
    }
}

/// Create a store client for configuration.
pub fn connect(cfg: &Config) -> Result<Box<dyn Store>, StoreError> {
    match cfg {
        Config::Memory => Ok(Box::new(MemoryStore::new())),
        Config::Elastic(cfg) => Ok(Box::new(ElasticStore::new(cfg)?)),
    }
}

/// A group of documents of one kind.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    /// Work in progress, at most one per article, keyed by guid.
    Draft,
    /// Immutable submitted versions, keyed by `guid:version`.
    Version,
    /// Live copies, at most one per article, keyed by guid.
    Publish,
    /// User logins, keyed by user name.
    Login,
}

impl Partition {
    /// All partitions holding articles.
    pub const ARTICLES: [Partition; 3] =
        [Partition::Draft, Partition::Version, Partition::Publish];

    pub const ALL: [Partition; 4] =
        [Partition::Draft, Partition::Version, Partition::Publish, Partition::Login];

    pub fn as_str(self) -> &'static str {
        match self {
            Partition::Draft => "draft",
            Partition::Version => "version",
            Partition::Publish => "publish",
            Partition::Login => "login",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = UnknownPartitionError;

    fn from_str(v: &str) -> Result<Self, UnknownPartitionError> {
        Partition::ALL.iter()
            .cloned()
            .find(|p| p.as_str() == v)
            .ok_or_else(|| UnknownPartitionError(v.to_string()))
    }
}

#[derive(Debug, Fail)]
#[fail(display = "unknown partition {:?}", _0)]
pub struct UnknownPartitionError(pub String);

/// When should a write become visible to searches.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Refresh {
    /// Whenever the store gets to it.
    No,
    /// Before the write call returns.
    WaitFor,
}

impl Refresh {
    pub fn as_str(self) -> &'static str {
        match self {
            Refresh::No => "false",
            Refresh::WaitFor => "wait_for",
        }
    }
}

/// A single stored document.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub partition: Partition,
    pub id: String,
    pub source: Value,
}

impl Document {
    /// Deserialize this document's source.
    pub fn parse<T>(self) -> Result<T, StoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_value(self.source).map_err(From::from)
    }
}

/// Result of a create-only write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Created {
    Created,
    /// A document already exists under this key. Nothing was written.
    Conflict,
}

/// Result of a scripted update.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Updated {
    Updated,
    Deleted,
    /// Script decided not to touch the document.
    Noop,
    NotFound,
}

/// Result of a delete.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Deleted {
    Deleted,
    NotFound,
}

/// Parameters of a search.
///
/// Hits are always sorted by `created_at` descending, with ties broken in
/// a stable, store-specific way.
#[derive(Clone, Debug)]
pub struct Search {
    pub partitions: Vec<Partition>,
    /// Only return documents of this article.
    pub guid: Option<String>,
    /// Only return documents created at or after this instant.
    pub created_since: Option<DateTime<Utc>>,
    pub size: usize,
    /// Sort values of the last hit of the previous page.
    pub search_after: Option<Vec<Value>>,
}

impl Search {
    pub fn new(partitions: &[Partition], size: usize) -> Search {
        Search {
            partitions: partitions.to_vec(),
            guid: None,
            created_since: None,
            size,
            search_after: None,
        }
    }
}

/// A single search result.
#[derive(Clone, Debug)]
pub struct Hit {
    pub document: Document,
    /// Values this hit was sorted by, usable as [`Search::search_after`].
    pub sort: Vec<Value>,
}

/// Overall state of the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Green,
    Yellow,
    Red,
}

impl Health {
    pub fn is_available(self) -> bool {
        self != Health::Red
    }
}

/// Operations the article workflow needs from a document store.
///
/// Implementations must make [`Store::create`] atomic (a key is written at
/// most once) and evaluate [`Store::update_with_script`] atomically with
/// respect to other writes to the same document.
pub trait Store: Send + Sync {
    /// Generate a new unique document key.
    fn next_id(&self) -> String;

    /// Get a document. With `realtime` the latest write is returned even if
    /// it is not yet visible to searches.
    fn get(&self, partition: Partition, id: &str, realtime: bool)
    -> Result<Option<Document>, StoreError>;

    /// Write a document unless one already exists under this key.
    fn create(&self, partition: Partition, id: &str, doc: &Value, refresh: Refresh)
    -> Result<Created, StoreError>;

    /// Write a document, replacing any existing one.
    fn upsert(&self, partition: Partition, id: &str, doc: &Value, refresh: Refresh)
    -> Result<(), StoreError>;

    /// Run a script against an existing document.
    fn update_with_script(
        &self,
        partition: Partition,
        id: &str,
        script: &Script,
        refresh: Refresh,
    ) -> Result<Updated, StoreError>;

    /// Delete a document.
    fn delete(&self, partition: Partition, id: &str, refresh: Refresh)
    -> Result<Deleted, StoreError>;

    /// Find documents.
    fn search(&self, search: &Search) -> Result<Vec<Hit>, StoreError>;

    /// Check whether the store is able to serve requests.
    fn health(&self) -> Result<Health, StoreError>;

    /// Prepare partitions for use. Existing data is left untouched.
    fn init(&self) -> Result<(), StoreError>;

    /// Remove all partitions and their data.
    fn drop_all(&self) -> Result<(), StoreError>;
}

#[derive(ApiError, Debug, Fail, From)]
pub enum StoreError {
    #[api(internal)]
    #[fail(display = "store request failed: {}", _0)]
    Http(#[cause] #[from] reqwest::Error),
    #[api(internal)]
    #[fail(display = "store responded with {}: {}", _0, _1)]
    Status(u16, String),
    #[api(internal)]
    #[fail(display = "malformed document: {}", _0)]
    Json(#[cause] #[from] serde_json::Error),
    #[api(internal)]
    #[fail(display = "unexpected store response: {}", _0)]
    Response(String),
    /// Search continuation did not come from a previous search.
    #[api(code = "cursor:invalid", status = "BAD_REQUEST")]
    #[fail(display = "invalid search continuation")]
    SearchAfter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_parse_from_names() {
        for partition in &Partition::ALL {
            assert_eq!(partition.as_str().parse::<Partition>().unwrap(), *partition);
        }
        assert!("story".parse::<Partition>().is_err());
    }

    #[test]
    fn config_selects_backend() {
        let cfg: Config = serde_json::from_str(r#"{"backend": "memory"}"#).unwrap();
        assert!(match cfg { Config::Memory => true, _ => false });

        let cfg: Config = serde_json::from_str(
            r#"{"backend": "elastic", "hosts": ["http://es:9200"]}"#).unwrap();
        match cfg {
            Config::Elastic(cfg) => {
                assert_eq!(cfg.hosts, vec!["http://es:9200".to_string()]);
                assert_eq!(cfg.index_prefix, "newsdesk");
            }
            _ => panic!("expected elastic backend"),
        }
    }
}
