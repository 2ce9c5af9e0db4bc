//! Read-only views over articles: a single article with its whole history,
//! and paginated listings of recent articles.

use chrono::{DateTime, Duration, Utc};
use failure::Fail;
use log::warn;
use newsdesk_error::ApiError;
use newsdesk_macros::From;
use serde::Serialize;
use std::collections::HashMap;

use crate::{
    cursor::{self, DecodeCursorError, EncodeCursorError},
    models::Article,
    store::{Hit, Partition, Search, Store, StoreError},
};

/// Maximum number of documents fetched from the store for a single page.
pub const PAGE_SIZE: usize = 1000;

/// How far back listings reach when no lower bound is given.
pub const DEFAULT_WINDOW_HOURS: i64 = 72;

/// All documents of one article.
#[derive(Clone, Debug, Serialize)]
pub struct ArticleSet {
    pub guid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<Article>,
    pub versions: Vec<Article>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<Article>,
}

impl ArticleSet {
    fn new(guid: &str, created_at: Option<DateTime<Utc>>) -> ArticleSet {
        ArticleSet {
            guid: guid.to_string(),
            created_at,
            draft: None,
            versions: Vec::new(),
            publish: None,
        }
    }

    fn add(&mut self, partition: Partition, article: Article) {
        match partition {
            Partition::Draft => self.draft = Some(article),
            Partition::Version => self.versions.push(article),
            Partition::Publish => self.publish = Some(article),
            Partition::Login => warn!("Login document in an article set {}", self.guid),
        }
    }
}

/// Parameters of a listing.
#[derive(Clone, Debug)]
pub struct ListQuery {
    /// Partitions to include. An empty list yields an empty page.
    pub partitions: Vec<Partition>,
    /// Only include documents created at or after this instant.
    pub since: DateTime<Utc>,
    /// Sort values of the last hit of the previous page.
    pub cursor: Option<Vec<serde_json::Value>>,
}

impl ListQuery {
    /// Build a query from its textual form.
    ///
    /// `types` is a comma-separated list of partition names, of which
    /// unknown ones are skipped. `since` is an RFC 3339 instant.
    pub fn parse(types: Option<&str>, since: Option<&str>, cursor_mark: Option<&str>)
    -> Result<ListQuery, ParseListQueryError> {
        let partitions = match types {
            None => Partition::ARTICLES.to_vec(),
            Some(types) => {
                let mut partitions = Vec::new();
                for name in types.split(',').map(|name| name.trim().to_lowercase()) {
                    match name.parse::<Partition>() {
                        Ok(p) if Partition::ARTICLES.contains(&p) => {
                            if !partitions.contains(&p) {
                                partitions.push(p);
                            }
                        }
                        _ => log::debug!("Skipping unknown article type {:?}", name),
                    }
                }
                partitions
            }
        };

        let since = match since {
            None | Some("") => Utc::now() - Duration::hours(DEFAULT_WINDOW_HOURS),
            Some(since) => DateTime::parse_from_rfc3339(since)
                .map_err(|_| ParseListQueryError::Since(since.to_string()))?
                .with_timezone(&Utc),
        };

        let cursor = match cursor_mark {
            Some(token) => cursor::decode(token)?,
            None => None,
        };

        Ok(ListQuery { partitions, since, cursor })
    }
}

/// One page of a listing.
#[derive(Debug, Serialize)]
pub struct ListPage {
    pub articles: Vec<ArticleSet>,
    /// Token for the next page. Absent on empty pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor_mark: Option<String>,
    pub since: DateTime<Utc>,
}

/// Get all documents of an article.
///
/// Versions are sorted oldest first.
pub fn get(store: &dyn Store, guid: &str) -> Result<ArticleSet, GetArticleError> {
    let mut search = Search::new(&Partition::ARTICLES, PAGE_SIZE);
    search.guid = Some(guid.to_string());

    let hits = store.search(&search)?;

    if hits.is_empty() {
        return Err(GetArticleError::NotFound(guid.to_string()));
    }

    let mut set = ArticleSet::new(guid, None);

    for (partition, article) in hits.into_iter().filter_map(parse_hit) {
        if set.created_at.is_none() {
            set.created_at = article.created_at;
        }
        set.add(partition, article);
    }

    set.versions.sort_by_key(|v| v.version);

    Ok(set)
}

/// List recently created articles, newest first.
///
/// Versions within each article are sorted newest first.
pub fn list(store: &dyn Store, query: &ListQuery) -> Result<ListPage, ListError> {
    if query.partitions.is_empty() {
        return Ok(ListPage {
            articles: Vec::new(),
            cursor_mark: None,
            since: query.since,
        });
    }

    let mut search = Search::new(&query.partitions, PAGE_SIZE);
    search.created_since = Some(query.since);
    search.search_after = query.cursor.clone();

    let hits = store.search(&search)?;
    let last_sort = hits.last().map(|hit| hit.sort.clone());

    let mut sets: HashMap<String, ArticleSet> = HashMap::new();

    for (partition, article) in hits.into_iter().filter_map(parse_hit) {
        sets.entry(article.guid.clone())
            .or_insert_with(|| ArticleSet::new(&article.guid, article.created_at))
            .add(partition, article);
    }

    let mut articles = sets.into_iter()
        .map(|(_, mut set)| {
            set.versions.sort_by(|a, b| b.version.cmp(&a.version));
            set
        })
        .collect::<Vec<_>>();

    articles.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.guid.cmp(&b.guid)));

    let cursor_mark = match last_sort {
        Some(ref sort) if !articles.is_empty() => Some(cursor::encode(sort)?),
        _ => None,
    };

    Ok(ListPage {
        articles,
        cursor_mark,
        since: query.since,
    })
}

/// Deserialize a hit, skipping documents which are not articles.
fn parse_hit(hit: Hit) -> Option<(Partition, Article)> {
    let partition = hit.document.partition;
    let id = hit.document.id.clone();

    match hit.document.parse::<Article>() {
        Ok(mut article) => {
            if article.id.is_empty() {
                article.id = id;
            }
            Some((partition, article))
        }
        Err(err) => {
            warn!("Skipping malformed {} document {}: {}", partition, id, err);
            None
        }
    }
}

#[derive(ApiError, Debug, Fail, From)]
pub enum ParseListQueryError {
    #[api(code = "article:list:bad-since", status = "BAD_REQUEST")]
    #[fail(display = "malformed instant {:?}", _0)]
    Since(String),
    #[fail(display = "{}", _0)]
    Cursor(#[cause] #[from] DecodeCursorError),
}

#[derive(ApiError, Debug, Fail, From)]
pub enum GetArticleError {
    #[api(code = "article:not-found", status = "NOT_FOUND")]
    #[fail(display = "article {} not found", _0)]
    NotFound(String),
    #[fail(display = "{}", _0)]
    Store(#[cause] #[from] StoreError),
}

#[derive(ApiError, Debug, Fail, From)]
pub enum ListError {
    #[fail(display = "{}", _0)]
    Store(#[cause] #[from] StoreError),
    #[fail(display = "{}", _0)]
    Cursor(#[cause] #[from] EncodeCursorError),
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use crate::{store::{MemoryStore, Refresh}, version::from_nanos};
    use super::*;

    const HOUR: i64 = 3_600_000_000_000;

    fn put(store: &MemoryStore, partition: Partition, guid: &str, version: Option<i64>, created: i64) {
        let id = match version {
            Some(v) => format!("{}:{}", guid, v),
            None => guid.to_string(),
        };
        let doc = json!({
            "id": id,
            "guid": guid,
            "version": version,
            "headline": format!("{} {}", guid, partition),
            "created_at": from_nanos(created),
        });
        store.upsert(partition, &id, &doc, Refresh::No).unwrap();
    }

    fn now() -> i64 {
        Utc::now().timestamp_nanos()
    }

    #[test]
    fn get_collects_whole_history() {
        let store = MemoryStore::new();
        let t = now();
        put(&store, Partition::Version, "a", Some(3), t);
        put(&store, Partition::Version, "a", Some(1), t);
        put(&store, Partition::Version, "a", Some(2), t);
        put(&store, Partition::Publish, "a", Some(2), t);
        put(&store, Partition::Draft, "b", None, t);

        let set = get(&store, "a").unwrap();
        assert_eq!(set.guid, "a");
        assert!(set.draft.is_none());
        assert_eq!(set.publish.unwrap().version, Some(2));
        assert_eq!(set.versions.iter().map(|v| v.version.unwrap()).collect::<Vec<_>>(),
            vec![1, 2, 3]);
    }

    #[test]
    fn get_unknown_article() {
        let store = MemoryStore::new();
        assert!(match get(&store, "nope") {
            Err(GetArticleError::NotFound(ref guid)) => guid == "nope",
            _ => false,
        });
    }

    #[test]
    fn list_groups_by_article_newest_first() {
        let store = MemoryStore::new();
        let t = now();
        put(&store, Partition::Draft, "old", None, t - 2 * HOUR);
        put(&store, Partition::Version, "new", Some(1), t - HOUR);
        put(&store, Partition::Version, "new", Some(2), t - HOUR);
        put(&store, Partition::Draft, "new", None, t - HOUR);
        put(&store, Partition::Draft, "ancient", None, t - 100 * HOUR);

        let query = ListQuery::parse(None, None, None).unwrap();
        let page = list(&store, &query).unwrap();

        let guids = page.articles.iter().map(|a| a.guid.as_str()).collect::<Vec<_>>();
        assert_eq!(guids, vec!["new", "old"]);
        assert!(page.articles[0].draft.is_some());
        assert_eq!(page.articles[0].versions.iter()
            .map(|v| v.version.unwrap()).collect::<Vec<_>>(), vec![2, 1]);
        assert!(page.cursor_mark.is_some());
    }

    #[test]
    fn list_resumes_after_cursor() {
        let store = MemoryStore::new();
        let t = now();
        put(&store, Partition::Draft, "a", None, t - 1);
        put(&store, Partition::Draft, "b", None, t - 2);

        let mut search = Search::new(&Partition::ARTICLES, 1);
        search.created_since = Some(from_nanos(t - HOUR));
        let first = store.search(&search).unwrap();
        let token = cursor::encode(&first[0].sort).unwrap();

        let query = ListQuery::parse(None, None, Some(&token)).unwrap();
        let page = list(&store, &query).unwrap();
        let guids = page.articles.iter().map(|a| a.guid.as_str()).collect::<Vec<_>>();
        assert_eq!(guids, vec!["b"]);
    }

    #[test]
    fn list_filters_partitions() {
        let store = MemoryStore::new();
        let t = now();
        put(&store, Partition::Draft, "a", None, t);
        put(&store, Partition::Publish, "b", Some(1), t);

        let query = ListQuery::parse(Some("publish, story"), None, None).unwrap();
        assert_eq!(query.partitions, vec![Partition::Publish]);
        let page = list(&store, &query).unwrap();
        assert_eq!(page.articles.len(), 1);
        assert_eq!(page.articles[0].guid, "b");

        let query = ListQuery::parse(Some("login,story"), None, None).unwrap();
        let page = list(&store, &query).unwrap();
        assert!(page.articles.is_empty());
        assert!(page.cursor_mark.is_none());
    }

    #[test]
    fn query_rejects_garbage() {
        assert!(ListQuery::parse(None, Some("yesterday"), None).is_err());
        assert!(ListQuery::parse(None, None, Some("%%%")).is_err());

        let query = ListQuery::parse(None, Some("2019-08-01T10:00:00Z"), Some("*")).unwrap();
        assert_eq!(query.since.timestamp(), 1_564_653_600);
        assert!(query.cursor.is_none());
    }
}
