use log::{debug, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{
    env,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use uuid::Uuid;

use super::{
    Created,
    Deleted,
    Document,
    Health,
    Hit,
    Partition,
    Refresh,
    Script,
    Search,
    Store,
    StoreError,
    Updated,
};

/// Elasticsearch configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Base URLs of cluster nodes.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,
    /// Prefix of index names. Each partition is kept in a separate index
    /// named `{index_prefix}-{partition}`.
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
    /// Deadline of a single request, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// How many times to retry a failed read. Writes are never retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_hosts() -> Vec<String> {
    vec!["http://127.0.0.1:9200".to_string()]
}

fn default_index_prefix() -> String {
    "newsdesk".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

/// A document store backed by an Elasticsearch cluster.
#[derive(Debug)]
pub struct ElasticStore {
    client: Client,
    hosts: Vec<Url>,
    prefix: String,
    max_retries: u32,
    /// Index into `hosts` of the node requests are currently sent to.
    current: AtomicUsize,
}

impl ElasticStore {
    /// Create a new client.
    ///
    /// The `ELASTICSEARCH_URL` environment variable, a comma-separated list of
    /// URLs, takes precedence over configured hosts.
    pub fn new(cfg: &Config) -> Result<ElasticStore, StoreError> {
        let hosts = match env::var("ELASTICSEARCH_URL") {
            Ok(urls) => urls.split(',').map(str::trim).map(String::from).collect(),
            Err(_) => cfg.hosts.clone(),
        };

        let hosts = hosts.iter()
            .map(|host| Url::parse(host)
                .map_err(|e| StoreError::Response(format!("invalid host {}: {}", host, e))))
            .collect::<Result<Vec<_>, _>>()?;

        if hosts.is_empty() {
            return Err(StoreError::Response("no hosts configured".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout))
            .build()?;

        Ok(ElasticStore {
            client,
            hosts,
            prefix: cfg.index_prefix.clone(),
            max_retries: cfg.max_retries,
            current: AtomicUsize::new(0),
        })
    }

    fn index(&self, partition: Partition) -> String {
        format!("{}-{}", self.prefix, partition)
    }

    fn partition_of(&self, index: &str) -> Result<Partition, StoreError> {
        let prefix = format!("{}-", self.prefix);
        let partition = if index.starts_with(&prefix) {
            index[prefix.len()..].parse().ok()
        } else {
            None
        };

        partition.ok_or_else(|| StoreError::Response(format!("unexpected index {}", index)))
    }

    /// URL of a path on the current node.
    fn url(&self, segments: &[&str]) -> Url {
        let host = &self.hosts[self.current.load(Ordering::Relaxed) % self.hosts.len()];
        let mut url = host.clone();

        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }

        url
    }

    /// Send a request which must not be repeated.
    fn write<F>(&self, request: F) -> Result<Response, StoreError>
    where
        F: FnOnce(&Client) -> RequestBuilder,
    {
        request(&self.client).send().map_err(From::from)
    }

    /// Send an idempotent request, retrying on other nodes when it fails to
    /// reach the cluster.
    fn read<F>(&self, request: F) -> Result<Response, StoreError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0;

        loop {
            match request(&self.client).send() {
                Ok(rsp) => return Ok(rsp),
                Err(err) if attempt < self.max_retries => {
                    warn!("Store read failed (attempt {}): {}", attempt + 1, err);
                    self.current.fetch_add(1, Ordering::Relaxed);
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn unexpected(mut rsp: Response) -> StoreError {
    let status = rsp.status().as_u16();
    let body = rsp.text().unwrap_or_default();
    StoreError::Status(status, body)
}

fn parse<T: DeserializeOwned>(mut rsp: Response) -> Result<T, StoreError> {
    rsp.json().map_err(From::from)
}

#[derive(Deserialize)]
struct GetResponse {
    found: bool,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Deserialize)]
struct WriteResponse {
    result: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
    #[serde(default)]
    sort: Vec<Value>,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: Health,
}

fn mappings(partition: Partition) -> Value {
    let properties = match partition {
        Partition::Login => json!({
            "username": { "type": "keyword" },
            "password": { "type": "keyword", "index": false },
            "roles": { "type": "keyword" },
        }),
        _ => json!({
            "id": { "type": "keyword" },
            "guid": { "type": "keyword" },
            "version": { "type": "long" },
            "from_version": { "type": "long" },
            "headline": { "type": "text" },
            "summary": { "type": "text" },
            "content": { "type": "text" },
            "tag": { "type": "keyword" },
            "note": { "type": "text" },
            "created_at": { "type": "date" },
            "created_by": { "type": "keyword" },
            "revised_at": { "type": "date" },
            "revised_by": { "type": "keyword" },
            "locked_by": { "type": "keyword" },
        }),
    };

    json!({ "mappings": { "properties": properties } })
}

impl Store for ElasticStore {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_simple().to_string()
    }

    fn get(&self, partition: Partition, id: &str, realtime: bool)
    -> Result<Option<Document>, StoreError> {
        let index = self.index(partition);
        let realtime = if realtime { "true" } else { "false" };
        let rsp = self.read(|client| client
            .get(self.url(&[index.as_str(), "_doc", id]))
            .query(&[("realtime", realtime)]))?;

        match rsp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let rsp = parse::<GetResponse>(rsp)?;
                Ok(if rsp.found {
                    Some(Document {
                        partition,
                        id: id.to_string(),
                        source: rsp.source,
                    })
                } else {
                    None
                })
            }
            _ => Err(unexpected(rsp)),
        }
    }

    fn create(&self, partition: Partition, id: &str, doc: &Value, refresh: Refresh)
    -> Result<Created, StoreError> {
        let index = self.index(partition);
        let rsp = self.write(|client| client
            .put(self.url(&[index.as_str(), "_create", id]))
            .query(&[("refresh", refresh.as_str())])
            .json(doc))?;

        match rsp.status() {
            StatusCode::CONFLICT => Ok(Created::Conflict),
            status if status.is_success() => Ok(Created::Created),
            _ => Err(unexpected(rsp)),
        }
    }

    fn upsert(&self, partition: Partition, id: &str, doc: &Value, refresh: Refresh)
    -> Result<(), StoreError> {
        let index = self.index(partition);
        let rsp = self.write(|client| client
            .put(self.url(&[index.as_str(), "_doc", id]))
            .query(&[("refresh", refresh.as_str())])
            .json(doc))?;

        if rsp.status().is_success() {
            Ok(())
        } else {
            Err(unexpected(rsp))
        }
    }

    fn update_with_script(
        &self,
        partition: Partition,
        id: &str,
        script: &Script,
        refresh: Refresh,
    ) -> Result<Updated, StoreError> {
        let body = json!({
            "script": {
                "source": script.source(),
                "lang": "painless",
                "params": script.params(),
            },
            "detect_noop": true,
        });

        debug!("Running {} v{} on {}/{}",
            script.name(), super::SCRIPT_VERSION, partition, id);

        let index = self.index(partition);
        let rsp = self.write(|client| client
            .post(self.url(&[index.as_str(), "_update", id]))
            .query(&[("refresh", refresh.as_str())])
            .json(&body))?;

        match rsp.status() {
            StatusCode::NOT_FOUND => Ok(Updated::NotFound),
            status if status.is_success() => {
                match parse::<WriteResponse>(rsp)?.result.as_str() {
                    "updated" => Ok(Updated::Updated),
                    "deleted" => Ok(Updated::Deleted),
                    "noop" => Ok(Updated::Noop),
                    other => Err(StoreError::Response(format!(
                        "unexpected update result {:?}", other))),
                }
            }
            _ => Err(unexpected(rsp)),
        }
    }

    fn delete(&self, partition: Partition, id: &str, refresh: Refresh)
    -> Result<Deleted, StoreError> {
        let index = self.index(partition);
        let rsp = self.write(|client| client
            .delete(self.url(&[index.as_str(), "_doc", id]))
            .query(&[("refresh", refresh.as_str())]))?;

        match rsp.status() {
            StatusCode::NOT_FOUND => Ok(Deleted::NotFound),
            status if status.is_success() => Ok(Deleted::Deleted),
            _ => Err(unexpected(rsp)),
        }
    }

    fn search(&self, search: &Search) -> Result<Vec<Hit>, StoreError> {
        if search.partitions.is_empty() {
            return Ok(Vec::new());
        }

        let indices = search.partitions.iter()
            .map(|partition| self.index(*partition))
            .collect::<Vec<_>>()
            .join(",");

        let mut filter = Vec::new();
        if let Some(ref guid) = search.guid {
            filter.push(json!({ "term": { "guid": guid } }));
        }
        if let Some(since) = search.created_since {
            filter.push(json!({ "range": { "created_at": { "gte": since } } }));
        }

        let mut body = json!({
            "size": search.size,
            "query": { "bool": { "filter": filter } },
            "sort": [
                { "created_at": { "order": "desc", "unmapped_type": "date" } },
                { "_index": { "order": "asc" } },
                { "id": { "order": "asc", "unmapped_type": "keyword" } },
            ],
        });
        if let Some(ref after) = search.search_after {
            body["search_after"] = json!(after);
        }

        let rsp = self.read(|client| client
            .post(self.url(&[indices.as_str(), "_search"]))
            .query(&[("ignore_unavailable", "true")])
            .json(&body))?;

        match rsp.status() {
            StatusCode::BAD_REQUEST if search.search_after.is_some() =>
                Err(StoreError::SearchAfter),
            status if status.is_success() => parse::<SearchResponse>(rsp)?
                .hits
                .hits
                .into_iter()
                .map(|hit| -> Result<Hit, StoreError> {
                    Ok(Hit {
                        document: Document {
                            partition: self.partition_of(&hit.index)?,
                            id: hit.id,
                            source: hit.source,
                        },
                        sort: hit.sort,
                    })
                })
                .collect(),
            _ => Err(unexpected(rsp)),
        }
    }

    fn health(&self) -> Result<Health, StoreError> {
        let rsp = self.read(|client| client.get(self.url(&["_cluster", "health"])))?;

        if rsp.status().is_success() {
            Ok(parse::<HealthResponse>(rsp)?.status)
        } else {
            Err(unexpected(rsp))
        }
    }

    fn init(&self) -> Result<(), StoreError> {
        for partition in &Partition::ALL {
            let index = self.index(*partition);
            let rsp = self.read(|client| client.head(self.url(&[index.as_str()])))?;

            match rsp.status() {
                status if status.is_success() => continue,
                StatusCode::NOT_FOUND => (),
                _ => return Err(unexpected(rsp)),
            }

            let rsp = self.write(|client| client
                .put(self.url(&[index.as_str()]))
                .json(&mappings(*partition)))?;

            match rsp.status() {
                status if status.is_success() => debug!("Created index {}", index),
                StatusCode::BAD_REQUEST => match unexpected(rsp) {
                    StoreError::Status(_, ref body)
                        if body.contains("resource_already_exists_exception") => (),
                    err => return Err(err),
                },
                _ => return Err(unexpected(rsp)),
            }
        }

        Ok(())
    }

    fn drop_all(&self) -> Result<(), StoreError> {
        for partition in &Partition::ALL {
            let index = self.index(*partition);
            let rsp = self.write(|client| client.delete(self.url(&[index.as_str()])))?;

            match rsp.status() {
                StatusCode::NOT_FOUND => (),
                status if status.is_success() => debug!("Deleted index {}", index),
                _ => return Err(unexpected(rsp)),
            }
        }

        Ok(())
    }
}
