use std::sync::mpsc::Sender;

use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::error::{Error as DriverError, ErrorKind};
use mongodb::options::{
    AggregateOptions, CountOptions, CreateCollectionOptions, DeleteOptions,
    FindOneAndReplaceOptions, FindOptions, IndexOptions, InsertManyOptions, InsertOneOptions,
    UpdateModifications, UpdateOptions,
};
use mongodb::results::{
    DatabaseSpecification, DeleteResult, InsertManyResult, InsertOneResult, UpdateResult,
};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::Serialize;

use crate::connection::ConnectionDescriptor;
use crate::error::{DataServiceError, Result};
use crate::instance::{
    self, CollectionDetail, DatabaseDetail, InstanceDetail, adapt_database_stats, get_i64,
};
use crate::namespace::Namespace;
use crate::sampling::{
    SampleOptions, SampleStream, rejects_sample_stage, reservoir_sample, sample_pipeline,
};
use crate::tunnel::{SshTunnel, SshTunnelConnector, TunnelEvent};

/// Server error code for commands issued against a view.
const COMMAND_NOT_SUPPORTED_ON_VIEW: i32 = 166;

const SYSTEM_COLLECTION_PREFIX: &str = "system.";

const USERS_INFO_OPTIONS: &[&str] =
    &["showCredentials", "showPrivileges", "showAuthenticationRestrictions", "filter", "comment"];

/// A connected deployment: one driver client, the descriptor it was built
/// from, and the SSH tunnel keeping the route open when one was requested.
///
/// Each method resolves handles from a namespace string, forwards its
/// arguments to the driver verbatim and rewrites failure messages through the
/// translation table. Nothing is cached and nothing is retried.
pub struct DataClient {
    client: Client,
    descriptor: ConnectionDescriptor,
    tunnel: Option<SshTunnel>,
    is_writable: bool,
    is_mongos: bool,
}

impl DataClient {
    pub async fn connect(descriptor: ConnectionDescriptor) -> Result<Self> {
        Self::connect_with_events(descriptor, None).await
    }

    /// Connects, resolving the SSH tunnel first when the descriptor enables
    /// one. Tunnel lifecycle events go to `events` if a sender is given.
    pub async fn connect_with_events(
        descriptor: ConnectionDescriptor,
        events: Option<Sender<TunnelEvent>>,
    ) -> Result<Self> {
        let mut connector = SshTunnelConnector::new(
            descriptor.ssh_tunnel.clone(),
            &descriptor.host,
            descriptor.port,
        );
        if let Some(events) = events {
            connector = connector.with_events(events);
        }
        // ssh2 blocks, so establishment runs off the async workers.
        let tunnel = tokio::task::spawn_blocking(move || connector.connect())
            .await
            .map_err(|error| DataServiceError::Tunnel(error.to_string()))??;

        let uri = match &tunnel {
            Some(tunnel) => descriptor
                .uri_for_host_port("127.0.0.1", tunnel.local_port())
                .map_err(DataServiceError::InvalidArgument)?,
            None => descriptor.uri().map_err(DataServiceError::InvalidArgument)?,
        };

        let client = Client::with_uri_str(&uri).await.map_err(DataServiceError::from_driver)?;

        // Topology probe is best effort, a locked-down user still connects.
        let (is_writable, is_mongos) =
            match client.database("admin").run_command(doc! { "ismaster": 1 }).await {
                Ok(reply) => (
                    reply.get_bool("ismaster").unwrap_or(false),
                    reply.get_str("msg").map(|msg| msg == "isdbgrid").unwrap_or(false),
                ),
                Err(error) => {
                    log::warn!("ismaster probe failed: {error}");
                    (false, false)
                }
            };

        log::debug!(
            "connected to {}:{} (writable: {is_writable}, mongos: {is_mongos}, tunneled: {})",
            descriptor.host,
            descriptor.port,
            tunnel.is_some()
        );

        Ok(Self { client, descriptor, tunnel, is_writable, is_mongos })
    }

    #[cfg(test)]
    pub(crate) fn from_parts(client: Client, descriptor: ConnectionDescriptor) -> Self {
        Self { client, descriptor, tunnel: None, is_writable: false, is_mongos: false }
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn is_writable(&self) -> bool {
        self.is_writable
    }

    pub fn is_mongos(&self) -> bool {
        self.is_mongos
    }

    fn database(&self, name: &str) -> Database {
        self.client.database(name)
    }

    fn collection(&self, ns: &str) -> Result<Collection<Document>> {
        let namespace = collection_namespace(ns)?;
        Ok(self.database(namespace.database()).collection(namespace.collection()))
    }

    pub async fn command(&self, database: &str, command: Document) -> Result<Document> {
        Ok(self.database(database).run_command(command).await?)
    }

    pub async fn build_info(&self) -> Result<Document> {
        self.command("admin", doc! { "buildInfo": 1 }).await
    }

    pub async fn host_info(&self) -> Result<Document> {
        self.command("admin", doc! { "hostInfo": 1 }).await
    }

    pub async fn connection_status(&self, show_privileges: bool) -> Result<Document> {
        self.command("admin", doc! { "connectionStatus": 1, "showPrivileges": show_privileges })
            .await
    }

    pub async fn users_info(&self, database: &str, options: Document) -> Result<Document> {
        self.command(database, users_info_command(options)?).await
    }

    pub async fn find(
        &self,
        ns: &str,
        filter: Document,
        options: Option<FindOptions>,
    ) -> Result<Vec<Document>> {
        let cursor = self.collection(ns)?.find(filter).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn count(
        &self,
        ns: &str,
        filter: Document,
        options: Option<CountOptions>,
    ) -> Result<u64> {
        Ok(self.collection(ns)?.count_documents(filter).with_options(options).await?)
    }

    pub async fn aggregate(
        &self,
        ns: &str,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
    ) -> Result<Vec<Document>> {
        let cursor = self.collection(ns)?.aggregate(pipeline).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn insert_one(
        &self,
        ns: &str,
        document: Document,
        options: Option<InsertOneOptions>,
    ) -> Result<InsertOneResult> {
        Ok(self.collection(ns)?.insert_one(document).with_options(options).await?)
    }

    pub async fn insert_many(
        &self,
        ns: &str,
        documents: Vec<Document>,
        options: Option<InsertManyOptions>,
    ) -> Result<InsertManyResult> {
        Ok(self.collection(ns)?.insert_many(documents).with_options(options).await?)
    }

    pub async fn update_one(
        &self,
        ns: &str,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: Option<UpdateOptions>,
    ) -> Result<UpdateResult> {
        Ok(self.collection(ns)?.update_one(filter, update.into()).with_options(options).await?)
    }

    pub async fn update_many(
        &self,
        ns: &str,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: Option<UpdateOptions>,
    ) -> Result<UpdateResult> {
        Ok(self.collection(ns)?.update_many(filter, update.into()).with_options(options).await?)
    }

    pub async fn delete_one(
        &self,
        ns: &str,
        filter: Document,
        options: Option<DeleteOptions>,
    ) -> Result<DeleteResult> {
        Ok(self.collection(ns)?.delete_one(filter).with_options(options).await?)
    }

    pub async fn delete_many(
        &self,
        ns: &str,
        filter: Document,
        options: Option<DeleteOptions>,
    ) -> Result<DeleteResult> {
        Ok(self.collection(ns)?.delete_many(filter).with_options(options).await?)
    }

    /// Replaces one document and resolves with the replaced document itself
    /// (or `None` when nothing matched), not a result wrapper.
    pub async fn find_one_and_replace(
        &self,
        ns: &str,
        filter: Document,
        replacement: Document,
        options: Option<FindOneAndReplaceOptions>,
    ) -> Result<Option<Document>> {
        Ok(self
            .collection(ns)?
            .find_one_and_replace(filter, replacement)
            .with_options(options)
            .await?)
    }

    pub async fn create_collection(
        &self,
        ns: &str,
        options: Option<CreateCollectionOptions>,
    ) -> Result<()> {
        let namespace = collection_namespace(ns)?;
        Ok(self
            .database(namespace.database())
            .create_collection(namespace.collection())
            .with_options(options)
            .await?)
    }

    /// Applies `collMod` flags to an existing collection.
    pub async fn update_collection(&self, ns: &str, flags: Document) -> Result<Document> {
        let namespace = collection_namespace(ns)?;
        let mut command = doc! { "collMod": namespace.collection() };
        command.extend(flags);
        self.command(namespace.database(), command).await
    }

    pub async fn drop_collection(&self, ns: &str) -> Result<()> {
        Ok(self.collection(ns)?.drop().await?)
    }

    pub async fn drop_database(&self, database: &str) -> Result<()> {
        Ok(self.database(database).drop().await?)
    }

    /// Resolves with the name of the created index.
    pub async fn create_index(
        &self,
        ns: &str,
        keys: Document,
        options: Option<IndexOptions>,
    ) -> Result<String> {
        let model = IndexModel::builder().keys(keys).options(options).build();
        let result = self.collection(ns)?.create_index(model).await?;
        Ok(result.index_name)
    }

    pub async fn drop_index(&self, ns: &str, name: &str) -> Result<()> {
        Ok(self.collection(ns)?.drop_index(name).await?)
    }

    pub async fn list_indexes(&self, ns: &str) -> Result<Vec<Document>> {
        let models: Vec<IndexModel> =
            self.collection(ns)?.list_indexes().await?.try_collect().await?;
        let mut indexes = Vec::with_capacity(models.len());
        for model in &models {
            let document = bson::to_document(model).map_err(|error| {
                DataServiceError::InvalidArgument(format!("BSON conversion error: {error}"))
            })?;
            indexes.push(document);
        }
        Ok(indexes)
    }

    pub async fn list_collections(
        &self,
        database: &str,
        filter: Option<Document>,
    ) -> Result<Vec<CollectionDetail>> {
        let db = instance::pinned_database(&self.client, database);
        let mut action = db.list_collections();
        if let Some(filter) = filter {
            action = action.filter(filter);
        }
        let specifications: Vec<_> = action.await?.try_collect().await?;
        Ok(specifications
            .iter()
            .map(|specification| instance::adapt_collection_spec(database, specification))
            .collect())
    }

    pub async fn list_databases(
        &self,
        filter: Option<Document>,
    ) -> Result<Vec<DatabaseSpecification>> {
        let mut action = self.client.list_databases();
        if let Some(filter) = filter {
            action = action.filter(filter);
        }
        Ok(action.await?)
    }

    pub async fn collection_names(&self, database: &str) -> Result<Vec<String>> {
        Ok(self.database(database).list_collection_names().await?)
    }

    /// `collStats` normalized into [`CollectionStats`]. Views reject the
    /// command, so they resolve to a readonly stub instead of an error.
    pub async fn collection_stats(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<CollectionStats> {
        match self.database(database).run_command(doc! { "collStats": collection }).await {
            Ok(stats) => Ok(adapt_collection_stats(database, collection, &stats)),
            Err(error) if is_view_error(&error) => {
                Ok(CollectionStats::readonly_view(database, collection))
            }
            Err(error) => Err(DataServiceError::from_driver(error)),
        }
    }

    /// Stats and index definitions for one collection, fetched concurrently.
    pub async fn collection_detail(&self, ns: &str) -> Result<CollectionOverview> {
        let namespace = collection_namespace(ns)?;
        let (stats, indexes) = futures::try_join!(
            self.collection_stats(namespace.database(), namespace.collection()),
            self.list_indexes(ns),
        )?;
        Ok(CollectionOverview { stats, indexes })
    }

    /// Collection detail enriched with per-shard distribution figures. The
    /// shard host comes from `config.shards`, the chunk estimates from the
    /// shard's `config.chunks` count; all shard lookups run concurrently.
    /// Unsharded collections resolve to the plain detail.
    pub async fn sharded_collection_detail(&self, ns: &str) -> Result<CollectionOverview> {
        let mut detail = self.collection_detail(ns).await?;
        if !detail.stats.sharded {
            return Ok(detail);
        }

        let shard_names: Vec<String> = detail.stats.shards.keys().cloned().collect();
        let fetched = futures::future::try_join_all(
            shard_names.iter().map(|shard| self.shard_chunk_info(ns, shard)),
        )
        .await?;

        for (shard, (host, chunk_count)) in shard_names.iter().zip(fetched) {
            let shard_stats = detail.stats.shards.get_document(shard).cloned().unwrap_or_default();
            let distribution = shard_distribution(
                detail.stats.document_size,
                detail.stats.document_count,
                &shard_stats,
                &host,
                chunk_count,
            );
            let fields = bson::to_document(&distribution).map_err(|error| {
                DataServiceError::InvalidArgument(format!("BSON conversion error: {error}"))
            })?;
            let mut merged = shard_stats;
            merged.extend(fields);
            detail.stats.shards.insert(shard.as_str(), merged);
        }

        Ok(detail)
    }

    async fn shard_chunk_info(&self, ns: &str, shard: &str) -> Result<(String, i64)> {
        let config = self.database("config");
        let shards: Collection<Document> = config.collection("shards");
        let chunks: Collection<Document> = config.collection("chunks");

        let shard_lookup = async {
            shards.find_one(doc! { "_id": shard }).await.map_err(DataServiceError::from_driver)
        };
        let chunk_tally = async {
            chunks
                .count_documents(doc! { "ns": ns, "shard": shard })
                .await
                .map_err(DataServiceError::from_driver)
        };
        let (shard_doc, chunk_count) = futures::try_join!(shard_lookup, chunk_tally)?;

        let host = shard_doc
            .and_then(|doc| doc.get_str("host").ok().map(str::to_string))
            .unwrap_or_default();
        Ok((host, chunk_count as i64))
    }

    /// Stats for every user collection of a database, fetched concurrently.
    /// `system.` collections are skipped.
    pub async fn collections(&self, database: &str) -> Result<Vec<CollectionStats>> {
        let names = self.collection_names(database).await?;
        futures::future::try_join_all(
            names
                .iter()
                .filter(|name| !name.starts_with(SYSTEM_COLLECTION_PREFIX))
                .map(|name| self.collection_stats(database, name)),
        )
        .await
    }

    pub async fn database_stats(&self, database: &str) -> Result<DatabaseDetail> {
        let stats = self.command(database, doc! { "dbStats": 1 }).await?;
        Ok(adapt_database_stats(database, Some(&stats)))
    }

    pub async fn database_detail(&self, database: &str) -> Result<DatabaseOverview> {
        let (stats, collections) =
            futures::try_join!(self.database_stats(database), self.collections(database))?;
        Ok(DatabaseOverview { name: database.to_string(), stats, collections })
    }

    pub async fn server_stats(&self) -> Result<Document> {
        self.command("admin", doc! { "serverStatus": 1 }).await
    }

    pub async fn top(&self) -> Result<Document> {
        self.command("admin", doc! { "top": 1 }).await
    }

    pub async fn current_op(&self, include_all: bool) -> Result<Document> {
        self.command("admin", current_op_command(include_all)).await
    }

    pub async fn explain(&self, ns: &str, filter: Document) -> Result<Document> {
        let namespace = collection_namespace(ns)?;
        let command = explain_command(namespace.collection(), filter);
        self.command(namespace.database(), command).await
    }

    /// Draws a random subset of a collection. Servers with `$sample` support
    /// stream straight from an aggregation cursor; older servers fall back to
    /// client-side reservoir sampling over the matching `_id`s.
    pub async fn sample(&self, ns: &str, options: SampleOptions) -> Result<SampleStream> {
        let collection = self.collection(ns)?;
        match collection.aggregate(sample_pipeline(&options)).await {
            Ok(cursor) => Ok(SampleStream::Cursor(cursor)),
            Err(error) if rejects_sample_stage(&error) => {
                log::debug!("server rejected $sample on {ns}, sampling client side");
                self.sample_by_reservoir(&collection, options).await
            }
            Err(error) => Err(DataServiceError::from_driver(error)),
        }
    }

    async fn sample_by_reservoir(
        &self,
        collection: &Collection<Document>,
        options: SampleOptions,
    ) -> Result<SampleStream> {
        let filter = options.filter.clone().unwrap_or_default();
        let id_documents: Vec<Document> = collection
            .find(filter)
            .projection(doc! { "_id": 1 })
            .await?
            .try_collect()
            .await?;

        let ids: Vec<Bson> = reservoir_sample(id_documents, options.size)
            .into_iter()
            .filter_map(|mut document| document.remove("_id"))
            .collect();

        let mut action = collection.find(doc! { "_id": { "$in": ids } });
        if let Some(projection) = options.projection {
            action = action.projection(projection);
        }
        let documents: Vec<Document> = action.await?.try_collect().await?;
        Ok(SampleStream::loaded(documents))
    }

    /// A fresh deployment snapshot, stamped with the connection's identity.
    pub async fn instance(&self) -> Result<InstanceDetail> {
        let mut detail = instance::fetch_instance_details(&self.client).await?;
        detail.hostname = self.descriptor.host.clone();
        detail.port = self.descriptor.port;
        detail.id = format!("{}:{}", detail.hostname, detail.port);
        Ok(detail)
    }

    /// Shuts the driver client down and tears the tunnel down afterwards, so
    /// in-flight operations never see the route disappear first.
    pub async fn disconnect(self) {
        let Self { client, tunnel, descriptor, .. } = self;
        client.shutdown().await;
        drop(tunnel);
        log::debug!("disconnected from {}:{}", descriptor.host, descriptor.port);
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CollectionStats {
    pub ns: String,
    pub name: String,
    pub database: String,
    pub is_capped: bool,
    pub max: i64,
    pub document_count: i64,
    pub document_size: i64,
    pub storage_size: i64,
    pub free_storage_size: i64,
    pub index_count: i64,
    pub index_size: i64,
    pub index_sizes: Document,
    pub sharded: bool,
    /// Per-shard `collStats` breakdown as reported by a mongos, keyed by
    /// shard name. Empty for unsharded collections.
    pub shards: Document,
    pub readonly: bool,
}

impl CollectionStats {
    /// The stub reported for views, which reject `collStats`.
    fn readonly_view(database: &str, collection: &str) -> Self {
        Self {
            ns: Namespace::new(database, collection).to_string(),
            name: collection.to_string(),
            database: database.to_string(),
            readonly: true,
            ..Self::default()
        }
    }
}

/// Distribution figures for one shard of a sharded collection.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ShardDetail {
    pub host: String,
    pub shard_data: i64,
    pub shard_docs: i64,
    pub estimated_data_per_chunk: f64,
    pub estimated_docs_per_chunk: i64,
    pub estimated_data_percent: f64,
    pub estimated_doc_percent: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CollectionOverview {
    #[serde(flatten)]
    pub stats: CollectionStats,
    pub indexes: Vec<Document>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseOverview {
    pub name: String,
    pub stats: DatabaseDetail,
    pub collections: Vec<CollectionStats>,
}

fn users_info_command(options: Document) -> Result<Document> {
    let mut command = doc! { "usersInfo": 1 };
    for (key, value) in options {
        if !USERS_INFO_OPTIONS.contains(&key.as_str()) {
            return Err(DataServiceError::InvalidArgument(format!(
                "unsupported usersInfo option: {key}"
            )));
        }
        command.insert(key, value);
    }
    Ok(command)
}

fn current_op_command(include_all: bool) -> Document {
    doc! { "currentOp": 1, "$all": include_all }
}

fn explain_command(collection: &str, filter: Document) -> Document {
    doc! {
        "explain": { "find": collection, "filter": filter },
        "verbosity": "queryPlanner",
    }
}

fn adapt_collection_stats(database: &str, collection: &str, stats: &Document) -> CollectionStats {
    CollectionStats {
        ns: Namespace::new(database, collection).to_string(),
        name: collection.to_string(),
        database: database.to_string(),
        is_capped: stats.get_bool("capped").unwrap_or(false),
        max: get_i64(stats, "max"),
        document_count: get_i64(stats, "count"),
        document_size: get_i64(stats, "size"),
        storage_size: get_i64(stats, "storageSize"),
        free_storage_size: get_i64(stats, "freeStorageSize"),
        index_count: get_i64(stats, "nindexes"),
        index_size: get_i64(stats, "totalIndexSize"),
        index_sizes: stats.get_document("indexSizes").cloned().unwrap_or_default(),
        sharded: stats.get_bool("sharded").unwrap_or(false),
        shards: stats.get_document("shards").cloned().unwrap_or_default(),
        readonly: false,
    }
}

fn shard_distribution(
    total_size: i64,
    total_count: i64,
    shard_stats: &Document,
    host: &str,
    chunk_count: i64,
) -> ShardDetail {
    let shard_size = get_i64(shard_stats, "size");
    let shard_count = get_i64(shard_stats, "count");
    let per_chunk_data =
        if chunk_count > 0 { shard_size as f64 / chunk_count as f64 } else { 0.0 };
    let per_chunk_docs = if chunk_count > 0 { shard_count / chunk_count } else { 0 };

    ShardDetail {
        host: host.to_string(),
        shard_data: shard_size,
        shard_docs: shard_count,
        estimated_data_per_chunk: per_chunk_data,
        estimated_docs_per_chunk: per_chunk_docs,
        estimated_data_percent: floor_percent(shard_size, total_size),
        estimated_doc_percent: floor_percent(shard_count, total_count),
    }
}

/// Ratio as a percentage floored to two decimals; zero when the total is.
fn floor_percent(part: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((part as f64 / total as f64) * 10_000.0).floor() / 100.0
}

fn collection_namespace(ns: &str) -> Result<Namespace> {
    let namespace = Namespace::parse(ns);
    if !namespace.has_collection() {
        return Err(DataServiceError::InvalidArgument(format!(
            "namespace {namespace} has no collection part"
        )));
    }
    Ok(namespace)
}

/// Whether a `collStats` failure means the target is a view.
fn is_view_error(error: &DriverError) -> bool {
    if let ErrorKind::Command(ref command_error) = *error.kind {
        if command_error.code == COMMAND_NOT_SUPPORTED_ON_VIEW {
            return true;
        }
    }
    error.to_string().contains("is a view")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn users_info_accepts_known_options() {
        let command =
            users_info_command(doc! { "showPrivileges": true, "filter": { "roles": "read" } })
                .unwrap();
        assert_eq!(command.get_i32("usersInfo"), Ok(1));
        assert_eq!(command.get_bool("showPrivileges"), Ok(true));
    }

    #[test]
    fn users_info_rejects_unknown_options() {
        let error = users_info_command(doc! { "dropUsers": true }).unwrap_err();
        assert!(matches!(error, DataServiceError::InvalidArgument(_)));
        assert!(error.to_string().contains("dropUsers"));
    }

    #[test]
    fn current_op_carries_the_all_flag() {
        assert_eq!(current_op_command(true), doc! { "currentOp": 1, "$all": true });
        assert_eq!(current_op_command(false), doc! { "currentOp": 1, "$all": false });
    }

    #[test]
    fn explain_wraps_a_find_command() {
        let command = explain_command("users", doc! { "age": { "$gt": 30 } });
        assert_eq!(
            command,
            doc! {
                "explain": { "find": "users", "filter": { "age": { "$gt": 30 } } },
                "verbosity": "queryPlanner",
            }
        );
    }

    #[test]
    fn collection_stats_adaptation_coerces_numbers() {
        let stats = doc! {
            "ns": "app.users",
            "capped": true,
            "max": 1000i32,
            "count": 250i64,
            "size": 8192.0,
            "storageSize": 16384i32,
            "nindexes": 2i32,
            "totalIndexSize": 4096i64,
            "indexSizes": { "_id_": 2048i64 },
        };
        let adapted = adapt_collection_stats("app", "users", &stats);
        assert_eq!(adapted.ns, "app.users");
        assert!(adapted.is_capped);
        assert_eq!(adapted.max, 1000);
        assert_eq!(adapted.document_count, 250);
        assert_eq!(adapted.document_size, 8192);
        assert_eq!(adapted.index_count, 2);
        assert_eq!(adapted.index_sizes, doc! { "_id_": 2048i64 });
        assert!(!adapted.readonly);
    }

    #[test]
    fn view_stub_is_readonly_and_empty() {
        let stub = CollectionStats::readonly_view("app", "active_users");
        assert_eq!(stub.ns, "app.active_users");
        assert_eq!(stub.database, "app");
        assert!(stub.readonly);
        assert_eq!(stub.document_count, 0);
        assert!(stub.index_sizes.is_empty());
    }

    #[test]
    fn database_only_namespaces_are_rejected() {
        let error = collection_namespace("reporting").unwrap_err();
        assert!(matches!(error, DataServiceError::InvalidArgument(_)));
        assert!(error.to_string().contains("reporting"));
        assert!(collection_namespace("reporting.sessions").is_ok());
    }

    #[test]
    fn collection_stats_capture_shard_breakdown() {
        let stats = doc! {
            "sharded": true,
            "shards": { "rs0": { "size": 10i64, "count": 2i64 } },
            "count": 2i64,
        };
        let adapted = adapt_collection_stats("app", "events", &stats);
        assert!(adapted.sharded);
        assert_eq!(
            adapted.shards.get_document("rs0").unwrap(),
            &doc! { "size": 10i64, "count": 2i64 }
        );

        let plain = adapt_collection_stats("app", "users", &doc! { "count": 1i64 });
        assert!(!plain.sharded);
        assert!(plain.shards.is_empty());
    }

    #[test]
    fn shard_distribution_derives_chunk_estimates() {
        let shard_stats = doc! { "size": 4000i64, "count": 100i64 };
        let distribution = shard_distribution(16000, 400, &shard_stats, "rs0/host-a:27018", 4);
        assert_eq!(distribution.host, "rs0/host-a:27018");
        assert_eq!(distribution.shard_data, 4000);
        assert_eq!(distribution.shard_docs, 100);
        assert_eq!(distribution.estimated_data_per_chunk, 1000.0);
        assert_eq!(distribution.estimated_docs_per_chunk, 25);
        assert_eq!(distribution.estimated_data_percent, 25.0);
        assert_eq!(distribution.estimated_doc_percent, 25.0);
    }

    #[test]
    fn shard_distribution_percentages_floor_to_two_decimals() {
        let shard_stats = doc! { "size": 1i64, "count": 1i64 };
        let distribution = shard_distribution(3, 3, &shard_stats, "rs1", 1);
        assert_eq!(distribution.estimated_data_percent, 33.33);
        assert_eq!(distribution.estimated_doc_percent, 33.33);
    }

    #[test]
    fn shard_distribution_tolerates_zero_totals_and_chunks() {
        let distribution = shard_distribution(0, 0, &doc! {}, "", 0);
        assert_eq!(distribution.estimated_data_per_chunk, 0.0);
        assert_eq!(distribution.estimated_docs_per_chunk, 0);
        assert_eq!(distribution.estimated_data_percent, 0.0);
        assert_eq!(distribution.estimated_doc_percent, 0.0);
    }

    #[test]
    fn view_error_is_detected_from_message() {
        let error = DriverError::from(std::io::Error::other(
            "Namespace app.active_users is a view, not a collection".to_string(),
        ));
        assert!(is_view_error(&error));

        let other =
            DriverError::from(std::io::Error::other("collection does not exist".to_string()));
        assert!(!is_view_error(&other));
    }
}
