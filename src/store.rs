use mongodb::bson::Document;
use mongodb::options::{
    AggregateOptions, CountOptions, CreateCollectionOptions, DeleteOptions,
    FindOneAndReplaceOptions, FindOptions, IndexOptions, InsertManyOptions, InsertOneOptions,
    UpdateModifications, UpdateOptions,
};
use mongodb::results::{
    DatabaseSpecification, DeleteResult, InsertManyResult, InsertOneResult, UpdateResult,
};
use tokio::sync::broadcast;

use crate::client::{CollectionOverview, CollectionStats, DataClient, DatabaseOverview};
use crate::connection::ConnectionDescriptor;
use crate::error::{DataServiceError, Result};
use crate::instance::{CollectionDetail, DatabaseDetail, InstanceDetail};
use crate::sampling::{SampleOptions, SampleStream};

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Lifecycle notifications broadcast by [`DataServiceStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    ConnectionChanged { connected: bool },
}

/// Owns the connected adapter and gates every operation on it.
///
/// Requests are plain async method calls returning `Result`; until `connect`
/// succeeds, every operation resolves to [`DataServiceError::NotInitialized`]
/// without touching the network. Connection state changes are broadcast so
/// observers can track the lifecycle without polling.
pub struct DataServiceStore {
    service: Option<DataClient>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for DataServiceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataServiceStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { service: None, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.service.is_some()
    }

    /// Builds and connects an adapter from a descriptor. An already-connected
    /// adapter is shut down first, and a connection-changed notification goes
    /// out whether the new attempt succeeds or fails.
    pub async fn connect(&mut self, descriptor: ConnectionDescriptor) -> Result<()> {
        if let Some(previous) = self.service.take() {
            previous.disconnect().await;
            self.notify(false);
        }
        match DataClient::connect(descriptor).await {
            Ok(service) => {
                self.service = Some(service);
                self.notify(true);
                Ok(())
            }
            Err(error) => {
                self.notify(false);
                Err(error)
            }
        }
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        let service = self.service.take().ok_or(DataServiceError::NotInitialized)?;
        service.disconnect().await;
        self.notify(false);
        Ok(())
    }

    fn notify(&self, connected: bool) {
        // A send error just means nobody subscribed.
        let _ = self.events.send(StoreEvent::ConnectionChanged { connected });
    }

    fn service(&self) -> Result<&DataClient> {
        self.service.as_ref().ok_or(DataServiceError::NotInitialized)
    }

    pub async fn command(&self, database: &str, command: Document) -> Result<Document> {
        self.service()?.command(database, command).await
    }

    pub async fn build_info(&self) -> Result<Document> {
        self.service()?.build_info().await
    }

    pub async fn host_info(&self) -> Result<Document> {
        self.service()?.host_info().await
    }

    pub async fn connection_status(&self, show_privileges: bool) -> Result<Document> {
        self.service()?.connection_status(show_privileges).await
    }

    pub async fn users_info(&self, database: &str, options: Document) -> Result<Document> {
        self.service()?.users_info(database, options).await
    }

    pub async fn find(
        &self,
        ns: &str,
        filter: Document,
        options: Option<FindOptions>,
    ) -> Result<Vec<Document>> {
        self.service()?.find(ns, filter, options).await
    }

    pub async fn count(
        &self,
        ns: &str,
        filter: Document,
        options: Option<CountOptions>,
    ) -> Result<u64> {
        self.service()?.count(ns, filter, options).await
    }

    pub async fn aggregate(
        &self,
        ns: &str,
        pipeline: Vec<Document>,
        options: Option<AggregateOptions>,
    ) -> Result<Vec<Document>> {
        self.service()?.aggregate(ns, pipeline, options).await
    }

    pub async fn insert_one(
        &self,
        ns: &str,
        document: Document,
        options: Option<InsertOneOptions>,
    ) -> Result<InsertOneResult> {
        self.service()?.insert_one(ns, document, options).await
    }

    pub async fn insert_many(
        &self,
        ns: &str,
        documents: Vec<Document>,
        options: Option<InsertManyOptions>,
    ) -> Result<InsertManyResult> {
        self.service()?.insert_many(ns, documents, options).await
    }

    pub async fn update_one(
        &self,
        ns: &str,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: Option<UpdateOptions>,
    ) -> Result<UpdateResult> {
        self.service()?.update_one(ns, filter, update, options).await
    }

    pub async fn update_many(
        &self,
        ns: &str,
        filter: Document,
        update: impl Into<UpdateModifications>,
        options: Option<UpdateOptions>,
    ) -> Result<UpdateResult> {
        self.service()?.update_many(ns, filter, update, options).await
    }

    pub async fn delete_one(
        &self,
        ns: &str,
        filter: Document,
        options: Option<DeleteOptions>,
    ) -> Result<DeleteResult> {
        self.service()?.delete_one(ns, filter, options).await
    }

    pub async fn delete_many(
        &self,
        ns: &str,
        filter: Document,
        options: Option<DeleteOptions>,
    ) -> Result<DeleteResult> {
        self.service()?.delete_many(ns, filter, options).await
    }

    pub async fn find_one_and_replace(
        &self,
        ns: &str,
        filter: Document,
        replacement: Document,
        options: Option<FindOneAndReplaceOptions>,
    ) -> Result<Option<Document>> {
        self.service()?.find_one_and_replace(ns, filter, replacement, options).await
    }

    pub async fn create_collection(
        &self,
        ns: &str,
        options: Option<CreateCollectionOptions>,
    ) -> Result<()> {
        self.service()?.create_collection(ns, options).await
    }

    pub async fn update_collection(&self, ns: &str, flags: Document) -> Result<Document> {
        self.service()?.update_collection(ns, flags).await
    }

    pub async fn drop_collection(&self, ns: &str) -> Result<()> {
        self.service()?.drop_collection(ns).await
    }

    pub async fn drop_database(&self, database: &str) -> Result<()> {
        self.service()?.drop_database(database).await
    }

    pub async fn create_index(
        &self,
        ns: &str,
        keys: Document,
        options: Option<IndexOptions>,
    ) -> Result<String> {
        self.service()?.create_index(ns, keys, options).await
    }

    pub async fn drop_index(&self, ns: &str, name: &str) -> Result<()> {
        self.service()?.drop_index(ns, name).await
    }

    pub async fn list_indexes(&self, ns: &str) -> Result<Vec<Document>> {
        self.service()?.list_indexes(ns).await
    }

    pub async fn list_collections(
        &self,
        database: &str,
        filter: Option<Document>,
    ) -> Result<Vec<CollectionDetail>> {
        self.service()?.list_collections(database, filter).await
    }

    pub async fn list_databases(
        &self,
        filter: Option<Document>,
    ) -> Result<Vec<DatabaseSpecification>> {
        self.service()?.list_databases(filter).await
    }

    pub async fn collection_names(&self, database: &str) -> Result<Vec<String>> {
        self.service()?.collection_names(database).await
    }

    pub async fn collection_stats(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<CollectionStats> {
        self.service()?.collection_stats(database, collection).await
    }

    pub async fn collection_detail(&self, ns: &str) -> Result<CollectionOverview> {
        self.service()?.collection_detail(ns).await
    }

    pub async fn sharded_collection_detail(&self, ns: &str) -> Result<CollectionOverview> {
        self.service()?.sharded_collection_detail(ns).await
    }

    pub async fn collections(&self, database: &str) -> Result<Vec<CollectionStats>> {
        self.service()?.collections(database).await
    }

    pub async fn database_stats(&self, database: &str) -> Result<DatabaseDetail> {
        self.service()?.database_stats(database).await
    }

    pub async fn database_detail(&self, database: &str) -> Result<DatabaseOverview> {
        self.service()?.database_detail(database).await
    }

    pub async fn server_stats(&self) -> Result<Document> {
        self.service()?.server_stats().await
    }

    pub async fn top(&self) -> Result<Document> {
        self.service()?.top().await
    }

    pub async fn current_op(&self, include_all: bool) -> Result<Document> {
        self.service()?.current_op(include_all).await
    }

    pub async fn explain(&self, ns: &str, filter: Document) -> Result<Document> {
        self.service()?.explain(ns, filter).await
    }

    pub async fn sample(&self, ns: &str, options: SampleOptions) -> Result<SampleStream> {
        self.service()?.sample(ns, options).await
    }

    pub async fn instance(&self) -> Result<InstanceDetail> {
        self.service()?.instance().await
    }
}
