use std::collections::{BTreeMap, BTreeSet, HashSet};

use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{Collation, DatabaseOptions, ReadPreference, SelectionCriteria};
use mongodb::results::{CollectionSpecification, CollectionType};
use mongodb::{Client, Database};
use serde::Serialize;

use crate::error::{DataServiceError, Result, is_mongos_local_error, is_not_authorized};
use crate::namespace::Namespace;

const RESERVED_DATABASES: &[&str] = &["admin", "local", "config"];
const SYSTEM_COLLECTION_PREFIX: &str = "system.";
const DEFAULT_DATABASE: &str = "test";

/// Database name to the collection names the authenticated user holds
/// privileges on. An entry with an empty set marks a database-level grant.
pub(crate) type PrivilegeMap = BTreeMap<String, BTreeSet<String>>;

/// Snapshot of a whole deployment: host facts, build facts and the database
/// tree. Rebuilt fresh on every call, never cached.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstanceDetail {
    #[serde(rename = "_id")]
    pub id: String,
    pub hostname: String,
    pub port: u16,
    pub build: BuildFacts,
    pub host: HostFacts,
    pub genuine_mongodb: GenuineMongoDb,
    pub data_lake: DataLakeInfo,
    pub databases: Vec<DatabaseDetail>,
    /// True when any best-effort sub-fetch was replaced by its fallback, so
    /// under-privileged sessions can tell the snapshot may be narrowed.
    pub partial: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct HostFacts {
    pub hostname: String,
    pub os: Option<String>,
    pub os_family: Option<String>,
    pub kernel_version: Option<String>,
    pub kernel_version_string: Option<String>,
    pub arch: Option<String>,
    pub memory_bits: i64,
    pub cpu_cores: i64,
    pub cpu_bits: i64,
    pub cpu_frequency_hz: i64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BuildFacts {
    pub version: String,
    pub commit: Option<String>,
    pub commit_url: String,
    pub allocator: Option<String>,
    pub javascript_engine: Option<String>,
    pub debug: bool,
    pub for_bits: i64,
    pub max_bson_object_size: i64,
    pub enterprise_module: bool,
    pub query_engine: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenuineMongoDb {
    pub is_genuine: bool,
    pub server_name: String,
}

impl Default for GenuineMongoDb {
    fn default() -> Self {
        Self { is_genuine: true, server_name: String::from("mongodb") }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DataLakeInfo {
    pub is_data_lake: bool,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DatabaseDetail {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub document_count: i64,
    pub storage_size: i64,
    pub index_count: i64,
    pub index_size: i64,
    pub collections: Vec<CollectionDetail>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionDetail {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub database: String,
    pub readonly: bool,
    #[serde(rename = "type")]
    pub collection_type: String,
    pub view_on: Option<String>,
    pub pipeline: Option<Vec<Document>>,
    pub collation: Option<Collation>,
}

impl CollectionDetail {
    /// A name-only entry for collections known solely through privilege
    /// grants. All other fields take their defaults.
    fn from_privilege(database: &str, name: &str) -> Self {
        Self {
            id: Namespace::new(database, name).to_string(),
            name: name.to_string(),
            database: database.to_string(),
            collection_type: String::from("collection"),
            ..Self::default()
        }
    }
}

/// Fans out the fixed set of admin commands, merges listed databases and
/// collections with the ones inferable from the user's privileges, and
/// normalizes everything into one [`InstanceDetail`] tree.
///
/// `connectionStatus` is required and its failure propagates; the other
/// admin commands tolerate authorization failures by substituting fallbacks.
/// All sibling fetches run concurrently and produce independent values that
/// are only merged at the join points.
pub async fn fetch_instance_details(client: &Client) -> Result<InstanceDetail> {
    let admin = client.database("admin");

    let status = async {
        admin
            .run_command(doc! { "connectionStatus": 1, "showPrivileges": true })
            .await
            .map_err(DataServiceError::from_driver)
    };

    let (connection_status, cmd_line_opts, raw_host_info, raw_build_info, listed_databases) =
        futures::try_join!(
            status,
            admin_command_or_fallback(&admin, doc! { "getCmdLineOpts": 1 }),
            admin_command_or_fallback(&admin, doc! { "hostInfo": 1 }),
            admin_command_or_fallback(&admin, doc! { "buildInfo": 1 }),
            admin_command_or_fallback(&admin, doc! { "listDatabases": 1 }),
        )?;

    let privileges = extract_privileges(&connection_status);
    let default_database = client.default_database().map(|db| db.name().to_string());
    let database_names = candidate_database_names(
        default_database.as_deref(),
        listed_databases.as_ref(),
        &privileges,
    );

    let fetched = futures::future::try_join_all(
        database_names.iter().map(|name| fetch_database(client, name, &privileges)),
    )
    .await?;

    let command_fallbacks = [
        cmd_line_opts.is_none(),
        raw_host_info.is_none(),
        raw_build_info.is_none(),
        listed_databases.is_none(),
    ];
    let (databases, database_fallbacks): (Vec<_>, Vec<bool>) = fetched.into_iter().unzip();
    let partial = snapshot_is_partial(&command_fallbacks, &database_fallbacks);

    let empty = Document::new();
    let raw_build = raw_build_info.as_ref().unwrap_or(&empty);

    Ok(InstanceDetail {
        build: adapt_build_facts(raw_build),
        host: adapt_host_facts(raw_host_info.as_ref().unwrap_or(&empty)),
        genuine_mongodb: genuine_info(raw_build, cmd_line_opts.as_ref()),
        data_lake: data_lake_info(raw_build),
        databases,
        partial,
        ..InstanceDetail::default()
    })
}

/// Whether any best-effort fetch anywhere in the aggregation substituted its
/// fallback value: one flag per optional admin command, one per database.
pub(crate) fn snapshot_is_partial(
    command_fallbacks: &[bool],
    database_fallbacks: &[bool],
) -> bool {
    command_fallbacks.iter().chain(database_fallbacks).any(|&fired| fired)
}

/// Runs a best-effort admin command: authorization failures collapse to
/// `None`, every other error still fails the aggregation.
async fn admin_command_or_fallback(admin: &Database, command: Document) -> Result<Option<Document>> {
    match admin.run_command(command.clone()).await {
        Ok(result) => Ok(Some(result)),
        Err(error) if is_not_authorized(&error) => {
            log::debug!("ignoring authorization failure for {command:?}, using fallback");
            Ok(None)
        }
        Err(error) => Err(DataServiceError::from_driver(error)),
    }
}

async fn fetch_database(
    client: &Client,
    name: &str,
    privileges: &PrivilegeMap,
) -> Result<(DatabaseDetail, bool)> {
    let db = pinned_database(client, name);

    let stats = async {
        match db.run_command(doc! { "dbStats": 1 }).await {
            Ok(result) => Ok((Some(result), false)),
            Err(error) if is_not_authorized(&error) => {
                log::debug!("dbStats unauthorized on {name}, using name-only stub");
                Ok((None, true))
            }
            Err(error) => Err(DataServiceError::from_driver(error)),
        }
    };

    let collections = async {
        match list_collection_specs(&db).await {
            Ok(specs) => Ok((specs, false)),
            Err(error) if is_not_authorized(&error) || is_mongos_local_error(&error) => {
                log::debug!("listCollections on {name} fell back to privilege-derived set");
                Ok((Vec::new(), true))
            }
            Err(error) => Err(DataServiceError::from_driver(error)),
        }
    };

    let ((raw_stats, stats_partial), (specs, list_partial)) = futures::try_join!(stats, collections)?;

    let listed =
        specs.iter().map(|specification| adapt_collection_spec(name, specification)).collect();

    let mut database = adapt_database_stats(name, raw_stats.as_ref());
    database.collections = merge_collections(name, listed, privileges);
    Ok((database, stats_partial || list_partial))
}

async fn list_collection_specs(
    db: &Database,
) -> mongodb::error::Result<Vec<CollectionSpecification>> {
    db.list_collections().await?.try_collect().await
}

/// A database handle with the resolved read preference pinned explicitly.
/// `listCollections` only honors a read preference passed with the command,
/// so relying on the ambient criteria would always target the primary.
pub(crate) fn pinned_database(client: &Client, name: &str) -> Database {
    let selection_criteria = client
        .database(name)
        .selection_criteria()
        .cloned()
        .unwrap_or_else(|| SelectionCriteria::ReadPreference(ReadPreference::Primary));
    client.database_with_options(
        name,
        DatabaseOptions::builder().selection_criteria(selection_criteria).build(),
    )
}

/// Pulls the per-database collection privileges out of a `connectionStatus`
/// response. Grants for the same database are merged, cluster-wide grants
/// without a database are skipped.
pub(crate) fn extract_privileges(connection_status: &Document) -> PrivilegeMap {
    let mut privileges = PrivilegeMap::new();
    let Some(granted) = lookup(connection_status, "authInfo.authenticatedUserPrivileges")
        .and_then(Bson::as_array)
    else {
        return privileges;
    };

    for grant in granted {
        let Some(resource) =
            grant.as_document().and_then(|grant| grant.get_document("resource").ok())
        else {
            continue;
        };
        let Ok(database) = resource.get_str("db") else {
            continue;
        };
        let collections = privileges.entry(database.to_string()).or_default();
        if let Ok(collection) = resource.get_str("collection") {
            if !collection.is_empty() {
                collections.insert(collection.to_string());
            }
        }
    }

    privileges
}

/// Union of the connection's default database, the listed databases and the
/// privilege-derived names, in that order, excluding reserved names. Works
/// off the raw `listDatabases` response so an authorization fallback (`None`)
/// simply contributes nothing.
pub(crate) fn candidate_database_names(
    default_database: Option<&str>,
    listed_databases: Option<&Document>,
    privileges: &PrivilegeMap,
) -> Vec<String> {
    let listed = listed_databases
        .and_then(|response| response.get_array("databases").ok())
        .map(|databases| {
            databases
                .iter()
                .filter_map(|entry| entry.as_document())
                .filter_map(|entry| entry.get_str("name").ok())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let mut names = Vec::new();
    let candidates = std::iter::once(default_database.unwrap_or(DEFAULT_DATABASE))
        .chain(listed)
        .chain(privileges.keys().map(String::as_str));

    for name in candidates {
        if name.is_empty() || RESERVED_DATABASES.contains(&name) {
            continue;
        }
        if seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    }

    names
}

/// Unions listed collections with privilege-derived names, deduplicated by
/// name with listed data winning, `system.` collections excluded.
pub(crate) fn merge_collections(
    database: &str,
    listed: Vec<CollectionDetail>,
    privileges: &PrivilegeMap,
) -> Vec<CollectionDetail> {
    let mut merged: Vec<CollectionDetail> = listed
        .into_iter()
        .filter(|collection| {
            !collection.name.is_empty() && !collection.name.starts_with(SYSTEM_COLLECTION_PREFIX)
        })
        .collect();
    let mut seen: HashSet<String> =
        merged.iter().map(|collection| collection.name.clone()).collect();

    if let Some(names) = privileges.get(database) {
        for name in names {
            if name.starts_with(SYSTEM_COLLECTION_PREFIX) || !seen.insert(name.clone()) {
                continue;
            }
            merged.push(CollectionDetail::from_privilege(database, name));
        }
    }

    merged
}

pub(crate) fn adapt_collection_spec(
    database: &str,
    specification: &CollectionSpecification,
) -> CollectionDetail {
    CollectionDetail {
        id: Namespace::new(database, specification.name.clone()).to_string(),
        name: specification.name.clone(),
        database: database.to_string(),
        readonly: specification.info.read_only,
        collection_type: collection_type_label(&specification.collection_type).to_string(),
        view_on: specification.options.view_on.clone(),
        pipeline: specification.options.pipeline.clone(),
        collation: specification.options.collation.clone(),
    }
}

fn collection_type_label(collection_type: &CollectionType) -> &'static str {
    match collection_type {
        CollectionType::View => "view",
        CollectionType::Timeseries => "timeseries",
        _ => "collection",
    }
}

pub(crate) fn adapt_database_stats(name: &str, stats: Option<&Document>) -> DatabaseDetail {
    let empty = Document::new();
    let stats = stats.unwrap_or(&empty);
    DatabaseDetail {
        id: name.to_string(),
        name: name.to_string(),
        document_count: get_i64(stats, "objects"),
        storage_size: get_i64(stats, "storageSize"),
        index_count: get_i64(stats, "indexes"),
        index_size: get_i64(stats, "indexSize"),
        collections: Vec::new(),
    }
}

pub(crate) fn adapt_host_facts(raw: &Document) -> HostFacts {
    HostFacts {
        hostname: lookup_str(raw, "system.hostname").unwrap_or("unknown").to_string(),
        os: lookup_str(raw, "os.name").map(str::to_string),
        os_family: lookup_str(raw, "os.type").map(str::to_lowercase),
        kernel_version: lookup_str(raw, "os.version").map(str::to_string),
        kernel_version_string: lookup_str(raw, "extra.versionString").map(str::to_string),
        arch: lookup_str(raw, "system.cpuArch").map(str::to_string),
        memory_bits: lookup_i64(raw, "system.memSizeMB") * 1024 * 1024,
        cpu_cores: lookup_i64(raw, "system.numCores"),
        cpu_bits: lookup_i64(raw, "system.cpuAddrSize"),
        cpu_frequency_hz: lookup_i64(raw, "extra.cpuFrequencyMHz") * 1_000_000,
    }
}

pub(crate) fn adapt_build_facts(raw: &Document) -> BuildFacts {
    let commit = raw.get_str("gitVersion").ok().map(str::to_string);
    let commit_url = commit
        .as_deref()
        .map(|commit| format!("https://github.com/mongodb/mongo/commit/{commit}"))
        .unwrap_or_default();
    let enterprise_module = raw
        .get_array("modules")
        .map(|modules| modules.iter().any(|module| module.as_str() == Some("enterprise")))
        .unwrap_or(false);

    BuildFacts {
        version: raw.get_str("version").unwrap_or_default().to_string(),
        commit,
        commit_url,
        allocator: raw.get_str("allocator").ok().map(str::to_string),
        javascript_engine: raw.get_str("javascriptEngine").ok().map(str::to_string),
        debug: raw.get_bool("debug").unwrap_or(false),
        for_bits: get_i64(raw, "bits"),
        max_bson_object_size: get_i64(raw, "maxBsonObjectSize"),
        enterprise_module,
        query_engine: raw.get_str("queryEngine").ok().map(str::to_string),
    }
}

/// Impostor detection: CosmosDB responses carry a `_t` discriminator in
/// `buildInfo`, DocumentDB identifies itself in the command line options.
pub(crate) fn genuine_info(
    raw_build: &Document,
    cmd_line_opts: Option<&Document>,
) -> GenuineMongoDb {
    if raw_build.contains_key("_t") {
        return GenuineMongoDb { is_genuine: false, server_name: String::from("cosmosdb") };
    }
    let cmd_line = cmd_line_opts.map(Document::to_string).unwrap_or_default().to_lowercase();
    if cmd_line.contains("documentdb") {
        return GenuineMongoDb { is_genuine: false, server_name: String::from("documentdb") };
    }
    GenuineMongoDb::default()
}

pub(crate) fn data_lake_info(raw_build: &Document) -> DataLakeInfo {
    match raw_build.get_document("dataLake") {
        Ok(data_lake) => DataLakeInfo {
            is_data_lake: true,
            version: data_lake.get_str("version").ok().map(str::to_string),
        },
        Err(_) => DataLakeInfo::default(),
    }
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut current = document;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let value = current.get(segment)?;
        if segments.peek().is_none() {
            return Some(value);
        }
        current = value.as_document()?;
    }
    None
}

fn lookup_str<'a>(document: &'a Document, path: &str) -> Option<&'a str> {
    lookup(document, path).and_then(Bson::as_str)
}

fn lookup_i64(document: &Document, path: &str) -> i64 {
    lookup(document, path).map(numeric).unwrap_or(0)
}

pub(crate) fn get_i64(document: &Document, key: &str) -> i64 {
    document.get(key).map(numeric).unwrap_or(0)
}

/// Servers report sizes and counts as int32, int64 or double depending on
/// version and magnitude.
fn numeric(value: &Bson) -> i64 {
    match value {
        Bson::Int32(value) => i64::from(*value),
        Bson::Int64(value) => *value,
        Bson::Double(value) => *value as i64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn connection_status(privileges: Vec<Document>) -> Document {
        doc! {
            "authInfo": {
                "authenticatedUsers": [{ "user": "reader", "db": "admin" }],
                "authenticatedUserPrivileges": privileges,
            },
            "ok": 1,
        }
    }

    #[test]
    fn privileges_merge_grants_for_one_database() {
        let status = connection_status(vec![
            doc! { "resource": { "db": "app", "collection": "users" }, "actions": ["find"] },
            doc! { "resource": { "db": "app", "collection": "orders" }, "actions": ["find"] },
            doc! { "resource": { "db": "app", "collection": "" }, "actions": ["dbStats"] },
        ]);
        let privileges = extract_privileges(&status);
        let collections = privileges.get("app").unwrap();
        assert!(collections.contains("users"));
        assert!(collections.contains("orders"));
        assert_eq!(collections.len(), 2);
    }

    #[test]
    fn cluster_wide_grants_are_skipped() {
        let status = connection_status(vec![
            doc! { "resource": { "cluster": true }, "actions": ["connPoolStats"] },
            doc! { "resource": { "db": "app", "collection": "users" }, "actions": ["find"] },
        ]);
        let privileges = extract_privileges(&status);
        assert_eq!(privileges.len(), 1);
        assert!(privileges.contains_key("app"));
    }

    #[test]
    fn missing_auth_info_yields_empty_privileges() {
        assert!(extract_privileges(&doc! { "ok": 1 }).is_empty());
    }

    #[test]
    fn candidate_names_union_all_three_sources() {
        let mut privileges = PrivilegeMap::new();
        privileges.insert(String::from("analytics"), BTreeSet::new());
        let listed = doc! { "databases": [{ "name": "app" }, { "name": "staging" }] };

        let names = candidate_database_names(Some("app"), Some(&listed), &privileges);
        assert_eq!(names, vec!["app", "staging", "analytics"]);
    }

    #[test]
    fn candidate_names_survive_missing_list_databases() {
        // listDatabases fell back after an authorization failure; the
        // privilege-derived names still show up.
        let mut privileges = PrivilegeMap::new();
        privileges.insert(String::from("sales"), BTreeSet::new());
        privileges.insert(String::from("admin"), BTreeSet::new());

        let names = candidate_database_names(None, None, &privileges);
        assert_eq!(names, vec!["test", "sales"]);
    }

    #[test]
    fn reserved_databases_are_excluded_even_when_listed() {
        let listed = doc! { "databases": [
            { "name": "admin" }, { "name": "local" }, { "name": "config" }, { "name": "app" },
        ] };
        let names = candidate_database_names(Some("app"), Some(&listed), &PrivilegeMap::new());
        assert_eq!(names, vec!["app"]);
    }

    #[test]
    fn listed_collection_wins_over_privilege_stub() {
        let mut privileges = PrivilegeMap::new();
        privileges
            .insert(String::from("app"), BTreeSet::from([String::from("users")]));

        let listed = vec![CollectionDetail {
            id: String::from("app.users"),
            name: String::from("users"),
            database: String::from("app"),
            readonly: true,
            collection_type: String::from("collection"),
            ..CollectionDetail::default()
        }];

        let merged = merge_collections("app", listed, &privileges);
        assert_eq!(merged.len(), 1);
        // Listed data takes precedence on conflict.
        assert!(merged[0].readonly);
    }

    #[test]
    fn privilege_only_collections_appear_with_defaults() {
        let mut privileges = PrivilegeMap::new();
        privileges.insert(
            String::from("app"),
            BTreeSet::from([
                String::from("archive"),
                String::from("system.views"),
            ]),
        );

        let merged = merge_collections("app", Vec::new(), &privileges);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "archive");
        assert_eq!(merged[0].id, "app.archive");
        assert!(!merged[0].readonly);
        assert_eq!(merged[0].collection_type, "collection");
    }

    #[test]
    fn database_stats_adapt_with_numeric_coercion() {
        let stats = doc! {
            "db": "app",
            "objects": 120i64,
            "storageSize": 4096.0,
            "indexes": 3i32,
            "indexSize": 1024i64,
        };
        let detail = adapt_database_stats("app", Some(&stats));
        assert_eq!(detail.name, "app");
        assert_eq!(detail.document_count, 120);
        assert_eq!(detail.storage_size, 4096);
        assert_eq!(detail.index_count, 3);
        assert_eq!(detail.index_size, 1024);
    }

    #[test]
    fn database_stats_fallback_is_a_name_only_stub() {
        let detail = adapt_database_stats("app", None);
        assert_eq!(detail.id, "app");
        assert_eq!(detail.name, "app");
        assert_eq!(detail.document_count, 0);
    }

    #[test]
    fn host_facts_adaptation() {
        let raw = doc! {
            "system": {
                "hostname": "db-0.internal",
                "cpuArch": "x86_64",
                "memSizeMB": 16384i32,
                "numCores": 8i32,
                "cpuAddrSize": 64i32,
            },
            "os": { "name": "Ubuntu", "type": "Linux", "version": "22.04" },
            "extra": { "versionString": "Linux version 6.1", "cpuFrequencyMHz": 2600i32 },
        };
        let host = adapt_host_facts(&raw);
        assert_eq!(host.hostname, "db-0.internal");
        assert_eq!(host.os_family.as_deref(), Some("linux"));
        assert_eq!(host.memory_bits, 16384 * 1024 * 1024);
        assert_eq!(host.cpu_cores, 8);
        assert_eq!(host.cpu_frequency_hz, 2_600_000_000);
    }

    #[test]
    fn host_facts_tolerate_empty_fallback() {
        let host = adapt_host_facts(&Document::new());
        assert_eq!(host.hostname, "unknown");
        assert_eq!(host.memory_bits, 0);
        assert!(host.os.is_none());
    }

    #[test]
    fn build_facts_adaptation() {
        let raw = doc! {
            "version": "7.0.2",
            "gitVersion": "abcdef0123",
            "allocator": "tcmalloc",
            "javascriptEngine": "mozjs",
            "debug": false,
            "bits": 64i32,
            "maxBsonObjectSize": 16777216i32,
            "modules": ["enterprise"],
        };
        let build = adapt_build_facts(&raw);
        assert_eq!(build.version, "7.0.2");
        assert_eq!(build.commit_url, "https://github.com/mongodb/mongo/commit/abcdef0123");
        assert!(build.enterprise_module);
        assert_eq!(build.for_bits, 64);
    }

    #[test]
    fn community_build_has_no_enterprise_module() {
        let build = adapt_build_facts(&doc! { "version": "6.0.1", "modules": [] });
        assert!(!build.enterprise_module);
        assert_eq!(build.commit_url, "");
    }

    #[test]
    fn cosmosdb_is_not_genuine() {
        let info = genuine_info(&doc! { "_t": "BuildInfoResponse", "version": "4.2" }, None);
        assert!(!info.is_genuine);
        assert_eq!(info.server_name, "cosmosdb");
    }

    #[test]
    fn documentdb_is_detected_from_cmd_line() {
        let opts = doc! { "argv": ["documentdb"], "ok": 1 };
        let info = genuine_info(&doc! { "version": "5.0" }, Some(&opts));
        assert!(!info.is_genuine);
        assert_eq!(info.server_name, "documentdb");
    }

    #[test]
    fn plain_server_is_genuine() {
        let info = genuine_info(&doc! { "version": "7.0.2" }, Some(&doc! { "argv": ["mongod"] }));
        assert!(info.is_genuine);
        assert_eq!(info.server_name, "mongodb");
    }

    #[test]
    fn data_lake_detection() {
        let lake = data_lake_info(&doc! { "dataLake": { "version": "v20230101" } });
        assert!(lake.is_data_lake);
        assert_eq!(lake.version.as_deref(), Some("v20230101"));

        assert!(!data_lake_info(&doc! { "version": "7.0" }).is_data_lake);
    }

    #[test]
    fn partial_is_clear_when_no_fallback_fires() {
        assert!(!snapshot_is_partial(&[false, false, false, false], &[false, false]));
        assert!(!snapshot_is_partial(&[false, false, false, false], &[]));
    }

    #[test]
    fn a_single_fallback_marks_the_snapshot_partial() {
        // One optional admin command fell back.
        assert!(snapshot_is_partial(&[false, false, true, false], &[]));
        // One database's stats or collection listing fell back.
        assert!(snapshot_is_partial(&[false, false, false, false], &[false, true, false]));
    }

    #[test]
    fn instance_detail_serializes_with_id_field() {
        let mut detail = InstanceDetail::default();
        detail.id = String::from("localhost:27017");
        detail.databases.push(DatabaseDetail {
            id: String::from("app"),
            name: String::from("app"),
            ..DatabaseDetail::default()
        });

        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["_id"], "localhost:27017");
        assert_eq!(value["databases"][0]["_id"], "app");
        assert_eq!(value["partial"], false);
    }
}
