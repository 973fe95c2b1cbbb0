//! Remote provider API.
//!
//! The API is split into one trait per entity family; [`Provider`] is the
//! composite the controllers hold. `get_*` calls return
//! [`ProviderError::Api`] with status 404 for missing entities; turning that
//! into "absent" is the job of [`crate::observe`].

pub mod error;
pub mod fake;
pub mod http;
pub mod types;

use async_trait::async_trait;
use dbfleet_api::deployment::{CustomZoneMapping, ManagedNamespace, ProcessArgs, SearchNodeSpec};

pub use error::{ProviderError, Result};
pub use fake::FakeProvider;
pub use http::HttpProvider;
use types::{
    BackupSchedule, Cluster, FlexInstance, GeoSharding, SearchDeployment, SearchIndexDefinition,
    ServerlessEndpoint, ServerlessInstance,
};

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_cluster(&self, project_id: &str, name: &str) -> Result<Cluster>;
    async fn create_cluster(&self, project_id: &str, cluster: &Cluster) -> Result<Cluster>;
    async fn update_cluster(&self, project_id: &str, name: &str, cluster: &Cluster)
        -> Result<Cluster>;
    async fn delete_cluster(&self, project_id: &str, name: &str) -> Result<()>;

    /// Migrates a shared-tier cluster to the dedicated tier described by `cluster`.
    async fn upgrade_tenant(&self, project_id: &str, cluster: &Cluster) -> Result<Cluster>;

    async fn get_process_args(&self, project_id: &str, name: &str) -> Result<ProcessArgs>;
    async fn update_process_args(
        &self,
        project_id: &str,
        name: &str,
        args: &ProcessArgs,
    ) -> Result<ProcessArgs>;
}

#[async_trait]
pub trait ServerlessApi: Send + Sync {
    async fn get_serverless(&self, project_id: &str, name: &str) -> Result<ServerlessInstance>;
    async fn create_serverless(
        &self,
        project_id: &str,
        instance: &ServerlessInstance,
    ) -> Result<ServerlessInstance>;
    async fn update_serverless(
        &self,
        project_id: &str,
        name: &str,
        instance: &ServerlessInstance,
    ) -> Result<ServerlessInstance>;
    async fn delete_serverless(&self, project_id: &str, name: &str) -> Result<()>;

    async fn list_serverless_endpoints(
        &self,
        project_id: &str,
        instance: &str,
    ) -> Result<Vec<ServerlessEndpoint>>;
    /// Reserves a new endpoint tagged with `comment`.
    async fn create_serverless_endpoint(
        &self,
        project_id: &str,
        instance: &str,
        comment: &str,
    ) -> Result<ServerlessEndpoint>;
    async fn update_serverless_endpoint(
        &self,
        project_id: &str,
        instance: &str,
        endpoint: &ServerlessEndpoint,
    ) -> Result<ServerlessEndpoint>;
    async fn delete_serverless_endpoint(
        &self,
        project_id: &str,
        instance: &str,
        endpoint_id: &str,
    ) -> Result<()>;
}

#[async_trait]
pub trait FlexApi: Send + Sync {
    async fn get_flex(&self, project_id: &str, name: &str) -> Result<FlexInstance>;
    async fn create_flex(&self, project_id: &str, instance: &FlexInstance) -> Result<FlexInstance>;
    async fn update_flex(
        &self,
        project_id: &str,
        name: &str,
        instance: &FlexInstance,
    ) -> Result<FlexInstance>;
    async fn delete_flex(&self, project_id: &str, name: &str) -> Result<()>;
}

#[async_trait]
pub trait BackupApi: Send + Sync {
    async fn get_backup_schedule(&self, project_id: &str, cluster: &str)
        -> Result<BackupSchedule>;
    async fn update_backup_schedule(
        &self,
        project_id: &str,
        cluster: &str,
        schedule: &BackupSchedule,
    ) -> Result<BackupSchedule>;
}

#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn get_search_deployment(
        &self,
        project_id: &str,
        cluster: &str,
    ) -> Result<SearchDeployment>;
    async fn create_search_deployment(
        &self,
        project_id: &str,
        cluster: &str,
        specs: &[SearchNodeSpec],
    ) -> Result<SearchDeployment>;
    async fn update_search_deployment(
        &self,
        project_id: &str,
        cluster: &str,
        specs: &[SearchNodeSpec],
    ) -> Result<SearchDeployment>;
    async fn delete_search_deployment(&self, project_id: &str, cluster: &str) -> Result<()>;

    async fn list_search_indexes(
        &self,
        project_id: &str,
        cluster: &str,
    ) -> Result<Vec<SearchIndexDefinition>>;
    async fn create_search_index(
        &self,
        project_id: &str,
        cluster: &str,
        index: &SearchIndexDefinition,
    ) -> Result<SearchIndexDefinition>;
    async fn update_search_index(
        &self,
        project_id: &str,
        cluster: &str,
        index_id: &str,
        index: &SearchIndexDefinition,
    ) -> Result<SearchIndexDefinition>;
    async fn delete_search_index(&self, project_id: &str, cluster: &str, index_id: &str)
        -> Result<()>;
}

#[async_trait]
pub trait GlobalClusterApi: Send + Sync {
    async fn get_geo_sharding(&self, project_id: &str, cluster: &str) -> Result<GeoSharding>;
    async fn create_custom_zone_mappings(
        &self,
        project_id: &str,
        cluster: &str,
        mappings: &[CustomZoneMapping],
    ) -> Result<GeoSharding>;
    /// Removes every custom zone mapping; there is no per-location delete.
    async fn delete_custom_zone_mappings(&self, project_id: &str, cluster: &str)
        -> Result<GeoSharding>;
    async fn create_managed_namespace(
        &self,
        project_id: &str,
        cluster: &str,
        namespace: &ManagedNamespace,
    ) -> Result<GeoSharding>;
    async fn delete_managed_namespace(
        &self,
        project_id: &str,
        cluster: &str,
        db: &str,
        collection: &str,
    ) -> Result<GeoSharding>;
}

/// Everything the controllers need from the provider.
pub trait Provider:
    ClusterApi + ServerlessApi + FlexApi + BackupApi + SearchApi + GlobalClusterApi
{
}

impl<T> Provider for T where
    T: ClusterApi + ServerlessApi + FlexApi + BackupApi + SearchApi + GlobalClusterApi
{
}
