use crate::domain::model::{ListPage, ListRequest, ObjectEntry};
use crate::utils::error::Result;
use async_trait::async_trait;

/// The seam between the listing/download engines and a concrete object-store
/// backend. Object-safe so engines can share one client across workers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches one page of object metadata.
    async fn list_page(&self, request: &ListRequest) -> Result<ListPage>;

    /// Downloads the full contents of one object.
    async fn download(&self, object_name: &str) -> Result<Vec<u8>>;

    /// Server-side composes `sources` (in order) into `destination` and
    /// returns the resulting object's metadata.
    async fn compose(&self, destination: &str, sources: &[ObjectEntry]) -> Result<ObjectEntry>;

    /// Deletes one object.
    async fn delete(&self, object_name: &str) -> Result<()>;
}

/// Local persistence for downloaded object contents.
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
