//! Object stores that reject every request, for exercising failure paths.

use std::fmt;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use object_store::path::Path;
use object_store::{
    CopyOptions, GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore,
    PutMultipartOptions, PutOptions, PutPayload, PutResult, Result,
};

/// How a [`FailingStore`] rejects requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFailure {
    /// Credentials are valid but lack access to the bucket.
    PermissionDenied,
    /// No usable credentials.
    Unauthenticated,
    /// Anything else the backend reports, such as a missing bucket.
    Generic,
}

impl StoreFailure {
    pub const ALL: [Self; 3] = [Self::PermissionDenied, Self::Unauthenticated, Self::Generic];

    /// The error a store answers with for a request on `path`.
    #[must_use]
    pub fn error(self, path: &str) -> object_store::Error {
        let path = path.to_string();
        match self {
            Self::PermissionDenied => object_store::Error::PermissionDenied {
                path,
                source: "AccessDenied".into(),
            },
            Self::Unauthenticated => object_store::Error::Unauthenticated {
                path,
                source: "missing credentials".into(),
            },
            Self::Generic => object_store::Error::Generic {
                store: "S3",
                source: format!("NoSuchBucket while accessing {path}").into(),
            },
        }
    }
}

/// Object store on which every operation fails with the same [`StoreFailure`].
#[derive(Debug, Clone, Copy)]
pub struct FailingStore {
    failure: StoreFailure,
}

impl FailingStore {
    #[must_use]
    pub const fn new(failure: StoreFailure) -> Self {
        Self { failure }
    }
}

impl fmt::Display for FailingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FailingStore({:?})", self.failure)
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn put_opts(
        &self,
        location: &Path,
        _payload: PutPayload,
        _opts: PutOptions,
    ) -> Result<PutResult> {
        Err(self.failure.error(location.as_ref()))
    }

    async fn put_multipart_opts(
        &self,
        location: &Path,
        _opts: PutMultipartOptions,
    ) -> Result<Box<dyn MultipartUpload>> {
        Err(self.failure.error(location.as_ref()))
    }

    async fn get_opts(&self, location: &Path, _options: GetOptions) -> Result<GetResult> {
        Err(self.failure.error(location.as_ref()))
    }

    fn delete_stream(
        &self,
        locations: BoxStream<'static, Result<Path>>,
    ) -> BoxStream<'static, Result<Path>> {
        let failure = self.failure;
        locations
            .map(move |location| -> Result<Path> { Err(failure.error(location?.as_ref())) })
            .boxed()
    }

    fn list(&self, prefix: Option<&Path>) -> BoxStream<'static, Result<ObjectMeta>> {
        let error = self
            .failure
            .error(&prefix.map(ToString::to_string).unwrap_or_default());
        stream::once(async move { Err(error) }).boxed()
    }

    async fn list_with_delimiter(&self, prefix: Option<&Path>) -> Result<ListResult> {
        Err(self
            .failure
            .error(&prefix.map(ToString::to_string).unwrap_or_default()))
    }

    async fn copy_opts(&self, from: &Path, _to: &Path, _options: CopyOptions) -> Result<()> {
        Err(self.failure.error(from.as_ref()))
    }
}
