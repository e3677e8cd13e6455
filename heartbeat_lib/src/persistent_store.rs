use aws_config::BehaviorVersion;
use aws_sdk_s3::{config::Region, primitives::ByteStream, Client as S3Client};
use log::debug;
use stack_string::StackString;
use std::{
    fmt,
    future::Future,
    path::{Path, PathBuf},
};
use tokio::fs;
use tokio_util::sync::CancellationToken;

use crate::{
    errors::HeartbeatError as Error, heartbeat_config::HeartbeatConfig,
    heartbeat_util::run_cancellable,
};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A single opaque blob addressed by a logical key.  Every call races the
/// caller's cancellation token.
pub trait PersistentStore {
    fn key(&self) -> &str;

    /// # Errors
    /// Returns `LoadError` if the object is missing or unreadable
    fn load(
        &self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<u8>, Error>> + Send;

    /// # Errors
    /// Returns `SaveError` if the write cannot be completed
    fn save(
        &self,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStore {
    key: StackString,
    path: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(dir: &Path, key: &str) -> Self {
        Self {
            key: key.into(),
            path: dir.join(key),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistentStore for FileStore {
    fn key(&self) -> &str {
        self.key.as_str()
    }

    async fn load(&self, cancel: &CancellationToken) -> Result<Vec<u8>, Error> {
        run_cancellable(cancel, "load", async {
            fs::read(&self.path).await.map_err(Error::from)
        })
        .await
        .map_err(|e| Error::load(self.key.clone(), e))
    }

    async fn save(&self, body: &[u8], cancel: &CancellationToken) -> Result<(), Error> {
        run_cancellable(cancel, "save", async {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent).await?;
            }
            // readers never see a partially written object
            let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
            tmp_name.push(".tmp");
            let tmp = self.path.with_file_name(tmp_name);
            fs::write(&tmp, body).await?;
            fs::rename(&tmp, &self.path).await?;
            debug!("wrote {} bytes to {}", body.len(), self.path.display());
            Ok::<_, Error>(())
        })
        .await
        .map_err(|e| Error::save(self.key.clone(), e))
    }
}

#[derive(Clone)]
pub struct S3Store {
    client: S3Client,
    bucket: StackString,
    key: StackString,
    content_type: StackString,
}

impl fmt::Debug for S3Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S3Store(s3://{}/{})", self.bucket, self.key)
    }
}

impl S3Store {
    #[must_use]
    pub fn new(client: S3Client, bucket: &str, key: &str) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: key.into(),
            content_type: JSON_CONTENT_TYPE.into(),
        }
    }

    /// Build an s3 client, falling back on the default region provider chain
    /// when no region is given.
    pub async fn get_client(region: Option<&str>) -> S3Client {
        let loader = aws_config::defaults(BehaviorVersion::latest());
        let loader = match region {
            Some(region) => loader.region(Region::new(region.to_string())),
            None => loader,
        };
        S3Client::new(&loader.load().await)
    }
}

impl PersistentStore for S3Store {
    fn key(&self) -> &str {
        self.key.as_str()
    }

    async fn load(&self, cancel: &CancellationToken) -> Result<Vec<u8>, Error> {
        run_cancellable(cancel, "load", async {
            let object = self
                .client
                .get_object()
                .bucket(self.bucket.as_str())
                .key(self.key.as_str())
                .send()
                .await?;
            let body = object.body.collect().await?;
            Ok::<_, Error>(body.into_bytes().to_vec())
        })
        .await
        .map_err(|e| Error::load(self.key.clone(), e))
    }

    async fn save(&self, body: &[u8], cancel: &CancellationToken) -> Result<(), Error> {
        run_cancellable(cancel, "save", async {
            self.client
                .put_object()
                .bucket(self.bucket.as_str())
                .key(self.key.as_str())
                .content_type(self.content_type.as_str())
                .body(ByteStream::from(body.to_vec()))
                .send()
                .await?;
            debug!("uploaded s3://{}/{}", self.bucket, self.key);
            Ok::<_, Error>(())
        })
        .await
        .map_err(|e| Error::save(self.key.clone(), e))
    }
}

#[derive(Debug, Clone)]
pub enum StoreBackend {
    File(FileStore),
    S3(S3Store),
}

impl PersistentStore for StoreBackend {
    fn key(&self) -> &str {
        match self {
            Self::File(s) => s.key(),
            Self::S3(s) => s.key(),
        }
    }

    async fn load(&self, cancel: &CancellationToken) -> Result<Vec<u8>, Error> {
        match self {
            Self::File(s) => s.load(cancel).await,
            Self::S3(s) => s.load(cancel).await,
        }
    }

    async fn save(&self, body: &[u8], cancel: &CancellationToken) -> Result<(), Error> {
        match self {
            Self::File(s) => s.save(body, cancel).await,
            Self::S3(s) => s.save(body, cancel).await,
        }
    }
}

/// The three logical objects one refresh touches.
#[derive(Debug, Clone)]
pub struct HeartrateStores<S> {
    pub client_credential: S,
    pub access_token: S,
    pub latest_record: S,
}

impl HeartrateStores<StoreBackend> {
    #[must_use]
    pub fn local(config: &HeartbeatConfig) -> Self {
        let dir = config.store_dir.as_path();
        Self {
            client_credential: StoreBackend::File(FileStore::new(
                dir,
                config.client_credential_key.as_str(),
            )),
            access_token: StoreBackend::File(FileStore::new(
                dir,
                config.access_token_key.as_str(),
            )),
            latest_record: StoreBackend::File(FileStore::new(
                dir,
                config.latest_record_key.as_str(),
            )),
        }
    }

    pub async fn s3(config: &HeartbeatConfig, region: Option<&str>, bucket: &str) -> Self {
        let client = S3Store::get_client(region).await;
        let store = |key: &str| StoreBackend::S3(S3Store::new(client.clone(), bucket, key));
        Self {
            client_credential: store(config.client_credential_key.as_str()),
            access_token: store(config.access_token_key.as_str()),
            latest_record: store(config.latest_record_key.as_str()),
        }
    }

    /// S3 when `BUCKET_NAME` is configured, otherwise files under `STORE_DIR`.
    pub async fn from_config(config: &HeartbeatConfig) -> Self {
        match config.bucket_name.as_ref() {
            Some(bucket) => {
                debug!("using s3 bucket {bucket}");
                let region = config.aws_region.as_ref().map(StackString::as_str);
                Self::s3(config, region, bucket.as_str()).await
            }
            None => {
                debug!("using local store {}", config.store_dir.display());
                Self::local(config)
            }
        }
    }
}
