use {
    crate::{
        media::{self, Variants},
        metadata::{CreateOutcome, MetadataStore},
        objects::ObjectStore,
        paths, records, IngestOptions,
    },
    anyhow::{Context, Result},
    bytes::Bytes,
    futures::future::{self, BoxFuture, FutureExt},
    photog_shared::Error,
    sha2::{Digest, Sha256},
    std::{
        fmt,
        iter::Sum,
        ops::Add,
        path::{Path, PathBuf},
        time::Instant,
    },
    tokio::{fs, sync::Semaphore, task},
    tracing::{error, info},
};

/// What became of one file (or path which could not be walked)
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Outcome {
    /// Not an image
    Skipped,

    /// Already stored under its digest
    Existing,

    /// Would have been uploaded, but this is a dry run
    Planned,

    Uploaded,

    Failed,
}

/// Per-outcome file counts for a batch
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct Summary {
    pub skipped: usize,
    pub existing: usize,
    pub planned: usize,
    pub uploaded: usize,
    pub failed: usize,
}

impl From<Outcome> for Summary {
    fn from(outcome: Outcome) -> Self {
        let mut summary = Summary::default();

        match outcome {
            Outcome::Skipped => summary.skipped += 1,
            Outcome::Existing => summary.existing += 1,
            Outcome::Planned => summary.planned += 1,
            Outcome::Uploaded => summary.uploaded += 1,
            Outcome::Failed => summary.failed += 1,
        }

        summary
    }
}

impl Add for Summary {
    type Output = Summary;

    fn add(self, other: Summary) -> Summary {
        Summary {
            skipped: self.skipped + other.skipped,
            existing: self.existing + other.existing,
            planned: self.planned + other.planned,
            uploaded: self.uploaded + other.uploaded,
            failed: self.failed + other.failed,
        }
    }
}

impl Sum for Summary {
    fn sum<I: Iterator<Item = Summary>>(iter: I) -> Summary {
        iter.fold(Summary::default(), Add::add)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uploaded {}; already stored {}; dry run {}; skipped {}; failed {}",
            self.uploaded, self.existing, self.planned, self.skipped, self.failed
        )
    }
}

/// Lowercase hex SHA-256 of `data`
pub fn hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Key under which the canonical encoding of the image with the specified digest is stored
pub fn object_key(digest: &str) -> String {
    format!("images/{}.jpg", digest)
}

/// Whether a record with the specified digest has already been stored
pub async fn exists(metadata: &dyn MetadataStore, digest: &str) -> Result<bool> {
    metadata.contains_digest(digest).await
}

/// Upload the canonical encoding of an image to the object store under its digest-derived key.
pub async fn publish(objects: &dyn ObjectStore, digest: &str, full: Vec<u8>) -> Result<()> {
    let key = object_key(digest);

    objects
        .put_object(&key, Bytes::from(full), &mime::IMAGE_JPEG)
        .await
        .context(Error::Remote("object upload"))?;

    info!("uploaded full image to {}", key);

    Ok(())
}

struct Ingester<'a> {
    metadata: &'a dyn MetadataStore,
    objects: &'a dyn ObjectStore,
    options: &'a IngestOptions,
    permits: Semaphore,
}

impl Ingester<'_> {
    /// Apply the failure policy to the result of processing `path`: log any error, then either propagate it (if
    /// exiting on error) or count it as a failure.
    fn settle(&self, path: &Path, result: Result<Summary>) -> Result<Summary> {
        result.or_else(|e| {
            error!("error ingesting {}: {:?}", path.display(), e);

            if self.options.exit_on_error {
                Err(e)
            } else {
                Ok(Outcome::Failed.into())
            }
        })
    }

    async fn root(&self, path: &str) -> Result<Summary> {
        match paths::resolve(path).await {
            Ok(resolved) => self.walk(resolved).await,
            Err(e) => self.settle(Path::new(path), Err(e)),
        }
    }

    async fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let _permit = self.permits.acquire().await?;

        let mut entries = Vec::new();
        let mut dir = fs::read_dir(dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            entries.push(entry.path());
        }

        Ok(entries)
    }

    fn walk<'b>(&'b self, path: PathBuf) -> BoxFuture<'b, Result<Summary>> {
        async move {
            let stat = match fs::metadata(&path)
                .await
                .with_context(|| Error::Path(path.display().to_string()))
            {
                Ok(stat) => stat,
                Err(e) => return self.settle(&path, Err(e)),
            };

            if stat.is_dir() {
                info!("entered directory {}", path.display());

                let entries = match self.list(&path).await {
                    Ok(entries) => entries,
                    Err(e) => return self.settle(&path, Err(e)),
                };

                Ok(future::try_join_all(entries.into_iter().map(|entry| self.walk(entry)))
                    .await?
                    .into_iter()
                    .sum())
            } else if stat.is_file() {
                let result = self.process(&path).await.map(Summary::from);

                self.settle(&path, result)
            } else {
                Ok(Summary::default())
            }
        }
        .boxed()
    }

    async fn process(&self, path: &Path) -> Result<Outcome> {
        if let Err(e) = media::classify(path) {
            if !self.options.quietly_ignore {
                info!("skipping {}", e);
            }

            return Ok(Outcome::Skipped);
        }

        let _permit = self.permits.acquire().await?;

        info!("processing image {}", path.display());

        let original = fs::read(path)
            .await
            .with_context(|| Error::Path(path.display().to_string()))?;

        let (digest, Variants { full, thumbnail }) = task::spawn_blocking(move || {
            let variants = media::transcode(&original)?;

            Ok::<_, anyhow::Error>((hash(&variants.full), variants))
        })
        .await??;

        let already_exists = exists(self.metadata, &digest)
            .await
            .context(Error::Remote("record lookup"))?;

        if already_exists && !self.options.force_upload {
            info!("{} is already stored as {}", path.display(), digest);

            return Ok(Outcome::Existing);
        }

        if self.options.dry_run {
            info!(
                "would have saved {} as {}{}, but this is a dry run",
                path.display(),
                digest,
                if already_exists { " (overwriting)" } else { "" }
            );

            return Ok(Outcome::Planned);
        }

        if already_exists {
            info!("{} is already stored as {}, overwriting...", path.display(), digest);

            self.metadata
                .delete_by_digest(&digest)
                .await
                .context(Error::Remote("record deletion"))?;
        }

        publish(self.objects, &digest, full).await?;

        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        match records::create(self.metadata, &digest, &name, thumbnail)
            .await
            .context(Error::Remote("record creation"))?
        {
            CreateOutcome::Created(id) => {
                info!("saved {} as image id {}", path.display(), id);

                Ok(Outcome::Uploaded)
            }

            CreateOutcome::AlreadyExists => {
                info!(
                    "{} was stored as {} concurrently; keeping the existing record",
                    path.display(),
                    digest
                );

                Ok(Outcome::Existing)
            }
        }
    }
}

/// Ingest each file and (recursively) each directory in `paths`, uploading every image whose content is not
/// already stored.
///
/// Per-file failures are logged and counted in the returned `Summary` unless `options.exit_on_error` is set, in
/// which case the first failure aborts the batch and is returned.
pub async fn ingest(
    metadata: &dyn MetadataStore,
    objects: &dyn ObjectStore,
    options: &IngestOptions,
    paths: &[String],
) -> Result<Summary> {
    let then = Instant::now();

    let ingester = Ingester {
        metadata,
        objects,
        options,
        permits: Semaphore::new(options.concurrency()),
    };

    let summary = future::try_join_all(paths.iter().map(|path| ingester.root(path)))
        .await?
        .into_iter()
        .sum::<Summary>();

    info!("ingest took {:?} ({})", then.elapsed(), summary);

    Ok(summary)
}
