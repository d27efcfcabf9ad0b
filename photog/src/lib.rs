#![deny(warnings)]

use {
    anyhow::Result,
    metadata::{MetadataStore, SqliteStore},
    photog_shared::{Error, RecordId, UpdateRequest},
    std::{num::NonZeroUsize, thread},
    structopt::StructOpt,
};

pub use {
    ingest::{ingest, Outcome, Summary},
    metadata::CreateOutcome,
    objects::{DirectoryStore, HttpStore, ObjectStore},
};

pub mod ingest;
pub mod media;
pub mod metadata;
pub mod objects;
pub mod paths;
pub mod records;

#[derive(StructOpt, Debug)]
#[structopt(name = "photog", about = "Photo library ingestion and metadata tool")]
pub struct Options {
    /// SQLite database holding image records, created if necessary
    #[structopt(long, env = "PHOTOG_STATE_FILE")]
    pub state_file: String,

    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(StructOpt, Debug)]
pub enum Command {
    /// Upload photos, skipping any whose content has already been uploaded
    #[structopt(alias = "upload")]
    Ingest {
        /// Where to store full-size images: a directory, or an http:// or https:// URL (e.g. a blob container
        /// URL with a SAS query string)
        #[structopt(long, env = "PHOTOG_OBJECT_STORE")]
        object_store: String,

        #[structopt(flatten)]
        options: IngestOptions,

        /// Files or directories in which photos are stored
        #[structopt(required = true)]
        paths: Vec<String>,
    },

    /// Update image information
    Update {
        /// ID of the image to update
        id: RecordId,

        /// Replace the title of the image
        #[structopt(short = "T", long)]
        title: Option<String>,

        /// Append tags to the image's tags unless --replace is specified
        #[structopt(short, long)]
        tags: Option<Vec<String>>,

        /// Replace the image's tags rather than appending to them
        #[structopt(short, long, requires = "tags")]
        replace: bool,
    },

    /// Print image information as JSON
    Show {
        /// ID of the image to show
        id: RecordId,
    },
}

/// Settings which govern a batch ingest, fixed for its duration
#[derive(StructOpt, Debug, Clone, Default)]
pub struct IngestOptions {
    /// Do all preprocessing but don't actually send the photos to the stores
    #[structopt(short, long)]
    pub dry_run: bool,

    /// Delete and re-upload images which have already been uploaded
    #[structopt(long)]
    pub force_upload: bool,

    /// Exit on the first error rather than trying to continue
    #[structopt(short = "e", long = "eoe")]
    pub exit_on_error: bool,

    /// Don't log files which are skipped because they aren't images (by default each one is logged)
    #[structopt(short, long)]
    pub quietly_ignore: bool,

    /// Maximum number of files to process concurrently (defaults to the number of CPUs)
    #[structopt(short, long)]
    pub jobs: Option<usize>,
}

impl IngestOptions {
    /// Number of files which may be in flight at once
    pub fn concurrency(&self) -> usize {
        self.jobs
            .or_else(|| thread::available_parallelism().ok().map(NonZeroUsize::get))
            .unwrap_or(1)
            .max(1)
    }
}

/// Execute the command described by `options`.
pub async fn run(options: Options) -> Result<()> {
    match options.command {
        Command::Ingest {
            object_store,
            options: ingest_options,
            paths,
        } => {
            let objects = objects::open(&object_store)?;
            let metadata = SqliteStore::open(&options.state_file).await?;

            ingest::ingest(&metadata, objects.as_ref(), &ingest_options, &paths).await?;
        }

        Command::Update {
            id,
            title,
            tags,
            replace,
        } => {
            let request = UpdateRequest {
                id,
                title,
                tags,
                replace_tags: replace,
            };

            // Reject empty requests before connecting to anything.
            request.actions()?;

            records::update(&SqliteStore::open(&options.state_file).await?, &request).await?;
        }

        Command::Show { id } => {
            let record = SqliteStore::open(&options.state_file)
                .await?
                .find_by_id(id)
                .await?
                .ok_or(Error::NotFound(id))?;

            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    Ok(())
}
