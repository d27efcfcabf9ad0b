//! Photog shared (e.g. data model) code
//!
//! This crate contains the types shared between the ingestion pipeline, the metadata store, and the command line
//! front end: persisted image records, metadata update requests and the typed patches derived from them, and the
//! error taxonomy used to classify failures.

#![deny(warnings)]

use {
    chrono::{DateTime, Utc},
    serde_derive::{Deserialize, Serialize},
    std::{
        borrow::Cow,
        collections::BTreeSet,
        fmt::{self, Display},
        path::PathBuf,
        str::FromStr,
    },
};

/// Classifies the ways ingesting an image or updating a record can fail
///
/// Pipeline functions return `anyhow::Result`; these values are either returned directly or attached as context,
/// so callers can recover the kind with `anyhow::Error::downcast_ref::<Error>()`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An input path does not exist or could not be read
    #[error("unable to resolve path {0}")]
    Path(String),

    /// A file's extension does not map to an image MIME type
    #[error("{} is not an image", .0.display())]
    UnsupportedMedia(PathBuf),

    /// The transcoder could not parse the bytes of a file as an image
    #[error("unable to decode image")]
    Decode,

    /// A call to the object store or metadata store failed
    #[error("{0} failed")]
    Remote(&'static str),

    /// A command was missing required fields or had a malformed argument
    #[error("{0}")]
    Validation(Cow<'static, str>),

    /// No record matches the requested identifier
    #[error("no image with id {0}")]
    NotFound(RecordId),
}

/// Opaque identifier of a persisted image record
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl FromStr for RecordId {
    type Err = Error;

    /// Parse a `RecordId` from a positive decimal integer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<i64>() {
            Ok(id) if id > 0 && !s.starts_with('+') => Ok(RecordId(id)),
            _ => Err(Error::Validation(
                format!("{} is not a valid photo id", s).into(),
            )),
        }
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reduced-size rendition of an image stored alongside its record
#[derive(Serialize, Debug, Clone, Eq, PartialEq)]
pub struct Thumbnail {
    /// Encoded thumbnail bytes (omitted when serializing)
    #[serde(skip)]
    pub data: Vec<u8>,

    /// MIME type of `data`
    pub content_type: String,
}

/// Persisted metadata for one unique image content
#[derive(Serialize, Debug, Clone)]
pub struct ImageRecord {
    pub id: RecordId,

    /// Lowercase hex SHA-256 of the canonical full-size encoding; unique across all records and never modified
    pub digest: String,

    /// Basename of the file this record was first ingested from, without its extension
    pub name: String,

    pub title: String,

    pub tags: BTreeSet<String>,

    /// When the record was created
    pub uploaded: DateTime<Utc>,

    pub thumbnail: Thumbnail,
}

/// A record which has not been persisted yet, and so has no `RecordId` (or tags)
#[derive(Debug, Clone)]
pub struct NewImageRecord {
    pub digest: String,
    pub name: String,
    pub title: String,
    pub uploaded: DateTime<Utc>,
    pub thumbnail: Thumbnail,
}

/// One step of a metadata patch
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Action {
    /// Replace the title
    SetTitle(String),

    /// Add each tag not already present, leaving existing tags in place
    AddTags(BTreeSet<String>),

    /// Replace the tag set wholesale
    ReplaceTags(BTreeSet<String>),
}

/// Request to edit the metadata of an existing record
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub id: RecordId,

    /// Replacement title, if any
    pub title: Option<String>,

    /// Tags to add (or to replace the existing set with, if `replace_tags` is true)
    pub tags: Option<Vec<String>>,

    pub replace_tags: bool,
}

impl UpdateRequest {
    /// Validate this request and convert it to the sequence of `Action`s it describes.
    ///
    /// An empty title is treated as no title.  If neither a title nor tags were specified, this returns
    /// `Error::Validation`.
    pub fn actions(&self) -> Result<Vec<Action>, Error> {
        let title = self.title.as_deref().filter(|title| !title.is_empty());

        if title.is_none() && self.tags.is_none() {
            return Err(Error::Validation(
                "You need to specify at least one field to update.".into(),
            ));
        }

        let mut actions = Vec::new();

        if let Some(title) = title {
            actions.push(Action::SetTitle(title.to_owned()));
        }

        if let Some(tags) = &self.tags {
            let tags = tags.iter().cloned().collect::<BTreeSet<_>>();

            actions.push(if self.replace_tags {
                Action::ReplaceTags(tags)
            } else {
                Action::AddTags(tags)
            });
        }

        Ok(actions)
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        anyhow::Result,
        maplit::btreeset,
    };

    fn request(title: Option<&str>, tags: Option<&[&str]>, replace_tags: bool) -> UpdateRequest {
        UpdateRequest {
            id: RecordId(7),
            title: title.map(String::from),
            tags: tags.map(|tags| tags.iter().map(|&tag| tag.to_owned()).collect()),
            replace_tags,
        }
    }

    #[test]
    fn record_ids() -> Result<()> {
        assert_eq!("42".parse::<RecordId>()?, RecordId(42));

        for bad in ["", "0", "-3", "+3", "5f1d7c2e9b1e8a0012345678", "1.5"] {
            assert!(matches!(
                bad.parse::<RecordId>(),
                Err(Error::Validation(_))
            ));
        }

        Ok(())
    }

    #[test]
    fn empty_requests_are_rejected() {
        assert!(matches!(
            request(None, None, false).actions(),
            Err(Error::Validation(_))
        ));

        assert!(matches!(
            request(Some(""), None, false).actions(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn actions() -> Result<()> {
        assert_eq!(
            request(Some("Sunset"), None, false).actions()?,
            vec![Action::SetTitle("Sunset".into())]
        );

        assert_eq!(
            request(None, Some(&["b", "c", "b"]), false).actions()?,
            vec![Action::AddTags(btreeset!["b".into(), "c".into()])]
        );

        assert_eq!(
            request(Some("Sunset"), Some(&["c"]), true).actions()?,
            vec![
                Action::SetTitle("Sunset".into()),
                Action::ReplaceTags(btreeset!["c".into()])
            ]
        );

        // An empty tag list is still a request to update tags; with `replace_tags` it clears them.
        assert_eq!(
            request(None, Some(&[]), true).actions()?,
            vec![Action::ReplaceTags(BTreeSet::new())]
        );

        Ok(())
    }
}
