pub use async_trait::async_trait;

pub mod crossref;

use crate::query::WorksQuery;
use crate::work::{Member, Page};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Generic message used when a failed works request carries no usable body
pub const WORKS_ERROR_MESSAGE: &str = "Error loading works";
/// Generic message used when a failed member lookup carries no usable body
pub const MEMBER_ERROR_MESSAGE: &str = "Error loading member information";

/// Failure to obtain a usable response from the remote service.
///
/// `Display` is the plain human-readable message, suitable for showing to a user as-is.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Network(#[from] reqwest::Error),
    #[error("{0}")]
    Decode(String),
    #[error("{0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        TransportError::Status {
            status,
            message: message.into(),
        }
    }

    /// HTTP status code, if the failure came from a non-2xx response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Kind of collection a works listing is scoped to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    #[default]
    Members,
    Journals,
    Funders,
    Prefixes,
    Types,
}

impl CollectionKind {
    pub fn path_segment(&self) -> &'static str {
        match self {
            CollectionKind::Members => "members",
            CollectionKind::Journals => "journals",
            CollectionKind::Funders => "funders",
            CollectionKind::Prefixes => "prefixes",
            CollectionKind::Types => "types",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "member" | "members" => Ok(CollectionKind::Members),
            "journal" | "journals" => Ok(CollectionKind::Journals),
            "funder" | "funders" => Ok(CollectionKind::Funders),
            "prefix" | "prefixes" => Ok(CollectionKind::Prefixes),
            "type" | "types" => Ok(CollectionKind::Types),
            _ => Err(format!(
                "unknown collection kind '{}', expected members, journals, funders, prefixes or types",
                s
            )),
        }
    }
}

/// A collection whose works can be listed, e.g. `members/98`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Collection {
    pub kind: CollectionKind,
    pub id: String,
}

impl Collection {
    pub fn new(kind: CollectionKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn member(id: impl Into<String>) -> Self {
        Self::new(CollectionKind::Members, id)
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.id.trim().is_empty() {
            return Err(TransportError::InvalidRequest(format!(
                "{} identifier must not be empty",
                self.kind
            )));
        }
        Ok(())
    }

    /// Relative path of the works listing: `{kind}/{id}/works`
    pub fn works_path(&self) -> String {
        format!("{}/works", self.entity_path())
    }

    /// Relative path of the collection entity itself: `{kind}/{id}`
    pub fn entity_path(&self) -> String {
        format!(
            "{}/{}",
            self.kind.path_segment(),
            urlencoding::encode(self.id.trim())
        )
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Retrieves pages of a works listing from the remote service
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one page of works for `collection` shaped by `query`
    async fn fetch_page(
        &self,
        collection: &Collection,
        query: &WorksQuery,
    ) -> Result<Page, TransportError>;

    /// Look up a single member record
    async fn fetch_member(&self, _member_id: &str) -> Result<Member, TransportError> {
        // Default implementation for fetchers that only serve listings
        Err(TransportError::InvalidRequest(
            "member lookup is not supported by this fetcher".to_string(),
        ))
    }

    fn name(&self) -> &'static str;
}
