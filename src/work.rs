use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single work record as returned by the Crossref works listing.
///
/// Only the fields the crate reads are typed; everything else the service
/// sends is kept verbatim in `extra` so records round-trip untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Work {
    /// DOI, the unique identifier of the record
    #[serde(rename = "DOI", default)]
    pub doi: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub title: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<Author>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub work_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<PartialDate>,
    #[serde(
        rename = "container-title",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub container_title: Vec<String>,
    #[serde(rename = "URL", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    /// Organisational authors only carry a name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// ORCID, sequence, affiliation and anything else sent alongside
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Crossref date object: `{"date-parts": [[year, month?, day?]]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialDate {
    #[serde(rename = "date-parts", default)]
    pub date_parts: Vec<Vec<Option<i32>>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Work {
    pub fn new(doi: impl Into<String>) -> Self {
        Self {
            doi: doi.into(),
            ..Self::default()
        }
    }

    /// Primary title, or "Untitled"
    pub fn display_title(&self) -> &str {
        self.title.first().map(String::as_str).unwrap_or("Untitled")
    }

    /// First three authors joined by commas, with "et al." when truncated
    pub fn display_authors(&self) -> String {
        if self.author.is_empty() {
            return "Unknown authors".to_string();
        }

        let names: Vec<String> = self.author.iter().take(3).map(Author::display_name).collect();

        if self.author.len() > 3 {
            format!("{}, et al.", names.join(", "))
        } else {
            names.join(", ")
        }
    }

    /// Publication date formatted for display, e.g. "Mar 5, 2021", "Mar 2021" or "2021"
    pub fn format_published(&self) -> String {
        self.published
            .as_ref()
            .map(PartialDate::format)
            .unwrap_or_else(|| "N/A".to_string())
    }

    pub fn container(&self) -> Option<&str> {
        self.container_title.first().map(String::as_str)
    }
}

impl Author {
    pub fn display_name(&self) -> String {
        match (&self.given, &self.family, &self.name) {
            (Some(given), Some(family), _) => format!("{} {}", given, family),
            (None, Some(family), _) => family.clone(),
            (_, None, Some(name)) => name.clone(),
            _ => "Unknown".to_string(),
        }
    }
}

impl PartialDate {
    pub fn from_parts(parts: &[i32]) -> Self {
        Self {
            date_parts: vec![parts.iter().copied().map(Some).collect()],
            extra: Map::new(),
        }
    }

    pub fn format(&self) -> String {
        let Some(first) = self.date_parts.first() else {
            return "N/A".to_string();
        };
        let mut parts = first.iter().map(|p| p.unwrap_or(0));
        let year = match parts.next() {
            Some(year) if year != 0 => year,
            _ => return "N/A".to_string(),
        };
        let month = parts.next().and_then(|m| u32::try_from(m).ok()).filter(|m| *m > 0);
        let day = parts.next().and_then(|d| u32::try_from(d).ok()).filter(|d| *d > 0);

        match (month, day) {
            (Some(m), Some(d)) => NaiveDate::from_ymd_opt(year, m, d)
                .map(|date| date.format("%b %-d, %Y").to_string())
                .unwrap_or_else(|| year.to_string()),
            (Some(m), None) => NaiveDate::from_ymd_opt(year, m, 1)
                .map(|date| date.format("%b %Y").to_string())
                .unwrap_or_else(|| year.to_string()),
            _ => year.to_string(),
        }
    }
}

/// One page of a works listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Work>,
    /// Total number of matches reported by the service
    pub total_results: u64,
    /// Cursor for the following page; `None` means there are no further pages
    pub next_cursor: Option<String>,
}

impl Page {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A Crossref member (publisher) record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Member {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub primary_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<MemberCounts>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MemberCounts {
    #[serde(default)]
    pub total_dois: u64,
    #[serde(default)]
    pub current_dois: u64,
    #[serde(default)]
    pub backfile_dois: u64,
}
