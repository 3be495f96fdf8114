use std::fmt;

/// Largest page size the Crossref API accepts
pub const MAX_ROWS: u32 = 100;

/// Page size used when a query does not set one
pub const DEFAULT_ROWS: u32 = 20;

/// Cursor value that requests the first page of a deep-paging session
pub const INITIAL_CURSOR: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("invalid sort order '{}', expected asc or desc", other)),
        }
    }
}

/// Request shape for a works listing.
///
/// Built with the `with_*` methods; every method returns a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorksQuery {
    pub rows: u32,
    pub offset: Option<u64>,
    pub cursor: Option<String>,
    pub filter: Option<String>,
    pub query: Option<String>,
    pub sort: Option<String>,
    pub order: Option<SortOrder>,
    pub select: Option<String>,
}

impl Default for WorksQuery {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            offset: None,
            cursor: None,
            filter: None,
            query: None,
            sort: None,
            order: None,
            select: None,
        }
    }
}

impl WorksQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, rows: u32) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_sort(mut self, sort: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(sort.into());
        self.order = Some(order);
        self
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    /// Page size actually sent, bounded by [`MAX_ROWS`]
    pub fn effective_rows(&self) -> u32 {
        self.rows.min(MAX_ROWS)
    }

    /// Cursor actually sent, `*` when unset
    pub fn effective_cursor(&self) -> &str {
        self.cursor.as_deref().unwrap_or(INITIAL_CURSOR)
    }

    /// Query parameters in a fixed order.
    ///
    /// Unset or empty optional fields are left out entirely. `cursor` is
    /// dropped when `offset` is set since the service rejects both together.
    pub fn to_params(&self, mailto: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("mailto", mailto.to_string()),
            ("rows", self.effective_rows().to_string()),
        ];

        match self.offset {
            Some(offset) => params.push(("offset", offset.to_string())),
            None => params.push(("cursor", self.effective_cursor().to_string())),
        }

        let optional = [
            ("filter", self.filter.as_deref()),
            ("query", self.query.as_deref()),
            ("sort", self.sort.as_deref()),
            ("order", self.order.as_ref().map(SortOrder::as_str)),
            ("select", self.select.as_deref()),
        ];
        for (key, value) in optional {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                params.push((key, value.to_string()));
            }
        }

        params
    }
}
