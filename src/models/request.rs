use crate::config::MAX_RESULT_CAP;
use crate::models::{ThreadHandle, ThreadRecord};
use crate::query::{parse_query, ParseResult, QueryNode};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Who issued a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: u64,
    pub guild_id: u64,
}

impl Requester {
    pub fn new(user_id: u64, guild_id: u64) -> Self {
        Self { user_id, guild_id }
    }
}

/// Field results are ordered by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortKey {
    #[default]
    ReactionCount,
    ReplyCount,
    CreatedAt,
    LastActiveAt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// Filters that the forum platform can evaluate while listing threads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSideFilters {
    /// Any of these tags (lowercase); empty means no constraint
    pub tags: Vec<String>,
    /// Any of these authors; empty means no constraint
    pub authors: Vec<u64>,
}

/// Non-textual conditions a thread has to satisfy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralFilters {
    /// At least one of these tags must be present
    #[serde(default)]
    pub include_tags: Vec<String>,
    /// None of these tags may be present
    #[serde(default)]
    pub exclude_tags: Vec<String>,
    #[serde(default)]
    pub include_authors: Vec<u64>,
    #[serde(default)]
    pub exclude_authors: Vec<u64>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub min_reactions: Option<u64>,
    pub min_replies: Option<u64>,
    /// A thread mentioning any of these words is dropped
    #[serde(default)]
    pub exclude_words: Vec<String>,
}

impl StructuralFilters {
    /// Check internal consistency
    pub fn validate(&self) -> Result<(), String> {
        if let (Some(after), Some(before)) = (self.created_after, self.created_before) {
            if after > before {
                return Err(format!(
                    "created_after ({}) is later than created_before ({})",
                    after, before
                ));
            }
        }

        if let Some(author) = self
            .include_authors
            .iter()
            .find(|a| self.exclude_authors.contains(*a))
        {
            return Err(format!("author {} is both included and excluded", author));
        }

        Ok(())
    }

    /// Lowercase tags and words and drop blanks
    pub fn normalized(mut self) -> Self {
        fn clean(items: Vec<String>) -> Vec<String> {
            let mut out: Vec<String> = Vec::with_capacity(items.len());
            for item in items {
                let item = item.trim().to_lowercase();
                if !item.is_empty() && !out.contains(&item) {
                    out.push(item);
                }
            }
            out
        }

        self.include_tags = clean(self.include_tags);
        self.exclude_tags = clean(self.exclude_tags);
        self.exclude_words = clean(self.exclude_words);
        self
    }

    /// The part of the filters that can be pushed down to the listing call
    pub fn server_side(&self) -> ServerSideFilters {
        ServerSideFilters {
            tags: self.include_tags.clone(),
            authors: self.include_authors.clone(),
        }
    }

    fn admits_tags(&self, tags: &[String]) -> bool {
        let lowered: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();

        if !self.include_tags.is_empty() && !self.include_tags.iter().any(|t| lowered.contains(t)) {
            return false;
        }

        !self.exclude_tags.iter().any(|t| lowered.contains(t))
    }

    fn admits_author(&self, author_id: u64) -> bool {
        if !self.include_authors.is_empty() && !self.include_authors.contains(&author_id) {
            return false;
        }
        !self.exclude_authors.contains(&author_id)
    }

    fn admits_created_at(&self, created_at: DateTime<Utc>) -> bool {
        if matches!(self.created_after, Some(after) if created_at < after) {
            return false;
        }
        !matches!(self.created_before, Some(before) if created_at > before)
    }

    /// Cheap checks on listing data, run before any record lookup
    pub fn admits_handle(&self, handle: &ThreadHandle) -> bool {
        self.admits_created_at(handle.created_at)
            && self.admits_author(handle.author_id)
            && self.admits_tags(&handle.tags)
    }

    /// Authoritative checks on the resolved record
    pub fn admits_record(&self, record: &ThreadRecord) -> bool {
        if matches!(self.min_reactions, Some(min) if record.reaction_count < min) {
            return false;
        }
        if matches!(self.min_replies, Some(min) if record.reply_count < min) {
            return false;
        }
        self.admits_created_at(record.created_at)
            && self.admits_author(record.author_id)
            && self.admits_tags(&record.tags)
    }

    /// Whether any excluded word occurs in already-lowercased text
    pub fn excludes_text(&self, folded: &str) -> bool {
        self.exclude_words.iter().any(|w| folded.contains(w.as_str()))
    }
}

/// A fully specified search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub forum_id: u64,
    /// Raw query as typed, kept for history
    pub query_text: String,
    /// Parsed query; `None` matches every thread passing the structural filters
    pub ast: Option<QueryNode>,
    pub filters: StructuralFilters,
    pub sort: SortKey,
    pub direction: SortDirection,
    pub result_cap: usize,
    pub requester: Requester,
    /// Also evaluate the query against the first post of each thread
    pub include_first_post: bool,
}

impl SearchRequest {
    /// Build a request from raw query text.
    ///
    /// Blank text yields a filter-only search; anything else must parse.
    pub fn new(forum_id: u64, requester: Requester, query_text: &str) -> ParseResult<Self> {
        let ast = if query_text.trim().is_empty() {
            None
        } else {
            Some(parse_query(query_text)?)
        };

        Ok(Self {
            forum_id,
            query_text: query_text.trim().to_string(),
            ast,
            filters: StructuralFilters::default(),
            sort: SortKey::default(),
            direction: SortDirection::default(),
            result_cap: MAX_RESULT_CAP,
            requester,
            include_first_post: true,
        })
    }

    pub fn with_filters(mut self, filters: StructuralFilters) -> Self {
        self.filters = filters.normalized();
        self
    }

    pub fn with_sort(mut self, sort: SortKey, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }

    pub fn with_result_cap(mut self, cap: usize) -> Self {
        self.result_cap = cap;
        self
    }

    pub fn with_first_post(mut self, include: bool) -> Self {
        self.include_first_post = include;
        self
    }
}

static RELATIVE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)([dwmy])$").expect("valid relative date pattern"));

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parse a user supplied date filter.
///
/// Accepts `2024-01-15`, `2024/01/15`, `01/15/2024`, `15.01.2024` (midnight
/// UTC) and relative offsets such as `7d`, `2w`, `3m` (30 days) or `1y`
/// (365 days) counted back from `now`.
pub fn parse_date_bound(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    let lowered = text.to_lowercase();
    let caps = RELATIVE_DATE.captures(&lowered)?;
    let amount: i64 = caps[1].parse().ok()?;
    let days = match &caps[2] {
        "d" => amount,
        "w" => amount.checked_mul(7)?,
        "m" => amount.checked_mul(30)?,
        "y" => amount.checked_mul(365)?,
        _ => return None,
    };

    now.checked_sub_signed(Duration::try_days(days)?)
}
