//! Cursor page envelope.

use crate::params::Params;
use serde::{Deserialize, Serialize};

/// Sort direction reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    /// Oldest/smallest first.
    Ascending,
    /// Newest/largest first.
    #[default]
    Descending,
}

/// One page of a cursor-paginated collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorResponse<T> {
    /// Entities in server order.
    pub data: Vec<T>,
    /// Opaque cursor for the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Tie-break id for the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_id_after: Option<String>,
    /// Whether another page exists.
    pub has_next: bool,
    /// Total matches for the query.
    #[serde(default)]
    pub total_count: u64,
    /// Field the server sorted by.
    #[serde(default)]
    pub sort_by: String,
    /// Direction the server sorted in.
    #[serde(default)]
    pub sort_direction: SortDirection,
}

impl<T> CursorResponse<T> {
    /// Creates a final page (no successor).
    pub fn last(data: Vec<T>) -> Self {
        let total_count = data.len() as u64;
        Self {
            data,
            next_cursor: None,
            next_id_after: None,
            has_next: false,
            total_count,
            sort_by: String::new(),
            sort_direction: SortDirection::default(),
        }
    }

    /// Creates a page that continues at `cursor` / `id_after`.
    pub fn with_next(
        data: Vec<T>,
        cursor: impl Into<String>,
        id_after: impl Into<String>,
        total_count: u64,
    ) -> Self {
        Self {
            data,
            next_cursor: Some(cursor.into()),
            next_id_after: Some(id_after.into()),
            has_next: true,
            total_count,
            sort_by: String::new(),
            sort_direction: SortDirection::default(),
        }
    }

    /// Sets the total count.
    pub fn with_total(mut self, total_count: u64) -> Self {
        self.total_count = total_count;
        self
    }

    /// Extracts the cursor state carried by this page.
    pub fn cursor_state(&self) -> CursorState {
        CursorState {
            cursor: self.next_cursor.clone(),
            id_after: self.next_id_after.clone(),
            has_next: self.has_next,
            total_count: self.total_count,
        }
    }
}

/// Where the next `fetch_more` resumes.
///
/// Taken verbatim from the last page response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CursorState {
    /// Opaque cursor.
    pub cursor: Option<String>,
    /// Tie-break id.
    pub id_after: Option<String>,
    /// Whether another page exists.
    pub has_next: bool,
    /// Total matches reported by the server.
    pub total_count: u64,
}

/// A page request: caller params plus the pagination position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageQuery {
    /// Caller params (filters, sort, limit).
    pub params: Params,
    /// Cursor to resume from; `None` for page 1.
    pub cursor: Option<String>,
    /// Tie-break id to resume from.
    pub id_after: Option<String>,
}

impl PageQuery {
    /// Creates a page-1 query.
    pub fn first(params: Params) -> Self {
        Self {
            params,
            cursor: None,
            id_after: None,
        }
    }

    /// Creates a query continuing from `state`.
    pub fn after(params: Params, state: &CursorState) -> Self {
        Self {
            params,
            cursor: state.cursor.clone(),
            id_after: state.id_after.clone(),
        }
    }

    /// Returns true if this requests the first page.
    pub fn is_first_page(&self) -> bool {
        self.cursor.is_none() && self.id_after.is_none()
    }

    /// Flattens params and position into query-string pairs.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = self.params.to_query_pairs();
        if let Some(cursor) = &self.cursor {
            pairs.push(("cursor".into(), cursor.clone()));
        }
        if let Some(id_after) = &self.id_after {
            pairs.push(("idAfter".into(), id_after.clone()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_server_envelope() {
        let raw = r#"{
            "data": [1, 2],
            "nextCursor": "2025-01-01T00:00:00Z",
            "nextIdAfter": "u2",
            "hasNext": true,
            "totalCount": 7,
            "sortBy": "createdAt",
            "sortDirection": "DESCENDING"
        }"#;
        let page: CursorResponse<u32> = serde_json::from_str(raw).unwrap();
        assert_eq!(page.data, vec![1, 2]);
        assert!(page.has_next);

        let state = page.cursor_state();
        assert_eq!(state.cursor.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(state.id_after.as_deref(), Some("u2"));
        assert_eq!(state.total_count, 7);
    }

    #[test]
    fn last_page_without_cursor() {
        let raw = r#"{"data": [], "hasNext": false}"#;
        let page: CursorResponse<u32> = serde_json::from_str(raw).unwrap();
        assert_eq!(page.cursor_state(), CursorState::default());
        assert_eq!(page.sort_direction, SortDirection::Descending);
    }

    #[test]
    fn query_carries_cursor() {
        let state = CursorState {
            cursor: Some("c".into()),
            id_after: Some("i".into()),
            has_next: true,
            total_count: 3,
        };
        let query = PageQuery::after(Params::new().with("limit", 2), &state);
        assert!(!query.is_first_page());

        let pairs = query.to_query_pairs();
        assert!(pairs.contains(&("cursor".into(), "c".into())));
        assert!(pairs.contains(&("idAfter".into(), "i".into())));
        assert!(pairs.contains(&("limit".into(), "2".into())));
    }
}
