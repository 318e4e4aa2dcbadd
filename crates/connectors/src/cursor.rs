//! Adapter-owned pagination state.
//!
//! The wire form is a small JSON object whose keys identify the shape:
//! `{"offset": 200}`, `{"page": 3}`, `{"marker": ...}`, `{"before": "sig"}`,
//! `{"fingerprint": "f1"}`, `{"action": "tokentx", "page": 3}` or
//! `{"action": "trc20", "fingerprint": "f2"}`. The orchestrator only stores and
//! replays the string; each adapter family reads the shape it issued.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExplorerCursor {
    pub action: String,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageCursor {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OffsetCursor {
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageCursor {
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkerCursor {
    /// Provider marker, kept verbatim (XRPL markers are objects).
    pub marker: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BeforeCursor {
    pub before: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FingerprintCursor {
    pub fingerprint: String,
}

/// One cursor shape per pagination protocol.
///
/// Variant order matters for decoding: the two-key shapes come first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cursor {
    /// Explorer APIs paging one action at a time (`txlist`, then `tokentx`).
    Explorer(ExplorerCursor),
    /// Multi-stage sources (TRX, then TRC-20) with a provider fingerprint.
    Stage(StageCursor),
    Offset(OffsetCursor),
    Page(PageCursor),
    Marker(MarkerCursor),
    /// Boundary id of the oldest item seen so far.
    Before(BeforeCursor),
    Fingerprint(FingerprintCursor),
}

impl Cursor {
    pub fn offset(offset: u64) -> Self {
        Self::Offset(OffsetCursor { offset })
    }

    pub fn page(page: u32) -> Self {
        Self::Page(PageCursor { page })
    }

    pub fn marker(marker: Value) -> Self {
        Self::Marker(MarkerCursor { marker })
    }

    pub fn before(before: impl Into<String>) -> Self {
        Self::Before(BeforeCursor {
            before: before.into(),
        })
    }

    pub fn fingerprint(fingerprint: impl Into<String>) -> Self {
        Self::Fingerprint(FingerprintCursor {
            fingerprint: fingerprint.into(),
        })
    }

    pub fn explorer(action: impl Into<String>, page: u32) -> Self {
        Self::Explorer(ExplorerCursor {
            action: action.into(),
            page,
        })
    }

    pub fn stage(action: impl Into<String>, fingerprint: Option<String>) -> Self {
        Self::Stage(StageCursor {
            action: action.into(),
            fingerprint,
        })
    }

    /// Parses a persisted cursor. Anything unreadable means "start over".
    pub fn decode(wire: &str) -> Option<Self> {
        match serde_json::from_str(wire) {
            Ok(cursor) => Some(cursor),
            Err(e) => {
                warn!("Discarding unreadable cursor {:?}: {}", wire, e);
                None
            }
        }
    }

    pub fn encode(&self) -> String {
        let value = match self {
            Self::Explorer(c) => json!({ "action": c.action, "page": c.page }),
            Self::Stage(c) => match &c.fingerprint {
                Some(fp) => json!({ "action": c.action, "fingerprint": fp }),
                None => json!({ "action": c.action }),
            },
            Self::Offset(c) => json!({ "offset": c.offset }),
            Self::Page(c) => json!({ "page": c.page }),
            Self::Marker(c) => json!({ "marker": c.marker }),
            Self::Before(c) => json!({ "before": c.before }),
            Self::Fingerprint(c) => json!({ "fingerprint": c.fingerprint }),
        };
        value.to_string()
    }

    /// Offset to resume from; 0 for no cursor or a foreign shape.
    pub fn offset_of(cursor: Option<&Cursor>) -> u64 {
        match cursor {
            Some(Cursor::Offset(c)) => c.offset,
            _ => 0,
        }
    }

    /// Next offset cursor after a page of `fetched` rows read at `offset`.
    ///
    /// A short or empty page ends pagination, as does reaching `total` when the
    /// provider reports one.
    pub fn next_offset(offset: u64, fetched: usize, page_size: usize, total: Option<u64>) -> Option<Cursor> {
        let seen = offset + fetched as u64;
        let full_page = fetched > 0 && fetched >= page_size;
        let exhausted = matches!(total, Some(total) if seen >= total);
        (full_page && !exhausted).then(|| Cursor::offset(seen))
    }

    /// Page to resume from; 1 for no cursor or a foreign shape.
    pub fn page_of(cursor: Option<&Cursor>) -> u32 {
        match cursor {
            Some(Cursor::Page(c)) => c.page.max(1),
            _ => 1,
        }
    }

    pub fn before_of(cursor: Option<&Cursor>) -> Option<&str> {
        match cursor {
            Some(Cursor::Before(c)) => Some(c.before.as_str()),
            _ => None,
        }
    }

    pub fn marker_of(cursor: Option<&Cursor>) -> Option<&Value> {
        match cursor {
            Some(Cursor::Marker(c)) => Some(&c.marker),
            _ => None,
        }
    }
}
