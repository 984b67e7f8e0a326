/*!
The fragment entity: one owner-scoped stored object.

A [`Fragment`] is the metadata record. Its payload bytes live next to it in
the storage façade under the same `(owner_id, id)` key, and every payload
write is followed by a metadata write carrying the new size.
*/

use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::content_type::{self, ContentType};
use crate::keyed::StoredValue;
use crate::storage::{FragmentListing, FragmentStorage};
use crate::{FragmentsError, Result};

/// Input for constructing a new fragment.
///
/// Only `owner_id` and `content_type` are required; everything else is
/// filled in by [`Fragment::create`].
#[derive(Debug, Clone, Default)]
pub struct NewFragment {
    pub id: Option<String>,
    pub owner_id: String,
    /// A content-type header value, e.g. `text/plain; charset=utf-8`
    pub content_type: String,
    pub size: Option<u64>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

/// Metadata record for one stored fragment.
///
/// Serializes as `{id, ownerId, type, size, created, updated}`. Timestamps
/// are RFC 3339 with millisecond precision, so their string forms sort
/// chronologically.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    id: String,
    owner_id: String,
    #[serde(rename = "type")]
    content_type: ContentType,
    size: u64,
    #[serde(with = "rfc3339_millis")]
    created: DateTime<Utc>,
    #[serde(with = "rfc3339_millis")]
    updated: DateTime<Utc>,
}

impl Fragment {
    /// Create a fragment for `owner_id` with the given content type.
    ///
    /// # Example
    /// ```rust
    /// use fragments_core::Fragment;
    ///
    /// let fragment = Fragment::new("user1", "text/plain; charset=utf-8")?;
    /// assert_eq!(fragment.mime_type(), "text/plain");
    /// assert_eq!(fragment.size(), 0);
    /// # Ok::<(), fragments_core::FragmentsError>(())
    /// ```
    pub fn new<S1, S2>(owner_id: S1, content_type: S2) -> Result<Self>
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::create(NewFragment {
            owner_id: owner_id.into(),
            content_type: content_type.into(),
            ..Default::default()
        })
    }

    /// Validate `init` and build a fragment from it.
    ///
    /// Checks run in order and the first violation wins: owner present,
    /// type present, type parses, type supported. A missing id is generated,
    /// `created` defaults to now and `updated` to `created`.
    pub fn create(init: NewFragment) -> Result<Self> {
        if init.owner_id.is_empty() {
            return Err(FragmentsError::validation("ownerId is required"));
        }
        if init.content_type.trim().is_empty() {
            return Err(FragmentsError::validation("type is required"));
        }
        let content_type = ContentType::parse(&init.content_type)?;
        if !content_type.is_supported() {
            return Err(FragmentsError::unsupported_type(init.content_type));
        }

        let created = init.created.map(|t| t.trunc_subsecs(3)).unwrap_or_else(now);
        Ok(Self {
            id: init
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            owner_id: init.owner_id,
            content_type,
            size: init.size.unwrap_or(0),
            created,
            updated: init.updated.map(|t| t.trunc_subsecs(3)).unwrap_or(created),
        })
    }

    /// Check a record loaded from storage, which bypasses [`Fragment::create`].
    pub fn validate(&self) -> Result<()> {
        if self.owner_id.is_empty() {
            return Err(FragmentsError::validation("ownerId is required"));
        }
        if self.id.is_empty() {
            return Err(FragmentsError::validation("id cannot be empty"));
        }
        if !self.content_type.is_supported() {
            return Err(FragmentsError::unsupported_type(self.content_type.to_string()));
        }
        Ok(())
    }

    /// All fragments for `owner_id`: ids only, or full records when `expand` is set.
    pub fn by_user(
        storage: &dyn FragmentStorage,
        owner_id: &str,
        expand: bool,
    ) -> Result<FragmentListing> {
        storage.list_fragments(owner_id, expand)
    }

    /// Load the fragment `id` belonging to `owner_id`.
    ///
    /// # Errors
    /// * `FragmentsError::NotFound` - no metadata is stored for the pair
    pub fn by_id(storage: &dyn FragmentStorage, owner_id: &str, id: &str) -> Result<Self> {
        let fragment = storage
            .read_fragment(owner_id, id)?
            .ok_or_else(|| FragmentsError::not_found(format!("Fragment not found for id: {id}")))?;
        fragment.validate()?;
        Ok(fragment)
    }

    /// Delete both metadata and payload of fragment `id`.
    pub fn delete(storage: &dyn FragmentStorage, owner_id: &str, id: &str) -> Result<()> {
        storage.delete_fragment(owner_id, id)?;
        debug!(owner_id, fragment_id = id, "Fragment deleted");
        Ok(())
    }

    /// Refresh `updated` and persist the metadata record.
    pub fn save(&mut self, storage: &dyn FragmentStorage) -> Result<()> {
        self.updated = now();
        storage.write_fragment(self)
    }

    /// Read the payload bytes.
    ///
    /// # Errors
    /// * `FragmentsError::DataUnavailable` - the payload is missing or the read failed
    pub fn get_data(&self, storage: &dyn FragmentStorage) -> Result<Bytes> {
        match storage.read_fragment_data(&self.owner_id, &self.id) {
            Ok(Some(data)) => Ok(data),
            Ok(None) => Err(FragmentsError::data_unavailable(&self.id, "no data stored")),
            Err(e) => Err(FragmentsError::data_unavailable(&self.id, e.to_string())),
        }
    }

    /// Replace the payload and re-save metadata with the new size.
    ///
    /// The payload is written first and the metadata record acts as the
    /// commit: if the metadata write fails, the stored size is stale until
    /// the caller retries the whole call. A failed payload write leaves
    /// `self` untouched.
    pub fn set_data<B: Into<Bytes>>(&mut self, storage: &dyn FragmentStorage, data: B) -> Result<()> {
        let data = data.into();
        let size = data.len() as u64;
        storage.write_fragment_data(&self.owner_id, &self.id, data)?;
        self.size = size;

        if let Err(e) = self.save(storage) {
            warn!(
                owner_id = %self.owner_id,
                fragment_id = %self.id,
                error = %e,
                "Payload written but metadata save failed; size is stale until retried"
            );
            return Err(e);
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// The full content type, parameters included.
    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    /// The bare mime type, e.g. `text/html; charset=utf-8` -> `text/html`
    pub fn mime_type(&self) -> &str {
        self.content_type.mime()
    }

    /// True if this fragment is a `text/*` mime type
    pub fn is_text(&self) -> bool {
        self.content_type.is_text()
    }

    /// Mime types this fragment advertises itself as renderable to.
    ///
    /// Advisory only; [`crate::convert`] decides what conversions succeed.
    pub fn formats(&self) -> Vec<String> {
        vec![self.mime_type().to_string()]
    }

    /// Returns true if we know how to work with this content-type value
    pub fn is_supported_type(value: &str) -> bool {
        content_type::is_supported_type(value)
    }
}

impl StoredValue for Fragment {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn decode(bytes: Vec<u8>) -> Result<Self> {
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Current time at the precision timestamps are stored with.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Fixed-width `YYYY-MM-DDTHH:MM:SS.sssZ`, so string order is time order.
mod rfc3339_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
