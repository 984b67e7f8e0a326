/*!
Transport-free fragment operations.

[`FragmentService`] is what a request handler calls once it has an
authenticated owner id: it validates inbound content types, drives the
[`Fragment`] entity against the configured storage, and runs the conversion
engine on reads that ask for a different representation.
*/

use bytes::Bytes;
use tracing::{debug, info};

use crate::content_type::{parse_requested_identity, ContentType};
use crate::convert::convert;
use crate::storage::{create_storage_from_config, FragmentListing, FragmentStorage};
use crate::{Fragment, FragmentsError, NewFragment, Result, StorageConfig};

/// A fragment's bytes in the representation the caller asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFragment {
    pub fragment: Fragment,
    /// Content type to attach to `data`; the fragment's own type when no
    /// conversion happened, the bare target mime type otherwise
    pub content_type: String,
    pub data: Bytes,
}

/// Fragment operations over one storage backend.
pub struct FragmentService {
    storage: Box<dyn FragmentStorage>,
}

impl FragmentService {
    pub fn new(storage: Box<dyn FragmentStorage>) -> Self {
        Self { storage }
    }

    /// Build the service over the backend selected by `config`.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(create_storage_from_config(config)?))
    }

    pub fn storage(&self) -> &dyn FragmentStorage {
        self.storage.as_ref()
    }

    /// Store a new fragment for `owner_id`.
    ///
    /// The content type is checked before anything is persisted.
    ///
    /// # Example
    /// ```rust
    /// use fragments_core::{FragmentService, StorageConfig};
    ///
    /// let service = FragmentService::from_config(&StorageConfig::memory())?;
    /// let fragment = service.create("user1", "text/markdown", "# Hi")?;
    /// let html = service.read("user1", &format!("{}.html", fragment.id()))?;
    /// assert_eq!(html.content_type, "text/html");
    /// # Ok::<(), fragments_core::FragmentsError>(())
    /// ```
    ///
    /// # Errors
    /// * `FragmentsError::Validation` - empty owner or malformed content type
    /// * `FragmentsError::UnsupportedType` - content type outside the supported set
    pub fn create<B: Into<Bytes>>(
        &self,
        owner_id: &str,
        content_type: &str,
        data: B,
    ) -> Result<Fragment> {
        let mut fragment = Fragment::create(NewFragment {
            owner_id: owner_id.to_string(),
            content_type: content_type.to_string(),
            ..Default::default()
        })?;
        fragment.save(self.storage())?;
        fragment.set_data(self.storage(), data)?;

        info!(
            owner_id,
            fragment_id = fragment.id(),
            content_type = %fragment.content_type(),
            size = fragment.size(),
            "Fragment created"
        );
        Ok(fragment)
    }

    pub fn list(&self, owner_id: &str, expand: bool) -> Result<FragmentListing> {
        Fragment::by_user(self.storage(), owner_id, expand)
    }

    /// Metadata only; the payload is not read.
    pub fn info(&self, owner_id: &str, id: &str) -> Result<Fragment> {
        Fragment::by_id(self.storage(), owner_id, id)
    }

    /// Read `<id>[.<ext>]`, converting when the extension names another type.
    ///
    /// # Errors
    /// * `FragmentsError::UnsupportedConversion` - unknown extension, or no
    ///   path from the fragment's type to the requested one
    /// * `FragmentsError::NotFound` - no such fragment for this owner
    /// * `FragmentsError::DataUnavailable` - metadata exists but the payload cannot be read
    pub fn read(&self, owner_id: &str, requested: &str) -> Result<RenderedFragment> {
        let requested = parse_requested_identity(requested)?;
        // unknown extensions fail before any storage access
        let target = requested.target_mime()?;

        let fragment = Fragment::by_id(self.storage(), owner_id, &requested.id)?;
        let data = fragment.get_data(self.storage())?;

        match target {
            Some(target) if target != fragment.mime_type() => {
                let (data, mime) = convert(&fragment.content_type().to_string(), data, target)?
                    .into_result()?;
                debug!(
                    owner_id,
                    fragment_id = fragment.id(),
                    from = fragment.mime_type(),
                    to = mime,
                    "Fragment rendered"
                );
                Ok(RenderedFragment {
                    fragment,
                    content_type: mime.to_string(),
                    data,
                })
            }
            _ => Ok(RenderedFragment {
                content_type: fragment.content_type().to_string(),
                fragment,
                data,
            }),
        }
    }

    /// Replace the payload of an existing fragment.
    ///
    /// # Errors
    /// * `FragmentsError::Validation` - `content_type` is malformed or its
    ///   mime type differs from the fragment's
    /// * `FragmentsError::NotFound` - no such fragment for this owner
    pub fn update<B: Into<Bytes>>(
        &self,
        owner_id: &str,
        id: &str,
        content_type: &str,
        data: B,
    ) -> Result<Fragment> {
        let content_type = ContentType::parse(content_type)?;
        let mut fragment = Fragment::by_id(self.storage(), owner_id, id)?;
        if content_type.mime() != fragment.mime_type() {
            return Err(FragmentsError::validation(format!(
                "A fragment's type can not be changed after it is created (is {}, got {})",
                fragment.mime_type(),
                content_type.mime()
            )));
        }

        fragment.set_data(self.storage(), data)?;
        info!(owner_id, fragment_id = id, size = fragment.size(), "Fragment updated");
        Ok(fragment)
    }

    pub fn delete(&self, owner_id: &str, id: &str) -> Result<()> {
        Fragment::delete(self.storage(), owner_id, id)?;
        info!(owner_id, fragment_id = id, "Fragment deleted");
        Ok(())
    }
}

impl std::fmt::Debug for FragmentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentService")
            .field("backend", &self.storage.backend())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryFragmentStorage, MockFragmentStorage};

    fn service() -> FragmentService {
        FragmentService::new(Box::new(MemoryFragmentStorage::in_memory()))
    }

    #[test]
    fn test_create_and_read_back() {
        let service = service();
        let fragment = service
            .create("u1", "text/plain; charset=utf-8", "hello")
            .unwrap();
        assert_eq!(fragment.size(), 5);

        let rendered = service.read("u1", fragment.id()).unwrap();
        assert_eq!(rendered.data, Bytes::from_static(b"hello"));
        assert_eq!(rendered.content_type, "text/plain; charset=utf-8");
        assert_eq!(rendered.fragment, fragment);
    }

    #[test]
    fn test_create_rejects_unsupported_type_before_persisting() {
        let mut storage = MockFragmentStorage::new();
        storage.expect_write_fragment().never();
        storage.expect_write_fragment_data().never();
        let service = FragmentService::new(Box::new(storage));

        let err = service.create("u1", "audio/mpeg", vec![0u8; 4]).unwrap_err();
        assert!(matches!(err, FragmentsError::UnsupportedType(_)));

        let err = service.create("u1", "not-a-type", "x").unwrap_err();
        assert!(matches!(err, FragmentsError::Validation(_)));
    }

    #[test]
    fn test_read_with_conversion() {
        let service = service();
        let fragment = service.create("u1", "text/markdown", "# Title").unwrap();

        let html = service.read("u1", &format!("{}.html", fragment.id())).unwrap();
        assert_eq!(html.content_type, "text/html");
        assert!(String::from_utf8_lossy(&html.data).contains("<h1>Title</h1>"));

        // same type through its extension is the stored bytes
        let md = service.read("u1", &format!("{}.md", fragment.id())).unwrap();
        assert_eq!(md.data, Bytes::from_static(b"# Title"));
        assert_eq!(md.content_type, "text/markdown");
    }

    #[test]
    fn test_read_unsupported_conversion() {
        let service = service();
        let fragment = service.create("u1", "text/plain", "hi").unwrap();

        for suffix in ["json", "exe", "png"] {
            let err = service
                .read("u1", &format!("{}.{suffix}", fragment.id()))
                .unwrap_err();
            assert!(
                matches!(err, FragmentsError::UnsupportedConversion { .. }),
                "{suffix}: {err}"
            );
            assert!(err.is_client_error());
        }
    }

    #[test]
    fn test_read_missing_fragment() {
        let err = service().read("u1", "nope.txt").unwrap_err();
        assert!(matches!(err, FragmentsError::NotFound(_)));
    }

    #[test]
    fn test_update_keeps_type() {
        let service = service();
        let fragment = service.create("u1", "text/csv", "a,b\n1,2").unwrap();

        let updated = service
            .update("u1", fragment.id(), "text/csv; charset=utf-8", "a\n1")
            .unwrap();
        assert_eq!(updated.size(), 3);
        assert_eq!(updated.created(), fragment.created());
        // the stored type keeps its original parameters
        assert_eq!(updated.content_type(), fragment.content_type());

        let err = service
            .update("u1", fragment.id(), "application/json", "[]")
            .unwrap_err();
        assert!(matches!(err, FragmentsError::Validation(_)));
        assert_eq!(service.info("u1", fragment.id()).unwrap().size(), 3);

        let err = service.update("u1", "missing", "text/csv", "a").unwrap_err();
        assert!(matches!(err, FragmentsError::NotFound(_)));
    }

    #[test]
    fn test_list_and_delete() {
        let service = service();
        let a = service.create("u1", "text/plain", "a").unwrap();
        let b = service.create("u1", "application/json", "{}").unwrap();
        service.create("u2", "text/plain", "other").unwrap();

        assert_eq!(service.list("u1", false).unwrap().ids(), vec![a.id(), b.id()]);

        service.delete("u1", a.id()).unwrap();
        assert_eq!(service.list("u1", true).unwrap().ids(), vec![b.id()]);
        assert!(matches!(
            service.delete("u1", a.id()),
            Err(FragmentsError::NotFound(_))
        ));
        assert!(matches!(
            service.info("u1", a.id()),
            Err(FragmentsError::NotFound(_))
        ));
    }
}
