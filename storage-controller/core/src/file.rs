use crate::{Kind, Metadata, Resource, Result};

/// An opaque blob (a certificate, a descriptor set, ...) stored next to the resources that
/// depend on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct File {
    /// A `/`-separated path, relative to the backend's file root.
    pub file_ref: String,
    pub contents: Vec<u8>,
    pub metadata: Option<Metadata>,
}

impl File {
    pub fn new(file_ref: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            file_ref: file_ref.into(),
            contents: contents.into(),
            metadata: None,
        }
    }
}

impl Resource for File {
    const KIND: Kind = Kind::File;

    #[inline]
    fn name(&self) -> &str {
        &self.file_ref
    }

    #[inline]
    fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        self.metadata.get_or_insert_with(Metadata::default)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.contents.clone())
    }

    fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(name, bytes))
    }
}
