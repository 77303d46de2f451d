use crate::{
    Attribute, Error, File, Kind, Resource, Result, Role, Upstream, VirtualMesh, VirtualService,
};

/// Holds one resource of any kind.
///
/// Used where items of different kinds share a keyspace and must be told apart by the type flag
/// stored alongside them.
#[derive(Clone, Debug, PartialEq)]
pub enum StorableItem {
    Upstream(Upstream),
    VirtualService(VirtualService),
    Role(Role),
    Attribute(Attribute),
    VirtualMesh(VirtualMesh),
    File(File),
}

macro_rules! each_item {
    ($item:expr, $inner:ident => $body:expr) => {
        match $item {
            StorableItem::Upstream($inner) => $body,
            StorableItem::VirtualService($inner) => $body,
            StorableItem::Role($inner) => $body,
            StorableItem::Attribute($inner) => $body,
            StorableItem::VirtualMesh($inner) => $body,
            StorableItem::File($inner) => $body,
        }
    };
}

// === impl StorableItem ===

impl StorableItem {
    /// Decodes a stored value using the type flag written next to it.
    pub fn decode(flag: u64, name: &str, bytes: &[u8]) -> Result<Self> {
        let kind = Kind::from_flag(flag)
            .ok_or_else(|| Error::validation(format!("unknown type flag {flag} for {name:?}")))?;
        let item = match kind {
            Kind::Upstream => Self::Upstream(Upstream::from_bytes(name, bytes)?),
            Kind::VirtualService => Self::VirtualService(VirtualService::from_bytes(name, bytes)?),
            Kind::Role => Self::Role(Role::from_bytes(name, bytes)?),
            Kind::Attribute => Self::Attribute(Attribute::from_bytes(name, bytes)?),
            Kind::VirtualMesh => Self::VirtualMesh(VirtualMesh::from_bytes(name, bytes)?),
            Kind::File => Self::File(File::from_bytes(name, bytes)?),
        };
        Ok(item)
    }

    pub fn kind(&self) -> Kind {
        match self {
            Self::Upstream(_) => Kind::Upstream,
            Self::VirtualService(_) => Kind::VirtualService,
            Self::Role(_) => Kind::Role,
            Self::Attribute(_) => Kind::Attribute,
            Self::VirtualMesh(_) => Kind::VirtualMesh,
            Self::File(_) => Kind::File,
        }
    }

    #[inline]
    pub fn type_flag(&self) -> u64 {
        self.kind().flag()
    }

    pub fn name(&self) -> &str {
        each_item!(self, r => r.name())
    }

    pub fn resource_version(&self) -> Option<&str> {
        each_item!(self, r => r.resource_version())
    }

    pub fn set_resource_version(&mut self, version: String) {
        each_item!(self, r => r.set_resource_version(version))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        each_item!(self, r => r.to_bytes())
    }
}

macro_rules! from_resource {
    ($($ty:ident),+) => {
        $(
            impl From<$ty> for StorableItem {
                fn from(r: $ty) -> Self {
                    Self::$ty(r)
                }
            }
        )+
    };
}

from_resource!(Upstream, VirtualService, Role, Attribute, VirtualMesh, File);
