use std::fmt;

/// The fixed set of resource types the storage core knows how to persist.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Upstream,
    VirtualService,
    Role,
    Attribute,
    VirtualMesh,
    File,
}

// === impl Kind ===

impl Kind {
    pub const ALL: [Kind; 6] = [
        Kind::Upstream,
        Kind::VirtualService,
        Kind::Role,
        Kind::Attribute,
        Kind::VirtualMesh,
        Kind::File,
    ];

    /// The path segment under which items of this kind are stored: a directory for the file
    /// backend, a key prefix for Consul, and the CRD plural for Kubernetes.
    pub fn plural(self) -> &'static str {
        match self {
            Kind::Upstream => "upstreams",
            Kind::VirtualService => "virtualservices",
            Kind::Role => "roles",
            Kind::Attribute => "attributes",
            Kind::VirtualMesh => "virtualmeshes",
            Kind::File => "files",
        }
    }

    /// The discriminator written to a Consul pair's `Flags` field.
    pub fn flag(self) -> u64 {
        match self {
            Kind::Upstream => 1,
            Kind::VirtualService => 2,
            Kind::File => 3,
            Kind::Role => 4,
            Kind::Attribute => 5,
            Kind::VirtualMesh => 6,
        }
    }

    pub fn from_flag(flag: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.flag() == flag)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Upstream => "Upstream",
            Kind::VirtualService => "VirtualService",
            Kind::Role => "Role",
            Kind::Attribute => "Attribute",
            Kind::VirtualMesh => "VirtualMesh",
            Kind::File => "File",
        };
        f.write_str(s)
    }
}
