//! RPC object-tree abstraction (spec §6). The object/property surface this
//! daemon exposes is collaborator-defined ("bus transport details... only a
//! request/response RPC abstraction is assumed" — no D-Bus/gRPC crate
//! appears anywhere in the retrieval pack), so `Transport` is a thin trait
//! over an addressable tree of named properties, in the same
//! trait-plus-concrete-default shape as the collector's `FileSystem`/`RealFs`
//! split: swap in a real bus binding later without touching the object-tree
//! builder in [`objects`].

pub mod objects;

pub use objects::ObjectTree;

use std::collections::HashMap;

/// One property value as it crosses the object/RPC surface. Covers every
/// shape spec §6's interfaces use: scalars, object-path references, and the
/// two list forms (`AvailableTriggers`, `AvailableComponents`).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    U8(u8),
    U16(u16),
    U32(u32),
    F64(f64),
    Bool(bool),
    Path(ObjectPath),
    StringList(Vec<String>),
    U8List(Vec<u8>),
    PathList(Vec<ObjectPath>),
}

/// An object-tree path, e.g. `/xyz/openbmc_project/NodeManager/Domain/CpuSubsystem`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        Self(format!("{}/{}", self.0, segment.as_ref()))
    }
}

impl std::fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the daemon needs from its RPC binding: publish an object, set or read
/// one of its properties, and announce a property change. Grounded on the
/// collector's `FileSystem` trait — a narrow seam over an external resource
/// with one concrete, directly-testable implementation ([`LoggingTransport`])
/// standing in for whatever bus binding eventually replaces it.
pub trait Transport: Send {
    fn register_object(&mut self, path: &ObjectPath, interfaces: &[&str]);
    fn remove_object(&mut self, path: &ObjectPath);
    fn set_property(&mut self, path: &ObjectPath, interface: &str, name: &str, value: PropertyValue);
    fn get_property(&self, path: &ObjectPath, interface: &str, name: &str) -> Option<PropertyValue>;
    fn emit_changed(&mut self, path: &ObjectPath, interface: &str, name: &str);
}

/// Reference [`Transport`]: keeps every object's properties in memory and
/// traces registration/change events instead of putting them on a bus.
/// Sufficient for the daemon to run standalone and for tests to assert on
/// the published tree; a real binding replaces this wholesale.
#[derive(Default)]
pub struct LoggingTransport {
    objects: HashMap<ObjectPath, HashMap<(String, String), PropertyValue>>,
}

impl LoggingTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for LoggingTransport {
    fn register_object(&mut self, path: &ObjectPath, interfaces: &[&str]) {
        tracing::debug!(path = %path, ?interfaces, "registering object");
        self.objects.entry(path.clone()).or_default();
    }

    fn remove_object(&mut self, path: &ObjectPath) {
        tracing::debug!(path = %path, "removing object");
        self.objects.remove(path);
    }

    fn set_property(&mut self, path: &ObjectPath, interface: &str, name: &str, value: PropertyValue) {
        self.objects
            .entry(path.clone())
            .or_default()
            .insert((interface.to_string(), name.to_string()), value);
    }

    fn get_property(&self, path: &ObjectPath, interface: &str, name: &str) -> Option<PropertyValue> {
        self.objects
            .get(path)?
            .get(&(interface.to_string(), name.to_string()))
            .cloned()
    }

    fn emit_changed(&mut self, path: &ObjectPath, interface: &str, name: &str) {
        tracing::trace!(path = %path, interface, name, "property changed");
    }
}
