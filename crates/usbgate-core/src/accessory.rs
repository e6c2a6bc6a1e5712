//! Accessory record model.
//!
//! An [`Accessory`] is an immutable identity snapshot of one attached USB
//! peripheral plus a single piece of mutable state: the permission flag.
//! Records are created by decoding a server response; cloning produces an
//! independent deep copy whose permission flag is reset.

use std::ops::ControlFlow;

use serde::Serialize;

/// Identity snapshot of one attached USB accessory.
///
/// The six identity fields are fixed at decode time. `permission_granted`
/// is sticky: once a permission check succeeds it stays set for the
/// lifetime of this handle and is never cleared by the library.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Accessory {
    manufacturer: String,
    model: String,
    description: String,
    version: String,
    uri: String,
    serial: String,

    #[serde(skip)]
    permission_granted: bool,
}

impl Accessory {
    /// Build a record from its six identity fields. Permission starts
    /// ungranted.
    pub fn new(
        manufacturer: impl Into<String>,
        model: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
        uri: impl Into<String>,
        serial: impl Into<String>,
    ) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            model: model.into(),
            description: description.into(),
            version: version.into(),
            uri: uri.into(),
            serial: serial.into(),
            permission_granted: false,
        }
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Whether the host has granted this handle permission to open the
    /// accessory.
    pub fn permission_granted(&self) -> bool {
        self.permission_granted
    }

    /// Mark this handle as granted. The flag is sticky and never cleared
    /// by the library.
    pub(crate) fn grant(&mut self) {
        self.permission_granted = true;
    }
}

impl Clone for Accessory {
    /// Deep copy of the identity fields. The permission flag is per-handle
    /// state and does not carry over: a clone always starts ungranted.
    fn clone(&self) -> Self {
        Self::new(
            self.manufacturer.clone(),
            self.model.clone(),
            self.description.clone(),
            self.version.clone(),
            self.uri.clone(),
            self.serial.clone(),
        )
    }
}

/// Ordered collection of attached accessories.
///
/// The current server protocol only ever reports one accessory, but the
/// list supports zero or more; nothing here assumes arity one.
#[derive(Debug, Default)]
pub struct AccessoryList {
    records: Vec<Accessory>,
}

impl AccessoryList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, accessory: Accessory) {
        self.records.push(accessory);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&Accessory> {
        self.records.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Accessory> {
        self.records.iter()
    }

    /// Visit each accessory in order until the visitor breaks.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&Accessory) -> ControlFlow<()>,
    {
        for record in &self.records {
            if visit(record).is_break() {
                break;
            }
        }
    }
}

impl From<Vec<Accessory>> for AccessoryList {
    fn from(records: Vec<Accessory>) -> Self {
        Self { records }
    }
}

impl IntoIterator for AccessoryList {
    type Item = Accessory;
    type IntoIter = std::vec::IntoIter<Accessory>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a AccessoryList {
    type Item = &'a Accessory;
    type IntoIter = std::slice::Iter<'a, Accessory>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
