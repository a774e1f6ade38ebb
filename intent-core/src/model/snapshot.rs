use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::canonicalize;
use crate::model::{
    AddressObject, IntentObject, ObjectKey, ObjectKind, Scope, SecurityRule, ServiceObject,
};
use crate::parser::ParseError;

/// Immutable, canonically ordered collection of intent objects.
///
/// Unordered kinds are held in name order; security and NAT rules keep their
/// declared order. Every object is stored in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentSnapshot {
    scope: Scope,
    version: String,
    objects: Vec<IntentObject>,
}

impl IntentSnapshot {
    /// Build a snapshot, rejecting duplicate identifiers within a kind.
    pub fn new(
        scope: Scope,
        version: impl Into<String>,
        objects: Vec<IntentObject>,
    ) -> Result<Self, ParseError> {
        let mut seen = BTreeSet::new();
        let mut canonical = Vec::with_capacity(objects.len());
        for object in objects {
            let object = canonicalize(&object);
            if object.name().is_empty() {
                return Err(ParseError::MissingField {
                    object: object.kind().to_string(),
                    field: "name".to_string(),
                });
            }
            if !seen.insert(object.key()) {
                return Err(ParseError::Duplicate {
                    kind: object.kind().to_string(),
                    name: object.name().to_string(),
                });
            }
            canonical.push(object);
        }

        // stable sort keeps declared order inside ordered kinds
        canonical.sort_by(|a, b| {
            a.kind().cmp(&b.kind()).then_with(|| {
                if a.kind().is_ordered() {
                    std::cmp::Ordering::Equal
                } else {
                    a.name().cmp(b.name())
                }
            })
        });

        Ok(Self {
            scope,
            version: version.into(),
            objects: canonical,
        })
    }

    pub fn empty(scope: Scope, version: impl Into<String>) -> Self {
        Self {
            scope,
            version: version.into(),
            objects: Vec::new(),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// `<environment>.<group>.<version>`
    pub fn id(&self) -> String {
        format!(
            "{}.{}.{}",
            self.scope.environment, self.scope.device_group, self.version
        )
    }

    /// Same content under another scope and version.
    pub fn relabel(&self, scope: Scope, version: impl Into<String>) -> Self {
        Self {
            scope,
            version: version.into(),
            objects: self.objects.clone(),
        }
    }

    pub fn objects(&self) -> &[IntentObject] {
        &self.objects
    }

    pub fn into_objects(self) -> Vec<IntentObject> {
        self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&IntentObject> {
        self.objects
            .iter()
            .find(|object| object.kind() == key.kind && object.name() == key.name)
    }

    /// Security rules in precedence order.
    pub fn rules(&self) -> impl Iterator<Item = &SecurityRule> {
        self.objects.iter().filter_map(IntentObject::as_rule)
    }

    /// Identifiers of one kind in snapshot order.
    pub fn sequence(&self, kind: ObjectKind) -> Vec<String> {
        self.objects
            .iter()
            .filter(|object| object.kind() == kind)
            .map(|object| object.name().to_string())
            .collect()
    }

    pub fn address(&self, name: &str) -> Option<&AddressObject> {
        self.objects.iter().find_map(|object| match object {
            IntentObject::Address(address) if address.name == name => Some(address),
            _ => None,
        })
    }

    pub fn service(&self, name: &str) -> Option<&ServiceObject> {
        self.objects.iter().find_map(|object| match object {
            IntentObject::Service(service) if service.name == name => Some(service),
            _ => None,
        })
    }

    pub fn zone_names(&self) -> BTreeSet<&str> {
        self.objects
            .iter()
            .filter(|object| object.kind() == ObjectKind::Zone)
            .map(IntentObject::name)
            .collect()
    }

    /// SHA-256 over the ordered object keys and content hashes.
    ///
    /// Scope and version are not part of the fingerprint, so two snapshots with
    /// the same content fingerprint equal regardless of where they came from.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for object in &self.objects {
            hasher.update(object.key().to_string().as_bytes());
            hasher.update(b"=");
            hasher.update(object.content_hash().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}
