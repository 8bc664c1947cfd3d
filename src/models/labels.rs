use std::collections::BTreeMap;

use uuid::Uuid;

use crate::models::catalog::SandboxKind;

pub const KIND_LABEL: &str = "bundle.example.com/kind";
pub const CORRELATION_LABEL: &str = "bundle.example.com/correlation";

/// The label set that ties a bundle's objects together: the catalog kind plus
/// a correlation id generated fresh for every bundle. Selecting on the kind
/// label alone matches every bundle of that kind; adding the correlation
/// label narrows the selection to exactly one bundle's objects.
#[derive(Clone, Debug)]
pub struct BundleLabels {
    labels: BTreeMap<String, String>,
}

impl BundleLabels {
    pub fn new(kind: SandboxKind) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(KIND_LABEL.to_string(), kind.key().to_string());
        labels.insert(
            CORRELATION_LABEL.to_string(),
            Uuid::new_v4().to_string(),
        );

        BundleLabels { labels }
    }

    pub fn correlation_id(&self) -> &str {
        &self.labels[CORRELATION_LABEL]
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Equality selector over the full label set (kind + correlation).
    pub fn selector(&self) -> String {
        selector_from(&self.labels)
    }
}

/// Equality selector matching every bundle of the given kind.
pub fn kind_selector(kind: SandboxKind) -> String {
    format!("{}={}", KIND_LABEL, kind.key())
}

/// Renders a label map as a `key=value,key=value` selector string.
pub fn selector_from(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<String>>()
        .join(",")
}
