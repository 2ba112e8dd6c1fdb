use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix reserved for labels attached by this discovery mechanism.
pub const LABEL_PREFIX: &str = "__meta_uyuni_";

/// Comma-joined addon entitlements of the system.
pub const LABEL_ENTITLEMENTS: &str = "__meta_uyuni_entitlements";

/// Name of the exporter the target scrapes.
pub const LABEL_EXPORTER: &str = "__meta_uyuni_exporter";

/// Discovery mechanism name, used as the target group source prefix.
pub const SOURCE_NAME: &str = "uyuni";

/// A managed system as returned by `system.listSystems`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRef {
    pub id: i64,
    pub name: String,
}

/// Per-system details from `system.getDetails`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemDetail {
    pub id: i64,
    pub hostname: String,
    /// Addon entitlements, deduplicated, in the order the server listed them.
    pub entitlements: Vec<String>,
}

impl SystemDetail {
    /// Creates a detail record, dropping blank and repeated entitlements.
    pub fn new(
        id: i64,
        hostname: impl Into<String>,
        entitlements: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for entitlement in entitlements {
            let entitlement = entitlement.trim();
            if !entitlement.is_empty() && !unique.iter().any(|e| e == entitlement) {
                unique.push(entitlement.to_string());
            }
        }
        Self {
            id,
            hostname: hostname.into(),
            entitlements: unique,
        }
    }

    /// Returns the entitlement label value, or `None` when there are no entitlements.
    pub fn entitlements_label(&self) -> Option<String> {
        if self.entitlements.is_empty() {
            None
        } else {
            Some(self.entitlements.join(","))
        }
    }
}

/// Monitoring exporters known to the Uyuni exporter formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Exporter {
    NodeExporter,
    PostgresExporter,
}

impl Exporter {
    /// All known exporters, in the order targets are emitted.
    pub const ALL: [Exporter; 2] = [Exporter::NodeExporter, Exporter::PostgresExporter];

    /// Formula (and label) name of the exporter.
    pub fn name(self) -> &'static str {
        match self {
            Exporter::NodeExporter => "node_exporter",
            Exporter::PostgresExporter => "postgres_exporter",
        }
    }

    /// Well-known port the exporter listens on.
    pub fn port(self) -> u16 {
        match self {
            Exporter::NodeExporter => 9100,
            Exporter::PostgresExporter => 9187,
        }
    }
}

impl fmt::Display for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Formula state of one exporter on one system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormulaConfig {
    pub exporter: Exporter,
    pub enabled: bool,
}

/// Everything resolved for one system during a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSystem {
    pub detail: SystemDetail,
    pub formulas: Vec<FormulaConfig>,
    pub fqdns: Vec<String>,
}

impl ResolvedSystem {
    /// Returns the name targets are addressed by: the first non-blank FQDN,
    /// falling back to the hostname.
    pub fn network_name(&self) -> Option<&str> {
        self.fqdns
            .iter()
            .map(|name| name.trim())
            .find(|name| !name.is_empty())
            .or_else(|| Some(self.detail.hostname.trim()).filter(|h| !h.is_empty()))
    }

    /// Returns the enabled exporters in enumeration order.
    pub fn enabled_exporters(&self) -> Vec<Exporter> {
        Exporter::ALL
            .into_iter()
            .filter(|exporter| {
                self.formulas
                    .iter()
                    .any(|f| f.exporter == *exporter && f.enabled)
            })
            .collect()
    }
}

/// One scrape endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub address: String,
    pub labels: BTreeMap<String, String>,
}

/// The targets produced by one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub targets: Vec<Target>,
    pub source: String,
}

impl TargetGroup {
    /// Converts the group into Prometheus `file_sd` entries, one per target.
    pub fn to_file_sd(&self) -> Vec<FileSdEntry> {
        self.targets
            .iter()
            .map(|target| FileSdEntry {
                targets: vec![target.address.clone()],
                labels: target.labels.clone(),
            })
            .collect()
    }
}

/// One entry of a Prometheus `file_sd` JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSdEntry {
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}
