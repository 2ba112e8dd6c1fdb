//! Target group assembly.
//!
//! Pure data transformation: no remote calls, no failure modes. Output order
//! follows input system order, then exporter enumeration order, so consecutive
//! cycles over an unchanged inventory produce identical groups.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, warn};

use crate::types::{LABEL_ENTITLEMENTS, LABEL_EXPORTER, ResolvedSystem, Target, TargetGroup};

/// Builds the target group for one cycle.
pub fn build(source: impl Into<String>, systems: &[ResolvedSystem]) -> TargetGroup {
    let mut targets = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for system in systems {
        let id = system.detail.id;
        let exporters = system.enabled_exporters();
        if exporters.is_empty() {
            debug!(system_id = id, "no exporters enabled");
            continue;
        }

        let Some(name) = system.network_name() else {
            warn!(system_id = id, "system has no resolvable network name, skipping");
            continue;
        };
        debug!(system_id = id, address = name, fqdns = ?system.fqdns, "resolved network name");

        let entitlements = system.detail.entitlements_label();

        for exporter in exporters {
            let address = format!("{name}:{}", exporter.port());
            if !seen.insert(address.clone()) {
                warn!(system_id = id, %address, "duplicate target address, skipping");
                continue;
            }

            let mut labels = BTreeMap::new();
            labels.insert(LABEL_EXPORTER.to_string(), exporter.name().to_string());
            if let Some(value) = &entitlements {
                labels.insert(LABEL_ENTITLEMENTS.to_string(), value.clone());
            }

            targets.push(Target { address, labels });
        }
    }

    TargetGroup {
        targets,
        source: source.into(),
    }
}
