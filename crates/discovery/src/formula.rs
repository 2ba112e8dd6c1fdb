//! Exporter formula lookups.
//!
//! Uyuni stores exporter settings as per-system formula data. A lookup returns
//! a struct keyed by exporter name, e.g. `{node_exporter: {enabled: true}}`.
//! A system with no formula assigned gets an empty struct back, which simply
//! means the exporter is not enabled.

use tracing::trace;
use uyuni_sd_xmlrpc::{Transport, Value, XmlRpcError};

use crate::DiscoveryError;
use crate::session::Session;
use crate::types::{Exporter, FormulaConfig};

const METHOD: &str = "formula.getSystemFormulaData";

/// Looks up one exporter formula for one system.
pub async fn get_formula_data(
    rpc: &dyn Transport,
    session: &Session,
    system_id: i64,
    exporter: Exporter,
) -> Result<FormulaConfig, DiscoveryError> {
    let value = rpc
        .call(
            METHOD,
            vec![
                session.token_param(),
                Value::Int(system_id),
                Value::from(exporter.name()),
            ],
        )
        .await
        .map_err(DiscoveryError::remote(METHOD))?;

    let enabled = parse_enabled(&value, exporter).map_err(DiscoveryError::remote(METHOD))?;
    trace!(system_id, %exporter, enabled, "formula resolved");
    Ok(FormulaConfig { exporter, enabled })
}

/// Looks up every known exporter formula for one system, in enumeration order.
pub async fn resolve_exporters(
    rpc: &dyn Transport,
    session: &Session,
    system_id: i64,
) -> Result<Vec<FormulaConfig>, DiscoveryError> {
    let mut configs = Vec::with_capacity(Exporter::ALL.len());
    for exporter in Exporter::ALL {
        configs.push(get_formula_data(rpc, session, system_id, exporter).await?);
    }
    Ok(configs)
}

fn parse_enabled(value: &Value, exporter: Exporter) -> Result<bool, XmlRpcError> {
    let config = match value {
        Value::Nil => return Ok(false),
        Value::Struct(_) => match value.member(exporter.name()) {
            None | Some(Value::Nil) => return Ok(false),
            Some(config @ Value::Struct(_)) => config,
            Some(other) => {
                return Err(XmlRpcError::Type(format!(
                    "{exporter}: expected struct, got {}",
                    other.type_name()
                )));
            }
        },
        other => {
            return Err(XmlRpcError::Type(format!(
                "expected formula struct, got {}",
                other.type_name()
            )));
        }
    };

    match config.member("enabled") {
        Some(Value::Bool(enabled)) => Ok(*enabled),
        None | Some(Value::Nil) => Ok(false),
        Some(other) => Err(XmlRpcError::Type(format!(
            "{exporter}.enabled: expected boolean, got {}",
            other.type_name()
        ))),
    }
}
