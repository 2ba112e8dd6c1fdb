//! System inventory lookups.

use uyuni_sd_xmlrpc::{FromValue, Transport, Value, XmlRpcError};

use crate::DiscoveryError;
use crate::session::Session;
use crate::types::{SystemDetail, SystemRef};

impl FromValue for SystemRef {
    fn from_value(mut value: Value) -> Result<Self, XmlRpcError> {
        Ok(SystemRef {
            id: value.take_member("id")?,
            name: value.take_optional("name")?.unwrap_or_default(),
        })
    }
}

impl FromValue for SystemDetail {
    fn from_value(mut value: Value) -> Result<Self, XmlRpcError> {
        let id: i64 = value.take_member("id")?;
        let hostname: String = value.take_optional("hostname")?.unwrap_or_default();
        let entitlements: Vec<String> = value
            .take_optional("addon_entitlements")?
            .unwrap_or_default();
        Ok(SystemDetail::new(id, hostname, entitlements))
    }
}

/// Lists every system visible to the session's user. An empty list is valid.
pub async fn list_systems(
    rpc: &dyn Transport,
    session: &Session,
) -> Result<Vec<SystemRef>, DiscoveryError> {
    const METHOD: &str = "system.listSystems";
    let value = rpc
        .call(METHOD, vec![session.token_param()])
        .await
        .map_err(DiscoveryError::remote(METHOD))?;
    Vec::from_value(value).map_err(DiscoveryError::remote(METHOD))
}

/// Returns hostname and addon entitlements of one system.
pub async fn get_details(
    rpc: &dyn Transport,
    session: &Session,
    system_id: i64,
) -> Result<SystemDetail, DiscoveryError> {
    const METHOD: &str = "system.getDetails";
    let value = rpc
        .call(METHOD, vec![session.token_param(), Value::Int(system_id)])
        .await
        .map_err(DiscoveryError::remote(METHOD))?;
    let detail = SystemDetail::from_value(value).map_err(DiscoveryError::remote(METHOD))?;
    if detail.id != system_id {
        return Err(DiscoveryError::RemoteCall {
            method: METHOD,
            source: XmlRpcError::Type(format!(
                "asked for system {system_id}, got {}",
                detail.id
            )),
        });
    }
    Ok(detail)
}

/// Returns the network names registered for one system.
pub async fn list_fqdns(
    rpc: &dyn Transport,
    session: &Session,
    system_id: i64,
) -> Result<Vec<String>, DiscoveryError> {
    const METHOD: &str = "system.listFqdns";
    let value = rpc
        .call(METHOD, vec![session.token_param(), Value::Int(system_id)])
        .await
        .map_err(DiscoveryError::remote(METHOD))?;
    Vec::from_value(value).map_err(DiscoveryError::remote(METHOD))
}
