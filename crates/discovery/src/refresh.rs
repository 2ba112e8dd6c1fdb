//! Refresh cycle orchestration.
//!
//! One call to [`Discovery::refresh`] is one complete cycle:
//!
//! ```text
//! Idle → Authenticating → Enumerating → Resolving → Building → Done
//!              └──────────────┴────────────┴──→ Failed
//! ```
//!
//! Login and logout are barriers around the per-system lookups, which run
//! concurrently up to `max_concurrency`. The session is released on every path
//! after a successful login, including cancellation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uyuni_sd_xmlrpc::{Client, Transport};

use crate::config::SdConfig;
use crate::error::DiscoveryError;
use crate::session::{self, Session};
use crate::types::{ResolvedSystem, SOURCE_NAME, SystemRef, TargetGroup};
use crate::{builder, formula, inventory};

/// Phase of a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Authenticating,
    Enumerating,
    Resolving,
    Building,
    Done,
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Idle => "idle",
            CycleState::Authenticating => "authenticating",
            CycleState::Enumerating => "enumerating",
            CycleState::Resolving => "resolving",
            CycleState::Building => "building",
            CycleState::Done => "done",
            CycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks and logs state transitions of one cycle.
struct Cycle {
    state: CycleState,
}

impl Cycle {
    fn new() -> Self {
        Self {
            state: CycleState::Idle,
        }
    }

    fn advance(&mut self, next: CycleState) {
        debug!(from = %self.state, to = %next, "refresh cycle");
        self.state = next;
    }
}

/// Uyuni service discovery.
///
/// Holds only immutable configuration and the transport; every cycle starts
/// from scratch.
pub struct Discovery {
    config: SdConfig,
    rpc: Arc<dyn Transport>,
}

impl Discovery {
    /// Creates a discovery talking XML-RPC over HTTP to the configured host.
    pub fn new(config: SdConfig) -> Result<Self, DiscoveryError> {
        config.validate()?;
        let client = Client::new(config.api_url(), config.request_timeout)
            .map_err(|e| DiscoveryError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_transport(config, Arc::new(client)))
    }

    /// Creates a discovery over an arbitrary transport.
    pub fn with_transport(config: SdConfig, rpc: Arc<dyn Transport>) -> Self {
        Self { config, rpc }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SdConfig {
        &self.config
    }

    /// Returns the source name attached to produced target groups.
    pub fn source(&self) -> String {
        format!("{SOURCE_NAME}:{}", self.rpc.endpoint())
    }

    /// Runs one refresh cycle.
    ///
    /// Authentication failures, a failed system listing and cancellation fail
    /// the whole cycle. Systems whose lookups fail are logged and left out;
    /// the cycle still succeeds with the remaining targets.
    pub async fn refresh(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<TargetGroup>, DiscoveryError> {
        let rpc = &*self.rpc;
        let timeout = self.config.request_timeout;
        let mut cycle = Cycle::new();

        cycle.advance(CycleState::Authenticating);
        let login = session::acquire(rpc, &self.config.username, &self.config.password, timeout);
        let session = match until_cancelled(cancel, login).await.and_then(|r| r) {
            Ok(session) => session,
            Err(e) => {
                cycle.advance(CycleState::Failed);
                return Err(e);
            }
        };

        let resolved = self.collect(&session, cancel, &mut cycle).await;
        session::release(rpc, session, timeout).await;

        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                cycle.advance(CycleState::Failed);
                return Err(e);
            }
        };

        cycle.advance(CycleState::Building);
        let group = builder::build(self.source(), &resolved);
        cycle.advance(CycleState::Done);

        info!(
            systems = resolved.len(),
            targets = group.targets.len(),
            "refresh complete"
        );
        Ok(vec![group])
    }

    /// Enumerates and resolves all systems within an open session.
    async fn collect(
        &self,
        session: &Session,
        cancel: &CancellationToken,
        cycle: &mut Cycle,
    ) -> Result<Vec<ResolvedSystem>, DiscoveryError> {
        cycle.advance(CycleState::Enumerating);
        let systems = until_cancelled(cancel, inventory::list_systems(&*self.rpc, session))
            .await
            .and_then(|r| r)?;
        debug!(count = systems.len(), "systems listed");

        cycle.advance(CycleState::Resolving);
        until_cancelled(cancel, self.resolve_all(session, systems)).await
    }

    /// Resolves all systems concurrently, dropping those that fail.
    ///
    /// `buffered` yields results in input order, which keeps the output
    /// deterministic regardless of completion order.
    async fn resolve_all(&self, session: &Session, systems: Vec<SystemRef>) -> Vec<ResolvedSystem> {
        let total = systems.len();
        let results: Vec<(i64, Result<ResolvedSystem, DiscoveryError>)> = stream::iter(systems)
            .map(|system| async move {
                let id = system.id;
                (id, self.resolve_system(session, system).await)
            })
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut resolved = Vec::with_capacity(total);
        for (system_id, result) in results {
            match result {
                Ok(system) => resolved.push(system),
                Err(source) => {
                    let skipped = DiscoveryError::PartialData {
                        system_id,
                        reason: source.to_string(),
                    };
                    warn!(system_id, error = %skipped, "excluding system from targets");
                }
            }
        }

        let failed = total - resolved.len();
        if failed > 0 {
            warn!(failed, total, "some systems could not be resolved");
        }
        resolved
    }

    async fn resolve_system(
        &self,
        session: &Session,
        system: SystemRef,
    ) -> Result<ResolvedSystem, DiscoveryError> {
        let rpc = &*self.rpc;
        let id = system.id;

        let (detail, fqdns, formulas) = tokio::try_join!(
            inventory::get_details(rpc, session, id),
            inventory::list_fqdns(rpc, session, id),
            formula::resolve_exporters(rpc, session, id),
        )?;

        debug!(system_id = id, name = %system.name, "system resolved");
        Ok(ResolvedSystem {
            detail,
            formulas,
            fqdns,
        })
    }
}

/// Runs `fut` unless `cancel` fires first.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, DiscoveryError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DiscoveryError::Cancelled),
        value = fut => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::*;
    use crate::testing::{FakeSystem, MockRpc};
    use crate::types::{LABEL_ENTITLEMENTS, LABEL_EXPORTER, Target};
    use uyuni_sd_xmlrpc::XmlRpcError;

    fn config() -> SdConfig {
        SdConfig {
            host: "mock.uyuni.test".into(),
            username: "admin".into(),
            password: "secret".into(),
            ..SdConfig::default()
        }
    }

    fn discovery(rpc: &Arc<MockRpc>) -> Discovery {
        Discovery::with_transport(config(), rpc.clone())
    }

    fn fleet() -> Vec<FakeSystem> {
        vec![
            FakeSystem::new(42, "db1.example.com")
                .entitlements(&["monitoring_entitled", "foo"])
                .exporter("postgres_exporter", true),
            FakeSystem::new(43, "web1")
                .fqdns(&["web1.example.com"])
                .exporter("node_exporter", true)
                .exporter("postgres_exporter", false),
            FakeSystem::new(44, "idle.example.com").entitlements(&["monitoring_entitled"]),
        ]
    }

    #[tokio::test]
    async fn refresh_builds_expected_targets() {
        let rpc = Arc::new(MockRpc::with_systems(fleet()));
        let groups = discovery(&rpc)
            .refresh(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].source, "uyuni:http://mock.uyuni.test/rpc/api");
        assert_eq!(
            groups[0].targets,
            vec![
                Target {
                    address: "db1.example.com:9187".into(),
                    labels: BTreeMap::from([
                        (LABEL_ENTITLEMENTS.into(), "monitoring_entitled,foo".into()),
                        (LABEL_EXPORTER.into(), "postgres_exporter".into()),
                    ]),
                },
                Target {
                    address: "web1.example.com:9100".into(),
                    labels: BTreeMap::from([(LABEL_EXPORTER.into(), "node_exporter".into())]),
                },
            ]
        );
        assert_eq!(rpc.calls_to("auth.login"), 1);
        assert_eq!(rpc.calls_to("auth.logout"), 1);
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        let rpc = Arc::new(MockRpc::with_systems(fleet()));
        let discovery = discovery(&rpc);
        let cancel = CancellationToken::new();

        let first = discovery.refresh(&cancel).await.unwrap();
        let second = discovery.refresh(&cancel).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(rpc.calls_to("auth.login"), 2);
        assert_eq!(rpc.calls_to("auth.logout"), 2);
    }

    #[tokio::test]
    async fn failed_systems_are_excluded() {
        let mut systems = fleet();
        systems[0].fail_details = true;
        systems.push(FakeSystem {
            fail_fqdns: true,
            ..FakeSystem::new(45, "nofqdn").exporter("node_exporter", true)
        });
        systems.push(FakeSystem {
            fail_formulas: true,
            ..FakeSystem::new(46, "noformula").exporter("node_exporter", true)
        });
        let rpc = Arc::new(MockRpc::with_systems(systems));

        let groups = discovery(&rpc)
            .refresh(&CancellationToken::new())
            .await
            .unwrap();
        let addresses: Vec<&str> = groups[0]
            .targets
            .iter()
            .map(|t| t.address.as_str())
            .collect();
        assert_eq!(addresses, vec!["web1.example.com:9100"]);
    }

    #[tokio::test]
    async fn empty_inventory_yields_empty_group() {
        let rpc = Arc::new(MockRpc::with_systems(vec![]));
        let groups = discovery(&rpc)
            .refresh(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].targets.is_empty());
    }

    #[tokio::test]
    async fn auth_failure_aborts_cycle() {
        let rpc = Arc::new(MockRpc::with_systems(fleet()));
        let mut cfg = config();
        cfg.password = "wrong".into();
        let discovery = Discovery::with_transport(cfg, rpc.clone());

        let err = discovery
            .refresh(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Auth(_)), "{err:?}");
        assert_eq!(rpc.calls_to("system.listSystems"), 0);
        assert_eq!(rpc.calls_to("auth.logout"), 0);
    }

    #[tokio::test]
    async fn unreachable_host_is_auth_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut cfg = config();
        cfg.host = format!("127.0.0.1:{port}");
        cfg.request_timeout = Duration::from_secs(2);
        let discovery = Discovery::new(cfg).unwrap();

        let err = discovery
            .refresh(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Auth(_)), "{err:?}");
    }

    #[tokio::test]
    async fn list_failure_fails_cycle_but_releases_session() {
        let rpc = Arc::new(MockRpc::new().on("system.listSystems", |_| {
            Err(XmlRpcError::Status {
                status: 500,
                body: "internal error".into(),
            })
        }));
        let err = discovery(&rpc)
            .refresh(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::RemoteCall {
                method: "system.listSystems",
                ..
            }
        ));
        assert_eq!(rpc.calls_to("auth.logout"), 1);
    }

    #[tokio::test]
    async fn logout_failure_is_not_fatal() {
        let rpc = Arc::new(MockRpc::with_systems(fleet()).on("auth.logout", |_| {
            Err(XmlRpcError::Fault {
                code: 2950,
                message: "Could not find session".into(),
            })
        }));
        let groups = discovery(&rpc)
            .refresh(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(groups[0].targets.len(), 2);
        assert_eq!(rpc.calls_to("auth.logout"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_cycle_releases_session() {
        let rpc = Arc::new(MockRpc::with_systems(fleet()).hang_on("system.getDetails"));
        let discovery = discovery(&rpc);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let err = discovery.refresh(&cancel).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Cancelled), "{err:?}");
        assert!(started.elapsed() < discovery.config().request_timeout);
        assert_eq!(rpc.calls_to("auth.logout"), 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_skips_login() {
        let rpc = Arc::new(MockRpc::with_systems(fleet()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = discovery(&rpc).refresh(&cancel).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Cancelled));
        assert_eq!(rpc.calls_to("auth.login"), 0);
        assert_eq!(rpc.calls_to("auth.logout"), 0);
    }

    #[tokio::test]
    async fn serial_resolution_keeps_order() {
        let rpc = Arc::new(MockRpc::with_systems(fleet()));
        let mut cfg = config();
        cfg.max_concurrency = 1;
        let serial = Discovery::with_transport(cfg, rpc.clone())
            .refresh(&CancellationToken::new())
            .await
            .unwrap();
        let parallel = discovery(&rpc)
            .refresh(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(serial, parallel);
    }

    #[tokio::test(start_paused = true)]
    async fn output_order_ignores_completion_order() {
        let systems: Vec<FakeSystem> = (1..=4)
            .map(|id| FakeSystem::new(id, &format!("host{id}")).exporter("node_exporter", true))
            .collect();
        let mut mock = MockRpc::with_systems(systems);
        for (id, millis) in [(1, 400), (2, 300), (3, 200), (4, 100)] {
            mock = mock.delay_for("system.getDetails", id, Duration::from_millis(millis));
        }
        let rpc = Arc::new(mock);

        let groups = discovery(&rpc)
            .refresh(&CancellationToken::new())
            .await
            .unwrap();
        let addresses: Vec<&str> = groups[0]
            .targets
            .iter()
            .map(|t| t.address.as_str())
            .collect();
        assert_eq!(
            addresses,
            vec!["host1:9100", "host2:9100", "host3:9100", "host4:9100"]
        );
        assert_eq!(rpc.peak_in_flight("system.getDetails"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_respects_max_concurrency() {
        let systems: Vec<FakeSystem> = (1..=6)
            .map(|id| FakeSystem::new(id, &format!("host{id}")).exporter("node_exporter", true))
            .collect();
        let mut mock = MockRpc::with_systems(systems);
        for id in 1..=6 {
            mock = mock.delay_for("system.getDetails", id, Duration::from_millis(50));
        }
        let rpc = Arc::new(mock);
        let mut cfg = config();
        cfg.max_concurrency = 2;

        let groups = Discovery::with_transport(cfg, rpc.clone())
            .refresh(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(groups[0].targets.len(), 6);
        assert_eq!(rpc.calls_to("system.getDetails"), 6);
        assert_eq!(rpc.peak_in_flight("system.getDetails"), 2);
    }

    #[test]
    fn discovery_new_validates_config() {
        let err = Discovery::new(SdConfig::default()).err().unwrap();
        assert!(matches!(err, DiscoveryError::Config(_)));
    }

    #[test]
    fn cycle_state_display() {
        assert_eq!(CycleState::Authenticating.to_string(), "authenticating");
        assert_eq!(CycleState::Failed.to_string(), "failed");
    }
}
