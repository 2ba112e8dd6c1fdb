//! In-memory Uyuni API used by unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use uyuni_sd_xmlrpc::{CallFuture, Transport, Value, XmlRpcError};

pub(crate) const TOKEN: &str = "5cd2bd1c0f6a4e09";

type Handler = Box<dyn Fn(&[Value]) -> Result<Value, XmlRpcError> + Send + Sync>;

/// A system served by [`MockRpc::with_systems`].
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSystem {
    pub id: i64,
    pub name: String,
    pub hostname: String,
    pub entitlements: Vec<String>,
    pub fqdns: Vec<String>,
    pub exporters: Vec<(&'static str, bool)>,
    pub fail_details: bool,
    pub fail_fqdns: bool,
    pub fail_formulas: bool,
}

impl FakeSystem {
    pub fn new(id: i64, hostname: &str) -> Self {
        Self {
            id,
            name: hostname.to_string(),
            hostname: hostname.to_string(),
            ..Default::default()
        }
    }

    pub fn entitlements(mut self, entitlements: &[&str]) -> Self {
        self.entitlements = entitlements.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn fqdns(mut self, fqdns: &[&str]) -> Self {
        self.fqdns = fqdns.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn exporter(mut self, name: &'static str, enabled: bool) -> Self {
        self.exporters.push((name, enabled));
        self
    }
}

/// Scripted [`Transport`] keyed by method name.
pub(crate) struct MockRpc {
    handlers: HashMap<&'static str, Handler>,
    hang: HashSet<&'static str>,
    delays: Vec<(&'static str, i64, Duration)>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

#[derive(Debug, Default, Clone, Copy)]
struct InFlight {
    current: usize,
    peak: usize,
}

/// Counts one call as in flight until dropped.
struct InFlightGuard<'a> {
    rpc: &'a MockRpc,
    method: &'a str,
}

impl<'a> InFlightGuard<'a> {
    fn enter(rpc: &'a MockRpc, method: &'a str) -> Self {
        let mut counters = rpc.in_flight.lock().unwrap();
        let entry = counters.entry(method.to_string()).or_default();
        entry.current += 1;
        entry.peak = entry.peak.max(entry.current);
        Self { rpc, method }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.rpc.in_flight.lock().unwrap().get_mut(self.method) {
            entry.current -= 1;
        }
    }
}

fn not_found(message: &str) -> XmlRpcError {
    XmlRpcError::Fault {
        code: -210,
        message: message.to_string(),
    }
}

fn struct_of<const N: usize>(members: [(&str, Value); N]) -> Value {
    Value::Struct(
        members
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn system_id(params: &[Value]) -> Result<i64, XmlRpcError> {
    match params.get(1) {
        Some(Value::Int(id)) => Ok(*id),
        _ => Err(not_found("missing system id")),
    }
}

fn check_token(params: &[Value]) -> Result<(), XmlRpcError> {
    match params.first() {
        Some(Value::String(t)) if t == TOKEN => Ok(()),
        _ => Err(XmlRpcError::Fault {
            code: 2950,
            message: "Could not find session".into(),
        }),
    }
}

impl MockRpc {
    /// A server that only knows `auth.login` and `auth.logout`.
    pub fn new() -> Self {
        let mut rpc = Self {
            handlers: HashMap::new(),
            hang: HashSet::new(),
            delays: Vec::new(),
            calls: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashMap::new()),
        };
        rpc.handlers.insert(
            "auth.login",
            Box::new(|params| match (params.first(), params.get(1)) {
                (Some(Value::String(u)), Some(Value::String(p))) if u == "admin" && p == "secret" => {
                    Ok(Value::from(TOKEN))
                }
                _ => Err(XmlRpcError::Fault {
                    code: 2950,
                    message: "Either the password or username is incorrect.".into(),
                }),
            }),
        );
        rpc.handlers.insert(
            "auth.logout",
            Box::new(|params| check_token(params).map(|_| Value::Int(1))),
        );
        rpc
    }

    /// A server serving the given systems, in order.
    pub fn with_systems(systems: Vec<FakeSystem>) -> Self {
        let listing = systems.clone();
        let details = systems.clone();
        let fqdns = systems.clone();
        let formulas = systems;

        Self::new()
            .on("system.listSystems", move |params| {
                check_token(params)?;
                Ok(Value::Array(
                    listing
                        .iter()
                        .map(|s| {
                            struct_of([
                                ("id", Value::Int(s.id)),
                                ("name", Value::from(s.name.as_str())),
                            ])
                        })
                        .collect(),
                ))
            })
            .on("system.getDetails", move |params| {
                check_token(params)?;
                let id = system_id(params)?;
                let sys = details
                    .iter()
                    .find(|s| s.id == id && !s.fail_details)
                    .ok_or_else(|| not_found("No such system"))?;
                Ok(struct_of([
                    ("id", Value::Int(sys.id)),
                    ("hostname", Value::from(sys.hostname.as_str())),
                    ("addon_entitlements", Value::from(sys.entitlements.clone())),
                    ("base_entitlement", Value::from("salt_entitled")),
                ]))
            })
            .on("system.listFqdns", move |params| {
                check_token(params)?;
                let id = system_id(params)?;
                let sys = fqdns
                    .iter()
                    .find(|s| s.id == id && !s.fail_fqdns)
                    .ok_or_else(|| not_found("No such system"))?;
                Ok(Value::from(sys.fqdns.clone()))
            })
            .on("formula.getSystemFormulaData", move |params| {
                check_token(params)?;
                let id = system_id(params)?;
                let formula = params.get(2).and_then(Value::as_str).unwrap_or_default();
                let sys = formulas
                    .iter()
                    .find(|s| s.id == id && !s.fail_formulas)
                    .ok_or_else(|| not_found("No such system"))?;
                let members = sys
                    .exporters
                    .iter()
                    .filter(|(name, _)| *name == formula)
                    .map(|(name, enabled)| {
                        (
                            name.to_string(),
                            struct_of([("enabled", Value::Bool(*enabled))]),
                        )
                    })
                    .collect::<BTreeMap<_, _>>();
                Ok(Value::Struct(members))
            })
    }

    /// Installs a handler for `method`.
    pub fn on(
        mut self,
        method: &'static str,
        handler: impl Fn(&[Value]) -> Result<Value, XmlRpcError> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(method, Box::new(handler));
        self
    }

    /// Makes every call to `method` wait forever.
    pub fn hang_on(mut self, method: &'static str) -> Self {
        self.hang.insert(method);
        self
    }

    /// Delays the answer to `method` for `system_id` by `delay`.
    pub fn delay_for(mut self, method: &'static str, system_id: i64, delay: Duration) -> Self {
        self.delays.push((method, system_id, delay));
        self
    }

    /// Highest number of concurrently pending calls to `method`.
    pub fn peak_in_flight(&self, method: &str) -> usize {
        self.in_flight
            .lock()
            .unwrap()
            .get(method)
            .map_or(0, |entry| entry.peak)
    }

    /// Number of calls made to `method`.
    pub fn calls_to(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    /// Parameters of every call made to `method`, in call order.
    pub fn params_of(&self, method: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

impl Transport for MockRpc {
    fn call<'a>(&'a self, method: &'a str, params: Vec<Value>) -> CallFuture<'a> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));

        if self.hang.contains(method) {
            return Box::pin(std::future::pending());
        }

        let result = match self.handlers.get(method) {
            Some(handler) => handler(&params),
            None => Err(XmlRpcError::Fault {
                code: -1,
                message: format!("Could not find method: {method}"),
            }),
        };
        let delay = system_id(&params).ok().and_then(|id| {
            self.delays
                .iter()
                .find(|(m, sys, _)| *m == method && *sys == id)
                .map(|(_, _, delay)| *delay)
        });

        Box::pin(async move {
            let _guard = InFlightGuard::enter(self, method);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }

    fn endpoint(&self) -> &str {
        "http://mock.uyuni.test/rpc/api"
    }
}
