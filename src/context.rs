use crate::{property::parse_bool, Symbol};
use serde::Deserialize;
use serde_json::Value;
use std::{
    any::{type_name, Any},
    collections::HashMap,
    fmt::{self, Debug, Formatter},
    str::FromStr,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::{debug, warn};

/// A single blackboard value. Cloning the entry only bumps a reference count,
/// so nodes can hold on to values without keeping the blackboard locked.
pub type BlackboardEntry = Arc<dyn Any + Send + Sync>;

/// Keys are owned strings, so keys built at runtime are freed together with
/// the blackboard.
pub type Blackboard = HashMap<String, BlackboardEntry>;

const CONFIG_KEY: &str = "config";

const CONFIG_PREFIX: &str = "config.";

/// The shared state of one tree instance.
///
/// Every node of a tree holds an `Arc<Context>` to the same instance. Values
/// are written through `&self`; the internal lock is held only for the
/// duration of a single read or write, never across an `.await`.
pub struct Context {
    blackboard: RwLock<Blackboard>,
    agent_id: String,
    agent_role: String,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Blackboard::new())
    }
}

impl Debug for Context {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        fmt.debug_struct("Context")
            .field("agent_id", &self.agent_id)
            .field("agent_role", &self.agent_role)
            .field("keys", &self.keys())
            .finish()
    }
}

#[derive(Deserialize)]
struct AgentSection {
    #[serde(rename = "AgentId", alias = "agentId", alias = "agent_id")]
    agent_id: Option<String>,
    #[serde(rename = "Role", alias = "role", alias = "AgentRole")]
    role: Option<String>,
}

impl Context {
    pub fn new(blackboard: Blackboard) -> Self {
        Self {
            blackboard: RwLock::new(blackboard),
            agent_id: "UnknownAgent".to_owned(),
            agent_role: "UnknownRole".to_owned(),
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>, agent_role: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self.agent_role = agent_role.into();
        self
    }

    /// Stores the configuration tree under `"config"` and picks up the agent
    /// identity from its `Agent` section, if present.
    pub fn with_config(mut self, config: Value) -> Self {
        if let Some(agent) = config.get("Agent") {
            match AgentSection::deserialize(agent) {
                Ok(section) => {
                    if let Some(id) = section.agent_id {
                        self.agent_id = id;
                    }
                    if let Some(role) = section.role {
                        self.agent_role = role;
                    }
                }
                Err(e) => warn!(error = %e, "ignoring malformed Agent section in config"),
            }
        }
        self.set(CONFIG_KEY, config);
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn agent_role(&self) -> &str {
        &self.agent_role
    }

    fn read(&self) -> RwLockReadGuard<'_, Blackboard> {
        self.blackboard.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Blackboard> {
        self.blackboard
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, val: T) {
        self.set_any(key, Arc::new(val));
    }

    pub fn set_any(&self, key: impl Into<String>, val: BlackboardEntry) {
        let key = key.into();
        debug!(key = %key, "context set");
        self.write().insert(key, val);
    }

    /// Untyped read.
    pub fn get_any(&self, key: &str) -> Option<BlackboardEntry> {
        self.read().get(key).cloned()
    }

    /// Typed read without any conversion.
    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        let entry = self.get_any(key)?;
        let value: &(dyn Any + Send + Sync) = entry.as_ref();
        value.downcast_ref::<T>().cloned()
    }

    /// Typed read with best-effort conversion. A missing key yields the
    /// default silently, a value that cannot be converted yields the default
    /// and a warning.
    pub fn get_as<T: FromBlackboard>(&self, key: &str) -> T {
        let Some(entry) = self.get_any(key) else {
            return T::default();
        };
        let value: &(dyn Any + Send + Sync) = entry.as_ref();
        if let Some(typed) = value.downcast_ref::<T>() {
            return typed.clone();
        }
        T::convert(value).unwrap_or_else(|| {
            warn!(key, ty = type_name::<T>(), "failed to convert context value");
            T::default()
        })
    }

    /// Reads a value of type `T`, parsing it from its string form if the
    /// stored value has another type.
    pub fn get_parse<T>(&self, key: &str) -> Option<T>
    where
        T: FromStr + Any + Clone,
    {
        let entry = self.get_any(key)?;
        let value: &(dyn Any + Send + Sync) = entry.as_ref();
        if let Some(typed) = value.downcast_ref::<T>() {
            return Some(typed.clone());
        }
        stringify(value)?.trim().parse().ok()
    }

    /// Reads a value in its string form, see [`stringify`].
    pub fn get_string(&self, key: &str) -> Option<String> {
        let entry = self.get_any(key)?;
        stringify(entry.as_ref())
    }

    pub fn has(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<BlackboardEntry> {
        self.write().remove(key)
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn config(&self) -> Option<Value> {
        self.get(CONFIG_KEY)
    }

    /// Walks the stored configuration along `path` (`Section.Key` or
    /// `Section.0.Key` for arrays) and stringifies the leaf.
    pub fn config_value(&self, path: &str) -> Option<String> {
        let entry = self.get_any(CONFIG_KEY)?;
        let value: &(dyn Any + Send + Sync) = entry.as_ref();
        let mut node = value.downcast_ref::<Value>()?;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            node = match node {
                Value::Object(map) => map.get(segment).or_else(|| {
                    map.iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(segment))
                        .map(|(_, v)| v)
                })?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        json_to_string(node)
    }

    /// Replaces `{token}` spans. A token is looked up as a key first, then as
    /// a `config.` path. Unresolved tokens are kept verbatim. Substituted text
    /// is not scanned again.
    pub fn resolve_placeholders(&self, input: &str) -> String {
        substitute(input, |token| {
            self.get_string(token).or_else(|| {
                token
                    .strip_prefix(CONFIG_PREFIX)
                    .and_then(|path| self.config_value(path))
            })
        })
    }

    /// Load-time variant of [`Context::resolve_placeholders`]: only direct
    /// key lookups, no configuration walk.
    pub fn insert_context_values(&self, input: &str) -> String {
        substitute(input, |token| self.get_string(token))
    }
}

fn substitute(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    if !input.contains('{') {
        return input.to_owned();
    }
    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|pos| open + pos) else {
            break;
        };
        result.push_str(&rest[..open]);
        match lookup(&rest[open + 1..close]) {
            Some(replacement) => result.push_str(&replacement),
            None => result.push_str(&rest[open..=close]),
        }
        rest = &rest[close + 1..];
    }
    result.push_str(rest);
    result
}

macro_rules! try_to_string {
    ($value:expr, $($ty:ty),*) => {
        $(
            if let Some(v) = $value.downcast_ref::<$ty>() {
                return Some(v.to_string());
            }
        )*
    };
}

/// String form of a blackboard value: strings as-is, numbers verbatim,
/// booleans as `True`/`False`, JSON scalars likewise and JSON containers as
/// compact JSON. Other types have no string form.
pub fn stringify(value: &(dyn Any + Send + Sync)) -> Option<String> {
    if let Some(b) = value.downcast_ref::<bool>() {
        return Some(bool_to_string(*b));
    }
    if let Some(json) = value.downcast_ref::<Value>() {
        return json_to_string(json);
    }
    try_to_string!(
        value, String, &'static str, Symbol, i32, i64, u32, u64, usize, isize, f32, f64
    );
    None
}

fn bool_to_string(b: bool) -> String {
    let s = if b { "True" } else { "False" };
    s.to_owned()
}

fn json_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(bool_to_string(*b)),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Types that [`Context::get_as`] can convert stored values into.
pub trait FromBlackboard: Any + Clone + Default {
    fn convert(value: &(dyn Any + Send + Sync)) -> Option<Self>;
}

impl FromBlackboard for String {
    fn convert(value: &(dyn Any + Send + Sync)) -> Option<Self> {
        stringify(value)
    }
}

impl FromBlackboard for bool {
    fn convert(value: &(dyn Any + Send + Sync)) -> Option<Self> {
        let text = stringify(value)?;
        parse_bool(&text).or_else(|| text.trim().parse::<f64>().ok().map(|n| n != 0.))
    }
}

macro_rules! impl_from_blackboard {
    ($($ty:ty),*) => {
        $(
            impl FromBlackboard for $ty {
                fn convert(value: &(dyn Any + Send + Sync)) -> Option<Self> {
                    stringify(value)?.trim().parse().ok()
                }
            }
        )*
    };
}

impl_from_blackboard!(i32, i64, u32, u64, usize, f32, f64);
