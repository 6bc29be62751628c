use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    property::parse_bool, BehaviorNode, NodeBase, NodeStatus, PropertySpec, PropertyValue, Symbol,
};

/// Reports `Running` until `DelayMs` has passed since its first tick.
pub struct WaitNode {
    base: NodeBase,
    pub delay_ms: i32,
    started: Mutex<Option<Instant>>,
}

impl Default for WaitNode {
    fn default() -> Self {
        Self {
            base: NodeBase::new("Wait"),
            delay_ms: 1000,
            started: Mutex::new(None),
        }
    }
}

impl WaitNode {
    pub fn new(delay_ms: i32) -> Self {
        Self {
            delay_ms,
            ..Self::default()
        }
    }

    fn clear(&self) {
        *self.started.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[async_trait]
impl BehaviorNode for WaitNode {
    crate::node_base!();

    fn provided_properties(&self) -> Vec<PropertySpec> {
        vec![PropertySpec::int("DelayMs")]
    }

    fn set_property(&mut self, key: Symbol, value: PropertyValue) {
        if let ("DelayMs", PropertyValue::Int(v)) = (key.as_str(), value) {
            self.delay_ms = v;
        }
    }

    async fn execute(&self) -> NodeStatus {
        let delay = Duration::from_millis(u64::try_from(self.delay_ms).unwrap_or(0));
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(start) = *started else {
            *started = Some(Instant::now());
            return NodeStatus::Running;
        };
        if start.elapsed() >= delay {
            *started = None;
            NodeStatus::Success
        } else {
            NodeStatus::Running
        }
    }

    async fn abort(&self) {
        self.clear();
    }

    async fn reset(&self) {
        self.clear();
    }
}

/// Writes `Value`, converted to `ValueType`, under `Key` in the context.
pub struct SetBlackboardValueNode {
    base: NodeBase,
    pub key: String,
    pub value: String,
    pub value_type: String,
}

impl Default for SetBlackboardValueNode {
    fn default() -> Self {
        Self {
            base: NodeBase::new("SetBlackboardValue"),
            key: String::new(),
            value: String::new(),
            value_type: "string".to_owned(),
        }
    }
}

impl SetBlackboardValueNode {
    pub fn new(key: impl Into<String>, value: impl Into<String>, value_type: &str) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            value_type: value_type.to_owned(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl BehaviorNode for SetBlackboardValueNode {
    crate::node_base!();

    fn provided_properties(&self) -> Vec<PropertySpec> {
        vec![
            PropertySpec::string("Key"),
            PropertySpec::string("Value"),
            PropertySpec::string("ValueType"),
        ]
    }

    fn set_property(&mut self, key: Symbol, value: PropertyValue) {
        let PropertyValue::String(v) = value else {
            return;
        };
        match key.as_str() {
            "Key" => self.key = v,
            "Value" => self.value = v,
            "ValueType" => self.value_type = v,
            _ => (),
        }
    }

    async fn execute(&self) -> NodeStatus {
        if self.key.is_empty() {
            warn!(node = %self.name(), "no key to set");
            return NodeStatus::Failure;
        }

        let ctx = self.context();
        let text = ctx.resolve_placeholders(&self.value);
        let key = self.key.as_str();

        match self.value_type.to_ascii_lowercase().as_str() {
            "string" => ctx.set(key, text.clone()),
            "bool" => match parse_bool(&text) {
                Some(b) => ctx.set(key, b),
                None => return self.conversion_failed(&text),
            },
            "int" => match text.trim().parse::<i32>() {
                Ok(i) => ctx.set(key, i),
                Err(_) => return self.conversion_failed(&text),
            },
            "double" => match text.trim().parse::<f64>() {
                Ok(f) => ctx.set(key, f),
                Err(_) => return self.conversion_failed(&text),
            },
            other => {
                warn!(node = %self.name(), value_type = other, "unknown value type");
                return NodeStatus::Failure;
            }
        }

        debug!(node = %self.name(), key, value = %text, "blackboard value set");
        NodeStatus::Success
    }
}

impl SetBlackboardValueNode {
    fn conversion_failed(&self, text: &str) -> NodeStatus {
        warn!(
            node = %self.name(),
            key = %self.key,
            value_type = %self.value_type,
            value = text,
            "could not convert value"
        );
        NodeStatus::Failure
    }
}

pub struct AlwaysSuccessNode {
    base: NodeBase,
}

impl Default for AlwaysSuccessNode {
    fn default() -> Self {
        Self {
            base: NodeBase::new("AlwaysSuccess"),
        }
    }
}

#[async_trait]
impl BehaviorNode for AlwaysSuccessNode {
    crate::node_base!();

    async fn execute(&self) -> NodeStatus {
        NodeStatus::Success
    }
}

pub struct ForceFailureNode {
    base: NodeBase,
}

impl Default for ForceFailureNode {
    fn default() -> Self {
        Self {
            base: NodeBase::new("ForceFailure"),
        }
    }
}

#[async_trait]
impl BehaviorNode for ForceFailureNode {
    crate::node_base!();

    async fn execute(&self) -> NodeStatus {
        NodeStatus::Failure
    }
}
