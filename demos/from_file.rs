//! Loads `demos/station.xml` (or the file given as the first argument) and
//! ticks it every 100ms until it finishes.
//!
//! ```text
//! RUST_LOG=debug cargo run --example from_file -- demos/station.xml demos/config.json
//! ```

use ::behavior_tree_xml::{
    async_trait, boxify, node_base, BehaviorNode, BehaviorTree, Context, NodeBase, NodeStatus,
    PropertySpec, PropertyValue, Registry, Symbol,
};
use std::{
    fs,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing_subscriber::EnvFilter;

fn module_name(key: Symbol, value: PropertyValue, target: &mut String) {
    if let ("ModuleName", PropertyValue::String(v)) = (key.as_str(), value) {
        *target = v;
    }
}

#[derive(Default)]
struct CheckReadyState {
    base: NodeBase,
    module_name: String,
}

#[async_trait]
impl BehaviorNode for CheckReadyState {
    node_base!();

    fn provided_properties(&self) -> Vec<PropertySpec> {
        vec![PropertySpec::string("ModuleName")]
    }

    fn set_property(&mut self, key: Symbol, value: PropertyValue) {
        module_name(key, value, &mut self.module_name);
    }

    async fn execute(&self) -> NodeStatus {
        let ready = self
            .context()
            .get_as::<bool>(&format!("module_{}_ready", self.module_name));
        tracing::info!(module = %self.module_name, ready, "checked ready state");
        if ready {
            NodeStatus::Success
        } else {
            NodeStatus::Failure
        }
    }
}

/// Fails the first two attempts, like a module that needs a moment to boot.
#[derive(Default)]
struct PowerUp {
    base: NodeBase,
    module_name: String,
    attempts: AtomicUsize,
}

#[async_trait]
impl BehaviorNode for PowerUp {
    node_base!();

    fn provided_properties(&self) -> Vec<PropertySpec> {
        vec![PropertySpec::string("ModuleName")]
    }

    fn set_property(&mut self, key: Symbol, value: PropertyValue) {
        module_name(key, value, &mut self.module_name);
    }

    async fn execute(&self) -> NodeStatus {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(module = %self.module_name, attempt, "powering up");
        if attempt < 3 {
            return NodeStatus::Failure;
        }
        self.context()
            .set(format!("module_{}_ready", self.module_name), true);
        NodeStatus::Success
    }
}

#[derive(Default)]
struct Screw {
    base: NodeBase,
    module_name: String,
    torque_nm: f64,
}

#[async_trait]
impl BehaviorNode for Screw {
    node_base!();

    fn provided_properties(&self) -> Vec<PropertySpec> {
        vec![
            PropertySpec::string("ModuleName"),
            PropertySpec::double("TorqueNm"),
        ]
    }

    fn set_property(&mut self, key: Symbol, value: PropertyValue) {
        match (key.as_str(), value) {
            ("TorqueNm", PropertyValue::Double(v)) => self.torque_nm = v,
            (_, value) => module_name(key, value, &mut self.module_name),
        }
    }

    async fn execute(&self) -> NodeStatus {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let ctx = self.context();
        let screwed = ctx.get_as::<i32>("Screwed") + 1;
        ctx.set("Screwed", screwed);
        tracing::info!(
            module = %self.module_name,
            torque_nm = self.torque_nm,
            screwed,
            endpoint = %ctx.get_as::<String>("Endpoint"),
            "screw tightened"
        );
        NodeStatus::Success
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let tree_path = args.next().unwrap_or_else(|| "demos/station.xml".to_owned());
    let config_path = args.next().unwrap_or_else(|| "demos/config.json".to_owned());

    let config: serde_json::Value = serde_json::from_str(&fs::read_to_string(&config_path)?)?;
    let context = Arc::new(Context::default().with_config(config));
    context.set("Machine", "ScrewingStation".to_owned());

    let mut registry = Registry::default();
    registry.register("CheckReadyState", boxify(CheckReadyState::default));
    registry.register("PowerUp", boxify(PowerUp::default));
    registry.register("Screw", boxify(Screw::default));

    let mut tree = BehaviorTree::from_file(&tree_path, &registry, context)?;
    tracing::info!(
        agent = tree.context().agent_id(),
        role = tree.context().agent_role(),
        root = tree.root().name(),
        "tree loaded"
    );

    let mut interval = tokio::time::interval(Duration::from_millis(100));
    let status = loop {
        interval.tick().await;
        let status = tree.tick().await;
        if status.is_terminal() {
            break status;
        }
    };

    tracing::info!(%status, ticks = tree.ticks(), "tree finished");
    Ok(())
}
