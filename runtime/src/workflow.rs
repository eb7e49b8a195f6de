//! # Workflow: Executable Node Graph
//!
//! A `Workflow` is the runtime view of a resumable state machine: named nodes,
//! one outgoing rule per node, an entry point and a set of halt points. The
//! builder validates the graph once; the [`Engine`](crate::engine::Engine)
//! walks it one node at a time.
//!
//! * **Workflow runs, Schematic shows**: every workflow carries the
//!   [`Schematic`] extracted at build time.
//! * Routing is a pure function of the state a node returned.

use escrowflow_core::bus::Bus;
use escrowflow_core::outcome::Outcome;
use escrowflow_core::schematic::{Edge, EdgeType, Node, NodeKind, Schematic};
use escrowflow_core::state::WorkflowState;
use escrowflow_core::telemetry::Traced;
use escrowflow_core::transition::Transition;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for async boxed futures used in node execution.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased node body. Takes the state, the shared resources and the
/// attempt's Bus, and returns the node's `Outcome`.
pub type Executor<S, R, E> =
    Arc<dyn for<'a> Fn(S, &'a R, &'a mut Bus) -> BoxFuture<'a, Outcome<S, E>> + Send + Sync>;

/// Routing key function for conditional edges.
pub type Router<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Where an edge leads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Node(String),
    /// Terminal end carrying its label (`settled`, `direct`, ...).
    End(String),
}

impl Target {
    pub fn node(id: impl Into<String>) -> Self {
        Target::Node(id.into())
    }

    pub fn end(label: impl Into<String>) -> Self {
        Target::End(label.into())
    }
}

/// Coerce a closure into an [`Executor`], fixing its higher-ranked signature.
fn erase<S, R, E, F>(f: F) -> Executor<S, R, E>
where
    F: for<'a> Fn(S, &'a R, &'a mut Bus) -> BoxFuture<'a, Outcome<S, E>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The single outgoing rule of a node.
pub(crate) enum Rule<S> {
    Always(Target),
    Route {
        router: Router<S>,
        arms: BTreeMap<String, Target>,
    },
}

impl<S> Rule<S> {
    fn targets(&self) -> Vec<&Target> {
        match self {
            Rule::Always(target) => vec![target],
            Rule::Route { arms, .. } => arms.values().collect(),
        }
    }
}

/// A registered node.
pub(crate) struct NodeSpec<S: WorkflowState, R, E> {
    pub(crate) halts_after: bool,
    pub(crate) writes: &'static [S::Field],
    pub(crate) executor: Executor<S, R, E>,
}

/// Graph construction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Workflow has no entry node")]
    MissingEntry,

    #[error("Entry node `{0}` is not registered")]
    UnknownEntry(String),

    #[error("Node `{0}` is registered twice")]
    DuplicateNode(String),

    #[error("Node `{0}` has more than one outgoing rule")]
    DuplicateRule(String),

    #[error("Node `{0}` has no outgoing rule")]
    MissingRule(String),

    #[error("Rule for unknown node `{0}`")]
    RuleForUnknownNode(String),

    #[error("Edge `{from}` -> `{to}` targets an unknown node")]
    UnknownTarget { from: String, to: String },

    #[error("Workflow contains a cycle through `{0}`")]
    Cycle(String),
}

/// Builder for [`Workflow`].
///
/// ```rust,ignore
/// let workflow = Workflow::builder("escrow")
///     .node("check", Check)
///     .interrupt_node("hold", Hold)
///     .entry("check")
///     .route("check", |s: &State| s.status.to_string(), [
///         ("PENDING", Target::node("hold")),
///         ("PASS", Target::end("direct")),
///     ])
///     .edge("hold", Target::end("held"))
///     .build()?;
/// ```
pub struct WorkflowBuilder<S: WorkflowState, R, E> {
    name: String,
    entry: Option<String>,
    order: Vec<String>,
    nodes: HashMap<String, NodeSpec<S, R, E>>,
    descriptions: HashMap<String, Option<String>>,
    rules: HashMap<String, Rule<S>>,
    errors: Vec<GraphError>,
}

impl<S, R, E> WorkflowBuilder<S, R, E>
where
    S: WorkflowState,
    R: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entry: None,
            order: Vec::new(),
            nodes: HashMap::new(),
            descriptions: HashMap::new(),
            rules: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Register a node that lets the driver continue after it.
    pub fn node<T>(self, id: &str, transition: T) -> Self
    where
        T: Transition<S, Resources = R, Error = E>,
    {
        self.register(id, transition, false)
    }

    /// Register a node after which the driver returns control to the caller.
    pub fn interrupt_node<T>(self, id: &str, transition: T) -> Self
    where
        T: Transition<S, Resources = R, Error = E>,
    {
        self.register(id, transition, true)
    }

    fn register<T>(mut self, id: &str, transition: T, halts_after: bool) -> Self
    where
        T: Transition<S, Resources = R, Error = E>,
    {
        if self.nodes.contains_key(id) {
            self.errors.push(GraphError::DuplicateNode(id.to_string()));
            return self;
        }

        let traced = Arc::new(Traced::new(transition, &self.name, id));
        let writes = <Traced<T> as Transition<S>>::writes(&traced);
        self.descriptions.insert(
            id.to_string(),
            <Traced<T> as Transition<S>>::description(&traced),
        );

        let executor = erase(move |state: S, resources: &R, bus: &mut Bus| {
            let node = traced.clone();
            Box::pin(async move {
                <Traced<T> as Transition<S>>::run(&node, state, resources, bus).await
            }) as BoxFuture<'_, Outcome<S, E>>
        });

        self.order.push(id.to_string());
        self.nodes.insert(
            id.to_string(),
            NodeSpec {
                halts_after,
                writes,
                executor,
            },
        );
        self
    }

    pub fn entry(mut self, id: &str) -> Self {
        self.entry = Some(id.to_string());
        self
    }

    /// Unconditional edge.
    pub fn edge(self, from: &str, to: Target) -> Self {
        self.rule(from, Rule::Always(to))
    }

    /// Conditional edge: `router` computes a key from the state the node
    /// returned and the matching arm is taken.
    pub fn route<F, K>(
        self,
        from: &str,
        router: F,
        arms: impl IntoIterator<Item = (K, Target)>,
    ) -> Self
    where
        F: Fn(&S) -> String + Send + Sync + 'static,
        K: Into<String>,
    {
        let arms = arms.into_iter().map(|(k, t)| (k.into(), t)).collect();
        self.rule(
            from,
            Rule::Route {
                router: Arc::new(router),
                arms,
            },
        )
    }

    fn rule(mut self, from: &str, rule: Rule<S>) -> Self {
        if self.rules.contains_key(from) {
            self.errors.push(GraphError::DuplicateRule(from.to_string()));
        } else {
            self.rules.insert(from.to_string(), rule);
        }
        self
    }

    /// Validate and freeze the graph.
    pub fn build(self) -> Result<Workflow<S, R, E>, GraphError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::UnknownEntry(entry));
        }

        for id in &self.order {
            let rule = self
                .rules
                .get(id)
                .ok_or_else(|| GraphError::MissingRule(id.clone()))?;
            for target in rule.targets() {
                if let Target::Node(to) = target {
                    if !self.nodes.contains_key(to) {
                        return Err(GraphError::UnknownTarget {
                            from: id.clone(),
                            to: to.clone(),
                        });
                    }
                }
            }
        }
        if let Some(orphan) = self.rules.keys().find(|id| !self.nodes.contains_key(*id)) {
            return Err(GraphError::RuleForUnknownNode(orphan.clone()));
        }
        detect_cycle(&self.order, &self.rules)?;

        let schematic = extract_schematic(
            &self.name,
            &entry,
            &self.order,
            &self.nodes,
            &self.descriptions,
            &self.rules,
        );

        Ok(Workflow {
            name: self.name,
            entry,
            nodes: self.nodes,
            rules: self.rules,
            schematic,
        })
    }
}

fn detect_cycle<S>(order: &[String], rules: &HashMap<String, Rule<S>>) -> Result<(), GraphError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<S>(
        id: &str,
        rules: &HashMap<String, Rule<S>>,
        marks: &mut HashMap<String, Mark>,
    ) -> Result<(), GraphError> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(GraphError::Cycle(id.to_string())),
            None => {}
        }
        marks.insert(id.to_string(), Mark::Visiting);
        if let Some(rule) = rules.get(id) {
            for target in rule.targets() {
                if let Target::Node(next) = target {
                    visit(next, rules, marks)?;
                }
            }
        }
        marks.insert(id.to_string(), Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for id in order {
        visit(id, rules, &mut marks)?;
    }
    Ok(())
}

fn egress_id(label: &str) -> String {
    format!("end_{label}")
}

fn extract_schematic<S: WorkflowState, R, E>(
    name: &str,
    entry: &str,
    order: &[String],
    nodes: &HashMap<String, NodeSpec<S, R, E>>,
    descriptions: &HashMap<String, Option<String>>,
    rules: &HashMap<String, Rule<S>>,
) -> Schematic {
    let mut schematic = Schematic::new(name);
    schematic.entry = entry.to_string();
    let mut ends = Vec::new();
    let mut seen = HashSet::new();

    for id in order {
        let Some(spec) = nodes.get(id) else { continue };
        schematic.nodes.push(Node {
            id: id.clone(),
            kind: NodeKind::Atom,
            label: id.clone(),
            description: descriptions.get(id).cloned().flatten(),
            halts_after: spec.halts_after,
            writes: spec.writes.iter().map(ToString::to_string).collect(),
        });

        let edges: Vec<(&Target, EdgeType)> = match rules.get(id) {
            Some(Rule::Always(target)) => vec![(target, EdgeType::Linear)],
            Some(Rule::Route { arms, .. }) => arms
                .iter()
                .map(|(key, target)| (target, EdgeType::Branch(key.clone())))
                .collect(),
            None => Vec::new(),
        };
        for (target, kind) in edges {
            let to = match target {
                Target::Node(next) => next.clone(),
                Target::End(label) => {
                    if seen.insert(label.clone()) {
                        ends.push(label.clone());
                    }
                    egress_id(label)
                }
            };
            schematic.edges.push(Edge {
                from: id.clone(),
                to,
                kind,
            });
        }
    }

    for label in ends {
        schematic.nodes.push(Node {
            id: egress_id(&label),
            kind: NodeKind::Egress,
            label,
            description: None,
            halts_after: false,
            writes: Vec::new(),
        });
    }
    schematic
}

/// A validated, immutable workflow graph.
pub struct Workflow<S: WorkflowState, R, E> {
    name: String,
    entry: String,
    pub(crate) nodes: HashMap<String, NodeSpec<S, R, E>>,
    rules: HashMap<String, Rule<S>>,
    schematic: Schematic,
}

impl<S, R, E> Workflow<S, R, E>
where
    S: WorkflowState,
    R: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn builder(name: &str) -> WorkflowBuilder<S, R, E> {
        WorkflowBuilder::new(name)
    }
}

impl<S: WorkflowState, R, E> Workflow<S, R, E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn halts_after(&self, id: &str) -> bool {
        self.nodes.get(id).is_some_and(|n| n.halts_after)
    }

    /// Get a reference to the Schematic (structural view).
    pub fn schematic(&self) -> &Schematic {
        &self.schematic
    }

    /// Resolve the outgoing rule of `from` against `state`.
    ///
    /// Returns `Ok(None)` when `from` has no rule (unknown node), and
    /// `Err(key)` when a router produced a key with no arm.
    pub(crate) fn resolve(&self, from: &str, state: &S) -> Option<Result<Target, String>> {
        let rule = self.rules.get(from)?;
        Some(match rule {
            Rule::Always(target) => Ok(target.clone()),
            Rule::Route { router, arms } => {
                let key = router(state);
                arms.get(&key).cloned().ok_or(key)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Bump, Probe, Tally, TallyError};

    fn builder() -> WorkflowBuilder<Tally, Arc<Probe>, TallyError> {
        Workflow::builder("tally")
    }

    #[test]
    fn builds_and_extracts_schematic() {
        let workflow = builder()
            .node("a", Bump)
            .interrupt_node("b", Bump)
            .entry("a")
            .route(
                "a",
                |s: &Tally| if s.value > 1 { "big".into() } else { "small".into() },
                [("small", Target::node("b")), ("big", Target::end("overflow"))],
            )
            .edge("b", Target::end("done"))
            .build()
            .unwrap();

        let schematic = workflow.schematic();
        assert_eq!(schematic.entry, "a");
        assert!(schematic.node("b").unwrap().halts_after);
        assert_eq!(schematic.node("a").unwrap().writes, vec!["value", "log"]);
        assert_eq!(schematic.node("end_done").unwrap().kind, NodeKind::Egress);
        assert!(schematic.node("end_overflow").is_some());
        assert_eq!(schematic.outgoing("a").count(), 2);
        assert!(workflow.halts_after("b"));
        assert!(!workflow.halts_after("a"));
    }

    #[test]
    fn rejects_missing_entry() {
        let err = builder()
            .node("a", Bump)
            .edge("a", Target::end("done"))
            .build()
            .err();
        assert_eq!(err, Some(GraphError::MissingEntry));
    }

    #[test]
    fn rejects_unknown_target() {
        let err = builder()
            .node("a", Bump)
            .entry("a")
            .edge("a", Target::node("ghost"))
            .build()
            .err();
        assert_eq!(
            err,
            Some(GraphError::UnknownTarget {
                from: "a".into(),
                to: "ghost".into()
            })
        );
    }

    #[test]
    fn rejects_missing_and_duplicate_rules() {
        let missing = builder().node("a", Bump).entry("a").build().err();
        assert_eq!(missing, Some(GraphError::MissingRule("a".into())));

        let duplicate = builder()
            .node("a", Bump)
            .entry("a")
            .edge("a", Target::end("x"))
            .edge("a", Target::end("y"))
            .build()
            .err();
        assert_eq!(duplicate, Some(GraphError::DuplicateRule("a".into())));
    }

    #[test]
    fn rejects_duplicate_nodes() {
        let err = builder()
            .node("a", Bump)
            .node("a", Bump)
            .entry("a")
            .edge("a", Target::end("done"))
            .build()
            .err();
        assert_eq!(err, Some(GraphError::DuplicateNode("a".into())));
    }

    #[test]
    fn rejects_cycles() {
        let err = builder()
            .node("a", Bump)
            .node("b", Bump)
            .entry("a")
            .edge("a", Target::node("b"))
            .edge("b", Target::node("a"))
            .build()
            .err();
        assert!(matches!(err, Some(GraphError::Cycle(_))));
    }
}
