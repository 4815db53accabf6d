#![allow(clippy::result_large_err)]

use crate::core::config::ChatflowConfig;
use crate::core::error::AppError;
use crate::core::flow_graph::action::{ActionContext, ActionError, ActionRegistry};
use crate::core::flow_graph::actions;
use crate::core::flow_graph::channel::{MediaResolver, MessagingChannel, PassthroughMediaResolver};
use crate::core::flow_graph::context::{ExecutionContext, RunTarget, RunTrigger};
use crate::core::flow_graph::expression::ConditionEvaluator;
use crate::core::flow_graph::model::{
    ActionParams, ActionPayload, Connection, Flow, MessagePayload, Node, NodeKind, NodeType,
    VarValue, Variables,
};
use crate::core::flow_graph::state::{
    CancelToken, NodeVisit, RunDiagnostic, RunErrorKind, RunOutcome, RunReport,
};
use crate::core::flow_graph::store::{GraphStore, StoreError};
use crate::core::flow_graph::template;
use crate::core::flow_graph::validator::{FlowValidator, ReachabilityPolicy};
use crate::core::types::ErrorCategory;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Diagnostic code for a condition that failed to evaluate and defaulted to `false`.
pub const CONDITION_EVALUATION_FAILED: &str = "FLOW-COND-001";

/// Resolved engine limits and timeouts.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_steps: usize,
    pub allow_revisits: bool,
    pub validate_before_run: bool,
    pub reachability: ReachabilityPolicy,
    pub send_timeout: Duration,
    pub media_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings::from(&ChatflowConfig::default())
    }
}

impl From<&ChatflowConfig> for EngineSettings {
    fn from(config: &ChatflowConfig) -> Self {
        Self {
            max_steps: config.engine.max_steps,
            allow_revisits: config.engine.allow_revisits,
            validate_before_run: config.engine.validate_before_run,
            reachability: config.engine.reachability,
            send_timeout: Duration::from_millis(config.channel.send_timeout_ms),
            media_timeout: Duration::from_millis(config.channel.media_timeout_ms),
        }
    }
}

/// Step interpreter for flows. Cheap to clone; clones share collaborators.
#[derive(Clone)]
pub struct FlowEngine {
    store: Arc<dyn GraphStore>,
    channel: Arc<dyn MessagingChannel>,
    media: Arc<dyn MediaResolver>,
    actions: ActionRegistry,
    evaluator: ConditionEvaluator,
    settings: EngineSettings,
}

impl FlowEngine {
    /// Engine with default settings, passthrough media and the built-in actions.
    pub fn new(store: Arc<dyn GraphStore>, channel: Arc<dyn MessagingChannel>) -> Self {
        Self::from_config(&ChatflowConfig::default(), store, channel)
    }

    pub fn from_config(
        config: &ChatflowConfig,
        store: Arc<dyn GraphStore>,
        channel: Arc<dyn MessagingChannel>,
    ) -> Self {
        let mut builder = ActionRegistry::builder();
        actions::register_builtins(
            &mut builder,
            Duration::from_millis(config.webhook.timeout_ms),
        );
        Self {
            store,
            channel,
            media: Arc::new(PassthroughMediaResolver),
            actions: builder.build(),
            evaluator: ConditionEvaluator::default(),
            settings: EngineSettings::from(config),
        }
    }

    pub fn with_media_resolver(mut self, media: Arc<dyn MediaResolver>) -> Self {
        self.media = media;
        self
    }

    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Load `flow_id` and run it against `target`.
    pub async fn execute(
        &self,
        flow_id: &str,
        target: RunTarget,
        variables: Variables,
    ) -> RunReport {
        self.execute_with(
            flow_id,
            target,
            variables,
            &RunTrigger::default(),
            &CancelToken::new(),
        )
        .await
    }

    /// Load `flow_id` and run it with trigger bindings and a cancellation token.
    pub async fn execute_with(
        &self,
        flow_id: &str,
        target: RunTarget,
        variables: Variables,
        trigger: &RunTrigger,
        cancel: &CancelToken,
    ) -> RunReport {
        let started_at = Utc::now();
        let mut ctx = ExecutionContext::new(flow_id, target, variables);
        ctx.bind_trigger(trigger);

        let flow = match self.store.load_flow(flow_id).await {
            Ok(flow) => flow,
            Err(err) => {
                let kind = match err {
                    StoreError::NotFound(_) => RunErrorKind::FlowNotFound,
                    StoreError::Unavailable(_) => RunErrorKind::StoreUnavailable,
                    StoreError::Invalid { .. } | StoreError::Validation(_) => {
                        RunErrorKind::ValidationFailed
                    }
                };
                tracing::warn!(flow_id = %flow_id, error = %err, "flow could not be loaded");
                let outcome = RunOutcome::error(kind, None, err.to_string());
                return FlowRun::new(self, None, ctx, cancel, started_at).finish(outcome);
            }
        };

        self.run_context(&flow, ctx, cancel, started_at).await
    }

    /// Run an already-loaded flow, e.g. an unpublished draft under test.
    pub async fn run_flow(
        &self,
        flow: &Flow,
        target: RunTarget,
        variables: Variables,
        trigger: &RunTrigger,
        cancel: &CancelToken,
    ) -> RunReport {
        let started_at = Utc::now();
        let mut ctx = ExecutionContext::new(flow.id.clone(), target, variables);
        ctx.bind_trigger(trigger);
        self.run_context(flow, ctx, cancel, started_at).await
    }

    /// Run in a background task. The returned handle can cancel or await the run.
    pub fn spawn(
        &self,
        flow_id: impl Into<String>,
        target: RunTarget,
        variables: Variables,
        trigger: RunTrigger,
    ) -> RunHandle {
        let engine = self.clone();
        let token = CancelToken::new();
        let run_token = token.clone();
        let flow_id = flow_id.into();
        let handle = tokio::spawn(async move {
            engine
                .execute_with(&flow_id, target, variables, &trigger, &run_token)
                .await
        });
        RunHandle { token, handle }
    }

    async fn run_context(
        &self,
        flow: &Flow,
        ctx: ExecutionContext,
        cancel: &CancelToken,
        started_at: DateTime<Utc>,
    ) -> RunReport {
        let span = tracing::info_span!(
            "flow_run",
            run_id = %ctx.run_id,
            flow_id = %flow.id,
            recipient = %ctx.target.recipient
        );
        let run = FlowRun::new(self, Some(flow), ctx, cancel, started_at);
        async move {
            tracing::info!("flow run started");
            let report = run.run().await;
            match &report.outcome {
                RunOutcome::Error { kind, node_id, message } => tracing::warn!(
                    kind = %kind,
                    node_id = node_id.as_deref().unwrap_or("-"),
                    message = %message,
                    "flow run failed"
                ),
                outcome => tracing::info!(
                    outcome = outcome.as_str(),
                    steps = report.visits.len(),
                    "flow run finished"
                ),
            }
            report
        }
        .instrument(span)
        .await
    }
}

/// Owner's view of a spawned run.
pub struct RunHandle {
    token: CancelToken,
    handle: JoinHandle<RunReport>,
}

impl RunHandle {
    /// Ask the run to stop at its next suspension point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn join(self) -> Result<RunReport, AppError> {
        self.handle.await.map_err(|err| {
            AppError::new(
                ErrorCategory::InternalError,
                "FLOW-RUN-001",
                "flow run task failed",
            )
            .with_source(err)
        })
    }
}

struct NodeFailure {
    kind: RunErrorKind,
    message: String,
}

impl NodeFailure {
    fn new(kind: RunErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn cancelled() -> Self {
        Self::new(RunErrorKind::Cancelled, "run cancelled")
    }
}

impl From<ActionError> for NodeFailure {
    fn from(err: ActionError) -> Self {
        let kind = match err {
            ActionError::MissingParameters { .. } => RunErrorKind::MissingActionParameters,
            ActionError::InvalidParameter { .. } | ActionError::Failed(_) => {
                RunErrorKind::ActionFailed
            }
        };
        Self::new(kind, err.to_string())
    }
}

enum Transition {
    Follow {
        connection: Connection,
        node_delay: Option<u64>,
    },
    Finish(RunOutcome),
}

enum Interrupt {
    Cancelled,
    TimedOut,
}

/// Race `fut` against cancellation and, when given, a deadline.
async fn interruptible<T>(
    cancel: &CancelToken,
    limit: Option<Duration>,
    fut: impl Future<Output = T>,
) -> Result<T, Interrupt> {
    let bounded = async {
        match limit {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Interrupt::TimedOut),
            None => Ok(fut.await),
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        result = bounded => result,
    }
}

/// State of one in-flight run.
struct FlowRun<'a> {
    engine: &'a FlowEngine,
    flow: Option<&'a Flow>,
    ctx: ExecutionContext,
    cancel: &'a CancelToken,
    started_at: DateTime<Utc>,
    visits: Vec<NodeVisit>,
    diagnostics: Vec<RunDiagnostic>,
    visited: HashSet<String>,
}

impl<'a> FlowRun<'a> {
    fn new(
        engine: &'a FlowEngine,
        flow: Option<&'a Flow>,
        ctx: ExecutionContext,
        cancel: &'a CancelToken,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            engine,
            flow,
            ctx,
            cancel,
            started_at,
            visits: Vec::new(),
            diagnostics: Vec::new(),
            visited: HashSet::new(),
        }
    }

    fn finish(self, outcome: RunOutcome) -> RunReport {
        RunReport {
            run_id: self.ctx.run_id,
            flow_id: self.ctx.flow_id,
            flow_hash: self.flow.map(Flow::content_hash).unwrap_or_default(),
            target: self.ctx.target,
            outcome,
            visits: self.visits,
            variables: self.ctx.variables,
            diagnostics: self.diagnostics,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    async fn run(mut self) -> RunReport {
        let outcome = self.drive().await;
        self.finish(outcome)
    }

    async fn drive(&mut self) -> RunOutcome {
        let Some(flow) = self.flow else {
            return RunOutcome::error(RunErrorKind::FlowNotFound, None, "no flow to run");
        };
        let engine = self.engine;
        let settings = &engine.settings;

        if settings.validate_before_run {
            if let Err(err) = FlowValidator::new(settings.reachability).validate(flow) {
                return RunOutcome::error(RunErrorKind::ValidationFailed, None, err.to_string());
            }
        }

        let Some(start) = flow.nodes_of_type(NodeType::Start).next() else {
            return RunOutcome::error(RunErrorKind::NodeNotFound, None, "flow has no start node");
        };
        let mut current = start.id.clone();

        loop {
            if self.cancel.is_cancelled() {
                tracing::warn!(node_id = %current, "run cancelled before node");
                return RunOutcome::error(RunErrorKind::Cancelled, Some(&current), "run cancelled");
            }
            if self.visits.len() >= settings.max_steps {
                return RunOutcome::error(
                    RunErrorKind::CycleDetected,
                    Some(&current),
                    format!("step limit of {} reached", settings.max_steps),
                );
            }
            if !self.visited.insert(current.clone()) && !settings.allow_revisits {
                return RunOutcome::error(
                    RunErrorKind::CycleDetected,
                    Some(&current),
                    format!("node '{}' reached a second time", current),
                );
            }
            let Some(node) = flow.node(&current) else {
                return RunOutcome::error(
                    RunErrorKind::NodeNotFound,
                    Some(&current),
                    format!("node '{}' does not exist", current),
                );
            };

            self.ctx.current_node = Some(node.id.clone());
            self.visits.push(NodeVisit {
                node_id: node.id.clone(),
                node_type: node.node_type(),
                entered_at: Utc::now(),
                finished_at: None,
            });
            tracing::debug!(node_id = %node.id, node_type = %node.node_type(), "executing node");

            let result = self.execute_node(flow, node).await;
            if let Some(visit) = self.visits.last_mut() {
                visit.finished_at = Some(Utc::now());
            }

            let (connection, node_delay) = match result {
                Ok(Transition::Finish(outcome)) => return outcome,
                Ok(Transition::Follow {
                    connection,
                    node_delay,
                }) => (connection, node_delay),
                Err(failure) => {
                    return RunOutcome::error(failure.kind, Some(&node.id), failure.message)
                }
            };

            let delay = connection.delay_secs.or(node_delay).unwrap_or(0);
            if delay > 0 {
                tracing::debug!(node_id = %node.id, delay_secs = delay, "suspending run");
                let sleep = tokio::time::sleep(Duration::from_secs(delay));
                if interruptible(self.cancel, None, sleep).await.is_err() {
                    tracing::warn!(node_id = %node.id, "run cancelled during delay");
                    return RunOutcome::error(
                        RunErrorKind::Cancelled,
                        Some(&node.id),
                        "run cancelled during delay",
                    );
                }
            }

            current = connection.target;
        }
    }

    async fn execute_node(&mut self, flow: &Flow, node: &Node) -> Result<Transition, NodeFailure> {
        match &node.kind {
            NodeKind::Start => Self::follow(flow, node, None),
            NodeKind::Message(payload) => {
                self.send_message(node, payload).await?;
                Self::follow(flow, node, payload.delay_secs)
            }
            NodeKind::Condition(payload) => Ok(self.branch(flow, node, &payload.expression)),
            NodeKind::Action(payload) => {
                self.run_action(node, payload).await?;
                Self::follow(flow, node, None)
            }
            NodeKind::End => Ok(Transition::Finish(RunOutcome::Completed {
                end_node_id: node.id.clone(),
            })),
        }
    }

    /// Follow the first outgoing connection in declaration order.
    fn follow(flow: &Flow, node: &Node, node_delay: Option<u64>) -> Result<Transition, NodeFailure> {
        let connection = flow.outgoing(&node.id).into_iter().next().ok_or_else(|| {
            NodeFailure::new(
                RunErrorKind::NoOutgoingConnection,
                format!("{} node '{}' has no outgoing connection", node.node_type(), node.id),
            )
        })?;
        Ok(Transition::Follow {
            connection: connection.clone(),
            node_delay,
        })
    }

    async fn send_message(&self, node: &Node, payload: &MessagePayload) -> Result<(), NodeFailure> {
        let settings = &self.engine.settings;
        let text = template::substitute(&payload.text, &self.ctx.variables);
        let target = &self.ctx.target;

        let delivery = match &payload.media {
            Some(media) => {
                let resolved = interruptible(
                    self.cancel,
                    Some(settings.media_timeout),
                    self.engine.media.resolve(&media.reference),
                )
                .await;
                let url = match resolved {
                    Ok(Ok(url)) => url,
                    Ok(Err(err)) => {
                        return Err(NodeFailure::new(
                            RunErrorKind::MediaResolutionFailed,
                            err.to_string(),
                        ))
                    }
                    Err(Interrupt::TimedOut) => {
                        return Err(NodeFailure::new(
                            RunErrorKind::MediaResolutionFailed,
                            format!(
                                "media '{}' not resolved within {}ms",
                                media.reference,
                                settings.media_timeout.as_millis()
                            ),
                        ))
                    }
                    Err(Interrupt::Cancelled) => return Err(NodeFailure::cancelled()),
                };
                interruptible(
                    self.cancel,
                    Some(settings.send_timeout),
                    self.engine.channel.send_media(target, &url, &text, media.kind),
                )
                .await
            }
            None => {
                interruptible(
                    self.cancel,
                    Some(settings.send_timeout),
                    self.engine.channel.send_text(target, &text),
                )
                .await
            }
        };

        let message = match delivery {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => err.to_string(),
            Err(Interrupt::TimedOut) => format!(
                "send not acknowledged within {}ms",
                settings.send_timeout.as_millis()
            ),
            Err(Interrupt::Cancelled) => return Err(NodeFailure::cancelled()),
        };
        tracing::error!(
            node_id = %node.id,
            channel_id = %target.channel_id,
            recipient = %target.recipient,
            error = %message,
            "message delivery failed"
        );
        Err(NodeFailure::new(RunErrorKind::DeliveryFailed, message))
    }

    fn branch(&mut self, flow: &Flow, node: &Node, expression: &str) -> Transition {
        let evaluation = self.engine.evaluator.evaluate(expression, &self.ctx.variables);
        if let Some(error) = evaluation.error {
            self.diagnostics.push(RunDiagnostic {
                code: CONDITION_EVALUATION_FAILED.to_string(),
                node_id: node.id.clone(),
                message: format!("condition '{}' evaluated to false: {}", expression, error),
            });
        }
        let label = if evaluation.value { "true" } else { "false" };
        let chosen = flow
            .outgoing(&node.id)
            .into_iter()
            .find(|connection| connection.condition.as_deref().map(str::trim) == Some(label));
        match chosen {
            Some(connection) => Transition::Follow {
                connection: connection.clone(),
                node_delay: None,
            },
            None => {
                tracing::info!(node_id = %node.id, branch = label, "no matching branch");
                Transition::Finish(RunOutcome::NoMatchingBranch {
                    node_id: node.id.clone(),
                })
            }
        }
    }

    async fn run_action(&mut self, node: &Node, payload: &ActionPayload) -> Result<(), NodeFailure> {
        let handler = self.engine.actions.get(&payload.action).ok_or_else(|| {
            NodeFailure::new(
                RunErrorKind::UnknownActionKind,
                format!("unknown action kind '{}'", payload.action),
            )
        })?;

        let params: ActionParams = payload
            .params
            .iter()
            .map(|(key, value)| {
                let resolved = match value {
                    VarValue::Text(text) => {
                        VarValue::Text(template::substitute(text, &self.ctx.variables))
                    }
                    other => other.clone(),
                };
                (key.clone(), resolved)
            })
            .collect();
        handler.validate_params(&params)?;

        let action_ctx = ActionContext {
            run_id: self.ctx.run_id.clone(),
            flow_id: self.ctx.flow_id.clone(),
            node_id: node.id.clone(),
            target: self.ctx.target.clone(),
            variables: self.ctx.variables.clone(),
        };
        let output = match interruptible(self.cancel, None, handler.execute(params, action_ctx)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(NodeFailure::cancelled()),
        };
        self.ctx.apply_patch(output.variables);
        Ok(())
    }
}
