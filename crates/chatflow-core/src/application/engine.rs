//! The conversation execution engine
//!
//! One inbound event at a time: resolve the awaited-input path, execute
//! nodes iteratively until one suspends (buttons, a freshly asked question,
//! `waitForUserReply`) or the flow ends, persisting the position between
//! steps so the next stateless invocation can resume.
//!
//! There is no cross-event locking for a session; two events racing for the
//! same `(project, sender)` are last-write-wins on the session keys.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::actions::ActionResolver;
use crate::application::classifier::{classify, Classification};
use crate::application::templating::render_url;
use crate::application::validation::validate_answer;
use crate::domain::event::InboundEvent;
use crate::domain::flow_graph::{ApiCallSpec, FlowGraph, FlowNode, NodeKind};
use crate::domain::gateway::{MessagingGateway, OutboundButton, MAX_BUTTONS_PER_MESSAGE};
use crate::domain::http::{ApiRequest, ApiResponseKind, HttpFetcher};
use crate::domain::session::{AwaitingButtons, ButtonChoice, SessionScope, SessionStore};
use crate::domain::store::ConversationStateStore;
use crate::settings::EngineSettings;
use crate::EngineError;

/// The resumable conversation state machine
pub struct ConversationEngine {
    store: Arc<dyn ConversationStateStore>,
    gateway: Arc<dyn MessagingGateway>,
    fetcher: Arc<dyn HttpFetcher>,
    actions: ActionResolver,
    settings: EngineSettings,
}

impl ConversationEngine {
    /// Create a new engine over the injected capabilities
    pub fn new(
        store: Arc<dyn ConversationStateStore>,
        gateway: Arc<dyn MessagingGateway>,
        fetcher: Arc<dyn HttpFetcher>,
        settings: EngineSettings,
    ) -> Self {
        let actions = ActionResolver::new(fetcher.clone(), gateway.clone());
        Self {
            store,
            gateway,
            fetcher,
            actions,
            settings,
        }
    }

    /// Handle one inbound event against the project's flow graph.
    ///
    /// `graph` is `None` when no flow is configured for the project; the
    /// event is then dropped without touching any session state.
    pub async fn handle_event(
        &self,
        graph: Option<&FlowGraph>,
        event: &InboundEvent,
    ) -> Result<(), EngineError> {
        let Some(graph) = graph else {
            warn!(
                project_id = %event.project_id,
                user = %event.sender,
                "No flow graph configured for project, dropping event"
            );
            return Err(EngineError::MissingFlowGraph(event.project_id.clone()));
        };

        let session = SessionStore::new(
            self.store.as_ref(),
            SessionScope::new(&event.project_id, &event.sender),
            self.settings.session_ttl(),
        );

        // Smart buttons bypass flow routing entirely: the action payload is
        // self-contained and independent of position.
        if event.is_button_reply() {
            if let Some((_, button)) = graph.find_button(
                event.button_reply_id.as_deref(),
                event.button_reply_title.as_deref(),
            ) {
                if let Some(action) = &button.action {
                    return self
                        .actions
                        .resolve(&event.sender, action, &self.settings.api_fallback_message)
                        .await;
                }
            }
        }

        match classify(graph, &session, event).await {
            Classification::ButtonReply { node_id, label }
            | Classification::GlobalButton { node_id, label } => {
                session.clear_pending_markers().await;
                match graph.labeled_target(&node_id, &label) {
                    Some(target) => {
                        let target = target.to_string();
                        self.run_from(graph, &session, event, &target).await
                    }
                    None => {
                        warn!(
                            project_id = %event.project_id,
                            node_id = %node_id,
                            label = %label,
                            "Matched button has no outgoing edge, ending flow"
                        );
                        session.clear_all().await;
                        Ok(())
                    }
                }
            }
            Classification::InvalidButtonReply { awaiting } => {
                self.invalid_button_reply(graph, &session, event, awaiting)
                    .await
            }
            Classification::QuestionAnswer { answer } => {
                self.question_answer(graph, &session, event, &answer).await
            }
            Classification::Continuation { position } => {
                let start_id = match position {
                    Some(position) => position,
                    None => graph.start_node()?.id.clone(),
                };
                self.run_from(graph, &session, event, &start_id).await
            }
        }
    }

    /// Execute nodes from `start_id` until suspension, flow end, or the
    /// step budget. Iterative by design: a cyclic auto-advancing subgraph is
    /// a configuration defect surfaced as an error, never a stack failure.
    async fn run_from(
        &self,
        graph: &FlowGraph,
        session: &SessionStore<'_>,
        event: &InboundEvent,
        start_id: &str,
    ) -> Result<(), EngineError> {
        let mut current = start_id.to_string();

        for _ in 0..self.settings.max_steps_per_event {
            let Some(node) = graph.node(&current) else {
                warn!(
                    project_id = %event.project_id,
                    user = %event.sender,
                    node_id = %current,
                    "Stored position points at a missing node, deleting session"
                );
                session.clear_all().await;
                return Err(EngineError::NodeNotFound(current));
            };

            debug!(
                project_id = %event.project_id,
                user = %event.sender,
                node_id = %node.id,
                kind = ?node.kind,
                "Executing node"
            );

            let next = match node.kind {
                NodeKind::Start => graph.default_target(&node.id),
                NodeKind::Message => {
                    if let Some(text) = &node.properties().message {
                        self.gateway.send_text(&event.sender, text).await?;
                    }
                    graph.default_target(&node.id)
                }
                NodeKind::Condition => {
                    let label = if self.condition_matches(node, event) {
                        "true"
                    } else {
                        "false"
                    };
                    graph.labeled_target(&node.id, label)
                }
                NodeKind::Buttons => {
                    return self.execute_buttons(node, session, event).await;
                }
                NodeKind::Question => {
                    if let Some(prompt) = &node.properties().message {
                        self.gateway.send_text(&event.sender, prompt).await?;
                    }
                    session.set_position(&node.id).await;
                    session.set_question_pending().await;
                    return Ok(());
                }
                NodeKind::Media => {
                    if let Some(media) = &node.properties().media {
                        self.gateway
                            .send_media(
                                &event.sender,
                                &media.url,
                                &media.kind,
                                media.caption.as_deref(),
                            )
                            .await?;
                    }
                    graph.default_target(&node.id)
                }
                NodeKind::Api => {
                    self.execute_api(node, session, event).await;
                    graph.default_target(&node.id)
                }
                NodeKind::End => {
                    if let Some(farewell) = &node.properties().message {
                        self.gateway.send_text(&event.sender, farewell).await?;
                    }
                    session.clear_all().await;
                    return Ok(());
                }
                NodeKind::Unknown => {
                    warn!(
                        project_id = %event.project_id,
                        node_id = %node.id,
                        "Unsupported node type, terminating session"
                    );
                    self.gateway
                        .send_text(&event.sender, &self.settings.generic_failure_message)
                        .await?;
                    session.clear_all().await;
                    return Err(EngineError::UnsupportedNodeType(node.id.clone()));
                }
            };

            match next {
                Some(target) => {
                    let target = target.to_string();
                    session.set_position(&target).await;
                    if node.properties().wait_for_user_reply {
                        debug!(node_id = %node.id, "Node waits for user reply, suspending");
                        return Ok(());
                    }
                    current = target;
                }
                None => {
                    debug!(
                        project_id = %event.project_id,
                        node_id = %node.id,
                        "No outgoing edge, flow ended"
                    );
                    session.clear_all().await;
                    return Ok(());
                }
            }
        }

        warn!(
            project_id = %event.project_id,
            user = %event.sender,
            steps = self.settings.max_steps_per_event,
            "Step budget exhausted, halting auto-advancing chain"
        );
        Err(EngineError::StepBudgetExhausted(
            self.settings.max_steps_per_event,
        ))
    }

    /// Case-insensitive substring match of the inbound text against the
    /// node's comma-separated keyword list
    fn condition_matches(&self, node: &FlowNode, event: &InboundEvent) -> bool {
        let input = event.effective_text().to_lowercase();
        node.properties()
            .keywords
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|keyword| keyword.trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .any(|keyword| input.contains(&keyword))
    }

    /// Send a button prompt and suspend, recording the awaited reply set
    async fn execute_buttons(
        &self,
        node: &FlowNode,
        session: &SessionStore<'_>,
        event: &InboundEvent,
    ) -> Result<(), EngineError> {
        let buttons = &node.properties().buttons;
        if buttons.is_empty() {
            warn!(
                project_id = %event.project_id,
                node_id = %node.id,
                "Buttons node without buttons would block forever, ending flow"
            );
            session.clear_all().await;
            return Ok(());
        }

        if buttons.len() > MAX_BUTTONS_PER_MESSAGE {
            warn!(
                project_id = %event.project_id,
                node_id = %node.id,
                configured = buttons.len(),
                limit = MAX_BUTTONS_PER_MESSAGE,
                "Truncating buttons to the provider limit"
            );
        }

        let outbound: Vec<OutboundButton> = buttons
            .iter()
            .take(MAX_BUTTONS_PER_MESSAGE)
            .enumerate()
            .map(|(index, button)| OutboundButton {
                id: button.reply_id(index),
                title: button.title.clone(),
            })
            .collect();

        let prompt = node
            .properties()
            .message
            .as_deref()
            .unwrap_or("Please choose an option:");
        self.gateway
            .send_buttons(&event.sender, prompt, &outbound)
            .await?;

        let allowed = outbound
            .iter()
            .map(|button| ButtonChoice {
                id: button.id.clone(),
                title: button.title.clone(),
            })
            .collect();

        session.set_position(&node.id).await;
        session
            .set_awaiting(&AwaitingButtons {
                node_id: node.id.clone(),
                allowed,
            })
            .await;
        Ok(())
    }

    /// Route a pending question's answer through its validator
    async fn question_answer(
        &self,
        graph: &FlowGraph,
        session: &SessionStore<'_>,
        event: &InboundEvent,
        answer: &str,
    ) -> Result<(), EngineError> {
        let Some(position) = session.position().await else {
            // Marker outlived the position entry; restart cleanly.
            warn!(
                project_id = %event.project_id,
                user = %event.sender,
                "Question pending without a stored position, restarting flow"
            );
            session.clear_pending_markers().await;
            let start_id = graph.start_node()?.id.clone();
            return self.run_from(graph, session, event, &start_id).await;
        };

        let Some(node) = graph.node(&position) else {
            warn!(
                project_id = %event.project_id,
                node_id = %position,
                "Pending question node no longer exists, deleting session"
            );
            session.clear_all().await;
            return Err(EngineError::NodeNotFound(position));
        };

        let properties = node.properties();
        if validate_answer(properties.validation, answer) {
            let name = properties
                .save_as
                .clone()
                .unwrap_or_else(|| node.id.clone());
            session.set_variable(&name, answer.trim()).await;
            session.clear_pending_markers().await;

            match graph.default_target(&node.id) {
                Some(target) => {
                    let target = target.to_string();
                    self.run_from(graph, session, event, &target).await
                }
                None => {
                    session.clear_all().await;
                    Ok(())
                }
            }
        } else {
            let retries = session.retries().await + 1;
            let max = self.settings.max_question_retries;
            if retries >= max {
                debug!(
                    project_id = %event.project_id,
                    node_id = %node.id,
                    retries,
                    "Validation retries exhausted, terminating session"
                );
                self.gateway
                    .send_text(&event.sender, &self.settings.validation_terminal_message)
                    .await?;
                session.clear_all().await;
                Ok(())
            } else {
                session.set_retries(retries).await;
                let notice = EngineSettings::render_attempts(
                    &self.settings.validation_retry_message,
                    retries,
                    max,
                );
                self.gateway.send_text(&event.sender, &notice).await?;
                if let Some(prompt) = &properties.message {
                    self.gateway.send_text(&event.sender, prompt).await?;
                }
                Ok(())
            }
        }
    }

    /// Apply the bounded invalid-button policy while a buttons node blocks
    async fn invalid_button_reply(
        &self,
        graph: &FlowGraph,
        session: &SessionStore<'_>,
        event: &InboundEvent,
        awaiting: AwaitingButtons,
    ) -> Result<(), EngineError> {
        let attempts = session.invalid_attempts().await + 1;
        let max = self.settings.max_invalid_button_attempts;

        if attempts >= max {
            debug!(
                project_id = %event.project_id,
                node_id = %awaiting.node_id,
                attempts,
                "Invalid-reply attempts exhausted, terminating session"
            );
            self.gateway
                .send_text(&event.sender, &self.settings.invalid_reply_terminal_message)
                .await?;
            session.clear_pending_markers().await;

            // A defined end node still gets to say goodbye.
            match graph.end_node() {
                Some(end) => {
                    let end_id = end.id.clone();
                    self.run_from(graph, session, event, &end_id).await
                }
                None => {
                    session.clear_all().await;
                    Ok(())
                }
            }
        } else {
            session.set_invalid_attempts(attempts).await;
            let notice = EngineSettings::render_attempts(
                &self.settings.invalid_reply_retry_message,
                attempts,
                max,
            );
            self.gateway.send_text(&event.sender, &notice).await?;
            // Refresh the awaiting record's TTL; the node keeps blocking.
            session.set_awaiting(&awaiting).await;
            Ok(())
        }
    }

    /// Execute an API node: template, call, map, send. All failures are
    /// recovered locally with the fallback message so the flow continues
    /// past the node.
    async fn execute_api(&self, node: &FlowNode, session: &SessionStore<'_>, event: &InboundEvent) {
        let Some(api) = &node.properties().api else {
            warn!(node_id = %node.id, "Api node without a request spec, skipping");
            return;
        };

        if let Err(err) = self.perform_api(api, session, event).await {
            warn!(
                project_id = %event.project_id,
                user = %event.sender,
                node_id = %node.id,
                error = %err,
                "API node failed, sending fallback"
            );
            if let Err(send_err) = self
                .gateway
                .send_text(&event.sender, &self.settings.api_fallback_message)
                .await
            {
                warn!(error = %send_err, "Failed to deliver API fallback message");
            }
        }
    }

    async fn perform_api(
        &self,
        api: &ApiCallSpec,
        session: &SessionStore<'_>,
        event: &InboundEvent,
    ) -> Result<(), EngineError> {
        let url = render_url(&api.request.url, session).await?;
        let request = ApiRequest::from_spec(&api.request, url);

        let response = self.fetcher.fetch(&request).await?;
        let narrowed = api.response_mapping.narrow(&response)?;

        match api.response_mapping.kind {
            ApiResponseKind::Media => {
                let (media_url, caption) = api.response_mapping.media_fields(&narrowed)?;
                self.gateway
                    .send_media(&event.sender, &media_url, "image", caption.as_deref())
                    .await
            }
            ApiResponseKind::Text => {
                let text = match narrowed.as_str() {
                    Some(s) => s.to_string(),
                    None => narrowed.to_string(),
                };
                self.gateway.send_text(&event.sender, &text).await
            }
        }
    }
}
