// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded, step-wise interpreter over a [`FlowGraph`].
//!
//! One inbound event drives at most one run. A run ends at the first node
//! that needs input (a menu), at a node with no way forward, or when its
//! execution budget of `len(nodes)` steps is spent. Between nodes the run
//! re-reads the ticket and the graph, and after each node it persists the
//! cursor (`last_flow_id` = last completed node) before moving on.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ticketflow_audit::{EntryContext, EventLog};
use ticketflow_core::{
    Clock, FlowCursor, FlowId, FlowLogType, InboundPayload, MediaKind, MediaPort, MessagingPort,
    NodeId, Recipient, StorageAdapter, Ticket, TicketId, TicketflowError,
    format_timestamp,
};
use ticketflow_router::QueueRouter;
use tracing::{debug, info, warn};

use crate::delivery::{FlowSettings, Outbox};
use crate::graph::{FlowGraph, Node, NodeKind};
use crate::registry::MessagingRegistry;

/// Keyword that ends the conversation from anywhere inside an automation.
pub const STOP_KEYWORD: &str = "stop";

/// Mutable state threaded through one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub current_node: NodeId,
    /// Key that resumed this run, already consumed by the menu it answered.
    pub pending_input: Option<String>,
    pub run_budget: usize,
}

/// Why an automation let go of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Terminal,
    /// No outgoing edge for the way the run wanted to go.
    DeadEnd,
    /// A menu answer with no matching option edge.
    UnmappedKey,
    BudgetExhausted,
    /// The cursor names a node the current definition no longer has.
    MissingNode,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Parked on a menu waiting for the contact's answer.
    Suspended { node_id: NodeId },
    /// Automation detached; the ticket waits for a human.
    Exited { reason: ExitReason },
    /// The contact sent the stop keyword and the ticket was closed.
    Closed,
    /// The ticket was closed or claimed by someone else mid-run.
    Aborted,
}

/// Randomizer branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    A,
    B,
}

impl Branch {
    pub fn handle(self) -> &'static str {
        match self {
            Branch::A => "a",
            Branch::B => "b",
        }
    }
}

/// Weighted coin flip: branch `a` with probability `percent / 100`.
pub fn choose_branch<R: Rng + ?Sized>(percent: i64, rng: &mut R) -> Branch {
    let p = percent.clamp(0, 100) as f64 / 100.0;
    if rng.gen_bool(p) { Branch::A } else { Branch::B }
}

enum Step {
    Advance(Advance),
    Exit(ExitReason),
    Abort,
}

enum Advance {
    Continue(NodeId),
    Suspend,
    HandOff(FlowId),
}

/// Where outbound messages for a ticket go.
struct Target {
    port: Arc<dyn MessagingPort>,
    recipient: Recipient,
    company_id: i64,
}

pub struct FlowGraphInterpreter {
    storage: Arc<dyn StorageAdapter>,
    router: QueueRouter,
    events: EventLog,
    registry: Arc<MessagingRegistry>,
    media: Arc<dyn MediaPort>,
    clock: Arc<dyn Clock>,
    settings: FlowSettings,
    rng: Mutex<StdRng>,
}

impl FlowGraphInterpreter {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        events: EventLog,
        registry: Arc<MessagingRegistry>,
        media: Arc<dyn MediaPort>,
        clock: Arc<dyn Clock>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            router: QueueRouter::new(storage.clone()),
            storage,
            events,
            registry,
            media,
            clock,
            settings,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the randomizer's entropy source with a seeded one.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn registry(&self) -> &Arc<MessagingRegistry> {
        &self.registry
    }

    /// Start `flow_id` from its root on a ticket that has no live cursor.
    pub async fn start(&self, ticket: &Ticket, flow_id: FlowId) -> Result<RunOutcome, TicketflowError> {
        let graph = self.load_graph(flow_id).await?;
        let session = new_session_hash();
        info!(ticket_id = ticket.id, flow_id, session = %session, "starting automation");
        let state = RunState {
            current_node: graph.root().id.clone(),
            pending_input: None,
            run_budget: graph.len(),
        };
        self.run(ticket, flow_id, session, state).await
    }

    /// Continue a suspended or interrupted automation with a new inbound event.
    pub async fn resume(
        &self,
        ticket: &Ticket,
        payload: &InboundPayload,
    ) -> Result<RunOutcome, TicketflowError> {
        if !ticket.flow_active {
            return Err(TicketflowError::conflict(format!(
                "ticket {} has no active automation",
                ticket.id
            )));
        }

        let key = payload.effective_key();
        if key.as_deref() == Some(STOP_KEYWORD) {
            return self.close_by_keyword(ticket.id).await;
        }

        let (Some(flow_id), Some(last)) = (ticket.flow_stopped_by, ticket.last_flow_id.clone())
        else {
            return Err(TicketflowError::Internal(format!(
                "ticket {} has an active automation without a cursor",
                ticket.id
            )));
        };
        let session = ticket
            .flow_session_hash
            .clone()
            .unwrap_or_else(new_session_hash);
        let graph = self.load_graph(flow_id).await?;

        let Some(node) = graph.node(&last) else {
            warn!(ticket_id = ticket.id, node_id = %last, "cursor points at a removed node");
            return self.exit(ticket.id, None, ExitReason::MissingNode).await;
        };

        let next = match (&node.kind, key) {
            (NodeKind::Menu(menu), None) => {
                debug!(ticket_id = ticket.id, node_id = %last, "no key in reply; re-prompting");
                let target = self.target_for(ticket).await?;
                self.outbox(&target).text(&menu.render()).await?;
                return Ok(RunOutcome::Suspended { node_id: last });
            }
            (NodeKind::Menu(_), Some(key)) => match graph.branch(&last, &format!("a{key}")) {
                Some(target) => RunState {
                    current_node: target.id.clone(),
                    pending_input: Some(key),
                    run_budget: graph.len(),
                },
                None => {
                    info!(ticket_id = ticket.id, node_id = %last, key = %key, "unmapped menu key");
                    return self.exit(ticket.id, Some(&last), ExitReason::UnmappedKey).await;
                }
            },
            // Recovery after an interrupted run: the cursor's node is done.
            (_, key) => match self.recovered_advance(&graph, node).await? {
                Some(Advance::Continue(next)) => RunState {
                    current_node: next,
                    pending_input: key,
                    run_budget: graph.len(),
                },
                Some(Advance::HandOff(next_flow)) => {
                    let next_graph = self.load_graph(next_flow).await?;
                    info!(ticket_id = ticket.id, from = flow_id, to = next_flow, "automation hand-off after recovery");
                    let state = RunState {
                        current_node: next_graph.root().id.clone(),
                        pending_input: None,
                        run_budget: next_graph.len(),
                    };
                    return self.run(ticket, next_flow, new_session_hash(), state).await;
                }
                Some(Advance::Suspend) | None => {
                    return self.exit(ticket.id, Some(&last), ExitReason::DeadEnd).await;
                }
            },
        };

        self.run(ticket, flow_id, session, next).await
    }

    /// Detach the automation from a ticket, e.g. when a human takes over.
    pub async fn stop(&self, ticket_id: TicketId) -> Result<bool, TicketflowError> {
        let stopped = self.storage.exit_flow(ticket_id, &self.now()).await?;
        if stopped {
            self.events
                .record(ticket_id, FlowLogType::Exit, EntryContext::default())
                .await;
        }
        Ok(stopped)
    }

    async fn run(
        &self,
        ticket: &Ticket,
        mut flow_id: FlowId,
        mut session: String,
        mut state: RunState,
    ) -> Result<RunOutcome, TicketflowError> {
        let target = self.target_for(ticket).await?;
        let mut visited_flows = HashSet::from([flow_id]);

        loop {
            if state.run_budget == 0 {
                warn!(ticket_id = ticket.id, flow_id, node_id = %state.current_node, "run budget exhausted");
                return self
                    .exit(ticket.id, Some(&state.current_node), ExitReason::BudgetExhausted)
                    .await;
            }

            let current = self
                .storage
                .get_ticket(ticket.id)
                .await?
                .ok_or_else(|| TicketflowError::not_found("ticket", ticket.id))?;
            if !current.status.allows_flow() {
                return self.abort(ticket.id, &state.current_node).await;
            }

            // Re-read so definition edits take effect at the next step.
            let graph = self.load_graph(flow_id).await?;
            let Some(node) = graph.node(&state.current_node).cloned() else {
                return self.exit(ticket.id, None, ExitReason::MissingNode).await;
            };
            state.run_budget -= 1;
            if let Some(key) = state.pending_input.take() {
                debug!(ticket_id = ticket.id, key = %key, node_id = %node.id, "menu answered");
            }

            let advance = match self.execute(&graph, &node, &current, &target).await? {
                Step::Advance(advance) => advance,
                Step::Exit(reason) => return self.exit(ticket.id, Some(&node.id), reason).await,
                Step::Abort => return self.abort(ticket.id, &node.id).await,
            };

            let cursor = FlowCursor {
                last_flow_id: Some(node.id.clone()),
                flow_active: true,
                flow_session_hash: Some(session.clone()),
                flow_stopped_by: Some(flow_id),
            };
            if !self.storage.save_flow_cursor(ticket.id, &cursor, &self.now()).await? {
                return self.abort(ticket.id, &node.id).await;
            }
            self.events
                .record(ticket.id, FlowLogType::Node, EntryContext::node(&node.id))
                .await;

            match advance {
                Advance::Continue(next) => state.current_node = next,
                Advance::Suspend => return Ok(RunOutcome::Suspended { node_id: node.id }),
                Advance::HandOff(next_flow) => {
                    if !visited_flows.insert(next_flow) {
                        warn!(ticket_id = ticket.id, flow_id = next_flow, "hand-off loop between automations");
                        return self.exit(ticket.id, Some(&node.id), ExitReason::DeadEnd).await;
                    }
                    let next_graph = self.load_graph(next_flow).await?;
                    info!(ticket_id = ticket.id, from = flow_id, to = next_flow, "automation hand-off");
                    flow_id = next_flow;
                    session = new_session_hash();
                    state = RunState {
                        current_node: next_graph.root().id.clone(),
                        pending_input: None,
                        run_budget: next_graph.len(),
                    };
                }
            }
        }
    }

    async fn execute(
        &self,
        graph: &FlowGraph,
        node: &Node,
        ticket: &Ticket,
        target: &Target,
    ) -> Result<Step, TicketflowError> {
        debug!(ticket_id = ticket.id, node_id = %node.id, node_type = node.kind.type_name(), "executing node");
        let outbox = self.outbox(target);
        let follow = |graph: &FlowGraph| match graph.next(&node.id) {
            Some(next) => Step::Advance(Advance::Continue(next.id.clone())),
            None => Step::Exit(ExitReason::DeadEnd),
        };

        let step = match &node.kind {
            NodeKind::Menu(menu) => {
                outbox.text(&menu.render()).await?;
                Step::Advance(Advance::Suspend)
            }
            NodeKind::SingleBlock(block) => {
                for element in &block.elements {
                    outbox.element(element).await?;
                }
                follow(graph)
            }
            NodeKind::Image(media) => {
                outbox
                    .media(MediaKind::Image, &media.url, media.caption.as_deref())
                    .await?;
                follow(graph)
            }
            NodeKind::Video(media) => {
                outbox
                    .media(MediaKind::Video, &media.url, media.caption.as_deref())
                    .await?;
                follow(graph)
            }
            NodeKind::Audio(media) => {
                outbox.media(MediaKind::Audio, &media.url, None).await?;
                follow(graph)
            }
            NodeKind::Interval(interval) => {
                outbox.wait(interval.seconds).await;
                follow(graph)
            }
            NodeKind::Randomizer(randomizer) => {
                let branch = self.flip(randomizer.percent);
                debug!(ticket_id = ticket.id, node_id = %node.id, branch = branch.handle(), "randomizer");
                match graph.branch(&node.id, branch.handle()) {
                    Some(next) => Step::Advance(Advance::Continue(next.id.clone())),
                    None => Step::Exit(ExitReason::DeadEnd),
                }
            }
            NodeKind::AssignQueue(assign) => {
                let queue = self.router.queue(assign.queue_id).await?;
                if !self
                    .storage
                    .set_ticket_queue(ticket.id, queue.id, &self.now())
                    .await?
                {
                    return Ok(Step::Abort);
                }
                self.events
                    .record(ticket.id, FlowLogType::Queue, EntryContext::queue(queue.id))
                    .await;
                match queue.flow_id {
                    Some(next_flow) if next_flow != graph.flow_id() => {
                        Step::Advance(Advance::HandOff(next_flow))
                    }
                    _ => follow(graph),
                }
            }
            NodeKind::Terminal => Step::Exit(ExitReason::Terminal),
        };
        Ok(step)
    }

    /// Successor of a node that completed before the run was interrupted.
    /// Randomizers flip again; an assignQueue whose queue carries another
    /// automation hands off to it. `None` is a dead end.
    async fn recovered_advance(
        &self,
        graph: &FlowGraph,
        node: &Node,
    ) -> Result<Option<Advance>, TicketflowError> {
        let next = match &node.kind {
            NodeKind::Randomizer(randomizer) => {
                graph.branch(&node.id, self.flip(randomizer.percent).handle())
            }
            NodeKind::AssignQueue(assign) => {
                let queue = self.router.queue(assign.queue_id).await?;
                if let Some(next_flow) = queue.flow_id.filter(|f| *f != graph.flow_id()) {
                    return Ok(Some(Advance::HandOff(next_flow)));
                }
                graph.next(&node.id)
            }
            _ => graph.next(&node.id),
        };
        Ok(next.map(|n| Advance::Continue(n.id.clone())))
    }

    fn flip(&self, percent: i64) -> Branch {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        choose_branch(percent, &mut *rng)
    }

    async fn exit(
        &self,
        ticket_id: TicketId,
        node_id: Option<&str>,
        reason: ExitReason,
    ) -> Result<RunOutcome, TicketflowError> {
        if !self.storage.exit_flow(ticket_id, &self.now()).await? {
            return self.abort(ticket_id, node_id.unwrap_or_default()).await;
        }
        let context = EntryContext {
            node_id,
            ..EntryContext::default()
        };
        self.events.record(ticket_id, FlowLogType::Exit, context).await;
        info!(ticket_id, ?reason, "automation exited");
        Ok(RunOutcome::Exited { reason })
    }

    async fn abort(&self, ticket_id: TicketId, node_id: &str) -> Result<RunOutcome, TicketflowError> {
        info!(ticket_id, node_id, "run aborted: ticket closed or claimed");
        let context = EntryContext {
            node_id: (!node_id.is_empty()).then_some(node_id),
            ..EntryContext::default()
        };
        self.events.record(ticket_id, FlowLogType::Abort, context).await;
        Ok(RunOutcome::Aborted)
    }

    async fn close_by_keyword(&self, ticket_id: TicketId) -> Result<RunOutcome, TicketflowError> {
        if self.storage.close_ticket(ticket_id, &self.now()).await? {
            self.events
                .record(ticket_id, FlowLogType::Close, EntryContext::default())
                .await;
            info!(ticket_id, "ticket closed by stop keyword");
        }
        Ok(RunOutcome::Closed)
    }

    async fn load_graph(&self, flow_id: FlowId) -> Result<FlowGraph, TicketflowError> {
        let record = self
            .storage
            .get_flow(flow_id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("flow", flow_id))?;
        FlowGraph::parse(record.id, &record.definition)
    }

    async fn target_for(&self, ticket: &Ticket) -> Result<Target, TicketflowError> {
        let channel = self
            .storage
            .get_channel(ticket.channel_id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("channel", ticket.channel_id))?;
        let contact = self
            .storage
            .get_contact(ticket.contact_id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("contact", ticket.contact_id))?;
        Ok(Target {
            port: self.registry.get(&channel).await?,
            recipient: Recipient::for_contact(channel.id, &contact),
            company_id: ticket.company_id,
        })
    }

    fn outbox<'a>(&'a self, target: &Target) -> Outbox<'a> {
        Outbox {
            port: target.port.clone(),
            media: self.media.as_ref(),
            clock: self.clock.as_ref(),
            settings: self.settings,
            recipient: target.recipient.clone(),
            company_id: target.company_id,
        }
    }

    fn now(&self) -> String {
        format_timestamp(self.clock.now())
    }
}

fn new_session_hash() -> String {
    uuid::Uuid::new_v4().to_string()
}
