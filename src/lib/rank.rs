//! The per-rank cooperative event loop.
//!
//! One logical thread of control per rank: a scheduler turn drains the
//! inbox, dispatches each message to the active phase handler, gives the
//! handler one `tick`, advances any pending table rehash by a bounded
//! step, and hands the turn's outbox to the transport. Components never
//! block: a handler waiting on acknowledgements simply returns from its
//! tick and is called again next turn.
//!
//! Rank 0 doubles as the coordinator: it opens the first phase, counts
//! the per-rank done reports, starts the next phase once every rank has
//! reported, and broadcasts the kill message after the last one.

use crate::builder::AcademyBuilder;
use crate::config::Parameters;
use crate::edge_linker::EdgeLinker;
use crate::errors::Result;
use crate::gatherer::{CoverageGatherer, CoverageSource};
use crate::graph::GraphStore;
use crate::message::{Message, MessageTag, Outbox, OutboundMessage};
use crate::reads::ReadStore;
use crate::router::MessageRouter;
use crate::transport::Transport;
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Rank that coordinates phase transitions.
pub const COORDINATOR_RANK: u16 = 0;

/// Messages dispatched per scheduler turn before ticking the handler.
const INBOX_PER_TURN: usize = 1024;

/// How long an idle turn waits for the next message.
const IDLE_WAIT: Duration = Duration::from_micros(500);

/// The phases a rank can be driven through, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Stream reads into the distributed academy.
    CountKmers,
    /// Gather the candidate coverage histogram.
    AcademyCoverage,
    /// Promote candidates into graph vertices (local, no messaging).
    PromoteVertices,
    /// Distribute de Bruijn edges to vertex owners.
    LinkEdges,
    /// Gather the vertex coverage histogram and write the listing.
    GraphCoverage,
}

impl Phase {
    /// Wire encoding of the phase.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        match self {
            Phase::CountKmers => 0,
            Phase::AcademyCoverage => 1,
            Phase::PromoteVertices => 2,
            Phase::LinkEdges => 3,
            Phase::GraphCoverage => 4,
        }
    }

    /// Decode a phase from its wire encoding.
    #[must_use]
    pub fn from_u64(value: u64) -> Option<Phase> {
        match value {
            0 => Some(Phase::CountKmers),
            1 => Some(Phase::AcademyCoverage),
            2 => Some(Phase::PromoteVertices),
            3 => Some(Phase::LinkEdges),
            4 => Some(Phase::GraphCoverage),
            _ => None,
        }
    }
}

/// What one worker accomplished, collected after the run.
#[derive(Debug, Default)]
pub struct RankReport {
    /// This worker's rank.
    pub rank: u16,
    /// Valid windows routed during counting.
    pub kmers_observed: u64,
    /// Windows skipped for malformed symbols.
    pub invalid_windows: u64,
    /// Adjacent window pairs routed during edge linking.
    pub edges_emitted: u64,
    /// Candidates held when the academy histogram was gathered.
    pub academy_size: u64,
    /// Vertices held after promotion.
    pub graph_size: u64,
    /// Vertices promoted from the academy.
    pub promoted: u64,
    /// Global candidate histogram (aggregator rank only).
    pub academy_distribution: BTreeMap<u64, u64>,
    /// Global vertex histogram (aggregator rank only).
    pub graph_distribution: BTreeMap<u64, u64>,
    /// This rank's share of the k-mer listing, if one was written.
    pub kmer_listing: Option<PathBuf>,
}

/// Everything a phase handler may touch during one scheduler turn.
pub struct RankContext<'a> {
    /// This rank's configuration.
    pub params: &'a Parameters,
    /// The rank-local graph shard (vertices plus academy).
    pub store: &'a mut GraphStore,
    /// The rank's partition of the reads.
    pub reads: &'a ReadStore,
    /// Outbound record buffers with flow control.
    pub router: &'a mut MessageRouter,
    /// Messages to hand to the transport at the end of the turn.
    pub outbox: &'a mut Outbox,
    /// Accumulated results.
    pub report: &'a mut RankReport,
}

/// One registered phase behavior: inbox dispatch plus a cooperative tick.
pub trait PhaseHandler {
    /// Handle one delivered message for this phase.
    fn on_message(&mut self, ctx: &mut RankContext<'_>, message: &Message);

    /// Run one bounded slice of work. Never blocks; leaving sends
    /// unacknowledged and returning is the cooperative suspension.
    fn tick(&mut self, ctx: &mut RankContext<'_>) -> Result<()>;
}

/// Queue this rank's done report for the coordinator.
pub fn report_phase_done(outbox: &mut Outbox, phase: Phase) {
    outbox.push(OutboundMessage {
        destination: COORDINATOR_RANK,
        tag: MessageTag::PhaseDone,
        payload: vec![phase.as_u64()],
    });
}

/// Defensive handling of a message the current phase cannot accept:
/// fatal in debug builds, logged and ignored in release builds. State is
/// never touched either way.
pub fn protocol_violation(rank: u16, message: &Message, phase: &str) {
    debug_assert!(
        false,
        "rank {rank}: unexpected {:?} from rank {} during {phase}",
        message.tag, message.source
    );
    warn!(
        "rank {rank}: ignoring unexpected {:?} from rank {} during {phase}",
        message.tag, message.source
    );
}

/// Local promotion step between the academy and edge phases.
struct PromoteVertices {
    phase: Phase,
    done: bool,
}

impl PromoteVertices {
    fn new(phase: Phase) -> PromoteVertices {
        PromoteVertices { phase, done: false }
    }
}

impl PhaseHandler for PromoteVertices {
    fn on_message(&mut self, ctx: &mut RankContext<'_>, message: &Message) {
        protocol_violation(ctx.params.rank, message, "vertex promotion");
    }

    fn tick(&mut self, ctx: &mut RankContext<'_>) -> Result<()> {
        if self.done {
            return Ok(());
        }
        let promoted = ctx.store.promote_candidates(ctx.params.min_coverage);
        ctx.report.promoted = promoted;
        ctx.report.graph_size = ctx.store.size();
        info!(
            "Rank {}: promoted {promoted} candidates at coverage >= {}",
            ctx.params.rank, ctx.params.min_coverage
        );
        report_phase_done(ctx.outbox, self.phase);
        self.done = true;
        Ok(())
    }
}

/// Phase sequencing state kept by rank 0.
struct Coordinator {
    phases: Vec<Phase>,
    current: usize,
    done_reports: u16,
}

impl Coordinator {
    fn new(phases: Vec<Phase>) -> Coordinator {
        Coordinator { phases, current: 0, done_reports: 0 }
    }

    fn current_phase(&self) -> Phase {
        self.phases[self.current]
    }
}

/// The run-wide plan shared by every worker.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Phases to execute, in order.
    pub phases: Vec<Phase>,
    /// Prefix for output files, when any phase writes them.
    pub output_prefix: Option<PathBuf>,
    /// Whether the graph coverage phase writes the k-mer listing.
    pub write_kmer_listing: bool,
}

impl RunPlan {
    /// Phases for a counting-only run.
    #[must_use]
    pub fn counting() -> RunPlan {
        RunPlan {
            phases: vec![Phase::CountKmers, Phase::AcademyCoverage],
            output_prefix: None,
            write_kmer_listing: false,
        }
    }

    /// Phases for a full graph build.
    #[must_use]
    pub fn full_build() -> RunPlan {
        RunPlan {
            phases: vec![
                Phase::CountKmers,
                Phase::AcademyCoverage,
                Phase::PromoteVertices,
                Phase::LinkEdges,
                Phase::GraphCoverage,
            ],
            output_prefix: None,
            write_kmer_listing: false,
        }
    }
}

/// One rank's event loop, owning every rank-local structure exclusively.
pub struct RankWorker<T: Transport> {
    params: Parameters,
    transport: T,
    plan: RunPlan,
    store: GraphStore,
    reads: ReadStore,
    router: MessageRouter,
    outbox: Outbox,
    report: RankReport,
    handler: Option<Box<dyn PhaseHandler>>,
    coordinator: Option<Coordinator>,
    killed: bool,
}

impl<T: Transport> RankWorker<T> {
    /// Assemble a worker for one rank.
    #[must_use]
    pub fn new(params: Parameters, transport: T, reads: ReadStore, plan: RunPlan) -> Self {
        let rank = params.rank;
        let coordinator =
            (rank == COORDINATOR_RANK).then(|| Coordinator::new(plan.phases.clone()));
        let store = GraphStore::new(rank, params.word_size);
        let router = MessageRouter::new(params.world_size, params.max_message_bytes);
        RankWorker {
            params,
            transport,
            plan,
            store,
            reads,
            router,
            outbox: Outbox::new(),
            report: RankReport { rank, ..RankReport::default() },
            handler: None,
            coordinator,
            killed: false,
        }
    }

    /// Run the event loop until the kill message arrives. Returns the
    /// rank's report.
    pub fn run(mut self) -> Result<RankReport> {
        if self.coordinator.is_some() {
            self.broadcast_start();
        }
        loop {
            let mut received = false;
            for _ in 0..INBOX_PER_TURN {
                let Some(message) = self.transport.try_receive() else { break };
                received = true;
                self.dispatch(&message)?;
            }

            if self.killed && self.outbox.is_empty() {
                break;
            }

            self.tick_handler()?;
            self.store.complete_resizing();

            let sent = !self.outbox.is_empty();
            for message in self.outbox.drain(..) {
                self.transport.send(message.destination, message.tag, message.payload);
            }

            if !received && !sent {
                if let Some(message) = self.transport.receive_timeout(IDLE_WAIT) {
                    self.dispatch(&message)?;
                }
            }
        }
        info!("Rank {} finished", self.params.rank);
        Ok(self.report)
    }

    fn tick_handler(&mut self) -> Result<()> {
        let Some(handler) = self.handler.as_mut() else { return Ok(()) };
        let mut ctx = RankContext {
            params: &self.params,
            store: &mut self.store,
            reads: &self.reads,
            router: &mut self.router,
            outbox: &mut self.outbox,
            report: &mut self.report,
        };
        handler.tick(&mut ctx)
    }

    fn dispatch(&mut self, message: &Message) -> Result<()> {
        match message.tag {
            MessageTag::StartPhase => {
                let Some(phase) = message.payload.first().copied().and_then(Phase::from_u64)
                else {
                    protocol_violation(self.params.rank, message, "phase control");
                    return Ok(());
                };
                self.begin_phase(phase);
            }
            MessageTag::Kill => {
                self.killed = true;
            }
            MessageTag::PhaseDone => self.record_phase_done(message),
            _ => {
                let Some(handler) = self.handler.as_mut() else {
                    protocol_violation(self.params.rank, message, "no active phase");
                    return Ok(());
                };
                let mut ctx = RankContext {
                    params: &self.params,
                    store: &mut self.store,
                    reads: &self.reads,
                    router: &mut self.router,
                    outbox: &mut self.outbox,
                    report: &mut self.report,
                };
                handler.on_message(&mut ctx, message);
            }
        }
        Ok(())
    }

    fn begin_phase(&mut self, phase: Phase) {
        let rank = self.params.rank;
        info!("Rank {rank}: entering phase {phase:?}");
        self.handler = Some(match phase {
            Phase::CountKmers => Box::new(AcademyBuilder::new(phase, rank)),
            Phase::AcademyCoverage => {
                Box::new(CoverageGatherer::new(phase, CoverageSource::Academy, None))
            }
            Phase::PromoteVertices => Box::new(PromoteVertices::new(phase)),
            Phase::LinkEdges => Box::new(EdgeLinker::new(phase, rank)),
            Phase::GraphCoverage => {
                let listing = self.plan.write_kmer_listing.then(|| {
                    let prefix = self
                        .plan
                        .output_prefix
                        .clone()
                        .unwrap_or_else(|| PathBuf::from("braid"));
                    let mut name = prefix.into_os_string();
                    name.push(format!(".kmers.rank{rank}.txt"));
                    PathBuf::from(name)
                });
                Box::new(CoverageGatherer::new(phase, CoverageSource::Graph, listing))
            }
        });
    }

    fn record_phase_done(&mut self, message: &Message) {
        let Some(coordinator) = self.coordinator.as_mut() else {
            protocol_violation(self.params.rank, message, "phase control");
            return;
        };
        let reported = message.payload.first().copied().and_then(Phase::from_u64);
        if reported != Some(coordinator.current_phase()) {
            protocol_violation(self.params.rank, message, "phase control");
            return;
        }
        coordinator.done_reports += 1;
        if coordinator.done_reports < self.params.world_size {
            return;
        }
        info!(
            "All {} ranks finished phase {:?}",
            self.params.world_size,
            coordinator.current_phase()
        );
        coordinator.done_reports = 0;
        coordinator.current += 1;
        if coordinator.current < coordinator.phases.len() {
            self.broadcast_start();
        } else {
            for destination in 0..self.params.world_size {
                self.transport.send(destination, MessageTag::Kill, Vec::new());
            }
        }
    }

    fn broadcast_start(&mut self) {
        let phase = self
            .coordinator
            .as_ref()
            .expect("only the coordinator broadcasts")
            .current_phase();
        for destination in 0..self.params.world_size {
            self.transport.send(destination, MessageTag::StartPhase, vec![phase.as_u64()]);
        }
    }
}
