use mdc_fc::{FlightControl, Position};
use mdc_link::{MissionContext, ScenarioCoordinator, Transport};
use mdc_path::{plan_collection_path, GeometryError, Waypoint2D};
use mdc_proto::packet::{NodeId, ScenarioKind};
use mdc_proto::record::{describe_scenario, CollectionCycleRecord};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::sink::{RecordSink, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionState {
    Init,
    Negotiating,
    TakenOff,
    Traveling(usize),
    Collecting(usize),
    ReturnHome,
    Landing,
    EmergencyLanding,
    Finalized,
}

#[derive(Debug, Error)]
pub enum MissionError {
    #[error("scenario {0:?} cannot collect data")]
    NotADataScenario(ScenarioKind),
    #[error("collection path")]
    Geometry(#[from] GeometryError),
    #[error("flight command failed in {state:?}: {reason}")]
    Flight { state: MissionState, reason: String },
    #[error("saving results")]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone)]
pub struct MissionPlan {
    pub layers: i32,
    /// Above home.
    pub altitude_m: f64,
    pub scale_factor: f64,
    /// Fronts and sizes the spiral; `x` latitude, `y` longitude.
    pub orienting: Waypoint2D,
}

pub struct MissionController<T, F, S> {
    coordinator: ScenarioCoordinator<T>,
    flight: F,
    sink: S,
    plan: MissionPlan,
    state: MissionState,
    history: Vec<MissionState>,
    airborne: bool,
}

impl<T, F, S> MissionController<T, F, S>
where
    T: Transport,
    F: FlightControl,
    S: RecordSink,
{
    pub fn new(coordinator: ScenarioCoordinator<T>, flight: F, sink: S, plan: MissionPlan) -> Self {
        Self {
            coordinator,
            flight,
            sink,
            plan,
            state: MissionState::Init,
            history: vec![MissionState::Init],
            airborne: false,
        }
    }

    pub fn state(&self) -> MissionState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[MissionState] {
        &self.history
    }

    pub fn flight(&self) -> &F {
        &self.flight
    }

    pub fn coordinator(&self) -> &ScenarioCoordinator<T> {
        &self.coordinator
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Runs the whole cycle against `ctx`.
    ///
    /// Once the scenarios have been negotiated the cycle always ends with the
    /// switch-off pass and a persisted record, even after an abort or a
    /// failed flight command. A flight failure is still returned as the
    /// error, after the record is written.
    pub fn run(&mut self, ctx: &mut MissionContext) -> Result<CollectionCycleRecord, MissionError> {
        let scenario = self.coordinator.scenario();
        if scenario.data_request().is_none() {
            return Err(MissionError::NotADataScenario(scenario));
        }

        let home = self.flight.position().map_err(|e| self.flight_failure(e))?;
        info!("mission: home {:.7}, {:.7} @ {:.1} m MSL", home.lat, home.lon, home.alt_msl);
        let origin = Waypoint2D::new(home.lat, home.lon);
        let path = plan_collection_path(self.plan.layers, origin, self.plan.orienting, self.plan.scale_factor)?;
        let nodes = ctx.metrics.nodes().to_vec();
        info!("mission: {} collection point(s), {} node(s)", path.len(), nodes.len());

        ctx.metrics.mark_start();
        self.negotiate(ctx, &nodes, scenario);

        let cruise_alt = home.alt_msl + self.plan.altitude_m;
        let mut failure = self.fly(ctx, &nodes, &path, cruise_alt).err();
        if failure.is_some() {
            ctx.abort.trigger();
        }
        if let Some(e) = self.come_down(ctx, home, cruise_alt) {
            failure.get_or_insert(e);
        }

        self.switch_off_all(ctx, &nodes);
        ctx.metrics.mark_end();

        let record = ctx.metrics.to_record(describe_scenario(scenario, self.coordinator.duty_cycle()), ctx.aborted());
        let persisted = self.sink.append(&record);
        self.enter(MissionState::Finalized);
        info!(
            "mission: reliability {:?}, duration {:?} s, aborted {}",
            record.reliability, record.duration_s, record.aborted
        );

        if let Some(e) = failure {
            if let Err(sink_err) = persisted {
                error!("mission: results not saved: {}", sink_err);
            }
            return Err(e);
        }
        persisted?;
        Ok(record)
    }

    fn enter(&mut self, state: MissionState) {
        info!("mission: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    fn flight_failure(&self, e: anyhow::Error) -> MissionError {
        error!("mission: flight command failed in {:?}: {:#}", self.state, e);
        MissionError::Flight { state: self.state, reason: format!("{:#}", e) }
    }

    fn negotiate(&mut self, ctx: &mut MissionContext, nodes: &[NodeId], scenario: ScenarioKind) {
        self.enter(MissionState::Negotiating);
        for &node in nodes {
            if let Err(e) = self.coordinator.set_scenario(ctx, node, scenario) {
                if ctx.abort.trigger() {
                    warn!("mission: node {} refused {:?} ({}); aborting", node, scenario, e);
                }
            }
        }
    }

    /// Takeoff and the collection path. Returns early, without error, once
    /// the abort flag is seen.
    fn fly(&mut self, ctx: &mut MissionContext, nodes: &[NodeId], path: &[Waypoint2D], cruise_alt: f64) -> Result<(), MissionError> {
        if ctx.aborted() {
            warn!("mission: aborted on the ground, not taking off");
            return Ok(());
        }

        self.airborne = true;
        self.flight.takeoff(self.plan.altitude_m).map_err(|e| self.flight_failure(e))?;
        self.enter(MissionState::TakenOff);

        for (i, wp) in path.iter().enumerate() {
            if ctx.aborted() {
                info!("mission: abort seen before waypoint {}", i);
                return Ok(());
            }
            self.enter(MissionState::Traveling(i));
            self.flight.goto(wp.x, wp.y, cruise_alt).map_err(|e| self.flight_failure(e))?;

            self.enter(MissionState::Collecting(i));
            for &node in nodes {
                if ctx.aborted() {
                    info!("mission: abort seen before node {} at waypoint {}", node, i);
                    return Ok(());
                }
                if let Err(e) = self.coordinator.collect_from_node(ctx, node) {
                    debug!("mission: node {} skipped at waypoint {}: {}", node, i, e);
                }
            }
        }
        Ok(())
    }

    /// Gets the vehicle back on the ground, normally or straight down.
    fn come_down(&mut self, ctx: &MissionContext, home: Position, cruise_alt: f64) -> Option<MissionError> {
        if !self.airborne {
            return None;
        }
        if ctx.aborted() {
            return self.emergency_land();
        }

        self.enter(MissionState::ReturnHome);
        if let Err(e) = self.flight.goto(home.lat, home.lon, cruise_alt) {
            let failure = self.flight_failure(e);
            ctx.abort.trigger();
            self.emergency_land();
            return Some(failure);
        }

        self.enter(MissionState::Landing);
        if let Err(e) = self.flight.land() {
            let failure = self.flight_failure(e);
            ctx.abort.trigger();
            self.emergency_land();
            return Some(failure);
        }
        self.airborne = false;
        None
    }

    fn emergency_land(&mut self) -> Option<MissionError> {
        self.enter(MissionState::EmergencyLanding);
        match self.flight.land() {
            Ok(()) => {
                self.airborne = false;
                None
            }
            Err(e) => Some(self.flight_failure(e)),
        }
    }

    fn switch_off_all(&mut self, ctx: &mut MissionContext, nodes: &[NodeId]) {
        for &node in nodes {
            if let Ok(ms) = self.coordinator.switch_off(ctx, node) {
                info!("node {}: awake for {} ms", node, ms);
            }
        }
    }
}
