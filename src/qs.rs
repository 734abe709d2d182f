use std::iter;

use crate::randvars::{RandomVariable, SharedRng, VariateSource};
use crate::servers::ServerPool;
use crate::timeline::{Occupancy, Snapshot, Stats, Timeline};
use crate::types::{Agent, AgentId, AgentSummary, Departure, Duration, Time};
use crate::utils::prelude::*;
use crate::wline::{Policy, PolicyConfig, WaitingLine};

/// Configuration of one queue + servers stage
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StageConfig {
    /// Interarrival distribution, not needed when the stage is fed by another stage
    #[serde(default)]
    pub arrival: Option<RandomVariable>,
    pub service: RandomVariable,
    pub servers: usize,
    /// Waiting places, unbounded when unset
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl StageConfig {
    pub fn new(arrival: Option<RandomVariable>, service: RandomVariable, servers: usize) -> Self {
        Self {
            arrival,
            service,
            servers,
            capacity: None,
            policy: PolicyConfig::Fifo,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.servers == 0 {
            return Err(Error::invalid_parameter("servers", "at least one server is required"));
        }
        if let Some(arrival) = &self.arrival {
            arrival.validate()?;
        }
        self.service.validate()
    }
}

/// One queueing stage: a waiting line in front of a pool of servers.
///
/// Agents are processed strictly in arrival order. The pool tells where
/// the next admitted agent sits; when it is full the agent waits for the
/// occupant departing first.
#[derive(Debug)]
pub struct QueueSystem {
    name: String,
    cfg: StageConfig,
    size: usize,
    wline: WaitingLine,
    servers: ServerPool,
    variates: VariateSource,
    tops: Vec<Agent>,
    post_treated: bool,
}

impl QueueSystem {
    pub fn new(name: impl Into<String>, cfg: StageConfig, size: usize, rng: &SharedRng) -> Result<Self> {
        let name = name.into();
        if size == 0 {
            return Err(Error::invalid_parameter("size", "run length must be positive"));
        }
        cfg.validate()?;

        info!(stage = %name, servers = cfg.servers, capacity = ?cfg.capacity, size, "new stage");
        Ok(Self {
            wline: WaitingLine::new(cfg.policy.build(rng)),
            servers: ServerPool::new(cfg.servers),
            variates: VariateSource::new(cfg.arrival.as_ref(), &cfg.service, rng)?,
            tops: vec![Agent::default(); size],
            post_treated: false,
            size,
            name,
            cfg,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &StageConfig {
        &self.cfg
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Replace the selection policy built from the config
    pub fn set_policy(&mut self, policy: impl Policy + 'static) {
        self.wline = WaitingLine::new(Box::new(policy));
    }

    pub fn agents(&self) -> &[Agent] {
        &self.tops
    }

    /// Number of leading rows with an arrival, the rest are absent
    pub fn present(&self) -> usize {
        self.tops
            .iter()
            .take_while(|a| a.arrival_queue.is_some())
            .count()
    }

    /// Generate arrival times from the interarrival distribution
    pub fn pretreat(&mut self) -> Result<()> {
        let gaps = self.variates.arrivals(self.size)?;
        let mut now = Time(0.0);
        for (agent, gap) in self.tops.iter_mut().zip(gaps) {
            now += gap;
            *agent = Agent {
                arrival_queue: Some(now),
                ..Default::default()
            };
        }
        self.post_treated = false;
        debug!(stage = %self.name, last_arrival = %now, "arrivals generated");
        Ok(())
    }

    /// Take arrival times from upstream, in order. Rows past the end stay absent.
    pub fn feed(&mut self, arrivals: impl IntoIterator<Item = Time>) -> Result<()> {
        let arrivals: Vec<_> = arrivals.into_iter().collect();
        if arrivals.len() > self.size {
            return Err(Error::invalid_parameter(
                "arrivals",
                format!("{} arrivals fed to a stage of size {}", arrivals.len(), self.size),
            ));
        }
        self.tops = vec![Agent::default(); self.size];
        for (agent, t) in self.tops.iter_mut().zip(arrivals) {
            agent.arrival_queue = Some(t);
        }
        self.post_treated = false;
        debug!(stage = %self.name, present = self.present(), "arrivals fed");
        Ok(())
    }

    /// Seat `agent` on a server and draw its service.
    fn admit(&mut self, agent: AgentId) -> Result<()> {
        let arrival = self.tops[agent]
            .arrival_queue
            .ok_or_else(|| Error::invalid_parameter("agent", format!("agent {} has no arrival", agent)))?;

        let tops = &self.tops;
        let slot = self
            .servers
            .next_slot_and_occupant_to_replace(|a| tops[a].departure_time().unwrap_or_default())
            .ok_or_else(|| Error::invalid_parameter("servers", "no server slot"))?;
        self.servers.assign(slot.index, agent);

        let mut start = arrival;
        if let Some(leaving) = slot.displaced.and_then(|a| self.tops[a].departure_time()) {
            if arrival < leaving {
                start = leaving;
            }
        }
        let departure = start + self.variates.service();

        let row = &mut self.tops[agent];
        row.arrival_service = Some(start);
        row.departure = Some(Departure::Admitted(departure));
        row.server = Some(slot.index);
        trace!(stage = %self.name, agent, server = slot.index, displaced = ?slot.displaced, %row, "admitted");
        Ok(())
    }

    /// Agents among `0..before` whose departure is after `t`
    fn in_system(&self, before: AgentId, t: Time) -> usize {
        self.tops[..before]
            .iter()
            .filter_map(Agent::departure_time)
            .filter(|d| *d > t)
            .count()
    }

    /// The index-driven processing loop.
    ///
    /// Each step admits at most one waiting agent, then decides whether the
    /// next arrival is blocked or joins the line.
    pub fn run(&mut self) -> Result<()> {
        let _g = info_span!("run", stage = %self.name).entered();

        let n = self.present();
        if n == 0 {
            warn!("no arrivals, nothing to run");
            return Ok(());
        }

        // a stage can be pretreated and run again, nobody holds a server yet
        self.servers = ServerPool::new(self.cfg.servers);
        self.wline.populate(iter::once(0));
        let mut buffer_ix = 1;
        let mut blocked = 0;

        while buffer_ix < n {
            if let Some(next) = self.wline.pop() {
                self.admit(next)?;
            }

            let arrival = self.tops[buffer_ix].arrival_queue.unwrap_or_default();
            let in_system = self.in_system(buffer_ix, arrival);
            match self.cfg.capacity {
                Some(capacity) if in_system >= capacity + self.cfg.servers => {
                    trace!(agent = buffer_ix, in_system, "blocked");
                    self.tops[buffer_ix].departure = Some(Departure::Blocked);
                    blocked += 1;
                }
                _ => self.wline.push(buffer_ix),
            }

            buffer_ix += 1;
        }

        // no arrivals left, whoever still waits gets served
        while let Some(next) = self.wline.pop() {
            self.admit(next)?;
        }
        if !self.wline.is_empty() {
            warn!(left = self.wline.len(), "policy left agents waiting");
        }

        self.post_treated = false;
        info!(agents = n, blocked, "run done");
        Ok(())
    }

    /// Derive sojourn, waiting and service durations
    pub fn posttreat(&mut self) {
        for agent in self.tops.iter_mut() {
            agent.summary = match (agent.departure, agent.arrival_queue, agent.arrival_service) {
                (Some(Departure::Blocked), _, _) => Some(AgentSummary {
                    blocked: true,
                    ..Default::default()
                }),
                (Some(Departure::Admitted(departure)), Some(arrival), Some(start)) => {
                    let waiting = start - arrival;
                    Some(AgentSummary {
                        sojourn: departure - arrival,
                        waiting,
                        service: departure - start,
                        blocked: false,
                        waited: waiting > Duration(0.0),
                    })
                }
                _ => None,
            };
        }
        self.post_treated = true;
    }

    pub fn max_departure(&self) -> Option<Time> {
        self.tops.iter().filter_map(Agent::departure_time).max()
    }

    /// Occupancy on a caller-provided grid
    pub fn occupancy_on(&self, grid: &[Time]) -> Timeline {
        Timeline::sample(&self.tops, grid.to_vec())
    }

    /// Occupancy sampled `resolution` times per agent row, and the summary statistics
    pub fn timeline(&self, resolution: usize) -> Result<(Timeline, Stats)> {
        if resolution == 0 {
            return Err(Error::invalid_parameter("resolution", "must be positive"));
        }
        if !self.post_treated {
            return Err(Error::NotPostTreated(self.name.clone()));
        }

        let end = self.max_departure().unwrap_or_default();
        let grid = Timeline::grid(end, resolution * self.size);
        let timeline = Timeline::sample(&self.tops, grid);
        let stats = Stats::compute(&self.tops, &timeline, self.cfg.servers);
        Ok((timeline, stats))
    }

    /// Agents waiting and in service at `t`, with the layout to draw them
    pub fn snapshot(&self, t: Time) -> Snapshot {
        let (in_queue, in_service) = self
            .tops
            .iter()
            .filter_map(Agent::served_interval)
            .filter(|(arrival, _, departure)| *arrival <= t && t < *departure)
            .fold((0, 0), |(queue, service), (_, start, _)| {
                if start > t {
                    (queue + 1, service)
                } else {
                    (queue, service + 1)
                }
            });
        Snapshot {
            time: t,
            in_queue,
            in_service,
            queue_capacity: self.cfg.capacity.unwrap_or(self.size),
            servers: self.cfg.servers,
        }
    }

    /// Occupancy at a single instant
    pub fn occupancy_at(&self, t: Time) -> Occupancy {
        Occupancy::at(&self.tops, t)
    }
}
