use std::collections::BTreeMap;

use crate::qs::{QueueSystem, StageConfig};
use crate::randvars::SharedRng;
use crate::timeline::{Stats, Timeline};
use crate::types::{Agent, Time};
use crate::utils::prelude::*;

/// Timeline and statistics of one stage
#[derive(Debug, Clone)]
pub struct StageTimeline {
    pub name: String,
    pub timeline: Timeline,
    pub stats: Stats,
}

#[derive(Debug, Clone)]
pub struct WaterfallTimeline {
    pub stages: Vec<StageTimeline>,
    /// both stages on one grid, summed
    pub combined: Timeline,
}

/// Two stages in tandem: whoever leaves the first stage arrives at the second.
#[derive(Debug)]
pub struct Waterfall {
    first: QueueSystem,
    second: QueueSystem,
    size: usize,
}

impl Waterfall {
    pub const FIRST: &'static str = "first";
    pub const SECOND: &'static str = "second";

    /// Both stages draw from `rng`, first stage first.
    pub fn new(first: StageConfig, second: StageConfig, size: usize, rng: &SharedRng) -> Result<Self> {
        if first.arrival.is_none() {
            return Err(Error::invalid_parameter(
                "arrival",
                "the first stage of a waterfall needs an arrival distribution",
            ));
        }
        Ok(Self {
            first: QueueSystem::new(Self::FIRST, first, size, rng)?,
            second: QueueSystem::new(Self::SECOND, second, size, rng)?,
            size,
        })
    }

    pub fn first(&self) -> &QueueSystem {
        &self.first
    }

    pub fn second(&self) -> &QueueSystem {
        &self.second
    }

    pub fn stages(&self) -> [&QueueSystem; 2] {
        [&self.first, &self.second]
    }

    pub fn run(&mut self) -> Result<()> {
        let _g = info_span!("waterfall").entered();

        self.first.pretreat()?;
        self.first.run()?;

        // blocked agents never reach the second stage
        let departures: Vec<Time> = self
            .first
            .agents()
            .iter()
            .filter_map(Agent::departure_time)
            .collect();
        info!(forwarded = departures.len(), "feeding second stage");
        self.second.feed(departures)?;

        self.second.run()
    }

    /// Post-treat both stages without sampling any timeline
    pub fn posttreat_stages(&mut self) {
        self.first.posttreat();
        self.second.posttreat();
    }

    /// Post-treat both stages, statistics keyed by stage name
    pub fn posttreat(&mut self, resolution: usize) -> Result<BTreeMap<String, Stats>> {
        self.posttreat_stages();

        self.stages()
            .iter()
            .map(|qs| Ok((qs.name().to_owned(), qs.timeline(resolution)?.1)))
            .collect()
    }

    pub fn timeline(&self, resolution: usize) -> Result<WaterfallTimeline> {
        let stages = self
            .stages()
            .iter()
            .map(|qs| {
                let (timeline, stats) = qs.timeline(resolution)?;
                Ok(StageTimeline {
                    name: qs.name().to_owned(),
                    timeline,
                    stats,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // a common grid so the two series line up
        let end = self
            .stages()
            .iter()
            .filter_map(|qs| qs.max_departure())
            .max()
            .unwrap_or_default();
        let grid = Timeline::grid(end, resolution * self.size);
        let combined = self
            .first
            .occupancy_on(&grid)
            .sum(&self.second.occupancy_on(&grid))?;

        Ok(WaterfallTimeline { stages, combined })
    }
}
