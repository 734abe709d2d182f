//! Occupancy processes and summary statistics reconstructed from the agent table.

use std::fmt;
use std::ops::Add;

use parse_display::Display;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::types::{Agent, Time};
use crate::utils::prelude::*;

/// Number of agents in each part of a stage at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub in_system: usize,
    pub in_queue: usize,
    pub in_service: usize,
}

impl Occupancy {
    /// Count agents at `t`. Blocked or unfinished agents are never counted.
    pub fn at<'a>(agents: impl IntoIterator<Item = &'a Agent>, t: Time) -> Self {
        agents
            .into_iter()
            .filter_map(Agent::served_interval)
            .fold(Self::default(), |mut acc, (arrival, start, departure)| {
                if arrival <= t && t <= departure {
                    acc.in_system += 1;
                }
                if arrival <= t && t <= start {
                    acc.in_queue += 1;
                }
                if start < t && t <= departure {
                    acc.in_service += 1;
                }
                acc
            })
    }
}

impl Add for Occupancy {
    type Output = Occupancy;

    fn add(self, rhs: Self) -> Self::Output {
        Occupancy {
            in_system: self.in_system + rhs.in_system,
            in_queue: self.in_queue + rhs.in_queue,
            in_service: self.in_service + rhs.in_service,
        }
    }
}

/// Occupancy sampled on a time grid
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    times: Vec<Time>,
    counts: Vec<Occupancy>,
}

impl Timeline {
    /// `samples` evenly spaced points from 0 to `end`, both included
    pub fn grid(end: Time, samples: usize) -> Vec<Time> {
        match samples {
            0 => vec![],
            1 => vec![Time(0.0)],
            n => {
                let step = end.0 / (n - 1) as f64;
                (0..n)
                    .map(|i| if i == n - 1 { end } else { Time(step * i as f64) })
                    .collect()
            }
        }
    }

    pub fn sample(agents: &[Agent], grid: Vec<Time>) -> Self {
        let counts = grid.iter().map(|t| Occupancy::at(agents, *t)).collect();
        Self { times: grid, counts }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[Time] {
        &self.times
    }

    pub fn counts(&self) -> &[Occupancy] {
        &self.counts
    }

    pub fn iter(&self) -> impl Iterator<Item = (Time, Occupancy)> + '_ {
        self.times.iter().copied().zip(self.counts.iter().copied())
    }

    /// Element-wise sum, both timelines must share the same grid
    pub fn sum(&self, other: &Timeline) -> Result<Timeline> {
        if self.times != other.times {
            return Err(Error::invalid_parameter(
                "timeline",
                format!(
                    "can not sum timelines on different grids ({} vs {} samples)",
                    self.len(),
                    other.len()
                ),
            ));
        }
        Ok(Timeline {
            times: self.times.clone(),
            counts: self
                .counts
                .iter()
                .zip(other.counts.iter())
                .map(|(a, b)| *a + *b)
                .collect(),
        })
    }
}

/// A statistic that may not exist, e.g. a mean over zero admitted agents
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatValue {
    Defined(f64),
    Undefined,
}

impl StatValue {
    fn ratio(num: f64, den: usize) -> Self {
        if den == 0 {
            StatValue::Undefined
        } else {
            StatValue::Defined(num / den as f64)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            StatValue::Defined(v) => Some(*v),
            StatValue::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.value().is_some()
    }
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Defined(v) => fmt::Display::fmt(v, f),
            StatValue::Undefined => f.write_str("undefined"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[display(style = "snake_case")]
pub enum Metric {
    MeanSojournTime,
    MeanWaitingTime,
    MeanServiceTime,
    SojournTimeStdDev,
    WaitingProportion,
    BlockedProportion,
    ServersMaxUsage,
    Throughput,
}

/// Scalar statistics of one stage, indexed by metric
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    rows: Vec<(Metric, StatValue)>,
}

impl Stats {
    /// Requires the agents to be post-treated.
    pub fn compute(agents: &[Agent], timeline: &Timeline, servers: usize) -> Self {
        let present: Vec<_> = agents.iter().filter_map(|a| a.summary).collect();
        let admitted: Vec<_> = present.iter().filter(|s| !s.blocked).collect();
        let nb_admitted = admitted.len();

        let waiting: f64 = admitted.iter().map(|s| s.waiting.0).sum();
        let service: f64 = admitted.iter().map(|s| s.service.0).sum();
        let sojourns: Vec<f64> = admitted.iter().map(|s| s.sojourn.0).collect();

        let std_dev = if nb_admitted < 2 {
            StatValue::Undefined
        } else {
            StatValue::Defined(sojourns.iter().std_dev())
        };

        let saturated = timeline
            .counts()
            .iter()
            .filter(|c| c.in_service == servers)
            .count();

        let throughput = match agents.iter().filter_map(Agent::departure_time).max() {
            Some(end) if end.0 > 0.0 => StatValue::Defined(nb_admitted as f64 / end.0),
            _ => StatValue::Undefined,
        };

        let mean_sojourn = match nb_admitted {
            0 => StatValue::Undefined,
            _ => StatValue::Defined(sojourns.iter().mean()),
        };

        let rows = vec![
            (Metric::MeanSojournTime, mean_sojourn),
            (Metric::MeanWaitingTime, StatValue::ratio(waiting, nb_admitted)),
            (Metric::MeanServiceTime, StatValue::ratio(service, nb_admitted)),
            (Metric::SojournTimeStdDev, std_dev),
            (
                Metric::WaitingProportion,
                StatValue::ratio(admitted.iter().filter(|s| s.waited).count() as f64, nb_admitted),
            ),
            (
                Metric::BlockedProportion,
                StatValue::ratio(present.iter().filter(|s| s.blocked).count() as f64, present.len()),
            ),
            (
                Metric::ServersMaxUsage,
                StatValue::ratio(saturated as f64, timeline.len()),
            ),
            (Metric::Throughput, throughput),
        ];
        Self { rows }
    }

    pub fn get(&self, metric: Metric) -> StatValue {
        self.rows
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, v)| *v)
            .unwrap_or(StatValue::Undefined)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, StatValue)> + '_ {
        self.rows.iter().copied()
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (metric, value) in self.iter() {
            writeln!(f, "{:<24} {:.4}", metric.to_string(), value)?;
        }
        Ok(())
    }
}

/// What the animation needs to draw one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Snapshot {
    pub time: Time,
    pub in_queue: usize,
    pub in_service: usize,
    /// number of queue slots to draw
    pub queue_capacity: usize,
    pub servers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentSummary, Departure, Duration};
    use approx::assert_relative_eq;

    fn served(arrival: f64, start: f64, departure: f64) -> Agent {
        Agent {
            arrival_queue: Some(Time(arrival)),
            arrival_service: Some(Time(start)),
            departure: Some(Departure::Admitted(Time(departure))),
            server: Some(0),
            summary: Some(AgentSummary {
                sojourn: Duration(departure - arrival),
                waiting: Duration(start - arrival),
                service: Duration(departure - start),
                blocked: false,
                waited: start > arrival,
            }),
        }
    }

    fn blocked(arrival: f64) -> Agent {
        Agent {
            arrival_queue: Some(Time(arrival)),
            departure: Some(Departure::Blocked),
            summary: Some(AgentSummary {
                blocked: true,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn grid_is_linspace() {
        assert_eq!(Timeline::grid(Time(4.0), 5), vec![Time(0.0), Time(1.0), Time(2.0), Time(3.0), Time(4.0)]);
        assert_eq!(Timeline::grid(Time(4.0), 1), vec![Time(0.0)]);
        assert!(Timeline::grid(Time(4.0), 0).is_empty());
    }

    #[test]
    fn occupancy_boundaries() {
        let agents = vec![served(1.0, 2.0, 3.0), blocked(1.5)];
        // arrival instant counts as queued and in system
        assert_eq!(
            Occupancy::at(&agents, Time(1.0)),
            Occupancy {
                in_system: 1,
                in_queue: 1,
                in_service: 0
            }
        );
        // service start instant is still queued
        assert_eq!(Occupancy::at(&agents, Time(2.0)).in_queue, 1);
        assert_eq!(Occupancy::at(&agents, Time(2.0)).in_service, 0);
        assert_eq!(Occupancy::at(&agents, Time(3.0)).in_service, 1);
        assert_eq!(Occupancy::at(&agents, Time(3.5)), Occupancy::default());
    }

    #[test]
    fn stats_over_admitted() {
        let agents = vec![served(0.0, 0.0, 1.0), served(0.5, 1.0, 3.0), blocked(0.7), blocked(0.8)];
        let timeline = Timeline::sample(&agents, Timeline::grid(Time(3.0), 8));
        let stats = Stats::compute(&agents, &timeline, 1);

        assert_relative_eq!(stats.get(Metric::MeanSojournTime).value().unwrap(), 1.75);
        assert_relative_eq!(stats.get(Metric::MeanWaitingTime).value().unwrap(), 0.25);
        assert_relative_eq!(stats.get(Metric::MeanServiceTime).value().unwrap(), 1.5);
        assert_relative_eq!(stats.get(Metric::WaitingProportion).value().unwrap(), 0.5);
        assert_relative_eq!(stats.get(Metric::BlockedProportion).value().unwrap(), 0.5);
        assert_relative_eq!(stats.get(Metric::Throughput).value().unwrap(), 2.0 / 3.0);
        assert!(stats.get(Metric::SojournTimeStdDev).is_defined());
        let usage = stats.get(Metric::ServersMaxUsage).value().unwrap();
        assert!(usage > 0.0 && usage <= 1.0);
    }

    #[test]
    fn all_blocked_is_undefined() {
        let agents = vec![blocked(1.0), blocked(2.0)];
        let timeline = Timeline::sample(&agents, vec![]);
        let stats = Stats::compute(&agents, &timeline, 1);
        assert_eq!(stats.get(Metric::MeanSojournTime), StatValue::Undefined);
        assert_eq!(stats.get(Metric::WaitingProportion), StatValue::Undefined);
        assert_eq!(stats.get(Metric::ServersMaxUsage), StatValue::Undefined);
        assert_eq!(stats.get(Metric::BlockedProportion), StatValue::Defined(1.0));
        assert_eq!(stats.get(Metric::MeanWaitingTime).to_string(), "undefined");
    }

    #[test]
    fn sum_requires_same_grid() {
        let agents = vec![served(0.0, 0.0, 1.0)];
        let a = Timeline::sample(&agents, Timeline::grid(Time(1.0), 3));
        let b = Timeline::sample(&agents, Timeline::grid(Time(2.0), 3));
        assert!(a.sum(&b).is_err());

        let total = a.sum(&a).unwrap();
        assert_eq!(total.counts()[2].in_system, 2);
    }

    #[test]
    fn metric_names() {
        assert_eq!(Metric::MeanSojournTime.to_string(), "mean_sojourn_time");
        assert_eq!(Metric::ServersMaxUsage.to_string(), "servers_max_usage");
    }
}
