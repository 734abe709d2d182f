use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Deref, Sub};

use serde::{Deserialize, Serialize};

/// Arrival-order index of an agent, 0-based
pub type AgentId = usize;

/// A time point in simulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Time(pub f64);

/// A duration of time in simulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Duration(pub f64);

impl Deref for Time {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deref for Duration {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// Simulated times are never NaN, so a total order is fine here.
impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Self::Output {
        Time(self.0 + rhs.0)
    }
}

impl AddAssign<Duration> for Time {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub for Time {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        Duration(self.0 - rhs.0)
    }
}

impl From<f64> for Time {
    fn from(v: f64) -> Self {
        Time(v)
    }
}

impl From<f64> for Duration {
    fn from(v: f64) -> Self {
        Duration(v)
    }
}

/// How an agent left the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Departure {
    /// Served, leaving at the given time
    Admitted(Time),
    /// Rejected on arrival because the system was at capacity
    Blocked,
}

impl Departure {
    pub fn time(&self) -> Option<Time> {
        match self {
            Departure::Admitted(t) => Some(*t),
            Departure::Blocked => None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Departure::Blocked)
    }
}

/// Durations derived once a run is over
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AgentSummary {
    pub sojourn: Duration,
    pub waiting: Duration,
    pub service: Duration,
    pub blocked: bool,
    pub waited: bool,
}

/// One row of the agent table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Agent {
    /// time the agent joins the waiting line
    pub arrival_queue: Option<Time>,
    /// time the agent starts service
    pub arrival_service: Option<Time>,
    pub departure: Option<Departure>,
    /// server slot the agent was assigned to
    pub server: Option<usize>,
    pub summary: Option<AgentSummary>,
}

impl Agent {
    /// departure time if the agent was served
    pub fn departure_time(&self) -> Option<Time> {
        self.departure.and_then(|d| d.time())
    }

    pub fn is_blocked(&self) -> bool {
        self.departure.map(|d| d.is_blocked()).unwrap_or(false)
    }

    /// (arrival, service start, departure) when the agent went through service
    pub fn served_interval(&self) -> Option<(Time, Time, Time)> {
        Some((self.arrival_queue?, self.arrival_service?, self.departure_time()?))
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |t: Option<Time>| t.map(|t| format!("{:.2}", t)).unwrap_or_else(|| "None".into());
        match self.departure {
            Some(Departure::Blocked) => write!(f, "Agent(@{}, blocked)", opt(self.arrival_queue)),
            _ => write!(
                f,
                "Agent(@{}<{}<{})",
                opt(self.arrival_queue),
                opt(self.arrival_service),
                opt(self.departure_time())
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_arith() {
        let t = Time(1.5) + Duration(2.0);
        assert_eq!(t, Time(3.5));
        assert_eq!(t - Time(1.0), Duration(2.5));
        assert!(Time(1.0) < Time(1.5));
    }

    #[test]
    fn agent_display() {
        let agent = Agent {
            arrival_queue: Some(Time(1.0)),
            arrival_service: Some(Time(2.0)),
            departure: Some(Departure::Admitted(Time(3.25))),
            server: Some(0),
            summary: None,
        };
        assert_eq!(agent.to_string(), "Agent(@1.00<2.00<3.25)");

        let blocked = Agent {
            arrival_queue: Some(Time(1.0)),
            departure: Some(Departure::Blocked),
            ..Default::default()
        };
        assert!(blocked.is_blocked());
        assert_eq!(blocked.departure_time(), None);
        assert_eq!(blocked.to_string(), "Agent(@1.00, blocked)");
    }
}
