use educe::Educe;
use parse_display::Display;
use rand::Rng;
use rand_seeder::{Seeder, SipRng};

use crate::randvars::SharedRng;
use crate::types::AgentId;
use crate::utils::prelude::*;

/// Picks which waiting agent leaves the line next.
///
/// Returns a position into `waiting`, or `None` to admit nobody this step.
pub trait Policy {
    fn select(&mut self, waiting: &[AgentId]) -> Option<usize>;
}

impl<F> Policy for F
where
    F: FnMut(&[AgentId]) -> Option<usize>,
{
    fn select(&mut self, waiting: &[AgentId]) -> Option<usize> {
        self(waiting)
    }
}

/// Oldest arrival first
#[derive(Debug, Default, Clone, Copy)]
pub struct Fifo;

impl Policy for Fifo {
    fn select(&mut self, _: &[AgentId]) -> Option<usize> {
        Some(0)
    }
}

/// Newest arrival first
#[derive(Debug, Default, Clone, Copy)]
pub struct Lifo;

impl Policy for Lifo {
    fn select(&mut self, waiting: &[AgentId]) -> Option<usize> {
        waiting.len().checked_sub(1)
    }
}

/// Uniformly random waiting agent
#[derive(Debug)]
pub struct Random<T> {
    rng: T,
}

impl<T: Rng> Policy for Random<T> {
    fn select(&mut self, waiting: &[AgentId]) -> Option<usize> {
        if waiting.is_empty() {
            None
        } else {
            Some(self.rng.gen_range(0..waiting.len()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Display, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type")]
#[display("{}")]
pub enum PolicyConfig {
    Fifo,
    Lifo,
    Random {
        /// Optional seed. If none, will use the generator shared by the whole run
        seed: Option<String>,
    },
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig::Fifo
    }
}

impl PolicyConfig {
    pub fn build(&self, rng: &SharedRng) -> Box<dyn Policy> {
        debug!(policy = %self, "using");
        match self {
            PolicyConfig::Fifo => Box::new(Fifo),
            PolicyConfig::Lifo => Box::new(Lifo),
            PolicyConfig::Random { seed } => match seed {
                Some(seed) => {
                    let rng: SipRng = Seeder::from(seed.as_str()).make_rng();
                    Box::new(Random { rng })
                }
                None => Box::new(Random { rng: rng.clone() }),
            },
        }
    }
}

/// The agents waiting for a server, in arrival order
#[derive(Educe)]
#[educe(Debug)]
pub struct WaitingLine {
    queue: Vec<AgentId>,
    #[educe(Debug(ignore))]
    policy: Box<dyn Policy>,
}

impl Default for WaitingLine {
    fn default() -> Self {
        Self::new(Box::new(Fifo))
    }
}

impl WaitingLine {
    pub fn new(policy: Box<dyn Policy>) -> Self {
        Self {
            queue: vec![],
            policy,
        }
    }

    /// replace whatever is waiting with `queue`
    pub fn populate(&mut self, queue: impl IntoIterator<Item = AgentId>) {
        self.queue = queue.into_iter().collect();
    }

    pub fn push(&mut self, agent: AgentId) {
        self.queue.push(agent);
    }

    /// Remove the agent chosen by the policy.
    ///
    /// `None` when the line is empty or the policy picks nothing valid.
    pub fn pop(&mut self) -> Option<AgentId> {
        let pos = self.policy.select(&self.queue)?;
        if pos < self.queue.len() {
            Some(self.queue.remove(pos))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn waiting(&self) -> &[AgentId] {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_pops_in_order() {
        let mut wline = WaitingLine::default();
        wline.populate(vec![3, 1, 2]);
        assert_eq!(wline.pop(), Some(3));
        assert_eq!(wline.pop(), Some(1));
        wline.push(7);
        assert_eq!(wline.pop(), Some(2));
        assert_eq!(wline.pop(), Some(7));
        assert_eq!(wline.pop(), None);
    }

    #[test]
    fn lifo_pops_newest() {
        let mut wline = WaitingLine::new(Box::new(Lifo));
        wline.populate(0..3);
        assert_eq!(wline.pop(), Some(2));
        assert_eq!(wline.waiting(), &[0, 1]);
    }

    #[test]
    fn out_of_range_is_none() {
        let mut wline = WaitingLine::new(Box::new(|w: &[AgentId]| -> Option<usize> { Some(w.len() + 4) }));
        wline.populate(vec![0, 1]);
        assert_eq!(wline.pop(), None);
        assert_eq!(wline.len(), 2);

        let mut wline = WaitingLine::new(Box::new(|_: &[AgentId]| -> Option<usize> { None }));
        wline.populate(vec![0]);
        assert_eq!(wline.pop(), None);
    }

    #[test]
    fn populate_replaces() {
        let mut wline = WaitingLine::default();
        wline.populate(vec![1, 2]);
        wline.populate(vec![9]);
        assert_eq!(wline.waiting(), &[9]);
        assert_eq!(wline.pop(), Some(9));
        assert!(wline.is_empty());
    }

    #[test]
    fn random_policy_stays_in_bounds() {
        let rng = SharedRng::from_seed("policy");
        let mut wline = WaitingLine::new(PolicyConfig::Random { seed: None }.build(&rng));
        wline.populate(0..10);
        let mut popped: Vec<_> = std::iter::from_fn(|| wline.pop()).collect();
        popped.sort_unstable();
        assert_eq!(popped, (0..10).collect::<Vec<_>>());
    }
}
