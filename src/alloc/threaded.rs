// src/alloc/threaded.rs

//! An in-process world of ranks backed by threads.
//!
//! Each rank gets a [`ThreadedGroup`] handle. Collectives meet in a
//! rendezvous round: the last rank to arrive compares what every rank
//! brought and publishes one outcome for the whole round. Rounds that
//! disagree, or that a rank never joins, fail on every participant.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::alloc::allocator::Color;
use crate::alloc::group::ProcessGroup;
use crate::config::PlannerConfig;
use crate::errors::{PlanError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Payload {
    Split(Vec<Color>),
    Exchange(String),
}

#[derive(Debug)]
enum Outcome {
    Split(BTreeMap<Color, Arc<Rendezvous>>),
    Exchange,
    Failed(String),
}

#[derive(Debug)]
struct Round {
    generation: u64,
    payloads: Vec<Option<Payload>>,
    arrived: usize,
    /// Outcome of the most recent round, tagged with its generation.
    outcome: Option<(u64, Arc<Outcome>)>,
}

impl Round {
    fn close(&mut self, outcome: Arc<Outcome>) {
        self.outcome = Some((self.generation, outcome));
        self.generation += 1;
        self.arrived = 0;
        self.payloads.iter_mut().for_each(|p| *p = None);
    }
}

#[derive(Debug)]
struct Rendezvous {
    size: usize,
    timeout: Duration,
    round: Mutex<Round>,
    cond: Condvar,
}

fn poisoned<T>(_: PoisonError<T>) -> PlanError {
    PlanError::Desync("collective state poisoned by a panicking rank".to_string())
}

impl Rendezvous {
    fn new(size: usize, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            size,
            timeout,
            round: Mutex::new(Round {
                generation: 0,
                payloads: vec![None; size],
                arrived: 0,
                outcome: None,
            }),
            cond: Condvar::new(),
        })
    }

    /// Join the current round with `payload` and wait for its outcome.
    fn arrive(&self, rank: usize, payload: Payload) -> Result<Arc<Outcome>> {
        let mut round = self.round.lock().map_err(poisoned)?;
        let generation = round.generation;

        let size = self.size;
        let Some(slot) = round.payloads.get_mut(rank) else {
            return Err(PlanError::Desync(format!(
                "rank {rank} is outside its group of size {size}"
            )));
        };
        if slot.is_some() {
            return Err(PlanError::Desync(format!(
                "rank {rank} entered collective round {generation} twice"
            )));
        }
        *slot = Some(payload);
        round.arrived += 1;

        if round.arrived == self.size {
            let payloads: Vec<Payload> = round.payloads.iter_mut().filter_map(Option::take).collect();
            let outcome = Arc::new(self.resolve(payloads));
            round.close(Arc::clone(&outcome));
            self.cond.notify_all();
            return finish(outcome);
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some((done, outcome)) = &round.outcome {
                if *done == generation {
                    return finish(Arc::clone(outcome));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let msg = format!(
                    "rank {rank} waited {:?} for collective round {generation}; only {} of {} ranks arrived",
                    self.timeout, round.arrived, self.size
                );
                warn!(rank, generation, "collective timed out");
                round.close(Arc::new(Outcome::Failed(msg.clone())));
                self.cond.notify_all();
                return Err(PlanError::Desync(msg));
            }

            let (guard, _) = self
                .cond
                .wait_timeout(round, deadline - now)
                .map_err(poisoned)?;
            round = guard;
        }
    }

    fn resolve(&self, payloads: Vec<Payload>) -> Outcome {
        let Some(first) = payloads.first() else {
            return Outcome::Failed("empty collective round".to_string());
        };
        if let Some(rank) = payloads.iter().position(|p| p != first) {
            return Outcome::Failed(format!(
                "rank {rank} brought {:?} but rank 0 brought {first:?}",
                payloads[rank]
            ));
        }

        match first {
            Payload::Exchange(_) => Outcome::Exchange,
            Payload::Split(colors) => {
                let mut counts: BTreeMap<Color, usize> = BTreeMap::new();
                for &color in colors.iter().filter(|c| **c != Color::Unassigned) {
                    *counts.entry(color).or_default() += 1;
                }
                Outcome::Split(
                    counts
                        .into_iter()
                        .map(|(color, size)| (color, Rendezvous::new(size, self.timeout)))
                        .collect(),
                )
            }
        }
    }
}

fn finish(outcome: Arc<Outcome>) -> Result<Arc<Outcome>> {
    match outcome.as_ref() {
        Outcome::Failed(msg) => Err(PlanError::Desync(msg.clone())),
        _ => Ok(outcome),
    }
}

/// One rank's handle on a threaded group.
#[derive(Debug)]
pub struct ThreadedGroup {
    rank: usize,
    rendezvous: Arc<Rendezvous>,
}

impl ProcessGroup for ThreadedGroup {
    fn size(&self) -> usize {
        self.rendezvous.size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn subgroup(&self, colors: &[Color]) -> Result<Option<Arc<dyn ProcessGroup>>> {
        if colors.len() != self.size() {
            return Err(PlanError::Desync(format!(
                "{} colors for a group of {} ranks",
                colors.len(),
                self.size()
            )));
        }

        let outcome = self
            .rendezvous
            .arrive(self.rank, Payload::Split(colors.to_vec()))?;
        let Outcome::Split(parts) = outcome.as_ref() else {
            return Err(PlanError::Desync("split answered by a different collective".to_string()));
        };

        let mine = colors[self.rank];
        let Some(rendezvous) = parts.get(&mine) else {
            return Ok(None);
        };
        let rank = colors[..self.rank].iter().filter(|&&c| c == mine).count();
        debug!(rank = self.rank, sub_rank = rank, color = ?mine, "joined sub-group");

        Ok(Some(Arc::new(ThreadedGroup {
            rank,
            rendezvous: Arc::clone(rendezvous),
        })))
    }

    fn exchange(&self, key: &str) -> Result<()> {
        self.rendezvous
            .arrive(self.rank, Payload::Exchange(key.to_string()))
            .map(|_| ())
    }
}

/// A fixed set of ranks sharing one top-level group.
#[derive(Debug)]
pub struct ThreadedWorld {
    ranks: Vec<Arc<ThreadedGroup>>,
}

impl ThreadedWorld {
    pub fn new(size: usize, timeout: Duration) -> Result<Self> {
        if size == 0 {
            return Err(PlanError::ConfigError(
                "a process group needs at least one rank".to_string(),
            ));
        }

        let rendezvous = Rendezvous::new(size, timeout);
        let ranks = (0..size)
            .map(|rank| {
                Arc::new(ThreadedGroup {
                    rank,
                    rendezvous: Arc::clone(&rendezvous),
                })
            })
            .collect();
        Ok(Self { ranks })
    }

    pub fn from_config(config: &PlannerConfig) -> Result<Self> {
        Self::new(config.group_size(), config.collective_timeout())
    }

    pub fn size(&self) -> usize {
        self.ranks.len()
    }

    pub fn group(&self, rank: usize) -> Option<Arc<dyn ProcessGroup>> {
        let group = Arc::clone(self.ranks.get(rank)?);
        Some(group)
    }

    /// Run `f` once per rank, each on its own thread, and collect the
    /// results in rank order.
    pub fn run<T, F>(&self, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(Arc<dyn ProcessGroup>) -> T + Sync,
    {
        thread::scope(|s| {
            let handles: Vec<_> = self
                .ranks
                .iter()
                .map(|group| {
                    let group: Arc<dyn ProcessGroup> = group.clone();
                    let f = &f;
                    s.spawn(move || f(group))
                })
                .collect();

            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(value) => value,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn matching_exchanges_complete_on_every_rank() {
        let world = ThreadedWorld::new(3, TIMEOUT).unwrap();
        let results = world.run(|group| group.exchange("step"));
        assert!(results.iter().all(Result::is_ok));
    }

    #[test]
    fn mismatched_keys_desync_every_rank() {
        let world = ThreadedWorld::new(2, TIMEOUT).unwrap();
        let results = world.run(|group| {
            let key = if group.rank() == 0 { "a" } else { "b" };
            group.exchange(key)
        });
        assert!(results.iter().all(|r| matches!(r, Err(PlanError::Desync(_)))));
    }

    #[test]
    fn split_hands_out_renumbered_subgroups() {
        let world = ThreadedWorld::new(3, TIMEOUT).unwrap();
        let colors = [Color::Arm(0), Color::Arm(0), Color::Unassigned];
        let results = world.run(|group| {
            group
                .subgroup(&colors)
                .map(|sub| sub.map(|g| (g.size(), g.rank())))
        });

        assert_eq!(results[0].as_ref().unwrap(), &Some((2, 0)));
        assert_eq!(results[1].as_ref().unwrap(), &Some((2, 1)));
        assert_eq!(results[2].as_ref().unwrap(), &None);
    }

    #[test]
    fn missing_rank_times_out() {
        let world = ThreadedWorld::new(2, Duration::from_millis(50)).unwrap();
        let results = world.run(|group| {
            if group.rank() == 0 {
                group.exchange("lonely")
            } else {
                Ok(())
            }
        });
        assert!(matches!(results[0], Err(PlanError::Desync(_))));
    }

    #[test]
    fn empty_world_is_rejected() {
        assert!(ThreadedWorld::new(0, TIMEOUT).is_err());
    }
}
