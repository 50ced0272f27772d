// src/alloc/group.rs

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::alloc::allocator::{split, Color};
use crate::errors::{PlanError, Result};

/// A set of cooperating processes, seen from one of its ranks.
///
/// `subgroup` and `exchange` are collectives: every rank of the group has
/// to call them, in the same order and with the same arguments, or the
/// group is desynchronised.
pub trait ProcessGroup: fmt::Debug + Send + Sync {
    fn size(&self) -> usize;

    fn rank(&self) -> usize;

    /// Split the group by color. Returns the sub-group this rank belongs
    /// to, or `None` when its color is [`Color::Unassigned`].
    fn subgroup(&self, colors: &[Color]) -> Result<Option<Arc<dyn ProcessGroup>>>;

    /// Synchronise all ranks on `key`.
    fn exchange(&self, key: &str) -> Result<()>;
}

/// Collective calls seen by a [`LocalGroup`] and the groups split from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupEvent {
    Split { size: usize, rank: usize, colors: Vec<Color> },
    Exchange { size: usize, rank: usize, key: String },
}

/// One rank of a group whose other ranks are imagined.
///
/// Collectives complete immediately and are appended to a log shared with
/// every sub-group, which makes it possible to plan and run as any rank
/// of a larger group inside a single process.
#[derive(Debug, Clone)]
pub struct LocalGroup {
    size: usize,
    rank: usize,
    log: Arc<Mutex<Vec<GroupEvent>>>,
}

impl LocalGroup {
    pub fn new(size: usize, rank: usize) -> Self {
        Self {
            size,
            rank,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A group made of this process alone.
    pub fn single() -> Self {
        Self::new(1, 0)
    }

    pub fn events(&self) -> Vec<GroupEvent> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn record(&self, event: GroupEvent) -> Result<()> {
        self.log
            .lock()
            .map_err(|_| PlanError::Desync("group event log poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

impl ProcessGroup for LocalGroup {
    fn size(&self) -> usize {
        self.size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn subgroup(&self, colors: &[Color]) -> Result<Option<Arc<dyn ProcessGroup>>> {
        let parts = split(self, colors)?;
        self.record(GroupEvent::Split {
            size: self.size,
            rank: self.rank,
            colors: colors.to_vec(),
        })?;

        let mine = colors.get(self.rank).copied().ok_or_else(|| {
            PlanError::Desync(format!("rank {} is outside its group of size {}", self.rank, self.size))
        })?;
        if mine == Color::Unassigned {
            return Ok(None);
        }

        let sub = parts
            .into_iter()
            .find(|part| part.color == mine)
            .and_then(|part| {
                let rank = part.ranks.iter().position(|&r| r == self.rank)?;
                Some(LocalGroup {
                    size: part.ranks.len(),
                    rank,
                    log: Arc::clone(&self.log),
                })
            });

        Ok(sub.map(|group| Arc::new(group) as Arc<dyn ProcessGroup>))
    }

    fn exchange(&self, key: &str) -> Result<()> {
        self.record(GroupEvent::Exchange {
            size: self.size,
            rank: self.rank,
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_partitions_ranks_by_color() {
        let group = LocalGroup::new(4, 0);
        let colors = [Color::Arm(1), Color::Arm(0), Color::Unassigned, Color::Arm(1)];
        let parts = split(&group, &colors).unwrap();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].color, Color::Arm(0));
        assert_eq!(parts[0].ranks, vec![1]);
        assert_eq!(parts[1].ranks, vec![0, 3]);
        assert_eq!(parts[2].color, Color::Unassigned);
    }

    #[test]
    fn split_rejects_mismatched_colors() {
        let group = LocalGroup::new(3, 0);
        let err = split(&group, &[Color::Arm(0)]).unwrap_err();
        assert!(matches!(err, PlanError::Desync(_)));
    }

    #[test]
    fn subgroup_renumbers_ranks() {
        let group = LocalGroup::new(3, 2);
        let sub = group
            .subgroup(&[Color::Arm(0), Color::Arm(1), Color::Arm(1)])
            .unwrap()
            .unwrap();

        assert_eq!(sub.size(), 2);
        assert_eq!(sub.rank(), 1);

        sub.exchange("k").unwrap();
        assert_eq!(group.events().len(), 2);
    }

    #[test]
    fn unassigned_rank_gets_no_subgroup() {
        let group = LocalGroup::new(2, 1);
        let sub = group.subgroup(&[Color::Arm(0), Color::Unassigned]).unwrap();
        assert!(sub.is_none());
    }
}
