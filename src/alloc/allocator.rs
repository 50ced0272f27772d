// src/alloc/allocator.rs

use std::collections::BTreeMap;

use crate::alloc::group::ProcessGroup;
use crate::errors::{PlanError, Result};

/// Which arm of a parallel node a rank works for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Color {
    Arm(usize),
    /// Left over once every arm has what it asked for.
    Unassigned,
}

/// Ranks of a group that share one color, in rank order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubGroup {
    pub color: Color,
    pub ranks: Vec<usize>,
}

/// Hand out `size` processes one at a time, cycling over the positive
/// requests until each has what it asked for or the processes run out.
pub fn round_robin(requests: &[usize], size: usize) -> Vec<usize> {
    let mut assigned = vec![0; requests.len()];
    let limit = size.min(requests.iter().sum());
    let mut total = 0;

    while total < limit {
        for (slot, &requested) in assigned.iter_mut().zip(requests) {
            if *slot < requested {
                *slot += 1;
                total += 1;
                if total == limit {
                    break;
                }
            }
        }
    }

    assigned
}

/// Round-robin allocation that fails when an arm asking for processes
/// got none.
///
/// `names` labels the arms in error messages and must match `requests`
/// in length.
pub fn allocate(names: &[String], requests: &[usize], size: usize) -> Result<Vec<usize>> {
    let assigned = round_robin(requests, size);

    let starved = requests
        .iter()
        .zip(&assigned)
        .position(|(&requested, &got)| requested > 0 && got == 0);
    if let Some(i) = starved {
        return Err(PlanError::Allocation {
            unit: names.get(i).cloned().unwrap_or_else(|| i.to_string()),
            requested: requests[i],
        });
    }

    Ok(assigned)
}

/// Color `size` ranks: the first `assigned[0]` ranks work for arm 0, the
/// next `assigned[1]` for arm 1, and so on; the rest are unassigned.
pub fn colors(assigned: &[usize], size: usize) -> Vec<Color> {
    let mut colors: Vec<Color> = assigned
        .iter()
        .enumerate()
        .flat_map(|(arm, &count)| std::iter::repeat_n(Color::Arm(arm), count))
        .take(size)
        .collect();
    colors.resize(size, Color::Unassigned);
    colors
}

/// Partition the ranks of `group` by color. Sub-groups come out ordered by
/// color, unassigned ranks last.
pub fn split(group: &dyn ProcessGroup, colors: &[Color]) -> Result<Vec<SubGroup>> {
    if colors.len() != group.size() {
        return Err(PlanError::Desync(format!(
            "{} colors for a group of {} ranks",
            colors.len(),
            group.size()
        )));
    }

    let mut by_color: BTreeMap<Color, Vec<usize>> = BTreeMap::new();
    for (rank, &color) in colors.iter().enumerate() {
        by_color.entry(color).or_default().push(rank);
    }

    Ok(by_color
        .into_iter()
        .map(|(color, ranks)| SubGroup { color, ranks })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("arm{i}")).collect()
    }

    #[test]
    fn everyone_satisfied_when_processes_suffice() {
        assert_eq!(round_robin(&[2, 1, 0], 3), vec![2, 1, 0]);
        assert_eq!(round_robin(&[2, 1, 0], 8), vec![2, 1, 0]);
    }

    #[test]
    fn scarce_processes_are_spread_first() {
        assert_eq!(round_robin(&[2, 1, 0], 2), vec![1, 1, 0]);
        assert_eq!(round_robin(&[3, 3], 5), vec![3, 2]);
    }

    #[test]
    fn starved_arm_is_an_error() {
        let err = allocate(&names(2), &[3, 1], 1).unwrap_err();
        match err {
            PlanError::Allocation { unit, requested } => {
                assert_eq!(unit, "arm1");
                assert_eq!(requested, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_requests_never_starve() {
        assert_eq!(allocate(&names(2), &[0, 0], 4).unwrap(), vec![0, 0]);
    }

    #[test]
    fn colors_follow_arm_index() {
        assert_eq!(
            colors(&[1, 0, 2], 4),
            vec![Color::Arm(0), Color::Arm(2), Color::Arm(2), Color::Unassigned]
        );
    }
}
