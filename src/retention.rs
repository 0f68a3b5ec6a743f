//! Retention policy resolution
//!
//! Maps a generation list and a [`DeletionSpec`] to the set of generation
//! numbers to delete. Pure: no filesystem access and no processes, the clock
//! is passed in.

use crate::error::{Error, Result};
use crate::types::{DeletionSpec, Generation};
use chrono::{DateTime, Local};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::warn;

/// Result of resolving a deletion policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Generation numbers to delete, ascending
    Remove(Vec<u64>),
    /// The selectors matched nothing deletable
    NothingToRemove,
    /// `min` is at least the number of existing generations
    MinimumNotMet { min: usize, total: usize },
}

impl Resolution {
    #[cfg(test)]
    pub fn removal(&self) -> &[u64] {
        match self {
            Resolution::Remove(numbers) => numbers,
            _ => &[],
        }
    }
}

/// Resolve which generations a deletion policy removes
pub fn resolve(
    generations: &[Generation],
    spec: &DeletionSpec,
    now: DateTime<Local>,
) -> Result<Resolution> {
    let current = generations.iter().find(|g| g.is_current).map(|g| g.number);
    let existing: BTreeSet<u64> = generations.iter().map(|g| g.number).collect();

    // an unknown current generation could land in any selector's removal set
    if current.is_none() && !generations.is_empty() {
        return Err(Error::validation(
            "cannot determine the current generation; refusing to delete any generation",
        ));
    }

    validate(spec, current, &existing)?;

    let total = generations.len();
    if let (Some(min), false) = (spec.min, spec.all) {
        if min >= total {
            return Ok(Resolution::MinimumNotMet { min, total });
        }
    }

    let mut removal: BTreeSet<u64> = if spec.all {
        if spec.has_selectors() {
            warn!("--all was given; ignoring all other generation selectors");
        }
        existing.clone()
    } else {
        select(generations, spec, &existing, now)?
    };

    if !spec.all {
        for number in &spec.keep {
            removal.remove(number);
        }
    }
    if let Some(current) = current {
        removal.remove(&current);
    }

    if let (Some(min), false) = (spec.min, spec.all) {
        while total - removal.len() < min {
            match removal.iter().next_back().copied() {
                Some(highest) => {
                    removal.remove(&highest);
                }
                None => break,
            }
        }
    }

    if removal.is_empty() {
        Ok(Resolution::NothingToRemove)
    } else {
        Ok(Resolution::Remove(removal.into_iter().collect()))
    }
}

fn validate(spec: &DeletionSpec, current: Option<u64>, existing: &BTreeSet<u64>) -> Result<()> {
    if let Some(conflict) = spec.remove.intersection(&spec.keep).next() {
        return Err(Error::validation(format!(
            "generation {} is both kept and removed",
            conflict
        )));
    }

    if let Some(current) = current {
        if spec.remove.contains(&current) {
            return Err(Error::validation(format!(
                "generation {} is the current generation and cannot be deleted",
                current
            )));
        }
    }

    if let Some(missing) = spec.remove.iter().find(|n| !existing.contains(n)) {
        return Err(Error::validation(format!(
            "generation {} does not exist",
            missing
        )));
    }

    Ok(())
}

/// Union of explicit, range and age selectors
fn select(
    generations: &[Generation],
    spec: &DeletionSpec,
    existing: &BTreeSet<u64>,
    now: DateTime<Local>,
) -> Result<BTreeSet<u64>> {
    let mut removal = spec.remove.clone();

    if spec.from.is_some() || spec.to.is_some() {
        let (Some(&lowest), Some(&highest)) = (existing.first(), existing.last()) else {
            return Ok(removal);
        };
        let from = spec.from.unwrap_or(lowest);
        let to = spec.to.unwrap_or(highest);

        if from > to {
            return Err(Error::validation(format!(
                "invalid range: --from {} is greater than --to {}",
                from, to
            )));
        }
        for bound in [from, to] {
            if bound < lowest || bound > highest {
                return Err(Error::validation(format!(
                    "range bound {} is outside the existing generations {}..={}",
                    bound, lowest, highest
                )));
            }
        }

        removal.extend(existing.range(from..=to).copied());
    }

    if let Some(older_than) = spec.older_than {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|_| Error::validation("--older-than period is too large"))?;
        let cutoff = now - age;
        removal.extend(
            generations
                .iter()
                .filter(|g| g.creation_date.is_some_and(|d| d < cutoff))
                .map(|g| g.number),
        );
    }

    Ok(removal)
}

/// Parse a period such as `30d`, `2w`, `1d12h` or `1w 2d`
///
/// Units: `s`, `m`/`min`, `h`, `d`, `w`, `M`/`mo` (30 days), `y` (365 days).
pub fn parse_period(input: &str) -> Result<Duration> {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    let invalid = || Error::validation(format!("invalid period '{}'", input));

    let mut total: u64 = 0;
    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(invalid());
    }

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(invalid());
        }
        let amount: u64 = rest[..digits_end].parse().map_err(|_| invalid())?;
        rest = &rest[digits_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c.is_whitespace())
            .unwrap_or(rest.len());
        let seconds = match &rest[..unit_end] {
            "s" | "sec" => 1,
            "m" | "min" => MINUTE,
            "h" => HOUR,
            "d" => DAY,
            "w" => 7 * DAY,
            "M" | "mo" => 30 * DAY,
            "y" => 365 * DAY,
            _ => return Err(invalid()),
        };
        rest = rest[unit_end..].trim_start();

        total = amount
            .checked_mul(seconds)
            .and_then(|s| total.checked_add(s))
            .ok_or_else(invalid)?;
    }

    Ok(Duration::from_secs(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn generations(numbers: impl IntoIterator<Item = u64>, current: u64) -> Vec<Generation> {
        numbers
            .into_iter()
            .map(|n| {
                let mut g = Generation::bare(n);
                g.is_current = n == current;
                g.creation_date = Some(now() - chrono::Duration::days(30 - n as i64));
                g
            })
            .collect()
    }

    fn days(n: u64) -> Duration {
        Duration::from_secs(n * 24 * 60 * 60)
    }

    #[test]
    fn test_all_removes_everything_but_current() {
        let gens = generations(1..=5, 5);
        let spec = DeletionSpec {
            all: true,
            ..Default::default()
        };
        let resolution = resolve(&gens, &spec, now()).unwrap();
        assert_eq!(resolution, Resolution::Remove(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_all_ignores_other_selectors() {
        let gens = generations(1..=5, 5);
        let spec = DeletionSpec {
            all: true,
            from: Some(2),
            to: Some(3),
            ..Default::default()
        };
        let resolution = resolve(&gens, &spec, now()).unwrap();
        assert_eq!(resolution.removal(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_older_than_selects_old_generations() {
        let mut gens = generations(1..=10, 10);
        for g in gens.iter_mut() {
            let age = if g.number <= 6 { 40 } else { 2 };
            g.creation_date = Some(now() - chrono::Duration::days(age));
        }
        let spec = DeletionSpec {
            older_than: Some(days(30)),
            keep: BTreeSet::from([3]),
            ..Default::default()
        };
        let resolution = resolve(&gens, &spec, now()).unwrap();
        assert_eq!(resolution.removal(), &[1, 2, 4, 5, 6]);
    }

    #[test]
    fn test_older_than_skips_unknown_dates() {
        let mut gens = generations(1..=3, 3);
        gens[0].creation_date = None;
        let spec = DeletionSpec {
            older_than: Some(days(1)),
            ..Default::default()
        };
        let resolution = resolve(&gens, &spec, now()).unwrap();
        assert_eq!(resolution.removal(), &[2]);
    }

    #[test]
    fn test_min_alone_is_noop() {
        let gens = generations(1..=5, 5);
        let spec = DeletionSpec {
            min: Some(3),
            ..Default::default()
        };
        assert_eq!(resolve(&gens, &spec, now()).unwrap(), Resolution::NothingToRemove);
    }

    #[test]
    fn test_min_keeps_highest_numbered() {
        let gens = generations(1..=10, 10);
        let spec = DeletionSpec {
            from: Some(1),
            to: Some(9),
            min: Some(4),
            ..Default::default()
        };
        let resolution = resolve(&gens, &spec, now()).unwrap();
        // 10 stays as current; 7, 8, 9 are restored to reach four survivors
        assert_eq!(resolution.removal(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_min_counts_keep_and_current_as_survivors() {
        let gens = generations(1..=6, 6);
        let spec = DeletionSpec {
            from: Some(1),
            to: Some(5),
            keep: BTreeSet::from([1]),
            min: Some(3),
            ..Default::default()
        };
        let resolution = resolve(&gens, &spec, now()).unwrap();
        assert_eq!(resolution.removal(), &[2, 3, 4]);
    }

    #[test]
    fn test_min_at_or_above_total_skips_deletion() {
        let gens = generations(1..=5, 5);
        let spec = DeletionSpec {
            from: Some(1),
            to: Some(4),
            min: Some(5),
            ..Default::default()
        };
        assert_eq!(
            resolve(&gens, &spec, now()).unwrap(),
            Resolution::MinimumNotMet { min: 5, total: 5 }
        );
    }

    #[test]
    fn test_keep_remove_conflict_is_rejected() {
        let gens = generations(1..=5, 5);
        let spec = DeletionSpec {
            remove: BTreeSet::from([2, 3]),
            keep: BTreeSet::from([3]),
            ..Default::default()
        };
        let err = resolve(&gens, &spec, now()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_removing_current_is_rejected() {
        let gens = generations(1..=5, 5);
        let spec = DeletionSpec {
            remove: BTreeSet::from([5]),
            ..Default::default()
        };
        assert!(matches!(
            resolve(&gens, &spec, now()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_removing_unknown_generation_is_rejected() {
        let gens = generations(1..=5, 5);
        let spec = DeletionSpec {
            remove: BTreeSet::from([42]),
            ..Default::default()
        };
        assert!(matches!(
            resolve(&gens, &spec, now()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_range_defaults_and_current_protection() {
        let gens = generations(3..=8, 8);
        let spec = DeletionSpec {
            from: Some(6),
            ..Default::default()
        };
        let resolution = resolve(&gens, &spec, now()).unwrap();
        assert_eq!(resolution.removal(), &[6, 7]);

        let spec = DeletionSpec {
            to: Some(4),
            ..Default::default()
        };
        assert_eq!(resolve(&gens, &spec, now()).unwrap().removal(), &[3, 4]);
    }

    #[test]
    fn test_invalid_ranges_are_rejected() {
        let gens = generations(3..=8, 8);
        for (from, to) in [(Some(6), Some(4)), (Some(1), Some(4)), (Some(4), Some(9))] {
            let spec = DeletionSpec {
                from,
                to,
                ..Default::default()
            };
            assert!(
                matches!(resolve(&gens, &spec, now()), Err(Error::Validation(_))),
                "range {:?}..{:?} should be rejected",
                from,
                to
            );
        }
    }

    #[test]
    fn test_current_never_removed() {
        let gens = generations(1..=8, 4);
        let specs = [
            DeletionSpec {
                all: true,
                ..Default::default()
            },
            DeletionSpec {
                from: Some(1),
                to: Some(8),
                ..Default::default()
            },
            DeletionSpec {
                older_than: Some(days(0)),
                min: Some(2),
                ..Default::default()
            },
        ];
        for spec in &specs {
            let resolution = resolve(&gens, spec, now()).unwrap();
            assert!(!resolution.removal().contains(&4), "{:?}", spec);
        }
    }

    #[test]
    fn test_unknown_current_refuses_deletion() {
        let gens = generations(1..=3, 0);
        let specs = [
            DeletionSpec {
                all: true,
                ..Default::default()
            },
            DeletionSpec {
                from: Some(1),
                to: Some(3),
                ..Default::default()
            },
        ];
        for spec in &specs {
            let err = resolve(&gens, spec, now()).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{:?}", spec);
        }
        assert_eq!(
            resolve(&[], &specs[0], now()).unwrap(),
            Resolution::NothingToRemove
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let gens = generations(1..=10, 7);
        let spec = DeletionSpec {
            older_than: Some(days(25)),
            from: Some(8),
            keep: BTreeSet::from([2]),
            min: Some(3),
            ..Default::default()
        };
        let first = resolve(&gens, &spec, now()).unwrap();
        let second = resolve(&gens, &spec, now()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_period() {
        assert_eq!(parse_period("30d").unwrap(), days(30));
        assert_eq!(parse_period("2w").unwrap(), days(14));
        assert_eq!(parse_period("1w 2d").unwrap(), days(9));
        assert_eq!(
            parse_period("1d12h").unwrap(),
            Duration::from_secs(36 * 60 * 60)
        );
        assert_eq!(parse_period("90min").unwrap(), Duration::from_secs(90 * 60));
        assert_eq!(parse_period("1y").unwrap(), days(365));
        assert_eq!(parse_period("2M").unwrap(), days(60));
    }

    #[test]
    fn test_parse_period_rejects_garbage() {
        for input in ["", "d", "10", "10x", "-3d", "1d h"] {
            assert!(parse_period(input).is_err(), "{:?} should be rejected", input);
        }
    }
}
