// ── Device selector expressions ──
//
// `"1,3,5-7"` style expressions, normalized into sorted, merged inclusive
// ranges. An empty set matches nothing: an unfiltered console would
// subscribe to every device the stream knows about.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Normalized set of closed integer ranges.
///
/// Ranges are sorted by lower bound and never overlap or touch: any two
/// ranges with `next.start <= prev.end + 1` are merged on construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct IntervalSet {
    ranges: Vec<(i64, i64)>,
}

impl IntervalSet {
    /// Parse a comma-separated list of `n` and `a-b` tokens.
    ///
    /// Reversed bounds are swapped. Tokens that are not integers are
    /// skipped silently; parsing never fails.
    pub fn parse(expr: &str) -> Self {
        let mut ranges: Vec<(i64, i64)> = expr.split(',').filter_map(parse_token).collect();
        ranges.sort_unstable();

        let mut merged: Vec<(i64, i64)> = Vec::with_capacity(ranges.len());
        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        Self { ranges: merged }
    }

    /// `true` iff `device_id` is an integer inside one of the ranges.
    pub fn contains(&self, device_id: &str) -> bool {
        device_id
            .trim()
            .parse::<i64>()
            .is_ok_and(|value| self.contains_value(value))
    }

    pub fn contains_value(&self, value: i64) -> bool {
        self.ranges
            .binary_search_by(|&(start, end)| {
                if value < start {
                    Ordering::Greater
                } else if value > end {
                    Ordering::Less
                } else {
                    Ordering::Equal
                }
            })
            .is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[(i64, i64)] {
        &self.ranges
    }
}

/// `n` or `a-b`. The range separator is the first `-` after the first
/// character, so a leading minus stays a sign.
fn parse_token(token: &str) -> Option<(i64, i64)> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    let split = token
        .char_indices()
        .skip(1)
        .find_map(|(i, c)| (c == '-').then_some(i));

    match split {
        Some(i) => {
            let a = token[..i].trim().parse::<i64>().ok()?;
            let b = token[i + 1..].trim().parse::<i64>().ok()?;
            Some((a.min(b), a.max(b)))
        }
        None => {
            let n = token.parse::<i64>().ok()?;
            Some((n, n))
        }
    }
}

impl fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (start, end)) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for IntervalSet {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}
