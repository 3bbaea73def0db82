//! Table operations over fundamentals records.
//!
//! These are the building blocks the repository query and the ranking stage
//! are expressed in: row filtering, fractional ranking of one column and
//! latest-record-per-company grouping.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::types::{Direction, FundamentalRecord};

/// Keep rows matching `pred`, preserving input order.
pub fn select<T: Clone>(rows: &[T], pred: impl Fn(&T) -> bool) -> Vec<T> {
    rows.iter().filter(|r| pred(r)).cloned().collect()
}

/// Fractional (average) ranks for one column, 1-based.
///
/// Ties share the mean of the positions they occupy: values `[10, 10, 5]`
/// ranked ascending give `[2.5, 2.5, 1.0]`. `None` and non-finite inputs get
/// a `None` rank and do not consume a position.
pub fn rank_by(values: &[Option<f64>], direction: Direction) -> Vec<Option<f64>> {
    let mut present: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.filter(|x| x.is_finite()).map(|x| (i, x)))
        .collect();

    present.sort_by(|a, b| {
        let ord = a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal);
        match direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    });

    let mut out = vec![None; values.len()];
    let mut i = 0;
    while i < present.len() {
        let mut j = i;
        while j + 1 < present.len() && present[j + 1].1 == present[i].1 {
            j += 1;
        }
        // Positions i..=j (0-based) share rank mean(i+1 ..= j+1).
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for p in &present[i..=j] {
            out[p.0] = Some(avg);
        }
        i = j + 1;
    }
    out
}

/// For each company, the record with the greatest `year <= cutoff_year`.
///
/// Output follows the order in which companies first appear in `rows`.
pub fn group_latest_by_cutoff(
    rows: &[FundamentalRecord],
    cutoff_year: i32,
) -> Vec<FundamentalRecord> {
    let mut order: Vec<&str> = Vec::new();
    let mut best: BTreeMap<&str, &FundamentalRecord> = BTreeMap::new();

    for r in rows.iter().filter(|r| r.year <= cutoff_year) {
        match best.get(r.company.as_str()) {
            Some(cur) if cur.year >= r.year => {}
            Some(_) => {
                best.insert(r.company.as_str(), r);
            }
            None => {
                order.push(r.company.as_str());
                best.insert(r.company.as_str(), r);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|c| best.get(c).map(|r| (*r).clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_rank_on_ties() {
        let r = rank_by(&[Some(10.0), Some(10.0), Some(5.0)], Direction::Asc);
        assert_eq!(r, vec![Some(2.5), Some(2.5), Some(1.0)]);

        let r = rank_by(&[Some(10.0), Some(10.0), Some(5.0)], Direction::Desc);
        assert_eq!(r, vec![Some(1.5), Some(1.5), Some(3.0)]);
    }

    #[test]
    fn missing_values_get_no_rank() {
        let r = rank_by(&[Some(3.0), None, Some(1.0), Some(f64::NAN)], Direction::Asc);
        assert_eq!(r, vec![Some(2.0), None, Some(1.0), None]);
    }

    #[test]
    fn latest_record_not_after_cutoff() {
        let rows = vec![
            FundamentalRecord::new("B", 2019).with_roe(1.0),
            FundamentalRecord::new("A", 2018).with_roe(2.0),
            FundamentalRecord::new("A", 2020).with_roe(3.0),
            FundamentalRecord::new("A", 2022).with_roe(4.0),
            FundamentalRecord::new("C", 2023).with_roe(5.0),
        ];
        let out = group_latest_by_cutoff(&rows, 2021);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].company, "B");
        assert_eq!(out[1].company, "A");
        assert_eq!(out[1].year, 2020);
    }

    #[test]
    fn select_preserves_order() {
        let rows = vec![1, 5, 2, 8, 3];
        assert_eq!(select(&rows, |x| *x >= 3), vec![5, 8, 3]);
    }
}
