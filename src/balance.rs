use tracing::{debug, info};

use crate::error::{BenchError, Result};

/// Catalog indices assigned to one execution group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket {
    indices: Vec<usize>,
    total_cost: u64,
}

impl Bucket {
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    fn push(&mut self, index: usize, cost: u32) {
        self.indices.push(index);
        self.total_cost += u64::from(cost);
    }
}

/// Longest-processing-time-first partition of `costs` into `buckets` groups.
///
/// Items are taken in descending cost order (lower index first on ties) and
/// each goes to the bucket with the smallest accumulated cost, lowest bucket
/// index on ties. The result is deterministic for a given input.
pub fn lpt_partition(costs: &[u32], buckets: usize) -> Result<Vec<Bucket>> {
    if buckets == 0 {
        return Err(BenchError::InvalidBucketCount(buckets));
    }

    let mut order: Vec<usize> = (0..costs.len()).collect();
    order.sort_by(|&a, &b| costs[b].cmp(&costs[a]).then(a.cmp(&b)));

    let mut out = vec![Bucket::default(); buckets];
    for index in order {
        // min_by_key keeps the first minimum, which is the lowest bucket index.
        let target = out
            .iter_mut()
            .min_by_key(|bucket| bucket.total_cost)
            .ok_or(BenchError::InvalidBucketCount(buckets))?;
        target.push(index, costs[index]);
    }

    log_partition("greedy", &out);
    Ok(out)
}

/// Round-robin partition: bucket `i` takes indices `i, i + P, i + 2P, ...`.
pub fn stride_partition(costs: &[u32], buckets: usize) -> Result<Vec<Bucket>> {
    if buckets == 0 {
        return Err(BenchError::InvalidBucketCount(buckets));
    }

    let mut out = vec![Bucket::default(); buckets];
    for (index, &cost) in costs.iter().enumerate() {
        out[index % buckets].push(index, cost);
    }

    log_partition("stride", &out);
    Ok(out)
}

/// Largest bucket cost, i.e. the makespan of the partition.
pub fn makespan(buckets: &[Bucket]) -> u64 {
    buckets.iter().map(Bucket::total_cost).max().unwrap_or(0)
}

fn log_partition(strategy: &str, buckets: &[Bucket]) {
    info!(
        strategy,
        buckets = buckets.len(),
        makespan = makespan(buckets),
        "partitioned catalog"
    );
    for (i, bucket) in buckets.iter().enumerate() {
        debug!(
            bucket = i,
            total_cost = bucket.total_cost,
            items = bucket.len(),
            indices = ?bucket.indices,
            "bucket assignment"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ITEM_COSTS;
    use proptest::prelude::*;

    #[test]
    fn zero_buckets_is_rejected() {
        assert!(matches!(
            lpt_partition(&ITEM_COSTS, 0),
            Err(BenchError::InvalidBucketCount(0))
        ));
        assert!(stride_partition(&ITEM_COSTS, 0).is_err());
    }

    #[test]
    fn builtin_catalog_four_buckets_golden() {
        let buckets = lpt_partition(&ITEM_COSTS, 4).unwrap();
        let totals: Vec<u64> = buckets.iter().map(Bucket::total_cost).collect();
        assert_eq!(totals, vec![712, 714, 711, 713]);
        assert!(buckets.iter().all(|b| b.len() == 15));
        assert_eq!(
            buckets[0].indices(),
            &[34, 7, 50, 17, 39, 5, 4, 27, 30, 40, 3, 49, 26, 59, 45]
        );
        assert_eq!(
            buckets[3].indices(),
            &[2, 48, 21, 10, 54, 53, 41, 42, 12, 37, 35, 1, 11, 18, 55]
        );
    }

    #[test]
    fn single_bucket_takes_everything_in_descending_order() {
        let buckets = lpt_partition(&[3, 9, 1], 1).unwrap();
        assert_eq!(buckets[0].indices(), &[1, 0, 2]);
        assert_eq!(buckets[0].total_cost(), 13);
    }

    #[test]
    fn more_buckets_than_items_leaves_empty_buckets() {
        let buckets = lpt_partition(&[4, 2], 3).unwrap();
        assert_eq!(buckets[0].indices(), &[0]);
        assert_eq!(buckets[1].indices(), &[1]);
        assert!(buckets[2].is_empty());
    }

    #[test]
    fn stride_matches_round_robin() {
        let buckets = stride_partition(&ITEM_COSTS, 4).unwrap();
        assert_eq!(&buckets[1].indices()[..3], &[1, 5, 9]);
        let total: u64 = buckets.iter().map(Bucket::total_cost).sum();
        assert_eq!(total, 2850);
    }

    /// Exhaustive optimum for tiny inputs.
    fn optimal_makespan(costs: &[u32], buckets: usize) -> u64 {
        fn go(costs: &[u32], loads: &mut [u64], i: usize, best: &mut u64) {
            if i == costs.len() {
                *best = (*best).min(loads.iter().copied().max().unwrap_or(0));
                return;
            }
            for b in 0..loads.len() {
                loads[b] += u64::from(costs[i]);
                if loads[b] < *best {
                    go(costs, loads, i + 1, best);
                }
                loads[b] -= u64::from(costs[i]);
            }
        }
        let mut best = u64::MAX;
        go(costs, &mut vec![0; buckets], 0, &mut best);
        best
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn every_item_lands_in_exactly_one_bucket(
            costs in prop::collection::vec(1u32..=100, 0..80),
            buckets in 1usize..9,
        ) {
            let out = lpt_partition(&costs, buckets).unwrap();
            prop_assert_eq!(out.len(), buckets);

            let mut seen: Vec<usize> = out.iter().flat_map(|b| b.indices().to_vec()).collect();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..costs.len()).collect::<Vec<_>>());

            let total: u64 = out.iter().map(Bucket::total_cost).sum();
            prop_assert_eq!(total, costs.iter().map(|&c| u64::from(c)).sum::<u64>());
        }

        #[test]
        fn lpt_stays_within_graham_bound(
            costs in prop::collection::vec(1u32..=50, 1..9),
            buckets in 1usize..4,
        ) {
            let lpt = makespan(&lpt_partition(&costs, buckets).unwrap());
            let opt = optimal_makespan(&costs, buckets);
            // lpt <= (4/3 - 1/(3P)) * opt, scaled by 3P to stay in integers.
            let p = buckets as u64;
            prop_assert!(3 * p * lpt <= (4 * p - 1) * opt, "lpt={lpt} opt={opt} p={p}");
        }

        #[test]
        fn partition_is_deterministic(
            costs in prop::collection::vec(1u32..=100, 0..40),
            buckets in 1usize..6,
        ) {
            prop_assert_eq!(
                lpt_partition(&costs, buckets).unwrap(),
                lpt_partition(&costs, buckets).unwrap()
            );
        }
    }
}
