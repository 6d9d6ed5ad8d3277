//! Ward-linkage agglomerative clustering with a distance cut-off.
//!
//! Merges are found with the nearest-neighbour chain algorithm over a
//! condensed distance matrix. Ward distances are updated with the
//! Lance–Williams recurrence on squared Euclidean distances, so a merge
//! height is the same value the textbook Ward dendrogram reports.

use super::vectorize::{SparseVector, squared_distance};

/// Condensed symmetric matrix of squared distances (upper triangle).
struct CondensedMatrix {
    n: usize,
    data: Vec<f64>,
}

impl CondensedMatrix {
    fn from_rows(rows: &[SparseVector]) -> Self {
        let n = rows.len();
        let mut data = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                data.push(squared_distance(&rows[i], &rows[j]));
            }
        }
        Self { n, data }
    }

    fn index(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        // Row i starts after the (n-1) + (n-2) + ... + (n-i) entries above it.
        i * (2 * self.n - i - 1) / 2 + (j - i - 1)
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.index(i, j)]
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.index(i, j);
        self.data[idx] = value;
    }
}

/// One agglomeration step: the clusters whose representatives are `a`
/// and `b` were joined at Ward distance `height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub a: usize,
    pub b: usize,
    pub height: f64,
}

/// Build the full Ward merge list (n - 1 merges for n rows).
pub fn ward_merges(rows: &[SparseVector]) -> Vec<Merge> {
    let n = rows.len();
    if n < 2 {
        return Vec::new();
    }

    let mut dist = CondensedMatrix::from_rows(rows);
    let mut size = vec![1usize; n];
    let mut active = vec![true; n];
    let mut chain: Vec<usize> = Vec::with_capacity(n);
    let mut merges = Vec::with_capacity(n - 1);

    while merges.len() < n - 1 {
        if chain.is_empty() {
            if let Some(first) = active.iter().position(|&alive| alive) {
                chain.push(first);
            }
        }

        // Grow the chain until its last two entries are reciprocal nearest
        // neighbours. Ties favour the previous chain element so the walk
        // always terminates.
        let (a, b) = loop {
            let tip = chain[chain.len() - 1];
            let prev = chain.len().checked_sub(2).map(|i| chain[i]);

            let mut best = prev;
            let mut best_dist = prev.map_or(f64::INFINITY, |p| dist.get(tip, p));
            for k in 0..n {
                if k == tip || !active[k] {
                    continue;
                }
                let d = dist.get(tip, k);
                if d < best_dist {
                    best_dist = d;
                    best = Some(k);
                }
            }

            let Some(next) = best else {
                unreachable!("at least two clusters remain while merging");
            };
            if Some(next) == prev {
                chain.pop();
                chain.pop();
                break (tip, next);
            }
            chain.push(next);
        };

        let d_ab = dist.get(a, b);
        let (keep, drop) = if a < b { (a, b) } else { (b, a) };
        let (n_keep, n_drop) = (size[keep] as f64, size[drop] as f64);

        for k in 0..n {
            if !active[k] || k == keep || k == drop {
                continue;
            }
            let n_k = size[k] as f64;
            let updated = ((n_keep + n_k) * dist.get(keep, k) + (n_drop + n_k) * dist.get(drop, k)
                - n_k * d_ab)
                / (n_keep + n_drop + n_k);
            dist.set(keep, k, updated.max(0.0));
        }

        active[drop] = false;
        size[keep] += size[drop];
        merges.push(Merge {
            a: keep,
            b: drop,
            height: d_ab.max(0.0).sqrt(),
        });
    }

    merges
}

/// Cut the Ward tree at `threshold`: every merge strictly below the
/// threshold is applied. Returns one label per row, numbered by first
/// appearance (row 0 always gets label 0).
pub fn agglomerative_ward(rows: &[SparseVector], threshold: f64) -> Vec<usize> {
    let n = rows.len();
    let mut components = DisjointSet::new(n);

    // Ward heights are monotone, so the merges below the cut form a
    // closed sub-forest regardless of the order they were discovered in.
    for merge in ward_merges(rows) {
        if merge.height < threshold {
            components.union(merge.a, merge.b);
        }
    }

    let mut label_of_root: Vec<Option<usize>> = vec![None; n];
    let mut next_label = 0;
    (0..n)
        .map(|i| {
            let root = components.find(i);
            *label_of_root[root].get_or_insert_with(|| {
                let label = next_label;
                next_label += 1;
                label
            })
        })
        .collect()
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit row along a single axis.
    fn axis(idx: usize) -> SparseVector {
        vec![(idx, 1.0)]
    }

    #[test]
    fn condensed_index_covers_upper_triangle() {
        let rows: Vec<SparseVector> = (0..5).map(axis).collect();
        let matrix = CondensedMatrix::from_rows(&rows);
        let mut seen: Vec<usize> = Vec::new();
        for i in 0..5 {
            for j in (i + 1)..5 {
                seen.push(matrix.index(i, j));
                assert_eq!(matrix.index(i, j), matrix.index(j, i));
            }
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn merge_count_is_n_minus_one() {
        let rows: Vec<SparseVector> = (0..6).map(axis).collect();
        assert_eq!(ward_merges(&rows).len(), 5);
        assert!(ward_merges(&rows[..1]).is_empty());
    }

    #[test]
    fn orthogonal_pair_merges_at_sqrt_two() {
        let merges = ward_merges(&[axis(0), axis(1)]);
        assert_eq!(merges.len(), 1);
        assert!((merges[0].height - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(agglomerative_ward(&[axis(0), axis(1)], 1.5), vec![0, 0]);
        assert_eq!(agglomerative_ward(&[axis(0), axis(1)], 1.0), vec![0, 1]);
    }

    #[test]
    fn ward_distance_grows_with_cluster_size() {
        // Three identical rows join at 0, then meet the orthogonal row at
        // sqrt(2 * 3 * 1 / 4 * 2) = sqrt(3).
        let rows = vec![axis(0), axis(0), axis(0), axis(1)];
        let mut heights: Vec<f64> = ward_merges(&rows).iter().map(|m| m.height).collect();
        heights.sort_by(f64::total_cmp);
        assert_eq!(heights[0], 0.0);
        assert_eq!(heights[1], 0.0);
        assert!((heights[2] - 3f64.sqrt()).abs() < 1e-12);

        assert_eq!(agglomerative_ward(&rows, 1.5), vec![0, 0, 0, 1]);
        assert_eq!(agglomerative_ward(&rows, 2.0), vec![0, 0, 0, 0]);
    }

    #[test]
    fn labels_follow_first_appearance() {
        let rows = vec![axis(1), axis(0), axis(0), axis(1)];
        assert_eq!(agglomerative_ward(&rows, 0.5), vec![0, 1, 1, 0]);
    }

    #[test]
    fn identical_rows_share_a_label_at_any_positive_threshold() {
        let rows = vec![axis(3); 4];
        assert_eq!(agglomerative_ward(&rows, 1e-9), vec![0, 0, 0, 0]);
    }
}
