use crate::math::DistanceMetric;
use crate::prelude::{FingerprintError, FingerprintResult};
use ndarray::{Array2, ArrayView1};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Static k-d tree over equally sized vectors, each carrying a payload.
///
/// Points live row-wise in one matrix. The splitting axis cycles with depth and every
/// node holds the median of its subset, so the tree is balanced. Distance ties are
/// broken by insertion order, making repeated queries reproducible.
///
/// The vector length is only known once the cache key set is, so the tree is sized at
/// runtime rather than by a const generic dimension.
#[derive(Debug)]
pub struct KdTree<T> {
    points: Array2<f64>,
    payloads: Vec<T>,
    nodes: Vec<Node>,
    root: Option<usize>,
    metric: DistanceMetric,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    point: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

impl<T> KdTree<T> {
    /// Callers guarantee equal vector lengths; only a total sample count that cannot
    /// form a matrix is reported.
    pub fn build(points: Vec<(Vec<f64>, T)>, metric: DistanceMetric) -> FingerprintResult<Self> {
        let count = points.len();
        let dimension = points.first().map_or(0, |(vector, _)| vector.len());

        let mut flat = Vec::with_capacity(count * dimension);
        let mut payloads = Vec::with_capacity(count);
        for (vector, payload) in points {
            flat.extend(vector);
            payloads.push(payload);
        }
        let points = Array2::from_shape_vec((count, dimension), flat).map_err(|err| {
            FingerprintError::InvalidInput(format!("index points do not form a matrix: {}", err))
        })?;

        let mut order: Vec<usize> = (0..count).collect();
        let mut nodes = Vec::with_capacity(count);
        let root = partition(&points, &mut order, 0, &mut nodes);

        Ok(Self {
            points,
            payloads,
            nodes,
            root,
            metric,
        })
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.points.ncols()
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// The `k` points closest to `query`, ascending by distance. `k >= len()` returns
    /// every point.
    pub fn nearest(&self, query: &[f64], k: usize) -> Vec<(&T, f64)> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let mut best = BinaryHeap::with_capacity(k + 1);
        self.search(root, ArrayView1::from(query), k, &mut best);
        best.into_sorted_vec()
            .into_iter()
            .map(|candidate| (&self.payloads[candidate.point], candidate.distance))
            .collect()
    }

    fn search(
        &self,
        slot: usize,
        query: ArrayView1<f64>,
        k: usize,
        best: &mut BinaryHeap<Candidate>,
    ) {
        let node = self.nodes[slot];
        let candidate = Candidate {
            distance: self.metric.between(query, self.points.row(node.point)),
            point: node.point,
        };
        if best.len() < k {
            best.push(candidate);
        } else if best.peek().map_or(false, |worst| candidate < *worst) {
            best.pop();
            best.push(candidate);
        }

        let split = self.points.get((node.point, node.axis)).copied().unwrap_or(0.0);
        let offset = query.get(node.axis).copied().unwrap_or(0.0) - split;
        let (near, far) = if offset < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(near) = near {
            self.search(near, query, k, best);
        }
        if let Some(far) = far {
            let bound = best.peek().map_or(f64::INFINITY, |worst| worst.distance);
            // ties across the plane still matter for the insertion-order tie break
            if best.len() < k || self.plane_distance(query, node.axis, split) <= bound {
                self.search(far, query, k, best);
            }
        }
    }

    /// Metric distance from `query` to its projection onto the splitting plane, a lower
    /// bound for every point on the far side.
    fn plane_distance(&self, query: ArrayView1<f64>, axis: usize, split: f64) -> f64 {
        if axis >= query.len() {
            return 0.0;
        }
        let mut projected = query.to_owned();
        projected[axis] = split;
        self.metric.between(query, projected.view())
    }
}

fn partition(
    points: &Array2<f64>,
    ids: &mut [usize],
    depth: usize,
    nodes: &mut Vec<Node>,
) -> Option<usize> {
    if ids.is_empty() {
        return None;
    }

    let dimension = points.ncols();
    let axis = if dimension == 0 { 0 } else { depth % dimension };
    let median = ids.len() / 2;
    if dimension > 0 {
        ids.select_nth_unstable_by(median, |&a, &b| {
            points[[a, axis]]
                .total_cmp(&points[[b, axis]])
                .then(a.cmp(&b))
        });
    }

    let slot = nodes.len();
    nodes.push(Node {
        point: ids[median],
        axis,
        left: None,
        right: None,
    });

    let (lower, upper) = ids.split_at_mut(median);
    let left = partition(points, lower, depth + 1, nodes);
    let right = partition(points, &mut upper[1..], depth + 1, nodes);
    nodes[slot].left = left;
    nodes[slot].right = right;
    Some(slot)
}

/// Ordered by distance, then by insertion index.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f64,
    point: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.point.cmp(&other.point))
    }
}
