//! Color clustering strategy.
//!
//! The foreground-consistency and handheld-extras checks partition
//! foreground colors into a handful of clusters and treat the largest ones
//! as the subject's "main" colors. The clustering backend is injected as a
//! [`ColorClusterer`]; [`ClustererKind::Unavailable`] stands in when the
//! caller wants those checks to degrade to neutral results.
//!
//! The built-in backend is seeded k-means (k-means++ initialization,
//! Lloyd iterations, best of several restarts). Each call owns its RNG,
//! so concurrent evaluations never share model state and repeated calls
//! with the same seed are bit-identical.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::profile::DEFAULT_CLUSTER_SEED;

/// Errors from a clustering backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    /// No backend is configured.
    #[error("no clustering backend available")]
    Unavailable,

    /// No pixels were supplied.
    #[error("cannot cluster an empty sample")]
    EmptySample,

    /// Zero clusters were requested.
    #[error("cluster count must be at least 1")]
    ZeroClusters,

    /// A sample contained NaN or infinity.
    #[error("sample contains non-finite values")]
    NonFinite,
}

/// Partitions L*a*b* colors into clusters.
pub trait ColorClusterer {
    /// Whether [`fit`](Self::fit) can succeed at all.
    ///
    /// Checks consult this before branching instead of relying on `fit`
    /// failing.
    fn is_available(&self) -> bool;

    /// Fit `k` clusters to at most `max_samples` of `pixels`, drawn
    /// without replacement when there are more.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError`] when the backend is unavailable or the
    /// input is empty, non-finite, or `k` is zero.
    fn fit(
        &self,
        pixels: &[[f32; 3]],
        k: usize,
        max_samples: usize,
    ) -> Result<ClusterModel, ClusterError>;
}

/// Tuning for the built-in k-means backend.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansParams {
    /// RNG seed for subsampling and initialization.
    pub seed: u64,
    /// Lloyd iteration cap per restart.
    pub max_iterations: usize,
    /// Independent initializations; the lowest-inertia run wins.
    pub restarts: usize,
    /// Stop once no centroid moves more than this (squared distance).
    pub tolerance: f64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            seed: DEFAULT_CLUSTER_SEED,
            max_iterations: 50,
            restarts: 3,
            tolerance: 1e-4,
        }
    }
}

/// The available clustering strategies.
#[derive(Debug, Clone, PartialEq)]
pub enum ClustererKind {
    /// Seeded k-means.
    KMeans(KMeansParams),
    /// No backend: every dependent check returns a neutral result.
    Unavailable,
}

impl Default for ClustererKind {
    fn default() -> Self {
        Self::KMeans(KMeansParams::default())
    }
}

impl ClustererKind {
    /// k-means with default tuning and the given seed.
    #[must_use]
    pub fn kmeans(seed: u64) -> Self {
        Self::KMeans(KMeansParams {
            seed,
            ..KMeansParams::default()
        })
    }
}

impl ColorClusterer for ClustererKind {
    fn is_available(&self) -> bool {
        matches!(self, Self::KMeans(_))
    }

    fn fit(
        &self,
        pixels: &[[f32; 3]],
        k: usize,
        max_samples: usize,
    ) -> Result<ClusterModel, ClusterError> {
        match self {
            Self::KMeans(params) => kmeans(params, pixels, k, max_samples),
            Self::Unavailable => Err(ClusterError::Unavailable),
        }
    }
}

/// A fitted set of cluster centroids.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterModel {
    centroids: Vec<[f64; 3]>,
}

impl ClusterModel {
    /// Number of clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    /// Whether the model has no clusters. Never true for a fitted model.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Centroids in L*a*b*.
    #[must_use]
    pub fn centroids(&self) -> &[[f64; 3]] {
        &self.centroids
    }

    /// Index of the centroid nearest to `pixel`. Ties go to the lower index.
    #[must_use]
    pub fn assign(&self, pixel: [f32; 3]) -> usize {
        nearest(&self.centroids, widen(pixel)).0
    }

    /// Nearest-centroid label of every pixel.
    #[must_use]
    pub fn assign_all(&self, pixels: &[[f32; 3]]) -> Vec<usize> {
        pixels.iter().map(|&p| self.assign(p)).collect()
    }

    /// Number of `labels` falling in each cluster.
    #[must_use]
    pub fn counts(&self, labels: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.centroids.len()];
        for &l in labels {
            if let Some(c) = counts.get_mut(l) {
                *c += 1;
            }
        }
        counts
    }

    /// Flags the `n` most populous clusters among `labels`.
    ///
    /// Returns one flag per cluster. Equal counts are broken by cluster
    /// index, lower first.
    #[must_use]
    pub fn dominant(&self, labels: &[usize], n: usize) -> Vec<bool> {
        let counts = self.counts(labels);
        let mut order: Vec<usize> = (0..counts.len()).collect();
        order.sort_by(|&a, &b| counts[b].cmp(&counts[a]).then(a.cmp(&b)));
        let mut main = vec![false; counts.len()];
        for &i in order.iter().take(n) {
            main[i] = true;
        }
        main
    }
}

fn widen(p: [f32; 3]) -> [f64; 3] {
    p.map(f64::from)
}

fn distance_squared(a: [f64; 3], b: [f64; 3]) -> f64 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d2.mul_add(d2, d1.mul_add(d1, d0 * d0))
}

/// Nearest centroid index and its squared distance.
fn nearest(centroids: &[[f64; 3]], p: [f64; 3]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, &c) in centroids.iter().enumerate() {
        let d = distance_squared(c, p);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

fn kmeans(
    params: &KMeansParams,
    pixels: &[[f32; 3]],
    k: usize,
    max_samples: usize,
) -> Result<ClusterModel, ClusterError> {
    if k == 0 {
        return Err(ClusterError::ZeroClusters);
    }
    if pixels.is_empty() || max_samples == 0 {
        return Err(ClusterError::EmptySample);
    }
    if pixels.iter().flatten().any(|v| !v.is_finite()) {
        return Err(ClusterError::NonFinite);
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let sample: Vec<[f64; 3]> = if pixels.len() > max_samples {
        rand::seq::index::sample(&mut rng, pixels.len(), max_samples)
            .into_iter()
            .map(|i| widen(pixels[i]))
            .collect()
    } else {
        pixels.iter().copied().map(widen).collect()
    };
    let k = k.min(sample.len());

    let mut best: Option<(f64, Vec<[f64; 3]>)> = None;
    for _ in 0..params.restarts.max(1) {
        let init = kmeans_plus_plus(&sample, k, &mut rng);
        let (centroids, inertia) = lloyd(&sample, init, params);
        if best.as_ref().is_none_or(|(b, _)| inertia < *b) {
            best = Some((inertia, centroids));
        }
    }
    let (inertia, centroids) = best.ok_or(ClusterError::EmptySample)?;
    tracing::trace!(k, samples = sample.len(), inertia, "k-means fitted");
    Ok(ClusterModel { centroids })
}

/// k-means++ seeding: each new center is drawn with probability
/// proportional to its squared distance from the nearest existing one.
fn kmeans_plus_plus(sample: &[[f64; 3]], k: usize, rng: &mut StdRng) -> Vec<[f64; 3]> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(sample[rng.gen_range(0..sample.len())]);
    let mut d2: Vec<f64> = sample
        .iter()
        .map(|&p| distance_squared(p, centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = d2.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen_range(0.0..1.0) * total;
            let mut chosen = sample.len() - 1;
            for (i, &w) in d2.iter().enumerate() {
                if target < w {
                    chosen = i;
                    break;
                }
                target -= w;
            }
            chosen
        } else {
            // Every sample coincides with a center already.
            rng.gen_range(0..sample.len())
        };
        let c = sample[next];
        centroids.push(c);
        for (d, &p) in d2.iter_mut().zip(sample) {
            *d = d.min(distance_squared(p, c));
        }
    }
    centroids
}

/// Lloyd iterations. Returns the centroids and their inertia.
#[allow(clippy::cast_precision_loss)]
fn lloyd(
    sample: &[[f64; 3]],
    mut centroids: Vec<[f64; 3]>,
    params: &KMeansParams,
) -> (Vec<[f64; 3]>, f64) {
    let k = centroids.len();
    for _ in 0..params.max_iterations {
        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for &p in sample {
            let (i, _) = nearest(&centroids, p);
            counts[i] += 1;
            for c in 0..3 {
                sums[i][c] += p[c];
            }
        }

        let mut shift = 0.0f64;
        for i in 0..k {
            // An empty cluster keeps its previous center.
            if counts[i] == 0 {
                continue;
            }
            let n = counts[i] as f64;
            let updated = sums[i].map(|s| s / n);
            shift = shift.max(distance_squared(updated, centroids[i]));
            centroids[i] = updated;
        }
        if shift <= params.tolerance {
            break;
        }
    }

    let inertia = sample.iter().map(|&p| nearest(&centroids, p).1).sum();
    (centroids, inertia)
}
