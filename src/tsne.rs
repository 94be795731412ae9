//! Exact t-distributed stochastic neighbor embedding.
//!
//! Projects an `[n, d]` matrix to `[n, 2]`. The optimizer follows the usual
//! two-phase schedule: an early-exaggeration phase with low momentum, then
//! plain gradient descent with higher momentum. All pairwise terms are
//! computed exactly, so cost is O(n²) per iteration.
//!
//! Output is reproducible for a fixed seed and input on the same build. It is
//! not expected to match other t-SNE implementations bit for bit, even with the
//! same seed: initialisation, floating point order and stopping rules differ.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info, warn};

use crate::error::TsneError;

/// Output dimensionality.
pub const N_COMPONENTS: usize = 2;

const MACHINE_EPSILON: f64 = f64::EPSILON;
// Floor for a row sum that underflowed to zero during the perplexity search.
const MIN_ROW_SUM: f64 = 1e-8;
const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const BINARY_SEARCH_STEPS: usize = 100;
const EXPLORATION_ITERATIONS: usize = 250;
const PROGRESS_CHECK_INTERVAL: usize = 50;
const EXPLORATION_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const MIN_GAIN: f64 = 0.01;
const INIT_SCALE: f64 = 1e-4;
const POWER_ITERATIONS: usize = 1000;

/// Starting layout of the low-dimensional points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Initialization {
    /// First two principal components, rescaled to a tiny spread
    #[default]
    Pca,
    /// Isotropic Gaussian noise from the seeded RNG
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LearningRate {
    /// `max(n / early_exaggeration / 4, 50)`
    Auto,
    Fixed(f64),
}

impl LearningRate {
    fn resolve(self, n_samples: usize, early_exaggeration: f64) -> f64 {
        match self {
            LearningRate::Auto => (n_samples as f64 / early_exaggeration / 4.0).max(50.0),
            LearningRate::Fixed(rate) => rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TsneConfig {
    /// Effective number of neighbours per point
    pub perplexity: f64,
    pub seed: u64,
    pub max_iter: usize,
    pub early_exaggeration: f64,
    pub learning_rate: LearningRate,
    pub init: Initialization,
    pub min_grad_norm: f64,
    pub n_iter_without_progress: usize,
    /// Lower the perplexity instead of failing when it is too large for the sample count
    pub adapt_perplexity: bool,
}

impl Default for TsneConfig {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            seed: 42,
            max_iter: 1000,
            early_exaggeration: 12.0,
            learning_rate: LearningRate::Auto,
            init: Initialization::Pca,
            min_grad_norm: 1e-7,
            n_iter_without_progress: 300,
            adapt_perplexity: false,
        }
    }
}

impl TsneConfig {
    /// Perplexity that will be used for `n_samples` points, if any is valid.
    pub fn effective_perplexity(&self, n_samples: usize) -> Result<f64, TsneError> {
        if n_samples == 0 {
            return Err(TsneError::EmptyInput);
        }
        if !self.perplexity.is_finite() || self.perplexity <= 0.0 {
            return Err(TsneError::InvalidPerplexity(self.perplexity));
        }
        if self.perplexity < n_samples as f64 {
            return Ok(self.perplexity);
        }
        if !self.adapt_perplexity {
            return Err(TsneError::PerplexityTooLarge {
                perplexity: self.perplexity,
                n_samples,
            });
        }

        let n = n_samples as f64;
        let adapted = ((n - 1.0) / 3.0).max(1.0).min(n - 0.5);
        warn!(
            requested = self.perplexity,
            adapted, n_samples, "perplexity too large for sample count, lowering it"
        );
        Ok(adapted)
    }

    /// Check every parameter against `n_samples`, returning the perplexity to use.
    pub fn validate(&self, n_samples: usize) -> Result<f64, TsneError> {
        if !self.early_exaggeration.is_finite() || self.early_exaggeration < 1.0 {
            return Err(TsneError::InvalidParameter(format!(
                "early_exaggeration must be at least 1, got {}",
                self.early_exaggeration
            )));
        }
        if self.max_iter < EXPLORATION_ITERATIONS {
            return Err(TsneError::InvalidParameter(format!(
                "max_iter must be at least {}, got {}",
                EXPLORATION_ITERATIONS, self.max_iter
            )));
        }
        if let LearningRate::Fixed(rate) = self.learning_rate {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(TsneError::InvalidParameter(format!(
                    "learning_rate must be positive, got {}",
                    rate
                )));
            }
        }
        self.effective_perplexity(n_samples)
    }
}

/// Result of a t-SNE run.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding2d {
    /// One `[x, y]` per input row, same order
    pub points: Vec<[f64; N_COMPONENTS]>,
    pub kl_divergence: f64,
    pub iterations: usize,
    pub perplexity: f64,
}

impl Embedding2d {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub struct Tsne {
    config: TsneConfig,
}

impl Tsne {
    pub fn new(config: TsneConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TsneConfig {
        &self.config
    }

    /// Embed `data` (`[n, d]`, rows of equal length) into two dimensions.
    pub fn fit_transform(&self, data: &[Vec<f64>]) -> Result<Embedding2d, TsneError> {
        let n = data.len();
        let perplexity = self.config.validate(n)?;

        let dim = data[0].len();
        if let Some((row, found)) = data
            .iter()
            .map(Vec::len)
            .enumerate()
            .find(|(_, len)| *len != dim)
        {
            return Err(TsneError::RaggedInput {
                row,
                expected: dim,
                found,
            });
        }

        if n == 1 {
            return Ok(Embedding2d {
                points: vec![[0.0; N_COMPONENTS]],
                kl_divergence: 0.0,
                iterations: 0,
                perplexity,
            });
        }

        // One n*n buffer goes distances -> conditional -> joint.
        let distances = squared_distances(data);
        let conditional = binary_search_perplexity(distances, n, perplexity);
        let mut p = joint_probabilities(conditional, n);
        let mut kernel = vec![0.0; n * n];

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut y = match self.config.init {
            Initialization::Pca => match pca_init(data, &mut rng) {
                Some(points) => points,
                None => {
                    warn!("principal components are degenerate, using random initialisation");
                    random_init(n, &mut rng)?
                }
            },
            Initialization::Random => random_init(n, &mut rng)?,
        };

        let learning_rate = self
            .config
            .learning_rate
            .resolve(n, self.config.early_exaggeration);
        debug!(n, dim, perplexity, learning_rate, "starting t-SNE optimisation");

        let exaggeration = self.config.early_exaggeration;
        p.iter_mut().for_each(|v| *v *= exaggeration);
        let exploration = gradient_descent(
            &mut y,
            &p,
            &mut kernel,
            &DescentParams {
                start_iter: 0,
                max_iter: EXPLORATION_ITERATIONS,
                momentum: EXPLORATION_MOMENTUM,
                learning_rate,
                min_grad_norm: self.config.min_grad_norm,
                n_iter_without_progress: EXPLORATION_ITERATIONS,
            },
        );
        debug!(
            iterations = exploration.iterations,
            kl = exploration.kl_divergence,
            "early exaggeration finished"
        );

        p.iter_mut().for_each(|v| *v /= exaggeration);
        let mut outcome = exploration;
        if exploration.iterations < self.config.max_iter {
            outcome = gradient_descent(
                &mut y,
                &p,
                &mut kernel,
                &DescentParams {
                    start_iter: exploration.iterations,
                    max_iter: self.config.max_iter,
                    momentum: FINAL_MOMENTUM,
                    learning_rate,
                    min_grad_norm: self.config.min_grad_norm,
                    n_iter_without_progress: self.config.n_iter_without_progress,
                },
            );
        }

        info!(
            n,
            iterations = outcome.iterations,
            kl_divergence = outcome.kl_divergence,
            "t-SNE finished"
        );

        Ok(Embedding2d {
            points: y,
            kl_divergence: outcome.kl_divergence,
            iterations: outcome.iterations,
            perplexity,
        })
    }
}

struct DescentParams {
    start_iter: usize,
    max_iter: usize,
    momentum: f64,
    learning_rate: f64,
    min_grad_norm: f64,
    n_iter_without_progress: usize,
}

#[derive(Debug, Clone, Copy)]
struct DescentOutcome {
    kl_divergence: f64,
    /// Iteration count reached, including `start_iter`
    iterations: usize,
}

/// Momentum gradient descent with per-coordinate adaptive gains.
/// `kernel` is n*n scratch space shared across iterations.
fn gradient_descent(
    y: &mut [[f64; N_COMPONENTS]],
    p: &[f64],
    kernel: &mut [f64],
    params: &DescentParams,
) -> DescentOutcome {
    let n = y.len();
    let mut update: Vec<[f64; N_COMPONENTS]> = vec![[0.0; N_COMPONENTS]; n];
    let mut gains: Vec<[f64; N_COMPONENTS]> = vec![[1.0; N_COMPONENTS]; n];
    let mut grad: Vec<[f64; N_COMPONENTS]> = vec![[0.0; N_COMPONENTS]; n];

    let mut best_error = f64::INFINITY;
    let mut best_iter = params.start_iter;
    let mut error = f64::INFINITY;
    let mut iterations = params.start_iter;

    for i in params.start_iter..params.max_iter {
        iterations = i + 1;
        let check_convergence = (i + 1) % PROGRESS_CHECK_INTERVAL == 0;
        let compute_error = check_convergence || i + 1 == params.max_iter;

        let kl = kl_divergence_gradient(p, y, kernel, &mut grad, compute_error);
        if compute_error {
            error = kl;
        }

        for ((g, u), gain) in grad.iter_mut().zip(update.iter_mut()).zip(gains.iter_mut()) {
            for c in 0..N_COMPONENTS {
                if u[c] * g[c] < 0.0 {
                    gain[c] += 0.2;
                } else {
                    gain[c] *= 0.8;
                }
                gain[c] = gain[c].max(MIN_GAIN);
                g[c] *= gain[c];
                u[c] = params.momentum * u[c] - params.learning_rate * g[c];
            }
        }
        for (point, u) in y.iter_mut().zip(&update) {
            point[0] += u[0];
            point[1] += u[1];
        }

        if check_convergence {
            let grad_norm = grad
                .iter()
                .map(|g| g[0] * g[0] + g[1] * g[1])
                .sum::<f64>()
                .sqrt();
            debug!(iteration = i + 1, kl = error, grad_norm, "t-SNE progress");

            if error < best_error {
                best_error = error;
                best_iter = i;
            } else if i - best_iter > params.n_iter_without_progress {
                debug!(iteration = i + 1, "no progress, stopping early");
                break;
            }
            if grad_norm <= params.min_grad_norm {
                debug!(iteration = i + 1, grad_norm, "gradient vanished, stopping early");
                break;
            }
        }
    }

    DescentOutcome {
        kl_divergence: error,
        iterations,
    }
}

/// KL(P || Q) under a Student-t kernel with one degree of freedom; fills `grad`.
/// Every off-diagonal entry of `kernel` is overwritten before it is read.
fn kl_divergence_gradient(
    p: &[f64],
    y: &[[f64; N_COMPONENTS]],
    kernel: &mut [f64],
    grad: &mut [[f64; N_COMPONENTS]],
    compute_error: bool,
) -> f64 {
    let n = y.len();
    let mut total = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = y[i][0] - y[j][0];
            let dy = y[i][1] - y[j][1];
            let value = 1.0 / (1.0 + dx * dx + dy * dy);
            kernel[i * n + j] = value;
            kernel[j * n + i] = value;
            total += 2.0 * value;
        }
    }
    let total = total.max(MACHINE_EPSILON);

    let mut kl = 0.0;
    for i in 0..n {
        let mut g = [0.0; N_COMPONENTS];
        for j in 0..n {
            if i == j {
                continue;
            }
            let idx = i * n + j;
            let q = (kernel[idx] / total).max(MACHINE_EPSILON);
            let pij = p[idx];
            if compute_error {
                kl += pij * (pij.max(MACHINE_EPSILON) / q).ln();
            }
            let strength = (pij - q) * kernel[idx];
            g[0] += strength * (y[i][0] - y[j][0]);
            g[1] += strength * (y[i][1] - y[j][1]);
        }
        grad[i] = [4.0 * g[0], 4.0 * g[1]];
    }
    kl
}

fn squared_distances(data: &[Vec<f64>]) -> Vec<f64> {
    let n = data.len();
    let mut distances = vec![0.0; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d: f64 = data[i]
                .iter()
                .zip(&data[j])
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            distances[i * n + j] = d;
            distances[j * n + i] = d;
        }
    }
    distances
}

/// Row-conditional Gaussian affinities whose entropy matches `ln(perplexity)`.
/// Each row of `distances` is replaced by its affinities.
fn binary_search_perplexity(mut distances: Vec<f64>, n: usize, perplexity: f64) -> Vec<f64> {
    let desired_entropy = perplexity.ln();
    let mut row = vec![0.0; n];

    for i in 0..n {
        row.copy_from_slice(&distances[i * n..(i + 1) * n]);
        let out = &mut distances[i * n..(i + 1) * n];
        let mut beta = 1.0;
        let mut beta_min = f64::NEG_INFINITY;
        let mut beta_max = f64::INFINITY;

        for _ in 0..BINARY_SEARCH_STEPS {
            let mut sum_p = 0.0;
            for j in 0..n {
                out[j] = if j == i { 0.0 } else { (-row[j] * beta).exp() };
                sum_p += out[j];
            }
            if sum_p == 0.0 {
                sum_p = MIN_ROW_SUM;
            }

            let mut weighted_distance = 0.0;
            for j in 0..n {
                out[j] /= sum_p;
                weighted_distance += row[j] * out[j];
            }

            let entropy = sum_p.ln() + beta * weighted_distance;
            let entropy_diff = entropy - desired_entropy;
            if entropy_diff.abs() <= PERPLEXITY_TOLERANCE {
                break;
            }

            if entropy_diff > 0.0 {
                beta_min = beta;
                beta = if beta_max == f64::INFINITY {
                    beta * 2.0
                } else {
                    (beta + beta_max) / 2.0
                };
            } else {
                beta_max = beta;
                beta = if beta_min == f64::NEG_INFINITY {
                    beta / 2.0
                } else {
                    (beta + beta_min) / 2.0
                };
            }
        }
    }
    distances
}

/// Symmetrise conditional affinities, in place, into a joint distribution over pairs.
fn joint_probabilities(mut joint: Vec<f64>, n: usize) -> Vec<f64> {
    let mut total = 0.0;
    for i in 0..n {
        joint[i * n + i] = 0.0;
        for j in (i + 1)..n {
            let value = joint[i * n + j] + joint[j * n + i];
            joint[i * n + j] = value;
            joint[j * n + i] = value;
            total += 2.0 * value;
        }
    }
    let total = total.max(MACHINE_EPSILON);
    for i in 0..n {
        for j in 0..n {
            let idx = i * n + j;
            joint[idx] = if i == j {
                0.0
            } else {
                (joint[idx] / total).max(MACHINE_EPSILON)
            };
        }
    }
    joint
}

fn random_init(n: usize, rng: &mut StdRng) -> Result<Vec<[f64; N_COMPONENTS]>, TsneError> {
    let normal =
        Normal::new(0.0, INIT_SCALE).map_err(|e| TsneError::InvalidParameter(e.to_string()))?;
    Ok((0..n)
        .map(|_| [normal.sample(rng), normal.sample(rng)])
        .collect())
}

/// Project onto the two leading principal components, scaled so the first
/// column has standard deviation `INIT_SCALE`. `None` when the data has no spread.
fn pca_init(data: &[Vec<f64>], rng: &mut StdRng) -> Option<Vec<[f64; N_COMPONENTS]>> {
    let n = data.len();
    let dim = data[0].len();
    if dim == 0 {
        return None;
    }

    let mut mean = vec![0.0; dim];
    for row in data {
        for (m, v) in mean.iter_mut().zip(row) {
            *m += v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n as f64);
    let centered: Vec<Vec<f64>> = data
        .iter()
        .map(|row| row.iter().zip(&mean).map(|(v, m)| v - m).collect())
        .collect();

    let mut covariance = vec![0.0; dim * dim];
    for row in &centered {
        for a in 0..dim {
            if row[a] == 0.0 {
                continue;
            }
            for b in 0..dim {
                covariance[a * dim + b] += row[a] * row[b];
            }
        }
    }

    let first = leading_eigenvector(&covariance, dim, rng);
    let first_value = rayleigh_quotient(&covariance, dim, &first);
    for a in 0..dim {
        for b in 0..dim {
            covariance[a * dim + b] -= first_value * first[a] * first[b];
        }
    }
    let second = leading_eigenvector(&covariance, dim, rng);

    let mut projected: Vec<[f64; N_COMPONENTS]> = centered
        .iter()
        .map(|row| [dot(row, &first), dot(row, &second)])
        .collect();

    let column_mean = projected.iter().map(|p| p[0]).sum::<f64>() / n as f64;
    let std = (projected
        .iter()
        .map(|p| (p[0] - column_mean).powi(2))
        .sum::<f64>()
        / n as f64)
        .sqrt();
    if !std.is_finite() || std <= f64::EPSILON {
        return None;
    }

    let scale = INIT_SCALE / std;
    for point in &mut projected {
        point[0] *= scale;
        point[1] *= scale;
    }
    Some(projected)
}

/// Power iteration; the sign is fixed so the largest-magnitude entry is positive.
/// Returns the zero vector for a zero matrix.
fn leading_eigenvector(matrix: &[f64], dim: usize, rng: &mut StdRng) -> Vec<f64> {
    let uniform = rand::distributions::Uniform::new(-1.0, 1.0);
    let mut vector: Vec<f64> = (0..dim).map(|_| uniform.sample(rng)).collect();
    normalize(&mut vector);

    for _ in 0..POWER_ITERATIONS {
        let mut next = vec![0.0; dim];
        for a in 0..dim {
            next[a] = dot(&matrix[a * dim..(a + 1) * dim], &vector);
        }
        // Nothing left to explain along any direction.
        if normalize(&mut next) == 0.0 {
            return vec![0.0; dim];
        }
        let change: f64 = next
            .iter()
            .zip(&vector)
            .map(|(a, b)| (a - b).abs())
            .sum();
        vector = next;
        if change < 1e-12 {
            break;
        }
    }

    let pivot = vector
        .iter()
        .copied()
        .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
    if pivot < 0.0 {
        vector.iter_mut().for_each(|v| *v = -*v);
    }
    vector
}

fn rayleigh_quotient(matrix: &[f64], dim: usize, vector: &[f64]) -> f64 {
    (0..dim)
        .map(|a| vector[a] * dot(&matrix[a * dim..(a + 1) * dim], vector))
        .sum()
}

fn normalize(vector: &mut [f64]) -> f64 {
    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    norm
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
