//! Multinomial logistic regression trained with full-batch gradient descent.
//!
//! Minimises the mean cross-entropy over the training rows plus an L2 penalty of
//! `||W||^2 / (2 * C * n)`, which matches the usual `C`-parameterised objective scaled by
//! `1 / n`. Intercepts are not penalised.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use log::{debug, warn};

use super::error::ClassifierError;
use super::utils::{argmax, softmax};

/// Optimisation settings for [`LogisticRegression`]
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegressionConfig {
    /// Inverse regularisation strength; smaller values regularise more
    pub c: f32,
    /// Upper bound on gradient descent iterations
    pub max_iter: usize,
    /// Step size
    pub learning_rate: f32,
    /// Stop once the largest absolute gradient component falls below this value
    pub tolerance: f32,
}

impl Default for LogisticRegressionConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            learning_rate: 1.0,
            tolerance: 1e-4,
        }
    }
}

impl LogisticRegressionConfig {
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(ClassifierError::ValidationError(format!("C must be positive, got {}", self.c)));
        }
        if self.max_iter == 0 {
            return Err(ClassifierError::ValidationError("max_iter must be at least 1".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ClassifierError::ValidationError(
                format!("Learning rate must be positive, got {}", self.learning_rate)
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(ClassifierError::ValidationError(
                format!("Tolerance must be non-negative, got {}", self.tolerance)
            ));
        }
        Ok(())
    }
}

/// Fitted linear model: `logits = weights · x + intercepts`, one row per class.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticRegression {
    weights: Array2<f32>,
    intercepts: Array1<f32>,
    n_iter: usize,
    converged: bool,
}

impl LogisticRegression {
    /// Fits the model on `features` (`n × d`) with class indices in `0..n_classes`.
    ///
    /// # Errors
    /// - `ValidationError` for invalid settings, empty input, row/label count mismatch,
    ///   out-of-range class indices, fewer than two classes or non-finite features
    /// - `PredictionError` if optimisation diverges
    pub fn fit(
        features: ArrayView2<f32>,
        targets: &[usize],
        n_classes: usize,
        config: &LogisticRegressionConfig,
    ) -> Result<Self, ClassifierError> {
        config.validate()?;
        let (n, d) = features.dim();
        if n == 0 || d == 0 {
            return Err(ClassifierError::ValidationError("Cannot fit on an empty feature matrix".into()));
        }
        if targets.len() != n {
            return Err(ClassifierError::ValidationError(format!(
                "Feature rows ({}) and targets ({}) differ in length", n, targets.len()
            )));
        }
        if n_classes < 2 {
            return Err(ClassifierError::ValidationError("At least two classes are required".into()));
        }
        if let Some(&bad) = targets.iter().find(|&&t| t >= n_classes) {
            return Err(ClassifierError::ValidationError(format!(
                "Class index {} is out of range for {} classes", bad, n_classes
            )));
        }
        if features.iter().any(|x| !x.is_finite()) {
            return Err(ClassifierError::ValidationError("Features contain non-finite values".into()));
        }

        let mut one_hot = Array2::<f32>::zeros((n, n_classes));
        for (row, &t) in targets.iter().enumerate() {
            one_hot[[row, t]] = 1.0;
        }

        let scale = 1.0 / n as f32;
        let l2 = 1.0 / (config.c * n as f32);
        let mut weights = Array2::<f32>::zeros((n_classes, d));
        let mut intercepts = Array1::<f32>::zeros(n_classes);
        let mut n_iter = 0;
        let mut converged = false;

        for iter in 1..=config.max_iter {
            n_iter = iter;
            let logits = features.dot(&weights.t()) + &intercepts;
            let mut residual = Array2::<f32>::zeros((n, n_classes));
            for (mut out, row) in residual.rows_mut().into_iter().zip(logits.rows()) {
                out.assign(&softmax(row));
            }
            residual -= &one_hot;

            let grad_w = residual.t().dot(&features) * scale + &weights * l2;
            let grad_b = residual.sum_axis(Axis(0)) * scale;

            let max_grad = grad_w.iter().chain(grad_b.iter()).fold(0.0f32, |m, g| m.max(g.abs()));
            if !max_grad.is_finite() {
                return Err(ClassifierError::PredictionError(
                    format!("Gradient descent diverged at iteration {}", iter)
                ));
            }
            if max_grad < config.tolerance {
                converged = true;
                break;
            }

            weights.scaled_add(-config.learning_rate, &grad_w);
            intercepts.scaled_add(-config.learning_rate, &grad_b);

            if iter % 100 == 0 {
                debug!("iteration {}: max |gradient| = {:.6}", iter, max_grad);
            }
        }

        if !converged {
            warn!(
                "Logistic regression did not converge within {} iterations; consider raising max_iter",
                config.max_iter
            );
        }

        Ok(Self { weights, intercepts, n_iter, converged })
    }

    /// Rebuilds a fitted model from stored parameters.
    pub fn from_parameters(weights: Array2<f32>, intercepts: Array1<f32>) -> Result<Self, ClassifierError> {
        if weights.nrows() != intercepts.len() {
            return Err(ClassifierError::ArtifactError(format!(
                "{} weight rows but {} intercepts", weights.nrows(), intercepts.len()
            )));
        }
        if weights.nrows() < 2 || weights.ncols() == 0 {
            return Err(ClassifierError::ArtifactError(format!(
                "Weight matrix has invalid shape {:?}", weights.dim()
            )));
        }
        if weights.iter().chain(intercepts.iter()).any(|x| !x.is_finite()) {
            return Err(ClassifierError::ArtifactError("Parameters contain non-finite values".into()));
        }
        Ok(Self { weights, intercepts, n_iter: 0, converged: true })
    }

    pub fn n_classes(&self) -> usize {
        self.weights.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.weights.ncols()
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    pub fn intercepts(&self) -> &Array1<f32> {
        &self.intercepts
    }

    /// Iterations run by `fit`; zero for models restored from parameters
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Class probabilities for one feature vector.
    pub fn predict_proba(&self, x: ArrayView1<f32>) -> Result<Array1<f32>, ClassifierError> {
        if x.len() != self.n_features() {
            return Err(ClassifierError::PredictionError(format!(
                "Feature vector has dimension {} (expected {})", x.len(), self.n_features()
            )));
        }
        let logits = self.weights.dot(&x) + &self.intercepts;
        let proba = softmax(logits.view());
        if proba.iter().any(|p| !p.is_finite()) {
            return Err(ClassifierError::PredictionError("Non-finite class probabilities".into()));
        }
        Ok(proba)
    }

    /// Index of the most probable class for one feature vector.
    pub fn predict(&self, x: ArrayView1<f32>) -> Result<usize, ClassifierError> {
        let proba = self.predict_proba(x)?;
        argmax(proba.view()).ok_or_else(|| ClassifierError::PredictionError("Model has no classes".into()))
    }

    /// Predicted class index for every row of `features`.
    pub fn predict_batch(&self, features: ArrayView2<f32>) -> Result<Vec<usize>, ClassifierError> {
        features.rows().into_iter().map(|row| self.predict(row)).collect()
    }
}
