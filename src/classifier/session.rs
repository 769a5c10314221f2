use super::model::{train_incremental, FEATURE_DIM};
use super::store::{InMemoryModelStore, ModelStore};
use crate::config::{TrainingConfig, MAX_EPOCHS};
use crate::error::{AnalysisError, Result};
use crate::models::{ColorSample, TrainOutcome};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Trains color classifiers and serves predictions from a model store.
///
/// Identifiers are a monotonically increasing counter rendered as a string.
/// The counter is advanced atomically, so concurrent `train` calls always get
/// distinct identifiers.
pub struct ClassifierSession<S: ModelStore = InMemoryModelStore> {
    store: S,
    next_id: AtomicU64,
    training: TrainingConfig,
}

impl Default for ClassifierSession {
    fn default() -> Self {
        Self::new(InMemoryModelStore::default(), TrainingConfig::default())
    }
}

impl<S: ModelStore> ClassifierSession<S> {
    pub fn new(store: S, training: TrainingConfig) -> Self {
        Self {
            store,
            next_id: AtomicU64::new(0),
            training,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Train with the configured number of epochs.
    pub fn train(&self, groups: &[Vec<ColorSample>], labels: &[i64]) -> Result<TrainOutcome> {
        self.train_with_epochs(groups, labels, self.training.epochs)
    }

    /// Every sample in `groups[i]` is labeled `labels[i]`.
    pub fn train_with_epochs(&self, groups: &[Vec<ColorSample>], labels: &[i64], epochs: usize) -> Result<TrainOutcome> {
        if groups.len() != labels.len() {
            return Err(AnalysisError::invalid(format!(
                "got {} sample groups but {} labels",
                groups.len(),
                labels.len()
            )));
        }
        if epochs == 0 || epochs > MAX_EPOCHS {
            return Err(AnalysisError::invalid(format!(
                "epoch count must be between 1 and {} (got {})",
                MAX_EPOCHS, epochs
            )));
        }

        let total: usize = groups.iter().map(Vec::len).sum();
        let mut samples = Vec::with_capacity(total);
        let mut sample_labels = Vec::with_capacity(total);
        for (group, &label) in groups.iter().zip(labels) {
            samples.extend_from_slice(group);
            sample_labels.extend(std::iter::repeat_n(label, group.len()));
        }

        if samples.is_empty() {
            return Err(AnalysisError::invalid("no color samples to train on"));
        }
        let mut distinct = sample_labels.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() < 2 {
            return Err(AnalysisError::invalid(format!(
                "training needs samples from at least two classes, got {:?}",
                distinct
            )));
        }

        tracing::info!(
            "Training on {} samples from {} groups ({} classes, {} epochs)",
            samples.len(),
            groups.len(),
            distinct.len(),
            epochs
        );

        let config = TrainingConfig { epochs, ..self.training };
        let (model, loss_history) = train_incremental(&samples, &sample_labels, &config);
        if loss_history.iter().any(|l| !l.is_finite()) {
            return Err(AnalysisError::processing("training diverged (non-finite loss)"));
        }

        let model_id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.store.put(model_id.clone(), Arc::new(model))?;

        tracing::info!("Model trained: {}, losses: {:?}", model_id, loss_history);
        Ok(TrainOutcome { model_id, loss_history })
    }

    pub fn predict(&self, model_id: &str, samples: &[ColorSample]) -> Result<Vec<i64>> {
        let model = self
            .store
            .get(model_id)?
            .ok_or_else(|| AnalysisError::not_found(format!("Model not found: {}", model_id)))?;

        let predictions = model.predict(samples);
        tracing::debug!("Prediction for model {}: {} samples", model_id, predictions.len());
        Ok(predictions)
    }
}

/// Convert wire-level integer lists into color samples, one group at a time.
pub fn parse_sample_groups(raw: &[Vec<Vec<i64>>]) -> Result<Vec<Vec<ColorSample>>> {
    raw.iter()
        .enumerate()
        .map(|(group_idx, group)| {
            parse_samples(group).map_err(|e| match e {
                AnalysisError::InvalidArgument(msg) => {
                    AnalysisError::invalid(format!("group {}: {}", group_idx, msg))
                }
                other => other,
            })
        })
        .collect()
}

/// Each sample must have exactly three components in 0..=255.
pub fn parse_samples(raw: &[Vec<i64>]) -> Result<Vec<ColorSample>> {
    raw.iter()
        .enumerate()
        .map(|(idx, values)| {
            if values.len() != FEATURE_DIM {
                return Err(AnalysisError::invalid(format!(
                    "sample {} has {} components, expected {}",
                    idx,
                    values.len(),
                    FEATURE_DIM
                )));
            }
            let mut rgb = [0u8; FEATURE_DIM];
            for (dst, &v) in rgb.iter_mut().zip(values) {
                *dst = u8::try_from(v).map_err(|_| {
                    AnalysisError::invalid(format!("sample {} component {} is outside 0..=255", idx, v))
                })?;
            }
            Ok(ColorSample(rgb))
        })
        .collect()
}
