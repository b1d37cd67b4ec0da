//! ActiveStream Classifiers
//!
//! Turns stored records into relevance scores.
//!
//! - [`FeatureExtractor`] vectorizes records against the shared vocabulary
//!   and stores them
//! - [`ClassifierService`] scores unlabelled records with the newest model,
//!   aligning each batch to the model's feature width
//! - [`Trainer`] refits a logistic regression on all labels whenever the
//!   annotation loop raises the retrain trigger

pub mod config;
pub mod extractor;
pub mod features;
pub mod logistic;
pub mod model;
pub mod service;
pub mod text;
pub mod trainer;

pub use config::{ClassifierConfig, ExtractorConfig, TrainerConfig};
pub use extractor::FeatureExtractor;
pub use features::{sparse_dot, FeatureMatrix};
pub use logistic::{LogisticConfig, LogisticRegression, LogisticTrainer};
pub use model::{ConstantModel, ModelSnapshot, ModelTrainer, RelevanceModel};
pub use service::{score_records, ClassifierService};
pub use text::TextProcessor;
pub use trainer::Trainer;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::features::FeatureMatrix;
    pub use crate::model::{ModelSnapshot, ModelTrainer, RelevanceModel};
    pub use crate::{ClassifierService, FeatureExtractor, Trainer};
}
