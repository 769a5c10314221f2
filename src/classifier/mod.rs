pub mod model;
pub mod session;
pub mod store;

pub use model::{log_loss, LogisticModel, FEATURE_DIM};
pub use session::{parse_sample_groups, parse_samples, ClassifierSession};
pub use store::{EvictionPolicy, InMemoryModelStore, ModelStore};
