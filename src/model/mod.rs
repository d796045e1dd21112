/// Regression network, optimizer, training loop and evaluation.
///
/// ```text
///   ReducedSet (train) ──► Trainer ──► TrainedModel ──► gas challenge
///                            │  ▲
///                            ▼  │ per epoch
///   ReducedSet (val)  ──► evaluate
/// ```

pub mod eval;
pub mod network;
pub mod optim;
pub mod train;

pub use eval::{evaluate, ErrorSummary, Evaluation};
pub use network::{LsdNetwork, Regressor};
pub use train::{learning_rate, TrainedModel, Trainer, TrainingHistory};
