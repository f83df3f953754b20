pub mod coordinator;
pub mod dispatcher;
pub mod engine;
pub mod outcome;
pub mod request;
pub mod strategy;
pub mod text_input;

pub use engine::{EngineConfig, InteractionEngine};
pub use outcome::{ActionOutcome, StrategyKind};
pub use request::{ActionRequest, Verifier};
pub use strategy::{RecognitionStrategy, Strategy, StructuralStrategy};
