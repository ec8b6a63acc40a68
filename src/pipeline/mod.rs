//! Data quality and governance stages, leaf-first: assessment, ledger,
//! splitting, bias analysis and alerting, plus the runner that ties them
//! together for one run.

pub mod aggregate;
pub mod alerts;
pub mod assess;
pub mod bias;
pub mod checksum;
pub mod context;
pub mod data_card;
pub mod ingest;
pub mod labels;
pub mod ledger;
pub mod orchestrator;
pub mod split;
pub mod verify;

pub use aggregate::LedgerMetrics;
pub use alerts::{AlertEngine, AlertEvent, AlertLog, AlertPayload, AlertSink, JsonFileSink, TracingSink};
pub use assess::{Assessment, LaplacianAssessor, QualityAssessor};
pub use bias::{BiasCheckType, BiasDetector, BiasFinding, BiasReport, BiasStatistic};
pub use context::{RunContext, Stage};
pub use ledger::{LedgerBuild, MetadataLedger, Table};
pub use orchestrator::{Pipeline, PipelineResult};
pub use split::{Completeness, LabeledReceipts, RequiredMetadata, SplitAssignment};
pub use verify::{verify_outputs, VerificationReport};
