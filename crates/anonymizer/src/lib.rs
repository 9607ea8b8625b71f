//! Document-level anonymization on top of `anonymizer_core`: the language
//! model entity oracle, configuration, the chunk pipeline and result files.

pub mod config;
pub mod logging;
pub mod oracle;
pub mod output;
pub mod pipeline;
pub mod prompts;

pub use config::AnonymizerConfig;
pub use oracle::{
    parse_entities, Completion, EntityOracle, ExhaustionPolicy, LlmCompletion, OracleError,
    RetryPolicy,
};
pub use output::{deanonymize_file, save_results, DeanonymizationReport, SavedResult};
pub use pipeline::{
    anonymize_document, anonymize_document_parallel, run_batch, BatchReport, EntityFilter,
    SourceDocument,
};
