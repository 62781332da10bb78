//! External collaborators reached over the network, and the text handling
//! around them.
//!
//! # Module Structure
//!
//! - `oracle`: Chat-completion oracle trait and its error type
//! - `openai_oracle`: OpenAI-compatible HTTP client (chat and embeddings)
//! - `prompts`: Prompt templates
//! - `extractor`: Phase-1 parameter extractors (oracle-backed and lexical)
//! - `responders`: Phase-2 responders (data answer, advisor, change parser)

pub mod extractor;
pub mod openai_oracle;
pub mod oracle;
pub mod prompts;
pub mod responders;

pub use extractor::{Extraction, LexicalExtractor, OracleExtractor, ParameterExtractor};
pub use openai_oracle::OpenAiCompatibleOracle;
pub use oracle::{ChatOracle, OracleError};
pub use prompts::PromptLibrary;
pub use responders::{AnalysisContext, ChangeProposal, Responders};
