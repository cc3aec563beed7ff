//! Retrieval-augmented answering over the entity graph.
//!
//! - [`retrieval`]: two-stage coherent subgraph retrieval
//! - [`reweight`], [`cidoc`]: optional pool reweighting stages
//! - [`sparql`]: live relationship source for CIDOC reweighting
//! - [`answer`]: prompt assembly and generation
//! - [`vocabulary`]: CIDOC-CRM labels and relationship weights

pub mod answer;
pub mod cidoc;
pub mod retrieval;
pub mod reweight;
pub mod sparql;
pub mod tokens;
pub mod vocabulary;

pub use answer::{AnswerAssembler, AnswerConfig, ChatAnswer, Source};
pub use cidoc::{CidocReweighter, EntityRelationship, RelationshipError, RelationshipSource};
pub use retrieval::{CoherentRetriever, RetrieverConfig, compute_coherent_subgraph};
pub use reweight::{PageRankReweighter, PoolReweighter};
pub use sparql::{SparqlConfig, SparqlRelationshipSource};
pub use vocabulary::CidocVocabulary;
