//! Answer assembly: retrieved subgraph -> prompt -> generated answer.

use crate::graph::EntityDocument;
use crate::llm::{Generator, Message};
use crate::rag::retrieval::CoherentRetriever;
use crate::rag::tokens::TokenCounter;
use crate::rag::vocabulary::CidocVocabulary;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Returned when retrieval finds nothing.
pub const NO_CONTEXT_MESSAGE: &str =
    "I couldn't find any relevant information in the knowledge graph to answer your question.";

/// Returned when the generator fails.
pub const GENERATION_FAILED_MESSAGE: &str =
    "I'm sorry, I encountered an error while generating an answer. Please try again later.";

const SYSTEM_PROMPT: &str = "You are an assistant answering questions about a cultural heritage \
knowledge graph modelled with the CIDOC Conceptual Reference Model (CIDOC-CRM). \
Answer using only the entities provided in the context. Each entity lists its label, \
CIDOC-CRM class, identifier and a description of its relationships. Follow the \
relationships between entities to connect facts, mention the entities you rely on by label, \
and say plainly when the context does not contain the answer.";

/// Answer assembly settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerConfig {
    /// Token budget for the entity context block in the user prompt.
    pub context_token_budget: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            context_token_budget: 3000,
        }
    }
}

/// A source entity cited by an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub entity_label: String,
    pub entity_type: String,
}

impl From<&EntityDocument> for Source {
    fn from(doc: &EntityDocument) -> Self {
        Self {
            id: doc.id.clone(),
            entity_label: doc.label().to_string(),
            entity_type: doc.entity_type().to_string(),
        }
    }
}

/// Answer text plus the entities retrieved for it, in selection order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
}

impl ChatAnswer {
    fn without_sources(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            sources: Vec::new(),
        }
    }
}

/// Builds prompts from retrieved entities and asks the generator.
#[derive(Debug, Clone)]
pub struct AnswerAssembler {
    generator: Arc<dyn Generator>,
    vocabulary: Arc<CidocVocabulary>,
    tokens: TokenCounter,
    config: AnswerConfig,
}

impl AnswerAssembler {
    pub fn new(
        generator: Arc<dyn Generator>,
        vocabulary: Arc<CidocVocabulary>,
        config: AnswerConfig,
    ) -> Self {
        Self {
            generator,
            vocabulary,
            tokens: TokenCounter::new(),
            config,
        }
    }

    /// Retrieve a coherent subgraph for `question` and answer from it.
    pub async fn answer(&self, retriever: &CoherentRetriever, question: &str) -> ChatAnswer {
        let documents = retriever.retrieve_default(question).await;
        self.answer_from(question, &documents).await
    }

    /// Answer `question` from already retrieved `documents`.
    ///
    /// Never fails: no documents or a generator error produce a fixed
    /// message with no sources.
    pub async fn answer_from(&self, question: &str, documents: &[EntityDocument]) -> ChatAnswer {
        if documents.is_empty() {
            info!(name: "answer.no_context", "No entities retrieved for question");
            return ChatAnswer::without_sources(NO_CONTEXT_MESSAGE);
        }

        let (user_prompt, included) = self.build_user_prompt(question, documents);
        if included < documents.len() {
            warn!(
                included = included,
                retrieved = documents.len(),
                budget = self.config.context_token_budget,
                "Context budget reached, dropping lower-ranked entities from the prompt"
            );
        }

        match self.generator.generate(SYSTEM_PROMPT, &user_prompt).await {
            Ok(answer) => {
                let prompt_tokens = self
                    .tokens
                    .count_messages(&[Message::system(SYSTEM_PROMPT), Message::user(&user_prompt)]);
                info!(
                    name: "answer.generated",
                    model = %self.generator.model(),
                    entities = included,
                    prompt_tokens = prompt_tokens,
                    "Answer generated"
                );
                ChatAnswer {
                    answer,
                    sources: documents.iter().map(Source::from).collect(),
                }
            }
            Err(e) => {
                error!(error = %e, model = %self.generator.model(), "Answer generation failed");
                ChatAnswer::without_sources(GENERATION_FAILED_MESSAGE)
            }
        }
    }

    /// User prompt with as many entities as fit the context budget, and the
    /// number included. The first entity is always included.
    pub fn build_user_prompt(&self, question: &str, documents: &[EntityDocument]) -> (String, usize) {
        let mut context = String::new();
        let mut used = 0usize;
        let mut included = 0usize;

        for doc in documents {
            let block = self.entity_block(doc, documents);
            let cost = self.tokens.count(&block);
            if included > 0 && used + cost > self.config.context_token_budget {
                break;
            }
            context.push_str(&block);
            used += cost;
            included += 1;
        }

        let prompt = format!(
            "Context entities from the knowledge graph:\n\n{context}Question: {question}\n\nAnswer:"
        );
        (prompt, included)
    }

    fn entity_block(&self, doc: &EntityDocument, retrieved: &[EntityDocument]) -> String {
        let raw_type = doc.entity_type();
        let type_label = self.vocabulary.class_label(raw_type).unwrap_or(raw_type);

        let mut block = String::new();
        let _ = writeln!(block, "Entity: {}", doc.label());
        let _ = writeln!(block, "Type: {type_label}");
        let _ = writeln!(block, "ID: {}", doc.id);
        let _ = writeln!(block, "Description: {}", doc.text.trim());

        // only edges inside the retrieved subgraph
        let relations: Vec<String> = doc
            .neighbors
            .iter()
            .filter_map(|edge| {
                let target = retrieved.iter().find(|d| d.id == edge.neighbor_id)?;
                let predicate = self
                    .vocabulary
                    .property_label(&edge.edge_type)
                    .unwrap_or(&edge.edge_type);
                Some(format!("{predicate} {}", target.label()))
            })
            .collect();
        if !relations.is_empty() {
            let _ = writeln!(block, "Relations: {}", relations.join("; "));
        }
        block.push('\n');
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EntityMetadata, NeighborEdge};
    use crate::llm::GenerationError;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Generator for RecordingGenerator {
        async fn generate(&self, _system: &str, user: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(user.to_string());
            if self.fail {
                Err(GenerationError::EmptyResponse)
            } else {
                Ok("It is held in the British Museum.".to_string())
            }
        }

        fn model(&self) -> &str {
            "recording"
        }
    }

    fn doc(id: &str, label: &str, class: &str, text: &str) -> EntityDocument {
        EntityDocument::new(id, text, EntityMetadata::new(label, class), vec![0.0])
    }

    fn assembler(generator: Arc<RecordingGenerator>, budget: usize) -> AnswerAssembler {
        AnswerAssembler::new(
            generator,
            Arc::new(CidocVocabulary::builtin()),
            AnswerConfig {
                context_token_budget: budget,
            },
        )
    }

    fn sample_docs() -> Vec<EntityDocument> {
        vec![
            doc(
                "http://example.org/rosetta",
                "Rosetta Stone",
                "http://www.cidoc-crm.org/cidoc-crm/E22_Human-Made_Object",
                "Rosetta Stone has current location British Museum.",
            ),
            doc(
                "http://example.org/bm",
                "British Museum",
                "http://www.cidoc-crm.org/cidoc-crm/E53_Place",
                "British Museum falls within London.",
            ),
        ]
    }

    #[tokio::test]
    async fn test_no_documents_returns_fixed_message() {
        let generator = Arc::new(RecordingGenerator::default());
        let out = assembler(Arc::clone(&generator), 3000).answer_from("Where?", &[]).await;

        assert_eq!(out.answer, NO_CONTEXT_MESSAGE);
        assert!(out.sources.is_empty());
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answer_lists_sources_in_order() {
        let generator = Arc::new(RecordingGenerator::default());
        let out = assembler(Arc::clone(&generator), 3000)
            .answer_from("Where is the Rosetta Stone?", &sample_docs())
            .await;

        assert_eq!(out.answer, "It is held in the British Museum.");
        let ids: Vec<&str> = out.sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["http://example.org/rosetta", "http://example.org/bm"]);
        assert_eq!(out.sources[1].entity_label, "British Museum");

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Type: Human-Made Object"));
        assert!(prompts[0].contains("Type: Place"));
        assert!(prompts[0].ends_with("Question: Where is the Rosetta Stone?\n\nAnswer:"));
    }

    #[tokio::test]
    async fn test_generation_failure_returns_apology() {
        let generator = Arc::new(RecordingGenerator {
            fail: true,
            ..Default::default()
        });
        let out = assembler(generator, 3000).answer_from("Where?", &sample_docs()).await;

        assert_eq!(out.answer, GENERATION_FAILED_MESSAGE);
        assert!(out.sources.is_empty());
    }

    #[tokio::test]
    async fn test_budget_keeps_first_entity_and_all_sources() {
        let generator = Arc::new(RecordingGenerator::default());
        let asm = assembler(Arc::clone(&generator), 1);

        let (prompt, included) = asm.build_user_prompt("Where?", &sample_docs());
        assert_eq!(included, 1);
        assert!(prompt.contains("Rosetta Stone"));
        assert!(!prompt.contains("ID: http://example.org/bm"));

        let out = asm.answer_from("Where?", &sample_docs()).await;
        assert_eq!(out.sources.len(), 2);
    }

    #[test]
    fn test_relations_within_subgraph_use_property_labels() {
        let asm = assembler(Arc::new(RecordingGenerator::default()), 3000);
        let mut docs = sample_docs();
        docs[0].neighbors.push(NeighborEdge {
            neighbor_id: "http://example.org/bm".to_string(),
            edge_type: "http://www.cidoc-crm.org/cidoc-crm/P55_has_current_location".to_string(),
            weight: 1.0,
        });
        docs[0].neighbors.push(NeighborEdge {
            neighbor_id: "http://example.org/elsewhere".to_string(),
            edge_type: "P2_has_type".to_string(),
            weight: 1.0,
        });
        docs[1].neighbors.push(NeighborEdge {
            neighbor_id: "http://example.org/rosetta".to_string(),
            edge_type: "custom_link".to_string(),
            weight: 1.0,
        });

        let (prompt, _) = asm.build_user_prompt("Where?", &docs);

        assert!(prompt.contains("Relations: has current location British Museum\n"));
        assert!(prompt.contains("Relations: custom_link Rosetta Stone\n"));
        assert!(!prompt.contains("elsewhere"));
    }

    #[test]
    fn test_unknown_class_keeps_raw_type() {
        let asm = assembler(Arc::new(RecordingGenerator::default()), 3000);
        let (prompt, _) = asm.build_user_prompt("q", &[doc("x", "X", "CustomThing", "text")]);
        assert!(prompt.contains("Type: CustomThing"));
    }
}
