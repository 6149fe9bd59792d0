//! Chat session manager.
//!
//! Orchestrates one "send message" unit of work: persist the user turn,
//! retrieve supporting context, call the generation provider, persist the
//! assistant turn with its citations. Sends to the same session are
//! serialized through a per-session lock so history never interleaves;
//! different sessions proceed independently.
//!
//! Failure contract: retrieval trouble degrades to generation without
//! context, and a generation failure leaves the already-persisted user
//! message in place so a retry does not duplicate input.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::core::errors::ApiError;
use crate::llm::{ChatTurn, Generator};
use crate::retrieve::{cited_document_ids, format_context, Retriever};
use crate::store::{ChatStore, Role};

const HISTORY_TURNS: i64 = 20;

const SYSTEM_PROMPT: &str = "\
You are the product assistant for Praetorian Smart-Coat, a ceramic coating \
company serving construction, marina, pool and fire-prevention customers. \
Answer using the provided context where possible and cite it by its \
bracketed number. If the context does not cover the question, say so \
plainly instead of inventing specifications.";

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub assistant_text: String,
    pub cited_document_ids: Vec<String>,
}

pub struct ChatService {
    history: ChatStore,
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChatService {
    pub fn new(history: ChatStore, retriever: Retriever, generator: Arc<dyn Generator>) -> Self {
        Self {
            history,
            retriever,
            generator,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one user message end to end. Creates the session on first
    /// contact; rejects sends to a closed session.
    pub async fn send_message(
        &self,
        session_id: &str,
        text: &str,
        user_id: Option<&str>,
        category: Option<&str>,
    ) -> Result<ChatReply, ApiError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::BadRequest("message must not be empty".to_string()));
        }

        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let (session, _created) = self
            .history
            .ensure_session(session_id, user_id, Some(text))
            .await?;
        if !session.active {
            return Err(ApiError::BadRequest("session is closed".to_string()));
        }

        self.history
            .append_message(session_id, Role::User, text, None)
            .await?;

        // Retrieval trouble must not sink the whole request; fall back to
        // answering without context.
        let hits = match self.retriever.retrieve(text, category).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(
                    "Retrieval failed for session {}; answering without context: {}",
                    session_id,
                    err
                );
                Vec::new()
            }
        };

        let (context, included) = format_context(&hits, self.retriever.max_context_chars());
        let system_prompt = if context.is_empty() {
            SYSTEM_PROMPT.to_string()
        } else {
            format!("{SYSTEM_PROMPT}\n\nContext:\n{context}")
        };

        let turns = self.recent_turns(session_id).await?;
        let assistant_text = self.generator.generate(&system_prompt, &turns).await?;

        // Cite only the sources that fit into the context block; hits the
        // budget dropped never reached the model.
        let cited = cited_document_ids(&hits[..included]);
        self.history
            .append_message(session_id, Role::Assistant, &assistant_text, Some(&cited))
            .await?;

        Ok(ChatReply {
            assistant_text,
            cited_document_ids: cited,
        })
    }

    async fn recent_turns(&self, session_id: &str) -> Result<Vec<ChatTurn>, ApiError> {
        let messages = self.history.get_messages(session_id, HISTORY_TURNS).await?;
        Ok(messages
            .into_iter()
            .map(|msg| ChatTurn {
                role: msg.role,
                content: msg.content,
            })
            .collect())
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the send lock for a session that was closed or deleted. An
    /// in-flight send keeps its own `Arc` clone, so this only trims the map.
    pub async fn forget_session(&self, session_id: &str) {
        self.session_locks.lock().await.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::chunk::TextChunk;
    use crate::core::config::RetrievalConfig;
    use crate::embed::{Embedder, HashEmbedder};
    use crate::store::{test_pool, KnowledgeStore, NewDocument};

    struct CannedGenerator {
        reply: String,
        fail: AtomicBool,
    }

    impl CannedGenerator {
        fn ok(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                fail: AtomicBool::new(false),
            }
        }

        fn failing() -> Self {
            Self {
                reply: String::new(),
                fail: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl Generator for CannedGenerator {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(
            &self,
            _system_prompt: &str,
            _turns: &[ChatTurn],
        ) -> Result<String, ApiError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ApiError::GenerationFailed("model offline".to_string()));
            }
            Ok(self.reply.clone())
        }
    }

    async fn service_with(
        generator: Arc<dyn Generator>,
    ) -> (Arc<ChatService>, ChatStore, KnowledgeStore) {
        let pool = test_pool().await;
        let knowledge = KnowledgeStore::new(pool.clone());
        let history = ChatStore::new(pool);
        let embedder = Arc::new(HashEmbedder::new(64));
        let retriever = Retriever::new(
            knowledge.clone(),
            embedder,
            RetrievalConfig::default(),
            1,
        );

        let service = Arc::new(ChatService::new(history.clone(), retriever, generator));
        (service, history, knowledge)
    }

    async fn seed_document(store: &KnowledgeStore, title: &str, text: &str) -> String {
        let doc = store
            .create_document(NewDocument {
                title: title.to_string(),
                content: text.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let embedder = HashEmbedder::new(64);
        let vectors = embedder.embed(&[text.to_string()]).await.unwrap();
        store
            .replace_chunks(
                &doc.id,
                &[(
                    TextChunk {
                        chunk_index: 0,
                        start_offset: 0,
                        text: text.to_string(),
                    },
                    vectors.into_iter().next().unwrap(),
                )],
            )
            .await
            .unwrap();
        doc.id
    }

    #[tokio::test]
    async fn first_message_creates_session_and_replies_without_context() {
        let (service, history, _) =
            service_with(Arc::new(CannedGenerator::ok("happy to help"))).await;

        let reply = service
            .send_message("abc", "What is Smart-Coat?", None, None)
            .await
            .unwrap();

        assert_eq!(reply.assistant_text, "happy to help");
        // Empty chunk store: a valid answer with no citations.
        assert!(reply.cited_document_ids.is_empty());

        let session = history.get_session("abc").await.unwrap().unwrap();
        assert!(session.active);

        let messages = history.get_messages("abc", 100).await.unwrap();
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant"]);
    }

    #[tokio::test]
    async fn citations_point_at_the_retrieved_document() {
        let (service, history, knowledge) =
            service_with(Arc::new(CannedGenerator::ok("see the guide"))).await;
        let doc_id = seed_document(
            &knowledge,
            "Marina guide",
            "ceramic coating protects marina pilings from salt water",
        )
        .await;

        let reply = service
            .send_message("abc", "does the coating protect marina pilings?", None, None)
            .await
            .unwrap();

        assert_eq!(reply.cited_document_ids, vec![doc_id.clone()]);

        let messages = history.get_messages("abc", 100).await.unwrap();
        assert_eq!(messages[1].cited_documents, vec![doc_id]);
    }

    #[tokio::test]
    async fn generation_failure_keeps_the_user_message() {
        let (service, history, _) = service_with(Arc::new(CannedGenerator::failing())).await;

        let err = service
            .send_message("abc", "hello there", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::GenerationFailed(_)));

        let messages = history.get_messages("abc", 100).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "hello there");
    }

    #[tokio::test]
    async fn closed_session_rejects_new_messages() {
        let (service, history, _) = service_with(Arc::new(CannedGenerator::ok("ok"))).await;

        service
            .send_message("abc", "first", None, None)
            .await
            .unwrap();
        history.close_session("abc").await.unwrap();

        let err = service
            .send_message("abc", "second", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        // History is untouched by the rejected send.
        assert_eq!(history.message_count("abc").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn citations_are_limited_to_context_that_fit() {
        let pool = test_pool().await;
        let knowledge = KnowledgeStore::new(pool.clone());
        let history = ChatStore::new(pool);
        let embedder = Arc::new(HashEmbedder::new(64));
        // A one-character budget fits no context block at all, so the reply
        // must not cite anything even when the store has a match.
        let retriever = Retriever::new(
            knowledge.clone(),
            embedder,
            RetrievalConfig {
                max_context_chars: 1,
                ..Default::default()
            },
            1,
        );
        let service = ChatService::new(
            history,
            retriever,
            Arc::new(CannedGenerator::ok("answer")),
        );

        seed_document(
            &knowledge,
            "Marina guide",
            "ceramic coating protects marina pilings from salt water",
        )
        .await;

        let reply = service
            .send_message("abc", "does the coating protect marina pilings?", None, None)
            .await
            .unwrap();
        assert!(reply.cited_document_ids.is_empty());
    }

    #[tokio::test]
    async fn forgetting_a_session_releases_its_lock() {
        let (service, _, _) = service_with(Arc::new(CannedGenerator::ok("ok"))).await;

        service
            .send_message("abc", "first", None, None)
            .await
            .unwrap();
        assert!(service.session_locks.lock().await.contains_key("abc"));

        service.forget_session("abc").await;
        assert!(!service.session_locks.lock().await.contains_key("abc"));
    }

    #[tokio::test]
    async fn concurrent_sends_to_one_session_never_interleave() {
        let (service, history, _) = service_with(Arc::new(CannedGenerator::ok("reply"))).await;

        let a = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .send_message("abc", "message one", None, None)
                    .await
            })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .send_message("abc", "message two", None, None)
                    .await
            })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let messages = history.get_messages("abc", 100).await.unwrap();
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        // Each send commits its user/assistant pair before the next starts.
        assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
    }

    #[tokio::test]
    async fn blank_message_is_rejected_before_any_write() {
        let (service, history, _) = service_with(Arc::new(CannedGenerator::ok("ok"))).await;

        let err = service.send_message("abc", "   ", None, None).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(history.get_session("abc").await.unwrap().is_none());
    }
}
