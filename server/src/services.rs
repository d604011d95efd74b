pub(crate) mod generation {
    use std::future::Future;

    use axum::http::{HeaderValue, StatusCode};
    use serde_json::{Map, Value};

    /// A page request on its way to the generation engine.
    #[derive(Debug, Clone)]
    pub(crate) struct Forward {
        pub(crate) url: reqwest::Url,
        pub(crate) authorization: HeaderValue,
        pub(crate) routing: HeaderValue,
        pub(crate) body: Map<String, Value>,
    }

    /// What the generation engine answered.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Relayed {
        pub(crate) status: StatusCode,
        pub(crate) body: Value,
    }

    pub(crate) trait GeneratePage {
        fn generate(
            &self,
            forward: Forward,
        ) -> impl Future<Output = Result<Relayed, GenerateError>> + Send;
    }

    pub(crate) mod http {
        use std::time::Duration;

        use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};

        use super::{Forward, GenerateError, Relayed};
        use crate::responses::ROUTING_HEADER;

        #[derive(Clone)]
        pub(crate) struct GeneratePage(pub(crate) reqwest::Client);

        impl GeneratePage {
            pub(crate) fn new(timeout: Duration) -> Result<Self, GenerateError> {
                reqwest::Client::builder()
                    .timeout(timeout)
                    .build()
                    .map(Self)
                    .map_err(|e| GenerateError::Upstream(e.to_string()))
            }
        }

        impl super::GeneratePage for GeneratePage {
            async fn generate(&self, forward: Forward) -> Result<Relayed, GenerateError> {
                let body = serde_json::to_vec(&forward.body)
                    .map_err(|e| GenerateError::Upstream(e.to_string()))?;
                let response = self
                    .0
                    .post(forward.url)
                    .header(CONTENT_TYPE, "application/json")
                    .header(AUTHORIZATION, forward.authorization)
                    .header(ROUTING_HEADER, forward.routing)
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| GenerateError::Upstream(e.to_string()))?;

                let status = response.status();
                let body = response
                    .json()
                    .await
                    .map_err(|e| GenerateError::Upstream(e.to_string()))?;
                Ok(Relayed { status, body })
            }
        }
    }

    #[derive(Debug, thiserror::Error)]
    pub(crate) enum GenerateError {
        #[error("Invalid request body: {0}")]
        Body(String),
        #[error("Cannot derive generation url: {0}")]
        Url(String),
        #[error("{0}")]
        Upstream(String),
    }
}

pub(crate) mod persistence {
    use std::future::Future;

    use blocks::{ContentBlock, ContentBlockDraft};

    pub(crate) trait SaveBlocks {
        /// Inserts the draft, or updates the block it already became.
        ///
        /// Drafts with an `id` are keyed on it; all others on their
        /// idempotency key, so saving the same draft twice yields one block.
        fn save(
            &self,
            draft: &ContentBlockDraft,
        ) -> impl Future<Output = Result<ContentBlock, SaveBlocksError>> + Send;
    }

    pub(crate) mod pg {
        use blocks::{ContentBlock, ContentBlockDraft};
        use sqlx::Row as _;

        use super::SaveBlocksError;

        const RETURNING: &str = "returning id::text as id, curio_id, specialist_id, block_type, \
             content, liked, bookmarked, created_at";

        #[derive(Clone)]
        pub(crate) struct SaveBlocks(pub(crate) sqlx::PgPool);

        impl super::SaveBlocks for SaveBlocks {
            async fn save(&self, draft: &ContentBlockDraft) -> Result<ContentBlock, SaveBlocksError> {
                let mut builder = sqlx::QueryBuilder::new("insert into content_blocks (");
                if draft.id.is_some() {
                    builder.push("id, ");
                }
                builder.push(
                    "idempotency_key, curio_id, specialist_id, block_type, content, liked, bookmarked) values (",
                );
                let mut values = builder.separated(", ");
                if let Some(id) = &draft.id {
                    values.push_bind(id.clone()).push_unseparated("::uuid");
                }
                values
                    .push_bind(draft.idempotency_key())
                    .push_bind(draft.curio_id.clone())
                    .push_bind(draft.specialist_id.clone())
                    .push_bind(draft.block_type.as_str())
                    .push_bind(sqlx::types::Json(draft.content.clone()))
                    .push_bind(draft.liked)
                    .push_bind(draft.bookmarked);
                builder.push(") on conflict ");
                builder.push(if draft.id.is_some() {
                    "(id)"
                } else {
                    "(idempotency_key)"
                });
                builder.push(
                    " do update set curio_id = excluded.curio_id, \
                     specialist_id = excluded.specialist_id, \
                     block_type = excluded.block_type, \
                     content = excluded.content, \
                     liked = excluded.liked, \
                     bookmarked = excluded.bookmarked ",
                );
                builder.push(RETURNING);

                let row = builder
                    .build()
                    .fetch_one(&self.0)
                    .await
                    .map_err(|e| match e {
                        sqlx::Error::Database(db) if db.is_unique_violation() => {
                            SaveBlocksError::KeyTaken(draft.idempotency_key())
                        }
                        e => SaveBlocksError::Db(e),
                    })?;
                let block_type: String = row.try_get("block_type")?;
                let sqlx::types::Json(content): sqlx::types::Json<serde_json::Value> =
                    row.try_get("content")?;
                Ok(ContentBlock {
                    id: row.try_get("id")?,
                    curio_id: row.try_get("curio_id")?,
                    specialist_id: row.try_get("specialist_id")?,
                    block_type: block_type
                        .parse()
                        .map_err(|e: blocks::UnknownBlockType| SaveBlocksError::Corrupt(e.to_string()))?,
                    content,
                    liked: row.try_get("liked")?,
                    bookmarked: row.try_get("bookmarked")?,
                    created_at: row.try_get("created_at")?,
                })
            }
        }
    }

    pub(crate) mod memory {
        use std::sync::Arc;

        use blocks::{ContentBlock, ContentBlockDraft};
        use dashmap::{DashMap, mapref::entry::Entry};

        use super::SaveBlocksError;

        /// Process local store, used when no database is configured.
        #[derive(Clone, Default)]
        pub(crate) struct SaveBlocks {
            blocks: Arc<DashMap<String, ContentBlock>>,
            keys: Arc<DashMap<String, String>>,
        }

        impl SaveBlocks {
            #[cfg(test)]
            pub(crate) fn len(&self) -> usize {
                self.blocks.len()
            }
        }

        impl super::SaveBlocks for SaveBlocks {
            async fn save(&self, draft: &ContentBlockDraft) -> Result<ContentBlock, SaveBlocksError> {
                let key = draft.idempotency_key();
                let id = match &draft.id {
                    Some(id) => id.clone(),
                    None => self
                        .keys
                        .entry(key.clone())
                        .or_insert_with(|| uuid::Uuid::new_v4().to_string())
                        .clone(),
                };

                match self.blocks.entry(id.clone()) {
                    Entry::Occupied(mut existing) => {
                        let block = existing.get_mut();
                        block.curio_id = draft.curio_id.clone();
                        block.specialist_id = draft.specialist_id.clone();
                        block.block_type = draft.block_type;
                        block.content = draft.content.clone();
                        block.liked = draft.liked;
                        block.bookmarked = draft.bookmarked;
                        Ok(block.clone())
                    }
                    Entry::Vacant(vacant) => {
                        match self.keys.entry(key) {
                            Entry::Occupied(owner) if *owner.get() != id => {
                                return Err(SaveBlocksError::KeyTaken(owner.key().clone()));
                            }
                            Entry::Occupied(_) => {}
                            Entry::Vacant(free) => {
                                free.insert(id.clone());
                            }
                        }
                        let block = vacant.insert(ContentBlock {
                            id,
                            curio_id: draft.curio_id.clone(),
                            specialist_id: draft.specialist_id.clone(),
                            block_type: draft.block_type,
                            content: draft.content.clone(),
                            liked: draft.liked,
                            bookmarked: draft.bookmarked,
                            created_at: chrono::Utc::now(),
                        });
                        Ok(block.clone())
                    }
                }
            }
        }
    }

    #[derive(Debug, thiserror::Error)]
    pub(crate) enum SaveBlocksError {
        #[error("Failed to save block due to database error: {0}")]
        Db(#[from] sqlx::Error),
        #[error("Stored block is corrupt: {0}")]
        Corrupt(String),
        /// A new block was given an id while its idempotency key already
        /// belongs to another block.
        #[error("Another block was already saved under key {0}")]
        KeyTaken(String),
    }

    #[cfg(test)]
    mod tests {
        use super::SaveBlocks as _;
        use super::{SaveBlocksError, memory};
        use blocks::{BlockType, ContentBlockDraft};
        use serde_json::json;

        #[tokio::test]
        async fn saving_the_same_draft_twice_keeps_one_block() {
            let store = memory::SaveBlocks::default();
            let draft = ContentBlockDraft::new("nova", BlockType::Fact, json!({ "fact": "x" }))
                .at_position("curio-1", 0);

            let first = store.save(&draft).await.unwrap();
            let second = store.save(&draft).await.unwrap();
            assert_eq!(first.id, second.id);
            assert_eq!(first.created_at, second.created_at);
            assert_eq!(store.len(), 1);
        }

        #[tokio::test]
        async fn identical_unkeyed_drafts_share_a_fingerprint() {
            let store = memory::SaveBlocks::default();
            let draft = ContentBlockDraft::new("spark", BlockType::Quiz, json!({ "q": "?" }));

            let (a, b) = tokio::join!(store.save(&draft), store.save(&draft));
            assert_eq!(a.unwrap().id, b.unwrap().id);
            assert_eq!(store.len(), 1);
        }

        #[tokio::test]
        async fn drafts_with_an_id_update_that_block() {
            let store = memory::SaveBlocks::default();
            let draft = ContentBlockDraft::new("nova", BlockType::Fact, json!({ "fact": "x" }));
            let saved = store.save(&draft).await.unwrap();

            let mut liked = draft.clone();
            liked.id = Some(saved.id.clone());
            liked.liked = true;
            let updated = store.save(&liked).await.unwrap();

            assert_eq!(updated.id, saved.id);
            assert!(updated.liked);
            assert_eq!(store.len(), 1);
        }

        #[tokio::test]
        async fn different_positions_are_different_blocks() {
            let store = memory::SaveBlocks::default();
            let base = ContentBlockDraft::new("nova", BlockType::Fact, json!({ "fact": "x" }));

            let a = store.save(&base.clone().at_position("c", 0)).await.unwrap();
            let b = store.save(&base.at_position("c", 1)).await.unwrap();
            assert_ne!(a.id, b.id);
            assert_eq!(store.len(), 2);
        }

        #[tokio::test]
        async fn key_of_a_block_saved_with_an_id_is_reused() {
            let store = memory::SaveBlocks::default();
            let mut draft = ContentBlockDraft::new("nova", BlockType::Fact, json!({ "fact": "x" }))
                .at_position("curio-1", 0);
            draft.id = Some("11111111-1111-4111-8111-111111111111".to_owned());
            let first = store.save(&draft).await.unwrap();

            draft.id = None;
            let second = store.save(&draft).await.unwrap();
            assert_eq!(second.id, first.id);
            assert_eq!(store.len(), 1);
        }

        #[tokio::test]
        async fn new_id_cannot_claim_a_taken_key() {
            let store = memory::SaveBlocks::default();
            let mut draft = ContentBlockDraft::new("nova", BlockType::Fact, json!({ "fact": "x" }))
                .at_position("curio-1", 0);
            let first = store.save(&draft).await.unwrap();

            draft.id = Some("11111111-1111-4111-8111-111111111111".to_owned());
            let err = store.save(&draft).await.unwrap_err();
            assert!(matches!(err, SaveBlocksError::KeyTaken(ref key) if key == "curio-1:nova:0"));
            assert_eq!(store.len(), 1);

            draft.id = Some(first.id.clone());
            assert_eq!(store.save(&draft).await.unwrap().id, first.id);
        }
    }
}
