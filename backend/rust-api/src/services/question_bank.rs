use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::metrics::{self, BANK_QUESTIONS};
use crate::models::GeneratedQuestion;
use crate::services::slot_storage::SlotStorage;
use crate::utils::time::now_millis;

pub const DEFAULT_BANK_KEY: &str = "zhixue_question_bank";

#[derive(Debug, Error)]
pub enum BankError {
    #[error("question bank storage failure: {0}")]
    Storage(String),

    #[error("failed to serialize question bank: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BankError {
    pub fn storage(message: impl Into<String>) -> Self {
        BankError::Storage(message.into())
    }
}

/// Saved practice questions, newest first, unique by question text.
///
/// The whole bank lives in one storage slot as a JSON array. Read-modify-write
/// cycles are serialized within the process.
pub struct QuestionBank {
    storage: Arc<dyn SlotStorage>,
    key: String,
    write_lock: Mutex<()>,
}

impl QuestionBank {
    pub fn new(storage: Arc<dyn SlotStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.storage.backend()
    }

    pub async fn ping(&self) -> Result<(), BankError> {
        self.storage.ping().await
    }

    /// Stamps `questions` with the current time, puts them ahead of the stored
    /// entries and drops later duplicates by question text. Returns the new
    /// bank size.
    pub async fn save(&self, questions: &[GeneratedQuestion]) -> Result<usize, BankError> {
        metrics::track_bank_operation("save", async {
            let _guard = self.write_lock.lock().await;
            let existing = self.load().await?;
            let merged = merge_into_bank(questions, existing, now_millis());
            self.persist(&merged).await?;

            tracing::info!(
                "Saved {} question(s) into bank, size={}",
                questions.len(),
                merged.len()
            );
            Ok::<_, BankError>(merged.len())
        })
        .await
    }

    /// Full bank; empty when nothing is stored or the stored value is unreadable.
    pub async fn list(&self) -> Result<Vec<GeneratedQuestion>, BankError> {
        metrics::track_bank_operation("list", self.load()).await
    }

    /// Entries whose question text or knowledge point contains `filter`.
    pub async fn search(&self, filter: &str) -> Result<Vec<GeneratedQuestion>, BankError> {
        let filter = filter.trim();
        let mut questions = self.list().await?;
        questions.retain(|question| question.matches(filter));
        Ok(questions)
    }

    pub async fn clear(&self) -> Result<(), BankError> {
        metrics::track_bank_operation("clear", async {
            let _guard = self.write_lock.lock().await;
            self.storage.remove(&self.key).await?;
            BANK_QUESTIONS.set(0);
            tracing::info!("Question bank cleared");
            Ok::<_, BankError>(())
        })
        .await
    }

    /// Removes the first entry with `id`. Nothing is written when no entry matches.
    pub async fn delete_one(&self, id: &str) -> Result<bool, BankError> {
        metrics::track_bank_operation("delete", async {
            let _guard = self.write_lock.lock().await;
            let mut questions = self.load().await?;
            let Some(position) = questions.iter().position(|question| question.id == id) else {
                tracing::debug!("Question {} not found in bank", id);
                return Ok(false);
            };
            questions.remove(position);

            self.persist(&questions).await?;
            tracing::info!("Deleted question {} from bank", id);
            Ok::<_, BankError>(true)
        })
        .await
    }

    async fn load(&self) -> Result<Vec<GeneratedQuestion>, BankError> {
        let Some(raw) = self.storage.get(&self.key).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<GeneratedQuestion>>(&raw) {
            Ok(questions) => Ok(questions),
            Err(e) => {
                tracing::warn!("Stored question bank is unreadable, treating as empty: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn persist(&self, questions: &[GeneratedQuestion]) -> Result<(), BankError> {
        let serialized = serde_json::to_string(questions)?;
        self.storage.set(&self.key, &serialized).await?;
        BANK_QUESTIONS.set(questions.len() as i64);
        Ok(())
    }
}

/// Prepends `incoming` (stamped with `timestamp`) to `existing` and keeps the
/// first occurrence of every question text. Incoming questions whose id is
/// already taken by a kept entry are re-keyed, so ids stay unique across papers.
pub fn merge_into_bank(
    incoming: &[GeneratedQuestion],
    existing: Vec<GeneratedQuestion>,
    timestamp: i64,
) -> Vec<GeneratedQuestion> {
    let mut seen = HashSet::new();
    let mut fresh: Vec<GeneratedQuestion> = incoming
        .iter()
        .filter(|question| seen.insert(question.question.clone()))
        .cloned()
        .map(|mut question| {
            question.timestamp = Some(timestamp);
            question
        })
        .collect();
    let kept: Vec<GeneratedQuestion> = existing
        .into_iter()
        .filter(|question| seen.insert(question.question.clone()))
        .collect();

    let mut taken: HashSet<String> = kept.iter().map(|question| question.id.clone()).collect();
    for question in fresh.iter_mut() {
        if !taken.insert(question.id.clone()) {
            question.id = Uuid::new_v4().to_string();
            taken.insert(question.id.clone());
        }
    }

    fresh.extend(kept);
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::slot_storage::MemorySlotStorage;

    fn question(id: &str, text: &str, knowledge_point: &str) -> GeneratedQuestion {
        GeneratedQuestion {
            id: id.to_string(),
            question: text.to_string(),
            options: None,
            answer: "4".to_string(),
            explanation: "...".to_string(),
            knowledge_point: knowledge_point.to_string(),
            timestamp: None,
        }
    }

    fn bank() -> (QuestionBank, Arc<MemorySlotStorage>) {
        let storage = Arc::new(MemorySlotStorage::new());
        (QuestionBank::new(storage.clone(), DEFAULT_BANK_KEY), storage)
    }

    #[tokio::test]
    async fn empty_bank_lists_nothing() {
        let (bank, _) = bank();
        assert!(bank.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_stamps_and_lists_questions() {
        let (bank, _) = bank();
        let before = now_millis();

        let size = bank
            .save(&[question("a", "1+1=?", "加法"), question("b", "5-2=?", "减法")])
            .await
            .unwrap();
        assert_eq!(size, 2);

        let listed = bank.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "a");
        assert_eq!(listed[1].id, "b");
        assert!(listed.iter().all(|q| q.timestamp.unwrap() >= before));
    }

    #[tokio::test]
    async fn duplicate_text_is_kept_once() {
        let (bank, _) = bank();
        bank.save(&[question("a", "2+2=?", "加法")]).await.unwrap();
        bank.save(&[question("b", "2+2=?", "加法")]).await.unwrap();

        let listed = bank.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].question, "2+2=?");
        assert!(listed[0].timestamp.is_some());
    }

    #[tokio::test]
    async fn newer_saves_come_first() {
        let (bank, _) = bank();
        bank.save(&[question("old", "3×3=?", "乘法")]).await.unwrap();
        bank.save(&[question("new", "8÷2=?", "除法")]).await.unwrap();

        let ids: Vec<String> = bank.list().await.unwrap().into_iter().map(|q| q.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn delete_one_keeps_others_in_order() {
        let (bank, _) = bank();
        bank.save(&[
            question("a", "q1", "k"),
            question("b", "q2", "k"),
            question("c", "q3", "k"),
        ])
        .await
        .unwrap();
        let before = bank.list().await.unwrap();

        assert!(bank.delete_one("b").await.unwrap());
        let after = bank.list().await.unwrap();
        assert_eq!(after, vec![before[0].clone(), before[2].clone()]);

        assert!(!bank.delete_one("missing").await.unwrap());
        assert_eq!(bank.list().await.unwrap(), after);
    }

    #[tokio::test]
    async fn clear_empties_the_bank() {
        let (bank, storage) = bank();
        bank.save(&[question("a", "q1", "k")]).await.unwrap();
        bank.clear().await.unwrap();

        assert!(bank.list().await.unwrap().is_empty());
        assert_eq!(storage.get(DEFAULT_BANK_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreadable_slot_is_treated_as_empty() {
        let (bank, storage) = bank();
        storage.set(DEFAULT_BANK_KEY, "{not json").await.unwrap();
        assert!(bank.list().await.unwrap().is_empty());

        bank.save(&[question("a", "q1", "k")]).await.unwrap();
        assert_eq!(bank.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_matches_question_and_knowledge_point() {
        let (bank, _) = bank();
        bank.save(&[
            question("a", "长方形周长是多少？", "周长"),
            question("b", "计算 1/2 × 4", "分数乘法"),
        ])
        .await
        .unwrap();

        assert_eq!(bank.search("长方形").await.unwrap().len(), 1);
        assert_eq!(bank.search("分数").await.unwrap()[0].id, "b");
        assert_eq!(bank.search("  ").await.unwrap().len(), 2);
        assert!(bank.search("小数").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn papers_reusing_ordinal_ids_stay_separately_deletable() {
        let (bank, _) = bank();
        bank.save(&[question("1", "6×7=?", "乘法口诀")]).await.unwrap();
        bank.save(&[question("1", "42÷6=?", "表内除法")]).await.unwrap();

        let listed = bank.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_ne!(listed[0].id, listed[1].id);
        assert_eq!(listed[1].id, "1");

        assert!(bank.delete_one("1").await.unwrap());
        let after = bank.list().await.unwrap();
        assert_eq!(after, vec![listed[0].clone()]);
    }

    #[tokio::test]
    async fn delete_one_removes_a_single_entry_when_ids_collide() {
        let (bank, storage) = bank();
        let stored = vec![question("1", "q1", "k"), question("1", "q2", "k")];
        storage
            .set(DEFAULT_BANK_KEY, &serde_json::to_string(&stored).unwrap())
            .await
            .unwrap();

        assert!(bank.delete_one("1").await.unwrap());
        let after = bank.list().await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].question, "q2");
    }

    #[test]
    fn merge_prefers_incoming_copy_of_duplicate_text() {
        let mut stored = question("old", "2+2=?", "加法");
        stored.timestamp = Some(1);
        let merged = merge_into_bank(&[question("new", "2+2=?", "加法")], vec![stored], 10);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "new");
        assert_eq!(merged[0].timestamp, Some(10));
    }

    #[test]
    fn merge_dedups_within_one_batch() {
        let merged = merge_into_bank(
            &[question("a", "same", "k"), question("b", "same", "k")],
            Vec::new(),
            7,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "a");
    }
}
