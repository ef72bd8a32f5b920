pub mod flashcard;
pub mod history_sync;
