pub mod directory;
pub mod flashcards;
pub mod histories;
pub mod items;

pub use directory::*;
pub use flashcards::*;
pub use histories::*;
pub use items::*;
