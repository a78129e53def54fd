// Data models (structs)
pub mod job;
pub mod options;
pub mod settings;
pub mod vocabulary;

pub use job::*;
pub use options::*;
pub use settings::*;
pub use vocabulary::*;
