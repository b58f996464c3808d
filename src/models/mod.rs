pub mod language;
pub mod loaders;
pub mod section;
pub mod usage;

pub use language::{FixedStep, LanguagePack};
pub use loaders::load_language_pack;
pub use section::{Section, SectionId, SectionTree};
pub use usage::{StatValue, UsageStats};
