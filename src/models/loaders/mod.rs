pub mod toml_loader;

pub use toml_loader::{load_language_pack, parse_language_pack};
