pub mod toml_loader;

pub use toml_loader::{load_batch_file, load_batch_inputs, load_tuning, BatchFile, RejectedInput};
