pub mod identifier;
pub mod loaders;
pub mod outcome;
pub mod request;
pub mod selectors;
pub mod session;
pub mod tuning;

pub use identifier::{E164Validator, Identifier, IdentifierValidator};
pub use loaders::{load_batch_file, load_batch_inputs, load_tuning, BatchFile, RejectedInput};
pub use outcome::{
    BatchReport, Classification, ExtractionOutcome, ExtractionResult, FieldProvenance, Tier,
};
pub use request::ExtractionRequest;
pub use selectors::SelectorSet;
pub use session::{LoginChallenge, Session, SessionInit, StoredCookie};
pub use tuning::{Band, OcrRegions, Region, TextFilterConfig, Tuning};
