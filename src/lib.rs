#![warn(clippy::all, rust_2018_idioms)]
#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]

pub mod action;
pub mod classify;
pub mod config;
pub mod detect;
pub mod error;
pub mod event;
pub mod imaging;
pub mod layout;
pub mod normalize;
pub mod ocr;
pub mod scan;
pub mod stitch;

pub use action::{ExtractedItem, ExtractionResult, Pipeline, PipelineOutput};
pub use classify::TransactionType;
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineWarning};
pub use stitch::{Frame, StitchResult, Stitcher};
