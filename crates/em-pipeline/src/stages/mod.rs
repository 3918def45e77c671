// stages/mod.rs — The six pipeline stages and their registered names.

mod company_lookup;
mod extract_emissions;
mod fiscal_year;
mod ingest;
mod precheck;
mod save_to_api;

pub use company_lookup::CompanyLookupStage;
pub use extract_emissions::ExtractEmissionsStage;
pub use fiscal_year::FiscalYearStage;
pub use ingest::IngestStage;
pub use precheck::PrecheckStage;
pub use save_to_api::SaveToApiStage;

use em_queue::{QueueError, StageError};
use em_review::{ChannelError, ReviewError};
use em_store::StoreError;

/// Stage names as registered with the engine. The child stage names
/// double as payload keys at fan-in, so extraction reads its inputs
/// under exactly these keys.
pub const INGEST: &str = "ingest";
pub const PRECHECK: &str = "precheck";
pub const COMPANY_LOOKUP: &str = "company_lookup";
pub const FISCAL_YEAR: &str = "fiscal_year";
pub const EXTRACT_EMISSIONS: &str = "extract_emissions";
pub const SAVE_TO_API: &str = "save_to_api";

pub(crate) fn store_error(err: StoreError) -> StageError {
    if err.is_transient() {
        StageError::transient(err.to_string())
    } else {
        StageError::fatal(err.to_string())
    }
}

/// Table operations fail only on lock poisoning or unknown job ids;
/// neither gets better on retry.
pub(crate) fn queue_error(err: QueueError) -> StageError {
    StageError::fatal(format!("job table: {err}"))
}

pub(crate) fn channel_error(err: ChannelError) -> StageError {
    StageError::transient(format!("review channel: {err}"))
}

pub(crate) fn review_error(err: ReviewError) -> StageError {
    match err {
        ReviewError::Channel(_) | ReviewError::Completion(_) => {
            StageError::transient(err.to_string())
        }
        other => StageError::fatal(other.to_string()),
    }
}
