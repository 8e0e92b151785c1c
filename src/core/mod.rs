pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{PipelineError, Result};
pub use types::{
    ChangeEvent, ComputationLogRecord, DeletionAuditRecord, Entity, EntityId, NewEntity,
    new_record_id,
};
