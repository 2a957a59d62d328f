pub mod assignment;
pub mod job;
pub mod partition;
pub mod peers;
pub mod service;

pub use assignment::{Assignment, AssignmentStatus, AssignmentView, WordlistChunk};
pub use job::{
    CrackRequest, CrackResult, HashTypeInfo, Job, JobId, JobStatus, JobView, Strategy,
};
pub use partition::partition;
pub use peers::{PeerRegistry, PeerState};
pub use service::{
    cached_job_id, Coordinator, CreateOutcome, ProgressReport, ResultAck, ResultReport,
    SweepReport,
};
