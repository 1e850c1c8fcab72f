pub mod session;

pub use session::{BestShotCandidate, BestShotSession, SessionState, DEFAULT_CAPACITY};
