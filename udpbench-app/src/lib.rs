pub mod error;
pub mod pacer;
pub mod session;

pub use error::{ConfigError, TransportError};
pub use pacer::{Generator, GeneratorConfig, IterationResult, RateSchedule};
pub use session::{Session, SessionServer, SessionState, SessionSummary};
