pub mod artifact;
pub mod execution;
pub mod feed;
pub mod mission;
pub mod proposal;
pub mod signal;
pub mod telemetry;

pub use artifact::*;
pub use execution::*;
pub use feed::*;
pub use mission::*;
pub use proposal::*;
pub use signal::*;
pub use telemetry::*;
