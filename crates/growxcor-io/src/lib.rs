//! File I/O for the growxcor pipeline: event lists, the run archive,
//! pick and location tables, miniSEED, configuration and outputs.

mod archive;
mod config_reader;
mod error;
mod event_list;
mod mseed;
mod tables;
mod writer;

pub use archive::{ArchiveLayout, EventArtifacts, RunArchive};
pub use config_reader::{ConfigReader, RunConfig};
pub use error::{IoError, MseedError};
pub use event_list::{EventListReader, EventListWriter, discover_event_ids};
pub use mseed::{MseedReader, decode};
pub use tables::{DEFAULT_UNAVAILABLE_PICK, OriginReader, PickReader};
pub use writer::{RunSummary, SummaryWriter, XcorWriter};
