pub mod numeric;
pub mod error;
pub mod header;
pub mod io_stream;
pub mod archive;

pub use error::{ArchiveError, Result};
pub use header::{Header, HeaderBlock, BLOCK_SIZE};
pub use io_stream::{TarReader, TarWriter};
pub use archive::{EntryInfo, PackOptions};
