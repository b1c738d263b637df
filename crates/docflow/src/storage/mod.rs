pub mod artifacts;

pub use artifacts::{
    read_rendered, write_extracted_info, write_rendered, ArtifactStore, CleanupFailure,
    DocumentMetadata,
};
