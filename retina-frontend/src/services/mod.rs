pub mod storage;

pub use storage::{
    archive_upload, build_storage, fetch_checkpoint, LocalStorage, S3Storage, Storage,
    StorageHandles,
};
