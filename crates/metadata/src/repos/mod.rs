//! Repository traits for metadata operations.

pub mod bootstrap;
pub mod dogs;
pub mod history;
pub mod objects;
pub mod tokens;
pub mod updates;
pub mod users;

pub use bootstrap::BootstrapRepo;
pub use dogs::DogRepo;
pub use history::DogHistoryRepo;
pub use objects::StorageObjectRepo;
pub use tokens::TokenRepo;
pub use updates::DogUpdateRepo;
pub use users::UserRepo;
