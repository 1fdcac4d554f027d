//! Type containers locating compiled classes in archives, runtime images
//! and class directories

pub mod archive;
pub mod composite;
pub mod container;
pub mod directory;
pub mod error;
pub mod index;
pub mod root;
pub mod visitor;

pub use archive::{ArchiveContainer, ArchiveLayout};
pub use composite::CompositeContainer;
pub use container::TypeContainer;
pub use directory::DirectoryContainer;
pub use error::{ContainerError, Result};
pub use index::PackageIndex;
pub use root::TypeRoot;
pub use visitor::{CollectingVisitor, ContainerVisitor};
