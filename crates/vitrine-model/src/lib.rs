//! Vitrine Model
//!
//! Domain records shared by every vitrine crate:
//!
//! - [`Project`]: the owner of builds and tags, with a retention window and a
//!   pointer to its latest default-branch build
//! - [`Tag`]: a branch, pull request or ticket label with a running build count
//! - [`Build`]: a versioned artifact bundle with one [`VariantState`] per
//!   [`Variant`]
//!
//! Records are flat key/value documents at the storage boundary. The
//! [`to_document`] / [`from_document`] pair is the only place where that
//! encoding happens; in particular a build's [`TagSet`] is stored as a
//! comma-delimited string but handled as an ordered set everywhere else.

mod build;
mod codec;
mod error;
mod project;
mod slug;
mod story;
mod tag;
mod tag_set;

pub use build::{Build, Variant, VariantState, VariantStates, archive_path, build_prefix, variant_prefix};
pub use codec::{Document, from_document, to_document};
pub use error::ModelError;
pub use project::Project;
pub use slug::slugify;
pub use story::{StoryDescriptor, StoryKind, parse_story_manifest};
pub use tag::{Tag, TagSpecifier, TagType};
pub use tag_set::{TAG_DELIMITER, TagSet};
