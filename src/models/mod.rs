//! Domain models for projecthub.
//!
//! # Core Concepts
//!
//! - [`User`]: A student, teacher or administrator. The [`Role`] gates every
//!   operation.
//! - [`Project`]: Published by a teacher. Students join it through a
//!   [`ProjectApplication`]; accepted students form the project's enrolled set.
//! - [`Task`]: A kanban card inside a project, assigned to enrolled students.
//! - [`MentorshipBooking`]: An advisory session between a teacher and one or
//!   more students. Students may hold at most one booking per assigned task,
//!   see [`MentorshipQuota`].
//!
//! All models serialize with camelCase field names to match the JSON API.

mod application;
mod booking;
mod project;
mod task;
mod user;

pub use application::*;
pub use booking::*;
pub use project::*;
pub use task::*;
pub use user::*;
