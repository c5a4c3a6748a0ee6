//! # Filecoin Plus Application
//!
//! Event-sourced workflow of a datacap allocator application, from submission
//! through KYC, governance review, Root Key Holder or Meta-Allocator approval,
//! to datacap allocation and refresh.
//!
//! ## Layout
//!
//! - [`aggregate`]: the [`Application`] aggregate and its state machine
//! - [`events`]: the persisted [`ApplicationEvent`] vocabulary
//! - [`commands`] / [`command_handlers`]: write side
//! - [`queries`] / [`read_model`] / [`projectors`]: read side
//! - [`repository`]: event store and event bus access for the aggregate
//! - [`collaborators`]: blockchain and pull-request services
//! - [`bootstrap`]: wiring into a running [`ApplicationService`]
//! - [`api`]: JSON request and [`Outcome`] envelopes
//!
//! ## Lifecycle
//!
//! ```text
//! KYC_PHASE ─► GOVERNANCE_REVIEW_PHASE ─┬─► RKH_APPROVAL_PHASE ──┬─► APPROVED ─► DC_ALLOCATED
//!     │                │                └─► META_APPROVAL_PHASE ─┘
//!     └──► REJECTED ◄──┘
//!
//! datacap refresh: any post-review status ─► GOVERNANCE_REVIEW_PHASE
//! ```

pub mod aggregate;
pub mod api;
pub mod bootstrap;
pub mod collaborators;
pub mod command_handlers;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod github;
pub mod mocks;
pub mod projectors;
pub mod queries;
pub mod read_model;
pub mod repository;
pub mod role;
pub mod types;

pub use aggregate::Application;
pub use api::{Outcome, Request};
pub use bootstrap::{ApplicationService, Infrastructure};
pub use collaborators::Collaborators;
pub use config::AppConfig;
pub use error::{ApplicationError, ErrorCategory};
pub use events::ApplicationEvent;
pub use types::ApplicationStatus;
