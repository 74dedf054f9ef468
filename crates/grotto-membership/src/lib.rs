//! Grotto Membership
//!
//! The cluster's view of who is alive and which member owns which identity.
//!
//! # Overview
//!
//! - [`MemberList`]: copy-on-write membership view fed by provider events
//! - [`placement`]: rendezvous hashing from `(name, kind)` to a member
//! - [`MemberStrategy`]: per-kind placement and activator selection
//! - [`RoundRobin`]: rotating member selection for unsharded work

pub mod error;
pub mod event;
pub mod member;
pub mod member_list;
pub mod placement;
pub mod round_robin;
pub mod strategy;

pub use error::{MembershipError, MembershipResult};
pub use event::{MembershipDelta, MembershipEvent, MembershipVersion};
pub use member::{Member, MemberStatus};
pub use member_list::{MemberList, MembershipView};
pub use placement::{placement_score, select_owner};
pub use round_robin::{MemberSource, RoundRobin};
pub use strategy::{
    default_strategy_factory, DefaultMemberStrategy, MemberSet, MemberStrategy, StrategyFactory,
};
