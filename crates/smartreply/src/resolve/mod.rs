//! Title resolution

mod title;

pub use title::{MatchTier, TitleResolver, group_title_names, is_group_title, resolve_title};
